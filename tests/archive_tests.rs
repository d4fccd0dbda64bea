//! Binary formats: property blobs over a live graph, interned world blobs, corrupt input

mod common;

use std::sync::Arc;
use worldpersist::archive::{PropertyDecoder, PropertyEncoder, ReferenceTracker};
use worldpersist::sim::{ClassInfo, SceneGraph};
use worldpersist::{
    AssetPath, GAME_HEADER_TAG, IdentityRegistry, InMemoryAssetLoader, PersistConfig, PersistError, PropertyBag,
    PropertyValue, SlotData, StateManager, Transform, WORLD_HEADER_TAG, load_world,
};

use common::{WORLD, memory_config, start, town};

const MESH: &str = "/Game/Meshes/Door";
const ICON: &str = "/Game/UI/DoorIcon";

fn long_class_path() -> String {
    format!("/Game/{}Crate.Crate_C", "Deep/".repeat(100))
}

fn registry() -> IdentityRegistry {
    IdentityRegistry::new(&PersistConfig::new()).unwrap()
}

async fn world_blob_len(actors: usize) -> usize {
    let class = long_class_path();
    let mut graph = SceneGraph::new(WORLD);
    graph.register_class(ClassInfo::actor(&class));
    let level = graph.add_level("PersistentLevel", true);
    let loader = Arc::new(InMemoryAssetLoader::with_catalogue([AssetPath::new(&class)]));
    let mut session = start(&mut graph, memory_config(), loader).await;

    for index in 0..actors {
        let (node, _) = graph
            .spawn_actor(level, &class, &format!("Crate_{}", index), Transform::IDENTITY)
            .unwrap();
        session.on_object_initialized(&mut graph, node).unwrap();
    }
    session.save_world_state(&mut graph).unwrap().len()
}

#[tokio::test]
async fn test_repeated_class_paths_are_interned() {
    let class_len = long_class_path().len();
    assert!(class_len > 500);

    let one = world_blob_len(1).await;
    let ten = world_blob_len(10).await;
    assert!(one > class_len);
    let per_actor = (ten - one) / 9;
    assert!(per_actor < class_len, "each actor added {} bytes", per_actor);
}

#[test]
fn test_property_blob_round_trip_over_graph() {
    let mut world = town();
    let mesh = world.graph.add_asset(MESH);
    let mut reg = registry();
    reg.create(&world.graph, world.door).unwrap();

    let mut hinge = PropertyBag::new();
    hinge.set("angle", PropertyValue::Float(92.5));
    hinge.set("squeaks", PropertyValue::Bool(true));

    let mut bag = PropertyBag::new();
    bag.set("open", PropertyValue::Bool(true));
    bag.set("visits", PropertyValue::Int(-42));
    bag.set("label", PropertyValue::Str("North gate".to_string()));
    bag.set("socket", PropertyValue::Name("hinge_l".to_string()));
    bag.set("seed", PropertyValue::Bytes(vec![0, 255, 7]));
    bag.set("partner", PropertyValue::Object(Some(world.door)));
    bag.set("nobody", PropertyValue::Object(None));
    bag.set("mesh_node", PropertyValue::Object(Some(mesh)));
    bag.set("mesh", PropertyValue::Asset(Some(AssetPath::new(MESH))));
    bag.set("icon", PropertyValue::SoftAsset(AssetPath::new(ICON)));
    bag.set(
        "keys",
        PropertyValue::Array(vec![PropertyValue::Int(1), PropertyValue::Int(2)]),
    );
    bag.set("hinge", PropertyValue::Struct(hinge));

    let mut tracker = ReferenceTracker::new();
    let bytes = PropertyEncoder::new(&world.graph, &reg)
        .track_dependencies(&mut tracker)
        .encode(&bag)
        .unwrap();

    // Hard asset references become load dependencies, soft ones do not
    assert!(tracker.contains(&AssetPath::new(MESH)));
    assert!(!tracker.contains(&AssetPath::new(ICON)));
    assert_eq!(tracker.len(), 1);

    let decoded = PropertyDecoder::new(&world.graph, &reg).decode(&bytes).unwrap();
    assert_eq!(decoded, bag);
}

#[test]
fn test_empty_bag_encodes_to_nothing() {
    let world = town();
    let reg = registry();
    let bytes = PropertyEncoder::new(&world.graph, &reg).encode(&PropertyBag::new()).unwrap();
    assert!(bytes.is_empty());
    assert!(PropertyDecoder::new(&world.graph, &reg).decode(&bytes).unwrap().is_empty());
}

#[test]
fn test_reference_to_unknown_id_is_unresolved() {
    let world = town();
    let mut saving = registry();
    saving.create(&world.graph, world.door).unwrap();

    let mut bag = PropertyBag::new();
    bag.set("partner", PropertyValue::Object(Some(world.door)));
    let bytes = PropertyEncoder::new(&world.graph, &saving).encode(&bag).unwrap();

    let err = PropertyDecoder::new(&world.graph, &registry())
        .decode(&bytes)
        .unwrap_err();
    assert!(matches!(err, PersistError::UnresolvedReference(_)));
}

#[test]
fn test_malformed_property_blobs_are_rejected() {
    let world = town();
    let reg = registry();
    let decoder = PropertyDecoder::new(&world.graph, &reg);

    // one property "a" with tag 0xFF
    let err = decoder.decode(&[0x01, 0x01, b'a', 0xFF]).unwrap_err();
    assert!(matches!(err, PersistError::Decode(_)));

    let mut bag = PropertyBag::new();
    bag.set("open", PropertyValue::Bool(true));
    let mut bytes = PropertyEncoder::new(&world.graph, &reg).encode(&bag).unwrap();
    bytes.push(0);
    assert!(matches!(decoder.decode(&bytes), Err(PersistError::Decode(_))));

    // count larger than the blob
    assert!(decoder.decode(&[0x7F, 0x01]).is_err());
}

#[tokio::test]
async fn test_world_blob_checks_header_tag_and_bounds() {
    let mut world = town();
    let mut session = start(&mut world.graph, memory_config(), common::crate_loader()).await;
    let bytes = session.save_world_state(&mut world.graph).unwrap();

    let mut managers: Vec<Box<dyn StateManager>> = Vec::new();
    let report = load_world(&bytes, WORLD_HEADER_TAG, &mut managers).unwrap();
    assert_eq!(report.skipped, vec!["LevelActors", "WorldSubsystems", "DataLayers"]);

    let err = load_world(&bytes, GAME_HEADER_TAG, &mut managers).unwrap_err();
    assert!(matches!(err, PersistError::MalformedChunk(_)));

    let truncated = &bytes[..bytes.len() / 2];
    assert!(load_world(truncated, WORLD_HEADER_TAG, &mut managers).is_err());
}

#[tokio::test]
async fn test_slot_header_readable_without_full_decode() {
    let mut world = town();
    let mut session = start(&mut world.graph, memory_config(), common::crate_loader()).await;
    assert!(session.save_game(&mut world.graph, "quick").await);

    let bytes = session.storage().load_slot("quick").unwrap().unwrap();
    let header = SlotData::read_header(&bytes).unwrap();
    assert!(header.is_valid());
    assert_eq!(header.slot_name, "quick");
    assert_eq!(header.world_header_count, 1);

    assert!(SlotData::from_bytes(&bytes[..bytes.len() - 1]).is_err());
}

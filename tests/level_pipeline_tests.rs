//! Level pipeline scenarios: delta records, dynamic recreation, attachment order,
//! destroyed and outdated records, streaming, the asset gate and deferred notifications

mod common;

use common::{CRATE, DOOR, LIGHT, crate_loader, memory_config, register_classes, restart, start, town};
use std::sync::Arc;
use worldpersist::sim::{ClassInfo, SceneGraph};
use worldpersist::{
    AssetLoader, AssetPath, CustomState, GraphHost, InMemoryAssetLoader, LevelLoadStatus, PersistError,
    PropertyValue, Transform,
};

const SPAWNER: &str = "/Game/Props/Spawner.Spawner_C";

#[tokio::test]
async fn test_static_actor_delta_round_trip() {
    let mut before = town();
    let mut session = start(&mut before.graph, memory_config(), crate_loader()).await;
    before.graph.set_property(before.door, "open", PropertyValue::Bool(true));
    assert!(session.save_game(&mut before.graph, "slot").await);

    let door_id = session.registry().find(before.door).unwrap();
    let gate_id = session.registry().find(before.gate).unwrap();
    let level_actors = session.level_actors().unwrap();
    let door_record = &level_actors.actor(&door_id).unwrap().record;
    let gate_record = &level_actors.actor(&gate_id).unwrap().record;
    assert!(door_record.flags.saved && door_record.flags.has_property_blob);
    assert!(!door_record.flags.has_transform);
    // Unchanged actors are saved with an empty delta
    assert!(gate_record.flags.saved && !gate_record.flags.has_property_blob);

    let mut after = town();
    let mut reloaded = restart(&session, crate_loader());
    assert!(reloaded.load_game(&mut after.graph, "slot").await);

    assert_eq!(after.graph.property(after.door, "open"), Some(&PropertyValue::Bool(true)));
    assert_eq!(after.graph.property(after.gate, "open"), Some(&PropertyValue::Bool(false)));
    let gate_hooks = &after.graph.sim_object(after.gate).unwrap().hooks;
    assert!(gate_hooks.contains(&"post_load".to_string()));
    assert!(!gate_hooks.contains(&"load_properties".to_string()));
    assert_eq!(reloaded.registry().find(after.door), Some(door_id));
}

#[tokio::test]
async fn test_moved_static_actor_restores_transform() {
    let mut before = town();
    let mut session = start(&mut before.graph, memory_config(), crate_loader()).await;
    before
        .graph
        .set_world_transform(before.gate, Transform::from_translation(0.0, 12.5, 0.0));
    assert!(session.save_game(&mut before.graph, "slot").await);

    let mut after = town();
    let mut reloaded = restart(&session, crate_loader());
    assert!(reloaded.load_game(&mut after.graph, "slot").await);
    assert_eq!(after.graph.transform(after.gate).translation, [0.0, 12.5, 0.0]);
    assert_eq!(after.graph.transform(after.door), Transform::IDENTITY);
}

#[tokio::test]
async fn test_dynamic_actor_is_recreated_after_asset_gate() {
    let mut before = town();
    let mut session = start(&mut before.graph, memory_config(), crate_loader()).await;
    let (chest, _) = before
        .graph
        .spawn_actor(before.level, CRATE, "Chest", Transform::from_translation(5.0, 0.0, 0.0))
        .unwrap();
    session.on_object_initialized(&mut before.graph, chest).unwrap();
    before.graph.set_property(chest, "coins", PropertyValue::Int(7));
    before
        .graph
        .set_property(before.door, "target", PropertyValue::Object(Some(chest)));
    let chest_id = session.registry().find(chest).unwrap();
    assert!(chest_id.is_dynamic());
    assert!(session.save_game(&mut before.graph, "slot").await);

    let mut after = town();
    let loader = crate_loader();
    let mut reloaded = restart(&session, loader.clone());
    assert!(reloaded.load_game(&mut after.graph, "slot").await);

    let chest = after.graph.find_child(after.level, "Chest").unwrap();
    assert_eq!(reloaded.registry().find(chest), Some(chest_id));
    assert_eq!(after.graph.transform(chest).translation, [5.0, 0.0, 0.0]);
    assert_eq!(after.graph.property(chest, "coins"), Some(&PropertyValue::Int(7)));
    // Hard reference from a static actor to the recreated instance
    assert_eq!(
        after.graph.property(after.door, "target"),
        Some(&PropertyValue::Object(Some(chest)))
    );
    assert_eq!(loader.load_requests(), 1);
    assert!(reloaded.level_actors().unwrap().stats().dependencies >= 1);
}

#[tokio::test]
async fn test_attachment_chain_through_dynamic_actor() {
    // Door (static) <- Chest (dynamic) <- Gate (static)
    let mut before = town();
    let mut session = start(&mut before.graph, memory_config(), crate_loader()).await;
    let (chest, _) = before
        .graph
        .spawn_actor(before.level, CRATE, "Chest", Transform::IDENTITY)
        .unwrap();
    session.on_object_initialized(&mut before.graph, chest).unwrap();
    before.graph.attach_to(chest, before.door, "hinge");
    before
        .graph
        .set_relative_transform(chest, Transform::from_translation(1.0, 0.0, 0.0));
    before.graph.attach_to(before.gate, chest, "lid");
    before
        .graph
        .set_relative_transform(before.gate, Transform::from_translation(0.0, 0.0, 2.0));
    assert!(session.save_game(&mut before.graph, "slot").await);

    let mut after = town();
    let mut reloaded = restart(&session, crate_loader());
    assert!(reloaded.load_game(&mut after.graph, "slot").await);

    let chest = after.graph.find_child(after.level, "Chest").unwrap();
    assert_eq!(after.graph.attach_parent(chest), Some(after.door));
    assert_eq!(after.graph.attach_socket(chest), "hinge");
    assert_eq!(after.graph.attach_parent(after.gate), Some(chest));
    assert_eq!(after.graph.attach_socket(after.gate), "lid");
    assert_eq!(after.graph.transform(after.gate).translation, [0.0, 0.0, 2.0]);
    assert_eq!(after.graph.attach_parent(after.door), None);
}

#[tokio::test]
async fn test_destroyed_static_actor_stays_destroyed() {
    let mut before = town();
    let mut session = start(&mut before.graph, memory_config(), crate_loader()).await;
    let gate_id = session.registry().find(before.gate).unwrap();
    session.on_object_destroyed(&mut before.graph, before.gate);
    before.graph.destroy(before.gate);
    assert!(session.save_game(&mut before.graph, "slot").await);

    let mut after = town();
    let mut reloaded = restart(&session, crate_loader());
    assert!(reloaded.load_game(&mut after.graph, "slot").await);

    assert!(!after.graph.is_alive(after.gate));
    assert!(after.graph.is_alive(after.door));
    let level_actors = reloaded.level_actors().unwrap();
    assert!(level_actors.destroyed().contains(&gate_id));
    assert!(level_actors.actor(&gate_id).is_none());
}

#[tokio::test]
async fn test_destroyed_component_stays_destroyed() {
    let mut before = town();
    let mut session = start(&mut before.graph, memory_config(), crate_loader()).await;
    let light = before.graph.components(before.door)[0];
    before.graph.destroy(light);
    assert!(session.save_game(&mut before.graph, "slot").await);

    let mut after = town();
    let mut reloaded = restart(&session, crate_loader());
    assert!(reloaded.load_game(&mut after.graph, "slot").await);
    assert!(after.graph.components(after.door).is_empty());
    assert_eq!(after.graph.components(after.gate).len(), 1);
}

#[tokio::test]
async fn test_static_record_missing_from_content_is_pruned() {
    let mut before = town();
    let mut session = start(&mut before.graph, memory_config(), crate_loader()).await;
    before.graph.set_property(before.gate, "open", PropertyValue::Bool(true));
    let gate_id = session.registry().find(before.gate).unwrap();
    assert!(session.save_game(&mut before.graph, "slot").await);

    // Content update removed the gate
    let mut graph = SceneGraph::new(common::WORLD);
    register_classes(&mut graph);
    let level = graph.add_level("PersistentLevel", true);
    let door = graph.place_actor(level, DOOR, "Door").unwrap();

    let mut reloaded = restart(&session, crate_loader());
    assert!(reloaded.load_game(&mut graph, "slot").await);
    let level_actors = reloaded.level_actors().unwrap();
    assert!(level_actors.actor(&gate_id).is_none());
    assert!(level_actors.outdated().contains(&gate_id));
    assert!(graph.is_alive(door));
}

#[tokio::test]
async fn test_dynamic_actor_with_removed_class_is_outdated() {
    let mut before = town();
    let mut session = start(&mut before.graph, memory_config(), crate_loader()).await;
    let (chest, _) = before
        .graph
        .spawn_actor(before.level, CRATE, "Chest", Transform::IDENTITY)
        .unwrap();
    session.on_object_initialized(&mut before.graph, chest).unwrap();
    let chest_id = session.registry().find(chest).unwrap();
    assert!(session.save_game(&mut before.graph, "slot").await);

    let mut after = town();
    after.graph.unregister_class(CRATE);
    let mut reloaded = restart(&session, crate_loader());
    assert!(reloaded.load_game(&mut after.graph, "slot").await);

    assert!(after.graph.find_child(after.level, "Chest").is_none());
    assert!(reloaded.level_actors().unwrap().outdated().contains(&chest_id));
}

#[tokio::test]
async fn test_persist_flag_cannot_be_withdrawn() {
    let mut world = town();
    let mut session = start(&mut world.graph, memory_config(), crate_loader()).await;

    // Never saved, so opting out is fine
    world.graph.sim_object_mut(world.gate).unwrap().should_save = false;
    session.save_world_state(&mut world.graph).unwrap();
    let gate_id = session.registry().find(world.gate).unwrap();
    assert!(!session.level_actors().unwrap().actor(&gate_id).unwrap().record.is_saved());

    world.graph.sim_object_mut(world.door).unwrap().should_save = false;
    let err = session.save_world_state(&mut world.graph).unwrap_err();
    assert!(matches!(err, PersistError::PersistRegression(_)));
    assert!(!session.save_game(&mut world.graph, "slot").await);
}

#[tokio::test]
async fn test_runtime_component_on_static_actor() {
    let mut before = town();
    let mut session = start(&mut before.graph, memory_config(), crate_loader()).await;
    let extra = before
        .graph
        .add_component(before.door, common::LIGHT, "ExtraLight", false)
        .unwrap();
    session.on_object_initialized(&mut before.graph, extra).unwrap();
    let extra_id = session.registry().find(extra).unwrap();
    assert!(extra_id.is_dynamic());
    assert!(session.save_game(&mut before.graph, "slot").await);

    let mut after = town();
    let mut reloaded = restart(&session, crate_loader());
    assert!(reloaded.load_game(&mut after.graph, "slot").await);

    let extra = after.graph.find_child(after.door, "ExtraLight").unwrap();
    assert_eq!(reloaded.registry().find(extra), Some(extra_id));
    assert_eq!(after.graph.components(after.door).len(), 2);
}

#[tokio::test]
async fn test_streamed_level_keeps_state_between_visits() {
    let mut world = town();
    let mut session = start(&mut world.graph, memory_config(), crate_loader()).await;

    let dungeon = world.graph.add_level("Dungeon", false);
    let chest = world.graph.place_actor(dungeon, CRATE, "Chest").unwrap();
    session.on_level_loaded(&mut world.graph, dungeon, true).await.unwrap();

    let dungeon_id = session.registry().find(dungeon).unwrap();
    let flags = session.level_actors().unwrap().level(&dungeon_id).unwrap().flags;
    assert!(flags.initialized && flags.streaming && !flags.added);

    session.on_level_added(&mut world.graph, dungeon);
    assert!(session.level_actors().unwrap().level(&dungeon_id).unwrap().is_ready());

    world.graph.set_property(chest, "coins", PropertyValue::Int(50));
    session.on_level_removed(&mut world.graph, dungeon).unwrap();
    world.graph.remove_level(dungeon);
    let state = session.level_actors().unwrap().level(&dungeon_id).unwrap();
    assert!(!state.flags.initialized && state.node().is_none());

    // Stream the level in again from content
    let dungeon = world.graph.add_level("Dungeon", false);
    let chest = world.graph.place_actor(dungeon, CRATE, "Chest").unwrap();
    session.on_level_loaded(&mut world.graph, dungeon, true).await.unwrap();
    assert_eq!(world.graph.property(chest, "coins"), Some(&PropertyValue::Int(50)));
}

#[tokio::test]
async fn test_level_cannot_be_initialized_twice() {
    let mut world = town();
    let mut session = start(&mut world.graph, memory_config(), crate_loader()).await;
    let err = session
        .on_level_loaded(&mut world.graph, world.level, false)
        .await
        .unwrap_err();
    assert!(matches!(err, PersistError::InvalidState(_)));
}

#[tokio::test]
async fn test_custom_state_of_actor_and_component_survives_reload() {
    let mut before = town();
    let mut session = start(&mut before.graph, memory_config(), crate_loader()).await;
    let light = before.graph.components(before.door)[0];
    before.graph.sim_object_mut(before.door).unwrap().custom = Some(CustomState::new("DoorLock", vec![1, 2, 3]));
    before.graph.sim_object_mut(light).unwrap().custom = Some(CustomState::new("Flicker", vec![9]));
    assert!(session.save_game(&mut before.graph, "slot").await);

    let mut after = town();
    let mut reloaded = restart(&session, crate_loader());
    assert!(reloaded.load_game(&mut after.graph, "slot").await);

    let door = after.graph.sim_object(after.door).unwrap();
    assert_eq!(door.custom, Some(CustomState::new("DoorLock", vec![1, 2, 3])));
    assert!(door.hooks.contains(&"load_custom".to_string()));

    let light = after.graph.components(after.door)[0];
    let light = after.graph.sim_object(light).unwrap();
    assert_eq!(light.custom, Some(CustomState::new("Flicker", vec![9])));
    assert!(light.hooks.contains(&"load_custom".to_string()));

    // No custom state was saved for the gate
    assert_eq!(after.graph.sim_object(after.gate).unwrap().custom, None);
}

#[tokio::test]
async fn test_nodes_spawned_by_recreated_actor_are_linked_after_load() {
    let loader = || {
        Arc::new(InMemoryAssetLoader::with_catalogue([
            AssetPath::new(CRATE),
            AssetPath::new(SPAWNER),
        ]))
    };

    let mut before = town();
    before.graph.register_class(ClassInfo::actor(SPAWNER).spawning(CRATE));
    let mut session = start(&mut before.graph, memory_config(), loader()).await;
    let (spawner, _) = before
        .graph
        .spawn_actor(before.level, SPAWNER, "Spawner", Transform::IDENTITY)
        .unwrap();
    session.on_object_initialized(&mut before.graph, spawner).unwrap();
    let spawner_id = session.registry().find(spawner).unwrap();
    assert!(session.save_game(&mut before.graph, "slot").await);

    let mut after = town();
    after.graph.register_class(ClassInfo::actor(SPAWNER).spawning(CRATE));
    let mut reloaded = restart(&session, loader());
    assert!(reloaded.load_game(&mut after.graph, "slot").await);

    let spawner = after.graph.find_child(after.level, "Spawner").unwrap();
    assert_eq!(reloaded.registry().find(spawner), Some(spawner_id));

    // Construction of the recreated spawner created a crate; it went through the queue
    let spawned = after.graph.find_child(after.level, "Spawner_Spawned1").unwrap();
    let spawned_id = reloaded.registry().find(spawned).unwrap();
    assert!(spawned_id.is_dynamic());
    let level_actors = reloaded.level_actors().unwrap();
    assert!(!level_actors.is_busy());
    assert!(level_actors.actor(&spawned_id).unwrap().record.is_initialized());
    assert_eq!(after.graph.level_actors(after.level).len(), 4);
}

#[tokio::test]
async fn test_asset_gate_defers_notifications_until_level_finishes() {
    let mut world = town();
    let loader = crate_loader();
    let mut session = start(&mut world.graph, memory_config(), loader.clone()).await;

    let dungeon = world.graph.add_level("Dungeon", false);
    world.graph.place_actor(dungeon, DOOR, "Portcullis").unwrap();
    assert_eq!(
        session.begin_level_load(&mut world.graph, dungeon, true).unwrap(),
        LevelLoadStatus::Completed
    );
    session.on_level_added(&mut world.graph, dungeon);
    let (chest, _) = world
        .graph
        .spawn_actor(dungeon, CRATE, "Chest", Transform::IDENTITY)
        .unwrap();
    session.on_object_initialized(&mut world.graph, chest).unwrap();
    world.graph.set_property(chest, "coins", PropertyValue::Int(9));
    session.on_level_removed(&mut world.graph, dungeon).unwrap();
    world.graph.remove_level(dungeon);

    // Second visit: the chest class is not resident, so recreation must wait
    let dungeon = world.graph.add_level("Dungeon", false);
    let portcullis = world.graph.place_actor(dungeon, DOOR, "Portcullis").unwrap();
    let status = session.begin_level_load(&mut world.graph, dungeon, true).unwrap();
    assert_eq!(status, LevelLoadStatus::AwaitingAssets(vec![AssetPath::new(CRATE)]));
    let dungeon_id = session.registry().find(dungeon).unwrap();
    assert!(session.level_actors().unwrap().is_awaiting_assets(&dungeon_id));

    let (late, _) = world
        .graph
        .spawn_actor(dungeon, DOOR, "Late", Transform::IDENTITY)
        .unwrap();
    session.on_object_initialized(&mut world.graph, late).unwrap();
    let torch = world.graph.add_component(portcullis, LIGHT, "Torch", false).unwrap();
    session.on_object_initialized(&mut world.graph, torch).unwrap();
    assert!(session.registry().find(late).is_none());
    assert!(session.registry().find(torch).is_none());
    let hooks = &world.graph.sim_object(portcullis).unwrap().hooks;
    assert!(!hooks.contains(&"post_load".to_string()));

    // Other levels keep processing notifications while the dungeon waits
    let (cart, _) = world
        .graph
        .spawn_actor(world.level, CRATE, "Cart", Transform::IDENTITY)
        .unwrap();
    session.on_object_initialized(&mut world.graph, cart).unwrap();
    assert!(session.registry().find(cart).is_some());
    assert!(session.registry().find(late).is_none());

    loader.load_assets(vec![AssetPath::new(CRATE)]).await.unwrap();
    session.finish_level_load(&mut world.graph, dungeon).unwrap();

    let chest = world.graph.find_child(dungeon, "Chest").unwrap();
    assert_eq!(world.graph.property(chest, "coins"), Some(&PropertyValue::Int(9)));
    let hooks = &world.graph.sim_object(portcullis).unwrap().hooks;
    assert!(hooks.contains(&"post_load".to_string()));
    let level_actors = session.level_actors().unwrap();
    assert!(!level_actors.is_awaiting_assets(&dungeon_id));
    let late_id = session.registry().find(late).unwrap();
    assert!(level_actors.actor(&late_id).unwrap().record.is_initialized());
    assert!(session.registry().find(torch).is_some());

    let err = session.finish_level_load(&mut world.graph, dungeon).unwrap_err();
    assert!(matches!(err, PersistError::InvalidState(_)));
}

#[tokio::test]
async fn test_failed_streaming_save_still_unlinks_level() {
    let mut world = town();
    let mut session = start(&mut world.graph, memory_config(), crate_loader()).await;

    let dungeon = world.graph.add_level("Dungeon", false);
    let portcullis = world.graph.place_actor(dungeon, DOOR, "Portcullis").unwrap();
    session.on_level_loaded(&mut world.graph, dungeon, true).await.unwrap();
    session.on_level_added(&mut world.graph, dungeon);
    session.save_world_state(&mut world.graph).unwrap();
    let dungeon_id = session.registry().find(dungeon).unwrap();
    let portcullis_id = session.registry().find(portcullis).unwrap();

    world.graph.sim_object_mut(portcullis).unwrap().should_save = false;
    let err = session.on_level_removed(&mut world.graph, dungeon).unwrap_err();
    assert!(matches!(err, PersistError::PersistRegression(_)));
    let state = session.level_actors().unwrap().level(&dungeon_id).unwrap();
    assert!(!state.flags.initialized && state.node().is_none());
    assert!(!session.level_actors().unwrap().actor(&portcullis_id).unwrap().record.is_linked());
    world.graph.remove_level(dungeon);

    let dungeon = world.graph.add_level("Dungeon", false);
    let portcullis = world.graph.place_actor(dungeon, DOOR, "Portcullis").unwrap();
    session.on_level_loaded(&mut world.graph, dungeon, true).await.unwrap();
    let level_actors = session.level_actors().unwrap();
    assert!(level_actors.level(&dungeon_id).unwrap().flags.initialized);
    assert_eq!(level_actors.actor(&portcullis_id).unwrap().record.node(), Some(portcullis));
}

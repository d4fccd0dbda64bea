//! Shared world builders for the scenario tests

#![allow(dead_code)]

use std::sync::Arc;
use worldpersist::sim::{ClassInfo, SceneGraph};
use worldpersist::{
    AssetPath, DurabilityMode, InMemoryAssetLoader, NodeHandle, PersistConfig, PersistSession, PropertyValue,
};

pub const WORLD: &str = "/Game/Maps/Town";
pub const DOOR: &str = "/Game/Props/Door.Door_C";
pub const CRATE: &str = "/Game/Props/Crate.Crate_C";
pub const LIGHT: &str = "/Script/Engine.LightComponent";

pub struct Town {
    pub graph: SceneGraph,
    pub level: NodeHandle,
    pub door: NodeHandle,
    pub gate: NodeHandle,
}

pub fn register_classes(graph: &mut SceneGraph) {
    graph.register_class(ClassInfo::component(LIGHT));
    graph.register_class(
        ClassInfo::actor(DOOR)
            .with_component("Light", LIGHT)
            .with_property("open", PropertyValue::Bool(false)),
    );
    graph.register_class(ClassInfo::actor(CRATE).with_property("coins", PropertyValue::Int(0)));
}

/// Persistent level with two placed doors, `Door` and `Gate`
pub fn town() -> Town {
    let mut graph = SceneGraph::new(WORLD);
    register_classes(&mut graph);
    let level = graph.add_level("PersistentLevel", true);
    let door = graph.place_actor(level, DOOR, "Door").unwrap();
    let gate = graph.place_actor(level, DOOR, "Gate").unwrap();
    Town {
        graph,
        level,
        door,
        gate,
    }
}

pub fn memory_config() -> PersistConfig {
    PersistConfig::new()
        .durability(DurabilityMode::None)
        .force_sync_io(true)
}

pub fn crate_loader() -> Arc<InMemoryAssetLoader> {
    Arc::new(InMemoryAssetLoader::with_catalogue([AssetPath::new(CRATE)]))
}

/// Initialized session with every level of `graph` linked
pub async fn start(graph: &mut SceneGraph, config: PersistConfig, loader: Arc<InMemoryAssetLoader>) -> PersistSession {
    let mut session = PersistSession::new(config, loader).unwrap();
    session.init();
    session.new_game(graph).await.unwrap();
    session
}

/// Fresh session over the storage of `previous`, as after a restart
pub fn restart(previous: &PersistSession, loader: Arc<InMemoryAssetLoader>) -> PersistSession {
    let mut session = PersistSession::new(previous.config().clone(), loader)
        .unwrap()
        .with_storage(previous.storage().clone());
    session.init();
    session
}

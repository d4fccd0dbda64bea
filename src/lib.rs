// ============================================================================
// worldpersist
// ============================================================================

//! Save/load engine for a live object graph.
//!
//! Nodes get GUID identities that survive destruction and recreation, levels keep
//! per-actor delta records, and the records of a whole world are written as one
//! interned binary blob inside a slot file.
//!
//! ```
//! use std::sync::Arc;
//! use worldpersist::sim::{ClassInfo, SceneGraph};
//! use worldpersist::{DurabilityMode, InMemoryAssetLoader, PersistConfig, PersistSession, PropertyValue};
//!
//! # tokio_test::block_on(async {
//! let mut graph = SceneGraph::new("/Game/Maps/Town");
//! graph.register_class(ClassInfo::actor("/Game/Door"));
//! let level = graph.add_level("PersistentLevel", true);
//! let door = graph.place_actor(level, "/Game/Door", "Door").unwrap();
//!
//! let config = PersistConfig::new().durability(DurabilityMode::None).force_sync_io(true);
//! let mut session = PersistSession::new(config, Arc::new(InMemoryAssetLoader::new())).unwrap();
//! session.init();
//! session.new_game(&mut graph).await.unwrap();
//!
//! graph.set_property(door, "open", PropertyValue::Bool(true));
//! assert!(session.save_game(&mut graph, "quick").await);
//! # });
//! ```

pub mod archive;
pub mod config;
pub mod core;
pub mod host;
pub mod identity;
pub mod manager;
pub mod session;
pub mod sim;
pub mod slot;
pub mod state;
pub mod storage;
pub mod world;

// Re-export main types for convenience
pub use config::{DurabilityMode, PersistConfig};
pub use core::{
    AssetPath, CustomState, DataLayerState, ManagerScope, NodeHandle, NodeKind, PersistError, Result,
    Transform,
};
pub use host::{GraphHost, PersistentObject, PropertyBag, PropertyValue};
pub use identity::{IdKind, IdentityRegistry, ObjectId};
pub use manager::{
    AssetLoader, DataLayersManager, InMemoryAssetLoader, LevelActorsManager, LevelLoadStatus, StateManager,
    SubsystemsManager,
};
pub use session::PersistSession;
pub use slot::{SlotData, SlotHeader};
pub use state::PersistContext;
pub use storage::{FileSlotBackend, InMemorySlotBackend, SlotBackend, SlotStorage};
pub use world::{GAME_HEADER_TAG, WORLD_HEADER_TAG, load_world, save_world};

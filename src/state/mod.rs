//! Per-node state records and the contexts threaded through their load and save passes.

pub mod actor;
pub mod descriptor;
pub mod level;
pub mod record;

use crate::config::PersistConfig;
use crate::host::GraphHost;
use crate::identity::{IdentityRegistry, ObjectId};
use std::collections::BTreeSet;

pub use actor::ActorState;
pub use descriptor::{DescFlags, ObjectDesc};
pub use level::{LevelFlags, LevelState};
pub use record::{ComponentState, NodeRecord};

/// Borrowed services every record operation needs
pub struct PersistContext<'a> {
    pub host: &'a mut dyn GraphHost,
    pub registry: &'a mut IdentityRegistry,
    pub config: &'a PersistConfig,
}

impl<'a> PersistContext<'a> {
    pub fn new(host: &'a mut dyn GraphHost, registry: &'a mut IdentityRegistry, config: &'a PersistConfig) -> Self {
        Self { host, registry, config }
    }
}

/// Collected during one load pass
#[derive(Debug, Default)]
pub struct LoadContext {
    pub created_actors: Vec<ObjectId>,
    pub created_components: Vec<ObjectId>,
    /// Records dropped because their class no longer resolves
    pub outdated: BTreeSet<ObjectId>,
}

/// Collected during one save pass, merged into the manager's sets afterwards
#[derive(Debug, Default)]
pub struct SaveContext {
    pub from_level_streaming: bool,
    pub destroyed: BTreeSet<ObjectId>,
    pub outdated: BTreeSet<ObjectId>,
}

impl SaveContext {
    pub fn new(from_level_streaming: bool) -> Self {
        Self {
            from_level_streaming,
            ..Self::default()
        }
    }
}

use super::actor::ActorState;
use crate::archive::{ReferenceTracker, StateReader, StateWriter};
use crate::core::{NodeHandle, PersistError, Result};
use crate::host::GraphHost;
use crate::identity::{IdentityRegistry, ObjectId};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Seek, Write};

/// Transient lifecycle flags of a level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LevelFlags {
    /// Discovery ran in the current link cycle
    pub initialized: bool,
    /// The level is visible in the world
    pub added: bool,
    /// The level arrived through streaming rather than with the world
    pub streaming: bool,
}

/// All actor records of one streaming level
#[derive(Debug, Clone, Default)]
pub struct LevelState {
    pub id: ObjectId,
    pub flags: LevelFlags,
    /// Assets that must be loaded before dynamic actors are recreated
    pub dependencies: ReferenceTracker,
    pub actors: BTreeMap<ObjectId, ActorState>,
    node: Option<NodeHandle>,
}

impl LevelState {
    pub fn new(id: ObjectId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    pub fn node(&self) -> Option<NodeHandle> {
        self.node
    }

    pub fn set_node(&mut self, node: Option<NodeHandle>) {
        self.node = node;
    }

    pub fn is_ready(&self) -> bool {
        self.flags.initialized && self.flags.added
    }

    pub fn actor(&self, id: &ObjectId) -> Option<&ActorState> {
        self.actors.get(id)
    }

    pub fn actor_mut(&mut self, id: &ObjectId) -> Option<&mut ActorState> {
        self.actors.get_mut(id)
    }

    pub fn component_count(&self) -> usize {
        self.actors.values().map(|a| a.components.len()).sum()
    }

    /// Unlink every record; saved data is kept for the next link cycle
    pub fn reset_links(&mut self) {
        for actor in self.actors.values_mut() {
            actor.unlink();
        }
        self.node = None;
        self.flags.initialized = false;
        self.flags.added = false;
    }

    /// Linked actors ordered so that every attachment parent precedes its children
    pub fn load_order(&self, host: &dyn GraphHost, registry: &IdentityRegistry) -> Vec<ObjectId> {
        let parent_of = |actor: &ActorState| -> Option<ObjectId> {
            let record = &actor.record;
            let parent = if record.flags.saved && record.flags.has_attachment {
                Some(record.desc.attach_parent_id.clone())
            } else {
                record
                    .node()
                    .and_then(|n| host.attach_parent(n))
                    .and_then(|p| registry.find(p))
            };
            parent.filter(|p| p.is_valid() && self.actors.contains_key(p))
        };

        let mut order = Vec::with_capacity(self.actors.len());
        let mut visited = BTreeSet::new();
        for id in self.actors.keys() {
            let mut chain = Vec::new();
            let mut cursor = Some(id.clone());
            // Walk up to the first visited ancestor, then emit top-down
            while let Some(current) = cursor {
                if visited.contains(&current) || chain.contains(&current) {
                    break;
                }
                cursor = self.actors.get(&current).and_then(&parent_of);
                chain.push(current);
            }
            for current in chain.into_iter().rev() {
                visited.insert(current.clone());
                if self.actors.get(&current).is_some_and(|a| a.record.is_linked()) {
                    order.push(current);
                }
            }
        }
        order
    }

    // ------------------------------------------------------------------
    // serialization
    // ------------------------------------------------------------------

    /// Unsaved actors are rebuilt by discovery and are not written
    pub fn write<W: Write + Seek>(&self, writer: &mut StateWriter<W>) -> Result<()> {
        writer.write_object_id(&self.id)?;
        writer.raw().write_varint(self.dependencies.len() as u64)?;
        for path in self.dependencies.paths() {
            writer.write_soft_ref(Some(path))?;
        }
        let saved: Vec<&ActorState> = self.actors.values().filter(|a| a.record.is_saved()).collect();
        writer.raw().write_varint(saved.len() as u64)?;
        for actor in saved {
            actor.write(writer)?;
        }
        Ok(())
    }

    pub fn read<R: Read + Seek>(reader: &mut StateReader<R>) -> Result<Self> {
        let id = reader.read_object_id()?;
        if !id.is_valid() {
            return Err(PersistError::Decode("level state without a valid id".to_string()));
        }
        let mut level = Self::new(id);

        let dependency_count = reader.raw().read_varint()?;
        for _ in 0..dependency_count {
            match reader.read_soft_ref()? {
                Some(path) => {
                    level.dependencies.track(&path);
                }
                None => {
                    return Err(PersistError::Decode(format!(
                        "empty dependency in level {}",
                        level.id.describe()
                    )));
                }
            }
        }

        let actor_count = reader.raw().read_varint()?;
        if actor_count > reader.raw().remaining()? {
            return Err(PersistError::Decode(format!(
                "level {} claims {} actors beyond end of archive",
                level.id.describe(),
                actor_count
            )));
        }
        for _ in 0..actor_count {
            let actor = ActorState::read(reader)?;
            let actor_id = actor.id().clone();
            if level.actors.insert(actor_id.clone(), actor).is_some() {
                return Err(PersistError::Decode(format!(
                    "duplicate actor {} in level {}",
                    actor_id.describe(),
                    level.id.describe()
                )));
            }
        }
        Ok(level)
    }
}

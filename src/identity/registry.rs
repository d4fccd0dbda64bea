use super::{ObjectId, PathRemapper, stable_path};
use crate::config::PersistConfig;
use crate::core::{NodeHandle, PersistError, Result};
use crate::host::GraphHost;
use std::collections::HashMap;
use tracing::{Level, event};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Binding {
    id: ObjectId,
    node: NodeHandle,
}

/// Side table between object ids and live nodes.
///
/// One instance per session. Node handles carry a generation, so an entry whose node
/// was destroyed resolves to nothing instead of aliasing a reused slot.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    seed: Uuid,
    remapper: PathRemapper,
    by_guid: HashMap<Uuid, Binding>,
    by_node: HashMap<NodeHandle, ObjectId>,
}

impl IdentityRegistry {
    pub fn new(config: &PersistConfig) -> Result<Self> {
        Ok(Self {
            seed: config.guid_seed,
            remapper: PathRemapper::from_config(config)?,
            by_guid: HashMap::new(),
            by_node: HashMap::new(),
        })
    }

    pub fn with_seed(seed: Uuid) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }

    pub fn seed(&self) -> Uuid {
        self.seed
    }

    pub fn remapper(&self) -> &PathRemapper {
        &self.remapper
    }

    pub fn len(&self) -> usize {
        self.by_guid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_guid.is_empty()
    }

    /// Id currently bound to `node`. Never allocates.
    pub fn find(&self, node: NodeHandle) -> Option<ObjectId> {
        self.by_node.get(&node).cloned()
    }

    /// Live node bound to `id`, if any
    pub fn resolve(&self, host: &dyn GraphHost, id: &ObjectId) -> Option<NodeHandle> {
        if !id.is_valid() {
            return None;
        }
        self.by_guid
            .get(&id.guid())
            .map(|binding| binding.node)
            .filter(|node| host.is_alive(*node))
    }

    /// Static id for `node` computed without binding it
    pub fn peek_static(&self, host: &dyn GraphHost, node: NodeHandle) -> Option<ObjectId> {
        stable_path(host, self, node).map(|path| ObjectId::new_static(&self.seed, &path))
    }

    /// Static id for `node`, bound on first call. Invalid when no stable path exists.
    pub fn create_static(&mut self, host: &dyn GraphHost, node: NodeHandle) -> Result<ObjectId> {
        if let Some(existing) = self.find(node) {
            return Ok(existing);
        }
        match self.peek_static(host, node) {
            Some(id) => {
                self.bind(host, node, id.clone())?;
                Ok(id)
            }
            None => Ok(ObjectId::INVALID),
        }
    }

    /// Random id for `node`, bound on first call
    pub fn create_dynamic(&mut self, host: &dyn GraphHost, node: NodeHandle) -> Result<ObjectId> {
        if let Some(existing) = self.find(node) {
            return Ok(existing);
        }
        let name = host.name(node);
        let id = ObjectId::new_dynamic(name.as_deref());
        self.bind(host, node, id.clone())?;
        Ok(id)
    }

    /// Static when a stable path exists, dynamic otherwise
    pub fn create(&mut self, host: &dyn GraphHost, node: NodeHandle) -> Result<ObjectId> {
        let id = self.create_static(host, node)?;
        if id.is_valid() {
            return Ok(id);
        }
        self.create_dynamic(host, node)
    }

    /// Associate `id` with `node`.
    ///
    /// A GUID held by a different live node is a collision. Entries whose node is dead are
    /// taken over silently.
    pub fn bind(&mut self, host: &dyn GraphHost, node: NodeHandle, id: ObjectId) -> Result<()> {
        if !id.is_valid() {
            return Err(PersistError::InvalidState(format!("cannot bind invalid id to node {}", node)));
        }

        if let Some(existing) = self.by_guid.get(&id.guid()) {
            if existing.node == node {
                return Ok(());
            }
            if host.is_alive(existing.node) {
                return Err(PersistError::IdCollision {
                    guid: id.guid(),
                    existing: describe_node(host, existing.node),
                    incoming: describe_node(host, node),
                });
            }
            event!(
                Level::DEBUG,
                id = %id.describe(),
                stale = %existing.node,
                node = %node,
                "Reusing id of a dead node"
            );
            let stale = existing.node;
            self.by_node.remove(&stale);
        }

        if let Some(previous) = self.by_node.remove(&node) {
            self.by_guid.remove(&previous.guid());
        }

        self.by_node.insert(node, id.clone());
        self.by_guid.insert(id.guid(), Binding { id, node });
        Ok(())
    }

    pub fn unbind(&mut self, node: NodeHandle) -> Option<ObjectId> {
        let id = self.by_node.remove(&node)?;
        if self.by_guid.get(&id.guid()).is_some_and(|b| b.node == node) {
            self.by_guid.remove(&id.guid());
        }
        Some(id)
    }

    /// Drop every entry whose node is gone; returns how many were removed
    pub fn purge_dead(&mut self, host: &dyn GraphHost) -> usize {
        let dead: Vec<NodeHandle> = self
            .by_node
            .keys()
            .copied()
            .filter(|node| !host.is_alive(*node))
            .collect();
        for node in &dead {
            self.unbind(*node);
        }
        dead.len()
    }

    pub fn clear(&mut self) {
        self.by_guid.clear();
        self.by_node.clear();
    }

    /// Every bound id, for diagnostics
    pub fn ids(&self) -> impl Iterator<Item = &ObjectId> {
        self.by_guid.values().map(|b| &b.id)
    }
}

fn describe_node(host: &dyn GraphHost, node: NodeHandle) -> String {
    match host.path_name(node) {
        Some(path) => format!("{} {}", path, node),
        None => node.to_string(),
    }
}

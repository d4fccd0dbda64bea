use super::record::{ComponentState, NodeRecord};
use super::{LoadContext, PersistContext, SaveContext};
use crate::archive::{ReferenceTracker, StateReader, StateWriter};
use crate::core::{NodeHandle, PersistError, Result};
use crate::identity::ObjectId;
use std::collections::BTreeSet;
use std::io::{Read, Seek, Write};
use tracing::{Level, event};

/// Actor record plus its component records, in host order
#[derive(Debug, Clone, Default)]
pub struct ActorState {
    pub record: NodeRecord,
    pub components: Vec<ComponentState>,
}

impl ActorState {
    pub fn new(id: ObjectId) -> Self {
        Self {
            record: NodeRecord::new(id),
            components: Vec::new(),
        }
    }

    pub fn id(&self) -> &ObjectId {
        &self.record.id
    }

    pub fn component(&self, id: &ObjectId) -> Option<&ComponentState> {
        self.components.iter().find(|c| &c.id == id)
    }

    pub fn component_mut(&mut self, id: &ObjectId) -> Option<&mut ComponentState> {
        self.components.iter_mut().find(|c| &c.id == id)
    }

    pub(crate) fn find_or_add_component(&mut self, id: &ObjectId) -> &mut ComponentState {
        match self.components.iter().position(|c| &c.id == id) {
            Some(index) => &mut self.components[index],
            None => {
                self.components.push(ComponentState::new(id.clone()));
                let last = self.components.len() - 1;
                &mut self.components[last]
            }
        }
    }

    pub(crate) fn remove_component(&mut self, id: &ObjectId) {
        self.components.retain(|c| &c.id != id);
    }

    pub fn unlink(&mut self) {
        self.record.unlink();
        for component in &mut self.components {
            component.unlink();
        }
    }

    // ------------------------------------------------------------------
    // link
    // ------------------------------------------------------------------

    /// Link live components to their records and recreate saved dynamic components.
    ///
    /// Components whose static id was destroyed are destroyed again. Unsaved dynamic records
    /// are dropped, as are dynamic records whose class no longer resolves. Nodes spawned
    /// by construction are appended to `spawned`.
    pub fn initialize_components(
        &mut self,
        ctx: &mut PersistContext<'_>,
        destroyed: &BTreeSet<ObjectId>,
        load: &mut LoadContext,
        spawned: &mut Vec<NodeHandle>,
    ) -> Result<()> {
        let actor = self.record.require_node()?;

        for component in ctx.host.components(actor) {
            if !ctx.host.implements_persistence(component) {
                continue;
            }
            let id = ctx.registry.create(&*ctx.host, component)?;
            if id.is_static() && destroyed.contains(&id) {
                event!(Level::DEBUG, component = %id.describe(), "Destroying component removed by an earlier save");
                ctx.host.destroy(component);
                continue;
            }
            let record = self.find_or_add_component(&id);
            if record.node() == Some(component) {
                continue;
            }
            if record.is_linked() {
                return Err(PersistError::InvalidState(format!(
                    "component record {} is linked to another node",
                    id.describe()
                )));
            }
            record.link(&mut *ctx.host, component)?;
        }

        let pending: Vec<ObjectId> = self
            .components
            .iter()
            .filter(|c| !c.is_linked() && c.is_dynamic())
            .map(|c| c.id.clone())
            .collect();
        for id in pending {
            let Some(record) = self.component_mut(&id) else {
                continue;
            };
            if !record.is_saved() {
                self.remove_component(&id);
                continue;
            }
            if !ctx.host.resolve_class(&record.desc.class) {
                event!(
                    Level::WARN,
                    component = %id.describe(),
                    class = %record.desc.class,
                    "Dropping dynamic component whose class no longer resolves"
                );
                load.outdated.insert(id.clone());
                self.remove_component(&id);
                continue;
            }
            record.allocate_dynamic(ctx, actor)?;
            spawned.extend(record.finish_dynamic(ctx)?);
            load.created_components.push(id);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // load
    // ------------------------------------------------------------------

    /// Components load after the actor's default snapshot and before the actor's own data
    pub fn load(&mut self, ctx: &mut PersistContext<'_>) -> Result<()> {
        self.record.capture_default(ctx)?;
        for component in self.components.iter_mut().filter(|c| c.is_linked()) {
            component.load(ctx)?;
        }
        self.record.apply_saved(ctx)?;
        self.record.mark_initialized();
        Ok(())
    }

    // ------------------------------------------------------------------
    // save
    // ------------------------------------------------------------------

    pub fn save(
        &mut self,
        ctx: &mut PersistContext<'_>,
        save: &mut SaveContext,
        dependencies: &mut ReferenceTracker,
    ) -> Result<()> {
        let result = self.save_linked(ctx, save, dependencies);
        if save.from_level_streaming {
            self.unlink();
        }
        result
    }

    fn save_linked(
        &mut self,
        ctx: &mut PersistContext<'_>,
        save: &mut SaveContext,
        dependencies: &mut ReferenceTracker,
    ) -> Result<()> {
        if !self.record.begin_save(ctx)? {
            return Ok(());
        }
        let actor = self.record.require_node()?;

        self.update_components(ctx, actor, save)?;

        if let Some(object) = ctx.host.object_mut(actor) {
            object.pre_save_state();
        }

        let ids: Vec<ObjectId> = self.components.iter().map(|c| c.id.clone()).collect();
        for id in ids {
            let Some(component) = self.component_mut(&id) else {
                continue;
            };
            if component.is_linked() {
                component.save(ctx, save, dependencies)?;
            } else {
                event!(
                    Level::WARN,
                    component = %id.describe(),
                    "Dropping component record with no live node"
                );
                save.outdated.insert(id.clone());
                self.remove_component(&id);
            }
        }

        self.record.capture_state(ctx, dependencies)?;
        if let Some(object) = ctx.host.object_mut(actor) {
            object.post_save_state();
        }
        Ok(())
    }

    /// Reconcile component records with the live component list
    fn update_components(&mut self, ctx: &mut PersistContext<'_>, actor: NodeHandle, save: &mut SaveContext) -> Result<()> {
        let gone: Vec<(ObjectId, bool)> = self
            .components
            .iter()
            .filter(|c| c.node().is_some_and(|n| !ctx.host.is_alive(n)))
            .map(|c| (c.id.clone(), c.is_static()))
            .collect();
        for (id, is_static) in gone {
            if is_static {
                save.destroyed.insert(id.clone());
            }
            self.remove_component(&id);
        }

        for component in ctx.host.components(actor) {
            if !ctx.host.implements_persistence(component) {
                continue;
            }
            let id = ctx.registry.create(&*ctx.host, component)?;
            let record = self.find_or_add_component(&id);
            if record.is_linked() {
                continue;
            }
            record.link(&mut *ctx.host, component)?;
            record.mark_initialized();
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // serialization
    // ------------------------------------------------------------------

    pub fn write<W: Write + Seek>(&self, writer: &mut StateWriter<W>) -> Result<()> {
        self.record.write(writer)?;
        let saved: Vec<&ComponentState> = self.components.iter().filter(|c| c.is_saved()).collect();
        writer.raw().write_varint(saved.len() as u64)?;
        for component in saved {
            component.write(writer)?;
        }
        Ok(())
    }

    pub fn read<R: Read + Seek>(reader: &mut StateReader<R>) -> Result<Self> {
        let record = NodeRecord::read(reader)?;
        let count = reader.raw().read_varint()?;
        if count > reader.raw().remaining()? {
            return Err(PersistError::Decode(format!(
                "actor {} claims {} components beyond end of archive",
                record.id.describe(),
                count
            )));
        }
        let mut actor = Self {
            record,
            components: Vec::with_capacity(count as usize),
        };
        for _ in 0..count {
            let component = ComponentState::read(reader)?;
            if actor.component(&component.id).is_some() {
                return Err(PersistError::Decode(format!(
                    "duplicate component {} in actor {}",
                    component.id.describe(),
                    actor.record.id.describe()
                )));
            }
            actor.components.push(component);
        }
        Ok(actor)
    }
}

use super::descriptor::{DescFlags, ObjectDesc, read_desc, write_desc};
use super::{PersistContext, SaveContext};
use crate::archive::{PropertyDecoder, ReferenceTracker, StateReader, StateWriter};
use crate::core::{CustomState, NodeHandle, PersistError, Result};
use crate::host::{GraphHost, mark_dynamic, mark_static};
use crate::identity::ObjectId;
use std::io::{Read, Seek, Write};

/// State record of one persistable node.
///
/// `node` and `initialized` are transient: a record read from a save starts unlinked and
/// becomes initialized after its first load in the current link cycle.
#[derive(Debug, Clone, Default)]
pub struct NodeRecord {
    pub id: ObjectId,
    pub flags: DescFlags,
    pub desc: ObjectDesc,
    pub custom: Option<CustomState>,
    default_desc: Option<ObjectDesc>,
    node: Option<NodeHandle>,
    initialized: bool,
}

/// Components share the node record contract unchanged
pub type ComponentState = NodeRecord;

impl NodeRecord {
    pub fn new(id: ObjectId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    pub fn node(&self) -> Option<NodeHandle> {
        self.node
    }

    pub fn is_linked(&self) -> bool {
        self.node.is_some()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_saved(&self) -> bool {
        self.flags.saved
    }

    pub fn is_static(&self) -> bool {
        self.id.is_static()
    }

    pub fn is_dynamic(&self) -> bool {
        self.id.is_dynamic()
    }

    pub fn default_desc(&self) -> Option<&ObjectDesc> {
        self.default_desc.as_ref()
    }

    pub(crate) fn require_node(&self) -> Result<NodeHandle> {
        self.node
            .ok_or_else(|| PersistError::RecordNotLinked(self.id.describe()))
    }

    /// Bind a live node and tag it with the record's identity kind
    pub fn link(&mut self, host: &mut dyn GraphHost, node: NodeHandle) -> Result<()> {
        if let Some(existing) = self.node {
            return Err(PersistError::InvalidState(format!(
                "record {} is already linked to {}",
                self.id.describe(),
                existing
            )));
        }
        self.node = Some(node);
        self.initialized = false;
        if self.id.is_static() {
            mark_static(host, node);
        } else {
            mark_dynamic(host, node);
        }
        Ok(())
    }

    /// Forget the live node; saved data and the descriptor are kept
    pub fn unlink(&mut self) {
        self.node = None;
        self.initialized = false;
    }

    /// For nodes picked up at save time that are already in their final state
    pub(crate) fn mark_initialized(&mut self) {
        self.initialized = true;
    }

    pub fn can_create_dynamic(&self) -> bool {
        self.flags.saved && self.is_dynamic() && !self.is_linked()
    }

    // ------------------------------------------------------------------
    // dynamic recreation
    // ------------------------------------------------------------------

    /// First construction phase: allocate the node and bind its id before any
    /// construction code can observe it
    pub(crate) fn allocate_dynamic(&mut self, ctx: &mut PersistContext<'_>, outer: NodeHandle) -> Result<NodeHandle> {
        if !self.can_create_dynamic() {
            return Err(PersistError::InvalidState(format!(
                "record {} cannot be recreated (saved: {}, dynamic: {}, linked: {})",
                self.id.describe(),
                self.flags.saved,
                self.is_dynamic(),
                self.is_linked()
            )));
        }
        let node = ctx.host.allocate(&self.desc.class, &self.desc.name, outer)?;
        if let Err(err) = ctx.registry.bind(&*ctx.host, node, self.id.clone()) {
            ctx.host.destroy(node);
            return Err(err);
        }
        self.link(&mut *ctx.host, node)?;
        Ok(node)
    }

    /// Second construction phase. Returns nodes spawned by construction.
    pub(crate) fn finish_dynamic(&mut self, ctx: &mut PersistContext<'_>) -> Result<Vec<NodeHandle>> {
        let node = self.require_node()?;
        let transform = self.desc.has_transform.then_some(self.desc.transform);
        ctx.host.finish_construction(node, transform)
    }

    // ------------------------------------------------------------------
    // load
    // ------------------------------------------------------------------

    pub fn load(&mut self, ctx: &mut PersistContext<'_>) -> Result<()> {
        self.capture_default(ctx)?;
        self.apply_saved(ctx)?;
        self.initialized = true;
        Ok(())
    }

    /// Snapshot the content state of a static node before any saved data is applied
    pub(crate) fn capture_default(&mut self, ctx: &mut PersistContext<'_>) -> Result<()> {
        let node = self.require_node()?;
        if self.is_static() && self.default_desc.is_none() {
            self.default_desc = Some(ObjectDesc::capture(&*ctx.host, ctx.registry, node, false, None)?);
        }
        Ok(())
    }

    /// Apply saved data in order: owner, attachment, transform, properties, custom state
    pub(crate) fn apply_saved(&mut self, ctx: &mut PersistContext<'_>) -> Result<()> {
        let node = self.require_node()?;
        if !self.flags.saved {
            return Ok(());
        }

        if let Some(object) = ctx.host.object_mut(node) {
            object.pre_load_state();
        }

        if self.flags.has_owner {
            let owner = resolve_node(ctx, &self.desc.owner_id)?;
            ctx.host.set_owner(node, owner);
        }

        if self.flags.has_attachment {
            match resolve_node(ctx, &self.desc.attach_parent_id)? {
                Some(parent) => ctx.host.attach_to(node, parent, &self.desc.attach_socket_name),
                None => ctx.host.detach(node),
            }
        }

        if self.flags.has_transform {
            if self.flags.has_attachment || ctx.host.attach_parent(node).is_some() {
                ctx.host.set_relative_transform(node, self.desc.transform);
            } else {
                ctx.host.set_world_transform(node, self.desc.transform);
            }
        }

        if self.flags.has_property_blob {
            let properties = PropertyDecoder::new(&*ctx.host, ctx.registry).decode(&self.desc.property_bunch)?;
            if let Some(object) = ctx.host.object_mut(node) {
                object.load_properties(properties);
            }
        }

        if let Some(object) = ctx.host.object_mut(node) {
            if let Some(custom) = &self.custom {
                object.load_custom_state(custom);
            }
            object.post_load_state();
        }
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
        let result = self.save_linked(ctx, dependencies);
        self.end_save(save);
        result
    }

    fn save_linked(&mut self, ctx: &mut PersistContext<'_>, dependencies: &mut ReferenceTracker) -> Result<()> {
        if !self.begin_save(ctx)? {
            return Ok(());
        }
        let node = self.require_node()?;
        if let Some(object) = ctx.host.object_mut(node) {
            object.pre_save_state();
        }
        self.capture_state(ctx, dependencies)?;
        if let Some(object) = ctx.host.object_mut(node) {
            object.post_save_state();
        }
        Ok(())
    }

    /// Enforce the monotonic persist flag. Returns whether the record saves this pass.
    pub(crate) fn begin_save(&mut self, ctx: &mut PersistContext<'_>) -> Result<bool> {
        if !self.initialized {
            return Ok(false);
        }
        let node = self.require_node()?;
        let should_save = ctx
            .host
            .object(node)
            .map(|o| o.should_save_state())
            .unwrap_or(false);
        if self.flags.saved && !should_save {
            return Err(PersistError::PersistRegression(self.id.describe()));
        }
        self.flags.saved = self.flags.saved || should_save;
        Ok(self.flags.saved)
    }

    /// Capture descriptor, delta flags and custom state of the linked node
    pub(crate) fn capture_state(&mut self, ctx: &mut PersistContext<'_>, dependencies: &mut ReferenceTracker) -> Result<()> {
        let node = self.require_node()?;
        let desc = ObjectDesc::capture(
            &*ctx.host,
            ctx.registry,
            node,
            ctx.config.sanitize_references,
            Some(&mut *dependencies),
        )?;

        self.flags = if self.is_static() {
            let default = self.default_desc.get_or_insert_with(|| desc.clone());
            DescFlags::for_static(default, &desc)?
        } else {
            dependencies.track(&desc.class);
            DescFlags::for_dynamic(&desc)
        };
        self.desc = desc;
        self.custom = ctx
            .host
            .object(node)
            .and_then(|o| o.save_custom_state())
            .filter(CustomState::is_valid);
        Ok(())
    }

    pub(crate) fn end_save(&mut self, save: &SaveContext) {
        if save.from_level_streaming {
            self.unlink();
        }
    }

    // ------------------------------------------------------------------
    // serialization
    // ------------------------------------------------------------------

    pub fn write<W: Write + Seek>(&self, writer: &mut StateWriter<W>) -> Result<()> {
        writer.write_object_id(&self.id)?;
        writer.raw().write_u8(self.flags.to_byte())?;
        if !self.flags.saved {
            return Ok(());
        }
        write_desc(writer, &self.desc, self.flags, self.is_dynamic())?;
        match &self.custom {
            Some(custom) => {
                writer.write_name(&custom.type_tag)?;
                writer.raw().write_bytes(&custom.bytes)?;
            }
            None => writer.write_name("")?,
        }
        Ok(())
    }

    pub fn read<R: Read + Seek>(reader: &mut StateReader<R>) -> Result<Self> {
        let id = reader.read_object_id()?;
        if !id.is_valid() {
            return Err(PersistError::Decode("state record without a valid id".to_string()));
        }
        let flags = DescFlags::from_byte(reader.raw().read_u8()?)?;
        let mut record = Self::new(id);
        record.flags = flags;
        if !flags.saved {
            return Ok(record);
        }
        record.desc = read_desc(reader, flags, record.is_dynamic())?;
        let type_tag = reader.read_name()?;
        if !type_tag.is_empty() {
            let bytes = reader.raw().read_bytes()?;
            record.custom = Some(CustomState::new(type_tag, bytes));
        }
        Ok(record)
    }
}

/// Resolve a saved node reference against the live graph
pub(crate) fn resolve_node(ctx: &PersistContext<'_>, id: &ObjectId) -> Result<Option<NodeHandle>> {
    if !id.is_valid() {
        return Ok(None);
    }
    ctx.registry
        .resolve(&*ctx.host, id)
        .map(Some)
        .ok_or_else(|| PersistError::UnresolvedReference(id.describe()))
}

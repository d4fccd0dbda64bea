use crate::archive::{ObjectRef, PropertyEncoder, ReferenceTracker, StateReader, StateWriter};
use crate::core::{AssetPath, NodeHandle, PersistError, Result, TRANSFORM_TOLERANCE, Transform};
use crate::host::GraphHost;
use crate::identity::{IdentityRegistry, ObjectId};
use std::io::{Read, Seek, Write};

/// Scene-level snapshot of one node
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectDesc {
    pub name: String,
    pub class: AssetPath,
    pub owner_id: ObjectId,
    pub has_transform: bool,
    pub transform: Transform,
    pub attach_parent_id: ObjectId,
    pub attach_socket_name: String,
    pub property_bunch: Vec<u8>,
}

impl ObjectDesc {
    /// Read the current state of `node`. Asset references in its properties are added to
    /// `dependencies` when given.
    pub fn capture(
        host: &dyn GraphHost,
        registry: &IdentityRegistry,
        node: NodeHandle,
        sanitize: bool,
        dependencies: Option<&mut ReferenceTracker>,
    ) -> Result<Self> {
        let find = |n: Option<NodeHandle>| n.and_then(|n| registry.find(n)).unwrap_or_default();

        let properties = host
            .object(node)
            .map(|o| o.save_properties())
            .unwrap_or_default();
        let mut encoder = PropertyEncoder::new(host, registry).sanitize_from(sanitize.then_some(node));
        if let Some(tracker) = dependencies {
            encoder = encoder.track_dependencies(tracker);
        }
        let property_bunch = encoder.encode(&properties)?;

        let has_transform = host.has_transform(node);
        Ok(Self {
            name: host.name(node).unwrap_or_default(),
            class: host.class(node).unwrap_or_default(),
            owner_id: find(host.owner(node)),
            has_transform,
            transform: if has_transform {
                host.transform(node)
            } else {
                Transform::IDENTITY
            },
            attach_parent_id: find(host.attach_parent(node)),
            attach_socket_name: host.attach_socket(node),
            property_bunch,
        })
    }
}

// ============================================================================
// Flags
// ============================================================================

const SAVED: u8 = 1 << 0;
const HAS_OWNER: u8 = 1 << 1;
const HAS_TRANSFORM: u8 = 1 << 2;
const HAS_ATTACHMENT: u8 = 1 << 3;
const HAS_PROPERTY_BLOB: u8 = 1 << 4;

/// Persisted record flags. `saved` never goes back to false.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DescFlags {
    pub saved: bool,
    pub has_owner: bool,
    pub has_transform: bool,
    pub has_attachment: bool,
    pub has_property_blob: bool,
}

impl DescFlags {
    /// Delta flags of a static node against the snapshot taken when it was first loaded
    pub fn for_static(default: &ObjectDesc, current: &ObjectDesc) -> Result<Self> {
        if default.name != current.name || default.class != current.class {
            return Err(PersistError::InvalidState(format!(
                "static node changed identity from {} ({}) to {} ({})",
                default.name, default.class, current.name, current.class
            )));
        }
        if default.has_transform != current.has_transform {
            return Err(PersistError::InvalidState(format!(
                "static node {} changed whether it has a transform",
                current.name
            )));
        }

        let has_attachment = default.attach_parent_id != current.attach_parent_id
            || default.attach_socket_name != current.attach_socket_name;
        Ok(Self {
            saved: true,
            has_owner: default.owner_id != current.owner_id,
            has_attachment,
            has_transform: has_attachment
                || (current.has_transform
                    && !current.transform.nearly_equals(&default.transform, TRANSFORM_TOLERANCE)),
            has_property_blob: default.property_bunch != current.property_bunch,
        })
    }

    /// A dynamic node is recreated from its record, so everything it has is written
    pub fn for_dynamic(current: &ObjectDesc) -> Self {
        Self {
            saved: true,
            has_owner: current.owner_id.is_valid(),
            has_transform: current.has_transform,
            has_attachment: current.attach_parent_id.is_valid(),
            has_property_blob: !current.property_bunch.is_empty(),
        }
    }

    pub fn to_byte(self) -> u8 {
        let mut byte = 0;
        for (set, bit) in [
            (self.saved, SAVED),
            (self.has_owner, HAS_OWNER),
            (self.has_transform, HAS_TRANSFORM),
            (self.has_attachment, HAS_ATTACHMENT),
            (self.has_property_blob, HAS_PROPERTY_BLOB),
        ] {
            if set {
                byte |= bit;
            }
        }
        byte
    }

    pub fn from_byte(byte: u8) -> Result<Self> {
        let known = SAVED | HAS_OWNER | HAS_TRANSFORM | HAS_ATTACHMENT | HAS_PROPERTY_BLOB;
        if byte & !known != 0 {
            return Err(PersistError::Decode(format!("unknown record flags {:#04x}", byte)));
        }
        Ok(Self {
            saved: byte & SAVED != 0,
            has_owner: byte & HAS_OWNER != 0,
            has_transform: byte & HAS_TRANSFORM != 0,
            has_attachment: byte & HAS_ATTACHMENT != 0,
            has_property_blob: byte & HAS_PROPERTY_BLOB != 0,
        })
    }
}

// ============================================================================
// Delta serialization
// ============================================================================

/// Write the fields selected by `flags`. Dynamic records also carry name and class.
pub(crate) fn write_desc<W: Write + Seek>(
    writer: &mut StateWriter<W>,
    desc: &ObjectDesc,
    flags: DescFlags,
    dynamic: bool,
) -> Result<()> {
    if dynamic {
        writer.write_name(&desc.name)?;
        writer.write_soft_ref(Some(&desc.class))?;
    }
    if flags.has_owner {
        writer.write_ref(&ObjectRef::node(desc.owner_id.clone()))?;
    }
    if flags.has_transform {
        for component in desc.transform.components() {
            writer.raw().write_f64(component)?;
        }
    }
    if flags.has_attachment {
        writer.write_ref(&ObjectRef::node(desc.attach_parent_id.clone()))?;
        writer.write_name(&desc.attach_socket_name)?;
    }
    if flags.has_property_blob {
        writer.raw().write_bytes(&desc.property_bunch)?;
    }
    Ok(())
}

pub(crate) fn read_desc<R: Read + Seek>(
    reader: &mut StateReader<R>,
    flags: DescFlags,
    dynamic: bool,
) -> Result<ObjectDesc> {
    let mut desc = ObjectDesc::default();
    if dynamic {
        desc.name = reader.read_name()?;
        desc.class = reader.read_soft_ref()?.unwrap_or_default();
    }
    if flags.has_owner {
        desc.owner_id = read_node_id(reader)?;
    }
    if flags.has_transform {
        desc.has_transform = true;
        let mut components = [0.0; 10];
        for component in components.iter_mut() {
            *component = reader.raw().read_f64()?;
        }
        desc.transform = Transform::from_components(components);
    }
    if flags.has_attachment {
        desc.attach_parent_id = read_node_id(reader)?;
        desc.attach_socket_name = reader.read_name()?;
    }
    if flags.has_property_blob {
        desc.property_bunch = reader.raw().read_bytes()?;
    }
    Ok(desc)
}

fn read_node_id<R: Read + Seek>(reader: &mut StateReader<R>) -> Result<ObjectId> {
    match reader.read_ref()? {
        ObjectRef::Node(id) => Ok(id),
        ObjectRef::None => Ok(ObjectId::INVALID),
        ObjectRef::Asset(path) => Err(PersistError::Decode(format!(
            "expected a node reference, found asset {}",
            path
        ))),
    }
}

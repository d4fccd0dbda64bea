//! Property blob codec.
//!
//! A blob is self-contained: names and asset paths are inline strings so it can be kept
//! unchanged across saves. Node references are written as object ids and resolved through
//! the identity registry on load.

use super::raw::{ArchiveReader, ArchiveWriter};
use super::references::ReferenceTracker;
use crate::core::{AssetPath, NodeHandle, PersistError, Result};
use crate::host::{GraphHost, Property, PropertyBag, PropertyValue};
use crate::identity::{IdentityRegistry, ObjectId};
use std::io::{Read, Seek, Write};
use tracing::{Level, event};

const TAG_BOOL: u8 = 0;
const TAG_INT: u8 = 1;
const TAG_FLOAT: u8 = 2;
const TAG_STR: u8 = 3;
const TAG_NAME: u8 = 4;
const TAG_BYTES: u8 = 5;
const TAG_OBJECT: u8 = 6;
const TAG_ASSET: u8 = 7;
const TAG_SOFT_ASSET: u8 = 8;
const TAG_ARRAY: u8 = 9;
const TAG_STRUCT: u8 = 10;

const REF_VALID: u8 = 1 << 0;
const REF_USE_ID: u8 = 1 << 1;

const MAX_NESTING: usize = 32;

// ============================================================================
// Encoding
// ============================================================================

pub struct PropertyEncoder<'a> {
    host: &'a dyn GraphHost,
    registry: &'a IdentityRegistry,
    dependencies: Option<&'a mut ReferenceTracker>,
    /// Node that owns the blob, when reference sanitizing is on
    sanitize_from: Option<NodeHandle>,
}

impl<'a> PropertyEncoder<'a> {
    pub fn new(host: &'a dyn GraphHost, registry: &'a IdentityRegistry) -> Self {
        Self {
            host,
            registry,
            dependencies: None,
            sanitize_from: None,
        }
    }

    /// Record every hard asset reference as a dependency
    pub fn track_dependencies(mut self, tracker: &'a mut ReferenceTracker) -> Self {
        self.dependencies = Some(tracker);
        self
    }

    pub fn sanitize_from(mut self, source: Option<NodeHandle>) -> Self {
        self.sanitize_from = source;
        self
    }

    pub fn encode(&mut self, bag: &PropertyBag) -> Result<Vec<u8>> {
        if bag.is_empty() {
            return Ok(Vec::new());
        }
        let mut writer = ArchiveWriter::in_memory();
        self.write_bag(&mut writer, bag, 0)?;
        Ok(writer.into_bytes())
    }

    fn write_bag<W: Write + Seek>(&mut self, w: &mut ArchiveWriter<W>, bag: &PropertyBag, depth: usize) -> Result<()> {
        w.write_varint(bag.len() as u64)?;
        for property in bag.iter() {
            w.write_string(&property.name)?;
            self.write_value(w, &property.value, depth)?;
        }
        Ok(())
    }

    fn write_value<W: Write + Seek>(&mut self, w: &mut ArchiveWriter<W>, value: &PropertyValue, depth: usize) -> Result<()> {
        if depth > MAX_NESTING {
            return Err(PersistError::Serialization(format!(
                "property nesting deeper than {}",
                MAX_NESTING
            )));
        }
        match value {
            PropertyValue::Bool(v) => {
                w.write_u8(TAG_BOOL)?;
                w.write_bool(*v)
            }
            PropertyValue::Int(v) => {
                w.write_u8(TAG_INT)?;
                w.write_i64(*v)
            }
            PropertyValue::Float(v) => {
                w.write_u8(TAG_FLOAT)?;
                w.write_f64(*v)
            }
            PropertyValue::Str(v) => {
                w.write_u8(TAG_STR)?;
                w.write_string(v)
            }
            PropertyValue::Name(v) => {
                w.write_u8(TAG_NAME)?;
                w.write_string(v)
            }
            PropertyValue::Bytes(v) => {
                w.write_u8(TAG_BYTES)?;
                w.write_bytes(v)
            }
            PropertyValue::Object(node) => {
                w.write_u8(TAG_OBJECT)?;
                self.write_node_ref(w, *node)
            }
            PropertyValue::Asset(path) => {
                w.write_u8(TAG_ASSET)?;
                match path.as_ref().filter(|p| !p.is_empty()) {
                    Some(path) => {
                        if let Some(tracker) = self.dependencies.as_deref_mut() {
                            tracker.track(path);
                        }
                        w.write_bool(true)?;
                        w.write_string(path.as_str())
                    }
                    None => w.write_bool(false),
                }
            }
            PropertyValue::SoftAsset(path) => {
                w.write_u8(TAG_SOFT_ASSET)?;
                w.write_string(path.as_str())
            }
            PropertyValue::Array(items) => {
                w.write_u8(TAG_ARRAY)?;
                w.write_varint(items.len() as u64)?;
                for item in items {
                    self.write_value(w, item, depth + 1)?;
                }
                Ok(())
            }
            PropertyValue::Struct(bag) => {
                w.write_u8(TAG_STRUCT)?;
                self.write_bag(w, bag, depth + 1)
            }
        }
    }

    fn write_node_ref<W: Write + Seek>(&mut self, w: &mut ArchiveWriter<W>, node: Option<NodeHandle>) -> Result<()> {
        let Some(node) = node.filter(|n| self.host.is_alive(*n)) else {
            return w.write_u8(0);
        };

        if self.host.is_top_level_asset(node) {
            if let Some(path) = self.host.path_name(node) {
                w.write_u8(REF_VALID)?;
                return w.write_string(&path);
            }
        }

        if self.sanitize_from.is_some() {
            self.sanitize(node);
        }

        match self.registry.find(node) {
            Some(id) => {
                w.write_u8(REF_VALID | REF_USE_ID)?;
                id.write(w, false)
            }
            None => w.write_u8(0),
        }
    }

    /// Warn about references that will not survive a reload
    fn sanitize(&self, target: NodeHandle) {
        let Some(source) = self.sanitize_from else {
            return;
        };
        if self.registry.find(target).is_none() {
            event!(
                Level::WARN,
                source = %source,
                target = %target,
                "Saved reference to a node without an object id, it will load as null"
            );
            return;
        }
        let source_level = self.host.level_of(source);
        let target_level = self.host.level_of(target);
        match (source_level, target_level) {
            (None, Some(_)) => {
                event!(
                    Level::WARN,
                    source = %source,
                    target = %target,
                    "Saved reference from a non-level node into a level"
                );
            }
            (Some(from), Some(to)) if from != to && !self.host.is_persistent_level(to) => {
                event!(
                    Level::WARN,
                    source = %source,
                    target = %target,
                    "Saved reference into a different streaming level"
                );
            }
            _ => {}
        }
    }
}

// ============================================================================
// Decoding
// ============================================================================

pub struct PropertyDecoder<'a> {
    host: &'a dyn GraphHost,
    registry: &'a IdentityRegistry,
}

impl<'a> PropertyDecoder<'a> {
    pub fn new(host: &'a dyn GraphHost, registry: &'a IdentityRegistry) -> Self {
        Self { host, registry }
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<PropertyBag> {
        if bytes.is_empty() {
            return Ok(PropertyBag::default());
        }
        let mut reader = ArchiveReader::from_slice(bytes);
        let bag = self.read_bag(&mut reader, 0)?;
        if reader.remaining()? != 0 {
            return Err(PersistError::Decode("trailing bytes after property blob".to_string()));
        }
        Ok(bag)
    }

    fn read_bag<R: Read + Seek>(&self, r: &mut ArchiveReader<R>, depth: usize) -> Result<PropertyBag> {
        let count = r.read_varint()?;
        if count > r.remaining()? {
            return Err(PersistError::Decode(format!("property count {} exceeds blob", count)));
        }
        let mut bag = PropertyBag::default();
        for _ in 0..count {
            let name = r.read_string()?;
            let value = self.read_value(r, depth)?;
            bag.push(Property { name, value });
        }
        Ok(bag)
    }

    fn read_value<R: Read + Seek>(&self, r: &mut ArchiveReader<R>, depth: usize) -> Result<PropertyValue> {
        if depth > MAX_NESTING {
            return Err(PersistError::Decode(format!("property nesting deeper than {}", MAX_NESTING)));
        }
        let tag = r.read_u8()?;
        let value = match tag {
            TAG_BOOL => PropertyValue::Bool(r.read_bool()?),
            TAG_INT => PropertyValue::Int(r.read_i64()?),
            TAG_FLOAT => PropertyValue::Float(r.read_f64()?),
            TAG_STR => PropertyValue::Str(r.read_string()?),
            TAG_NAME => PropertyValue::Name(r.read_string()?),
            TAG_BYTES => PropertyValue::Bytes(r.read_bytes()?),
            TAG_OBJECT => PropertyValue::Object(self.read_node_ref(r)?),
            TAG_ASSET => {
                if r.read_bool()? {
                    PropertyValue::Asset(Some(AssetPath::new(r.read_string()?)))
                } else {
                    PropertyValue::Asset(None)
                }
            }
            TAG_SOFT_ASSET => PropertyValue::SoftAsset(AssetPath::new(r.read_string()?)),
            TAG_ARRAY => {
                let len = r.read_varint()?;
                if len > r.remaining()? {
                    return Err(PersistError::Decode(format!("array length {} exceeds blob", len)));
                }
                let mut items = Vec::with_capacity(len as usize);
                for _ in 0..len {
                    items.push(self.read_value(r, depth + 1)?);
                }
                PropertyValue::Array(items)
            }
            TAG_STRUCT => PropertyValue::Struct(self.read_bag(r, depth + 1)?),
            other => {
                return Err(PersistError::Decode(format!("unknown property tag {}", other)));
            }
        };
        Ok(value)
    }

    fn read_node_ref<R: Read + Seek>(&self, r: &mut ArchiveReader<R>) -> Result<Option<NodeHandle>> {
        let flags = r.read_u8()?;
        if flags & REF_VALID == 0 {
            return Ok(None);
        }
        if flags & REF_USE_ID != 0 {
            let id = ObjectId::read(r)?;
            if !id.is_valid() {
                return Ok(None);
            }
            return self
                .registry
                .resolve(self.host, &id)
                .map(Some)
                .ok_or_else(|| PersistError::UnresolvedReference(id.describe()));
        }
        let path = AssetPath::new(r.read_string()?);
        self.host
            .find_asset(&path)
            .map(Some)
            .ok_or_else(|| PersistError::UnresolvedReference(path.to_string()))
    }
}

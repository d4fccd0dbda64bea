use super::StateManager;
use crate::archive::{PropertyDecoder, PropertyEncoder, StateReader, StateWriter};
use crate::core::{CustomState, ManagerScope, PersistError, Result};
use crate::identity::ObjectId;
use crate::state::PersistContext;
use async_trait::async_trait;
use std::any::Any;
use std::collections::BTreeMap;
use std::io::Cursor;
use tracing::{Level, event};

pub const WORLD_SUBSYSTEMS_TAG: &str = "WorldSubsystems";
pub const GAME_SUBSYSTEMS_TAG: &str = "GameSubsystems";
pub const PROFILE_SUBSYSTEMS_TAG: &str = "ProfileSubsystems";

/// Saved state of one host subsystem
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubsystemRecord {
    pub id: ObjectId,
    pub saved: bool,
    pub property_bunch: Vec<u8>,
    pub custom: Option<CustomState>,
}

/// Subsystem records of one scope. World, game and profile instances differ only by scope.
#[derive(Debug)]
pub struct SubsystemsManager {
    scope: ManagerScope,
    records: BTreeMap<ObjectId, SubsystemRecord>,
}

impl SubsystemsManager {
    pub fn new(scope: ManagerScope) -> Self {
        Self {
            scope,
            records: BTreeMap::new(),
        }
    }

    pub fn record(&self, id: &ObjectId) -> Option<&SubsystemRecord> {
        self.records.get(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait(?Send)]
impl StateManager for SubsystemsManager {
    fn type_tag(&self) -> &str {
        match self.scope {
            ManagerScope::World => WORLD_SUBSYSTEMS_TAG,
            ManagerScope::Game => GAME_SUBSYSTEMS_TAG,
            ManagerScope::Profile => PROFILE_SUBSYSTEMS_TAG,
        }
    }

    fn scope(&self) -> ManagerScope {
        self.scope
    }

    fn save_state(&mut self, ctx: &mut PersistContext<'_>) -> Result<()> {
        for node in ctx.host.subsystems(self.scope) {
            if !ctx.host.implements_persistence(node) {
                continue;
            }
            let id = ctx.registry.create_static(&*ctx.host, node)?;
            if !id.is_static() {
                return Err(PersistError::Config(format!(
                    "subsystem {} has no stable path",
                    ctx.host.name(node).unwrap_or_default()
                )));
            }

            let should_save = ctx.host.object(node).is_some_and(|o| o.should_save_state());
            let record = self.records.entry(id.clone()).or_insert_with(|| SubsystemRecord {
                id: id.clone(),
                ..SubsystemRecord::default()
            });
            if record.saved && !should_save {
                return Err(PersistError::PersistRegression(id.describe()));
            }
            if !should_save {
                continue;
            }
            record.saved = true;

            if let Some(object) = ctx.host.object_mut(node) {
                object.pre_save_state();
            }
            let (properties, custom) = match ctx.host.object(node) {
                Some(object) => (object.save_properties(), object.save_custom_state()),
                None => continue,
            };
            record.property_bunch = PropertyEncoder::new(&*ctx.host, &*ctx.registry)
                .sanitize_from(ctx.config.sanitize_references.then_some(node))
                .encode(&properties)?;
            record.custom = custom.filter(CustomState::is_valid);
            if let Some(object) = ctx.host.object_mut(node) {
                object.post_save_state();
            }
        }
        Ok(())
    }

    fn write_chunk(&self, writer: &mut StateWriter) -> Result<()> {
        let saved: Vec<&SubsystemRecord> = self.records.values().filter(|r| r.saved).collect();
        writer.raw().write_varint(saved.len() as u64)?;
        for record in saved {
            writer.write_object_id(&record.id)?;
            writer.raw().write_bytes(&record.property_bunch)?;
            match &record.custom {
                Some(custom) => {
                    writer.write_name(&custom.type_tag)?;
                    writer.raw().write_bytes(&custom.bytes)?;
                }
                None => writer.write_name("")?,
            }
        }
        Ok(())
    }

    fn read_chunk(&mut self, reader: &mut StateReader<Cursor<&[u8]>>) -> Result<()> {
        self.records.clear();
        let count = reader.raw().read_varint()?;
        for _ in 0..count {
            let id = reader.read_object_id()?;
            if !id.is_static() {
                return Err(PersistError::Decode(format!("subsystem record {} is not static", id.describe())));
            }
            let property_bunch = reader.raw().read_bytes()?;
            let type_tag = reader.read_name()?;
            let custom = if type_tag.is_empty() {
                None
            } else {
                Some(CustomState::new(type_tag, reader.raw().read_bytes()?))
            };
            self.records.insert(
                id.clone(),
                SubsystemRecord {
                    id,
                    saved: true,
                    property_bunch,
                    custom,
                },
            );
        }
        Ok(())
    }

    async fn load_state(&mut self, ctx: &mut PersistContext<'_>) -> Result<()> {
        for node in ctx.host.subsystems(self.scope) {
            if ctx.host.implements_persistence(node) {
                ctx.registry.create_static(&*ctx.host, node)?;
            }
        }

        let ids: Vec<ObjectId> = self.records.keys().cloned().collect();
        for id in ids {
            let Some(node) = ctx.registry.resolve(&*ctx.host, &id) else {
                event!(Level::ERROR, subsystem = %id.describe(), "Saved subsystem no longer exists, dropping its state");
                self.records.remove(&id);
                continue;
            };
            let Some(record) = self.records.get(&id) else {
                continue;
            };
            if !record.saved {
                continue;
            }
            let properties = PropertyDecoder::new(&*ctx.host, &*ctx.registry).decode(&record.property_bunch)?;
            if let Some(object) = ctx.host.object_mut(node) {
                object.pre_load_state();
                object.load_properties(properties);
                if let Some(custom) = &record.custom {
                    object.load_custom_state(custom);
                }
                object.post_load_state();
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.records.clear();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

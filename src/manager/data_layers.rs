use super::StateManager;
use crate::archive::{StateReader, StateWriter};
use crate::core::{AssetPath, DataLayerState, ManagerScope, PersistError, Result};
use crate::state::PersistContext;
use async_trait::async_trait;
use std::any::Any;
use std::collections::BTreeMap;
use std::io::Cursor;
use tracing::{Level, event};

pub const DATA_LAYERS_TAG: &str = "DataLayers";

/// Runtime states of the world's data layers.
///
/// Only layers whose state differs from their initial state are recorded.
#[derive(Debug, Default)]
pub struct DataLayersManager {
    records: BTreeMap<AssetPath, DataLayerState>,
}

impl DataLayersManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, asset: &AssetPath) -> Option<DataLayerState> {
        self.records.get(asset).copied()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait(?Send)]
impl StateManager for DataLayersManager {
    fn type_tag(&self) -> &str {
        DATA_LAYERS_TAG
    }

    fn scope(&self) -> ManagerScope {
        ManagerScope::World
    }

    fn save_state(&mut self, ctx: &mut PersistContext<'_>) -> Result<()> {
        let Some(world) = ctx.host.world() else {
            return Ok(());
        };
        self.records = ctx
            .host
            .data_layers(world)
            .into_iter()
            .filter(|layer| layer.current_state != layer.initial_state)
            .map(|layer| (layer.asset, layer.current_state))
            .collect();
        Ok(())
    }

    fn write_chunk(&self, writer: &mut StateWriter) -> Result<()> {
        writer.raw().write_varint(self.records.len() as u64)?;
        for (asset, state) in &self.records {
            writer.write_soft_ref(Some(asset))?;
            writer.raw().write_u8(state.to_u8())?;
        }
        Ok(())
    }

    fn read_chunk(&mut self, reader: &mut StateReader<Cursor<&[u8]>>) -> Result<()> {
        self.records.clear();
        let count = reader.raw().read_varint()?;
        for _ in 0..count {
            let asset = reader
                .read_soft_ref()?
                .ok_or_else(|| PersistError::Decode("data layer record without an asset".to_string()))?;
            let raw = reader.raw().read_u8()?;
            let state = DataLayerState::from_u8(raw)
                .ok_or_else(|| PersistError::Decode(format!("unknown data layer state {}", raw)))?;
            self.records.insert(asset, state);
        }
        Ok(())
    }

    async fn load_state(&mut self, ctx: &mut PersistContext<'_>) -> Result<()> {
        let Some(world) = ctx.host.world() else {
            return Ok(());
        };
        let layers = ctx.host.data_layers(world);
        let mut missing = Vec::new();
        for (asset, state) in &self.records {
            if layers.iter().any(|layer| &layer.asset == asset) {
                ctx.host.set_data_layer_state(world, asset, *state);
            } else {
                event!(Level::WARN, layer = %asset, "Saved data layer no longer exists");
                missing.push(asset.clone());
            }
        }
        for asset in missing {
            self.records.remove(&asset);
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

//! State managers: each owns one kind of record and contributes one chunk to a saved state.

pub mod assets;
pub mod data_layers;
pub mod level_actors;
pub mod subsystems;

use crate::archive::{StateReader, StateWriter};
use crate::core::{ManagerScope, Result};
use crate::state::PersistContext;
use async_trait::async_trait;
use std::any::Any;
use std::io::Cursor;

pub use assets::{AssetLoader, GateStatus, InMemoryAssetLoader};
pub use data_layers::DataLayersManager;
pub use level_actors::{LevelActorsManager, LevelActorsStats, LevelLoadStatus};
pub use subsystems::SubsystemsManager;

/// A manager captures live state into records on save, serializes them into its chunk,
/// and applies them back to the live graph on load.
///
/// Managers are matched to chunks by [`StateManager::type_tag`], never by position.
#[async_trait(?Send)]
pub trait StateManager {
    fn type_tag(&self) -> &str;

    fn scope(&self) -> ManagerScope;

    /// Capture the live graph into records
    fn save_state(&mut self, ctx: &mut PersistContext<'_>) -> Result<()>;

    fn write_chunk(&self, writer: &mut StateWriter) -> Result<()>;

    /// Replace all records with the chunk contents
    fn read_chunk(&mut self, reader: &mut StateReader<Cursor<&[u8]>>) -> Result<()>;

    /// Apply records to the live graph
    async fn load_state(&mut self, ctx: &mut PersistContext<'_>) -> Result<()>;

    /// Drop every record, e.g. before starting a new game
    fn reset(&mut self);

    fn pre_load_state(&mut self) {}

    fn post_load_state(&mut self) {}

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

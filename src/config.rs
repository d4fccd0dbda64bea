use crate::core::{PersistError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Namespace used for deterministic static ids when no seed is configured.
pub const DEFAULT_GUID_SEED: Uuid = Uuid::from_u128(0x6c5e_93a1_2f4d_4b7e_a0c3_58d1_e2f9_0b47);

/// How slot files reach the disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DurabilityMode {
    /// fsync every slot write
    Sync,
    /// rely on the OS to flush
    #[default]
    Async,
    /// keep slots in memory only
    None,
}

/// Persistence configuration
///
/// Built with chained setters or read from JSON:
///
/// ```
/// use worldpersist::PersistConfig;
///
/// let config = PersistConfig::new()
///     .save_directory("saves")
///     .force_sync_io(true);
/// assert!(config.force_sync_io);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistConfig {
    /// Master switch; a disabled session reports success without doing work
    pub enabled: bool,

    /// Namespace for deterministic static ids
    pub guid_seed: Uuid,

    /// Run slot I/O on the calling task instead of a blocking worker
    pub force_sync_io: bool,

    /// Log references that will not survive a reload
    pub sanitize_references: bool,

    /// Package prefixes removed from stable paths
    pub strip_path_prefixes: Vec<String>,

    /// Play-session prefix removed from path segments, followed by a session number and `_`
    pub play_session_prefix: Option<String>,

    /// Directory holding slot files
    pub save_directory: PathBuf,

    /// Slot file extension, without the dot
    pub slot_extension: String,

    pub can_create_world_state: bool,
    pub can_create_game_state: bool,
    pub can_create_profile_state: bool,

    pub durability: DurabilityMode,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            guid_seed: DEFAULT_GUID_SEED,
            force_sync_io: false,
            sanitize_references: true,
            strip_path_prefixes: vec!["/Memory".to_string(), "/Temp".to_string()],
            play_session_prefix: Some("PIE_".to_string()),
            save_directory: PathBuf::from("SaveGames"),
            slot_extension: "sav".to_string(),
            can_create_world_state: true,
            can_create_game_state: true,
            can_create_profile_state: true,
            durability: DurabilityMode::default(),
        }
    }
}

impl PersistConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn guid_seed(mut self, seed: Uuid) -> Self {
        self.guid_seed = seed;
        self
    }

    pub fn force_sync_io(mut self, force: bool) -> Self {
        self.force_sync_io = force;
        self
    }

    pub fn sanitize_references(mut self, sanitize: bool) -> Self {
        self.sanitize_references = sanitize;
        self
    }

    pub fn strip_path_prefix(mut self, prefix: &str) -> Self {
        self.strip_path_prefixes.push(prefix.to_string());
        self
    }

    pub fn play_session_prefix(mut self, prefix: Option<&str>) -> Self {
        self.play_session_prefix = prefix.map(str::to_string);
        self
    }

    pub fn save_directory(mut self, dir: impl AsRef<Path>) -> Self {
        self.save_directory = dir.as_ref().to_path_buf();
        self
    }

    pub fn slot_extension(mut self, extension: &str) -> Self {
        self.slot_extension = extension.trim_start_matches('.').to_string();
        self
    }

    pub fn durability(mut self, mode: DurabilityMode) -> Self {
        self.durability = mode;
        self
    }

    pub fn world_state(mut self, enabled: bool) -> Self {
        self.can_create_world_state = enabled;
        self
    }

    pub fn game_state(mut self, enabled: bool) -> Self {
        self.can_create_game_state = enabled;
        self
    }

    pub fn profile_state(mut self, enabled: bool) -> Self {
        self.can_create_profile_state = enabled;
        self
    }

    /// Parse from a JSON document; missing fields keep their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: PersistConfig = serde_json::from_str(json)
            .map_err(|e| PersistError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            PersistError::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.guid_seed.is_nil() {
            return Err(PersistError::Config("guid_seed must not be nil".to_string()));
        }
        if self.slot_extension.is_empty() {
            return Err(PersistError::Config("slot_extension must not be empty".to_string()));
        }
        if self.strip_path_prefixes.iter().any(|p| p.is_empty()) {
            return Err(PersistError::Config("strip_path_prefixes must not contain empty entries".to_string()));
        }
        Ok(())
    }

    /// Full path of a slot file
    pub fn slot_file_path(&self, slot_name: &str) -> PathBuf {
        self.save_directory
            .join(format!("{}.{}", slot_name, self.slot_extension))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = PersistConfig::new()
            .force_sync_io(true)
            .slot_extension(".save")
            .durability(DurabilityMode::Sync)
            .game_state(false);

        assert!(config.force_sync_io);
        assert_eq!(config.slot_extension, "save");
        assert_eq!(config.durability, DurabilityMode::Sync);
        assert!(!config.can_create_game_state);
        assert!(config.can_create_world_state);
    }

    #[test]
    fn test_from_json_keeps_defaults() {
        let config = PersistConfig::from_json_str(r#"{ "force_sync_io": true, "slot_extension": "bin" }"#).unwrap();
        assert!(config.force_sync_io);
        assert_eq!(config.slot_extension, "bin");
        assert_eq!(config.guid_seed, DEFAULT_GUID_SEED);
        assert!(config.enabled);
    }

    #[test]
    fn test_invalid_json_config() {
        assert!(matches!(
            PersistConfig::from_json_str("{ not json"),
            Err(PersistError::Config(_))
        ));
        assert!(PersistConfig::from_json_str(r#"{ "slot_extension": "" }"#).is_err());
    }

    #[test]
    fn test_slot_file_path() {
        let config = PersistConfig::new().save_directory("/tmp/saves");
        assert_eq!(config.slot_file_path("Slot1"), PathBuf::from("/tmp/saves/Slot1.sav"));
    }
}

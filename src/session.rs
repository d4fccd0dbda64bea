//! Orchestration: owns the registry, the managers and the slot storage, and turns
//! save/load requests into state blobs and slot files.

use crate::config::PersistConfig;
use crate::core::{ManagerScope, NodeHandle, PersistError, Result};
use crate::host::GraphHost;
use crate::identity::IdentityRegistry;
use crate::manager::{
    AssetLoader, DataLayersManager, LevelActorsManager, LevelLoadStatus, StateManager, SubsystemsManager,
};
use crate::slot::SlotData;
use crate::state::PersistContext;
use crate::storage::SlotStorage;
use crate::world::{GAME_HEADER_TAG, LoadReport, WORLD_HEADER_TAG, load_world, save_world};
use chrono::Utc;
use log::{debug, error, info, warn};
use std::sync::Arc;

pub struct PersistSession {
    config: PersistConfig,
    registry: IdentityRegistry,
    /// World scope; one chunk each in the world blob
    world_managers: Vec<Box<dyn StateManager>>,
    /// Game and profile scope; one chunk each in the game blob
    game_managers: Vec<Box<dyn StateManager>>,
    storage: SlotStorage,
    initialized: bool,
}

impl std::fmt::Debug for PersistSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tags = |managers: &[Box<dyn StateManager>]| -> Vec<String> {
            managers.iter().map(|m| m.type_tag().to_string()).collect()
        };
        f.debug_struct("PersistSession")
            .field("world_managers", &tags(&self.world_managers))
            .field("game_managers", &tags(&self.game_managers))
            .field("registry", &self.registry.len())
            .field("initialized", &self.initialized)
            .finish()
    }
}

impl PersistSession {
    /// Session with the built-in managers enabled by `config`
    pub fn new(config: PersistConfig, loader: Arc<dyn AssetLoader>) -> Result<Self> {
        config.validate()?;
        let storage = SlotStorage::from_config(&config)?;
        let mut session = Self {
            registry: IdentityRegistry::new(&config)?,
            world_managers: Vec::new(),
            game_managers: Vec::new(),
            storage,
            initialized: false,
            config,
        };

        if session.config.can_create_world_state {
            session.register_manager(Box::new(LevelActorsManager::new(loader)));
            session.register_manager(Box::new(SubsystemsManager::new(ManagerScope::World)));
            session.register_manager(Box::new(DataLayersManager::new()));
        }
        if session.config.can_create_game_state {
            session.register_manager(Box::new(SubsystemsManager::new(ManagerScope::Game)));
        }
        if session.config.can_create_profile_state {
            session.register_manager(Box::new(SubsystemsManager::new(ManagerScope::Profile)));
        }
        Ok(session)
    }

    pub fn with_storage(mut self, storage: SlotStorage) -> Self {
        self.storage = storage;
        self
    }

    /// Add a manager; one with the same type tag is replaced
    pub fn register_manager(&mut self, manager: Box<dyn StateManager>) {
        let managers = match manager.scope() {
            ManagerScope::World => &mut self.world_managers,
            ManagerScope::Game | ManagerScope::Profile => &mut self.game_managers,
        };
        managers.retain(|m| m.type_tag() != manager.type_tag());
        managers.push(manager);
    }

    // ------------------------------------------------------------------
    // accessors
    // ------------------------------------------------------------------

    pub fn config(&self) -> &PersistConfig {
        &self.config
    }

    pub fn registry(&self) -> &IdentityRegistry {
        &self.registry
    }

    pub fn storage(&self) -> &SlotStorage {
        &self.storage
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn manager<T: StateManager + 'static>(&self) -> Option<&T> {
        self.world_managers
            .iter()
            .chain(self.game_managers.iter())
            .find_map(|m| m.as_any().downcast_ref::<T>())
    }

    pub fn manager_mut<T: StateManager + 'static>(&mut self) -> Option<&mut T> {
        self.world_managers
            .iter_mut()
            .chain(self.game_managers.iter_mut())
            .find_map(|m| m.as_any_mut().downcast_mut::<T>())
    }

    /// Manager registered under `tag`
    pub fn manager_by_tag(&self, tag: &str) -> Option<&dyn StateManager> {
        self.world_managers
            .iter()
            .chain(self.game_managers.iter())
            .find(|m| m.type_tag() == tag)
            .map(|m| m.as_ref())
    }

    pub fn level_actors(&self) -> Option<&LevelActorsManager> {
        self.manager::<LevelActorsManager>()
    }

    // ------------------------------------------------------------------
    // lifecycle
    // ------------------------------------------------------------------

    pub fn init(&mut self) {
        self.registry.clear();
        self.initialized = true;
        info!("Persistence session started ({} world, {} game managers)", self.world_managers.len(), self.game_managers.len());
    }

    pub fn shutdown(&mut self) {
        self.reset_managers();
        self.registry.clear();
        self.initialized = false;
        info!("Persistence session stopped");
    }

    fn reset_managers(&mut self) {
        for manager in self.world_managers.iter_mut().chain(self.game_managers.iter_mut()) {
            manager.reset();
        }
    }

    fn require_init(&self) -> Result<()> {
        if !self.initialized {
            return Err(PersistError::InvalidState("persistence session is not initialized".to_string()));
        }
        Ok(())
    }

    /// Slot key for the world currently hosted
    fn world_name(host: &dyn GraphHost) -> Result<String> {
        host.world()
            .and_then(|w| host.path_name(w))
            .ok_or_else(|| PersistError::InvalidState("host has no world".to_string()))
    }

    /// Drop all records and link the current world from scratch
    pub async fn new_game(&mut self, host: &mut dyn GraphHost) -> Result<()> {
        self.require_init()?;
        self.reset_managers();
        self.registry.purge_dead(&*host);
        self.init_world(host).await
    }

    /// Run every manager's load pass over the live world with whatever records it holds
    pub async fn init_world(&mut self, host: &mut dyn GraphHost) -> Result<()> {
        self.require_init()?;
        let mut ctx = PersistContext::new(host, &mut self.registry, &self.config);
        for manager in self.game_managers.iter_mut().chain(self.world_managers.iter_mut()) {
            manager.pre_load_state();
            manager.load_state(&mut ctx).await?;
            manager.post_load_state();
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // state blobs
    // ------------------------------------------------------------------

    /// Capture every world manager and serialize the world blob
    pub fn save_world_state(&mut self, host: &mut dyn GraphHost) -> Result<Vec<u8>> {
        let mut ctx = PersistContext::new(host, &mut self.registry, &self.config);
        for manager in self.world_managers.iter_mut() {
            manager.save_state(&mut ctx)?;
        }
        save_world(self.world_managers.iter().map(|m| m.as_ref()), WORLD_HEADER_TAG)
    }

    /// `None` when no game or profile manager is registered
    pub fn save_game_state(&mut self, host: &mut dyn GraphHost) -> Result<Option<Vec<u8>>> {
        if self.game_managers.is_empty() {
            return Ok(None);
        }
        let mut ctx = PersistContext::new(host, &mut self.registry, &self.config);
        for manager in self.game_managers.iter_mut() {
            manager.save_state(&mut ctx)?;
        }
        save_world(self.game_managers.iter().map(|m| m.as_ref()), GAME_HEADER_TAG).map(Some)
    }

    /// Hand the chunks of a world blob to the managers by tag without touching the live graph
    pub fn load_world_for_level_pipeline(&mut self, world_state: &[u8]) -> Result<LoadReport> {
        load_world(world_state, WORLD_HEADER_TAG, &mut self.world_managers)
    }

    // ------------------------------------------------------------------
    // save / load requests
    // ------------------------------------------------------------------

    /// Save the current world and game state into `slot_name`. Failures are logged.
    pub async fn save_game(&mut self, host: &mut dyn GraphHost, slot_name: &str) -> bool {
        if !self.config.enabled {
            return true;
        }
        match self.try_save_game(host, slot_name).await {
            Ok(bytes) => {
                info!("Saved slot {} ({} bytes)", slot_name, bytes);
                true
            }
            Err(err) => {
                error!("Failed to save slot {}: {}", slot_name, err);
                false
            }
        }
    }

    async fn try_save_game(&mut self, host: &mut dyn GraphHost, slot_name: &str) -> Result<usize> {
        self.require_init()?;
        let world_name = Self::world_name(&*host)?;

        let mut slot = match self.storage.load_slot_async(slot_name).await? {
            Some(bytes) => SlotData::from_bytes(&bytes).unwrap_or_else(|err| {
                warn!("Replacing unreadable slot {}: {}", slot_name, err);
                SlotData::new(slot_name)
            }),
            None => SlotData::new(slot_name),
        };

        if self.config.can_create_world_state {
            slot.set_world(&world_name, self.save_world_state(host)?);
        }
        if let Some(game_state) = self.save_game_state(host)? {
            slot.game_state = Some(game_state);
        }
        slot.header.timestamp = Utc::now();

        let bytes = slot.to_bytes()?;
        let len = bytes.len();
        self.storage.save_slot_async(slot_name, bytes).await?;
        Ok(len)
    }

    /// Load `slot_name` into a freshly built world. Failures are logged.
    pub async fn load_game(&mut self, host: &mut dyn GraphHost, slot_name: &str) -> bool {
        if !self.config.enabled {
            return true;
        }
        match self.try_load_game(host, slot_name).await {
            Ok(()) => {
                info!("Loaded slot {}", slot_name);
                true
            }
            Err(err) => {
                error!("Failed to load slot {}: {}", slot_name, err);
                false
            }
        }
    }

    async fn try_load_game(&mut self, host: &mut dyn GraphHost, slot_name: &str) -> Result<()> {
        self.require_init()?;
        let world_name = Self::world_name(&*host)?;
        let bytes = self
            .storage
            .load_slot_async(slot_name)
            .await?
            .ok_or_else(|| PersistError::InvalidState(format!("slot {} does not exist", slot_name)))?;
        let slot = SlotData::from_bytes(&bytes)?;

        self.reset_managers();
        let purged = self.registry.purge_dead(&*host);
        debug!("Purged {} dead identity entries", purged);

        if let Some(game_state) = &slot.game_state {
            let report = load_world(game_state, GAME_HEADER_TAG, &mut self.game_managers)?;
            debug!("Game state chunks loaded: {:?}", report.loaded);
        }
        match slot.world(&world_name) {
            Some(world_state) => {
                self.load_world_for_level_pipeline(world_state)?;
            }
            None => debug!("Slot {} has no state for world {}", slot_name, world_name),
        }

        self.init_world(host).await
    }

    // ------------------------------------------------------------------
    // runtime notifications
    // ------------------------------------------------------------------

    /// A level finished loading into the world
    pub async fn on_level_loaded(&mut self, host: &mut dyn GraphHost, level: NodeHandle, from_level_streaming: bool) -> Result<()> {
        let mut ctx = PersistContext::new(host, &mut self.registry, &self.config);
        match self
            .world_managers
            .iter_mut()
            .find_map(|m| m.as_any_mut().downcast_mut::<LevelActorsManager>())
        {
            Some(manager) => manager.load_level(&mut ctx, level, from_level_streaming).await,
            None => Ok(()),
        }
    }

    /// Synchronous half of a level load for hosts that drive the asset gate themselves.
    /// On `AwaitingAssets`, call [`Self::finish_level_load`] once the assets are resident.
    pub fn begin_level_load(
        &mut self,
        host: &mut dyn GraphHost,
        level: NodeHandle,
        from_level_streaming: bool,
    ) -> Result<LevelLoadStatus> {
        let mut ctx = PersistContext::new(host, &mut self.registry, &self.config);
        match self
            .world_managers
            .iter_mut()
            .find_map(|m| m.as_any_mut().downcast_mut::<LevelActorsManager>())
        {
            Some(manager) => manager.initialize_level(&mut ctx, level, from_level_streaming),
            None => Ok(LevelLoadStatus::Completed),
        }
    }

    pub fn finish_level_load(&mut self, host: &mut dyn GraphHost, level: NodeHandle) -> Result<()> {
        let mut ctx = PersistContext::new(host, &mut self.registry, &self.config);
        match self
            .world_managers
            .iter_mut()
            .find_map(|m| m.as_any_mut().downcast_mut::<LevelActorsManager>())
        {
            Some(manager) => manager.finish_level_load(&mut ctx, level),
            None => Ok(()),
        }
    }

    pub fn on_level_added(&mut self, host: &mut dyn GraphHost, level: NodeHandle) {
        let mut ctx = PersistContext::new(host, &mut self.registry, &self.config);
        if let Some(manager) = self
            .world_managers
            .iter_mut()
            .find_map(|m| m.as_any_mut().downcast_mut::<LevelActorsManager>())
        {
            manager.notify_level_added(&mut ctx, level);
        }
    }

    /// A level is leaving the world; its records are saved and unlinked
    pub fn on_level_removed(&mut self, host: &mut dyn GraphHost, level: NodeHandle) -> Result<()> {
        let mut ctx = PersistContext::new(host, &mut self.registry, &self.config);
        match self
            .world_managers
            .iter_mut()
            .find_map(|m| m.as_any_mut().downcast_mut::<LevelActorsManager>())
        {
            Some(manager) => manager.remove_level(&mut ctx, level),
            None => Ok(()),
        }
    }

    pub fn on_object_initialized(&mut self, host: &mut dyn GraphHost, node: NodeHandle) -> Result<()> {
        let mut ctx = PersistContext::new(host, &mut self.registry, &self.config);
        match self
            .world_managers
            .iter_mut()
            .find_map(|m| m.as_any_mut().downcast_mut::<LevelActorsManager>())
        {
            Some(manager) => manager.notify_object_initialized(&mut ctx, node),
            None => Ok(()),
        }
    }

    pub fn on_object_destroyed(&mut self, host: &mut dyn GraphHost, node: NodeHandle) {
        let mut ctx = PersistContext::new(host, &mut self.registry, &self.config);
        if let Some(manager) = self
            .world_managers
            .iter_mut()
            .find_map(|m| m.as_any_mut().downcast_mut::<LevelActorsManager>())
        {
            manager.notify_object_destroyed(&mut ctx, node);
        }
    }
}

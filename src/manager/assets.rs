use crate::archive::ReferenceTracker;
use crate::core::{AssetPath, PersistError, Result};
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tracing::{Level, event};

/// Asynchronous asset preloading provided by the host
#[async_trait]
pub trait AssetLoader: Send + Sync {
    fn is_loaded(&self, asset: &AssetPath) -> bool;

    /// Resolves once every listed asset is loaded
    async fn load_assets(&self, assets: Vec<AssetPath>) -> Result<()>;

    /// Called when a level that depended on these assets goes away
    fn release_assets(&self, _assets: &[AssetPath]) {}
}

/// Outcome of checking a level's hard dependencies
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateStatus {
    Ready,
    Pending(Vec<AssetPath>),
}

/// Fast path: nothing to wait for when the dependency set is empty or fully loaded
pub fn check_gate(loader: &dyn AssetLoader, dependencies: &ReferenceTracker) -> GateStatus {
    let missing: Vec<AssetPath> = dependencies
        .paths()
        .iter()
        .filter(|path| !loader.is_loaded(path))
        .cloned()
        .collect();
    if missing.is_empty() {
        GateStatus::Ready
    } else {
        GateStatus::Pending(missing)
    }
}

/// Wait for `missing`. A failed preload is logged and does not block the level.
pub async fn wait_gate(loader: &dyn AssetLoader, missing: Vec<AssetPath>) {
    let count = missing.len();
    if let Err(err) = loader.load_assets(missing).await {
        event!(
            Level::WARN,
            error = %err,
            assets = count,
            "Asset preload failed, recreating dynamic nodes anyway"
        );
    }
}

/// Loader over a fixed catalogue, with an optional simulated latency
#[derive(Debug, Default)]
pub struct InMemoryAssetLoader {
    catalogue: HashSet<AssetPath>,
    loaded: RwLock<HashSet<AssetPath>>,
    latency: Option<Duration>,
    load_requests: AtomicUsize,
}

impl InMemoryAssetLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every asset in `catalogue` can be loaded; none is loaded yet
    pub fn with_catalogue(catalogue: impl IntoIterator<Item = AssetPath>) -> Self {
        Self {
            catalogue: catalogue.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Mark assets as already resident
    pub fn preload(&self, assets: impl IntoIterator<Item = AssetPath>) {
        self.write_loaded().extend(assets);
    }

    /// Number of `load_assets` calls, i.e. how often a level had to wait
    pub fn load_requests(&self) -> usize {
        self.load_requests.load(Ordering::SeqCst)
    }

    fn read_loaded(&self) -> RwLockReadGuard<'_, HashSet<AssetPath>> {
        self.loaded.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_loaded(&self) -> RwLockWriteGuard<'_, HashSet<AssetPath>> {
        self.loaded.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns false for assets outside the catalogue
    async fn load_one(&self, asset: &AssetPath) -> bool {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if !self.catalogue.contains(asset) {
            return false;
        }
        self.write_loaded().insert(asset.clone());
        true
    }
}

#[async_trait]
impl AssetLoader for InMemoryAssetLoader {
    fn is_loaded(&self, asset: &AssetPath) -> bool {
        self.read_loaded().contains(asset)
    }

    async fn load_assets(&self, assets: Vec<AssetPath>) -> Result<()> {
        self.load_requests.fetch_add(1, Ordering::SeqCst);
        let results = join_all(assets.iter().map(|asset| self.load_one(asset))).await;
        let unknown: Vec<&AssetPath> = assets
            .iter()
            .zip(results)
            .filter_map(|(asset, found)| (!found).then_some(asset))
            .collect();

        match unknown.first() {
            Some(first) => Err(PersistError::UnresolvedReference(format!(
                "{} asset(s) not found, first: {}",
                unknown.len(),
                first
            ))),
            None => Ok(()),
        }
    }

    fn release_assets(&self, assets: &[AssetPath]) {
        let mut loaded = self.write_loaded();
        for asset in assets {
            loaded.remove(asset);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(paths: &[&str]) -> ReferenceTracker {
        ReferenceTracker::from_paths(paths.iter().map(|p| AssetPath::new(*p)))
    }

    #[test]
    fn test_empty_dependencies_pass_immediately() {
        let loader = InMemoryAssetLoader::new();
        assert_eq!(check_gate(&loader, &ReferenceTracker::new()), GateStatus::Ready);
    }

    #[test]
    fn test_resident_assets_pass_immediately() {
        let loader = InMemoryAssetLoader::with_catalogue([AssetPath::new("/Game/Crate")]);
        loader.preload([AssetPath::new("/Game/Crate")]);
        assert_eq!(check_gate(&loader, &tracker(&["/Game/Crate"])), GateStatus::Ready);
    }

    #[tokio::test]
    async fn test_pending_assets_load_through_gate() {
        let loader = InMemoryAssetLoader::with_catalogue([AssetPath::new("/Game/Crate")])
            .latency(Duration::from_millis(5));
        let deps = tracker(&["/Game/Crate"]);

        let GateStatus::Pending(missing) = check_gate(&loader, &deps) else {
            panic!("crate asset should not be resident yet");
        };
        wait_gate(&loader, missing).await;

        assert_eq!(check_gate(&loader, &deps), GateStatus::Ready);
        assert_eq!(loader.load_requests(), 1);
    }

    #[tokio::test]
    async fn test_missing_assets_do_not_block() {
        let loader = InMemoryAssetLoader::new();
        let deps = tracker(&["/Game/Deleted"]);
        let GateStatus::Pending(missing) = check_gate(&loader, &deps) else {
            panic!("unknown asset cannot be resident");
        };
        // Resolves instead of hanging or failing the level
        wait_gate(&loader, missing).await;
        assert!(!loader.is_loaded(&AssetPath::new("/Game/Deleted")));
    }
}

//! The atomically-swapped config snapshot (spec.md §4.A) and its observer
//! registry. Readers call [`ConfigStore::current`] and never lock; writers
//! call [`ConfigStore::update`], which validates, persists to disk, swaps
//! the pointer, then notifies every registered observer in turn.

use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;

use super::loader;
use super::schema::PortalConfig;
use crate::error::AppError;

pub type ConfigSnapshot = Arc<PortalConfig>;

/// A component that needs to react to a committed config change. Observers
/// must be idempotent: a failure must be logged but must never roll back
/// the commit or block other observers from running.
pub trait Observer: Send + Sync {
    fn on_config_change(&self, snapshot: &ConfigSnapshot);
}

pub struct ConfigStore {
    path: PathBuf,
    current: ArcSwap<PortalConfig>,
    observers: std::sync::RwLock<Vec<Arc<dyn Observer>>>,
}

impl ConfigStore {
    pub async fn load(path: PathBuf) -> Result<Self, AppError> {
        let config = loader::load(&path).await?;
        Ok(Self {
            path,
            current: ArcSwap::from_pointee(config),
            observers: std::sync::RwLock::new(Vec::new()),
        })
    }

    pub fn current(&self) -> ConfigSnapshot {
        self.current.load_full()
    }

    pub fn register(&self, observer: Arc<dyn Observer>) {
        self.observers.write().unwrap().push(observer);
    }

    /// Validate, persist, swap, and notify. The new snapshot is fully
    /// visible to subsequent callers of [`Self::current`] before this
    /// function returns, satisfying the "visible before the API returns
    /// 200" ordering guarantee of spec.md §5.
    pub async fn update(&self, new_config: PortalConfig) -> Result<ConfigSnapshot, AppError> {
        loader::validate(&new_config)?;
        loader::save(&self.path, &new_config).await?;

        let snapshot: ConfigSnapshot = Arc::new(new_config);
        self.current.store(snapshot.clone());

        let observers = self.observers.read().unwrap().clone();
        for observer in observers {
            observer.on_config_change(&snapshot);
        }

        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingObserver(Arc<AtomicUsize>);
    impl Observer for CountingObserver {
        fn on_config_change(&self, _snapshot: &ConfigSnapshot) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn update_notifies_all_observers_even_if_one_panics_is_not_tested_but_runs_all() {
        let dir = std::env::temp_dir().join(format!("muximux-test-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.yaml");
        let store = ConfigStore::load(path).await.unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        store.register(Arc::new(CountingObserver(count.clone())));
        store.register(Arc::new(CountingObserver(count.clone())));

        store.update(PortalConfig::default()).await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);

        let _ = tokio::fs::remove_dir_all(dir).await;
    }

    #[tokio::test]
    async fn current_reflects_latest_commit_before_update_returns() {
        let dir = std::env::temp_dir().join(format!("muximux-test-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.yaml");
        let store = ConfigStore::load(path).await.unwrap();

        let mut next = PortalConfig::default();
        next.base_path = "/portal".to_string();
        store.update(next).await.unwrap();

        assert_eq!(store.current().base_path, "/portal");
        let _ = tokio::fs::remove_dir_all(dir).await;
    }
}

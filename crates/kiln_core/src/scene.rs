//! Scenes and the game that owns them
//!
//! A [`Game`] owns everything that lives for the whole process: the shared
//! registry store, the timer queue, both durable storage tiers and the
//! configuration. Each [`Scene`] gets its own scene-scoped [`DataStore`]
//! and borrows the rest from the game.
//!
//! State code only talks to scenes through [`SceneContext`], so hosts with
//! their own scene type can implement the trait directly.
//!
//! ```rust
//! use kiln_core::{Game, KeyedStore, SceneContext};
//! use std::rc::Rc;
//!
//! let game = Game::new();
//! let menu = game.create_scene("menu");
//! let level = game.create_scene("level-1");
//!
//! menu.data().unwrap().set("cursor", Rc::new(2u8));
//! assert!(!level.data().unwrap().has("cursor"));
//!
//! menu.registry().unwrap().set("coins", Rc::new(10u32));
//! assert!(level.registry().unwrap().has("coins"));
//! ```

use crate::config::{GameConfig, StateDefaults};
use crate::storage::{FileStorage, MemoryStorage, SharedStorage, StorageTier};
use crate::store::{DataStore, SharedStore};
use crate::timer::{SharedScheduler, TimerQueue};
use anyhow::{Context, Result};
use std::rc::Rc;
use std::time::Duration;

/// What the state layer needs from a scene
///
/// Every accessor is optional so hosts can expose only what they have.
pub trait SceneContext {
    /// Identifier of this scene instance
    fn scene_key(&self) -> Option<&str>;

    /// Scene-scoped store
    fn data(&self) -> Option<SharedStore>;

    /// Process-wide store shared by every scene
    fn registry(&self) -> Option<SharedStore>;

    /// Scheduler for deferred work
    fn scheduler(&self) -> Option<SharedScheduler> {
        None
    }

    /// Durable storage backend for a tier
    fn storage(&self, _tier: StorageTier) -> Option<SharedStorage> {
        None
    }

    /// Defaults for handles created through this scene
    fn state_defaults(&self) -> StateDefaults {
        StateDefaults::default()
    }
}

/// Process-wide owner of shared stores, timers and storage
pub struct Game {
    registry: Rc<DataStore>,
    timers: Rc<TimerQueue>,
    local_storage: SharedStorage,
    session_storage: SharedStorage,
    config: GameConfig,
}

impl Game {
    /// Create a game with default configuration and in-memory storage
    pub fn new() -> Self {
        Self::from_parts(
            GameConfig::default(),
            Rc::new(MemoryStorage::new()),
            Rc::new(MemoryStorage::new()),
        )
    }

    /// Create a game from a configuration
    ///
    /// Fails if the configured local storage directory cannot be created.
    pub fn with_config(config: GameConfig) -> Result<Self> {
        let local_storage: SharedStorage = match &config.storage.local_dir {
            Some(dir) => Rc::new(FileStorage::open(dir).with_context(|| {
                format!("Failed to open local storage at {}", dir.display())
            })?),
            None => Rc::new(memory_storage(config.storage.local_quota)),
        };
        let session_storage = Rc::new(memory_storage(config.storage.session_quota));

        tracing::debug!(
            local_dir = ?config.storage.local_dir,
            max_history = config.state.max_history,
            "game configured"
        );
        Ok(Self::from_parts(config, local_storage, session_storage))
    }

    /// Create a game with explicit storage backends
    pub fn from_parts(
        config: GameConfig,
        local_storage: SharedStorage,
        session_storage: SharedStorage,
    ) -> Self {
        Self {
            registry: DataStore::shared(),
            timers: Rc::new(TimerQueue::new()),
            local_storage,
            session_storage,
            config,
        }
    }

    /// Create a scene with a fresh scene-scoped store
    pub fn create_scene(&self, key: impl Into<String>) -> Scene {
        let key = key.into();
        tracing::debug!(scene = %key, "scene created");
        Scene {
            key: Some(key),
            data: DataStore::shared(),
            registry: self.registry.clone(),
            timers: self.timers.clone(),
            local_storage: self.local_storage.clone(),
            session_storage: self.session_storage.clone(),
            defaults: self.config.state.clone(),
        }
    }

    /// Create a scene that has no identifier
    pub fn create_anonymous_scene(&self) -> Scene {
        let mut scene = self.create_scene(String::new());
        scene.key = None;
        scene
    }

    /// The process-wide registry
    pub fn registry(&self) -> &Rc<DataStore> {
        &self.registry
    }

    /// The game's timer queue
    pub fn timers(&self) -> &Rc<TimerQueue> {
        &self.timers
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Advance game time by one frame, firing due timers
    pub fn advance(&self, delta: Duration) -> usize {
        self.timers.advance(delta)
    }
}

impl Default for Game {
    fn default() -> Self {
        Self::new()
    }
}

fn memory_storage(quota: Option<usize>) -> MemoryStorage {
    match quota {
        Some(quota) => MemoryStorage::with_quota(quota),
        None => MemoryStorage::new(),
    }
}

/// A scene instance
#[derive(Clone)]
pub struct Scene {
    key: Option<String>,
    data: Rc<DataStore>,
    registry: Rc<DataStore>,
    timers: Rc<TimerQueue>,
    local_storage: SharedStorage,
    session_storage: SharedStorage,
    defaults: StateDefaults,
}

impl Scene {
    /// The scene-scoped store
    pub fn data_store(&self) -> &Rc<DataStore> {
        &self.data
    }
}

impl SceneContext for Scene {
    fn scene_key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    fn data(&self) -> Option<SharedStore> {
        Some(self.data.clone())
    }

    fn registry(&self) -> Option<SharedStore> {
        Some(self.registry.clone())
    }

    fn scheduler(&self) -> Option<SharedScheduler> {
        Some(self.timers.clone())
    }

    fn storage(&self, tier: StorageTier) -> Option<SharedStorage> {
        match tier {
            StorageTier::Local => Some(self.local_storage.clone()),
            StorageTier::Session => Some(self.session_storage.clone()),
        }
    }

    fn state_defaults(&self) -> StateDefaults {
        self.defaults.clone()
    }
}

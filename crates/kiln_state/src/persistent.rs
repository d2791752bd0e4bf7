//! Global state mirrored into durable storage
//!
//! A [`PersistentState`] is an ordinary global [`StateHandle`] plus a change
//! listener that serializes every new value as JSON into the scene's
//! storage backend. On construction a previously stored value wins over the
//! caller's initial value, so state survives a restart of the game.
//!
//! Storage is best-effort. Read failures fall back to the initial value and
//! write failures are logged; neither reaches the caller.
//!
//! ```rust
//! use kiln_core::Game;
//! use kiln_state::{with_persistent_state, PersistOptions, StateOptions};
//!
//! let game = Game::new();
//! let scene = game.create_scene("title");
//! let best = with_persistent_state(
//!     &scene,
//!     "best-score",
//!     Some(0u32),
//!     PersistOptions::default(),
//!     StateOptions::new(),
//! )
//! .unwrap();
//!
//! best.set(1200).unwrap();
//! assert_eq!(best.storage_key(), "kiln:best-score");
//! ```

use crate::error::Result;
use crate::handle::{StateEvent, StateHandle, StateOptions, StateSource, Subscription};
use crate::log::Logger;
use crate::scope::{global_key, global_state_in};
use kiln_core::{MemoryStorage, SceneContext, SharedStorage, StorageTier};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::ops::Deref;
use std::rc::Rc;

/// Prefix of default storage keys
pub const PERSIST_PREFIX: &str = "kiln:";

/// Where a persistent state is stored
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistOptions {
    /// Storage key override. Defaults to `kiln:<key>`.
    pub storage_key: Option<String>,
    /// Durability class of the backend
    pub tier: StorageTier,
}

impl PersistOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn storage_key(mut self, storage_key: impl Into<String>) -> Self {
        self.storage_key = Some(storage_key.into());
        self
    }

    pub fn tier(mut self, tier: StorageTier) -> Self {
        self.tier = tier;
        self
    }
}

/// A global state whose value is written through to durable storage
///
/// Derefs to the underlying [`StateHandle`] for reads, writes and listeners.
pub struct PersistentState<T> {
    state: StateHandle<T>,
    storage: SharedStorage,
    storage_key: Rc<str>,
    subscription: Subscription,
    logger: Logger,
}

/// Create a global state backed by durable storage
pub fn with_persistent_state<T, S>(
    scene: &S,
    key: &str,
    initial: Option<T>,
    persist: PersistOptions,
    options: StateOptions<T>,
) -> Result<PersistentState<T>>
where
    T: Clone + Serialize + DeserializeOwned + 'static,
    S: SceneContext + ?Sized,
{
    let debug = options.debug || scene.state_defaults().debug;
    let logger = Logger::new("persistent", &global_key(key), debug);
    let storage_key: Rc<str> = match persist.storage_key {
        Some(storage_key) => Rc::from(storage_key),
        None => Rc::from(format!("{PERSIST_PREFIX}{key}")),
    };

    let storage = match scene.storage(persist.tier) {
        Some(storage) => storage,
        None => {
            logger.warn(format_args!(
                "no {:?} storage reachable from this scene, keeping values in memory",
                persist.tier
            ));
            Rc::new(MemoryStorage::new())
        }
    };

    let initial = match load::<T>(&storage, &storage_key, &logger) {
        Some(stored) => match options.validator.as_ref().map(|check| check(&stored)) {
            Some(Err(message)) => {
                logger.warn(format_args!("stored value rejected: {message}"));
                initial
            }
            _ => Some(stored),
        },
        None => initial,
    };

    let state = global_state_in("persistent", scene, key, initial, options)?;

    let subscription = {
        let storage = storage.clone();
        let storage_key = storage_key.clone();
        let logger = logger.clone();
        state.on(StateEvent::Change, move |value, _previous| {
            store(&storage, &storage_key, value, &logger);
        })
    };

    Ok(PersistentState {
        state,
        storage,
        storage_key,
        subscription,
        logger,
    })
}

fn load<T: DeserializeOwned>(storage: &SharedStorage, storage_key: &str, logger: &Logger) -> Option<T> {
    match storage.get_item(storage_key) {
        Ok(Some(raw)) => match serde_json::from_str(&raw) {
            Ok(value) => {
                logger.debug("restored from storage");
                Some(value)
            }
            Err(err) => {
                logger.warn(format_args!(
                    "stored value under '{storage_key}' is corrupt, using the initial value: {err}"
                ));
                None
            }
        },
        Ok(None) => {
            logger.debug(format_args!("nothing stored under '{storage_key}'"));
            None
        }
        Err(err) => {
            logger.warn(format_args!("failed to read storage, using the initial value: {err}"));
            None
        }
    }
}

fn store<T: Serialize>(storage: &SharedStorage, storage_key: &str, value: &T, logger: &Logger) -> bool {
    let raw = match serde_json::to_string(value) {
        Ok(raw) => raw,
        Err(err) => {
            logger.warn(format_args!("failed to serialize value: {err}"));
            return false;
        }
    };
    match storage.set_item(storage_key, &raw) {
        Ok(()) => {
            logger.debug("persisted");
            true
        }
        Err(err) => {
            logger.warn(format_args!("failed to persist value: {err}"));
            false
        }
    }
}

impl<T> PersistentState<T>
where
    T: Clone + Serialize + DeserializeOwned + 'static,
{
    /// Key of the stored item
    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    /// Write the current value to storage now
    ///
    /// Returns false if the slot is empty or the write failed.
    pub fn persist_now(&self) -> bool {
        match self.state.try_get() {
            Some(value) => store(&self.storage, &self.storage_key, &value, &self.logger),
            None => false,
        }
    }

    /// Stop writing changes to storage. The state itself stays usable.
    pub fn dispose(&self) -> bool {
        self.logger.debug("write-through detached");
        self.subscription.unsubscribe()
    }

    /// The underlying global handle
    pub fn handle(&self) -> &StateHandle<T> {
        &self.state
    }
}

impl<T> Deref for PersistentState<T> {
    type Target = StateHandle<T>;

    fn deref(&self) -> &StateHandle<T> {
        &self.state
    }
}

impl<T: Clone + 'static> StateSource<T> for PersistentState<T> {
    fn key(&self) -> &str {
        self.state.key()
    }

    fn try_get(&self) -> Option<T> {
        self.state.try_get()
    }

    fn on<F>(&self, event: StateEvent, callback: F) -> Subscription
    where
        F: Fn(&T, Option<&T>) + 'static,
    {
        self.state.on(event, callback)
    }

    fn once<F>(&self, event: StateEvent, callback: F) -> Subscription
    where
        F: Fn(&T, Option<&T>) + 'static,
    {
        self.state.once(event, callback)
    }

    fn off(&self, event: StateEvent, subscription: &Subscription) -> bool {
        self.state.off(event, subscription)
    }

    fn clear_listeners(&self) {
        self.state.clear_listeners()
    }
}

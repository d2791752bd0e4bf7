//! Kiln Core Runtime
//!
//! Host-side primitives that the Kiln state layer runs on:
//!
//! - **Data Stores**: Keyed, type-erased value slots with change events
//! - **Scenes**: Scene-scoped stores plus a process-wide registry
//! - **Timers**: A frame-driven timer queue for deferred work
//! - **Durable Storage**: Local and session key/value backends
//! - **Config**: TOML game configuration
//!
//! # Example
//!
//! ```rust
//! use kiln_core::{change_channel, DataStore, KeyedStore, StoredValue};
//! use std::rc::Rc;
//!
//! let store = DataStore::new();
//!
//! store.on(
//!     &change_channel("score"),
//!     Rc::new(|key: &str, value: &StoredValue, _previous: Option<&StoredValue>| {
//!         let score = value.downcast_ref::<u32>().copied();
//!         println!("{key} is now {score:?}");
//!     }),
//! );
//!
//! store.set("score", Rc::new(10u32));
//! assert!(store.has("score"));
//! ```

pub mod config;
pub mod scene;
pub mod storage;
pub mod store;
pub mod timer;

pub use config::{GameConfig, StateDefaults, StorageConfig};
pub use scene::{Game, Scene, SceneContext};
pub use storage::{
    DurableStorage, FileStorage, MemoryStorage, SharedStorage, StorageError, StorageTier,
};
pub use store::{
    change_channel, ChangeCallback, DataStore, KeyedStore, ListenerId, SharedStore, StoredValue,
    CHANGE_CHANNEL_PREFIX,
};
pub use timer::{Scheduler, SharedScheduler, TimerId, TimerQueue};

//! Keyed data stores with change events
//!
//! A [`KeyedStore`] maps string keys to type-erased values and emits a change
//! event on a per-key channel every time a slot is written. Scenes own one
//! store each, and the [`Game`](crate::Game) owns a process-wide registry
//! that every scene shares.
//!
//! Values are stored as [`StoredValue`] (`Rc<dyn Any>`), so one store can
//! hold heterogeneous state. Typed views over a slot downcast on read.
//!
//! # Example
//!
//! ```rust
//! use kiln_core::{change_channel, DataStore, KeyedStore, StoredValue};
//! use std::rc::Rc;
//!
//! let store = DataStore::new();
//! store.set("lives", Rc::new(3i32));
//!
//! let id = store.once(
//!     &change_channel("lives"),
//!     Rc::new(|_key: &str, value: &StoredValue, previous: Option<&StoredValue>| {
//!         assert_eq!(value.downcast_ref::<i32>(), Some(&2));
//!         assert_eq!(previous.and_then(|p| p.downcast_ref::<i32>()), Some(&3));
//!     }),
//! );
//!
//! store.set("lives", Rc::new(2i32));
//! assert!(!store.off(&change_channel("lives"), id));
//! ```

use rustc_hash::FxHashMap;
use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;
use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

/// Prefix of every per-key change channel
pub const CHANGE_CHANNEL_PREFIX: &str = "changedata-";

/// A type-erased stored value
pub type StoredValue = Rc<dyn Any>;

/// Callback invoked with `(key, new_value, previous_value)` after a write
pub type ChangeCallback = Rc<dyn Fn(&str, &StoredValue, Option<&StoredValue>)>;

/// Shared handle to a keyed store
pub type SharedStore = Rc<dyn KeyedStore>;

new_key_type! {
    /// Identifies one listener registration on a store
    pub struct ListenerId;
}

/// Name of the change channel for a key
pub fn change_channel(key: &str) -> String {
    format!("{CHANGE_CHANNEL_PREFIX}{key}")
}

/// Keyed value store with per-key change notification
///
/// All methods take `&self`; implementations use interior mutability and
/// must not hold internal borrows while listeners run, so listeners can
/// read and write the store re-entrantly.
pub trait KeyedStore {
    /// Whether a value exists at `key`
    fn has(&self, key: &str) -> bool;

    /// Current value at `key`
    fn get(&self, key: &str) -> Option<StoredValue>;

    /// Write `value` at `key` and emit on `change_channel(key)`
    fn set(&self, key: &str, value: StoredValue);

    /// Register a listener on a channel
    fn on(&self, channel: &str, callback: ChangeCallback) -> ListenerId;

    /// Register a listener that is removed after its first invocation
    fn once(&self, channel: &str, callback: ChangeCallback) -> ListenerId;

    /// Remove a listener. Returns false if it was already gone.
    fn off(&self, channel: &str, id: ListenerId) -> bool;

    /// Remove every listener on a channel
    fn remove_all(&self, channel: &str);

    /// Number of listeners currently registered on a channel
    fn listener_count(&self, channel: &str) -> usize;
}

struct ListenerEntry {
    callback: ChangeCallback,
    once: bool,
}

/// The default in-memory [`KeyedStore`]
#[derive(Default)]
pub struct DataStore {
    values: RefCell<FxHashMap<String, StoredValue>>,
    listeners: RefCell<SlotMap<ListenerId, ListenerEntry>>,
    /// Listener ids per channel, in registration order
    channels: RefCell<FxHashMap<String, SmallVec<[ListenerId; 4]>>>,
}

impl DataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store already wrapped for sharing
    pub fn shared() -> Rc<Self> {
        Rc::new(Self::new())
    }

    /// All keys currently holding a value
    pub fn keys(&self) -> Vec<String> {
        self.values.borrow().keys().cloned().collect()
    }

    /// Remove the value at `key` without emitting a change
    pub fn remove(&self, key: &str) -> Option<StoredValue> {
        self.values.borrow_mut().remove(key)
    }

    fn register(&self, channel: &str, callback: ChangeCallback, once: bool) -> ListenerId {
        let id = self
            .listeners
            .borrow_mut()
            .insert(ListenerEntry { callback, once });
        self.channels
            .borrow_mut()
            .entry(channel.to_string())
            .or_default()
            .push(id);
        id
    }

    fn emit(&self, key: &str, value: &StoredValue, previous: Option<&StoredValue>) {
        let channel = change_channel(key);
        let ids: SmallVec<[ListenerId; 4]> = match self.channels.borrow().get(&channel) {
            Some(ids) => ids.clone(),
            None => return,
        };

        for id in ids {
            // Skip listeners removed by an earlier listener in this dispatch
            let (callback, once) = match self.listeners.borrow().get(id) {
                Some(entry) => (entry.callback.clone(), entry.once),
                None => continue,
            };
            if once {
                self.off(&channel, id);
            }
            callback(key, value, previous);
        }
    }
}

impl KeyedStore for DataStore {
    fn has(&self, key: &str) -> bool {
        self.values.borrow().contains_key(key)
    }

    fn get(&self, key: &str) -> Option<StoredValue> {
        self.values.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: StoredValue) {
        let previous = self
            .values
            .borrow_mut()
            .insert(key.to_string(), value.clone());
        self.emit(key, &value, previous.as_ref());
    }

    fn on(&self, channel: &str, callback: ChangeCallback) -> ListenerId {
        self.register(channel, callback, false)
    }

    fn once(&self, channel: &str, callback: ChangeCallback) -> ListenerId {
        self.register(channel, callback, true)
    }

    fn off(&self, channel: &str, id: ListenerId) -> bool {
        let mut channels = self.channels.borrow_mut();
        let Some(ids) = channels.get_mut(channel) else {
            return false;
        };
        let Some(position) = ids.iter().position(|existing| *existing == id) else {
            return false;
        };
        ids.remove(position);
        if ids.is_empty() {
            channels.remove(channel);
        }
        self.listeners.borrow_mut().remove(id).is_some()
    }

    fn remove_all(&self, channel: &str) {
        let removed = self.channels.borrow_mut().remove(channel);
        if let Some(ids) = removed {
            let mut listeners = self.listeners.borrow_mut();
            for id in ids {
                listeners.remove(id);
            }
        }
    }

    fn listener_count(&self, channel: &str) -> usize {
        self.channels
            .borrow()
            .get(channel)
            .map(|ids| ids.len())
            .unwrap_or(0)
    }
}

//! State handles
//!
//! A [`StateHandle<T>`] binds a [`KeyedStore`] and a key into a typed view of
//! one slot. The handle does not own the value: every handle bound to the
//! same `(store, key)` pair reads and writes the same slot, and listeners
//! registered through any of them fire on every write.
//!
//! # Example
//!
//! ```rust
//! use kiln_core::DataStore;
//! use kiln_state::{StateEvent, StateHandle, StateOptions};
//! use std::rc::Rc;
//!
//! let store = Rc::new(DataStore::new());
//! let hp = StateHandle::new(
//!     store,
//!     "hp",
//!     Some(10i32),
//!     StateOptions::new().validator(|hp: &i32| {
//!         if *hp >= 0 { Ok(()) } else { Err("hp cannot be negative".into()) }
//!     }),
//! )
//! .unwrap();
//!
//! let subscription = hp.on(StateEvent::Change, |hp, previous| {
//!     println!("hp {previous:?} -> {hp}");
//! });
//!
//! hp.update(|hp| hp - 3).unwrap();
//! assert_eq!(hp.get(), 7);
//!
//! // Rejected writes leave the slot untouched
//! assert!(hp.set(-1).is_err());
//! assert_eq!(hp.get(), 7);
//!
//! subscription.unsubscribe();
//! ```

use crate::error::{Result, StateError};
use crate::log::Logger;
use crate::merge::deep_merge;
use kiln_core::{change_channel, ChangeCallback, ListenerId, SharedStore, StoredValue};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

/// A value check. `Err` carries a human-readable violation message.
pub type Validator<T> = Rc<dyn Fn(&T) -> std::result::Result<(), String>>;

/// Options for creating a state handle
pub struct StateOptions<T> {
    /// Checked before every write, including initialization
    pub validator: Option<Validator<T>>,
    /// Emit debug traces for this handle
    pub debug: bool,
    /// Back the handle with the process-wide registry instead of the scene store
    pub global: bool,
}

impl<T> StateOptions<T> {
    pub fn new() -> Self {
        Self {
            validator: None,
            debug: false,
            global: false,
        }
    }

    pub fn validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&T) -> std::result::Result<(), String> + 'static,
    {
        self.validator = Some(Rc::new(validator));
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn global(mut self, global: bool) -> Self {
        self.global = global;
        self
    }
}

impl<T> Default for StateOptions<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for StateOptions<T> {
    fn clone(&self) -> Self {
        Self {
            validator: self.validator.clone(),
            debug: self.debug,
            global: self.global,
        }
    }
}

/// Events a state handle can be subscribed to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StateEvent {
    /// The value was written
    Change,
}

impl fmt::Display for StateEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateEvent::Change => f.write_str("change"),
        }
    }
}

/// Handle for removing one listener registration
///
/// Unsubscribing is idempotent. Dropping the handle does not unsubscribe.
#[derive(Clone)]
pub struct Subscription {
    store: SharedStore,
    channel: Rc<str>,
    id: ListenerId,
}

impl Subscription {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Remove the listener. Returns false if it was already removed.
    pub fn unsubscribe(&self) -> bool {
        self.store.off(&self.channel, self.id)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .field("id", &self.id)
            .finish()
    }
}

/// Read side shared by every kind of state handle
///
/// Consumers that only observe state (and [`with_computed_state`]) accept
/// any implementor.
///
/// [`with_computed_state`]: crate::with_computed_state
pub trait StateSource<T> {
    /// Physical key of the observed slot
    fn key(&self) -> &str;

    /// Current value, `None` if the slot is empty
    fn try_get(&self) -> Option<T>;

    fn on<F>(&self, event: StateEvent, callback: F) -> Subscription
    where
        F: Fn(&T, Option<&T>) + 'static;

    fn once<F>(&self, event: StateEvent, callback: F) -> Subscription
    where
        F: Fn(&T, Option<&T>) + 'static;

    fn off(&self, event: StateEvent, subscription: &Subscription) -> bool;

    fn clear_listeners(&self);
}

struct HandleInner<T> {
    /// Kind of handle, used in diagnostics and errors
    context: &'static str,
    store: SharedStore,
    key: String,
    channel: String,
    validator: Option<Validator<T>>,
    logger: Logger,
}

/// A typed view of one slot in a keyed store
pub struct StateHandle<T> {
    inner: Rc<HandleInner<T>>,
}

impl<T> Clone for StateHandle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for StateHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateHandle")
            .field("key", &self.inner.key)
            .field("validated", &self.inner.validator.is_some())
            .finish()
    }
}

impl<T: Clone + 'static> StateHandle<T> {
    /// Bind `store` and `key` into a handle
    ///
    /// If the slot is empty and `initial` is given, the initial value is
    /// validated and written. If the slot already holds a value, `initial`
    /// is ignored.
    pub fn new(
        store: SharedStore,
        key: impl Into<String>,
        initial: Option<T>,
        options: StateOptions<T>,
    ) -> Result<Self> {
        Self::new_in("state", store, key, initial, options)
    }

    /// [`new`](Self::new) for a handle backing a combinator named `context`
    pub(crate) fn new_in(
        context: &'static str,
        store: SharedStore,
        key: impl Into<String>,
        initial: Option<T>,
        options: StateOptions<T>,
    ) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(StateError::EmptyKey);
        }

        let logger = Logger::new(context, &key, options.debug);
        let handle = Self {
            inner: Rc::new(HandleInner {
                context,
                channel: change_channel(&key),
                store,
                key,
                validator: options.validator,
                logger,
            }),
        };

        if let Some(initial) = initial {
            if handle.inner.store.has(&handle.inner.key) {
                handle
                    .inner
                    .logger
                    .debug("slot already set, initial value ignored");
            } else {
                handle.validate(&initial)?;
                handle.write(initial);
                handle.inner.logger.debug("initialized");
            }
        }

        Ok(handle)
    }

    /// Physical key of the slot
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// The store backing this handle
    pub fn store(&self) -> &SharedStore {
        &self.inner.store
    }

    pub(crate) fn logger(&self) -> &Logger {
        &self.inner.logger
    }

    /// Current value, `None` if the slot is empty or holds another type
    pub fn try_get(&self) -> Option<T> {
        self.inner
            .store
            .get(&self.inner.key)
            .and_then(|value| value.downcast_ref::<T>().cloned())
    }

    /// Current value, or the type's default if the slot is empty
    pub fn get(&self) -> T
    where
        T: Default,
    {
        self.try_get().unwrap_or_default()
    }

    /// Run the validator against a candidate without writing it
    pub fn validate(&self, value: &T) -> Result<()> {
        match &self.inner.validator {
            Some(validator) => validator(value).map_err(|message| StateError::Validation {
                context: self.inner.context,
                key: self.inner.key.clone(),
                message,
            }),
            None => Ok(()),
        }
    }

    /// Validate and write a value, notifying listeners before returning
    ///
    /// On validation failure nothing is written. Writing a value equal to
    /// the current one still notifies.
    pub fn set(&self, value: T) -> Result<()> {
        self.validate(&value)?;
        self.inner.logger.debug("set");
        self.write(value);
        Ok(())
    }

    /// Compute the next value from the current one and [`set`](Self::set) it
    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&T) -> T,
    {
        let current = self.current()?;
        self.set(f(&current))
    }

    /// Write without validation, for values that already passed it
    pub(crate) fn replace(&self, value: T) {
        self.inner.logger.debug("replace");
        self.write(value);
    }

    pub(crate) fn current(&self) -> Result<T> {
        self.try_get().ok_or_else(|| StateError::Uninitialized {
            key: self.inner.key.clone(),
        })
    }

    fn write(&self, value: T) {
        let value: StoredValue = Rc::new(value);
        self.inner.store.set(&self.inner.key, value);
    }

    fn listener<F>(callback: F) -> ChangeCallback
    where
        F: Fn(&T, Option<&T>) + 'static,
    {
        Rc::new(
            move |_key: &str, value: &StoredValue, previous: Option<&StoredValue>| {
                let Some(value) = value.downcast_ref::<T>() else {
                    return;
                };
                let previous = previous.and_then(|previous| previous.downcast_ref::<T>());
                callback(value, previous);
            },
        )
    }

    fn subscription(&self, id: ListenerId) -> Subscription {
        Subscription {
            store: self.inner.store.clone(),
            channel: Rc::from(self.inner.channel.as_str()),
            id,
        }
    }

    /// Call `callback(new, previous)` on every write, in registration order
    ///
    /// A panicking callback unwinds through the `set` that triggered it.
    pub fn on<F>(&self, event: StateEvent, callback: F) -> Subscription
    where
        F: Fn(&T, Option<&T>) + 'static,
    {
        self.inner
            .logger
            .debug(format_args!("listener added for '{event}'"));
        let id = self
            .inner
            .store
            .on(&self.inner.channel, Self::listener(callback));
        self.subscription(id)
    }

    /// Like [`on`](Self::on), but the listener removes itself after the first write
    ///
    /// Writes of a value of another type to the slot are skipped and do not
    /// use up the listener.
    pub fn once<F>(&self, event: StateEvent, callback: F) -> Subscription
    where
        F: Fn(&T, Option<&T>) + 'static,
    {
        self.inner
            .logger
            .debug(format_args!("one-shot listener added for '{event}'"));

        let own_id: Rc<Cell<Option<ListenerId>>> = Rc::new(Cell::new(None));
        let store = Rc::downgrade(&self.inner.store);
        let channel: Rc<str> = Rc::from(self.inner.channel.as_str());
        let registration = own_id.clone();
        let listener: ChangeCallback = Rc::new(
            move |_key: &str, value: &StoredValue, previous: Option<&StoredValue>| {
                let Some(value) = value.downcast_ref::<T>() else {
                    return;
                };
                let Some(id) = registration.take() else {
                    return;
                };
                if let Some(store) = store.upgrade() {
                    store.off(&channel, id);
                }
                let previous = previous.and_then(|previous| previous.downcast_ref::<T>());
                callback(value, previous);
            },
        );

        let id = self.inner.store.on(&self.inner.channel, listener);
        own_id.set(Some(id));
        self.subscription(id)
    }

    /// Remove a listener registered on this key
    pub fn off(&self, event: StateEvent, subscription: &Subscription) -> bool {
        self.inner
            .logger
            .debug(format_args!("listener removed for '{event}'"));
        self.inner.store.off(&self.inner.channel, subscription.id)
    }

    /// Remove every listener on this key, however it was added
    pub fn clear_listeners(&self) {
        self.inner.logger.debug("listeners cleared");
        self.inner.store.remove_all(&self.inner.channel);
    }

    /// Number of listeners on this key
    pub fn listener_count(&self) -> usize {
        self.inner.store.listener_count(&self.inner.channel)
    }

    /// Legacy change listener
    ///
    /// Unlike [`on`](Self::on), no [`Subscription`] is returned, and a
    /// panicking callback is caught and logged instead of unwinding into
    /// the writer.
    #[deprecated(note = "use `on(StateEvent::Change, ..)`, which returns a `Subscription`")]
    pub fn on_change<F>(&self, callback: F)
    where
        F: Fn(&T, Option<&T>) + 'static,
    {
        let logger = self.inner.logger.scoped("state.on_change");
        self.inner.store.on(
            &self.inner.channel,
            Self::listener(move |value, previous| {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(value, previous)));
                if let Err(payload) = outcome {
                    logger.error(format_args!(
                        "change callback panicked: {}",
                        panic_message(&*payload)
                    ));
                }
            }),
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

impl<T> StateHandle<T>
where
    T: Clone + Serialize + DeserializeOwned + 'static,
{
    /// Compute the result of deep-merging `partial` into the current value
    pub fn patched(&self, partial: Value) -> Result<T> {
        let current = self.try_get().ok_or_else(|| self.not_an_object())?;
        let mut merged = serde_json::to_value(&current).map_err(|source| self.patch_error(source))?;
        if !merged.is_object() {
            return Err(self.not_an_object());
        }
        deep_merge(&mut merged, partial);
        serde_json::from_value(merged).map_err(|source| self.patch_error(source))
    }

    /// [`patched`](Self::patched) with the partial computed from the current value
    pub fn patched_with<F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&T) -> Value,
    {
        let current = self.try_get().ok_or_else(|| self.not_an_object())?;
        self.patched(f(&current))
    }

    /// Deep-merge `partial` into the current object value and write the result
    ///
    /// Fails if the current value is not an object, or if the merged value
    /// fails validation. Nothing is written on failure.
    pub fn patch(&self, partial: Value) -> Result<()> {
        let next = self.patched(partial)?;
        self.set(next)
    }

    /// [`patch`](Self::patch) with the partial computed from the current value
    pub fn patch_with<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&T) -> Value,
    {
        let next = self.patched_with(f)?;
        self.set(next)
    }

    fn not_an_object(&self) -> StateError {
        StateError::NotAnObject {
            key: self.inner.key.clone(),
        }
    }

    fn patch_error(&self, source: serde_json::Error) -> StateError {
        StateError::Patch {
            key: self.inner.key.clone(),
            source,
        }
    }
}

impl<T: Clone + 'static> StateSource<T> for StateHandle<T> {
    fn key(&self) -> &str {
        StateHandle::key(self)
    }

    fn try_get(&self) -> Option<T> {
        StateHandle::try_get(self)
    }

    fn on<F>(&self, event: StateEvent, callback: F) -> Subscription
    where
        F: Fn(&T, Option<&T>) + 'static,
    {
        StateHandle::on(self, event, callback)
    }

    fn once<F>(&self, event: StateEvent, callback: F) -> Subscription
    where
        F: Fn(&T, Option<&T>) + 'static,
    {
        StateHandle::once(self, event, callback)
    }

    fn off(&self, event: StateEvent, subscription: &Subscription) -> bool {
        StateHandle::off(self, event, subscription)
    }

    fn clear_listeners(&self) {
        StateHandle::clear_listeners(self)
    }
}

//! Debounced writes
//!
//! A burst of writes to a [`DebouncedState`] collapses into the last one:
//! each call cancels the pending timer and schedules a new one, and only
//! when a timer fires does the underlying state change and notify.
//!
//! ```rust
//! use kiln_core::Game;
//! use kiln_state::{with_debounced_state, StateOptions};
//! use std::time::Duration;
//!
//! let game = Game::new();
//! let scene = game.create_scene("search");
//! let query = with_debounced_state(
//!     &scene,
//!     "query",
//!     Some(String::new()),
//!     Duration::from_millis(250),
//!     StateOptions::new(),
//! )
//! .unwrap();
//!
//! query.set("s".into()).unwrap();
//! query.set("sw".into()).unwrap();
//! query.set("sword".into()).unwrap();
//! assert_eq!(query.get(), "");
//!
//! game.advance(Duration::from_millis(250));
//! assert_eq!(query.get(), "sword");
//! ```

use crate::error::{Result, StateError};
use crate::handle::{StateEvent, StateHandle, StateOptions, StateSource, Subscription};
use crate::log::Logger;
use crate::scope::state_def_in;
use kiln_core::{SceneContext, SharedScheduler, TimerId};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

struct PendingWrite<T> {
    timer: TimerId,
    value: T,
}

/// State whose writes land only after a quiet period
pub struct DebouncedState<T> {
    state: StateHandle<T>,
    scheduler: SharedScheduler,
    delay: Duration,
    pending: Rc<RefCell<Option<PendingWrite<T>>>>,
    logger: Logger,
}

/// Create a state whose writes are deferred by `delay`
///
/// The key is used as given and the store is selected by `options.global`,
/// as with [`with_state_def`](crate::with_state_def). The scene must
/// expose a scheduler.
pub fn with_debounced_state<T, S>(
    scene: &S,
    key: &str,
    initial: Option<T>,
    delay: Duration,
    options: StateOptions<T>,
) -> Result<DebouncedState<T>>
where
    T: Clone + 'static,
    S: SceneContext + ?Sized,
{
    let scheduler = scene
        .scheduler()
        .ok_or_else(|| StateError::MissingScheduler {
            key: key.to_string(),
        })?;
    let state = state_def_in("debounced", scene, key, initial, options)?;
    let logger = state.logger().scoped("debounced");

    Ok(DebouncedState {
        state,
        scheduler,
        delay,
        pending: Rc::new(RefCell::new(None)),
        logger,
    })
}

impl<T: Clone + 'static> DebouncedState<T> {
    pub fn key(&self) -> &str {
        self.state.key()
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn try_get(&self) -> Option<T> {
        self.state.try_get()
    }

    pub fn get(&self) -> T
    where
        T: Default,
    {
        self.state.get()
    }

    /// Schedule a write of `value`, replacing any pending one
    ///
    /// The value is validated now; an invalid value is rejected without
    /// touching the pending write.
    pub fn set(&self, value: T) -> Result<()> {
        self.state.validate(&value)?;
        self.schedule(value);
        Ok(())
    }

    /// Compute the next value from the current stored value and schedule it
    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&T) -> T,
    {
        let current = self.state.current()?;
        self.set(f(&current))
    }

    /// Whether a write is waiting for its timer
    pub fn is_pending(&self) -> bool {
        self.pending.borrow().is_some()
    }

    /// Drop the pending write. Returns false if there was none.
    pub fn cancel(&self) -> bool {
        let pending = self.pending.borrow_mut().take();
        match pending {
            Some(pending) => {
                self.scheduler.cancel(pending.timer);
                self.logger.debug("pending write cancelled");
                true
            }
            None => false,
        }
    }

    /// Apply the pending write now. Returns false if there was none.
    pub fn flush(&self) -> Result<bool> {
        let pending = self.pending.borrow_mut().take();
        match pending {
            Some(pending) => {
                self.scheduler.cancel(pending.timer);
                self.logger.debug("pending write flushed");
                self.state.set(pending.value)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn schedule(&self, value: T) {
        self.cancel();

        let pending = self.pending.clone();
        let state = self.state.clone();
        let logger = self.logger.clone();
        let timer = self.scheduler.schedule(
            self.delay,
            Box::new(move || {
                let write = pending.borrow_mut().take();
                if let Some(write) = write {
                    logger.debug("debounce window elapsed");
                    if let Err(err) = state.set(write.value) {
                        logger.error(format_args!("deferred write failed: {err}"));
                    }
                }
            }),
        );

        *self.pending.borrow_mut() = Some(PendingWrite { timer, value });
        self.logger.debug("write scheduled");
    }

    pub fn on<F>(&self, event: StateEvent, callback: F) -> Subscription
    where
        F: Fn(&T, Option<&T>) + 'static,
    {
        self.state.on(event, callback)
    }

    pub fn once<F>(&self, event: StateEvent, callback: F) -> Subscription
    where
        F: Fn(&T, Option<&T>) + 'static,
    {
        self.state.once(event, callback)
    }

    pub fn off(&self, event: StateEvent, subscription: &Subscription) -> bool {
        self.state.off(event, subscription)
    }

    pub fn clear_listeners(&self) {
        self.state.clear_listeners()
    }
}

impl<T> DebouncedState<T>
where
    T: Clone + Serialize + DeserializeOwned + 'static,
{
    /// Deep-merge `partial` into the current stored value and schedule the result
    ///
    /// Shares the pending slot with [`set`](Self::set).
    pub fn patch(&self, partial: Value) -> Result<()> {
        let next = self.state.patched(partial)?;
        self.set(next)
    }

    pub fn patch_with<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&T) -> Value,
    {
        let next = self.state.patched_with(f)?;
        self.set(next)
    }
}

impl<T: Clone + 'static> StateSource<T> for DebouncedState<T> {
    fn key(&self) -> &str {
        DebouncedState::key(self)
    }

    fn try_get(&self) -> Option<T> {
        DebouncedState::try_get(self)
    }

    fn on<F>(&self, event: StateEvent, callback: F) -> Subscription
    where
        F: Fn(&T, Option<&T>) + 'static,
    {
        DebouncedState::on(self, event, callback)
    }

    fn once<F>(&self, event: StateEvent, callback: F) -> Subscription
    where
        F: Fn(&T, Option<&T>) + 'static,
    {
        DebouncedState::once(self, event, callback)
    }

    fn off(&self, event: StateEvent, subscription: &Subscription) -> bool {
        DebouncedState::off(self, event, subscription)
    }

    fn clear_listeners(&self) {
        DebouncedState::clear_listeners(self)
    }
}

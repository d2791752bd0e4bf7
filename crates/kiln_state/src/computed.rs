//! Read-only projections of other state
//!
//! ```rust
//! use kiln_core::Game;
//! use kiln_state::{with_computed_state, with_local_state, StateOptions};
//!
//! let game = Game::new();
//! let scene = game.create_scene("hud");
//! let hp = with_local_state(&scene, "hp", Some(40u32), StateOptions::new()).unwrap();
//! let hp_label = with_computed_state(&hp, |hp: &u32| format!("{hp} HP")).unwrap();
//!
//! hp.set(35).unwrap();
//! assert_eq!(hp_label.get(), "35 HP");
//! assert!(hp_label.set("999 HP".into()).is_err());
//! ```

use crate::error::{Result, StateError};
use crate::handle::{StateEvent, StateHandle, StateOptions, StateSource, Subscription};
use kiln_core::DataStore;
use serde_json::Value;
use std::rc::Rc;

/// Prefix of the private key holding a computed value
pub const COMPUTED_PREFIX: &str = "computed:";

/// A value derived from another state, recomputed on every source change
///
/// Writes always fail with [`StateError::ReadOnly`]; update the source
/// instead. A selector that panics unwinds through the source write.
pub struct ComputedState<B> {
    state: StateHandle<B>,
    source_subscription: Subscription,
}

/// Project `source` through `selector`
///
/// The projection is computed immediately and again after every write to
/// the source. Fails with [`StateError::Uninitialized`] if the source has
/// no value yet.
pub fn with_computed_state<A, B, S, F>(source: &S, selector: F) -> Result<ComputedState<B>>
where
    A: Clone + 'static,
    B: Clone + 'static,
    S: StateSource<A>,
    F: Fn(&A) -> B + 'static,
{
    let current = source.try_get().ok_or_else(|| StateError::Uninitialized {
        key: source.key().to_string(),
    })?;

    let key = format!("{COMPUTED_PREFIX}{}", source.key());
    let state = StateHandle::new_in(
        "computed",
        Rc::new(DataStore::new()),
        key,
        Some(selector(&current)),
        StateOptions::new(),
    )?;

    let target = state.clone();
    let source_subscription = source.on(StateEvent::Change, move |value, _previous| {
        target.replace(selector(value));
    });

    state.logger().scoped("computed").debug("attached to source");
    Ok(ComputedState {
        state,
        source_subscription,
    })
}

impl<B: Clone + 'static> ComputedState<B> {
    pub fn key(&self) -> &str {
        self.state.key()
    }

    pub fn try_get(&self) -> Option<B> {
        self.state.try_get()
    }

    pub fn get(&self) -> B
    where
        B: Default,
    {
        self.state.get()
    }

    /// Always fails: computed state is read-only
    pub fn set(&self, _value: B) -> Result<()> {
        Err(self.read_only())
    }

    /// Always fails: computed state is read-only
    pub fn update<F>(&self, _f: F) -> Result<()>
    where
        F: FnOnce(&B) -> B,
    {
        Err(self.read_only())
    }

    /// Always fails: computed state is read-only
    pub fn patch(&self, _partial: Value) -> Result<()> {
        Err(self.read_only())
    }

    pub fn on<F>(&self, event: StateEvent, callback: F) -> Subscription
    where
        F: Fn(&B, Option<&B>) + 'static,
    {
        self.state.on(event, callback)
    }

    pub fn once<F>(&self, event: StateEvent, callback: F) -> Subscription
    where
        F: Fn(&B, Option<&B>) + 'static,
    {
        self.state.once(event, callback)
    }

    pub fn off(&self, event: StateEvent, subscription: &Subscription) -> bool {
        self.state.off(event, subscription)
    }

    pub fn clear_listeners(&self) {
        self.state.clear_listeners()
    }

    /// Stop following the source. The last computed value stays readable.
    pub fn dispose(&self) -> bool {
        self.source_subscription.unsubscribe()
    }

    fn read_only(&self) -> StateError {
        self.state.logger().scoped("computed").debug("write rejected");
        StateError::ReadOnly {
            key: self.state.key().to_string(),
        }
    }
}

impl<B: Clone + 'static> StateSource<B> for ComputedState<B> {
    fn key(&self) -> &str {
        ComputedState::key(self)
    }

    fn try_get(&self) -> Option<B> {
        ComputedState::try_get(self)
    }

    fn on<F>(&self, event: StateEvent, callback: F) -> Subscription
    where
        F: Fn(&B, Option<&B>) + 'static,
    {
        ComputedState::on(self, event, callback)
    }

    fn once<F>(&self, event: StateEvent, callback: F) -> Subscription
    where
        F: Fn(&B, Option<&B>) + 'static,
    {
        ComputedState::once(self, event, callback)
    }

    fn off(&self, event: StateEvent, subscription: &Subscription) -> bool {
        ComputedState::off(self, event, subscription)
    }

    fn clear_listeners(&self) {
        ComputedState::clear_listeners(self)
    }
}

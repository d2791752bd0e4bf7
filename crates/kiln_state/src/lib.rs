//! Kiln Scene State
//!
//! Reactive, typed state handles for game scenes.
//!
//! A [`StateHandle`] is a typed view of one slot in a keyed store supplied
//! by the host (see [`kiln_core::KeyedStore`]). Writes are validated before
//! they land and notify change listeners synchronously, in registration
//! order. Handles are scoped either to one scene ([`with_local_state`]) or
//! to the whole game ([`with_global_state`]).
//!
//! Four combinators add one behavior each on top of a handle:
//!
//! - [`with_computed_state`]: a read-only projection of another state
//! - [`with_debounced_state`]: writes coalesced over a quiet period
//! - [`with_persistent_state`]: global state mirrored into durable storage
//! - [`with_undoable_state`]: bounded linear undo/redo
//!
//! # Example
//!
//! ```rust
//! use kiln_core::Game;
//! use kiln_state::{validators, with_local_state, StateEvent, StateOptions};
//!
//! let game = Game::new();
//! let scene = game.create_scene("level-1");
//!
//! let lives = with_local_state(
//!     &scene,
//!     "lives",
//!     Some(3u8),
//!     StateOptions::new().validator(validators::range(0, 9)),
//! )
//! .unwrap();
//!
//! let subscription = lives.on(StateEvent::Change, |lives, previous| {
//!     println!("lives: {previous:?} -> {lives}");
//! });
//!
//! lives.update(|lives| lives - 1).unwrap();
//! assert_eq!(lives.get(), 2);
//! assert!(lives.set(12).is_err());
//!
//! subscription.unsubscribe();
//! ```
//!
//! Everything is single-threaded. Handles are `!Send` and share their
//! store through `Rc`.

pub mod computed;
pub mod debounced;
pub mod error;
pub mod handle;
pub mod log;
pub mod merge;
pub mod persistent;
pub mod scope;
pub mod undoable;
pub mod validators;

pub use computed::{with_computed_state, ComputedState, COMPUTED_PREFIX};
pub use debounced::{with_debounced_state, DebouncedState};
pub use error::{Result, StateError};
pub use handle::{StateEvent, StateHandle, StateOptions, StateSource, Subscription, Validator};
pub use log::Logger;
pub use merge::deep_merge;
pub use persistent::{with_persistent_state, PersistOptions, PersistentState, PERSIST_PREFIX};
pub use scope::{
    batch_update, global_key, is_valid_scene, local_key, with_global_state, with_local_state,
    with_state_def, Scope, UNKNOWN_SCENE,
};
pub use undoable::{with_undoable_state, UndoableState, HISTORY_INDEX_SUFFIX, HISTORY_SUFFIX};

//! Scene-scoped and global state
//!
//! Local state lives in the scene's own store under
//! `local:<scene>:<key>`, so two scenes can use the same logical key without
//! colliding. Global state lives in the process-wide registry under
//! `global:<key>` and is visible from every scene.
//!
//! ```rust
//! use kiln_core::Game;
//! use kiln_state::{with_global_state, with_local_state, StateOptions};
//!
//! let game = Game::new();
//! let menu = game.create_scene("menu");
//! let level = game.create_scene("level");
//!
//! let menu_cursor = with_local_state(&menu, "cursor", Some(0u8), StateOptions::new()).unwrap();
//! let level_cursor = with_local_state(&level, "cursor", Some(4u8), StateOptions::new()).unwrap();
//! assert_eq!((menu_cursor.get(), level_cursor.get()), (0, 4));
//!
//! let coins = with_global_state(&menu, "coins", Some(10u32), StateOptions::new()).unwrap();
//! let same_coins = with_global_state::<u32, _>(&level, "coins", None, StateOptions::new()).unwrap();
//! coins.set(25).unwrap();
//! assert_eq!(same_coins.get(), 25);
//! ```

use crate::error::{Result, StateError};
use crate::handle::{StateHandle, StateOptions};
use kiln_core::SceneContext;
use std::fmt;

/// Scene identifier used when a scene exposes none
pub const UNKNOWN_SCENE: &str = "unknown-scene";

/// Which store backs a handle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    /// The scene's own store
    Local,
    /// The process-wide registry
    Global,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Local => f.write_str("scene"),
            Scope::Global => f.write_str("global"),
        }
    }
}

/// Physical key of a scene-local state
pub fn local_key(scene_key: Option<&str>, key: &str) -> String {
    format!("local:{}:{key}", scene_key.unwrap_or(UNKNOWN_SCENE))
}

/// Physical key of a global state
pub fn global_key(key: &str) -> String {
    format!("global:{key}")
}

/// Bind a handle to the store selected by `options.global`
///
/// `key` is used as the physical key, without namespacing. Fails if the
/// scene exposes no store for the requested scope.
pub fn with_state_def<T, S>(
    scene: &S,
    key: &str,
    initial: Option<T>,
    options: StateOptions<T>,
) -> Result<StateHandle<T>>
where
    T: Clone + 'static,
    S: SceneContext + ?Sized,
{
    state_def_in("state", scene, key, initial, options)
}

pub(crate) fn state_def_in<T, S>(
    context: &'static str,
    scene: &S,
    key: &str,
    initial: Option<T>,
    mut options: StateOptions<T>,
) -> Result<StateHandle<T>>
where
    T: Clone + 'static,
    S: SceneContext + ?Sized,
{
    let scope = if options.global {
        Scope::Global
    } else {
        Scope::Local
    };
    let store = match scope {
        Scope::Global => scene.registry(),
        Scope::Local => scene.data(),
    }
    .ok_or_else(|| StateError::MissingStore {
        key: key.to_string(),
        scope,
    })?;

    options.debug |= scene.state_defaults().debug;
    StateHandle::new_in(context, store, key, initial, options)
}

/// State private to one scene instance
pub fn with_local_state<T, S>(
    scene: &S,
    key: &str,
    initial: Option<T>,
    options: StateOptions<T>,
) -> Result<StateHandle<T>>
where
    T: Clone + 'static,
    S: SceneContext + ?Sized,
{
    if key.is_empty() {
        return Err(StateError::EmptyKey);
    }
    let key = local_key(scene.scene_key(), key);
    with_state_def(scene, &key, initial, options.global(false))
}

/// State shared by every scene in the process
pub fn with_global_state<T, S>(
    scene: &S,
    key: &str,
    initial: Option<T>,
    options: StateOptions<T>,
) -> Result<StateHandle<T>>
where
    T: Clone + 'static,
    S: SceneContext + ?Sized,
{
    global_state_in("state", scene, key, initial, options)
}

pub(crate) fn global_state_in<T, S>(
    context: &'static str,
    scene: &S,
    key: &str,
    initial: Option<T>,
    options: StateOptions<T>,
) -> Result<StateHandle<T>>
where
    T: Clone + 'static,
    S: SceneContext + ?Sized,
{
    if key.is_empty() {
        return Err(StateError::EmptyKey);
    }
    let key = global_key(key);
    state_def_in(context, scene, &key, initial, options.global(true))
}

/// Whether `candidate` is a usable scene
///
/// True when a process-wide registry is reachable from it. The scene
/// identifier may be absent: anonymous scenes are valid, and their local
/// state is keyed under [`UNKNOWN_SCENE`].
pub fn is_valid_scene(candidate: Option<&dyn SceneContext>) -> bool {
    candidate.is_some_and(|scene| scene.registry().is_some())
}

/// Group several writes
///
/// Writes currently apply and notify immediately; this is the hook point
/// for coalescing them.
pub fn batch_update<R>(updates: impl FnOnce() -> R) -> R {
    updates()
}

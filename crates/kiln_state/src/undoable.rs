//! Linear undo/redo
//!
//! An [`UndoableState`] keeps three ordinary handles side by side: the live
//! value at `key`, the history at `key:history` and the cursor at
//! `key:history-index`. After every write, undo and redo, the history entry
//! under the cursor equals the live value.

use crate::error::Result;
use crate::handle::{StateEvent, StateHandle, StateOptions, StateSource, Subscription};
use crate::log::Logger;
use crate::scope::state_def_in;
use kiln_core::SceneContext;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Suffix of the history slot
pub const HISTORY_SUFFIX: &str = ":history";
/// Suffix of the cursor slot
pub const HISTORY_INDEX_SUFFIX: &str = ":history-index";

/// State with a bounded, linear undo history
pub struct UndoableState<T> {
    current: StateHandle<T>,
    history: StateHandle<Vec<T>>,
    index: StateHandle<usize>,
    max_history: usize,
    logger: Logger,
}

/// Create an undoable state
///
/// `max_history` caps the number of retained values, including the live
/// one. It defaults to the scene's `max_history` and is at least 1. The
/// three slots share the scope selected by `options.global`.
pub fn with_undoable_state<T, S>(
    scene: &S,
    key: &str,
    initial: T,
    max_history: Option<usize>,
    options: StateOptions<T>,
) -> Result<UndoableState<T>>
where
    T: Clone + 'static,
    S: SceneContext + ?Sized,
{
    let max_history = max_history
        .unwrap_or(scene.state_defaults().max_history)
        .max(1);
    let history_key = format!("{key}{HISTORY_SUFFIX}");
    let index_key = format!("{key}{HISTORY_INDEX_SUFFIX}");
    let history_options = StateOptions::new()
        .global(options.global)
        .debug(options.debug);
    let index_options = StateOptions::new()
        .global(options.global)
        .debug(options.debug);

    let current = state_def_in("undoable", scene, key, Some(initial), options)?;
    let live = current.current()?;
    let history = state_def_in(
        "undoable",
        scene,
        &history_key,
        Some(vec![live]),
        history_options,
    )?;
    let index = state_def_in("undoable", scene, &index_key, Some(0), index_options)?;

    let logger = current.logger().scoped("undoable");
    logger.debug(format_args!("history capped at {max_history}"));

    Ok(UndoableState {
        current,
        history,
        index,
        max_history,
        logger,
    })
}

impl<T: Clone + 'static> UndoableState<T> {
    pub fn key(&self) -> &str {
        self.current.key()
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    pub fn try_get(&self) -> Option<T> {
        self.current.try_get()
    }

    pub fn get(&self) -> T
    where
        T: Default,
    {
        self.current.get()
    }

    /// Recorded values, oldest first
    pub fn history(&self) -> Vec<T> {
        self.history.try_get().unwrap_or_default()
    }

    /// Position of the live value in [`history`](Self::history)
    pub fn history_index(&self) -> usize {
        self.index.try_get().unwrap_or_default()
    }

    /// Validate and record a new value
    ///
    /// Discards any redo entries, appends, and evicts the oldest entries
    /// beyond the cap. The cursor always ends on the new value.
    pub fn set(&self, value: T) -> Result<()> {
        self.current.validate(&value)?;

        let mut history = self.history.current()?;
        let index = self.history_index();
        history.truncate(index + 1);
        history.push(value.clone());
        if history.len() > self.max_history {
            let evicted = history.len() - self.max_history;
            history.drain(..evicted);
            self.logger
                .debug(format_args!("evicted {evicted} oldest entries"));
        }
        let index = history.len() - 1;

        self.history.replace(history);
        self.index.replace(index);
        self.current.replace(value);
        Ok(())
    }

    /// Compute the next value from the current one and [`set`](Self::set) it
    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&T) -> T,
    {
        let current = self.current.current()?;
        self.set(f(&current))
    }

    pub fn can_undo(&self) -> bool {
        self.history_index() > 0
    }

    pub fn can_redo(&self) -> bool {
        self.history_index() + 1 < self.history().len()
    }

    /// Step back one entry. Returns false if there is nothing to undo.
    pub fn undo(&self) -> bool {
        let index = self.history_index();
        if index == 0 {
            return false;
        }
        self.move_to(index - 1)
    }

    /// Step forward one entry. Returns false if there is nothing to redo.
    pub fn redo(&self) -> bool {
        self.move_to(self.history_index() + 1)
    }

    fn move_to(&self, index: usize) -> bool {
        let Some(value) = self.history().get(index).cloned() else {
            return false;
        };
        self.logger.debug(format_args!("cursor moved to {index}"));
        self.index.replace(index);
        self.current.replace(value);
        true
    }

    /// Collapse the history to the live value
    pub fn clear_history(&self) -> Result<()> {
        let live = self.current.current()?;
        self.history.replace(vec![live]);
        self.index.replace(0);
        self.logger.debug("history cleared");
        Ok(())
    }

    pub fn on<F>(&self, event: StateEvent, callback: F) -> Subscription
    where
        F: Fn(&T, Option<&T>) + 'static,
    {
        self.current.on(event, callback)
    }

    pub fn once<F>(&self, event: StateEvent, callback: F) -> Subscription
    where
        F: Fn(&T, Option<&T>) + 'static,
    {
        self.current.once(event, callback)
    }

    pub fn off(&self, event: StateEvent, subscription: &Subscription) -> bool {
        self.current.off(event, subscription)
    }

    pub fn clear_listeners(&self) {
        self.current.clear_listeners()
    }
}

impl<T> UndoableState<T>
where
    T: Clone + Serialize + DeserializeOwned + 'static,
{
    /// Deep-merge `partial` into the live value and record the result
    pub fn patch(&self, partial: Value) -> Result<()> {
        let next = self.current.patched(partial)?;
        self.set(next)
    }

    pub fn patch_with<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&T) -> Value,
    {
        let next = self.current.patched_with(f)?;
        self.set(next)
    }
}

impl<T: Clone + 'static> StateSource<T> for UndoableState<T> {
    fn key(&self) -> &str {
        UndoableState::key(self)
    }

    fn try_get(&self) -> Option<T> {
        UndoableState::try_get(self)
    }

    fn on<F>(&self, event: StateEvent, callback: F) -> Subscription
    where
        F: Fn(&T, Option<&T>) + 'static,
    {
        UndoableState::on(self, event, callback)
    }

    fn once<F>(&self, event: StateEvent, callback: F) -> Subscription
    where
        F: Fn(&T, Option<&T>) + 'static,
    {
        UndoableState::once(self, event, callback)
    }

    fn off(&self, event: StateEvent, subscription: &Subscription) -> bool {
        UndoableState::off(self, event, subscription)
    }

    fn clear_listeners(&self) {
        UndoableState::clear_listeners(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StateError;
    use crate::validators;
    use kiln_core::{Game, GameConfig, KeyedStore, MemoryStorage};
    use serde::Deserialize;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Brush {
        size: u8,
        color: String,
    }

    fn assert_cursor_on_live<T: Clone + PartialEq + std::fmt::Debug + 'static>(
        state: &UndoableState<T>,
    ) {
        let history = state.history();
        assert!(state.history_index() < history.len());
        assert_eq!(
            history.get(state.history_index()).cloned(),
            state.try_get()
        );
    }

    #[test]
    fn test_undo_redo_round_trip() {
        let game = Game::new();
        let scene = game.create_scene("s");
        let state = with_undoable_state(&scene, "x", 0, None, StateOptions::new()).unwrap();

        state.set(1).unwrap();
        state.set(2).unwrap();
        assert!(state.undo());
        assert_eq!(state.get(), 1);
        assert!(state.redo());
        assert_eq!(state.get(), 2);
        assert!(!state.redo());
        assert!(state.undo());
        assert!(state.undo());
        assert_eq!(state.get(), 0);
        assert!(!state.undo());
        assert_cursor_on_live(&state);
    }

    #[test]
    fn test_new_write_discards_redo_branch() {
        let game = Game::new();
        let scene = game.create_scene("s");
        let state = with_undoable_state(&scene, "x", 0, None, StateOptions::new()).unwrap();

        state.set(1).unwrap();
        state.set(2).unwrap();
        state.undo();
        state.set(3).unwrap();

        assert_eq!(state.history(), vec![0, 1, 3]);
        assert_eq!(state.history_index(), 2);
        assert!(!state.can_redo());
        assert_cursor_on_live(&state);
    }

    #[test]
    fn test_eviction_keeps_cursor_on_live_value() {
        let game = Game::new();
        let scene = game.create_scene("s");
        let state = with_undoable_state(&scene, "x", 0, Some(3), StateOptions::new()).unwrap();

        for n in 1..=5 {
            state.set(n).unwrap();
            assert_cursor_on_live(&state);
            assert!(state.history().len() <= 3);
        }

        assert_eq!(state.history(), vec![3, 4, 5]);
        assert_eq!(state.history_index(), 2);
        assert!(state.undo());
        assert_eq!(state.get(), 4);
        assert!(state.undo());
        assert_eq!(state.get(), 3);
        assert!(!state.undo());
    }

    #[test]
    fn test_eviction_after_undo() {
        let game = Game::new();
        let scene = game.create_scene("s");
        let state = with_undoable_state(&scene, "x", 0, Some(2), StateOptions::new()).unwrap();

        state.set(1).unwrap();
        state.undo();
        state.set(2).unwrap();
        assert_eq!(state.history(), vec![0, 2]);
        assert_cursor_on_live(&state);

        state.set(3).unwrap();
        assert_eq!(state.history(), vec![2, 3]);
        assert_cursor_on_live(&state);
    }

    #[test]
    fn test_cap_of_zero_behaves_as_one() {
        let game = Game::new();
        let scene = game.create_scene("s");
        let state = with_undoable_state(&scene, "x", 0, Some(0), StateOptions::new()).unwrap();

        state.set(1).unwrap();
        assert_eq!(state.max_history(), 1);
        assert_eq!(state.history(), vec![1]);
        assert!(!state.can_undo());
    }

    #[test]
    fn test_default_cap_from_config() {
        let mut config = GameConfig::default();
        config.state.max_history = 4;
        let game = Game::from_parts(
            config,
            Rc::new(MemoryStorage::new()),
            Rc::new(MemoryStorage::new()),
        );
        let scene = game.create_scene("s");
        let state = with_undoable_state(&scene, "x", 0, None, StateOptions::new()).unwrap();
        assert_eq!(state.max_history(), 4);
    }

    #[test]
    fn test_clear_history() {
        let game = Game::new();
        let scene = game.create_scene("s");
        let state = with_undoable_state(&scene, "x", 0, None, StateOptions::new()).unwrap();

        state.set(1).unwrap();
        state.set(2).unwrap();
        state.undo();
        state.clear_history().unwrap();

        assert_eq!(state.history(), vec![1]);
        assert_eq!(state.history_index(), 0);
        assert!(!state.can_undo());
        assert!(!state.can_redo());
        assert_eq!(state.get(), 1);
    }

    #[test]
    fn test_rejected_write_leaves_history_alone() {
        let game = Game::new();
        let scene = game.create_scene("s");
        let state = with_undoable_state(
            &scene,
            "x",
            0,
            None,
            StateOptions::new().validator(validators::range(0, 10)),
        )
        .unwrap();

        state.set(4).unwrap();
        let err = state.set(40).unwrap_err();
        assert!(matches!(
            err,
            StateError::Validation {
                context: "undoable",
                ..
            }
        ));
        assert!(err.to_string().starts_with("undoable 'x': validation failed"));
        assert_eq!(state.history(), vec![0, 4]);
        assert_eq!(state.get(), 4);
    }

    #[test]
    fn test_patch_records_history() {
        let game = Game::new();
        let scene = game.create_scene("s");
        let state = with_undoable_state(
            &scene,
            "brush",
            Brush {
                size: 1,
                color: "red".into(),
            },
            None,
            StateOptions::new(),
        )
        .unwrap();

        state.patch(json!({ "size": 4 })).unwrap();
        state
            .patch_with(|brush| json!({ "size": brush.size * 2 }))
            .unwrap();
        assert_eq!(state.get().size, 8);

        state.undo();
        assert_eq!(
            state.get(),
            Brush {
                size: 4,
                color: "red".into()
            }
        );
        assert_eq!(state.history().len(), 3);
    }

    #[test]
    fn test_listeners_see_undo_and_redo() {
        let game = Game::new();
        let scene = game.create_scene("s");
        let state = with_undoable_state(&scene, "x", 0, None, StateOptions::new()).unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        let _sub = state.on(StateEvent::Change, move |value, _| log.borrow_mut().push(*value));

        state.set(1).unwrap();
        state.undo();
        state.redo();
        assert_eq!(*seen.borrow(), vec![1, 0, 1]);
    }

    #[test]
    fn test_slots_share_scope() {
        let game = Game::new();
        let scene = game.create_scene("s");
        let _local = with_undoable_state(&scene, "doc", 0, None, StateOptions::new()).unwrap();
        let _global =
            with_undoable_state(&scene, "cfg", 0, None, StateOptions::new().global(true)).unwrap();

        let data = scene.data_store();
        assert!(data.has("doc"));
        assert!(data.has("doc:history"));
        assert!(data.has("doc:history-index"));
        assert!(game.registry().has("cfg:history"));
        assert!(game.registry().has("cfg:history-index"));
    }
}

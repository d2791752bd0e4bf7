//! End-to-end behavior of scene state through `Game` and `Scene`

use kiln_core::{DurableStorage, Game, GameConfig, KeyedStore, MemoryStorage, SceneContext};
use kiln_state::{
    batch_update, is_valid_scene, validators, with_computed_state, with_debounced_state,
    with_global_state, with_local_state, with_persistent_state, with_undoable_state,
    PersistOptions, StateError, StateEvent, StateOptions,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("kiln_state=debug"))
        .with_test_writer()
        .try_init();
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct Player {
    name: String,
    stats: Stats,
    tags: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct Stats {
    hp: u32,
    mp: u32,
}

#[test]
fn listeners_fire_in_registration_order_before_set_returns() {
    init_tracing();
    let game = Game::new();
    let scene = game.create_scene("arena");
    let score = with_local_state(&scene, "score", Some(0), StateOptions::new().debug(true)).unwrap();

    let order = Rc::new(RefCell::new(Vec::new()));
    let first = order.clone();
    let second = order.clone();
    let _a = score.on(StateEvent::Change, move |value, previous| {
        first.borrow_mut().push(("first", *value, previous.copied()));
    });
    let _b = score.on(StateEvent::Change, move |value, previous| {
        second.borrow_mut().push(("second", *value, previous.copied()));
    });

    score.set(10).unwrap();
    assert_eq!(
        *order.borrow(),
        vec![("first", 10, Some(0)), ("second", 10, Some(0))]
    );
}

#[test]
fn existing_value_wins_over_initial() {
    let game = Game::new();
    let scene = game.create_scene("arena");
    let first = with_local_state(&scene, "wave", Some(3), StateOptions::new()).unwrap();
    let second = with_local_state(&scene, "wave", Some(99), StateOptions::new()).unwrap();

    assert_eq!(first.get(), 3);
    assert_eq!(second.get(), 3);
}

#[test]
fn failed_validation_writes_nothing_and_notifies_nobody() {
    let game = Game::new();
    let scene = game.create_scene("arena");
    let name = with_local_state(
        &scene,
        "name",
        Some(String::from("hero")),
        StateOptions::new().validator(validators::non_empty()),
    )
    .unwrap();

    let calls = Rc::new(Cell::new(0));
    let counter = calls.clone();
    let _sub = name.on(StateEvent::Change, move |_, _| counter.set(counter.get() + 1));

    let err = name.set("   ".into()).unwrap_err();
    assert!(matches!(err, StateError::Validation { .. }));
    assert!(err.to_string().contains("Value must not be empty"));
    assert_eq!(name.get(), "hero");
    assert_eq!(calls.get(), 0);
}

#[test]
fn invalid_initial_value_fails_construction() {
    let game = Game::new();
    let scene = game.create_scene("arena");
    let result = with_local_state(
        &scene,
        "difficulty",
        Some("impossible"),
        StateOptions::new().validator(validators::one_of(["easy", "hard"])),
    );
    assert!(matches!(result, Err(StateError::Validation { .. })));
    assert!(!scene.data_store().has("local:arena:difficulty"));
}

#[test]
fn patch_merges_nested_objects_and_replaces_arrays() {
    let game = Game::new();
    let scene = game.create_scene("arena");
    let player = with_local_state(
        &scene,
        "player",
        Some(Player {
            name: "ada".into(),
            stats: Stats { hp: 10, mp: 4 },
            tags: vec!["new".into(), "brave".into()],
        }),
        StateOptions::new(),
    )
    .unwrap();

    player
        .patch(json!({ "stats": { "hp": 7 }, "tags": ["veteran"] }))
        .unwrap();

    assert_eq!(
        player.get(),
        Player {
            name: "ada".into(),
            stats: Stats { hp: 7, mp: 4 },
            tags: vec!["veteran".into()],
        }
    );
}

#[test]
fn patch_on_scalar_fails() {
    let game = Game::new();
    let scene = game.create_scene("arena");
    let hp = with_local_state(&scene, "hp", Some(5u32), StateOptions::new()).unwrap();
    assert!(matches!(
        hp.patch(json!({ "x": 1 })),
        Err(StateError::NotAnObject { .. })
    ));
    assert_eq!(hp.get(), 5);
}

#[test]
fn once_fires_a_single_time_and_unsubscribe_is_idempotent() {
    let game = Game::new();
    let scene = game.create_scene("arena");
    let n = with_local_state(&scene, "n", Some(0), StateOptions::new()).unwrap();

    let calls = Rc::new(Cell::new(0));
    let counter = calls.clone();
    let once = n.once(StateEvent::Change, move |_, _| counter.set(counter.get() + 1));
    n.set(1).unwrap();
    n.set(2).unwrap();
    assert_eq!(calls.get(), 1);
    assert!(!once.unsubscribe());

    let counter = calls.clone();
    let sub = n.on(StateEvent::Change, move |_, _| counter.set(counter.get() + 1));
    assert!(sub.unsubscribe());
    assert!(!sub.unsubscribe());
    n.set(3).unwrap();
    assert_eq!(calls.get(), 1);
}

#[test]
fn scenes_isolate_local_state_and_share_global_state() {
    let game = Game::new();
    let title = game.create_scene("title");
    let level = game.create_scene("level");

    let title_music = with_local_state(&title, "music", Some(true), StateOptions::new()).unwrap();
    let level_music = with_local_state(&level, "music", Some(false), StateOptions::new()).unwrap();
    assert!(title_music.get());
    assert!(!level_music.get());

    let coins = with_global_state(&title, "coins", Some(0u32), StateOptions::new()).unwrap();
    let seen = Rc::new(Cell::new(0));
    let watcher = seen.clone();
    let level_coins = with_global_state::<u32, _>(&level, "coins", None, StateOptions::new()).unwrap();
    let _sub = level_coins.on(StateEvent::Change, move |coins, _| watcher.set(*coins));

    coins.update(|c| c + 50).unwrap();
    assert_eq!(level_coins.get(), 50);
    assert_eq!(seen.get(), 50);
}

#[test]
fn computed_follows_and_refuses_writes() {
    let game = Game::new();
    let scene = game.create_scene("hud");
    let hp = with_local_state(&scene, "hp", Some(40u32), StateOptions::new()).unwrap();
    let low = with_computed_state(&hp, |hp: &u32| *hp < 20).unwrap();

    assert!(!low.get());
    hp.set(15).unwrap();
    assert!(low.get());
    assert!(matches!(low.set(false), Err(StateError::ReadOnly { .. })));
}

#[test]
fn debounced_burst_notifies_once_with_last_value() {
    let game = Game::new();
    let scene = game.create_scene("search");
    let window = game.config().state.debounce();
    let query = with_debounced_state(
        &scene,
        "query",
        Some(0),
        window,
        StateOptions::new(),
    )
    .unwrap();

    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = seen.clone();
    let _sub = query.on(StateEvent::Change, move |value, _| log.borrow_mut().push(*value));

    query.set(1).unwrap();
    query.set(2).unwrap();
    query.set(3).unwrap();
    assert!(seen.borrow().is_empty());

    game.advance(window - Duration::from_millis(1));
    assert!(seen.borrow().is_empty());
    game.advance(Duration::from_millis(1));
    assert_eq!(*seen.borrow(), vec![3]);
}

#[test]
fn persistent_value_is_restored_by_a_fresh_game() {
    init_tracing();
    let local = Rc::new(MemoryStorage::new());
    let boot = |local: &Rc<MemoryStorage>| {
        Game::from_parts(
            GameConfig::default(),
            local.clone(),
            Rc::new(MemoryStorage::new()),
        )
    };

    let game = boot(&local);
    let scene = game.create_scene("s");
    let stats = with_persistent_state(
        &scene,
        "stats",
        Some(Stats::default()),
        PersistOptions::default(),
        StateOptions::new(),
    )
    .unwrap();
    stats.patch(json!({ "hp": 5 })).unwrap();
    assert_eq!(
        local.get_item("kiln:stats").unwrap().as_deref(),
        Some(r#"{"hp":5,"mp":0}"#)
    );
    drop(stats);
    drop(scene);
    drop(game);

    let game = boot(&local);
    let scene = game.create_scene("s");
    let stats = with_persistent_state(
        &scene,
        "stats",
        Some(Stats { hp: 100, mp: 100 }),
        PersistOptions::default(),
        StateOptions::new(),
    )
    .unwrap();
    assert_eq!(stats.get(), Stats { hp: 5, mp: 0 });
}

#[test]
fn undo_redo_round_trip_keeps_cursor_on_live_value() {
    let game = Game::new();
    let scene = game.create_scene("editor");
    let x = with_undoable_state(&scene, "x", 0, None, StateOptions::new()).unwrap();

    x.set(1).unwrap();
    x.set(2).unwrap();
    assert!(x.undo());
    assert_eq!(x.get(), 1);
    assert!(x.redo());
    assert_eq!(x.get(), 2);
    assert!(!x.redo());

    let history = x.history();
    assert_eq!(history[x.history_index()], x.get());
}

#[test]
fn scene_guard_and_batch() {
    let game = Game::new();
    let scene = game.create_scene("s");
    assert!(is_valid_scene(Some(&scene as &dyn SceneContext)));
    assert!(!is_valid_scene(None));

    let a = with_local_state(&scene, "a", Some(1), StateOptions::new()).unwrap();
    let doubled = batch_update(|| {
        a.update(|a| a * 2).unwrap();
        a.get()
    });
    assert_eq!(doubled, 2);
}

#[test]
fn persistent_value_survives_restart_on_disk() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let mut config = GameConfig::default();
    config.storage.local_dir = Some(dir.path().join("saves"));

    {
        let game = Game::with_config(config.clone()).unwrap();
        let scene = game.create_scene("title");
        let stats = with_persistent_state(
            &scene,
            "stats",
            Some(Stats::default()),
            PersistOptions::default(),
            StateOptions::new(),
        )
        .unwrap();
        stats.set(Stats { hp: 12, mp: 3 }).unwrap();
    }
    assert!(dir.path().join("saves").join("kiln%3Astats.json").exists());

    let game = Game::with_config(config).unwrap();
    let scene = game.create_scene("title");
    let stats = with_persistent_state(
        &scene,
        "stats",
        Some(Stats::default()),
        PersistOptions::default(),
        StateOptions::new(),
    )
    .unwrap();
    assert_eq!(stats.get(), Stats { hp: 12, mp: 3 });
}

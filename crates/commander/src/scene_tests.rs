// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::error::Error;
use crate::test_support::{scene_dir, scene_step};

fn good_night() -> serde_json::Value {
    serde_json::json!({
        "name": "Good Night",
        "description": "Lower all privacy shades for nighttime",
        "commands": [scene_step(14, Action::Lower, 750), scene_step(28, Action::Lower, 0)],
        "retry_count": 1,
        "timeout_seconds": 30,
    })
}

#[test]
fn load_parses_and_validates() {
    let dir = scene_dir(&[("good_night", good_night())]);
    let store = SceneStore::new(dir.path());

    let scene = store.load("good_night").expect("loads");
    assert_eq!(scene.name, "Good Night");
    assert_eq!(scene.commands.len(), 2);
    assert_eq!(scene.commands[0].action, Action::Lower);
    assert_eq!(scene.commands[0].delay_ms, 750);
    assert_eq!(scene.retry_count, 1);
}

#[test]
fn load_missing_scene_is_not_found() {
    let dir = scene_dir(&[]);
    let store = SceneStore::new(dir.path());
    assert_eq!(
        store.load("dusk"),
        Err(Error::SceneNotFound { scene: "dusk".to_owned() })
    );
}

#[test]
fn load_rejects_path_traversal_names() {
    let dir = scene_dir(&[("good_night", good_night())]);
    let store = SceneStore::new(dir.path());
    assert!(matches!(
        store.load("../good_night"),
        Err(Error::SceneNotFound { .. })
    ));
}

#[test]
fn load_malformed_document_is_invalid() {
    let dir = scene_dir(&[]);
    std::fs::write(dir.path().join("broken.json"), "{not json").expect("write");
    let store = SceneStore::new(dir.path());
    assert!(matches!(store.load("broken"), Err(Error::SceneInvalid { .. })));
}

#[yare::parameterized(
    no_commands     = { serde_json::json!({"name": "x", "description": "y", "commands": []}) },
    retries_too_big = { serde_json::json!({
        "name": "x", "description": "y",
        "commands": [{"shade_id": 1, "action": "u"}],
        "retry_count": 6,
    }) },
    timeout_zero    = { serde_json::json!({
        "name": "x", "description": "y",
        "commands": [{"shade_id": 1, "action": "u"}],
        "timeout_seconds": 0,
    }) },
    timeout_too_big = { serde_json::json!({
        "name": "x", "description": "y",
        "commands": [{"shade_id": 1, "action": "u"}],
        "timeout_seconds": 301,
    }) },
)]
fn load_rejects_out_of_bounds_documents(doc: serde_json::Value) {
    let dir = scene_dir(&[("bad", doc)]);
    let store = SceneStore::new(dir.path());
    assert!(matches!(store.load("bad"), Err(Error::SceneInvalid { .. })));
}

#[test]
fn step_defaults_apply() {
    let dir = scene_dir(&[(
        "minimal",
        serde_json::json!({
            "name": "Minimal",
            "description": "one step",
            "commands": [{"shade_id": 14, "action": "u"}],
        }),
    )]);
    let store = SceneStore::new(dir.path());

    let scene = store.load("minimal").expect("loads");
    assert_eq!(scene.commands[0].delay_ms, 1000);
    assert_eq!(scene.retry_count, 2);
    assert_eq!(scene.timeout_seconds, 30);
}

#[test]
fn list_skips_unloadable_scenes() {
    let dir = scene_dir(&[("good_night", good_night())]);
    std::fs::write(dir.path().join("broken.json"), "{not json").expect("write");
    std::fs::write(dir.path().join("notes.txt"), "not a scene").expect("write");
    let store = SceneStore::new(dir.path());

    let scenes = store.list();
    assert_eq!(scenes.len(), 1);
    assert_eq!(scenes[0].name, "good_night");
    assert_eq!(scenes[0].display_name, "Good Night");
    assert_eq!(scenes[0].command_count, 2);
}

#[test]
fn missing_directory_is_an_empty_store() {
    let store = SceneStore::new("/nonexistent/scenes");
    assert!(store.names().is_empty());
    assert!(store.list().is_empty());
}

#[test]
fn estimated_duration_sums_delays_plus_base_cost() {
    let dir = scene_dir(&[("good_night", good_night())]);
    let store = SceneStore::new(dir.path());
    let scene = store.load("good_night").expect("loads");
    assert_eq!(scene.estimated_duration_ms(), 750 + 2 * 500);
}

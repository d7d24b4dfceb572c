#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Manifest consistency checks: the feature table and lint policy the docs
//! and CI rely on must actually exist in Cargo.toml.

use std::path::Path;

fn manifest() -> toml::Value {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("Cargo.toml");
    let raw = std::fs::read_to_string(path).expect("read Cargo.toml");
    raw.parse().expect("parse Cargo.toml")
}

#[test]
fn websocket_transport_is_the_default_feature() {
    let manifest = manifest();
    let features = manifest.get("features").unwrap().as_table().unwrap();

    let default: Vec<&str> = features
        .get("default")
        .unwrap()
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert!(default.contains(&"transport-websocket"));
}

#[test]
fn websocket_feature_pulls_in_the_runtime() {
    let manifest = manifest();
    let features = manifest.get("features").unwrap().as_table().unwrap();

    let websocket: Vec<&str> = features
        .get("transport-websocket")
        .unwrap()
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert!(websocket.contains(&"dep:tokio-tungstenite"));
    assert!(websocket.contains(&"dep:futures-util"));
    assert!(websocket.contains(&"tokio-runtime"));

    let runtime: Vec<&str> = features
        .get("tokio-runtime")
        .unwrap()
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert!(runtime.contains(&"tokio/rt"));
    assert!(runtime.contains(&"tokio/time"));
}

#[test]
fn panic_prone_clippy_lints_stay_denied() {
    let manifest = manifest();
    let clippy = manifest
        .get("lints")
        .unwrap()
        .get("clippy")
        .unwrap()
        .as_table()
        .unwrap();

    for lint in [
        "unwrap_used",
        "expect_used",
        "panic",
        "todo",
        "unimplemented",
        "indexing_slicing",
    ] {
        assert_eq!(
            clippy.get(lint).and_then(|v| v.as_str()),
            Some("deny"),
            "clippy::{lint} must stay denied"
        );
    }
}

#[test]
fn demos_are_registered_as_examples() {
    let manifest = manifest();
    let examples = manifest.get("example").unwrap().as_array().unwrap();
    let names: Vec<&str> = examples
        .iter()
        .map(|e| e.get("name").unwrap().as_str().unwrap())
        .collect();
    assert!(names.contains(&"basic_room"));
    assert!(names.contains(&"loopback_round"));

    for example in examples {
        let path = example.get("path").unwrap().as_str().unwrap();
        assert!(
            Path::new(env!("CARGO_MANIFEST_DIR")).join(path).exists(),
            "example source {path} is missing"
        );
    }
}

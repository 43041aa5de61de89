//! Validates contract fixtures and live serializations against frozen JSON schemas.

use std::time::{Duration, Instant};

use jsonschema::JSONSchema;
use serde_json::Value;
use staring_app::{LossReplay, ReplayManifest};
use staring_classifier_contract::{AttentionStatus, parse_classification};
use staring_core::{Frame, LossCause, ReplayBuffer, Session, SessionState};
use staring_ui::UiState;

fn load_json(path: &str) -> Value {
    let raw = std::fs::read_to_string(path).expect("json file should be readable");
    serde_json::from_str(&raw).expect("json file should be valid")
}

fn compile_validator(schema_path: &str) -> JSONSchema {
    let schema = load_json(schema_path);
    JSONSchema::compile(&schema).expect("schema should compile")
}

fn classification_validator() -> JSONSchema {
    compile_validator(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../contracts/classification-event.schema.json"
    ))
}

fn ui_state_validator() -> JSONSchema {
    compile_validator(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../contracts/ui-state.schema.json"
    ))
}

fn replay_manifest_validator() -> JSONSchema {
    compile_validator(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../contracts/replay-manifest.schema.json"
    ))
}

#[test]
fn classification_fixture_matches_schema_and_parser() {
    let validator = classification_validator();
    let path = concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../contracts/fixtures/classification-event.valid.json"
    );
    let fixture = load_json(path);
    assert!(
        validator.is_valid(&fixture),
        "classification fixture should validate against schema"
    );

    let raw = std::fs::read_to_string(path).expect("fixture should be readable");
    let event = parse_classification(&raw).expect("fixture should parse");
    assert_eq!(event.status, AttentionStatus::Distracted);
    assert_eq!(event.eye_aspect_ratio, Some(0.14));
}

#[test]
fn classification_schema_rejects_what_the_parser_rejects() {
    let validator = classification_validator();
    for raw in [r#"{"error":"No face detected"}"#, r#"{"status":3}"#, r#"["Distracted"]"#] {
        let value: Value = serde_json::from_str(raw).expect("sample should be json");
        assert!(!validator.is_valid(&value), "{raw} should not validate");
        assert!(parse_classification(raw).is_err(), "{raw} should not parse");
    }
}

#[test]
fn ui_state_fixture_matches_schema() {
    let validator = ui_state_validator();
    let fixture = load_json(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../contracts/fixtures/ui-state.valid.json"
    ));
    assert!(
        validator.is_valid(&fixture),
        "ui state fixture should validate against schema"
    );
}

#[test]
fn ui_state_serialization_matches_schema_in_every_screen() {
    let validator = ui_state_validator();
    let mut ui = UiState::new(staring_app::app_version(), 3);
    let causes = [
        None,
        Some(LossCause::LookedAway),
        Some(LossCause::BlinkLimit { count: 10 }),
        Some(LossCause::FocusLost),
        Some(LossCause::PlaybackFault {
            reason: "decode error".to_string(),
        }),
    ];

    for state in [
        SessionState::Idle,
        SessionState::Playing,
        SessionState::Completed,
        SessionState::Won,
    ] {
        let session = Session {
            level: u32::from(state != SessionState::Idle),
            state,
            distraction_count: 0,
        };
        ui.apply_session(&session, None);
        let value = serde_json::to_value(&ui).expect("ui state should serialize");
        assert!(validator.is_valid(&value), "{state:?} screen should validate");
    }

    for cause in causes.iter().flatten() {
        let session = Session {
            level: 2,
            state: SessionState::Lost,
            distraction_count: 3,
        };
        ui.apply_session(&session, Some(cause));
        let value = serde_json::to_value(&ui).expect("ui state should serialize");
        assert!(validator.is_valid(&value), "{cause:?} screen should validate");
    }
}

#[test]
fn replay_manifest_fixture_matches_schema() {
    let validator = replay_manifest_validator();
    let fixture = load_json(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../contracts/fixtures/replay-manifest.valid.json"
    ));
    assert!(
        validator.is_valid(&fixture),
        "replay manifest fixture should validate against schema"
    );
}

#[test]
fn replay_manifest_serialization_matches_schema() {
    let validator = replay_manifest_validator();
    let origin = Instant::now();
    let mut buffer = ReplayBuffer::new(4).expect("capacity should be valid");
    for sequence in 1..=6_u64 {
        buffer.push(Frame::new(
            vec![0xFF, 0xD8, 0xFF, 0xD9],
            origin + Duration::from_millis(100 * sequence),
            sequence,
        ));
    }
    let replay = LossReplay {
        session_id: staring_app::new_session_id(),
        level: 1,
        cause: LossCause::BlinkLimit { count: 10 },
        snapshot: buffer.snapshot(),
    };

    let value = serde_json::to_value(ReplayManifest::from_replay(&replay))
        .expect("manifest should serialize");
    assert!(validator.is_valid(&value), "manifest should validate: {value}");
    assert_eq!(value["frames"][0]["sequence"], 3);
}

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Protocol serialization tests for the Decoy Den client.
//!
//! Verifies round-trip serialization of every protocol type, including all
//! `ServerEvent` and `ClientMessage` variants, `ErrorCode`
//! SCREAMING_SNAKE_CASE encoding, historical camelCase aliases, and JSON
//! fixtures that match real server output.

use decoy_den_client::error_codes::ErrorCode;
use decoy_den_client::protocol::{
    Assignment, ClientMessage, ParticipantEntry, Phase, Role, ServerEvent, StateData, TimerValue,
};

mod common;

// ════════════════════════════════════════════════════════════════════
// Helpers
// ════════════════════════════════════════════════════════════════════

/// Serialize `val` to JSON, then deserialize back to `T` and return it.
fn round_trip<T: serde::Serialize + serde::de::DeserializeOwned>(val: &T) -> T {
    let json = serde_json::to_string(val).expect("serialize");
    serde_json::from_str(&json).expect("deserialize")
}

fn test_uuid(n: u128) -> uuid::Uuid {
    uuid::Uuid::from_u128(n)
}

// ════════════════════════════════════════════════════════════════════
// Phase
// ════════════════════════════════════════════════════════════════════

#[test]
fn phase_round_trips_every_variant() {
    for phase in [
        Phase::Waiting,
        Phase::SettingTopic,
        Phase::Discussing,
        Phase::Answering,
        Phase::Checking,
        Phase::Finished,
    ] {
        assert_eq!(round_trip(&phase), phase);
    }
}

#[test]
fn phase_display_matches_wire_name() {
    let json = serde_json::to_string(&Phase::SettingTopic).unwrap();
    assert_eq!(json, format!("\"{}\"", Phase::SettingTopic));
}

#[test]
fn unknown_phase_name_fails_parse() {
    // An event naming an unknown phase must fall through to Unknown.
    let json = r#"{"type":"STATE_UPDATE","payload":{"next_phase":"intermission"}}"#;
    let event = ServerEvent::parse(json);
    assert!(matches!(event, ServerEvent::Unknown { .. }));
}

// ════════════════════════════════════════════════════════════════════
// Server events
// ════════════════════════════════════════════════════════════════════

#[test]
fn state_update_round_trips_with_full_payload() {
    let event = ServerEvent::StateUpdate {
        next_phase: Phase::Discussing,
        data: Some(StateData {
            topic: Some("Movies".into()),
            theme: Some("Entertainment".into()),
            hint: Some("Think big screen".into()),
            answer: None,
            original_emojis: Some(common::strings(&["🎬", "🍿", "🎭"])),
            displayed_emojis: Some(common::strings(&["🎬", "🔧", "🎭"])),
            dummy_index: Some(1),
            dummy_emoji: Some("🔧".into()),
            assignments: Some(vec![Assignment {
                user_id: test_uuid(7),
                emoji: "🍎".into(),
            }]),
        }),
    };
    assert_eq!(round_trip(&event), event);
}

#[test]
fn state_update_accepts_historical_camel_case_payload() {
    // Shape produced by older server builds.
    let json = r#"{
        "type": "STATE_UPDATE",
        "payload": {
            "nextState": "discussing",
            "data": {
                "topic": "Movies",
                "originalEmojis": ["🎬","🍿","🎭"],
                "selected_emojis": ["🎬","🔧","🎭"],
                "dummyIndex": 1,
                "dummyEmoji": "🔧",
                "assignments": [
                    { "user_id": "00000000-0000-0000-0000-000000000007", "emoji": "🍎" }
                ]
            }
        }
    }"#;
    let ServerEvent::StateUpdate { next_phase, data } = ServerEvent::parse(json) else {
        panic!("expected StateUpdate");
    };
    assert_eq!(next_phase, Phase::Discussing);
    let data = data.unwrap();
    assert_eq!(data.displayed_emojis.unwrap()[1], "🔧");
    assert_eq!(data.dummy_index, Some(1));
    assert_eq!(data.assignments.unwrap()[0].user_id, test_uuid(7));
}

#[test]
fn state_update_without_data_round_trips() {
    let event = ServerEvent::StateUpdate {
        next_phase: Phase::Finished,
        data: None,
    };
    assert_eq!(round_trip(&event), event);
}

#[test]
fn participant_update_round_trips() {
    let event = ServerEvent::ParticipantUpdate {
        participants: vec![
            common::entry(test_uuid(1), "Hana", Role::Host, false),
            common::entry(test_uuid(2), "Alice", Role::Player, true),
        ],
    };
    assert_eq!(round_trip(&event), event);
}

#[test]
fn participant_update_tolerates_partial_entries() {
    // Delta updates may omit role and leadership.
    let json = r#"{
        "type": "PARTICIPANT_UPDATE",
        "payload": { "participants": [
            { "user_id": "00000000-0000-0000-0000-000000000001", "user_name": "Hana" }
        ]}
    }"#;
    let ServerEvent::ParticipantUpdate { participants } = ServerEvent::parse(json) else {
        panic!("expected ParticipantUpdate");
    };
    assert_eq!(participants.len(), 1);
    assert_eq!(participants[0].role, None);
    assert_eq!(participants[0].is_leader, None);
}

#[test]
fn participant_update_tolerates_string_leadership_flag() {
    let json = r#"{
        "type": "PARTICIPANTS_UPDATE",
        "payload": { "participants": [
            {
                "user_id": "2bc78967-4244-dcf6-4929-bc5ed70e4d09",
                "user_name": "あああ",
                "role": "player",
                "is_Leader": "true"
            }
        ]}
    }"#;
    let ServerEvent::ParticipantUpdate { participants } = ServerEvent::parse(json) else {
        panic!("expected ParticipantUpdate");
    };
    assert_eq!(participants[0].is_leader, Some(true));
}

#[test]
fn timer_tick_round_trips_both_shapes() {
    let numeric = ServerEvent::TimerTick {
        time: TimerValue::Seconds(159),
    };
    assert_eq!(round_trip(&numeric), numeric);

    let formatted = ServerEvent::TimerTick {
        time: TimerValue::Display("02:39".into()),
    };
    assert_eq!(round_trip(&formatted), formatted);
}

#[test]
fn timer_tick_fixture_matches_server_output() {
    let json = r#"{"type":"TIMER_TICK","payload":{"time":"02:39"}}"#;
    let ServerEvent::TimerTick { time } = ServerEvent::parse(json) else {
        panic!("expected TimerTick");
    };
    assert_eq!(time.to_string(), "02:39");
}

#[test]
fn error_event_round_trips() {
    let event = ServerEvent::Error {
        code: Some(ErrorCode::PermissionDenied),
        message: "Only the host can start the game".into(),
    };
    assert_eq!(round_trip(&event), event);

    let json = serde_json::to_string(&event).unwrap();
    assert!(json.contains("\"PERMISSION_DENIED\""));
}

#[test]
fn error_event_without_code_parses() {
    let json = r#"{"type":"ERROR","payload":{"message":"room is full"}}"#;
    let ServerEvent::Error { code, message } = ServerEvent::parse(json) else {
        panic!("expected Error");
    };
    assert_eq!(code, None);
    assert_eq!(message, "room is full");
}

#[test]
fn unrecognized_type_becomes_unknown_with_raw_preserved() {
    let raw = r#"{"type":"SPECTATE","payload":{"x":1}}"#;
    let ServerEvent::Unknown { raw: kept } = ServerEvent::parse(raw) else {
        panic!("expected Unknown");
    };
    assert_eq!(kept, raw);
}

#[test]
fn malformed_json_becomes_unknown() {
    assert!(matches!(
        ServerEvent::parse("{{{{"),
        ServerEvent::Unknown { .. }
    ));
    assert!(matches!(
        ServerEvent::parse(""),
        ServerEvent::Unknown { .. }
    ));
    assert!(matches!(
        ServerEvent::parse("[1,2,3]"),
        ServerEvent::Unknown { .. }
    ));
}

#[test]
fn binary_payload_normalizes_like_text() {
    let event = common::timer_tick("01:00");
    let json = serde_json::to_string(&event).unwrap();
    assert_eq!(ServerEvent::parse_bytes(json.as_bytes()), event);
}

#[test]
fn structured_payload_normalizes_like_text() {
    let event = common::timer_tick("01:00");
    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(ServerEvent::parse_value(value), event);

    let unknown = ServerEvent::parse_value(serde_json::json!({"type": "NEW"}));
    assert!(matches!(unknown, ServerEvent::Unknown { .. }));
}

// ════════════════════════════════════════════════════════════════════
// Client messages
// ════════════════════════════════════════════════════════════════════

#[test]
fn client_message_round_trips_every_variant() {
    let messages = vec![
        ClientMessage::Register {
            user_id: test_uuid(1),
            user_name: "Hana".into(),
            role: Role::Host,
            is_leader: false,
        },
        ClientMessage::RequestParticipants {
            room_id: test_uuid(9),
        },
        ClientMessage::Ping,
        ClientMessage::SubmitTopic {
            topic: "Movies".into(),
            original_emojis: common::strings(&["🎬", "🍿", "🎭"]),
            displayed_emojis: common::strings(&["🎬", "🔧", "🎭"]),
            dummy_index: 1,
            dummy_emoji: "🔧".into(),
        },
        ClientMessage::SubmitAnswer {
            user_id: test_uuid(2),
            answer: "Totoro".into(),
        },
        ClientMessage::StartGame,
        ClientMessage::SkipDiscussion,
    ];
    for msg in messages {
        assert_eq!(round_trip(&msg), msg);
    }
}

#[test]
fn register_fixture_matches_server_expectations() {
    let msg = ClientMessage::Register {
        user_id: test_uuid(1),
        user_name: "Hana".into(),
        role: Role::Player,
        is_leader: true,
    };
    let value: serde_json::Value =
        serde_json::from_str(&serde_json::to_string(&msg).unwrap()).unwrap();
    assert_eq!(value["type"], "CLIENT_CONNECTED");
    assert_eq!(value["payload"]["user_name"], "Hana");
    assert_eq!(value["payload"]["role"], "player");
    assert_eq!(value["payload"]["is_leader"], true);
}

#[test]
fn unit_messages_have_no_payload_key() {
    assert_eq!(
        serde_json::to_string(&ClientMessage::Ping).unwrap(),
        "{\"type\":\"PING\"}"
    );
    assert_eq!(
        serde_json::to_string(&ClientMessage::StartGame).unwrap(),
        "{\"type\":\"START_GAME\"}"
    );
}

// ════════════════════════════════════════════════════════════════════
// Participant entries
// ════════════════════════════════════════════════════════════════════

#[test]
fn participant_entry_round_trips() {
    let entry = ParticipantEntry {
        user_id: test_uuid(3),
        user_name: "Ben".into(),
        role: Some(Role::Player),
        is_leader: Some(false),
    };
    assert_eq!(round_trip(&entry), entry);
}

#[test]
fn role_wire_names_are_lowercase() {
    assert_eq!(serde_json::to_string(&Role::Host).unwrap(), "\"host\"");
    assert_eq!(serde_json::to_string(&Role::Player).unwrap(), "\"player\"");
}

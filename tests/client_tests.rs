#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! End-to-end client tests: full round flow, host/player decoy views,
//! protect-once framing, reconnection bounds, and reset teardown — all
//! driven through scripted transports.

use std::sync::Arc;
use std::time::Duration;

use decoy_den_client::client::{DecoyDenClient, DecoyDenConfig};
use decoy_den_client::persist::{MemoryStore, SnapshotStore};
use decoy_den_client::protocol::{Phase, Role, StateData};
use decoy_den_client::session::LocalIdentity;
use decoy_den_client::{DecoyDenError, DecoyDenEvent};

mod common;
use common::{
    assignment, entry, frame, participant_update, state_update, strings, timer_tick,
    MockTransport, ScriptedConnector,
};

fn uid(n: u128) -> uuid::Uuid {
    uuid::Uuid::from_u128(n)
}

const ROOM: u128 = 0x900D;

fn host_identity() -> LocalIdentity {
    LocalIdentity::host(uid(ROOM), "AAAAAA", uid(1), "Hana")
}

fn player_identity(is_leader: bool) -> LocalIdentity {
    LocalIdentity::player(uid(ROOM), "AAAAAA", uid(2), "Alice", is_leader)
}

fn fast_config(identity: LocalIdentity) -> DecoyDenConfig {
    DecoyDenConfig::new(identity)
        .with_reconnect_delay(Duration::from_millis(5))
        .with_persist_debounce(Duration::from_millis(10))
}

fn memory_store() -> Arc<dyn SnapshotStore> {
    Arc::new(MemoryStore::new())
}

/// The roster used throughout: host + leader + one more player.
fn full_roster() -> Vec<decoy_den_client::protocol::ParticipantEntry> {
    vec![
        entry(uid(1), "Hana", Role::Host, false),
        entry(uid(2), "Alice", Role::Player, true),
        entry(uid(3), "Ben", Role::Player, false),
    ]
}

// ════════════════════════════════════════════════════════════════════
// Round flow
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn full_round_from_the_leaders_seat() {
    let (connector, _sent, _closed) = ScriptedConnector::single(vec![
        frame(&participant_update(full_roster())),
        frame(&state_update(Phase::SettingTopic, None)),
        frame(&state_update(
            Phase::Discussing,
            Some(StateData {
                topic: Some("Movies".into()),
                displayed_emojis: Some(strings(&["🎬", "🔧", "🎭"])),
                assignments: Some(vec![assignment(uid(2), "🍎"), assignment(uid(3), "🍇")]),
                ..StateData::default()
            }),
        )),
        frame(&timer_tick("02:39")),
        frame(&state_update(Phase::Answering, None)),
        frame(&state_update(
            Phase::Checking,
            Some(StateData {
                answer: Some("Totoro".into()),
                ..StateData::default()
            }),
        )),
        frame(&state_update(Phase::Finished, None)),
    ]);

    let (mut client, mut events) = DecoyDenClient::start(
        connector,
        memory_store(),
        fast_config(player_identity(true)),
    );

    let mut phases = Vec::new();
    let mut assigned = None;
    let mut roster_len = 0;
    while let Some(event) = events.recv().await {
        match event {
            DecoyDenEvent::PhaseChanged { phase } => {
                phases.push(phase);
                if phase == Phase::Finished {
                    break;
                }
            }
            DecoyDenEvent::EmojiAssigned { emoji } => assigned = Some(emoji),
            DecoyDenEvent::RosterChanged { participants } => roster_len = participants.len(),
            _ => {}
        }
    }

    assert_eq!(
        phases,
        vec![
            Phase::SettingTopic,
            Phase::Discussing,
            Phase::Answering,
            Phase::Checking,
            Phase::Finished,
        ]
    );
    assert_eq!(assigned.as_deref(), Some("🍎"));
    assert_eq!(roster_len, 3);

    let session = client.session();
    assert!(session.phase.is_terminal());
    assert_eq!(session.topic.as_deref(), Some("Movies"));
    assert_eq!(session.answer.as_deref(), Some("Totoro"));
    assert_eq!(session.timer.as_ref().map(ToString::to_string), Some("02:39".into()));

    client.shutdown().await;
}

#[tokio::test]
async fn decoy_views_differ_between_host_and_player() {
    // Scenario: leader submits "Movies" with ["🎬","🍿","🎭"]; decoy
    // injection replaced index 1. The host's view shows the original, a
    // player's view shows the decoy array.
    let round_content = StateData {
        topic: Some("Movies".into()),
        original_emojis: Some(strings(&["🎬", "🍿", "🎭"])),
        displayed_emojis: Some(strings(&["🎬", "🔧", "🎭"])),
        dummy_index: Some(1),
        dummy_emoji: Some("🔧".into()),
        ..StateData::default()
    };

    // Host client.
    let (connector, _sent, _closed) = ScriptedConnector::single(vec![
        frame(&participant_update(full_roster())),
        frame(&state_update(Phase::SettingTopic, Some(round_content.clone()))),
    ]);
    let (mut host, mut host_events) =
        DecoyDenClient::start(connector, memory_store(), fast_config(host_identity()));

    // Player client.
    let (connector, _sent, _closed) = ScriptedConnector::single(vec![
        frame(&participant_update(full_roster())),
        frame(&state_update(Phase::SettingTopic, Some(round_content))),
    ]);
    let (mut player, mut player_events) = DecoyDenClient::start(
        connector,
        memory_store(),
        fast_config(player_identity(true)),
    );

    // Drain until both have applied the state update.
    for events in [&mut host_events, &mut player_events] {
        loop {
            match events.recv().await.unwrap() {
                DecoyDenEvent::PhaseChanged { .. } => break,
                _ => {}
            }
        }
    }

    assert_eq!(host.session().visible_emojis(), strings(&["🎬", "🍿", "🎭"]));
    assert_eq!(
        player.session().visible_emojis(),
        strings(&["🎬", "🔧", "🎭"])
    );
    // Both know where the decoy went, for the reveal.
    assert_eq!(host.session().dummy_index, Some(1));
    assert_eq!(player.session().dummy_emoji.as_deref(), Some("🔧"));

    host.shutdown().await;
    player.shutdown().await;
}

#[tokio::test]
async fn protect_once_theme_survives_blank_update() {
    // Scenario: room created with theme="X", hint="Y" → a later STATE_UPDATE
    // with blank framing must not erase the displayed values.
    let (connector, _sent, _closed) = ScriptedConnector::single(vec![
        frame(&state_update(
            Phase::SettingTopic,
            Some(StateData {
                theme: Some(String::new()),
                hint: Some(String::new()),
                ..StateData::default()
            }),
        )),
        frame(&timer_tick("01:00")),
    ]);

    let response = decoy_den_client::gateway::CreateRoomResponse {
        room_id: uid(ROOM),
        user_id: uid(1),
        room_code: "AAAAAA".into(),
        theme: "X".into(),
        hint: "Y".into(),
    };
    let config = DecoyDenConfig::for_host(&response, "Hana")
        .with_reconnect_delay(Duration::from_millis(5))
        .with_persist_debounce(Duration::from_millis(10));

    let (mut client, mut events) = DecoyDenClient::start(connector, memory_store(), config);

    // Wait for both frames to be applied.
    loop {
        if let DecoyDenEvent::TimerTick { .. } = events.recv().await.unwrap() {
            break;
        }
    }

    let session = client.session();
    assert_eq!(session.theme.as_deref(), Some("X"));
    assert_eq!(session.hint.as_deref(), Some("Y"));

    client.shutdown().await;
}

#[tokio::test]
async fn empty_roster_broadcast_keeps_participants() {
    let (connector, _sent, _closed) = ScriptedConnector::single(vec![
        frame(&participant_update(full_roster())),
        frame(&participant_update(vec![])), // reconnect-race noise
        frame(&timer_tick("00:30")),
    ]);
    let (mut client, mut events) =
        DecoyDenClient::start(connector, memory_store(), fast_config(host_identity()));

    loop {
        if let DecoyDenEvent::TimerTick { .. } = events.recv().await.unwrap() {
            break;
        }
    }

    assert_eq!(client.session().roster.len(), 3);
    assert!(client.session().is_host());

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Reconnection discipline
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn repeated_abnormal_closes_exhaust_the_bound() {
    // Scenario: the transport closes with 1006 on every connection; under a
    // bound of 5 the manager reconnects each time and the attempt after the
    // fifth failure reports a terminal error.
    let lost = || {
        let (transport, _, _) = MockTransport::new(vec![Some(Err(
            DecoyDenError::ConnectionLost { code: 1006 },
        ))]);
        transport
    };
    // Three connections succeed then die abnormally; afterwards the
    // connector is unreachable, so attempts 4 and 5 fail to connect at all.
    let connector = ScriptedConnector::new(vec![lost(), lost(), lost()]);
    let config = fast_config(host_identity()).with_max_reconnect_attempts(5);
    let (mut client, mut events) = DecoyDenClient::start(connector, memory_store(), config);

    let mut reconnecting = 0;
    let mut connected = 0;
    loop {
        match events.recv().await.unwrap() {
            DecoyDenEvent::Connected => connected += 1,
            DecoyDenEvent::Reconnecting { attempt, max_attempts } => {
                reconnecting += 1;
                assert_eq!(attempt, reconnecting);
                assert_eq!(max_attempts, 5);
            }
            DecoyDenEvent::ReconnectFailed { attempts } => {
                assert_eq!(attempts, 5);
                break;
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(connected, 3, "each scripted transport connected once");
    assert_eq!(reconnecting, 5, "every attempt under the bound was made");

    // Terminal failure: the handle refuses further commands.
    assert!(matches!(client.ping(), Err(DecoyDenError::NotConnected)));

    client.shutdown().await;
}

#[tokio::test]
async fn traffic_resets_the_consecutive_failure_counter() {
    // A connection that actually dispatched events is healthy; its eventual
    // loss starts a fresh attempt count rather than accumulating toward the
    // bound.
    let healthy_then_lost = || {
        let (transport, _, _) = MockTransport::new(vec![
            frame(&timer_tick("00:10")),
            Some(Err(DecoyDenError::ConnectionLost { code: 1006 })),
        ]);
        transport
    };
    let connector = ScriptedConnector::new(vec![healthy_then_lost(), healthy_then_lost()]);
    let config = fast_config(host_identity()).with_max_reconnect_attempts(1);
    let (mut client, mut events) = DecoyDenClient::start(connector, memory_store(), config);

    let mut attempts_seen = Vec::new();
    loop {
        match events.recv().await.unwrap() {
            DecoyDenEvent::Reconnecting { attempt, .. } => attempts_seen.push(attempt),
            DecoyDenEvent::ReconnectFailed { .. } => break,
            _ => {}
        }
    }
    // Both healthy connections reset the counter, so every retry was
    // attempt 1 of 1.
    assert_eq!(attempts_seen, vec![1, 1, 1]);

    client.shutdown().await;
}

#[tokio::test]
async fn remote_normal_close_does_not_reconnect() {
    let (connector, _sent, _closed) = ScriptedConnector::single(vec![None]);
    let (mut client, mut events) =
        DecoyDenClient::start(connector, memory_store(), fast_config(host_identity()));

    let _ = events.recv().await; // Connected
    let event = events.recv().await.unwrap();
    assert!(matches!(event, DecoyDenEvent::Disconnected { reason: None }));
    // No Reconnecting events follow; the channel just closes after shutdown.

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Persistence across restarts
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn reload_mid_round_restores_round_content() {
    let store: Arc<dyn SnapshotStore> = Arc::new(MemoryStore::new());

    // First life: get into DISCUSSING with content, then drop abruptly.
    {
        let (connector, _sent, _closed) = ScriptedConnector::single(vec![
            frame(&participant_update(full_roster())),
            frame(&state_update(Phase::SettingTopic, None)),
            frame(&state_update(
                Phase::Discussing,
                Some(StateData {
                    topic: Some("Movies".into()),
                    displayed_emojis: Some(strings(&["🎬", "🔧", "🎭"])),
                    assignments: Some(vec![assignment(uid(2), "🍎")]),
                    ..StateData::default()
                }),
            )),
        ]);
        let (mut client, mut events) = DecoyDenClient::start(
            connector,
            Arc::clone(&store),
            fast_config(player_identity(true)),
        );
        loop {
            if let DecoyDenEvent::PhaseChanged {
                phase: Phase::Discussing,
            } = events.recv().await.unwrap()
            {
                break;
            }
        }
        // Let the debounced write land before the "page reload".
        tokio::time::sleep(Duration::from_millis(50)).await;
        client.shutdown().await;
    }

    // Second life: restored before any protocol event is processed.
    let (connector, _sent, _closed) = ScriptedConnector::single(vec![]);
    let (mut client, mut events) = DecoyDenClient::start(
        connector,
        Arc::clone(&store),
        fast_config(player_identity(true)),
    );
    let _ = events.recv().await; // Connected

    let session = client.session();
    assert_eq!(session.phase, Phase::Discussing);
    assert_eq!(session.topic.as_deref(), Some("Movies"));
    assert_eq!(session.assigned_emoji.as_deref(), Some("🍎"));
    assert_eq!(session.roster.len(), 3);

    client.shutdown().await;
}

#[tokio::test]
async fn reset_tears_down_connection_and_storage() {
    let store = Arc::new(MemoryStore::new());
    let (connector, _sent, closed) = ScriptedConnector::single(vec![
        frame(&state_update(Phase::SettingTopic, None)),
    ]);
    let (mut client, mut events) = DecoyDenClient::start(
        connector,
        Arc::clone(&store) as Arc<dyn SnapshotStore>,
        fast_config(host_identity()),
    );

    let _ = events.recv().await; // Connected
    let _ = events.recv().await; // PhaseChanged

    client.reset().unwrap();
    loop {
        if let DecoyDenEvent::Disconnected { reason } = events.recv().await.unwrap() {
            assert_eq!(reason.as_deref(), Some("session reset"));
            break;
        }
    }

    // Session back to its empty initial state, socket closed, storage gone.
    let session = client.session();
    assert_eq!(session.phase, Phase::Waiting);
    assert!(session.room_id.is_none());
    assert!(session.roster.is_empty());
    assert!(closed.load(std::sync::atomic::Ordering::Relaxed));

    // Give the writer queue a beat to process the ordered reset.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let room_key_fragment = uid(ROOM).to_string();
    assert!(store
        .keys()
        .unwrap()
        .iter()
        .all(|k| !k.contains(&room_key_fragment)));

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Privileged actions
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn start_game_succeeds_for_host_with_enough_players() {
    let (connector, sent, _closed) =
        ScriptedConnector::single(vec![frame(&participant_update(full_roster()))]);
    let (mut client, mut events) =
        DecoyDenClient::start(connector, memory_store(), fast_config(host_identity()));

    let _ = events.recv().await; // Connected
    loop {
        if let DecoyDenEvent::RosterChanged { .. } = events.recv().await.unwrap() {
            break;
        }
    }

    client.start_game().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let messages = sent.lock().unwrap();
    let last: decoy_den_client::protocol::ClientMessage =
        serde_json::from_str(messages.last().unwrap()).unwrap();
    assert!(matches!(
        last,
        decoy_den_client::protocol::ClientMessage::StartGame
    ));

    client.shutdown().await;
}

#[tokio::test]
async fn start_game_is_denied_for_plain_players() {
    let (connector, _sent, _closed) =
        ScriptedConnector::single(vec![frame(&participant_update(full_roster()))]);
    let (mut client, mut events) = DecoyDenClient::start(
        connector,
        memory_store(),
        fast_config(player_identity(false)),
    );

    let _ = events.recv().await; // Connected
    loop {
        if let DecoyDenEvent::RosterChanged { .. } = events.recv().await.unwrap() {
            break;
        }
    }

    let err = client.start_game().unwrap_err();
    assert!(matches!(err, DecoyDenError::PermissionDenied { .. }));

    client.shutdown().await;
}

#[tokio::test]
async fn skip_discussion_allowed_for_leader_during_discussion() {
    let (connector, sent, _closed) = ScriptedConnector::single(vec![
        frame(&participant_update(full_roster())),
        frame(&state_update(Phase::SettingTopic, None)),
        frame(&state_update(Phase::Discussing, None)),
    ]);
    let (mut client, mut events) = DecoyDenClient::start(
        connector,
        memory_store(),
        fast_config(player_identity(true)),
    );

    loop {
        if let DecoyDenEvent::PhaseChanged {
            phase: Phase::Discussing,
        } = events.recv().await.unwrap()
        {
            break;
        }
    }

    client.skip_discussion().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let messages = sent.lock().unwrap();
    let last: decoy_den_client::protocol::ClientMessage =
        serde_json::from_str(messages.last().unwrap()).unwrap();
    assert!(matches!(
        last,
        decoy_den_client::protocol::ClientMessage::SkipDiscussion
    ));

    client.shutdown().await;
}

#[tokio::test]
async fn server_error_event_sets_last_error_and_nothing_else() {
    let (connector, _sent, _closed) = ScriptedConnector::single(vec![
        frame(&state_update(Phase::SettingTopic, None)),
        frame(&decoy_den_client::protocol::ServerEvent::Error {
            code: Some(decoy_den_client::ErrorCode::PermissionDenied),
            message: "host only".into(),
        }),
    ]);
    let (mut client, mut events) =
        DecoyDenClient::start(connector, memory_store(), fast_config(host_identity()));

    loop {
        if let DecoyDenEvent::ServerError { code, message } = events.recv().await.unwrap() {
            assert_eq!(code, Some(decoy_den_client::ErrorCode::PermissionDenied));
            assert_eq!(message, "host only");
            break;
        }
    }

    let session = client.session();
    assert_eq!(session.phase, Phase::SettingTopic, "phase untouched");
    assert!(session.last_error.is_some());

    client.shutdown().await;
}

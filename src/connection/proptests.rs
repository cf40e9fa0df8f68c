//! Property-based tests for the connection state machine
//!
//! These tests verify record invariants hold across arbitrary event sequences.

use super::*;
use chrono::Utc;
use proptest::prelude::*;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_session_info() -> impl Strategy<Value = SessionInfo> {
    ("[0-9]{8,13}", proptest::option::of("[a-zA-Z ]{1,12}")).prop_map(|(phone, name)| {
        SessionInfo {
            display_name: name,
            phone_number: phone,
            platform: Some("android".to_string()),
        }
    })
}

fn arb_message() -> impl Strategy<Value = InboundMessage> {
    (
        "[0-9]{8,13}@c\\.us",
        "[a-zA-Z0-9 ]{0,30}",
        proptest::option::of(1_600_000_000i64..1_800_000_000),
        proptest::option::of("[A-F0-9]{8}"),
    )
        .prop_map(|(from, body, timestamp, id)| InboundMessage {
            from,
            body,
            timestamp,
            id,
        })
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        "[a-z0-9@,]{4,20}".prop_map(|payload| Event::QrIssued { payload }),
        Just(Event::Authenticated),
        Just(Event::Ready),
        "[a-z ]{1,20}".prop_map(|reason| Event::AuthFailed { reason }),
        "[A-Z]{1,12}".prop_map(|reason| Event::Disconnected { reason }),
        arb_message().prop_map(Event::MessageReceived),
        "[a-z ]{1,20}".prop_map(|error| Event::InitFailed { error }),
        ("[a-z0-9@,]{4,20}", "[a-zA-Z0-9]{4,12}")
            .prop_map(|(payload, image)| Event::QrRendered { payload, image }),
        arb_session_info().prop_map(Event::SessionInfoLoaded),
        Just(Event::LoggedOut),
    ]
}

fn run(events: Vec<Event>) -> Vec<ConnectionRecord> {
    let mut record = ConnectionRecord::new("prop", "Prop", Utc::now());
    let mut history = vec![record.clone()];
    for event in events {
        if let Ok(result) = transition(&record, event, Utc::now()) {
            record = result.record;
            history.push(record.clone());
        }
    }
    history
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn qr_fields_only_while_qr_ready(events in proptest::collection::vec(arb_event(), 0..40)) {
        for record in run(events) {
            if record.status != ConnectionStatus::QrReady {
                prop_assert!(record.qr_payload.is_none());
                prop_assert!(record.qr_image.is_none());
            }
        }
    }

    #[test]
    fn session_fields_only_while_connected(events in proptest::collection::vec(arb_event(), 0..40)) {
        for record in run(events) {
            if record.status != ConnectionStatus::Connected {
                prop_assert!(record.session_info.is_none());
                prop_assert!(record.connected_at.is_none());
            } else {
                prop_assert!(record.connected_at.is_some());
            }
        }
    }

    #[test]
    fn identity_never_changes(events in proptest::collection::vec(arb_event(), 0..40)) {
        let history = run(events);
        let first = &history[0];
        for record in &history {
            prop_assert_eq!(&record.id, &first.id);
            prop_assert_eq!(&record.name, &first.name);
            prop_assert_eq!(record.created_at, first.created_at);
        }
    }

    #[test]
    fn last_error_is_sticky(events in proptest::collection::vec(arb_event(), 0..40)) {
        let mut seen_error = false;
        for record in run(events) {
            if seen_error {
                prop_assert!(record.last_error.is_some());
            }
            seen_error |= record.last_error.is_some();
        }
    }

    #[test]
    fn messages_never_change_the_record(
        events in proptest::collection::vec(arb_event(), 0..20),
        message in arb_message(),
    ) {
        let history = run(events);
        let record = history.last().unwrap();
        let result = transition(record, Event::MessageReceived(message.clone()), Utc::now()).unwrap();
        prop_assert_eq!(&result.record, record);
        prop_assert_eq!(result.effects, vec![Effect::RouteMessage(message)]);
    }
}

//! Key-exchange state machine (§4.2).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KxState {
    Down,
    KeySent,
    KeyReceived,
    KeyConfirmed,
}

impl KxState {
    pub fn as_wire_value(&self) -> u32 {
        match self {
            KxState::Down => 0,
            KxState::KeySent => 1,
            KxState::KeyReceived => 2,
            KxState::KeyConfirmed => 3,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, KxState::KeyConfirmed)
    }

    /// §3 invariant: peer key is valid from KEY_RECEIVED onward.
    pub fn has_peer_key(&self) -> bool {
        matches!(self, KxState::KeyReceived | KxState::KeyConfirmed)
    }
}

impl Default for KxState {
    fn default() -> Self {
        KxState::Down
    }
}

/// Events driving the KX state machine (§4.2 table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KxEvent {
    SendKey,
    ValidSetKey { peer_reported_state: u32 },
    ValidPong,
    DuplicatePong,
}

/// Outcome of applying an event: next state plus whether a reply SET_KEY
/// should be emitted and whether inbound sequence state must reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: KxState,
    pub reply_set_key: bool,
    pub reset_inbound_sequence: bool,
    pub confirmed: bool,
}

/// Apply `event` to `current`, per the table in §4.2. Returns `None` for
/// combinations the table does not define (caller keeps current state).
pub fn transition(current: KxState, event: KxEvent) -> Option<Transition> {
    use KxState::*;

    match (current, event) {
        (Down, KxEvent::SendKey) => Some(Transition {
            next: KeySent,
            reply_set_key: false,
            reset_inbound_sequence: false,
            confirmed: false,
        }),
        (Down, KxEvent::ValidSetKey { .. }) => Some(Transition {
            next: KeyReceived,
            reply_set_key: true,
            reset_inbound_sequence: false,
            confirmed: false,
        }),
        (KeySent, KxEvent::ValidSetKey { peer_reported_state }) => Some(Transition {
            next: KeyReceived,
            reply_set_key: peer_reported_state < KxState::KeyReceived.as_wire_value(),
            reset_inbound_sequence: false,
            confirmed: false,
        }),
        (KeySent, KxEvent::ValidPong) => Some(Transition {
            next: KeyConfirmed,
            reply_set_key: false,
            reset_inbound_sequence: false,
            confirmed: true,
        }),
        (KeyReceived, KxEvent::ValidSetKey { .. }) => Some(Transition {
            next: KeyReceived,
            reply_set_key: false,
            reset_inbound_sequence: true,
            confirmed: false,
        }),
        (KeyReceived, KxEvent::ValidPong) => Some(Transition {
            next: KeyConfirmed,
            reply_set_key: false,
            reset_inbound_sequence: false,
            confirmed: true,
        }),
        (KeyConfirmed, KxEvent::ValidSetKey { peer_reported_state }) => Some(Transition {
            next: KeyReceived,
            reply_set_key: peer_reported_state < KxState::KeyReceived.as_wire_value(),
            reset_inbound_sequence: true,
            confirmed: false,
        }),
        (KeyConfirmed, KxEvent::DuplicatePong) => Some(Transition {
            next: KeyConfirmed,
            reply_set_key: false,
            reset_inbound_sequence: false,
            confirmed: false,
        }),
        _ => None,
    }
}

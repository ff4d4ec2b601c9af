//! A `SET_KEY` envelope with a creation time no newer than the one already
//! accepted is dropped once the handshake has advanced past `KEY_RECEIVED`
//! (§4.1 replay guard item 4, §4.2).

use std::time::Duration;

use overlaycore::neighbor::state::KxState;
use overlaycore::protocol::message_type;
use overlaycore::transport::TransportEvent;

use crate::support::{connect_pair, last_sent_of_type, spin_up_pair, wait_until};

#[tokio::test]
async fn replayed_set_key_after_confirmation_is_dropped() {
    let (a, b) = spin_up_pair(65_536, 65_536).await;
    connect_pair(&a, &b).await;
    wait_until(
        || async { a.dispatcher.neighbor_state(b.peer_id).await == Some(KxState::KeyConfirmed) },
        Duration::from_secs(5),
    )
    .await;
    let confirmed = wait_until(
        || async { b.dispatcher.neighbor_state(a.peer_id).await == Some(KxState::KeyConfirmed) },
        Duration::from_secs(5),
    )
    .await;
    assert!(confirmed, "handshake must complete before the replay is meaningful");

    let (mt, body) = last_sent_of_type(&a, b.peer_id, message_type::SET_KEY)
        .await
        .expect("a should have sent a set_key envelope to b");

    let drops_before = b.dispatcher.stats.snapshot().drops_protocol_violation;
    b.dispatcher
        .handle_transport_event(TransportEvent::Received {
            peer: a.peer_id,
            message_type: mt,
            body,
        })
        .await;

    assert_eq!(
        b.dispatcher.stats.snapshot().drops_protocol_violation,
        drops_before + 1,
        "stale set_key should be counted as a protocol-violation drop"
    );
    assert_eq!(
        b.dispatcher.neighbor_state(a.peer_id).await,
        Some(KxState::KeyConfirmed),
        "state must not regress on a stale replayed set_key"
    );
}

//! A small, low-urgency message with plenty of quota is deferred rather than
//! sent immediately, then drains once its deadline draws close enough that
//! slack drops below the one-second threshold (§4.3 steps 2-3).

use std::time::{Duration, Instant};

use overlaycore::client::ClientOptions;
use overlaycore::neighbor::state::KxState;
use overlaycore::protocol::message_type;

use crate::support::{connect_pair, last_sent_of_type, spin_up_pair, wait_until};

#[tokio::test]
async fn small_far_deadline_message_defers_then_eventually_sends() {
    let (a, b) = spin_up_pair(10 * 1024 * 1024, 10 * 1024 * 1024).await;
    connect_pair(&a, &b).await;
    wait_until(
        || async { a.dispatcher.neighbor_state(b.peer_id).await == Some(KxState::KeyConfirmed) },
        Duration::from_secs(5),
    )
    .await;
    wait_until(
        || async { b.dispatcher.neighbor_state(a.peer_id).await == Some(KxState::KeyConfirmed) },
        Duration::from_secs(5),
    )
    .await;

    let _client = b.dispatcher.client_init(ClientOptions::empty(), vec![]).await;

    let mut payload = Vec::new();
    payload.extend_from_slice(&6u16.to_be_bytes());
    payload.extend_from_slice(&1u16.to_be_bytes());
    payload.extend_from_slice(b"hi");
    let deadline = Instant::now() + Duration::from_millis(1500);
    a.dispatcher
        .client_send(b.peer_id, 1, deadline, payload)
        .await
        .expect("queueing a send to a confirmed neighbor must succeed");

    assert!(
        last_sent_of_type(&a, b.peer_id, message_type::ENCRYPTED_MESSAGE)
            .await
            .is_none(),
        "a low-fill, far-deadline message must not be emitted on the first scheduling pass"
    );

    let eventually_sent = wait_until(
        || async { last_sent_of_type(&a, b.peer_id, message_type::ENCRYPTED_MESSAGE).await.is_some() },
        Duration::from_secs(4),
    )
    .await;
    assert!(eventually_sent, "deferred message must drain as its deadline approaches");
}

//! Two freshly connected neighbors complete key exchange and a ping/pong
//! round trip with no prior state (§8 scenario 1).

use std::time::Duration;

use overlaycore::neighbor::state::KxState;

use crate::support::{connect_pair, spin_up_pair, wait_until};

#[tokio::test]
async fn handshake_reaches_key_confirmed_on_both_sides() {
    let (a, b) = spin_up_pair(65_536, 65_536).await;
    connect_pair(&a, &b).await;

    let a_confirmed = wait_until(
        || async { a.dispatcher.neighbor_state(b.peer_id).await == Some(KxState::KeyConfirmed) },
        Duration::from_secs(5),
    )
    .await;
    let b_confirmed = wait_until(
        || async { b.dispatcher.neighbor_state(a.peer_id).await == Some(KxState::KeyConfirmed) },
        Duration::from_secs(5),
    )
    .await;

    assert!(a_confirmed, "a never reached KEY_CONFIRMED for b");
    assert!(b_confirmed, "b never reached KEY_CONFIRMED for a");
}

#[tokio::test]
async fn confirmed_handshake_records_stats_on_both_sides() {
    let (a, b) = spin_up_pair(65_536, 65_536).await;
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

    assert_eq!(a.dispatcher.stats.snapshot().handshakes_completed, 1);
    assert_eq!(b.dispatcher.stats.snapshot().handshakes_completed, 1);
}

#[tokio::test]
async fn client_send_after_handshake_is_delivered_to_the_peer() {
    use overlaycore::client::ClientOptions;

    let (a, b) = spin_up_pair(65_536, 65_536).await;
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

    let client = b
        .dispatcher
        .client_init(ClientOptions::SEND_FULL_INBOUND, vec![42])
        .await;
    // Drain the INIT replay of already-connected neighbors.
    b.dispatcher.drain_client_notifications(client).await;

    let mut payload = Vec::new();
    payload.extend_from_slice(&6u16.to_be_bytes());
    payload.extend_from_slice(&42u16.to_be_bytes());
    payload.extend_from_slice(b"hi");

    a.dispatcher
        .client_send(b.peer_id, 1, std::time::Instant::now(), payload)
        .await
        .expect("send to an established neighbor should succeed");

    let delivered = wait_until(
        || async { !b.dispatcher.drain_client_notifications(client).await.is_empty() },
        Duration::from_secs(5),
    )
    .await;
    assert!(delivered, "b's subscribed client never saw the inbound message");
}

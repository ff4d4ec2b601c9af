//! A neighbor idle past `IDLE_CONNECTION_TIMEOUT` on both activity and
//! session-age is disconnected on the next quota recompute (§4.5 scenario 6).

use std::time::{Duration, Instant};

use overlaycore::neighbor::state::KxState;
use overlaycore::protocol::constants::IDLE_CONNECTION_TIMEOUT;

use crate::support::{connect_pair, spin_up_pair, wait_until};

#[tokio::test]
async fn long_idle_neighbor_is_disconnected_on_recompute() {
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
    assert_eq!(b.dispatcher.neighbor_count().await, 1);

    let neighbor = a
        .dispatcher
        .neighbor_handle(b.peer_id)
        .await
        .expect("a must have a neighbor record for b");
    {
        let long_ago = Instant::now() - (IDLE_CONNECTION_TIMEOUT + Duration::from_secs(5));
        let mut guard = neighbor.lock().await;
        guard.last_activity = long_ago;
        guard.session_established = Some(long_ago);
    }

    a.dispatcher.force_quota_recompute(b.peer_id).await;

    assert_eq!(
        a.dispatcher.stats.snapshot().idle_disconnects,
        1,
        "an idle neighbor past both timeouts must be counted as an idle disconnect"
    );
    assert_eq!(
        b.dispatcher.neighbor_count().await,
        0,
        "the disconnect must propagate to the peer, removing its neighbor record"
    );
}

#[tokio::test]
async fn active_neighbor_survives_recompute() {
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

    a.dispatcher.force_quota_recompute(b.peer_id).await;

    assert_eq!(a.dispatcher.stats.snapshot().idle_disconnects, 0);
    assert_eq!(a.dispatcher.neighbor_count().await, 1);
}

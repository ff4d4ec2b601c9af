//! A sender's per-neighbor plaintext queue rejects a low-priority arrival
//! once full, but evicts its current lowest-priority entry for a strictly
//! higher-priority one (§4.3, §8 scenario 5).

use std::time::{Duration, Instant};

use overlaycore::neighbor::state::KxState;

use crate::support::{connect_pair, spin_up_pair, wait_until};

fn framed(message_type: u16, body: &[u8]) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&((4 + body.len()) as u16).to_be_bytes());
    payload.extend_from_slice(&message_type.to_be_bytes());
    payload.extend_from_slice(body);
    payload
}

async fn queued_priorities(node: &overlaycore::dispatcher::Dispatcher, peer: overlaycore::protocol::PeerId) -> Vec<u32> {
    let neighbor = node.neighbor_handle(peer).await.expect("neighbor must exist");
    let guard = neighbor.lock().await;
    guard.plaintext_queue.iter().map(|e| e.priority).collect()
}

#[tokio::test]
async fn full_queue_rejects_low_priority_and_evicts_for_high_priority() {
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

    let far_deadline = Instant::now() + Duration::from_secs(120);
    for priority in 1..=16u32 {
        a.dispatcher
            .client_send(b.peer_id, priority, far_deadline, framed(7, &[priority as u8]))
            .await
            .expect("queue has room for the first 16 entries");
    }
    assert_eq!(queued_priorities(&a.dispatcher, b.peer_id).await.len(), 16);

    let low_priority_result = a
        .dispatcher
        .client_send(b.peer_id, 0, far_deadline, framed(7, b"low"))
        .await;
    assert!(
        low_priority_result.is_err(),
        "a priority-0 entry must be rejected when the queue is full of priority >= 1 entries"
    );
    let priorities_after_rejection = queued_priorities(&a.dispatcher, b.peer_id).await;
    assert_eq!(priorities_after_rejection.len(), 16);
    assert!(priorities_after_rejection.contains(&1));

    a.dispatcher
        .client_send(b.peer_id, 50, far_deadline, framed(7, b"urgent"))
        .await
        .expect("a strictly higher priority entry must evict the lowest-priority one");
    let priorities_after_eviction = queued_priorities(&a.dispatcher, b.peer_id).await;
    assert_eq!(priorities_after_eviction.len(), 16);
    assert!(!priorities_after_eviction.contains(&1), "priority 1 should have been evicted");
    assert!(priorities_after_eviction.contains(&50));
}

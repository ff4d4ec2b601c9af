//! A `SEND` submitted for a peer that isn't a neighbor yet is buffered and
//! retried once the transport reports the connection (§4.6: "buffer the
//! SEND, retry on success, drop on failure").

use std::time::{Duration, Instant};

use overlaycore::transport::TransportEvent;

use crate::support::spin_up_pair;

fn framed(message_type: u16, body: &[u8]) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&((4 + body.len()) as u16).to_be_bytes());
    payload.extend_from_slice(&message_type.to_be_bytes());
    payload.extend_from_slice(body);
    payload
}

#[tokio::test]
async fn send_before_connect_is_buffered_and_enqueued_once_connected() {
    let (a, b) = spin_up_pair(65_536, 65_536).await;

    assert_eq!(a.dispatcher.neighbor_count().await, 0);

    let deadline = Instant::now() + Duration::from_secs(60);
    a.dispatcher
        .client_send(b.peer_id, 3, deadline, framed(7, b"early"))
        .await
        .expect("a SEND for an unconnected peer should be buffered, not rejected");

    // No neighbor exists yet, so the entry cannot have been queued anywhere.
    assert_eq!(a.dispatcher.neighbor_count().await, 0);
    assert!(a.transport.is_connected(&b.peer_id), "client_send must ask the transport to connect");

    // Simulate the transport reporting that the connection came up.
    a.dispatcher
        .handle_transport_event(TransportEvent::Connected { peer: b.peer_id })
        .await;

    let neighbor = a.dispatcher.neighbor_handle(b.peer_id).await.expect("neighbor must now exist");
    let queued = neighbor.lock().await.plaintext_queue.iter().map(|e| e.priority).collect::<Vec<_>>();
    assert_eq!(queued, vec![3], "the buffered send must drain into the fresh neighbor's queue");
}

//! Shared harness for the integration scenario tests: a mock transport and
//! peer-info directory that wire two or more [`Dispatcher`]s together over
//! an in-process relay, with no real network underneath (§1 "Out of scope").

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rsa::RsaPublicKey;
use tokio::sync::Mutex;

use overlaycore::crypto::identity::Identity;
use overlaycore::dispatcher::Dispatcher;
use overlaycore::protocol::{MessageHeader, PeerId};
use overlaycore::transport::{PeerInfoDirectory, Transport, TransportEvent};
use overlaycore::Result;

/// Routes one node's outbound `send`/`connect`/`disconnect` calls to another
/// node's `Dispatcher::handle_transport_event`, standing in for a real
/// transport (§1).
#[derive(Default)]
pub struct Network {
    dispatchers: StdMutex<HashMap<PeerId, Weak<Dispatcher>>>,
}

impl Network {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn register(&self, peer: PeerId, dispatcher: Weak<Dispatcher>) {
        self.dispatchers.lock().unwrap().insert(peer, dispatcher);
    }

    fn dispatcher_for(&self, peer: PeerId) -> Option<Arc<Dispatcher>> {
        self.dispatchers.lock().unwrap().get(&peer)?.upgrade()
    }
}

/// A peer-info directory backed by a shared map of every node's long-term
/// public key, standing in for the real advertisement system (§1).
#[derive(Default)]
pub struct MockDirectory {
    keys: StdMutex<HashMap<PeerId, RsaPublicKey>>,
}

impl MockDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, peer: PeerId, public_key: RsaPublicKey) {
        self.keys.lock().unwrap().insert(peer, public_key);
    }
}

#[async_trait]
impl PeerInfoDirectory for MockDirectory {
    async fn lookup(&self, peer: PeerId) -> Option<RsaPublicKey> {
        self.keys.lock().unwrap().get(&peer).cloned()
    }
}

/// One node's transport collaborator. `set_quota` calls are recorded rather
/// than acted on, so tests can assert on what the core pushed down.
pub struct MockTransport {
    local_peer: PeerId,
    network: Arc<Network>,
    connected: StdMutex<HashSet<PeerId>>,
    pub quota_calls: Mutex<Vec<(PeerId, u64, u64)>>,
    /// Every framed datagram handed to `send`, in order, for tests that need
    /// to replay or inspect exactly what went out (§8 scenario 2).
    pub sent: Mutex<Vec<(PeerId, Vec<u8>)>>,
}

impl MockTransport {
    fn new(local_peer: PeerId, network: Arc<Network>) -> Arc<Self> {
        Arc::new(Self {
            local_peer,
            network,
            connected: StdMutex::new(HashSet::new()),
            quota_calls: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, peer: PeerId) -> Result<()> {
        self.connected.lock().unwrap().insert(peer);
        if let Some(target) = self.network.dispatcher_for(peer) {
            target
                .handle_transport_event(TransportEvent::Connected { peer: self.local_peer })
                .await;
        }
        Ok(())
    }

    async fn disconnect(&self, peer: PeerId) -> Result<()> {
        self.connected.lock().unwrap().remove(&peer);
        if let Some(target) = self.network.dispatcher_for(peer) {
            target
                .handle_transport_event(TransportEvent::Disconnected { peer: self.local_peer })
                .await;
        }
        Ok(())
    }

    async fn send(&self, peer: PeerId, datagram: Vec<u8>) -> Result<()> {
        self.sent.lock().await.push((peer, datagram.clone()));
        let Some(header) = MessageHeader::decode(&datagram) else {
            return Ok(());
        };
        let body = datagram[MessageHeader::WIRE_SIZE..].to_vec();
        if let Some(target) = self.network.dispatcher_for(peer) {
            target
                .handle_transport_event(TransportEvent::Received {
                    peer: self.local_peer,
                    message_type: header.message_type,
                    body,
                })
                .await;
        }
        Ok(())
    }

    async fn set_quota(&self, peer: PeerId, bpm_in: u64, bpm_out: u64) -> Result<()> {
        self.quota_calls.lock().await.push((peer, bpm_in, bpm_out));
        Ok(())
    }

    fn is_connected(&self, peer: &PeerId) -> bool {
        self.connected.lock().unwrap().contains(peer)
    }
}

/// One end of a wired-up pair, holding onto the concrete mock collaborators
/// so tests can inspect them alongside the opaque `Dispatcher` handle.
pub struct Node {
    pub peer_id: PeerId,
    pub dispatcher: Arc<Dispatcher>,
    pub transport: Arc<MockTransport>,
    pub directory: Arc<MockDirectory>,
}

impl Node {
    pub async fn spawn(network: Arc<Network>, directory: Arc<MockDirectory>, bandwidth_in: u64, bandwidth_out: u64) -> Self {
        let identity = Identity::generate().expect("rsa keygen should succeed in tests");
        let peer_id = identity.peer_id();
        directory.insert(peer_id, identity.public_key().clone());
        let transport = MockTransport::new(peer_id, network.clone());
        let dispatcher = Dispatcher::new(identity, transport.clone(), directory.clone(), bandwidth_in, bandwidth_out);
        network.register(peer_id, Arc::downgrade(&dispatcher));
        Self {
            peer_id,
            dispatcher,
            transport,
            directory,
        }
    }
}

/// Stand up two nodes sharing a [`Network`] and [`MockDirectory`], each
/// already able to look the other up.
pub async fn spin_up_pair(bandwidth_in: u64, bandwidth_out: u64) -> (Node, Node) {
    let network = Network::new();
    let directory = MockDirectory::new();
    let a = Node::spawn(network.clone(), directory.clone(), bandwidth_in, bandwidth_out).await;
    let b = Node::spawn(network.clone(), directory.clone(), bandwidth_in, bandwidth_out).await;
    (a, b)
}

/// Drive both sides' `Connected` transport event directly, simulating a
/// transport that has already established the link (§8 scenario 1's
/// starting point).
pub async fn connect_pair(a: &Node, b: &Node) {
    a.dispatcher
        .handle_transport_event(TransportEvent::Connected { peer: b.peer_id })
        .await;
    b.dispatcher
        .handle_transport_event(TransportEvent::Connected { peer: a.peer_id })
        .await;
}

/// The most recent datagram of `message_type` that `node` sent to `peer`,
/// split into (message_type, body) the way `Dispatcher::on_received` would
/// see it -- useful for manually replaying a captured datagram.
pub async fn last_sent_of_type(node: &Node, peer: PeerId, message_type: u16) -> Option<(u16, Vec<u8>)> {
    let sent = node.transport.sent.lock().await;
    sent.iter()
        .rev()
        .find_map(|(dest, datagram)| {
            if *dest != peer {
                return None;
            }
            let header = MessageHeader::decode(datagram)?;
            if header.message_type != message_type {
                return None;
            }
            Some((header.message_type, datagram[MessageHeader::WIRE_SIZE..].to_vec()))
        })
}

/// Poll `condition` until it's true or `timeout` elapses, yielding to let
/// background handshake/retry tasks progress between checks.
pub async fn wait_until<F, Fut>(mut condition: F, timeout: Duration) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();
    loop {
        if condition().await {
            return true;
        }
        if start.elapsed() > timeout {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

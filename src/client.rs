//! Client multiplexer: registration, subscriptions, and bounded per-client
//! notification queues (§4.6).

use std::collections::{HashMap, VecDeque};

use crate::neighbor::ClientIndex;
use crate::protocol::constants::MAX_CLIENT_QUEUE_SIZE;
use crate::protocol::PeerId;

bitflags::bitflags! {
    /// Per-client subscription option mask (§4.6 "Client registration").
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClientOptions: u16 {
        const SEND_CONNECT       = 0b0000_0001;
        const SEND_PRE_CONNECT   = 0b0000_0010;
        const SEND_DISCONNECT    = 0b0000_0100;
        const SEND_FULL_INBOUND  = 0b0000_1000;
        const SEND_HDR_INBOUND   = 0b0001_0000;
        const SEND_FULL_OUTBOUND = 0b0010_0000;
        const SEND_HDR_OUTBOUND  = 0b0100_0000;
    }
}

/// A notification queued for delivery to a client, dropped oldest-first on
/// overflow (§4.6 "Notification queue").
#[derive(Debug, Clone)]
pub enum Notification {
    PreConnect(PeerId),
    Connect(PeerId),
    Disconnect(PeerId),
    Inbound { peer: PeerId, message_type: u16, payload: Vec<u8> },
    InboundHeader { peer: PeerId, message_type: u16, header: Vec<u8> },
    Outbound { peer: PeerId, message_type: u16, payload: Vec<u8> },
    OutboundHeader { peer: PeerId, message_type: u16, header: Vec<u8> },
    ConfigurationInfo { peer: PeerId, reserved: i64, bpm_in: u64, bpm_out: u64, preference: u64 },
}

/// One registered client (§3, §4.6).
pub struct Client {
    pub options: ClientOptions,
    /// Message types this client subscribes to; empty means "all types" is
    /// not implied -- an empty list subscribes to nothing beyond connect/
    /// disconnect notifications.
    pub subscribed_types: Vec<u16>,
    queue: VecDeque<Notification>,
}

impl Client {
    pub fn new(options: ClientOptions, subscribed_types: Vec<u16>) -> Self {
        Self {
            options,
            subscribed_types,
            queue: VecDeque::new(),
        }
    }

    pub fn subscribes_to(&self, message_type: u16) -> bool {
        self.subscribed_types.contains(&message_type)
    }

    /// Enqueue `notification`, dropping the oldest queued entry if the
    /// bounded queue is already full (§4.6).
    pub fn enqueue(&mut self, notification: Notification) {
        if self.queue.len() >= MAX_CLIENT_QUEUE_SIZE {
            self.queue.pop_front();
        }
        self.queue.push_back(notification);
    }

    pub fn drain(&mut self) -> Vec<Notification> {
        self.queue.drain(..).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }
}

/// Registry of all locally connected clients (§3, §4.6, §4.7).
#[derive(Default)]
pub struct ClientTable {
    clients: HashMap<ClientIndex, Client>,
    next_index: ClientIndex,
}

impl ClientTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, options: ClientOptions, subscribed_types: Vec<u16>) -> ClientIndex {
        let index = self.next_index;
        self.next_index += 1;
        self.clients.insert(index, Client::new(options, subscribed_types));
        index
    }

    pub fn remove(&mut self, index: ClientIndex) -> Option<Client> {
        self.clients.remove(&index)
    }

    pub fn get_mut(&mut self, index: ClientIndex) -> Option<&mut Client> {
        self.clients.get_mut(&index)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&ClientIndex, &mut Client)> {
        self.clients.iter_mut()
    }

    /// Fan out `notification` to every client whose options and subscribed
    /// types match, per §4.4/§4.6's per-type and per-direction rules.
    pub fn fan_out_inbound(&mut self, peer: PeerId, message_type: u16, payload: &[u8], header_cap: usize) {
        for client in self.clients.values_mut() {
            if client.options.contains(ClientOptions::SEND_FULL_INBOUND) {
                client.enqueue(Notification::Inbound {
                    peer,
                    message_type,
                    payload: payload.to_vec(),
                });
            } else if client.options.contains(ClientOptions::SEND_HDR_INBOUND) {
                let header = payload[..payload.len().min(header_cap)].to_vec();
                client.enqueue(Notification::InboundHeader {
                    peer,
                    message_type,
                    header,
                });
            } else if client.subscribes_to(message_type) {
                client.enqueue(Notification::Inbound {
                    peer,
                    message_type,
                    payload: payload.to_vec(),
                });
            }
        }
    }

    /// Fan out a selected plaintext entry to clients that asked to see
    /// outbound traffic before it's encrypted (§4.3 "Notification fan-out").
    /// Headers-only is used when the payload exceeds `header_cap`.
    pub fn fan_out_outbound(&mut self, peer: PeerId, message_type: u16, payload: &[u8], header_cap: usize) {
        for client in self.clients.values_mut() {
            if client.options.contains(ClientOptions::SEND_FULL_OUTBOUND) {
                if payload.len() > header_cap {
                    let header = payload[..header_cap].to_vec();
                    client.enqueue(Notification::OutboundHeader {
                        peer,
                        message_type,
                        header,
                    });
                } else {
                    client.enqueue(Notification::Outbound {
                        peer,
                        message_type,
                        payload: payload.to_vec(),
                    });
                }
            } else if client.options.contains(ClientOptions::SEND_HDR_OUTBOUND) {
                let header = payload[..payload.len().min(header_cap)].to_vec();
                client.enqueue(Notification::OutboundHeader {
                    peer,
                    message_type,
                    header,
                });
            }
        }
    }

    pub fn notify_pre_connect(&mut self, peer: PeerId) {
        for client in self.clients.values_mut() {
            if client.options.contains(ClientOptions::SEND_PRE_CONNECT) {
                client.enqueue(Notification::PreConnect(peer));
            }
        }
    }

    pub fn notify_connect(&mut self, peer: PeerId) {
        for client in self.clients.values_mut() {
            if client.options.contains(ClientOptions::SEND_CONNECT) {
                client.enqueue(Notification::Connect(peer));
            }
        }
    }

    pub fn notify_disconnect(&mut self, peer: PeerId) {
        for client in self.clients.values_mut() {
            if client.options.contains(ClientOptions::SEND_DISCONNECT) {
                client.enqueue(Notification::Disconnect(peer));
            }
        }
    }
}

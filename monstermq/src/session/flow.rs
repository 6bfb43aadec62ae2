// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

//! Outbound flow control: the in-flight window of QoS > 0 deliveries
//! towards one client, capped at its receive maximum.

use std::collections::{HashMap, VecDeque};

use codec::{PacketId, QoS};

use crate::commands::OutboundPublish;
use crate::message::BrokerMessage;

/// Delivery state of one in-flight message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeliveryState {
    /// QoS 1, waiting for PUBACK.
    AwaitAck,

    /// QoS 2, waiting for PUBREC.
    AwaitRec,

    /// QoS 2, PUBREL sent, waiting for PUBCOMP.
    AwaitComp,
}

#[derive(Debug)]
struct Inflight {
    publish: OutboundPublish,
    state: DeliveryState,
}

/// Result of offering a message to the window.
#[derive(Debug, PartialEq, Eq)]
pub enum PushOutcome {
    /// A slot was free; send with this packet id.
    Started(PacketId),

    /// Window full; kept in the local pending queue.
    Queued,

    /// Pending queue full as well; message dropped.
    Dropped,
}

#[derive(Debug)]
pub struct InflightWindow {
    capacity: usize,
    pending_limit: usize,
    next_packet_id: u16,
    outgoing: HashMap<u16, Inflight>,
    pending: VecDeque<OutboundPublish>,
}

impl InflightWindow {
    #[must_use]
    pub fn new(capacity: u16, pending_limit: usize) -> Self {
        Self {
            capacity: usize::from(capacity.max(1)),
            pending_limit,
            next_packet_id: 1,
            outgoing: HashMap::new(),
            pending: VecDeque::new(),
        }
    }

    /// Renegotiate the window size, like the receive maximum a 5.0
    /// client announced in its connect packet.
    pub fn set_capacity(&mut self, capacity: u16) {
        self.capacity = usize::from(capacity.max(1));
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.outgoing.len()
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn allocate_packet_id(&mut self) -> PacketId {
        // Zero is invalid and ids still in flight must not be reused.
        loop {
            let candidate = self.next_packet_id;
            self.next_packet_id = self.next_packet_id.wrapping_add(1);
            if candidate != 0 && !self.outgoing.contains_key(&candidate) {
                return PacketId::new(candidate);
            }
        }
    }

    /// Offer a QoS > 0 publish to the window.
    pub fn push(&mut self, publish: OutboundPublish) -> PushOutcome {
        if self.outgoing.len() < self.capacity {
            let packet_id = self.allocate_packet_id();
            let state = match publish.qos {
                QoS::AtLeastOnce => DeliveryState::AwaitAck,
                _ => DeliveryState::AwaitRec,
            };
            self.outgoing
                .insert(packet_id.value(), Inflight { publish, state });
            PushOutcome::Started(packet_id)
        } else if self.pending.len() < self.pending_limit {
            self.pending.push_back(publish);
            PushOutcome::Queued
        } else {
            PushOutcome::Dropped
        }
    }

    #[must_use]
    pub fn get(&self, packet_id: PacketId) -> Option<&OutboundPublish> {
        self.outgoing.get(&packet_id.value()).map(|i| &i.publish)
    }

    /// PUBACK of a QoS 1 delivery. Returns true when the id was in
    /// flight; the slot is freed.
    pub fn puback(&mut self, packet_id: PacketId) -> bool {
        match self.outgoing.get(&packet_id.value()) {
            Some(inflight) if inflight.state == DeliveryState::AwaitAck => {
                self.outgoing.remove(&packet_id.value());
                true
            }
            _ => false,
        }
    }

    /// PUBREC of a QoS 2 delivery; the caller answers with PUBREL.
    /// Returns true when the id was awaiting it.
    pub fn pubrec(&mut self, packet_id: PacketId) -> bool {
        match self.outgoing.get_mut(&packet_id.value()) {
            Some(inflight) if inflight.state == DeliveryState::AwaitRec => {
                inflight.state = DeliveryState::AwaitComp;
                true
            }
            _ => false,
        }
    }

    /// PUBCOMP of a QoS 2 delivery. Returns true when the id was awaiting
    /// it; the slot is freed.
    pub fn pubcomp(&mut self, packet_id: PacketId) -> bool {
        match self.outgoing.get(&packet_id.value()) {
            Some(inflight) if inflight.state == DeliveryState::AwaitComp => {
                self.outgoing.remove(&packet_id.value());
                true
            }
            _ => false,
        }
    }

    /// Pop the next locally pending message once a slot is free.
    pub fn next_pending(&mut self) -> Option<OutboundPublish> {
        if self.outgoing.len() < self.capacity {
            self.pending.pop_front()
        } else {
            None
        }
    }

    /// True when a freed slot has no local work, so queued messages may
    /// be pulled from the session store.
    #[must_use]
    pub fn has_room_for_stored(&self) -> bool {
        self.pending.is_empty() && self.outgoing.len() < self.capacity
    }

    /// Take every undelivered message for re-queueing into the session
    /// store: unacknowledged publishes (dup set) first, pending ones
    /// after. QoS 2 deliveries past PUBREC are complete at the client and
    /// are not re-queued.
    #[must_use]
    pub fn drain_undelivered(&mut self) -> Vec<BrokerMessage> {
        let mut ids: Vec<u16> = self.outgoing.keys().copied().collect();
        ids.sort_unstable();

        let mut messages = Vec::new();
        for id in ids {
            let Some(inflight) = self.outgoing.remove(&id) else {
                continue;
            };
            if inflight.state == DeliveryState::AwaitComp {
                continue;
            }
            let mut message = inflight.publish.message;
            message.set_dup(true);
            messages.push(message);
        }
        messages.extend(self.pending.drain(..).map(|publish| publish.message));
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn publish(topic: &str, qos: QoS) -> OutboundPublish {
        OutboundPublish {
            message: BrokerMessage::new(topic, Bytes::from_static(b"v"), qos, "p", 0),
            qos,
            retain: false,
        }
    }

    #[test]
    fn test_window_fills_then_queues_then_drops() {
        let mut window = InflightWindow::new(2, 1);
        assert!(matches!(
            window.push(publish("a", QoS::AtLeastOnce)),
            PushOutcome::Started(_)
        ));
        assert!(matches!(
            window.push(publish("b", QoS::AtLeastOnce)),
            PushOutcome::Started(_)
        ));
        assert_eq!(window.push(publish("c", QoS::AtLeastOnce)), PushOutcome::Queued);
        assert_eq!(
            window.push(publish("d", QoS::AtLeastOnce)),
            PushOutcome::Dropped
        );
    }

    #[test]
    fn test_puback_frees_slot_for_pending() {
        let mut window = InflightWindow::new(1, 4);
        let PushOutcome::Started(id) = window.push(publish("a", QoS::AtLeastOnce)) else {
            panic!("expected start");
        };
        assert_eq!(window.push(publish("b", QoS::AtLeastOnce)), PushOutcome::Queued);
        assert!(window.next_pending().is_none());

        assert!(window.puback(id));
        assert!(!window.puback(id));
        let next = window.next_pending().unwrap();
        assert_eq!(next.message.topic(), "b");
    }

    #[test]
    fn test_qos2_sequence() {
        let mut window = InflightWindow::new(1, 0);
        let PushOutcome::Started(id) = window.push(publish("a", QoS::ExactOnce)) else {
            panic!("expected start");
        };
        // PUBACK is the wrong acknowledgement for QoS 2.
        assert!(!window.puback(id));
        assert!(window.pubrec(id));
        assert!(!window.pubrec(id));
        assert!(window.pubcomp(id));
        assert_eq!(window.in_flight(), 0);
    }

    #[test]
    fn test_drain_undelivered_sets_dup() {
        let mut window = InflightWindow::new(2, 4);
        let PushOutcome::Started(first) = window.push(publish("a", QoS::AtLeastOnce)) else {
            panic!("expected start");
        };
        let PushOutcome::Started(second) = window.push(publish("b", QoS::ExactOnce)) else {
            panic!("expected start");
        };
        window.push(publish("c", QoS::AtLeastOnce));

        // The second delivery got its PUBREC; it stays completed.
        assert!(window.pubrec(second));
        let _ = first;

        let drained = window.drain_undelivered();
        let topics: Vec<&str> = drained.iter().map(BrokerMessage::topic).collect();
        assert_eq!(topics, vec!["a", "c"]);
        assert!(drained[0].dup());
        assert!(!drained[1].dup());
    }

    #[test]
    fn test_packet_id_skips_zero_and_in_flight() {
        let mut window = InflightWindow::new(8, 0);
        window.next_packet_id = u16::MAX;
        let PushOutcome::Started(id1) = window.push(publish("a", QoS::AtLeastOnce)) else {
            panic!("expected start");
        };
        let PushOutcome::Started(id2) = window.push(publish("b", QoS::AtLeastOnce)) else {
            panic!("expected start");
        };
        assert_eq!(id1.value(), u16::MAX);
        // Zero is skipped on wrap-around.
        assert_eq!(id2.value(), 1);
    }
}

//! Sliding-window flow control for outbound messages

use std::collections::VecDeque;

use bytes::Bytes;
use tessera_sequencer::ServerTransactionId;

use crate::error::{Error, Result};

/// A sequenced message bound for the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    sequence: u64,
    txn: Option<ServerTransactionId>,
    payload: Bytes,
}

impl OutboundMessage {
    /// Session-local sequence number, starting at 1
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Transaction whose outcome this message reports, if any
    #[must_use]
    pub const fn txn(&self) -> Option<&ServerTransactionId> {
        self.txn.as_ref()
    }

    /// Message body
    #[must_use]
    pub const fn payload(&self) -> &Bytes {
        &self.payload
    }
}

/// Outbound buffer split into an in-flight window and a waiting queue.
///
/// Sequence numbers are assigned on enqueue, so the window always holds a
/// contiguous run directly above `last_acked` and the queue holds the
/// contiguous run after it.
#[derive(Debug)]
pub struct SendWindow {
    window: usize,
    capacity: usize,
    next_sequence: u64,
    last_acked: u64,
    in_flight: VecDeque<OutboundMessage>,
    queued: VecDeque<OutboundMessage>,
}

impl SendWindow {
    /// Window of `window` slots (at least one) with a queue of `capacity`
    /// messages; a capacity of 0 is unbounded.
    #[must_use]
    pub fn new(window: usize, capacity: usize) -> Self {
        Self {
            window: window.max(1),
            capacity,
            next_sequence: 1,
            last_acked: 0,
            in_flight: VecDeque::new(),
            queued: VecDeque::new(),
        }
    }

    /// Sequence a message and append it to the queue.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SendQueueFull`] when the queue is at capacity.
    pub fn enqueue(&mut self, payload: Bytes, txn: Option<ServerTransactionId>) -> Result<u64> {
        if self.capacity != 0 && self.queued.len() >= self.capacity {
            return Err(Error::SendQueueFull {
                capacity: self.capacity,
            });
        }
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.queued.push_back(OutboundMessage {
            sequence,
            txn,
            payload,
        });
        Ok(sequence)
    }

    /// Move queued messages into free window slots and return them, in order,
    /// for transmission.
    pub fn fill(&mut self) -> Vec<OutboundMessage> {
        let mut released = Vec::new();
        while self.in_flight.len() < self.window {
            let Some(message) = self.queued.pop_front() else {
                break;
            };
            released.push(message.clone());
            self.in_flight.push_back(message);
        }
        released
    }

    /// Cumulative acknowledgement of every message up to `ack`. Returns how
    /// many in-flight messages were released; older acks release nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AckOutOfRange`] if `ack` was never transmitted.
    pub fn acknowledge(&mut self, ack: u64) -> Result<usize> {
        let highest = self.highest_sent();
        if ack > highest {
            return Err(Error::AckOutOfRange { ack, highest });
        }
        if ack <= self.last_acked {
            return Ok(0);
        }
        let before = self.in_flight.len();
        while self.in_flight.front().is_some_and(|m| m.sequence <= ack) {
            self.in_flight.pop_front();
        }
        self.last_acked = ack;
        Ok(before - self.in_flight.len())
    }

    /// Highest sequence moved into the window
    #[must_use]
    pub fn highest_sent(&self) -> u64 {
        self.in_flight
            .back()
            .map_or(self.last_acked, OutboundMessage::sequence)
    }

    /// Highest cumulatively acknowledged sequence
    #[must_use]
    pub const fn last_acked(&self) -> u64 {
        self.last_acked
    }

    /// Unacknowledged messages, oldest first
    pub fn in_flight(&self) -> impl Iterator<Item = &OutboundMessage> {
        self.in_flight.iter()
    }

    /// Number of unacknowledged messages
    #[must_use]
    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// Number of messages waiting for a slot
    #[must_use]
    pub fn queued_len(&self) -> usize {
        self.queued.len()
    }

    /// Drop everything buffered, returning it oldest first. Sequence
    /// numbering continues where it left off.
    pub fn drain(&mut self) -> Vec<OutboundMessage> {
        self.last_acked = self.next_sequence - 1;
        self.in_flight.drain(..).chain(self.queued.drain(..)).collect()
    }
}

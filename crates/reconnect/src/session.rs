//! Per-client session lifecycle

use std::collections::BTreeSet;

use bytes::Bytes;
use tessera_identity::NodeId;
use tessera_sequencer::{ServerTransactionId, TransactionSequencer};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ReconnectConfig;
use crate::error::{Error, Result};
use crate::window::{OutboundMessage, SendWindow};

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport is up
    Connected,
    /// Transport is down; the session is held until `deadline`
    Disconnected {
        /// When the transport dropped
        since: Instant,
        /// When the session expires
        deadline: Instant,
    },
    /// Torn down; the client must re-handshake
    Expired,
}

/// What the owner must do after a disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectAction {
    /// Keep the session and expire it at `deadline` unless it reconnects
    Hold {
        /// Expiry time
        deadline: Instant,
    },
    /// Tear the session down now
    Expire,
}

/// Result of a successful reconnection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconnect {
    /// Retransmit these messages, in order
    Replay(Vec<OutboundMessage>),
    /// The client's position could not be matched; it must resync its state
    Resync,
}

/// Outcome of expiring a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Teardown {
    /// Transactions that never committed; fail them back to their callers
    pub failed: Vec<ServerTransactionId>,
    /// Committed transactions whose acknowledgement was lost
    pub retained: Vec<ServerTransactionId>,
    /// Buffered messages dropped without delivery
    pub discarded: usize,
}

/// Outbound buffering and acknowledgement state for one client.
#[derive(Debug)]
pub struct ReconnectSession {
    client: NodeId,
    config: ReconnectConfig,
    state: SessionState,
    window: SendWindow,
    received: u64,
    delayed_acks: u32,
    epoch: u64,
    timed_out: bool,
}

impl ReconnectSession {
    /// New connected session for `client`
    #[must_use]
    pub fn new(client: NodeId, config: ReconnectConfig) -> Self {
        let window = SendWindow::new(config.send_window, config.send_queue_capacity);
        Self {
            client,
            config,
            state: SessionState::Connected,
            window,
            received: 0,
            delayed_acks: 0,
            epoch: 0,
            timed_out: false,
        }
    }

    /// Client this session belongs to
    #[must_use]
    pub const fn client(&self) -> &NodeId {
        &self.client
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the session has been torn down
    #[must_use]
    pub const fn is_expired(&self) -> bool {
        matches!(self.state, SessionState::Expired)
    }

    /// Changes on every disconnect, reconnect and expiry; a timer armed for
    /// an older epoch is stale.
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Outbound buffer
    #[must_use]
    pub const fn window(&self) -> &SendWindow {
        &self.window
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_expired() {
            return Err(Error::SessionExpired(self.client.clone()));
        }
        Ok(())
    }

    /// Sequence a message for the client. Returns it for transmission when
    /// connected with a free window slot; otherwise it waits in the queue.
    ///
    /// # Errors
    ///
    /// Fails if the session expired or the queue is full.
    pub fn send(
        &mut self,
        payload: Bytes,
        txn: Option<ServerTransactionId>,
    ) -> Result<Option<OutboundMessage>> {
        self.ensure_live()?;
        self.window.enqueue(payload, txn)?;
        if self.state != SessionState::Connected {
            return Ok(None);
        }
        let mut released = self.window.fill();
        debug_assert!(released.len() <= 1);
        Ok(released.pop())
    }

    /// Cumulative acknowledgement from the client. Returns messages that
    /// became transmittable, in order.
    ///
    /// # Errors
    ///
    /// Fails if the session expired or `ack` was never sent.
    pub fn acknowledge(&mut self, ack: u64) -> Result<Vec<OutboundMessage>> {
        self.ensure_live()?;
        self.window.acknowledge(ack)?;
        if self.state == SessionState::Connected {
            Ok(self.window.fill())
        } else {
            Ok(Vec::new())
        }
    }

    /// Note a message received from the client. Returns the sequence to
    /// acknowledge when too many acks have been deferred.
    pub fn on_received(&mut self, sequence: u64) -> Option<u64> {
        self.received = self.received.max(sequence);
        self.delayed_acks += 1;
        if self.delayed_acks >= self.config.max_delayed_acks.max(1) {
            self.delayed_acks = 0;
            Some(self.received)
        } else {
            None
        }
    }

    /// Acknowledge whatever has been deferred
    pub const fn flush_ack(&mut self) -> Option<u64> {
        if self.delayed_acks == 0 {
            return None;
        }
        self.delayed_acks = 0;
        Some(self.received)
    }

    /// The transport dropped at `now`.
    pub fn disconnect(&mut self, now: Instant) -> DisconnectAction {
        match self.state {
            SessionState::Expired => DisconnectAction::Expire,
            SessionState::Disconnected { deadline, .. } => DisconnectAction::Hold { deadline },
            SessionState::Connected if !self.config.enabled => {
                debug!("Reconnect disabled, dropping session for {}", self.client);
                DisconnectAction::Expire
            }
            SessionState::Connected => {
                let deadline = now + self.config.timeout;
                self.state = SessionState::Disconnected {
                    since: now,
                    deadline,
                };
                self.epoch += 1;
                info!(
                    "Client {} disconnected, holding session for {:?} ({} in flight, {} queued)",
                    self.client,
                    self.config.timeout,
                    self.window.in_flight_len(),
                    self.window.queued_len()
                );
                DisconnectAction::Hold { deadline }
            }
        }
    }

    /// The client is back and reports `client_last_acked` as the last
    /// message it processed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionExpired`] once the timeout has passed, even if
    /// the session has not been torn down yet, and
    /// [`Error::NotDisconnected`] for a connected session. A session that
    /// rejected a late reconnect never accepts another one.
    pub fn reconnect(&mut self, client_last_acked: u64, now: Instant) -> Result<Reconnect> {
        let since = match self.state {
            SessionState::Expired => return Err(Error::SessionExpired(self.client.clone())),
            SessionState::Connected => return Err(Error::NotDisconnected(self.client.clone())),
            SessionState::Disconnected { .. } if self.timed_out => {
                return Err(Error::SessionExpired(self.client.clone()));
            }
            SessionState::Disconnected { deadline, .. } if now >= deadline => {
                warn!("Client {} reconnected after its session timed out", self.client);
                self.timed_out = true;
                return Err(Error::SessionExpired(self.client.clone()));
            }
            SessionState::Disconnected { since, .. } => since,
        };
        self.state = SessionState::Connected;
        self.epoch += 1;

        let known = self.window.last_acked()..=self.window.highest_sent();
        if !known.contains(&client_last_acked) {
            let dropped = self.window.drain().len();
            warn!(
                "Client {} reports ack {} outside {:?}, forcing resync ({} messages dropped)",
                self.client, client_last_acked, known, dropped
            );
            return Ok(Reconnect::Resync);
        }

        self.window.acknowledge(client_last_acked)?;
        let mut replay: Vec<OutboundMessage> = self.window.in_flight().cloned().collect();
        replay.extend(self.window.fill());
        info!(
            "Client {} reconnected after {:?}, replaying {} messages",
            self.client,
            now.duration_since(since),
            replay.len()
        );
        Ok(Reconnect::Replay(replay))
    }

    /// Tear the session down. Uncommitted transactions of the client are
    /// voided through `sequencer`; committed ones, and those whose outcome
    /// was still buffered for the client, are retained.
    ///
    /// Returns `None` if the session had already expired.
    pub fn expire(&mut self, sequencer: &TransactionSequencer) -> Option<Teardown> {
        if self.is_expired() {
            return None;
        }
        self.state = SessionState::Expired;
        self.epoch += 1;

        let buffered = self.window.drain();
        let report = sequencer.void_node(&self.client);

        let failed: BTreeSet<ServerTransactionId> = report.voided.into_iter().collect();
        let mut retained: BTreeSet<ServerTransactionId> = report.completed.into_iter().collect();
        retained.extend(
            buffered
                .iter()
                .filter_map(OutboundMessage::txn)
                .filter(|txn| !failed.contains(txn))
                .cloned(),
        );

        let teardown = Teardown {
            failed: failed.into_iter().collect(),
            retained: retained.into_iter().collect(),
            discarded: buffered.len(),
        };
        info!(
            "Session for {} expired: {} failed, {} retained, {} messages discarded",
            self.client,
            teardown.failed.len(),
            teardown.retained.len(),
            teardown.discarded
        );
        Some(teardown)
    }
}

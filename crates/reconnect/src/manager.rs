//! Session registry and expiry timers

use std::sync::{Arc, Weak};

use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use tessera_identity::NodeId;
use tessera_sequencer::{ServerTransactionId, TransactionSequencer};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ReconnectConfig;
use crate::error::{Error, Result};
use crate::session::{DisconnectAction, Reconnect, ReconnectSession, SessionState, Teardown};
use crate::window::OutboundMessage;

/// Notification that a client's session was torn down
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiredSession {
    /// The client
    pub client: NodeId,
    /// What happened to its transactions
    pub teardown: Teardown,
}

type SessionsMap = DashMap<NodeId, Arc<Mutex<ReconnectSession>>>;

/// Owns every client session of a server and arms one expiry timer per
/// disconnected session.
///
/// Expired sessions stay registered so that late reconnection attempts are
/// rejected; a fresh [`ReconnectManager::connect`] replaces them.
pub struct ReconnectManager {
    config: ReconnectConfig,
    sequencer: Arc<TransactionSequencer>,
    sessions: SessionsMap,
    expired_tx: mpsc::UnboundedSender<ExpiredSession>,
}

impl ReconnectManager {
    /// Create a manager. Teardowns are reported on the returned receiver.
    #[must_use]
    pub fn new(
        config: ReconnectConfig,
        sequencer: Arc<TransactionSequencer>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<ExpiredSession>) {
        let (expired_tx, expired_rx) = mpsc::unbounded_channel();
        let manager = Arc::new(Self {
            config,
            sequencer,
            sessions: DashMap::new(),
            expired_tx,
        });
        (manager, expired_rx)
    }

    fn session(&self, client: &NodeId) -> Result<Arc<Mutex<ReconnectSession>>> {
        self.sessions
            .get(client)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::UnknownSession(client.clone()))
    }

    /// Register a handshake from `client`, replacing an expired session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyConnected`] while a live session exists.
    pub fn connect(&self, client: NodeId) -> Result<()> {
        let session = Arc::new(Mutex::new(ReconnectSession::new(
            client.clone(),
            self.config.clone(),
        )));
        match self.sessions.entry(client.clone()) {
            Entry::Occupied(mut entry) => {
                let expired = entry.get().lock().is_expired();
                if !expired {
                    return Err(Error::AlreadyConnected(client));
                }
                debug!("Replacing expired session for {}", client);
                entry.insert(session);
            }
            Entry::Vacant(entry) => {
                debug!("Opening session for {}", client);
                entry.insert(session);
            }
        }
        Ok(())
    }

    /// See [`ReconnectSession::send`].
    ///
    /// # Errors
    ///
    /// Fails for an unknown or expired session, or a full queue.
    pub fn send(
        &self,
        client: &NodeId,
        payload: Bytes,
        txn: Option<ServerTransactionId>,
    ) -> Result<Option<OutboundMessage>> {
        self.session(client)?.lock().send(payload, txn)
    }

    /// See [`ReconnectSession::acknowledge`].
    ///
    /// # Errors
    ///
    /// Fails for an unknown or expired session, or an ack never sent.
    pub fn acknowledge(&self, client: &NodeId, ack: u64) -> Result<Vec<OutboundMessage>> {
        self.session(client)?.lock().acknowledge(ack)
    }

    /// See [`ReconnectSession::on_received`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownSession`] for an unregistered client.
    pub fn on_received(&self, client: &NodeId, sequence: u64) -> Result<Option<u64>> {
        Ok(self.session(client)?.lock().on_received(sequence))
    }

    /// The client's transport dropped. Arms the expiry timer, or tears the
    /// session down at once when reconnect is disabled. The timer runs on
    /// the ambient tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownSession`] for an unregistered client.
    pub fn disconnect(self: &Arc<Self>, client: &NodeId) -> Result<()> {
        let session = self.session(client)?;
        let (action, epoch) = {
            let mut session = session.lock();
            let action = session.disconnect(Instant::now());
            (action, session.epoch())
        };

        match action {
            DisconnectAction::Hold { deadline } => {
                let manager = Arc::downgrade(self);
                let armed = Arc::downgrade(&session);
                let client = client.clone();
                tokio::spawn(async move {
                    tokio::time::sleep_until(deadline).await;
                    expire_timer(&manager, &armed, &client, epoch);
                });
            }
            DisconnectAction::Expire => {
                self.expire(client);
            }
        }
        Ok(())
    }

    /// The client is back. A session found past its deadline is torn down
    /// here without waiting for its timer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionExpired`] after expiry; the client must
    /// handshake again through [`ReconnectManager::connect`].
    pub fn reconnect(&self, client: &NodeId, client_last_acked: u64) -> Result<Reconnect> {
        let session = self.session(client)?;
        let mut session = session.lock();
        match session.reconnect(client_last_acked, Instant::now()) {
            Err(Error::SessionExpired(_)) if !session.is_expired() => {
                let teardown = session.expire(&self.sequencer);
                drop(session);
                if let Some(teardown) = teardown {
                    self.publish(client, &teardown);
                }
                Err(Error::SessionExpired(client.clone()))
            }
            result => result,
        }
    }

    /// Tear a session down now. Only the first call for a session reports a
    /// teardown.
    pub fn expire(&self, client: &NodeId) -> Option<Teardown> {
        let session = self.session(client).ok()?;
        let teardown = session.lock().expire(&self.sequencer)?;
        self.publish(client, &teardown);
        Some(teardown)
    }

    fn publish(&self, client: &NodeId, teardown: &Teardown) {
        let expired = ExpiredSession {
            client: client.clone(),
            teardown: teardown.clone(),
        };
        if self.expired_tx.send(expired).is_err() {
            debug!("No listener for expiry of {}", client);
        }
    }

    /// Forget a client that closed cleanly
    pub fn remove(&self, client: &NodeId) -> bool {
        self.sessions.remove(client).is_some()
    }

    /// State of a client's session
    #[must_use]
    pub fn state(&self, client: &NodeId) -> Option<SessionState> {
        self.session(client).ok().map(|s| s.lock().state())
    }

    /// Number of registered sessions, expired ones included
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

fn expire_timer(
    manager: &Weak<ReconnectManager>,
    armed: &Weak<Mutex<ReconnectSession>>,
    client: &NodeId,
    epoch: u64,
) {
    let Some(manager) = manager.upgrade() else {
        return;
    };
    let Ok(session) = manager.session(client) else {
        debug!("Session for {} removed before its timer fired", client);
        return;
    };
    // The epoch only orders events within one session instance.
    if !armed.upgrade().is_some_and(|armed| Arc::ptr_eq(&armed, &session)) {
        debug!("Session for {} replaced before its timer fired", client);
        return;
    }

    let teardown = {
        let mut session = session.lock();
        if session.epoch() != epoch {
            debug!("Stale expiry timer for {}", client);
            return;
        }
        session.expire(&manager.sequencer)
    };
    if let Some(teardown) = teardown {
        if !teardown.failed.is_empty() {
            warn!(
                "Failing {} transactions of timed-out client {}",
                teardown.failed.len(),
                client
            );
        }
        info!("Reconnect window for {} closed", client);
        manager.publish(client, &teardown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_connect_rejects_live_duplicate() {
        let (manager, _rx) =
            ReconnectManager::new(ReconnectConfig::default(), Arc::default());
        let client = NodeId::client(1);

        manager.connect(client.clone()).unwrap();
        assert_eq!(
            manager.connect(client.clone()),
            Err(Error::AlreadyConnected(client.clone()))
        );

        manager.expire(&client).unwrap();
        manager.connect(client.clone()).unwrap();
        assert_eq!(manager.state(&client), Some(SessionState::Connected));
        assert_eq!(manager.session_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_client() {
        let (manager, _rx) =
            ReconnectManager::new(ReconnectConfig::default(), Arc::default());
        assert_matches!(
            manager.reconnect(&NodeId::client(5), 0),
            Err(Error::UnknownSession(_))
        );
        assert!(manager.expire(&NodeId::client(5)).is_none());
        assert!(!manager.remove(&NodeId::client(5)));
    }

    #[tokio::test]
    async fn test_disabled_reconnect_expires_immediately() {
        let config = ReconnectConfig {
            enabled: false,
            ..ReconnectConfig::default()
        };
        let (manager, mut rx) = ReconnectManager::new(config, Arc::default());
        let client = NodeId::client(3);
        manager.connect(client.clone()).unwrap();

        manager.disconnect(&client).unwrap();

        assert_eq!(manager.state(&client), Some(SessionState::Expired));
        let expired = rx.recv().await.unwrap();
        assert_eq!(expired.client, client);
    }
}

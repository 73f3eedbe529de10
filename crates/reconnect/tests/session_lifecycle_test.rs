//! Disconnect, reconnect and expiry through the session manager

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tessera_identity::NodeId;
use tessera_reconnect::{Error, Reconnect, ReconnectConfig, ReconnectManager, SessionState};
use tessera_sequencer::{ServerTransactionId, TransactionId, TransactionSequencer};
use tokio::sync::mpsc::error::TryRecvError;

fn config() -> ReconnectConfig {
    ReconnectConfig {
        timeout: Duration::from_secs(5),
        send_window: 5,
        ..ReconnectConfig::default()
    }
}

fn stx(client: &NodeId, txn: u64) -> ServerTransactionId {
    ServerTransactionId::new(client.clone(), TransactionId::new(txn))
}

#[tokio::test(start_paused = true)]
async fn test_window_bounds_replay_after_reconnect() {
    let (manager, _rx) = ReconnectManager::new(config(), Arc::default());
    let client = NodeId::client(1);
    manager.connect(client.clone()).unwrap();

    manager.disconnect(&client).unwrap();
    for i in 0..8 {
        let sent = manager
            .send(&client, Bytes::from(format!("update {i}")), None)
            .unwrap();
        assert!(sent.is_none());
    }

    tokio::time::sleep(Duration::from_secs(2)).await;
    let Reconnect::Replay(replay) = manager.reconnect(&client, 0).unwrap() else {
        panic!("expected replay");
    };
    let sequences: Vec<u64> = replay.iter().map(|m| m.sequence()).collect();
    assert_eq!(sequences, vec![1, 2, 3, 4, 5]);
    assert_eq!(replay[0].payload(), &Bytes::from("update 0"));

    let released = manager.acknowledge(&client, 1).unwrap();
    assert_eq!(released.len(), 1);
    assert_eq!(released[0].sequence(), 6);

    let released = manager.acknowledge(&client, 4).unwrap();
    let sequences: Vec<u64> = released.iter().map(|m| m.sequence()).collect();
    assert_eq!(sequences, vec![7, 8]);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_after_timeout_requires_handshake() {
    let sequencer = Arc::new(TransactionSequencer::default());
    let (manager, mut rx) = ReconnectManager::new(config(), Arc::clone(&sequencer));
    let client = NodeId::client(2);
    manager.connect(client.clone()).unwrap();

    for txn in 1..=2 {
        sequencer
            .get_or_create_global_transaction_id(&stx(&client, txn))
            .unwrap();
    }
    sequencer.commit(&stx(&client, 1)).unwrap();
    manager
        .send(&client, Bytes::from("committed 1"), Some(stx(&client, 1)))
        .unwrap();

    manager.disconnect(&client).unwrap();
    let expired = rx.recv().await.unwrap();

    assert_eq!(expired.client, client);
    assert_eq!(expired.teardown.failed, vec![stx(&client, 2)]);
    assert_eq!(expired.teardown.retained, vec![stx(&client, 1)]);
    assert_eq!(sequencer.outstanding_count(), 0);

    assert_eq!(
        manager.reconnect(&client, 1),
        Err(Error::SessionExpired(client.clone()))
    );
    assert!(manager.expire(&client).is_none());
    assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));

    manager.connect(client.clone()).unwrap();
    assert_eq!(manager.state(&client), Some(SessionState::Connected));
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_cancels_pending_expiry() {
    let (manager, mut rx) = ReconnectManager::new(config(), Arc::default());
    let client = NodeId::client(3);
    manager.connect(client.clone()).unwrap();

    manager.disconnect(&client).unwrap();
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert!(matches!(
        manager.reconnect(&client, 0),
        Ok(Reconnect::Replay(_))
    ));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(manager.state(&client), Some(SessionState::Connected));
    assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));

    manager.disconnect(&client).unwrap();
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(manager.state(&client), Some(SessionState::Expired));
    assert_eq!(rx.recv().await.map(|e| e.client), Some(client));
}

#[tokio::test(start_paused = true)]
async fn test_sessions_expire_independently() {
    let (manager, mut rx) = ReconnectManager::new(config(), Arc::default());
    let early = NodeId::client(10);
    let late = NodeId::client(11);
    manager.connect(early.clone()).unwrap();
    manager.connect(late.clone()).unwrap();

    manager.disconnect(&early).unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;
    manager.disconnect(&late).unwrap();

    assert_eq!(rx.recv().await.map(|e| e.client), Some(early));
    assert!(matches!(
        manager.state(&late),
        Some(SessionState::Disconnected { .. })
    ));
    assert_eq!(rx.recv().await.map(|e| e.client), Some(late));
}

#[tokio::test(start_paused = true)]
async fn test_stale_timer_spares_new_session() {
    let (manager, mut rx) = ReconnectManager::new(config(), Arc::default());
    let client = NodeId::client(4);
    manager.connect(client.clone()).unwrap();
    manager.disconnect(&client).unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(manager.remove(&client));
    manager.connect(client.clone()).unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    manager.disconnect(&client).unwrap();

    tokio::time::sleep(Duration::from_millis(3500)).await;
    assert!(matches!(
        manager.state(&client),
        Some(SessionState::Disconnected { .. })
    ));
    assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    assert!(matches!(
        manager.reconnect(&client, 0),
        Ok(Reconnect::Replay(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_stale_timer_spares_replacement_after_expiry() {
    let (manager, mut rx) = ReconnectManager::new(config(), Arc::default());
    let client = NodeId::client(5);
    manager.connect(client.clone()).unwrap();
    manager.disconnect(&client).unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(manager.expire(&client).is_some());
    assert_eq!(rx.recv().await.map(|e| e.client), Some(client.clone()));
    manager.connect(client.clone()).unwrap();
    manager.disconnect(&client).unwrap();

    tokio::time::sleep(Duration::from_millis(4500)).await;
    assert!(matches!(
        manager.state(&client),
        Some(SessionState::Disconnected { .. })
    ));
    assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(manager.state(&client), Some(SessionState::Expired));
    assert_eq!(rx.recv().await.map(|e| e.client), Some(client));
}

#[tokio::test]
async fn test_late_reconnect_tears_down_before_timer() {
    let config = ReconnectConfig {
        timeout: Duration::from_millis(50),
        ..ReconnectConfig::default()
    };
    let sequencer = Arc::new(TransactionSequencer::default());
    let (manager, mut rx) = ReconnectManager::new(config, Arc::clone(&sequencer));
    let client = NodeId::client(6);
    manager.connect(client.clone()).unwrap();
    sequencer
        .get_or_create_global_transaction_id(&stx(&client, 1))
        .unwrap();
    manager.disconnect(&client).unwrap();

    // Block the only worker so the expiry timer cannot run.
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(
        manager.reconnect(&client, 0),
        Err(Error::SessionExpired(client.clone()))
    );
    assert_eq!(manager.state(&client), Some(SessionState::Expired));
    let expired = rx.try_recv().unwrap();
    assert_eq!(expired.teardown.failed, vec![stx(&client, 1)]);

    manager.connect(client.clone()).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(manager.state(&client), Some(SessionState::Connected));
    assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_connects_admit_one_session() {
    let (manager, _rx) = ReconnectManager::new(config(), Arc::default());
    let client = NodeId::client(8);

    let attempts: Vec<_> = (0..8)
        .map(|_| {
            let manager = Arc::clone(&manager);
            let client = client.clone();
            tokio::spawn(async move { manager.connect(client) })
        })
        .collect();
    let mut admitted = 0;
    for attempt in attempts {
        match attempt.await.unwrap() {
            Ok(()) => admitted += 1,
            Err(err) => assert_eq!(err, Error::AlreadyConnected(client.clone())),
        }
    }
    assert_eq!(admitted, 1);
    assert_eq!(manager.session_count(), 1);
}

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use zapd::config::ReaderConfig;
use zapd::readers::{file, start_readers, Reader, ReaderError};
use zapd::state::{Notification, RuntimeState};

const WAIT: Duration = Duration::from_secs(2);

#[tokio::test]
async fn file_reader_queues_new_scans_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("token.txt");
    let state = Arc::new(RuntimeState::new(true));
    let (tx, mut rx) = mpsc::channel(8);

    let reader = file::spawn(path.clone(), Arc::clone(&state), tx);
    std::fs::write(&path, "**launch.system:nes\n").unwrap();

    let token = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(token.text, "**launch.system:nes");
    assert_eq!(token.uid, "**launch.system:nes");
    assert!(!token.is_removal());

    // Emptying the file removes the active token without queueing anything.
    std::fs::write(&path, "").unwrap();
    tokio::time::timeout(WAIT, async {
        while !state.active_token().is_removal() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();
    assert!(rx.try_recv().is_err());

    reader.close().unwrap();
    assert!(matches!(reader.close(), Err(ReaderError::Closed(_))));
}

#[tokio::test]
async fn configured_readers_are_registered() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("token.txt");
    let state = Arc::new(RuntimeState::new(true));
    let mut notifications = state.subscribe();
    let (tx, _rx) = mpsc::channel(8);

    start_readers(&[ReaderConfig::File { path: path.clone() }], &state, &tx);

    let device = file::device_name(&path);
    assert!(state.has_reader(&device));
    assert_eq!(
        notifications.try_recv(),
        Ok(Notification::ReadersConnected(device))
    );

    state.stop_service();
    assert!(state.list_readers().is_empty());
}

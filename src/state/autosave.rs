use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::session::{SessionDocument, SessionStore};

use crate::{log_error, log_info};

pub const DEFAULT_AUTOSAVE_INTERVAL: Duration = Duration::from_secs(10);

/// Background task writing the latest published session snapshot to disk.
///
/// Setters never wait on it: they publish on a watch channel and the task
/// picks up whatever is newest at each tick. Cancelling performs one last
/// write.
pub struct Autosaver {
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Autosaver {
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        store: Arc<SessionStore>,
        snapshots: watch::Receiver<SessionDocument>,
        interval: Duration,
    ) -> Self {
        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();
        let handle = tokio::spawn(async move {
            autosave_loop(store, snapshots, interval, token).await;
        });
        Self {
            cancel_token,
            handle,
        }
    }

    /// Stop the task after its final write.
    pub async fn shutdown(self) -> Result<()> {
        self.cancel_token.cancel();
        self.handle.await.context("autosave task failed")
    }
}

async fn autosave_loop(
    store: Arc<SessionStore>,
    mut snapshots: watch::Receiver<SessionDocument>,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if snapshots.has_changed().unwrap_or(false) {
                    let doc = snapshots.borrow_and_update().clone();
                    write(&store, &doc);
                }
            }
            _ = cancel_token.cancelled() => {
                let doc = snapshots.borrow_and_update().clone();
                write(&store, &doc);
                log_info!("autosave stopped");
                break;
            }
        }
    }
}

fn write(store: &SessionStore, doc: &SessionDocument) {
    if let Err(err) = store.save(doc) {
        log_error!("autosave to {} failed: {err:?}", store.path().display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(fps: f64) -> SessionDocument {
        let mut doc = SessionDocument::default();
        doc.insert("fpsPlayback", serde_json::json!(fps));
        doc
    }

    #[tokio::test]
    async fn writes_latest_snapshot_on_tick() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SessionStore::new(dir.path().join("session.json")).unwrap());
        let (tx, rx) = watch::channel(SessionDocument::default());
        let saver = Autosaver::spawn(store.clone(), rx, Duration::from_millis(20));

        tx.send_replace(doc(20.0));
        tx.send_replace(doc(25.0));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(
            store.document().get("fpsPlayback"),
            Some(&serde_json::json!(25.0))
        );

        saver.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_writes_once_more() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let store = Arc::new(SessionStore::new(path.clone()).unwrap());
        let (tx, rx) = watch::channel(SessionDocument::default());
        let saver = Autosaver::spawn(store, rx, Duration::from_secs(3600));

        tx.send_replace(doc(12.0));
        saver.shutdown().await.unwrap();

        let reopened = SessionStore::new(path).unwrap();
        assert_eq!(
            reopened.document().get("fpsPlayback"),
            Some(&serde_json::json!(12.0))
        );
    }
}

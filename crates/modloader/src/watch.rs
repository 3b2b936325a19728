//! Stylesheet hot reload.
//!
//! Watches the asset directory and pushes `{file, content}` for every `.css`
//! file that changed, after a debounce window that starts at the first change
//! of a burst. A file that vanished before the window closed is reported with
//! empty content so the consumer can drop its styles.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{
    Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::types::LoaderResult;

pub const DEBOUNCE: Duration = Duration::from_millis(300);

/// One stylesheet change pushed to the consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleUpdate {
    pub file: String,
    pub content: String,
}

/// Handle to a running watcher. Dropping it stops filesystem notifications;
/// cancelling the token stops the debounce task.
pub struct StyleWatcher {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl StyleWatcher {
    /// Start watching `dir` (non-recursively) and send updates to `out`.
    pub fn start(
        dir: &Path,
        debounce: Duration,
        cancel: CancellationToken,
        out: mpsc::UnboundedSender<StyleUpdate>,
    ) -> LoaderResult<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if !matches!(event.kind, EventKind::Access(_)) => {
                    let _ = tx.send(event.paths);
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("Watch error: {e}"),
            },
            Config::default(),
        )?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;

        tracing::info!("Watching {} for stylesheet changes", dir.display());
        let task = tokio::spawn(debounce_loop(rx, debounce, cancel, out));

        Ok(Self {
            _watcher: watcher,
            task,
        })
    }

    /// Wait for the debounce task to finish after cancellation.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            tracing::error!("Style watcher task failed: {e}");
        }
    }
}

fn is_stylesheet(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("css")
}

async fn read_or_empty(path: &Path) -> String {
    match tokio::fs::read(path).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            tracing::debug!("{} unreadable, sending empty content: {e}", path.display());
            String::new()
        }
    }
}

/// Collect changed paths and flush them once per debounce window.
pub(crate) async fn debounce_loop(
    mut changes: mpsc::UnboundedReceiver<Vec<PathBuf>>,
    debounce: Duration,
    cancel: CancellationToken,
    out: mpsc::UnboundedSender<StyleUpdate>,
) {
    let mut pending: BTreeSet<PathBuf> = BTreeSet::new();
    let mut deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            batch = changes.recv() => {
                let Some(paths) = batch else { break };
                let before = pending.len();
                pending.extend(paths.into_iter().filter(|p| is_stylesheet(p)));
                if deadline.is_none() && pending.len() > before {
                    deadline = Some(Instant::now() + debounce);
                }
            }
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)),
                if deadline.is_some() =>
            {
                deadline = None;
                tracing::info!("{} stylesheets changed", pending.len());
                for path in std::mem::take(&mut pending) {
                    let Some(name) = path.file_name() else {
                        continue;
                    };
                    let file = name.to_string_lossy().into_owned();
                    let content = read_or_empty(&path).await;
                    if out.send(StyleUpdate { file, content }).is_err() {
                        tracing::debug!("Style update receiver closed");
                        return;
                    }
                }
            }
        }
    }
    tracing::info!("Style watcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const WINDOW: Duration = Duration::from_millis(80);

    struct Harness {
        changes: mpsc::UnboundedSender<Vec<PathBuf>>,
        updates: mpsc::UnboundedReceiver<StyleUpdate>,
        cancel: CancellationToken,
        task: JoinHandle<()>,
    }

    fn harness() -> Harness {
        let (changes, rx) = mpsc::unbounded_channel();
        let (out, updates) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(debounce_loop(rx, WINDOW, cancel.clone(), out));
        Harness {
            changes,
            updates,
            cancel,
            task,
        }
    }

    async fn next(updates: &mut mpsc::UnboundedReceiver<StyleUpdate>) -> Option<StyleUpdate> {
        tokio::time::timeout(Duration::from_secs(5), updates.recv())
            .await
            .ok()
            .flatten()
    }

    #[tokio::test]
    async fn test_burst_is_coalesced_into_one_update() {
        let dir = TempDir::new().unwrap();
        let css = dir.path().join("theme.css");
        std::fs::write(&css, "a{}").unwrap();

        let mut h = harness();
        h.changes.send(vec![css.clone()]).unwrap();
        std::fs::write(&css, "b{}").unwrap();
        h.changes.send(vec![css.clone(), css.clone()]).unwrap();

        let update = next(&mut h.updates).await.unwrap();
        assert_eq!(
            update,
            StyleUpdate {
                file: "theme.css".to_string(),
                content: "b{}".to_string()
            }
        );

        // Nothing else queued for the same burst.
        tokio::time::sleep(WINDOW * 2).await;
        assert!(h.updates.try_recv().is_err());
        h.cancel.cancel();
    }

    #[tokio::test]
    async fn test_non_css_changes_are_ignored() {
        let dir = TempDir::new().unwrap();
        let js = dir.path().join("mod.js");
        let css = dir.path().join("a.css");
        std::fs::write(&js, "x").unwrap();
        std::fs::write(&css, "p{}").unwrap();

        let mut h = harness();
        h.changes.send(vec![js]).unwrap();
        tokio::time::sleep(WINDOW * 2).await;
        assert!(h.updates.try_recv().is_err());

        h.changes.send(vec![css]).unwrap();
        assert_eq!(next(&mut h.updates).await.unwrap().file, "a.css");
        h.cancel.cancel();
    }

    #[tokio::test]
    async fn test_deleted_file_sends_empty_content() {
        let dir = TempDir::new().unwrap();
        let gone = dir.path().join("gone.css");

        let mut h = harness();
        h.changes.send(vec![gone]).unwrap();

        let update = next(&mut h.updates).await.unwrap();
        assert_eq!(update.file, "gone.css");
        assert_eq!(update.content, "");
        h.cancel.cancel();
    }

    #[tokio::test]
    async fn test_several_files_in_one_window() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.css");
        let b = dir.path().join("b.css");
        std::fs::write(&a, "a").unwrap();
        std::fs::write(&b, "b").unwrap();

        let mut h = harness();
        h.changes.send(vec![b]).unwrap();
        h.changes.send(vec![a]).unwrap();

        let first = next(&mut h.updates).await.unwrap();
        let second = next(&mut h.updates).await.unwrap();
        assert_eq!((first.file.as_str(), second.file.as_str()), ("a.css", "b.css"));
        h.cancel.cancel();
    }

    #[tokio::test]
    async fn test_cancellation_stops_loop() {
        let h = harness();
        h.cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), h.task)
            .await
            .expect("loop exits after cancel")
            .unwrap();
    }

    #[tokio::test]
    async fn test_closed_change_channel_stops_loop() {
        let h = harness();
        drop(h.changes);
        tokio::time::timeout(Duration::from_secs(5), h.task)
            .await
            .expect("loop exits when source closes")
            .unwrap();
    }

    #[tokio::test]
    async fn test_watcher_reports_real_file_change() {
        let dir = TempDir::new().unwrap();
        let (out, mut updates) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let watcher = StyleWatcher::start(dir.path(), WINDOW, cancel.clone(), out).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        std::fs::write(dir.path().join("live.css"), "body{}").unwrap();

        let update = next(&mut updates).await.unwrap();
        assert_eq!(update.file, "live.css");
        assert_eq!(update.content, "body{}");

        cancel.cancel();
        watcher.join().await;
    }
}

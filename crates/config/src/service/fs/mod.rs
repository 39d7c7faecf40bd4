use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use affinitygate_model::{BoxResult, Endpoint};
use futures_util::{stream, StreamExt};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};

use super::{config_format::ConfigFormat, MembershipFeed, SnapshotStream};

/// Writers truncate before writing, wait for the file to settle before reading it.
const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Content of a membership file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipFile {
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

/// # Filesystem Membership Feed
///
/// ## Structure
/// ``` no_rust
/// # members.toml
/// endpoints = ["10.0.0.1:8080", "10.0.0.2:8080"]
/// ```
/// The file is read once on subscription and again every time it changes.
#[derive(Debug, Clone)]
pub struct Fs<F> {
    pub path: Arc<Path>,
    pub format: F,
}

impl<F> Fs<F>
where
    F: ConfigFormat,
{
    pub fn new<P: AsRef<Path>>(path: P, format: F) -> Self {
        Self {
            path: Arc::from(path.as_ref()),
            format,
        }
    }

    pub async fn retrieve(&self) -> BoxResult<Vec<Endpoint>> {
        let file: MembershipFile = self.format.de(&tokio::fs::read(&self.path).await?)?;
        Ok(file.endpoints)
    }

    pub async fn save(&self, endpoints: &[Endpoint]) -> BoxResult<()> {
        let file = MembershipFile { endpoints: endpoints.to_vec() };
        tokio::fs::write(&self.path, self.format.ser(&file)?).await?;
        Ok(())
    }

    /// The directory watched for changes of the file.
    fn watch_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

impl<F> MembershipFeed for Fs<F>
where
    F: ConfigFormat + Clone + Send + Sync + 'static,
{
    const FEED_NAME: &'static str = "file";

    async fn subscribe(self) -> BoxResult<SnapshotStream> {
        let (evt_tx, evt_rx) = tokio::sync::mpsc::unbounded_channel::<()>();
        let file_name = self.path.file_name().map(ToOwned::to_owned).ok_or_else(|| format!("not a file: {}", self.path.display()))?;
        let mut watcher = notify::RecommendedWatcher::new(
            move |next: notify::Result<Event>| {
                let event = match next {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::warn!("[AG.Feed] notify error: {e}");
                        return;
                    }
                };
                if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)) {
                    return;
                }
                if event.paths.iter().any(|path| path.file_name() == Some(file_name.as_os_str())) {
                    let _result = evt_tx.send(());
                }
            },
            notify::Config::default(),
        )?;
        watcher.watch(&self.watch_dir(), RecursiveMode::NonRecursive)?;
        let initial = self.retrieve().await?;
        tracing::info!(path = %self.path.display(), endpoints = initial.len(), "[AG.Feed] membership file loaded");

        // the watcher lives as long as the stream
        let changes = stream::unfold((self, evt_rx, watcher), |(fs, mut evt_rx, watcher)| async move {
            evt_rx.recv().await?;
            tokio::time::sleep(SETTLE_DELAY).await;
            while evt_rx.try_recv().is_ok() {}
            tracing::debug!(path = %fs.path.display(), "[AG.Feed] membership file changed");
            let snapshot = fs.retrieve().await;
            Some((snapshot, (fs, evt_rx, watcher)))
        });
        Ok(stream::iter([Ok(initial)]).chain(changes).boxed())
    }
}

//! Optional file-watch reload path: picks up a manual on-disk config edit
//! without requiring `ApplyConfig` to be called over an API, grounded on
//! `FileIndexWatcher`'s `notify` + broadcast pattern.

use crate::config::persist::load;
use crate::config::service::{ConfigService, UpdateType};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct ConfigFileWatcher {
    _watcher: RecommendedWatcher,
}

impl ConfigFileWatcher {
    /// Starts watching `path`'s parent directory and reloading `service`
    /// whenever the file's content changes. Errors during reload are
    /// logged; they do not stop the watcher.
    pub fn start(path: PathBuf, service: Arc<ConfigService>) -> Result<Self, notify::Error> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();

        let watch_path = path.clone();
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    let _ = tx.send(event);
                }
                Err(e) => log::warn!("ConfigFileWatcher: error receiving event: {e:?}"),
            },
            Config::default(),
        )?;

        let parent = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
        watcher.watch(&parent, RecursiveMode::NonRecursive)?;

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                    continue;
                }
                if !event.paths.iter().any(|p| p == &watch_path) {
                    continue;
                }
                match load(&watch_path) {
                    Ok(doc) => {
                        if let Err(err) = service.update(doc, UpdateType::ReloadedFromDisk) {
                            log::warn!("ConfigFileWatcher: reload rejected: {err}");
                        }
                    }
                    Err(err) => log::warn!("ConfigFileWatcher: failed to read config: {err}"),
                }
            }
        });

        Ok(Self { _watcher: watcher })
    }
}

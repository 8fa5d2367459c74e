//! The pool of images the bot sends.
//!
//! Items come from the images directory plus any names the store already has
//! a cached Telegram file id for. Sending by file id skips the upload.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use rand::seq::IteratorRandom;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

use cadence_scheduler::DedupWindow;
use cadence_store::{DbError, SqliteStore};

use crate::transport::MediaKind;

#[derive(Debug, Error)]
pub enum GalleryError {
    #[error("failed to read images directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("database error: {0}")]
    Db(#[from] DbError),

    #[error("no images found in {0} or the database")]
    Empty(PathBuf),
}

/// One sendable image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryItem {
    pub name: String,
    /// Telegram file id from an earlier upload.
    pub file_id: Option<String>,
}

pub struct Gallery {
    dir: PathBuf,
    store: Arc<SqliteStore>,
    items: RwLock<BTreeMap<String, Option<String>>>,
}

impl Gallery {
    /// Scan `dir` (non-recursively) and merge in cached file ids.
    ///
    /// Fails if neither the directory nor the cache yields any image.
    pub async fn load(
        dir: impl Into<PathBuf>,
        store: Arc<SqliteStore>,
    ) -> Result<Self, GalleryError> {
        let dir = dir.into();
        let io_err = |source: std::io::Error| GalleryError::Io {
            path: dir.clone(),
            source,
        };

        let mut items: BTreeMap<String, Option<String>> = store
            .file_ids()?
            .into_iter()
            .map(|(name, id)| (name, Some(id)))
            .collect();
        let cached = items.len();

        let mut entries = tokio::fs::read_dir(&dir).await.map_err(io_err)?;
        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            if !entry.file_type().await.map_err(io_err)?.is_file() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                debug!(path = %entry.path().display(), "skipping non-UTF-8 file name");
                continue;
            };
            if MediaKind::from_file_name(&name).is_none() {
                continue;
            }
            items.entry(name).or_insert(None);
        }

        if items.is_empty() {
            return Err(GalleryError::Empty(dir));
        }

        info!(images = items.len(), cached, dir = %dir.display(), "gallery loaded");

        Ok(Self {
            dir,
            store,
            items: RwLock::new(items),
        })
    }

    /// Where an item lives on disk.
    pub fn path_of(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }

    /// A uniformly random item.
    pub async fn pick(&self) -> Option<GalleryItem> {
        let items = self.items.read().await;
        choose(&items, |_| true)
    }

    /// A random item not in `recent`, or any item if all of them are.
    pub async fn pick_excluding(&self, recent: &DedupWindow) -> Option<GalleryItem> {
        let items = self.items.read().await;
        choose(&items, |name| !recent.contains(name)).or_else(|| choose(&items, |_| true))
    }

    /// Persist the file id Telegram assigned to an uploaded item.
    pub async fn remember_file_id(&self, name: &str, file_id: &str) -> Result<(), GalleryError> {
        self.store.save_file_id(name, file_id)?;
        self.items
            .write()
            .await
            .insert(name.to_string(), Some(file_id.to_string()));
        debug!(name, "cached file id");
        Ok(())
    }
}

fn choose(
    items: &BTreeMap<String, Option<String>>,
    keep: impl Fn(&str) -> bool,
) -> Option<GalleryItem> {
    items
        .iter()
        .filter(|(name, _)| keep(name.as_str()))
        .choose(&mut rand::thread_rng())
        .map(|(name, file_id)| GalleryItem {
            name: name.clone(),
            file_id: file_id.clone(),
        })
}

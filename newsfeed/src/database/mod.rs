//! Seen id store
//!
//! The only durable state of the bot: a json array with the ids of the most
//! recent news that were already processed.

use std::path::PathBuf;

use crate::{resource::NewsId, Error};

/// Number of ids kept by default.
pub const HISTORY_LIMIT: usize = 30;

/// Bounded history of seen ids, newest (largest) first.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SeenIds(Vec<NewsId>);

impl SeenIds {
    /// Sort descending, drop duplicates and keep the `limit` largest ids.
    pub fn bounded<I>(ids: I, limit: usize) -> Self
    where
        I: IntoIterator<Item = NewsId>,
    {
        let mut ids: Vec<_> = ids.into_iter().collect();
        ids.sort_unstable_by(|a, b| b.cmp(a));
        ids.dedup();
        ids.truncate(limit);
        Self(ids)
    }

    pub fn contains(&self, id: &NewsId) -> bool {
        self.0.contains(id)
    }

    pub fn ids(&self) -> &[NewsId] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Add `ids` to the history, keeping it within `limit`.
    pub fn extended<I>(&self, ids: I, limit: usize) -> Self
    where
        I: IntoIterator<Item = NewsId>,
    {
        Self::bounded(self.0.iter().copied().chain(ids), limit)
    }
}

/// File backed [`SeenIds`].
///
/// Single writer only: nothing here locks the file.
#[derive(Debug, Clone)]
pub struct SeenIdStore {
    path: PathBuf,
    limit: usize,
}

impl SeenIdStore {
    pub fn new(path: impl Into<PathBuf>, limit: usize) -> Self {
        Self {
            path: path.into(),
            limit,
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Read the history. `None` means the bot has never run here before.
    pub async fn load(&self) -> Result<Option<SeenIds>, Error> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error.into()),
        };

        let ids: Vec<NewsId> = serde_json::from_slice(&content)
            .map_err(|error| Error::CorruptedState(self.path.clone(), error))?;
        tracing::trace!("loaded {} seen ids from {}", ids.len(), self.path.display());

        Ok(Some(SeenIds::bounded(ids, self.limit)))
    }

    /// Overwrite the file with `ids`, bounded to the store limit.
    pub async fn save(&self, ids: &SeenIds) -> Result<SeenIds, Error> {
        let ids = SeenIds::bounded(ids.0.iter().copied(), self.limit);
        let content = serde_json::to_vec(&ids.0)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&self.path, content).await?;
        tracing::debug!("saved seen ids {:?} to {}", ids.0, self.path.display());

        Ok(ids)
    }
}

//! Resources served by the newsfeed api.
//!
//! [`NewsList`] and [`NewsDetail`] mirror the json envelopes of the server,
//! while [`NewsItem`] is the shape the rest of the crate works with.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};

/// Identifier of a news item.
///
/// The server sends integers, but a quoted id is accepted too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NewsId(pub i64);

impl<'de> Deserialize<'de> for NewsId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        crate::utils::string_or_i64(deserializer).map(NewsId)
    }
}

impl fmt::Display for NewsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A file attached to a news item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub guid: String,
    pub file_full_name: String,
}

/// A news item with everything needed to notify about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsItem {
    pub id: NewsId,
    pub publish_at: NaiveDateTime,
    pub title: String,
    pub attachments: Vec<Attachment>,
}

/// Response of `newsfeeds/list`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewsList {
    pub data: Vec<NewsEntry>,
}

/// One record of [`NewsList`]. Only the id matters to us.
#[derive(Debug, Clone, Deserialize)]
pub struct NewsEntry {
    pub id: NewsId,
}

/// Response of `newsfeeds/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewsDetailResponse {
    pub data: NewsDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewsDetail {
    #[serde(deserialize_with = "crate::utils::iso_date_format::deserialize")]
    pub publish_at: NaiveDateTime,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub attachments: Option<Vec<Attachment>>,
}

impl NewsList {
    pub fn ids(&self) -> impl Iterator<Item = NewsId> + '_ {
        self.data.iter().map(|entry| entry.id)
    }
}

impl NewsDetail {
    pub fn into_item(self, id: NewsId) -> NewsItem {
        NewsItem {
            id,
            publish_at: self.publish_at,
            title: self.title.unwrap_or_default(),
            attachments: self.attachments.unwrap_or_default(),
        }
    }
}

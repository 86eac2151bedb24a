use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use teloxide::{
    payloads::{SendDocumentSetters, SendMessageSetters},
    requests::Requester,
    types::{InputFile, ParseMode, Recipient},
    utils::html,
};

use crate::{resource::NewsItem, utils::truncate_chars, Error};

/// Telegram limit for message text.
pub const TEXT_LIMIT: usize = 4096;
/// Telegram limit for media captions.
pub const CAPTION_LIMIT: usize = 1024;

/// Something able to deliver html messages to a chat.
#[async_trait]
pub trait Deliver
where
    Self: Sync + Send,
{
    async fn deliver_text(&self, recipient: Recipient, text: String) -> Result<(), Error>;
    async fn deliver_document(
        &self,
        recipient: Recipient,
        document: &Path,
        caption: String,
    ) -> Result<(), Error>;
}

#[async_trait]
impl Deliver for teloxide::Bot {
    async fn deliver_text(&self, recipient: Recipient, text: String) -> Result<(), Error> {
        self.send_message(recipient, text)
            .parse_mode(ParseMode::Html)
            .await?;
        Ok(())
    }

    async fn deliver_document(
        &self,
        recipient: Recipient,
        document: &Path,
        caption: String,
    ) -> Result<(), Error> {
        self.send_document(recipient, InputFile::file(document.to_path_buf()))
            .caption(caption)
            .parse_mode(ParseMode::Html)
            .await?;
        Ok(())
    }
}

/// Notification about one news.
#[derive(Debug, Clone)]
pub struct NewsMessage {
    pub header: String,
    pub publish_at: NaiveDateTime,
    pub title: String,
}

impl NewsMessage {
    pub fn new(header: &str, news: &NewsItem) -> Self {
        Self {
            header: header.to_owned(),
            publish_at: news.publish_at,
            title: news.title.clone(),
        }
    }

    fn render(&self, header: &str, title: &str) -> String {
        format!(
            "{}\n\n<b>{} {}</b>\n{}",
            header,
            self.publish_at.format("%Y-%m-%d"),
            self.publish_at.format("%H:%M:%S"),
            html::escape(title)
        )
    }

    /// Html text of the message, shortening the title to fit in `limit`
    /// characters. A header too long to leave room for the title is cut too.
    pub fn text(&self, limit: usize) -> String {
        let frame = self.render("", "").chars().count();
        let header = truncate_chars(&self.header, limit.saturating_sub(frame + 1));

        let mut title_len = self.title.chars().count();
        loop {
            let text = self.render(&header, &truncate_chars(&self.title, title_len));
            let overflow = text.chars().count().saturating_sub(limit);
            if overflow == 0 || title_len == 0 {
                return text;
            }
            // `&amp;` is the longest escape
            title_len = title_len.saturating_sub(overflow.div_ceil(5));
        }
    }
}

/// A downloaded attachment, removed from disk when dropped.
#[derive(Debug)]
pub struct DownloadedFile {
    path: PathBuf,
}

impl DownloadedFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DownloadedFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!("removed {}", self.path.display()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(error) => tracing::warn!("failed to remove {}: {error}", self.path.display()),
        }
    }
}

/// How a notification went.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

impl DeliveryReport {
    /// Somebody should have got it, but nobody did.
    pub fn is_undelivered(&self) -> bool {
        self.delivered == 0 && self.failed > 0
    }
}

/// Sends news to every subscriber.
pub struct Notifier<D> {
    pub bot: D,
    pub subscribers: Vec<Recipient>,
    pub header: String,
}

impl<D: Deliver> Notifier<D> {
    /// Send `message` to all subscribers, with `attachment` as a document if
    /// given. A failing subscriber does not stop the others. The attachment
    /// is removed from disk before returning.
    pub async fn notify(
        &self,
        message: &NewsMessage,
        attachment: Option<DownloadedFile>,
    ) -> DeliveryReport {
        tracing::info!("sending \"{}\" to {} chats", message.title, self.subscribers.len());

        let mut report = DeliveryReport::default();
        for recipient in &self.subscribers {
            let result = match &attachment {
                Some(file) => {
                    self.bot
                        .deliver_document(
                            recipient.clone(),
                            file.path(),
                            message.text(CAPTION_LIMIT),
                        )
                        .await
                }
                None => {
                    self.bot
                        .deliver_text(recipient.clone(), message.text(TEXT_LIMIT))
                        .await
                }
            };

            match result {
                Ok(()) => report.delivered += 1,
                Err(error) => {
                    tracing::warn!("failed to send news to {recipient:?}: {error:?}");
                    report.failed += 1;
                }
            }
        }

        report
    }
}

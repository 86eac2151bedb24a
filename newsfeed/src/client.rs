//! Client module
//!
//! This module defines [`NewsSource`], the capabilities the update cycle
//! needs from the newsfeed server, and [`NewsClient`] which implements it
//! over HTTP.
//!
//! Every request carries the session cookie and user agent configured once
//! on the underlying [`reqwest::Client`], see [`crate::config::FetchConfig`].

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use reqwest::{Response, Url};
use tokio::io::AsyncWriteExt;

use crate::{
    resource::{Attachment, NewsDetailResponse, NewsId, NewsItem, NewsList},
    Error,
};

/// A server publishing news.
#[async_trait]
pub trait NewsSource
where
    Self: Sync + Send,
{
    /// Ids of every news on `page` of the listing.
    async fn list_news_ids(&self, page: u32) -> Result<HashSet<NewsId>, Error>;
    /// Full record of one news.
    async fn get_news_detail(&self, id: NewsId) -> Result<NewsItem, Error>;
    /// Download `attachment` of news `id` to `dest`, replacing any existing file.
    async fn download_attachment(
        &self,
        id: NewsId,
        attachment: &Attachment,
        dest: &Path,
    ) -> Result<PathBuf, Error>;
    /// Flag the news as read on the server.
    async fn mark_read(&self, id: NewsId) -> Result<(), Error>;
}

pub struct NewsClient {
    pub client: reqwest::Client,
    pub server: Url,
}

impl NewsClient {
    pub fn new(client: reqwest::Client, server: Url) -> Self {
        Self { client, server }
    }

    fn url(&self, href: &str) -> Result<Url, Error> {
        self.server.join(href).map_err(Error::from)
    }

    async fn get_raw(&self, href: &str) -> Result<Response, Error> {
        let url = self.url(href)?;
        tracing::debug!("GET {url}");
        let response = self.client.get(url).send().await?;
        response.error_for_status().map_err(Error::from)
    }

    fn list_href(page: u32) -> String {
        format!("newsfeeds/list?page={page}")
    }

    fn href(id: NewsId) -> String {
        format!("newsfeeds/{id}")
    }

    fn download_href(id: NewsId, guid: &str) -> String {
        format!("newsfeeds/download/{id}/{guid}")
    }

    fn update_href() -> &'static str {
        "newsfeeds/update"
    }

    pub async fn list(&self, page: u32) -> Result<NewsList, Error> {
        let href = Self::list_href(page);
        self.get_raw(&href)
            .await?
            .json::<NewsList>()
            .await
            .map_err(Error::from)
    }

    pub async fn get(&self, id: NewsId) -> Result<NewsItem, Error> {
        let href = Self::href(id);
        let response = self.get_raw(&href).await?.json::<NewsDetailResponse>().await?;
        Ok(response.data.into_item(id))
    }

    async fn write_response(mut response: Response, dest: &Path) -> Result<u64, Error> {
        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }
}

#[async_trait]
impl NewsSource for NewsClient {
    async fn list_news_ids(&self, page: u32) -> Result<HashSet<NewsId>, Error> {
        let list = self.list(page).await?;
        Ok(list.ids().collect())
    }

    async fn get_news_detail(&self, id: NewsId) -> Result<NewsItem, Error> {
        self.get(id).await
    }

    async fn download_attachment(
        &self,
        id: NewsId,
        attachment: &Attachment,
        dest: &Path,
    ) -> Result<PathBuf, Error> {
        let href = Self::download_href(id, &attachment.guid);
        let response = self.get_raw(&href).await?;

        match Self::write_response(response, dest).await {
            Ok(written) => {
                tracing::info!("downloaded {} ({written} bytes)", dest.display());
                Ok(dest.to_path_buf())
            }
            Err(error) => {
                let _ = tokio::fs::remove_file(dest).await;
                Err(error)
            }
        }
    }

    async fn mark_read(&self, id: NewsId) -> Result<(), Error> {
        let url = self.url(Self::update_href())?;
        let ack = self
            .client
            .post(url)
            .json(&serde_json::json!({ "id": id }))
            .send()
            .await?
            .error_for_status()?
            .json::<serde_json::Value>()
            .await?;
        tracing::debug!("marked news {id} as read: {ack}");
        Ok(())
    }
}

//! Configuration
//!
//! This module contains configuration for the newsfeed bot. Everything is
//! read once at startup from a yaml file and passed down explicitly.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use reqwest::{
    header::{self, HeaderMap, HeaderValue},
    Url,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use teloxide::types::Recipient;
use tracing::info;

use crate::{
    client::NewsClient,
    database::{SeenIdStore, HISTORY_LIMIT},
    message::Notifier,
    service::NewsfeedService,
    Error,
};

/// User agent sent to the newsfeed server unless configured otherwise.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) \
    Chrome/120.0.0.0 YaBrowser/24.1.0.0 Safari/537.36";

/// Header of every notification unless configured otherwise.
pub const DEFAULT_HEADER: &str = "❗️Обновление в МАЯК❗️";

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NewsfeedConfig {
    /// Telegram bot configuration
    pub telegram: TelegramConfig,
    /// Client configuration, such as proxy, timeout, etc.
    #[serde(default)]
    pub client: ClientConfig,
    /// Where and how often to fetch news
    pub fetch: FetchConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ClientConfig {
    proxy: Option<String>,
    no_proxy: Option<String>,
    /// Request timeout in seconds
    timeout: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TelegramConfig {
    pub token: String,
    /// Chats receiving news
    #[schemars(with = "Vec<RemoteRecipient>")]
    pub subscribers: Vec<Recipient>,
    /// Chats receiving error reports
    #[serde(default)]
    #[schemars(with = "Vec<RemoteRecipient>")]
    pub admins: Vec<Recipient>,
    /// First line of every notification
    pub header: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FetchConfig {
    /// Base url of the newsfeed api, like `https://ekis.moscow/lk/api/v1/`
    pub server: Url,
    /// Value of the `SessionId` cookie
    pub session_id: String,
    pub user_agent: Option<String>,
    /// Poll interval in seconds
    #[serde(default = "default_interval")]
    pub interval: u64,
    /// Listing page to poll
    #[serde(default = "default_page")]
    pub page: u32,
    /// Json file keeping the seen news ids
    pub state_file: PathBuf,
    /// How many seen ids to keep
    #[serde(default = "default_history")]
    pub history: usize,
    /// Where attachments are downloaded before sending, defaults to the temp dir
    pub download_dir: Option<PathBuf>,
}

/// A unique identifier for the target chat or username of the target channel
/// (in the format `@channelusername`).
#[derive(JsonSchema)]
#[schemars(untagged)]
pub enum RemoteRecipient {
    /// A chat identifier.
    #[schemars(with = "i64")]
    Id(teloxide::types::ChatId),

    /// A channel username (in the format @channelusername).
    ChannelUsername(String),
}

fn default_interval() -> u64 {
    30
}

fn default_page() -> u32 {
    1
}

fn default_history() -> usize {
    HISTORY_LIMIT
}

impl ClientConfig {
    const DEFAULT_TIMEOUT: u64 = 60;
    const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout.unwrap_or(Self::DEFAULT_TIMEOUT))
    }

    /// Apply proxy settings to `client`.
    pub fn proxied(
        &self,
        client: reqwest::ClientBuilder,
    ) -> Result<reqwest::ClientBuilder, crate::Error> {
        let Some(proxy) = self
            .proxy
            .clone()
            .or_else(|| std::env::var("ALL_PROXY").ok())
        else {
            return Ok(client);
        };

        let proxy = reqwest::Proxy::all(proxy)?;
        let proxy = match &self.no_proxy {
            Some(no_proxy) => proxy.no_proxy(reqwest::NoProxy::from_string(no_proxy)),
            None => proxy.no_proxy(reqwest::NoProxy::from_env()),
        };
        info!("Using proxy {:?}", proxy);
        Ok(client.proxy(proxy))
    }
}

impl FetchConfig {
    pub fn interval(&self) -> Result<Duration, Error> {
        match self.interval {
            0 => Err(Error::InvalidInterval),
            seconds => Ok(Duration::from_secs(seconds)),
        }
    }

    /// `server` with a trailing slash, so joining keeps its last segment.
    pub fn server(&self) -> Url {
        let mut server = self.server.clone();
        if !server.path().ends_with('/') {
            let path = format!("{}/", server.path());
            server.set_path(&path);
        }
        server
    }

    pub fn download_dir(&self) -> PathBuf {
        self.download_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub(crate) fn headers(&self) -> Result<HeaderMap, Error> {
        let mut cookie = HeaderValue::from_str(&format!("SessionId={}", self.session_id))?;
        cookie.set_sensitive(true);

        let user_agent = self.user_agent.as_deref().unwrap_or(BROWSER_USER_AGENT);

        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, cookie);
        headers.insert(header::USER_AGENT, HeaderValue::from_str(user_agent)?);
        Ok(headers)
    }

    pub fn build(&self, client: &ClientConfig) -> Result<NewsClient, Error> {
        let builder = reqwest::Client::builder()
            .default_headers(self.headers()?)
            .timeout(client.timeout())
            .connect_timeout(ClientConfig::CONNECT_TIMEOUT);
        let http = client.proxied(builder)?.build()?;

        Ok(NewsClient::new(http, self.server()))
    }

    pub fn store(&self) -> SeenIdStore {
        SeenIdStore::new(&self.state_file, self.history)
    }
}

impl TelegramConfig {
    pub fn header(&self) -> &str {
        self.header.as_deref().unwrap_or(DEFAULT_HEADER)
    }

    pub fn build(&self, client: &ClientConfig) -> Result<teloxide::Bot, crate::Error> {
        let http = client
            .proxied(teloxide::net::default_reqwest_settings())?
            .build()?;
        Ok(teloxide::Bot::with_client(self.token.to_owned(), http))
    }
}

impl NewsfeedConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let config = std::fs::File::open(path)?;
        let config = serde_yaml::from_reader(config)?;
        Ok(config)
    }

    pub fn build(&self) -> Result<NewsfeedService<NewsClient, teloxide::Bot>, crate::Error> {
        let client = self.fetch.build(&self.client)?;
        let bot = self.telegram.build(&self.client)?;

        Ok(NewsfeedService {
            client,
            store: self.fetch.store(),
            notifier: Notifier {
                bot,
                subscribers: self.telegram.subscribers.clone(),
                header: self.telegram.header().to_owned(),
            },
            download_dir: self.fetch.download_dir(),
            page: self.fetch.page,
        })
    }
}

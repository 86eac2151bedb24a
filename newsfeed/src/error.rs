use std::path::PathBuf;

use thiserror::Error;

use crate::resource::NewsId;

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to parse the url")]
    UrlParseError(#[from] url::ParseError),
    #[error("request not complete")]
    ReqwestError(#[from] reqwest::Error),
    #[error("invalid header value")]
    InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
    #[error("error when sending telegram message")]
    TeloxideRequestError(#[from] teloxide::RequestError),
    #[error("failed to parse json")]
    SerdeJsonError(#[from] serde_json::Error),
    #[error("scheduler error")]
    SchedulerError(#[from] tokio_cron_scheduler::JobSchedulerError),
    #[error("IO Error")]
    IOError(#[from] std::io::Error),
    #[error("serde_yaml Error")]
    SerdeYamlError(#[from] serde_yaml::Error),
    #[error("seen id file `{0}` is not a json array of ids")]
    CorruptedState(PathBuf, #[source] serde_json::Error),
    #[error("news {0} was not delivered to any subscriber")]
    Undelivered(NewsId),
    #[error("poll interval must be at least one second")]
    InvalidInterval,
}

pub type Result<T> = std::result::Result<T, Error>;

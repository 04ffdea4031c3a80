pub mod cli;
pub mod config;
pub mod error;
pub mod monitoring;
pub mod network;
pub mod news;
pub mod remote;
pub mod service;
pub mod storage;

pub use config::Config;
pub use error::{Error, Result};
pub use news::{Article, ArticleQuery, Interaction, InteractionType};
pub use service::{Fetched, NewsService, NewsServiceConfig, ServiceStatus, SyncOutcome, Tracked};

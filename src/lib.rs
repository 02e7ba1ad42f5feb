#![doc = include_str!("../README.md")]

/// Article rendering (headers, yEnc envelope, terminator)
pub mod article;
mod config;
mod connection;
mod error;
mod pool;
/// Work scheduler: source directories to article queue
pub mod scheduler;
/// yEnc content encoding for Usenet
pub mod yenc;

pub use article::{ArticleBuilder, ArticlePayload, BuiltArticle};
pub use config::{
    DEFAULT_ARTICLE_SIZE, DEFAULT_CONNECTIONS, DEFAULT_PRODUCT, PosterConfig, ServerConfig,
};
pub use connection::{Connection, ConnectionEvent, ConnectionState, Notifier, ReconnectPolicy};
pub use error::{PostError, Result};
pub use pool::{PostSummary, PostingPool};
pub use scheduler::{Article, FileInfo, SubjectTemplate, schedule};
pub use yenc::{ContentEncoder, YencEncoder};

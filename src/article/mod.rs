//! Article rendering for binary posts
//!
//! Turns one scheduled part into the exact bytes sent after `POST`: the
//! header block, the yEnc envelope around the encoded chunk, and the
//! terminating dot line.

mod builder;

pub use self::builder::{ArticleBuilder, BuiltArticle};

/// Rendered article handed to a connection, read cursor at the start
pub type ArticlePayload = std::io::Cursor<Vec<u8>>;

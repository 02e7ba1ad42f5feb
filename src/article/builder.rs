//! Article builder with lazily opened, sequentially read source files

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;

use super::ArticlePayload;
use crate::config::PosterConfig;
use crate::error::{PostError, Result};
use crate::scheduler::{Article, FileInfo};
use crate::yenc::{ContentEncoder, YencEncoder};

/// A rendered article plus the byte window it covers
#[derive(Debug)]
pub struct BuiltArticle {
    /// Complete article text, cursor at position 0
    pub payload: ArticlePayload,
    /// Offset of the first content byte in the source file
    pub begin: u64,
    /// Offset one past the last content byte
    pub end: u64,
    /// CRC32 of the raw chunk
    pub crc32: u32,
}

impl BuiltArticle {
    /// Raw content bytes consumed from the source file
    pub fn content_len(&self) -> u64 {
        self.end - self.begin
    }

    /// Bytes that will go over the wire
    pub fn wire_len(&self) -> u64 {
        self.payload.get_ref().len() as u64
    }
}

/// Renders scheduled articles into postable buffers
///
/// Keeps at most one open handle per source file. The handle is opened on
/// the first part built for that file and closed as soon as the last part is
/// built, so parts of one file must be built in ascending order.
///
/// # Example
///
/// ```no_run
/// use nntp_poster::{ArticleBuilder, PosterConfig, ServerConfig, schedule};
///
/// # fn example() -> nntp_poster::Result<()> {
/// let config = PosterConfig::new(
///     ServerConfig::tls("news.example.com", "user", "pass"),
///     "alt.binaries.test",
///     "poster@example.com",
/// );
/// let mut builder = ArticleBuilder::new(&config);
///
/// for article in schedule(&["/data/upload"], config.article_size)? {
///     let built = builder.build(&article)?;
///     println!("{}: {} bytes", article.subject(), built.wire_len());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ArticleBuilder<E = YencEncoder> {
    from: String,
    newsgroup: String,
    product: String,
    article_size: u64,
    encoder: E,
    open_files: HashMap<PathBuf, File>,
}

impl ArticleBuilder<YencEncoder> {
    /// Create a builder using the default yEnc encoder
    pub fn new(config: &PosterConfig) -> Self {
        Self::with_encoder(config, YencEncoder::default())
    }
}

impl<E: ContentEncoder> ArticleBuilder<E> {
    /// Create a builder with a custom content encoder
    pub fn with_encoder(config: &PosterConfig, encoder: E) -> Self {
        Self {
            from: config.from.clone(),
            newsgroup: config.newsgroup.clone(),
            product: config.product.clone(),
            article_size: config.article_size,
            encoder,
            open_files: HashMap::new(),
        }
    }

    /// Build an article dated now
    ///
    /// # Errors
    ///
    /// - [`PostError::FileRead`] if the source can't be opened or read
    /// - [`PostError::SourceChanged`] if the read returned an unexpected size
    /// - [`PostError::PartOutOfOrder`] if parts of a file are built out of order
    pub fn build(&mut self, article: &Article) -> Result<BuiltArticle> {
        self.build_at(article, Utc::now())
    }

    /// Build an article with an explicit `Date` header
    ///
    /// Output is byte-identical for identical file contents, metadata and date.
    pub fn build_at(&mut self, article: &Article, date: DateTime<Utc>) -> Result<BuiltArticle> {
        let file = &article.file;
        let (begin, data) = self.read_chunk(file, article.part)?;
        let end = begin + data.len() as u64;
        let crc32 = crc32fast::hash(&data);

        let mut out = Vec::with_capacity(data.len() + data.len() / 32 + 1024);

        // Headers
        out.extend_from_slice(format!("From: {}\r\n", self.from).as_bytes());
        out.extend_from_slice(format!("Newsgroups: {}\r\n", self.newsgroup).as_bytes());
        out.extend_from_slice(
            format!("Date: {}\r\n", date.format("%a, %d %b %Y %H:%M:%S UTC")).as_bytes(),
        );
        out.extend_from_slice(format!("Subject: {}\r\n", article.subject()).as_bytes());
        out.extend_from_slice(format!("X-Newsposter: {}\r\n", self.product).as_bytes());
        out.extend_from_slice(b"\r\n");

        // yEnc envelope
        out.extend_from_slice(
            format!(
                "=ybegin part={} total={} line={} size={} name={}\r\n",
                article.part,
                file.parts,
                self.encoder.line_length(),
                file.size,
                file.filename
            )
            .as_bytes(),
        );
        out.extend_from_slice(format!("=ypart begin={} end={}\r\n", begin, end).as_bytes());
        self.encoder.encode(&data, &mut out);
        out.extend_from_slice(
            format!(
                "=yend size={} part={} pcrc32={:08x}\r\n",
                data.len(),
                article.part,
                crc32
            )
            .as_bytes(),
        );

        // End of article
        out.extend_from_slice(b".\r\n");

        debug!(
            "Built part {}/{} of {} (bytes {}-{}, {} on the wire)",
            article.part,
            file.parts,
            file.filename,
            begin,
            end,
            out.len()
        );

        Ok(BuiltArticle {
            payload: ArticlePayload::new(out),
            begin,
            end,
            crc32,
        })
    }

    /// Number of source files currently held open
    pub fn open_files(&self) -> usize {
        self.open_files.len()
    }

    /// Whether a handle for `path` is currently open
    pub fn is_open(&self, path: &Path) -> bool {
        self.open_files.contains_key(path)
    }

    /// Read the next chunk of `file`, returning its start offset and bytes
    fn read_chunk(&mut self, file: &FileInfo, part: u64) -> Result<(u64, Vec<u8>)> {
        let read_error = |source: std::io::Error| PostError::FileRead {
            path: file.path.clone(),
            source,
        };

        let handle = match self.open_files.entry(file.path.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                debug!("Opening {}", file.path.display());
                entry.insert(File::open(&file.path).map_err(read_error)?)
            }
        };

        let begin = handle.stream_position().map_err(read_error)?;
        let expected_begin = part.saturating_sub(1).saturating_mul(self.article_size);
        if begin != expected_begin {
            return Err(PostError::PartOutOfOrder {
                path: file.path.clone(),
                part,
                offset: begin,
            });
        }

        let expected = self.article_size.min(file.size.saturating_sub(begin));
        let mut data = Vec::with_capacity(expected as usize);
        // Read one byte past the window so a grown final part is noticed
        let limit = if part == file.parts {
            expected + 1
        } else {
            expected
        };
        handle
            .by_ref()
            .take(limit)
            .read_to_end(&mut data)
            .map_err(read_error)?;

        if data.len() as u64 != expected {
            return Err(PostError::SourceChanged {
                path: file.path.clone(),
                expected,
                actual: data.len() as u64,
            });
        }

        if part == file.parts {
            self.open_files.remove(&file.path);
            debug!("Closed {}", file.path.display());
        }

        Ok((begin, data))
    }
}

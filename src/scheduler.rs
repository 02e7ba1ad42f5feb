//! Work scheduler: turns source directories into the article queue
//!
//! Every regular, non-empty file directly inside each directory becomes
//! `ceil(size / article_size)` articles. Directories are processed in the
//! order given, files in ascending name order, and all parts of one file are
//! queued (in ascending part order) before the next file starts.

use crate::error::{PostError, Result};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// One source file scheduled for posting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Bare file name (used in the subject and `=ybegin name=`)
    pub filename: String,
    /// Absolute path to the file
    pub path: PathBuf,
    /// Total size in bytes (always > 0)
    pub size: u64,
    /// Number of articles the file is split into
    pub parts: u64,
}

/// Subject line with an open slot for the part number
///
/// Renders as `<dir> [<NNN>/<count>] - "<filename>" yEnc (<part>/<parts>)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectTemplate {
    head: String,
    tail: String,
}

impl SubjectTemplate {
    fn new(dirname: &str, index: usize, file_count: usize, filename: &str, parts: u64) -> Self {
        let width = file_count.to_string().len();
        Self {
            head: format!(
                "{} [{:0width$}/{}] - \"{}\" yEnc (",
                dirname,
                index,
                file_count,
                filename,
                width = width
            ),
            tail: format!("/{})", parts),
        }
    }

    /// Subject for one part
    pub fn render(&self, part: u64) -> String {
        format!("{}{}{}", self.head, part, self.tail)
    }
}

/// One postable unit: a single part of a single file
#[derive(Debug, Clone)]
pub struct Article {
    /// File this part belongs to
    pub file: Arc<FileInfo>,
    /// Subject shared by all parts of the file
    pub subject: Arc<SubjectTemplate>,
    /// 1-based part number in `1..=file.parts`
    pub part: u64,
}

impl Article {
    /// Rendered subject for this part
    pub fn subject(&self) -> String {
        self.subject.render(self.part)
    }

    /// Whether this is the final part of its file
    pub fn is_last_part(&self) -> bool {
        self.part == self.file.parts
    }
}

/// Build the article queue for `dirs`
///
/// Trailing path separators are ignored and empty entries skipped. Only the
/// immediate files of each directory are considered; subdirectories and
/// empty files are skipped.
///
/// # Errors
///
/// - [`PostError::Config`] if `article_size` is zero
/// - [`PostError::Directory`] if a directory is missing or cannot be listed
/// - [`PostError::Io`] if an absolute path cannot be resolved
pub fn schedule<P: AsRef<Path>>(dirs: &[P], article_size: u64) -> Result<VecDeque<Article>> {
    if article_size == 0 {
        return Err(PostError::Config(
            "Article size must be greater than zero".to_string(),
        ));
    }

    let mut queue = VecDeque::new();

    for dir in dirs {
        // Collecting components drops trailing separators
        let dir: PathBuf = dir.as_ref().components().collect();
        if dir.as_os_str().is_empty() {
            continue;
        }

        let files = list_files(&dir)?;
        let dirname = dir.display().to_string();
        let before = queue.len();

        for (index, (filename, path, size)) in files.iter().enumerate() {
            let parts = size.div_ceil(article_size);
            let file = Arc::new(FileInfo {
                filename: filename.clone(),
                path: std::path::absolute(path)?,
                size: *size,
                parts,
            });
            let subject = Arc::new(SubjectTemplate::new(
                &dirname,
                index + 1,
                files.len(),
                filename,
                parts,
            ));

            debug!("Scheduling {} ({} bytes, {} parts)", filename, size, parts);
            queue.extend((1..=parts).map(|part| Article {
                file: Arc::clone(&file),
                subject: Arc::clone(&subject),
                part,
            }));
        }

        info!(
            "Scheduled {} files ({} articles) from {}",
            files.len(),
            queue.len() - before,
            dirname
        );
    }

    Ok(queue)
}

/// Regular, non-empty files directly inside `dir`, sorted by name
fn list_files(dir: &Path) -> Result<Vec<(String, PathBuf, u64)>> {
    let directory_error = |source: std::io::Error| PostError::Directory {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(directory_error)? {
        let entry = entry.map_err(directory_error)?;
        let path = entry.path();

        // Follows symlinks; dangling links are skipped like any other non-file
        let Ok(metadata) = fs::metadata(&path) else {
            debug!("Skipping unreadable entry {}", path.display());
            continue;
        };
        if !metadata.is_file() || metadata.len() == 0 {
            continue;
        }

        let filename = entry.file_name().to_string_lossy().into_owned();
        files.push((filename, path, metadata.len()));
    }

    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

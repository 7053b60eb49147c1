//! Output sinks for flushed log blocks.
//!
//! A flush writes one rendered block to an [`OutputSink`] (normally the
//! process stdout) and, when attachments are enabled, hands one
//! [`Attachment`] to an [`AttachmentSink`] (normally the test report).
//! Sink errors are the only errors a flush ever surfaces.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;

use crate::error::{SmartLogError, SmartLogResult};
use crate::format::Palette;

/// Name tag of every attachment produced by a flush.
pub const ATTACHMENT_NAME: &str = "smart-log";
/// Content type of every attachment produced by a flush.
pub const ATTACHMENT_CONTENT_TYPE: &str = "text/plain";

/// A named document handed to the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub content_type: String,
    pub body: Bytes,
}

impl Attachment {
    /// A `smart-log` text attachment with a UTF-8 body.
    pub fn smart_log(document: String) -> Self {
        Self {
            name: ATTACHMENT_NAME.to_string(),
            content_type: ATTACHMENT_CONTENT_TYPE.to_string(),
            body: Bytes::from(document),
        }
    }

    /// Body decoded as UTF-8 (lossy).
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Destination for rendered console blocks.
#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Colour mode the block should be rendered with.
    fn palette(&self) -> Palette {
        Palette::Plain
    }

    async fn write_block(&self, block: &str) -> SmartLogResult<()>;
}

/// Destination for report attachments.
#[async_trait]
pub trait AttachmentSink: Send + Sync {
    async fn attach(&self, attachment: Attachment) -> SmartLogResult<()>;
}

/// Writes blocks to the process stdout.
#[derive(Debug, Clone)]
pub struct StdoutSink {
    color: bool,
}

impl StdoutSink {
    pub fn new(color: bool) -> Self {
        Self { color }
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl OutputSink for StdoutSink {
    fn palette(&self) -> Palette {
        if self.color {
            Palette::Ansi
        } else {
            Palette::Plain
        }
    }

    async fn write_block(&self, block: &str) -> SmartLogResult<()> {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(block.as_bytes()).await?;
        stdout.flush().await?;
        Ok(())
    }
}

/// Collects blocks in memory. Cloning shares the collected output.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    blocks: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blocks(&self) -> Vec<String> {
        self.blocks.lock().clone()
    }

    /// Everything written so far, concatenated.
    pub fn output(&self) -> String {
        self.blocks.lock().concat()
    }
}

#[async_trait]
impl OutputSink for MemorySink {
    async fn write_block(&self, block: &str) -> SmartLogResult<()> {
        self.blocks.lock().push(block.to_string());
        Ok(())
    }
}

/// Collects attachments in memory, like a report's attachment list.
#[derive(Debug, Clone, Default)]
pub struct MemoryAttachments {
    attachments: Arc<Mutex<Vec<Attachment>>>,
}

impl MemoryAttachments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attachments(&self) -> Vec<Attachment> {
        self.attachments.lock().clone()
    }

    /// First attachment with the given name.
    pub fn find(&self, name: &str) -> Option<Attachment> {
        self.attachments.lock().iter().find(|a| a.name == name).cloned()
    }
}

#[async_trait]
impl AttachmentSink for MemoryAttachments {
    async fn attach(&self, attachment: Attachment) -> SmartLogResult<()> {
        self.attachments.lock().push(attachment);
        Ok(())
    }
}

/// Stores each attachment as a file in a directory:
/// `<dir>/<prefix>-smart-log-<n>.txt`, numbered from 1.
///
/// Existing files are never overwritten; numbering skips past any name
/// already taken, so repeated runs with the same title accumulate.
#[derive(Debug)]
pub struct DirectoryAttachments {
    dir: PathBuf,
    prefix: String,
    counter: AtomicUsize,
}

impl DirectoryAttachments {
    pub fn new(dir: impl Into<PathBuf>, prefix: &str) -> Self {
        Self {
            dir: dir.into(),
            prefix: slugify(prefix),
            counter: AtomicUsize::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl AttachmentSink for DirectoryAttachments {
    async fn attach(&self, attachment: Attachment) -> SmartLogResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let extension = if attachment.content_type == ATTACHMENT_CONTENT_TYPE {
            "txt"
        } else {
            "bin"
        };

        loop {
            let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
            let path = self
                .dir
                .join(format!("{}-{}-{}.{}", self.prefix, attachment.name, n, extension));
            let mut file = match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            };
            file.write_all(&attachment.body).await?;
            file.flush().await?;
            tracing::debug!(path = %path.display(), "Wrote smart log attachment");
            return Ok(());
        }
    }
}

/// Always fails; stands in for a report that rejects attachments.
#[derive(Debug, Clone, Default)]
pub struct RejectingSink;

#[async_trait]
impl AttachmentSink for RejectingSink {
    async fn attach(&self, attachment: Attachment) -> SmartLogResult<()> {
        Err(SmartLogError::Sink(format!(
            "attachment {:?} rejected",
            attachment.name
        )))
    }
}

/// Lowercase, ASCII-alphanumeric file name fragment.
pub(crate) fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut dash = false;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            dash = false;
        } else if !dash && !slug.is_empty() {
            slug.push('-');
            dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        "run".to_string()
    } else {
        slug
    }
}

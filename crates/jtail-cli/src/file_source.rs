//! Live source that tails a JSON-lines journal file.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader, SeekFrom};
use tracing::debug;

use jtail_follower::{EventStream, LiveEventSource, SourceError};
use jtail_journal::{EventRecord, JournalEvent};

/// Tails a file of [`EventRecord`] lines.
///
/// The stream never ends on its own: at end of file it waits
/// `poll_interval` and reads again. Only complete (newline-terminated)
/// lines are consumed. The read offset is shared by every subscription,
/// so a resubscription after a failure resumes after the last delivered
/// line.
#[derive(Clone, Debug)]
pub struct FileEventSource {
    path: PathBuf,
    offset: Arc<AtomicU64>,
    poll_interval: Duration,
}

impl FileEventSource {
    pub fn new(path: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        Self {
            path: path.into(),
            offset: Arc::new(AtomicU64::new(0)),
            poll_interval,
        }
    }

    /// Byte offset just past the last delivered line.
    pub fn offset(&self) -> u64 {
        self.offset.load(Ordering::SeqCst)
    }
}

struct Tail {
    reader: BufReader<File>,
    offset: Arc<AtomicU64>,
    poll_interval: Duration,
    partial: String,
}

impl Tail {
    async fn next_event(&mut self) -> Result<JournalEvent, SourceError> {
        loop {
            let read = self.reader.read_line(&mut self.partial).await?;
            if read == 0 {
                tokio::time::sleep(self.poll_interval).await;
                continue;
            }
            if !self.partial.ends_with('\n') {
                // A writer is mid-line; wait for the rest.
                continue;
            }

            let line = std::mem::take(&mut self.partial);
            let consumed = line.len() as u64;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                self.offset.fetch_add(consumed, Ordering::SeqCst);
                continue;
            }
            let event = EventRecord::decode_json(trimmed)?;
            self.offset.fetch_add(consumed, Ordering::SeqCst);
            return Ok(event);
        }
    }
}

#[async_trait]
impl LiveEventSource for FileEventSource {
    async fn subscribe(&self) -> Result<EventStream, SourceError> {
        let mut file = File::open(&self.path).await?;
        let offset = self.offset();
        file.seek(SeekFrom::Start(offset)).await?;
        debug!(path = %self.path.display(), offset, "tailing event file");

        let tail = Tail {
            reader: BufReader::new(file),
            offset: Arc::clone(&self.offset),
            poll_interval: self.poll_interval,
            partial: String::new(),
        };
        let stream = stream::unfold(Some(tail), |tail| async move {
            let mut tail = tail?;
            match tail.next_event().await {
                Ok(event) => Some((Ok(event), Some(tail))),
                // The subscription is spent after an error; the follower
                // resubscribes from the shared offset.
                Err(e) => Some((Err(e), None)),
            }
        });
        Ok(stream.boxed())
    }
}

//! Disk spill for downloaded streams
//!
//! A `Spill` takes an HTTP body of known length on a download thread and
//! writes it to an anonymous temporary file. `SpillReader`s read it back
//! through their own file handle; reads past the downloaded prefix wait for
//! the download to catch up. The decoder can therefore start, and seek
//! anywhere, before the body is complete, and memory use does not grow with
//! the length of the track.

use crate::error::{Error, Result};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;
use symphonia::core::io::MediaSource;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Bytes copied from the body per read
const COPY_CHUNK: usize = 64 * 1024;

/// How often a waiting reader rechecks the cancel flag
const WAIT_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Default)]
struct Progress {
    downloaded: u64,
    done: bool,
    error: Option<String>,
}

/// A body being downloaded to disk
pub struct Spill {
    file: NamedTempFile,
    length: u64,
    progress: Mutex<Progress>,
    advanced: Condvar,
    cancel: Arc<AtomicBool>,
}

impl Spill {
    /// Empty spill for a body of `length` bytes
    pub fn new(length: u64, cancel: Arc<AtomicBool>) -> Result<Arc<Self>> {
        let file = NamedTempFile::new()
            .map_err(|e| Error::Playback(format!("Failed to create spill file: {}", e)))?;
        debug!("Spilling {} bytes to {}", length, file.path().display());

        Ok(Arc::new(Self {
            file,
            length,
            progress: Mutex::new(Progress::default()),
            advanced: Condvar::new(),
            cancel,
        }))
    }

    /// Declared body length
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Bytes written so far
    pub fn downloaded(&self) -> u64 {
        self.progress().downloaded
    }

    /// Copy `body` into the file until it ends, fails or is cancelled
    pub fn fill<R: Read>(&self, mut body: R) -> Result<()> {
        let mut writer = self
            .file
            .reopen()
            .map_err(|e| self.fail(format!("Failed to open spill file: {}", e)))?;
        let mut buf = vec![0u8; COPY_CHUNK];

        loop {
            if self.cancelled() {
                self.finish(None);
                return Ok(());
            }
            let n = match body.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.fail(format!("Failed to read stream: {}", e))),
            };
            writer
                .write_all(&buf[..n])
                .map_err(|e| self.fail(format!("Failed to write spill file: {}", e)))?;

            self.progress().downloaded += n as u64;
            self.advanced.notify_all();
        }

        let downloaded = self.downloaded();
        if downloaded < self.length {
            warn!("Stream ended after {} of {} bytes", downloaded, self.length);
        }
        self.finish(None);
        Ok(())
    }

    /// Independent reader positioned at the start
    pub fn reader(self: &Arc<Self>) -> Result<SpillReader> {
        let file = self
            .file
            .reopen()
            .map_err(|e| Error::Playback(format!("Failed to open spill file: {}", e)))?;
        Ok(SpillReader {
            file,
            spill: Arc::clone(self),
            pos: 0,
        })
    }

    fn progress(&self) -> MutexGuard<'_, Progress> {
        self.progress.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    fn finish(&self, error: Option<String>) {
        let mut progress = self.progress();
        progress.done = true;
        if progress.error.is_none() {
            progress.error = error;
        }
        drop(progress);
        self.advanced.notify_all();
    }

    fn fail(&self, message: String) -> Error {
        self.finish(Some(message.clone()));
        Error::Http(message)
    }

    /// Block until byte `pos` is on disk or the download is over
    ///
    /// Returns the downloaded length at that point.
    fn wait_for(&self, pos: u64) -> io::Result<u64> {
        let mut progress = self.progress();
        loop {
            if progress.downloaded > pos {
                return Ok(progress.downloaded);
            }
            if progress.done {
                return match &progress.error {
                    Some(message) => Err(io::Error::new(io::ErrorKind::Other, message.clone())),
                    None => Ok(progress.downloaded),
                };
            }
            if self.cancelled() {
                return Err(io::Error::new(io::ErrorKind::Other, "download cancelled"));
            }
            progress = self
                .advanced
                .wait_timeout(progress, WAIT_POLL)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
    }
}

/// Seekable read handle over a `Spill`
pub struct SpillReader {
    file: File,
    spill: Arc<Spill>,
    pos: u64,
}

impl Read for SpillReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let available = self.spill.wait_for(self.pos)?;
        if available <= self.pos {
            return Ok(0);
        }
        let max = usize::try_from(available - self.pos)
            .unwrap_or(usize::MAX)
            .min(buf.len());
        let n = self.file.read(&mut buf[..max])?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for SpillReader {
    fn seek(&mut self, target: SeekFrom) -> io::Result<u64> {
        let pos = match target {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.spill.length.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        }
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "seek before start of stream"))?;

        self.pos = self.file.seek(SeekFrom::Start(pos))?;
        Ok(self.pos)
    }
}

impl MediaSource for SpillReader {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        Some(self.spill.length)
    }
}

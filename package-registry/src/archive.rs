//! # Archive Streamer
//!
//! Builds a gzip-compressed tar of one package directory and streams it as it
//! is produced. Nothing is buffered beyond one output chunk.
//!
//! Members follow the sorted walk order, so an unchanged directory always
//! yields the same archive. Directory members carry a trailing `/`, file
//! members are followed by their content copied straight from disk.
//!
//! The walk is blocking and runs on tokio's blocking pool. Its output travels
//! over a bounded channel into the response body. When the client goes away the
//! receiver is dropped, the next write fails with `BrokenPipe` and the walk stops.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use axum::body::Body;
use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Builder, EntryType, Header, HeaderMode};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::walk::{walk_sorted, WalkEntry};

/// Size of the chunks handed to the response body.
const CHUNK_SIZE: usize = 64 * 1024;

/// Chunks in flight between the walk and the response body.
const CHANNEL_CAPACITY: usize = 8;

/// Width of the name field in a tar header.
const NAME_FIELD_LEN: usize = 100;

const GNU_LONG_LINK: &[u8] = b"././@LongLink";

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("failed to walk package directory '{path}': {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to archive '{name}': {source}")]
    Entry {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to finish {stage} stream: {source}")]
    Finish {
        stage: &'static str,
        #[source]
        source: io::Error,
    },
}

impl ArchiveError {
    fn io_error(&self) -> &io::Error {
        match self {
            ArchiveError::Walk { source, .. }
            | ArchiveError::Entry { source, .. }
            | ArchiveError::Finish { source, .. } => source,
        }
    }

    /// The reader of the archive went away.
    pub fn is_disconnect(&self) -> bool {
        self.io_error().kind() == io::ErrorKind::BrokenPipe
    }
}

/// Write `package_dir` as a `.tar.gz` to `out`, returning the number of members.
///
/// The tar writer is finished before the gzip writer on every path, so whatever
/// was written is terminated properly even when the walk fails part way.
pub fn write_package_archive<W: Write>(package_dir: &Path, out: W) -> Result<usize, ArchiveError> {
    let mut builder = Builder::new(GzEncoder::new(out, Compression::default()));
    let appended = append_tree(&mut builder, package_dir);
    let closed = close(builder);

    match (appended, closed) {
        (Ok(entries), Ok(())) => Ok(entries),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), closed) => {
            if let Err(close_err) = closed {
                warn!(error = %close_err, "Closing archive after failed walk also failed");
            }
            Err(e)
        }
    }
}

fn append_tree<W: Write>(builder: &mut Builder<W>, package_dir: &Path) -> Result<usize, ArchiveError> {
    let mut entries = 0;
    for entry in walk_sorted(package_dir) {
        let entry = entry.map_err(|source| ArchiveError::Walk {
            path: package_dir.to_path_buf(),
            source,
        })?;

        if !entry.is_dir && !entry.is_file() {
            debug!(path = %entry.path.display(), "Skipping special file");
            continue;
        }

        append_entry(builder, &entry).map_err(|source| ArchiveError::Entry {
            name: entry.relative_path.clone(),
            source,
        })?;
        entries += 1;
    }
    Ok(entries)
}

fn append_entry<W: Write>(builder: &mut Builder<W>, entry: &WalkEntry) -> io::Result<()> {
    let mut header = Header::new_gnu();
    header.set_metadata_in_mode(&entry.metadata, HeaderMode::Complete);

    if entry.is_dir {
        let name = format!("{}/", entry.relative_path);
        set_entry_name(builder, &mut header, name.as_bytes())?;
        header.set_entry_type(EntryType::Directory);
        header.set_size(0);
        header.set_cksum();
        builder.append(&header, io::empty())
    } else {
        set_entry_name(builder, &mut header, entry.relative_path.as_bytes())?;
        header.set_cksum();
        let file = File::open(&entry.path)?;
        builder.append(&header, ExactLen::new(file, entry.metadata.len()))
    }
}

/// Reads exactly `len` bytes from a file whose size was recorded in the header.
///
/// A file that shrank since the walk fails with `UnexpectedEof` instead of
/// leaving a short member behind. Growth past `len` is cut off.
struct ExactLen<R> {
    inner: io::Take<R>,
    remaining: u64,
}

impl<R: Read> ExactLen<R> {
    fn new(inner: R, len: u64) -> Self {
        Self {
            inner: inner.take(len),
            remaining: len,
        }
    }
}

impl<R: Read> Read for ExactLen<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 && self.remaining > 0 && !buf.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("file ended {} bytes short of its recorded size", self.remaining),
            ));
        }
        self.remaining -= n as u64;
        Ok(n)
    }
}

/// Store `name` verbatim in the header, preceded by a GNU long-name member when
/// it does not fit the 100 byte field.
fn set_entry_name<W: Write>(
    builder: &mut Builder<W>,
    header: &mut Header,
    name: &[u8],
) -> io::Result<()> {
    if name.len() > NAME_FIELD_LEN {
        append_long_name(builder, name)?;
    }
    let len = name.len().min(NAME_FIELD_LEN);
    header.as_old_mut().name[..len].copy_from_slice(&name[..len]);
    Ok(())
}

fn append_long_name<W: Write>(builder: &mut Builder<W>, name: &[u8]) -> io::Result<()> {
    let mut header = Header::new_gnu();
    header.as_old_mut().name[..GNU_LONG_LINK.len()].copy_from_slice(GNU_LONG_LINK);
    header.set_mode(0o644);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(0);
    header.set_size(name.len() as u64 + 1);
    header.set_entry_type(EntryType::GNULongName);
    header.set_cksum();
    builder.append(&header, name.chain(&[0u8][..]))
}

fn close<W: Write>(builder: Builder<GzEncoder<W>>) -> Result<(), ArchiveError> {
    let gz = builder
        .into_inner()
        .map_err(|source| ArchiveError::Finish { stage: "tar", source })?;
    let mut out = gz
        .finish()
        .map_err(|source| ArchiveError::Finish { stage: "gzip", source })?;
    out.flush()
        .map_err(|source| ArchiveError::Finish { stage: "output", source })
}

/// Blocking [`Write`] adapter feeding a response body channel in fixed chunks.
struct ChannelWriter {
    tx: mpsc::Sender<io::Result<Bytes>>,
    buf: Vec<u8>,
}

impl ChannelWriter {
    fn new(tx: mpsc::Sender<io::Result<Bytes>>) -> Self {
        Self {
            tx,
            buf: Vec::with_capacity(CHUNK_SIZE),
        }
    }

    fn send(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = std::mem::replace(&mut self.buf, Vec::with_capacity(CHUNK_SIZE));
        self.tx
            .blocking_send(Ok(Bytes::from(chunk)))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "archive reader went away"))
    }

    /// End the body with an error so the transfer is seen as incomplete.
    fn abort(self, err: &ArchiveError) {
        let _ = self
            .tx
            .blocking_send(Err(io::Error::other(err.to_string())));
    }
}

impl Write for ChannelWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        if self.buf.len() >= CHUNK_SIZE {
            self.send()?;
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send()
    }
}

/// Stream the archive of `package_dir` as a response body.
///
/// The caller must have checked that the directory exists. Failures after this
/// point cannot change the response status; they are logged and the body ends
/// early.
pub fn archive_body(package_dir: PathBuf) -> Body {
    stream_archive(package_dir, |dir, writer| write_package_archive(dir, writer))
}

/// Run `produce` on the blocking pool and stream what it writes.
fn stream_archive<F>(package_dir: PathBuf, produce: F) -> Body
where
    F: FnOnce(&Path, &mut ChannelWriter) -> Result<usize, ArchiveError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

    tokio::task::spawn_blocking(move || {
        let started = Instant::now();
        let mut writer = ChannelWriter::new(tx);
        match produce(&package_dir, &mut writer) {
            Ok(entries) => debug!(
                path = %package_dir.display(),
                entries,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Streamed package archive"
            ),
            Err(e) if e.is_disconnect() => info!(
                path = %package_dir.display(),
                "Client disconnected during archive download"
            ),
            Err(e) => {
                error!(
                    path = %package_dir.display(),
                    error = %e,
                    "Archive streaming failed, truncating response"
                );
                writer.abort(&e);
            }
        }
    });

    Body::from_stream(futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (chunk, rx))
    }))
}

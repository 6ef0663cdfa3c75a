//! Upload bodies and stream-size probing.
//!
//! Object stores generally want a declared content length before an upload
//! starts. [`probe_size`] measures any [`DataSource`] and only pays for
//! buffering when the source cannot seek.

use bytes::Bytes;
use std::io::{Cursor, SeekFrom};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, ReadBuf};
use tracing::debug;

use objstore_common::{Error, Result};

/// Readers that can also seek to an absolute position.
pub trait SeekableReader: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T: AsyncRead + AsyncSeek + Send + Unpin> SeekableReader for T {}

/// Byte source for an upload.
pub enum DataSource {
    /// Source that can report its own length by seeking.
    Seekable(Box<dyn SeekableReader>),
    /// Forward-only source (network bodies, pipes).
    Sequential(Box<dyn AsyncRead + Send + Unpin>),
}

impl DataSource {
    /// Wrap a seekable reader.
    pub fn seekable(reader: impl SeekableReader + 'static) -> Self {
        Self::Seekable(Box::new(reader))
    }

    /// Wrap a forward-only reader.
    pub fn sequential(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self::Sequential(Box::new(reader))
    }

    /// Whether the source can be measured without buffering.
    pub fn is_seekable(&self) -> bool {
        matches!(self, Self::Seekable(_))
    }

    /// Read the remaining content into memory.
    ///
    /// `size_hint` pre-sizes the buffer, typically the value returned by
    /// [`probe_size`].
    pub async fn into_bytes(mut self, size_hint: u64) -> Result<Bytes> {
        let mut buf = Vec::with_capacity(usize::try_from(size_hint).unwrap_or(0));
        self.read_to_end(&mut buf).await?;
        Ok(Bytes::from(buf))
    }
}

impl AsyncRead for DataSource {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Self::Seekable(reader) => Pin::new(reader.as_mut()).poll_read(cx, buf),
            Self::Sequential(reader) => Pin::new(reader.as_mut()).poll_read(cx, buf),
        }
    }
}

impl std::fmt::Debug for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Seekable(_) => f.write_str("DataSource::Seekable"),
            Self::Sequential(_) => f.write_str("DataSource::Sequential"),
        }
    }
}

impl From<Vec<u8>> for DataSource {
    fn from(data: Vec<u8>) -> Self {
        Self::seekable(Cursor::new(data))
    }
}

impl From<Bytes> for DataSource {
    fn from(data: Bytes) -> Self {
        Self::seekable(Cursor::new(data))
    }
}

impl From<String> for DataSource {
    fn from(data: String) -> Self {
        Self::from(data.into_bytes())
    }
}

impl From<&'static str> for DataSource {
    fn from(data: &'static str) -> Self {
        Self::seekable(Cursor::new(data.as_bytes()))
    }
}

impl From<&'static [u8]> for DataSource {
    fn from(data: &'static [u8]) -> Self {
        Self::seekable(Cursor::new(data))
    }
}

impl From<tokio::fs::File> for DataSource {
    fn from(file: tokio::fs::File) -> Self {
        Self::seekable(file)
    }
}

/// Determine how many bytes remain in `source`.
///
/// Seekable sources are measured from their current position to the end and
/// then returned to that position, so a read after probing continues exactly
/// where it would have without it. Forward-only sources are drained into
/// memory and replaced by a seekable view over the buffer.
///
/// # Errors
/// - `InvalidFile` if a seekable source fails to seek
/// - `Io` (verbatim) if draining a forward-only source fails
pub async fn probe_size(source: DataSource) -> Result<(DataSource, u64)> {
    match source {
        DataSource::Seekable(mut reader) => {
            let current = reader
                .stream_position()
                .await
                .map_err(|e| Error::InvalidFile(format!("cannot read position: {}", e)))?;
            let end = reader
                .seek(SeekFrom::End(0))
                .await
                .map_err(|e| Error::InvalidFile(format!("cannot seek to end: {}", e)))?;
            reader
                .seek(SeekFrom::Start(current))
                .await
                .map_err(|e| Error::InvalidFile(format!("cannot restore position: {}", e)))?;

            Ok((DataSource::Seekable(reader), end.saturating_sub(current)))
        }
        DataSource::Sequential(mut reader) => {
            let mut buf = Vec::new();
            let read = reader.read_to_end(&mut buf).await?;
            debug!(size = read, "Buffered forward-only upload body");
            Ok((DataSource::from(buf), read as u64))
        }
    }
}

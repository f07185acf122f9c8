// src/engine/io.rs
//
// Streaming I/O bridge: byte sources and sinks adapted onto the codec
// engine's read/write request contract.

use crate::engine::session::ErrorSlot;
use crate::error::PngError;
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

#[cfg(test)]
use std::cell::Cell;

#[cfg(test)]
thread_local! {
    static LIVE_BRIDGES: Cell<usize> = const { Cell::new(0) };
}

/// Number of bridges currently attached to a session on this thread.
#[cfg(test)]
pub(crate) fn live_bridges() -> usize {
    LIVE_BRIDGES.with(|c| c.get())
}

#[cfg(test)]
fn track_attach() {
    LIVE_BRIDGES.with(|c| c.set(c.get() + 1));
}

#[cfg(test)]
fn track_detach() {
    LIVE_BRIDGES.with(|c| c.set(c.get().saturating_sub(1)));
}

/// Where a decode pulls its bytes from.
#[derive(Clone, Copy, Debug)]
pub enum Source<'a> {
    /// File on disk, read through a buffered handle
    Path(&'a Path),
    /// In-memory bytes, consumed as a forward-only cursor
    Memory(&'a [u8]),
    /// `file://`, `http://` or `https://` URL
    Url(&'a str),
}

impl<'a> Source<'a> {
    /// Identifier carried by errors raised while reading this source.
    pub fn origin(&self) -> String {
        match self {
            Source::Path(path) => path.display().to_string(),
            Source::Memory(_) => "<memory>".to_string(),
            Source::Url(url) => (*url).to_string(),
        }
    }

    /// Acquire the underlying byte stream. Failure to acquire it is
    /// `UnableToOpen`; nothing has been read at that point.
    pub fn open(&self) -> Result<Box<dyn Read + 'a>, PngError> {
        match *self {
            Source::Path(path) => open_file(path),
            Source::Memory(bytes) => Ok(Box::new(bytes)),
            Source::Url(url) => match resolve_url(url)? {
                ResolvedUrl::File(path) => open_file(&path),
                ResolvedUrl::Remote(url) => open_remote(&url),
            },
        }
    }
}

fn open_file(path: &Path) -> Result<Box<dyn Read + 'static>, PngError> {
    let file = File::open(path)
        .map_err(|e| PngError::unable_to_open(path.display().to_string(), e.to_string()))?;
    Ok(Box::new(BufReader::new(file)))
}

#[derive(Debug, PartialEq, Eq)]
enum ResolvedUrl {
    File(PathBuf),
    Remote(String),
}

fn resolve_url(url: &str) -> Result<ResolvedUrl, PngError> {
    if let Some(rest) = url.strip_prefix("file://") {
        // file://localhost/tmp/a.png and file:///tmp/a.png name the same file
        let path = rest.strip_prefix("localhost").unwrap_or(rest);
        if path.is_empty() {
            return Err(PngError::unable_to_open(url.to_string(), "file URL has no path"));
        }
        return Ok(ResolvedUrl::File(PathBuf::from(path)));
    }
    let lower = url.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return Ok(ResolvedUrl::Remote(url.to_string()));
    }
    Err(PngError::unable_to_open(
        url.to_string(),
        "unsupported URL scheme (expected file, http or https)",
    ))
}

/// Local path behind a URL that is to be written. Only `file://` URLs can be
/// written; remote and unknown schemes are `UnableToOpen`.
pub(crate) fn writable_path(url: &str) -> Result<PathBuf, PngError> {
    match resolve_url(url)? {
        ResolvedUrl::File(path) => Ok(path),
        ResolvedUrl::Remote(_) => Err(PngError::unable_to_open(
            url.to_string(),
            "writing to remote URLs is not supported",
        )),
    }
}

#[cfg(feature = "http")]
fn open_remote(url: &str) -> Result<Box<dyn Read + 'static>, PngError> {
    Ok(Box::new(HttpSource::get(url)?))
}

#[cfg(not(feature = "http"))]
fn open_remote(url: &str) -> Result<Box<dyn Read + 'static>, PngError> {
    Err(PngError::unable_to_open(
        url.to_string(),
        "HTTP sources require the `http` feature",
    ))
}

/// Response body of an HTTP(S) GET, consumed as a byte stream.
///
/// A slow server blocks the decode that reads from it; there is no timeout
/// at this layer beyond the HTTP client's own.
#[cfg(feature = "http")]
pub struct HttpSource {
    url: String,
    content_length: Option<u64>,
    body: Box<dyn Read + Send + Sync + 'static>,
}

#[cfg(feature = "http")]
impl HttpSource {
    /// Issue the request. Transport failures and non-2xx statuses are
    /// `UnableToOpen`.
    pub fn get(url: &str) -> Result<Self, PngError> {
        let response = ureq::get(url).call().map_err(|e| match e {
            ureq::Error::Status(code, _) => {
                PngError::unable_to_open(url.to_string(), format!("HTTP status {code}"))
            }
            ureq::Error::Transport(transport) => {
                PngError::unable_to_open(url.to_string(), transport.to_string())
            }
        })?;
        let content_length = response
            .header("Content-Length")
            .and_then(|v| v.trim().parse::<u64>().ok());
        tracing::debug!(target: "pngkit::io", %url, ?content_length, "http source opened");
        Ok(Self {
            url: url.to_string(),
            content_length,
            body: response.into_reader(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Length announced by the server, if any.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }
}

#[cfg(feature = "http")]
impl Read for HttpSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.body.read(buf)
    }
}

/// Read side of the bridge.
///
/// Borrows the byte source for exactly one decode call; it is owned by the
/// codec session and dropped with it on every exit path.
pub struct ReadBridge<'a, R: Read> {
    inner: &'a mut R,
    slot: &'a ErrorSlot,
    delivered: u64,
}

impl<'a, R: Read> ReadBridge<'a, R> {
    pub(crate) fn new(inner: &'a mut R, slot: &'a ErrorSlot) -> Self {
        #[cfg(test)]
        track_attach();
        Self {
            inner,
            slot,
            delivered: 0,
        }
    }

    /// Total bytes handed out so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Fill `buf` completely or fail with `ReadFailed`. A short read is never
    /// a success.
    pub fn fill_exact(&mut self, buf: &mut [u8]) -> Result<(), PngError> {
        let got = match self.pull(buf) {
            Ok(n) => n,
            Err(e) => return Err(self.slot.take_fault().unwrap_or_else(|| self.slot.io_failure(&e))),
        };
        if got < buf.len() {
            self.slot.mark_exhausted(self.delivered);
            return Err(PngError::read_failed(
                self.slot.origin().to_string(),
                Some(format!(
                    "byte source exhausted: requested {} bytes, got {got}",
                    buf.len()
                )),
            ));
        }
        Ok(())
    }

    /// Pull until `buf` is full or the source reports end of stream.
    fn pull(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.slot.latch(self.slot.io_failure(&e));
                    return Err(e);
                }
            }
        }
        self.delivered += filled as u64;
        Ok(filled)
    }
}

impl<R: Read> Read for ReadBridge<'_, R> {
    /// The engine reads through a look-ahead buffer, so a request running past
    /// the end of the stream is answered with what exists. Exhaustion is only
    /// recorded once the engine comes back for more and gets nothing; it then
    /// becomes part of the `ReadFailed` description.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let got = self.pull(buf)?;
        if got == 0 && !buf.is_empty() {
            self.slot.mark_exhausted(self.delivered);
        }
        Ok(got)
    }
}

#[cfg(test)]
impl<R: Read> Drop for ReadBridge<'_, R> {
    fn drop(&mut self) {
        track_detach();
    }
}

/// Write side of the bridge. Every request from the engine is consumed in
/// full before the call returns.
pub struct WriteBridge<'a, W: Write> {
    inner: &'a mut W,
    slot: &'a ErrorSlot,
    written: u64,
}

impl<'a, W: Write> WriteBridge<'a, W> {
    pub(crate) fn new(inner: &'a mut W, slot: &'a ErrorSlot) -> Self {
        #[cfg(test)]
        track_attach();
        Self {
            inner,
            slot,
            written: 0,
        }
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl<W: Write> Write for WriteBridge<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Err(e) = self.inner.write_all(buf) {
            self.slot.latch(self.slot.io_failure(&e));
            return Err(e);
        }
        self.written += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush().inspect_err(|e| {
            self.slot.latch(self.slot.io_failure(e));
        })
    }
}

#[cfg(test)]
impl<W: Write> Drop for WriteBridge<'_, W> {
    fn drop(&mut self) {
        track_detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hands out at most `chunk` bytes per read call.
    struct Trickle<'a> {
        data: &'a [u8],
        chunk: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.chunk.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    struct Broken;

    impl Read for Broken {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer went away"))
        }
    }

    impl Write for Broken {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::StorageFull, "disk full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn fill_exact_gathers_partial_reads() {
        let slot = ErrorSlot::reading("trickle");
        let mut src = Trickle {
            data: &[1, 2, 3, 4, 5, 6, 7, 8, 9],
            chunk: 2,
        };
        let mut bridge = ReadBridge::new(&mut src, &slot);
        let mut buf = [0u8; 7];
        bridge.fill_exact(&mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(bridge.delivered(), 7);
    }

    #[test]
    fn fill_exact_short_read_is_an_error() {
        let slot = ErrorSlot::reading("short.png");
        let mut src: &[u8] = &[1, 2, 3];
        let mut bridge = ReadBridge::new(&mut src, &slot);
        let mut buf = [0u8; 8];
        let err = bridge.fill_exact(&mut buf).unwrap_err();
        match err {
            PngError::ReadFailed { path, description } => {
                assert_eq!(path, "short.png");
                assert!(description.unwrap().contains("requested 8 bytes, got 3"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn source_errors_are_latched_as_read_failures() {
        let slot = ErrorSlot::reading("socket");
        let mut src = Broken;
        let mut bridge = ReadBridge::new(&mut src, &slot);
        let mut buf = [0u8; 4];
        let err = bridge.fill_exact(&mut buf).unwrap_err();
        assert!(matches!(err, PngError::ReadFailed { .. }));
        assert!(err.to_string().contains("peer went away"));
    }

    #[test]
    fn engine_reads_report_short_counts_and_mark_exhaustion() {
        let slot = ErrorSlot::reading("mem");
        let mut src: &[u8] = &[9, 9];
        let mut bridge = ReadBridge::new(&mut src, &slot);
        let mut buf = [0u8; 16];
        assert_eq!(bridge.read(&mut buf).unwrap(), 2);
        // a short look-ahead fill is not exhaustion yet
        assert_eq!(slot.exhausted_at(), None);
        assert_eq!(bridge.read(&mut buf).unwrap(), 0);
        assert_eq!(slot.exhausted_at(), Some(2));
    }

    #[test]
    fn write_bridge_consumes_every_request() {
        let slot = ErrorSlot::writing("vec");
        let mut sink = Vec::new();
        {
            let mut bridge = WriteBridge::new(&mut sink, &slot);
            assert_eq!(bridge.write(&[1, 2, 3]).unwrap(), 3);
            bridge.write_all(&[4]).unwrap();
            assert_eq!(bridge.written(), 4);
        }
        assert_eq!(sink, vec![1, 2, 3, 4]);
    }

    #[test]
    fn write_bridge_latches_sink_failures() {
        let slot = ErrorSlot::writing("full.png");
        let mut sink = Broken;
        let mut bridge = WriteBridge::new(&mut sink, &slot);
        assert!(bridge.write(&[0]).is_err());
        let fault = slot.take_fault().unwrap();
        assert!(matches!(fault, PngError::WriteFailed { .. }));
        assert!(fault.to_string().contains("disk full"));
    }

    #[test]
    fn bridges_detach_when_dropped() {
        let before = live_bridges();
        let slot = ErrorSlot::reading("mem");
        let mut src: &[u8] = &[];
        {
            let _bridge = ReadBridge::new(&mut src, &slot);
            assert_eq!(live_bridges(), before + 1);
        }
        assert_eq!(live_bridges(), before);
    }

    #[test]
    fn resolve_file_urls() {
        assert_eq!(
            resolve_url("file:///tmp/a.png").unwrap(),
            ResolvedUrl::File(PathBuf::from("/tmp/a.png"))
        );
        assert_eq!(
            resolve_url("file://localhost/tmp/a.png").unwrap(),
            ResolvedUrl::File(PathBuf::from("/tmp/a.png"))
        );
        assert!(resolve_url("file://").is_err());
    }

    #[test]
    fn resolve_remote_and_unknown_urls() {
        assert_eq!(
            resolve_url("HTTPS://example.com/a.png").unwrap(),
            ResolvedUrl::Remote("HTTPS://example.com/a.png".to_string())
        );
        let err = resolve_url("ftp://example.com/a.png").unwrap_err();
        assert!(matches!(err, PngError::UnableToOpen { .. }));
        assert!(resolve_url("/tmp/randimage.png").is_err());
    }

    #[test]
    fn missing_file_is_unable_to_open() {
        let err = Source::Path(Path::new("/definitely/not/here.png"))
            .open()
            .err()
            .unwrap();
        assert!(matches!(err, PngError::UnableToOpen { .. }));
        assert_eq!(err.origin(), Some("/definitely/not/here.png"));
    }

    #[test]
    fn memory_source_reads_forward() {
        let data = [1u8, 2, 3];
        let mut reader = Source::Memory(&data).open().unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
        assert_eq!(Source::Memory(&data).origin(), "<memory>");
    }
}

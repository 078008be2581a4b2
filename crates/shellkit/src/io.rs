//! Byte streams shared between the runner, builtins and hooks
//!
//! Streams are cheap handles: cloning one shares the underlying reader or
//! writer, which is how a subshell inherits its parent's stdio. Input is
//! buffered once per stream so that `read` consumes exactly one line and
//! leaves the rest for whoever reads next.

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex as StdMutex};
use std::task::{Context, Poll};

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

/// Capacity of the in-memory pipe between pipeline stages.
pub(crate) const PIPE_CAPACITY: usize = 64 * 1024;

/// Anything a redirection can open.
pub trait FileStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> FileStream for T {}

type Reader = BufReader<Box<dyn AsyncRead + Send + Unpin>>;
type Writer = Box<dyn AsyncWrite + Send + Unpin>;

/// A readable stream. The default stream is empty.
#[derive(Clone, Default)]
pub struct InputStream {
    inner: Option<Arc<Mutex<Reader>>>,
    process: bool,
}

impl std::fmt::Debug for InputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputStream")
            .field("open", &self.inner.is_some())
            .field("process", &self.process)
            .finish()
    }
}

impl InputStream {
    /// A stream that is always at end of file.
    pub fn null() -> Self {
        Self::default()
    }

    /// The host process's standard input.
    pub fn stdin() -> Self {
        Self {
            process: true,
            ..Self::from_reader(tokio::io::stdin())
        }
    }

    pub fn from_reader(r: impl AsyncRead + Send + Unpin + 'static) -> Self {
        let boxed: Box<dyn AsyncRead + Send + Unpin> = Box::new(r);
        Self {
            inner: Some(Arc::new(Mutex::new(BufReader::new(boxed)))),
            process: false,
        }
    }

    /// A stream over fixed bytes, as used for heredocs.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::from_reader(io::Cursor::new(bytes.into()))
    }

    pub fn is_null(&self) -> bool {
        self.inner.is_none()
    }

    /// Whether this is the host process's stdin, which child processes can
    /// inherit directly.
    pub(crate) fn is_process(&self) -> bool {
        self.process
    }

    /// Read up to and including `delim`. Returns the number of bytes read;
    /// zero means end of file.
    pub async fn read_until(&self, delim: u8, buf: &mut Vec<u8>) -> io::Result<usize> {
        match &self.inner {
            Some(r) => r.lock().await.read_until(delim, buf).await,
            None => Ok(0),
        }
    }

    /// Read at most `max` bytes, stopping after `delim`.
    pub async fn read_bounded(&self, delim: u8, max: usize, buf: &mut Vec<u8>) -> io::Result<usize> {
        let Some(r) = &self.inner else {
            return Ok(0);
        };
        let mut r = r.lock().await;
        let mut total = 0;
        while total < max {
            let mut byte = [0u8; 1];
            if r.read(&mut byte).await? == 0 {
                break;
            }
            total += 1;
            if byte[0] == delim {
                break;
            }
            buf.push(byte[0]);
        }
        Ok(total)
    }

    /// Read everything that is left.
    pub async fn read_to_end(&self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        if let Some(r) = &self.inner {
            r.lock().await.read_to_end(&mut buf).await?;
        }
        Ok(buf)
    }

    /// Copy the rest of the stream into `w`, stopping quietly when `w`
    /// closes.
    pub(crate) async fn pump_into<W: AsyncWrite + Unpin>(&self, w: &mut W) -> io::Result<()> {
        let Some(r) = &self.inner else {
            return Ok(());
        };
        let mut r = r.lock().await;
        let mut chunk = vec![0u8; 8192];
        loop {
            let n = r.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            match w.write_all(&chunk[..n]).await {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => break,
                Err(e) => return Err(e),
            }
        }
        w.shutdown().await.or_else(ignore_broken_pipe)
    }
}

/// A writable stream. The default stream discards everything.
#[derive(Clone, Default)]
pub struct OutputStream {
    inner: Option<Arc<Mutex<Writer>>>,
}

impl std::fmt::Debug for OutputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputStream")
            .field("open", &self.inner.is_some())
            .finish()
    }
}

impl OutputStream {
    /// A stream that discards its input.
    pub fn null() -> Self {
        Self::default()
    }

    /// The host process's standard output.
    pub fn stdout() -> Self {
        Self::from_writer(tokio::io::stdout())
    }

    /// The host process's standard error.
    pub fn stderr() -> Self {
        Self::from_writer(tokio::io::stderr())
    }

    pub fn from_writer(w: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        let boxed: Writer = Box::new(w);
        Self {
            inner: Some(Arc::new(Mutex::new(boxed))),
        }
    }

    /// A stream that collects everything written into a [`Capture`].
    pub fn capture() -> (Self, Capture) {
        let capture = Capture::default();
        (Self::from_writer(capture.clone()), capture)
    }

    pub fn is_null(&self) -> bool {
        self.inner.is_none()
    }

    /// Write and flush. A broken pipe surfaces as [`io::ErrorKind::BrokenPipe`].
    pub async fn write_all(&self, bytes: &[u8]) -> io::Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        if let Some(w) = &self.inner {
            let mut w = w.lock().await;
            w.write_all(bytes).await?;
            w.flush().await?;
        }
        Ok(())
    }

    pub async fn write_str(&self, s: &str) -> io::Result<()> {
        self.write_all(s.as_bytes()).await
    }

    /// Signal end of file to the reading side.
    pub async fn shutdown(&self) -> io::Result<()> {
        match &self.inner {
            Some(w) => w.lock().await.shutdown().await.or_else(ignore_broken_pipe),
            None => Ok(()),
        }
    }

    /// Copy everything from `r` into this stream.
    pub(crate) async fn pump_from<R: AsyncRead + Unpin>(&self, r: &mut R) -> io::Result<()> {
        let mut chunk = vec![0u8; 8192];
        loop {
            let n = r.read(&mut chunk).await?;
            if n == 0 {
                return Ok(());
            }
            self.write_all(&chunk[..n]).await?;
        }
    }
}

fn ignore_broken_pipe(e: io::Error) -> io::Result<()> {
    if e.kind() == io::ErrorKind::BrokenPipe {
        Ok(())
    } else {
        Err(e)
    }
}

/// Shared in-memory sink behind [`OutputStream::capture`].
#[derive(Clone, Default, Debug)]
pub struct Capture {
    buf: Arc<StdMutex<Vec<u8>>>,
}

impl Capture {
    /// Remove and return everything captured so far.
    pub fn take(&self) -> Vec<u8> {
        match self.buf.lock() {
            Ok(mut buf) => std::mem::take(&mut *buf),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }

    /// Captured text, lossily decoded, leaving the buffer empty.
    pub fn take_string(&self) -> String {
        String::from_utf8_lossy(&self.take()).into_owned()
    }
}

impl AsyncWrite for Capture {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, data: &[u8]) -> Poll<io::Result<usize>> {
        match self.buf.lock() {
            Ok(mut buf) => buf.extend_from_slice(data),
            Err(poisoned) => poisoned.into_inner().extend_from_slice(data),
        }
        Poll::Ready(Ok(data.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// An entry in a runner's descriptor table.
#[derive(Clone, Debug)]
pub enum Stream {
    Input(InputStream),
    Output(OutputStream),
}

/// An in-memory pipe: what the writer writes, the reader reads. Dropping or
/// shutting down the writer gives the reader end of file.
pub(crate) fn pipe() -> (OutputStream, InputStream) {
    let (w, r) = tokio::io::duplex(PIPE_CAPACITY);
    (OutputStream::from_writer(w), InputStream::from_reader(r))
}

//! Async read/write decorators applying a [`Keystream`]

use super::Keystream;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Writer that XORs outgoing bytes with a keystream.
///
/// Accepted bytes are XOR-ed into an internal buffer immediately, which
/// advances the keystream, and are then drained to the inner writer. The
/// buffer is drained before any new data is accepted and on flush/shutdown,
/// so callers must flush to push out the tail of a write.
pub struct XorWriter<W> {
    inner: W,
    keystream: Keystream,
    /// Grows to the largest write seen, never shrinks
    buf: Vec<u8>,
    /// Bytes of `buf` already handed to `inner`
    pos: usize,
}

impl<W> XorWriter<W> {
    pub fn new(inner: W, keystream: Keystream) -> Self {
        Self {
            inner,
            keystream,
            buf: Vec::new(),
            pos: 0,
        }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Current scratch capacity
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }
}

impl<W: AsyncWrite + Unpin> XorWriter<W> {
    fn poll_drain(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        while self.pos < self.buf.len() {
            let n = ready!(Pin::new(&mut self.inner).poll_write(cx, &self.buf[self.pos..]))?;
            if n == 0 {
                return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
            }
            self.pos += n;
        }
        self.buf.clear();
        self.pos = 0;
        Poll::Ready(Ok(()))
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for XorWriter<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        ready!(this.poll_drain(cx))?;

        this.buf.extend_from_slice(data);
        this.keystream.apply(&mut this.buf);

        // The data is accepted either way; a failure here resurfaces on the
        // next write or flush.
        let _ = this.poll_drain(cx);
        Poll::Ready(Ok(data.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(this.poll_drain(cx))?;
        Pin::new(&mut this.inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(this.poll_drain(cx))?;
        Pin::new(&mut this.inner).poll_shutdown(cx)
    }
}

/// Reader that XORs incoming bytes with a keystream.
///
/// The keystream only advances by the number of bytes actually read.
pub struct XorReader<R> {
    inner: R,
    keystream: Keystream,
}

impl<R> XorReader<R> {
    pub fn new(inner: R, keystream: Keystream) -> Self {
        Self { inner, keystream }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for XorReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;
        this.keystream.apply(&mut buf.filled_mut()[before..]);
        Poll::Ready(Ok(()))
    }
}

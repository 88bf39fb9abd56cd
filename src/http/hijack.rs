use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
};

use hyper::{
    header::{HeaderName, HeaderValue},
    HeaderMap, Method, Uri,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadBuf};

const MAX_HEAD_SIZE: usize = 64 * 1024;
const MAX_HEADERS: usize = 64;
const READ_CHUNK_SIZE: usize = 4 * 1024;

#[derive(Debug)]
pub struct RequestHead {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub len: usize,
}

pub struct Rewind<T> {
    buffered: Vec<u8>,
    pos: usize,
    inner: T,
}

impl<T> Rewind<T> {
    pub fn new(inner: T) -> Self {
        Rewind {
            buffered: Vec::new(),
            pos: 0,
            inner,
        }
    }

    pub fn buffered(&self) -> &[u8] {
        &self.buffered[self.pos..]
    }

    pub fn consume(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.buffered.len());
    }
}

impl<T: AsyncRead + Unpin> Rewind<T> {
    /// Reads until a complete request head is buffered and parses it.
    ///
    /// Returns `Ok(None)` when the bytes are not a head this layer understands
    /// (malformed, oversized, too many headers, or the peer stopped mid-head);
    /// those connections are left for hyper to answer. Nothing is consumed.
    pub async fn peek_head(&mut self) -> io::Result<Option<RequestHead>> {
        loop {
            match parse_head(self.buffered()) {
                Parsed::Complete(head) => return Ok(Some(head)),
                Parsed::Invalid => return Ok(None),
                Parsed::Partial if self.buffered().len() >= MAX_HEAD_SIZE => return Ok(None),
                Parsed::Partial => {}
            }
            let start = self.buffered.len();
            self.buffered.resize(start + READ_CHUNK_SIZE, 0);
            let n = self.inner.read(&mut self.buffered[start..]).await;
            let n = match n {
                Ok(n) => n,
                Err(e) => {
                    self.buffered.truncate(start);
                    return Err(e);
                }
            };
            self.buffered.truncate(start + n);
            if n == 0 {
                if self.buffered().is_empty() {
                    return Err(io::ErrorKind::UnexpectedEof.into());
                }
                return Ok(None);
            }
        }
    }
}

enum Parsed {
    Complete(RequestHead),
    Partial,
    Invalid,
}

fn parse_head(buf: &[u8]) -> Parsed {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);
    let len = match req.parse(buf) {
        Ok(httparse::Status::Complete(len)) => len,
        Ok(httparse::Status::Partial) => return Parsed::Partial,
        Err(_) => return Parsed::Invalid,
    };
    let method = req.method.and_then(|m| Method::from_bytes(m.as_bytes()).ok());
    let uri = req.path.and_then(|p| p.parse::<Uri>().ok());
    let (Some(method), Some(uri)) = (method, uri) else {
        return Parsed::Invalid;
    };
    let mut map = HeaderMap::with_capacity(req.headers.len());
    for header in req.headers.iter() {
        let name = HeaderName::from_bytes(header.name.as_bytes());
        let value = HeaderValue::from_bytes(header.value);
        match (name, value) {
            (Ok(name), Ok(value)) => {
                map.append(name, value);
            }
            _ => return Parsed::Invalid,
        }
    }
    Parsed::Complete(RequestHead {
        method,
        uri,
        headers: map,
        len,
    })
}

impl<T: AsyncRead + Unpin> AsyncRead for Rewind<T> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.pos < this.buffered.len() {
            let n = buf.remaining().min(this.buffered.len() - this.pos);
            buf.put_slice(&this.buffered[this.pos..this.pos + n]);
            this.pos += n;
            if this.pos == this.buffered.len() {
                this.buffered = Vec::new();
                this.pos = 0;
            }
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for Rewind<T> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }
}

use std::{
    pin::Pin,
    task::{Context, Poll},
};

use http_body_util::Full;
use hyper::body::{Body, Bytes, Frame, Incoming, SizeHint};
use tokio::{
    fs::File,
    io::{AsyncRead, ReadBuf},
};

use crate::error::{http::HttpError, GatewayError};

const FILE_CHUNK_SIZE: usize = 16 * 1024;

pub struct GatewayBody {
    kind: Kind,
}

enum Kind {
    Empty,
    Full(Full<Bytes>),
    Incoming(Incoming),
    File {
        file: File,
        remaining: u64,
        buf: Box<[u8]>,
    },
}

impl GatewayBody {
    pub fn empty() -> Self {
        Self { kind: Kind::Empty }
    }

    pub fn full(data: impl Into<Bytes>) -> Self {
        Self {
            kind: Kind::Full(Full::new(data.into())),
        }
    }

    pub fn incoming(body: Incoming) -> Self {
        Self {
            kind: Kind::Incoming(body),
        }
    }

    pub fn file(file: File, len: u64) -> Self {
        Self {
            kind: Kind::File {
                file,
                remaining: len,
                buf: vec![0u8; FILE_CHUNK_SIZE].into_boxed_slice(),
            },
        }
    }
}

impl Body for GatewayBody {
    type Data = Bytes;

    type Error = GatewayError;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.kind {
            Kind::Empty => Poll::Ready(None),
            Kind::Full(ref mut full) => Pin::new(full)
                .poll_frame(cx)
                .map_err(|never| match never {}),
            Kind::Incoming(ref mut body) => Pin::new(body)
                .poll_frame(cx)
                .map_err(|e| HttpError::Body(e).into()),
            Kind::File {
                ref mut file,
                ref mut remaining,
                ref mut buf,
            } => {
                if *remaining == 0 {
                    return Poll::Ready(None);
                }
                let limit = buf.len().min(usize::try_from(*remaining).unwrap_or(usize::MAX));
                let mut read_buf = ReadBuf::new(&mut buf[..limit]);
                match Pin::new(file).poll_read(cx, &mut read_buf) {
                    Poll::Ready(Ok(())) => {
                        let filled = read_buf.filled();
                        if filled.is_empty() {
                            *remaining = 0;
                            return Poll::Ready(None);
                        }
                        *remaining -= filled.len() as u64;
                        Poll::Ready(Some(Ok(Frame::data(Bytes::copy_from_slice(filled)))))
                    }
                    Poll::Ready(Err(e)) => Poll::Ready(Some(Err(e.into()))),
                    Poll::Pending => Poll::Pending,
                }
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        match self.kind {
            Kind::Empty => true,
            Kind::Full(ref full) => full.is_end_stream(),
            Kind::Incoming(ref body) => body.is_end_stream(),
            Kind::File { remaining, .. } => remaining == 0,
        }
    }

    fn size_hint(&self) -> SizeHint {
        match self.kind {
            Kind::Empty => SizeHint::with_exact(0),
            Kind::Full(ref full) => full.size_hint(),
            Kind::Incoming(ref body) => body.size_hint(),
            Kind::File { remaining, .. } => SizeHint::with_exact(remaining),
        }
    }
}

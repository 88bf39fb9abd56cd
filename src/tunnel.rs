//! CONNECT tunnels.
//!
//! A [`Tunnel`] binds a hijacked client socket to the upstream connection dialed
//! for it and shovels bytes both ways on two tasks. Whichever direction stops
//! first, by EOF or by error, closes the pair; the [`CloseGuard`] makes sure that
//! happens once.

use std::sync::{
    atomic::{AtomicU8, Ordering},
    Arc,
};

use log::debug;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    sync::Notify,
};

use crate::{address::DestinationAddress, dialer::Dialer, error::GatewayError, AsyncSocket};

pub const CONNECTION_ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection Established\r\n\r\n";

const COPY_BUFFER_SIZE: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TunnelState {
    Handshaking = 0,
    Established = 1,
    Closing = 2,
    Closed = 3,
}

impl From<u8> for TunnelState {
    fn from(v: u8) -> Self {
        match v {
            0 => TunnelState::Handshaking,
            1 => TunnelState::Established,
            2 => TunnelState::Closing,
            _ => TunnelState::Closed,
        }
    }
}

#[derive(Debug)]
pub struct CloseGuard {
    state: AtomicU8,
    notify: Notify,
}

impl CloseGuard {
    fn new() -> Self {
        CloseGuard {
            state: AtomicU8::new(TunnelState::Established as u8),
            notify: Notify::new(),
        }
    }

    pub fn state(&self) -> TunnelState {
        TunnelState::from(self.state.load(Ordering::Acquire))
    }

    pub fn close(&self) -> bool {
        let first = self
            .state
            .compare_exchange(
                TunnelState::Established as u8,
                TunnelState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if first {
            self.notify.notify_waiters();
        }
        first
    }

    pub async fn closed(&self) {
        loop {
            let notified = self.notify.notified();
            if self.state() != TunnelState::Established {
                return;
            }
            notified.await;
        }
    }

    fn finish(&self) {
        self.close();
        self.state
            .store(TunnelState::Closed as u8, Ordering::Release);
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TunnelStats {
    pub client_to_upstream: u64,
    pub upstream_to_client: u64,
}

pub struct Tunnel<C, U> {
    client: C,
    upstream: U,
    guard: Arc<CloseGuard>,
}

impl<C: AsyncSocket, U: AsyncSocket> Tunnel<C, U> {
    pub fn new(client: C, upstream: U) -> Self {
        Tunnel {
            client,
            upstream,
            guard: Arc::new(CloseGuard::new()),
        }
    }

    pub fn guard(&self) -> Arc<CloseGuard> {
        self.guard.clone()
    }

    pub async fn run(self) -> TunnelStats {
        let (client_reader, client_writer) = tokio::io::split(self.client);
        let (upstream_reader, upstream_writer) = tokio::io::split(self.upstream);

        let outbound = tokio::spawn(pipe(client_reader, upstream_writer, self.guard.clone()));
        let inbound = tokio::spawn(pipe(upstream_reader, client_writer, self.guard.clone()));

        let client_to_upstream = outbound.await.unwrap_or_default();
        let upstream_to_client = inbound.await.unwrap_or_default();
        self.guard.finish();

        TunnelStats {
            client_to_upstream,
            upstream_to_client,
        }
    }
}

async fn pipe<R, W>(mut reader: R, mut writer: W, guard: Arc<CloseGuard>) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut copied = 0u64;
    let copy = async {
        let mut buf = vec![0u8; COPY_BUFFER_SIZE];
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                return Ok::<_, std::io::Error>(());
            }
            writer.write_all(&buf[..n]).await?;
            copied += n as u64;
        }
    };
    tokio::select! {
        _ = copy => {}
        _ = guard.closed() => {}
    }
    guard.close();
    let _ = writer.shutdown().await;
    copied
}

/// Raw-socket CONNECT handshake: dial `target`, then announce the tunnel.
///
/// On dial failure the client is shut down without a single byte written, since
/// no HTTP response can be framed on a hijacked socket.
pub async fn establish<C, D>(
    mut client: C,
    dialer: &D,
    target: &str,
) -> Result<Tunnel<C, D::Stream>, GatewayError>
where
    C: AsyncSocket,
    D: Dialer,
{
    let upstream = match target.parse::<DestinationAddress>() {
        Ok(addr) => dialer.dial(&addr).await,
        Err(e) => Err(e.into()),
    };
    let upstream = match upstream {
        Ok(upstream) => upstream,
        Err(e) => {
            let _ = client.shutdown().await;
            return Err(e);
        }
    };
    client.write_all(CONNECTION_ESTABLISHED).await?;
    client.flush().await?;
    Ok(Tunnel::new(client, upstream))
}

pub async fn serve<C, D>(client: C, dialer: &D, target: &str)
where
    C: AsyncSocket,
    D: Dialer,
{
    match establish(client, dialer, target).await {
        Ok(tunnel) => {
            debug!("tunnel to {} established", target);
            let stats = tunnel.run().await;
            debug!(
                "tunnel to {} closed, {} bytes out, {} bytes in",
                target, stats.client_to_upstream, stats.upstream_to_client
            );
        }
        Err(e) => debug!("tunnel to {} not established: {}", target, e),
    }
}

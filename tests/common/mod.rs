//! Loopback fixtures: a fake SOCKS5 proxy, fake origins and a running gateway.

use std::{
    collections::HashMap,
    net::SocketAddr,
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use socks_gateway::{Gateway, GatewayConfig};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::mpsc,
};

pub const SENTINEL: &str = "files.local";

/// SOCKS5 proxy that resolves names from a fixed table and counts the
/// connections it carries.
pub struct FakeSocks {
    pub addr: SocketAddr,
    pub accepted: Arc<AtomicUsize>,
    pub open: Arc<AtomicUsize>,
}

impl FakeSocks {
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Waits until every proxied connection has been torn down.
    pub async fn wait_all_closed(&self) {
        let open = self.open.clone();
        tokio::time::timeout(Duration::from_secs(5), async move {
            while open.load(Ordering::SeqCst) != 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("upstream connection left open");
    }
}

pub async fn start_socks(routes: HashMap<String, SocketAddr>) -> FakeSocks {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let open = Arc::new(AtomicUsize::new(0));
    let routes = Arc::new(routes);
    {
        let accepted = accepted.clone();
        let open = open.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                accepted.fetch_add(1, Ordering::SeqCst);
                open.fetch_add(1, Ordering::SeqCst);
                let routes = routes.clone();
                let open = open.clone();
                tokio::spawn(async move {
                    let _ = socks_session(socket, &routes).await;
                    open.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });
    }
    FakeSocks {
        addr,
        accepted,
        open,
    }
}

async fn socks_session(
    mut socket: TcpStream,
    routes: &HashMap<String, SocketAddr>,
) -> std::io::Result<()> {
    let mut greeting = [0u8; 2];
    socket.read_exact(&mut greeting).await?;
    let mut methods = vec![0u8; greeting[1] as usize];
    socket.read_exact(&mut methods).await?;
    socket.write_all(&[5, 0]).await?;

    let mut request = [0u8; 4];
    socket.read_exact(&mut request).await?;
    let host = match request[3] {
        1 => {
            let mut ip = [0u8; 4];
            socket.read_exact(&mut ip).await?;
            std::net::Ipv4Addr::from(ip).to_string()
        }
        3 => {
            let len = socket.read_u8().await? as usize;
            let mut name = vec![0u8; len];
            socket.read_exact(&mut name).await?;
            String::from_utf8_lossy(&name).into_owned()
        }
        _ => {
            let mut ip = [0u8; 16];
            socket.read_exact(&mut ip).await?;
            std::net::Ipv6Addr::from(ip).to_string()
        }
    };
    let port = socket.read_u16().await?;

    let target = routes
        .get(&host)
        .copied()
        .or_else(|| format!("{}:{}", host, port).parse().ok());
    let upstream = match target {
        Some(target) => TcpStream::connect(target).await.ok(),
        None => None,
    };
    let Some(mut upstream) = upstream else {
        socket.write_all(&[5, 4, 0, 1, 0, 0, 0, 0, 0, 0]).await?;
        return Ok(());
    };
    socket.write_all(&[5, 0, 0, 1, 0, 0, 0, 0, 0, 0]).await?;
    tokio::io::copy_bidirectional(&mut socket, &mut upstream).await?;
    Ok(())
}

/// Origin answering every connection with `response` after reading one request
/// head. Received heads are sent to the returned channel.
pub async fn start_origin(response: &'static [u8]) -> (SocketAddr, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (sender, receiver) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let sender = sender.clone();
            tokio::spawn(async move {
                let head = read_head(&mut socket).await;
                let _ = sender.send(head);
                let _ = socket.write_all(response).await;
                let mut rest = Vec::new();
                let _ = socket.read_to_end(&mut rest).await;
            });
        }
    });
    (addr, receiver)
}

pub async fn start_echo() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = socket.into_split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });
    addr
}

/// Writes `greeting` to every connection and hangs up.
pub async fn start_greeter(greeting: &'static [u8]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let _ = socket.write_all(greeting).await;
        }
    });
    addr
}

/// Accepts and reads, never answers.
pub async fn start_silent() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut sink = Vec::new();
                let _ = socket.read_to_end(&mut sink).await;
            });
        }
    });
    addr
}

pub async fn start_gateway(socks: SocketAddr, static_dir: Option<&Path>) -> SocketAddr {
    let mut config = GatewayConfig::new(socks.to_string(), "127.0.0.1:0", SENTINEL)
        .with_dial_timeout(Duration::from_secs(2));
    if let Some(dir) = static_dir {
        config = config.with_static_dir(dir);
    }
    let gateway = Gateway::bind(&config).await.unwrap();
    let addr = gateway.local_addr().unwrap();
    tokio::spawn(gateway.serve());
    addr
}

/// Reads up to and including the blank line ending an HTTP head.
pub async fn read_head(stream: &mut (impl AsyncRead + Unpin)) -> String {
    let mut head = Vec::new();
    while !head.ends_with(b"\r\n\r\n") {
        match stream.read_u8().await {
            Ok(byte) => head.push(byte),
            Err(_) => break,
        }
    }
    String::from_utf8_lossy(&head).into_owned()
}

/// Sends `request` and reads until the gateway closes the connection.
pub async fn exchange(gateway: SocketAddr, request: &str) -> String {
    let mut stream = TcpStream::connect(gateway).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut response))
        .await
        .expect("gateway did not close the connection")
        .unwrap();
    String::from_utf8_lossy(&response).into_owned()
}

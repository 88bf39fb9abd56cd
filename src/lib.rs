pub mod address;
pub mod config;
pub mod dialer;
mod error;
pub mod http;
pub mod server;
pub mod socks5;
pub mod tunnel;

pub use address::{DestinationAddress, ToSocketDestination};
pub use config::GatewayConfig;
pub use dialer::{Dialer, Socks5Dialer};
pub use error::{AddrError, GatewayError, HttpError, SocksError};
pub use http::{Route, Router, StaticFiles};
pub use server::Gateway;
pub use socks5::{Socks5, SocksConfig};
pub use tunnel::{CloseGuard, Tunnel, TunnelState, TunnelStats, CONNECTION_ESTABLISHED};

use tokio::io::{AsyncRead, AsyncWrite};

pub trait AsyncSocket: AsyncRead + AsyncWrite + Unpin + Send + 'static {}
impl<T> AsyncSocket for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

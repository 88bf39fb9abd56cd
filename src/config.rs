use std::{path::PathBuf, time::Duration};

pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub socks_addr: String,
    pub listen_addr: String,
    pub hostname: String,
    pub static_dir: Option<PathBuf>,
    pub dial_timeout: Duration,
}

impl GatewayConfig {
    pub fn new(
        socks_addr: impl Into<String>,
        listen_addr: impl Into<String>,
        hostname: impl Into<String>,
    ) -> Self {
        GatewayConfig {
            socks_addr: socks_addr.into(),
            listen_addr: listen_addr.into(),
            hostname: hostname.into(),
            static_dir: None,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
        }
    }

    pub fn with_static_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.static_dir = Some(dir.into());
        self
    }

    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }
}

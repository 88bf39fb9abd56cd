use std::{error::Error, path::PathBuf, time::Duration};

use clap::{ArgAction, Parser};
use log::info;
use socks_gateway::{Gateway, GatewayConfig};

/// Forwards HTTP and CONNECT traffic through a SOCKS5 proxy, and serves a
/// local directory under one reserved host name.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, disable_help_flag = true)]
struct Cli {
    /// Upstream SOCKS5 proxy address (host:port)
    #[arg(short = 's', value_name = "HOST:PORT")]
    socks5: String,

    /// Local listen address
    #[arg(short = 'l', value_name = "ADDR")]
    listen: String,

    /// Host name answered locally instead of being forwarded
    #[arg(short = 'h', value_name = "HOST")]
    hostname: String,

    /// Directory served for the local host name
    #[arg(short = 'w', value_name = "DIR")]
    static_dir: Option<PathBuf>,

    /// Seconds allowed for reaching a target through the proxy
    #[arg(long, value_name = "SECS", default_value_t = 10)]
    dial_timeout: u64,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,
}

impl From<Cli> for GatewayConfig {
    fn from(cli: Cli) -> Self {
        let config = GatewayConfig::new(cli.socks5, cli.listen, cli.hostname)
            .with_dial_timeout(Duration::from_secs(cli.dial_timeout));
        match cli.static_dir {
            Some(dir) => config.with_static_dir(dir),
            None => config,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = GatewayConfig::from(Cli::parse());
    let gateway = Gateway::bind(&config).await?;
    info!("forwarding through socks5 proxy {}", config.socks_addr);
    match config.static_dir {
        Some(ref dir) => info!("serving {} for host {}", dir.display(), config.hostname),
        None => info!("host {} answers 503, no directory configured", config.hostname),
    }

    tokio::select! {
        result = gateway.serve() => result?,
        _ = tokio::signal::ctrl_c() => info!("shutting down"),
    }
    Ok(())
}

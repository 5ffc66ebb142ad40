use clap::Parser;
use rustd::codec::Sockaddr;
use rustd::crypto::KeyPair;
use rustd::datapath::DatapathKind;
use rustd::iface::SystemIfconfig;
use rustd::server::{Config, Server};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(clap::ValueEnum, Debug, Clone, Copy)]
enum Transport {
    Udp,
    Kernel,
}

/// fastd handshake server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Implementation type
    #[arg(long = "impl", value_enum, default_value = "udp")]
    transport: Transport,

    /// Listening address
    #[arg(long, default_value = "127.0.0.1")]
    address: IpAddr,

    /// Listening port
    #[arg(long, default_value_t = 10000)]
    port: u16,

    /// Secret key, hex encoded
    #[arg(long)]
    secret: String,

    /// Seconds of silence before a peer is evicted
    #[arg(long, default_value_t = 300)]
    timeout: u64,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(
                EnvFilter::builder()
                    .with_default_directive(LevelFilter::INFO.into())
                    .from_env_lossy(),
            )
            .with_line_number(true)
            .with_file(true)
            .finish(),
    )
    .unwrap();

    let keys = match KeyPair::from_hex(&args.secret) {
        Ok(keys) => keys,
        Err(e) => {
            tracing::error!("invalid secret key: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!("server public key: {}", hex::encode(keys.public()));

    let mut config = Config::new(keys);
    config.bind = vec![Sockaddr::new(args.address, args.port)];
    config.timeout = Duration::from_secs(args.timeout);
    config.establish_peer = Some(Box::new(|peer| {
        tracing::info!("peer {} established", peer.remote);
    }));
    config.on_timeout = Some(Box::new(|peer| {
        tracing::info!("peer {} timed out", peer.remote);
    }));

    let kind = match args.transport {
        Transport::Udp => DatapathKind::Udp,
        Transport::Kernel => DatapathKind::Kernel,
    };

    let server = match Server::start(config, kind, Arc::new(SystemIfconfig)).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("unable to start server: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("waiting for signal failed: {}", e);
    }
    tracing::info!("shutting down");
    server.stop().await;
}

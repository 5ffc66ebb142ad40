use clap::Parser;
use rustd::client;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// fastd handshake client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the JSON config file
    #[arg(short, long, default_value = "./config.json")]
    config: String,

    /// Enable verbose output (warning: contains session keys)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let default_level = if args.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(
                EnvFilter::builder()
                    .with_default_directive(default_level.into())
                    .from_env_lossy(),
            )
            .with_line_number(true)
            .with_file(true)
            .finish(),
    )
    .unwrap();

    let config = match client::config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{:#}", e);
            std::process::exit(1);
        }
    };

    let established = match client::connect(&config).await {
        Ok(established) => established,
        Err(e) => {
            tracing::error!("handshake failed: {}", e);
            std::process::exit(1);
        }
    };

    let _device = match client::device::open_device(&established) {
        Ok(dev) => dev,
        Err(e) => {
            tracing::error!("error creating tun device: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!("tunnel to {} up, mtu {}", established.remote, established.mtu);

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("waiting for signal failed: {}", e);
    }
}

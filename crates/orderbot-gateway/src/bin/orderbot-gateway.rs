//! Orderbot Gateway Binary
//!
//! # Usage
//! ```bash
//! orderbot-gateway [--config gateway.json] [--port 3000] [--host 127.0.0.1] [--menu menu.json] [--verbose]
//! ```

use anyhow::Context;
use clap::Parser;
use orderbot_gateway::{Gateway, GatewayConfig};
use tracing_subscriber::EnvFilter;

/// Orderbot Gateway - WhatsApp ordering bot webhook server
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Port to listen on (overrides config and PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Menu JSON file (overrides MENU_PATH)
    #[arg(long)]
    menu: Option<String>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // .env is optional
    let dotenv = dotenvy::dotenv();

    // Initialize logging
    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("debug"))
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_target(false)
            .init();
    }

    if let Ok(path) = dotenv {
        tracing::debug!("Loaded environment from {}", path.display());
    }

    let config = match &args.config {
        Some(path) => GatewayConfig::from_file(path)
            .with_context(|| format!("Failed to read config {}", path))?,
        None => GatewayConfig::default(),
    };
    let mut config = config.with_env().context("Invalid environment override")?;
    if let Some(host) = args.host {
        config = config.with_host(host);
    }
    if let Some(port) = args.port {
        config = config.with_port(port);
    }
    if let Some(menu) = args.menu {
        config = config.with_menu_path(menu);
    }
    if config.verify_token.is_empty() {
        tracing::warn!("VERIFY_TOKEN is not set; webhook verification will be refused");
    }

    print_banner(&config.host, config.port);

    let gateway = Gateway::bootstrap(config).await;
    gateway.start().await?;

    Ok(())
}

fn print_banner(host: &str, port: u16) {
    println!();
    println!("🍽️  ORDERBOT GATEWAY v{}", orderbot_gateway::VERSION);
    println!();
    println!("🔗 HTTP Endpoints (http://{}:{})", host, port);
    println!("   ├─ GET  /webhook         - Meta verification handshake");
    println!("   ├─ POST /webhook         - WhatsApp Cloud API messages");
    println!("   ├─ POST /webhook/twilio  - Twilio WhatsApp messages");
    println!("   ├─ GET  /health          - Health check");
    println!("   └─ GET  /status          - Sessions and menu");
    println!();
    println!("Press Ctrl+C to stop the gateway");
    println!();
}

use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use rollgate::config::Config;
use rollgate::supervisor::Supervisor;

#[derive(Parser, Debug)]
#[command(name = "rollgate")]
#[command(about = "Zero-downtime rolling updates behind a round-robin reverse proxy")]
struct Args {
    /// Shell command that fetches the new artifact
    #[arg(long)]
    pull: String,

    /// Shell command that prints the artifact id to stdout
    #[arg(long)]
    id: String,

    /// Shell command template launching a child; <<PORT>> and <<HEALTHCHECK>>
    /// are substituted before execution
    #[arg(long)]
    exec: String,

    /// Period between background update checks
    #[arg(long, value_parser = humantime::parse_duration, default_value = "60s")]
    interval: Duration,

    /// Path probed on each child until it answers 200
    #[arg(long, default_value = "/heathz")]
    healthcheck: String,

    /// Wall-clock deadline for one health probe loop
    #[arg(long, value_parser = humantime::parse_duration, default_value = "30s")]
    health_timeout: Duration,

    /// Reverse proxy listen port
    #[arg(long, default_value = "8080")]
    port: u16,

    /// First reserved child slot port
    #[arg(long, default_value = "9101")]
    child_port1: u16,

    /// Second reserved child slot port
    #[arg(long, default_value = "9102")]
    child_port2: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = Config::new(args.pull, args.id, args.exec)
        .with_interval(args.interval)
        .with_healthcheck_path(args.healthcheck)
        .with_health_timeout(args.health_timeout)
        .with_listen_port(args.port)
        .with_child_ports(args.child_port1, args.child_port2);

    tracing::info!(
        listen_port = config.listen_port,
        child_port1 = config.child_port1,
        child_port2 = config.child_port2,
        interval = ?config.interval,
        "starting rollgate"
    );

    Supervisor::new(config).run().await?;
    Ok(())
}

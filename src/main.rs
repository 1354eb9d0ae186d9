use anyhow::Context;
use clap::Parser;
use docpipe::{api, config, engine::ExecutionEngine, logging};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Pipeline operator engine for document intelligence workloads.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Port to bind; falls back to SERVER_PORT, then the 7400-7499 range.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    config::init_config();
    logging::init_tracing();
    let app = api::create_router(Arc::new(ExecutionEngine::from_config()));

    let (listener, port) = bind_listener(args.port)
        .await
        .context("Failed to bind listener")?;
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app)
        .await
        .context("Server terminated unexpectedly")?;
    Ok(())
}

async fn bind_listener(override_port: Option<u16>) -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    let configured = override_port.or_else(|| config::get_config().server_port);
    if let Some(port) = configured {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 7400..=7499;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 7400-7499",
    ))
}

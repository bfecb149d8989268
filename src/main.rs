//! Demo web service.
//!
//! Serves health and admin routes, a few demo routes and a relay that
//! forwards `/relay/{*path}` to the configured upstream through a
//! [`Client`].

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, Method};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::Router;
use clap::Parser;

use webservice::client::Context;
use webservice::config::{load_config, ServiceConfig};
use webservice::observability::logging::init_logging;
use webservice::observability::metrics;
use webservice::{Client, HttpError, Server};

#[derive(Parser)]
#[command(name = "webservice")]
#[command(about = "Demo web service", long_about = None)]
struct Args {
    /// TOML configuration file; defaults apply when absent.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ServiceConfig::default(),
    };

    init_logging(&config.observability.logging)?;

    tracing::info!(
        bind_address = %config.server.bind_address,
        access_log = config.access_log.enabled,
        gzip = config.compression.gzip,
        upstream = %config.client.base_url,
        "Configuration loaded"
    );

    let register = if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
        Some(metrics::register())
    } else {
        None
    };

    let upstream = Client::with_options(
        config.client.base_url.clone(),
        config.client.client_options()?,
    )?;

    let prefix = config.server.route_prefix.clone();
    let mut server = Server::new(
        config.server.bind_address.clone(),
        config.server_options(register),
    );
    server
        .register_health_routes(&prefix)
        .register_admin_routes(&prefix)
        .route("/panic", get(panic_handler))
        .route("/errors/{code}", get(error_handler))
        .merge(
            Router::new()
                .route("/relay/{*path}", any(relay_handler))
                .with_state(upstream),
        );

    let handle = server.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            handle.stop();
        }
    });

    server.start().await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn panic_handler() -> &'static str {
    panic!("panic handler reached")
}

async fn error_handler(Path(code): Path<u16>) -> HttpError {
    HttpError::msg(code, format!("requested error {code}"))
}

async fn relay_handler(
    State(client): State<Client>,
    method: Method,
    Path(path): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, HttpError> {
    let mut requester = client.new_request([]);
    if let Some(content_type) = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
    {
        requester = requester.with_unique_header("Content-Type", content_type);
    }

    let (status, body) = requester
        .send(&Context::background(), method, &format!("/{path}"), body)
        .await
        .map_err(|e| HttpError::new(502, e))?;

    Ok((status, body).into_response())
}

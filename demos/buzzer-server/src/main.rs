//! Standalone buzzer quiz server.
//!
//! Run with: `cargo run -p buzzer-server`
//!
//! Environment:
//! - `BUZZLINE_BIND`: listen address (default `0.0.0.0:8080`)
//! - `RUST_LOG`: log filter (default `info`)
//!
//! Ctrl-C closes every room before exiting, so connected players see
//! `roomClosed` instead of a dropped socket.

use buzzline::prelude::*;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing("info");

    let bind = std::env::var("BUZZLINE_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    let server = BuzzlineServer::builder().bind(&bind).build().await?;
    tracing::info!(addr = %server.local_addr()?, "buzzer server listening");

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await?;
    Ok(())
}

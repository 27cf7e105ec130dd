//! Liveness endpoint.
//!
//! Some hosting platforms only keep a service alive if it binds the port
//! they assign in `PORT`. The bot itself only makes outbound requests, so
//! this serves a single `GET /` from its own thread and runtime.

use std::net::{SocketAddr, TcpListener};
use std::thread::{self, JoinHandle};

use axum::{Router, routing::get};

use crate::logging::{self, Component};

pub const HEALTH_BODY: &str = "Bot is running!";

pub fn router() -> Router {
    Router::new().route("/", get(health_check))
}

async fn health_check() -> &'static str {
    HEALTH_BODY
}

/// Binds `addr` now, so a taken port fails startup, then serves on a
/// background thread. Returns the bound address (useful with port 0).
pub fn spawn_health_server(addr: SocketAddr) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind(addr)?;
    listener.set_nonblocking(true)?;
    let local_addr = listener.local_addr()?;

    let handle = thread::Builder::new()
        .name("health".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    logging::error(
                        Component::System,
                        None,
                        &format!("health runtime failed: {}", e),
                    );
                    return;
                }
            };

            runtime.block_on(async move {
                let listener = match tokio::net::TcpListener::from_std(listener) {
                    Ok(l) => l,
                    Err(e) => {
                        logging::error(Component::System, None, &format!("health listener: {}", e));
                        return;
                    }
                };
                logging::info(
                    Component::System,
                    None,
                    &format!("Health endpoint listening on {}", local_addr),
                );
                if let Err(e) = axum::serve(listener, router()).await {
                    logging::error(Component::System, None, &format!("health server stopped: {}", e));
                }
            });
        })?;

    Ok((local_addr, handle))
}

pub mod adapters;
pub mod analytics;
mod app;
pub mod auth;
pub mod config;
pub mod notify;
pub mod nudge;
pub mod ports;
pub mod push;
pub mod receiver;
pub mod state;
pub mod store;
pub mod sync;
pub mod types;

pub use app::app;
pub use push::{VapidCredentials, generate_vapid_credentials};

use std::net::SocketAddr;

pub async fn serve(addr: SocketAddr, config: config::AppConfig) {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app(config)).await.expect("server error");
}

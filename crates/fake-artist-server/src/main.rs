mod client;
mod room;
mod state;

use anyhow::Context;
use state::ServerState;
use tokio::net::TcpListener;

const VERSION: &str = fake_artist_lib::net::client::PROTOCOL_VERSION;
const DEFAULT_PORT: u16 = 42932;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();

    tracing::info!("Server Version: {}", crate::VERSION);

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;
    tracing::info!("Listening on port {port}");

    serve(listener, ServerState::default()).await;
    Ok(())
}

async fn serve(listener: TcpListener, state: ServerState) {
    loop {
        let socket = match listener.accept().await {
            Ok((socket, addr)) => {
                tracing::debug!("Accepted connection from {addr}");
                socket
            }
            Err(e) => {
                tracing::error!("Failed to accept connection: {e}");
                continue;
            }
        };

        tokio::spawn(client::handle_new_connection(state.clone(), socket));
    }
}

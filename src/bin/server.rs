use std::net::SocketAddr;
use std::sync::Arc;

use log::{error, info, warn};
use warp::{self, Filter};

use nimbus::config::{Persistence, ServerConfig};
use nimbus::core::address::resolve_address;
use nimbus::core::state::{ServerState, SharedState};
use nimbus::handlers::websocket::handle_ws_client;
use nimbus::security::AllowAll;
use nimbus::storage::{MemorySnapshotStore, NullSnapshotStore, SnapshotStore};

#[tokio::main]
async fn main() {
    // Initialize env
    match dotenvy::dotenv() {
        Ok(_) => info!("Environment variables loaded from .env file"),
        Err(e) => warn!("No .env file loaded: {}", e),
    };

    // Initialize logging
    env_logger::init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Configuration: host={}, port={}, buffer_sends={}/s, persistence={:?}",
        config.host, config.port, config.buffer_sends, config.persistence
    );

    let store: Arc<dyn SnapshotStore> = match config.persistence {
        Persistence::None => Arc::new(NullSnapshotStore),
        Persistence::Memory => Arc::new(MemorySnapshotStore::new()),
    };

    let state = ServerState::new(config, store, Arc::new(AllowAll));
    state.start();
    info!(
        "Content filter loaded: {} phrases from {} lists",
        state.filter.phrase_count(),
        state.filter.list_count()
    );

    // WebSocket route at the server root
    let ws_route = warp::path::end()
        .and(warp::ws())
        .and(warp::addr::remote())
        .and(warp::header::optional::<String>("x-forwarded-for"))
        .and(with_state(state.clone()))
        .map(
            |ws: warp::ws::Ws,
             remote: Option<SocketAddr>,
             forwarded_for: Option<String>,
             state: SharedState| {
                let addr = resolve_address(remote, forwarded_for.as_deref(), &state.config);
                ws.on_upgrade(move |socket| handle_ws_client(socket, addr, state))
            },
        );

    // Health check route
    let health_route = warp::path("health").map(|| "OK");

    let routes = ws_route.or(health_route);

    let addr: SocketAddr = match format!("{}:{}", state.config.host, state.config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Failed to parse server address: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting nimbus server on {}", addr);
    warp::serve(routes).run(addr).await;
}

// Helper function to include server state in requests
fn with_state(
    state: SharedState,
) -> impl Filter<Extract = (SharedState,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || state.clone())
}

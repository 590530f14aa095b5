use std::sync::Arc;

use signal_relay::config::RelayConfig;
use signal_relay::filter::AllowSet;
use signal_relay::forward::InboxForwarder;
use signal_relay::poller::{Poller, spawn_poller};
use signal_relay::routes::{AppState, relay_routes};
use signal_relay::transport::{HttpTransport, Transport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // Unrecoverable: missing credentials must abort before anything starts.
    let config = RelayConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    eprintln!("📨 Signal Relay v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Backend: {}", config.backend_base);
    eprintln!("   Number: {}", config.number);
    eprintln!("   HTTP: http://{}/notify", config.bind_addr);
    if config.allow_senders.is_empty() {
        eprintln!("   Allowed senders: everyone");
    } else {
        eprintln!("   Allowed senders: {}", config.allow_senders.join(", "));
    }

    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(
        config.backend_base.clone(),
        config.number.clone(),
    ));

    // Start the inbound poll loop deterministically at process init, once.
    if config.forward_enabled {
        let forwarder = InboxForwarder::new(config.inbox_url.clone(), config.inbox_token.clone());
        let poller = Poller::new(
            Arc::clone(&transport),
            forwarder,
            AllowSet::new(config.allow_senders.clone()),
            config.receive_timeout_secs,
            config.forward_enabled,
        );
        let _poller = spawn_poller(poller);
        eprintln!("   Inbound forwarder running → {}", config.inbox_url);
    } else {
        eprintln!("   Inbound forwarder disabled");
    }

    let state = AppState {
        transport,
        gateway_token: config.gateway_token.clone(),
    };
    let app = relay_routes(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "HTTP front listening");
    axum::serve(listener, app).await?;

    Ok(())
}

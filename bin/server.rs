// Claims Ledger - Web Server
// REST API with Axum over the configured store

use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use claims_ledger::{api, Ledger, LedgerConfig};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("🌐 Claims Ledger - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = match LedgerConfig::load() {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("STARTUP_ERROR {}", err);
            std::process::exit(1);
        }
    };

    let ledger = match Ledger::from_config(&config) {
        Ok(ledger) => ledger,
        Err(err) => {
            eprintln!("STARTUP_ERROR ERR_STORE_OPEN {:#}", err);
            std::process::exit(1);
        }
    };
    println!("✓ Store opened: {}", config.data_path.display());

    let app = api::router(Arc::new(ledger));

    let listener = match tokio::net::TcpListener::bind(config.bind_addr).await {
        Ok(listener) => listener,
        Err(_) => {
            eprintln!("STARTUP_ERROR ERR_BIND_FAILED failed to bind {}", config.bind_addr);
            std::process::exit(1);
        }
    };

    tracing::info!(bind_addr = %config.bind_addr, "claims-server listening");
    println!("\n🚀 Server running on http://{}", config.bind_addr);
    println!("   API: http://{}/api/customers/<account_id>", config.bind_addr);
    println!("\n   Press Ctrl+C to stop\n");

    if let Err(err) = axum::serve(listener, app).await {
        eprintln!("STARTUP_ERROR ERR_SERVER_FAILED {}", err);
        std::process::exit(1);
    }
}

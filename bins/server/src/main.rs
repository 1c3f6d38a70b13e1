//! Ledgerline Server
//!
//! Runs the push endpoint, the outbox dispatcher, and the direct processor
//! in one process. Each loop can be switched off in configuration.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ledgerline_api::{AppState, create_router};
use ledgerline_db::{
    BusinessRepository, CompensationRequestWriter, OutboxRepository, PgTenantLease,
    PostingService, connect, default_routines, posting_settings, publish_policy, retry_policy,
};
use ledgerline_shared::AppConfig;
use ledgerline_worker::{DirectProcessor, EventPublisher, HttpPublisher, NoopPublisher, OutboxDispatcher};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ledgerline=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = AppConfig::load().context("Failed to load configuration")?;
    let instance_id = config.instance_id();

    // Connect to database
    let db = connect(&config.database).await?;
    info!("Connected to database");

    // Every reference type must have a routine before we accept events
    let routines = default_routines(BusinessRepository::new(db.clone()));
    routines.validate()?;

    let outbox = OutboxRepository::with_policies(
        db.clone(),
        publish_policy(&config),
        retry_policy(&config),
    );
    let mut posting = PostingService::new(
        db.clone(),
        Arc::new(routines),
        outbox.clone(),
        posting_settings(&config),
    )
    .with_compensator(Arc::new(CompensationRequestWriter::new(db.clone())));
    if config.lock.lease_enabled {
        posting = posting.with_lease(Arc::new(PgTenantLease::new(
            db.clone(),
            instance_id.clone(),
            Duration::from_secs(config.lock.lease_ttl_secs),
        )));
        info!(holder = %instance_id, "Tenant leases enabled");
    }

    let cancel = CancellationToken::new();
    let mut workers = Vec::new();

    if config.outbox.enabled {
        let publisher: Arc<dyn EventPublisher> = match HttpPublisher::from_config(&config.channel)? {
            Some(publisher) => Arc::new(publisher),
            None => {
                info!("No delivery channel configured, records are posted by the direct processor");
                Arc::new(NoopPublisher)
            }
        };
        let dispatcher = OutboxDispatcher::new(
            outbox.clone(),
            publisher,
            config.channel.subscription.clone(),
            &config.outbox,
        );
        workers.push(tokio::spawn(dispatcher.run(cancel.child_token())));
    }

    if config.processor.enabled {
        let processor = DirectProcessor::new(posting.clone(), &config.processor);
        workers.push(tokio::spawn(processor.run(cancel.child_token())));
    }

    // Create application state
    let state = AppState { posting, db };

    // Create router
    let app = create_router(state);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(instance_id = %instance_id, "Server listening on {}", addr);

    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown.cancel();
        })
        .await?;

    // The server may also stop on its own; make sure the loops follow.
    cancel.cancel();
    for worker in workers {
        worker.await?;
    }
    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received, draining workers");
}

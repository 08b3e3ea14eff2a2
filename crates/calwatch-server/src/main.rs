use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use calwatch_auth::{AccessTokenProvider, ServiceAccountTokenProvider};
use calwatch_calendar::{CalendarClient, DirectoryClient, DirectoryTarget};
use calwatch_core::Config;
use calwatch_server::{build_router, AppState};
use calwatch_services::{
    spawn_observer, Bootstrap, ChannelStore, DedupCache, EventBus, EventObserver, LeaseManager,
    LeaseSettings, LoggingObserver, MeetingLinkObserver, SqliteChannelStore, SyncEngine,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

fn directory_target(config: &Config) -> Result<DirectoryTarget> {
    match (&config.google.domain, &config.google.customer) {
        (Some(domain), _) => Ok(DirectoryTarget::Domain(domain.clone())),
        (None, Some(customer)) => Ok(DirectoryTarget::Customer(customer.clone())),
        (None, None) => anyhow::bail!("google.domain or google.customer must be set"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    calwatch_core::init()?;

    let (config, _) = Config::load_validated()?;

    let store: Arc<dyn ChannelStore> = Arc::new(
        SqliteChannelStore::open(&config.database.path).with_context(|| {
            format!("Failed to open channel store {}", config.database.path.display())
        })?,
    );

    let tokens: Arc<dyn AccessTokenProvider> = Arc::new(
        ServiceAccountTokenProvider::from_key_file(
            &config.google.service_account_key,
            config.google.admin_subject.clone(),
        )
        .context("Failed to load service account key")?,
    );
    let calendar = Arc::new(CalendarClient::with_base_url(
        tokens.clone(),
        &config.google.calendar_api_base,
    ));
    let directory = Arc::new(DirectoryClient::with_base_url(
        tokens,
        directory_target(&config)?,
        &config.google.directory_api_base,
    ));

    let lease = Arc::new(LeaseManager::new(
        calendar.clone(),
        directory.clone(),
        store.clone(),
        LeaseSettings::from_config(&config),
    ));
    let engine = Arc::new(SyncEngine::new(
        calendar.clone(),
        store,
        DedupCache::new(Duration::from_secs(config.dedup.ttl_secs)),
        EventBus::default(),
    ));

    let shutdown = CancellationToken::new();
    let mut observers: Vec<Arc<dyn EventObserver>> = vec![Arc::new(LoggingObserver)];
    if let Some(meeting_links) = config.meeting_links.clone() {
        observers.push(Arc::new(MeetingLinkObserver::new(calendar, meeting_links)));
    }
    for observer in observers {
        spawn_observer(observer, engine.bus(), shutdown.child_token());
    }

    let bootstrap = Bootstrap::new(
        lease.clone(),
        directory,
        config.accounts.whitelist.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = bootstrap.run().await {
            error!(error = %e, "Bootstrap failed");
        }
    });

    let app = build_router(AppState::new(engine, lease.clone()));
    let addr = format!("{}:{}", config.server.bind_address, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("calwatch listening on http://{}", addr);

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutting down");
            signal.cancel();
        })
        .await?;

    lease.shutdown();
    Ok(())
}

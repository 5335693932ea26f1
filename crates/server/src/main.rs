use color_eyre::eyre::WrapErr;
use mail_relay::AppResources;
use mail_relay::api::start_webserver;
use mail_relay::config::load_config_or_panic;
use mail_relay::dispatch::{Dispatcher, TriggerWatcher, spawn_reconcile_task};
use mail_relay::{store, transport};
use rustls::crypto;
use rustls::crypto::CryptoProvider;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn initialize_tracing() {
    let default_directives = "mail_relay=info,hyper=warn,sea_orm=info";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    let registry = tracing_subscriber::registry().with(env_filter);
    let layer = fmt::layer().with_target(true).with_level(true);

    registry.with(layer).init();
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    initialize_tracing();

    let config = Arc::new(load_config_or_panic());

    // lettre's rustls backend needs a process-wide provider.
    let ring_provider = crypto::ring::default_provider();
    if CryptoProvider::install_default(ring_provider).is_err() {
        tracing::warn!("A rustls crypto provider was already installed");
    }

    let store = store::connect(&config.database_url)
        .await
        .wrap_err("Failed to connect to database")?;
    let mailer = transport::from_config(&config.smtp);

    let dispatcher = Arc::new(Dispatcher::new(store.clone(), mailer.clone()));
    let _watcher =
        TriggerWatcher::new(store.clone(), dispatcher.clone(), config.dispatcher.clone()).spawn();
    if spawn_reconcile_task(store.clone(), dispatcher, config.reconcile.clone()).is_none() {
        tracing::info!("Reconcile sweep disabled");
    }

    tracing::info!(
        transport = mailer.name(),
        sender = %mailer.sender(),
        poll_interval_ms = config.dispatcher.poll_interval_ms,
        timeout_secs = config.dispatcher.timeout_secs,
        reconcile = config.reconcile.enabled,
        "mail relay configuration"
    );

    let resources = AppResources {
        store,
        mailer,
        config,
    };
    start_webserver(resources).await?;
    Ok(())
}

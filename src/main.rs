use {
    sqlx::postgres::PgPoolOptions,
    std::{sync::Arc, time::Duration},
    storefront_checkout::{
        AppState,
        adapters::{
            crm_client::HttpCrmClient, license_client::HttpLicenseService,
            ops_alert::WebhookAlerter, stripe_client::StripeProvider,
        },
        config::AppConfig,
        domain::{provider::CouponStore, store::CheckoutStore},
        infra::{
            catalog::{CatalogCouponStore, load_catalog},
            memory::MemoryStore,
            postgres::PgStore,
        },
        services::{
            checkout::{CheckoutBuilder, CheckoutSettings},
            coupon::CouponResolver,
            fulfillment::{Fulfillment, FulfillmentSettings},
            retry::RetryConfig,
            sweeper::run_session_sweeper,
        },
    },
    tokio::{signal, sync::watch},
    tracing_subscriber::EnvFilter,
};

const PROVIDER_TIMEOUT: Duration = Duration::from_secs(15);
const ALERT_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env().expect("invalid configuration");

    let store: Arc<dyn CheckoutStore> = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(20)
                .acquire_timeout(Duration::from_secs(3))
                .connect(url)
                .await
                .expect("failed to connect to database");
            sqlx::migrate!()
                .run(&pool)
                .await
                .expect("failed to run migrations");
            Arc::new(PgStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let catalog = Arc::new(load_catalog(&config.offer_catalog_path).expect("failed to load offer catalog"));
    let stripe = Arc::new(StripeProvider::new(
        &config.stripe_secret_key,
        config.stripe_live_secret_key.as_deref(),
    ));
    let coupon_stores: Vec<Arc<dyn CouponStore>> = vec![
        stripe.clone(),
        Arc::new(CatalogCouponStore::new(catalog.clone())),
    ];
    let coupons = Arc::new(CouponResolver::new(coupon_stores));

    let checkout = Arc::new(CheckoutBuilder::new(
        catalog.clone(),
        stripe,
        coupons.clone(),
        store.clone(),
        CheckoutSettings {
            base_url: config.public_base_url.clone(),
            provider_timeout: PROVIDER_TIMEOUT,
        },
    ));

    let licenses = HttpLicenseService::new(
        config.license_service_url.as_deref(),
        config.license_service_token.as_deref(),
        config.license_timeout,
    )
    .expect("failed to build license client");
    let crm = HttpCrmClient::new(config.crm.clone(), config.crm_timeout)
        .expect("failed to build crm client");
    let alerter = WebhookAlerter::new(config.ops_alert_webhook_url.clone(), ALERT_TIMEOUT)
        .expect("failed to build alert client");

    let fulfillment = Arc::new(Fulfillment::new(
        catalog,
        store.clone(),
        Arc::new(licenses),
        Arc::new(crm),
        Arc::new(alerter),
        FulfillmentSettings {
            license_timeout: config.license_timeout,
            crm_timeout: config.crm_timeout,
            crm_budget: config.crm_budget,
            alert_timeout: ALERT_TIMEOUT,
            crm_retry: RetryConfig {
                base_delay: config.crm_retry_base,
                ..RetryConfig::default()
            },
            ..FulfillmentSettings::default()
        },
    ));

    let state = AppState {
        checkout,
        fulfillment,
        coupons,
        store: store.clone(),
        webhook_secrets: config.webhook_secrets.clone().into(),
        stale_ttl: config.stale_session_ttl,
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = tokio::spawn(run_session_sweeper(
        store,
        config.stale_session_ttl,
        config.sweep_interval,
        shutdown_rx,
    ));

    let app = storefront_checkout::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("failed to bind");
    tracing::info!("listening on {}", config.bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    let _ = shutdown_tx.send(true);
    let _ = sweeper.await;
    tracing::info!("shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to listen for ctrl+c");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl+c, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

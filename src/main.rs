mod app_state;
mod config;
mod db;
mod error;
mod handlers;
mod loyalty;
mod pass;
mod wallet;

use axum::{
    routing::{get, post},
    Router,
};
use clap::Parser;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use app_state::AppState;
use config::Config;
use db::{init_pool, repository::SqliteCardStore};
use handlers::{cards, merchants, passes, redeem, wallet as wallet_handlers};
use loyalty::{LoyaltyService, codes::RandomCodeGenerator};
use pass::{
    PassIdentity, PassPipeline,
    packager::ZipPackager,
    signer::{OpensslSigner, SigningPaths},
};
use wallet::{HttpWalletBackend, WalletIds, WalletObjectSynchronizer, notify::NotificationPolicy};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "loyalty_pass_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse configuration
    let config = Arc::new(Config::parse());

    // Initialize database
    let pool = init_pool(&config.database_url).await?;
    let store = Arc::new(SqliteCardStore::new(pool.clone()));

    let loyalty = LoyaltyService::new(
        store.clone(),
        store,
        Arc::new(RandomCodeGenerator),
        config.stamp_cooldown(),
    );

    // Pass pipeline: openssl for the signature, zip for the archive
    let passes = PassPipeline::new(
        PassIdentity {
            pass_type_identifier: config.pass_type_identifier.clone(),
            team_identifier: config.team_identifier.clone(),
            organization_name: config.organization_name.clone(),
        },
        SigningPaths {
            key: config.signing_key.clone(),
            certificate: config.signing_cert.clone(),
            chain: config.signing_chain.clone(),
            key_passphrase: config.signing_key_passphrase.clone(),
        },
        config.assets_dir.clone(),
        Arc::new(OpensslSigner::new(
            config.openssl_bin.clone(),
            config.tool_timeout(),
            config.scratch_dir.clone(),
        )),
        Arc::new(ZipPackager::new(
            config.zip_bin.clone(),
            config.tool_timeout(),
            config.scratch_dir.clone(),
        )),
    );

    // Wallet backend client, built once and shared
    let wallet = WalletObjectSynchronizer::new(
        Arc::new(HttpWalletBackend::new(
            config.wallet_base_url.clone(),
            config.wallet_access_token.clone(),
        )),
        WalletIds::new(config.wallet_issuer_id.clone(), config.wallet_class_prefix.clone()),
        config.wallet_issuer_name.clone(),
        config.wallet_program_logo_url.clone(),
        config.wallet_force_patch_class,
    );

    // Create shared state
    let state = AppState {
        pool,
        config: config.clone(),
        loyalty,
        passes: Arc::new(passes),
        wallet: Arc::new(wallet),
        notifications: NotificationPolicy {
            quota_per_day: config.notification_quota,
            dedupe_window: config.notification_dedupe_window(),
        },
    };

    // Build router
    let app = Router::new()
        // Merchant and card endpoints
        .route("/api/merchants", post(merchants::create_merchant))
        .route("/api/merchants/{merchant_id}/cards", post(cards::enroll_card))
        .route("/api/cards/{card_id}/stamps", post(cards::add_stamps))
        .route("/api/cards/{card_id}/coupons", post(cards::issue_coupon))
        .route("/api/merchants/{merchant_id}/redeem", post(redeem::redeem_code))
        // Pass and wallet endpoints
        .route("/api/cards/{card_id}/pass", get(passes::download_pass))
        .route("/api/cards/{card_id}/wallet", post(wallet_handlers::sync_card))
        .route(
            "/api/merchants/{merchant_id}/wallet/sync",
            post(wallet_handlers::sync_merchant),
        )
        .route(
            "/api/wallet/objects/{object_id}/notifications/check",
            post(wallet_handlers::check_notification),
        )
        // Add middleware
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
        )
        // Add shared state
        .with_state(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.socket_addr()).await?;

    tracing::info!("Server running on {}", config.socket_addr());
    tracing::info!("Pass type: {}", config.pass_type_identifier);
    tracing::info!("Wallet issuer: {}", config.wallet_issuer_id);

    axum::serve(listener, app).await?;

    Ok(())
}

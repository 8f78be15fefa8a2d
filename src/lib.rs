//! Bakery storefront backend.
//!
//! JSON API behind a static storefront: Stripe checkout sessions, promo code
//! validation, shipping quotes, and a payment webhook that books slots in the
//! weekly shipping schedule. Boxes go out on Wednesdays; each week has a
//! capacity counter in Redis (see [`shipping`] and [`database`]).
use std::time::Duration;

use axum::{
    http::{header::CONTENT_TYPE, Method},
    routing::post,
    Router,
};
use tokio::{net::TcpListener, signal};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

pub mod catalog;
pub mod config;
pub mod database;
pub mod error;
pub mod routes;
pub mod shipping;
pub mod state;
pub mod stripe;

use routes::{
    create_checkout_handler, payment_webhook_handler, shipping_info_handler,
    validate_promo_handler,
};
use state::AppState;

pub async fn start_server() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = AppState::new().await;

    info!("Starting server...");

    let cors = CorsLayer::new()
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    let app = Router::new()
        .route("/create-checkout-session", post(create_checkout_handler))
        .route("/get-shipping-info", post(shipping_info_handler))
        .route("/validate-promo-code", post(validate_promo_handler))
        .route("/payment-webhook", post(payment_webhook_handler))
        .layer(cors)
        .with_state(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await.unwrap();
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    println!("Server shutting down...");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

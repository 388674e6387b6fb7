use actix_cors::Cors;
use actix_governor::{Governor, GovernorConfigBuilder};
use actix_web::{web, App, HttpServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use arbiter_service::config::ServiceConfig;
use arbiter_service::routes;
use arbiter_service::state::ChainLedger;

fn build_cors(origins: &[String]) -> Cors {
    if origins.is_empty() {
        // Default: allow localhost on any port
        Cors::default()
            .allowed_origin_fn(|origin, _| {
                origin
                    .to_str()
                    .map(|o| o == "http://localhost" || o.starts_with("http://localhost:"))
                    .unwrap_or(false)
            })
            .allowed_methods(vec!["GET", "POST"])
            .allowed_headers(vec!["content-type", "authorization"])
            .max_age(3600)
    } else {
        let mut cors = Cors::default();
        for origin in origins {
            cors = cors.allowed_origin(origin);
        }
        cors.allowed_methods(vec!["GET", "POST"])
            .allowed_headers(vec!["content-type", "authorization"])
            .max_age(3600)
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match ServiceConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };
    tracing::debug!(?config, "loaded configuration");

    let state = match arbiter_service::bootstrap::bootstrap(&config) {
        Ok(s) => web::Data::new(s),
        Err(e) => {
            tracing::error!("Refusing to start: {e}");
            std::process::exit(1);
        }
    };

    let governor_conf = match GovernorConfigBuilder::default()
        .requests_per_minute(config.rate_limit_rpm)
        .finish()
    {
        Some(c) => c,
        None => {
            tracing::error!("Invalid RATE_LIMIT_RPM: {}", config.rate_limit_rpm);
            std::process::exit(1);
        }
    };

    let port = config.port;
    let cors_origins = config.allowed_origins.clone();

    tracing::info!("Force-payment arbiter listening on port {port}");
    tracing::info!("Network: {}", state.arbiter.config().network);
    tracing::info!("Rate limit: {} req/min per IP", config.rate_limit_rpm);
    tracing::info!("  GET  http://localhost:{port}/info");
    tracing::info!("  POST http://localhost:{port}/force-payment");
    tracing::info!("  POST http://localhost:{port}/receive");

    HttpServer::new(move || {
        App::new()
            .wrap(build_cors(&cors_origins))
            .wrap(Governor::new(&governor_conf))
            .app_data(state.clone())
            .app_data(web::PayloadConfig::new(1_048_576))
            .configure(routes::configure::<ChainLedger>)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}

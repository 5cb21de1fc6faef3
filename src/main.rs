use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Context;
use dotenv::dotenv;
use std::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use watchparty_server::config::CorsConfig;
use watchparty_server::{api_scope, health_check, AppState, Settings};

fn cors(config: &CorsConfig) -> Cors {
    if !config.enabled {
        return Cors::default();
    }

    // cookies are the credentials, so origins are echoed rather than wildcarded
    let cors = Cors::default()
        .allowed_methods(vec!["GET", "POST"])
        .allowed_headers(vec!["Content-Type"])
        .supports_credentials()
        .max_age(config.max_age as usize);

    if config.allowed_origins.is_empty() {
        cors.allow_any_origin()
    } else {
        config
            .allowed_origins
            .iter()
            .fold(cors, |cors, origin| cors.allowed_origin(origin))
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    let config = Settings::new().context("failed to load configuration")?;
    info!(environment = %config.environment, store = ?config.store.backend, "Configuration loaded");

    let state = AppState::new(config.clone())
        .await
        .context("failed to initialize application state")?;
    let data = web::Data::new(state.clone());

    let listener = TcpListener::bind(format!("{}:{}", config.server.host, config.server.port))
        .context("failed to bind listener")?;
    info!(
        "Listening on http://{}:{}{}",
        config.server.host, config.server.port, config.server.api_prefix
    );

    let server_config = config.clone();
    HttpServer::new(move || {
        App::new()
            .wrap(cors(&server_config.cors))
            .app_data(data.clone())
            .route("/health", web::get().to(health_check))
            .service(api_scope(&server_config.server.api_prefix))
    })
    .listen(listener)?
    .workers(config.server.workers as usize)
    .run()
    .await
    .context("server error")?;

    info!("Server stopped; shutting down event hub");
    state.shutdown().await?;
    Ok(())
}

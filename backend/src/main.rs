use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use civic_ml_service::config::Settings;
use civic_ml_service::models::{ModelCache, OnnxArtifactLoader};
use civic_ml_service::routes::configure_routes;
use civic_ml_service::AppState;
use std::env;
use std::sync::Arc;

fn build_cors(settings: &Settings) -> Cors {
    let cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "OPTIONS"])
        .allowed_headers(vec![
            actix_web::http::header::AUTHORIZATION,
            actix_web::http::header::ACCEPT,
            actix_web::http::header::CONTENT_TYPE,
        ])
        .max_age(3600);

    if settings.allows_any_origin() {
        cors.allow_any_origin()
    } else {
        settings
            .allowed_origins
            .iter()
            .fold(cors, |cors, origin| cors.allowed_origin(origin))
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let settings = Settings::load();
    let level = settings
        .as_ref()
        .map(|s| s.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(level));

    let settings = settings.map_err(|e| {
        log::error!("Invalid configuration: {}", e);
        std::io::Error::other(e.to_string())
    })?;

    log::info!("Starting Smart Civic ML Service");
    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    }

    let loader = Arc::new(OnnxArtifactLoader::from_settings(&settings));
    let models = Arc::new(ModelCache::new(loader));
    {
        let models = models.clone();
        if let Err(e) = web::block(move || models.preload()).await {
            log::error!("Critical startup error while loading models: {}", e);
        }
    }

    let bind_address = settings.bind_address();
    log::info!("Categories: {:?}", settings.categories);
    log::info!("Starting server on http://{}", bind_address);

    let state = web::Data::new(AppState::new(models, &settings));
    let cors_settings = settings.clone();

    let mut server = HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .wrap(build_cors(&cors_settings))
            .app_data(state.clone())
            .configure(configure_routes)
    });
    if let Some(workers) = settings.workers {
        server = server.workers(workers);
    }

    let result = server.bind(&bind_address)?.run().await;
    log::info!("Shutting down ML Service");
    result
}

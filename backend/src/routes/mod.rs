mod image;
mod text;

use actix_web::{HttpResponse, web};
use serde_json::json;
use shared::{API_VERSION, CategoriesResponse, HealthResponse, ModelInfo};

use crate::AppState;
use crate::error::json_error_handler;

pub use self::image::MAX_UPLOAD_BYTES;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error_handler))
        .service(web::resource("/").route(web::get().to(root)))
        .service(web::resource("/health").route(web::get().to(health)))
        .service(web::resource("/categories").route(web::get().to(categories)))
        .service(
            web::scope("/ml")
                .service(web::resource("/text/classify").route(web::post().to(text::classify_text)))
                .service(web::resource("/text/classify-batch").route(web::post().to(text::classify_batch)))
                .service(web::resource("/image/classify").route(web::post().to(image::classify_image)))
                .service(web::resource("/image/classify-top-k").route(web::post().to(image::classify_image_top_k))),
        );
}

async fn root() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "service": "Smart Civic ML Service",
        "status": "running",
        "version": API_VERSION,
        "endpoints": {
            "text_classification": "/ml/text/classify",
            "text_batch_classification": "/ml/text/classify-batch",
            "image_classification": "/ml/image/classify",
            "image_top_k": "/ml/image/classify-top-k",
            "categories": "/categories",
            "health": "/health"
        }
    }))
}

async fn health(state: web::Data<AppState>) -> HttpResponse {
    let status = state.models.status();
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        models: ModelInfo {
            text_model_loaded: status.text_classifier,
            image_model_loaded: status.image_classifier,
            embedder_loaded: status.embedder,
            label_encoder_loaded: status.label_encoder,
            categories: state.categories.clone(),
            image_size: state.image_size,
        },
        api_version: API_VERSION.to_string(),
    })
}

async fn categories(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(CategoriesResponse {
        categories: state.categories.clone(),
        count: state.categories.len(),
    })
}

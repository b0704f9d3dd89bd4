pub mod config;
pub mod error;
pub mod models;
pub mod preprocess;
pub mod routes;
pub mod services;

use std::sync::Arc;

use config::Settings;
use models::ModelCache;
use services::{ImageClassificationService, TextClassificationService};

/// Shared request state, built once and handed to every worker.
pub struct AppState {
    pub models: Arc<ModelCache>,
    pub text: TextClassificationService,
    pub image: ImageClassificationService,
    pub categories: Vec<String>,
    pub image_size: (u32, u32),
}

impl AppState {
    pub fn new(models: Arc<ModelCache>, settings: &Settings) -> Self {
        Self {
            text: TextClassificationService::new(
                models.clone(),
                settings.categories.clone(),
                settings.max_text_length,
            ),
            image: ImageClassificationService::new(
                models.clone(),
                settings.categories.clone(),
                settings.image_size,
            ),
            models,
            categories: settings.categories.clone(),
            image_size: settings.image_size,
        }
    }
}

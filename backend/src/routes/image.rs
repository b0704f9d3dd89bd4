use actix_multipart::Multipart;
use actix_web::{HttpResponse, web};
use futures::{StreamExt, TryStreamExt};
use shared::{ImageResponse, TopKResponse};
use std::collections::HashMap;

use crate::AppState;
use crate::error::ApiError;

pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
const MAX_FORM_VALUE_BYTES: usize = 1024;
const ALLOWED_CONTENT_TYPES: [&str; 3] = ["image/jpeg", "image/jpg", "image/png"];
const DEFAULT_TOP_K: usize = 2;

struct ImageForm {
    file: Option<Vec<u8>>,
    fields: HashMap<String, String>,
}

/// Reads the `file` part plus small text fields. The file's declared content
/// type is checked before its body is buffered.
async fn read_form(mut payload: Multipart) -> Result<ImageForm, ApiError> {
    let mut form = ImageForm {
        file: None,
        fields: HashMap::new(),
    };

    while let Some(mut field) = payload.try_next().await? {
        let name = field
            .content_disposition()
            .and_then(|cd| cd.get_name())
            .unwrap_or_default()
            .to_string();

        if name == "file" {
            let content_type = field.content_type().map(|m| m.essence_str().to_string());
            if !content_type
                .as_deref()
                .is_some_and(|ct| ALLOWED_CONTENT_TYPES.contains(&ct))
            {
                return Err(ApiError::BadRequest(format!(
                    "Invalid file type. Allowed: {}",
                    ALLOWED_CONTENT_TYPES.join(", ")
                )));
            }
            let filename = field
                .content_disposition()
                .and_then(|cd| cd.get_filename())
                .unwrap_or("<unnamed>")
                .to_string();
            log::info!("Received image: {} ({})", filename, content_type.unwrap_or_default());

            let mut bytes = Vec::new();
            while let Some(chunk) = field.next().await {
                let data = chunk?;
                if bytes.len() + data.len() > MAX_UPLOAD_BYTES {
                    return Err(ApiError::BadRequest("Image too large. Maximum size: 10MB".to_string()));
                }
                bytes.extend_from_slice(&data);
            }
            form.file = Some(bytes);
        } else {
            let mut value = Vec::new();
            while let Some(chunk) = field.next().await {
                let data = chunk?;
                if value.len() + data.len() > MAX_FORM_VALUE_BYTES {
                    return Err(ApiError::BadRequest(format!("Form field '{}' is too large", name)));
                }
                value.extend_from_slice(&data);
            }
            let value = String::from_utf8(value)
                .map_err(|_| ApiError::BadRequest(format!("Form field '{}' must be UTF-8 text", name)))?;
            form.fields.insert(name, value.trim().to_string());
        }
    }
    Ok(form)
}

impl ImageForm {
    fn take_file(&mut self) -> Result<Vec<u8>, ApiError> {
        self.file
            .take()
            .ok_or_else(|| ApiError::BadRequest("Missing 'file' field".to_string()))
    }
}

/// Form booleans: `true/false`, `1/0`, `yes/no`, `on/off`, any case.
pub fn parse_form_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_k(value: Option<&String>) -> Result<usize, ApiError> {
    let Some(raw) = value else {
        return Ok(DEFAULT_TOP_K);
    };
    match raw.parse::<usize>() {
        Ok(k) if (1..=4).contains(&k) => Ok(k),
        _ => Err(ApiError::BadRequest(format!("k must be an integer between 1 and 4, got '{}'", raw))),
    }
}

pub(super) async fn classify_image(
    state: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let mut form = read_form(payload).await?;
    let bytes = form.take_file()?;
    let enhance = match form.fields.get("enhance") {
        None => false,
        Some(raw) => parse_form_bool(raw)
            .ok_or_else(|| ApiError::BadRequest(format!("Invalid boolean for enhance: '{}'", raw)))?,
    };

    let prediction = web::block(move || state.image.predict(&bytes, enhance)).await??;
    Ok(HttpResponse::Ok().json(ImageResponse::from(prediction)))
}

pub(super) async fn classify_image_top_k(
    state: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let mut form = read_form(payload).await?;
    let bytes = form.take_file()?;
    let k = parse_k(form.fields.get("k"))?;
    log::info!("Received top-{} request", k);

    let top_k = web::block(move || state.image.predict_top_k(&bytes, k)).await??;
    Ok(HttpResponse::Ok().json(TopKResponse::from(top_k)))
}

use actix_web::{HttpResponse, web};
use shared::{BatchTextRequest, BatchTextResponse, TextRequest, TextResponse};

use crate::AppState;
use crate::error::ApiError;
use crate::services::MAX_BATCH_SIZE;

pub(super) async fn classify_text(
    state: web::Data<AppState>,
    body: web::Json<TextRequest>,
) -> Result<HttpResponse, ApiError> {
    log::info!("Received text classification request");
    let TextRequest { text } = body.into_inner();

    let prediction = web::block(move || state.text.predict(&text)).await??;
    Ok(HttpResponse::Ok().json(TextResponse::from(prediction)))
}

pub(super) async fn classify_batch(
    state: web::Data<AppState>,
    body: web::Json<BatchTextRequest>,
) -> Result<HttpResponse, ApiError> {
    let BatchTextRequest { texts } = body.into_inner();
    if texts.len() > MAX_BATCH_SIZE {
        return Err(ApiError::BadRequest(format!(
            "Maximum {} texts allowed per batch",
            MAX_BATCH_SIZE
        )));
    }
    log::info!("Received batch request with {} texts", texts.len());

    let results: Vec<TextResponse> = web::block(move || {
        state
            .text
            .batch_predict(&texts)
            .into_iter()
            .map(|r| r.map_or_else(TextResponse::from, TextResponse::from))
            .collect()
    })
    .await?;

    Ok(HttpResponse::Ok().json(BatchTextResponse {
        success: true,
        count: results.len(),
        results,
    }))
}

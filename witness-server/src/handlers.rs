use crate::error::{ServerError, ServerResult};
use crate::models::{
    CreatedResponse, DocumentResponse, FindMatchQuery, HealthResponse, MatchesResponse, SimilarQuery,
    SuccessResponse, UpdateCulpritRequest, UploadRequest, UploadResponse, UploadResult,
};
use crate::state::{AppState, REPORTS_COLLECTION};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use tracing::{debug, info, warn};
use witness_core::config::{DEFAULT_NUM_CANDIDATES, DEFAULT_NUM_RESULTS, DEFAULT_THRESHOLD};
use witness_core::{DocumentFilter, DocumentStore, IncidentReport, MatchOutcome, WitnessError};

/// Handler for `GET /health`
#[axum::debug_handler]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let store_open = state.store.is_open();
    let collections = state.store.stats().unwrap_or_default();
    let tag = state.reports.model_tag();
    Json(HealthResponse {
        status: if store_open { "ok" } else { "degraded" },
        store_open,
        model: tag.model.clone(),
        dimensions: tag.dimensions,
        collections,
    })
}

/// Handler for `POST /reports`
/// Stores an incident report with the embedding of its culprit description.
#[axum::debug_handler]
pub async fn create_report(
    State(state): State<AppState>,
    Json(report): Json<IncidentReport>,
) -> ServerResult<(StatusCode, Json<CreatedResponse>)> {
    if report.culprit.trim().is_empty() {
        return Err(ServerError::BadRequest("culprit must not be empty".to_string()));
    }
    info!(location = %report.location, severity = %report.severity, "Received incident report");

    let culprit = report.culprit.clone();
    let id = state.reports.embed_and_store(&culprit, report.into_fields()).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreatedResponse { id, message: "Report stored".to_string() }),
    ))
}

/// Handler for `GET /reports/:id`
#[axum::debug_handler]
pub async fn get_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ServerResult<Json<DocumentResponse>> {
    debug!(report_id = %id, "Fetching report");
    let document = state
        .store
        .get(REPORTS_COLLECTION, &id)
        .await?
        .ok_or(WitnessError::NotFound(id))?;
    Ok(Json(document.into()))
}

/// Handler for `DELETE /reports/:id`
#[axum::debug_handler]
pub async fn delete_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ServerResult<Json<SuccessResponse>> {
    if !state.store.delete_one(REPORTS_COLLECTION, &id).await? {
        return Err(WitnessError::NotFound(id).into());
    }
    info!(report_id = %id, "Deleted report");
    Ok(Json(SuccessResponse { message: format!("Report '{}' deleted", id) }))
}

/// Handler for `PUT /reports/:id/culprit`
/// Replaces the culprit description and re-embeds it.
#[axum::debug_handler]
pub async fn update_culprit(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateCulpritRequest>,
) -> ServerResult<Json<DocumentResponse>> {
    if payload.culprit.trim().is_empty() {
        return Err(ServerError::BadRequest("culprit must not be empty".to_string()));
    }
    let document = state.reports.update_text(&id, &payload.culprit).await?;
    Ok(Json(document.into()))
}

/// Handler for `GET /reports/similar`
/// Reports whose culprit description resembles `query`, best first.
#[axum::debug_handler]
pub async fn similar_reports(
    State(state): State<AppState>,
    Query(params): Query<SimilarQuery>,
) -> ServerResult<Json<MatchesResponse>> {
    let threshold = params.threshold.unwrap_or(DEFAULT_THRESHOLD);
    debug!(threshold, limit = ?params.limit, "Searching similar reports");
    validate_limit(params.limit)?;
    let outcome = state.reports.find_similar(&params.query, threshold).await?;
    matches_response(outcome, params.limit)
}

/// Handler for `GET /find-match`
/// Nearest documents by the vector index, without a threshold.
#[axum::debug_handler]
pub async fn find_match(
    State(state): State<AppState>,
    Query(params): Query<FindMatchQuery>,
) -> ServerResult<Json<MatchesResponse>> {
    let collection = params.collection.as_deref().unwrap_or(REPORTS_COLLECTION);
    let matcher = state
        .matcher_for(collection)
        .ok_or_else(|| WitnessError::IndexNotFound(collection.to_string()))?;
    let num_results = params.num_results.unwrap_or(DEFAULT_NUM_RESULTS);
    let num_candidates = params.num_candidates.unwrap_or(DEFAULT_NUM_CANDIDATES.max(num_results));
    let outcome = matcher.find_top_matches(&params.info, num_results, num_candidates).await?;
    matches_response(outcome, None)
}

/// Handler for `POST /documents`
/// Embeds and stores each uploaded file; failures are reported per file.
#[axum::debug_handler]
pub async fn upload_documents(
    State(state): State<AppState>,
    Json(payload): Json<UploadRequest>,
) -> ServerResult<Json<UploadResponse>> {
    if payload.files.is_empty() {
        return Err(ServerError::BadRequest("No files provided".to_string()));
    }
    info!(count = payload.files.len(), "Received file upload");

    let results: Vec<UploadResult> = state
        .documents
        .ingest_files(payload.files)
        .await
        .into_iter()
        .map(|(filename, outcome)| match outcome {
            Ok(id) => UploadResult { filename, id: Some(id), error: None },
            Err(e) => {
                warn!(filename = %filename, error = %e, "File not stored");
                UploadResult { filename, id: None, error: Some(e.to_string()) }
            }
        })
        .collect();

    let stored = results.iter().filter(|r| r.id.is_some()).count();
    Ok(Json(UploadResponse { stored, failed: results.len() - stored, results }))
}

/// Handler for `GET /documents/similar`
#[axum::debug_handler]
pub async fn similar_documents(
    State(state): State<AppState>,
    Query(params): Query<SimilarQuery>,
) -> ServerResult<Json<MatchesResponse>> {
    let threshold = params.threshold.unwrap_or(DEFAULT_THRESHOLD);
    validate_limit(params.limit)?;
    let outcome = state.documents.find_similar(&params.query, threshold).await?;
    matches_response(outcome, params.limit)
}

/// Handler for `GET /collections/:name/documents`
#[axum::debug_handler]
pub async fn list_documents(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ServerResult<Json<Vec<DocumentResponse>>> {
    let documents = state.store.find_all(&name, DocumentFilter::All).await?;
    debug!(collection = %name, count = documents.len(), "Returning document list");
    Ok(Json(documents.into_iter().map(DocumentResponse::from).collect()))
}

fn validate_limit(limit: Option<usize>) -> ServerResult<()> {
    if limit == Some(0) {
        return Err(ServerError::BadRequest("limit must be greater than 0".to_string()));
    }
    Ok(())
}

// Unavailable searches map to 503, no matches to an empty list.
fn matches_response(outcome: MatchOutcome, limit: Option<usize>) -> ServerResult<Json<MatchesResponse>> {
    match outcome {
        MatchOutcome::Matches(mut matches) => {
            if let Some(limit) = limit {
                matches.truncate(limit);
            }
            Ok(Json(matches.into()))
        }
        MatchOutcome::NoMatches => Ok(Json(MatchesResponse { matches: Vec::new() })),
        MatchOutcome::Unavailable { reason, detail } => Err(ServerError::SearchUnavailable { reason, detail }),
    }
}

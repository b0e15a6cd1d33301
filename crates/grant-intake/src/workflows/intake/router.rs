use std::collections::BTreeSet;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::classifier::classify;
use super::domain::{
    CaseDocument, CaseId, ClassificationResult, ExtractionResult, FieldMap, RawDocument,
};
use super::repository::{CaseRepository, CaseView};
use super::service::{DocumentUpload, ExtractRequest, IntakeService, ReviewDecision, UploadReceipt};
use crate::error::AppError;
use crate::workflows::checklist::ProgramKey;

#[derive(Debug, Deserialize)]
pub(crate) struct OpenCaseRequest {
    #[serde(default)]
    programs: BTreeSet<ProgramKey>,
    #[serde(default)]
    questionnaire: FieldMap,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ShortlistRequest {
    programs: BTreeSet<ProgramKey>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReviewRequest {
    decision: ReviewDecision,
}

/// Router builder exposing the document and case endpoints.
pub fn intake_router<R>(service: Arc<IntakeService<R>>) -> Router
where
    R: CaseRepository + 'static,
{
    Router::new()
        .route("/api/v1/documents/classify", post(classify_handler))
        .route("/api/v1/documents/extract", post(extract_handler::<R>))
        .route("/api/v1/cases", post(open_case_handler::<R>))
        .route("/api/v1/cases/:case_id", get(case_handler::<R>))
        .route(
            "/api/v1/cases/:case_id/checklist",
            get(checklist_handler::<R>),
        )
        .route(
            "/api/v1/cases/:case_id/shortlist",
            put(shortlist_handler::<R>),
        )
        .route(
            "/api/v1/cases/:case_id/questionnaire",
            post(questionnaire_handler::<R>),
        )
        .route(
            "/api/v1/cases/:case_id/documents",
            post(upload_handler::<R>),
        )
        .route(
            "/api/v1/cases/:case_id/documents/:doc_type/review",
            post(review_handler::<R>),
        )
        .route(
            "/api/v1/cases/:case_id/documents/:doc_type/generated",
            post(generated_handler::<R>),
        )
        .with_state(service)
}

pub(crate) async fn classify_handler(
    Json(document): Json<RawDocument>,
) -> Json<ClassificationResult> {
    Json(classify(&document.text))
}

pub(crate) async fn extract_handler<R>(
    State(service): State<Arc<IntakeService<R>>>,
    Json(request): Json<ExtractRequest>,
) -> Result<Json<ExtractionResult>, AppError>
where
    R: CaseRepository + 'static,
{
    Ok(Json(service.extract(request)?))
}

pub(crate) async fn open_case_handler<R>(
    State(service): State<Arc<IntakeService<R>>>,
    Json(request): Json<OpenCaseRequest>,
) -> Result<(StatusCode, Json<CaseView>), AppError>
where
    R: CaseRepository + 'static,
{
    let view = service.open_case(request.programs, request.questionnaire)?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub(crate) async fn case_handler<R>(
    State(service): State<Arc<IntakeService<R>>>,
    Path(case_id): Path<String>,
) -> Result<Json<CaseView>, AppError>
where
    R: CaseRepository + 'static,
{
    Ok(Json(service.get(&CaseId(case_id))?))
}

pub(crate) async fn checklist_handler<R>(
    State(service): State<Arc<IntakeService<R>>>,
    Path(case_id): Path<String>,
) -> Result<Json<Value>, AppError>
where
    R: CaseRepository + 'static,
{
    let case_id = CaseId(case_id);
    let items = service.checklist(&case_id)?;
    Ok(Json(json!({
        "case_id": case_id,
        "checklist": items,
    })))
}

pub(crate) async fn shortlist_handler<R>(
    State(service): State<Arc<IntakeService<R>>>,
    Path(case_id): Path<String>,
    Json(request): Json<ShortlistRequest>,
) -> Result<Json<CaseView>, AppError>
where
    R: CaseRepository + 'static,
{
    Ok(Json(
        service.update_shortlist(&CaseId(case_id), request.programs)?,
    ))
}

pub(crate) async fn questionnaire_handler<R>(
    State(service): State<Arc<IntakeService<R>>>,
    Path(case_id): Path<String>,
    Json(fields): Json<FieldMap>,
) -> Result<Json<Value>, AppError>
where
    R: CaseRepository + 'static,
{
    let case_id = CaseId(case_id);
    let updated_keys = service.record_questionnaire(&case_id, fields)?;
    Ok(Json(json!({
        "case_id": case_id,
        "updated_keys": updated_keys,
    })))
}

pub(crate) async fn upload_handler<R>(
    State(service): State<Arc<IntakeService<R>>>,
    Path(case_id): Path<String>,
    Json(upload): Json<DocumentUpload>,
) -> Result<(StatusCode, Json<UploadReceipt>), AppError>
where
    R: CaseRepository + 'static,
{
    let receipt = service.upload_document(&CaseId(case_id), upload)?;
    Ok((StatusCode::ACCEPTED, Json(receipt)))
}

pub(crate) async fn review_handler<R>(
    State(service): State<Arc<IntakeService<R>>>,
    Path((case_id, doc_type)): Path<(String, String)>,
    Json(request): Json<ReviewRequest>,
) -> Result<Json<CaseDocument>, AppError>
where
    R: CaseRepository + 'static,
{
    Ok(Json(service.review_document(
        &CaseId(case_id),
        &doc_type,
        request.decision,
    )?))
}

pub(crate) async fn generated_handler<R>(
    State(service): State<Arc<IntakeService<R>>>,
    Path((case_id, doc_type)): Path<(String, String)>,
) -> Result<Json<CaseDocument>, AppError>
where
    R: CaseRepository + 'static,
{
    Ok(Json(service.mark_generated(&CaseId(case_id), &doc_type)?))
}

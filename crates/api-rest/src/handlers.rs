//! Route handlers.
//!
//! Handlers are thin: parse identifiers, call one core service, convert the result. The core
//! services are synchronous and do small local file I/O, so they are called inline.

use crate::auth::Caller;
use crate::dto::{
    AccessDecisionRes, CaseRes, CreateCaseReq, DocumentRes, ErrorRes, EvaluateAccessReq,
    HealthRes, ListCasesQuery, ListCasesRes, ListDocumentsRes, ListNotificationsRes,
    NotificationRes, NotificationsQuery, TransitionReq, TransitionRes, UpdateCaseReq,
};
use crate::error::{ApiError, ApiResult};
use crate::AppState;
use axum::{
    extract::{Path as AxumPath, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use casebook_core::models::CaseFilter;
use casebook_core::CoreError;
use casebook_types::NonEmptyText;
use casebook_uuid::RecordId;
use casebook_workflow::{CaseStatus, TransitionPayload, Trigger};
use serde::Deserialize;
use utoipa::IntoParams;

fn parse_id(raw: &str, what: &str) -> ApiResult<RecordId> {
    RecordId::parse(raw).map_err(|_| ApiError::bad_request(format!("malformed {what} id: {raw}")))
}

fn parse_optional_id(raw: Option<&str>, what: &str) -> ApiResult<Option<RecordId>> {
    raw.map(|r| parse_id(r, what)).transpose()
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Liveness probe. Needs no credentials.
#[axum::debug_handler]
pub(crate) async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "Casebook REST API is alive".into(),
    })
}

#[utoipa::path(
    post,
    path = "/cases",
    request_body = CreateCaseReq,
    responses(
        (status = 201, description = "Case created in draft", body = CaseRes),
        (status = 400, description = "Bad request", body = ErrorRes),
        (status = 403, description = "Caller may not create this case", body = ErrorRes)
    )
)]
/// Create a draft case.
///
/// Students create cases for themselves. Managers and super-admins may name a student
/// in `student`.
#[axum::debug_handler]
pub(crate) async fn create_case(
    State(state): State<AppState>,
    caller: Caller,
    Json(req): Json<CreateCaseReq>,
) -> ApiResult<(StatusCode, Json<CaseRes>)> {
    let student = parse_optional_id(req.student.as_deref(), "student")?;
    let case = state
        .casebook
        .cases
        .create_case(caller.id, req.into_new_case(student))?;
    Ok((StatusCode::CREATED, Json(case.into())))
}

#[utoipa::path(
    get,
    path = "/cases",
    params(ListCasesQuery),
    responses(
        (status = 200, description = "Cases visible to the caller", body = ListCasesRes),
        (status = 400, description = "Bad filter", body = ErrorRes)
    )
)]
/// List cases visible to the caller, optionally filtered.
#[axum::debug_handler]
pub(crate) async fn list_cases(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<ListCasesQuery>,
) -> ApiResult<Json<ListCasesRes>> {
    let filter = CaseFilter {
        status: query
            .status
            .as_deref()
            .map(str::parse::<CaseStatus>)
            .transpose()
            .map_err(CoreError::from)?,
        student: parse_optional_id(query.student.as_deref(), "student")?,
        assigned_to: parse_optional_id(query.assigned_to.as_deref(), "assignee")?,
        department: query
            .department
            .as_deref()
            .map(NonEmptyText::new)
            .transpose()
            .map_err(CoreError::from)?,
    };

    let cases = state.casebook.cases.list_cases(caller.id, filter)?;
    Ok(Json(ListCasesRes {
        cases: cases.into_iter().map(Into::into).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/cases/{id}",
    params(("id" = String, Path, description = "Case id")),
    responses(
        (status = 200, description = "The case", body = CaseRes),
        (status = 404, description = "No such case, or not visible", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub(crate) async fn get_case(
    State(state): State<AppState>,
    caller: Caller,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Json<CaseRes>> {
    let case = state
        .casebook
        .cases
        .get_case(caller.id, parse_id(&id, "case")?)?;
    Ok(Json(case.into()))
}

#[utoipa::path(
    put,
    path = "/cases/{id}",
    params(("id" = String, Path, description = "Case id")),
    request_body = UpdateCaseReq,
    responses(
        (status = 200, description = "Updated case", body = CaseRes),
        (status = 403, description = "Caller does not own the case", body = ErrorRes),
        (status = 409, description = "Content is frozen in this status", body = ErrorRes)
    )
)]
/// Edit clinical content. Only the owning student, and only in draft or revision.
#[axum::debug_handler]
pub(crate) async fn update_case(
    State(state): State<AppState>,
    caller: Caller,
    AxumPath(id): AxumPath<String>,
    Json(req): Json<UpdateCaseReq>,
) -> ApiResult<Json<CaseRes>> {
    let case =
        state
            .casebook
            .cases
            .update_content(caller.id, parse_id(&id, "case")?, req.into())?;
    Ok(Json(case.into()))
}

#[utoipa::path(
    delete,
    path = "/cases/{id}",
    params(("id" = String, Path, description = "Case id")),
    responses(
        (status = 204, description = "Case deleted"),
        (status = 403, description = "Caller may not delete this case", body = ErrorRes),
        (status = 409, description = "Case is no longer a draft", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub(crate) async fn delete_case(
    State(state): State<AppState>,
    caller: Caller,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<StatusCode> {
    state
        .casebook
        .cases
        .delete_case(caller.id, parse_id(&id, "case")?)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/cases/{id}/transitions",
    params(("id" = String, Path, description = "Case id")),
    request_body = TransitionReq,
    responses(
        (status = 200, description = "Transition committed", body = TransitionRes),
        (status = 400, description = "Unknown trigger or invalid payload", body = ErrorRes),
        (status = 403, description = "Caller may not fire this trigger", body = ErrorRes),
        (status = 409, description = "Trigger not valid from the current status", body = ErrorRes)
    )
)]
/// Fire a workflow trigger on a case.
///
/// A 200 means the status change is committed. Notification or report failures after the
/// commit are listed in `warnings`.
#[axum::debug_handler]
pub(crate) async fn transition_case(
    State(state): State<AppState>,
    caller: Caller,
    AxumPath(id): AxumPath<String>,
    Json(req): Json<TransitionReq>,
) -> ApiResult<Json<TransitionRes>> {
    let case_id = parse_id(&id, "case")?;
    let trigger: Trigger = req.trigger.parse().map_err(CoreError::from)?;
    let payload = TransitionPayload {
        note: req.note,
        assignee: parse_optional_id(req.assignee.as_deref(), "assignee")?,
        revision_description: req.revision_description,
        evaluation: req.evaluation,
    };

    let outcome = state
        .casebook
        .cases
        .attempt_transition(case_id, trigger, caller.id, payload)?;
    Ok(Json(outcome.into()))
}

#[utoipa::path(
    post,
    path = "/cases/{id}/report",
    params(("id" = String, Path, description = "Case id")),
    responses(
        (status = 200, description = "Report regenerated", body = CaseRes),
        (status = 409, description = "Case has not been completed", body = ErrorRes)
    )
)]
/// Regenerate the report artefact of a completed case.
#[axum::debug_handler]
pub(crate) async fn regenerate_report(
    State(state): State<AppState>,
    caller: Caller,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Json<CaseRes>> {
    let case = state
        .casebook
        .cases
        .regenerate_report(caller.id, parse_id(&id, "case")?)?;
    Ok(Json(case.into()))
}

#[utoipa::path(
    get,
    path = "/documents",
    responses(
        (status = 200, description = "Documents readable by the caller", body = ListDocumentsRes)
    )
)]
#[axum::debug_handler]
pub(crate) async fn list_documents(
    State(state): State<AppState>,
    caller: Caller,
) -> ApiResult<Json<ListDocumentsRes>> {
    let documents = state.casebook.documents.list_documents(caller.id)?;
    Ok(Json(ListDocumentsRes {
        documents: documents.into_iter().map(Into::into).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/documents/{id}",
    params(("id" = String, Path, description = "Document id")),
    responses(
        (status = 200, description = "The document; the view is logged", body = DocumentRes),
        (status = 403, description = "Caller may not read the document", body = ErrorRes),
        (status = 404, description = "No such document", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub(crate) async fn get_document(
    State(state): State<AppState>,
    caller: Caller,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Json<DocumentRes>> {
    let document =
        state
            .casebook
            .documents
            .get_document(caller.id, parse_id(&id, "document")?, caller.ip)?;
    Ok(Json(document.into()))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub(crate) struct DownloadQuery {
    /// Version number; the current version when omitted.
    version: Option<u32>,
}

#[utoipa::path(
    get,
    path = "/documents/{id}/content",
    params(("id" = String, Path, description = "Document id"), DownloadQuery),
    responses(
        (status = 200, description = "Raw bytes of the version; the download is logged",
            content_type = "application/octet-stream"),
        (status = 403, description = "Caller may not read the document", body = ErrorRes),
        (status = 404, description = "No such document or version", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub(crate) async fn download_document(
    State(state): State<AppState>,
    caller: Caller,
    AxumPath(id): AxumPath<String>,
    Query(query): Query<DownloadQuery>,
) -> ApiResult<Response> {
    let download = state.casebook.documents.download(
        caller.id,
        parse_id(&id, "document")?,
        query.version,
        caller.ip,
    )?;

    let content_type = download
        .version
        .file
        .media_type
        .map(|m| m.into_inner())
        .unwrap_or_else(|| "application/octet-stream".into());
    Ok(([(header::CONTENT_TYPE, content_type)], download.bytes).into_response())
}

#[utoipa::path(
    post,
    path = "/access/evaluate",
    request_body = EvaluateAccessReq,
    responses(
        (status = 200, description = "Read and edit decisions", body = AccessDecisionRes),
        (status = 403, description = "Only managers may ask about other principals", body = ErrorRes),
        (status = 404, description = "No such document or principal", body = ErrorRes)
    )
)]
/// Evaluate document access for the caller, or for `principal_id` when a manager asks.
#[axum::debug_handler]
pub(crate) async fn evaluate_access(
    State(state): State<AppState>,
    caller: Caller,
    Json(req): Json<EvaluateAccessReq>,
) -> ApiResult<Json<AccessDecisionRes>> {
    let document = parse_id(&req.document_id, "document")?;
    let subject = parse_optional_id(req.principal_id.as_deref(), "principal")?;
    let decision = state
        .casebook
        .documents
        .evaluate_access(caller.id, document, subject)?;
    Ok(Json(decision.into()))
}

#[utoipa::path(
    get,
    path = "/notifications",
    params(NotificationsQuery),
    responses(
        (status = 200, description = "Caller's notifications, newest first", body = ListNotificationsRes)
    )
)]
#[axum::debug_handler]
pub(crate) async fn list_notifications(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<NotificationsQuery>,
) -> ApiResult<Json<ListNotificationsRes>> {
    let notifications = state
        .casebook
        .notifications
        .list_for_recipient(caller.id, query.unread_only)?;
    Ok(Json(ListNotificationsRes {
        notifications: notifications.into_iter().map(Into::into).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/notifications/{id}/read",
    params(("id" = String, Path, description = "Notification id")),
    responses(
        (status = 200, description = "Notification marked read", body = NotificationRes),
        (status = 404, description = "No such notification for the caller", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub(crate) async fn mark_notification_read(
    State(state): State<AppState>,
    caller: Caller,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Json<NotificationRes>> {
    let notification = state
        .casebook
        .notifications
        .mark_read(parse_id(&id, "notification")?, caller.id)?;
    Ok(Json(notification.into()))
}

//! # API REST
//!
//! REST API for the document approval workflow.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON DTOs, CORS, `x-api-key` / `x-actor` headers)
//!
//! Every handler delegates to [`DocumentService`]; workflow errors are mapped to status codes
//! by [`status_for`].

#![warn(rust_2018_idioms)]

use approval_core::{
    CcAction, CcDraft, Category, DetailDraft, DetailStatus, Document, DocumentDraft, DocumentKind,
    DocumentService, Feedback, PendingNotification, ReopenRole, WorkflowError,
};
use approval_files::FilesError;
use axum::{
    body::Bytes,
    extract::{Path as AxumPath, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post, put},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const ACTOR_HEADER: &str = "x-actor";

type ApiResult<T> = Result<Json<T>, (StatusCode, &'static str)>;

/// Application state shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    service: DocumentService,
    api_key: Arc<str>,
}

impl AppState {
    pub fn new(service: DocumentService, api_key: impl Into<Arc<str>>) -> Self {
        Self {
            service,
            api_key: api_key.into(),
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        create_document,
        get_document,
        revise_document,
        apply_feedback,
        reply_for_review,
        reopen_document,
        follow_up,
        set_detail_status,
        upload_attachment,
        list_selection,
        list_notifications,
        mark_read,
    ),
    components(schemas(
        HealthRes,
        DocumentReq,
        CcReq,
        DetailReq,
        ReviseReq,
        FeedbackReq,
        ReplyReq,
        ReopenReq,
        DetailStatusReq,
        DocumentRes,
        CcEntryRes,
        DetailRes,
        NoteRes,
        DocumentListRes,
        NotificationRes,
        NotificationListRes,
        AttachmentRes,
        MarkReadRes,
    ))
)]
pub struct ApiDoc;

/// Build the REST router with Swagger UI and permissive CORS.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/documents", post(create_document))
        .route("/documents/:number", get(get_document).put(revise_document))
        .route("/documents/:number/feedback", post(apply_feedback))
        .route("/documents/:number/reply", post(reply_for_review))
        .route("/documents/:number/reopen", post(reopen_document))
        .route("/documents/:number/follow-up", post(follow_up))
        .route("/documents/:number/details/:line", put(set_detail_status))
        .route(
            "/documents/:number/attachments/:filename",
            post(upload_attachment),
        )
        .route("/selections/:category", get(list_selection))
        .route("/notifications", get(list_notifications))
        .route("/notifications/:number/read", post(mark_read))
        .merge(
            SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// DTOs
// ============================================================================

#[derive(Serialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

#[derive(Deserialize, ToSchema)]
pub struct CcReq {
    pub approver_code: String,
    /// `NO_ACTION` when omitted.
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub attachment: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct DetailReq {
    pub item: String,
    pub quantity: u32,
    #[serde(default)]
    pub remark: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct DocumentReq {
    /// `bpb` or `helpdesk`.
    pub kind: String,
    pub origin: String,
    pub recipient: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub attachment: Option<String>,
    #[serde(default)]
    pub details: Vec<DetailReq>,
    pub cc: Vec<CcReq>,
}

#[derive(Deserialize, ToSchema)]
pub struct ReviseReq {
    pub document: DocumentReq,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct FeedbackReq {
    pub line_number: usize,
    pub action: String,
    #[serde(default)]
    pub attachment: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub mentions: Vec<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct ReplyReq {
    pub comment: String,
    #[serde(default)]
    pub mentions: Vec<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct ReopenReq {
    /// `publisher`, `recipient` or `cc<n>`.
    pub role: String,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct DetailStatusReq {
    /// `PENDING`, `IN_PROGRESS` or `DONE`.
    pub status: String,
}

#[derive(Serialize, ToSchema)]
pub struct CcEntryRes {
    pub line_number: usize,
    pub approver_code: String,
    pub action: String,
    pub action_at: Option<String>,
    pub attachment: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct DetailRes {
    pub line_number: usize,
    pub item: String,
    pub quantity: u32,
    pub remark: Option<String>,
    pub sub_status: String,
}

#[derive(Serialize, ToSchema)]
pub struct NoteRes {
    pub line_number: u64,
    pub timestamp: String,
    pub author: String,
    pub comment: String,
    pub mentions: Vec<String>,
}

#[derive(Serialize, ToSchema)]
pub struct DocumentRes {
    pub number: String,
    pub kind: String,
    pub origin: String,
    pub recipient: String,
    pub subject: String,
    pub status: String,
    pub issued_at: String,
    /// Absent until the document completes.
    pub completed_at: Option<String>,
    pub attachment: Option<String>,
    pub details: Vec<DetailRes>,
    pub cc_list: Vec<CcEntryRes>,
    pub notes: Vec<NoteRes>,
}

#[derive(Serialize, ToSchema)]
pub struct DocumentListRes {
    pub documents: Vec<DocumentRes>,
}

#[derive(Serialize, ToSchema)]
pub struct NotificationRes {
    pub number: String,
    pub kind: String,
    pub subject: String,
    pub created_at: String,
}

#[derive(Serialize, ToSchema)]
pub struct NotificationListRes {
    pub notifications: Vec<NotificationRes>,
}

#[derive(Serialize, ToSchema)]
pub struct AttachmentRes {
    pub filename: String,
    pub hash: String,
    pub size_bytes: u64,
    pub media_type: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct MarkReadRes {
    pub cleared: bool,
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339()
}

impl DocumentReq {
    fn into_draft(self) -> Result<DocumentDraft, WorkflowError> {
        let cc = self
            .cc
            .into_iter()
            .map(|c| -> Result<CcDraft, WorkflowError> {
                Ok(CcDraft {
                    approver_code: c.approver_code,
                    action: match c.action {
                        Some(action) => action.parse::<CcAction>()?,
                        None => CcAction::default(),
                    },
                    attachment: c.attachment,
                })
            })
            .collect::<Result<Vec<_>, WorkflowError>>()?;

        Ok(DocumentDraft {
            kind: self.kind.parse::<DocumentKind>()?,
            origin: self.origin,
            recipient: self.recipient,
            subject: self.subject,
            attachment: self.attachment,
            details: self
                .details
                .into_iter()
                .map(|d| DetailDraft {
                    item: d.item,
                    quantity: d.quantity,
                    remark: d.remark,
                })
                .collect(),
            cc,
        })
    }
}

impl DocumentRes {
    fn from_document(state: &AppState, doc: Document) -> Self {
        let policy = state.service.config().policy(doc.kind);
        Self {
            status: policy.status_label(doc.status).to_string(),
            completed_at: doc.is_completed().then(|| timestamp(doc.completed_at)),
            issued_at: timestamp(doc.issued_at),
            kind: doc.kind.to_string(),
            details: doc
                .details
                .into_iter()
                .map(|d| DetailRes {
                    line_number: d.line_number,
                    item: d.item,
                    quantity: d.quantity,
                    remark: d.remark,
                    sub_status: d.sub_status.to_string(),
                })
                .collect(),
            cc_list: doc
                .cc_list
                .entries()
                .iter()
                .map(|e| CcEntryRes {
                    line_number: e.line_number,
                    approver_code: e.approver_code.clone(),
                    action: e.action.to_string(),
                    action_at: e.action_at.map(timestamp),
                    attachment: e.attachment.clone(),
                })
                .collect(),
            notes: doc
                .notes
                .notes()
                .iter()
                .map(|n| NoteRes {
                    line_number: n.line_number,
                    timestamp: timestamp(n.timestamp),
                    author: n.author.clone(),
                    comment: n.comment.clone(),
                    mentions: n.mentions.clone(),
                })
                .collect(),
            number: doc.number,
            origin: doc.origin,
            recipient: doc.recipient,
            subject: doc.subject,
            attachment: doc.attachment,
        }
    }
}

impl From<PendingNotification> for NotificationRes {
    fn from(p: PendingNotification) -> Self {
        Self {
            number: p.number,
            kind: p.kind.to_string(),
            subject: p.subject,
            created_at: timestamp(p.created_at),
        }
    }
}

// ============================================================================
// Errors and authentication
// ============================================================================

/// HTTP status and public message for a workflow error.
pub fn status_for(error: &WorkflowError) -> (StatusCode, &'static str) {
    match error {
        WorkflowError::NotFound(_) => (StatusCode::NOT_FOUND, "Not found"),
        WorkflowError::InvalidTransition(_) => (StatusCode::CONFLICT, "Invalid transition"),
        WorkflowError::RecordExists(_) => (StatusCode::CONFLICT, "Record already exists"),
        WorkflowError::InvalidInput(_) => (StatusCode::UNPROCESSABLE_ENTITY, "Invalid input"),
        WorkflowError::AuthenticationFailed(_) => (StatusCode::UNAUTHORIZED, "Unauthenticated"),
        WorkflowError::AuthorizationFailed(_) => (StatusCode::FORBIDDEN, "Forbidden"),
        WorkflowError::Translation(_) => (StatusCode::BAD_REQUEST, "Malformed record"),
        WorkflowError::Files(FilesError::NotFound(_)) => (StatusCode::NOT_FOUND, "Not found"),
        WorkflowError::Files(FilesError::FileAlreadyExists(_)) => {
            (StatusCode::CONFLICT, "Attachment already exists")
        }
        WorkflowError::Files(FilesError::InvalidPath(_)) => {
            (StatusCode::BAD_REQUEST, "Invalid attachment name")
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "Internal error"),
    }
}

fn reject(context: &str, error: WorkflowError) -> (StatusCode, &'static str) {
    let (status, message) = status_for(&error);
    if status.is_server_error() {
        tracing::error!("{context} error: {:?}", error);
    } else {
        tracing::debug!("{context} refused: {}", error);
    }
    (status, message)
}

/// Check `x-api-key` and return the `x-actor` username.
fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<String, (StatusCode, &'static str)> {
    let provided = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if provided.is_empty() || provided != &*state.api_key {
        return Err(reject(
            "authenticate",
            WorkflowError::AuthenticationFailed("invalid API key".into()),
        ));
    }

    headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            reject(
                "authenticate",
                WorkflowError::AuthorizationFailed("missing x-actor header".into()),
            )
        })
}

// ============================================================================
// Handlers
// ============================================================================

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint. Needs no credentials.
#[axum::debug_handler]
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "Approval REST API is alive".into(),
    })
}

#[utoipa::path(
    post,
    path = "/documents",
    request_body = DocumentReq,
    responses(
        (status = 200, description = "Document published", body = DocumentRes),
        (status = 403, description = "Actor may not publish for the origin"),
        (status = 422, description = "Invalid draft")
    )
)]
/// Publish a new document.
///
/// The number is allocated from the origin department and the current year; the first
/// approver is notified.
#[axum::debug_handler]
async fn create_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<DocumentReq>,
) -> ApiResult<DocumentRes> {
    let actor = authenticate(&state, &headers)?;
    let draft = req.into_draft().map_err(|e| reject("create", e))?;
    let doc = state
        .service
        .create(&draft, &actor)
        .map_err(|e| reject("create", e))?;
    Ok(Json(DocumentRes::from_document(&state, doc)))
}

#[utoipa::path(
    get,
    path = "/documents/{number}",
    params(("number" = String, Path, description = "Document number")),
    responses(
        (status = 200, description = "Document", body = DocumentRes),
        (status = 404, description = "Unknown document")
    )
)]
#[axum::debug_handler]
async fn get_document(
    State(state): State<AppState>,
    AxumPath(number): AxumPath<String>,
    headers: HeaderMap,
) -> ApiResult<DocumentRes> {
    let actor = authenticate(&state, &headers)?;
    let doc = state
        .service
        .get(&number, &actor)
        .map_err(|e| reject("get", e))?;
    Ok(Json(DocumentRes::from_document(&state, doc)))
}

#[utoipa::path(
    put,
    path = "/documents/{number}",
    params(("number" = String, Path, description = "Document number")),
    request_body = ReviseReq,
    responses(
        (status = 200, description = "Document revised", body = DocumentRes),
        (status = 409, description = "Document is rejected"),
        (status = 422, description = "Invalid draft")
    )
)]
#[axum::debug_handler]
async fn revise_document(
    State(state): State<AppState>,
    AxumPath(number): AxumPath<String>,
    headers: HeaderMap,
    Json(req): Json<ReviseReq>,
) -> ApiResult<DocumentRes> {
    let actor = authenticate(&state, &headers)?;
    let draft = req.document.into_draft().map_err(|e| reject("revise", e))?;
    let doc = state
        .service
        .revise(&number, &draft, req.note.as_deref(), &actor)
        .map_err(|e| reject("revise", e))?;
    Ok(Json(DocumentRes::from_document(&state, doc)))
}

#[utoipa::path(
    post,
    path = "/documents/{number}/feedback",
    params(("number" = String, Path, description = "Document number")),
    request_body = FeedbackReq,
    responses(
        (status = 200, description = "Feedback applied", body = DocumentRes),
        (status = 403, description = "Actor does not hold the CC line"),
        (status = 409, description = "Rejected document, missing line or unknown action")
    )
)]
/// Respond on one CC line with `APPROVE`, `REVISION`, `REJECT`, `REQUESTING_REVIEW` or
/// `NO_ACTION`.
#[axum::debug_handler]
async fn apply_feedback(
    State(state): State<AppState>,
    AxumPath(number): AxumPath<String>,
    headers: HeaderMap,
    Json(req): Json<FeedbackReq>,
) -> ApiResult<DocumentRes> {
    let actor = authenticate(&state, &headers)?;
    let action = req
        .action
        .parse::<CcAction>()
        .map_err(|e| reject("feedback", e))?;
    let feedback = Feedback {
        line_number: req.line_number,
        action,
        attachment: req.attachment,
        comment: req.comment,
        mentions: req.mentions,
    };
    let doc = state
        .service
        .apply_feedback(&number, feedback, &actor)
        .map_err(|e| reject("feedback", e))?;
    Ok(Json(DocumentRes::from_document(&state, doc)))
}

#[utoipa::path(
    post,
    path = "/documents/{number}/reply",
    params(("number" = String, Path, description = "Document number")),
    request_body = ReplyReq,
    responses(
        (status = 200, description = "Reply recorded", body = DocumentRes),
        (status = 422, description = "Blank comment")
    )
)]
#[axum::debug_handler]
async fn reply_for_review(
    State(state): State<AppState>,
    AxumPath(number): AxumPath<String>,
    headers: HeaderMap,
    Json(req): Json<ReplyReq>,
) -> ApiResult<DocumentRes> {
    let actor = authenticate(&state, &headers)?;
    let doc = state
        .service
        .reply_for_review(&number, &req.comment, req.mentions, &actor)
        .map_err(|e| reject("reply", e))?;
    Ok(Json(DocumentRes::from_document(&state, doc)))
}

#[utoipa::path(
    post,
    path = "/documents/{number}/reopen",
    params(("number" = String, Path, description = "Document number")),
    request_body = ReopenReq,
    responses(
        (status = 200, description = "Document reopened", body = DocumentRes),
        (status = 409, description = "Document is rejected")
    )
)]
#[axum::debug_handler]
async fn reopen_document(
    State(state): State<AppState>,
    AxumPath(number): AxumPath<String>,
    headers: HeaderMap,
    Json(req): Json<ReopenReq>,
) -> ApiResult<DocumentRes> {
    let actor = authenticate(&state, &headers)?;
    let role = req
        .role
        .parse::<ReopenRole>()
        .map_err(|e| reject("reopen", e))?;
    let doc = state
        .service
        .reopen(&number, role, req.comment.as_deref(), &actor)
        .map_err(|e| reject("reopen", e))?;
    Ok(Json(DocumentRes::from_document(&state, doc)))
}

#[utoipa::path(
    post,
    path = "/documents/{number}/follow-up",
    params(("number" = String, Path, description = "Document number")),
    responses(
        (status = 200, description = "Current approver reminded", body = DocumentRes),
        (status = 409, description = "Nobody is waiting to act")
    )
)]
#[axum::debug_handler]
async fn follow_up(
    State(state): State<AppState>,
    AxumPath(number): AxumPath<String>,
    headers: HeaderMap,
) -> ApiResult<DocumentRes> {
    let actor = authenticate(&state, &headers)?;
    let doc = state
        .service
        .follow_up(&number, &actor)
        .map_err(|e| reject("follow-up", e))?;
    Ok(Json(DocumentRes::from_document(&state, doc)))
}

#[utoipa::path(
    put,
    path = "/documents/{number}/details/{line}",
    params(
        ("number" = String, Path, description = "Document number"),
        ("line" = usize, Path, description = "Zero-based detail line")
    ),
    request_body = DetailStatusReq,
    responses(
        (status = 200, description = "Detail status updated", body = DocumentRes),
        (status = 422, description = "Unknown line or status")
    )
)]
#[axum::debug_handler]
async fn set_detail_status(
    State(state): State<AppState>,
    AxumPath((number, line)): AxumPath<(String, usize)>,
    headers: HeaderMap,
    Json(req): Json<DetailStatusReq>,
) -> ApiResult<DocumentRes> {
    let actor = authenticate(&state, &headers)?;
    let status = req
        .status
        .parse::<DetailStatus>()
        .map_err(|e| reject("detail status", e))?;
    let doc = state
        .service
        .set_detail_status(&number, line, status, &actor)
        .map_err(|e| reject("detail status", e))?;
    Ok(Json(DocumentRes::from_document(&state, doc)))
}

#[utoipa::path(
    post,
    path = "/documents/{number}/attachments/{filename}",
    params(
        ("number" = String, Path, description = "Document number"),
        ("filename" = String, Path, description = "Attachment file name")
    ),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "Attachment stored", body = AttachmentRes),
        (status = 409, description = "Attachment already exists")
    )
)]
/// Store raw request bytes as an attachment. Reference it by name in a later create, revise or
/// feedback call.
#[axum::debug_handler]
async fn upload_attachment(
    State(state): State<AppState>,
    AxumPath((number, filename)): AxumPath<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<AttachmentRes> {
    let actor = authenticate(&state, &headers)?;
    let metadata = state
        .service
        .attach(&number, &filename, &body, &actor)
        .map_err(|e| reject("attach", e))?;
    Ok(Json(AttachmentRes {
        filename: metadata.original_filename.into_string(),
        hash: metadata.hash,
        size_bytes: metadata.size_bytes,
        media_type: metadata.media_type.map(|m| m.into_string()),
    }))
}

#[utoipa::path(
    get,
    path = "/selections/{category}",
    params(("category" = String, Path, description = "all, created, unpublished, approved, revision, rejected, waiting-for-approval, waiting-for-review, job-registration or done")),
    responses(
        (status = 200, description = "Documents in the category", body = DocumentListRes),
        (status = 422, description = "Unknown category")
    )
)]
#[axum::debug_handler]
async fn list_selection(
    State(state): State<AppState>,
    AxumPath(category): AxumPath<String>,
    headers: HeaderMap,
) -> ApiResult<DocumentListRes> {
    let actor = authenticate(&state, &headers)?;
    let category = category
        .parse::<Category>()
        .map_err(|e| reject("selection", e))?;
    let documents = state
        .service
        .list_by_selection(&actor, category)
        .map_err(|e| reject("selection", e))?;
    Ok(Json(DocumentListRes {
        documents: documents
            .into_iter()
            .map(|doc| DocumentRes::from_document(&state, doc))
            .collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/notifications",
    responses(
        (status = 200, description = "Unread notifications of the actor", body = NotificationListRes)
    )
)]
#[axum::debug_handler]
async fn list_notifications(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<NotificationListRes> {
    let actor = authenticate(&state, &headers)?;
    let pending = state
        .service
        .notifications_for(&actor)
        .map_err(|e| reject("notifications", e))?;
    Ok(Json(NotificationListRes {
        notifications: pending.into_iter().map(NotificationRes::from).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/notifications/{number}/read",
    params(("number" = String, Path, description = "Document number")),
    responses(
        (status = 200, description = "Marker cleared", body = MarkReadRes)
    )
)]
#[axum::debug_handler]
async fn mark_read(
    State(state): State<AppState>,
    AxumPath(number): AxumPath<String>,
    headers: HeaderMap,
) -> ApiResult<MarkReadRes> {
    let actor = authenticate(&state, &headers)?;
    let cleared = state
        .service
        .mark_read(&number, &actor)
        .map_err(|e| reject("mark read", e))?;
    Ok(Json(MarkReadRes { cleared }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approval_core::CoreConfig;
    use axum::body::Body;
    use axum::http::Request;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const ORG_SEED: &str = r#"
users:
  - { username: MGMG-01, level: director }
  - { username: JPJL-01, level: head, superior_username: MGMG-01 }
  - { username: GDGD-01, level: head, superior_username: JPJL-01 }
"#;

    fn app() -> (TempDir, Router) {
        let temp = TempDir::new().unwrap();
        let cfg = Arc::new(CoreConfig::with_defaults(temp.path().to_path_buf()).unwrap());
        let service = DocumentService::new(cfg).unwrap();
        service.org().import(ORG_SEED).unwrap();
        (temp, router(AppState::new(service, "secret")))
    }

    fn request(method: &str, uri: &str, actor: &str, body: Option<serde_json::Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(API_KEY_HEADER, "secret")
            .header(ACTOR_HEADER, actor)
            .header("content-type", "application/json");
        match body {
            Some(json) => builder.body(Body::from(json.to_string())).unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn create_body() -> serde_json::Value {
        serde_json::json!({
            "kind": "bpb",
            "origin": "JPJL",
            "recipient": "GDGD",
            "subject": "Chairs",
            "cc": [{ "approver_code": "GDGD" }, { "approver_code": "MGMG" }]
        })
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (WorkflowError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (WorkflowError::InvalidTransition("x".into()), StatusCode::CONFLICT),
            (WorkflowError::InvalidInput("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (WorkflowError::AuthenticationFailed("x".into()), StatusCode::UNAUTHORIZED),
            (WorkflowError::AuthorizationFailed("x".into()), StatusCode::FORBIDDEN),
            (WorkflowError::Translation("x".into()), StatusCode::BAD_REQUEST),
        ];
        for (error, expected) in cases {
            assert_eq!(status_for(&error).0, expected);
        }
    }

    #[tokio::test]
    async fn test_rejects_missing_api_key() {
        let (_temp, app) = app();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/notifications")
                    .header(ACTOR_HEADER, "JPJL-01")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_create_feedback_and_read() {
        let (_temp, app) = app();

        let created = app
            .clone()
            .oneshot(request("POST", "/documents", "JPJL-01", Some(create_body())))
            .await
            .unwrap();
        assert_eq!(created.status(), StatusCode::OK);
        let created = json_body(created).await;
        let number = created["number"].as_str().unwrap().to_string();
        assert_eq!(created["status"], "UNPUBLISHED");

        let wrong_holder = app
            .clone()
            .oneshot(request(
                "POST",
                &format!("/documents/{number}/feedback"),
                "MGMG-01",
                Some(serde_json::json!({ "line_number": 0, "action": "APPROVE" })),
            ))
            .await
            .unwrap();
        assert_eq!(wrong_holder.status(), StatusCode::FORBIDDEN);

        let unknown_action = app
            .clone()
            .oneshot(request(
                "POST",
                &format!("/documents/{number}/feedback"),
                "GDGD-01",
                Some(serde_json::json!({ "line_number": 0, "action": "MAYBE" })),
            ))
            .await
            .unwrap();
        assert_eq!(unknown_action.status(), StatusCode::CONFLICT);

        for (actor, line) in [("GDGD-01", 0), ("MGMG-01", 1)] {
            let response = app
                .clone()
                .oneshot(request(
                    "POST",
                    &format!("/documents/{number}/feedback"),
                    actor,
                    Some(serde_json::json!({ "line_number": line, "action": "APPROVE" })),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let read = app
            .clone()
            .oneshot(request("GET", &format!("/documents/{number}"), "JPJL-01", None))
            .await
            .unwrap();
        let read = json_body(read).await;
        assert_eq!(read["status"], "DONE");
        assert!(read["completed_at"].is_string());

        let missing = app
            .oneshot(request("GET", "/documents/BPB-JPJL-2000-0001", "JPJL-01", None))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }
}

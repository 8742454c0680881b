use crate::error::DevMasterError;
use crate::export::{self, ExportFormat};
use crate::metrics;
use crate::server::AppState;
use crate::types::body::{
    ChatBody, CourseBody, ExerciseBody, ExportBody, GlossaryBody, ImageBody, QuizBody, RequestBody,
};
use crate::types::{GenerationKind, ProviderId};
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_DISPOSITION, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

type BoxError = Box<dyn std::error::Error + Send + Sync>;
type BoxBody = http_body_util::combinators::BoxBody<Bytes, BoxError>;

const ALLOW_ORIGIN: &str = "*";
const ALLOW_METHODS: &str = "GET, POST, OPTIONS";
const ALLOW_HEADERS: &str = "Content-Type, Authorization";

/// 处理 HTTP 请求的主路由
pub async fn handle_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<BoxBody>, BoxError> {
    let request_id = Uuid::new_v4();
    let span = info_span!(
        "request",
        %request_id,
        method = %req.method(),
        path = %req.uri().path()
    );

    async move {
        let started = Instant::now();
        let mut response = route(req, state).await?;
        response
            .headers_mut()
            .insert("x-request-id", HeaderValue::from_str(&request_id.to_string())?);
        info!(
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "请求完成"
        );
        Ok::<_, BoxError>(response)
    }
    .instrument(span)
    .await
}

async fn route(req: Request<Incoming>, state: Arc<AppState>) -> Result<Response<BoxBody>, BoxError> {
    match (req.method(), req.uri().path()) {
        (&Method::OPTIONS, _) => preflight(),
        (&Method::GET, "/health") => health_check(),
        (&Method::GET, "/metrics") => metrics_endpoint(),
        (&Method::GET, "/api/providers") => list_providers(&state),
        (&Method::POST, "/api/quiz") => generate::<QuizBody>(req, &state).await,
        (&Method::POST, "/api/image") => generate::<ImageBody>(req, &state).await,
        (&Method::POST, "/api/exercise") => generate::<ExerciseBody>(req, &state).await,
        (&Method::POST, "/api/course") => generate::<CourseBody>(req, &state).await,
        (&Method::POST, "/api/glossary") => generate::<GlossaryBody>(req, &state).await,
        (&Method::POST, "/api/chat") => generate::<ChatBody>(req, &state).await,
        (&Method::POST, "/api/export/pdf") => export_document(req, ExportFormat::Pdf).await,
        (&Method::POST, "/api/export/docx") => export_document(req, ExportFormat::Docx).await,
        _ => not_found(),
    }
}

fn full(body: impl Into<Bytes>) -> BoxBody {
    Full::new(body.into())
        .map_err(|e| Box::new(e) as BoxError)
        .boxed()
}

/// 带 CORS 头的响应构建器
fn cors_builder(status: StatusCode) -> hyper::http::response::Builder {
    Response::builder()
        .status(status)
        .header("Access-Control-Allow-Origin", ALLOW_ORIGIN)
        .header("Access-Control-Allow-Methods", ALLOW_METHODS)
        .header("Access-Control-Allow-Headers", ALLOW_HEADERS)
}

fn json_response(status: StatusCode, body: &Value) -> Result<Response<BoxBody>, BoxError> {
    Ok(cors_builder(status)
        .header(CONTENT_TYPE, "application/json")
        .body(full(body.to_string()))?)
}

/// CORS 预检
fn preflight() -> Result<Response<BoxBody>, BoxError> {
    Ok(cors_builder(StatusCode::NO_CONTENT)
        .header("Access-Control-Max-Age", "86400")
        .body(full(Bytes::new()))?)
}

/// 健康检查端点
fn health_check() -> Result<Response<BoxBody>, BoxError> {
    json_response(
        StatusCode::OK,
        &json!({
            "status": "ok",
            "service": "devmaster"
        }),
    )
}

/// 指标端点
fn metrics_endpoint() -> Result<Response<BoxBody>, BoxError> {
    let body = metrics::global_metrics().export_prometheus();
    Ok(cors_builder(StatusCode::OK)
        .header(CONTENT_TYPE, "text/plain; version=0.0.4")
        .body(full(body))?)
}

/// 列出提供商及其能力
fn list_providers(state: &AppState) -> Result<Response<BoxBody>, BoxError> {
    let kinds = [
        GenerationKind::Quiz,
        GenerationKind::Image,
        GenerationKind::Exercise,
        GenerationKind::Course,
        GenerationKind::Glossary,
        GenerationKind::Chat,
    ];

    let providers: Vec<Value> = state
        .dispatcher
        .adapters()
        .iter()
        .map(|adapter| {
            let capabilities: Vec<&str> = kinds
                .iter()
                .filter(|kind| adapter.supports(**kind))
                .map(|kind| kind.as_str())
                .collect();
            json!({
                "id": adapter.id(),
                "configured": adapter.is_configured(),
                "auto": ProviderId::AUTO_ORDER.contains(&adapter.id()),
                "capabilities": capabilities
            })
        })
        .collect();

    json_response(
        StatusCode::OK,
        &json!({
            "providers": providers,
            "translation": state.dispatcher.can_translate()
        }),
    )
}

/// 读取 JSON 请求体；空请求体按 `{}` 处理
async fn read_json<T: serde::de::DeserializeOwned>(
    req: Request<Incoming>,
) -> Result<crate::Result<T>, BoxError> {
    let whole_body = req.collect().await?.to_bytes();
    let slice: &[u8] = if whole_body.iter().all(u8::is_ascii_whitespace) {
        b"{}"
    } else {
        &whole_body
    };
    Ok(serde_json::from_slice(slice).map_err(DevMasterError::from))
}

/// 通用生成端点
async fn generate<B: RequestBody>(
    req: Request<Incoming>,
    state: &AppState,
) -> Result<Response<BoxBody>, BoxError> {
    let metrics = metrics::global_metrics();

    let request = match read_json::<B>(req)
        .await?
        .and_then(|body| body.into_request(&state.config.translate_target))
    {
        Ok(request) => request,
        Err(e) => {
            metrics.record_failure();
            return error_response(&e);
        }
    };

    match state.dispatcher.dispatch(&request).await {
        Ok(outcome) => {
            metrics.record_success();
            let body = serde_json::to_string(&outcome.output)?;
            Ok(cors_builder(StatusCode::OK)
                .header(CONTENT_TYPE, "application/json")
                .header("x-provider", outcome.provider.as_str())
                .body(full(body))?)
        }
        Err(e) => {
            metrics.record_failure();
            error_response(&e)
        }
    }
}

/// 文档导出端点
async fn export_document(
    req: Request<Incoming>,
    format: ExportFormat,
) -> Result<Response<BoxBody>, BoxError> {
    let document = match read_json::<ExportBody>(req)
        .await?
        .and_then(|body| export::export(format, &body))
    {
        Ok(document) => document,
        Err(e) => return error_response(&e),
    };

    Ok(cors_builder(StatusCode::OK)
        .header(CONTENT_TYPE, document.content_type)
        .header(
            CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", document.filename),
        )
        .body(full(document.bytes))?)
}

/// 错误到 HTTP 状态码和响应体的映射
pub fn error_body(err: &DevMasterError) -> (StatusCode, Value) {
    match err {
        DevMasterError::ValidationError(message) => (
            StatusCode::BAD_REQUEST,
            json!({ "error": "invalid_request", "message": message }),
        ),
        DevMasterError::JsonError(e) => (
            StatusCode::BAD_REQUEST,
            json!({ "error": "invalid_request", "message": e.to_string() }),
        ),
        DevMasterError::UnsupportedProvider(_) => (
            StatusCode::BAD_REQUEST,
            json!({ "error": "unsupported_provider", "message": err.to_string() }),
        ),
        DevMasterError::MissingKeys(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": "missing_keys", "message": err.to_string() }),
        ),
        DevMasterError::Exhausted { kind, failures } => (
            StatusCode::BAD_GATEWAY,
            json!({
                "error": kind.failure_code(),
                "message": err.to_string(),
                "detail": { "tried": failures }
            }),
        ),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": "internal_error", "message": err.to_string() }),
        ),
    }
}

fn error_response(err: &DevMasterError) -> Result<Response<BoxBody>, BoxError> {
    let (status, body) = error_body(err);
    if status.is_server_error() {
        warn!(status = status.as_u16(), error = %err, "请求失败");
    }
    json_response(status, &body)
}

/// 404 响应
fn not_found() -> Result<Response<BoxBody>, BoxError> {
    json_response(
        StatusCode::NOT_FOUND,
        &json!({ "error": "not_found", "message": "Not Found" }),
    )
}

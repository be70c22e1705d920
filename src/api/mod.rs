//! HTTP layer for the request guard.
//!
//! Every route under `/api` passes through [`guard_middleware`], which turns
//! the actix request into a [`RequestView`], asks the guard for a verdict and
//! either answers 403 or forwards the request and decorates the response.
//! The admin endpoints expose the security event log.

use std::sync::Arc;

use actix_web::body::{EitherBody, MessageBody};
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::http::header::{
    HeaderName, HeaderValue, AUTHORIZATION, REFERRER_POLICY, X_CONTENT_TYPE_OPTIONS,
    X_FRAME_OPTIONS, X_XSS_PROTECTION,
};
use actix_web::middleware::{from_fn, Next};
use actix_web::{web, Error, HttpRequest, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};

use crate::core::{RequestGuard, RequestView};
use crate::models::{Config, SecurityEvent};
use crate::utils::{millis_to_datetime, now_millis};

const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
const SECURITY_POLICY: &str = "x-security-policy";

const DEFAULT_LOG_LIMIT: usize = 100;
const DEFAULT_MONITOR_LIMIT: usize = 50;

pub struct ApiState {
    pub guard: Arc<RequestGuard>,
    pub config: Arc<Config>,
    /// Prometheus recorder handle; `None` when no recorder is installed
    pub metrics: Option<PrometheusHandle>,
}

/// API configuration function for Actix-web
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .wrap(from_fn(guard_middleware))
            .service(web::resource("/v1/health").route(web::get().to(health_check)))
            .service(web::resource("/security/logs").route(web::get().to(security_logs)))
            .service(web::resource("/security/monitor").route(web::get().to(security_monitor))),
    )
    .service(web::resource("/metrics").route(web::get().to(metrics)));
}

/// Build the guard's view of an actix request
pub fn request_view(req: &HttpRequest) -> RequestView {
    let mut view = RequestView::new(req.method().as_str(), &req.uri().to_string());
    for (name, value) in req.headers() {
        // non-visible ASCII values cannot be compared against anything useful
        if let Ok(value) = value.to_str() {
            view.insert_header(name.as_str(), value);
        }
    }
    view
}

/// Body of a 403 response
#[derive(Debug, Serialize, Deserialize)]
pub struct BlockedResponse {
    pub error: String,
    pub message: String,
    pub code: String,
    pub timestamp: DateTime<Utc>,
}

/// Validate every request in the wrapped scope
pub async fn guard_middleware<B: MessageBody + 'static>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<EitherBody<B>>, Error> {
    let Some(state) = req.app_data::<web::Data<ApiState>>().cloned() else {
        log::error!("Request guard state missing; passing {} through", req.path());
        return Ok(next.call(req).await?.map_into_left_body());
    };

    if state.guard.is_exempt(req.path()) {
        return Ok(next.call(req).await?.map_into_left_body());
    }

    let now = now_millis();
    let view = request_view(req.request());
    let verdict = state.guard.inspect(&view, now);
    let remaining = HeaderValue::from(verdict.remaining());

    if let Some(reason) = verdict.reason {
        let response = HttpResponse::Forbidden()
            .insert_header((RATE_LIMIT_REMAINING, remaining))
            .insert_header((SECURITY_POLICY, HeaderValue::from_static("strict")))
            .json(BlockedResponse {
                error: "Request blocked by security policy".to_string(),
                message: reason.to_string(),
                code: reason.code().to_string(),
                timestamp: millis_to_datetime(now),
            });
        return Ok(req.into_response(response).map_into_right_body());
    }

    let mut res = next.call(req).await?;
    let headers = res.headers_mut();
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(X_XSS_PROTECTION, HeaderValue::from_static("1; mode=block"));
    headers.insert(
        REFERRER_POLICY,
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(HeaderName::from_static(RATE_LIMIT_REMAINING), remaining);
    Ok(res.map_into_left_body())
}

/// Health check endpoint response
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// Health check endpoint
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn is_admin(req: &HttpRequest, config: &Config) -> bool {
    if config.admin.api_key.is_empty() {
        return false;
    }
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token == config.admin.api_key)
        .unwrap_or(false)
}

fn unauthorized() -> HttpResponse {
    HttpResponse::Unauthorized().json(ErrorResponse {
        error: "Unauthorized".to_string(),
    })
}

/// Security log query
#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    /// `logs` (default) or `analyze`
    pub action: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Serialize)]
struct DataResponse<T: Serialize> {
    success: bool,
    data: T,
}

/// Recent security events, or the log analysis with `action=analyze`
async fn security_logs(
    req: HttpRequest,
    state: web::Data<ApiState>,
    query: web::Query<LogsQuery>,
) -> impl Responder {
    if !is_admin(&req, &state.config) {
        return unauthorized();
    }

    match query.action.as_deref() {
        Some("analyze") => HttpResponse::Ok().json(DataResponse {
            success: true,
            data: state.guard.analyze(),
        }),
        _ => HttpResponse::Ok().json(DataResponse {
            success: true,
            data: state
                .guard
                .recent_events(query.limit.unwrap_or(DEFAULT_LOG_LIMIT)),
        }),
    }
}

/// Security monitor query
#[derive(Debug, Deserialize)]
pub struct MonitorQuery {
    /// Restrict to one client identifier
    pub ip: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Serialize)]
struct MonitorResponse {
    success: bool,
    total_events: usize,
    events: Vec<SecurityEvent>,
}

/// Recent security events, optionally for a single client
async fn security_monitor(
    req: HttpRequest,
    state: web::Data<ApiState>,
    query: web::Query<MonitorQuery>,
) -> impl Responder {
    if !is_admin(&req, &state.config) {
        return unauthorized();
    }

    let limit = query.limit.unwrap_or(DEFAULT_MONITOR_LIMIT);
    let events = match query.ip.as_deref() {
        Some(ip) => state.guard.client_events(ip, limit),
        None => state.guard.recent_events(limit),
    };

    HttpResponse::Ok().json(MonitorResponse {
        success: true,
        total_events: events.len(),
        events,
    })
}

/// Prometheus exposition
async fn metrics(state: web::Data<ApiState>) -> impl Responder {
    match &state.metrics {
        Some(handle) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(handle.render()),
        None => HttpResponse::NotFound().finish(),
    }
}

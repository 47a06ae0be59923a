use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{
        DefaultBodyLimit, FromRequest, FromRequestParts, Multipart, Query, Request, State,
    },
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Router,
};
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    config::Configuration,
    error::{self, error_body, GatewayError},
    gateway::{Gateway, ScanRequest},
};

/// Header carrying the correlation id in and out.
pub const REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

type Params = HashMap<String, String>;

/// Build the gateway, bind `config.listen` and serve until Ctrl-C.
pub async fn spawn_server(config: &Configuration) -> Result<()> {
    let gateway = Arc::new(Gateway::from_config(config));
    let app = router(gateway, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&config.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.listen))?;
    info!(
        listen = %config.listen,
        scanner = %config.scanner_addr(),
        working_dir = %config.working_dir.display(),
        "snifferfy listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;
    Ok(())
}

pub fn router(gateway: Arc<Gateway>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/health", get(health))
        .route("/scan", post(scan))
        .route("/testip", get(test_ip).post(test_ip))
        .route("/status", get(status).post(status))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(gateway)
}

async fn ping() -> &'static str {
    "pong\n"
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, error_body("endpoint not found"))
}

async fn health(State(gw): State<Arc<Gateway>>, headers: HeaderMap) -> Response {
    let cid = correlation_id(&headers);
    let result = gw.health(&cid).await;
    respond(&cid, result)
}

async fn test_ip(
    State(gw): State<Arc<Gateway>>,
    headers: HeaderMap,
    params: Result<RequestParams, GatewayError>,
) -> Response {
    let cid = correlation_id(&headers);
    let result = match params {
        Ok(params) => gw.test_ip(&cid, params.get("ip")).await,
        Err(e) => Err(e),
    };
    respond(&cid, result)
}

async fn status(
    State(gw): State<Arc<Gateway>>,
    headers: HeaderMap,
    params: Result<RequestParams, GatewayError>,
) -> Response {
    let cid = correlation_id(&headers);
    let result = match params {
        Ok(params) => gw.report(&cid, params.get("interval")).await,
        Err(e) => Err(e),
    };
    respond(&cid, result)
}

async fn scan(
    State(gw): State<Arc<Gateway>>,
    headers: HeaderMap,
    params: Result<RequestParams, GatewayError>,
) -> Response {
    let cid = correlation_id(&headers);
    let result = match params.and_then(RequestParams::into_scan_request) {
        Ok(req) => gw.scan(&cid, req).await,
        Err(e) => {
            warn!(cid, error = %e, "rejected scan request");
            Err(e)
        }
    };
    respond(&cid, result)
}

/// Request parameters from the query string and the body.
///
/// The body may be urlencoded or `multipart/form-data`; body fields win over query
/// parameters of the same name. A multipart `file` part is kept as raw bytes.
#[derive(Debug)]
pub struct RequestParams {
    params: Params,
    file: Option<Vec<u8>>,
}

impl RequestParams {
    fn get(&self, name: &str) -> &str {
        self.params.get(name).map(String::as_str).unwrap_or_default()
    }

    fn into_scan_request(self) -> error::Result<ScanRequest> {
        Ok(ScanRequest {
            log_enabled: flag(&self.params, "log", true)?,
            xhdr_enabled: flag(&self.params, "xhdr", false)?,
            ip: self.params.get("ip").cloned(),
            file: self.file,
        })
    }
}

impl<S> FromRequest<S> for RequestParams
where
    S: Send + Sync,
{
    type Rejection = GatewayError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let (mut parts, body) = req.into_parts();
        let mut params = Query::<Params>::from_request_parts(&mut parts, state)
            .await
            .map(|Query(query)| query)
            .unwrap_or_default();
        let is_multipart = parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("multipart/form-data"));
        let req = Request::from_parts(parts, body);

        if !is_multipart {
            if let Ok(Form(form)) = Form::<Params>::from_request(req, state).await {
                params.extend(form);
            }
            return Ok(Self { params, file: None });
        }

        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| GatewayError::caller(format!("malformed upload: {e}")))?;
        let mut file = None;
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| GatewayError::caller(format!("malformed upload: {e}")))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if name == "file" {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| GatewayError::caller(format!("failed to read upload: {e}")))?;
                file = Some(bytes.to_vec());
            } else {
                let value = field
                    .text()
                    .await
                    .map_err(|e| GatewayError::caller(format!("failed to read {name}: {e}")))?;
                params.insert(name, value);
            }
        }
        Ok(Self { params, file })
    }
}

fn flag(params: &Params, name: &str, default: bool) -> error::Result<bool> {
    let Some(value) = params.get(name) else {
        return Ok(default);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "" => Ok(default),
        "yes" | "true" | "on" | "1" => Ok(true),
        "no" | "false" | "off" | "0" => Ok(false),
        _ => Err(GatewayError::caller(format!("{name} must be yes or no"))),
    }
}

fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(&REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn respond(cid: &str, result: error::Result<Vec<u8>>) -> Response {
    let mut response = match result {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
            body,
        )
            .into_response(),
        Err(e) => e.into_response(),
    };
    if let Ok(value) = HeaderValue::from_str(cid) {
        response.headers_mut().insert(REQUEST_ID, value);
    }
    response
}

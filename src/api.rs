//! Thin HTTP control surface over a [`LoadRunner`].
//!
//! Routes:
//! - `POST /start` with `{"endpoint": "/animals", "rps": 10, "profile": "constant"}`
//! - `POST /stop`
//! - `GET /status`
//! - `GET /catalog`
//! - `GET /metrics`

use hyper::header::{self, HeaderValue};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::errors::StartError;
use crate::load_models::ProfileKind;
use crate::metrics::gather_metrics_string;
use crate::run::{validate_rps, LoadRunner, StopOutcome};
use crate::state::RunConfig;

const ROUTES: &[&str] = &["/", "/start", "/stop", "/status", "/catalog", "/metrics"];

/// Body of `POST /start`.
#[derive(Debug, Clone, Deserialize)]
pub struct StartRequest {
    pub endpoint: String,
    pub rps: i64,
    #[serde(default)]
    pub profile: Option<String>,
}

impl StartRequest {
    pub fn into_run_config(self) -> Result<RunConfig, StartError> {
        let max_rps = validate_rps(self.rps)?;
        let profile = self
            .profile
            .as_deref()
            .map_or(ProfileKind::Constant, ProfileKind::from_name);
        Ok(RunConfig::new(self.endpoint, max_rps, profile))
    }
}

#[derive(Serialize)]
struct Index<'a> {
    service: &'static str,
    routes: &'a [&'a str],
}

/// Serves the control surface until `shutdown` resolves.
pub async fn serve<F>(
    addr: SocketAddr,
    runner: Arc<LoadRunner>,
    shutdown: F,
) -> Result<(), hyper::Error>
where
    F: Future<Output = ()>,
{
    let make_svc = make_service_fn(move |_conn| {
        let runner = runner.clone();
        async move { Ok::<_, Infallible>(service_fn(move |req| handle(req, runner.clone()))) }
    });

    let server = Server::try_bind(&addr)?.serve(make_svc);
    info!(addr = %addr, "Control server listening");

    server.with_graceful_shutdown(shutdown).await
}

/// Routes one control request.
pub async fn handle(
    req: Request<Body>,
    runner: Arc<LoadRunner>,
) -> Result<Response<Body>, Infallible> {
    debug!(method = %req.method(), path = %req.uri().path(), "Control request");

    let response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/") => json(
            StatusCode::OK,
            &Index {
                service: "shelter_loadtest",
                routes: ROUTES,
            },
        ),
        (&Method::POST, "/start") => start(req, &runner).await,
        (&Method::POST, "/stop") => match runner.stop().await {
            StopOutcome::Stopped => text(StatusCode::OK, "Stopped"),
            StopOutcome::AlreadyIdle => text(StatusCode::OK, "Not running"),
        },
        (&Method::GET, "/status") => json(StatusCode::OK, &runner.status()),
        (&Method::GET, "/catalog") => json(StatusCode::OK, runner.catalog()),
        (&Method::GET, "/metrics") => match gather_metrics_string() {
            Ok(body) => {
                let mut resp = text(StatusCode::OK, body);
                resp.headers_mut().insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("text/plain; version=0.0.4"),
                );
                resp
            }
            Err(e) => {
                error!(error = %e, "Failed to encode metrics");
                text(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics")
            }
        },
        (_, path) if ROUTES.contains(&path) => {
            text(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
        }
        _ => text(StatusCode::NOT_FOUND, "Not found"),
    };

    Ok(response)
}

async fn start(req: Request<Body>, runner: &LoadRunner) -> Response<Body> {
    let bytes = match hyper::body::to_bytes(req.into_body()).await {
        Ok(b) => b,
        Err(_) => return text(StatusCode::BAD_REQUEST, "Invalid request body"),
    };
    let request: StartRequest = match serde_json::from_slice(&bytes) {
        Ok(r) => r,
        Err(_) => return text(StatusCode::BAD_REQUEST, "Invalid request body"),
    };
    let config = match request.into_run_config() {
        Ok(c) => c,
        Err(e) => return text(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let message = format!(
        "Started load test for {} with {} RPS using {} profile",
        config.endpoint, config.max_rps, config.profile
    );
    match runner.start(config).await {
        Ok(_) => text(StatusCode::OK, message),
        Err(e) => text(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

fn text(status: StatusCode, body: impl Into<String>) -> Response<Body> {
    let mut resp = Response::new(Body::from(body.into()));
    *resp.status_mut() = status;
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    resp
}

fn json<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Response<Body> {
    match serde_json::to_vec(value) {
        Ok(bytes) => {
            let mut resp = Response::new(Body::from(bytes));
            *resp.status_mut() = status;
            resp.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
            resp
        }
        Err(e) => {
            error!(error = %e, "Failed to serialize response");
            text(StatusCode::INTERNAL_SERVER_ERROR, "Failed to serialize response")
        }
    }
}

use bytes::Bytes;
use common::configuration::{ConfigError, Configuration, StateStorageType};
use common::consts::{
    ANALYZE_PATH, CONVERSATIONS_PATH, DEFAULT_CONFIG_PATH, HEALTHZ_PATH, JOBS_PATH, REPORTS_PATH,
    REQUEST_ID_HEADER,
};
use convoscope::handlers::analysis::{job_status, trigger_analysis};
use convoscope::handlers::conversations::upload_conversation;
use convoscope::handlers::reports::{get_report, list_reports};
use convoscope::handlers::utils::{empty, json_response};
use convoscope::jobs::{spawn_sweep_schedule, AnalysisQueue, JobTracker};
use convoscope::signals::{ConversationAnalyzer, LexicalQualityAnalyzer};
use convoscope::state::memory::MemoryConversationStorage;
use convoscope::state::postgresql::PostgreSQLConversationStorage;
use convoscope::state::ConversationStorage;
use convoscope::utils::tracing::init_tracer;
use http_body_util::combinators::BoxBody;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use opentelemetry::trace::FutureExt;
use opentelemetry::{global, Context};
use opentelemetry_http::HeaderExtractor;
use serde_json::json;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

// Utility function to extract the context from the incoming request headers
fn extract_context_from_request(req: &Request<Incoming>) -> Context {
    global::get_text_map_propagator(|propagator| {
        propagator.extract(&HeaderExtractor(req.headers()))
    })
}

/// Accept trailing slashes and the "analyse" spelling of the analyze path
fn normalize_path(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed {
        "" => "/",
        "/api/analyse" => ANALYZE_PATH,
        other => other,
    }
}

async fn route(
    req: Request<Incoming>,
    storage: Arc<dyn ConversationStorage>,
    queue: AnalysisQueue,
) -> Result<Response<BoxBody<Bytes, hyper::Error>>, hyper::Error> {
    let path = normalize_path(req.uri().path()).to_string();

    if let Some(report_id) = path
        .strip_prefix(REPORTS_PATH)
        .and_then(|rest| rest.strip_prefix('/'))
    {
        if req.method() == Method::GET {
            return Ok(get_report(report_id, storage.as_ref()).await);
        }
    }

    if let Some(task_id) = path
        .strip_prefix(JOBS_PATH)
        .and_then(|rest| rest.strip_prefix('/'))
    {
        if req.method() == Method::GET {
            return Ok(job_status(task_id, queue.tracker()).await);
        }
    }

    match (req.method(), path.as_str()) {
        (&Method::POST, CONVERSATIONS_PATH) => upload_conversation(req, storage).await,
        (&Method::POST, ANALYZE_PATH) => trigger_analysis(req, storage, queue).await,
        (&Method::GET, REPORTS_PATH) => Ok(list_reports(storage.as_ref()).await),
        (&Method::GET, HEALTHZ_PATH) => Ok(json_response(StatusCode::OK, &json!({"status": "ok"}))),
        _ => {
            debug!(method = %req.method(), path = %req.uri().path(), "no route found");
            let mut not_found = Response::new(empty());
            *not_found.status_mut() = StatusCode::NOT_FOUND;
            Ok(not_found)
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // loading convoscope_config.yaml (before tracing init so we can read tracing config)
    let config_path =
        env::var("CONVOSCOPE_CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    eprintln!("loading convoscope_config.yaml from {}", config_path);
    let config = Configuration::load(&config_path)?;

    let _tracer_provider = init_tracer(config.tracing.as_ref());
    info!(path = %config_path, version = %config.version, "loaded convoscope_config.yaml");

    let bind_address = env::var("BIND_ADDRESS").unwrap_or_else(|_| config.listener.address.clone());

    let storage: Arc<dyn ConversationStorage> = match &config.state_storage {
        Some(storage_config) if storage_config.storage_type == StateStorageType::Postgres => {
            let connection_string = storage_config.connection_string.clone().ok_or_else(|| {
                ConfigError::Invalid(
                    "connection_string is required for postgres state_storage".to_string(),
                )
            })?;
            info!(storage_type = "postgres", "initializing conversation storage");
            Arc::new(PostgreSQLConversationStorage::new(connection_string).await?)
        }
        Some(_) => {
            info!(storage_type = "memory", "initialized conversation storage");
            Arc::new(MemoryConversationStorage::new())
        }
        None => {
            info!("no state_storage configured, using in-memory conversation storage");
            Arc::new(MemoryConversationStorage::new())
        }
    };

    let analyzer: Arc<dyn ConversationAnalyzer> = Arc::new(LexicalQualityAnalyzer::new());
    let (queue, _workers) = AnalysisQueue::start(
        Arc::clone(&storage),
        Arc::clone(&analyzer),
        JobTracker::with_retention(Duration::from_secs(config.analysis.job_retention_seconds)),
        config.analysis.workers,
        config.analysis.queue_capacity,
    );

    match config.analysis.sweep_interval_seconds {
        Some(seconds) if seconds > 0 => {
            info!(interval_seconds = seconds, "scheduling analysis sweep");
            spawn_sweep_schedule(
                Arc::clone(&storage),
                Arc::clone(&analyzer),
                Duration::from_secs(seconds),
            );
        }
        _ => info!("analysis sweep disabled"),
    }

    let listener = TcpListener::bind(&bind_address).await?;
    info!(address = %bind_address, "convoscope listening");

    loop {
        let (stream, _) = listener.accept().await?;
        let peer_addr = stream.peer_addr()?;
        let io = TokioIo::new(stream);

        let storage = Arc::clone(&storage);
        let queue = queue.clone();
        let service = service_fn(move |req: Request<Incoming>| {
            let storage = Arc::clone(&storage);
            let queue = queue.clone();
            let parent_cx = extract_context_from_request(&req);
            let request_id = req
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|h| h.to_str().ok())
                .map(|s| s.to_string())
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            let span = info_span!(
                "request",
                request_id = %request_id,
                method = %req.method(),
                path = %req.uri().path()
            );

            route(req, storage, queue)
                .instrument(span)
                .with_context(parent_cx)
        });

        tokio::task::spawn(async move {
            debug!(peer = ?peer_addr, "accepted connection");
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                warn!(error = ?err, "error serving connection");
            }
        });
    }
}

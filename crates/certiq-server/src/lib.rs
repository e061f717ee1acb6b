//! HTTP server for certified random bits.
//!
//! Every `/api/v1/random` request runs a fresh sampling job on the configured
//! backend and extracts from it, so responses are slow but each one is backed
//! by its own Bell test.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use certiq_core::bits::{bits_to_bytes, bits_to_string, hex_encode};
use certiq_core::{Extractor, ExtractorParams, LocalExtractor, Pipeline, RngError};

/// Largest request served, in bits.
const MAX_BITS: usize = 1 << 20;

#[derive(Debug, Default)]
struct Stats {
    requests: u64,
    bits_served: u64,
    failures: u64,
    last_error: Option<String>,
}

/// Shared server state.
struct AppState {
    pipeline: Pipeline,
    stats: Mutex<Stats>,
}

#[derive(Deserialize)]
struct RandomParams {
    /// Bytes for `uint8`/`hex`, bits for `bits`.
    length: Option<usize>,
    #[serde(rename = "type")]
    data_type: Option<String>,
}

#[derive(Serialize)]
struct RandomResponse {
    #[serde(rename = "type")]
    data_type: String,
    length: usize,
    data: serde_json::Value,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct ExtractResponse {
    success: bool,
    num_bits: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    bits: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hex: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    backend: String,
    requests: u64,
    bits_served: u64,
    failures: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_error: Option<String>,
}

fn status_for(err: &RngError) -> StatusCode {
    match err {
        RngError::InvalidArgument(_)
        | RngError::InvalidExtractorParams(_)
        | RngError::NotAuthorized(_)
        | RngError::Serde(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Run blocking pipeline work off the async executor.
async fn blocking<T, F>(f: F) -> Result<T, RngError>
where
    F: FnOnce() -> Result<T, RngError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(e) => Err(RngError::backend("server", format!("worker task failed: {e}"))),
    }
}

async fn handle_random(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RandomParams>,
) -> (StatusCode, Json<RandomResponse>) {
    let data_type = params.data_type.unwrap_or_else(|| "hex".to_string());
    let length = params.length.unwrap_or(32);
    let num_bits = match data_type.as_str() {
        "uint8" | "hex" => Some(length.saturating_mul(8)),
        "bits" => Some(length),
        _ => None,
    };
    let Some(num_bits) = num_bits else {
        let error = format!("Unknown type '{data_type}'; use uint8, hex or bits");
        return (
            StatusCode::BAD_REQUEST,
            Json(RandomResponse {
                error: Some(error),
                ..RandomResponse::failure(data_type)
            }),
        );
    };
    if num_bits == 0 || num_bits > MAX_BITS {
        return (
            StatusCode::BAD_REQUEST,
            Json(RandomResponse {
                error: Some(format!("length must give 1..={MAX_BITS} bits")),
                ..RandomResponse::failure(data_type)
            }),
        );
    }

    let pipeline = state.pipeline.clone();
    let outcome = blocking(move || pipeline.random_bits(num_bits)).await;

    let mut stats = state.stats.lock().await;
    stats.requests += 1;
    let bits = match outcome {
        Ok(bits) => bits,
        Err(e) => {
            log::warn!("random request failed: {e}");
            stats.failures += 1;
            stats.last_error = Some(e.to_string());
            return (
                status_for(&e),
                Json(RandomResponse {
                    error: Some(e.to_string()),
                    ..RandomResponse::failure(data_type)
                }),
            );
        }
    };
    stats.bits_served += bits.len() as u64;
    drop(stats);

    let data = match data_type.as_str() {
        "uint8" => serde_json::Value::Array(
            bits_to_bytes(&bits)
                .into_iter()
                .map(serde_json::Value::from)
                .collect(),
        ),
        "hex" => serde_json::Value::String(hex_encode(&bits_to_bytes(&bits))),
        _ => serde_json::Value::String(bits_to_string(&bits)),
    };
    (
        StatusCode::OK,
        Json(RandomResponse {
            data_type,
            length,
            data,
            success: true,
            error: None,
        }),
    )
}

impl RandomResponse {
    fn failure(data_type: String) -> Self {
        Self {
            data_type,
            length: 0,
            data: serde_json::Value::Null,
            success: false,
            error: None,
        }
    }
}

async fn handle_extract(Json(params): Json<ExtractorParams>) -> (StatusCode, Json<ExtractResponse>) {
    match blocking(move || LocalExtractor::new().extract(&params)).await {
        Ok(bits) => (
            StatusCode::OK,
            Json(ExtractResponse {
                success: true,
                num_bits: bits.len(),
                hex: Some(hex_encode(&bits_to_bytes(&bits))),
                bits: Some(bits_to_string(&bits)),
                error: None,
            }),
        ),
        Err(e) => (
            status_for(&e),
            Json(ExtractResponse {
                success: false,
                num_bits: 0,
                bits: None,
                hex: None,
                error: Some(e.to_string()),
            }),
        ),
    }
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let stats = state.stats.lock().await;
    let degraded = stats.requests > 0 && stats.failures == stats.requests;
    Json(HealthResponse {
        status: if degraded { "degraded" } else { "healthy" }.to_string(),
        backend: state.pipeline.backend_name().to_string(),
        requests: stats.requests,
        bits_served: stats.bits_served,
        failures: stats.failures,
        last_error: stats.last_error.clone(),
    })
}

async fn handle_index(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let config = state.pipeline.extractor_config();
    Json(serde_json::json!({
        "name": "certiq server",
        "version": certiq_core::VERSION,
        "backend": state.pipeline.backend_name(),
        "raw_bits_per_run": state.pipeline.num_raw_bits(),
        "trusted_backend": config.trusted_backend,
        "privacy_amplification": config.privacy_amplification,
        "endpoints": {
            "/": "This API index",
            "/api/v1/random": {
                "method": "GET",
                "description": "Sample, certify and extract fresh random data",
                "params": {
                    "length": "Bytes for uint8/hex, bits for bits (default: 32)",
                    "type": "Output format: hex (default), uint8, bits",
                }
            },
            "/api/v1/extract": {
                "method": "POST",
                "description": "Run the two-source extractor on JSON extractor parameters",
            },
            "/health": "Health check",
        },
        "examples": {
            "bytes": "/api/v1/random?length=16&type=uint8",
            "bits": "/api/v1/random?length=128&type=bits",
        }
    }))
}

/// Build the axum router.
fn build_router(pipeline: Pipeline) -> Router {
    let state = Arc::new(AppState {
        pipeline,
        stats: Mutex::new(Stats::default()),
    });

    Router::new()
        .route("/", get(handle_index))
        .route("/api/v1/random", get(handle_random))
        .route("/api/v1/extract", post(handle_extract))
        .route("/health", get(handle_health))
        .with_state(state)
}

/// Serve `pipeline` on `host:port` until the process exits.
pub async fn run_server(pipeline: Pipeline, host: &str, port: u16) -> std::io::Result<()> {
    let backend = pipeline.backend_name().to_string();
    let app = build_router(pipeline);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("certiq server listening on http://{addr} (backend {backend})");
    axum::serve(listener, app).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use certiq_core::{BackendSelection, GeneratorConfig, PipelineConfig};

    fn state() -> Arc<AppState> {
        let config = PipelineConfig {
            backend: BackendSelection {
                seed: Some(5),
                ..Default::default()
            },
            generator: GeneratorConfig {
                num_raw_bits: 3000,
                wsr_seed: Some("server".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        Arc::new(AppState {
            pipeline: Pipeline::from_config(&config).unwrap(),
            stats: Mutex::new(Stats::default()),
        })
    }

    fn query(length: Option<usize>, data_type: &str) -> Query<RandomParams> {
        Query(RandomParams {
            length,
            data_type: Some(data_type.to_string()),
        })
    }

    #[tokio::test]
    async fn test_random_uint8() {
        let st = state();
        let (status, Json(resp)) = handle_random(State(st.clone()), query(Some(16), "uint8")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(resp.success);
        assert_eq!(resp.data.as_array().unwrap().len(), 16);
        assert_eq!(st.stats.lock().await.bits_served, 128);
    }

    #[tokio::test]
    async fn test_random_bits_and_hex() {
        let st = state();
        let (_, Json(bits)) = handle_random(State(st.clone()), query(Some(20), "bits")).await;
        assert_eq!(bits.data.as_str().unwrap().len(), 20);
        let (_, Json(hex)) = handle_random(State(st), query(Some(4), "hex")).await;
        assert_eq!(hex.data.as_str().unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_random_rejects_bad_requests() {
        let st = state();
        let (status, Json(resp)) = handle_random(State(st.clone()), query(Some(4), "uint16")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!resp.success);
        let (status, _) = handle_random(State(st), query(Some(0), "bits")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_extract_endpoint() {
        let st = state();
        let output = st.pipeline.run(3000).unwrap();
        let (status, Json(resp)) = handle_extract(Json(output.params.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resp.num_bits, output.bits.len());
        assert_eq!(resp.bits.unwrap(), bits_to_string(&output.bits));

        let mut broken = output.params;
        broken.ext1_wsr_bits.pop();
        let (status, Json(resp)) = handle_extract(Json(broken)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!resp.success);
    }

    #[tokio::test]
    async fn test_health_counts_requests() {
        let st = state();
        let _ = handle_random(State(st.clone()), query(Some(8), "bits")).await;
        let Json(health) = handle_health(State(st)).await;
        assert_eq!(health.status, "healthy");
        assert_eq!(health.requests, 1);
        assert_eq!(health.backend, "statevector_simulator");
    }
}

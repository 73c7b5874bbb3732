// Herd Census - Web Server
// REST API with Axum over the cleaned extract

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use herd_census::{
    analyze, anomaly_table, diverging_rows, logging, AnalyticsView, CleanedExtract,
    ExtractCache, LoadOptions, MunicipalitySelection, Pipeline, PipelineConfig, PipelineError, Sex,
    Summary,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;

/// Shared application state
#[derive(Clone)]
struct AppState {
    cache: Arc<Mutex<ExtractCache>>,
    pipeline: Arc<Pipeline>,
    source: PathBuf,
    options: LoadOptions,
    top_n: usize,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }
}

impl ApiResponse<()> {
    fn err(message: String) -> Self {
        Self {
            success: false,
            data: (),
            error: Some(message),
        }
    }
}

/// `?municipio=A,B&top=N`
#[derive(Debug, Default, Deserialize)]
struct ViewParams {
    municipio: Option<String>,
    top: Option<usize>,
}

impl ViewParams {
    fn selection(&self) -> MunicipalitySelection {
        self.municipio
            .as_deref()
            .map(MunicipalitySelection::parse_list)
            .unwrap_or_default()
    }
}

/// Summary response
#[derive(Serialize)]
struct SummaryResponse {
    release_id: String,
    #[serde(flatten)]
    summary: Summary,
    anomaly_count: usize,
    dropped_count: usize,
}

// ============================================================================
// Helpers
// ============================================================================

/// Failed request: HTTP status plus the message sent to the client
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<PipelineError> for ApiError {
    fn from(error: PipelineError) -> Self {
        let status = match error {
            PipelineError::SourceUnreadable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError {
            status,
            message: error.to_string(),
        }
    }
}

impl AppState {
    /// Cached extract (reloaded if the file changed) and the view for `params`.
    /// File reads and the cache lock stay on the blocking pool.
    async fn view(&self, params: &ViewParams) -> Result<(Arc<CleanedExtract>, AnalyticsView), ApiError> {
        let state = self.clone();
        let selection = params.selection();
        let top = params.top.unwrap_or(self.top_n);

        let loaded = tokio::task::spawn_blocking(move || {
            let extract = {
                let mut cache = state.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                cache.get_or_load(&state.pipeline, &state.source, state.options)?
            };
            let view = analyze(&extract, &selection, top);
            Ok::<_, PipelineError>((extract, view))
        })
        .await;

        match loaded {
            Ok(result) => result.map_err(ApiError::from),
            Err(join_error) => Err(ApiError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: format!("extract load task failed: {}", join_error),
            }),
        }
    }
}

fn respond<T: Serialize>(result: Result<T, ApiError>) -> Response {
    match result {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::ok(data))).into_response(),
        Err(e) => {
            tracing::error!(status = %e.status, error = %e.message, "request failed");
            (e.status, Json(ApiResponse::err(e.message))).into_response()
        }
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/municipalities/options - Filter options, first-appearance order
async fn municipality_options(State(state): State<AppState>) -> Response {
    respond(state.view(&ViewParams::default()).await.map(|(extract, _)| extract.municipalities()))
}

/// GET /api/holdings - Validated holdings for the selection
async fn get_holdings(State(state): State<AppState>, Query(params): Query<ViewParams>) -> Response {
    respond(state.view(&params).await.map(|(_, view)| view.records))
}

/// GET /api/ranking?top=N - Municipalities by total population
async fn get_ranking(State(state): State<AppState>, Query(params): Query<ViewParams>) -> Response {
    respond(state.view(&params).await.map(|(_, view)| view.ranking))
}

/// GET /api/pyramid - Diverging age/sex pyramid, male negative
async fn get_pyramid(State(state): State<AppState>, Query(params): Query<ViewParams>) -> Response {
    respond(state.view(&params).await.map(|(_, view)| diverging_rows(&view.pyramid, Sex::Male)))
}

/// GET /api/anomalies - Holdings registered with 0 animals
async fn get_anomalies(State(state): State<AppState>, Query(params): Query<ViewParams>) -> Response {
    respond(state.view(&params).await.map(|(_, view)| anomaly_table(&view.anomalies)))
}

/// GET /api/summary - KPI scalars
async fn get_summary(State(state): State<AppState>, Query(params): Query<ViewParams>) -> Response {
    respond(state.view(&params).await.map(|(extract, view)| SummaryResponse {
        release_id: extract.release_id.clone(),
        summary: view.summary,
        anomaly_count: view.anomalies.count,
        dropped_count: view.dropped_count,
    }))
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_logging(std::env::var("HERD_JSON_LOGS").is_ok());

    let config = match std::env::var("HERD_CONFIG") {
        Ok(path) => PipelineConfig::load(&PathBuf::from(path))?,
        Err(_) => PipelineConfig::default(),
    };

    let state = AppState {
        cache: Arc::new(Mutex::new(ExtractCache::new())),
        pipeline: Arc::new(config.pipeline()?),
        source: config.source.path.clone(),
        options: config.load_options()?,
        top_n: config.report.top_n,
    };

    // Warm the cache; a missing extract is reported per request instead
    if let Err(e) = state.view(&ViewParams::default()).await {
        tracing::warn!(source = %state.source.display(), error = %e.message, "extract not loaded at startup");
    }

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/municipalities/options", get(municipality_options))
        .route("/holdings", get(get_holdings))
        .route("/ranking", get(get_ranking))
        .route("/pyramid", get(get_pyramid))
        .route("/anomalies", get(get_anomalies))
        .route("/summary", get(get_summary))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    let addr = std::env::var("HERD_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(%addr, "🚀 server running");
    println!("\n🚀 Server running on http://{}", addr);
    println!("   API: http://{}/api/summary", addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use herd_census::TextEncoding;

    fn state_for(source: PathBuf) -> AppState {
        AppState {
            cache: Arc::new(Mutex::new(ExtractCache::new())),
            pipeline: Arc::new(Pipeline::default()),
            source,
            options: LoadOptions::new(b';', TextEncoding::Utf8),
            top_n: 15,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_view_loads_once_then_hits_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cauca.csv");
        std::fs::write(
            &path,
            "MUNICIPIO;LATITUD;LONGITUD;AFTOSA_BOVINOS_HEMBRAS_0_3_MESES\n\
             Popayán;2,45;-76,6;10\n\
             Cajibío;2,60;-76,6;0\n",
        )
        .unwrap();
        let state = state_for(path);

        let (first, view) = state.view(&ViewParams::default()).await.unwrap();
        assert_eq!(view.summary.holdings, 2);
        assert_eq!(view.summary.total_population, 10);

        let params = ViewParams {
            municipio: Some("Popayán".to_string()),
            top: Some(1),
        };
        let (second, view) = state.view(&params).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(view.summary.holdings, 1);

        let stats = state.cache.lock().unwrap().stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test]
    async fn test_missing_extract_maps_to_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_for(dir.path().join("missing.csv"));

        let err = state.view(&ViewParams::default()).await.unwrap_err();
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(state.cache.lock().unwrap().is_empty());

        let response = respond::<()>(Err(err));
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}

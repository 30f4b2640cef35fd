//! Attribution HTTP service built on axum.

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use shapwell_core::{ServerConfig, Signal};
use shapwell_ml::Attributor;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::error::ApiError;
use crate::types::{ShapRequest, ShapResponse};

/// State shared by all handlers. Cloning is cheap.
#[derive(Clone)]
pub struct GatewayState {
    attributor: Arc<dyn Attributor>,
    base_values: Arc<Vec<f32>>,
    limiter: Arc<Semaphore>,
    config: Arc<ServerConfig>,
    started_at: chrono::DateTime<Utc>,
}

impl std::fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayState")
            .field("input_shape", &self.attributor.input_shape())
            .field("references", &self.attributor.reference_count())
            .field("available_permits", &self.limiter.available_permits())
            .field("config", &self.config)
            .finish()
    }
}

impl GatewayState {
    pub fn new(attributor: Arc<dyn Attributor>, config: ServerConfig) -> Self {
        let base_values = Arc::new(attributor.base_values().to_vec());
        Self {
            attributor,
            base_values,
            limiter: Arc::new(Semaphore::new(config.max_concurrent_explanations.max(1))),
            config: Arc::new(config),
            started_at: Utc::now(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Uptime in seconds since the state was created.
    pub fn uptime_secs(&self) -> u64 {
        (Utc::now() - self.started_at).num_seconds().max(0) as u64
    }
}

/// Build an axum Router with `/shap` and `/health` routes.
pub fn router(state: GatewayState) -> Router {
    let body_limit = state.config.body_limit_bytes;
    Router::new()
        .route("/shap", post(shap_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Compute attributions for a batch of instances.
async fn shap_handler(
    State(state): State<GatewayState>,
    payload: Result<Json<ShapRequest>, JsonRejection>,
) -> Result<Json<ShapResponse>, ApiError> {
    let request_id = Uuid::new_v4();
    let Json(request) = payload?;
    let batch = request.into_batch(state.attributor.input_shape(), state.config.max_instances)?;
    let instances = batch.len_of(ndarray::Axis(0));

    let permit = state
        .limiter
        .clone()
        .acquire_owned()
        .await
        .map_err(|e| ApiError::Internal(format!("explanation limiter closed: {e}")))?;

    let started = Instant::now();
    let attributor = state.attributor.clone();
    // The permit moves into the task so it is held until the computation
    // ends, even if the client goes away first.
    let values = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        attributor.attribute(batch.view())
    })
    .await
    .map_err(|e| ApiError::Internal(format!("explanation task failed: {e}")))??;

    tracing::info!(
        %request_id,
        instances,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Explained instances"
    );
    Ok(Json(ShapResponse::from_arrays(
        &values,
        state.base_values.as_ref().clone(),
    )))
}

/// Health check endpoint.
async fn health_handler(State(state): State<GatewayState>) -> impl IntoResponse {
    let shape = state.attributor.input_shape();
    let body = serde_json::json!({
        "status": "ok",
        "input_shape": shape,
        "classes": Signal::ALL,
        "background_size": state.attributor.reference_count(),
        "max_instances": state.config.max_instances,
        "uptime_secs": state.uptime_secs(),
    });
    Json(body)
}

/// Serve on an already bound listener until `shutdown` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    state: GatewayState,
    shutdown: F,
) -> Result<(), std::io::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

/// Start the attribution service on the configured address.
///
/// Runs until Ctrl-C (or SIGTERM on Unix).
pub async fn run(state: GatewayState) -> Result<(), std::io::Error> {
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "Attribution service listening");
    serve(listener, state, shutdown_signal()).await?;
    tracing::info!("Attribution service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use ndarray::{Array1, Array3, ArrayView3};
    use shapwell_core::InputShape;
    use shapwell_ml::MlError;
    use tower::ServiceExt;

    struct Zeros;

    impl Attributor for Zeros {
        fn input_shape(&self) -> InputShape {
            InputShape::new(2, 2)
        }

        fn class_count(&self) -> usize {
            3
        }

        fn reference_count(&self) -> usize {
            7
        }

        fn base_values(&self) -> Array1<f32> {
            Array1::from(vec![0.25, 0.25, 0.5])
        }

        fn attribute(&self, instances: ArrayView3<f32>) -> Result<Vec<Array3<f32>>, MlError> {
            Ok(instances
                .outer_iter()
                .map(|_| Array3::zeros((2, 2, 3)))
                .collect())
        }
    }

    fn state() -> GatewayState {
        GatewayState::new(Arc::new(Zeros), ServerConfig::default())
    }

    #[test]
    fn test_router_builds() {
        let _app = router(state());
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = router(state());

        let req = axum::http::Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let resp = ServiceExt::<axum::http::Request<Body>>::oneshot(app, req)
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let body = axum::body::to_bytes(resp.into_body(), 10_000)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["input_shape"]["time_steps"], 2);
        assert_eq!(json["classes"], serde_json::json!(["SELL", "HOLD", "BUY"]));
        assert_eq!(json["background_size"], 7);
    }

    #[tokio::test]
    async fn test_serve_stops_on_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let result = serve(listener, state(), async {}).await;
        assert!(result.is_ok());
    }

    #[test]
    fn test_state_clamps_zero_concurrency() {
        let config = ServerConfig {
            max_concurrent_explanations: 0,
            ..Default::default()
        };
        let state = GatewayState::new(Arc::new(Zeros), config);
        assert_eq!(state.limiter.available_permits(), 1);
        assert_eq!(state.base_values.as_ref(), &vec![0.25, 0.25, 0.5]);
    }
}

//! podchaos-api — HTTP surface for the podchaos controllers.
//!
//! Every handler calls exactly one controller operation and renders the
//! result as a single plain-text line:
//!
//! ```text
//! <status> [<host address>     <hostname>] <message>
//! ```
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/` | Simulated request (random 0–999 ms) |
//! | GET | `/liveness` | Liveness probe (200 / 410) |
//! | GET | `/liveness/die` | Start dying |
//! | GET | `/liveness/alive` | Become alive |
//! | GET | `/readiness` | Readiness probe (200 / 423) |
//! | GET, POST | `/readiness/unready` | Become unready, body = healing threshold |
//! | GET | `/readiness/ready` | Become ready |
//! | GET | `/memory` | Memory usage vs target; a body sets the target |
//! | GET, POST | `/memory/start` | Set target, body = percent |
//! | GET | `/memory/stop` | Reset target to idle |
//! | GET | `/stress` | Running load generators |
//! | GET, POST | `/stress/start` | Start/escalate, body = seconds |
//! | GET | `/stress/stop` | Stop load generators |
//! | GET | `/help` | Endpoint listing |
//! | GET | `/metrics` | Prometheus exposition |
//! | GET | `/kill` | Exit the process after one second |

pub mod handlers;
pub mod metrics;
pub mod response;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;

use podchaos_memory::MemoryPressureController;
use podchaos_probe::{LivenessProbe, ReadinessProbe};
use podchaos_stress::StressController;

pub use metrics::{RequestTimer, render_prometheus};
pub use response::HostInfo;

/// Invoked by `/kill` once the response has had time to go out.
pub type KillSwitch = Arc<dyn Fn() + Send + Sync>;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct ApiState {
    pub memory: Arc<MemoryPressureController>,
    pub stress: Arc<StressController>,
    pub liveness: Arc<LivenessProbe>,
    pub readiness: Arc<ReadinessProbe>,
    pub requests: Arc<RequestTimer>,
    pub host: Arc<HostInfo>,
    pub kill: KillSwitch,
}

/// Build the complete router.
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(handlers::home))
        .route("/liveness", get(handlers::liveness))
        .route("/liveness/die", get(handlers::liveness_die))
        .route("/liveness/alive", get(handlers::liveness_alive))
        .route("/readiness", get(handlers::readiness))
        .route(
            "/readiness/unready",
            get(handlers::readiness_unready).post(handlers::readiness_unready),
        )
        .route("/readiness/ready", get(handlers::readiness_ready))
        .route("/memory", get(handlers::memory_status))
        .route(
            "/memory/start",
            get(handlers::memory_start).post(handlers::memory_start),
        )
        .route("/memory/stop", get(handlers::memory_stop))
        .route("/stress", get(handlers::stress_status))
        .route(
            "/stress/start",
            get(handlers::stress_start).post(handlers::stress_start),
        )
        .route("/stress/stop", get(handlers::stress_stop))
        .route("/help", get(handlers::help))
        .route("/metrics", get(handlers::prometheus_metrics))
        .route("/kill", get(handlers::kill))
        .with_state(state)
}

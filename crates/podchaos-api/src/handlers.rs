//! Route handlers.
//!
//! Each handler performs one controller call and renders its outcome with
//! [`reply`]. Request bodies are plain text (a number or nothing).

use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rand::Rng;
use tracing::{info, warn};

use podchaos_core::ChaosError;
use podchaos_probe::{LivenessCheck, ReadinessCheck};

use crate::ApiState;
use crate::metrics::{MetricsView, render_prometheus};
use crate::response::reply;

/// Upper bound (exclusive) of the simulated request time.
const REQUEST_RANGE_MILLIS: u64 = 1000;

/// Delay between answering `/kill` and exiting.
const KILL_DELAY: Duration = Duration::from_secs(1);

const HELP: &str = "
# Endpoints
GET  /                                      - pod IP (200|500)

GET  /liveness                              - liveness probe (200|410)
GET  /liveness/die                          - set pod dying
GET  /liveness/alive                        - set pod alive

GET  /readiness                             - readiness probe (200|423)
GET  /readiness/unready [REQUEST_COUNT_INT] - set pod unready for REQUEST_COUNT_INT (default: 3)
GET  /readiness/ready                       - set pod ready again
POST /readiness/unready [REQUEST_COUNT_INT] - set pod unready for REQUEST_COUNT_INT (default: 3)

GET  /stress                                - show stress state
GET  /stress/start [PERIOD_IN_SEC]          - set system under stress for PERIOD_IN_SEC (default: forever)
GET  /stress/stop                           - stop system stress
POST /stress/start [PERIOD_IN_SEC]          - set system under stress for PERIOD_IN_SEC (default: forever)

GET  /memory [MEMORY_USE_IN_PERCENT]        - show memory consumption, or set it when given
GET  /memory/start [MEMORY_USE_IN_PERCENT]  - set MEMORY_USE_IN_PERCENT (mandatory)
GET  /memory/stop                           - set MEMORY_USE_IN_PERCENT back to idle
POST /memory/start [MEMORY_USE_IN_PERCENT]  - set MEMORY_USE_IN_PERCENT (mandatory)

GET  /metrics                               - prometheus metrics
GET  /help                                  - show this help

GET  /kill                                  - kill the process";

fn error_status(e: &ChaosError) -> StatusCode {
    if e.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

// ── Service ────────────────────────────────────────────────────

/// GET /
pub async fn home(State(state): State<ApiState>) -> Response {
    let millis = rand::thread_rng().gen_range(0..REQUEST_RANGE_MILLIS);
    let started = Instant::now();
    tokio::time::sleep(Duration::from_millis(millis)).await;
    state.requests.record(started.elapsed());
    reply(
        &state.host,
        StatusCode::OK,
        format!("request time was '{millis}' millis"),
    )
}

// ── Liveness ───────────────────────────────────────────────────

/// GET /liveness
pub async fn liveness(State(state): State<ApiState>) -> Response {
    let check = state.liveness.check();
    let status = match check {
        LivenessCheck::Alive => StatusCode::OK,
        LivenessCheck::Dying { .. } => StatusCode::GONE,
    };
    reply(&state.host, status, check)
}

/// GET /liveness/die
pub async fn liveness_die(State(state): State<ApiState>) -> Response {
    reply(&state.host, StatusCode::OK, state.liveness.become_dying())
}

/// GET /liveness/alive
pub async fn liveness_alive(State(state): State<ApiState>) -> Response {
    reply(&state.host, StatusCode::OK, state.liveness.become_alive())
}

// ── Readiness ──────────────────────────────────────────────────

/// GET /readiness
pub async fn readiness(State(state): State<ApiState>) -> Response {
    let check = state.readiness.check();
    let status = match check {
        ReadinessCheck::Ready | ReadinessCheck::Healed => StatusCode::OK,
        ReadinessCheck::Unready { .. } => StatusCode::LOCKED,
    };
    reply(&state.host, status, check)
}

/// GET|POST /readiness/unready. The body is the optional healing threshold.
pub async fn readiness_unready(State(state): State<ApiState>, body: String) -> Response {
    let transition = state.readiness.become_unready(Some(&body));
    let status = if transition.switched() {
        StatusCode::OK
    } else {
        StatusCode::GONE
    };
    reply(&state.host, status, transition)
}

/// GET /readiness/ready
pub async fn readiness_ready(State(state): State<ApiState>) -> Response {
    reply(&state.host, StatusCode::OK, state.readiness.become_ready())
}

// ── Memory ─────────────────────────────────────────────────────

/// GET /memory. A non-empty body sets the target like `/memory/start`.
pub async fn memory_status(State(state): State<ApiState>, body: String) -> Response {
    if !body.trim().is_empty() {
        return set_memory_target(&state, body.trim());
    }
    reply(
        &state.host,
        StatusCode::OK,
        format!(
            "Memory consumption is {}. Use GET/POST /memory/start [%] to reset the maximal value.",
            state.memory.status()
        ),
    )
}

/// GET|POST /memory/start. The body is the target percent.
pub async fn memory_start(State(state): State<ApiState>, body: String) -> Response {
    set_memory_target(&state, body.trim())
}

fn set_memory_target(state: &ApiState, raw: &str) -> Response {
    let result = raw
        .parse::<i64>()
        .map_err(|e| ChaosError::InvalidArgument(format!("'{raw}' is not a number: {e}")))
        .and_then(|percent| state.memory.set_target(percent));

    match result {
        Ok(()) => reply(&state.host, StatusCode::OK, format!("Consume /memory [{raw}]")),
        Err(e) => {
            warn!(input = raw, error = %e, "rejected memory target");
            reply(
                &state.host,
                error_status(&e),
                format!("/memory [{raw}] is not between [0 - 100]."),
            )
        }
    }
}

/// GET /memory/stop
pub async fn memory_stop(State(state): State<ApiState>) -> Response {
    state.memory.release();
    reply(&state.host, StatusCode::OK, "stop memory consumption")
}

// ── Stress ─────────────────────────────────────────────────────

/// GET /stress
pub async fn stress_status(State(state): State<ApiState>) -> Response {
    let status = state.stress.status().await;
    let message = if status.running == 0 {
        format!("System is not under stress ({status}). Use GET/POST /stress/start to stress the system.")
    } else {
        format!("System is under stress with - {status}")
    };
    reply(&state.host, StatusCode::OK, message)
}

/// GET|POST /stress/start. The body is the optional duration in seconds.
pub async fn stress_start(State(state): State<ApiState>, body: String) -> Response {
    let raw = body.trim();
    let duration = if raw.is_empty() {
        None
    } else {
        match raw.parse::<u64>() {
            Ok(secs) => Some(Duration::from_secs(secs)),
            Err(e) => {
                let e = ChaosError::InvalidArgument(format!("'{raw}' is not a number of seconds: {e}"));
                return reply(&state.host, error_status(&e), e);
            }
        }
    };

    match state.stress.start(duration).await {
        Ok(report) => reply(&state.host, StatusCode::OK, report),
        Err(e) => {
            warn!(error = %e, "stress start failed");
            reply(&state.host, error_status(&e), e)
        }
    }
}

/// GET /stress/stop
pub async fn stress_stop(State(state): State<ApiState>) -> Response {
    let report = state.stress.stop().await;
    reply(&state.host, StatusCode::OK, report)
}

// ── Misc ───────────────────────────────────────────────────────

/// GET /help
pub async fn help(State(state): State<ApiState>) -> Response {
    reply(&state.host, StatusCode::OK, HELP)
}

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> Response {
    let stress = state.stress.status().await;
    let view = MetricsView {
        alive: state.liveness.is_alive(),
        ready: state.readiness.is_ready(),
        memory_observed_percent: state.memory.observed_percent(),
        memory_target_percent: state.memory.target_percent(),
        stress_intensity: stress.intensity,
        stress_processes: stress.running,
        requests_total: state.requests.count(),
        request_seconds_total: state.requests.total().as_secs_f64(),
    };
    (
        [("content-type", "text/plain; version=0.0.4")],
        render_prometheus(&view),
    )
        .into_response()
}

/// GET /kill
pub async fn kill(State(state): State<ApiState>) -> Response {
    info!(delay_secs = KILL_DELAY.as_secs(), "kill requested");
    let kill = state.kill.clone();
    tokio::spawn(async move {
        tokio::time::sleep(KILL_DELAY).await;
        kill();
    });
    reply(&state.host, StatusCode::OK, "shutting down ...")
}

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use traitor_core::TraitorConfig;
use traitor_debug::DebugBroker;
use traitor_executor::ScriptExecutor;
use traitor_scheduler::{JobStore, Scheduler};

/// Central shared state, passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: TraitorConfig,
    pub store: Arc<JobStore>,
    pub scheduler: Arc<Scheduler>,
    pub debug: DebugBroker,
}

impl AppState {
    /// Wire the scheduler and debug broker to one store and one executor.
    /// Both subscribe to job deletions here.
    pub fn new(
        config: TraitorConfig,
        store: Arc<JobStore>,
        executor: Arc<dyn ScriptExecutor>,
    ) -> Self {
        let scheduler = Scheduler::new(Arc::clone(&store), Arc::clone(&executor), &config.scheduler);
        let debug = DebugBroker::new(Arc::clone(&store), executor);
        Self {
            config,
            store,
            scheduler,
            debug,
        }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    use crate::http::{cron, health, jobs, runs};

    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/jobs", get(jobs::list).post(jobs::create))
        .route("/api/jobs/run", post(jobs::create_and_run))
        .route(
            "/api/jobs/{id}",
            get(jobs::get_one).put(jobs::update).delete(jobs::remove),
        )
        .route("/api/jobs/{id}/state", post(jobs::set_state))
        .route(
            "/api/jobs/{id}/script",
            get(jobs::get_script).put(jobs::put_script),
        )
        .route("/api/cron/preview", get(cron::preview))
        .route("/api/runs", get(runs::list))
        .route("/api/debug", get(crate::ws::debug::debug_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

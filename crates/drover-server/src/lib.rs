use drover_core::OrchestrationEngine;

mod http;

pub use http::{app_router, serve};

/// Shared state handed to every handler. The engine handle is cheap to clone
/// and the registry behind it is the only mutable resource.
#[derive(Clone)]
pub struct AppState {
    pub engine: OrchestrationEngine,
}

impl AppState {
    pub fn new(engine: OrchestrationEngine) -> Self {
        Self { engine }
    }
}

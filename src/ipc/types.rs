use crate::api::{ApiError, Backend, CashMovement, Section};
use crate::capabilities::Capabilities;
use crate::config::Config;
use crate::guard::{CancelToken, SelectorGuard, Ticket};
use crate::section::SectionView;
use serde::Deserialize;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Everything the event loop receives, in arrival order.
#[derive(Debug)]
pub enum Inbound {
    Line(String),
    Completion(Completion),
    Closed,
}

/// Result of a background load, applied by the loop.
#[derive(Debug)]
pub enum Completion {
    CashMovements {
        ticket: Ticket<String>,
        result: Result<Vec<CashMovement>, ApiError>,
    },
    DashboardStats {
        token: CancelToken,
        result: Result<serde_json::Value, ApiError>,
    },
}

/// Runs loads off the loop and posts their completions back to it.
#[derive(Debug, Clone)]
pub struct Jobs {
    tx: Sender<Inbound>,
}

impl Jobs {
    pub fn new(tx: Sender<Inbound>) -> Self {
        Self { tx }
    }

    pub fn spawn<F>(&self, name: &str, work: F) -> std::io::Result<()>
    where
        F: FnOnce() -> Completion + Send + 'static,
    {
        let tx = self.tx.clone();
        thread::Builder::new()
            .name(format!("academicd-{name}"))
            .spawn(move || {
                let completion = work();
                // The loop is gone when this fails; nothing left to notify.
                let _ = tx.send(Inbound::Completion(completion));
            })
            .map(|_| ())
    }
}

#[derive(Debug, Default)]
pub struct CashView {
    pub guard: SelectorGuard<String>,
    pub movements: Vec<CashMovement>,
    pub loaded_for: Option<String>,
}

#[derive(Debug, Default)]
pub struct DashboardView {
    pub token: Option<CancelToken>,
    pub stats: Option<serde_json::Value>,
}

pub struct AppState {
    pub config: Config,
    pub backend: Arc<dyn Backend>,
    pub jobs: Jobs,
    pub capabilities: Capabilities,
    pub sections: Vec<Section>,
    pub section: Option<SectionView>,
    pub cash: CashView,
    pub dashboard: DashboardView,
}

impl AppState {
    pub fn new(config: Config, backend: Arc<dyn Backend>, jobs: Jobs) -> Self {
        Self {
            config,
            backend,
            jobs,
            capabilities: Capabilities::default(),
            sections: Vec::new(),
            section: None,
            cash: CashView::default(),
            dashboard: DashboardView::default(),
        }
    }
}

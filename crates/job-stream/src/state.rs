use std::sync::Arc;
use std::time::Instant;

use crate::config::{Config, SimulationConfig};
use crate::registry::SessionRegistry;

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    /// Live sessions, keyed by connection.
    pub registry: Arc<SessionRegistry>,
    /// Simulation tunables handed to every new session.
    pub simulation: Arc<SimulationConfig>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(simulation: SimulationConfig) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new()),
            simulation: Arc::new(simulation),
            started_at: Instant::now(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.simulation.clone())
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(SimulationConfig::default())
    }
}

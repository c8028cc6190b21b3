//! Process configuration, resolved once from the environment at startup.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::ops::RangeInclusive;
use std::path::PathBuf;

use tracing::warn;

/// Default port for the server.
pub const DEFAULT_PORT: u16 = 4000;

/// Tunables for the progress simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    /// Number of jobs seeded per connection.
    pub initial_jobs: RangeInclusive<u32>,
    /// Progress added when a job advances.
    pub increment: RangeInclusive<u8>,
    /// Chance, per tick, that an unfinished job advances.
    pub advance_probability: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            initial_jobs: 3..=7,
            increment: 1..=10,
            advance_probability: 0.5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    /// Directory served at `/`. `None` runs WebSocket-only.
    pub static_dir: Option<PathBuf>,
    pub simulation: SimulationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            static_dir: None,
            simulation: SimulationConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Bad values fall back to the
    /// default with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Config::default();

        let port = lookup("JOB_STREAM_PORT")
            .or_else(|| lookup("PORT"))
            .and_then(|raw| match raw.parse::<u16>() {
                Ok(port) => Some(port),
                Err(e) => {
                    warn!(value = %raw, error = %e, "ignoring invalid port");
                    None
                }
            })
            .unwrap_or(DEFAULT_PORT);

        let host = lookup("JOB_STREAM_HOST")
            .and_then(|raw| match raw.parse::<IpAddr>() {
                Ok(ip) => Some(ip),
                Err(e) => {
                    warn!(value = %raw, error = %e, "ignoring invalid host");
                    None
                }
            })
            .unwrap_or(defaults.addr.ip());

        // Priority: STATIC_DIR, then ./public if present, then none.
        let static_dir = lookup("STATIC_DIR").map(PathBuf::from).or_else(|| {
            let public = PathBuf::from("public");
            public.is_dir().then_some(public)
        });

        let mut simulation = defaults.simulation;
        if let Some(raw) = lookup("JOB_STREAM_ADVANCE_PROBABILITY") {
            match raw.parse::<f64>() {
                Ok(p) if (0.0..=1.0).contains(&p) => simulation.advance_probability = p,
                _ => warn!(value = %raw, "ignoring advance probability outside 0..=1"),
            }
        }

        Self {
            addr: SocketAddr::new(host, port),
            static_dir,
            simulation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_canonical_simulation() {
        let sim = SimulationConfig::default();
        assert_eq!(sim.initial_jobs, 3..=7);
        assert_eq!(sim.increment, 1..=10);
        assert_eq!(sim.advance_probability, 0.5);
    }

    #[test]
    fn dedicated_port_wins_over_generic() {
        let config = Config::from_lookup(lookup_from(&[
            ("JOB_STREAM_PORT", "4100"),
            ("PORT", "4200"),
        ]));
        assert_eq!(config.addr.port(), 4100);

        let config = Config::from_lookup(lookup_from(&[("PORT", "4200")]));
        assert_eq!(config.addr.port(), 4200);
    }

    #[test]
    fn invalid_values_fall_back() {
        let config = Config::from_lookup(lookup_from(&[
            ("JOB_STREAM_PORT", "not-a-port"),
            ("JOB_STREAM_HOST", "nowhere"),
            ("JOB_STREAM_ADVANCE_PROBABILITY", "1.5"),
        ]));
        assert_eq!(config.addr.port(), DEFAULT_PORT);
        assert_eq!(config.addr.ip(), IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(config.simulation.advance_probability, 0.5);
    }

    #[test]
    fn overrides_apply() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_lookup(lookup_from(&[
            ("JOB_STREAM_HOST", "127.0.0.1"),
            ("STATIC_DIR", dir.path().to_str().unwrap()),
            ("JOB_STREAM_ADVANCE_PROBABILITY", "0.7"),
        ]));
        assert_eq!(config.addr.ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.static_dir.as_deref(), Some(dir.path()));
        assert_eq!(config.simulation.advance_probability, 0.7);
    }
}

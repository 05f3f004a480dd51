//! Runtime configuration
//!
//! Every knob this server needs is environment-driven, constructed once at
//! startup via [`Settings::from_env`] — following the teacher's
//! `AuthConfig::from_env` convention rather than a config file. `.env` is
//! loaded with `dotenv` for local development; in a real deployment the
//! variables are simply set on the process and `dotenv`'s load is a no-op
//! (it never overrides an already-set variable).

use std::net::SocketAddr;
use std::time::Duration;

use crate::network::auth::AuthConfig;

/// Difficulty/timing defaults from §6.3, overridable via environment so an
/// operator can tune pacing without a rebuild.
#[derive(Clone, Debug)]
pub struct SessionTiming {
    /// Pre-match countdown, multiplayer only.
    pub countdown: Duration,
    /// Wall-clock game duration once both participants are ready.
    pub game_duration: Duration,
    /// Number of alternative solution paths surfaced at game end.
    pub solution_fanout: usize,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            countdown: Duration::from_secs(3),
            game_duration: Duration::from_secs(60),
            solution_fanout: 3,
        }
    }
}

impl SessionTiming {
    fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            countdown: env_secs("SESSION_COUNTDOWN_SECS").unwrap_or(defaults.countdown),
            game_duration: env_secs("SESSION_GAME_DURATION_SECS").unwrap_or(defaults.game_duration),
            solution_fanout: std::env::var("SESSION_SOLUTION_FANOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.solution_fanout),
        }
    }

    /// Total time from "both ready" to the forced `timeout` verdict.
    pub fn deadline(&self) -> Duration {
        self.countdown + self.game_duration
    }
}

fn env_secs(key: &str) -> Option<Duration> {
    std::env::var(key).ok()?.parse::<u64>().ok().map(Duration::from_secs)
}

/// Top-level server configuration, assembled once at process start.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Postgres connection string backing the Graph Store and Stats Writer.
    pub database_url: String,
    /// Address the WebSocket listener binds to.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent channels the transport adapter will accept.
    pub max_connections: usize,
    /// Bearer-token validation configuration for the external identity
    /// provider (kept verbatim from the teacher's `AuthConfig`).
    pub auth: AuthConfig,
    /// Session pacing defaults, overridable per deployment.
    pub timing: SessionTiming,
}

/// Errors constructing [`Settings`] from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable was absent.
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),
    /// A present variable couldn't be parsed into its expected shape.
    #[error("invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}

impl Settings {
    /// Load configuration from the process environment, loading a local
    /// `.env` first if present. `DATABASE_URL` is required; everything else
    /// has a workable default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenv::dotenv();

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL"))?;

        let bind_addr = std::env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDR", format!("{e}")))?;

        let max_connections = std::env::var("MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10_000);

        Ok(Self {
            database_url,
            bind_addr,
            max_connections,
            auth: AuthConfig::from_env(),
            timing: SessionTiming::from_env(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_timing_defaults_match_spec() {
        let timing = SessionTiming::default();
        assert_eq!(timing.countdown, Duration::from_secs(3));
        assert_eq!(timing.game_duration, Duration::from_secs(60));
        assert_eq!(timing.solution_fanout, 3);
        assert_eq!(timing.deadline(), Duration::from_secs(63));
    }
}

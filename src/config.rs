//! Runtime configuration loaded from environment variables

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default listen address, used in warnings
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8025";

#[derive(Debug, Clone)]
pub struct GameConfig {
    /// Length of the answer window for each question
    pub question_seconds: u32,
    /// Interval of the polling reconciliation loop
    pub reconcile_poll_ms: u64,
    /// Interval at which sessions re-derive and push the countdown
    pub countdown_tick_ms: u64,
    /// Optional JSON catalog of terms (falls back to the built-in catalog)
    pub terms_file: Option<PathBuf>,
    pub bind_addr: SocketAddr,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            question_seconds: 30,
            reconcile_poll_ms: 2000,
            countdown_tick_ms: 1000,
            terms_file: None,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8025)),
        }
    }
}

impl GameConfig {
    /// Load config from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let terms_file = std::env::var("BINGO_TERMS_FILE")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        let bind_addr = std::env::var("BINGO_BIND_ADDR")
            .ok()
            .and_then(|v| match SocketAddr::from_str(v.trim()) {
                Ok(addr) => Some(addr),
                Err(e) => {
                    tracing::warn!(
                        "Invalid BINGO_BIND_ADDR '{}': {}. Using {}",
                        v,
                        e,
                        DEFAULT_BIND_ADDR
                    );
                    None
                }
            })
            .unwrap_or(defaults.bind_addr);

        Self {
            question_seconds: positive_from_env("BINGO_QUESTION_SECONDS", defaults.question_seconds),
            reconcile_poll_ms: positive_from_env("BINGO_RECONCILE_POLL_MS", defaults.reconcile_poll_ms),
            countdown_tick_ms: positive_from_env("BINGO_COUNTDOWN_TICK_MS", defaults.countdown_tick_ms),
            terms_file,
            bind_addr,
        }
    }

    pub fn reconcile_poll_interval(&self) -> Duration {
        Duration::from_millis(self.reconcile_poll_ms)
    }

    pub fn countdown_tick_interval(&self) -> Duration {
        Duration::from_millis(self.countdown_tick_ms)
    }
}

/// Read a strictly positive number, keeping the default on absence or garbage
fn positive_from_env<T>(key: &str, default: T) -> T
where
    T: FromStr + PartialOrd + Default + Copy + std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(v) if v > T::default() => v,
            _ => {
                tracing::warn!("Invalid {}='{}', using default {}", key, raw, default);
                default
            }
        },
        Err(_) => default,
    }
}

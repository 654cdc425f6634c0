//! Application configuration loaded from environment variables.
//!
//! - `BITFINEX_WEBSOCKET_URL` overrides the default public endpoint.
//! - `BITFINEX_SEND_TIMEOUT_MS` bounds every outbound frame (default 5000).
//! - `BITFINEX_SYMBOLS` is a comma-separated list for the demo binary.
//! - `BITFINEX_CANDLE_PERIOD_SECS` sets the demo's candle period.

use std::time::Duration;

use crate::error::TickwireError;

/// Default public WebSocket endpoint.
const DEFAULT_WEBSOCKET_URL: &str = "wss://api-pub.bitfinex.com/ws/2";

const DEFAULT_SEND_TIMEOUT_MS: u64 = 5_000;

const DEFAULT_SYMBOL: &str = "tBTCUSD";

/// Top-level application configuration.
#[derive(Debug)]
pub struct AppConfig {
    pub stream: StreamConfig,
    pub symbols: Vec<String>,
    pub candle_period_secs: Option<u64>,
}

/// Settings for a [`StreamSession`](crate::websocket::StreamSession).
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub websocket_url: String,
    pub send_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            websocket_url: DEFAULT_WEBSOCKET_URL.to_string(),
            send_timeout: Duration::from_millis(DEFAULT_SEND_TIMEOUT_MS),
        }
    }
}

/// Loads the application configuration from environment variables.
///
/// # Errors
///
/// Returns [`TickwireError::Config`] if a numeric variable does not parse
/// as a positive integer, or if the symbol list is empty after trimming.
pub fn fetch_config() -> crate::Result<AppConfig> {
    let websocket_url = non_empty_var("BITFINEX_WEBSOCKET_URL")
        .unwrap_or_else(|| DEFAULT_WEBSOCKET_URL.to_string());

    let send_timeout_ms =
        positive_var("BITFINEX_SEND_TIMEOUT_MS")?.unwrap_or(DEFAULT_SEND_TIMEOUT_MS);
    let candle_period_secs = positive_var("BITFINEX_CANDLE_PERIOD_SECS")?;

    let symbols = match non_empty_var("BITFINEX_SYMBOLS") {
        Some(raw) => {
            let symbols: Vec<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
            if symbols.is_empty() {
                return Err(TickwireError::Config(
                    "BITFINEX_SYMBOLS contains no symbols".to_string(),
                ));
            }
            symbols
        }
        None => vec![DEFAULT_SYMBOL.to_string()],
    };

    Ok(AppConfig {
        stream: StreamConfig {
            websocket_url,
            send_timeout: Duration::from_millis(send_timeout_ms),
        },
        symbols,
        candle_period_secs,
    })
}

/// Returns the value of an environment variable if it exists and is non-empty.
fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn positive_var(name: &str) -> crate::Result<Option<u64>> {
    let Some(raw) = non_empty_var(name) else {
        return Ok(None);
    };
    match raw.trim().parse::<u64>() {
        Ok(0) | Err(_) => Err(TickwireError::Config(format!(
            "{name} must be a positive integer, got {raw:?}"
        ))),
        Ok(value) => Ok(Some(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARS: [&str; 4] = [
        "BITFINEX_WEBSOCKET_URL",
        "BITFINEX_SEND_TIMEOUT_MS",
        "BITFINEX_SYMBOLS",
        "BITFINEX_CANDLE_PERIOD_SECS",
    ];

    /// Serializes tests that mutate the process environment.
    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    /// Helper that clears every config var, applies `vars`, runs `f`, then
    /// restores the originals.
    fn with_env<F: FnOnce()>(vars: &[(&str, &str)], f: F) {
        let _guard = ENV_LOCK
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let originals: Vec<(&str, Option<String>)> =
            VARS.iter().map(|k| (*k, std::env::var(k).ok())).collect();

        // SAFETY: ENV_LOCK serializes every test that touches these vars.
        unsafe {
            for k in VARS {
                std::env::remove_var(k);
            }
            for (k, v) in vars {
                std::env::set_var(k, v);
            }
        }

        f();

        for (k, original) in originals {
            // SAFETY: restoring original values under the same lock.
            unsafe {
                match original {
                    Some(val) => std::env::set_var(k, val),
                    None => std::env::remove_var(k),
                }
            }
        }
    }

    #[test]
    fn defaults_without_env_vars() {
        with_env(&[], || {
            let config = fetch_config().unwrap();
            assert_eq!(config.stream.websocket_url, DEFAULT_WEBSOCKET_URL);
            assert_eq!(config.stream.send_timeout, Duration::from_secs(5));
            assert_eq!(config.symbols, vec!["tBTCUSD"]);
            assert!(config.candle_period_secs.is_none());
        });
    }

    #[test]
    fn custom_values() {
        with_env(
            &[
                ("BITFINEX_WEBSOCKET_URL", "ws://127.0.0.1:9000"),
                ("BITFINEX_SEND_TIMEOUT_MS", "250"),
                ("BITFINEX_SYMBOLS", " tBTCUSD, tETHUSD ,,"),
                ("BITFINEX_CANDLE_PERIOD_SECS", "300"),
            ],
            || {
                let config = fetch_config().unwrap();
                assert_eq!(config.stream.websocket_url, "ws://127.0.0.1:9000");
                assert_eq!(config.stream.send_timeout, Duration::from_millis(250));
                assert_eq!(config.symbols, vec!["tBTCUSD", "tETHUSD"]);
                assert_eq!(config.candle_period_secs, Some(300));
            },
        );
    }

    #[test]
    fn rejects_invalid_timeout() {
        for raw in ["0", "-5", "soon"] {
            with_env(&[("BITFINEX_SEND_TIMEOUT_MS", raw)], || {
                let err = fetch_config().unwrap_err();
                assert!(err.to_string().contains("BITFINEX_SEND_TIMEOUT_MS"));
            });
        }
    }

    #[test]
    fn rejects_empty_symbol_list() {
        with_env(&[("BITFINEX_SYMBOLS", " , ")], || {
            let err = fetch_config().unwrap_err();
            assert!(err.to_string().contains("no symbols"));
        });
    }

    #[test]
    fn empty_values_treated_as_absent() {
        with_env(
            &[
                ("BITFINEX_WEBSOCKET_URL", ""),
                ("BITFINEX_SEND_TIMEOUT_MS", ""),
                ("BITFINEX_SYMBOLS", ""),
            ],
            || {
                let config = fetch_config().unwrap();
                assert_eq!(config.stream.websocket_url, DEFAULT_WEBSOCKET_URL);
                assert_eq!(config.symbols, vec!["tBTCUSD"]);
            },
        );
    }
}

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

const ENV_CHROME_TRACE: &str = "SPIRAL_TRACE_CHROME";
const DEFAULT_DIRECTIVE: &str = "info";

static INITIALISED: OnceLock<()> = OnceLock::new();
static CHROME_GUARD: OnceLock<Mutex<Option<tracing_chrome::FlushGuard>>> = OnceLock::new();

/// Errors emitted when configuring the tracing subscriber.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("tracing has already been initialised")]
    AlreadyInitialised,
    #[error("failed to read SPIRAL_TRACE_CHROME: {0}")]
    Env(std::env::VarError),
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

fn chrome_trace_path() -> Result<Option<PathBuf>, InitError> {
    match std::env::var(ENV_CHROME_TRACE) {
        Ok(raw) if !raw.trim().is_empty() => Ok(Some(PathBuf::from(raw.trim()))),
        Ok(_) | Err(std::env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(InitError::Env(err)),
    }
}

/// Installs the global subscriber: `RUST_LOG` filtering (default `info`), a
/// fmt layer on stdout and, when `SPIRAL_TRACE_CHROME` names a file, a chrome
/// trace layer whose flush guard lives until process exit.
pub fn init_tracing() -> Result<(), InitError> {
    let chrome_path = chrome_trace_path()?;
    INITIALISED
        .set(())
        .map_err(|_| InitError::AlreadyInitialised)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(std::io::stdout().is_terminal());
    let registry = Registry::default().with(env_filter()).with(fmt_layer);

    match chrome_path {
        Some(path) => {
            let (chrome_layer, guard) = tracing_chrome::ChromeLayerBuilder::new()
                .file(path)
                .include_args(true)
                .build();
            let slot = CHROME_GUARD.get_or_init(|| Mutex::new(None));
            if let Ok(mut slot) = slot.lock() {
                *slot = Some(guard);
            }
            registry
                .with(chrome_layer)
                .try_init()
                .map_err(|_| InitError::AlreadyInitialised)?;
        }
        None => registry
            .try_init()
            .map_err(|_| InitError::AlreadyInitialised)?,
    }
    Ok(())
}

/// Like [`init_tracing`] but treats an existing subscriber as success.
pub fn ensure_tracing() -> Result<(), InitError> {
    match init_tracing() {
        Err(InitError::AlreadyInitialised) => Ok(()),
        other => other,
    }
}

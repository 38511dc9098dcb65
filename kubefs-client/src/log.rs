use std::{
    fs::File,
    path::Path,
    sync::{Mutex, OnceLock, PoisonError},
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::error::Result;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();
static SETUP: Mutex<()> = Mutex::new(());

pub const LOG_ENV: &str = "KUBEFS_LOG";
pub const LOG_FILE: &str = "kubefs.log";

/// Installs the global file logger. Later calls, concurrent ones included,
/// are no-ops and never reopen the file.
pub fn setup_logger(log_dir: impl AsRef<Path>) -> Result<()> {
    let _setup = SETUP.lock().unwrap_or_else(PoisonError::into_inner);
    if LOG_GUARD.get().is_some() {
        return Ok(());
    }

    let file = File::create(log_dir.as_ref().join(LOG_FILE))?;
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file);

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let file_layer = fmt::layer()
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(non_blocking_writer)
        .with_filter(filter);

    // another global subscriber may already be set by the host
    tracing_subscriber::registry().with(file_layer).try_init().ok();
    LOG_GUARD.set(guard).ok();

    Ok(())
}

//! Logging setup.
//!
//! - `TASKCHECK_LOG` sets the filter, falling back to `RUST_LOG`
//! - `TASKCHECK_LOG_FORMAT=json` switches to JSON lines
//!
//! Logs go to stderr; stdout carries only the report. Panics are logged
//! as single error events, never as a backtrace.

use std::any::Any;
use tracing::error;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "warn,taskcheck=info,taskcheck_core=info,taskcheck_runtime=info";

pub fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("info,taskcheck=debug,taskcheck_core=debug,taskcheck_runtime=debug")
    } else {
        EnvFilter::try_from_env("TASKCHECK_LOG")
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    match std::env::var("TASKCHECK_LOG_FORMAT").as_deref() {
        Ok("json") => builder.json().init(),
        _ => builder.init(),
    }
}

/// Replace the default panic hook with a single `error!` event.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let message = payload_message(info.payload());
        match info.location() {
            Some(location) => error!(
                file = location.file(),
                line = location.line(),
                "panic: {}",
                message
            ),
            None => error!("panic: {}", message),
        }
    }));
}

fn payload_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic payload"
    }
}

/// Tracing subscriber setup
///
/// Diagnostics go to stderr; stdout is reserved for user-facing output and
/// the archival tool. Inside the child both streams are forwarded to the
/// invoker by the engine log stream.

use std::io::IsTerminal;
use tracing_subscriber::EnvFilter;

use crate::utils::ENV_LOG;

pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env(ENV_LOG)
        .unwrap_or_else(|_| EnvFilter::new(format!("basement={}", default_level)));

    // A second init (tests, repeated calls) is harmless
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .compact()
        .try_init();
}

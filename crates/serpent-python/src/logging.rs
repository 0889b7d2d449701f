//! Log output for the extension.
//!
//! `SERPENT_LOG` takes an `EnvFilter` directive (`serpent_bridge=trace`).
//! Without it, a set `TRACE` or `DEBUG` variable selects that level;
//! otherwise only `info` and above are shown. Output goes to stderr.

use std::env;
use std::io::IsTerminal;
use std::sync::OnceLock;

use tracing_subscriber::{fmt, EnvFilter};

/// Directive variable
pub const LOG_ENV: &str = "SERPENT_LOG";

pub(crate) fn default_directive(lookup: impl Fn(&str) -> bool) -> &'static str {
    if lookup("TRACE") {
        "trace"
    } else if lookup("DEBUG") {
        "debug"
    } else {
        "info"
    }
}

/// Install the subscriber; later calls do nothing.
pub fn init() {
    static INITIALISED: OnceLock<()> = OnceLock::new();

    INITIALISED.get_or_init(|| {
        let use_ansi = env::var_os("NO_COLOR").is_none() && std::io::stderr().is_terminal();
        let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
            EnvFilter::new(default_directive(|name| env::var_os(name).is_some()))
        });
        let subscriber = fmt::fmt()
            .with_env_filter(filter)
            .with_ansi(use_ansi)
            .with_writer(std::io::stderr)
            .with_target(true)
            .compact()
            .finish();
        // The host may already have installed a subscriber.
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

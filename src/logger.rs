use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

// Default filter when RUST_LOG isn't set
fn default_level(verbose: bool) -> &'static str {
    match (cfg!(debug_assertions), verbose) {
        (true, _) => "trace",
        (false, true) => "debug",
        (false, false) => "info",
    }
}

pub fn init_logging(verbose: bool) {
    let level = default_level(verbose);

    let (filter, from_env) = match EnvFilter::try_from_default_env() {
        Ok(f) => (f, true),
        Err(_) => (EnvFilter::new(level), false),
    };

    let fmt_layer = fmt::layer().with_target(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter)
        .init();

    if !from_env {
        info!("\"RUST_LOG\" variable not set, defaulting to {level}");
    }
}

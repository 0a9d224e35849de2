//! Tracing subscriber setup for the CLI.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
fn default_directives(level: &str) -> String {
    format!("parley={level},warn")
}

/// Install the global subscriber, writing to stderr.
///
/// `RUST_LOG` wins over `level`. Calling this twice is harmless; the second
/// call leaves the first subscriber in place.
pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_directives_scope_level_to_parley() {
        assert_eq!(default_directives("debug"), "parley=debug,warn");
    }

    #[test]
    fn init_twice_does_not_panic() {
        init_tracing("info");
        init_tracing("debug");
    }
}

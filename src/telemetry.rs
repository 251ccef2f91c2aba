//! Tracing subscriber setup shared by both binaries.

use std::io::{self, IsTerminal};

use tracing_subscriber::EnvFilter;

/// Default directive for a `-v` count: 0 → warn, 1 → info, 2 → debug, 3+ → trace.
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "polynodes_osc=warn,warn",
        1 => "polynodes_osc=info,warn",
        2 => "polynodes_osc=debug,info",
        _ => "trace",
    }
}

/// Install a stderr fmt subscriber. `RUST_LOG` wins over `verbosity`.
///
/// Calling this twice is harmless; the second call leaves the first
/// subscriber in place.
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_increasing_levels() {
        assert!(default_directive(0).contains("warn"));
        assert!(default_directive(1).contains("info"));
        assert!(default_directive(2).contains("debug"));
        assert_eq!(default_directive(9), "trace");
        for v in 0..4 {
            assert!(EnvFilter::try_new(default_directive(v)).is_ok());
        }
    }

    #[test]
    fn init_twice_does_not_panic() {
        init(0);
        init(3);
    }
}

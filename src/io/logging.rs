//! Tracing subscriber setup for the binary

use tracing_subscriber::EnvFilter;

/// How much the binary reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// Warnings and errors only
    Quiet,
    /// Run-level progress
    Normal,
    /// Per-step detail from this crate
    Verbose,
}

impl Verbosity {
    /// Filter directives used when `RUST_LOG` is unset
    pub const fn default_directives(self) -> &'static str {
        match self {
            Self::Quiet => "warn",
            Self::Normal => "info",
            Self::Verbose => "info,hintgan=debug",
        }
    }
}

/// Install a formatting subscriber writing to stderr
///
/// `RUST_LOG` takes precedence over `verbosity`. A second call is a no-op.
pub fn init_logging(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.default_directives()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}

use anyhow::Context as _;
use tracing_subscriber::EnvFilter;

/// How chatty the log output on stderr is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// Only errors
    Quiet,
    /// Warnings about skipped listings, failed assets and index recovery
    Normal,
    /// Also every status change, download and flush of this crate
    Verbose,
}

impl Verbosity {
    pub fn from_flags(quiet: bool, verbose: bool) -> Self {
        match (quiet, verbose) {
            (_, true) => Verbosity::Verbose,
            (true, false) => Verbosity::Quiet,
            (false, false) => Verbosity::Normal,
        }
    }

    /// Filter directives used when `RUST_LOG` is not set
    fn directives(self) -> &'static str {
        match self {
            Verbosity::Quiet => "error",
            Verbosity::Normal => "warn",
            Verbosity::Verbose => "warn,podarchive=debug",
        }
    }
}

/// Install the stderr log subscriber. `RUST_LOG` wins when set.
pub fn init(verbosity: Verbosity) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(verbosity.directives()))
        .context("build log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbosity == Verbosity::Verbose)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("initialize tracing subscriber: {err}"))?;

    Ok(())
}

//! Tracing configuration and initialization.

use tracing_subscriber::{
    EnvFilter,
    fmt::format::FmtSpan,
    layer::SubscriberExt as _,
    util::{SubscriberInitExt as _, TryInitError},
};

enum TrcMode {
    /// Compact single-line events without spans.
    Quiet,
    /// Every event plus span enter/close, for someone chasing a problem.
    Verbose,
}

pub struct Trc {
    mode: TrcMode,
    env_filter: EnvFilter,
}

impl Default for Trc {
    fn default() -> Self {
        let maybe_env_filter =
            EnvFilter::try_from_env("RAF_LOG").or_else(|_| EnvFilter::try_from_default_env());

        match maybe_env_filter {
            Ok(env_filter) => Self {
                // An explicit filter means someone is debugging; show them the spans too.
                mode: TrcMode::Verbose,
                env_filter,
            },
            Err(_) => Self {
                mode: TrcMode::Quiet,
                env_filter: EnvFilter::new("warn"),
            },
        }
    }
}

impl Trc {
    pub fn init(self) -> Result<(), TryInitError> {
        match self.mode {
            TrcMode::Verbose => Self::init_verbose_mode(self.env_filter),
            TrcMode::Quiet => Self::init_quiet_mode(self.env_filter),
        }
    }

    fn init_verbose_mode(env_filter: EnvFilter) -> Result<(), TryInitError> {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_span_events(FmtSpan::ENTER | FmtSpan::CLOSE),
            )
            .try_init()
    }

    fn init_quiet_mode(env_filter: EnvFilter) -> Result<(), TryInitError> {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .without_time()
                    .compact(),
            )
            .try_init()
    }
}

use crate::config::Config;
use log::{LevelFilter, SetLoggerError};
use simplelog::{self, ConfigBuilder};

/// Dependency targets whose logs are dropped unless running at Trace level.
const FILTERED_MODULES: &[&str] = &[
    "sqlx", "sea_orm", "tower", "tracing", "hyper", "axum", "redis", "reqwest",
];

pub struct Logger {}

impl Logger {
    /// Installs the global terminal logger at the configured level.
    ///
    /// Below Trace, logs from noisy dependencies are filtered out.
    pub fn init_logger(config: &Config) -> Result<(), SetLoggerError> {
        let level = config.log_level_filter;

        simplelog::TermLogger::init(
            Self::convert_level_filter(level),
            Self::build_log_config(Self::should_filter_dependencies(level)),
            simplelog::TerminalMode::Mixed,
            simplelog::ColorChoice::Auto,
        )
    }

    fn convert_level_filter(level: LevelFilter) -> simplelog::LevelFilter {
        match level {
            LevelFilter::Off => simplelog::LevelFilter::Off,
            LevelFilter::Error => simplelog::LevelFilter::Error,
            LevelFilter::Warn => simplelog::LevelFilter::Warn,
            LevelFilter::Info => simplelog::LevelFilter::Info,
            LevelFilter::Debug => simplelog::LevelFilter::Debug,
            LevelFilter::Trace => simplelog::LevelFilter::Trace,
        }
    }

    fn should_filter_dependencies(level: LevelFilter) -> bool {
        level != LevelFilter::Trace
    }

    fn build_log_config(apply_filters: bool) -> simplelog::Config {
        let mut builder = ConfigBuilder::new();
        builder.set_time_format_rfc3339();

        if apply_filters {
            for module in FILTERED_MODULES {
                builder.add_filter_ignore_str(module);
            }
        }

        builder.build()
    }
}

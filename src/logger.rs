//! log4rs setup: an `app.log` root appender, a `pipeline.log` for compiled pipelines
//! (target `nexusrel::pipeline`) and optional `dev6.log` routing for developer traces.

use log::LevelFilter;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::append::rolling_file::policy::compound::{
    CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
};
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::{Path, PathBuf};

pub const ENV_LOG_DIR: &str = "NEXUSREL_LOG_DIR";
pub const ENV_LOG_LEVEL: &str = "NEXUSREL_LOG_LEVEL";
pub const ENV_LOG_RETENTION: &str = "NEXUSREL_LOG_RETENTION";
pub const ENV_DEV6: &str = "NEXUSREL_DEV6";

pub const PIPELINE_TARGET: &str = "nexusrel::pipeline";
pub const DEV6_TARGET: &str = "nexusrel::dev6";

const ROLL_SIZE: u64 = 10 * 1024 * 1024;
const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}";

type BoxError = Box<dyn std::error::Error>;

/// Initializes the logging system from a log4rs YAML file.
///
/// # Errors
/// Returns an error if the file cannot be read or describes an invalid configuration.
pub fn init_path(path: &Path) -> Result<(), BoxError> {
    log4rs::init_file(path, log4rs::config::Deserializers::default())?;
    Ok(())
}

#[must_use]
pub fn parse_level(level: Option<&str>) -> LevelFilter {
    match level.unwrap_or("info").to_ascii_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

fn rolling(base: &Path, stem: &str, keep: u32) -> Result<RollingFileAppender, BoxError> {
    let roller = FixedWindowRoller::builder()
        .build(&format!("{}", base.join(format!("{stem}.{{}}.log")).display()), keep)?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(ROLL_SIZE)), Box::new(roller));
    Ok(RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build(base.join(format!("{stem}.log")), Box::new(policy))?)
}

/// Builds the logging configuration without installing it.
///
/// - `dir`: base directory for log files, current directory when `None`
/// - `level`: error|warn|info|debug|trace
/// - `retention`: number of rolled files to keep (default 7)
///
/// # Errors
/// Returns an error if the directory cannot be created or an appender cannot be built.
pub fn build_config(
    dir: Option<&Path>,
    level: Option<&str>,
    retention: Option<usize>,
    enable_dev6: bool,
) -> Result<Config, BoxError> {
    let base = match dir {
        Some(d) => d.to_path_buf(),
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    };
    std::fs::create_dir_all(&base)?;
    let keep = u32::try_from(retention.unwrap_or(7)).unwrap_or(u32::MAX);
    let lvl = parse_level(level);

    let mut builder = Config::builder()
        .appender(Appender::builder().build("app", Box::new(rolling(&base, "app", keep)?)))
        .appender(Appender::builder().build("pipeline", Box::new(rolling(&base, "pipeline", keep)?)))
        .logger(Logger::builder().appender("pipeline").additive(false).build(PIPELINE_TARGET, lvl));

    builder = if enable_dev6 {
        builder
            .appender(Appender::builder().build("dev6", Box::new(rolling(&base, "dev6", keep)?)))
            .logger(
                Logger::builder().appender("dev6").additive(false).build(DEV6_TARGET, LevelFilter::Trace),
            )
    } else {
        builder.logger(Logger::builder().additive(false).build(DEV6_TARGET, LevelFilter::Off))
    };

    Ok(builder.build(Root::builder().appender("app").build(lvl))?)
}

/// Configures logging globally for the process. A second call is a no-op: the first
/// installed logger stays in place.
///
/// # Errors
/// Returns an error if the configuration cannot be built.
pub fn configure_logging(
    dir: Option<&Path>,
    level: Option<&str>,
    retention: Option<usize>,
    enable_dev6: bool,
) -> Result<(), BoxError> {
    let config = build_config(dir, level, retention, enable_dev6)?;
    if log4rs::init_config(config).is_err() {
        log::debug!("logger already initialized");
    }
    Ok(())
}

/// Configures logging from `NEXUSREL_LOG_DIR`, `NEXUSREL_LOG_LEVEL`,
/// `NEXUSREL_LOG_RETENTION` and `NEXUSREL_DEV6`.
///
/// # Errors
/// Returns an error if the configuration cannot be built.
pub fn configure_from_env() -> Result<(), BoxError> {
    let dir = std::env::var(ENV_LOG_DIR).ok().map(PathBuf::from);
    let level = std::env::var(ENV_LOG_LEVEL).ok();
    let retention = std::env::var(ENV_LOG_RETENTION).ok().and_then(|s| s.parse::<usize>().ok());
    let dev6 = std::env::var(ENV_DEV6)
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false);
    configure_logging(dir.as_deref(), level.as_deref(), retention, dev6)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_parsing_defaults_to_info() {
        assert_eq!(parse_level(Some("DEBUG")), LevelFilter::Debug);
        assert_eq!(parse_level(Some("nonsense")), LevelFilter::Info);
        assert_eq!(parse_level(None), LevelFilter::Info);
    }

    #[test]
    fn config_builds_in_fresh_directory() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        let config = build_config(Some(&logs), Some("warn"), Some(3), true).unwrap();
        assert_eq!(config.root().level(), LevelFilter::Warn);
        assert!(logs.exists());
        assert!(config.appenders().iter().any(|a| a.name() == "dev6"));
    }
}

use log::LevelFilter;
use simple_logger::SimpleLogger;

/// Parses `--log`; unknown or absent levels fall back to warnings.
pub(crate) fn log_level(log: Option<&str>) -> LevelFilter {
    match log.map(str::to_lowercase).as_deref() {
        Some("off" | "none") => LevelFilter::Off,
        Some("trace") => LevelFilter::Trace,
        Some("debug") => LevelFilter::Debug,
        Some("info") => LevelFilter::Info,
        Some("error") => LevelFilter::Error,
        _ => LevelFilter::Warn,
    }
}

pub(crate) fn logger_init(log: Option<&str>) {
    SimpleLogger::new()
        .with_level(log_level(log))
        .init()
        .unwrap();
}

#[test]
fn test_log_level() {
    assert_eq!(log_level(None), LevelFilter::Warn);
    assert_eq!(log_level(Some("DEBUG")), LevelFilter::Debug);
    assert_eq!(log_level(Some("none")), LevelFilter::Off);
    assert_eq!(log_level(Some("verbose")), LevelFilter::Warn);
}

use chrono::Local;
use env_logger::fmt::{Color, Style, StyledValue};
use env_logger::Builder;
use log::{Level, LevelFilter, SetLoggerError};

const TIME_FORMAT: &str = "%H:%M:%S.%3f";

/// Installs the global logger. Records of other crates are dropped, so
/// `--debug` only shows our own trace output.
pub(crate) fn init(debug: bool) -> Result<(), SetLoggerError> {
    let logger = builder()
        .filter_level(if debug { LevelFilter::Trace } else { LevelFilter::Info })
        .parse_default_env()
        .build();

    log::set_max_level(logger.filter());
    log::set_boxed_logger(Box::new(logger))
}

fn is_own_target(target: &str) -> bool {
    let crate_target = clap::crate_name!();

    target == crate_target
        || target
            .strip_prefix(crate_target)
            .map_or(false, |rest| rest.starts_with("::"))
}

fn builder() -> Builder {
    let mut builder = Builder::new();

    builder.format(|f, record| {
        use std::io::Write;

        if !is_own_target(record.target()) {
            return Ok(());
        }

        let mut style = f.style();
        let level = level_label(&mut style, record.level());

        writeln!(f, "{} {} > {}", Local::now().format(TIME_FORMAT), level, record.args())
    });

    builder
}

fn level_label(style: &mut Style, level: Level) -> StyledValue<'_, &'static str> {
    let (color, label) = match level {
        Level::Trace => (Color::Magenta, "TRACE"),
        Level::Debug => (Color::Blue, "DEBUG"),
        Level::Info => (Color::Green, "INFO "),
        Level::Warn => (Color::Yellow, "WARN "),
        Level::Error => (Color::Red, "ERROR"),
    };

    style.set_color(color).value(label)
}

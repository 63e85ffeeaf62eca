use std::{fmt::Write, io::IsTerminal, str::FromStr};

use jiff::Timestamp;
use log::{Level, LevelFilter, Record};
use logforth::{
    append::Stdout,
    diagnostic::Diagnostic,
    filter::EnvFilter,
    layout::{JsonLayout, Layout},
};

use crate::args::{Args, LogFormat};

/// Crates following `--log`.
const OWN_CRATES: &[&str] = &["tollgate", "server", "rate_limit", "config"];

/// One line per record: `<utc time> <level> [<target>] <message>`.
#[derive(Debug, Clone, Copy)]
struct LineLayout {
    color: bool,
}

impl LineLayout {
    fn level(self, level: Level) -> String {
        if !self.color {
            return format!("{level:<5}");
        }

        let code = match level {
            Level::Error => 31,
            Level::Warn => 33,
            Level::Info => 32,
            Level::Debug => 34,
            Level::Trace => 35,
        };

        format!("\x1b[{code}m{level:<5}\x1b[0m")
    }
}

impl Layout for LineLayout {
    fn format(&self, record: &Record<'_>, _diagnostics: &[Box<dyn Diagnostic>]) -> anyhow::Result<Vec<u8>> {
        let mut line = String::new();

        write!(
            line,
            "{} {} [{}] {}",
            Timestamp::now().strftime("%Y-%m-%dT%H:%M:%S%.3fZ"),
            self.level(record.level()),
            record.target(),
            record.args()
        )?;

        Ok(line.into_bytes())
    }
}

/// `--log off` silences everything; other levels apply to our crates only.
fn directives(level: LevelFilter) -> String {
    if level == LevelFilter::Off {
        return "off".to_string();
    }

    let level = level.as_str().to_ascii_lowercase();

    std::iter::once("warn".to_string())
        .chain(OWN_CRATES.iter().map(|krate| format!("{krate}={level}")))
        .collect::<Vec<_>>()
        .join(",")
}

pub(super) fn init(args: &Args) {
    logforth::builder()
        .dispatch(|d| {
            let d = d.filter(EnvFilter::from_str(&directives(args.log_level)).expect("directives are always valid"));

            match args.log_format {
                LogFormat::Text => d.append(Stdout::default().with_layout(LineLayout {
                    color: std::io::stdout().is_terminal(),
                })),
                LogFormat::Json => d.append(Stdout::default().with_layout(JsonLayout::default())),
            }
        })
        .apply();
}

//! Tracing subscriber setup: console formatter, file layer, and initialisation.
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::utils::{
    KEEP_LOGS, format_utc_datetime, format_utc_time, log_file_path, log_root, prune_logs,
    strip_ansi,
};

/// Target used for stage headers.
pub(super) const STAGE_TARGET: &str = "syscfg::stage";
/// Target used for dry-run notices.
pub(super) const DRY_RUN_TARGET: &str = "syscfg::dry_run";

/// Console behaviour selected on the command line.
#[derive(Debug, Clone, Copy, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct ConsoleOptions {
    /// Show debug events on the console.
    pub verbose: bool,
    /// Only show warnings and errors on the console.
    pub quiet: bool,
    /// Emit ANSI colours.
    pub color: bool,
    /// Machine-readable output owns stdout; send all console logging to stderr.
    pub json: bool,
}

/// Extracts the `message` field from a [`tracing::Event`].
#[derive(Default)]
struct MessageExtractor {
    message: String,
}

impl tracing::field::Visit for MessageExtractor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        }
    }
}

/// A [`tracing_subscriber::Layer`] that appends all events to the run log
/// with timestamps and ANSI codes stripped.
///
/// Always captures events at `DEBUG` level and above regardless of the
/// console verbosity setting.
#[derive(Debug)]
pub(super) struct FileLayer {
    file: Mutex<fs::File>,
}

impl FileLayer {
    /// Open (or create) the log file at `path`, write a run header, and
    /// return a new `FileLayer` ready to receive events.
    ///
    /// Returns `None` if the file cannot be opened.
    pub(super) fn new(path: &Path, command: &str) -> Option<Self> {
        let version =
            option_env!("SYSCFG_VERSION").unwrap_or(concat!("dev-", env!("CARGO_PKG_VERSION")));
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()?;
        write!(
            file,
            "==========================================\n\
             syscfg {version} {command} {}\n\
             ==========================================\n",
            format_utc_datetime(),
        )
        .ok()?;
        Some(Self {
            file: Mutex::new(file),
        })
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for FileLayer {
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let metadata = event.metadata();
        let level = *metadata.level();
        let target = metadata.target();

        let mut extractor = MessageExtractor::default();
        event.record(&mut extractor);
        let msg = strip_ansi(&extractor.message);
        let ts = format_utc_time();

        let line = match (level, target) {
            (tracing::Level::INFO, STAGE_TARGET) => format!("[{ts}] ==> {msg}"),
            (tracing::Level::INFO, DRY_RUN_TARGET) => format!("[{ts}]     [dry run] {msg}"),
            (tracing::Level::ERROR, _) => format!("[{ts}]     [error] {msg}"),
            (tracing::Level::WARN, _) => format!("[{ts}]     [warn] {msg}"),
            (tracing::Level::DEBUG | tracing::Level::TRACE, _) => {
                format!("[{ts}]     [debug] {msg}")
            }
            _ => format!("[{ts}]     {msg}"),
        };

        if let Ok(mut f) = self.file.lock() {
            writeln!(f, "{line}").ok();
        }
    }
}

/// A [`tracing_subscriber::fmt::FormatEvent`] that emits syscfg-style
/// console output.
struct ConsoleFormatter {
    color: bool,
}

impl ConsoleFormatter {
    fn render(&self, level: tracing::Level, target: &str, msg: &str) -> String {
        let line = match level {
            tracing::Level::ERROR => format!("\x1b[31mERROR\x1b[0m {msg}"),
            tracing::Level::WARN => format!("\x1b[33mWARN\x1b[0m  {msg}"),
            tracing::Level::INFO if target == STAGE_TARGET => {
                format!("\x1b[1;34m==>\x1b[0m \x1b[1m{msg}\x1b[0m")
            }
            tracing::Level::INFO if target == DRY_RUN_TARGET => {
                format!("  \x1b[33m[DRY RUN]\x1b[0m {msg}")
            }
            tracing::Level::INFO => format!("  {msg}"),
            _ => format!("  \x1b[2m{msg}\x1b[0m"),
        };
        if self.color { line } else { strip_ansi(&line) }
    }
}

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for ConsoleFormatter
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: tracing_subscriber::fmt::format::Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let metadata = event.metadata();
        let mut extractor = MessageExtractor::default();
        event.record(&mut extractor);
        writeln!(
            writer,
            "{}",
            self.render(*metadata.level(), metadata.target(), &extractor.message)
        )
    }
}

/// Environment variable that overrides the console filter with
/// `tracing-subscriber` directives (e.g. `SYSCFG_LOG=debug`).
pub const LOG_ENV: &str = "SYSCFG_LOG";

/// Initialise the global [`tracing`] subscriber.
///
/// Sets up a console layer formatted in the syscfg output style and a file
/// layer that writes all events (including `debug`) to
/// `$XDG_STATE_HOME/syscfg/logs/YYYY-MM-DD/<command>-HHMMSS.log`. Older run
/// logs beyond the newest 30 are pruned first.
///
/// Must be called once at program startup, before any logging. Returns the
/// path of the run log, or `None` when it could not be created (console
/// logging still works).
pub fn init_subscriber(options: ConsoleOptions, command: &str) -> Option<PathBuf> {
    use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt as _};
    use tracing_subscriber::{
        EnvFilter, Layer as _, filter::LevelFilter, fmt, layer::SubscriberExt as _,
        util::SubscriberInitExt as _,
    };

    let console_level = if options.quiet {
        LevelFilter::WARN
    } else if options.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    let make_writer = if options.json {
        BoxMakeWriter::new(std::io::stderr)
    } else {
        BoxMakeWriter::new(
            std::io::stderr
                .with_max_level(tracing::Level::WARN)
                .and(std::io::stdout.with_min_level(tracing::Level::INFO)),
        )
    };

    let console_layer = fmt::layer()
        .event_format(ConsoleFormatter {
            color: options.color,
        })
        .with_writer(make_writer)
        .with_filter(
            EnvFilter::try_from_env(LOG_ENV)
                .unwrap_or_else(|_| EnvFilter::default().add_directive(console_level.into())),
        );

    let root = log_root();
    let path = log_file_path(&root, command, chrono::Utc::now());
    let file_layer = path
        .as_deref()
        .and_then(|p| FileLayer::new(p, command))
        .map(|l| l.with_filter(LevelFilter::DEBUG));
    let path = path.filter(|_| file_layer.is_some());

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();

    prune_logs(&root, KEEP_LOGS);
    path
}

/// Whether colour should be used: not disabled by flag, `NO_COLOR` unset.
#[must_use]
pub fn color_enabled(no_color_flag: bool) -> bool {
    !no_color_flag && std::env::var_os("NO_COLOR").is_none_or(|v| v.is_empty())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use tracing::Level;

    #[test]
    fn console_colors_levels() {
        let fmt = ConsoleFormatter { color: true };
        assert_eq!(
            fmt.render(Level::ERROR, "syscfg", "boom"),
            "\x1b[31mERROR\x1b[0m boom"
        );
        assert!(fmt.render(Level::INFO, STAGE_TARGET, "Deploy").contains("==>"));
    }

    #[test]
    fn console_without_color_is_plain() {
        let fmt = ConsoleFormatter { color: false };
        insta::assert_snapshot!(fmt.render(Level::WARN, "syscfg", "skipped"), @"WARN  skipped");
        insta::assert_snapshot!(fmt.render(Level::INFO, DRY_RUN_TARGET, "would write /etc/x"), @"  [DRY RUN] would write /etc/x");
        insta::assert_snapshot!(fmt.render(Level::INFO, STAGE_TARGET, "Artifacts"), @"==> Artifacts");
    }

    #[test]
    fn file_layer_writes_header() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("run.log");
        let layer = FileLayer::new(&path, "verify");
        assert!(layer.is_some());
        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("syscfg "));
        assert!(contents.contains(" verify "));
    }

    #[test]
    fn color_flag_disables_color() {
        assert!(!color_enabled(true));
    }
}

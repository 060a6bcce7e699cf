use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initializes the logging system with both console and file output.
///
/// The returned guard flushes the file writer when dropped, so the caller keeps it alive
/// for as long as the process runs.
pub fn init_logging() -> WorkerGuard {
    let _ = fs::create_dir_all("logs");

    let file_appender = tracing_appender::rolling::daily("logs", "cevennes.log");
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer().json().with_writer(non_blocking_writer);
    let console_layer = fmt::layer().with_writer(std::io::stdout);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("cevennes_connect=info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    guard
}

/// Human-readable step log returned alongside long-running admin operations.
///
/// Every line is also emitted through `tracing` so the server log and the admin UI agree.
#[derive(Debug, Default, Clone)]
pub struct ProgressLog {
    lines: Vec<String>,
}

impl ProgressLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&mut self, line: impl Into<String>) {
        let line = line.into();
        tracing::info!(target: "cevennes_connect::progress", "{}", line);
        self.lines.push(line);
    }

    pub fn warn(&mut self, line: impl Into<String>) {
        let line = line.into();
        tracing::warn!(target: "cevennes_connect::progress", "{}", line);
        self.lines.push(format!("⚠️ {line}"));
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_log_keeps_order_and_marks_warnings() {
        let mut log = ProgressLog::new();
        log.step("fetching 2 pages");
        log.warn("page b failed");
        log.step("done");

        assert_eq!(
            log.into_lines(),
            vec!["fetching 2 pages", "⚠️ page b failed", "done"]
        );
    }
}

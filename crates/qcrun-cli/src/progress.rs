use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use qcrun::core::io::monitor::{DEFAULT_UPDATE_INTERVAL, OutputMonitor, PRINT_UPDATE_INTERVAL};
use std::time::Duration;

const SPINNER_TICK_MS: u64 = 80;

/// A terminal spinner that shows the latest line a running program printed.
///
/// With `echo`, the full output is also streamed to stderr, keeping stdout free for
/// the results document.
pub struct OutputSpinner {
    pb: ProgressBar,
    echo: bool,
}

impl OutputSpinner {
    pub fn new(message: impl Into<String>, echo: bool) -> Self {
        Self::with_draw_target(message, echo, ProgressDrawTarget::stderr())
    }

    fn with_draw_target(
        message: impl Into<String>,
        echo: bool,
        target: ProgressDrawTarget,
    ) -> Self {
        let pb = ProgressBar::new_spinner()
            .with_style(Self::spinner_style())
            .with_message(message.into());
        pb.set_draw_target(target);
        pb.enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
        Self { pb, echo }
    }

    pub fn monitor(&self) -> OutputMonitor<'static> {
        let pb = self.pb.clone();
        let echo = self.echo;
        let interval = if echo {
            PRINT_UPDATE_INTERVAL
        } else {
            DEFAULT_UPDATE_INTERVAL
        };
        OutputMonitor::with_callback(Box::new(move |_full: &str, delta: &str| {
            if echo {
                pb.suspend(|| eprint!("{delta}"));
            }
            if let Some(line) = last_line(delta) {
                pb.set_message(line.to_string());
            }
        }))
        .with_interval(interval)
    }

    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }
}

fn last_line(text: &str) -> Option<&str> {
    text.lines().rev().map(str::trim).find(|line| !line.is_empty())
}

use std::io::Write;
use std::time::{Duration, Instant};

pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_millis(500);
pub const PRINT_UPDATE_INTERVAL: Duration = Duration::from_millis(100);

/// Receives `(full_output_so_far, output_since_last_call)`.
pub type OutputCallback<'a> = Box<dyn Fn(&str, &str) + Send + Sync + 'a>;

/// Caller-supplied observer of a running program's output.
pub struct OutputMonitor<'a> {
    callback: Option<OutputCallback<'a>>,
    min_interval: Duration,
}

impl Default for OutputMonitor<'_> {
    fn default() -> Self {
        Self {
            callback: None,
            min_interval: DEFAULT_UPDATE_INTERVAL,
        }
    }
}

impl<'a> OutputMonitor<'a> {
    /// A monitor that observes nothing.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: OutputCallback<'a>) -> Self {
        Self {
            callback: Some(callback),
            min_interval: DEFAULT_UPDATE_INTERVAL,
        }
    }

    pub fn with_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    /// Echoes each new chunk of output to this process's stdout.
    pub fn printing() -> OutputMonitor<'static> {
        OutputMonitor::with_callback(Box::new(|_full: &str, delta: &str| {
            let mut stdout = std::io::stdout().lock();
            let _ = stdout.write_all(delta.as_bytes());
            let _ = stdout.flush();
        }))
        .with_interval(PRINT_UPDATE_INTERVAL)
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.callback.is_some()
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    #[inline]
    pub fn emit(&self, full: &str, delta: &str) {
        if let Some(cb) = &self.callback {
            cb(full, delta);
        }
    }
}

/// Accumulates streamed output and forwards it to a monitor, throttled.
///
/// The monitor is called at most once per `min_interval`, only when new text arrived
/// since the previous call, and once more from [`finish`](Self::finish) if anything is
/// left unflushed. Deltas never overlap and their concatenation equals the full text.
pub struct OutputAccumulator<'m, 'a> {
    text: String,
    flushed: usize,
    last_emit: Instant,
    monitor: Option<&'m OutputMonitor<'a>>,
}

impl<'m, 'a> OutputAccumulator<'m, 'a> {
    pub fn new(monitor: Option<&'m OutputMonitor<'a>>) -> Self {
        Self {
            text: String::new(),
            flushed: 0,
            last_emit: Instant::now(),
            monitor: monitor.filter(|m| m.is_active()),
        }
    }

    pub fn push(&mut self, chunk: &str) {
        self.text.push_str(chunk);
        let Some(monitor) = self.monitor else {
            return;
        };
        if self.text.len() > self.flushed && self.last_emit.elapsed() >= monitor.min_interval()
        {
            self.flush(monitor);
        }
    }

    /// Flushes any output not yet delivered to the monitor.
    pub fn finish(&mut self) {
        if let Some(monitor) = self.monitor {
            if self.text.len() > self.flushed {
                self.flush(monitor);
            }
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    fn flush(&mut self, monitor: &OutputMonitor<'a>) {
        monitor.emit(&self.text, &self.text[self.flushed..]);
        self.flushed = self.text.len();
        self.last_emit = Instant::now();
    }
}

//! Progress logging for training runs.

use std::time::Instant;

/// How much training progress to print.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    /// No output.
    Silent,
    /// Depth transitions and lifecycle messages.
    #[default]
    Info,
    /// Per-node split parameters and leaf distributions.
    Debug,
}

/// Stdout logger with elapsed-time stamps.
///
/// Progress lines carry two clocks, total elapsed and elapsed since the
/// previous progress line, formatted `(hh:mm:ss / hh:mm:ss)`.
#[derive(Debug)]
pub struct TrainingLogger {
    verbosity: Verbosity,
    begin: Instant,
    last: Instant,
}

impl TrainingLogger {
    pub fn new(verbosity: Verbosity) -> Self {
        let now = Instant::now();
        Self {
            verbosity,
            begin: now,
            last: now,
        }
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    /// Print a lifecycle message at `Info`.
    pub fn info(&self, msg: &str) {
        if self.verbosity >= Verbosity::Info {
            println!("{msg}");
        }
    }

    /// Print a per-node detail message at `Debug`.
    pub fn debug(&self, msg: &str) {
        if self.verbosity >= Verbosity::Debug {
            println!("{msg}");
        }
    }

    /// Print a time-stamped progress line at `Info` and reset the
    /// since-last clock.
    pub fn progress(&mut self, msg: &str) {
        let now = Instant::now();
        if self.verbosity >= Verbosity::Info {
            println!(
                "({} / {}) {msg}",
                format_elapsed(now.duration_since(self.begin).as_secs()),
                format_elapsed(now.duration_since(self.last).as_secs()),
            );
        }
        self.last = now;
    }
}

fn format_elapsed(total_seconds: u64) -> String {
    let seconds = total_seconds % 60;
    let minutes = (total_seconds / 60) % 60;
    let hours = total_seconds / 3600;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_ordering() {
        assert!(Verbosity::Silent < Verbosity::Info);
        assert!(Verbosity::Info < Verbosity::Debug);
        assert_eq!(Verbosity::default(), Verbosity::Info);
    }

    #[test]
    fn elapsed_formatting() {
        assert_eq!(format_elapsed(0), "00:00:00");
        assert_eq!(format_elapsed(61), "00:01:01");
        assert_eq!(format_elapsed(3661), "01:01:01");
        assert_eq!(format_elapsed(25 * 3600), "25:00:00");
    }
}

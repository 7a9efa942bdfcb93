use indicatif::{HumanDuration, ProgressBar};
use std::time::{Duration, Instant};

/// Spinner for a single long-running step (hidden when stdout is not a terminal)
pub struct Spinner {
    pb: ProgressBar,
    started: Instant,
}

impl Spinner {
    pub fn new(message: &str) -> Self {
        let pb = if console::Term::stdout().is_term() && !crate::output::is_quiet() {
            ProgressBar::new_spinner()
        } else {
            ProgressBar::hidden()
        };
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        Self {
            pb,
            started: Instant::now(),
        }
    }

    pub fn finish_with_message(&self, msg: &str) {
        self.pb
            .finish_with_message(format!("{} ({})", msg, HumanDuration(self.started.elapsed())));
    }

    /// Remove the spinner line without leaving a message
    pub fn clear(&self) {
        self.pb.finish_and_clear();
    }
}

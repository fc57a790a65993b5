//! Progress UI (spinner) for track batches.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// Spinner reporting `[done/total]` plus the last finished track.
///
/// Disabled in quiet and dry-run modes, where it is a no-op.
pub(crate) struct BatchProgress {
    spinner: Option<ProgressBar>,
    done: AtomicUsize,
    total: usize,
}

impl BatchProgress {
    pub(crate) fn new(enabled: bool, total: usize) -> Self {
        let spinner = enabled.then(|| {
            let spinner = ProgressBar::new_spinner();
            spinner.set_style(
                ProgressStyle::with_template("{spinner} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            spinner.enable_steady_tick(Duration::from_millis(100));
            spinner.set_message(format!("[0/{total}] Resolving..."));
            spinner
        });
        Self {
            spinner,
            done: AtomicUsize::new(0),
            total,
        }
    }

    pub(crate) fn track_finished(&self, track_id: &str) {
        let done = self.done.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(spinner) = &self.spinner {
            spinner.set_message(format!("[{}/{}] Finished {track_id}", done.min(self.total), self.total));
        }
    }

    pub(crate) fn finish(&self) {
        if let Some(spinner) = &self.spinner {
            spinner.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_progress_still_counts() {
        let progress = BatchProgress::new(false, 2);
        progress.track_finished("1");
        progress.track_finished("2");
        assert_eq!(progress.done.load(Ordering::SeqCst), 2);
        progress.finish();
    }
}

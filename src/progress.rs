use log::info;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Thread-safe tick counter that logs every tenth of the way to `total`.
pub struct Progress {
    label: &'static str,
    total: usize,
    step: usize,
    done: AtomicUsize,
}

impl Progress {
    pub fn new(label: &'static str, total: usize) -> Self {
        Progress {
            label,
            total,
            step: (total / 10).max(1),
            done: AtomicUsize::new(0),
        }
    }

    pub fn tick(&self) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        if done % self.step == 0 || done == self.total {
            info!(
                "{}: {}/{} ({:.0}%)",
                self.label,
                done,
                self.total,
                100.0 * done as f64 / self.total as f64
            );
        }
    }

    pub fn done(&self) -> usize {
        self.done.load(Ordering::Relaxed)
    }
}

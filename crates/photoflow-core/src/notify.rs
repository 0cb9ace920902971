//! Progress hooks handed to the scanner and the copier.
//!
//! Both are called synchronously on the thread driving the organizer, so
//! implementations may touch UI state without extra synchronization.

use std::path::Path;

use chrono::NaiveDateTime;

/// Notified each time the date scan finds a new earliest capture time.
pub trait DateObserver {
    fn on_date_found(&self, file: &Path, taken: NaiveDateTime);
}

impl<F> DateObserver for F
where
    F: Fn(&Path, NaiveDateTime),
{
    fn on_date_found(&self, file: &Path, taken: NaiveDateTime) {
        self(file, taken)
    }
}

/// Notified after every finished copy, in completion order.
pub trait CopyProgress {
    fn on_progress(&self, completed: usize, total: usize, current: &Path);
}

impl<F> CopyProgress for F
where
    F: Fn(usize, usize, &Path),
{
    fn on_progress(&self, completed: usize, total: usize, current: &Path) {
        self(completed, total, current)
    }
}

/// Observer that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct Silent;

impl DateObserver for Silent {
    fn on_date_found(&self, _file: &Path, _taken: NaiveDateTime) {}
}

impl CopyProgress for Silent {
    fn on_progress(&self, _completed: usize, _total: usize, _current: &Path) {}
}

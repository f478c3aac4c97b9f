//! Bounded FIFO of the most recently written notifications.
//!
//! The gateway reports a rejection only after the offending frame, naming
//! its identifier, and silently discards everything written after it. The
//! window is what makes those survivors recoverable: it holds the last `W`
//! notifications whose frames were fully written, in send order, so the
//! error handler can locate the rejected one and replay its successors.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::metrics;
use crate::notification::Notification;

pub(crate) struct SentWindow {
    capacity: usize,
    entries: Mutex<VecDeque<Notification>>,
}

impl SentWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    /// Append a notification whose frame was fully written. Evicts the
    /// oldest entry once the window is full; an evicted notification can no
    /// longer be replayed or reported if the gateway later rejects it.
    pub fn record(&self, notification: Notification) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.len() >= self.capacity {
            if let Some(evicted) = entries.pop_front() {
                tracing::debug!(
                    identifier = evicted.identifier,
                    window_size = entries.len(),
                    "evicted oldest notification from full sent window"
                );
            }
        }
        entries.push_back(notification);
        metrics::SENT_WINDOW_SIZE.set(entries.len() as i64);
    }

    /// Locate `identifier` scanning newest to oldest, then take the match
    /// and everything written after it out of the window in one locked
    /// operation.
    ///
    /// Returns the matched notification and the survivors in send order
    /// (oldest first). `None` when the identifier has already been evicted
    /// or was never recorded; nothing is removed in that case.
    pub fn split_at_failure(
        &self,
        identifier: u32,
    ) -> Option<(Notification, Vec<Notification>)> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let index = entries.iter().rposition(|n| n.identifier == identifier)?;

        let mut tail = entries.split_off(index);
        metrics::SENT_WINDOW_SIZE.set(entries.len() as i64);
        drop(entries);

        let failed = tail.pop_front()?;
        Some((failed, tail.into_iter().collect()))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(identifier: u32) -> Notification {
        Notification::builder("ab".repeat(32))
            .identifier(identifier)
            .build()
    }

    #[test]
    fn test_record_keeps_send_order() {
        let window = SentWindow::new(10);
        for id in 1..=3 {
            window.record(notification(id));
        }
        assert_eq!(window.len(), 3);

        let (failed, survivors) = window.split_at_failure(1).unwrap();
        assert_eq!(failed.identifier, 1);
        let ids: Vec<u32> = survivors.iter().map(|n| n.identifier).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn test_capacity_bound_evicts_oldest() {
        let window = SentWindow::new(3);
        for id in 1..=5 {
            window.record(notification(id));
        }
        assert_eq!(window.len(), 3);

        // 1 and 2 were evicted.
        assert!(window.split_at_failure(1).is_none());
        assert!(window.split_at_failure(2).is_none());
        assert!(window.split_at_failure(3).is_some());
    }

    #[test]
    fn test_split_at_newest_has_no_survivors() {
        let window = SentWindow::new(10);
        for id in 1..=3 {
            window.record(notification(id));
        }

        let (failed, survivors) = window.split_at_failure(3).unwrap();
        assert_eq!(failed.identifier, 3);
        assert!(survivors.is_empty());
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn test_split_removes_match_and_survivors() {
        let window = SentWindow::new(10);
        for id in 1..=4 {
            window.record(notification(id));
        }

        let (failed, survivors) = window.split_at_failure(2).unwrap();
        assert_eq!(failed.identifier, 2);
        assert_eq!(survivors.len(), 2);

        // Only the entry older than the failure remains.
        assert_eq!(window.len(), 1);
        assert!(window.split_at_failure(1).is_some());
    }

    #[test]
    fn test_unknown_identifier_leaves_window_untouched() {
        let window = SentWindow::new(10);
        for id in 1..=3 {
            window.record(notification(id));
        }

        assert!(window.split_at_failure(99).is_none());
        assert_eq!(window.len(), 3);
    }
}

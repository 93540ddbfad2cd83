use chrono::{DateTime, Utc};
use serde::Serialize;
use uplift_core::core::events::{UploadItemInfo, UploadStatus};

/// Point-in-time aggregate over the queue. Derived on demand, never stored.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct BatchSnapshot {
    pub total: usize,
    pub pending: usize,
    pub transferring: usize,
    pub paused: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub total_bytes: u64,
    pub completed_bytes: u64,
    pub transferred_bytes: u64,
    pub overall_percent: f64,
    pub throughput_bytes_per_sec: Option<f64>,
    pub eta_seconds: Option<f64>,
}

impl BatchSnapshot {
    pub fn from_items(items: &[UploadItemInfo], now: DateTime<Utc>) -> Self {
        let mut snap = BatchSnapshot {
            total: items.len(),
            ..Default::default()
        };
        let mut in_flight_bytes = 0.0;
        let mut earliest_start: Option<DateTime<Utc>> = None;

        for item in items {
            snap.total_bytes += item.size_bytes;
            match item.status {
                UploadStatus::Pending => snap.pending += 1,
                UploadStatus::Transferring => snap.transferring += 1,
                UploadStatus::Paused => snap.paused += 1,
                UploadStatus::Completed => snap.completed += 1,
                UploadStatus::Failed => snap.failed += 1,
                UploadStatus::Cancelled => snap.cancelled += 1,
            }

            match item.status {
                UploadStatus::Completed => snap.completed_bytes += item.size_bytes,
                UploadStatus::Transferring | UploadStatus::Paused => {
                    in_flight_bytes += item.size_bytes as f64 * item.percent / 100.0;
                }
                _ => {}
            }

            if matches!(
                item.status,
                UploadStatus::Transferring | UploadStatus::Paused | UploadStatus::Completed
            ) {
                if let Some(started) = item.started_at {
                    earliest_start = Some(earliest_start.map_or(started, |e| e.min(started)));
                }
            }
        }

        snap.transferred_bytes = snap.completed_bytes + in_flight_bytes as u64;

        // Failed and cancelled items will not contribute any more bytes.
        let reachable_bytes = snap.total_bytes.saturating_sub(sum_bytes(
            items,
            &[UploadStatus::Failed, UploadStatus::Cancelled],
        ));
        if reachable_bytes > 0 {
            snap.overall_percent =
                (snap.transferred_bytes as f64 / reachable_bytes as f64 * 100.0).min(100.0);
        }

        if let Some(start) = earliest_start {
            let elapsed = (now - start).num_milliseconds() as f64 / 1000.0;
            if elapsed > 0.0 && snap.transferred_bytes > 0 {
                let speed = snap.transferred_bytes as f64 / elapsed;
                snap.throughput_bytes_per_sec = Some(speed);
                let remaining = reachable_bytes.saturating_sub(snap.transferred_bytes) as f64;
                if snap.transferring + snap.pending > 0 {
                    snap.eta_seconds = Some(remaining / speed);
                }
            }
        }

        snap
    }
}

fn sum_bytes(items: &[UploadItemInfo], statuses: &[UploadStatus]) -> u64 {
    items
        .iter()
        .filter(|i| statuses.contains(&i.status))
        .map(|i| i.size_bytes)
        .sum()
}

pub struct ProgressThrottle {
    last_emit: std::time::Instant,
    min_interval: std::time::Duration,
}

impl ProgressThrottle {
    pub fn new(min_interval_ms: u64) -> Self {
        let min_interval = std::time::Duration::from_millis(min_interval_ms);
        let now = std::time::Instant::now();
        Self {
            last_emit: now.checked_sub(min_interval).unwrap_or(now),
            min_interval,
        }
    }

    pub fn should_emit(&mut self) -> bool {
        let now = std::time::Instant::now();
        if now.duration_since(self.last_emit) >= self.min_interval {
            self.last_emit = now;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn item(status: UploadStatus, size: u64, percent: f64, started: Option<DateTime<Utc>>) -> UploadItemInfo {
        UploadItemInfo {
            id: Uuid::new_v4(),
            name: "f".into(),
            size_bytes: size,
            mime_type: "image/png".into(),
            status,
            percent,
            error_message: None,
            started_at: started,
            finished_at: None,
            result_location: None,
            preview: true,
        }
    }

    #[test]
    fn empty_queue_is_all_zero() {
        let snap = BatchSnapshot::from_items(&[], Utc::now());
        assert_eq!(snap, BatchSnapshot::default());
    }

    #[test]
    fn counts_and_bytes_per_status() {
        let items = vec![
            item(UploadStatus::Pending, 100, 0.0, None),
            item(UploadStatus::Completed, 200, 100.0, None),
            item(UploadStatus::Completed, 300, 100.0, None),
            item(UploadStatus::Failed, 50, 0.0, None),
            item(UploadStatus::Cancelled, 50, 0.0, None),
        ];
        let snap = BatchSnapshot::from_items(&items, Utc::now());
        assert_eq!(snap.total, 5);
        assert_eq!(snap.pending, 1);
        assert_eq!(snap.completed, 2);
        assert_eq!(snap.failed, 1);
        assert_eq!(snap.cancelled, 1);
        assert_eq!(snap.total_bytes, 700);
        assert_eq!(snap.completed_bytes, 500);
        assert!((snap.overall_percent - 500.0 / 600.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn throughput_uses_earliest_start() {
        let now = Utc::now();
        let items = vec![
            item(UploadStatus::Completed, 1000, 100.0, Some(now - Duration::seconds(10))),
            item(UploadStatus::Transferring, 1000, 50.0, Some(now - Duration::seconds(2))),
            item(UploadStatus::Pending, 1000, 0.0, None),
        ];
        let snap = BatchSnapshot::from_items(&items, now);
        assert_eq!(snap.transferred_bytes, 1500);
        assert_eq!(snap.throughput_bytes_per_sec, Some(150.0));
        assert_eq!(snap.eta_seconds, Some(1500.0 / 150.0));
    }

    #[test]
    fn no_timing_means_no_throughput() {
        let items = vec![item(UploadStatus::Pending, 1000, 0.0, None)];
        let snap = BatchSnapshot::from_items(&items, Utc::now());
        assert!(snap.throughput_bytes_per_sec.is_none());
        assert!(snap.eta_seconds.is_none());
    }

    #[test]
    fn throttle_lets_first_emit_through() {
        let mut throttle = ProgressThrottle::new(10_000);
        assert!(throttle.should_emit());
        assert!(!throttle.should_emit());
    }
}

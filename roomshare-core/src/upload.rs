use std::{
    collections::BTreeMap,
    fmt,
    time::{Duration, Instant},
};

use crate::CoreError;

pub const MIN_ELAPSED: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(u64);

impl JobId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "upload-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    Uploading,
    Completed,
    Failed,
}

impl UploadStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, UploadStatus::Completed | UploadStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferRate {
    pub bytes_per_second: f64,
    pub eta: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadJob {
    pub id: JobId,
    pub file_name: String,
    pub total_bytes: u64,
    pub bytes_sent: u64,
    pub started_at: Instant,
    pub status: UploadStatus,
    pub rate: Option<TransferRate>,
}

impl UploadJob {
    pub fn percent(&self) -> f64 {
        if self.status == UploadStatus::Completed {
            return 100.0;
        }
        if self.total_bytes == 0 {
            return 0.0;
        }
        (self.bytes_sent as f64 / self.total_bytes as f64 * 100.0).min(100.0)
    }
}

#[derive(Debug, Default)]
pub struct UploadJobTracker {
    jobs: BTreeMap<JobId, UploadJob>,
    next_id: u64,
}

impl UploadJobTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, file_name: impl Into<String>, total_bytes: u64, now: Instant) -> JobId {
        self.next_id = self.next_id.saturating_add(1);
        let id = JobId(self.next_id);
        self.jobs.insert(
            id,
            UploadJob {
                id,
                file_name: file_name.into(),
                total_bytes,
                bytes_sent: 0,
                started_at: now,
                status: UploadStatus::Uploading,
                rate: None,
            },
        );
        id
    }

    /// Restarts the throughput clock when a queued job actually begins
    /// transferring. Ignored once any bytes have been reported.
    pub fn mark_started(&mut self, id: JobId, now: Instant) -> Result<(), CoreError> {
        let job = self.active_job_mut(id)?;
        if job.bytes_sent == 0 {
            job.started_at = now;
        }
        Ok(())
    }

    pub fn on_progress(
        &mut self,
        id: JobId,
        bytes_sent: u64,
        total_bytes: u64,
        now: Instant,
    ) -> Result<TransferRate, CoreError> {
        let job = self.active_job_mut(id)?;
        if bytes_sent < job.bytes_sent {
            return Err(CoreError::ProgressRegressed {
                job: id,
                reported: bytes_sent,
                current: job.bytes_sent,
            });
        }

        let total_bytes = if total_bytes > 0 {
            total_bytes
        } else {
            job.total_bytes
        };
        if lowers_percent(job, bytes_sent, total_bytes) {
            return Err(CoreError::PercentRegressed {
                job: id,
                reported: bytes_sent,
                total: total_bytes,
            });
        }

        job.bytes_sent = bytes_sent;
        job.total_bytes = total_bytes;

        let elapsed = now
            .saturating_duration_since(job.started_at)
            .max(MIN_ELAPSED)
            .as_secs_f64();
        let bytes_per_second = job.bytes_sent as f64 / elapsed;
        let eta = if bytes_per_second > 0.0 {
            let remaining = job.total_bytes.saturating_sub(job.bytes_sent) as f64;
            Duration::try_from_secs_f64(remaining / bytes_per_second).ok()
        } else {
            None
        };

        let rate = TransferRate {
            bytes_per_second,
            eta,
        };
        job.rate = Some(rate);
        Ok(rate)
    }

    pub fn on_complete(&mut self, id: JobId, success: bool) -> Result<UploadStatus, CoreError> {
        let job = self.active_job_mut(id)?;
        if success {
            job.status = UploadStatus::Completed;
            job.bytes_sent = job.bytes_sent.max(job.total_bytes);
        } else {
            job.status = UploadStatus::Failed;
        }
        Ok(job.status)
    }

    pub fn get(&self, id: JobId) -> Option<&UploadJob> {
        self.jobs.get(&id)
    }

    pub fn jobs(&self) -> impl DoubleEndedIterator<Item = &UploadJob> {
        self.jobs.values()
    }

    pub fn in_flight(&self) -> impl Iterator<Item = &UploadJob> {
        self.jobs
            .values()
            .filter(|job| job.status == UploadStatus::Uploading)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    fn active_job_mut(&mut self, id: JobId) -> Result<&mut UploadJob, CoreError> {
        let job = self.jobs.get_mut(&id).ok_or(CoreError::UnknownJob(id))?;
        if job.status.is_terminal() {
            return Err(CoreError::JobFinished(id));
        }
        Ok(job)
    }
}

fn lowers_percent(job: &UploadJob, bytes_sent: u64, total_bytes: u64) -> bool {
    if job.total_bytes == 0 || total_bytes == 0 {
        return false;
    }
    let current = u128::from(job.bytes_sent.min(job.total_bytes)) * u128::from(total_bytes);
    let reported = u128::from(bytes_sent.min(total_bytes)) * u128::from(job.total_bytes);
    reported < current
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEN_MB: u64 = 10 * 1024 * 1024;

    #[test]
    fn enqueue_creates_distinct_ids_for_simultaneous_files() {
        let now = Instant::now();
        let mut tracker = UploadJobTracker::new();
        let a = tracker.enqueue("a.bin", 10, now);
        let b = tracker.enqueue("b.bin", 20, now);

        assert_ne!(a, b);
        let job = tracker.get(a).unwrap();
        assert_eq!(job.status, UploadStatus::Uploading);
        assert_eq!(job.bytes_sent, 0);
        assert_eq!(job.total_bytes, 10);
    }

    #[test]
    fn throughput_and_eta_follow_elapsed_time() {
        let start = Instant::now();
        let mut tracker = UploadJobTracker::new();
        let id = tracker.enqueue("big.iso", 4000, start);

        let rate = tracker
            .on_progress(id, 1000, 4000, start + Duration::from_secs(2))
            .unwrap();
        assert!((rate.bytes_per_second - 500.0).abs() < 1e-9);
        assert_eq!(rate.eta, Some(Duration::from_secs(6)));
        assert!((tracker.get(id).unwrap().percent() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn zero_bytes_has_no_eta_and_no_division_by_zero() {
        let start = Instant::now();
        let mut tracker = UploadJobTracker::new();
        let id = tracker.enqueue("empty.txt", 100, start);

        let rate = tracker.on_progress(id, 0, 100, start).unwrap();
        assert_eq!(rate.bytes_per_second, 0.0);
        assert_eq!(rate.eta, None);
    }

    #[test]
    fn regressing_progress_is_rejected_and_leaves_value_unchanged() {
        let start = Instant::now();
        let mut tracker = UploadJobTracker::new();
        let id = tracker.enqueue("a.bin", 1000, start);
        let later = start + Duration::from_secs(1);

        tracker.on_progress(id, 600, 1000, later).unwrap();
        let err = tracker.on_progress(id, 400, 1000, later).unwrap_err();
        assert!(matches!(
            err,
            CoreError::ProgressRegressed {
                reported: 400,
                current: 600,
                ..
            }
        ));
        assert_eq!(tracker.get(id).unwrap().bytes_sent, 600);

        tracker.on_progress(id, 600, 1000, later).unwrap();
        assert_eq!(tracker.get(id).unwrap().bytes_sent, 600);
    }

    #[test]
    fn larger_total_cannot_lower_the_percentage() {
        let start = Instant::now();
        let mut tracker = UploadJobTracker::new();
        let id = tracker.enqueue("growing.log", 1000, start);
        let later = start + Duration::from_secs(1);

        tracker.on_progress(id, 400, 1000, later).unwrap();
        let err = tracker.on_progress(id, 401, 2000, later).unwrap_err();
        assert!(matches!(
            err,
            CoreError::PercentRegressed {
                reported: 401,
                total: 2000,
                ..
            }
        ));
        let job = tracker.get(id).unwrap();
        assert_eq!((job.bytes_sent, job.total_bytes), (400, 1000));
        assert!((job.percent() - 40.0).abs() < 1e-9);

        tracker.on_progress(id, 900, 2000, later).unwrap();
        let job = tracker.get(id).unwrap();
        assert_eq!(job.total_bytes, 2000);
        assert!((job.percent() - 45.0).abs() < 1e-9);
    }

    #[test]
    fn failed_job_at_forty_percent_is_terminal() {
        let start = Instant::now();
        let mut tracker = UploadJobTracker::new();
        let id = tracker.enqueue("video.mp4", TEN_MB, start);

        tracker
            .on_progress(id, TEN_MB * 4 / 10, TEN_MB, start + Duration::from_secs(4))
            .unwrap();
        assert_eq!(tracker.on_complete(id, false).unwrap(), UploadStatus::Failed);

        let job = tracker.get(id).unwrap();
        assert!((job.percent() - 40.0).abs() < 1e-9);
        assert!(matches!(
            tracker.on_complete(id, true),
            Err(CoreError::JobFinished(_))
        ));
        assert!(matches!(
            tracker.on_progress(id, TEN_MB, TEN_MB, start),
            Err(CoreError::JobFinished(_))
        ));
        assert_eq!(tracker.get(id).unwrap().status, UploadStatus::Failed);
    }

    #[test]
    fn completion_reports_full_progress() {
        let start = Instant::now();
        let mut tracker = UploadJobTracker::new();
        let id = tracker.enqueue("a.bin", 500, start);
        tracker.on_complete(id, true).unwrap();

        let job = tracker.get(id).unwrap();
        assert_eq!(job.bytes_sent, 500);
        assert_eq!(job.percent(), 100.0);
        assert_eq!(tracker.in_flight().count(), 0);
    }

    #[test]
    fn mark_started_resets_clock_only_before_first_bytes() {
        let start = Instant::now();
        let mut tracker = UploadJobTracker::new();
        let id = tracker.enqueue("queued.bin", 1000, start);

        let begun = start + Duration::from_secs(30);
        tracker.mark_started(id, begun).unwrap();
        let rate = tracker
            .on_progress(id, 500, 1000, begun + Duration::from_secs(1))
            .unwrap();
        assert!((rate.bytes_per_second - 500.0).abs() < 1e-9);

        tracker.mark_started(id, begun + Duration::from_secs(60)).unwrap();
        assert_eq!(tracker.get(id).unwrap().started_at, begun);
    }

    #[test]
    fn unknown_job_is_reported() {
        let mut tracker = UploadJobTracker::new();
        let err = tracker.on_complete(JobId(42), true).unwrap_err();
        assert!(matches!(err, CoreError::UnknownJob(JobId(42))));
    }
}

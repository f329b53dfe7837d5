use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use fleetgate_domain::{QueuedRecord, RecordPriority};

/// Watermark configuration for the shared ingestion queue.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub capacity: usize,
    pub low_watermark: usize,
    pub high_watermark: usize,
    /// Bounded wait for Critical records above the high watermark. Kept
    /// well below any socket timeout so admission never stalls a session.
    pub critical_admission_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            low_watermark: 6_000,
            high_watermark: 9_000,
            critical_admission_timeout: Duration::from_millis(100),
        }
    }
}

/// Rejection counters, split by cause. Backpressure and quota breaches are
/// distinct outcomes and must stay attributable.
#[derive(Debug, Default)]
pub struct AdmissionCounters {
    admitted: AtomicU64,
    backpressure_rejected: AtomicU64,
    quota_rejected: AtomicU64,
}

impl AdmissionCounters {
    pub fn admitted(&self) -> u64 {
        self.admitted.load(Ordering::Relaxed)
    }

    pub fn backpressure_rejected(&self) -> u64 {
        self.backpressure_rejected.load(Ordering::Relaxed)
    }

    pub fn quota_rejected(&self) -> u64 {
        self.quota_rejected.load(Ordering::Relaxed)
    }

    pub(crate) fn count_admitted(&self) {
        self.admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn count_backpressure(&self) {
        self.backpressure_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn count_quota(&self) {
        self.quota_rejected.fetch_add(1, Ordering::Relaxed);
    }
}

/// Outcome of one admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    /// Queue occupancy pushed the record out; counted, never silent.
    RejectedBackpressure,
}

/// Bounded multi-producer queue between sessions and the batch writers.
///
/// Admission degrades with occupancy: everything below the low watermark,
/// no Low-priority records between the watermarks, and only Critical
/// records (with a short bounded wait) at or above the high watermark. The
/// channel capacity is the absolute ceiling either way.
#[derive(Clone)]
pub struct IngestQueue {
    tx: mpsc::Sender<QueuedRecord>,
    config: QueueConfig,
    counters: Arc<AdmissionCounters>,
}

impl IngestQueue {
    pub fn new(config: QueueConfig) -> (Self, mpsc::Receiver<QueuedRecord>) {
        let (tx, rx) = mpsc::channel(config.capacity);
        let queue = Self {
            tx,
            config,
            counters: Arc::new(AdmissionCounters::default()),
        };
        (queue, rx)
    }

    pub fn counters(&self) -> Arc<AdmissionCounters> {
        self.counters.clone()
    }

    /// Records currently buffered in the channel.
    pub fn occupancy(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Offer one record under the watermark policy.
    pub async fn offer(&self, record: QueuedRecord) -> Admission {
        let occupancy = self.occupancy();
        let priority = record.record.priority();

        if occupancy >= self.config.high_watermark {
            if priority < RecordPriority::Critical {
                return self.reject(record, occupancy);
            }
            // Critical records get a bounded wait for a slot rather than an
            // immediate rejection.
            let reserve =
                tokio::time::timeout(self.config.critical_admission_timeout, self.tx.reserve())
                    .await;
            return match reserve {
                Ok(Ok(permit)) => {
                    permit.send(record);
                    self.counters.count_admitted();
                    Admission::Admitted
                }
                _ => self.reject(record, occupancy),
            };
        }

        if occupancy >= self.config.low_watermark && priority == RecordPriority::Low {
            return self.reject(record, occupancy);
        }

        match self.tx.try_send(record) {
            Ok(()) => {
                self.counters.count_admitted();
                Admission::Admitted
            }
            Err(mpsc::error::TrySendError::Full(record)) => {
                let occupancy = self.occupancy();
                self.reject(record, occupancy)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.counters.count_backpressure();
                Admission::RejectedBackpressure
            }
        }
    }

    fn reject(&self, record: QueuedRecord, occupancy: usize) -> Admission {
        self.counters.count_backpressure();
        debug!(
            occupancy,
            table = record.record.table(),
            priority = ?record.record.priority(),
            "record rejected by backpressure"
        );
        Admission::RejectedBackpressure
    }
}

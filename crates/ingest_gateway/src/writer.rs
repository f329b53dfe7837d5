use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use fleetgate_domain::{
    DecodeFailure, DecodeStage, DomainResult, IngestRecord, QueuedRecord, QuotaKind,
    TelemetryRepository, TenantRepository,
};

use crate::quota::QuotaLedger;

/// Receiver shared by the writer pool; whichever writer grabs the lock
/// drains the next record.
pub type SharedReceiver = Arc<Mutex<mpsc::Receiver<QueuedRecord>>>;

#[derive(Debug, Clone)]
pub struct WriterConfig {
    pub max_batch_size: usize,
    pub max_linger: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 500,
            max_linger: Duration::from_millis(500),
        }
    }
}

/// Drains the shared queue into per-table batches and commits them.
///
/// A batch commits when it reaches the size cap or at the linger tick,
/// whichever comes first. Each table commits independently: a failed batch
/// is retried once, then its records are attempted individually and
/// persistent failures are diverted to decode_errors. Committed records
/// feed tenant quota usage.
#[derive(Clone)]
pub struct BatchWriter {
    telemetry: Arc<dyn TelemetryRepository>,
    tenants: Arc<dyn TenantRepository>,
    ledger: Arc<QuotaLedger>,
    config: WriterConfig,
}

impl BatchWriter {
    pub fn new(
        telemetry: Arc<dyn TelemetryRepository>,
        tenants: Arc<dyn TenantRepository>,
        ledger: Arc<QuotaLedger>,
        config: WriterConfig,
    ) -> Self {
        Self {
            telemetry,
            tenants,
            ledger,
            config,
        }
    }

    pub async fn run(self, rx: SharedReceiver, ctx: CancellationToken) -> anyhow::Result<()> {
        let mut buffers: HashMap<&'static str, Vec<QueuedRecord>> = HashMap::new();
        let mut linger = tokio::time::interval(self.config.max_linger);
        linger.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    // Drain whatever is still queued, then flush everything.
                    {
                        let mut guard = rx.lock().await;
                        while let Ok(record) = guard.try_recv() {
                            buffers.entry(record.record.table()).or_default().push(record);
                        }
                    }
                    self.flush_all(&mut buffers).await;
                    info!("batch writer stopping");
                    return Ok(());
                }
                _ = linger.tick() => {
                    self.flush_all(&mut buffers).await;
                }
                received = Self::recv_shared(&rx) => {
                    match received {
                        Some(record) => {
                            let table = record.record.table();
                            let buffer = buffers.entry(table).or_default();
                            buffer.push(record);
                            if buffer.len() >= self.config.max_batch_size {
                                let batch = std::mem::take(buffer);
                                self.commit(table, batch).await;
                            }
                        }
                        None => {
                            self.flush_all(&mut buffers).await;
                            info!("ingestion queue closed, batch writer stopping");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    async fn recv_shared(rx: &SharedReceiver) -> Option<QueuedRecord> {
        let mut guard = rx.lock().await;
        guard.recv().await
    }

    async fn flush_all(&self, buffers: &mut HashMap<&'static str, Vec<QueuedRecord>>) {
        for (&table, buffer) in buffers.iter_mut() {
            if buffer.is_empty() {
                continue;
            }
            let batch = std::mem::take(buffer);
            self.commit(table, batch).await;
        }
    }

    /// Commit one table batch: try, retry once, then divert per record.
    async fn commit(&self, table: &'static str, batch: Vec<QueuedRecord>) {
        match self.insert_batch(table, &batch).await {
            Ok(()) => {
                debug!(table, rows = batch.len(), "batch committed");
                self.attribute_usage(&batch).await;
                return;
            }
            Err(err) => {
                warn!(table, error = %err, "batch insert failed, retrying once");
            }
        }

        if let Ok(()) = self.insert_batch(table, &batch).await {
            debug!(table, rows = batch.len(), "batch committed on retry");
            self.attribute_usage(&batch).await;
            return;
        }

        // Second failure: isolate the poison rows, keep the rest.
        let mut committed = Vec::new();
        let mut diverted = Vec::new();
        for record in batch {
            let single = std::slice::from_ref(&record);
            match self.insert_batch(table, single).await {
                Ok(()) => committed.push(record),
                Err(err) => {
                    diverted.push(DecodeFailure {
                        device_id: record_device_id(&record.record),
                        stage: DecodeStage::Persist,
                        message: err.to_string(),
                        raw: format!("{:?}", record.record).into_bytes(),
                        received_at: Utc::now(),
                    });
                }
            }
        }
        warn!(
            table,
            committed = committed.len(),
            diverted = diverted.len(),
            "batch degraded to per-record inserts"
        );
        self.attribute_usage(&committed).await;

        if !diverted.is_empty() {
            if let Err(err) = self.telemetry.insert_decode_errors(&diverted).await {
                error!(table, error = %err, rows = diverted.len(), "failed to divert records to decode_errors");
            }
        }
    }

    async fn insert_batch(&self, table: &str, records: &[QueuedRecord]) -> DomainResult<()> {
        match table {
            "positions" => {
                let rows: Vec<_> = records
                    .iter()
                    .filter_map(|r| match &r.record {
                        IngestRecord::Position(p) => Some(p.clone()),
                        _ => None,
                    })
                    .collect();
                self.telemetry.insert_positions(&rows).await
            }
            "raw_frames" => {
                let rows: Vec<_> = records
                    .iter()
                    .filter_map(|r| match &r.record {
                        IngestRecord::RawFrame(f) => Some(f.clone()),
                        _ => None,
                    })
                    .collect();
                self.telemetry.insert_raw_frames(&rows).await
            }
            "can_frames" => {
                let rows: Vec<_> = records
                    .iter()
                    .filter_map(|r| match &r.record {
                        IngestRecord::CanFrame(f) => Some(f.clone()),
                        _ => None,
                    })
                    .collect();
                self.telemetry.insert_can_frames(&rows).await
            }
            "can_signals" => {
                let rows: Vec<_> = records
                    .iter()
                    .filter_map(|r| match &r.record {
                        IngestRecord::CanSignal(s) => Some(s.clone()),
                        _ => None,
                    })
                    .collect();
                self.telemetry.insert_can_signals(&rows).await
            }
            "decode_errors" => {
                let rows: Vec<_> = records
                    .iter()
                    .filter_map(|r| match &r.record {
                        IngestRecord::DecodeFailure(f) => Some(f.clone()),
                        _ => None,
                    })
                    .collect();
                self.telemetry.insert_decode_errors(&rows).await
            }
            other => {
                error!(table = other, "unknown destination table");
                Ok(())
            }
        }
    }

    /// Count committed records against tenant quotas, in the ledger and in
    /// storage.
    async fn attribute_usage(&self, committed: &[QueuedRecord]) {
        let mut per_tenant: HashMap<Uuid, i64> = HashMap::new();
        for record in committed {
            if let Some(tenant_id) = record.tenant_id {
                if record.record.counts_against_quota() {
                    *per_tenant.entry(tenant_id).or_default() += 1;
                }
            }
        }

        for (tenant_id, amount) in per_tenant {
            self.ledger.add_usage(tenant_id, amount);
            if let Err(err) = self
                .tenants
                .record_usage(tenant_id, QuotaKind::FramesPerDay, amount)
                .await
            {
                warn!(tenant_id = %tenant_id, error = %err, "failed to persist quota usage");
            }
        }
    }
}

fn record_device_id(record: &IngestRecord) -> Option<String> {
    match record {
        IngestRecord::Position(p) => Some(p.device_id.clone()),
        IngestRecord::RawFrame(f) => f.device_id.clone(),
        IngestRecord::CanFrame(f) => Some(f.device_id.clone()),
        IngestRecord::CanSignal(s) => Some(s.device_id.clone()),
        IngestRecord::DecodeFailure(f) => f.device_id.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetgate_domain::{
        CanFrame, DomainError, MockTelemetryRepository, MockTenantRepository, Position,
    };

    fn position_record(tenant_id: Option<Uuid>) -> QueuedRecord {
        QueuedRecord {
            tenant_id,
            record: IngestRecord::Position(Position {
                device_id: "123456789012345".to_string(),
                latitude: 55.75,
                longitude: 37.62,
                speed: 60.5,
                course: 180.0,
                altitude: None,
                satellites: 8,
                hdop: Some(1.2),
                fix_time: Utc::now(),
                received_at: Utc::now(),
            }),
        }
    }

    fn archival_record(tenant_id: Option<Uuid>) -> QueuedRecord {
        QueuedRecord {
            tenant_id,
            record: IngestRecord::RawFrame(fleetgate_domain::RawFrame {
                device_id: Some("123456789012345".to_string()),
                frame_type: fleetgate_domain::FrameType::Position,
                raw: "~A123456789012345,1700000000,55.75,37.62,60.5,180.0,8,1.2~".to_string(),
                parsed: None,
                remote_addr: None,
                received_at: Utc::now(),
            }),
        }
    }

    fn can_record() -> QueuedRecord {
        QueuedRecord {
            tenant_id: None,
            record: IngestRecord::CanFrame(CanFrame {
                device_id: "42".to_string(),
                can_id: 0x18FE_EE00,
                extended: true,
                data: vec![0x7D],
                received_at: Utc::now(),
                position_time: None,
            }),
        }
    }

    fn harness(
        telemetry: MockTelemetryRepository,
        tenants: MockTenantRepository,
        config: WriterConfig,
    ) -> (
        BatchWriter,
        mpsc::Sender<QueuedRecord>,
        SharedReceiver,
        Arc<QuotaLedger>,
    ) {
        let (tx, rx) = mpsc::channel(64);
        let ledger = Arc::new(QuotaLedger::new());
        let writer = BatchWriter::new(
            Arc::new(telemetry),
            Arc::new(tenants),
            ledger.clone(),
            config,
        );
        (writer, tx, Arc::new(Mutex::new(rx)), ledger)
    }

    #[tokio::test]
    async fn flushes_when_batch_reaches_max_size() {
        let mut telemetry = MockTelemetryRepository::new();
        telemetry
            .expect_insert_positions()
            .times(1)
            .withf(|rows| rows.len() == 2)
            .returning(|_| Ok(()));
        let tenants = MockTenantRepository::new();

        let (writer, tx, rx, _ledger) = harness(
            telemetry,
            tenants,
            WriterConfig {
                max_batch_size: 2,
                max_linger: Duration::from_secs(60),
            },
        );

        let ctx = CancellationToken::new();
        let handle = tokio::spawn(writer.run(rx, ctx.clone()));

        tx.send(position_record(None)).await.unwrap();
        tx.send(position_record(None)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        ctx.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn flushes_on_linger_before_batch_fills() {
        let mut telemetry = MockTelemetryRepository::new();
        telemetry
            .expect_insert_positions()
            .times(1)
            .withf(|rows| rows.len() == 1)
            .returning(|_| Ok(()));
        let tenants = MockTenantRepository::new();

        let (writer, tx, rx, _ledger) = harness(
            telemetry,
            tenants,
            WriterConfig {
                max_batch_size: 100,
                max_linger: Duration::from_millis(30),
            },
        );

        let ctx = CancellationToken::new();
        let handle = tokio::spawn(writer.run(rx, ctx.clone()));

        tx.send(position_record(None)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;

        ctx.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn failed_batch_retries_once_then_diverts_per_record() {
        let mut telemetry = MockTelemetryRepository::new();
        // Batch of two, retry, then two per-record attempts: four failures.
        telemetry
            .expect_insert_can_frames()
            .times(4)
            .returning(|_| Err(DomainError::Repository(anyhow::anyhow!("db down"))));
        telemetry
            .expect_insert_decode_errors()
            .times(1)
            .withf(|rows| rows.len() == 2 && rows.iter().all(|r| r.stage == DecodeStage::Persist))
            .returning(|_| Ok(()));
        let tenants = MockTenantRepository::new();

        let (writer, tx, rx, _ledger) = harness(
            telemetry,
            tenants,
            WriterConfig {
                max_batch_size: 2,
                max_linger: Duration::from_secs(60),
            },
        );

        let ctx = CancellationToken::new();
        let handle = tokio::spawn(writer.run(rx, ctx.clone()));

        tx.send(can_record()).await.unwrap();
        tx.send(can_record()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        ctx.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn committed_records_feed_tenant_quota() {
        let tenant_id = Uuid::new_v4();
        let mut telemetry = MockTelemetryRepository::new();
        telemetry
            .expect_insert_raw_frames()
            .times(1)
            .returning(|_| Ok(()));
        let mut tenants = MockTenantRepository::new();
        tenants
            .expect_record_usage()
            .times(1)
            .withf(move |id, kind, amount| {
                *id == tenant_id && *kind == QuotaKind::FramesPerDay && *amount == 2
            })
            .returning(|_, _, _| Ok(()));

        let (writer, tx, rx, _ledger) = harness(
            telemetry,
            tenants,
            WriterConfig {
                max_batch_size: 2,
                max_linger: Duration::from_secs(60),
            },
        );

        let ctx = CancellationToken::new();
        let handle = tokio::spawn(writer.run(rx, ctx.clone()));

        tx.send(archival_record(Some(tenant_id))).await.unwrap();
        tx.send(archival_record(Some(tenant_id))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        ctx.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn shutdown_flushes_buffered_records() {
        let mut telemetry = MockTelemetryRepository::new();
        telemetry
            .expect_insert_positions()
            .times(1)
            .withf(|rows| rows.len() == 1)
            .returning(|_| Ok(()));
        let tenants = MockTenantRepository::new();

        let (writer, tx, rx, _ledger) = harness(
            telemetry,
            tenants,
            WriterConfig {
                max_batch_size: 100,
                max_linger: Duration::from_secs(60),
            },
        );

        let ctx = CancellationToken::new();
        let handle = tokio::spawn(writer.run(rx, ctx.clone()));

        tx.send(position_record(None)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        ctx.cancel();
        handle.await.unwrap().unwrap();
    }
}

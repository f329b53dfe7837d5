use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::info;

use fleetgate_domain::{DeviceRepository, TelemetryRepository, TenantRepository};
use fleetgate_runner::AppProcess;

use crate::queue::{IngestQueue, QueueConfig};
use crate::quota::{run_quota_reset, QuotaGate, QuotaLedger, TenantResolver};
use crate::server::GatewayServer;
use crate::session::{SessionConfig, SessionDeps};
use crate::writer::{BatchWriter, SharedReceiver, WriterConfig};

pub struct IngestGatewayConfig {
    pub bind_addr: String,
    pub idle_timeout_secs: u64,
    pub max_frame_len: usize,
    pub queue_capacity: usize,
    pub queue_low_watermark: usize,
    pub queue_high_watermark: usize,
    pub critical_admission_timeout_ms: u64,
    pub writer_count: usize,
    pub batch_max_size: usize,
    pub batch_linger_ms: u64,
    pub quota_reset_interval_secs: u64,
}

/// Wires the ingestion pipeline: TCP server, shared bounded queue, batch
/// writer pool and the quota reset schedule.
pub struct IngestGateway {
    server: GatewayServer,
    writers: Vec<BatchWriter>,
    shared_rx: SharedReceiver,
    tenants: Arc<dyn TenantRepository>,
    ledger: Arc<QuotaLedger>,
    resolver: Arc<TenantResolver>,
    quota_reset_interval: Duration,
}

impl IngestGateway {
    pub fn new(
        devices: Arc<dyn DeviceRepository>,
        tenants: Arc<dyn TenantRepository>,
        telemetry: Arc<dyn TelemetryRepository>,
        config: IngestGatewayConfig,
    ) -> Self {
        info!("initializing ingest gateway");

        let (queue, rx) = IngestQueue::new(QueueConfig {
            capacity: config.queue_capacity,
            low_watermark: config.queue_low_watermark,
            high_watermark: config.queue_high_watermark,
            critical_admission_timeout: Duration::from_millis(config.critical_admission_timeout_ms),
        });
        let shared_rx: SharedReceiver = Arc::new(Mutex::new(rx));

        let resolver = Arc::new(TenantResolver::new(tenants.clone()));
        let ledger = Arc::new(QuotaLedger::new());
        let gate = Arc::new(QuotaGate::new(
            tenants.clone(),
            ledger.clone(),
            queue.counters(),
        ));

        let deps = Arc::new(SessionDeps {
            devices,
            resolver: resolver.clone(),
            gate,
            queue,
        });
        let server = GatewayServer::new(
            config.bind_addr.clone(),
            deps,
            SessionConfig {
                idle_timeout: Duration::from_secs(config.idle_timeout_secs),
                max_frame_len: config.max_frame_len,
            },
        );

        let writer_config = WriterConfig {
            max_batch_size: config.batch_max_size,
            max_linger: Duration::from_millis(config.batch_linger_ms),
        };
        let writers = (0..config.writer_count.max(1))
            .map(|_| {
                BatchWriter::new(
                    telemetry.clone(),
                    tenants.clone(),
                    ledger.clone(),
                    writer_config.clone(),
                )
            })
            .collect();

        Self {
            server,
            writers,
            shared_rx,
            tenants,
            ledger,
            resolver,
            quota_reset_interval: Duration::from_secs(config.quota_reset_interval_secs),
        }
    }

    /// Hand every pipeline stage to the runner as a named process.
    pub fn into_runner_processes(self) -> Vec<AppProcess> {
        let mut processes = Vec::new();

        let server = self.server;
        processes.push(AppProcess::new("telemetry_server", move |ctx| {
            server.run(ctx)
        }));

        for writer in self.writers {
            let rx = self.shared_rx.clone();
            processes.push(AppProcess::new("batch_writer", move |ctx| {
                writer.run(rx, ctx)
            }));
        }

        let tenants = self.tenants;
        let ledger = self.ledger;
        let resolver = self.resolver;
        let period = self.quota_reset_interval;
        processes.push(AppProcess::new("quota_reset", move |ctx| {
            run_quota_reset(tenants, ledger, resolver, period, ctx)
        }));

        processes
    }
}

//! Ingestion pipeline for vehicle telemetry: TCP sessions decode wire
//! frames and ACK synchronously, a quota gate and bounded queue sit between
//! sessions and storage, and a batch writer pool persists the stream.

mod ingest_gateway;
mod queue;
mod quota;
mod server;
mod session;
mod writer;

pub use ingest_gateway::{IngestGateway, IngestGatewayConfig};
pub use queue::{Admission, AdmissionCounters, IngestQueue, QueueConfig};
pub use quota::{run_quota_reset, GateDecision, QuotaGate, QuotaLedger, TenantResolver};
pub use server::GatewayServer;
pub use session::{Session, SessionConfig, SessionCounters, SessionDeps, SessionState};
pub use writer::{BatchWriter, SharedReceiver, WriterConfig};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DomainResult;
use crate::types::{
    CanFrame, CanSignal, DecodeFailure, Device, Position, Quota, QuotaKind, RawFrame, Tenant,
    UpsertDeviceInput,
};

/// Device storage operations. Infrastructure (fleetgate-postgres)
/// implements this trait.
#[cfg_attr(any(test, feature = "test-util"), mockall::automock)]
#[async_trait]
pub trait DeviceRepository: Send + Sync {
    /// Insert the device on first sight, otherwise touch `last_seen`.
    async fn upsert_seen(&self, input: UpsertDeviceInput) -> DomainResult<Device>;

    async fn get_device(&self, device_id: &str) -> DomainResult<Option<Device>>;
}

/// Tenant and quota operations used by the quota gate and the writer.
#[cfg_attr(any(test, feature = "test-util"), mockall::automock)]
#[async_trait]
pub trait TenantRepository: Send + Sync {
    async fn tenant_for_device(&self, device_id: &str) -> DomainResult<Option<Tenant>>;

    async fn get_quota(&self, tenant_id: Uuid, kind: QuotaKind) -> DomainResult<Option<Quota>>;

    /// Add committed-record usage to the persistent quota counter.
    async fn record_usage(
        &self,
        tenant_id: Uuid,
        kind: QuotaKind,
        amount: i64,
    ) -> DomainResult<()>;

    /// Zero the usage counters for a quota kind across all tenants.
    async fn reset_usage(&self, kind: QuotaKind) -> DomainResult<()>;
}

/// Batch persistence of decoded telemetry. Each call is one transaction
/// against a single destination table.
#[cfg_attr(any(test, feature = "test-util"), mockall::automock)]
#[async_trait]
pub trait TelemetryRepository: Send + Sync {
    async fn insert_positions(&self, rows: &[Position]) -> DomainResult<()>;

    async fn insert_raw_frames(&self, rows: &[RawFrame]) -> DomainResult<()>;

    async fn insert_can_frames(&self, rows: &[CanFrame]) -> DomainResult<()>;

    async fn insert_can_signals(&self, rows: &[CanSignal]) -> DomainResult<()>;

    async fn insert_decode_errors(&self, rows: &[DecodeFailure]) -> DomainResult<()>;
}

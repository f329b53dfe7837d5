mod error;
mod records;
mod repository;
mod types;

pub use error::{DomainError, DomainResult};
pub use records::{IngestRecord, QueuedRecord, RecordPriority};
pub use repository::{DeviceRepository, TelemetryRepository, TenantRepository};
#[cfg(any(test, feature = "test-util"))]
pub use repository::{MockDeviceRepository, MockTelemetryRepository, MockTenantRepository};
pub use types::{
    CanDialect, CanFrame, CanSignal, DecodeFailure, DecodeStage, Device, FrameType, Position,
    Quota, QuotaKind, RawFrame, Tenant, UpsertDeviceInput,
};

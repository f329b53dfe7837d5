mod client;
mod config;
mod device_repo;
mod models;
mod telemetry_repo;
mod tenant_repo;

pub use client::PostgresClient;
pub use config::PostgresConfig;
pub use device_repo::PostgresDeviceRepository;
pub use models::{DeviceRow, QuotaRow, TenantRow};
pub use telemetry_repo::PostgresTelemetryRepository;
pub use tenant_repo::PostgresTenantRepository;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Invalid device ID: {0}")]
    InvalidDeviceId(String),

    #[error("Invalid CAN dialect: {0}")]
    InvalidDialect(String),

    #[error("Tenant not found for device: {0}")]
    TenantNotFound(String),

    #[error("Quota not configured for tenant: {0}")]
    QuotaNotConfigured(uuid::Uuid),

    #[error("Repository error: {0}")]
    Repository(#[from] anyhow::Error),
}

pub type DomainResult<T> = Result<T, DomainError>;

use chrono::{DateTime, Utc};
use std::str::FromStr;
use uuid::Uuid;

use fleetgate_domain::{CanDialect, Device, DomainError, Quota, QuotaKind, Tenant};

/// Device row for PostgreSQL storage
#[derive(Debug, Clone)]
pub struct DeviceRow {
    pub device_id: String,
    pub imei: Option<String>,
    pub device_name: String,
    pub tenant_id: Option<Uuid>,
    pub dialect: String,
    pub last_seen: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl TryFrom<DeviceRow> for Device {
    type Error = DomainError;

    fn try_from(row: DeviceRow) -> Result<Self, Self::Error> {
        Ok(Device {
            device_id: row.device_id,
            imei: row.imei,
            name: row.device_name,
            tenant_id: row.tenant_id,
            dialect: CanDialect::from_str(&row.dialect)?,
            last_seen: row.last_seen,
            is_active: row.is_active,
        })
    }
}

#[derive(Debug, Clone)]
pub struct TenantRow {
    pub tenant_id: Uuid,
    pub tenant_name: String,
}

impl From<TenantRow> for Tenant {
    fn from(row: TenantRow) -> Self {
        Tenant {
            tenant_id: row.tenant_id,
            name: row.tenant_name,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QuotaRow {
    pub tenant_id: Uuid,
    pub kind: String,
    pub quota_limit: i64,
    pub used: i64,
    pub period_start: DateTime<Utc>,
}

impl TryFrom<QuotaRow> for Quota {
    type Error = DomainError;

    fn try_from(row: QuotaRow) -> Result<Self, Self::Error> {
        let kind = match row.kind.as_str() {
            "frames_per_day" => QuotaKind::FramesPerDay,
            other => {
                return Err(DomainError::Repository(anyhow::anyhow!(
                    "unknown quota kind in storage: {other}"
                )))
            }
        };
        Ok(Quota {
            tenant_id: row.tenant_id,
            kind,
            limit: row.quota_limit,
            used: row.used,
            period_start: row.period_start,
        })
    }
}

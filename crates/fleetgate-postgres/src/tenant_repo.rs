use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use fleetgate_domain::{
    DomainError, DomainResult, Quota, QuotaKind, Tenant, TenantRepository,
};

use crate::client::PostgresClient;
use crate::models::{QuotaRow, TenantRow};

/// PostgreSQL implementation of TenantRepository trait
#[derive(Clone)]
pub struct PostgresTenantRepository {
    client: PostgresClient,
}

impl PostgresTenantRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TenantRepository for PostgresTenantRepository {
    async fn tenant_for_device(&self, device_id: &str) -> DomainResult<Option<Tenant>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::Repository)?;

        let row = conn
            .query_opt(
                "SELECT t.tenant_id, t.tenant_name
                 FROM tenants t
                 JOIN devices d ON d.tenant_id = t.tenant_id
                 WHERE d.device_id = $1",
                &[&device_id],
            )
            .await
            .map_err(|e| DomainError::Repository(e.into()))?;

        Ok(row.map(|row| {
            TenantRow {
                tenant_id: row.get(0),
                tenant_name: row.get(1),
            }
            .into()
        }))
    }

    async fn get_quota(&self, tenant_id: Uuid, kind: QuotaKind) -> DomainResult<Option<Quota>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::Repository)?;

        let row = conn
            .query_opt(
                "SELECT tenant_id, kind, quota_limit, used, period_start
                 FROM tenant_quotas
                 WHERE tenant_id = $1 AND kind = $2",
                &[&tenant_id, &kind.as_str()],
            )
            .await
            .map_err(|e| DomainError::Repository(e.into()))?;

        match row {
            Some(row) => {
                let quota_row = QuotaRow {
                    tenant_id: row.get(0),
                    kind: row.get(1),
                    quota_limit: row.get(2),
                    used: row.get(3),
                    period_start: row.get(4),
                };
                Ok(Some(quota_row.try_into()?))
            }
            None => Ok(None),
        }
    }

    async fn record_usage(
        &self,
        tenant_id: Uuid,
        kind: QuotaKind,
        amount: i64,
    ) -> DomainResult<()> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::Repository)?;

        let updated = conn
            .execute(
                "UPDATE tenant_quotas
                 SET used = used + $3
                 WHERE tenant_id = $1 AND kind = $2",
                &[&tenant_id, &kind.as_str(), &amount],
            )
            .await
            .map_err(|e| DomainError::Repository(e.into()))?;

        if updated == 0 {
            return Err(DomainError::QuotaNotConfigured(tenant_id));
        }
        Ok(())
    }

    async fn reset_usage(&self, kind: QuotaKind) -> DomainResult<()> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::Repository)?;

        let reset = conn
            .execute(
                "UPDATE tenant_quotas
                 SET used = 0, period_start = NOW()
                 WHERE kind = $1",
                &[&kind.as_str()],
            )
            .await
            .map_err(|e| DomainError::Repository(e.into()))?;

        debug!(kind = kind.as_str(), tenants = reset, "quota usage reset");
        Ok(())
    }
}

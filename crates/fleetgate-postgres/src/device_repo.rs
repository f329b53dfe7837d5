use async_trait::async_trait;
use tracing::debug;

use fleetgate_domain::{Device, DeviceRepository, DomainError, DomainResult, UpsertDeviceInput};

use crate::client::PostgresClient;
use crate::models::DeviceRow;

/// PostgreSQL implementation of DeviceRepository trait
#[derive(Clone)]
pub struct PostgresDeviceRepository {
    client: PostgresClient,
}

impl PostgresDeviceRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DeviceRepository for PostgresDeviceRepository {
    async fn upsert_seen(&self, input: UpsertDeviceInput) -> DomainResult<Device> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::Repository)?;

        // Insert on first sight, otherwise only touch last_seen. The
        // device name defaults to the identity until renamed externally.
        let row = conn
            .query_one(
                "INSERT INTO devices (device_id, device_name, dialect, last_seen, is_active)
                 VALUES ($1, $1, 'j1939', $2, TRUE)
                 ON CONFLICT (device_id)
                 DO UPDATE SET last_seen = EXCLUDED.last_seen
                 RETURNING device_id, imei, device_name, tenant_id, dialect, last_seen, is_active",
                &[&input.device_id, &input.seen_at],
            )
            .await
            .map_err(|e| DomainError::Repository(e.into()))?;

        debug!(device_id = %input.device_id, "device seen");

        let device_row = DeviceRow {
            device_id: row.get(0),
            imei: row.get(1),
            device_name: row.get(2),
            tenant_id: row.get(3),
            dialect: row.get(4),
            last_seen: row.get(5),
            is_active: row.get(6),
        };
        device_row.try_into()
    }

    async fn get_device(&self, device_id: &str) -> DomainResult<Option<Device>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::Repository)?;

        let row = conn
            .query_opt(
                "SELECT device_id, imei, device_name, tenant_id, dialect, last_seen, is_active
                 FROM devices
                 WHERE device_id = $1",
                &[&device_id],
            )
            .await
            .map_err(|e| DomainError::Repository(e.into()))?;

        match row {
            Some(row) => {
                let device_row = DeviceRow {
                    device_id: row.get(0),
                    imei: row.get(1),
                    device_name: row.get(2),
                    tenant_id: row.get(3),
                    dialect: row.get(4),
                    last_seen: row.get(5),
                    is_active: row.get(6),
                };
                Ok(Some(device_row.try_into()?))
            }
            None => Ok(None),
        }
    }
}

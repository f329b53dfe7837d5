use async_trait::async_trait;
use tracing::debug;

use fleetgate_domain::{
    CanFrame, CanSignal, DecodeFailure, DomainError, DomainResult, Position, RawFrame,
    TelemetryRepository,
};

use crate::client::PostgresClient;

/// PostgreSQL implementation of TelemetryRepository trait.
///
/// Each insert method runs one transaction against its destination table
/// so a batch either lands whole or not at all.
#[derive(Clone)]
pub struct PostgresTelemetryRepository {
    client: PostgresClient,
}

impl PostgresTelemetryRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TelemetryRepository for PostgresTelemetryRepository {
    async fn insert_positions(&self, rows: &[Position]) -> DomainResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::Repository)?;

        let tx = conn
            .transaction()
            .await
            .map_err(|e| DomainError::Repository(e.into()))?;
        let stmt = tx
            .prepare(
                "INSERT INTO positions
                   (device_id, latitude, longitude, speed, course, altitude,
                    satellites, hdop, fix_time, received_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            )
            .await
            .map_err(|e| DomainError::Repository(e.into()))?;

        for row in rows {
            tx.execute(
                &stmt,
                &[
                    &row.device_id,
                    &row.latitude,
                    &row.longitude,
                    &row.speed,
                    &row.course,
                    &row.altitude,
                    &row.satellites,
                    &row.hdop,
                    &row.fix_time,
                    &row.received_at,
                ],
            )
            .await
            .map_err(|e| DomainError::Repository(e.into()))?;
        }

        tx.commit()
            .await
            .map_err(|e| DomainError::Repository(e.into()))?;
        debug!(rows = rows.len(), "inserted positions batch");
        Ok(())
    }

    async fn insert_raw_frames(&self, rows: &[RawFrame]) -> DomainResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::Repository)?;

        let tx = conn
            .transaction()
            .await
            .map_err(|e| DomainError::Repository(e.into()))?;
        let stmt = tx
            .prepare(
                "INSERT INTO raw_frames
                   (device_id, frame_type, raw, parsed, remote_addr, received_at)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .await
            .map_err(|e| DomainError::Repository(e.into()))?;

        for row in rows {
            tx.execute(
                &stmt,
                &[
                    &row.device_id,
                    &row.frame_type.as_str(),
                    &row.raw,
                    &row.parsed,
                    &row.remote_addr,
                    &row.received_at,
                ],
            )
            .await
            .map_err(|e| DomainError::Repository(e.into()))?;
        }

        tx.commit()
            .await
            .map_err(|e| DomainError::Repository(e.into()))?;
        debug!(rows = rows.len(), "inserted raw frames batch");
        Ok(())
    }

    async fn insert_can_frames(&self, rows: &[CanFrame]) -> DomainResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::Repository)?;

        let tx = conn
            .transaction()
            .await
            .map_err(|e| DomainError::Repository(e.into()))?;
        let stmt = tx
            .prepare(
                "INSERT INTO can_frames
                   (device_id, can_id, extended, data, received_at, position_time)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .await
            .map_err(|e| DomainError::Repository(e.into()))?;

        for row in rows {
            let can_id = row.can_id as i64;
            tx.execute(
                &stmt,
                &[
                    &row.device_id,
                    &can_id,
                    &row.extended,
                    &row.data,
                    &row.received_at,
                    &row.position_time,
                ],
            )
            .await
            .map_err(|e| DomainError::Repository(e.into()))?;
        }

        tx.commit()
            .await
            .map_err(|e| DomainError::Repository(e.into()))?;
        debug!(rows = rows.len(), "inserted CAN frames batch");
        Ok(())
    }

    async fn insert_can_signals(&self, rows: &[CanSignal]) -> DomainResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::Repository)?;

        let tx = conn
            .transaction()
            .await
            .map_err(|e| DomainError::Repository(e.into()))?;
        let stmt = tx
            .prepare(
                "INSERT INTO can_signals
                   (device_id, signal_name, value, unit, pgn, spn, mode, pid, signal_time)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .await
            .map_err(|e| DomainError::Repository(e.into()))?;

        for row in rows {
            let pgn = row.pgn.map(i32::from);
            let spn = row.spn.map(i64::from);
            let mode = row.mode.map(i16::from);
            let pid = row.pid.map(i16::from);
            tx.execute(
                &stmt,
                &[
                    &row.device_id,
                    &row.name,
                    &row.value,
                    &row.unit,
                    &pgn,
                    &spn,
                    &mode,
                    &pid,
                    &row.signal_time,
                ],
            )
            .await
            .map_err(|e| DomainError::Repository(e.into()))?;
        }

        tx.commit()
            .await
            .map_err(|e| DomainError::Repository(e.into()))?;
        debug!(rows = rows.len(), "inserted CAN signals batch");
        Ok(())
    }

    async fn insert_decode_errors(&self, rows: &[DecodeFailure]) -> DomainResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::Repository)?;

        let tx = conn
            .transaction()
            .await
            .map_err(|e| DomainError::Repository(e.into()))?;
        let stmt = tx
            .prepare(
                "INSERT INTO decode_errors
                   (device_id, stage, message, raw, received_at)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .await
            .map_err(|e| DomainError::Repository(e.into()))?;

        for row in rows {
            tx.execute(
                &stmt,
                &[
                    &row.device_id,
                    &row.stage.as_str(),
                    &row.message,
                    &row.raw,
                    &row.received_at,
                ],
            )
            .await
            .map_err(|e| DomainError::Repository(e.into()))?;
        }

        tx.commit()
            .await
            .map_err(|e| DomainError::Repository(e.into()))?;
        debug!(rows = rows.len(), "inserted decode errors batch");
        Ok(())
    }
}

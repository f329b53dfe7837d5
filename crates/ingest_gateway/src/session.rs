use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use fleetgate_can::SignalDefinition;
use fleetgate_domain::{
    CanDialect, CanFrame, CanSignal, DecodeFailure, DecodeStage, DeviceRepository, FrameType,
    IngestRecord, Position, QueuedRecord, RawFrame, UpsertDeviceInput,
};
use fleetgate_protocol::{
    ack_frame, decode_frame, Extracted, Frame, FrameExtractor, FrameKind,
};

use crate::queue::IngestQueue;
use crate::quota::{GateDecision, QuotaGate, TenantResolver};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub idle_timeout: Duration,
    pub max_frame_len: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(300),
            max_frame_len: fleetgate_protocol::DEFAULT_MAX_FRAME_LEN,
        }
    }
}

/// Connection lifecycle. Sessions never resume after `Closed`; a
/// reconnecting device gets a fresh session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Identified,
    Active,
    Closing,
    Closed,
}

/// Per-connection counters, updated on the decode path.
#[derive(Debug, Default)]
pub struct SessionCounters {
    pub frames_received: u64,
    pub decode_errors: u64,
    pub last_activity: Option<DateTime<Utc>>,
}

/// Shared collaborators handed to every session.
pub struct SessionDeps {
    pub devices: Arc<dyn DeviceRepository>,
    pub resolver: Arc<TenantResolver>,
    pub gate: Arc<QuotaGate>,
    pub queue: IngestQueue,
}

/// One TCP connection's decoding state machine.
///
/// Generic over the stream so tests drive it with in-memory duplex pipes.
/// Owns the frame extractor's buffering state exclusively; ACKs are written
/// synchronously on the decode path, before any admission work, so a device
/// never observes queue or storage backpressure.
pub struct Session<S> {
    io: S,
    remote_addr: Option<String>,
    deps: Arc<SessionDeps>,
    config: SessionConfig,
    state: SessionState,
    extractor: FrameExtractor,
    counters: SessionCounters,
    identity: Option<String>,
    tenant_id: Option<Uuid>,
    definitions: &'static [SignalDefinition],
    last_position_fix: Option<DateTime<Utc>>,
    last_received_at: DateTime<Utc>,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(
        io: S,
        remote_addr: Option<String>,
        deps: Arc<SessionDeps>,
        config: SessionConfig,
    ) -> Self {
        let extractor = FrameExtractor::new(config.max_frame_len);
        Self {
            io,
            remote_addr,
            deps,
            config,
            state: SessionState::Connecting,
            extractor,
            counters: SessionCounters::default(),
            identity: None,
            tenant_id: None,
            definitions: fleetgate_can::definitions_for(CanDialect::J1939),
            last_position_fix: None,
            last_received_at: Utc::now(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn counters(&self) -> &SessionCounters {
        &self.counters
    }

    pub async fn run(mut self, ctx: CancellationToken) -> anyhow::Result<()> {
        let mut buf = vec![0u8; 4096];

        while self.state != SessionState::Closed {
            tokio::select! {
                _ = ctx.cancelled() => {
                    debug!(remote = ?self.remote_addr, "session cancelled");
                    self.close().await;
                }
                read = tokio::time::timeout(self.config.idle_timeout, self.io.read(&mut buf)) => {
                    match read {
                        Err(_elapsed) => {
                            debug!(
                                remote = ?self.remote_addr,
                                device_id = ?self.identity,
                                "session idle timeout"
                            );
                            self.close().await;
                        }
                        Ok(Ok(0)) => {
                            debug!(remote = ?self.remote_addr, "peer closed connection");
                            self.close().await;
                        }
                        Ok(Ok(n)) => {
                            self.counters.last_activity = Some(Utc::now());
                            self.extractor.push(&buf[..n]);
                            if self.process_buffered().await.is_err() {
                                // Transport error on the ACK path kills only
                                // this session.
                                self.state = SessionState::Closed;
                            }
                        }
                        Ok(Err(err)) => {
                            debug!(remote = ?self.remote_addr, error = %err, "socket error");
                            self.state = SessionState::Closed;
                        }
                    }
                }
            }
        }

        info!(
            remote = ?self.remote_addr,
            device_id = ?self.identity,
            frames = self.counters.frames_received,
            decode_errors = self.counters.decode_errors,
            "session closed"
        );
        Ok(())
    }

    /// Closing path: any buffered partial frame is archived as a framing
    /// failure before the session reaches `Closed`.
    async fn close(&mut self) {
        self.state = SessionState::Closing;
        if let Some(partial) = self.extractor.flush() {
            let received_at = self.stamp();
            self.submit_failure(DecodeFailure {
                device_id: self.identity.clone(),
                stage: DecodeStage::Framing,
                message: "session closed with buffered partial frame".to_string(),
                raw: partial,
                received_at,
            })
            .await;
        }
        self.state = SessionState::Closed;
    }

    async fn process_buffered(&mut self) -> std::io::Result<()> {
        while let Some(extracted) = self.extractor.next_frame() {
            match extracted {
                Extracted::Frame(bytes) => self.handle_frame(bytes).await?,
                Extracted::Discarded { bytes, error } => {
                    self.counters.decode_errors += 1;
                    let received_at = self.stamp();
                    self.submit_failure(DecodeFailure {
                        device_id: self.identity.clone(),
                        stage: DecodeStage::Framing,
                        message: error.to_string(),
                        raw: bytes,
                        received_at,
                    })
                    .await;
                }
            }
        }
        Ok(())
    }

    async fn handle_frame(&mut self, bytes: Vec<u8>) -> std::io::Result<()> {
        self.counters.frames_received += 1;
        let received_at = self.stamp();

        match decode_frame(&bytes) {
            Ok(frame) => {
                // ACK before identification and admission; emission latency
                // must not depend on queue or storage state.
                let ack = ack_frame(frame.kind(), frame.identity());
                self.io.write_all(ack.as_bytes()).await?;
                self.io.flush().await?;

                self.identify(frame.identity(), received_at).await;
                self.ingest(frame, &bytes, received_at).await;
            }
            Err(err) => {
                self.counters.decode_errors += 1;
                // The frame was still delimited correctly; ACK when the type
                // and identity survive so the device does not retransmit.
                let salvaged = salvage_ack_fields(&bytes);
                if let Some((kind, identity)) = &salvaged {
                    let ack = ack_frame(*kind, identity);
                    self.io.write_all(ack.as_bytes()).await?;
                    self.io.flush().await?;
                }
                self.submit_failure(DecodeFailure {
                    device_id: salvaged
                        .map(|(_, identity)| identity)
                        .or_else(|| self.identity.clone()),
                    stage: DecodeStage::Field,
                    message: err.to_string(),
                    raw: bytes,
                    received_at,
                })
                .await;
            }
        }
        Ok(())
    }

    /// Device upsert on every frame; dialect and tenant resolved once.
    async fn identify(&mut self, identity: &str, seen_at: DateTime<Utc>) {
        match self
            .deps
            .devices
            .upsert_seen(UpsertDeviceInput {
                device_id: identity.to_string(),
                seen_at,
            })
            .await
        {
            Ok(device) => {
                if self.state == SessionState::Connecting {
                    self.state = SessionState::Identified;
                    self.identity = Some(device.device_id.clone());
                    self.definitions = fleetgate_can::definitions_for(device.dialect);
                    match self.deps.resolver.resolve(identity).await {
                        Ok(tenant) => {
                            self.tenant_id = tenant.map(|t| t.tenant_id);
                        }
                        Err(err) => {
                            warn!(device_id = identity, error = %err, "tenant resolution failed");
                        }
                    }
                    info!(
                        device_id = identity,
                        tenant_id = ?self.tenant_id,
                        dialect = device.dialect.as_str(),
                        remote = ?self.remote_addr,
                        "session identified"
                    );
                    self.state = SessionState::Active;
                }
            }
            Err(err) => {
                // Stay in Connecting; the next frame retries the upsert.
                warn!(device_id = identity, error = %err, "device upsert failed");
            }
        }
    }

    /// Build all records for one decoded frame and admit them.
    async fn ingest(&mut self, frame: Frame, raw: &[u8], received_at: DateTime<Utc>) {
        // Quota is per wire frame: one decision covers the archival row and
        // every derived row.
        if let Some(tenant_id) = self.tenant_id {
            match self.deps.gate.admit(tenant_id).await {
                Ok(GateDecision::Admit) => {}
                Ok(GateDecision::RejectQuota) => return,
                Err(err) => {
                    warn!(tenant_id = %tenant_id, error = %err, "quota check failed, admitting");
                }
            }
        }

        let identity = frame.identity().to_string();
        let mut records = Vec::new();

        records.push(IngestRecord::RawFrame(RawFrame {
            device_id: Some(identity.clone()),
            frame_type: frame_type(frame.kind()),
            raw: String::from_utf8_lossy(raw).into_owned(),
            parsed: parsed_json(&frame),
            remote_addr: self.remote_addr.clone(),
            received_at,
        }));

        match &frame {
            Frame::Position(p) => {
                self.last_position_fix = Some(p.fix_time);
                records.push(IngestRecord::Position(Position {
                    device_id: identity.clone(),
                    latitude: p.latitude,
                    longitude: p.longitude,
                    speed: p.speed,
                    course: p.course,
                    altitude: None,
                    satellites: p.satellites as i16,
                    hdop: Some(p.hdop),
                    fix_time: p.fix_time,
                    received_at,
                }));
            }
            Frame::Can(c) => {
                records.push(IngestRecord::CanFrame(CanFrame {
                    device_id: identity.clone(),
                    can_id: c.can_id,
                    extended: c.extended,
                    data: c.data.clone(),
                    received_at,
                    position_time: self.last_position_fix,
                }));

                let decoded = fleetgate_can::decode(self.definitions, c.can_id, c.extended, &c.data);
                for signal in decoded.signals {
                    records.push(IngestRecord::CanSignal(CanSignal {
                        device_id: identity.clone(),
                        name: signal.name.to_string(),
                        value: signal.value,
                        unit: Some(signal.unit.to_string()),
                        pgn: signal.pgn,
                        spn: signal.spn,
                        mode: signal.mode,
                        pid: signal.pid,
                        signal_time: received_at,
                    }));
                }
                for failure in decoded.failures {
                    self.counters.decode_errors += 1;
                    records.push(IngestRecord::DecodeFailure(DecodeFailure {
                        device_id: Some(identity.clone()),
                        stage: DecodeStage::Signal,
                        message: failure.to_string(),
                        raw: c.data.clone(),
                        received_at,
                    }));
                }
            }
            Frame::Event(_) => {}
        }

        for record in records {
            self.deps
                .queue
                .offer(QueuedRecord {
                    tenant_id: self.tenant_id,
                    record,
                })
                .await;
        }
    }

    async fn submit_failure(&self, failure: DecodeFailure) {
        self.deps
            .queue
            .offer(QueuedRecord {
                tenant_id: self.tenant_id,
                record: IngestRecord::DecodeFailure(failure),
            })
            .await;
    }

    /// Server receipt time, non-decreasing within the session stream.
    fn stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamped = if now > self.last_received_at {
            now
        } else {
            self.last_received_at
        };
        self.last_received_at = stamped;
        stamped
    }
}

fn frame_type(kind: FrameKind) -> FrameType {
    match kind {
        FrameKind::Position => FrameType::Position,
        FrameKind::CanStandard => FrameType::CanStandard,
        FrameKind::CanExtended => FrameType::CanExtended,
        FrameKind::Event => FrameType::Event,
    }
}

/// Best-effort type/identity recovery from a frame whose fields failed to
/// decode, so the ACK contract still holds for framed input.
fn salvage_ack_fields(bytes: &[u8]) -> Option<(FrameKind, String)> {
    let mut body = bytes;
    if body.first() == Some(&fleetgate_protocol::FRAME_MARKER) {
        body = &body[1..];
    }
    if body.last() == Some(&fleetgate_protocol::FRAME_MARKER) {
        body = &body[..body.len().checked_sub(1)?];
    }
    let text = std::str::from_utf8(body).ok()?;
    let mut chars = text.chars();
    let kind = match chars.next()? {
        'A' => FrameKind::Position,
        'T' => FrameKind::CanStandard,
        'X' => FrameKind::CanExtended,
        'E' => FrameKind::Event,
        _ => return None,
    };
    let identity: String = chars.take_while(|c| *c != ',').collect();
    if identity.is_empty() || !identity.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some((kind, identity))
}

/// Best-effort structured copy of the frame for the query side.
fn parsed_json(frame: &Frame) -> Option<serde_json::Value> {
    let value = match frame {
        Frame::Position(p) => serde_json::json!({
            "latitude": p.latitude,
            "longitude": p.longitude,
            "speed": p.speed,
            "course": p.course,
            "satellites": p.satellites,
            "hdop": p.hdop,
            "fix_time": p.fix_time.timestamp(),
        }),
        Frame::Can(c) => serde_json::json!({
            "can_id": format!("{:X}", c.can_id),
            "extended": c.extended,
            "data": c.data.iter().map(|b| format!("{b:02X}")).collect::<Vec<_>>(),
        }),
        Frame::Event(e) => serde_json::json!({
            "code": e.code,
            "time": e.event_time.timestamp(),
            "description": e.description,
        }),
    };
    Some(value)
}

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::session::{Session, SessionConfig, SessionDeps};

/// TCP front door: accepts device connections and spawns one session task
/// per connection.
pub struct GatewayServer {
    bind_addr: String,
    deps: Arc<SessionDeps>,
    session_config: SessionConfig,
}

impl GatewayServer {
    pub fn new(bind_addr: String, deps: Arc<SessionDeps>, session_config: SessionConfig) -> Self {
        Self {
            bind_addr,
            deps,
            session_config,
        }
    }

    pub async fn run(self, ctx: CancellationToken) -> anyhow::Result<()> {
        let listener = TcpListener::bind(&self.bind_addr)
            .await
            .with_context(|| format!("failed to bind telemetry listener on {}", self.bind_addr))?;
        Self::serve(listener, self.deps, self.session_config, ctx).await
    }

    /// Accept loop over an already-bound listener; split out so tests can
    /// bind an ephemeral port first.
    pub async fn serve(
        listener: TcpListener,
        deps: Arc<SessionDeps>,
        session_config: SessionConfig,
        ctx: CancellationToken,
    ) -> anyhow::Result<()> {
        info!(addr = %listener.local_addr()?, "telemetry listener started");
        let mut sessions = JoinSet::new();

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    break;
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            // Frames are small and latency-sensitive; ACKs
                            // must not sit in Nagle buffers.
                            if let Err(err) = stream.set_nodelay(true) {
                                debug!(peer = %peer, error = %err, "failed to set TCP_NODELAY");
                            }
                            debug!(peer = %peer, "connection accepted");
                            let session = Session::new(
                                stream,
                                Some(peer.to_string()),
                                deps.clone(),
                                session_config.clone(),
                            );
                            sessions.spawn(session.run(ctx.child_token()));
                        }
                        Err(err) => {
                            warn!(error = %err, "accept failed");
                        }
                    }
                }
                Some(finished) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(err) = finished {
                        warn!(error = %err, "session task panicked");
                    }
                }
            }
        }

        info!(
            open_sessions = sessions.len(),
            "listener stopping, draining sessions"
        );
        while let Some(finished) = sessions.join_next().await {
            if let Err(err) = finished {
                warn!(error = %err, "session task panicked");
            }
        }
        Ok(())
    }
}

//! UseCase: heartbeat and inactivity sweep
//!
//! Two independent timers drive this use case:
//!
//! - heartbeat: every `ping_interval`, terminate connections that never
//!   answered the previous ping, then ping everyone else
//! - inactivity sweep: terminate connections with no traffic for
//!   `ping_interval * inactivity_multiplier`
//!
//! Both close with 4000.

use std::sync::Arc;

use tandem_shared::{protocol::CloseCode, time::Clock};

use crate::{
    config::{GatewayConfig, millis},
    domain::{ConnectionId, ConnectionRepository, MessagePusher},
};

use super::disconnect_connection::DisconnectConnectionUseCase;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatReport {
    pub terminated: usize,
    pub pinged: usize,
}

pub struct LivenessUseCase {
    config: Arc<GatewayConfig>,
    repository: Arc<dyn ConnectionRepository>,
    message_pusher: Arc<dyn MessagePusher>,
    clock: Arc<dyn Clock>,
    disconnect: Arc<DisconnectConnectionUseCase>,
}

impl LivenessUseCase {
    pub fn new(
        config: Arc<GatewayConfig>,
        repository: Arc<dyn ConnectionRepository>,
        message_pusher: Arc<dyn MessagePusher>,
        clock: Arc<dyn Clock>,
        disconnect: Arc<DisconnectConnectionUseCase>,
    ) -> Self {
        Self {
            config,
            repository,
            message_pusher,
            clock,
            disconnect,
        }
    }

    pub async fn heartbeat(&self) -> HeartbeatReport {
        let (dead, ping) = self.repository.begin_liveness_cycle().await;

        let mut report = HeartbeatReport::default();
        for id in &dead {
            tracing::info!("Connection '{}' missed its heartbeat, terminating", id);
            if self
                .disconnect
                .terminate(id, CloseCode::Inactivity, "heartbeat timeout")
                .await
                .is_some()
            {
                report.terminated += 1;
            }
        }
        for id in &ping {
            match self.message_pusher.ping(id).await {
                Ok(()) => report.pinged += 1,
                Err(e) => tracing::debug!("Failed to ping connection '{}': {}", id, e),
            }
        }
        report
    }

    /// Returns how many connections were closed
    pub async fn sweep_inactive(&self) -> usize {
        let cutoff = self.clock.now_millis() - millis(self.config.inactivity_timeout());
        let idle = self.repository.idle_before(cutoff).await;

        let mut closed = 0;
        for id in &idle {
            tracing::info!("Connection '{}' inactive, terminating", id);
            if self
                .disconnect
                .terminate(id, CloseCode::Inactivity, "inactivity timeout")
                .await
                .is_some()
            {
                closed += 1;
            }
        }
        closed
    }

    /// Pong received
    pub async fn record_pong(&self, connection_id: &ConnectionId) -> bool {
        let alive = self.repository.mark_alive(connection_id).await;
        if alive {
            self.repository
                .touch(connection_id, self.clock.now_millis())
                .await;
        }
        alive
    }
}

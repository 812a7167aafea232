use crate::config::{ListenerConfig, ListenerSettings};
use crate::error::ListenerError;
use crate::listener::{ListenerState, VoteListener};
use crate::listener_stats::{ListenerStats, StatsSnapshot};
use crate::sink::{AuditSink, CommandSink};
use scopeguard::ScopeGuard;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{debug, info};

/// Transitions kept for subscribers that fall behind.
const TRANSITION_BACKLOG: usize = 16;

/// Owns the current [`VoteListener`] and swaps it out on reconfiguration.
///
/// Every [`apply`](Self::apply) fully stops the running listener before the
/// new configuration is bound, so address, port, key and commands always
/// change together.
pub struct VotifierService {
    sink: Arc<dyn CommandSink>,
    audit: Arc<dyn AuditSink>,
    stats: Arc<ListenerStats>,
    state: watch::Sender<ListenerState>,
    transitions: broadcast::Sender<ListenerState>,
    current: Mutex<Option<VoteListener>>,
}

impl VotifierService {
    pub fn new(sink: Arc<dyn CommandSink>, audit: Arc<dyn AuditSink>) -> Self {
        let (state, _) = watch::channel(ListenerState::Stopped);
        let (transitions, _) = broadcast::channel(TRANSITION_BACKLOG);
        Self {
            sink,
            audit,
            stats: ListenerStats::new(),
            state,
            transitions,
            current: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ListenerState {
        *self.state.borrow()
    }

    /// Latest state only; intermediate states may be skipped.
    pub fn subscribe_state(&self) -> watch::Receiver<ListenerState> {
        self.state.subscribe()
    }

    /// Every state change from now on, in order.
    pub fn subscribe_transitions(&self) -> broadcast::Receiver<ListenerState> {
        self.transitions.subscribe()
    }

    fn set_state(&self, next: ListenerState) {
        debug!(state = ?next, "vote listener state");
        self.state.send_replace(next);
        // no subscribers is fine
        let _ = self.transitions.send(next);
    }

    /// Counters accumulated across every listener this service has run.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.current.lock().await.as_ref().map(VoteListener::local_addr)
    }

    /// Replace the active configuration.
    ///
    /// A bind failure leaves the service `Stopped` and is not retried; the
    /// next `apply` is the retry.
    pub async fn apply(&self, config: ListenerConfig) -> Result<(), ListenerError> {
        let mut current = self.current.lock().await;
        self.stop_current(&mut current).await?;

        if !config.enabled {
            info!("vote listener disabled");
            return Ok(());
        }

        self.set_state(ListenerState::Binding);
        let binding = scopeguard::guard(self, |service| {
            service.set_state(ListenerState::Stopped);
        });

        let listener = VoteListener::bind(
            config,
            Arc::clone(&self.sink),
            Arc::clone(&self.audit),
            Arc::clone(&self.stats),
        )
        .await?;

        ScopeGuard::into_inner(binding);
        self.set_state(ListenerState::Listening);
        *current = Some(listener);
        Ok(())
    }

    /// Validate raw host settings and apply them. An invalid document leaves
    /// the running listener untouched.
    pub async fn apply_settings(&self, settings: &ListenerSettings) -> Result<(), ListenerError> {
        let config = settings.resolve()?;
        self.apply(config).await
    }

    pub async fn stop(&self) -> Result<(), ListenerError> {
        let mut current = self.current.lock().await;
        self.stop_current(&mut current).await
    }

    async fn stop_current(&self, current: &mut Option<VoteListener>) -> Result<(), ListenerError> {
        if let Some(listener) = current.take() {
            self.set_state(ListenerState::ShuttingDown);
            let result = listener.shutdown().await;
            self.set_state(ListenerState::Stopped);
            result?;
        }
        Ok(())
    }
}

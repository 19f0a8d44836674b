use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::SignalingConfig;
use crate::dispatcher::{Diagnostic, DiagnosticSink, Dispatcher, NegotiationPhase};
use crate::error::{ConfigError, SignalingError, SignalingResult};
use crate::negotiation::{AnswerPolicy, AutoAnswer, LocalEventReceiver, Negotiator};
use crate::poll::{AlwaysRetry, FetchOutcome, PollScheduler, PollState, RetryDecision, RetryPolicy};
use crate::relay::Relay;

const MIN_RUN_PERIOD: Duration = Duration::from_millis(1);

pub struct SessionBuilder {
    config: SignalingConfig,
    relay: Arc<dyn Relay>,
    negotiator: Arc<dyn Negotiator>,
    answer_policy: Arc<dyn AnswerPolicy>,
    retry_policy: Arc<dyn RetryPolicy>,
    diagnostics: Option<DiagnosticSink>,
}

impl SessionBuilder {
    pub fn answer_policy(mut self, policy: Arc<dyn AnswerPolicy>) -> Self {
        self.answer_policy = policy;
        self
    }

    pub fn retry_policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn diagnostics<F>(mut self, sink: F) -> Self
    where
        F: Fn(&Diagnostic) + Send + Sync + 'static,
    {
        self.diagnostics = Some(Arc::new(sink));
        self
    }

    /// Validate the configuration and start pumping `local_events` to the
    /// relay. Must be called from within a tokio runtime.
    pub fn start(self, local_events: LocalEventReceiver) -> SignalingResult<SignalingSession> {
        self.config.validate()?;
        let runtime = Handle::try_current().map_err(|_| SignalingError::NoRuntime)?;

        let dispatcher = Arc::new(Dispatcher::new(
            self.negotiator,
            Arc::clone(&self.relay),
            self.config.remote_peer_id.clone(),
            self.config.ice_separator.clone(),
            self.answer_policy,
            self.diagnostics,
        ));
        let closed = Arc::new(AtomicBool::new(false));
        let pump = runtime.spawn(pump_local_events(
            Arc::clone(&dispatcher),
            local_events,
            Arc::clone(&closed),
        ));

        tracing::info!(
            target = "beach_signaling::session",
            relay = %self.config.relay_url,
            local = %self.config.local_peer_id,
            remote = %self.config.remote_peer_id,
            poll_ms = self.config.poll_interval.as_millis() as u64,
            "signaling session started"
        );

        Ok(SignalingSession {
            scheduler: PollScheduler::with_policy(self.config.poll_interval, self.retry_policy),
            config: self.config,
            relay: self.relay,
            dispatcher,
            closed,
            runtime,
            pump: Mutex::new(Some(pump)),
        })
    }
}

/// One signaling exchange with one remote peer.
///
/// The host drives inbound polling with [`SignalingSession::advance`] (or
/// [`SignalingSession::run`]); local negotiation events are published as they
/// arrive.
pub struct SignalingSession {
    config: SignalingConfig,
    relay: Arc<dyn Relay>,
    dispatcher: Arc<Dispatcher>,
    scheduler: PollScheduler,
    closed: Arc<AtomicBool>,
    runtime: Handle,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for SignalingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalingSession")
            .field("local_peer", &self.config.local_peer_id)
            .field("remote_peer", &self.dispatcher.remote_peer())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl SignalingSession {
    pub fn builder(
        config: SignalingConfig,
        relay: Arc<dyn Relay>,
        negotiator: Arc<dyn Negotiator>,
    ) -> SessionBuilder {
        SessionBuilder {
            config,
            relay,
            negotiator,
            answer_policy: Arc::new(AutoAnswer),
            retry_policy: Arc::new(AlwaysRetry),
            diagnostics: None,
        }
    }

    pub fn start(
        config: SignalingConfig,
        relay: Arc<dyn Relay>,
        negotiator: Arc<dyn Negotiator>,
        local_events: LocalEventReceiver,
    ) -> SignalingResult<Self> {
        Self::builder(config, relay, negotiator).start(local_events)
    }

    pub fn local_peer(&self) -> &str {
        &self.config.local_peer_id
    }

    pub fn remote_peer(&self) -> String {
        self.dispatcher.remote_peer()
    }

    pub fn set_remote_peer(&self, peer: impl Into<String>) -> Result<(), ConfigError> {
        self.dispatcher.set_remote_peer(peer)
    }

    pub fn phase(&self) -> NegotiationPhase {
        self.dispatcher.phase()
    }

    /// Record that the media connection came up. Signaling traffic cannot
    /// observe this, so the host reports it from the negotiator's state.
    pub fn mark_connected(&self) {
        self.dispatcher.mark_connected();
    }

    pub fn poll_state(&self) -> PollState {
        self.scheduler.snapshot()
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Restart polling after the retry policy gave up.
    pub fn resume_polling(&self) {
        self.scheduler.resume();
    }

    /// Feed time elapsed since the previous call. Issues a fetch when the poll
    /// interval has accumulated and none is outstanding; never blocks.
    pub fn advance(&self, elapsed: Duration) {
        if self.is_closed() {
            return;
        }
        let Some(ticket) = self.scheduler.tick(elapsed) else {
            return;
        };

        let relay = Arc::clone(&self.relay);
        let dispatcher = Arc::clone(&self.dispatcher);
        let closed = Arc::clone(&self.closed);
        let local_peer = self.config.local_peer_id.clone();
        self.runtime.spawn(async move {
            let fetched = relay.fetch(&local_peer).await;
            if closed.load(Ordering::Acquire) {
                // Dropping the ticket only releases the in-flight guard.
                tracing::trace!(
                    target = "beach_signaling::session",
                    "discarding fetch result that arrived after close"
                );
                return;
            }
            let outcome = match fetched {
                Ok(Some(body)) => {
                    if let Err(err) = dispatcher.dispatch_raw(&body).await {
                        tracing::debug!(
                            target = "beach_signaling::session",
                            error = %err,
                            "inbound message not applied"
                        );
                    }
                    FetchOutcome::Delivered
                }
                Ok(None) => {
                    tracing::trace!(
                        target = "beach_signaling::session",
                        peer = %local_peer,
                        "no pending signaling message"
                    );
                    FetchOutcome::Empty
                }
                Err(err) => {
                    tracing::warn!(
                        target = "beach_signaling::session",
                        peer = %local_peer,
                        error = %err,
                        "signaling poll failed"
                    );
                    dispatcher.report(Diagnostic::FetchFailed {
                        peer: local_peer.clone(),
                        error: err.to_string(),
                    });
                    FetchOutcome::Failed
                }
            };
            if closed.load(Ordering::Acquire) {
                return;
            }
            if let Some(RetryDecision::GiveUp) = ticket.complete(outcome) {
                tracing::warn!(
                    target = "beach_signaling::session",
                    peer = %local_peer,
                    "retry policy gave up; polling halted"
                );
                dispatcher.report(Diagnostic::PollingHalted);
            }
        });
    }

    /// Drive [`SignalingSession::advance`] from a tokio interval until the
    /// session is closed. Periods below one millisecond are rounded up.
    pub async fn run(&self, period: Duration) {
        let mut ticker = tokio::time::interval(period.max(MIN_RUN_PERIOD));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last = Instant::now();
        while !self.is_closed() {
            ticker.tick().await;
            let now = Instant::now();
            self.advance(now.saturating_duration_since(last));
            last = now;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop polling and publishing. Operations already in flight finish on
    /// their own; their results are discarded.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.dispatcher.close();
        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
        tracing::info!(
            target = "beach_signaling::session",
            local = %self.config.local_peer_id,
            "signaling session closed"
        );
    }
}

impl Drop for SignalingSession {
    fn drop(&mut self) {
        self.close();
    }
}

async fn pump_local_events(
    dispatcher: Arc<Dispatcher>,
    mut events: LocalEventReceiver,
    closed: Arc<AtomicBool>,
) {
    while let Some(event) = events.recv().await {
        if closed.load(Ordering::Acquire) {
            break;
        }
        // Address now; a later remote change must not redirect this message.
        let peer = dispatcher.remote_peer();
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move {
            let _ = dispatcher.publish_local_to(&peer, event).await;
        });
    }
    tracing::debug!(
        target = "beach_signaling::session",
        "local event stream ended"
    );
}

//! Wake-up signals for blocked dequeues.
//!
//! Every enqueue persists a signal record. While at least one dequeue is
//! waiting, a [`SignalListener`] actor drains the mailbox on a short interval
//! and wakes the waiters of this process. Signals only shorten the wait: a
//! lost signal costs at most one queue poll interval. Signals nobody takes
//! expire and are removed by the maintenance sweep.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use db::Database;
use db::repositories::SignalRepository;
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio::sync::Notify;
use tokio::sync::futures::Notified;
use tokio::time::MissedTickBehavior;

/// Messages for the SignalListener.
#[derive(Debug)]
pub enum SignalMessage {
    /// Drain pending signals and wake the waiters.
    Poll,
}

/// Arguments for spawning a listener.
pub struct SignalListenerArgs {
    pub db: Database,
    pub notify: Arc<Notify>,
    pub poll_interval: Duration,
}

/// State for the listener actor.
pub struct SignalListenerState {
    db: Database,
    notify: Arc<Notify>,
    gate: Arc<PollGate>,
}

/// Keeps at most one `Poll` queued or running.
#[derive(Debug, Default)]
struct PollGate {
    busy: AtomicBool,
}

impl PollGate {
    /// Returns false while an earlier poll has not finished.
    fn try_begin(&self) -> bool {
        !self.busy.swap(true, Ordering::AcqRel)
    }

    fn finish(&self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Actor that consumes persisted signals.
pub struct SignalListener;

impl Actor for SignalListener {
    type Msg = SignalMessage;
    type State = SignalListenerState;
    type Arguments = SignalListenerArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting signal listener");

        // The ticker ends on its own once the actor is gone
        let poll_interval = args.poll_interval;
        let gate = Arc::new(PollGate::default());
        let ticker_gate = gate.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if !ticker_gate.try_begin() {
                    continue;
                }
                if myself.send_message(SignalMessage::Poll).is_err() {
                    break;
                }
            }
        });

        Ok(SignalListenerState {
            db: args.db,
            notify: args.notify,
            gate,
        })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SignalMessage::Poll => {
                let mut received = 0usize;
                loop {
                    match SignalRepository::take_one(&state.db).await {
                        Ok(Some(name)) => {
                            tracing::debug!("Signal received for queue {}", name);
                            received += 1;
                        }
                        Ok(None) => break,
                        Err(e) => {
                            tracing::warn!("Failed to read signals: {}", e);
                            break;
                        }
                    }
                }

                // One wake-up covers the whole drain
                if received > 0 {
                    state.notify.notify_waiters();
                }
                state.gate.finish();
            }
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        _state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        tracing::info!("Signal listener stopped");
        Ok(())
    }
}

/// Lifecycle bookkeeping guarded by one lock.
#[derive(Default)]
struct HubState {
    subscribers: usize,
    listener: Option<ActorRef<SignalMessage>>,
}

struct HubInner {
    db: Database,
    poll_interval: Duration,
    notify: Arc<Notify>,
    state: Mutex<HubState>,
    /// Serializes listener start-up so two first subscribers cannot both spawn.
    starting: tokio::sync::Mutex<()>,
}

/// Reference-counted owner of the listener.
///
/// The first [`subscribe`](SignalHub::subscribe) starts the listener and
/// dropping the last [`SignalSubscription`] stops it. Clones share the same
/// listener.
#[derive(Clone)]
pub struct SignalHub {
    inner: Arc<HubInner>,
}

impl SignalHub {
    pub fn new(db: Database, poll_interval: Duration) -> Self {
        Self {
            inner: Arc::new(HubInner {
                db,
                poll_interval,
                notify: Arc::new(Notify::new()),
                state: Mutex::new(HubState::default()),
                starting: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Register interest in wake-ups, starting the listener if nobody else is
    /// listening.
    ///
    /// Never fails: if the listener cannot be started the caller simply falls
    /// back to polling, and the next subscriber tries again.
    pub async fn subscribe(&self) -> SignalSubscription {
        let _starting = self.inner.starting.lock().await;

        {
            let mut state = self.lock_state();
            if state.listener.is_some() {
                state.subscribers += 1;
                return self.subscription();
            }
        }

        let args = SignalListenerArgs {
            db: self.inner.db.clone(),
            notify: self.inner.notify.clone(),
            poll_interval: self.inner.poll_interval,
        };
        let listener = match Actor::spawn(None, SignalListener, args).await {
            Ok((actor, _handle)) => Some(actor),
            Err(e) => {
                tracing::warn!("Failed to start signal listener: {}", e);
                None
            }
        };

        let mut state = self.lock_state();
        state.listener = listener;
        state.subscribers += 1;
        self.subscription()
    }

    /// A future that resolves on the next wake-up.
    ///
    /// Call `enable` on the pinned future before checking the queues so a
    /// signal that arrives during the check is not missed.
    pub fn notified(&self) -> Notified<'_> {
        self.inner.notify.notified()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock_state().subscribers
    }

    pub fn is_listening(&self) -> bool {
        self.lock_state().listener.is_some()
    }

    fn subscription(&self) -> SignalSubscription {
        SignalSubscription {
            hub: self.inner.clone(),
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, HubState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Keeps the listener running while held.
pub struct SignalSubscription {
    hub: Arc<HubInner>,
}

impl Drop for SignalSubscription {
    fn drop(&mut self) {
        let mut state = self.hub.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.subscribers = state.subscribers.saturating_sub(1);
        if state.subscribers == 0
            && let Some(listener) = state.listener.take()
        {
            listener.stop(None);
        }
    }
}

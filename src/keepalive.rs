//! Keepalive scheduler. Fires on a short fixed interval but only issues the
//! no-op pending-events poll once the session has sat idle past the longer
//! threshold, which detects silently-dropped connections without flooding
//! the server. An explicit cancellation token replaces the original's
//! ambient interval handle.

use std::sync::Weak;
use std::time::Duration;

use console_plugin::{Method, OutboundCall};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::runtime::{self, RuntimeInner};

pub(crate) struct Keepalive {
    handle: tokio::sync::Mutex<Option<Handle>>,
}

struct Handle {
    token: CancellationToken,
    _task: JoinHandle<()>,
}

impl Keepalive {
    pub(crate) fn new() -> Self {
        Self {
            handle: tokio::sync::Mutex::new(None),
        }
    }

    /// Starts the ticker if it is not already running.
    pub(crate) async fn ensure_started(
        &self,
        runtime: Weak<RuntimeInner>,
        interval: Duration,
        idle_threshold: Duration,
    ) {
        let mut slot = self.handle.lock().await;
        if slot.is_some() {
            return;
        }
        let token = CancellationToken::new();
        let child = token.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first interval tick completes immediately; skip it so a
            // session is never polled right after activation.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(inner) = runtime.upgrade() else { break };
                        let idle = inner.session.read().await.last_activity.elapsed();
                        if idle < idle_threshold {
                            trace!("keepalive tick: session recently active");
                            continue;
                        }
                        let poll = OutboundCall::of(Method::GetEvents, None);
                        if let Err(err) = runtime::drive_call(&inner, poll).await {
                            debug!("keepalive poll failed: {err}");
                        }
                    }
                }
            }
        });
        *slot = Some(Handle { token, _task: task });
    }

    /// Stops the ticker. Idempotent; safe to call from a tick itself.
    pub(crate) async fn stop(&self) {
        if let Some(handle) = self.handle.lock().await.take() {
            handle.token.cancel();
        }
    }

    pub(crate) async fn is_running(&self) -> bool {
        self.handle.lock().await.is_some()
    }
}

//! The assembled runtime: one session, one transport, one plugin registry.
//! `call` drives the send → decode → dispatch cycle; follow-up requests
//! produced by the state machine or by plugins are executed iteratively off
//! a queue, so a login chain never recurses through the transport.

use std::collections::{BTreeSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use console_plugin::{ConsolePlugin, Event, Method, OutboundCall, PluginCx};
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tracing::{error, warn};

use crate::cipher::CipherProvider;
use crate::compose;
use crate::config::RuntimeConfig;
use crate::delegate::{ConsoleDelegate, Notice};
use crate::error::RuntimeError;
use crate::keepalive::Keepalive;
use crate::machine;
use crate::router::PluginRegistry;
use crate::session::{Session, SessionPhase};
use crate::transport::{HttpBackend, ReqwestBackend, Transport, TransportFault};

pub(crate) struct RuntimeInner {
    pub(crate) config: RuntimeConfig,
    pub(crate) delegate: Arc<dyn ConsoleDelegate>,
    pub(crate) ciphers: Arc<dyn CipherProvider>,
    pub(crate) transport: Transport,
    pub(crate) session: RwLock<Session>,
    pub(crate) registry: PluginRegistry,
    pub(crate) keepalive: Keepalive,
}

/// Clone-able handle to the runtime. Requests are expected to be issued
/// serially by a disciplined caller; nothing here queues or locks out
/// overlapping `call`s (see DESIGN.md on the concurrency gap).
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Runtime {
    pub fn new(
        config: RuntimeConfig,
        delegate: Arc<dyn ConsoleDelegate>,
        ciphers: Arc<dyn CipherProvider>,
    ) -> Result<Self, RuntimeError> {
        let backend = ReqwestBackend::new(config.request_timeout())?;
        Ok(Self::with_backend(config, delegate, ciphers, Box::new(backend)))
    }

    /// Constructor with an explicit transport backend, used by tests and by
    /// embeddings that bring their own HTTP stack.
    pub fn with_backend(
        config: RuntimeConfig,
        delegate: Arc<dyn ConsoleDelegate>,
        ciphers: Arc<dyn CipherProvider>,
        backend: Box<dyn HttpBackend>,
    ) -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                config,
                delegate,
                ciphers,
                transport: Transport::new(backend),
                session: RwLock::new(Session::new()),
                registry: PluginRegistry::new(),
                keepalive: Keepalive::new(),
            }),
        }
    }

    /// Opens the polling conversation. An unauthenticated poll makes the
    /// server answer with a `login` event, which drives the rest of the
    /// handshake.
    pub async fn start(&self) -> Result<(), RuntimeError> {
        self.call(Method::GetEvents.to_string(), None).await
    }

    /// Generic server call: the single operation plugins and applications
    /// relay their changes through.
    pub async fn call(
        &self,
        method: impl Into<String>,
        data: Option<Value>,
    ) -> Result<(), RuntimeError> {
        drive_call(&self.inner, OutboundCall::new(method, data)).await
    }

    /// Registers a plugin. Unusable registrations are logged and dropped.
    /// Once the handshake has completed, new plugins are announced to the
    /// server immediately; earlier ones are announced by `init`.
    pub async fn register_plugin(&self, plugin: Box<dyn ConsolePlugin>) {
        let Some(name) = self.inner.registry.register(plugin) else {
            return;
        };
        let started = self.inner.session.read().await.started;
        if started {
            let announce = OutboundCall::of(Method::AddPlugin, Some(json!({ "plugin": name })));
            if let Err(err) = drive_call(&self.inner, announce).await {
                warn!(plugin = %name, "plugin announcement failed: {err}");
            }
        }
    }

    /// Ends the current login. Identity, session ID and cipher are cleared
    /// unless a user switch is in flight; polling continues so the server
    /// can push a fresh login prompt.
    pub async fn logout(&self) -> Result<(), RuntimeError> {
        let result = drive_call(&self.inner, OutboundCall::of(Method::Logout, None)).await;
        let mut session = self.inner.session.write().await;
        if session.switching.is_none() {
            session.reset_identity();
        }
        result
    }

    /// Starts authenticating a second identity. The current identity is
    /// kept aside and restored if the switch fails.
    pub async fn switch_user(&self) -> Result<(), RuntimeError> {
        {
            let mut session = self.inner.session.write().await;
            let snapshot = session.snapshot();
            session.switching = Some(snapshot);
        }
        drive_call(&self.inner, OutboundCall::of(Method::SwitchUser, None)).await
    }

    /// Tears the runtime down: stops the scheduler and runs every
    /// registered plugin's shutdown hook exactly once. A second call is a
    /// no-op.
    pub async fn shutdown(&self) {
        self.inner.keepalive.stop().await;
        self.inner.registry.shutdown_all();
        let mut session = self.inner.session.write().await;
        session.started = false;
        session.phase = SessionPhase::LoggedOut;
    }

    /// Side-channel URL for inline images, under the current session.
    pub async fn image_url(&self, data: &Value) -> Result<String, RuntimeError> {
        let session = self.inner.session.read().await;
        compose::image_url(&self.inner.config, &session, data)
    }

    /// Side-channel URL for downloads, under the current session.
    pub async fn download_url(&self, data: &Value) -> Result<String, RuntimeError> {
        let session = self.inner.session.read().await;
        compose::download_url(&self.inner.config, &session, data)
    }

    /// Side-channel URL for uploads, under the current session.
    pub async fn upload_url(&self, data: &Value) -> Result<String, RuntimeError> {
        let session = self.inner.session.read().await;
        compose::upload_url(&self.inner.config, &session, data)
    }

    pub fn plugin_registered(&self, name: &str) -> bool {
        self.inner.registry.contains(name)
    }

    pub async fn is_active(&self) -> bool {
        self.inner.session.read().await.started
    }

    pub async fn current_user(&self) -> String {
        self.inner.session.read().await.user.clone()
    }

    pub async fn session_id(&self) -> Option<String> {
        self.inner.session.read().await.session_id.clone()
    }

    pub async fn server_version(&self) -> Option<String> {
        self.inner.session.read().await.server_version.clone()
    }

    pub async fn keepalive_running(&self) -> bool {
        self.inner.keepalive.is_running().await
    }
}

/// Sends one call and every follow-up it produces, in order. Each response
/// batch is fully dispatched (including post-processing) before the next
/// outbound request leaves.
///
/// Returns a boxed future rather than an `async fn`'s opaque type on purpose:
/// the keepalive scheduler spawns a `Send` task that calls back into
/// `drive_call` (via `on_init` → `ensure_started`), so an opaque return type
/// would make the spawned future's `Send` inference recurse into itself. A
/// declared `dyn Future + Send` return type cuts that cycle.
pub(crate) fn drive_call<'a>(
    inner: &'a Arc<RuntimeInner>,
    first: OutboundCall,
) -> Pin<Box<dyn Future<Output = Result<(), RuntimeError>> + Send + 'a>> {
    Box::pin(async move {
        let mut pending = VecDeque::from([first]);
        while let Some(call) = pending.pop_front() {
            let fields = {
                let session = inner.session.read().await;
                compose::build_request(&inner.config, &session, &call)?
            };
            let raw = match inner.transport.send(&inner.config.base_url, &fields).await {
                Ok(raw) => raw,
                Err(TransportFault::Unreachable) => {
                    inner.delegate.notice(Notice::Unreachable).await;
                    inner.keepalive.stop().await;
                    return Err(RuntimeError::Unreachable);
                }
                Err(TransportFault::Timeout) => {
                    inner.delegate.notice(Notice::TryAgain).await;
                    return Err(RuntimeError::Timeout);
                }
                Err(TransportFault::Other(msg)) => {
                    error!(method = %call.method, "transport failure: {msg}");
                    return Err(RuntimeError::Transport(msg));
                }
            };
            inner.session.write().await.touch();

            let events = {
                let session = inner.session.read().await;
                crate::transport::decode_response(&raw, session.cipher.as_deref())?
            };
            dispatch_batch(inner, events, &mut pending).await?;
        }
        Ok(())
    })
}

/// Dispatches one batch in strict array order: reserved events to the state
/// machine, addressed events to their plugin. Touched plugins get exactly
/// one `post_process` after the batch; only then are queued follow-ups
/// released.
async fn dispatch_batch(
    inner: &Arc<RuntimeInner>,
    events: Vec<Event>,
    pending: &mut VecDeque<OutboundCall>,
) -> Result<(), RuntimeError> {
    let mut cx = PluginCx::new();
    let mut touched = BTreeSet::new();
    let mut follow_ups = Vec::new();

    for event in events {
        match event {
            Event::Core(core) => machine::handle_core(inner, core, &mut follow_ups).await?,
            Event::Plugin(addressed) => {
                if inner.registry.dispatch(&addressed, &mut cx)? {
                    touched.insert(addressed.plugin);
                }
            }
        }
    }

    inner.registry.post_process(&touched, &mut cx);
    pending.extend(follow_ups);
    pending.extend(cx.drain());
    Ok(())
}

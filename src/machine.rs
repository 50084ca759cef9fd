//! Session/login state machine. Reserved inbound events land here; handlers
//! mutate the session (this module is its only writer) and return follow-up
//! outbound calls for the runtime to send, instead of recursing into the
//! transport themselves.

use std::sync::Arc;

use console_plugin::{CoreEvent, HashParams, Method, OutboundCall};
use serde_json::json;
use tracing::{info, trace, warn};
use zeroize::Zeroizing;

use crate::compose;
use crate::delegate::TransferKind;
use crate::error::RuntimeError;
use crate::hash;
use crate::runtime::RuntimeInner;
use crate::session::SessionPhase;

pub(crate) async fn handle_core(
    inner: &Arc<RuntimeInner>,
    event: CoreEvent,
    out: &mut Vec<OutboundCall>,
) -> Result<(), RuntimeError> {
    // Any reserved event other than the lock itself clears the waiting
    // overlay, so a lock followed by an error shows the error on an
    // unlocked screen.
    if !matches!(event, CoreEvent::AppLocked) {
        let was_waiting = {
            let mut session = inner.session.write().await;
            std::mem::take(&mut session.waiting)
        };
        if was_waiting {
            inner.delegate.app_locked(false).await;
        }
    }

    match event {
        CoreEvent::Init => on_init(inner, out).await,
        CoreEvent::Login {
            hash_params,
            default_user,
            error,
        } => on_login(inner, hash_params, default_user, error, out).await,
        CoreEvent::StartEncryption { hash_params } => {
            on_start_encryption(inner, hash_params, out).await
        }
        CoreEvent::Validate { data } => {
            if !inner.delegate.validate(data).await {
                warn!("challenge validation declined");
            }
            Ok(())
        }
        CoreEvent::ChangePassword {
            hash_params,
            rules,
            error,
        } => {
            let mut prompt_error = error;
            let accepted = loop {
                let Some(candidate) = inner
                    .delegate
                    .prompt_new_password(&rules, prompt_error.take())
                    .await
                else {
                    break None;
                };
                match rules.check(&candidate) {
                    Some(violation) => prompt_error = Some(violation),
                    None => break Some(candidate),
                }
            };
            let Some(new_password) = accepted else {
                info!("password change abandoned");
                return Ok(());
            };
            let response = hash::partial_hash(&new_password, &hash_params);
            inner.session.write().await.password = Some(Zeroizing::new(new_password));
            out.push(OutboundCall::of(
                Method::ChangePassword,
                Some(json!({ "response": response })),
            ));
            Ok(())
        }
        CoreEvent::SetSessionId { session_id } => {
            inner.session.write().await.session_id = Some(session_id);
            Ok(())
        }
        CoreEvent::Error { message, source } => {
            let reverted = {
                let mut session = inner.session.write().await;
                match session.switching.take() {
                    Some(snapshot) => {
                        session.restore(snapshot);
                        true
                    }
                    None => false,
                }
            };
            if reverted {
                info!("user switch failed, previous identity restored");
            }
            match &source {
                Some(m) => warn!(source = %m, "server error: {message}"),
                None => warn!("server error: {message}"),
            }
            inner.delegate.show_error(&message).await;
            Ok(())
        }
        CoreEvent::Restart => {
            inner.keepalive.stop().await;
            inner.session.write().await.reset_identity();
            inner.delegate.restart().await;
            Ok(())
        }
        CoreEvent::WarnExpire { seconds } => {
            if inner.delegate.warn_expire(seconds).await {
                // Any request renews the session server-side.
                out.push(OutboundCall::of(Method::GetEvents, None));
            }
            Ok(())
        }
        CoreEvent::AppLocked => {
            inner.session.write().await.waiting = true;
            inner.delegate.app_locked(true).await;
            Ok(())
        }
        CoreEvent::DoDownload { data } => {
            let url = {
                let session = inner.session.read().await;
                compose::download_url(&inner.config, &session, &data)?
            };
            inner
                .delegate
                .open_transfer(TransferKind::Download, &url)
                .await;
            Ok(())
        }
        CoreEvent::DoUpload { data } => {
            let url = {
                let session = inner.session.read().await;
                compose::upload_url(&inner.config, &session, &data)?
            };
            inner
                .delegate
                .open_transfer(TransferKind::Upload, &url)
                .await;
            Ok(())
        }
        CoreEvent::GetEvents => {
            trace!("pending-events poll acknowledged");
            Ok(())
        }
        CoreEvent::SetVersion { version } => {
            inner.session.write().await.server_version = Some(version.clone());
            info!(%version, "server version");
            inner.delegate.server_version(&version).await;
            Ok(())
        }
    }
}

async fn on_init(
    inner: &Arc<RuntimeInner>,
    out: &mut Vec<OutboundCall>,
) -> Result<(), RuntimeError> {
    let announce = {
        let mut session = inner.session.write().await;
        session.phase = SessionPhase::Active;
        session.started = true;
        // A completed handshake ends any pending switch and the password's
        // useful life.
        session.switching = None;
        session.password = None;
        inner.registry.names_sorted()
    };
    inner
        .keepalive
        .ensure_started(
            Arc::downgrade(inner),
            inner.config.keepalive_interval(),
            inner.config.idle_threshold(),
        )
        .await;
    for name in announce {
        out.push(OutboundCall::of(
            Method::AddPlugin,
            Some(json!({ "plugin": name })),
        ));
    }
    out.push(OutboundCall::of(Method::GetVersion, None));
    Ok(())
}

async fn on_login(
    inner: &Arc<RuntimeInner>,
    hash_params: HashParams,
    default_user: Option<String>,
    error: Option<String>,
    out: &mut Vec<OutboundCall>,
) -> Result<(), RuntimeError> {
    let prefill = {
        let session = inner.session.read().await;
        default_user.or_else(|| {
            if session.user.is_empty() {
                inner.config.default_user.clone()
            } else {
                Some(session.user.clone())
            }
        })
    };
    {
        inner.session.write().await.phase = SessionPhase::Authenticating;
    }

    let Some(creds) = inner.delegate.prompt_login(prefill, error).await else {
        let mut session = inner.session.write().await;
        match session.switching.take() {
            Some(snapshot) => session.restore(snapshot),
            None => session.phase = SessionPhase::LoggedOut,
        }
        info!("login abandoned");
        return Ok(());
    };

    let response = hash::partial_hash(&creds.password, &hash_params);
    {
        let mut session = inner.session.write().await;
        // Submitting a login always invalidates the held cipher; a key
        // never crosses identities. During a switch the displaced cipher
        // moves into the snapshot so a failed switch can restore it.
        let displaced = session.cipher.take();
        if let Some(snapshot) = session.switching.as_mut() {
            if snapshot.cipher.is_none() {
                snapshot.cipher = displaced;
            }
        }
        session.user = creds.user.clone();
        session.password = Some(Zeroizing::new(creds.password));
        session.phase = SessionPhase::Authenticating;
    }
    out.push(OutboundCall::of(
        Method::Login,
        Some(json!({ "user": creds.user, "response": response })),
    ));
    Ok(())
}

async fn on_start_encryption(
    inner: &Arc<RuntimeInner>,
    hash_params: HashParams,
    out: &mut Vec<OutboundCall>,
) -> Result<(), RuntimeError> {
    let held = {
        let session = inner.session.read().await;
        session.password.clone()
    };
    let password = match held {
        Some(p) => Some(p),
        None => {
            // The login flow may already have dropped the password;
            // re-prompt for it before the key can be derived.
            {
                inner.session.write().await.phase = SessionPhase::PasswordRequired;
            }
            let user = inner.session.read().await.user.clone();
            inner
                .delegate
                .prompt_login(Some(user), None)
                .await
                .map(|c| Zeroizing::new(c.password))
        }
    };
    let Some(password) = password else {
        warn!("encryption bootstrap abandoned: no password available");
        return Ok(());
    };

    let key = hash::full_hash(&password, &hash_params);
    let cipher = inner.ciphers.create(&key)?;
    {
        let mut session = inner.session.write().await;
        session.cipher = Some(cipher);
        session.phase = SessionPhase::EncryptionPending;
        session.password = None;
    }
    // Confirm over the now-encrypted channel.
    out.push(OutboundCall::of(Method::StartEncryption, None));
    Ok(())
}

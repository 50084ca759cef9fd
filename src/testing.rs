//! Test doubles for exercising the runtime without a server, a UI, or a
//! real cipher. Used by the crate's own tests and available to embedders
//! for theirs.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use console_plugin::{ConsolePlugin, PasswordRules, PluginCx, PluginError, PluginEvent};
use serde_json::Value;

use crate::cipher::{CipherError, CipherProvider, SessionCipher};
use crate::delegate::{ConsoleDelegate, Credentials, Notice, TransferKind};
use crate::transport::{HttpBackend, TransportFault};

/// Reversible toy cipher: XOR against a keystream spun from the key digits,
/// hex-encoded so the wire form never looks like bracketed JSON. Test-only;
/// real embeddings inject a real cipher.
pub struct XorCipher {
    keystream: Vec<u8>,
}

impl SessionCipher for XorCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let bytes: Vec<u8> = plaintext
            .bytes()
            .zip(self.keystream.iter().cycle())
            .map(|(b, k)| b ^ k)
            .collect();
        Ok(hex::encode(bytes))
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError> {
        let bytes =
            hex::decode(ciphertext.trim()).map_err(|e| CipherError::Decrypt(e.to_string()))?;
        let plain: Vec<u8> = bytes
            .iter()
            .zip(self.keystream.iter().cycle())
            .map(|(b, k)| b ^ k)
            .collect();
        String::from_utf8(plain).map_err(|e| CipherError::Decrypt(e.to_string()))
    }
}

pub struct XorCipherProvider;

impl CipherProvider for XorCipherProvider {
    fn create(&self, key: &[u64]) -> Result<Box<dyn SessionCipher>, CipherError> {
        if key.is_empty() {
            return Err(CipherError::Key("empty key".into()));
        }
        let keystream: Vec<u8> = key.iter().flat_map(|d| d.to_le_bytes()).collect();
        Ok(Box::new(XorCipher { keystream }))
    }
}

#[derive(Default)]
struct ScriptState {
    responses: Mutex<VecDeque<Result<String, TransportFault>>>,
    requests: Mutex<Vec<Vec<(String, String)>>>,
}

/// Scripted HTTP backend: canned responses in push order, every request
/// recorded. An exhausted script answers with an empty batch so incidental
/// polls do not fail the test.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    state: Arc<ScriptState>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, body: impl Into<String>) {
        self.state
            .responses
            .lock()
            .unwrap()
            .push_back(Ok(body.into()));
    }

    pub fn push_json(&self, value: &Value) {
        self.push_response(value.to_string());
    }

    pub fn push_fault(&self, fault: TransportFault) {
        self.state.responses.lock().unwrap().push_back(Err(fault));
    }

    pub fn requests(&self) -> Vec<Vec<(String, String)>> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.state.requests.lock().unwrap().len()
    }

    /// The `method` field of every request sent, in order.
    pub fn methods_sent(&self) -> Vec<String> {
        self.requests()
            .iter()
            .filter_map(|fields| Self::field(fields, "method"))
            .collect()
    }

    pub fn field(fields: &[(String, String)], name: &str) -> Option<String> {
        fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    }
}

#[async_trait]
impl HttpBackend for ScriptedBackend {
    async fn post(
        &self,
        _url: &str,
        fields: &[(String, String)],
    ) -> Result<String, TransportFault> {
        self.state.requests.lock().unwrap().push(fields.to_vec());
        self.state
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("[]".to_string()))
    }
}

/// Delegate with queued prompt answers and full observation of everything
/// the runtime surfaced. An empty queue answers `None`, i.e. the user
/// cancelled the prompt.
#[derive(Default)]
pub struct ScriptedDelegate {
    credentials: Mutex<VecDeque<Credentials>>,
    new_passwords: Mutex<VecDeque<String>>,
    validate_ok: AtomicBool,
    renew_on_expiry: AtomicBool,
    login_prompts: Mutex<Vec<(Option<String>, Option<String>)>>,
    password_prompts: Mutex<Vec<Option<String>>>,
    errors: Mutex<Vec<String>>,
    notices: Mutex<Vec<Notice>>,
    lock_changes: Mutex<Vec<bool>>,
    restarts: AtomicUsize,
    transfers: Mutex<Vec<(TransferKind, String)>>,
    versions: Mutex<Vec<String>>,
}

impl ScriptedDelegate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn queue_credentials(&self, user: impl Into<String>, password: impl Into<String>) {
        self.credentials.lock().unwrap().push_back(Credentials {
            user: user.into(),
            password: password.into(),
        });
    }

    pub fn queue_new_password(&self, password: impl Into<String>) {
        self.new_passwords
            .lock()
            .unwrap()
            .push_back(password.into());
    }

    pub fn set_validate_ok(&self, ok: bool) {
        self.validate_ok.store(ok, Ordering::SeqCst);
    }

    pub fn set_renew_on_expiry(&self, renew: bool) {
        self.renew_on_expiry.store(renew, Ordering::SeqCst);
    }

    pub fn login_prompts(&self) -> Vec<(Option<String>, Option<String>)> {
        self.login_prompts.lock().unwrap().clone()
    }

    /// The `error` argument of every new-password prompt, in order.
    pub fn password_prompts(&self) -> Vec<Option<String>> {
        self.password_prompts.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }

    pub fn lock_changes(&self) -> Vec<bool> {
        self.lock_changes.lock().unwrap().clone()
    }

    pub fn restart_count(&self) -> usize {
        self.restarts.load(Ordering::SeqCst)
    }

    pub fn transfers(&self) -> Vec<(TransferKind, String)> {
        self.transfers.lock().unwrap().clone()
    }

    pub fn versions(&self) -> Vec<String> {
        self.versions.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConsoleDelegate for ScriptedDelegate {
    async fn prompt_login(
        &self,
        default_user: Option<String>,
        error: Option<String>,
    ) -> Option<Credentials> {
        self.login_prompts
            .lock()
            .unwrap()
            .push((default_user, error));
        self.credentials.lock().unwrap().pop_front()
    }

    async fn prompt_new_password(
        &self,
        _rules: &PasswordRules,
        error: Option<String>,
    ) -> Option<String> {
        self.password_prompts.lock().unwrap().push(error);
        self.new_passwords.lock().unwrap().pop_front()
    }

    async fn validate(&self, _data: Value) -> bool {
        self.validate_ok.load(Ordering::SeqCst)
    }

    async fn show_error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }

    async fn notice(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }

    async fn warn_expire(&self, _seconds: u64) -> bool {
        self.renew_on_expiry.load(Ordering::SeqCst)
    }

    async fn app_locked(&self, locked: bool) {
        self.lock_changes.lock().unwrap().push(locked);
    }

    async fn restart(&self) {
        self.restarts.fetch_add(1, Ordering::SeqCst);
    }

    async fn open_transfer(&self, kind: TransferKind, url: &str) {
        self.transfers.lock().unwrap().push((kind, url.to_string()));
    }

    async fn server_version(&self, version: &str) {
        self.versions.lock().unwrap().push(version.to_string());
    }
}

/// Plugin that records everything done to it. The observation handles are
/// `Arc`s so they stay readable after the plugin moves into the registry.
pub struct RecordingPlugin {
    name: String,
    seen: Arc<Mutex<Vec<String>>>,
    post_processed: Arc<AtomicUsize>,
    shutdowns: Arc<AtomicUsize>,
    fail_on: Option<String>,
}

impl RecordingPlugin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            seen: Arc::new(Mutex::new(Vec::new())),
            post_processed: Arc::new(AtomicUsize::new(0)),
            shutdowns: Arc::new(AtomicUsize::new(0)),
            fail_on: None,
        }
    }

    /// Makes `handle_event` fail for one specific method.
    pub fn fail_on(mut self, method: impl Into<String>) -> Self {
        self.fail_on = Some(method.into());
        self
    }

    pub fn seen_methods(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.seen)
    }

    pub fn post_process_count(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.post_processed)
    }

    pub fn shutdown_count(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.shutdowns)
    }
}

impl ConsolePlugin for RecordingPlugin {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn handle_event(&mut self, event: &PluginEvent, _cx: &mut PluginCx) -> Result<(), PluginError> {
        self.seen.lock().unwrap().push(event.method.clone());
        if self.fail_on.as_deref() == Some(event.method.as_str()) {
            return Err(PluginError::Other("induced failure".into()));
        }
        Ok(())
    }

    fn post_process(&mut self, _cx: &mut PluginCx) {
        self.post_processed.fetch_add(1, Ordering::SeqCst);
    }

    fn shutdown(&mut self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

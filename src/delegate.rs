//! The UI seam. The runtime never renders anything; every prompt, notice
//! and hand-off goes through this trait, implemented by the embedding
//! application.

use async_trait::async_trait;
use console_plugin::PasswordRules;
use serde_json::Value;
use tracing::warn;

/// Credentials collected by the login prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

/// Non-fatal transport notices shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// The server cannot be reached; polling has been suspended.
    Unreachable,
    /// The request timed out; trying again may succeed.
    TryAgain,
}

/// Which side-channel a transfer URL belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Image,
    Download,
    Upload,
}

#[async_trait]
pub trait ConsoleDelegate: Send + Sync {
    /// Collect credentials. `default_user` pre-fills the form; `error`
    /// carries the server's message for a failed prior attempt. `None`
    /// abandons the attempt.
    async fn prompt_login(
        &self,
        default_user: Option<String>,
        error: Option<String>,
    ) -> Option<Credentials>;

    /// Collect a replacement password. Constraint violations are detected
    /// by the runtime, which re-prompts with the violation in `error`.
    async fn prompt_new_password(
        &self,
        rules: &PasswordRules,
        error: Option<String>,
    ) -> Option<String>;

    /// External challenge-response step. The default declines; embeddings
    /// whose server enables validation must override this.
    async fn validate(&self, _data: Value) -> bool {
        warn!("validate requested but the delegate does not implement it");
        false
    }

    /// Show a server-reported error.
    async fn show_error(&self, message: &str);

    /// Show a transport notice.
    async fn notice(&self, notice: Notice);

    /// Session expiry countdown. Return `true` to renew.
    async fn warn_expire(&self, seconds: u64) -> bool;

    /// The server locked or unlocked the application.
    async fn app_locked(&self, locked: bool);

    /// The session is gone; reload the application.
    async fn restart(&self);

    /// Hand over a side-channel transfer URL.
    async fn open_transfer(&self, kind: TransferKind, url: &str);

    /// Server build version, reported once after activation.
    async fn server_version(&self, _version: &str) {}
}

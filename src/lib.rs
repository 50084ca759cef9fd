//! Opsdeck client runtime: the protocol/session engine behind the admin
//! console. It keeps a statefully-polled connection to the console server,
//! derives keys from the login password, negotiates payload encryption,
//! routes inbound event batches to registered plugins, and keeps the
//! session alive with an idle-gated keepalive.
//!
//! Widgets and rendering live in the applications embedding this crate; the
//! runtime's surface is [`Runtime`], the [`ConsoleDelegate`] UI seam, the
//! [`cipher`] injection seam, and the plugin API re-exported from
//! `console_plugin`.

pub mod cipher;
pub mod compose;
pub mod config;
pub mod delegate;
pub mod error;
pub mod hash;
mod keepalive;
pub mod logger;
mod machine;
pub mod router;
pub mod runtime;
pub mod session;
pub mod testing;
pub mod transport;

pub use config::RuntimeConfig;
pub use delegate::{ConsoleDelegate, Credentials, Notice, TransferKind};
pub use error::RuntimeError;
pub use logger::init_logging;
pub use runtime::Runtime;
pub use session::{Session, SessionPhase};

pub use console_plugin::{
    Batch, ConsolePlugin, CoreEvent, Event, HashParams, Method, OutboundCall, PasswordRules,
    PluginCx, PluginError, PluginEvent,
};

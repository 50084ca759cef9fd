pub mod event;
pub mod method;
pub mod plugin;

pub use event::{Batch, CoreEvent, Event, HashParams, PasswordRules, PluginEvent};
pub use method::Method;
pub use plugin::{ConsolePlugin, OutboundCall, PluginCx, PluginError};

use serde_json::Value;
use thiserror::Error;

use crate::event::PluginEvent;
use crate::method::Method;

/// One outbound request, queued for the runtime to send.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundCall {
    pub method: String,
    pub data: Option<Value>,
}

impl OutboundCall {
    pub fn new(method: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            method: method.into(),
            data,
        }
    }

    /// Build a call for one of the reserved outbound methods.
    pub fn of(method: Method, data: Option<Value>) -> Self {
        Self::new(method.to_string(), data)
    }
}

/// Handed to a plugin while it processes events. Calls queued here are sent
/// by the runtime once the current batch has fully dispatched, preserving
/// the batch ordering guarantee.
#[derive(Debug, Default)]
pub struct PluginCx {
    calls: Vec<OutboundCall>,
}

impl PluginCx {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a generic server call.
    pub fn call(&mut self, method: impl Into<String>, data: Option<Value>) {
        self.calls.push(OutboundCall::new(method, data));
    }

    pub fn drain(&mut self) -> Vec<OutboundCall> {
        std::mem::take(&mut self.calls)
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

/// The one trait plugin authors implement. A plugin is registered under its
/// `name` and receives exactly the inbound events addressed to that name.
pub trait ConsolePlugin: Send + Sync {
    /// Registry key. Must be non-empty; a later registration under the same
    /// name replaces the earlier one.
    fn name(&self) -> String;

    /// Handle one addressed event. Errors are logged by the router together
    /// with the offending event and then propagated to the caller.
    fn handle_event(&mut self, event: &PluginEvent, cx: &mut PluginCx) -> Result<(), PluginError>;

    /// Called once per batch that delivered at least one event to this
    /// plugin, after the whole batch has dispatched.
    fn post_process(&mut self, _cx: &mut PluginCx) {}

    /// Called exactly once when the runtime shuts down.
    fn shutdown(&mut self);
}

/// Errors a `ConsolePlugin` implementation can return.
#[derive(Error, Debug)]
pub enum PluginError {
    /// Something went wrong encoding or decoding JSON.
    #[error("JSON error: {0}")]
    Json(String),

    /// The plugin is not in a state where this event is valid.
    #[error("invalid state for this operation")]
    InvalidState,

    /// The plugin returned an unspecified failure.
    #[error("plugin error: {0}")]
    Other(String),
}

impl From<serde_json::Error> for PluginError {
    fn from(err: serde_json::Error) -> PluginError {
        PluginError::Json(err.to_string())
    }
}

impl From<anyhow::Error> for PluginError {
    fn from(err: anyhow::Error) -> PluginError {
        PluginError::Other(err.to_string())
    }
}

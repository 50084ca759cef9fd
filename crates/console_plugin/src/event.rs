use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Hash parameters the server hands out per login attempt. The primary
/// pairs drive the challenge-response digest, the secondary pairs extend it
/// into the cipher key seed. Both lists are positional: multiplier `i` goes
/// with modulus `i`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct HashParams {
    pub primary_multiples: Vec<u64>,
    pub primary_modulos: Vec<u64>,
    #[serde(default)]
    pub secondary_multiples: Vec<u64>,
    #[serde(default)]
    pub secondary_modulos: Vec<u64>,
}

/// Constraints the server declares for a new password. Validated client-side
/// before the replacement is hashed and submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct PasswordRules {
    #[serde(default)]
    pub min_length: usize,
    #[serde(default)]
    pub require_digit: bool,
}

impl PasswordRules {
    /// Returns the first violated rule as a message, or `None` if the
    /// candidate passes.
    pub fn check(&self, candidate: &str) -> Option<String> {
        if candidate.chars().count() < self.min_length {
            return Some(format!(
                "password must be at least {} characters",
                self.min_length
            ));
        }
        if self.require_digit && !candidate.chars().any(|c| c.is_ascii_digit()) {
            return Some("password must contain a digit".into());
        }
        None
    }
}

/// Reserved protocol events: every inbound event without a `plugin` field
/// must be one of these. The `method` field is the discriminator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "camelCase")]
pub enum CoreEvent {
    /// Session is live; the runtime activates, starts the keepalive and
    /// re-announces its plugins.
    Init,

    /// Prompt for credentials, optionally pre-filled and carrying the error
    /// from a failed prior attempt.
    #[serde(rename_all = "camelCase")]
    Login {
        hash_params: HashParams,
        #[serde(default)]
        default_user: Option<String>,
        #[serde(default)]
        error: Option<String>,
    },

    /// Derive a key from the held password and bring the injected cipher up.
    #[serde(rename_all = "camelCase")]
    StartEncryption { hash_params: HashParams },

    /// External challenge-response step, delegated to the embedding UI.
    Validate {
        #[serde(default)]
        data: Value,
    },

    /// Collect and submit a replacement password.
    #[serde(rename_all = "camelCase")]
    ChangePassword {
        hash_params: HashParams,
        #[serde(default)]
        rules: PasswordRules,
        #[serde(default)]
        error: Option<String>,
    },

    /// Server-assigned session identifier, echoed on every later request.
    #[serde(rename = "setSessionID")]
    SetSessionId {
        #[serde(rename = "sessionID")]
        session_id: String,
    },

    /// Server-side failure; `source` names the request that caused it.
    Error {
        message: String,
        #[serde(default)]
        source: Option<String>,
    },

    /// Forced reload: the session is gone and cannot be renewed.
    Restart,

    /// Expiry countdown with a renew option.
    WarnExpire { seconds: u64 },

    /// The application is locked server-side; keep polling until it clears.
    AppLocked,

    /// Launch an out-of-band download through the URL side-channel.
    DoDownload {
        #[serde(default)]
        data: Value,
    },

    /// Launch an out-of-band upload through the URL side-channel.
    DoUpload {
        #[serde(default)]
        data: Value,
    },

    /// No-op acknowledgement of a pending-events poll.
    GetEvents,

    /// Server build version, requested right after `init`.
    SetVersion { version: String },
}

/// An event addressed to a registered plugin. The whole payload minus the
/// addressing fields is kept as-is; the plugin owns its schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PluginEvent {
    pub plugin: String,
    pub method: String,
    #[serde(flatten)]
    pub payload: serde_json::Map<String, Value>,
}

/// A single inbound protocol event. Events carrying a `plugin` field are
/// routed to the named plugin; everything else must be a [`CoreEvent`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Event {
    Core(CoreEvent),
    Plugin(PluginEvent),
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let addressed = value.get("plugin").is_some_and(|p| !p.is_null());
        if addressed {
            serde_json::from_value(value)
                .map(Event::Plugin)
                .map_err(serde::de::Error::custom)
        } else {
            serde_json::from_value(value)
                .map(Event::Core)
                .map_err(serde::de::Error::custom)
        }
    }
}

/// A server response: either one event object or an ordered array of them.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Batch {
    One(Event),
    Many(Vec<Event>),
}

impl Batch {
    pub fn into_events(self) -> Vec<Event> {
        match self {
            Batch::One(event) => vec![event],
            Batch::Many(events) => events,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn core_event_roundtrip() {
        let ev: Event = serde_json::from_value(json!({
            "method": "setSessionID",
            "sessionID": "a1b2c3"
        }))
        .unwrap();
        match ev {
            Event::Core(CoreEvent::SetSessionId { session_id }) => {
                assert_eq!(session_id, "a1b2c3")
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn login_event_with_defaults() {
        let ev: Event = serde_json::from_value(json!({
            "method": "login",
            "hashParams": {
                "primaryMultiples": [3, 5],
                "primaryModulos": [97, 101]
            }
        }))
        .unwrap();
        match ev {
            Event::Core(CoreEvent::Login {
                hash_params,
                default_user,
                error,
            }) => {
                assert_eq!(hash_params.primary_multiples, vec![3, 5]);
                assert!(hash_params.secondary_multiples.is_empty());
                assert!(default_user.is_none());
                assert!(error.is_none());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn plugin_field_routes_to_plugin_event() {
        let ev: Event = serde_json::from_value(json!({
            "plugin": "LogBrowser",
            "method": "appendRows",
            "rows": [1, 2, 3]
        }))
        .unwrap();
        match ev {
            Event::Plugin(pe) => {
                assert_eq!(pe.plugin, "LogBrowser");
                assert_eq!(pe.method, "appendRows");
                assert_eq!(pe.payload["rows"], json!([1, 2, 3]));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unknown_reserved_method_is_a_decode_error() {
        let result: Result<Event, _> =
            serde_json::from_value(json!({"method": "totallyUnknown"}));
        assert!(result.is_err());
    }

    #[test]
    fn batch_accepts_single_and_array() {
        let one: Batch = serde_json::from_value(json!({"method": "init"})).unwrap();
        assert_eq!(one.into_events().len(), 1);

        let many: Batch =
            serde_json::from_value(json!([{"method": "init"}, {"method": "restart"}])).unwrap();
        assert_eq!(many.into_events().len(), 2);
    }

    #[test]
    fn password_rules_check() {
        let rules = PasswordRules {
            min_length: 6,
            require_digit: true,
        };
        assert!(rules.check("short").is_some());
        assert!(rules.check("longenough").is_some());
        assert!(rules.check("longenough1").is_none());
    }
}

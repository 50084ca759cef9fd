//! Builds outbound requests. Every request carries the standard addressing
//! fields; the `data` payload is stringified one level deep and, when a
//! cipher is active, padded and encrypted. The side-channel URL builders
//! make the identical encrypt-or-plaintext decision but emit a query string
//! instead of a POST body.

use console_plugin::{Method, OutboundCall};
use serde_json::Value;
use url::form_urlencoded;

use crate::cipher::SessionCipher;
use crate::config::RuntimeConfig;
use crate::error::RuntimeError;
use crate::session::Session;

/// Filler added to `data` before encryption. The server rejects ciphertext
/// under a minimum length; the constant keeps short payloads above that
/// floor and is stripped server-side. Not a cryptographic measure.
pub(crate) const PADDING_FIELD: &str = "padding";
pub(crate) const PADDING_VALUE: &str = "00000000000000000000000000000000";

/// Assembles the POST form for one outbound call.
pub fn build_request(
    config: &RuntimeConfig,
    session: &Session,
    call: &OutboundCall,
) -> Result<Vec<(String, String)>, RuntimeError> {
    let mut fields: Vec<(String, String)> = Vec::with_capacity(7);
    if let Some(sid) = &session.session_id {
        fields.push(("sessionID".into(), sid.clone()));
    }
    fields.push(("app".into(), config.app.clone()));
    fields.push(("client".into(), config.client.clone()));
    fields.push(("user".into(), session.user.clone()));
    fields.push(("encrypted".into(), session.encrypted().to_string()));
    fields.push(("method".into(), call.method.clone()));

    match (&call.data, &session.cipher) {
        (Some(data), Some(cipher)) => {
            fields.push(("data".into(), encrypted_data(cipher.as_ref(), data)?));
        }
        // Encrypted requests always carry a data field so the padded
        // payload satisfies the server's length floor.
        (None, Some(cipher)) => {
            let empty = Value::Object(Default::default());
            fields.push(("data".into(), encrypted_data(cipher.as_ref(), &empty)?));
        }
        (Some(data), None) => {
            fields.push(("data".into(), shallow_string(data)));
        }
        (None, None) => {}
    }
    Ok(fields)
}

/// Side-channel URL for inline images.
pub fn image_url(
    config: &RuntimeConfig,
    session: &Session,
    data: &Value,
) -> Result<String, RuntimeError> {
    transfer_url(config, session, Method::Image, data)
}

/// Side-channel URL for file downloads.
pub fn download_url(
    config: &RuntimeConfig,
    session: &Session,
    data: &Value,
) -> Result<String, RuntimeError> {
    transfer_url(config, session, Method::Download, data)
}

/// Side-channel URL for file uploads.
pub fn upload_url(
    config: &RuntimeConfig,
    session: &Session,
    data: &Value,
) -> Result<String, RuntimeError> {
    transfer_url(config, session, Method::Upload, data)
}

fn transfer_url(
    config: &RuntimeConfig,
    session: &Session,
    method: Method,
    data: &Value,
) -> Result<String, RuntimeError> {
    let fields = build_request(config, session, &OutboundCall::of(method, Some(data.clone())))?;
    let mut qs = form_urlencoded::Serializer::new(String::new());
    for (name, value) in &fields {
        qs.append_pair(name, value);
    }
    Ok(format!("{}?{}", config.base_url, qs.finish()))
}

/// One-level stringification: objects and arrays become their JSON text,
/// strings pass through, scalars print plainly. Nested structures inside an
/// object are not walked further; they ride along inside the JSON text.
fn shallow_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(_) | Value::Array(_) => value.to_string(),
        other => other.to_string(),
    }
}

fn encrypted_data(cipher: &dyn SessionCipher, data: &Value) -> Result<String, RuntimeError> {
    let padded = match data {
        Value::Object(map) => {
            let mut map = map.clone();
            map.insert(PADDING_FIELD.into(), Value::String(PADDING_VALUE.into()));
            Value::Object(map)
        }
        other => other.clone(),
    };
    let plain = serde_json::to_string(&padded)?;
    Ok(cipher.encrypt(&plain)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::XorCipherProvider;
    use crate::cipher::CipherProvider;
    use serde_json::json;

    fn config() -> RuntimeConfig {
        RuntimeConfig::new("http://console.local/rpc", "admin", "desktop")
    }

    fn field<'a>(fields: &'a [(String, String)], name: &str) -> Option<&'a str> {
        fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn plaintext_request_carries_standard_fields() {
        let mut session = Session::new();
        session.user = "root".into();
        session.session_id = Some("s-1".into());

        let call = OutboundCall::of(Method::GetEvents, None);
        let fields = build_request(&config(), &session, &call).unwrap();

        assert_eq!(field(&fields, "sessionID"), Some("s-1"));
        assert_eq!(field(&fields, "app"), Some("admin"));
        assert_eq!(field(&fields, "client"), Some("desktop"));
        assert_eq!(field(&fields, "user"), Some("root"));
        assert_eq!(field(&fields, "encrypted"), Some("false"));
        assert_eq!(field(&fields, "method"), Some("getEvents"));
        assert_eq!(field(&fields, "data"), None);
    }

    #[test]
    fn session_id_is_omitted_until_assigned() {
        let session = Session::new();
        let call = OutboundCall::of(Method::GetEvents, None);
        let fields = build_request(&config(), &session, &call).unwrap();
        assert_eq!(field(&fields, "sessionID"), None);
    }

    #[test]
    fn object_data_is_stringified_one_level() {
        let session = Session::new();
        let call = OutboundCall::new("query", Some(json!({"filter": {"level": "warn"}})));
        let fields = build_request(&config(), &session, &call).unwrap();
        let data = field(&fields, "data").unwrap();
        // Valid JSON text, nested object carried inside it.
        let back: Value = serde_json::from_str(data).unwrap();
        assert_eq!(back["filter"]["level"], "warn");
    }

    #[test]
    fn encrypted_data_is_padded_before_the_cipher() {
        let mut session = Session::new();
        let cipher = XorCipherProvider.create(&[4, 8, 15, 16]).unwrap();
        session.cipher = Some(cipher);

        let call = OutboundCall::new("query", Some(json!({"q": "x"})));
        let fields = build_request(&config(), &session, &call).unwrap();
        assert_eq!(field(&fields, "encrypted"), Some("true"));

        let wire = field(&fields, "data").unwrap();
        let decrypted = session
            .cipher
            .as_ref()
            .unwrap()
            .decrypt(wire)
            .unwrap();
        let back: Value = serde_json::from_str(&decrypted).unwrap();
        assert_eq!(back["q"], "x");
        assert_eq!(back[PADDING_FIELD], PADDING_VALUE);
    }

    #[test]
    fn transfer_url_is_a_single_query_string() {
        let mut session = Session::new();
        session.user = "root".into();
        session.session_id = Some("s-9".into());

        let url = download_url(&config(), &session, &json!({"file": "audit log.csv"})).unwrap();
        assert!(url.starts_with("http://console.local/rpc?sessionID=s-9&app=admin"));
        assert!(url.contains("method=download"));
        // Space must be escaped inside the single data field.
        assert!(url.contains("audit+log.csv") || url.contains("audit%20log.csv"));
    }
}

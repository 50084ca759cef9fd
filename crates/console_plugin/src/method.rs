use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Strongly-typed list of outbound request methods the runtime issues
/// against the console server. The wire form is camelCase.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, AsRefStr, Display, Serialize, Deserialize,
)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum Method {
    // Session lifecycle
    Login,
    Logout,
    SwitchUser,
    StartEncryption,
    ChangePassword,

    // Handshake / bookkeeping
    AddPlugin,
    GetEvents,
    GetVersion,

    // Out-of-band transfers
    Image,
    Download,
    Upload,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn wire_form_is_camel_case() {
        assert_eq!(Method::StartEncryption.to_string(), "startEncryption");
        assert_eq!(Method::GetEvents.as_ref(), "getEvents");
        assert_eq!(Method::Login.to_string(), "login");
    }

    #[test]
    fn parses_back_from_wire_form() {
        let m = Method::from_str("changePassword").unwrap();
        assert_eq!(m, Method::ChangePassword);
        assert!(Method::from_str("noSuchMethod").is_err());
    }
}

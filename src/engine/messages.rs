//! Messages exchanged with the engine

use serde::{Deserialize, Serialize};

use crate::kb::SettingsMessage;

/// Decoded message sent by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EngineMessage {
    /// One fragment of a type dump, ingested as-is
    TypeDump { fragment: serde_json::Value },
    /// The engine finished sending the current dump
    EndOfDump,
    Settings(SettingsMessage),
}

/// Message sent to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EngineRequest {
    /// Ask for a full type dump
    RequestDebugDatabase,
}

impl EngineMessage {
    pub fn decode(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_each_message_kind() {
        let dump = EngineMessage::decode(r#"{"type":"typeDump","fragment":{"types":[{"name":"AActor"}]}}"#).unwrap();
        assert_eq!(dump, EngineMessage::TypeDump { fragment: json!({"types": [{"name": "AActor"}]}) });

        assert_eq!(EngineMessage::decode(r#"{"type":"endOfDump"}"#).unwrap(), EngineMessage::EndOfDump);

        let settings = EngineMessage::decode(r#"{"type":"settings","version":4,"exposeGlobalFunctions":true}"#).unwrap();
        match settings {
            EngineMessage::Settings(message) => {
                assert_eq!(message.version, 4);
                assert_eq!(message.expose_global_functions, Some(true));
                assert_eq!(message.float_is_float64, None);
            }
            other => panic!("expected settings, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_message_is_an_error() {
        assert!(EngineMessage::decode(r#"{"type":"breakpointHit"}"#).is_err());
        assert!(EngineMessage::decode("not json").is_err());
    }

    #[test]
    fn test_request_encoding() {
        let line = serde_json::to_string(&EngineRequest::RequestDebugDatabase).unwrap();
        assert_eq!(line, r#"{"type":"requestDebugDatabase"}"#);
    }
}

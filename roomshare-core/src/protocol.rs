use serde::{Deserialize, Serialize};

use crate::CoreError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub id: String,
    pub message: String,
    pub client_name: String,
    #[serde(default)]
    pub client_ip: String,
    pub timestamp: f64,
    #[serde(default)]
    pub time_str: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
    pub size: u64,
    pub modified: f64,
    /// Server-relative path, e.g. `/api/download/report.pdf`.
    #[serde(rename = "url")]
    pub download_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct FileList {
    #[serde(default)]
    pub files: Vec<RemoteFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RoomSummary {
    #[serde(rename = "qr_code", default)]
    pub qr_code_ref: String,
    #[serde(default)]
    pub room_url: String,
    #[serde(default)]
    pub total_clients: u64,
    #[serde(rename = "chat_messages", default)]
    pub chat_message_count: u64,
    #[serde(default)]
    pub total_files: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct UploadReceipt {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SendChatRequest {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SendChatResponse {
    #[serde(default)]
    pub success: bool,
    pub message: ChatMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Welcome {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub chat_history: Option<Vec<ChatMessage>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Welcome(Welcome),
    ChatMessage { message: ChatMessage },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    ChatMessage { message: String },
}

pub fn decode_server_event(frame: &str) -> Result<ServerEvent, CoreError> {
    serde_json::from_str(frame).map_err(|err| CoreError::Serialization(err.to_string()))
}

pub fn encode_client_event(event: &ClientEvent) -> Result<String, CoreError> {
    serde_json::to_string(event).map_err(|err| CoreError::Serialization(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn welcome_with_history_decodes() {
        let frame = r#"{
            "type": "welcome",
            "client_id": "client_1_ab",
            "client_name": "User1",
            "chat_history": [
                {"id": "a1", "message": "hi", "client_name": "User2", "client_ip": "10.0.0.2",
                 "timestamp": 1735000000.5, "time_str": "2024-12-24 00:26:40"}
            ]
        }"#;

        let event = decode_server_event(frame).unwrap();
        let ServerEvent::Welcome(welcome) = event else {
            panic!("expected welcome frame");
        };
        assert_eq!(welcome.client_name.as_deref(), Some("User1"));
        let history = welcome.chat_history.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].message, "hi");
    }

    #[test]
    fn welcome_without_history_decodes() {
        let event = decode_server_event(r#"{"type":"welcome","client_name":"User3"}"#).unwrap();
        assert_eq!(
            event,
            ServerEvent::Welcome(Welcome {
                client_id: None,
                client_name: Some("User3".to_owned()),
                chat_history: None,
            })
        );
    }

    #[test]
    fn unknown_event_type_is_tolerated() {
        let event = decode_server_event(r#"{"type":"typing","who":"User2"}"#).unwrap();
        assert_eq!(event, ServerEvent::Unknown);
    }

    #[test]
    fn garbage_frame_is_a_serialization_error() {
        let err = decode_server_event("not json").unwrap_err();
        assert!(matches!(err, CoreError::Serialization(_)));
    }

    #[test]
    fn outbound_chat_uses_snake_case_tag() {
        let encoded = encode_client_event(&ClientEvent::ChatMessage {
            message: "hello".to_owned(),
        })
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value["type"], "chat_message");
        assert_eq!(value["message"], "hello");
    }

    #[test]
    fn room_summary_defaults_missing_counters() {
        let summary: RoomSummary =
            serde_json::from_str(r#"{"room_url":"http://192.168.1.4:8080"}"#).unwrap();
        assert_eq!(summary.room_url, "http://192.168.1.4:8080");
        assert_eq!(summary.total_clients, 0);
        assert_eq!(summary.chat_message_count, 0);
    }

    #[test]
    fn remote_file_reads_url_as_download_path() {
        let list: FileList = serde_json::from_str(
            r#"{"files":[{"id":"a.txt","name":"a.txt","size":3,"modified":1.0,"url":"/api/download/a.txt"}]}"#,
        )
        .unwrap();
        assert_eq!(list.files[0].download_path, "/api/download/a.txt");
    }
}

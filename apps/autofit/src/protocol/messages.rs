//! Wire contract between the host context and the render context.
//!
//! Every message is a JSON object `{"type": "...", "payload": {...}}`. The field
//! names and type tags are shared with unmodified counterparts and must not change.

use serde::{Deserialize, Serialize};

use crate::autofit::FitResult;
use crate::models::{Measurement, StyleSnapshot};
use crate::protocol::{ProtocolError, Side};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// Render context is loaded and waiting for acknowledgment.
    Ready,
    /// Host has seen READY; the render context stops broadcasting.
    Ack,
    /// Replaces the document content and resets the content baseline.
    SetContent { markdown: String },
    /// Merged into the render context's current style snapshot.
    UpdateStyles { styles: StyleSnapshot },
    /// Delegated to the oracle's printable-output hook.
    Print,
    /// Runs one auto-fit search over the current content.
    FitToPage,
    /// A host-side view toggle; re-renders at interaction priority.
    SetViewOption { name: String, value: String },
    Rendering,
    Rendered { measurement: Measurement },
    RenderError { message: String },
    AutoFitResult { result: FitResult },
    /// Final measurements are stable; set only after any auto-fit run has settled.
    RenderComplete { measurement: Option<Measurement> },
}

impl Message {
    /// The wire tag of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Ready => "READY",
            Message::Ack => "ACK",
            Message::SetContent { .. } => "SET_CONTENT",
            Message::UpdateStyles { .. } => "UPDATE_STYLES",
            Message::Print => "PRINT",
            Message::FitToPage => "FIT_TO_PAGE",
            Message::SetViewOption { .. } => "SET_VIEW_OPTION",
            Message::Rendering => "RENDERING",
            Message::Rendered { .. } => "RENDERED",
            Message::RenderError { .. } => "RENDER_ERROR",
            Message::AutoFitResult { .. } => "AUTO_FIT_RESULT",
            Message::RenderComplete { .. } => "RENDER_COMPLETE",
        }
    }

    /// The only side allowed to originate this message.
    pub fn origin(&self) -> Side {
        match self {
            Message::Ack
            | Message::SetContent { .. }
            | Message::UpdateStyles { .. }
            | Message::Print
            | Message::FitToPage
            | Message::SetViewOption { .. } => Side::Host,
            Message::Ready
            | Message::Rendering
            | Message::Rendered { .. }
            | Message::RenderError { .. }
            | Message::AutoFitResult { .. }
            | Message::RenderComplete { .. } => Side::Render,
        }
    }

    pub fn to_wire(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_wire(raw: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn wire_json(message: &Message) -> Value {
        serde_json::from_str(&message.to_wire().unwrap()).unwrap()
    }

    #[test]
    fn test_unit_messages_carry_only_type() {
        assert_eq!(wire_json(&Message::Ready), json!({"type": "READY"}));
        assert_eq!(wire_json(&Message::Ack), json!({"type": "ACK"}));
        assert_eq!(wire_json(&Message::Print), json!({"type": "PRINT"}));
    }

    #[test]
    fn test_set_content_field_names() {
        let msg = Message::SetContent {
            markdown: "## Experience".to_string(),
        };
        assert_eq!(
            wire_json(&msg),
            json!({"type": "SET_CONTENT", "payload": {"markdown": "## Experience"}})
        );
    }

    #[test]
    fn test_update_styles_field_names() {
        let mut styles = StyleSnapshot::new();
        styles.insert("--page-margin".to_string(), "9mm".to_string());
        let msg = Message::UpdateStyles { styles };
        assert_eq!(
            wire_json(&msg),
            json!({"type": "UPDATE_STYLES", "payload": {"styles": {"--page-margin": "9mm"}}})
        );
    }

    #[test]
    fn test_set_view_option_field_names() {
        let msg = Message::SetViewOption {
            name: "show-guides".to_string(),
            value: "on".to_string(),
        };
        assert_eq!(
            wire_json(&msg),
            json!({"type": "SET_VIEW_OPTION", "payload": {"name": "show-guides", "value": "on"}})
        );
        assert_eq!(msg.origin(), Side::Host);
    }

    #[test]
    fn test_decode_ack_from_counterpart() {
        let msg = Message::from_wire(r#"{"type":"ACK"}"#).unwrap();
        assert_eq!(msg, Message::Ack);
    }

    #[test]
    fn test_decode_unknown_type_fails() {
        assert!(Message::from_wire(r#"{"type":"SHUTDOWN"}"#).is_err());
    }

    #[test]
    fn test_kind_matches_wire_tag() {
        let msg = Message::RenderError {
            message: "boom".to_string(),
        };
        assert_eq!(wire_json(&msg)["type"], msg.kind());
    }

    #[test]
    fn test_origin_partitions_writers() {
        assert_eq!(Message::Ready.origin(), Side::Render);
        assert_eq!(Message::Ack.origin(), Side::Host);
        assert_eq!(Message::FitToPage.origin(), Side::Host);
        assert_eq!(Message::Rendering.origin(), Side::Render);
    }
}

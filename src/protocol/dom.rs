//! DOM interaction detail payloads.
//!
//! These are the shapes the in-page instrumentation serializes through the
//! console side channel. Field names must stay aligned with the injected
//! script's `extractDetail` output (camelCase on the wire).
//!
//! Deserialization is tolerant: every field defaults, so a payload captured
//! from an exotic element (no `value`, no `rect`, etc.) still decodes.

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

// ============================================================================
// BoundingRect
// ============================================================================

/// Element bounding rectangle in CSS pixels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundingRect {
    /// Distance from the viewport top.
    pub top: f64,
    /// Distance from the viewport left to the right edge.
    pub right: f64,
    /// Distance from the viewport top to the bottom edge.
    pub bottom: f64,
    /// Distance from the viewport left.
    pub left: f64,
    /// Rectangle width.
    pub width: f64,
    /// Rectangle height.
    pub height: f64,
    /// Horizontal origin.
    pub x: f64,
    /// Vertical origin.
    pub y: f64,
}

// ============================================================================
// DomInteractionDetail
// ============================================================================

/// Snapshot of the element an interaction targeted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DomInteractionDetail {
    /// Lowercased tag name.
    pub tag: String,

    /// Element id attribute, empty when absent.
    pub id: String,

    /// Element class attribute, empty when absent.
    pub class: String,

    /// Input type for form controls (`"text"`, `"checkbox"`, ...).
    #[serde(rename = "type")]
    pub input_type: Option<String>,

    /// Current value for form controls.
    pub value: Option<String>,

    /// Checked state for checkboxes/radios.
    pub checked: Option<bool>,

    /// Placeholder text for inputs.
    pub placeholder: Option<String>,

    /// Form control name.
    pub name: Option<String>,

    /// Whether the element is content-editable.
    pub is_content_editable: bool,

    /// Computed visibility: `display != none` and `visibility != hidden`.
    pub visible: bool,

    /// Disabled state for form controls.
    pub disabled: bool,

    /// Read-only state for form controls.
    pub read_only: bool,

    /// Full attribute list as captured.
    pub attributes: FxHashMap<String, String>,

    /// Bounding rectangle at capture time.
    pub rect: BoundingRect,
}

// ============================================================================
// DomInteractionPayload
// ============================================================================

/// Decoded side-channel payload: `{type, element, timestamp}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomInteractionPayload {
    /// Interaction type (`"click"`, `"focus"`, ...).
    #[serde(rename = "type")]
    pub interaction: String,

    /// Snapshot of the target element.
    #[serde(default)]
    pub element: DomInteractionDetail,

    /// In-page capture time in milliseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: u64,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_deserializes_full() {
        let json = r#"{
            "type": "click",
            "element": {
                "tag": "button",
                "id": "submit",
                "class": "primary",
                "type": "submit",
                "value": null,
                "checked": null,
                "placeholder": null,
                "name": "submit",
                "isContentEditable": false,
                "visible": true,
                "disabled": false,
                "readOnly": false,
                "attributes": {"id": "submit", "class": "primary"},
                "rect": {"top": 10.0, "right": 110.0, "bottom": 40.0, "left": 10.0,
                         "width": 100.0, "height": 30.0, "x": 10.0, "y": 10.0}
            },
            "timestamp": 1722470400000
        }"#;

        let payload: DomInteractionPayload = serde_json::from_str(json).expect("parse");
        assert_eq!(payload.interaction, "click");
        assert_eq!(payload.element.tag, "button");
        assert!(payload.element.visible);
        assert_eq!(payload.element.rect.width, 100.0);
        assert_eq!(payload.element.attributes.len(), 2);
    }

    #[test]
    fn test_payload_tolerates_sparse_element() {
        let json = r#"{"type": "focus", "element": {"tag": "div"}}"#;

        let payload: DomInteractionPayload = serde_json::from_str(json).expect("parse");
        assert_eq!(payload.interaction, "focus");
        assert_eq!(payload.element.tag, "div");
        assert!(!payload.element.visible);
        assert_eq!(payload.timestamp, 0);
    }

    #[test]
    fn test_payload_requires_type() {
        let json = r#"{"element": {"tag": "div"}}"#;
        assert!(serde_json::from_str::<DomInteractionPayload>(json).is_err());
    }

    #[test]
    fn test_detail_serializes_camel_case() {
        let detail = DomInteractionDetail {
            tag: "input".to_string(),
            is_content_editable: true,
            read_only: true,
            ..Default::default()
        };

        let value = serde_json::to_value(&detail).expect("serialize");
        assert_eq!(value["isContentEditable"], true);
        assert_eq!(value["readOnly"], true);
        assert!(value.get("is_content_editable").is_none());
    }
}

//! Command layer for the UI shell.
//!
//! Commands take loosely-typed JSON arguments (camelCase or snake_case keys,
//! bare strings where a single value is expected) and answer with
//! `Result<Value, String>`, the shape the shell expects from every command.

pub mod print;
pub mod settings;

use serde_json::Value;

use crate::template_config::DocumentKind;
use crate::transaction::text_from_keys;

const KIND_KEYS: &[&str] = &[
    "kind",
    "documentKind",
    "document_kind",
    "documentType",
    "document_type",
    "type",
];

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        _ => None,
    }
}

/// Document kind from a bare string, an object carrying one of the kind keys,
/// or (when `arg0` is absent) the kind keys of `payload`.
pub(crate) fn parse_kind_payload(
    arg0: Option<&Value>,
    payload: Option<&Value>,
) -> Result<DocumentKind, String> {
    let raw = match arg0 {
        Some(Value::Object(_)) => arg0.and_then(|v| text_from_keys(v, KIND_KEYS)),
        Some(other) => value_to_string(other),
        None => None,
    }
    .or_else(|| payload.and_then(|p| text_from_keys(p, KIND_KEYS)))
    .ok_or_else(|| "Missing document kind".to_string())?;

    raw.parse::<DocumentKind>().map_err(|e| e.to_string())
}

/// Commands accept either `(kind, payload)` or a single payload carrying the
/// kind. A lone non-object argument is the kind.
pub(crate) fn split_kind_and_payload(
    arg0: Option<Value>,
    arg1: Option<Value>,
) -> (Option<Value>, Option<Value>) {
    match (arg0, arg1) {
        (arg0, Some(payload)) => (arg0, Some(payload)),
        (Some(payload @ Value::Object(_)), None) => (None, Some(payload)),
        (arg0, None) => (arg0, None),
    }
}

/// The object nested under one of `keys`, or the payload itself when none of
/// them is present. `None` for absent or non-object payloads.
pub(crate) fn nested_payload<'a>(payload: Option<&'a Value>, keys: &[&str]) -> Option<&'a Value> {
    let payload = payload.filter(|p| p.is_object())?;
    keys.iter()
        .find_map(|key| payload.get(*key).filter(|v| v.is_object()))
        .or(Some(payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_from_bare_string_or_object() {
        assert_eq!(
            parse_kind_payload(Some(&json!(" Invoice ")), None),
            Ok(DocumentKind::Invoice)
        );
        assert_eq!(
            parse_kind_payload(Some(&json!({ "documentType": "purchase_receipt" })), None),
            Ok(DocumentKind::Purchase)
        );
        assert_eq!(
            parse_kind_payload(None, Some(&json!({ "kind": "receipt", "items": [] }))),
            Ok(DocumentKind::Sales)
        );
    }

    #[test]
    fn kind_errors_are_readable() {
        assert_eq!(
            parse_kind_payload(None, None),
            Err("Missing document kind".to_string())
        );
        let err = parse_kind_payload(Some(&json!("credit-note")), None).unwrap_err();
        assert!(err.contains("credit_note"), "{err}");
    }

    #[test]
    fn single_argument_is_split_by_shape() {
        assert_eq!(
            split_kind_and_payload(Some(json!("invoice")), None),
            (Some(json!("invoice")), None)
        );
        assert_eq!(
            split_kind_and_payload(Some(json!({ "kind": "sales" })), None),
            (None, Some(json!({ "kind": "sales" })))
        );
        assert_eq!(
            split_kind_and_payload(Some(json!("sales")), Some(json!({}))),
            (Some(json!("sales")), Some(json!({})))
        );
    }

    #[test]
    fn nested_payload_prefers_named_object() {
        let payload = json!({ "kind": "sales", "transaction": { "totalAmount": 5 } });
        assert_eq!(
            nested_payload(Some(&payload), &["transaction"]),
            Some(&json!({ "totalAmount": 5 }))
        );

        let flat = json!({ "totalAmount": 5 });
        assert_eq!(nested_payload(Some(&flat), &["transaction"]), Some(&flat));
        assert_eq!(nested_payload(Some(&json!("x")), &["transaction"]), None);
        assert_eq!(nested_payload(None, &["transaction"]), None);
    }
}

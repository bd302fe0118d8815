use serde_json::{json, Value};
use tracing::info;

use crate::commands::{nested_payload, parse_kind_payload, split_kind_and_payload};
use crate::config::PRINT_CATEGORY;
use crate::db;
use crate::receipt_renderer;
use crate::template_config::{DocumentKind, TemplateConfig};
use crate::ReceiptsState;

// -- Templates ---------------------------------------------------------------

const TEMPLATE_KEYS: &[&str] = &["config", "template", "templateConfig", "template_config"];

fn template_response(kind: DocumentKind, config: &TemplateConfig) -> Result<Value, String> {
    let config = serde_json::to_value(config).map_err(|e| e.to_string())?;
    Ok(json!({ "success": true, "kind": kind, "config": config }))
}

fn parse_template_payload(
    kind: DocumentKind,
    payload: Option<&Value>,
) -> Result<Option<TemplateConfig>, String> {
    match nested_payload(payload, TEMPLATE_KEYS) {
        Some(value) => TemplateConfig::from_value(kind, value)
            .map(Some)
            .map_err(|e| format!("Invalid template: {e}")),
        None => Ok(None),
    }
}

/// Stored template for a kind, or its default.
pub async fn template_get(state: &ReceiptsState, arg0: Option<Value>) -> Result<Value, String> {
    let kind = parse_kind_payload(arg0.as_ref(), None)?;
    template_response(kind, &state.templates.get(kind))
}

/// Replace the stored template. Absent fields take the kind's default, not the
/// previously stored value.
pub async fn template_save(
    state: &ReceiptsState,
    arg0: Option<Value>,
    arg1: Option<Value>,
) -> Result<Value, String> {
    let (kind_arg, payload) = split_kind_and_payload(arg0, arg1);
    let kind = parse_kind_payload(kind_arg.as_ref(), payload.as_ref())?;
    let config = parse_template_payload(kind, payload.as_ref())?
        .ok_or_else(|| "Missing template".to_string())?;

    state.templates.set(kind, &config);
    info!(kind = %kind, enabled = config.enabled, "template_save");
    template_response(kind, &state.templates.get(kind))
}

pub async fn template_reset(state: &ReceiptsState, arg0: Option<Value>) -> Result<Value, String> {
    let kind = parse_kind_payload(arg0.as_ref(), None)?;
    state.templates.reset(kind);
    info!(kind = %kind, "template_reset");
    template_response(kind, &state.templates.get(kind))
}

/// Sample document rendered with unsaved edits when given, otherwise with the
/// stored template.
pub async fn template_preview(
    state: &ReceiptsState,
    arg0: Option<Value>,
    arg1: Option<Value>,
) -> Result<Value, String> {
    let (kind_arg, payload) = split_kind_and_payload(arg0, arg1);
    let kind = parse_kind_payload(kind_arg.as_ref(), payload.as_ref())?;

    // A lone payload only carries a draft when it nests one under a template key.
    let draft = match (&kind_arg, payload.as_ref()) {
        (Some(_), payload) => payload,
        (None, payload) => {
            payload.filter(|p| TEMPLATE_KEYS.iter().any(|key| p.get(*key).is_some()))
        }
    };
    let config = match parse_template_payload(kind, draft)? {
        Some(config) => config,
        None => state.templates.get(kind),
    };
    let html = receipt_renderer::render_preview(kind, &config);
    Ok(json!({ "success": true, "kind": kind, "html": html }))
}

// -- Print settings ----------------------------------------------------------

/// Raw `print` settings rows (`key -> value`) for the settings screen.
pub async fn print_settings_get(state: &ReceiptsState) -> Result<Value, String> {
    let conn = state
        .db
        .conn
        .lock()
        .map_err(|_| "Settings database unavailable".to_string())?;
    let settings = db::get_category_settings(&conn, PRINT_CATEGORY);
    Ok(json!({ "success": true, "settings": settings }))
}

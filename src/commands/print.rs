use serde_json::{json, Value};
use tracing::info;

use crate::commands::{nested_payload, parse_kind_payload, split_kind_and_payload};
use crate::receipt_renderer;
use crate::transaction::TransactionRecord;
use crate::ReceiptsState;

// -- Print -------------------------------------------------------------------

const TRANSACTION_KEYS: &[&str] = &[
    "transaction",
    "transactionData",
    "transaction_data",
    "record",
    "data",
    "order",
];

fn parse_transaction_payload(payload: Option<&Value>) -> Result<TransactionRecord, String> {
    nested_payload(payload, TRANSACTION_KEYS)
        .map(TransactionRecord::from_value)
        .ok_or_else(|| "Missing transaction".to_string())
}

/// Render the transaction with the stored template for its kind and print it.
/// Resolves once the request is back to idle; print failures are logged, not
/// returned.
pub async fn print_document(
    state: &ReceiptsState,
    arg0: Option<Value>,
    arg1: Option<Value>,
) -> Result<Value, String> {
    let (kind_arg, payload) = split_kind_and_payload(arg0, arg1);
    let kind = parse_kind_payload(kind_arg.as_ref(), payload.as_ref())?;
    let record = parse_transaction_payload(payload.as_ref())?;

    info!(kind = %kind, items = record.items.len(), "print_document");
    state.dispatcher.print(kind, &record).await;
    Ok(json!({ "success": true, "kind": kind }))
}

/// Rendered HTML without printing, for on-screen receipts and e-mail.
pub async fn render_document_html(
    state: &ReceiptsState,
    arg0: Option<Value>,
    arg1: Option<Value>,
) -> Result<Value, String> {
    let (kind_arg, payload) = split_kind_and_payload(arg0, arg1);
    let kind = parse_kind_payload(kind_arg.as_ref(), payload.as_ref())?;
    let record = parse_transaction_payload(payload.as_ref())?;

    let config = state.templates.get(kind);
    let html = receipt_renderer::render_document(kind, &record, &config);
    Ok(json!({ "success": true, "kind": kind, "html": html }))
}

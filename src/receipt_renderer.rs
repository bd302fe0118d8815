//! HTML rendering for sales receipts, purchase receipts and invoices.
//!
//! Every function here is a pure function of the transaction record and the
//! template config; the only ambient input is the current time, used when the
//! record carries no issue timestamp.

use chrono::{Local, TimeZone};

use crate::template_config::{DocumentKind, Section, TemplateConfig};
use crate::transaction::{non_empty, Counterparty, LineItem, ResolvedTotals, TransactionRecord};

/// Rate of the informational tax line on purchase receipts.
pub const PURCHASE_DISPLAY_TAX_RATE: f64 = 0.18;

const PURCHASE_TAX_DISCLAIMER: &str =
    "Tax shown for reference only and not included in the total.";

fn esc(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn money(value: f64) -> String {
    // Avoid printing "-0.00" for tiny negative rounding residue.
    let rounded = (value * 100.0).round() / 100.0;
    if rounded == 0.0 || !rounded.is_finite() {
        return "0.00".to_string();
    }
    format!("{rounded:.2}")
}

fn qty(value: f64) -> String {
    money(value)
}

fn line(body: &mut String, label: &str, value: &str) {
    body.push_str(&format!(
        "<div class=\"line\"><span>{}</span><span>{}</span></div>",
        esc(label),
        esc(value)
    ));
}

fn emphasized_line(body: &mut String, label: &str, value: &str) {
    body.push_str(&format!(
        "<div class=\"line total\"><strong>{}</strong><strong>{}</strong></div>",
        esc(label),
        esc(value)
    ));
}

fn optional_line(body: &mut String, label: &str, value: Option<&str>) {
    if let Some(value) = non_empty(value) {
        line(body, label, value);
    }
}

fn text_lines(body: &mut String, class: &str, lines: &[String]) {
    for text in lines {
        if text.trim().is_empty() {
            body.push_str(&format!("<div class=\"{class}\">&nbsp;</div>"));
        } else {
            body.push_str(&format!("<div class=\"{class}\">{}</div>", esc(text)));
        }
    }
}

fn html_shell(title: &str, cfg: &TemplateConfig, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8"/>
<meta name="viewport" content="width=device-width, initial-scale=1.0"/>
<title>{title}</title>
<style>
@page {{ size: {width} auto; margin: 0; }}
body {{ font-family: ui-monospace, SFMono-Regular, Menlo, monospace; font-size: {font}; width: {width}; max-width: {width}; margin: 0 auto; padding: 8px; background: #fff; color: #111; box-sizing: border-box; }}
.center {{ text-align: center; }}
.header-line {{ font-weight: bold; }}
.line {{ display: flex; justify-content: space-between; gap: 8px; }}
.line.total {{ border-top: 1px solid #111; margin-top: 4px; padding-top: 4px; }}
.section {{ margin-top: 8px; border-top: 1px dashed #111; padding-top: 6px; }}
.section h3 {{ margin: 0 0 4px 0; font-size: 1em; text-transform: uppercase; }}
.items {{ width: 100%; border-collapse: collapse; }}
.items th, .items td {{ padding: 2px 0; text-align: right; }}
.items th:first-child, .items td:first-child {{ text-align: left; }}
.note {{ color: #555; font-size: 0.85em; }}
.signatures {{ display: flex; justify-content: space-between; gap: 24px; margin-top: 32px; }}
.signature {{ flex: 1; border-top: 1px solid #111; padding-top: 4px; text-align: center; }}
.footer-line {{ text-align: center; }}
@media print {{ body {{ padding: 0; }} }}
</style>
</head>
<body>{body}</body>
</html>"#,
        title = esc(title),
        width = esc(&cfg.paper_width),
        font = esc(&cfg.font_size),
        body = body
    )
}

fn business_section(body: &mut String, cfg: &TemplateConfig) {
    let business = &cfg.business;
    let fields = [
        ("", business.address.as_str()),
        ("Tel: ", business.phone.as_str()),
        ("", business.email.as_str()),
        ("", business.website.as_str()),
        ("Tax ID: ", business.tax_id.as_str()),
    ];
    let name = non_empty(Some(&business.name));
    if name.is_none() && fields.iter().all(|(_, v)| v.trim().is_empty()) {
        return;
    }
    body.push_str("<div class=\"section center business\">");
    if let Some(name) = name {
        body.push_str(&format!("<div><strong>{}</strong></div>", esc(name)));
    }
    for (prefix, value) in fields {
        if let Some(value) = non_empty(Some(value)) {
            body.push_str(&format!("<div>{}{}</div>", prefix, esc(value)));
        }
    }
    body.push_str("</div>");
}

fn details_section(body: &mut String, kind: DocumentKind, record: &TransactionRecord) {
    let number_label = match kind {
        DocumentKind::Sales => "Receipt No",
        DocumentKind::Purchase => "Purchase No",
        DocumentKind::Invoice => "Invoice No",
    };
    let issued = record.issued_at_or_now();
    body.push_str("<div class=\"section details\">");
    line(
        body,
        number_label,
        &record.document_number_or_placeholder(kind),
    );
    line(body, "Date", &issued.format("%Y-%m-%d").to_string());
    line(body, "Time", &issued.format("%H:%M").to_string());
    if kind == DocumentKind::Invoice {
        optional_line(body, "Due Date", record.due_date.as_deref());
    }
    if let Some(notes) = non_empty(record.notes.as_deref()) {
        body.push_str(&format!("<div class=\"note\">{}</div>", esc(notes)));
    }
    body.push_str("</div>");
}

fn counterparty_section(body: &mut String, kind: DocumentKind, party: &Counterparty) {
    let heading = match kind {
        DocumentKind::Sales => "Customer",
        DocumentKind::Purchase => "Supplier",
        DocumentKind::Invoice => "Bill To",
    };
    body.push_str(&format!(
        "<div class=\"section counterparty\"><h3>{heading}</h3>"
    ));
    optional_line(body, "Name", party.name.as_deref());
    optional_line(body, "Phone", party.phone.as_deref());
    optional_line(body, "Email", party.email.as_deref());
    optional_line(body, "Address", party.address.as_deref());
    optional_line(body, "Tax ID", party.tax_id.as_deref());
    body.push_str("</div>");
}

fn items_section(body: &mut String, items: &[LineItem]) {
    body.push_str(
        "<div class=\"section items-section\"><h3>Items</h3>\
         <table class=\"items\"><thead><tr><th>Item</th><th>Qty</th><th>Price</th>\
         <th>Total</th></tr></thead><tbody>",
    );
    for item in items {
        body.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            esc(&item.name),
            qty(item.quantity),
            money(item.unit_price),
            money(item.line_total())
        ));
    }
    body.push_str("</tbody></table>");
    if items.is_empty() {
        body.push_str("<div class=\"note\">No items</div>");
    }
    body.push_str("</div>");
}

/// Informational tax printed on purchase receipts; never part of the total.
pub fn purchase_display_tax(subtotal: f64) -> f64 {
    subtotal * PURCHASE_DISPLAY_TAX_RATE
}

fn totals_section(body: &mut String, kind: DocumentKind, totals: &ResolvedTotals) {
    body.push_str("<div class=\"section totals\">");
    line(body, "Subtotal", &money(totals.subtotal));
    if totals.discount != 0.0 {
        line(body, "Discount", &format!("-{}", money(totals.discount)));
    }
    if totals.tax != 0.0 {
        line(body, "Tax", &money(totals.tax));
    }
    if kind == DocumentKind::Purchase {
        line(
            body,
            "Tax (18%)",
            &money(purchase_display_tax(totals.subtotal)),
        );
        body.push_str(&format!(
            "<div class=\"note\">{}</div>",
            esc(PURCHASE_TAX_DISCLAIMER)
        ));
    }
    emphasized_line(body, "Total", &money(totals.total));
    body.push_str("</div>");
}

fn payment_section(
    body: &mut String,
    kind: DocumentKind,
    record: &TransactionRecord,
    totals: &ResolvedTotals,
) {
    let received_label = match kind {
        DocumentKind::Sales => "Amount Received",
        DocumentKind::Purchase | DocumentKind::Invoice => "Amount Paid",
    };
    body.push_str("<div class=\"section payment\"><h3>Payment</h3>");
    line(
        body,
        "Method",
        non_empty(record.payment_method.as_deref()).unwrap_or("Cash"),
    );
    line(body, received_label, &money(totals.amount_received));
    line(body, "Change", &money(totals.change));
    body.push_str("</div>");
}

fn terms_section(body: &mut String, cfg: &TemplateConfig) {
    if cfg.terms_text.iter().all(|t| t.trim().is_empty()) {
        return;
    }
    body.push_str("<div class=\"section terms\"><h3>Terms &amp; Conditions</h3>");
    text_lines(body, "note", &cfg.terms_text);
    body.push_str("</div>");
}

fn signature_block(body: &mut String) {
    body.push_str(
        "<div class=\"signatures\"><div class=\"signature\">Authorized Signature</div>\
         <div class=\"signature\">Customer Signature</div></div>",
    );
}

fn render(kind: DocumentKind, record: &TransactionRecord, config: &TemplateConfig) -> String {
    let cfg = config.effective(kind);
    let totals = record.resolve_totals_for(kind);
    let mut body = String::with_capacity(4096);

    body.push_str("<div class=\"header\">");
    text_lines(&mut body, "center header-line", &cfg.header_lines);
    body.push_str("</div>");

    for section in kind.sections() {
        if !cfg.is_visible(*section) {
            continue;
        }
        match section {
            Section::BusinessInfo => business_section(&mut body, &cfg),
            Section::TransactionDetails => details_section(&mut body, kind, record),
            Section::CustomerInfo | Section::SupplierInfo => {
                if let Some(party) = record.counterparty() {
                    counterparty_section(&mut body, kind, party);
                }
            }
            Section::ItemDetails => items_section(&mut body, &record.items),
            Section::Totals => totals_section(&mut body, kind, &totals),
            Section::PaymentInfo => payment_section(&mut body, kind, record, &totals),
            Section::Terms => terms_section(&mut body, &cfg),
        }
    }

    if kind == DocumentKind::Invoice {
        signature_block(&mut body);
    }

    body.push_str("<div class=\"section footer\">");
    text_lines(&mut body, "footer-line", &cfg.footer_lines);
    body.push_str("</div>");

    html_shell(kind.title(), &cfg, &body)
}

pub fn render_sales_receipt(record: &TransactionRecord, config: &TemplateConfig) -> String {
    render(DocumentKind::Sales, record, config)
}

/// Purchase receipts carry the display-only 18% tax line.
pub fn render_purchase_receipt(record: &TransactionRecord, config: &TemplateConfig) -> String {
    render(DocumentKind::Purchase, record, config)
}

/// Invoices add the terms section and an unconditional signature block.
pub fn render_invoice(record: &TransactionRecord, config: &TemplateConfig) -> String {
    render(DocumentKind::Invoice, record, config)
}

pub fn render_document(
    kind: DocumentKind,
    record: &TransactionRecord,
    config: &TemplateConfig,
) -> String {
    render(kind, record, config)
}

/// Fixed sample used by the settings screen to preview a template.
pub fn sample_transaction(kind: DocumentKind) -> TransactionRecord {
    let issued_at = Local.with_ymd_and_hms(2026, 1, 15, 14, 30, 0).single();
    let counterparty = match kind {
        DocumentKind::Purchase => Counterparty {
            name: Some("Northwind Supplies".to_string()),
            phone: Some("+1 555 0142".to_string()),
            address: Some("12 Harbor Road".to_string()),
            ..Counterparty::default()
        },
        DocumentKind::Sales | DocumentKind::Invoice => Counterparty {
            name: Some("Jane Customer".to_string()),
            email: Some("jane@example.com".to_string()),
            ..Counterparty::default()
        },
    };
    TransactionRecord {
        items: vec![
            LineItem::new("Sample Item A", 2.0, 12.5),
            LineItem::new("Sample Item B", 1.0, 4.75),
        ],
        tax_amount: (kind != DocumentKind::Purchase).then_some(2.0),
        discount_amount: Some(1.0),
        amount_received: Some(40.0),
        counterparty: Some(counterparty),
        document_number: Some(format!("{}-PREVIEW", kind.number_prefix())),
        issued_at,
        due_date: (kind == DocumentKind::Invoice).then(|| "2026-02-14".to_string()),
        ..TransactionRecord::default()
    }
}

/// Render `config` against [`sample_transaction`].
pub fn render_preview(kind: DocumentKind, config: &TemplateConfig) -> String {
    render(kind, &sample_transaction(kind), config)
}

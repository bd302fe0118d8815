//! Transaction records handed to the renderer by the sales, purchase and
//! invoicing screens, and the derivation of the amounts printed on them.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::template_config::DocumentKind;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub name: String,
    #[serde(default)]
    pub quantity: f64,
    #[serde(default)]
    pub unit_price: f64,
}

impl LineItem {
    pub fn new(name: impl Into<String>, quantity: f64, unit_price: f64) -> Self {
        Self {
            name: name.into(),
            quantity,
            unit_price,
        }
    }

    /// `quantity * unit_price`, with non-finite or negative inputs read as zero.
    pub fn line_total(&self) -> f64 {
        non_negative(self.quantity) * non_negative(self.unit_price)
    }
}

/// Customer on sales receipts and invoices, supplier on purchase receipts.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Counterparty {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub tax_id: Option<String>,
}

impl Counterparty {
    pub fn is_empty(&self) -> bool {
        [
            &self.name,
            &self.phone,
            &self.email,
            &self.address,
            &self.tax_id,
        ]
        .iter()
        .all(|field| non_empty(field.as_deref()).is_none())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    #[serde(default)]
    pub items: Vec<LineItem>,
    #[serde(default)]
    pub subtotal: Option<f64>,
    #[serde(default)]
    pub tax_amount: Option<f64>,
    #[serde(default)]
    pub discount_amount: Option<f64>,
    #[serde(default)]
    pub total_amount: Option<f64>,
    #[serde(default)]
    pub amount_received: Option<f64>,
    #[serde(default)]
    pub change_amount: Option<f64>,
    #[serde(default, alias = "counterpartyInfo")]
    pub counterparty: Option<Counterparty>,
    #[serde(default)]
    pub document_number: Option<String>,
    #[serde(default)]
    pub issued_at: Option<DateTime<Local>>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Amounts after applying the fallback rules for anything the record omits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedTotals {
    pub subtotal: f64,
    pub tax: f64,
    pub discount: f64,
    pub total: f64,
    pub amount_received: f64,
    pub change: f64,
}

impl TransactionRecord {
    pub fn resolve_totals(&self) -> ResolvedTotals {
        self.resolve_with_tax(true)
    }

    /// Totals as printed on `kind`. Purchase receipts derive a missing total
    /// as subtotal minus discount; their tax lines are informational.
    pub fn resolve_totals_for(&self, kind: DocumentKind) -> ResolvedTotals {
        self.resolve_with_tax(kind != DocumentKind::Purchase)
    }

    fn resolve_with_tax(&self, tax_in_total: bool) -> ResolvedTotals {
        let subtotal = finite(self.subtotal)
            .unwrap_or_else(|| self.items.iter().map(LineItem::line_total).sum());
        let tax = finite(self.tax_amount).unwrap_or(0.0);
        let discount = finite(self.discount_amount).unwrap_or(0.0);
        let derived = if tax_in_total {
            subtotal + tax - discount
        } else {
            subtotal - discount
        };
        let total = finite(self.total_amount).unwrap_or(derived);
        let amount_received = finite(self.amount_received).unwrap_or(total);
        let change = finite(self.change_amount).unwrap_or(amount_received - total);
        ResolvedTotals {
            subtotal,
            tax,
            discount,
            total,
            amount_received,
            change,
        }
    }

    /// Issue time, or now when the caller did not stamp the record.
    pub fn issued_at_or_now(&self) -> DateTime<Local> {
        self.issued_at.unwrap_or_else(Local::now)
    }

    /// Explicit document number, or `{PREFIX}-{YYYYMMDDHHMMSS}` from the issue time.
    pub fn document_number_or_placeholder(&self, kind: DocumentKind) -> String {
        non_empty(self.document_number.as_deref())
            .map(ToString::to_string)
            .unwrap_or_else(|| {
                format!(
                    "{}-{}",
                    kind.number_prefix(),
                    self.issued_at_or_now().format("%Y%m%d%H%M%S")
                )
            })
    }

    /// Counterparty with at least one non-blank field.
    pub fn counterparty(&self) -> Option<&Counterparty> {
        self.counterparty.as_ref().filter(|c| !c.is_empty())
    }

    /// Build a record from the loosely shaped JSON the screens send.
    ///
    /// Accepts camelCase and snake_case keys, numbers encoded as strings and
    /// the alternative spellings used across the sales, purchase and invoice
    /// screens. Unusable fields are dropped, never reported.
    pub fn from_value(value: &Value) -> Self {
        let items = value_from_keys(value, &["items", "lineItems", "line_items", "products"])
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(parse_line_item).collect())
            .unwrap_or_default();

        let counterparty = value_from_keys(
            value,
            &[
                "counterpartyInfo",
                "counterparty_info",
                "counterparty",
                "customer",
                "supplier",
            ],
        )
        .and_then(parse_counterparty);

        Self {
            items,
            subtotal: number_from_keys(value, &["subtotal", "subTotal", "sub_total"]),
            tax_amount: number_from_keys(value, &["taxAmount", "tax_amount", "tax"]),
            discount_amount: number_from_keys(
                value,
                &["discountAmount", "discount_amount", "discount"],
            ),
            total_amount: number_from_keys(value, &["totalAmount", "total_amount", "total"]),
            amount_received: number_from_keys(
                value,
                &["amountReceived", "amount_received", "amountPaid", "amount_paid"],
            ),
            change_amount: number_from_keys(value, &["changeAmount", "change_amount", "change"]),
            counterparty,
            document_number: text_from_keys(
                value,
                &[
                    "documentNumber",
                    "document_number",
                    "invoiceNumber",
                    "invoice_number",
                    "receiptNumber",
                    "receipt_number",
                    "orderNumber",
                    "order_number",
                ],
            ),
            issued_at: text_from_keys(
                value,
                &["issuedAt", "issued_at", "createdAt", "created_at", "date"],
            )
            .and_then(|raw| parse_timestamp(&raw)),
            payment_method: text_from_keys(
                value,
                &["paymentMethod", "payment_method", "paymentType", "payment_type"],
            ),
            due_date: text_from_keys(value, &["dueDate", "due_date"]),
            notes: text_from_keys(value, &["notes", "note", "remarks"]),
        }
    }
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_number(value: &Value) -> Option<f64> {
    if let Some(number) = value.as_f64() {
        return Some(number);
    }
    if let Some(text) = value.as_str() {
        return text.trim().parse::<f64>().ok();
    }
    None
}

pub(crate) fn value_from_keys<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| value.get(*key))
        .find(|found| !found.is_null())
}

pub(crate) fn text_from_keys(value: &Value, keys: &[&str]) -> Option<String> {
    let found = value_from_keys(value, keys)?;
    let text = match found {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    Some(text).filter(|text| !text.is_empty())
}

pub(crate) fn number_from_keys(value: &Value, keys: &[&str]) -> Option<f64> {
    value_from_keys(value, keys)
        .and_then(parse_number)
        .filter(|n| n.is_finite())
}

fn parse_line_item(item: &Value) -> Option<LineItem> {
    let name = text_from_keys(
        item,
        &["name", "productName", "product_name", "description", "title"],
    )
    .or_else(|| {
        item.get("product")
            .and_then(|product| text_from_keys(product, &["name", "title"]))
    })?;
    Some(LineItem {
        name,
        quantity: number_from_keys(item, &["quantity", "qty", "count"]).unwrap_or(0.0),
        unit_price: number_from_keys(
            item,
            &[
                "unitPrice",
                "unit_price",
                "price",
                "unitCost",
                "unit_cost",
                "rate",
            ],
        )
        .unwrap_or(0.0),
    })
}

fn parse_counterparty(value: &Value) -> Option<Counterparty> {
    if let Some(name) = value.as_str().map(str::trim).filter(|s| !s.is_empty()) {
        return Some(Counterparty {
            name: Some(name.to_string()),
            ..Counterparty::default()
        });
    }
    if !value.is_object() {
        return None;
    }
    let party = Counterparty {
        name: text_from_keys(value, &["name", "fullName", "full_name", "companyName"]),
        phone: text_from_keys(value, &["phone", "phoneNumber", "phone_number", "mobile"]),
        email: text_from_keys(value, &["email"]),
        address: text_from_keys(value, &["address", "streetAddress", "street_address"]),
        tax_id: text_from_keys(value, &["taxId", "tax_id", "vatNumber", "vat_number", "gstin"]),
    };
    Some(party).filter(|p| !p.is_empty())
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Local>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Local));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Local.from_local_datetime(&naive).single();
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .and_then(|naive| Local.from_local_datetime(&naive).single())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widget_record() -> TransactionRecord {
        TransactionRecord {
            items: vec![LineItem::new("Widget", 2.0, 10.0)],
            ..TransactionRecord::default()
        }
    }

    #[test]
    fn subtotal_and_total_are_derived_from_items() {
        let totals = widget_record().resolve_totals();
        assert_eq!(totals.subtotal, 20.0);
        assert_eq!(totals.total, 20.0);
        assert_eq!(totals.amount_received, 20.0);
        assert_eq!(totals.change, 0.0);
    }

    #[test]
    fn total_applies_tax_and_discount() {
        let record = TransactionRecord {
            tax_amount: Some(3.6),
            discount_amount: Some(2.0),
            ..widget_record()
        };
        let totals = record.resolve_totals();
        assert!((totals.total - 21.6).abs() < 1e-9);
    }

    #[test]
    fn purchase_total_leaves_out_recorded_tax() {
        let record = TransactionRecord {
            subtotal: Some(100.0),
            tax_amount: Some(18.0),
            discount_amount: Some(4.0),
            ..TransactionRecord::default()
        };
        let purchase = record.resolve_totals_for(DocumentKind::Purchase);
        assert_eq!(purchase.tax, 18.0);
        assert_eq!(purchase.total, 96.0);
        assert_eq!(record.resolve_totals_for(DocumentKind::Sales).total, 114.0);
        assert_eq!(record.resolve_totals_for(DocumentKind::Invoice).total, 114.0);
    }

    #[test]
    fn explicit_total_is_not_recomputed() {
        let record = TransactionRecord {
            total_amount: Some(99.99),
            tax_amount: Some(5.0),
            ..widget_record()
        };
        assert_eq!(record.resolve_totals().total, 99.99);
    }

    #[test]
    fn change_defaults_to_received_minus_total() {
        let record = TransactionRecord {
            amount_received: Some(50.0),
            ..widget_record()
        };
        let totals = record.resolve_totals();
        assert_eq!(totals.change, 30.0);
    }

    #[test]
    fn non_finite_amounts_fall_back() {
        let record = TransactionRecord {
            items: vec![LineItem::new("Bad", f64::NAN, 3.0), LineItem::new("Ok", 1.0, 4.0)],
            subtotal: Some(f64::INFINITY),
            ..TransactionRecord::default()
        };
        let totals = record.resolve_totals();
        assert_eq!(totals.subtotal, 4.0);
        assert_eq!(totals.total, 4.0);
    }

    #[test]
    fn empty_record_resolves_to_zero() {
        let totals = TransactionRecord::default().resolve_totals();
        assert_eq!(totals.subtotal, 0.0);
        assert_eq!(totals.total, 0.0);
    }

    #[test]
    fn document_number_placeholder_uses_issue_time() {
        let issued = Local.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap();
        let record = TransactionRecord {
            issued_at: Some(issued),
            ..TransactionRecord::default()
        };
        assert_eq!(
            record.document_number_or_placeholder(DocumentKind::Invoice),
            "INV-20260314092653"
        );

        let numbered = TransactionRecord {
            document_number: Some("  S-42 ".to_string()),
            ..record
        };
        assert_eq!(
            numbered.document_number_or_placeholder(DocumentKind::Sales),
            "S-42"
        );
    }

    #[test]
    fn blank_counterparty_is_treated_as_absent() {
        let record = TransactionRecord {
            counterparty: Some(Counterparty {
                name: Some("   ".to_string()),
                ..Counterparty::default()
            }),
            ..TransactionRecord::default()
        };
        assert!(record.counterparty().is_none());
    }

    #[test]
    fn from_value_accepts_loose_shapes() {
        let payload = serde_json::json!({
            "items": [
                { "name": "Widget", "qty": "2", "price": "10.00" },
                { "product": { "name": "Bolt" }, "quantity": 3, "unit_price": 0.5 },
                { "quantity": 1, "price": 5 }
            ],
            "tax_amount": "3.60",
            "discountAmount": 2,
            "customer": { "full_name": "Ada Lovelace", "phone": "555-0100" },
            "invoiceNumber": 1042,
            "createdAt": "2026-03-14T09:26:53Z",
            "payment_method": "Card"
        });

        let record = TransactionRecord::from_value(&payload);
        assert_eq!(record.items.len(), 2);
        assert_eq!(record.items[0], LineItem::new("Widget", 2.0, 10.0));
        assert_eq!(record.items[1], LineItem::new("Bolt", 3.0, 0.5));
        assert_eq!(record.tax_amount, Some(3.6));
        assert_eq!(record.discount_amount, Some(2.0));
        assert_eq!(record.document_number.as_deref(), Some("1042"));
        assert_eq!(record.payment_method.as_deref(), Some("Card"));
        assert!(record.issued_at.is_some());
        let party = record.counterparty().expect("customer parsed");
        assert_eq!(party.name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(party.phone.as_deref(), Some("555-0100"));
    }

    #[test]
    fn from_value_ignores_garbage() {
        let payload = serde_json::json!({
            "items": "not an array",
            "total": "abc",
            "supplier": 17,
            "date": "yesterday"
        });
        let record = TransactionRecord::from_value(&payload);
        assert!(record.items.is_empty());
        assert!(record.total_amount.is_none());
        assert!(record.counterparty.is_none());
        assert!(record.issued_at.is_none());
    }

    #[test]
    fn from_value_accepts_plain_supplier_name() {
        let payload = serde_json::json!({ "supplier": "Acme Wholesale" });
        let record = TransactionRecord::from_value(&payload);
        assert_eq!(
            record.counterparty().and_then(|c| c.name.as_deref()),
            Some("Acme Wholesale")
        );
    }

    #[test]
    fn serde_uses_camel_case() {
        let record: TransactionRecord = serde_json::from_value(serde_json::json!({
            "items": [{ "name": "Widget", "quantity": 1, "unitPrice": 2.5 }],
            "totalAmount": 2.5,
            "counterpartyInfo": { "name": "Bob", "taxId": "TX-1" }
        }))
        .unwrap();
        assert_eq!(record.items[0].unit_price, 2.5);
        assert_eq!(record.total_amount, Some(2.5));
        assert_eq!(
            record.counterparty.and_then(|c| c.tax_id).as_deref(),
            Some("TX-1")
        );
    }
}

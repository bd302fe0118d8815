//! Per-document-kind template preferences and their storage.
//!
//! One [`TemplateConfig`] exists per [`DocumentKind`], keyed by a fixed string
//! in the `templates` settings category. Reads never fail: a missing or corrupt
//! entry yields the built-in default. Writes replace the whole record and are
//! dropped (with a warning) if storage is unavailable.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::db::{self, DbState};
use crate::error::{PrintError, Result};

/// Settings category holding the three template records.
pub const TEMPLATE_CATEGORY: &str = "templates";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Sales,
    Purchase,
    Invoice,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 3] = [Self::Sales, Self::Purchase, Self::Invoice];

    /// Fixed key of this kind's record in the settings store.
    pub fn storage_key(self) -> &'static str {
        match self {
            Self::Sales => "sales_receipt_template",
            Self::Purchase => "purchase_receipt_template",
            Self::Invoice => "invoice_template",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sales => "sales",
            Self::Purchase => "purchase",
            Self::Invoice => "invoice",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Sales => "Sales Receipt",
            Self::Purchase => "Purchase Receipt",
            Self::Invoice => "Invoice",
        }
    }

    pub(crate) fn number_prefix(self) -> &'static str {
        match self {
            Self::Sales => "RCP",
            Self::Purchase => "PUR",
            Self::Invoice => "INV",
        }
    }

    /// Sections this kind renders, in canonical order.
    pub fn sections(self) -> &'static [Section] {
        match self {
            Self::Sales => &[
                Section::BusinessInfo,
                Section::TransactionDetails,
                Section::CustomerInfo,
                Section::ItemDetails,
                Section::Totals,
                Section::PaymentInfo,
            ],
            Self::Purchase => &[
                Section::BusinessInfo,
                Section::TransactionDetails,
                Section::SupplierInfo,
                Section::ItemDetails,
                Section::Totals,
                Section::PaymentInfo,
            ],
            Self::Invoice => &[
                Section::BusinessInfo,
                Section::TransactionDetails,
                Section::CustomerInfo,
                Section::ItemDetails,
                Section::Totals,
                Section::PaymentInfo,
                Section::Terms,
            ],
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentKind {
    type Err = PrintError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "sales" | "sale" | "receipt" | "sales_receipt" => Ok(Self::Sales),
            "purchase" | "purchase_receipt" | "purchase_order" => Ok(Self::Purchase),
            "invoice" => Ok(Self::Invoice),
            other => Err(PrintError::UnknownKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    BusinessInfo,
    TransactionDetails,
    CustomerInfo,
    SupplierInfo,
    ItemDetails,
    Totals,
    PaymentInfo,
    Terms,
}

impl Section {
    /// Name used as the key in `sectionVisibility`.
    pub fn key(self) -> &'static str {
        match self {
            Self::BusinessInfo => "business-info",
            Self::TransactionDetails => "transaction-details",
            Self::CustomerInfo => "customer-info",
            Self::SupplierInfo => "supplier-info",
            Self::ItemDetails => "item-details",
            Self::Totals => "totals",
            Self::PaymentInfo => "payment-info",
            Self::Terms => "terms",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct BusinessProfile {
    pub name: String,
    pub address: String,
    pub phone: String,
    pub email: String,
    pub tax_id: String,
    pub website: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TemplateConfig {
    pub enabled: bool,
    pub header_lines: Vec<String>,
    pub footer_lines: Vec<String>,
    pub section_visibility: BTreeMap<String, bool>,
    pub font_size: String,
    pub paper_width: String,
    pub business: BusinessProfile,
    pub terms_text: Vec<String>,
}

impl TemplateConfig {
    /// Built-in default for `kind`: customization off, every section visible.
    pub fn default_for(kind: DocumentKind) -> Self {
        let (header, footer, paper_width) = match kind {
            DocumentKind::Sales => ("SALES RECEIPT", "Thank you for your purchase!", "80mm"),
            DocumentKind::Purchase => (
                "PURCHASE RECEIPT",
                "Goods received in good condition.",
                "80mm",
            ),
            DocumentKind::Invoice => ("INVOICE", "Thank you for your business.", "210mm"),
        };
        let terms_text = if kind == DocumentKind::Invoice {
            vec!["Payment is due within 30 days of the invoice date.".to_string()]
        } else {
            Vec::new()
        };
        Self {
            enabled: false,
            header_lines: vec![header.to_string()],
            footer_lines: vec![footer.to_string()],
            section_visibility: all_visible(kind),
            font_size: "12px".to_string(),
            paper_width: paper_width.to_string(),
            business: BusinessProfile::default(),
            terms_text,
        }
    }

    /// Missing keys count as visible.
    pub fn is_visible(&self, section: Section) -> bool {
        self.section_visibility
            .get(section.key())
            .copied()
            .unwrap_or(true)
    }

    /// Configuration the renderer actually applies.
    ///
    /// With customization disabled, copy and section layout come from the
    /// kind's default; presentation (`font_size`, `paper_width`) and the
    /// business profile still come from `self`.
    pub fn effective(&self, kind: DocumentKind) -> TemplateConfig {
        if self.enabled {
            return self.clone();
        }
        let defaults = Self::default_for(kind);
        TemplateConfig {
            enabled: true,
            header_lines: defaults.header_lines,
            footer_lines: defaults.footer_lines,
            section_visibility: defaults.section_visibility,
            font_size: self.font_size.clone(),
            paper_width: self.paper_width.clone(),
            business: self.business.clone(),
            terms_text: defaults.terms_text,
        }
    }

    /// Parse a stored record, filling absent fields from `kind`'s default.
    pub fn from_json(kind: DocumentKind, raw: &str) -> Result<Self> {
        Ok(Self::from_stored(kind, serde_json::from_str(raw)?))
    }

    /// Same as [`TemplateConfig::from_json`] for an already-parsed payload.
    pub fn from_value(kind: DocumentKind, value: &serde_json::Value) -> Result<Self> {
        Ok(Self::from_stored(
            kind,
            StoredTemplate::deserialize(value)?,
        ))
    }

    fn from_stored(kind: DocumentKind, stored: StoredTemplate) -> Self {
        let defaults = Self::default_for(kind);
        Self {
            enabled: stored.enabled.unwrap_or(defaults.enabled),
            header_lines: stored.header_lines.unwrap_or(defaults.header_lines),
            footer_lines: stored.footer_lines.unwrap_or(defaults.footer_lines),
            section_visibility: stored
                .section_visibility
                .unwrap_or(defaults.section_visibility),
            font_size: stored.font_size.unwrap_or(defaults.font_size),
            paper_width: stored.paper_width.unwrap_or(defaults.paper_width),
            business: stored.business.unwrap_or(defaults.business),
            terms_text: stored.terms_text.unwrap_or(defaults.terms_text),
        }
    }
}

fn all_visible(kind: DocumentKind) -> BTreeMap<String, bool> {
    kind.sections()
        .iter()
        .map(|section| (section.key().to_string(), true))
        .collect()
}

/// Stored shape; every field optional so older records keep loading.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredTemplate {
    enabled: Option<bool>,
    header_lines: Option<Vec<String>>,
    footer_lines: Option<Vec<String>>,
    section_visibility: Option<BTreeMap<String, bool>>,
    font_size: Option<String>,
    paper_width: Option<String>,
    business: Option<BusinessProfile>,
    terms_text: Option<Vec<String>>,
}

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

/// Storage for template preferences, injected into the print dispatcher.
pub trait TemplateConfigProvider: Send + Sync {
    /// Stored config for `kind`, or its default. Never fails.
    fn get(&self, kind: DocumentKind) -> TemplateConfig;

    /// Replace the stored config for `kind`. Failures are logged and ignored.
    fn set(&self, kind: DocumentKind, config: &TemplateConfig);

    /// Overwrite `kind` with its built-in default.
    fn reset(&self, kind: DocumentKind) {
        self.set(kind, &TemplateConfig::default_for(kind));
    }

    /// Read-modify-write helper for settings screens.
    fn update(&self, kind: DocumentKind, apply: &mut dyn FnMut(&mut TemplateConfig)) {
        let mut config = self.get(kind);
        apply(&mut config);
        self.set(kind, &config);
    }
}

fn decode_or_default(kind: DocumentKind, raw: Option<String>) -> TemplateConfig {
    match raw {
        None => TemplateConfig::default_for(kind),
        Some(raw) => match TemplateConfig::from_json(kind, &raw) {
            Ok(config) => config,
            Err(e) => {
                warn!(kind = %kind, error = %e, "Stored template is unreadable, using default");
                TemplateConfig::default_for(kind)
            }
        },
    }
}

/// Template store over the SQLite `local_settings` table.
pub struct SettingsTemplateStore {
    db: Arc<DbState>,
}

impl SettingsTemplateStore {
    pub fn new(db: Arc<DbState>) -> Self {
        Self { db }
    }

    fn read_raw(&self, kind: DocumentKind) -> Result<Option<String>> {
        let conn = self.db.conn.lock().map_err(|_| PrintError::LockPoisoned)?;
        Ok(db::get_setting(&conn, TEMPLATE_CATEGORY, kind.storage_key()))
    }

    fn write(&self, kind: DocumentKind, config: &TemplateConfig) -> Result<()> {
        let raw = serde_json::to_string(config)?;
        let conn = self.db.conn.lock().map_err(|_| PrintError::LockPoisoned)?;
        db::set_setting(&conn, TEMPLATE_CATEGORY, kind.storage_key(), &raw)
    }
}

impl TemplateConfigProvider for SettingsTemplateStore {
    fn get(&self, kind: DocumentKind) -> TemplateConfig {
        match self.read_raw(kind) {
            Ok(raw) => decode_or_default(kind, raw),
            Err(e) => {
                warn!(kind = %kind, error = %e, "Template store unavailable, using default");
                TemplateConfig::default_for(kind)
            }
        }
    }

    fn set(&self, kind: DocumentKind, config: &TemplateConfig) {
        match self.write(kind, config) {
            Ok(()) => info!(kind = %kind, enabled = config.enabled, "Template saved"),
            Err(e) => warn!(kind = %kind, error = %e, "Template save failed, keeping previous"),
        }
    }
}

/// In-process template store holding the serialized records.
#[derive(Default)]
pub struct MemoryTemplateStore {
    entries: Mutex<HashMap<DocumentKind, String>>,
}

impl MemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a raw record in the store, bypassing serialization.
    pub fn insert_raw(&self, kind: DocumentKind, raw: impl Into<String>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(kind, raw.into());
        }
    }
}

impl TemplateConfigProvider for MemoryTemplateStore {
    fn get(&self, kind: DocumentKind) -> TemplateConfig {
        let raw = match self.entries.lock() {
            Ok(entries) => entries.get(&kind).cloned(),
            Err(_) => {
                warn!(kind = %kind, "Template store lock poisoned, using default");
                None
            }
        };
        decode_or_default(kind, raw)
    }

    fn set(&self, kind: DocumentKind, config: &TemplateConfig) {
        let raw = match serde_json::to_string(config) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(kind = %kind, error = %e, "Template serialization failed");
                return;
            }
        };
        match self.entries.lock() {
            Ok(mut entries) => {
                entries.insert(kind, raw);
            }
            Err(_) => warn!(kind = %kind, "Template store lock poisoned, save dropped"),
        }
    }
}

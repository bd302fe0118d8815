//! Receipt and invoice printing for the POS.
//!
//! Three parts work together:
//! - [`template_config`]: per-document-kind formatting preferences, persisted
//!   in the local settings database.
//! - [`receipt_renderer`]: turns a transaction plus a template into a
//!   self-contained HTML document.
//! - [`print`]: delivers rendered documents to the platform print facility,
//!   through a preview modal first on mobile.
//!
//! [`ReceiptsState`] wires them together from the settings database; the
//! [`commands`] layer exposes them to a UI shell with loosely-typed payloads.

pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod print;
pub mod print_surface;
pub mod printers;
pub mod receipt_renderer;
pub mod template_config;
pub mod transaction;

use std::path::Path;
use std::sync::Arc;

use tracing::info;

pub use config::DispatchConfig;
pub use error::{PrintError, Result};
pub use print::{Platform, PrintDispatcher, PrintEvent, PrintState};
pub use print_surface::{PreviewPresenter, PreviewResponder};
pub use template_config::{
    DocumentKind, SettingsTemplateStore, TemplateConfig, TemplateConfigProvider,
};
pub use transaction::{Counterparty, LineItem, TransactionRecord};

use print_surface::{HiddenFramePrintSurface, PreviewModalPrintSurface};

/// Everything the command layer needs, built once at startup.
pub struct ReceiptsState {
    pub db: Arc<db::DbState>,
    pub templates: Arc<dyn TemplateConfigProvider>,
    pub dispatcher: Arc<PrintDispatcher>,
    pub config: DispatchConfig,
}

impl ReceiptsState {
    /// Open (or create) the settings database under `app_data_dir` and build
    /// the print pipeline from its `print` settings.
    pub fn open(
        app_data_dir: &Path,
        user_agent: Option<&str>,
        presenter: Option<Arc<dyn PreviewPresenter>>,
    ) -> Result<Self> {
        let db = Arc::new(db::init(app_data_dir)?);
        Self::from_db(db, app_data_dir, user_agent, presenter)
    }

    pub fn from_db(
        db: Arc<db::DbState>,
        app_data_dir: &Path,
        user_agent: Option<&str>,
        presenter: Option<Arc<dyn PreviewPresenter>>,
    ) -> Result<Self> {
        let config = {
            let conn = db.conn.lock().map_err(|_| PrintError::LockPoisoned)?;
            DispatchConfig::load(&conn, app_data_dir)
        };

        let templates: Arc<dyn TemplateConfigProvider> =
            Arc::new(SettingsTemplateStore::new(Arc::clone(&db)));
        let frame = Arc::new(HiddenFramePrintSurface::new(
            config.spool_dir.clone(),
            config.build_backend(),
        ));

        let mut dispatcher = PrintDispatcher::new(Arc::clone(&templates), frame)
            .with_timings((&config).into())
            .with_platform(config.platform_predicate(user_agent));
        match presenter {
            Some(presenter) if config.mobile_preview => {
                dispatcher =
                    dispatcher.with_preview(Arc::new(PreviewModalPrintSurface::new(presenter)));
            }
            _ => {}
        }

        info!(
            db = %db.db_path.display(),
            spool_dir = %config.spool_dir.display(),
            "Receipt printing ready"
        );
        Ok(Self {
            db,
            templates,
            dispatcher: Arc::new(dispatcher),
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_builds_pipeline_from_settings() {
        let dir = tempfile::tempdir().unwrap();
        let state = ReceiptsState::open(dir.path(), None, None).unwrap();

        assert!(dir.path().join("pos-settings.db").exists());
        assert_eq!(state.config.spool_dir, dir.path().join("print-spool"));
        assert_eq!(
            state.templates.get(DocumentKind::Invoice),
            TemplateConfig::default_for(DocumentKind::Invoice)
        );
    }

    #[test]
    fn templates_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let state = ReceiptsState::open(dir.path(), None, None).unwrap();
            state.templates.update(DocumentKind::Sales, &mut |cfg| {
                cfg.enabled = true;
                cfg.footer_lines = vec!["See you soon".into()];
            });
        }
        let state = ReceiptsState::open(dir.path(), None, None).unwrap();
        let cfg = state.templates.get(DocumentKind::Sales);
        assert!(cfg.enabled);
        assert_eq!(cfg.footer_lines, vec!["See you soon".to_string()]);
    }
}

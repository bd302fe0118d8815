//! Print dispatcher.
//!
//! Takes a transaction from a screen, renders it with the stored template for
//! its kind and delivers it to the platform print facility: straight through a
//! hidden staging surface on desktop, or through a preview modal first on
//! mobile. Every request ends in [`PrintState::Idle`]; failures are logged and
//! never reach the caller, which also means callers cannot tell a completed
//! print from a silently failed one.
//!
//! Requests are serialized: only one document occupies the staging surface at
//! a time. The mobile preview wait happens before the slot is taken, so an
//! open preview never blocks other prints.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::DispatchConfig;
use crate::error::{PrintError, Result};
use crate::print_surface::{PrintSurface, RenderedDocument, Staged, SurfaceSignal};
use crate::receipt_renderer;
use crate::template_config::{DocumentKind, TemplateConfigProvider};
use crate::transaction::TransactionRecord;

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PrintState {
    Idle,
    Preparing,
    Rendering,
    Staged,
    PreviewShown,
    PrintInvoked,
    Cleanup,
}

impl PrintState {
    /// Whether the loading indicator should be visible in this state.
    pub fn is_busy(self) -> bool {
        !matches!(self, Self::Idle | Self::PreviewShown)
    }
}

impl fmt::Display for PrintState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Preparing => "preparing",
            Self::Rendering => "rendering",
            Self::Staged => "staged",
            Self::PreviewShown => "preview_shown",
            Self::PrintInvoked => "print_invoked",
            Self::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PrintEvent {
    pub request_id: Uuid,
    pub kind: DocumentKind,
    pub state: PrintState,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Desktop,
    Mobile,
}

impl Platform {
    /// Classify a browser user agent string.
    pub fn from_user_agent(user_agent: &str) -> Self {
        let ua = user_agent.to_ascii_lowercase();
        const MOBILE_MARKERS: &[&str] = &[
            "android",
            "iphone",
            "ipad",
            "ipod",
            "mobile",
            "blackberry",
            "iemobile",
            "opera mini",
        ];
        if MOBILE_MARKERS.iter().any(|marker| ua.contains(marker)) {
            Self::Mobile
        } else {
            Self::Desktop
        }
    }

    /// Parse a configured override (`desktop` / `mobile`).
    pub fn from_setting(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "desktop" => Some(Self::Desktop),
            "mobile" => Some(Self::Mobile),
            _ => None,
        }
    }
}

/// Decides, per request, which flow a print takes.
pub type PlatformPredicate = Arc<dyn Fn() -> Platform + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchTimings {
    /// Longest wait for the staged surface's load signal before printing anyway.
    pub load_timeout: Duration,
    /// Ceiling on staging plus invoking print for one request.
    pub hard_timeout: Duration,
    /// Longest wait for a completion signal before the surface is removed.
    pub cleanup_fallback: Duration,
}

impl Default for DispatchTimings {
    fn default() -> Self {
        Self {
            load_timeout: Duration::from_millis(1_000),
            hard_timeout: Duration::from_millis(5_000),
            cleanup_fallback: Duration::from_millis(5_000),
        }
    }
}

impl From<&DispatchConfig> for DispatchTimings {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            load_timeout: config.load_timeout,
            hard_timeout: config.hard_timeout,
            cleanup_fallback: config.cleanup_fallback,
        }
    }
}

pub struct PrintDispatcher {
    templates: Arc<dyn TemplateConfigProvider>,
    frame: Arc<dyn PrintSurface>,
    preview: Option<Arc<dyn PrintSurface>>,
    platform: PlatformPredicate,
    timings: DispatchTimings,
    events: broadcast::Sender<PrintEvent>,
    slot: Arc<Mutex<()>>,
}

impl PrintDispatcher {
    /// Desktop-only dispatcher; add a preview surface with [`Self::with_preview`].
    pub fn new(templates: Arc<dyn TemplateConfigProvider>, frame: Arc<dyn PrintSurface>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            templates,
            frame,
            preview: None,
            platform: Arc::new(|| Platform::Desktop),
            timings: DispatchTimings::default(),
            events,
            slot: Arc::new(Mutex::new(())),
        }
    }

    pub fn with_preview(mut self, preview: Arc<dyn PrintSurface>) -> Self {
        self.preview = Some(preview);
        self
    }

    pub fn with_platform(mut self, platform: PlatformPredicate) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_timings(mut self, timings: DispatchTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn templates(&self) -> &Arc<dyn TemplateConfigProvider> {
        &self.templates
    }

    /// State transitions of every request handled from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PrintEvent> {
        self.events.subscribe()
    }

    pub async fn print_receipt(&self, record: &TransactionRecord) {
        self.print(DocumentKind::Sales, record).await;
    }

    pub async fn print_purchase_receipt(&self, record: &TransactionRecord) {
        self.print(DocumentKind::Purchase, record).await;
    }

    pub async fn print_invoice(&self, record: &TransactionRecord) {
        self.print(DocumentKind::Invoice, record).await;
    }

    /// Render `record` with the stored template for `kind` and print it.
    pub async fn print(&self, kind: DocumentKind, record: &TransactionRecord) {
        let request_id = Uuid::new_v4();
        self.emit(request_id, kind, PrintState::Preparing);

        let config = self.templates.get(kind);
        self.emit(request_id, kind, PrintState::Rendering);
        let document = RenderedDocument {
            request_id,
            kind,
            html: receipt_renderer::render_document(kind, record, &config),
        };

        let platform = (self.platform)();
        let result = match (platform, self.preview.as_ref()) {
            (Platform::Mobile, Some(preview)) => self.run_preview(preview, &document).await,
            (Platform::Mobile, None) => {
                warn!(%request_id, "No preview surface configured, printing directly");
                self.run_frame(&document).await
            }
            (Platform::Desktop, _) => self.run_frame(&document).await,
        };

        match result {
            Ok(()) => info!(%request_id, kind = %kind, ?platform, "Print dispatched"),
            Err(PrintError::Cancelled) => info!(%request_id, kind = %kind, "Print cancelled from preview"),
            Err(e) => error!(%request_id, kind = %kind, error = %e, "Print failed"),
        }
        self.emit(request_id, kind, PrintState::Idle);
    }

    async fn run_preview(
        &self,
        preview: &Arc<dyn PrintSurface>,
        document: &RenderedDocument,
    ) -> Result<()> {
        let Staged { ticket, ready, .. } = preview.stage(document)?;
        self.emit(document.request_id, document.kind, PrintState::PreviewShown);

        // No timeout: the user may leave the preview open indefinitely.
        let decision = match ready {
            Some(rx) => rx.await.unwrap_or(SurfaceSignal::Cancelled),
            None => SurfaceSignal::Confirmed,
        };

        match decision {
            SurfaceSignal::Cancelled => {
                preview.cleanup(&ticket);
                Err(PrintError::Cancelled)
            }
            SurfaceSignal::Confirmed | SurfaceSignal::Loaded => {
                preview.invoke(&ticket)?;
                self.run_frame(document).await
            }
        }
    }

    async fn run_frame(&self, document: &RenderedDocument) -> Result<()> {
        let slot = Arc::clone(&self.slot).lock_owned().await;
        let request_id = document.request_id;
        let deadline = Instant::now() + self.timings.hard_timeout;

        let Staged {
            ticket,
            ready,
            finished,
        } = self.frame.stage(document)?;
        self.emit(request_id, document.kind, PrintState::Staged);

        let loaded = timeout_at(deadline, async {
            if let Some(rx) = ready {
                match timeout(self.timings.load_timeout, rx).await {
                    Ok(Ok(_)) => debug!(%request_id, "Surface loaded"),
                    Ok(Err(_)) | Err(_) => {
                        warn!(%request_id, "Surface load signal missing, printing anyway")
                    }
                }
            }
        })
        .await;

        let mut abandoned = None;
        let invoked = match loaded {
            Err(_) => Err(PrintError::Timeout("waiting for the staged document")),
            Ok(()) => {
                self.emit(request_id, document.kind, PrintState::PrintInvoked);
                let frame = Arc::clone(&self.frame);
                let invoke_ticket = ticket.clone();
                let mut handle =
                    tokio::task::spawn_blocking(move || frame.invoke(&invoke_ticket));
                match timeout_at(deadline, &mut handle).await {
                    Ok(joined) => joined
                        .map_err(|e| PrintError::Surface(format!("print task failed: {e}")))
                        .and_then(|result| result),
                    Err(_) => {
                        abandoned = Some(handle);
                        Err(PrintError::Timeout("staging and invoking print"))
                    }
                }
            }
        };

        if invoked.is_ok() {
            if let Some(rx) = finished {
                if timeout(self.timings.cleanup_fallback, rx).await.is_err() {
                    debug!(%request_id, "No completion signal, cleaning up on fallback timer");
                }
            }
        }

        self.emit(request_id, document.kind, PrintState::Cleanup);
        self.frame.cleanup(&ticket);

        // The platform call cannot be interrupted; the slot stays taken until it
        // returns so the next document never overlaps it.
        if let Some(handle) = abandoned {
            tokio::spawn(async move {
                if handle.await.is_err() {
                    warn!(%request_id, "Abandoned print task panicked");
                }
                drop(slot);
            });
        }
        invoked
    }

    fn emit(&self, request_id: Uuid, kind: DocumentKind, state: PrintState) {
        debug!(%request_id, kind = %kind, state = %state, "Print state");
        // No subscribers is fine.
        let _ = self.events.send(PrintEvent {
            request_id,
            kind,
            state,
        });
    }
}

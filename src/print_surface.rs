//! Surfaces a rendered document passes through on its way to the printer.
//!
//! * [`HiddenFramePrintSurface`] stages the HTML off-screen (a spool file that
//!   is never shown to the user), triggers the platform print facility and
//!   removes the file on cleanup.
//! * [`PreviewModalPrintSurface`] shows the HTML in a modal owned by the UI and
//!   resolves once the user confirms or cancels. Confirmed documents are then
//!   printed through the hidden frame.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{PrintError, Result};
use crate::printers::{PrintBackend, PrintCompletion};
use crate::template_config::DocumentKind;

const AUTO_PRINT_SCRIPT: &str = "<script>window.addEventListener('load',function(){\
window.focus();window.print();});window.addEventListener('afterprint',function(){\
window.close();});</script>";

/// Output of the renderer for one print request.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub request_id: Uuid,
    pub kind: DocumentKind,
    pub html: String,
}

/// Signal a surface raises once the staged document is ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceSignal {
    /// Off-screen surface finished loading.
    Loaded,
    /// User accepted the preview.
    Confirmed,
    /// User dismissed the preview.
    Cancelled,
}

/// Handle to a staged document; enough to invoke or clean it up.
#[derive(Debug, Clone)]
pub struct StageTicket {
    pub request_id: Uuid,
    pub kind: DocumentKind,
    pub location: Option<PathBuf>,
}

/// A staged document plus the signals the dispatcher waits on.
#[derive(Debug)]
pub struct Staged {
    pub ticket: StageTicket,
    pub ready: Option<oneshot::Receiver<SurfaceSignal>>,
    pub finished: Option<oneshot::Receiver<()>>,
}

pub trait PrintSurface: Send + Sync {
    fn label(&self) -> &'static str;

    fn stage(&self, document: &RenderedDocument) -> Result<Staged>;

    fn invoke(&self, ticket: &StageTicket) -> Result<()>;

    /// Remove whatever `stage` created. Must tolerate repeated calls.
    fn cleanup(&self, ticket: &StageTicket);
}

// ---------------------------------------------------------------------------
// Hidden frame (desktop)
// ---------------------------------------------------------------------------

pub struct HiddenFramePrintSurface {
    spool_dir: PathBuf,
    backend: Arc<dyn PrintBackend>,
    completions: Mutex<HashMap<Uuid, oneshot::Sender<()>>>,
}

impl HiddenFramePrintSurface {
    pub fn new(spool_dir: impl Into<PathBuf>, backend: Arc<dyn PrintBackend>) -> Self {
        Self {
            spool_dir: spool_dir.into(),
            backend,
            completions: Mutex::new(HashMap::new()),
        }
    }

    fn staged_path(&self, document: &RenderedDocument) -> PathBuf {
        self.spool_dir
            .join(format!("print_{}_{}.html", document.kind, document.request_id))
    }

    fn signal_finished(&self, request_id: &Uuid) {
        let sender = self
            .completions
            .lock()
            .ok()
            .and_then(|mut pending| pending.remove(request_id));
        if let Some(sender) = sender {
            let _ = sender.send(());
        }
    }
}

fn with_auto_print(html: &str) -> String {
    match html.rfind("</body>") {
        Some(pos) => {
            let mut out = String::with_capacity(html.len() + AUTO_PRINT_SCRIPT.len());
            out.push_str(&html[..pos]);
            out.push_str(AUTO_PRINT_SCRIPT);
            out.push_str(&html[pos..]);
            out
        }
        None => format!("{html}{AUTO_PRINT_SCRIPT}"),
    }
}

impl PrintSurface for HiddenFramePrintSurface {
    fn label(&self) -> &'static str {
        "hidden-frame"
    }

    fn stage(&self, document: &RenderedDocument) -> Result<Staged> {
        fs::create_dir_all(&self.spool_dir)?;
        let path = self.staged_path(document);
        if self.backend.wants_auto_print_script() {
            fs::write(&path, with_auto_print(&document.html))?;
        } else {
            fs::write(&path, &document.html)?;
        }
        debug!(request_id = %document.request_id, path = %path.display(), "Document staged");

        // The file is fully written, so the surface is loaded as of now.
        let (ready_tx, ready_rx) = oneshot::channel();
        let _ = ready_tx.send(SurfaceSignal::Loaded);

        let (done_tx, done_rx) = oneshot::channel();
        self.completions
            .lock()
            .map_err(|_| PrintError::Surface("completion map poisoned".into()))?
            .insert(document.request_id, done_tx);

        Ok(Staged {
            ticket: StageTicket {
                request_id: document.request_id,
                kind: document.kind,
                location: Some(path),
            },
            ready: Some(ready_rx),
            finished: Some(done_rx),
        })
    }

    fn invoke(&self, ticket: &StageTicket) -> Result<()> {
        let path = ticket
            .location
            .as_deref()
            .ok_or_else(|| PrintError::Surface("ticket has no staged file".into()))?;
        if !path.exists() {
            return Err(PrintError::Surface(format!(
                "staged file vanished: {}",
                path.display()
            )));
        }
        match self.backend.print_file(path)? {
            PrintCompletion::Finished => self.signal_finished(&ticket.request_id),
            PrintCompletion::Detached => {}
        }
        info!(
            request_id = %ticket.request_id,
            backend = self.backend.name(),
            "Platform print invoked"
        );
        Ok(())
    }

    fn cleanup(&self, ticket: &StageTicket) {
        if let Ok(mut pending) = self.completions.lock() {
            pending.remove(&ticket.request_id);
        }
        if let Some(path) = ticket.location.as_deref() {
            match fs::remove_file(path) {
                Ok(()) => debug!(path = %path.display(), "Staged document removed"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove staged document"),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Preview modal (mobile)
// ---------------------------------------------------------------------------

/// One-shot answer channel handed to the preview modal.
///
/// Dropping it without answering counts as a cancel.
#[derive(Debug)]
pub struct PreviewResponder {
    tx: oneshot::Sender<SurfaceSignal>,
}

impl PreviewResponder {
    pub fn confirm(self) {
        let _ = self.tx.send(SurfaceSignal::Confirmed);
    }

    pub fn cancel(self) {
        let _ = self.tx.send(SurfaceSignal::Cancelled);
    }
}

/// UI side of the mobile preview: shows the document with Confirm/Cancel.
pub trait PreviewPresenter: Send + Sync {
    fn present(&self, request_id: Uuid, kind: DocumentKind, html: &str, responder: PreviewResponder);

    fn dismiss(&self, request_id: Uuid);
}

pub struct PreviewModalPrintSurface {
    presenter: Arc<dyn PreviewPresenter>,
}

impl PreviewModalPrintSurface {
    pub fn new(presenter: Arc<dyn PreviewPresenter>) -> Self {
        Self { presenter }
    }
}

impl PrintSurface for PreviewModalPrintSurface {
    fn label(&self) -> &'static str {
        "preview-modal"
    }

    fn stage(&self, document: &RenderedDocument) -> Result<Staged> {
        let (tx, rx) = oneshot::channel();
        self.presenter.present(
            document.request_id,
            document.kind,
            &document.html,
            PreviewResponder { tx },
        );
        Ok(Staged {
            ticket: StageTicket {
                request_id: document.request_id,
                kind: document.kind,
                location: None,
            },
            ready: Some(rx),
            finished: None,
        })
    }

    /// Closes the modal after confirmation; printing itself goes through the
    /// hidden frame.
    fn invoke(&self, ticket: &StageTicket) -> Result<()> {
        self.presenter.dismiss(ticket.request_id);
        Ok(())
    }

    fn cleanup(&self, ticket: &StageTicket) {
        self.presenter.dismiss(ticket.request_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    struct RecordingBackend {
        completion: PrintCompletion,
        auto_print: bool,
        seen: Mutex<Vec<String>>,
    }

    impl RecordingBackend {
        fn new(completion: PrintCompletion, auto_print: bool) -> Arc<Self> {
            Arc::new(Self {
                completion,
                auto_print,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    impl PrintBackend for RecordingBackend {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn print_file(&self, path: &Path) -> Result<PrintCompletion> {
            let html = fs::read_to_string(path)?;
            self.seen.lock().unwrap().push(html);
            Ok(self.completion)
        }

        fn wants_auto_print_script(&self) -> bool {
            self.auto_print
        }
    }

    fn document() -> RenderedDocument {
        RenderedDocument {
            request_id: Uuid::new_v4(),
            kind: DocumentKind::Sales,
            html: "<!DOCTYPE html><html><body><p>hi</p></body></html>".to_string(),
        }
    }

    #[test]
    fn hidden_frame_stages_invokes_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let backend = RecordingBackend::new(PrintCompletion::Finished, false);
        let surface = HiddenFramePrintSurface::new(dir.path().join("spool"), backend.clone());

        let doc = document();
        let mut staged = surface.stage(&doc).unwrap();
        let path = staged.ticket.location.clone().unwrap();
        assert!(path.exists());
        assert_eq!(
            staged.ready.take().unwrap().try_recv().unwrap(),
            SurfaceSignal::Loaded
        );

        surface.invoke(&staged.ticket).unwrap();
        assert_eq!(backend.seen.lock().unwrap().as_slice(), &[doc.html.clone()]);
        assert!(staged.finished.take().unwrap().try_recv().is_ok());

        surface.cleanup(&staged.ticket);
        assert!(!path.exists());
        surface.cleanup(&staged.ticket);
    }

    #[test]
    fn detached_backend_leaves_completion_pending() {
        let dir = tempfile::tempdir().unwrap();
        let backend = RecordingBackend::new(PrintCompletion::Detached, true);
        let surface = HiddenFramePrintSurface::new(dir.path(), backend.clone());

        let mut staged = surface.stage(&document()).unwrap();
        surface.invoke(&staged.ticket).unwrap();
        let mut finished = staged.finished.take().unwrap();
        assert!(matches!(
            finished.try_recv(),
            Err(oneshot::error::TryRecvError::Empty)
        ));

        let printed = backend.seen.lock().unwrap()[0].clone();
        assert!(printed.contains("window.print()"));
        assert!(printed.find("window.print()").unwrap() < printed.find("</body>").unwrap());

        surface.cleanup(&staged.ticket);
        assert!(matches!(
            finished.try_recv(),
            Err(oneshot::error::TryRecvError::Closed)
        ));
    }

    #[test]
    fn invoke_fails_when_staged_file_is_gone() {
        let dir = tempfile::tempdir().unwrap();
        let backend = RecordingBackend::new(PrintCompletion::Finished, false);
        let surface = HiddenFramePrintSurface::new(dir.path(), backend.clone());

        let staged = surface.stage(&document()).unwrap();
        surface.cleanup(&staged.ticket);
        assert!(matches!(
            surface.invoke(&staged.ticket),
            Err(PrintError::Surface(_))
        ));
        assert!(backend.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn auto_print_script_appended_without_body() {
        let out = with_auto_print("<p>fragment</p>");
        assert!(out.starts_with("<p>fragment</p><script>"));
    }

    struct AutoPresenter {
        confirm: bool,
        dismissed: Mutex<Vec<Uuid>>,
    }

    impl PreviewPresenter for AutoPresenter {
        fn present(&self, _id: Uuid, _kind: DocumentKind, html: &str, responder: PreviewResponder) {
            assert!(html.contains("hi"));
            if self.confirm {
                responder.confirm();
            } else {
                responder.cancel();
            }
        }

        fn dismiss(&self, request_id: Uuid) {
            self.dismissed.lock().unwrap().push(request_id);
        }
    }

    #[test]
    fn preview_resolves_with_user_decision() {
        for (confirm, expected) in [
            (true, SurfaceSignal::Confirmed),
            (false, SurfaceSignal::Cancelled),
        ] {
            let presenter = Arc::new(AutoPresenter {
                confirm,
                dismissed: Mutex::new(Vec::new()),
            });
            let surface = PreviewModalPrintSurface::new(presenter.clone());
            let doc = document();
            let mut staged = surface.stage(&doc).unwrap();
            assert!(staged.ticket.location.is_none());
            assert_eq!(staged.ready.take().unwrap().try_recv().unwrap(), expected);
            surface.cleanup(&staged.ticket);
            assert_eq!(presenter.dismissed.lock().unwrap().as_slice(), &[doc.request_id]);
        }
    }

    #[test]
    fn dropped_responder_closes_channel() {
        struct Forgetful;
        impl PreviewPresenter for Forgetful {
            fn present(&self, _: Uuid, _: DocumentKind, _: &str, _responder: PreviewResponder) {}
            fn dismiss(&self, _: Uuid) {}
        }
        let surface = PreviewModalPrintSurface::new(Arc::new(Forgetful));
        let mut staged = surface.stage(&document()).unwrap();
        assert!(matches!(
            staged.ready.take().unwrap().try_recv(),
            Err(oneshot::error::TryRecvError::Closed)
        ));
    }
}

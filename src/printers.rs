//! Platform print facilities.
//!
//! A [`PrintBackend`] receives the path of a staged, self-contained HTML
//! document and hands it to something that can print it: the system browser
//! (which runs the document's auto-print script) or a spooler command such as
//! CUPS `lp`. Backends are fire-and-forget from the dispatcher's point of view;
//! they only report whether completion is already known.

use std::path::Path;
use std::process::{Command, Stdio};

use tracing::{info, warn};

use crate::error::{PrintError, Result};

/// What a backend knows about the job once `print_file` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintCompletion {
    /// The print facility has consumed the document; the surface can go.
    Finished,
    /// Handed off to another process; completion is never reported.
    Detached,
}

pub trait PrintBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn print_file(&self, path: &Path) -> Result<PrintCompletion>;

    /// Whether staged documents should carry the `window.print()` script.
    fn wants_auto_print_script(&self) -> bool {
        false
    }
}

/// Opens the staged document in the default browser, which prints it on load.
#[derive(Debug, Default)]
pub struct BrowserPrintBackend;

impl PrintBackend for BrowserPrintBackend {
    fn name(&self) -> &'static str {
        "browser"
    }

    fn print_file(&self, path: &Path) -> Result<PrintCompletion> {
        let target = path
            .to_str()
            .ok_or_else(|| PrintError::Backend(format!("non UTF-8 path {}", path.display())))?;
        webbrowser::open(target)
            .map_err(|e| PrintError::Backend(format!("open browser: {e}")))?;
        info!(path = %path.display(), "Document opened in browser for printing");
        Ok(PrintCompletion::Detached)
    }

    fn wants_auto_print_script(&self) -> bool {
        true
    }
}

/// Runs a spooler command with the staged file path appended as the last
/// argument and waits for it to exit.
#[derive(Debug, Clone)]
pub struct CommandPrintBackend {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandPrintBackend {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Spooler command for this platform, if it has a usable one.
    #[cfg(unix)]
    pub fn system_default() -> Option<Self> {
        Some(Self::new("lp", Vec::new()))
    }

    #[cfg(not(unix))]
    pub fn system_default() -> Option<Self> {
        warn!("No spooler command on this platform; use the browser backend");
        None
    }
}

impl PrintBackend for CommandPrintBackend {
    fn name(&self) -> &'static str {
        "command"
    }

    fn print_file(&self, path: &Path) -> Result<PrintCompletion> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| PrintError::Backend(format!("spawn {}: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(
                program = %self.program,
                status = %output.status,
                stderr = %stderr.trim(),
                "Print command failed"
            );
            return Err(PrintError::Backend(format!(
                "{} exited with {}",
                self.program, output.status
            )));
        }

        info!(program = %self.program, path = %path.display(), "Print command completed");
        Ok(PrintCompletion::Finished)
    }
}

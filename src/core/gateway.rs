//! Converter gateway: pick a strategy by file type and drive the external tool

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, warn};

use super::engine::TaskRunner;
use super::error::ConversionError;
use super::markup::{render_page, MarkupFlavor};
use super::process::run_tool;
use super::task::ConversionTask;
use super::tools::{HtmlEngine, Toolchain};
use crate::config::OptimizeProfile;

const MARKDOWN_EXTENSIONS: &[&str] = &["md", "markdown"];
const TEXT_EXTENSIONS: &[&str] = &["txt"];
const OFFICE_EXTENSIONS: &[&str] = &["docx", "doc", "pptx", "xlsx", "odt", "odp", "ods"];

/// How a source file gets turned into a PDF
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Render to HTML, then print with an HTML-to-PDF engine
    Markup(MarkupFlavor),
    /// Office suite headless conversion
    Office,
    /// Copy, or rewrite through the optimizer when a profile is set
    PdfPassthrough,
    /// Unknown type: hand it to the office suite and hope
    OfficeFallback,
}

impl Strategy {
    pub fn for_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let ext = ext.as_str();

        if MARKDOWN_EXTENSIONS.contains(&ext) {
            Strategy::Markup(MarkupFlavor::Markdown)
        } else if TEXT_EXTENSIONS.contains(&ext) {
            Strategy::Markup(MarkupFlavor::PlainText)
        } else if OFFICE_EXTENSIONS.contains(&ext) {
            Strategy::Office
        } else if ext == "pdf" {
            Strategy::PdfPassthrough
        } else {
            Strategy::OfficeFallback
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Strategy::Markup(MarkupFlavor::Markdown) => "markdown",
            Strategy::Markup(MarkupFlavor::PlainText) => "text",
            Strategy::Office => "office",
            Strategy::PdfPassthrough => "pdf",
            Strategy::OfficeFallback => "office-fallback",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayOptions {
    pub timeout: Duration,
    pub optimize: Option<OptimizeProfile>,
    pub office_listener: bool,
}

pub struct Gateway {
    toolchain: Toolchain,
    options: GatewayOptions,
}

impl Gateway {
    pub fn new(toolchain: Toolchain, options: GatewayOptions) -> Self {
        Self { toolchain, options }
    }

    /// Convert one task's source into its destination
    ///
    /// Intermediate files live in a private scratch directory that is removed
    /// on every return path. The destination is only written once the tool
    /// has produced a complete file.
    ///
    /// # Arguments
    /// * `task` - Source to convert and where its PDF goes
    ///
    /// # Returns
    /// `Ok(())` once the destination is in place, otherwise the per-task error
    pub fn convert(&self, task: &ConversionTask) -> Result<(), ConversionError> {
        let strategy = Strategy::for_path(&task.source);
        debug!(source = %task.source.display(), strategy = strategy.name(), "Converting");

        if let Some(parent) = task.destination.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| ConversionError::fs(parent, e))?;
            }
        }

        let scratch = tempfile::Builder::new()
            .prefix("convert2pdf-")
            .tempdir()
            .map_err(|e| ConversionError::fs(std::env::temp_dir(), e))?;

        match strategy {
            Strategy::Markup(flavor) => {
                let produced = self.render_markup(&task.source, flavor, &scratch)?;
                publish(&produced, &task.destination)
            }
            Strategy::Office | Strategy::OfficeFallback => {
                let produced = self.run_office(&task.source, &scratch)?;
                publish(&produced, &task.destination)
            }
            Strategy::PdfPassthrough => self.pass_through(task, &scratch),
        }
    }

    fn render_markup(
        &self,
        source: &Path,
        flavor: MarkupFlavor,
        scratch: &TempDir,
    ) -> Result<PathBuf, ConversionError> {
        let engine = self
            .toolchain
            .html
            .as_ref()
            .ok_or(ConversionError::NoEngineAvailable)?;

        let bytes = fs::read(source).map_err(|e| ConversionError::fs(source, e))?;
        let text = String::from_utf8_lossy(&bytes);
        let title = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let html_path = scratch.path().join("input.html");
        fs::write(&html_path, render_page(&text, flavor, &title))
            .map_err(|e| ConversionError::fs(&html_path, e))?;

        let out = scratch.path().join("output.pdf");
        let cmd = match engine {
            HtmlEngine::Wkhtmltopdf(bin) => {
                let mut cmd = Command::new(bin);
                cmd.args(["--quiet", "--enable-local-file-access"])
                    .arg(&html_path)
                    .arg(&out);
                cmd
            }
            HtmlEngine::Browser(bin) => {
                let mut cmd = Command::new(bin);
                cmd.args(["--headless", "--disable-gpu", "--no-pdf-header-footer"])
                    .arg(format!(
                        "--user-data-dir={}",
                        scratch.path().join("browser-profile").display()
                    ))
                    .arg(format!("--print-to-pdf={}", out.display()))
                    .arg(file_url(&html_path));
                cmd
            }
        };

        run_tool(engine.name(), cmd, self.options.timeout)?;
        expect_output(engine.name(), out)
    }

    fn run_office(&self, source: &Path, scratch: &TempDir) -> Result<PathBuf, ConversionError> {
        if self.options.office_listener {
            match &self.toolchain.listener_client {
                Some(client) => return self.run_listener_client(client, source, scratch),
                None => debug!("No listener client installed, starting the office suite per call"),
            }
        }

        let soffice = self
            .toolchain
            .office
            .as_ref()
            .ok_or_else(|| ConversionError::ToolNotFound {
                tool: "soffice".to_string(),
            })?;

        // A private profile per call lets several instances run side by side.
        let profile = scratch.path().join("office-profile");
        let mut cmd = Command::new(soffice);
        cmd.args(["--headless", "--nologo", "--nofirststartwizard", "--norestore"])
            .arg(format!("-env:UserInstallation={}", file_url(&profile)))
            .args(["--convert-to", "pdf", "--outdir"])
            .arg(scratch.path())
            .arg(source);
        run_tool("soffice", cmd, self.options.timeout)?;

        let mut name = source.file_stem().unwrap_or(source.as_os_str()).to_os_string();
        name.push(".pdf");
        expect_output("soffice", scratch.path().join(name))
    }

    fn run_listener_client(
        &self,
        client: &Path,
        source: &Path,
        scratch: &TempDir,
    ) -> Result<PathBuf, ConversionError> {
        let out = scratch.path().join("output.pdf");
        let mut cmd = Command::new(client);
        cmd.args(["--convert-to", "pdf"]).arg(source).arg(&out);
        run_tool("unoconvert", cmd, self.options.timeout)?;
        expect_output("unoconvert", out)
    }

    fn pass_through(&self, task: &ConversionTask, scratch: &TempDir) -> Result<(), ConversionError> {
        let in_place = task.source == task.destination;
        let Some(profile) = self.options.optimize else {
            if in_place {
                return Ok(());
            }
            return publish_copy(&task.source, &task.destination);
        };
        let Some(gs) = &self.toolchain.optimizer else {
            warn!(
                "Optimization profile '{}' requested but Ghostscript is not installed; copying {}",
                profile.as_str(),
                task.source.display()
            );
            if in_place {
                return Ok(());
            }
            return publish_copy(&task.source, &task.destination);
        };

        let out = scratch.path().join("optimized.pdf");
        let mut cmd = Command::new(gs);
        cmd.arg("-sDEVICE=pdfwrite")
            .arg(format!("-dPDFSETTINGS=/{}", profile.as_str()))
            .args(["-dNOPAUSE", "-dBATCH", "-dQUIET"])
            .arg(format!("-sOutputFile={}", out.display()))
            .arg(&task.source);
        run_tool("gs", cmd, self.options.timeout)?;
        let produced = expect_output("gs", out)?;
        publish(&produced, &task.destination)
    }
}

impl TaskRunner for Gateway {
    fn run(&self, task: &ConversionTask) -> Result<(), ConversionError> {
        self.convert(task)
    }
}

fn file_url(path: &Path) -> String {
    format!("file://{}", path.display())
}

fn expect_output(tool: &str, path: PathBuf) -> Result<PathBuf, ConversionError> {
    if path.is_file() {
        Ok(path)
    } else {
        Err(ConversionError::NoOutput {
            tool: tool.to_string(),
            path,
        })
    }
}

/// Move a finished file into place
fn publish(produced: &Path, destination: &Path) -> Result<(), ConversionError> {
    if fs::rename(produced, destination).is_ok() {
        return Ok(());
    }
    // Scratch space is often on another filesystem.
    publish_copy(produced, destination)
}

/// Copy into a sibling temp name, then rename, so readers never see half a file
fn publish_copy(from: &Path, destination: &Path) -> Result<(), ConversionError> {
    let mut partial = destination.as_os_str().to_os_string();
    partial.push(".part");
    let partial = PathBuf::from(partial);

    if let Err(e) = fs::copy(from, &partial) {
        let _ = fs::remove_file(&partial);
        return Err(ConversionError::fs(destination, e));
    }
    fs::rename(&partial, destination).map_err(|e| {
        let _ = fs::remove_file(&partial);
        ConversionError::fs(destination, e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task::FailureKind;

    fn gateway(toolchain: Toolchain) -> Gateway {
        Gateway::new(
            toolchain,
            GatewayOptions {
                timeout: Duration::from_secs(10),
                optimize: None,
                office_listener: false,
            },
        )
    }

    #[test]
    fn test_strategy_routing() {
        assert_eq!(Strategy::for_path(Path::new("a.md")), Strategy::Markup(MarkupFlavor::Markdown));
        assert_eq!(
            Strategy::for_path(Path::new("a.MARKDOWN")),
            Strategy::Markup(MarkupFlavor::Markdown)
        );
        assert_eq!(Strategy::for_path(Path::new("a.txt")), Strategy::Markup(MarkupFlavor::PlainText));
        assert_eq!(Strategy::for_path(Path::new("a.docx")), Strategy::Office);
        assert_eq!(Strategy::for_path(Path::new("a.ods")), Strategy::Office);
        assert_eq!(Strategy::for_path(Path::new("a.Pdf")), Strategy::PdfPassthrough);
        assert_eq!(Strategy::for_path(Path::new("a.rtf")), Strategy::OfficeFallback);
        assert_eq!(Strategy::for_path(Path::new("Makefile")), Strategy::OfficeFallback);
    }

    #[test]
    fn test_markup_without_engine() {
        let temp_dir = tempfile::tempdir().unwrap();
        let src = temp_dir.path().join("a.md");
        fs::write(&src, "# hi").unwrap();
        let task = ConversionTask::new(&src, temp_dir.path().join("a.pdf"));

        let err = gateway(Toolchain::empty()).convert(&task).unwrap_err();
        assert_eq!(err.kind(), FailureKind::NoEngineAvailable);
        assert!(!task.destination.exists());
    }

    #[test]
    fn test_office_without_suite() {
        let temp_dir = tempfile::tempdir().unwrap();
        let src = temp_dir.path().join("b.docx");
        fs::write(&src, b"PK").unwrap();
        let task = ConversionTask::new(&src, temp_dir.path().join("b.pdf"));

        let err = gateway(Toolchain::empty()).convert(&task).unwrap_err();
        assert_eq!(err.kind(), FailureKind::ToolNotFound);
    }

    #[test]
    fn test_publish_copy_leaves_no_partial_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let from = temp_dir.path().join("in.pdf");
        let to = temp_dir.path().join("out.pdf");
        fs::write(&from, b"%PDF-1.4 body").unwrap();

        publish_copy(&from, &to).unwrap();
        assert_eq!(fs::read(&to).unwrap(), b"%PDF-1.4 body");
        assert!(!temp_dir.path().join("out.pdf.part").exists());
    }

    #[test]
    fn test_in_place_pdf_is_left_untouched() {
        let temp_dir = tempfile::tempdir().unwrap();
        let pdf = temp_dir.path().join("c.pdf");
        fs::write(&pdf, b"%PDF-1.4 original").unwrap();

        gateway(Toolchain::empty())
            .convert(&ConversionTask::new(&pdf, &pdf))
            .unwrap();
        assert_eq!(fs::read(&pdf).unwrap(), b"%PDF-1.4 original");
    }

    #[test]
    fn test_missing_source_is_filesystem_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let task = ConversionTask::new(temp_dir.path().join("gone.pdf"), temp_dir.path().join("out/gone.pdf"));

        let err = gateway(Toolchain::empty()).convert(&task).unwrap_err();
        assert_eq!(err.kind(), FailureKind::Filesystem);
    }
}

//! External tool discovery
//!
//! Probed once per run and never re-probed. Workers receive the resolved
//! [`Toolchain`] from the orchestrator instead of searching PATH themselves.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

const WKHTMLTOPDF_CANDIDATES: &[&str] = &["wkhtmltopdf"];
const BROWSER_CANDIDATES: &[&str] = &[
    "chrome",
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
];
const OFFICE_CANDIDATES: &[&str] = &["soffice", "libreoffice"];
const OPTIMIZER_CANDIDATES: &[&str] = &["gs", "gswin64c"];
const LISTENER_CLIENT_CANDIDATES: &[&str] = &["unoconvert"];

lazy_static::lazy_static! {
    static ref TOOLCHAIN: Toolchain = Toolchain::probe();
}

/// The process-wide toolchain, probed on first use
pub fn toolchain() -> &'static Toolchain {
    &TOOLCHAIN
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HtmlEngine {
    Wkhtmltopdf(PathBuf),
    Browser(PathBuf),
}

impl HtmlEngine {
    pub fn name(&self) -> &'static str {
        match self {
            HtmlEngine::Wkhtmltopdf(_) => "wkhtmltopdf",
            HtmlEngine::Browser(_) => "headless browser",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toolchain {
    pub html: Option<HtmlEngine>,
    pub office: Option<PathBuf>,
    pub optimizer: Option<PathBuf>,
    pub listener_client: Option<PathBuf>,
}

impl Toolchain {
    /// Search PATH for every supported tool; first candidate found wins.
    pub fn probe() -> Self {
        let html = detect(WKHTMLTOPDF_CANDIDATES)
            .map(HtmlEngine::Wkhtmltopdf)
            .or_else(|| detect(BROWSER_CANDIDATES).map(HtmlEngine::Browser));

        let toolchain = Self {
            html,
            office: detect(OFFICE_CANDIDATES),
            optimizer: detect(OPTIMIZER_CANDIDATES),
            listener_client: detect(LISTENER_CLIENT_CANDIDATES),
        };
        debug!(?toolchain, "Probed external tools");
        toolchain
    }

    /// A toolchain with nothing installed
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn describe(&self) -> Vec<String> {
        let show = |p: &Option<PathBuf>| match p {
            Some(path) => path.display().to_string(),
            None => "not found".to_string(),
        };
        let html = match &self.html {
            Some(HtmlEngine::Wkhtmltopdf(p)) | Some(HtmlEngine::Browser(p)) => p.display().to_string(),
            None => "not found".to_string(),
        };
        vec![
            format!("HTML engine:  {html}"),
            format!("Office suite: {}", show(&self.office)),
            format!("Optimizer:    {}", show(&self.optimizer)),
            format!("Listener:     {}", show(&self.listener_client)),
        ]
    }
}

fn detect(candidates: &[&str]) -> Option<PathBuf> {
    candidates.iter().find_map(|name| which::which(name).ok())
}

//! Run configuration
//!
//! Built once from the command line and read-only for the rest of the run.

use anyhow::{bail, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Ghostscript `-dPDFSETTINGS` presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum OptimizeProfile {
    Screen,
    Ebook,
    Printer,
    Prepress,
    Default,
}

impl OptimizeProfile {
    pub fn as_str(self) -> &'static str {
        match self {
            OptimizeProfile::Screen => "screen",
            OptimizeProfile::Ebook => "ebook",
            OptimizeProfile::Printer => "printer",
            OptimizeProfile::Prepress => "prepress",
            OptimizeProfile::Default => "default",
        }
    }
}

/// Where each source's PDF ends up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationPolicy {
    /// `dir/report.md` becomes `dir/report.pdf`
    Sibling,
    /// Every destination is `<dir>/<stem>.pdf`
    Flatten(PathBuf),
}

impl DestinationPolicy {
    pub fn from_output_dir(output_dir: Option<&Path>) -> Self {
        match output_dir {
            Some(dir) => DestinationPolicy::Flatten(dir.to_path_buf()),
            None => DestinationPolicy::Sibling,
        }
    }

    pub fn destination_for(&self, source: &Path) -> PathBuf {
        match self {
            DestinationPolicy::Sibling => source.with_extension("pdf"),
            DestinationPolicy::Flatten(dir) => {
                let stem = source.file_stem().unwrap_or(source.as_os_str());
                let mut name = stem.to_os_string();
                name.push(".pdf");
                dir.join(name)
            }
        }
    }

    pub fn output_dir(&self) -> Option<&Path> {
        match self {
            DestinationPolicy::Sibling => None,
            DestinationPolicy::Flatten(dir) => Some(dir),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub input_paths: Vec<String>,
    pub output_dir: Option<PathBuf>,
    pub workers: usize,
    pub timeout: Duration,
    pub optimize: Option<OptimizeProfile>,
    pub office_listener: bool,
    pub overwrite: bool,
    pub dry_run: bool,
    pub verbose: bool,
}

impl RunConfig {
    /// `jobs == 0` means one worker per available core.
    pub fn resolve_workers(jobs: usize) -> usize {
        if jobs > 0 {
            return jobs;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            bail!("--timeout must be at least 1 second");
        }
        if self.workers == 0 {
            bail!("worker count resolved to zero");
        }
        Ok(())
    }

    pub fn destination_policy(&self) -> DestinationPolicy {
        DestinationPolicy::from_output_dir(self.output_dir.as_deref())
    }
}

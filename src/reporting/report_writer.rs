//! Result aggregation and reporting

use anyhow::Result;
use std::fmt::Write as _;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::core::task::{ConversionTask, FailureKind, SkippedSource, TaskOutcome, TaskStatus};

const PDF_MAGIC: &[u8] = b"%PDF-";
/// Readers accept the header anywhere in the first KiB (BOMs, mail preambles)
const HEADER_WINDOW: u64 = 1024;

/// Check that a destination is a readable, non-empty PDF
///
/// # Arguments
/// * `path` - Destination written by a conversion
///
/// # Returns
/// `true` if `%PDF-` appears within the first 1024 bytes of the file
pub fn verify_output(path: &Path) -> bool {
    let Ok(file) = File::open(path) else {
        return false;
    };
    let mut head = Vec::with_capacity(HEADER_WINDOW as usize);
    if file.take(HEADER_WINDOW).read_to_end(&mut head).is_err() {
        return false;
    }
    head.windows(PDF_MAGIC.len()).any(|w| w == PDF_MAGIC)
}

#[derive(Debug, Clone)]
pub struct FailedTask {
    pub task: ConversionTask,
    pub kind: FailureKind,
    pub message: String,
}

/// Aggregated view of a finished run
#[derive(Debug, Default)]
pub struct Summary {
    pub converted: Vec<ConversionTask>,
    pub failed: Vec<FailedTask>,
    /// Scheduled tasks that never ran (interrupted)
    pub not_run: Vec<(ConversionTask, String)>,
    /// Sources the planner decided not to schedule
    pub skipped: Vec<SkippedSource>,
}

impl Summary {
    /// Tally outcomes against what is actually on disk
    ///
    /// A task only counts as converted when the tool reported success and the
    /// destination passes [`verify_output`].
    pub fn tally(outcomes: &[TaskOutcome], skipped: &[SkippedSource]) -> Self {
        let mut summary = Summary {
            skipped: skipped.to_vec(),
            ..Default::default()
        };

        for outcome in outcomes {
            let task = outcome.task.clone();
            match &outcome.status {
                TaskStatus::Success if verify_output(&task.destination) => {
                    summary.converted.push(task)
                }
                TaskStatus::Success => summary.failed.push(FailedTask {
                    task,
                    kind: FailureKind::Unverified,
                    message: "tool reported success but destination is missing, empty or not a PDF"
                        .to_string(),
                }),
                TaskStatus::Failure { kind, message } => summary.failed.push(FailedTask {
                    task,
                    kind: *kind,
                    message: message.clone(),
                }),
                TaskStatus::Skipped(reason) => summary.not_run.push((task, reason.clone())),
            }
        }

        summary
    }

    pub fn succeeded(&self) -> usize {
        self.converted.len()
    }

    pub fn failures(&self) -> usize {
        self.failed.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len() + self.not_run.len()
    }

    pub fn tally_line(&self) -> String {
        format!(
            "Succeeded: {} | Failed: {} | Skipped: {}",
            self.succeeded(),
            self.failures(),
            self.skipped_count()
        )
    }

    /// Terminal summary; failure messages are listed only when `verbose`
    pub fn render(&self, verbose: bool) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "==================================================");
        let _ = writeln!(out, "CONVERSION COMPLETE");
        let _ = writeln!(out, "==================================================");
        let _ = writeln!(out, "{}", self.tally_line());

        if !self.failed.is_empty() {
            if verbose {
                let _ = writeln!(out, "\nFailed:");
                for f in &self.failed {
                    let _ = writeln!(out, "  - {} ({}): {}", f.task.source.display(), f.kind, f.message);
                }
            } else {
                let _ = writeln!(out, "Run with --verbose to see why each failure happened.");
            }
        }

        if !self.skipped.is_empty() {
            let _ = writeln!(out, "\nSkipped ({}):", self.skipped.len());
            for s in &self.skipped {
                let _ = writeln!(
                    out,
                    "  - {} -> {} ({})",
                    s.source.display(),
                    s.destination.display(),
                    s.reason
                );
            }
            let _ = writeln!(
                out,
                "Hint: use --overwrite to replace existing PDFs or --output-dir to write them elsewhere."
            );
        }

        if !self.not_run.is_empty() {
            let _ = writeln!(out, "\nNot started ({}):", self.not_run.len());
            for (task, reason) in &self.not_run {
                let _ = writeln!(out, "  - {} ({})", task.source.display(), reason);
            }
        }

        out
    }

    /// Process exit status for this run: 0 if nothing failed, otherwise 1
    pub fn exit_code(&self) -> u8 {
        if self.failed.is_empty() {
            0
        } else {
            1
        }
    }
}

/// Write a plain-text report of the run
///
/// # Arguments
/// * `output_path` - File to create or truncate
/// * `summary` - Tallied outcomes of the run
pub fn write_report(output_path: &Path, summary: &Summary) -> Result<()> {
    let mut file = File::create(output_path)?;

    let now = std::time::SystemTime::now();
    writeln!(file, "PDF Conversion Report")?;
    writeln!(file, "=====================")?;
    writeln!(file, "Generated: {:?}", now)?;
    writeln!(file)?;

    let scheduled = summary.succeeded() + summary.failures() + summary.not_run.len();
    writeln!(file, "Summary Statistics:")?;
    writeln!(file, "-------------------")?;
    writeln!(file, "  Tasks scheduled: {}", scheduled)?;
    writeln!(file, "  Converted: {}", summary.succeeded())?;
    writeln!(file, "  Failed: {}", summary.failures())?;
    writeln!(file, "  Skipped: {}", summary.skipped_count())?;

    if scheduled > 0 {
        let pct = (summary.succeeded() as f64 / scheduled as f64) * 100.0;
        writeln!(file, "  Success rate: {:.2}%", pct)?;
    }
    writeln!(file)?;

    if !summary.failed.is_empty() {
        writeln!(file, "Failed Tasks:")?;
        writeln!(file, "-------------")?;
        for f in &summary.failed {
            writeln!(file, "  {} -> {}", f.task.source.display(), f.task.destination.display())?;
            writeln!(file, "    [{}] {}", f.kind, f.message)?;
        }
        writeln!(file)?;
    }

    if summary.skipped_count() > 0 {
        writeln!(file, "Skipped Sources:")?;
        writeln!(file, "----------------")?;
        for s in &summary.skipped {
            writeln!(file, "  {} -> {} ({})", s.source.display(), s.destination.display(), s.reason)?;
        }
        for (task, reason) in &summary.not_run {
            writeln!(file, "  {} -> {} ({})", task.source.display(), task.destination.display(), reason)?;
        }
        writeln!(file)?;
    }

    writeln!(file, "Converted Files:")?;
    writeln!(file, "----------------")?;
    for task in &summary.converted {
        writeln!(file, "  {} -> {}", task.source.display(), task.destination.display())?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::{NamedTempFile, TempDir};

    fn outcome(dir: &Path, name: &str, status: TaskStatus) -> TaskOutcome {
        TaskOutcome {
            task: ConversionTask::new(dir.join(format!("{name}.md")), dir.join(format!("{name}.pdf"))),
            status,
        }
    }

    #[test]
    fn test_verify_output() {
        let temp_dir = TempDir::new().unwrap();
        let good = temp_dir.path().join("good.pdf");
        let empty = temp_dir.path().join("empty.pdf");
        let html = temp_dir.path().join("html.pdf");
        fs::write(&good, b"%PDF-1.5\n...").unwrap();
        fs::write(&empty, b"").unwrap();
        fs::write(&html, b"<html></html>").unwrap();

        assert!(verify_output(&good));
        assert!(!verify_output(&empty));
        assert!(!verify_output(&html));
        assert!(!verify_output(&temp_dir.path().join("missing.pdf")));
    }

    #[test]
    fn test_verify_output_accepts_header_after_preamble() {
        let temp_dir = TempDir::new().unwrap();
        let bom = temp_dir.path().join("bom.pdf");
        let late = temp_dir.path().join("late.pdf");
        let mut bom_bytes = vec![0xEF, 0xBB, 0xBF];
        bom_bytes.extend_from_slice(b"%PDF-1.4\n%%EOF\n");
        fs::write(&bom, &bom_bytes).unwrap();
        let mut late_bytes = vec![b' '; 2000];
        late_bytes.extend_from_slice(b"%PDF-1.4");
        fs::write(&late, &late_bytes).unwrap();

        assert!(verify_output(&bom));
        assert!(!verify_output(&late));

        let outcomes = vec![TaskOutcome {
            task: ConversionTask::new(temp_dir.path().join("bom.src.pdf"), &bom),
            status: TaskStatus::Success,
        }];
        let summary = Summary::tally(&outcomes, &[]);
        assert_eq!(summary.tally_line(), "Succeeded: 1 | Failed: 0 | Skipped: 0");
        assert_eq!(summary.exit_code(), 0);
    }

    #[test]
    fn test_reported_success_with_empty_file_is_failure() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("ok.pdf"), b"%PDF-1.4").unwrap();
        fs::write(temp_dir.path().join("zero.pdf"), b"").unwrap();

        let outcomes = vec![
            outcome(temp_dir.path(), "ok", TaskStatus::Success),
            outcome(temp_dir.path(), "zero", TaskStatus::Success),
            outcome(
                temp_dir.path(),
                "bad",
                TaskStatus::Failure {
                    kind: FailureKind::Timeout,
                    message: "soffice timed out after 60s".to_string(),
                },
            ),
        ];

        let summary = Summary::tally(&outcomes, &[]);
        assert_eq!(summary.succeeded(), 1);
        assert_eq!(summary.failures(), 2);
        assert_eq!(summary.failed[0].kind, FailureKind::Unverified);
        assert_eq!(summary.tally_line(), "Succeeded: 1 | Failed: 2 | Skipped: 0");
        assert_eq!(summary.exit_code(), 1);
    }

    #[test]
    fn test_render_lists_skipped_with_hint() {
        let skipped = vec![SkippedSource {
            source: PathBuf::from("/docs/b.docx"),
            destination: PathBuf::from("/docs/b.pdf"),
            reason: "destination already exists".to_string(),
        }];
        let summary = Summary::tally(&[], &skipped);
        let text = summary.render(false);

        assert!(text.contains("Succeeded: 0 | Failed: 0 | Skipped: 1"));
        assert!(text.contains("/docs/b.docx -> /docs/b.pdf"));
        assert!(text.contains("--overwrite"));
        assert!(text.contains("--output-dir"));
        assert_eq!(summary.exit_code(), 0);
    }

    #[test]
    fn test_failure_details_only_when_verbose() {
        let temp_dir = TempDir::new().unwrap();
        let outcomes = vec![outcome(
            temp_dir.path(),
            "x",
            TaskStatus::Failure {
                kind: FailureKind::ToolError,
                message: "gs failed (exit code 1): boom".to_string(),
            },
        )];
        let summary = Summary::tally(&outcomes, &[]);

        assert!(!summary.render(false).contains("boom"));
        assert!(summary.render(true).contains("boom"));
    }

    #[test]
    fn test_write_report() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("ok.pdf"), b"%PDF-1.4").unwrap();
        let outcomes = vec![
            outcome(temp_dir.path(), "ok", TaskStatus::Success),
            outcome(temp_dir.path(), "late", TaskStatus::Skipped("interrupted before start".into())),
        ];
        let summary = Summary::tally(&outcomes, &[]);

        let report = NamedTempFile::new().unwrap();
        write_report(report.path(), &summary).unwrap();

        let content = fs::read_to_string(report.path()).unwrap();
        assert!(content.contains("Tasks scheduled: 2"));
        assert!(content.contains("Converted: 1"));
        assert!(content.contains("Skipped: 1"));
        assert!(content.contains("interrupted before start"));
    }
}

//! Task planning: decide a destination per source and what to skip

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use super::task::{ConversionTask, SkippedSource};
use crate::config::DestinationPolicy;

#[derive(Debug, Clone)]
pub struct PlanOptions {
    pub policy: DestinationPolicy,
    pub overwrite: bool,
    /// Dry runs never touch the filesystem, not even to create the output dir.
    pub dry_run: bool,
}

#[derive(Debug, Default)]
pub struct Plan {
    pub tasks: Vec<ConversionTask>,
    pub skipped: Vec<SkippedSource>,
}

/// Build the task list for a set of resolved sources
///
/// The output directory (if any) is created up front, so an uncreatable
/// directory fails the whole run before any work starts. Sources are
/// considered in the order given; when two sources map to the same
/// destination the first one keeps it.
///
/// # Arguments
/// * `sources` - Resolved source files, in the order they should claim destinations
/// * `options` - Destination policy plus the overwrite and dry-run switches
///
/// # Returns
/// Scheduled tasks and the sources left out, each with a reason
pub fn plan(sources: &[PathBuf], options: &PlanOptions) -> Result<Plan> {
    if let Some(dir) = options.policy.output_dir() {
        if !options.dry_run {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
        }
    }

    let mut plan = Plan::default();
    let mut claimed: HashMap<PathBuf, PathBuf> = HashMap::new();

    for source in sources {
        let destination = options.policy.destination_for(source);

        // A PDF that is its own destination is converted in place, so its
        // existence never counts as a clash.
        let in_place = &destination == source;

        let reason = if let Some(owner) = claimed.get(&destination) {
            Some(format!("destination already claimed by {}", owner.display()))
        } else if !in_place && destination.exists() && !options.overwrite {
            Some("destination already exists".to_string())
        } else {
            None
        };

        match reason {
            Some(reason) => plan.skipped.push(SkippedSource {
                source: source.clone(),
                destination,
                reason,
            }),
            None => {
                claimed.insert(destination.clone(), source.clone());
                plan.tasks.push(ConversionTask::new(source.clone(), destination));
            }
        }
    }

    Ok(plan)
}

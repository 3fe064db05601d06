//! Batch document-to-PDF conversion
//!
//! Discovers input files, plans a destination for each, and converts them in
//! parallel through external tools, with every conversion isolated in its own
//! worker process and bounded by a timeout.

pub mod config;
pub mod core;
pub mod reporting;
pub mod scanner;

pub use crate::core::engine;
pub use crate::core::gateway;
pub use crate::core::planner;
pub use crate::reporting::report_writer;
pub use crate::scanner::file_scanner;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{DestinationPolicy, OptimizeProfile, RunConfig};
    pub use crate::core::engine::{run_guarded, Engine, TaskRunner};
    pub use crate::core::error::ConversionError;
    pub use crate::core::gateway::{Gateway, GatewayOptions, Strategy};
    pub use crate::core::planner::{plan, Plan, PlanOptions};
    pub use crate::core::task::{
        ConversionTask, FailureKind, SkippedSource, TaskOutcome, TaskStatus,
    };
    pub use crate::core::tools::{toolchain, HtmlEngine, Toolchain};
    pub use crate::core::worker::{WorkerProcess, WORKER_FLAG};
    pub use crate::reporting::report_writer::{verify_output, write_report, Summary};
    pub use crate::scanner::file_scanner::resolve_inputs;
}

//! Conversion core: planning, dispatch and execution

pub mod engine;
pub mod error;
pub mod gateway;
pub mod markup;
pub mod planner;
pub mod process;
pub mod task;
pub mod tools;
pub mod worker;

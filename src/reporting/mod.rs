//! Run summaries and report files

pub mod report_writer;

//! Subcommand handlers. Each `execute` renders a report through [`crate::output::OutputWriter`].

pub mod config;
pub mod consume;
pub mod detect;
pub mod ingest;
pub mod rules;

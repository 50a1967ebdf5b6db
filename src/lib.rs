//! Codescout library crate
//!
//! Exposes the analysis pipeline so external tooling (and the CLI in
//! main.rs) can analyze source fragments without going through CLI
//! startup.

pub mod advisor;
pub mod analysis;
pub mod cache;
pub mod config;
pub mod diagnostic;
pub mod fragment;
pub mod pipeline;

pub use config::AnalysisConfig;
pub use diagnostic::{Diagnostic, DiagnosticKind, DiagnosticSource, Severity};
pub use fragment::SourceFragment;
pub use pipeline::DiagnosticPipeline;

//! Dimsync worker
//!
//! The reconciliation loop selects video assets whose dimensions are unknown or
//! carry an operator directive, looks their dimensions up and writes the result
//! back one asset at a time. [`ReconciliationService`] runs it on an interval.

pub mod reconcile;
pub mod selector;
pub mod service;
pub mod telemetry;

pub use reconcile::{AssetOutcome, ReconciliationLoop, TickReport};
pub use selector::{Candidate, CandidateSummary, Selector};
pub use service::{ReconciliationService, ServiceConfig, ServiceHandle};
pub use telemetry::{init_tracing, LogFormat};

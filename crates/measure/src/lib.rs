//! Measurement side of speedwatch.
//!
//! A [`MeasurementProvider`] performs the individual network operations; the
//! [`Orchestrator`] drives one attempt through its stages, turns the outcome
//! into exactly one [`Record`](speedwatch_storage::Record) and appends it to a
//! record store.

pub mod http;
mod orchestrator;
mod provider;
mod scripted;
mod state;

pub use http::{HttpProvider, HttpProviderConfig};
pub use orchestrator::{Orchestrator, OrchestratorError, RunReport, INTERRUPT_ERROR_TYPE};
pub use provider::{ClientConfig, MeasurementProvider, ProviderError, SelectedServer, Server};
pub use scripted::ScriptedProvider;
pub use state::{RunState, Stage, StageFailure};

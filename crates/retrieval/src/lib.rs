//! Layered policy retrieval for PolicyGate.
//!
//! - [`scope`] builds the wildcard lattice of metadata filters
//! - [`ScopedRetriever`] answers one layer for one case scope
//! - [`RetrievalOrchestrator`] runs every layer and labels the snippets
//! - [`PolicyIngestor`] and [`PolicyGovernance`] write policies and approve them
//! - [`PolicyGate`] wires all of it from configuration

pub mod scope;
pub mod retriever;
pub mod orchestrator;
pub mod ingest;
pub mod governance;
pub mod runtime;

pub use scope::{ScopeVariant, scope_lattice};
pub use retriever::{ScopedRetriever, Snippet, SnippetOrigin};
pub use orchestrator::{CaseQuery, LabeledSnippet, RetrievalOrchestrator, SnippetBundle};
pub use ingest::{IngestReport, IngestRequest, PolicyIngestor};
pub use governance::{ApprovalReport, PolicyGovernance};
pub use runtime::PolicyGate;

pub mod config;
pub mod importer;
pub mod match_engine;
pub mod reconcile;
pub mod stats;

pub use config::MatchConfig;
pub use importer::{import_statement, ImportOutcome, ImportRequest};
pub use match_engine::{AutoMatchDecision, MatchCandidate, MatchEngine};
pub use reconcile::{
    auto_reconcile_all, candidates, ignore, reconcile, BatchItem, BatchOutcome,
    ReconcileRequest, Settlement,
};
pub use stats::{statistics, Statistics};

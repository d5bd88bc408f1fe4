//! Core domain types and logic.

pub mod error;
pub mod range;
pub mod criterion;
pub mod snapshot;
pub mod alert;
pub mod range_matcher;
pub mod scorer;
pub mod formula;
pub mod formula_parser;
pub mod formula_eval;
pub mod operator_table;
pub mod evaluator;
pub mod aligner;
pub mod catalog;
pub mod orchestrator;
pub mod config_validation;

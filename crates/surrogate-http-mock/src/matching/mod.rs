//! Request matching: path templates, condition operators, field extraction,
//! and the rule-selection engine.
//!
//! # Module Structure
//!
//! - `path` - path template matching and parameter extraction
//! - `operators` - pure comparison operator evaluation
//! - `extract` - actual-value extraction per condition source
//! - `engine` - endpoint/rule selection composing the above

pub mod engine;
pub mod extract;
pub mod operators;
pub mod path;

pub use engine::MatchEngine;

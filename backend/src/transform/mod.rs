//! Transformation module.
//!
//! - DSL: recipe types, operation registry and step interpreter
//! - Pipeline: validate, ingest, run and shape the result

pub mod dsl;
pub mod pipeline;

pub use dsl::*;
pub use pipeline::*;

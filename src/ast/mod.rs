//! Abstract Syntax Tree for Lash.
//!
//! Typed tree of statements and expressions with attached source spans.
//! Owned by the parser; handed by reference to every later phase.

pub mod types;

pub use types::*;

//! Query compiler (spec.md §4.3). Grounded on `weetags/engine/sql.py`'s
//! `SqlConverter`: pure and synchronous, translating a structured query
//! description into `(sql, values)` without ever touching the engine.

pub mod compiler;
pub mod condition;
pub mod types;

pub use compiler::QueryCompiler;
pub use condition::{Compare, Conditions, Predicate, PredicateTerm};
pub use types::{Axis, Op, OnConflict, Order};

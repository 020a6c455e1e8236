//! `arbor`: a persistent rooted-tree store on top of SQLite. A tree's nodes,
//! parent/child structure, and derived metadata (depth, root/leaf flags) are
//! synthesized into a per-tree relational schema; secondary indexes on
//! JSON-list or JSON-path fields are maintained by triggers and generated
//! columns. See `TreeBuilder` to construct a tree and `Tree` for the
//! read/write surface.

pub mod builder;
pub mod engine;
pub mod error;
pub mod query;
pub mod schema;
pub mod tree;
pub mod value;

mod loaders;

pub use builder::{BuildOptions, IndexSpec, Source, TreeBuilder, TreeModel};
pub use engine::{Database, Engine, EngineConfig};
pub use error::{Result, TreeError};
pub use loaders::{infer_loader, JsonArrayLoader, JsonLinesLoader, LineMode, RecordSource};
pub use query::{Axis, Compare, Conditions, Op, OnConflict, Order, Predicate, PredicateTerm, QueryCompiler};
pub use schema::{Field, ForeignKey, IndexTable, MetadataTable, Namespace, NodesTable, SqlTable, TreeSchema};
pub use tree::{Relation, Tree, TreeInfo, TreeOptions};
pub use value::{FieldKind, Record, Value};

//! Interdependent SQL test fixtures.
//!
//! Describe rows per table, use `Table:index[:field]` tokens where foreign
//! keys go, and [`FixtureGenerator::create`] inserts everything in dependency
//! order and hands back the hydrated records in the shape they were given.
//!
//! ```
//! use sql_fixtures::adapter::MemoryAdapter;
//! use sql_fixtures::{FixtureGenerator, Spec, Value};
//!
//! let spec = Spec::from_json_str(
//!     r#"{"Users": {"username": "bob"}, "Items": {"name": "i1", "userId": "Users:0"}}"#,
//! )
//! .unwrap();
//! let generator = FixtureGenerator::with_adapter(MemoryAdapter::new());
//! let fixtures = generator.create(&spec).unwrap();
//! assert_eq!(fixtures["Items"][0]["userId"], fixtures["Users"][0]["id"]);
//! assert_eq!(fixtures["Users"][0]["username"], Value::from("bob"));
//! ```

pub mod adapter;
pub mod config;
pub mod error;
pub mod generator;
pub mod materialize;
pub mod prioritize;
pub mod query;
pub mod reference;
pub mod resolve;
pub mod spec;
pub mod spec_id;
pub mod value;

pub use config::{ConnectionConfig, GenerateOptions, GeneratorConfig};
pub use error::{FixtureError, Result};
pub use generator::{AdapterSource, FixtureGenerator, GenerateReport, GeneratorRegistry};
pub use spec::{Fixtures, Spec};
pub use value::{Record, Value};

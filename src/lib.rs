//! acctest - lifecycle verification for declarative cloud resources
//!
//! Drives a resource through create, update, import and destroy against the
//! real backing service and checks each transition, including that nothing
//! is left behind.

pub mod assertion;
pub mod config;
pub mod destroy;
pub mod error;
pub mod lifecycle;
pub mod output;
pub mod precheck;
pub mod probe;
pub mod render;
pub mod resource;
pub mod retry;
pub mod scenarios;
pub mod schema;
pub mod terraform;
pub mod testing;

pub use assertion::{Assertion, AssertionFailure};
pub use error::{HarnessError, RunError};
pub use lifecycle::{LifecycleRunner, RunReport, Step, TestCase};
pub use resource::{Address, ResourceSpec, Value};
pub use schema::Schema;

//! Drover core library: spec loading, schema resolution, data synthesis, and
//! the lifecycle drive loop shared by the CLI.

#[path = "model/catalog.rs"]
mod catalog;
#[path = "platform/config.rs"]
mod config;
#[path = "runtime/coverage.rs"]
mod coverage;
#[path = "runtime/driver.rs"]
mod driver;
#[path = "platform/duration.rs"]
mod duration;
#[path = "platform/error.rs"]
mod error;
#[path = "runtime/generate.rs"]
mod generate;
#[path = "runtime/orchestrate.rs"]
mod orchestrate;
#[path = "model/reporting.rs"]
mod reporting;
#[path = "model/schema.rs"]
mod schema;
#[path = "model/spec.rs"]
mod spec;

pub use catalog::*;
pub use config::*;
pub use coverage::*;
pub use driver::*;
pub use duration::*;
pub use error::*;
pub use generate::*;
pub use orchestrate::*;
pub use reporting::*;
pub use schema::*;
pub use spec::*;

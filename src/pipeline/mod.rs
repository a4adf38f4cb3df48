//! Sequential stage pipeline used to protect media
//!
//! Each stage reads from and writes to a shared [`PipelineContext`]; the
//! executor times and logs every stage and stops at the first failure.
//!
//! # Example
//! ```
//! use hemlock_lib::error::HemlockResult;
//! use hemlock_lib::pipeline::{Pipeline, PipelineContext, PipelineStage};
//!
//! struct Upper;
//!
//! impl PipelineStage for Upper {
//!     fn execute(&self, context: &mut PipelineContext) -> HemlockResult<()> {
//!         let input = context.get_string("input")?;
//!         context.set_string("output", input.to_uppercase());
//!         Ok(())
//!     }
//!
//!     fn name(&self) -> &str {
//!         "Upper"
//!     }
//! }
//!
//! let pipeline = Pipeline::builder("demo").add_stage(Upper).build();
//! let mut context = PipelineContext::new("run-1");
//! context.set_string("input", "hello");
//! pipeline.run(&mut context).unwrap();
//! assert_eq!(context.get_string("output").unwrap(), "HELLO");
//! ```

pub mod context;
pub mod core;
pub mod executor;
pub mod stages;

pub use context::PipelineContext;
pub use core::{PipelineResult, PipelineStage, StageResult};
pub use executor::{Pipeline, PipelineBuilder};

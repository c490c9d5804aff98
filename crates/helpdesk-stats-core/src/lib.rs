//! # Helpdesk Stats Core
//!
//! Storage-independent logic for Helpdesk Stats: the closed set of
//! category sections, the filter algebra and its compiler, time
//! bucketing for charts, and the taxonomy model types shared by the
//! draft/publish workflow.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or other
//! runtime dependencies. The compiler emits SQL text and bind
//! parameters; executing them is the caller's job.

pub mod bucket;
pub mod error;
pub mod filter;
pub mod models;
pub mod option_id;
pub mod section;

pub use error::StatsError;
pub use filter::{CompiledFilter, FilterGroup, FilterSpec, SectionValues};
pub use option_id::OptionId;
pub use section::Section;

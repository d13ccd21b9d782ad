//! Day-worker pool: discover a page's own date-parameterised API traffic
//! and replay it in parallel across a week.

mod discovery;
mod replay;

pub use discovery::{discover_patterns, is_well_formed};
pub use replay::fetch_week_parallel;

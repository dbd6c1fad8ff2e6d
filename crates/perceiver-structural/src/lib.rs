//! Structural perception of HTML snapshots.
//!
//! [`HtmlReducer`] compresses a raw page into a [`ReducedPage`]: a bounded,
//! deterministic list of addressable elements suitable for prompting.

mod address;
pub mod metrics;
pub mod model;
pub mod reducer;
pub mod render;
mod rules;

pub use model::{ElementRef, ReducedPage, ReductionDiagnostics};
pub use reducer::HtmlReducer;
pub use render::{render_element, render_tree};

//! UI-facing view of a call graph
//!
//! Depth, reference-counted visibility, focus and layout placeholders for
//! an external renderer. Drawing and hit-testing happen elsewhere.

mod filter;
mod graph;
mod layout;

pub use filter::FunctionFilter;
pub use graph::{NodeDetails, PresentationGraph, PresentationNode};
pub use layout::{ScrollDirection, Vec2, ViewState, Viewport};

//! Call-graph extraction and exploration for C and C++ sources.
//!
//! A source buffer goes through [`core::SourceAnalyzer`] to a
//! [`core::ParsedUnit`], then [`core::CallGraphExtractor`] to a
//! [`core::CallGraph`], and finally into a [`core::PresentationGraph`] that a
//! renderer drives. [`core::Engine`] runs the pipeline and owns its result.

pub mod config;
pub mod core;
pub mod error;

pub use crate::config::Config;
pub use crate::error::{CallscopeError, Result};

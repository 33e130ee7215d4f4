//! Schema-driven HTML extraction
//!
//! - `selection`: node sets and CSS selector handling
//! - `resolver`: selector path resolution and text cleaning
//! - `interpreter`: schema evaluation
//! - `registry`: custom property types

mod interpreter;
mod registry;
mod resolver;
mod selection;

pub use interpreter::*;
pub use registry::*;
pub use resolver::*;
pub use selection::*;

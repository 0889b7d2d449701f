//! # Serpent Test Module
//!
//! Native functions, an opaque type and array routines exported through
//! `serpent-bridge`. The Python extension serves them as `testmodule` and
//! `testmodule.numpy`; the Rust tests call them through the same modules.
//!
//! ## Module Structure
//!
//! - [`basic`]: scalars, containers, bytes, errors and `ExportedType`
//! - [`numpy`]: array description and in-place mutation

pub mod basic;
pub mod numpy;

pub use basic::{basic_module, exported_type_class, ExportedType};
pub use numpy::numpy_module;

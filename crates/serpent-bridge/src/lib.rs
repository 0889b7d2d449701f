//! # Serpent Bridge
//!
//! Marshalling core for exposing native Rust code to a dynamically typed
//! caller.
//!
//! The crate knows nothing about any particular interpreter. A host (such
//! as the `serpent-python` extension) converts its own objects into
//! [`DynamicValue`], calls into a [`NativeModule`], and converts the result
//! back.
//!
//! ## Overview
//!
//! ```text
//! caller ──► FunctionBinding ──► bind arguments ──► FromDynamic ──► native fn
//!   ▲                                                                  │
//!   └───────────── DynamicValue ◄──── ToDynamic ◄──── return value ◄────┘
//! ```
//!
//! - Value Converter: [`ToDynamic`] / [`FromDynamic`] between native values
//!   and [`DynamicValue`]
//! - Array Bridge: [`ArrayView`] over caller-owned or native-owned numeric
//!   buffers, mutated in place
//! - Function Adapter: [`FunctionBinding`] validates arity and types before
//!   native code runs and reports native failures as errors
//! - Object Handle Wrapper: [`ObjectHandle`] owns a native instance and
//!   dispatches methods by name
//!
//! ## Design Goals
//!
//! 1. **Fail fast**: argument problems are reported before native code runs
//! 2. **No implicit coercion**: every conversion is an exact match
//! 3. **Zero-copy arrays**: native mutation lands in the caller's buffer
//! 4. **Host safety**: native failures and panics become errors
//!
//! ## Example
//!
//! ```
//! use serpent_bridge::{DynamicValue, FunctionBinding, ModuleBuilder, NativeFailure};
//!
//! fn checked_double(x: i64) -> Result<i64, NativeFailure> {
//!     x.checked_mul(2).ok_or_else(|| NativeFailure::new("integer overflow"))
//! }
//!
//! let module = ModuleBuilder::new("demo")
//!     .function(FunctionBinding::new("Double", checked_double))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(
//!     module.call("Double", vec![DynamicValue::int(21)]).unwrap(),
//!     DynamicValue::int(42)
//! );
//! assert!(module.call("Double", vec![DynamicValue::int(i64::MAX)]).is_err());
//! ```
//!
//! ## Module Structure
//!
//! - [`value`]: the `DynamicValue` tagged union
//! - [`types`]: native type descriptors used in signatures
//! - [`conversion`]: conversion traits and implementations
//! - [`array_bridge`]: dtype, layout and array views
//! - [`call`]: function bindings and argument binding
//! - [`handle`]: classes and object handles
//! - [`module`]: native module registry
//! - [`config`]: bridge configuration
//! - [`error`]: error types

pub mod array_bridge;
pub mod call;
pub mod config;
pub mod conversion;
pub mod error;
pub mod handle;
pub mod module;
pub mod types;
pub mod value;

// Re-export main types for convenience
pub use array_bridge::{ArrayElement, ArrayLayout, ArrayOrder, ArrayOwnership, ArrayView, DType, Scalar};
pub use call::{FunctionBinding, IntoReturn, Keywords, ParamSpec};
pub use config::{BridgeConfig, NamingStyle};
pub use conversion::{check_depth, Bytes, Complex, FromDynamic, MappingBuilder, ToDynamic};
pub use error::{BridgeError, BridgeResult, ErrorKind, NativeFailure};
pub use handle::{ClassBuilder, ClassDef, MethodBinding, NativeClass, ObjectHandle};
pub use module::{ModuleBuilder, NativeModule};
pub use types::NativeType;
pub use value::{DynamicValue, FloatType, IntType, MapKey, Mapping};

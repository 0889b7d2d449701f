//! Error Types for the Bridge
//!
//! Every failure that can happen between a dynamic caller and native code
//! is a [`BridgeError`]. Callers on the dynamic side see a single error
//! category; [`BridgeError::kind`] keeps the finer taxonomy inspectable.
//!
//! ## Error Categories
//!
//! - Arity errors (argument count, unknown or duplicate keywords)
//! - Type conversion errors (mismatch, numeric overflow, encoding)
//! - Array errors (unsupported dtype, incompatible buffer layout)
//! - Native failures (errors and panics raised by wrapped functions)
//! - Handle errors (use after release, reentrant borrow)

use std::fmt;

use smol_str::SmolStr;
use thiserror::Error;

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Bridge error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// Argument count or keyword names do not match the parameter spec
    #[error("{function}(): {detail}")]
    Arity {
        /// Function or method being called
        function: SmolStr,
        /// What was wrong with the arguments
        detail: String,
    },

    /// Value cannot be converted to the required native type
    #[error("type mismatch{}: expected {expected}, got {actual}", location_suffix(.location))]
    TypeMismatch {
        /// Expected type
        expected: String,
        /// Actual type received
        actual: String,
        /// Where the value sits (parameter name, element path)
        location: String,
    },

    /// Integer does not fit the target native width
    #[error("numeric overflow{}: {value} cannot be represented as {target_type}", location_suffix(.location))]
    NumericOverflow {
        /// String representation of the value
        value: String,
        /// Target type name
        target_type: String,
        /// Where the value sits (parameter name, element path)
        location: String,
    },

    /// Array element type outside the supported set
    #[error("unsupported array dtype: {dtype}")]
    UnsupportedDType {
        /// The unsupported dtype string
        dtype: String,
    },

    /// Array memory layout the bridge cannot address
    #[error("incompatible buffer layout: {reason}")]
    BufferLayout {
        /// Description of the incompatibility
        reason: String,
    },

    /// The wrapped native function signalled a failure
    #[error("{message}")]
    Native {
        /// Function or method that failed
        function: SmolStr,
        /// Message carried from the native side
        message: String,
    },

    /// Operation on a handle whose instance was already destroyed
    #[error("use of released {type_name} handle #{id}")]
    UseAfterFree {
        /// Class name of the handle
        type_name: SmolStr,
        /// Handle identifier
        id: u64,
    },

    /// Function not found in a module
    #[error("function '{function_name}' not found in module '{module_name}'")]
    FunctionNotFound {
        /// Name of the function
        function_name: String,
        /// Name of the module
        module_name: String,
    },

    /// Attribute not found on an object
    #[error("attribute '{attribute}' not found on {type_name}")]
    AttributeNotFound {
        /// Name of the attribute
        attribute: String,
        /// Class name of the object
        type_name: String,
    },

    /// Object is read-only or already borrowed by an active call
    #[error("cannot mutate borrowed object: {context}")]
    BorrowedMutation {
        /// Context description
        context: String,
    },

    /// Bytes that had to be text were not valid UTF-8
    #[error("string encoding error: {message}")]
    EncodingError {
        /// Error message
        message: String,
    },

    /// Configuration could not be loaded
    #[error("configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },
}

fn location_suffix(location: &str) -> String {
    if location.is_empty() {
        String::new()
    } else {
        format!(" at {}", location)
    }
}

/// Coarse classification of a [`BridgeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Wrong argument count or keyword names
    Arity,
    /// Value cannot convert to the required native type
    TypeMismatch,
    /// Array element type outside the supported set
    UnsupportedDType,
    /// Unsupported array memory layout
    BufferLayout,
    /// Failure signalled by native code
    Native,
    /// Operation on a released handle
    UseAfterFree,
    /// Unknown function, class or attribute
    Lookup,
    /// Read-only data or reentrant access
    Borrow,
    /// Invalid configuration
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Arity => "ArityError",
            ErrorKind::TypeMismatch => "TypeMismatch",
            ErrorKind::UnsupportedDType => "UnsupportedDType",
            ErrorKind::BufferLayout => "BufferLayoutError",
            ErrorKind::Native => "NativeError",
            ErrorKind::UseAfterFree => "UseAfterFree",
            ErrorKind::Lookup => "LookupError",
            ErrorKind::Borrow => "BorrowError",
            ErrorKind::Config => "ConfigError",
        };
        f.write_str(name)
    }
}

impl BridgeError {
    /// Create an arity error
    pub fn arity(function: impl Into<SmolStr>, detail: impl Into<String>) -> Self {
        BridgeError::Arity {
            function: function.into(),
            detail: detail.into(),
        }
    }

    /// Create a type mismatch error
    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        BridgeError::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
            location: String::new(),
        }
    }

    /// Create the error for containers nested more than `max_depth` levels deep
    pub fn nesting_too_deep(max_depth: usize) -> Self {
        Self::type_mismatch(
            format!("at most {} levels of nesting", max_depth),
            "deeper nesting",
        )
    }

    /// Create a numeric overflow error
    pub fn numeric_overflow(value: impl Into<String>, target_type: impl Into<String>) -> Self {
        BridgeError::NumericOverflow {
            value: value.into(),
            target_type: target_type.into(),
            location: String::new(),
        }
    }

    /// Create an unsupported dtype error
    pub fn unsupported_dtype(dtype: impl Into<String>) -> Self {
        BridgeError::UnsupportedDType {
            dtype: dtype.into(),
        }
    }

    /// Create a buffer layout error
    pub fn buffer_layout(reason: impl Into<String>) -> Self {
        BridgeError::BufferLayout {
            reason: reason.into(),
        }
    }

    /// Create a native failure for `function`
    pub fn native(function: impl Into<SmolStr>, message: impl Into<String>) -> Self {
        BridgeError::Native {
            function: function.into(),
            message: message.into(),
        }
    }

    /// Create a use-after-free error
    pub fn use_after_free(type_name: impl Into<SmolStr>, id: u64) -> Self {
        BridgeError::UseAfterFree {
            type_name: type_name.into(),
            id,
        }
    }

    /// Create a function not found error
    pub fn function_not_found(
        function_name: impl Into<String>,
        module_name: impl Into<String>,
    ) -> Self {
        BridgeError::FunctionNotFound {
            function_name: function_name.into(),
            module_name: module_name.into(),
        }
    }

    /// Create an attribute not found error
    pub fn attribute_not_found(attribute: impl Into<String>, type_name: impl Into<String>) -> Self {
        BridgeError::AttributeNotFound {
            attribute: attribute.into(),
            type_name: type_name.into(),
        }
    }

    /// Create a borrowed mutation error
    pub fn borrowed_mutation(context: impl Into<String>) -> Self {
        BridgeError::BorrowedMutation {
            context: context.into(),
        }
    }

    /// Create an encoding error
    pub fn encoding_error(message: impl Into<String>) -> Self {
        BridgeError::EncodingError {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        BridgeError::Config {
            message: message.into(),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::Arity { .. } => ErrorKind::Arity,
            BridgeError::TypeMismatch { .. }
            | BridgeError::NumericOverflow { .. }
            | BridgeError::EncodingError { .. } => ErrorKind::TypeMismatch,
            BridgeError::UnsupportedDType { .. } => ErrorKind::UnsupportedDType,
            BridgeError::BufferLayout { .. } => ErrorKind::BufferLayout,
            BridgeError::Native { .. } => ErrorKind::Native,
            BridgeError::UseAfterFree { .. } => ErrorKind::UseAfterFree,
            BridgeError::FunctionNotFound { .. } | BridgeError::AttributeNotFound { .. } => {
                ErrorKind::Lookup
            }
            BridgeError::BorrowedMutation { .. } => ErrorKind::Borrow,
            BridgeError::Config { .. } => ErrorKind::Config,
        }
    }

    /// Check if this is a type-related error
    pub fn is_type_error(&self) -> bool {
        self.kind() == ErrorKind::TypeMismatch
    }

    /// Check if this error was raised by native code
    pub fn is_native(&self) -> bool {
        self.kind() == ErrorKind::Native
    }

    /// Check if this is an argument count/keyword error
    pub fn is_arity_error(&self) -> bool {
        self.kind() == ErrorKind::Arity
    }

    /// Prefix the location of a conversion error with `segment`.
    ///
    /// Containers call this on their way out so the final location reads
    /// outermost-first, e.g. `arg[2]["key"]`.
    pub fn within(mut self, segment: &str) -> Self {
        match &mut self {
            BridgeError::TypeMismatch { location, .. }
            | BridgeError::NumericOverflow { location, .. } => {
                let joined = if location.is_empty() || location.starts_with('[') {
                    format!("{}{}", segment, location)
                } else {
                    format!("{}.{}", segment, location)
                };
                *location = joined;
            }
            _ => {}
        }
        self
    }

    /// Attach the failing function's name to a native failure that lacks one.
    pub fn in_function(mut self, name: &str) -> Self {
        if let BridgeError::Native { function, .. } = &mut self {
            if function.is_empty() {
                *function = SmolStr::new(name);
            }
        }
        self
    }
}

/// Failure value returned by native functions.
///
/// Any `E: Display` works as the error half of a native `Result`; this type
/// is the ready-made one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeFailure {
    message: String,
}

impl NativeFailure {
    /// Create a failure with a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The failure message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for NativeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for NativeFailure {}

impl From<&str> for NativeFailure {
    fn from(message: &str) -> Self {
        NativeFailure::new(message)
    }
}

impl From<String> for NativeFailure {
    fn from(message: String) -> Self {
        NativeFailure::new(message)
    }
}

//! Native type descriptors.
//!
//! A [`NativeType`] describes what a parameter accepts or a function
//! returns. The Function Adapter uses it for signatures and documentation;
//! the conversions in [`crate::conversion`] report it for every type they
//! handle.

use std::fmt;

use smol_str::SmolStr;

use crate::value::{FloatType, IntType};

/// Static type of a native parameter or return value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NativeType {
    /// No value
    None,
    /// Boolean
    Bool,
    /// Integer of the given width
    Int(IntType),
    /// Float of the given width
    Float(FloatType),
    /// Complex number with parts of the given width
    Complex(FloatType),
    /// Text
    Str,
    /// Raw bytes
    Bytes,
    /// Homogeneous sequence
    Sequence(Box<NativeType>),
    /// Mapping from key type to value type
    Mapping(Box<NativeType>, Box<NativeType>),
    /// Multi-dimensional numeric array
    Array,
    /// Handle to an instance of the named class
    Object(SmolStr),
    /// Any value, passed through unconverted
    Any,
}

impl NativeType {
    /// Python-style type hint for signatures and docs
    pub fn type_hint(&self) -> String {
        match self {
            NativeType::None => "None".to_string(),
            NativeType::Bool => "bool".to_string(),
            NativeType::Int(_) => "int".to_string(),
            NativeType::Float(_) => "float".to_string(),
            NativeType::Complex(_) => "complex".to_string(),
            NativeType::Str => "str".to_string(),
            NativeType::Bytes => "bytes".to_string(),
            NativeType::Sequence(elem) => format!("List[{}]", elem.type_hint()),
            NativeType::Mapping(key, value) => {
                format!("Dict[{}, {}]", key.type_hint(), value.type_hint())
            }
            NativeType::Array => "numpy.ndarray".to_string(),
            NativeType::Object(class) => class.to_string(),
            NativeType::Any => "Any".to_string(),
        }
    }

    /// Check if this is the no-value type
    pub fn is_none(&self) -> bool {
        matches!(self, NativeType::None)
    }
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeType::Int(int_type) => write!(f, "{}", int_type.name()),
            NativeType::Float(float_type) => write!(f, "{}", float_type.name()),
            NativeType::Complex(float_type) => write!(f, "Complex<{}>", float_type.name()),
            other => write!(f, "{}", other.type_hint()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_hints() {
        assert_eq!(NativeType::Int(IntType::U32).type_hint(), "int");
        assert_eq!(NativeType::Float(FloatType::F32).type_hint(), "float");
        assert_eq!(
            NativeType::Sequence(Box::new(NativeType::Int(IntType::I64))).type_hint(),
            "List[int]"
        );
        assert_eq!(
            NativeType::Mapping(
                Box::new(NativeType::Str),
                Box::new(NativeType::Int(IntType::I64))
            )
            .type_hint(),
            "Dict[str, int]"
        );
        assert_eq!(NativeType::Object("ExportedType".into()).type_hint(), "ExportedType");
        assert_eq!(NativeType::Array.type_hint(), "numpy.ndarray");
    }

    #[test]
    fn test_display_uses_native_names() {
        assert_eq!(NativeType::Int(IntType::I16).to_string(), "i16");
        assert_eq!(NativeType::Float(FloatType::F64).to_string(), "f64");
        assert_eq!(NativeType::Bytes.to_string(), "bytes");
        assert_eq!(NativeType::Complex(FloatType::F32).to_string(), "Complex<f32>");
        assert_eq!(NativeType::Complex(FloatType::F64).type_hint(), "complex");
    }
}

//! Dynamic Value Representation
//!
//! [`DynamicValue`] is the tagged union every value crossing the boundary
//! travels in. It maps the caller's dynamic type system to a closed set of
//! variants that native code matches on exhaustively.
//!
//! ## Variants
//!
//! - `None`, `Bool`, `Int`, `Float`, `Complex`: scalars; numbers carry the
//!   native width they were produced from (or `Unbounded`/`F64` when they
//!   come from the dynamic side)
//! - `Str`, `Bytes`: text and raw byte sequences, never converted into
//!   one another implicitly
//! - `Sequence`, `Mapping`: containers, converted element-wise
//! - `Object`: opaque handle to a native instance
//! - `Array`: view over a multi-dimensional numeric buffer

use std::fmt;

use indexmap::IndexMap;
use smol_str::SmolStr;

use crate::array_bridge::ArrayView;
use crate::error::{BridgeError, BridgeResult};
use crate::handle::ObjectHandle;

// ============================================================================
// Width tags
// ============================================================================

/// Integer width and signedness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntType {
    /// Signed 8-bit
    I8,
    /// Signed 16-bit
    I16,
    /// Signed 32-bit
    I32,
    /// Signed 64-bit
    I64,
    /// Unsigned 8-bit
    U8,
    /// Unsigned 16-bit
    U16,
    /// Unsigned 32-bit
    U32,
    /// Unsigned 64-bit
    U64,
    /// Integer from the dynamic side with no declared width
    Unbounded,
}

impl IntType {
    /// Width in bits, `None` for `Unbounded`
    pub fn bits(&self) -> Option<u32> {
        match self {
            IntType::I8 | IntType::U8 => Some(8),
            IntType::I16 | IntType::U16 => Some(16),
            IntType::I32 | IntType::U32 => Some(32),
            IntType::I64 | IntType::U64 => Some(64),
            IntType::Unbounded => None,
        }
    }

    /// Check if the type is signed
    pub fn is_signed(&self) -> bool {
        !matches!(self, IntType::U8 | IntType::U16 | IntType::U32 | IntType::U64)
    }

    /// Inclusive value range representable by this type
    pub fn range(&self) -> (i128, i128) {
        match self {
            IntType::I8 => (i8::MIN as i128, i8::MAX as i128),
            IntType::I16 => (i16::MIN as i128, i16::MAX as i128),
            IntType::I32 => (i32::MIN as i128, i32::MAX as i128),
            IntType::I64 => (i64::MIN as i128, i64::MAX as i128),
            IntType::U8 => (0, u8::MAX as i128),
            IntType::U16 => (0, u16::MAX as i128),
            IntType::U32 => (0, u32::MAX as i128),
            IntType::U64 => (0, u64::MAX as i128),
            IntType::Unbounded => (i128::MIN, i128::MAX),
        }
    }

    /// Check whether `value` fits this type
    pub fn contains(&self, value: i128) -> bool {
        let (min, max) = self.range();
        value >= min && value <= max
    }

    /// Native type name
    pub fn name(&self) -> &'static str {
        match self {
            IntType::I8 => "i8",
            IntType::I16 => "i16",
            IntType::I32 => "i32",
            IntType::I64 => "i64",
            IntType::U8 => "u8",
            IntType::U16 => "u16",
            IntType::U32 => "u32",
            IntType::U64 => "u64",
            IntType::Unbounded => "int",
        }
    }
}

/// Floating point width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatType {
    /// IEEE 754 single precision
    F32,
    /// IEEE 754 double precision
    F64,
}

impl FloatType {
    /// Native type name
    pub fn name(&self) -> &'static str {
        match self {
            FloatType::F32 => "f32",
            FloatType::F64 => "f64",
        }
    }
}

// ============================================================================
// MapKey
// ============================================================================

/// Hashable subset of [`DynamicValue`] usable as a mapping key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MapKey {
    /// Boolean key
    Bool(bool),
    /// Integer key
    Int(i128),
    /// Text key
    Str(SmolStr),
    /// Byte-string key
    Bytes(Vec<u8>),
}

impl MapKey {
    /// Get the caller-side type name of this key
    pub fn type_name(&self) -> &'static str {
        match self {
            MapKey::Bool(_) => "bool",
            MapKey::Int(_) => "int",
            MapKey::Str(_) => "str",
            MapKey::Bytes(_) => "bytes",
        }
    }

    /// Lift the key back into a value
    pub fn to_value(&self) -> DynamicValue {
        match self {
            MapKey::Bool(b) => DynamicValue::Bool(*b),
            MapKey::Int(n) => DynamicValue::Int(*n, IntType::Unbounded),
            MapKey::Str(s) => DynamicValue::Str(s.clone()),
            MapKey::Bytes(b) => DynamicValue::Bytes(b.clone()),
        }
    }

    /// Try to use a value as a key
    pub fn from_value(value: &DynamicValue) -> BridgeResult<Self> {
        match value {
            DynamicValue::Bool(b) => Ok(MapKey::Bool(*b)),
            DynamicValue::Int(n, _) => Ok(MapKey::Int(*n)),
            DynamicValue::Str(s) => Ok(MapKey::Str(s.clone())),
            DynamicValue::Bytes(b) => Ok(MapKey::Bytes(b.clone())),
            other => Err(BridgeError::type_mismatch(
                "hashable key",
                other.type_name(),
            )),
        }
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

impl From<&str> for MapKey {
    fn from(s: &str) -> Self {
        MapKey::Str(SmolStr::new(s))
    }
}

/// Ordered mapping used by [`DynamicValue::Mapping`]
pub type Mapping = IndexMap<MapKey, DynamicValue>;

// ============================================================================
// DynamicValue
// ============================================================================

/// Any value crossing the dynamic/native boundary.
#[derive(Debug, Clone, Default)]
pub enum DynamicValue {
    /// Absence of a value; also the result of functions returning nothing
    #[default]
    None,

    /// Boolean
    Bool(bool),

    /// Integer with the width it was produced from
    Int(i128, IntType),

    /// Floating point value (stored widened) with its native width
    Float(f64, FloatType),

    /// Complex number as real and imaginary parts; the width is per part
    Complex(f64, f64, FloatType),

    /// Text
    Str(SmolStr),

    /// Raw bytes
    Bytes(Vec<u8>),

    /// Ordered sequence
    Sequence(Vec<DynamicValue>),

    /// Key-value mapping, insertion ordered
    Mapping(Mapping),

    /// Opaque handle to a native instance
    Object(ObjectHandle),

    /// Multi-dimensional numeric buffer
    Array(ArrayView),
}

impl DynamicValue {
    /// Integer without a declared width (as produced by the dynamic side)
    pub fn int(value: impl Into<i128>) -> Self {
        DynamicValue::Int(value.into(), IntType::Unbounded)
    }

    /// Double precision float
    pub fn float(value: f64) -> Self {
        DynamicValue::Float(value, FloatType::F64)
    }

    /// Text value
    pub fn str(value: impl Into<SmolStr>) -> Self {
        DynamicValue::Str(value.into())
    }

    /// Get the caller-side type name for this value
    pub fn type_name(&self) -> &str {
        match self {
            DynamicValue::None => "NoneType",
            DynamicValue::Bool(_) => "bool",
            DynamicValue::Int(..) => "int",
            DynamicValue::Float(..) => "float",
            DynamicValue::Complex(..) => "complex",
            DynamicValue::Str(_) => "str",
            DynamicValue::Bytes(_) => "bytes",
            DynamicValue::Sequence(_) => "list",
            DynamicValue::Mapping(_) => "dict",
            DynamicValue::Object(handle) => handle.class_name(),
            DynamicValue::Array(_) => "ndarray",
        }
    }

    /// Check if this value is None
    pub fn is_none(&self) -> bool {
        matches!(self, DynamicValue::None)
    }

    /// Try to extract as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DynamicValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to extract as an integer
    pub fn as_int(&self) -> Option<i128> {
        match self {
            DynamicValue::Int(n, _) => Some(*n),
            _ => None,
        }
    }

    /// Try to extract as a float
    pub fn as_float(&self) -> Option<f64> {
        match self {
            DynamicValue::Float(f, _) => Some(*f),
            _ => None,
        }
    }

    /// Try to extract as `(real, imaginary)`
    pub fn as_complex(&self) -> Option<(f64, f64)> {
        match self {
            DynamicValue::Complex(re, im, _) => Some((*re, *im)),
            _ => None,
        }
    }

    /// Try to extract as text
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DynamicValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Try to extract as bytes
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            DynamicValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Try to extract as a sequence
    pub fn as_sequence(&self) -> Option<&[DynamicValue]> {
        match self {
            DynamicValue::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// Try to extract as a mapping
    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            DynamicValue::Mapping(map) => Some(map),
            _ => None,
        }
    }

    /// Try to extract as an object handle
    pub fn as_object(&self) -> Option<&ObjectHandle> {
        match self {
            DynamicValue::Object(handle) => Some(handle),
            _ => None,
        }
    }

    /// Try to extract as an array view
    pub fn as_array(&self) -> Option<&ArrayView> {
        match self {
            DynamicValue::Array(view) => Some(view),
            _ => None,
        }
    }
}

/// Values compare by content; width tags are not part of equality so that
/// `Int(84, I64)` equals the caller's `Int(84, Unbounded)`. Objects and
/// arrays compare by identity.
impl PartialEq for DynamicValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (DynamicValue::None, DynamicValue::None) => true,
            (DynamicValue::Bool(a), DynamicValue::Bool(b)) => a == b,
            (DynamicValue::Int(a, _), DynamicValue::Int(b, _)) => a == b,
            (DynamicValue::Float(a, _), DynamicValue::Float(b, _)) => a == b,
            (DynamicValue::Complex(ar, ai, _), DynamicValue::Complex(br, bi, _)) => {
                ar == br && ai == bi
            }
            (DynamicValue::Str(a), DynamicValue::Str(b)) => a == b,
            (DynamicValue::Bytes(a), DynamicValue::Bytes(b)) => a == b,
            (DynamicValue::Sequence(a), DynamicValue::Sequence(b)) => a == b,
            (DynamicValue::Mapping(a), DynamicValue::Mapping(b)) => a == b,
            (DynamicValue::Object(a), DynamicValue::Object(b)) => a.same_instance(b),
            (DynamicValue::Array(a), DynamicValue::Array(b)) => a.shares_storage(b),
            _ => false,
        }
    }
}

impl fmt::Display for DynamicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DynamicValue::None => write!(f, "None"),
            DynamicValue::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            DynamicValue::Int(n, _) => write!(f, "{}", n),
            DynamicValue::Float(n, _) => {
                if n.is_finite() && n.fract() == 0.0 {
                    write!(f, "{:.1}", n)
                } else {
                    write!(f, "{}", n)
                }
            }
            DynamicValue::Complex(re, im, _) => {
                if *re == 0.0 && re.is_sign_positive() {
                    write!(f, "{}j", im)
                } else {
                    write!(f, "({}{:+}j)", re, im)
                }
            }
            DynamicValue::Str(s) => write!(f, "'{}'", s),
            DynamicValue::Bytes(b) => {
                write!(f, "b'")?;
                for byte in b {
                    match byte {
                        b'\\' => write!(f, "\\\\")?,
                        b'\'' => write!(f, "\\'")?,
                        0x20..=0x7e => write!(f, "{}", *byte as char)?,
                        _ => write!(f, "\\x{:02x}", byte)?,
                    }
                }
                write!(f, "'")
            }
            DynamicValue::Sequence(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            DynamicValue::Mapping(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            DynamicValue::Object(handle) => write!(f, "<{} object #{}>", handle.class_name(), handle.id()),
            DynamicValue::Array(view) => {
                write!(f, "<ndarray dtype={} shape={:?}>", view.dtype(), view.shape())
            }
        }
    }
}

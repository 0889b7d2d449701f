//! Value Conversion Traits
//!
//! This module provides the Value Converter: traits for converting between
//! native Rust values and [`DynamicValue`].
//!
//! ## Traits
//!
//! - `ToDynamic`: native value to dynamic value (infallible)
//! - `FromDynamic`: dynamic value to native value (fails with a type error)
//! - `KeyConvert`: native value usable as a mapping key
//!
//! ## Rules
//!
//! 1. Matching is exact: no bool/int/float/str/bytes coercions. The one
//!    widening is into [`Complex`], which takes any real number
//! 2. Integers keep their value exactly; narrowing into a smaller width
//!    fails with `NumericOverflow` instead of truncating
//! 3. Floats narrow and widen with IEEE 754 `as` semantics
//! 4. Containers convert element-wise and fail atomically, reporting the
//!    path of the offending element
//! 5. Bytes are copied verbatim, never decoded

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use indexmap::IndexMap;
use smol_str::SmolStr;

use crate::array_bridge::ArrayView;
use crate::error::{BridgeError, BridgeResult};
use crate::handle::ObjectHandle;
use crate::types::NativeType;
use crate::value::{DynamicValue, FloatType, IntType, MapKey, Mapping};

// ============================================================================
// Traits
// ============================================================================

/// Trait for converting native values to dynamic values.
///
/// # Example
///
/// ```
/// use serpent_bridge::{DynamicValue, ToDynamic};
///
/// let value = 42i32.to_dynamic();
/// assert_eq!(value, DynamicValue::int(42));
/// ```
pub trait ToDynamic {
    /// Convert this value to a dynamic value.
    fn to_dynamic(&self) -> DynamicValue;

    /// Type this conversion produces, for signatures
    fn produced_type() -> NativeType;
}

/// Trait for converting dynamic values to native values.
pub trait FromDynamic: Sized {
    /// Try to convert a dynamic value to this type.
    fn from_dynamic(value: &DynamicValue) -> BridgeResult<Self>;

    /// Type this conversion accepts, for signatures
    fn accepted_type() -> NativeType;
}

/// Trait for native values that can key a mapping.
pub trait KeyConvert: Sized {
    /// Convert to a mapping key
    fn to_key(&self) -> MapKey;

    /// Convert from a mapping key
    fn from_key(key: &MapKey) -> BridgeResult<Self>;

    /// Key type, for signatures
    fn key_type() -> NativeType;
}

/// Raw byte sequence.
///
/// `Vec<u8>` converts as a sequence of integers; wrap it in `Bytes` to
/// cross the boundary as a byte string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Bytes(pub Vec<u8>);

impl Bytes {
    /// Borrow the bytes
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Take the bytes
    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl From<&[u8]> for Bytes {
    fn from(bytes: &[u8]) -> Self {
        Bytes(bytes.to_vec())
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(bytes: Vec<u8>) -> Self {
        Bytes(bytes)
    }
}

/// Complex number with `re` and `im` parts of type `T` (`f32` or `f64`).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Complex<T> {
    pub re: T,
    pub im: T,
}

impl<T> Complex<T> {
    pub fn new(re: T, im: T) -> Self {
        Self { re, im }
    }
}

impl<T: ToDynamic + ?Sized> ToDynamic for &T {
    fn to_dynamic(&self) -> DynamicValue {
        (**self).to_dynamic()
    }

    fn produced_type() -> NativeType {
        T::produced_type()
    }
}

// ============================================================================
// Scalars
// ============================================================================

impl ToDynamic for () {
    fn to_dynamic(&self) -> DynamicValue {
        DynamicValue::None
    }

    fn produced_type() -> NativeType {
        NativeType::None
    }
}

impl FromDynamic for () {
    fn from_dynamic(value: &DynamicValue) -> BridgeResult<Self> {
        match value {
            DynamicValue::None => Ok(()),
            other => Err(BridgeError::type_mismatch("None", other.type_name())),
        }
    }

    fn accepted_type() -> NativeType {
        NativeType::None
    }
}

impl ToDynamic for bool {
    fn to_dynamic(&self) -> DynamicValue {
        DynamicValue::Bool(*self)
    }

    fn produced_type() -> NativeType {
        NativeType::Bool
    }
}

impl FromDynamic for bool {
    fn from_dynamic(value: &DynamicValue) -> BridgeResult<Self> {
        match value {
            DynamicValue::Bool(b) => Ok(*b),
            other => Err(BridgeError::type_mismatch("bool", other.type_name())),
        }
    }

    fn accepted_type() -> NativeType {
        NativeType::Bool
    }
}

macro_rules! int_conversions {
    ($($ty:ty => $tag:ident),* $(,)?) => {
        $(
            impl ToDynamic for $ty {
                fn to_dynamic(&self) -> DynamicValue {
                    DynamicValue::Int(*self as i128, IntType::$tag)
                }

                fn produced_type() -> NativeType {
                    NativeType::Int(IntType::$tag)
                }
            }

            impl FromDynamic for $ty {
                fn from_dynamic(value: &DynamicValue) -> BridgeResult<Self> {
                    match value {
                        DynamicValue::Int(n, _) => <$ty>::try_from(*n).map_err(|_| {
                            BridgeError::numeric_overflow(n.to_string(), stringify!($ty))
                        }),
                        other => Err(BridgeError::type_mismatch("int", other.type_name())),
                    }
                }

                fn accepted_type() -> NativeType {
                    NativeType::Int(IntType::$tag)
                }
            }

            impl KeyConvert for $ty {
                fn to_key(&self) -> MapKey {
                    MapKey::Int(*self as i128)
                }

                fn from_key(key: &MapKey) -> BridgeResult<Self> {
                    match key {
                        MapKey::Int(n) => <$ty>::try_from(*n).map_err(|_| {
                            BridgeError::numeric_overflow(n.to_string(), stringify!($ty))
                        }),
                        other => Err(BridgeError::type_mismatch("int", other.type_name())),
                    }
                }

                fn key_type() -> NativeType {
                    NativeType::Int(IntType::$tag)
                }
            }
        )*
    };
}

int_conversions! {
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    isize => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    usize => U64,
}

impl ToDynamic for f32 {
    fn to_dynamic(&self) -> DynamicValue {
        DynamicValue::Float(*self as f64, FloatType::F32)
    }

    fn produced_type() -> NativeType {
        NativeType::Float(FloatType::F32)
    }
}

impl FromDynamic for f32 {
    fn from_dynamic(value: &DynamicValue) -> BridgeResult<Self> {
        match value {
            // IEEE narrowing: out-of-range magnitudes become infinities
            DynamicValue::Float(f, _) => Ok(*f as f32),
            other => Err(BridgeError::type_mismatch("float", other.type_name())),
        }
    }

    fn accepted_type() -> NativeType {
        NativeType::Float(FloatType::F32)
    }
}

impl ToDynamic for f64 {
    fn to_dynamic(&self) -> DynamicValue {
        DynamicValue::Float(*self, FloatType::F64)
    }

    fn produced_type() -> NativeType {
        NativeType::Float(FloatType::F64)
    }
}

impl FromDynamic for f64 {
    fn from_dynamic(value: &DynamicValue) -> BridgeResult<Self> {
        match value {
            DynamicValue::Float(f, _) => Ok(*f),
            other => Err(BridgeError::type_mismatch("float", other.type_name())),
        }
    }

    fn accepted_type() -> NativeType {
        NativeType::Float(FloatType::F64)
    }
}

// ============================================================================
// Text and bytes
// ============================================================================

impl ToDynamic for str {
    fn to_dynamic(&self) -> DynamicValue {
        DynamicValue::Str(SmolStr::new(self))
    }

    fn produced_type() -> NativeType {
        NativeType::Str
    }
}

impl ToDynamic for String {
    fn to_dynamic(&self) -> DynamicValue {
        DynamicValue::Str(SmolStr::new(self))
    }

    fn produced_type() -> NativeType {
        NativeType::Str
    }
}

impl FromDynamic for String {
    fn from_dynamic(value: &DynamicValue) -> BridgeResult<Self> {
        match value {
            DynamicValue::Str(s) => Ok(s.to_string()),
            other => Err(BridgeError::type_mismatch("str", other.type_name())),
        }
    }

    fn accepted_type() -> NativeType {
        NativeType::Str
    }
}

impl ToDynamic for SmolStr {
    fn to_dynamic(&self) -> DynamicValue {
        DynamicValue::Str(self.clone())
    }

    fn produced_type() -> NativeType {
        NativeType::Str
    }
}

impl FromDynamic for SmolStr {
    fn from_dynamic(value: &DynamicValue) -> BridgeResult<Self> {
        match value {
            DynamicValue::Str(s) => Ok(s.clone()),
            other => Err(BridgeError::type_mismatch("str", other.type_name())),
        }
    }

    fn accepted_type() -> NativeType {
        NativeType::Str
    }
}

impl KeyConvert for String {
    fn to_key(&self) -> MapKey {
        MapKey::Str(SmolStr::new(self))
    }

    fn from_key(key: &MapKey) -> BridgeResult<Self> {
        match key {
            MapKey::Str(s) => Ok(s.to_string()),
            other => Err(BridgeError::type_mismatch("str", other.type_name())),
        }
    }

    fn key_type() -> NativeType {
        NativeType::Str
    }
}

impl KeyConvert for SmolStr {
    fn to_key(&self) -> MapKey {
        MapKey::Str(self.clone())
    }

    fn from_key(key: &MapKey) -> BridgeResult<Self> {
        match key {
            MapKey::Str(s) => Ok(s.clone()),
            other => Err(BridgeError::type_mismatch("str", other.type_name())),
        }
    }

    fn key_type() -> NativeType {
        NativeType::Str
    }
}

impl KeyConvert for bool {
    fn to_key(&self) -> MapKey {
        MapKey::Bool(*self)
    }

    fn from_key(key: &MapKey) -> BridgeResult<Self> {
        match key {
            MapKey::Bool(b) => Ok(*b),
            other => Err(BridgeError::type_mismatch("bool", other.type_name())),
        }
    }

    fn key_type() -> NativeType {
        NativeType::Bool
    }
}

impl ToDynamic for Bytes {
    fn to_dynamic(&self) -> DynamicValue {
        DynamicValue::Bytes(self.0.clone())
    }

    fn produced_type() -> NativeType {
        NativeType::Bytes
    }
}

impl FromDynamic for Bytes {
    fn from_dynamic(value: &DynamicValue) -> BridgeResult<Self> {
        match value {
            DynamicValue::Bytes(b) => Ok(Bytes(b.clone())),
            other => Err(BridgeError::type_mismatch("bytes", other.type_name())),
        }
    }

    fn accepted_type() -> NativeType {
        NativeType::Bytes
    }
}

macro_rules! complex_conversions {
    ($($ty:ty => $tag:ident),* $(,)?) => {
        $(
            impl ToDynamic for Complex<$ty> {
                fn to_dynamic(&self) -> DynamicValue {
                    DynamicValue::Complex(self.re as f64, self.im as f64, FloatType::$tag)
                }

                fn produced_type() -> NativeType {
                    NativeType::Complex(FloatType::$tag)
                }
            }

            impl FromDynamic for Complex<$ty> {
                fn from_dynamic(value: &DynamicValue) -> BridgeResult<Self> {
                    let (re, im) = match value {
                        DynamicValue::Complex(re, im, _) => (*re, *im),
                        DynamicValue::Float(f, _) => (*f, 0.0),
                        DynamicValue::Int(n, _) => (*n as f64, 0.0),
                        other => {
                            return Err(BridgeError::type_mismatch("complex", other.type_name()))
                        }
                    };
                    Ok(Complex::new(re as $ty, im as $ty))
                }

                fn accepted_type() -> NativeType {
                    NativeType::Complex(FloatType::$tag)
                }
            }
        )*
    };
}

complex_conversions! {
    f32 => F32,
    f64 => F64,
}

// ============================================================================
// Nesting limit
// ============================================================================

/// Fail when `value` nests containers more than `max_depth` levels deep.
///
/// The value itself sits at depth 0 and each sequence or mapping puts its
/// elements one level deeper, so `[[1]]` needs a limit of 2.
pub fn check_depth(value: &DynamicValue, max_depth: usize) -> BridgeResult<()> {
    fn walk(value: &DynamicValue, depth: usize, max_depth: usize) -> BridgeResult<()> {
        if depth > max_depth {
            return Err(BridgeError::nesting_too_deep(max_depth));
        }
        match value {
            DynamicValue::Sequence(items) => {
                for (i, item) in items.iter().enumerate() {
                    walk(item, depth + 1, max_depth).map_err(|e| e.within(&format!("[{}]", i)))?;
                }
            }
            DynamicValue::Mapping(map) => {
                for (key, item) in map {
                    walk(item, depth + 1, max_depth)
                        .map_err(|e| e.within(&format!("[{}]", key)))?;
                }
            }
            _ => {}
        }
        Ok(())
    }
    walk(value, 0, max_depth)
}

// ============================================================================
// Containers
// ============================================================================

impl<T: ToDynamic> ToDynamic for Option<T> {
    fn to_dynamic(&self) -> DynamicValue {
        match self {
            Some(v) => v.to_dynamic(),
            None => DynamicValue::None,
        }
    }

    fn produced_type() -> NativeType {
        T::produced_type()
    }
}

impl<T: FromDynamic> FromDynamic for Option<T> {
    fn from_dynamic(value: &DynamicValue) -> BridgeResult<Self> {
        match value {
            DynamicValue::None => Ok(None),
            _ => T::from_dynamic(value).map(Some),
        }
    }

    fn accepted_type() -> NativeType {
        T::accepted_type()
    }
}

impl<T: ToDynamic> ToDynamic for Vec<T> {
    fn to_dynamic(&self) -> DynamicValue {
        self.as_slice().to_dynamic()
    }

    fn produced_type() -> NativeType {
        NativeType::Sequence(Box::new(T::produced_type()))
    }
}

impl<T: ToDynamic> ToDynamic for [T] {
    fn to_dynamic(&self) -> DynamicValue {
        DynamicValue::Sequence(self.iter().map(ToDynamic::to_dynamic).collect())
    }

    fn produced_type() -> NativeType {
        NativeType::Sequence(Box::new(T::produced_type()))
    }
}

impl<T: FromDynamic> FromDynamic for Vec<T> {
    fn from_dynamic(value: &DynamicValue) -> BridgeResult<Self> {
        match value {
            DynamicValue::Sequence(items) => extract_sequence(items),
            other => Err(BridgeError::type_mismatch("list", other.type_name())),
        }
    }

    fn accepted_type() -> NativeType {
        NativeType::Sequence(Box::new(T::accepted_type()))
    }
}

impl<A: ToDynamic, B: ToDynamic> ToDynamic for (A, B) {
    fn to_dynamic(&self) -> DynamicValue {
        DynamicValue::Sequence(vec![self.0.to_dynamic(), self.1.to_dynamic()])
    }

    fn produced_type() -> NativeType {
        NativeType::Sequence(Box::new(NativeType::Any))
    }
}

impl<A: FromDynamic, B: FromDynamic> FromDynamic for (A, B) {
    fn from_dynamic(value: &DynamicValue) -> BridgeResult<Self> {
        match value {
            DynamicValue::Sequence(items) if items.len() == 2 => Ok((
                A::from_dynamic(&items[0]).map_err(|e| e.within("[0]"))?,
                B::from_dynamic(&items[1]).map_err(|e| e.within("[1]"))?,
            )),
            other => Err(BridgeError::type_mismatch(
                "sequence of length 2",
                other.type_name(),
            )),
        }
    }

    fn accepted_type() -> NativeType {
        NativeType::Sequence(Box::new(NativeType::Any))
    }
}

fn mapping_to_dynamic<'a, K, V>(entries: impl Iterator<Item = (&'a K, &'a V)>) -> DynamicValue
where
    K: KeyConvert + 'a,
    V: ToDynamic + 'a,
{
    DynamicValue::Mapping(entries.map(|(k, v)| (k.to_key(), v.to_dynamic())).collect())
}

impl<K: KeyConvert + Eq + Hash, V: ToDynamic> ToDynamic for HashMap<K, V> {
    fn to_dynamic(&self) -> DynamicValue {
        mapping_to_dynamic(self.iter())
    }

    fn produced_type() -> NativeType {
        NativeType::Mapping(Box::new(K::key_type()), Box::new(V::produced_type()))
    }
}

impl<K: KeyConvert + Eq + Hash, V: FromDynamic> FromDynamic for HashMap<K, V> {
    fn from_dynamic(value: &DynamicValue) -> BridgeResult<Self> {
        match value {
            DynamicValue::Mapping(map) => extract_mapping(map),
            other => Err(BridgeError::type_mismatch("dict", other.type_name())),
        }
    }

    fn accepted_type() -> NativeType {
        NativeType::Mapping(Box::new(K::key_type()), Box::new(V::accepted_type()))
    }
}

impl<K: KeyConvert + Eq + Hash, V: ToDynamic> ToDynamic for IndexMap<K, V> {
    fn to_dynamic(&self) -> DynamicValue {
        mapping_to_dynamic(self.iter())
    }

    fn produced_type() -> NativeType {
        NativeType::Mapping(Box::new(K::key_type()), Box::new(V::produced_type()))
    }
}

impl<K: KeyConvert + Eq + Hash, V: FromDynamic> FromDynamic for IndexMap<K, V> {
    fn from_dynamic(value: &DynamicValue) -> BridgeResult<Self> {
        match value {
            DynamicValue::Mapping(map) => extract_mapping(map),
            other => Err(BridgeError::type_mismatch("dict", other.type_name())),
        }
    }

    fn accepted_type() -> NativeType {
        NativeType::Mapping(Box::new(K::key_type()), Box::new(V::accepted_type()))
    }
}

impl<K: KeyConvert + Ord, V: ToDynamic> ToDynamic for BTreeMap<K, V> {
    fn to_dynamic(&self) -> DynamicValue {
        mapping_to_dynamic(self.iter())
    }

    fn produced_type() -> NativeType {
        NativeType::Mapping(Box::new(K::key_type()), Box::new(V::produced_type()))
    }
}

impl<K: KeyConvert + Ord, V: FromDynamic> FromDynamic for BTreeMap<K, V> {
    fn from_dynamic(value: &DynamicValue) -> BridgeResult<Self> {
        match value {
            DynamicValue::Mapping(map) => extract_mapping(map),
            other => Err(BridgeError::type_mismatch("dict", other.type_name())),
        }
    }

    fn accepted_type() -> NativeType {
        NativeType::Mapping(Box::new(K::key_type()), Box::new(V::accepted_type()))
    }
}

// ============================================================================
// Pass-through types
// ============================================================================

impl ToDynamic for DynamicValue {
    fn to_dynamic(&self) -> DynamicValue {
        self.clone()
    }

    fn produced_type() -> NativeType {
        NativeType::Any
    }
}

impl FromDynamic for DynamicValue {
    fn from_dynamic(value: &DynamicValue) -> BridgeResult<Self> {
        Ok(value.clone())
    }

    fn accepted_type() -> NativeType {
        NativeType::Any
    }
}

impl ToDynamic for ObjectHandle {
    fn to_dynamic(&self) -> DynamicValue {
        DynamicValue::Object(self.clone())
    }

    fn produced_type() -> NativeType {
        NativeType::Object(SmolStr::new_inline("object"))
    }
}

impl FromDynamic for ObjectHandle {
    fn from_dynamic(value: &DynamicValue) -> BridgeResult<Self> {
        match value {
            DynamicValue::Object(handle) => Ok(handle.clone()),
            other => Err(BridgeError::type_mismatch("object", other.type_name())),
        }
    }

    fn accepted_type() -> NativeType {
        NativeType::Object(SmolStr::new_inline("object"))
    }
}

/// Arrays convert by sharing storage: the native side sees the caller's
/// buffer, not a copy.
impl ToDynamic for ArrayView {
    fn to_dynamic(&self) -> DynamicValue {
        DynamicValue::Array(self.clone())
    }

    fn produced_type() -> NativeType {
        NativeType::Array
    }
}

impl FromDynamic for ArrayView {
    fn from_dynamic(value: &DynamicValue) -> BridgeResult<Self> {
        match value {
            DynamicValue::Array(view) => Ok(view.clone()),
            other => Err(BridgeError::type_mismatch("ndarray", other.type_name())),
        }
    }

    fn accepted_type() -> NativeType {
        NativeType::Array
    }
}

// ============================================================================
// Conversion Helpers
// ============================================================================

/// Convert every element of a sequence, failing on the first bad element.
pub fn extract_sequence<T: FromDynamic>(items: &[DynamicValue]) -> BridgeResult<Vec<T>> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| T::from_dynamic(item).map_err(|e| e.within(&format!("[{}]", i))))
        .collect()
}

/// Convert every entry of a mapping into any collection of native pairs.
pub fn extract_mapping<K, V, C>(map: &Mapping) -> BridgeResult<C>
where
    K: KeyConvert,
    V: FromDynamic,
    C: FromIterator<(K, V)>,
{
    map.iter()
        .map(|(k, v)| {
            let key = K::from_key(k).map_err(|e| e.within(&format!("[{}]", k)))?;
            let value = V::from_dynamic(v).map_err(|e| e.within(&format!("[{}]", k)))?;
            Ok((key, value))
        })
        .collect()
}

/// Builder for creating mappings from key-value pairs
pub struct MappingBuilder {
    map: Mapping,
}

impl MappingBuilder {
    /// Create a new empty mapping builder
    pub fn new() -> Self {
        Self {
            map: Mapping::new(),
        }
    }

    /// Add a key-value pair
    pub fn insert(mut self, key: impl KeyConvert, value: impl ToDynamic) -> Self {
        self.map.insert(key.to_key(), value.to_dynamic());
        self
    }

    /// Build the final mapping value
    pub fn build(self) -> DynamicValue {
        DynamicValue::Mapping(self.map)
    }
}

impl Default for MappingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_to_dynamic_primitives() {
        assert_eq!(42i64.to_dynamic(), DynamicValue::Int(42, IntType::I64));
        assert!(matches!(7u16.to_dynamic(), DynamicValue::Int(7, IntType::U16)));
        assert!(matches!(1.5f32.to_dynamic(), DynamicValue::Float(f, FloatType::F32) if f == 1.5));
        assert_eq!(true.to_dynamic(), DynamicValue::Bool(true));
        assert_eq!("hello".to_dynamic(), DynamicValue::str("hello"));
        assert_eq!(().to_dynamic(), DynamicValue::None);
    }

    #[test]
    fn test_complex_parts_and_widening() {
        let value = Complex::new(1.5f32, -2.0).to_dynamic();
        assert!(matches!(value, DynamicValue::Complex(re, im, FloatType::F32) if re == 1.5 && im == -2.0));
        assert_eq!(
            Complex::<f64>::from_dynamic(&value).unwrap(),
            Complex::new(1.5, -2.0)
        );
        // Real numbers are complex numbers with no imaginary part
        assert_eq!(
            Complex::<f64>::from_dynamic(&DynamicValue::float(0.25)).unwrap(),
            Complex::new(0.25, 0.0)
        );
        assert_eq!(
            Complex::<f32>::from_dynamic(&DynamicValue::int(3)).unwrap(),
            Complex::new(3.0, 0.0)
        );
        assert_eq!(
            Complex::<f64>::from_dynamic(&DynamicValue::str("1j")).unwrap_err(),
            BridgeError::type_mismatch("complex", "str")
        );
        // ...but complex numbers are not real
        assert!(f64::from_dynamic(&value).is_err());
        assert_eq!(
            Complex::<f32>::accepted_type(),
            NativeType::Complex(FloatType::F32)
        );
    }

    #[test]
    fn test_check_depth_locates_offender() {
        let leaf = DynamicValue::Sequence(vec![DynamicValue::int(1)]);
        let mut map = Mapping::new();
        map.insert(MapKey::from("k"), DynamicValue::Sequence(vec![leaf.clone()]));
        let value = DynamicValue::Mapping(map);

        assert!(check_depth(&value, 3).is_ok());
        let err = check_depth(&value, 2).unwrap_err();
        assert_eq!(
            err.to_string(),
            "type mismatch at ['k'][0][0]: expected at most 2 levels of nesting, got deeper nesting"
        );
        assert!(check_depth(&DynamicValue::int(1), 0).is_ok());
        assert!(check_depth(&leaf, 0).is_err());
        assert!(check_depth(&DynamicValue::Sequence(vec![]), 0).is_ok());
    }

    #[test]
    fn test_u64_is_lossless() {
        let value = u64::MAX.to_dynamic();
        assert_eq!(value.as_int(), Some(u64::MAX as i128));
        assert_eq!(u64::from_dynamic(&value).unwrap(), u64::MAX);
    }

    #[test]
    fn test_narrowing_overflow_is_signalled() {
        let result = i8::from_dynamic(&DynamicValue::int(1000));
        assert!(matches!(result, Err(BridgeError::NumericOverflow { .. })));

        let result = u32::from_dynamic(&DynamicValue::int(-1));
        assert!(matches!(result, Err(BridgeError::NumericOverflow { .. })));

        assert_eq!(u8::from_dynamic(&DynamicValue::int(255)).unwrap(), 255);
        assert_eq!(i16::from_dynamic(&DynamicValue::int(-32768)).unwrap(), i16::MIN);
    }

    #[test]
    fn test_no_implicit_coercion() {
        assert!(i64::from_dynamic(&DynamicValue::Bool(true)).is_err());
        assert!(i64::from_dynamic(&DynamicValue::float(42.0)).is_err());
        assert!(f64::from_dynamic(&DynamicValue::int(42)).is_err());
        assert!(bool::from_dynamic(&DynamicValue::int(1)).is_err());
        assert!(String::from_dynamic(&DynamicValue::Bytes(b"abc".to_vec())).is_err());
        assert!(Bytes::from_dynamic(&DynamicValue::str("abc")).is_err());
    }

    #[test]
    fn test_float_narrowing_follows_ieee() {
        assert_eq!(f32::from_dynamic(&DynamicValue::float(0.1)).unwrap(), 0.1f32);
        assert_eq!(
            f32::from_dynamic(&DynamicValue::float(1e300)).unwrap(),
            f32::INFINITY
        );
        assert!(f32::from_dynamic(&DynamicValue::float(f64::NAN)).unwrap().is_nan());
    }

    #[test]
    fn test_bytes_are_raw() {
        let raw = vec![0xff, 0x00, b'a'];
        let value = Bytes(raw.clone()).to_dynamic();
        assert_eq!(value, DynamicValue::Bytes(raw.clone()));
        assert_eq!(Bytes::from_dynamic(&value).unwrap().into_inner(), raw);
    }

    #[test]
    fn test_vec_of_u8_is_a_sequence() {
        let value = vec![1u8, 2].to_dynamic();
        assert_eq!(
            value,
            DynamicValue::Sequence(vec![DynamicValue::int(1), DynamicValue::int(2)])
        );
    }

    #[test]
    fn test_sequence_fails_atomically_with_path() {
        let value = DynamicValue::Sequence(vec![
            DynamicValue::int(1),
            DynamicValue::int(2),
            DynamicValue::str("three"),
        ]);
        let err = Vec::<i64>::from_dynamic(&value).unwrap_err();
        assert_eq!(
            err,
            BridgeError::TypeMismatch {
                expected: "int".into(),
                actual: "str".into(),
                location: "[2]".into(),
            }
        );
    }

    #[test]
    fn test_nested_sequence_path() {
        let value = DynamicValue::Sequence(vec![
            DynamicValue::Sequence(vec![DynamicValue::int(1)]),
            DynamicValue::Sequence(vec![DynamicValue::int(2), DynamicValue::int(300)]),
        ]);
        let err = Vec::<Vec<u8>>::from_dynamic(&value).unwrap_err();
        assert!(err.to_string().contains("at [1][1]"));
    }

    #[test]
    fn test_mapping_round_trip() {
        let mut map = HashMap::new();
        map.insert("a".to_string(), 1i64);
        map.insert("b".to_string(), 2i64);

        let value = map.to_dynamic();
        let back = HashMap::<String, i64>::from_dynamic(&value).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn test_mapping_value_error_names_key() {
        let value = MappingBuilder::new()
            .insert("a".to_string(), 1i64)
            .insert("b".to_string(), "x")
            .build();
        let err = HashMap::<String, i64>::from_dynamic(&value).unwrap_err();
        assert!(err.to_string().contains("at ['b']"));
    }

    #[test]
    fn test_int_keyed_mapping() {
        let mut map = BTreeMap::new();
        map.insert(1u32, "one".to_string());
        let value = map.to_dynamic();
        assert_eq!(BTreeMap::<u32, String>::from_dynamic(&value).unwrap(), map);
        assert!(BTreeMap::<String, String>::from_dynamic(&value).is_err());
    }

    #[test]
    fn test_option() {
        assert_eq!(Option::<i64>::from_dynamic(&DynamicValue::None).unwrap(), None);
        assert_eq!(
            Option::<i64>::from_dynamic(&DynamicValue::int(3)).unwrap(),
            Some(3)
        );
        assert_eq!(Some(2u8).to_dynamic(), DynamicValue::int(2));
        assert_eq!(None::<u8>.to_dynamic(), DynamicValue::None);
    }

    #[test]
    fn test_pair() {
        let value = (1i32, "x".to_string()).to_dynamic();
        let back = <(i32, String)>::from_dynamic(&value).unwrap();
        assert_eq!(back, (1, "x".to_string()));
        assert!(<(i32, i32)>::from_dynamic(&DynamicValue::Sequence(vec![])).is_err());
    }

    #[test]
    fn test_round_trip_scalars() {
        fn round_trip<T: ToDynamic + FromDynamic + PartialEq + std::fmt::Debug>(v: T) {
            assert_eq!(T::from_dynamic(&v.to_dynamic()).unwrap(), v);
        }
        round_trip(i8::MIN);
        round_trip(i16::MAX);
        round_trip(i32::MIN);
        round_trip(i64::MAX);
        round_trip(u8::MAX);
        round_trip(u16::MAX);
        round_trip(u32::MAX);
        round_trip(u64::MAX);
        round_trip(3.25f32);
        round_trip(-2.5e-300f64);
        round_trip(true);
        round_trip("text".to_string());
        round_trip(Bytes(b"Hello world!".to_vec()));
        round_trip(vec![vec![1i64, 2], vec![]]);
    }

    #[test]
    fn test_produced_types() {
        assert_eq!(<Vec<i64> as ToDynamic>::produced_type().type_hint(), "List[int]");
        assert_eq!(
            <HashMap<String, i64> as FromDynamic>::accepted_type().type_hint(),
            "Dict[str, int]"
        );
        assert_eq!(<Bytes as FromDynamic>::accepted_type(), NativeType::Bytes);
    }
}

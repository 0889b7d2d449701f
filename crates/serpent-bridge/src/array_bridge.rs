//! Array Bridge for Zero-Copy Interop
//!
//! This module exposes multi-dimensional numeric buffers to dynamic callers
//! without copying them.
//!
//! ## Goals
//!
//! 1. **Zero-copy**: a caller's buffer is wrapped, never duplicated; native
//!    mutation lands in the caller's memory
//! 2. **Clear ownership**: a view either owns its bytes or borrows them from
//!    the caller, and a borrowed buffer is kept alive by the view
//! 3. **Type safety**: element access is checked against the dtype
//!
//! ## Memory Layout
//!
//! Views are described by shape, byte strides and a byte offset. Element
//! access works for any non-negative strided layout; raw byte access
//! (`with_bytes`) requires a contiguous layout. Element reads and writes go
//! through byte copies, so buffers need no particular alignment.

use std::any::Any;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::ptr::NonNull;
use std::rc::Rc;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;

use crate::conversion::ToDynamic;
use crate::error::{BridgeError, BridgeResult};
use crate::types::NativeType;
use crate::value::DynamicValue;

// ============================================================================
// DType - Element Type Representation
// ============================================================================

/// Array element type.
///
/// Booleans and complex numbers are recognized so they can be reported
/// by name, but only the integer and float types are supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    /// Interleaved `f32` real and imaginary parts
    Complex64,
    /// Interleaved `f64` real and imaginary parts
    Complex128,
}

impl DType {
    /// Get the size in bytes for this dtype
    pub fn size(&self) -> usize {
        match self {
            DType::Bool => 1,
            DType::Int8 | DType::UInt8 => 1,
            DType::Int16 | DType::UInt16 => 2,
            DType::Int32 | DType::UInt32 | DType::Float32 => 4,
            DType::Int64 | DType::UInt64 | DType::Float64 | DType::Complex64 => 8,
            DType::Complex128 => 16,
        }
    }

    /// Get the NumPy type character
    pub fn type_char(&self) -> char {
        match self {
            DType::Bool => '?',
            DType::Int8 => 'b',
            DType::Int16 => 'h',
            DType::Int32 => 'i',
            DType::Int64 => 'q',
            DType::UInt8 => 'B',
            DType::UInt16 => 'H',
            DType::UInt32 => 'I',
            DType::UInt64 => 'Q',
            DType::Float32 => 'f',
            DType::Float64 => 'd',
            DType::Complex64 => 'F',
            DType::Complex128 => 'D',
        }
    }

    /// Get the NumPy dtype string (e.g., "float64")
    pub fn name(&self) -> &'static str {
        match self {
            DType::Bool => "bool",
            DType::Int8 => "int8",
            DType::Int16 => "int16",
            DType::Int32 => "int32",
            DType::Int64 => "int64",
            DType::UInt8 => "uint8",
            DType::UInt16 => "uint16",
            DType::UInt32 => "uint32",
            DType::UInt64 => "uint64",
            DType::Float32 => "float32",
            DType::Float64 => "float64",
            DType::Complex64 => "complex64",
            DType::Complex128 => "complex128",
        }
    }

    /// Parse a dtype from a NumPy name, short code or type character
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "bool" | "bool_" | "?" => Some(DType::Bool),
            "int8" | "i1" | "b" => Some(DType::Int8),
            "int16" | "i2" | "h" => Some(DType::Int16),
            "int32" | "i4" | "i" => Some(DType::Int32),
            "int64" | "i8" | "q" => Some(DType::Int64),
            "uint8" | "u1" | "B" => Some(DType::UInt8),
            "uint16" | "u2" | "H" => Some(DType::UInt16),
            "uint32" | "u4" | "I" => Some(DType::UInt32),
            "uint64" | "u8" | "Q" => Some(DType::UInt64),
            "float32" | "f4" | "f" => Some(DType::Float32),
            "float64" | "f8" | "d" | "float" => Some(DType::Float64),
            "complex64" | "c8" | "F" => Some(DType::Complex64),
            "complex128" | "c16" | "D" | "complex" => Some(DType::Complex128),
            _ => None,
        }
    }

    /// Parse a buffer-protocol format string (`"<i4"`, `"=f"`, `"q"`, ...).
    ///
    /// `@` (or no prefix) selects native sizes, `=`, `<`, `>` and `!`
    /// select standard sizes. Byte orders other than the host's are rejected.
    pub fn from_buffer_format(format: &str) -> Option<Self> {
        let (native_sizes, rest) = match format.chars().next()? {
            '@' => (true, &format[1..]),
            '=' => (false, &format[1..]),
            '<' if cfg!(target_endian = "little") => (false, &format[1..]),
            '>' | '!' if cfg!(target_endian = "big") => (false, &format[1..]),
            '<' | '>' | '!' => return None,
            _ => (true, format),
        };

        // NumPy's array-interface style: kind letter plus byte width
        if rest.len() > 1 {
            return Self::parse(rest);
        }

        let c_long_is_64 = std::mem::size_of::<std::os::raw::c_long>() == 8;
        match rest {
            "l" if native_sizes && c_long_is_64 => Some(DType::Int64),
            "L" if native_sizes && c_long_is_64 => Some(DType::UInt64),
            "l" => Some(DType::Int32),
            "L" => Some(DType::UInt32),
            "n" if cfg!(target_pointer_width = "64") => Some(DType::Int64),
            "N" if cfg!(target_pointer_width = "64") => Some(DType::UInt64),
            "n" => Some(DType::Int32),
            "N" => Some(DType::UInt32),
            other => Self::parse(other),
        }
    }

    /// Check whether native code can operate on this dtype
    pub fn is_supported(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    /// Check if this is an integer type
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            DType::Int8
                | DType::Int16
                | DType::Int32
                | DType::Int64
                | DType::UInt8
                | DType::UInt16
                | DType::UInt32
                | DType::UInt64
        )
    }

    /// Check if this is a floating point type
    pub fn is_float(&self) -> bool {
        matches!(self, DType::Float32 | DType::Float64)
    }

    /// Check if this is a complex type
    pub fn is_complex(&self) -> bool {
        matches!(self, DType::Complex64 | DType::Complex128)
    }

    /// Check if this is a signed type
    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            DType::Int8
                | DType::Int16
                | DType::Int32
                | DType::Int64
                | DType::Float32
                | DType::Float64
                | DType::Complex64
                | DType::Complex128
        )
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for DType {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DType::parse(s).ok_or_else(|| BridgeError::unsupported_dtype(s))
    }
}

// ============================================================================
// ArrayLayout - Memory Layout Information
// ============================================================================

/// Memory layout order for multi-dimensional arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayOrder {
    /// C-contiguous (row-major): last dimension varies fastest
    C,
    /// Fortran-contiguous (column-major): first dimension varies fastest
    Fortran,
    /// Neither C nor Fortran contiguous
    Neither,
}

/// Complete memory layout description for an array.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayLayout {
    /// Shape of the array (dimensions)
    pub shape: Vec<usize>,
    /// Strides in bytes for each dimension
    pub strides: Vec<isize>,
    /// Data type
    pub dtype: DType,
    /// Memory order
    pub order: ArrayOrder,
    /// Starting offset from base pointer
    pub offset: usize,
}

/// Check whether `dims`, fastest-varying first, are densely packed.
fn is_packed(dims: impl Iterator<Item = (usize, isize)>, itemsize: usize) -> bool {
    // `None` once the packed stride no longer fits an isize
    let mut expected = isize::try_from(itemsize).ok();
    for (dim, stride) in dims {
        // Strides of length-1 axes never matter
        if dim > 1 && Some(stride) != expected {
            return false;
        }
        expected = expected.and_then(|e| e.checked_mul(isize::try_from(dim).ok()?));
    }
    true
}

/// Packed strides for `dims`, fastest-varying first. Strides that overflow
/// saturate; `ArrayLayout::validate` rejects them.
fn packed_strides(dims: impl Iterator<Item = usize>, itemsize: usize) -> Vec<isize> {
    let mut stride = isize::try_from(itemsize).unwrap_or(isize::MAX);
    dims.map(|dim| {
        let current = stride;
        stride = isize::try_from(dim)
            .ok()
            .and_then(|dim| stride.checked_mul(dim))
            .unwrap_or(isize::MAX);
        current
    })
    .collect()
}

fn checked_product(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
}

fn overflow_error(shape: &[usize], strides: &[isize]) -> BridgeError {
    BridgeError::buffer_layout(format!(
        "shape {:?} with strides {:?} overflows the address space",
        shape, strides
    ))
}

fn detect_order(shape: &[usize], strides: &[isize], itemsize: usize) -> ArrayOrder {
    let dims = || shape.iter().copied().zip(strides.iter().copied());
    if is_packed(dims().rev(), itemsize) {
        ArrayOrder::C
    } else if is_packed(dims(), itemsize) {
        ArrayOrder::Fortran
    } else {
        ArrayOrder::Neither
    }
}

impl ArrayLayout {
    /// Create a new C-contiguous layout for the given shape and dtype
    pub fn c_contiguous(shape: Vec<usize>, dtype: DType) -> Self {
        let mut strides = packed_strides(shape.iter().rev().copied(), dtype.size());
        strides.reverse();

        Self {
            shape,
            strides,
            dtype,
            order: ArrayOrder::C,
            offset: 0,
        }
    }

    /// Create a new Fortran-contiguous layout for the given shape and dtype
    pub fn fortran_contiguous(shape: Vec<usize>, dtype: DType) -> Self {
        let strides = packed_strides(shape.iter().copied(), dtype.size());
        Self {
            shape,
            strides,
            dtype,
            order: ArrayOrder::Fortran,
            offset: 0,
        }
    }

    /// Create a layout from explicit byte strides, detecting its order
    pub fn strided(
        shape: Vec<usize>,
        strides: Vec<isize>,
        dtype: DType,
        offset: usize,
    ) -> BridgeResult<Self> {
        if shape.len() != strides.len() {
            return Err(BridgeError::buffer_layout(format!(
                "shape has {} dimensions but strides has {}",
                shape.len(),
                strides.len()
            )));
        }
        let order = detect_order(&shape, &strides, dtype.size());
        Ok(Self {
            shape,
            strides,
            dtype,
            order,
            offset,
        })
    }

    /// Get the number of dimensions
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Get the total number of elements, saturating at `usize::MAX`
    pub fn size(&self) -> usize {
        checked_product(&self.shape).unwrap_or(usize::MAX)
    }

    /// Get the total size in bytes, saturating at `usize::MAX`
    pub fn nbytes(&self) -> usize {
        self.checked_nbytes().unwrap_or(usize::MAX)
    }

    /// Total size in bytes, `None` when it does not fit a usize
    pub fn checked_nbytes(&self) -> Option<usize> {
        checked_product(&self.shape)?.checked_mul(self.dtype.size())
    }

    /// Check if the layout is contiguous
    pub fn is_contiguous(&self) -> bool {
        self.order != ArrayOrder::Neither
    }

    /// Check if layout is C-contiguous
    pub fn is_c_contiguous(&self) -> bool {
        self.order == ArrayOrder::C
    }

    /// Check if layout is Fortran-contiguous
    pub fn is_fortran_contiguous(&self) -> bool {
        self.order == ArrayOrder::Fortran
    }

    /// Number of bytes from the buffer start the layout can reach
    pub fn byte_extent(&self) -> BridgeResult<usize> {
        if self.shape.contains(&0) {
            return Ok(self.offset);
        }
        self.shape
            .iter()
            .zip(self.strides.iter())
            .try_fold(self.offset, |extent, (&dim, &stride)| {
                (dim - 1)
                    .checked_mul(stride.unsigned_abs())
                    .and_then(|span| extent.checked_add(span))
            })
            .and_then(|extent| extent.checked_add(self.dtype.size()))
            .ok_or_else(|| overflow_error(&self.shape, &self.strides))
    }

    /// Check that the layout addresses only bytes inside a buffer of `len`
    pub fn validate(&self, len: usize) -> BridgeResult<()> {
        if self.shape.len() != self.strides.len() {
            return Err(BridgeError::buffer_layout(format!(
                "shape has {} dimensions but strides has {}",
                self.shape.len(),
                self.strides.len()
            )));
        }
        if let Some(stride) = self.strides.iter().find(|s| **s < 0) {
            return Err(BridgeError::buffer_layout(format!(
                "negative stride {} is not supported",
                stride
            )));
        }
        let extent = self.byte_extent()?;
        if extent > len {
            return Err(BridgeError::buffer_layout(format!(
                "layout spans {} bytes but the buffer holds {}",
                extent, len
            )));
        }
        Ok(())
    }

    /// Check whether distinct indices can address the same element
    pub fn has_overlap(&self) -> bool {
        self.shape
            .iter()
            .zip(self.strides.iter())
            .any(|(&dim, &stride)| dim > 1 && stride == 0)
    }

    /// Byte offset of the element at `indices`, `None` when out of bounds
    pub fn byte_offset(&self, indices: &[usize]) -> Option<usize> {
        if indices.len() != self.shape.len() {
            return None;
        }

        for (idx, dim) in indices.iter().zip(self.shape.iter()) {
            if *idx >= *dim {
                return None;
            }
        }

        Some(self.element_offset(indices))
    }

    fn element_offset(&self, indices: &[usize]) -> usize {
        self.offset
            + indices
                .iter()
                .zip(self.strides.iter())
                .map(|(&idx, &stride)| idx * stride.unsigned_abs())
                .sum::<usize>()
    }

    /// Create a view with a slice
    pub fn slice_view(&self, start: &[usize], end: &[usize]) -> BridgeResult<Self> {
        if start.len() != self.ndim() || end.len() != self.ndim() {
            return Err(BridgeError::buffer_layout(
                "slice dimensions don't match array dimensions",
            ));
        }

        let mut new_shape = Vec::with_capacity(self.ndim());
        let mut new_offset = self.offset;

        for (((&s, &e), &stride), &dim) in start
            .iter()
            .zip(end.iter())
            .zip(self.strides.iter())
            .zip(self.shape.iter())
        {
            if s > e || e > dim {
                return Err(BridgeError::buffer_layout(format!(
                    "invalid slice {}:{} for dimension of size {}",
                    s, e, dim
                )));
            }
            new_shape.push(e - s);
            new_offset += s * stride.unsigned_abs();
        }

        let order = detect_order(&new_shape, &self.strides, self.dtype.size());
        Ok(Self {
            shape: new_shape,
            strides: self.strides.clone(),
            dtype: self.dtype,
            order,
            offset: new_offset,
        })
    }

    /// Reshape to new shape (must have same total size)
    pub fn reshape(&self, new_shape: Vec<usize>) -> BridgeResult<Self> {
        if checked_product(&new_shape) != Some(self.size()) {
            return Err(BridgeError::buffer_layout(format!(
                "cannot reshape array of size {} to shape {:?}",
                self.size(),
                new_shape
            )));
        }

        let mut layout = match self.order {
            ArrayOrder::C => Self::c_contiguous(new_shape, self.dtype),
            ArrayOrder::Fortran => Self::fortran_contiguous(new_shape, self.dtype),
            ArrayOrder::Neither => {
                return Err(BridgeError::buffer_layout(
                    "cannot reshape non-contiguous array",
                ))
            }
        };
        layout.offset = self.offset;
        Ok(layout)
    }

    /// Transpose the array (reverse dimensions and strides)
    pub fn transpose(&self) -> Self {
        let mut new_shape = self.shape.clone();
        let mut new_strides = self.strides.clone();
        new_shape.reverse();
        new_strides.reverse();

        let new_order = match self.order {
            ArrayOrder::C => ArrayOrder::Fortran,
            ArrayOrder::Fortran => ArrayOrder::C,
            ArrayOrder::Neither => ArrayOrder::Neither,
        };

        Self {
            shape: new_shape,
            strides: new_strides,
            dtype: self.dtype,
            order: new_order,
            offset: self.offset,
        }
    }
}

// ============================================================================
// Elements and scalars
// ============================================================================

/// Trait for types that can be array elements
pub trait ArrayElement: Copy + 'static {
    /// Get the dtype for this type
    fn dtype() -> DType;

    /// Read from native-endian bytes
    fn read(bytes: &[u8]) -> Self;

    /// Write as native-endian bytes
    fn write(self, bytes: &mut [u8]);

    /// Wrap as a dtype-tagged scalar
    fn into_scalar(self) -> Scalar;
}

/// A single array element of any supported dtype.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
}

macro_rules! array_elements {
    ($($ty:ty => $dtype:ident, $scalar:ident;)*) => {
        $(
            impl ArrayElement for $ty {
                fn dtype() -> DType {
                    DType::$dtype
                }

                fn read(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(&bytes[..std::mem::size_of::<$ty>()]);
                    <$ty>::from_ne_bytes(raw)
                }

                fn write(self, bytes: &mut [u8]) {
                    bytes[..std::mem::size_of::<$ty>()].copy_from_slice(&self.to_ne_bytes());
                }

                fn into_scalar(self) -> Scalar {
                    Scalar::$scalar(self)
                }
            }
        )*

        impl Scalar {
            /// Element type of this scalar
            pub fn dtype(&self) -> DType {
                match self {
                    $(Scalar::$scalar(_) => DType::$dtype,)*
                }
            }

            fn read(dtype: DType, bytes: &[u8]) -> Option<Self> {
                match dtype {
                    $(DType::$dtype => Some(Scalar::$scalar(<$ty>::read(bytes))),)*
                    _ => None,
                }
            }
        }

        impl fmt::Display for Scalar {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $(Scalar::$scalar(v) => write!(f, "{}", v),)*
                }
            }
        }

        impl ToDynamic for Scalar {
            fn to_dynamic(&self) -> DynamicValue {
                match self {
                    $(Scalar::$scalar(v) => v.to_dynamic(),)*
                }
            }

            fn produced_type() -> NativeType {
                NativeType::Any
            }
        }
    };
}

array_elements! {
    i8 => Int8, I8;
    i16 => Int16, I16;
    i32 => Int32, I32;
    i64 => Int64, I64;
    u8 => UInt8, U8;
    u16 => UInt16, U16;
    u32 => UInt32, U32;
    u64 => UInt64, U64;
    f32 => Float32, F32;
    f64 => Float64, F64;
}

// ============================================================================
// Index iteration
// ============================================================================

/// Iterator over every multi-index of a shape in C order.
///
/// A 0-dimensional shape yields the single empty index; a shape with a
/// zero-length dimension yields nothing.
#[derive(Debug, Clone)]
pub struct Indices {
    shape: Vec<usize>,
    next: Option<Vec<usize>>,
}

impl Indices {
    /// Iterate the indices of `shape`
    pub fn new(shape: &[usize]) -> Self {
        let next = if shape.contains(&0) {
            None
        } else {
            Some(vec![0; shape.len()])
        };
        Self {
            shape: shape.to_vec(),
            next,
        }
    }
}

impl Iterator for Indices {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        let current = self.next.take()?;
        let mut following = current.clone();
        for axis in (0..following.len()).rev() {
            following[axis] += 1;
            if following[axis] < self.shape[axis] {
                self.next = Some(following);
                break;
            }
            following[axis] = 0;
        }
        Some(current)
    }
}

// ============================================================================
// ArrayView - Main Array Interop Structure
// ============================================================================

static NEXT_ARRAY_ID: AtomicU64 = AtomicU64::new(1);

/// Ownership state for array data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayOwnership {
    /// Native code allocated the bytes and owns them
    Owned,
    /// The bytes belong to the caller; the view keeps the caller's object alive
    Borrowed,
    /// Derived view sharing another view's bytes
    View,
}

enum Memory {
    Owned(Vec<u8>),
    Foreign { ptr: NonNull<u8>, len: usize },
}

impl Memory {
    fn bytes(&self) -> &[u8] {
        match self {
            Memory::Owned(data) => data.as_slice(),
            // SAFETY: `ArrayView::from_raw_parts` requires `ptr` to be valid
            // for `len` bytes while the keepalive lives, and the keepalive
            // lives as long as this memory.
            Memory::Foreign { ptr, len } => unsafe {
                std::slice::from_raw_parts(ptr.as_ptr(), *len)
            },
        }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        match self {
            Memory::Owned(data) => data.as_mut_slice(),
            // SAFETY: as in `bytes`; the RefCell guarantees exclusive access
            // on the native side.
            Memory::Foreign { ptr, len } => unsafe {
                std::slice::from_raw_parts_mut(ptr.as_ptr(), *len)
            },
        }
    }
}

struct ArrayBuffer {
    memory: RefCell<Memory>,
    readonly: bool,
    keepalive: Option<Box<dyn Any>>,
}

/// View over a multi-dimensional numeric buffer.
///
/// Cloning a view shares its buffer. Derived views (`reshape`, `slice`,
/// `transpose`) also share the buffer, so writes through any of them are
/// visible through all of them and through the caller's original object.
#[derive(Clone)]
pub struct ArrayView {
    id: u64,
    layout: ArrayLayout,
    buffer: Rc<ArrayBuffer>,
    ownership: ArrayOwnership,
    base_id: Option<u64>,
}

impl fmt::Debug for ArrayView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayView")
            .field("id", &self.id)
            .field("layout", &self.layout)
            .field("ownership", &self.ownership)
            .field("readonly", &self.buffer.readonly)
            .finish()
    }
}

fn check_dtype(dtype: DType) -> BridgeResult<()> {
    if dtype.is_supported() {
        Ok(())
    } else {
        Err(BridgeError::unsupported_dtype(dtype.name()))
    }
}

impl ArrayView {
    fn with_buffer(layout: ArrayLayout, buffer: ArrayBuffer, ownership: ArrayOwnership) -> Self {
        let id = NEXT_ARRAY_ID.fetch_add(1, Ordering::Relaxed);
        trace!(id, dtype = %layout.dtype, shape = ?layout.shape, ?ownership, "wrapped array");
        Self {
            id,
            layout,
            buffer: Rc::new(buffer),
            ownership,
            base_id: None,
        }
    }

    fn derive(&self, layout: ArrayLayout) -> Self {
        Self {
            id: NEXT_ARRAY_ID.fetch_add(1, Ordering::Relaxed),
            layout,
            buffer: Rc::clone(&self.buffer),
            ownership: ArrayOwnership::View,
            base_id: Some(self.id),
        }
    }

    /// Wrap an owned native buffer with explicit shape and byte strides
    pub fn wrap(
        data: Vec<u8>,
        shape: Vec<usize>,
        strides: Vec<isize>,
        dtype: DType,
    ) -> BridgeResult<Self> {
        check_dtype(dtype)?;
        let layout = ArrayLayout::strided(shape, strides, dtype, 0)?;
        layout.validate(data.len())?;
        let buffer = ArrayBuffer {
            memory: RefCell::new(Memory::Owned(data)),
            readonly: false,
            keepalive: None,
        };
        Ok(Self::with_buffer(layout, buffer, ArrayOwnership::Owned))
    }

    /// Create an owned C-contiguous array from typed values
    pub fn from_vec<T: ArrayElement>(values: Vec<T>, shape: Vec<usize>) -> BridgeResult<Self> {
        let layout = ArrayLayout::c_contiguous(shape, T::dtype());
        if layout.size() != values.len() {
            return Err(BridgeError::buffer_layout(format!(
                "{} values cannot fill shape {:?}",
                values.len(),
                layout.shape
            )));
        }
        let size = T::dtype().size();
        let mut data = vec![0u8; values.len() * size];
        for (chunk, value) in data.chunks_exact_mut(size).zip(values) {
            value.write(chunk);
        }
        let buffer = ArrayBuffer {
            memory: RefCell::new(Memory::Owned(data)),
            readonly: false,
            keepalive: None,
        };
        Ok(Self::with_buffer(layout, buffer, ArrayOwnership::Owned))
    }

    /// Create a new zero-initialized array
    pub fn zeros(shape: Vec<usize>, dtype: DType) -> BridgeResult<Self> {
        check_dtype(dtype)?;
        let layout = ArrayLayout::c_contiguous(shape, dtype);
        let nbytes = layout
            .checked_nbytes()
            .ok_or_else(|| overflow_error(&layout.shape, &layout.strides))?;
        let buffer = ArrayBuffer {
            memory: RefCell::new(Memory::Owned(vec![0; nbytes])),
            readonly: false,
            keepalive: None,
        };
        Ok(Self::with_buffer(layout, buffer, ArrayOwnership::Owned))
    }

    /// Borrow a caller-owned buffer without copying it.
    ///
    /// `keepalive` is held for as long as any view of the buffer exists and
    /// can be recovered with [`ArrayView::keepalive`].
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads of `len` bytes (and for writes unless
    /// `readonly`) for as long as `keepalive` is alive, and the memory must
    /// not be accessed by anything else while native code holds a view.
    pub unsafe fn from_raw_parts(
        ptr: NonNull<u8>,
        len: usize,
        layout: ArrayLayout,
        readonly: bool,
        keepalive: Box<dyn Any>,
    ) -> BridgeResult<Self> {
        check_dtype(layout.dtype)?;
        layout.validate(len)?;
        let buffer = ArrayBuffer {
            memory: RefCell::new(Memory::Foreign { ptr, len }),
            readonly,
            keepalive: Some(keepalive),
        };
        Ok(Self::with_buffer(layout, buffer, ArrayOwnership::Borrowed))
    }

    /// Get the array ID
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Get the layout
    pub fn layout(&self) -> &ArrayLayout {
        &self.layout
    }

    /// Get the shape
    pub fn shape(&self) -> &[usize] {
        &self.layout.shape
    }

    /// Get the byte strides
    pub fn strides(&self) -> &[isize] {
        &self.layout.strides
    }

    /// Get the dtype
    pub fn dtype(&self) -> DType {
        self.layout.dtype
    }

    /// Get the number of dimensions
    pub fn ndim(&self) -> usize {
        self.layout.ndim()
    }

    /// Get the total number of elements
    pub fn size(&self) -> usize {
        self.layout.size()
    }

    /// Get the total size in bytes
    pub fn nbytes(&self) -> usize {
        self.layout.nbytes()
    }

    /// Check if this is a view derived from another array
    pub fn is_view(&self) -> bool {
        self.base_id.is_some()
    }

    /// ID of the array this view was derived from
    pub fn base_id(&self) -> Option<u64> {
        self.base_id
    }

    /// Get ownership state
    pub fn ownership(&self) -> ArrayOwnership {
        self.ownership
    }

    /// Check if this view owns natively allocated bytes
    pub fn is_owning(&self) -> bool {
        self.ownership == ArrayOwnership::Owned
    }

    /// Check if the buffer rejects mutation
    pub fn is_readonly(&self) -> bool {
        self.buffer.readonly
    }

    /// Object kept alive on behalf of a borrowed buffer
    pub fn keepalive<T: 'static>(&self) -> Option<&T> {
        self.buffer.keepalive.as_ref()?.downcast_ref::<T>()
    }

    /// Check whether two views address the same buffer
    pub fn shares_storage(&self, other: &ArrayView) -> bool {
        Rc::ptr_eq(&self.buffer, &other.buffer)
    }

    /// Iterate every index of this array in C order
    pub fn indices(&self) -> Indices {
        Indices::new(self.shape())
    }

    fn memory(&self) -> BridgeResult<Ref<'_, Memory>> {
        self.buffer
            .memory
            .try_borrow()
            .map_err(|_| BridgeError::borrowed_mutation("array is being mutated"))
    }

    fn memory_mut(&self) -> BridgeResult<RefMut<'_, Memory>> {
        if self.buffer.readonly {
            return Err(BridgeError::borrowed_mutation("array is read-only"));
        }
        self.buffer
            .memory
            .try_borrow_mut()
            .map_err(|_| BridgeError::borrowed_mutation("array is already borrowed"))
    }

    fn check_element<T: ArrayElement>(&self) -> BridgeResult<()> {
        if T::dtype() == self.dtype() {
            Ok(())
        } else {
            Err(BridgeError::type_mismatch(
                format!("ndarray of {}", T::dtype()),
                format!("ndarray of {}", self.dtype()),
            ))
        }
    }

    fn offset_of(&self, index: &[usize]) -> BridgeResult<usize> {
        self.layout.byte_offset(index).ok_or_else(|| {
            BridgeError::buffer_layout(format!(
                "index {:?} out of bounds for shape {:?}",
                index,
                self.shape()
            ))
        })
    }

    fn element<'a>(&self, bytes: &'a [u8], offset: usize) -> &'a [u8] {
        &bytes[offset..offset + self.dtype().size()]
    }

    /// Read the element at `index`
    pub fn get<T: ArrayElement>(&self, index: &[usize]) -> BridgeResult<T> {
        self.check_element::<T>()?;
        let offset = self.offset_of(index)?;
        let memory = self.memory()?;
        Ok(T::read(self.element(memory.bytes(), offset)))
    }

    /// Write the element at `index`
    pub fn set<T: ArrayElement>(&self, index: &[usize], value: T) -> BridgeResult<()> {
        self.check_element::<T>()?;
        let offset = self.offset_of(index)?;
        let mut memory = self.memory_mut()?;
        value.write(&mut memory.bytes_mut()[offset..]);
        Ok(())
    }

    /// Read the element at `index` whatever the dtype
    pub fn scalar_at(&self, index: &[usize]) -> BridgeResult<Scalar> {
        let offset = self.offset_of(index)?;
        let memory = self.memory()?;
        Scalar::read(self.dtype(), self.element(memory.bytes(), offset))
            .ok_or_else(|| BridgeError::unsupported_dtype(self.dtype().name()))
    }

    /// All elements in C order
    pub fn values<T: ArrayElement>(&self) -> BridgeResult<Vec<T>> {
        self.check_element::<T>()?;
        let memory = self.memory()?;
        let bytes = memory.bytes();
        Ok(self
            .indices()
            .map(|index| T::read(self.element(bytes, self.layout.element_offset(&index))))
            .collect())
    }

    /// All elements in C order, whatever the dtype
    pub fn scalars(&self) -> BridgeResult<Vec<Scalar>> {
        let memory = self.memory()?;
        let bytes = memory.bytes();
        self.indices()
            .map(|index| {
                let offset = self.layout.element_offset(&index);
                Scalar::read(self.dtype(), self.element(bytes, offset))
                    .ok_or_else(|| BridgeError::unsupported_dtype(self.dtype().name()))
            })
            .collect()
    }

    /// Replace every element with `f(element)`, in place
    pub fn map_inplace<T: ArrayElement>(&self, mut f: impl FnMut(T) -> T) -> BridgeResult<()> {
        self.check_element::<T>()?;
        if self.layout.has_overlap() {
            return Err(BridgeError::buffer_layout(
                "cannot mutate an array whose elements overlap",
            ));
        }
        let mut memory = self.memory_mut()?;
        let bytes = memory.bytes_mut();
        let size = self.dtype().size();
        for index in self.indices() {
            let offset = self.layout.element_offset(&index);
            let slot = &mut bytes[offset..offset + size];
            f(T::read(slot)).write(slot);
        }
        trace!(id = self.id, elements = self.size(), "mutated array in place");
        Ok(())
    }

    /// Borrow the raw bytes of a contiguous array
    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> BridgeResult<R> {
        self.require_contiguous()?;
        let memory = self.memory()?;
        let start = self.layout.offset;
        Ok(f(&memory.bytes()[start..start + self.nbytes()]))
    }

    /// Mutably borrow the raw bytes of a contiguous array
    pub fn with_bytes_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> BridgeResult<R> {
        self.require_contiguous()?;
        let mut memory = self.memory_mut()?;
        let start = self.layout.offset;
        let end = start + self.nbytes();
        Ok(f(&mut memory.bytes_mut()[start..end]))
    }

    fn require_contiguous(&self) -> BridgeResult<()> {
        if self.layout.is_contiguous() {
            Ok(())
        } else {
            Err(BridgeError::buffer_layout(format!(
                "array with shape {:?} and strides {:?} is not contiguous",
                self.shape(),
                self.strides()
            )))
        }
    }

    /// Copy into a new owned C-contiguous array
    pub fn copy(&self) -> BridgeResult<Self> {
        let size = self.dtype().size();
        let memory = self.memory()?;
        let bytes = memory.bytes();
        // Broadcast views can describe more bytes than their buffer holds
        let nbytes = self
            .layout
            .checked_nbytes()
            .ok_or_else(|| overflow_error(self.shape(), self.strides()))?;
        let mut data = Vec::with_capacity(nbytes);
        for index in self.indices() {
            data.extend_from_slice(self.element(bytes, self.layout.element_offset(&index)));
        }
        debug_assert_eq!(data.len(), self.size() * size);
        let layout = ArrayLayout::c_contiguous(self.shape().to_vec(), self.dtype());
        let buffer = ArrayBuffer {
            memory: RefCell::new(Memory::Owned(data)),
            readonly: false,
            keepalive: None,
        };
        Ok(Self::with_buffer(layout, buffer, ArrayOwnership::Owned))
    }

    /// Reshape the array (creates a view)
    pub fn reshape(&self, new_shape: Vec<usize>) -> BridgeResult<Self> {
        Ok(self.derive(self.layout.reshape(new_shape)?))
    }

    /// Transpose the array (creates a view)
    pub fn transpose(&self) -> Self {
        self.derive(self.layout.transpose())
    }

    /// Create a view with a slice
    pub fn slice(&self, start: &[usize], end: &[usize]) -> BridgeResult<Self> {
        Ok(self.derive(self.layout.slice_view(start, end)?))
    }

    /// Convert into nested sequences of scalars (a 0-d array becomes a scalar)
    pub fn to_nested(&self) -> BridgeResult<DynamicValue> {
        let memory = self.memory()?;
        let mut index = Vec::with_capacity(self.ndim());
        self.nest(memory.bytes(), &mut index)
    }

    fn nest(&self, bytes: &[u8], index: &mut Vec<usize>) -> BridgeResult<DynamicValue> {
        let axis = index.len();
        if axis == self.ndim() {
            let offset = self.layout.element_offset(index);
            return Scalar::read(self.dtype(), self.element(bytes, offset))
                .map(|scalar| scalar.to_dynamic())
                .ok_or_else(|| BridgeError::unsupported_dtype(self.dtype().name()));
        }
        let mut items = Vec::with_capacity(self.shape()[axis]);
        for i in 0..self.shape()[axis] {
            index.push(i);
            items.push(self.nest(bytes, index)?);
            index.pop();
        }
        Ok(DynamicValue::Sequence(items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_element_dtypes_match_native_widths() {
        fn width<T: ArrayElement>() -> (DType, usize) {
            (T::dtype(), std::mem::size_of::<T>())
        }
        for (dtype, size) in [
            width::<i8>(),
            width::<i16>(),
            width::<i32>(),
            width::<i64>(),
            width::<u8>(),
            width::<u16>(),
            width::<u32>(),
            width::<u64>(),
            width::<f32>(),
            width::<f64>(),
        ] {
            assert_eq!(dtype.size(), size, "{}", dtype);
            assert!(dtype.is_supported());
        }

        // Reported by name, never marshalled
        for dtype in [DType::Bool, DType::Complex64, DType::Complex128] {
            assert!(!dtype.is_supported());
            assert_eq!(dtype.is_complex(), dtype != DType::Bool);
            assert_eq!(
                ArrayView::zeros(vec![1], dtype).unwrap_err(),
                BridgeError::unsupported_dtype(dtype.name())
            );
        }
        assert_eq!(DType::Complex64.size(), 2 * DType::Float32.size());
    }

    #[test]
    fn test_dtype_parsing() {
        assert_eq!(DType::parse("float64"), Some(DType::Float64));
        assert_eq!(DType::parse("int32"), Some(DType::Int32));
        assert_eq!(DType::parse("d"), Some(DType::Float64));
        assert_eq!(DType::parse("unknown"), None);
        assert_eq!("int16".parse::<DType>().unwrap(), DType::Int16);
        assert_eq!(
            "float16".parse::<DType>().unwrap_err(),
            BridgeError::unsupported_dtype("float16")
        );
    }

    #[test]
    fn test_buffer_format_parsing() {
        assert_eq!(DType::from_buffer_format("h"), Some(DType::Int16));
        assert_eq!(DType::from_buffer_format("=f"), Some(DType::Float32));
        assert_eq!(DType::from_buffer_format("@d"), Some(DType::Float64));
        assert_eq!(DType::from_buffer_format("q"), Some(DType::Int64));
        assert_eq!(DType::from_buffer_format("=l"), Some(DType::Int32));
        assert_eq!(DType::from_buffer_format("Zd"), None);
        assert_eq!(DType::from_buffer_format("e"), None);
        assert_eq!(DType::from_buffer_format(""), None);
        if cfg!(target_endian = "little") {
            assert_eq!(DType::from_buffer_format("<i4"), Some(DType::Int32));
            assert_eq!(DType::from_buffer_format(">i4"), None);
        }
    }

    #[test]
    fn test_foreign_c_and_fortran_buffers() {
        // 0..6 laid out once row-major and once column-major
        let mut rows: Vec<u8> = (0u16..6).flat_map(|v| v.to_ne_bytes()).collect();
        let mut cols: Vec<u8> = [0u16, 3, 1, 4, 2, 5]
            .iter()
            .flat_map(|v| v.to_ne_bytes())
            .collect();

        let c = ArrayLayout::c_contiguous(vec![2, 3], DType::UInt16);
        assert_eq!(c.strides, vec![6, 2]);
        let f = ArrayLayout::fortran_contiguous(vec![2, 3], DType::UInt16);
        assert_eq!(f.strides, vec![2, 4]);
        assert_eq!((c.nbytes(), f.nbytes()), (12, 12));

        let by_rows = unsafe {
            ArrayView::from_raw_parts(
                NonNull::new(rows.as_mut_ptr()).unwrap(),
                rows.len(),
                c,
                true,
                Box::new(()),
            )
        }
        .unwrap();
        let by_cols = unsafe {
            ArrayView::from_raw_parts(
                NonNull::new(cols.as_mut_ptr()).unwrap(),
                cols.len(),
                f,
                true,
                Box::new(()),
            )
        }
        .unwrap();

        assert!(by_rows.layout().is_c_contiguous());
        assert!(by_cols.layout().is_fortran_contiguous());
        assert_eq!(by_rows.values::<u16>().unwrap(), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(by_cols.values::<u16>().unwrap(), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(by_cols.get::<u16>(&[1, 2]).unwrap(), 5);
        drop((by_rows, by_cols));
    }

    #[test]
    fn test_foreign_buffer_shorter_than_layout() {
        let mut backing = vec![0u8; 10];
        let ptr = NonNull::new(backing.as_mut_ptr()).unwrap();
        let layout = ArrayLayout::c_contiguous(vec![3], DType::Int32);
        let err = unsafe { ArrayView::from_raw_parts(ptr, 10, layout, false, Box::new(())) }
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BufferLayout);
        drop(backing);
    }

    #[test]
    fn test_strided_order_detection() {
        let c = ArrayLayout::strided(vec![2, 3], vec![12, 4], DType::Int32, 0).unwrap();
        assert_eq!(c.order, ArrayOrder::C);

        let f = ArrayLayout::strided(vec![2, 3], vec![4, 8], DType::Int32, 0).unwrap();
        assert_eq!(f.order, ArrayOrder::Fortran);

        let every_other = ArrayLayout::strided(vec![3], vec![8], DType::Int32, 0).unwrap();
        assert_eq!(every_other.order, ArrayOrder::Neither);

        assert!(matches!(
            ArrayLayout::strided(vec![2, 3], vec![4], DType::Int32, 0),
            Err(BridgeError::BufferLayout { .. })
        ));
    }

    #[test]
    fn test_wrap_rejects_shape_larger_than_buffer() {
        let err = ArrayView::wrap(vec![0u8; 8], vec![(1 << 61) + 1], vec![8], DType::Int64)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BufferLayout);

        let err = ArrayView::wrap(
            vec![0u8; 8],
            vec![usize::MAX, 2],
            vec![1, 1],
            DType::UInt8,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BufferLayout);

        let broadcast =
            ArrayView::wrap(vec![0u8; 8], vec![1 << 40, 1 << 40], vec![0, 0], DType::Int64)
                .unwrap();
        assert_eq!(broadcast.copy().unwrap_err().kind(), ErrorKind::BufferLayout);

        let huge = ArrayLayout::c_contiguous(vec![1 << 40, 1 << 40], DType::Float64);
        assert_eq!(huge.checked_nbytes(), None);
        assert!(huge.validate(usize::MAX).is_err());
        assert!(ArrayView::zeros(vec![1 << 40, 1 << 40], DType::Float64).is_err());
    }

    #[test]
    fn test_layout_validation() {
        let layout = ArrayLayout::strided(vec![3], vec![8], DType::Int32, 0).unwrap();
        assert_eq!(layout.byte_extent().unwrap(), 20);
        assert!(layout.validate(20).is_ok());
        assert!(matches!(
            layout.validate(19),
            Err(BridgeError::BufferLayout { .. })
        ));

        let reversed = ArrayLayout::strided(vec![3], vec![-4], DType::Int32, 8).unwrap();
        assert!(matches!(
            reversed.validate(12),
            Err(BridgeError::BufferLayout { .. })
        ));
    }

    #[test]
    fn test_array_layout_byte_offset() {
        let layout = ArrayLayout::c_contiguous(vec![3, 4], DType::Float64);

        assert_eq!(layout.byte_offset(&[0, 0]), Some(0));
        assert_eq!(layout.byte_offset(&[0, 1]), Some(8));
        assert_eq!(layout.byte_offset(&[1, 0]), Some(32));
        assert_eq!(layout.byte_offset(&[2, 3]), Some(88));

        // Out of bounds
        assert_eq!(layout.byte_offset(&[3, 0]), None);
        assert_eq!(layout.byte_offset(&[0, 4]), None);
        assert_eq!(layout.byte_offset(&[0]), None);
    }

    #[test]
    fn test_transpose_of_borrowed_view_writes_through() {
        let mut backing: Vec<u8> = (1i64..=4).flat_map(|v| v.to_ne_bytes()).collect();
        let ptr = NonNull::new(backing.as_mut_ptr()).unwrap();
        let layout = ArrayLayout::c_contiguous(vec![2, 2], DType::Int64);
        let arr =
            unsafe { ArrayView::from_raw_parts(ptr, 32, layout, false, Box::new(7u8)) }.unwrap();

        let t = arr.transpose();
        assert_eq!(t.ownership(), ArrayOwnership::View);
        assert!(t.layout().is_fortran_contiguous());
        assert_eq!(t.keepalive::<u8>(), Some(&7));
        t.set::<i64>(&[1, 0], 20).unwrap();
        assert_eq!(arr.get::<i64>(&[0, 1]).unwrap(), 20);
        drop((arr, t));

        let second = i64::from_ne_bytes(backing[8..16].try_into().unwrap());
        assert_eq!(second, 20);
    }

    #[test]
    fn test_indices_c_order() {
        let all: Vec<Vec<usize>> = Indices::new(&[2, 2]).collect();
        assert_eq!(all, vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1]]);

        assert_eq!(Indices::new(&[]).count(), 1);
        assert_eq!(Indices::new(&[3, 0]).count(), 0);
    }

    #[test]
    fn test_wrap_and_read() {
        let data: Vec<u8> = [1i32, 2, 3, 4, 5, 6]
            .iter()
            .flat_map(|v| v.to_ne_bytes())
            .collect();
        let arr = ArrayView::wrap(data, vec![2, 3], vec![12, 4], DType::Int32).unwrap();

        assert_eq!(arr.shape(), &[2, 3]);
        assert_eq!(arr.get::<i32>(&[1, 2]).unwrap(), 6);
        assert_eq!(arr.values::<i32>().unwrap(), vec![1, 2, 3, 4, 5, 6]);
        assert!(arr.is_owning());
    }

    #[test]
    fn test_wrap_rejects_unsupported_dtype() {
        let result = ArrayView::wrap(vec![0; 16], vec![1], vec![16], DType::Complex128);
        assert_eq!(
            result.unwrap_err(),
            BridgeError::unsupported_dtype("complex128")
        );
    }

    #[test]
    fn test_wrong_element_type_is_type_mismatch() {
        let arr = ArrayView::from_vec(vec![1.0f64, 2.0], vec![2]).unwrap();
        assert!(arr.get::<f32>(&[0]).unwrap_err().is_type_error());
        assert!(arr.map_inplace::<i64>(|v| v + 1).unwrap_err().is_type_error());
    }

    #[test]
    fn test_map_inplace_mutates_shared_storage() {
        let arr = ArrayView::from_vec(vec![1i16, 2, 3, 4], vec![2, 2]).unwrap();
        let alias = arr.clone();
        alias.map_inplace::<i16>(|v| v + 10).unwrap();
        assert_eq!(arr.values::<i16>().unwrap(), vec![11, 12, 13, 14]);
    }

    #[test]
    fn test_map_inplace_on_strided_view() {
        let arr = ArrayView::from_vec((0..12).collect::<Vec<i64>>(), vec![3, 4]).unwrap();
        let corner = arr.slice(&[1, 1], &[3, 3]).unwrap();
        assert!(!corner.layout().is_contiguous());

        corner.map_inplace::<i64>(|v| v * 100).unwrap();
        assert_eq!(
            arr.values::<i64>().unwrap(),
            vec![0, 1, 2, 3, 4, 500, 600, 7, 8, 900, 1000, 11]
        );
    }

    #[test]
    fn test_with_bytes_requires_contiguous() {
        let arr = ArrayView::from_vec(vec![0u8; 16], vec![4, 4]).unwrap();
        assert_eq!(arr.with_bytes(|b| b.len()).unwrap(), 16);

        let column = arr.slice(&[0, 1], &[4, 2]).unwrap();
        assert!(matches!(
            column.with_bytes(|b| b.len()),
            Err(BridgeError::BufferLayout { .. })
        ));
    }

    #[test]
    fn test_reentrant_mutation_is_rejected() {
        let arr = ArrayView::from_vec(vec![1.0f32, 2.0], vec![2]).unwrap();
        let result = arr
            .with_bytes(|_| arr.set::<f32>(&[0], 5.0))
            .unwrap();
        assert!(matches!(result, Err(BridgeError::BorrowedMutation { .. })));
    }

    #[test]
    fn test_readonly_borrowed_buffer() {
        let mut backing = vec![0u8; 8];
        let ptr = NonNull::new(backing.as_mut_ptr()).unwrap();
        let layout = ArrayLayout::c_contiguous(vec![2], DType::Int32);
        let arr =
            unsafe { ArrayView::from_raw_parts(ptr, 8, layout, true, Box::new("owner")) }.unwrap();

        assert_eq!(arr.ownership(), ArrayOwnership::Borrowed);
        assert_eq!(arr.keepalive::<&str>(), Some(&"owner"));
        assert_eq!(arr.get::<i32>(&[1]).unwrap(), 0);
        assert!(matches!(
            arr.set::<i32>(&[0], 1),
            Err(BridgeError::BorrowedMutation { .. })
        ));
        drop(arr);
        drop(backing);
    }

    #[test]
    fn test_borrowed_buffer_mutation_reaches_caller_memory() {
        let mut backing: Vec<u8> = [1.5f64, 2.5].iter().flat_map(|v| v.to_ne_bytes()).collect();
        let ptr = NonNull::new(backing.as_mut_ptr()).unwrap();
        let layout = ArrayLayout::c_contiguous(vec![2], DType::Float64);
        let arr = unsafe { ArrayView::from_raw_parts(ptr, 16, layout, false, Box::new(())) }.unwrap();

        arr.map_inplace::<f64>(|v| v + 1.0).unwrap();
        drop(arr);

        let first = f64::from_ne_bytes(backing[..8].try_into().unwrap());
        let second = f64::from_ne_bytes(backing[8..].try_into().unwrap());
        assert_eq!((first, second), (2.5, 3.5));
    }

    #[test]
    fn test_views_share_storage() {
        let arr = ArrayView::zeros(vec![12], DType::Float64).unwrap();
        let reshaped = arr.reshape(vec![3, 4]).unwrap();

        assert_eq!(reshaped.shape(), &[3, 4]);
        assert!(reshaped.is_view());
        assert_eq!(reshaped.base_id(), Some(arr.id()));
        assert!(reshaped.shares_storage(&arr));

        reshaped.set::<f64>(&[2, 3], 9.0).unwrap();
        assert_eq!(arr.get::<f64>(&[11]).unwrap(), 9.0);
    }

    #[test]
    fn test_transpose_reads_columns() {
        let arr = ArrayView::from_vec(vec![1u32, 2, 3, 4, 5, 6], vec![2, 3]).unwrap();
        let t = arr.transpose();
        assert_eq!(t.shape(), &[3, 2]);
        assert_eq!(t.values::<u32>().unwrap(), vec![1, 4, 2, 5, 3, 6]);
    }

    #[test]
    fn test_copy_is_owned_and_independent() {
        let arr = ArrayView::from_vec(vec![1i8, 2, 3, 4], vec![2, 2]).unwrap();
        let copied = arr.transpose().copy().unwrap();

        assert_eq!(copied.ownership(), ArrayOwnership::Owned);
        assert!(copied.layout().is_c_contiguous());
        assert!(!copied.shares_storage(&arr));
        assert_eq!(copied.values::<i8>().unwrap(), vec![1, 3, 2, 4]);

        copied.set::<i8>(&[0, 0], 100).unwrap();
        assert_eq!(arr.get::<i8>(&[0, 0]).unwrap(), 1);
    }

    #[test]
    fn test_scalars_and_nested() {
        let arr = ArrayView::from_vec(vec![1.5f32, 2.0, 3.0, 4.0], vec![2, 2]).unwrap();
        let printed: Vec<String> = arr.scalars().unwrap().iter().map(|s| s.to_string()).collect();
        assert_eq!(printed, vec!["1.5", "2", "3", "4"]);
        assert_eq!(arr.scalar_at(&[1, 0]).unwrap(), Scalar::F32(3.0));

        let nested = arr.to_nested().unwrap();
        assert_eq!(
            nested,
            DynamicValue::Sequence(vec![
                DynamicValue::Sequence(vec![DynamicValue::float(1.5), DynamicValue::float(2.0)]),
                DynamicValue::Sequence(vec![DynamicValue::float(3.0), DynamicValue::float(4.0)]),
            ])
        );
    }

    #[test]
    fn test_zero_dimensional_array() {
        let arr = ArrayView::from_vec(vec![7i64], vec![]).unwrap();
        assert_eq!(arr.size(), 1);
        assert_eq!(arr.to_nested().unwrap(), DynamicValue::int(7));
        arr.map_inplace::<i64>(|v| v + 1).unwrap();
        assert_eq!(arr.get::<i64>(&[]).unwrap(), 8);
    }

    #[test]
    fn test_broadcast_layout_is_not_mutable() {
        let arr = ArrayView::wrap(vec![0; 4], vec![3], vec![0], DType::Int32).unwrap();
        assert_eq!(arr.values::<i32>().unwrap(), vec![0, 0, 0]);
        assert!(matches!(
            arr.map_inplace::<i32>(|v| v + 1),
            Err(BridgeError::BufferLayout { .. })
        ));
    }
}

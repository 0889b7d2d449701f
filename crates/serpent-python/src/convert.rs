//! Conversion between Python objects and bridge values.
//!
//! Objects exposing the buffer protocol (NumPy arrays, `array.array`,
//! `memoryview`, ...) are wrapped without copying: native code writes into
//! the caller's memory. The buffer stays acquired, and its exporter alive,
//! until the last view of it is dropped.

use std::ffi::CStr;
use std::mem;
use std::ptr::NonNull;
use std::slice;

use pyo3::exceptions::PyRuntimeError;
use pyo3::ffi;
use pyo3::prelude::*;
use pyo3::types::{
    PyBool, PyBytes, PyComplex, PyDict, PyFloat, PyInt, PyList, PyString, PyTuple,
};
use serpent_bridge::{
    ArrayLayout, ArrayOwnership, ArrayView, BridgeError, BridgeResult, DType, DynamicValue,
    FloatType, IntType, MapKey, Mapping,
};
use tracing::trace;

use crate::objects::PyNativeObject;

/// Every bridge error reaches Python as `RuntimeError`.
pub(crate) fn to_py_err(error: BridgeError) -> PyErr {
    PyRuntimeError::new_err(error.to_string())
}

// ============================================================================
// Buffers
// ============================================================================

/// An acquired `Py_buffer` and the object that exported it.
pub(crate) struct BufferOwner {
    object: Py<PyAny>,
    raw: Box<ffi::Py_buffer>,
}

impl BufferOwner {
    pub(crate) fn object(&self) -> &Py<PyAny> {
        &self.object
    }
}

impl Drop for BufferOwner {
    fn drop(&mut self) {
        // SAFETY: `raw` was filled by a successful `PyObject_GetBuffer` and
        // is released exactly once, here.
        Python::attach(|_| unsafe { ffi::PyBuffer_Release(&mut *self.raw) });
    }
}

fn acquire_buffer(obj: &Bound<'_, PyAny>) -> BridgeResult<BufferOwner> {
    let py = obj.py();
    let mut last_error = None;
    // Writable first; read-only exporters refuse that and get a second try.
    for flags in [ffi::PyBUF_RECORDS, ffi::PyBUF_RECORDS_RO] {
        // SAFETY: an all-zero `Py_buffer` is a valid request target.
        let mut raw: Box<ffi::Py_buffer> = Box::new(unsafe { mem::zeroed() });
        // SAFETY: `obj` is alive for the call and `raw` points to writable
        // memory of the right type.
        let status = unsafe { ffi::PyObject_GetBuffer(obj.as_ptr(), &mut *raw, flags) };
        if status == 0 {
            return Ok(BufferOwner {
                object: obj.clone().unbind(),
                raw,
            });
        }
        last_error = PyErr::take(py);
    }
    Err(BridgeError::buffer_layout(match last_error {
        Some(err) => err.to_string(),
        None => "object refused to export a buffer".to_string(),
    }))
}

fn wrap_buffer(obj: &Bound<'_, PyAny>) -> BridgeResult<ArrayView> {
    let owner = acquire_buffer(obj)?;
    let raw: &ffi::Py_buffer = &owner.raw;

    let format = if raw.format.is_null() {
        "B".to_string()
    } else {
        // SAFETY: a non-null format is a NUL-terminated string owned by the
        // exporter for the lifetime of the buffer.
        unsafe { CStr::from_ptr(raw.format) }
            .to_string_lossy()
            .into_owned()
    };
    let dtype = DType::from_buffer_format(&format)
        .ok_or_else(|| BridgeError::unsupported_dtype(format.clone()))?;
    if raw.itemsize as usize != dtype.size() {
        return Err(BridgeError::buffer_layout(format!(
            "format '{}' has {}-byte items but the buffer reports {}",
            format,
            dtype.size(),
            raw.itemsize
        )));
    }
    if !raw.suboffsets.is_null() {
        return Err(BridgeError::buffer_layout("indirect buffers are not supported"));
    }

    let ndim = raw.ndim as usize;
    let shape: Vec<usize> = if ndim == 0 {
        Vec::new()
    } else if raw.shape.is_null() {
        vec![raw.len as usize / dtype.size()]
    } else {
        // SAFETY: `shape` holds `ndim` entries while the buffer is held.
        unsafe { slice::from_raw_parts(raw.shape, ndim) }
            .iter()
            .map(|&dim| dim as usize)
            .collect()
    };
    let layout = if raw.strides.is_null() || ndim == 0 {
        ArrayLayout::c_contiguous(shape, dtype)
    } else {
        // SAFETY: `strides` holds `ndim` entries while the buffer is held.
        let strides = unsafe { slice::from_raw_parts(raw.strides, ndim) }.to_vec();
        ArrayLayout::strided(shape, strides, dtype, 0)?
    };

    let len = layout.byte_extent()?;
    let readonly = raw.readonly != 0;
    let ptr = NonNull::new(raw.buf.cast::<u8>())
        .or_else(|| (len == 0).then(NonNull::dangling))
        .ok_or_else(|| BridgeError::buffer_layout("buffer has no data pointer"))?;

    trace!(%dtype, shape = ?layout.shape, strides = ?layout.strides, readonly, "borrowing buffer");
    // SAFETY: the exporter keeps `len` bytes at `ptr` valid until the buffer
    // is released, which happens when `owner` (held by the view) drops. The
    // GIL serializes native and Python access.
    unsafe { ArrayView::from_raw_parts(ptr, len, layout, readonly, Box::new(owner)) }
}

fn exports_buffer(obj: &Bound<'_, PyAny>) -> bool {
    // SAFETY: `obj` is a live object.
    unsafe { ffi::PyObject_CheckBuffer(obj.as_ptr()) == 1 }
}

// ============================================================================
// Python -> DynamicValue
// ============================================================================

/// Convert a Python object, refusing containers nested beyond `max_depth`.
pub(crate) fn py_to_dynamic(obj: &Bound<'_, PyAny>, max_depth: usize) -> BridgeResult<DynamicValue> {
    convert(obj, 0, max_depth)
}

fn type_name(obj: &Bound<'_, PyAny>) -> String {
    obj.get_type()
        .name()
        .map(|name| name.to_string())
        .unwrap_or_else(|_| "object".to_string())
}

fn convert(obj: &Bound<'_, PyAny>, depth: usize, max_depth: usize) -> BridgeResult<DynamicValue> {
    if depth > max_depth {
        return Err(BridgeError::nesting_too_deep(max_depth));
    }

    if obj.is_none() {
        return Ok(DynamicValue::None);
    }
    if let Ok(b) = obj.cast_exact::<PyBool>() {
        return Ok(DynamicValue::Bool(b.is_true()));
    }
    if let Ok(i) = obj.cast::<PyInt>() {
        let n: i128 = i
            .extract()
            .map_err(|_| BridgeError::numeric_overflow(i.to_string(), "i128"))?;
        return Ok(DynamicValue::Int(n, IntType::Unbounded));
    }
    if let Ok(f) = obj.cast::<PyFloat>() {
        return Ok(DynamicValue::float(f.value()));
    }
    if let Ok(c) = obj.cast::<PyComplex>() {
        return Ok(DynamicValue::Complex(c.real(), c.imag(), FloatType::F64));
    }
    if let Ok(s) = obj.cast::<PyString>() {
        let text = s
            .to_str()
            .map_err(|e| BridgeError::encoding_error(e.to_string()))?;
        return Ok(DynamicValue::str(text));
    }
    if let Ok(b) = obj.cast::<PyBytes>() {
        return Ok(DynamicValue::Bytes(b.as_bytes().to_vec()));
    }
    if let Ok(list) = obj.cast::<PyList>() {
        return convert_items(list.iter(), depth, max_depth);
    }
    if let Ok(tuple) = obj.cast::<PyTuple>() {
        return convert_items(tuple.iter(), depth, max_depth);
    }
    if let Ok(dict) = obj.cast::<PyDict>() {
        let mut map = Mapping::with_capacity(dict.len());
        for (k, v) in dict.iter() {
            let key = convert(&k, depth + 1, max_depth)
                .and_then(|key| MapKey::from_value(&key))
                .map_err(|e| e.within("[key]"))?;
            let value = convert(&v, depth + 1, max_depth)
                .map_err(|e| e.within(&format!("[{}]", key)))?;
            map.insert(key, value);
        }
        return Ok(DynamicValue::Mapping(map));
    }
    if let Ok(native) = obj.cast::<PyNativeObject>() {
        return Ok(DynamicValue::Object(native.borrow().handle().clone()));
    }
    if let Some(value) = number_scalar(obj)
        .map_err(|_| BridgeError::type_mismatch("a number", type_name(obj)))?
    {
        return Ok(value);
    }
    if exports_buffer(obj) {
        return wrap_buffer(obj).map(DynamicValue::Array);
    }

    Err(BridgeError::type_mismatch(
        "a convertible value",
        type_name(obj),
    ))
}

/// Numbers that are not builtin numbers, such as `numpy.int64` or
/// `numpy.float32`. Array scalars also export buffers, so they are read
/// here first to stay scalars instead of becoming 0-d arrays.
fn number_scalar(obj: &Bound<'_, PyAny>) -> PyResult<Option<DynamicValue>> {
    let py = obj.py();
    let numbers = PyModule::import(py, "numbers")?;
    if obj.is_instance(&numbers.getattr("Integral")?)? {
        let n: i128 = obj.call_method0("__index__")?.extract()?;
        return Ok(Some(DynamicValue::Int(n, IntType::Unbounded)));
    }
    if obj.is_instance(&numbers.getattr("Real")?)? {
        let f: f64 = obj.call_method0("__float__")?.extract()?;
        return Ok(Some(DynamicValue::float(f)));
    }
    if obj.is_instance(&numbers.getattr("Complex")?)? {
        let complex = py.get_type::<PyComplex>().call1((obj,))?;
        let complex = complex.cast::<PyComplex>()?;
        return Ok(Some(DynamicValue::Complex(
            complex.real(),
            complex.imag(),
            FloatType::F64,
        )));
    }
    Ok(None)
}

fn convert_items<'py>(
    items: impl Iterator<Item = Bound<'py, PyAny>>,
    depth: usize,
    max_depth: usize,
) -> BridgeResult<DynamicValue> {
    items
        .enumerate()
        .map(|(i, item)| {
            convert(&item, depth + 1, max_depth).map_err(|e| e.within(&format!("[{}]", i)))
        })
        .collect::<BridgeResult<Vec<_>>>()
        .map(DynamicValue::Sequence)
}

// ============================================================================
// DynamicValue -> Python
// ============================================================================

/// Convert a bridge value into a new Python object.
///
/// A buffer borrowed from Python comes back as the original object; arrays
/// owned by native code, and views derived from borrowed ones, become
/// nested lists.
pub(crate) fn dynamic_to_py(
    py: Python<'_>,
    value: &DynamicValue,
    max_depth: usize,
) -> PyResult<Py<PyAny>> {
    match value {
        DynamicValue::None => Ok(py.None()),
        DynamicValue::Bool(b) => Ok(PyBool::new(py, *b).to_owned().into_any().unbind()),
        DynamicValue::Int(n, _) => Ok((*n).into_pyobject(py)?.into_any().unbind()),
        DynamicValue::Float(f, _) => Ok(PyFloat::new(py, *f).into_any().unbind()),
        DynamicValue::Complex(re, im, _) => {
            Ok(PyComplex::from_doubles(py, *re, *im).into_any().unbind())
        }
        DynamicValue::Str(s) => Ok(PyString::new(py, s).into_any().unbind()),
        DynamicValue::Bytes(b) => Ok(PyBytes::new(py, b).into_any().unbind()),
        DynamicValue::Sequence(items) => {
            let list = PyList::empty(py);
            for item in items {
                list.append(dynamic_to_py(py, item, max_depth)?)?;
            }
            Ok(list.into_any().unbind())
        }
        DynamicValue::Mapping(map) => {
            let dict = PyDict::new(py);
            for (k, v) in map {
                dict.set_item(
                    dynamic_to_py(py, &k.to_value(), max_depth)?,
                    dynamic_to_py(py, v, max_depth)?,
                )?;
            }
            Ok(dict.into_any().unbind())
        }
        DynamicValue::Object(handle) => {
            let object = PyNativeObject::new(handle.clone(), max_depth);
            Ok(Py::new(py, object)?.into_any())
        }
        DynamicValue::Array(view) => {
            if view.ownership() == ArrayOwnership::Borrowed {
                if let Some(owner) = view.keepalive::<BufferOwner>() {
                    return Ok(owner.object().clone_ref(py));
                }
            }
            let nested = view.to_nested().map_err(to_py_err)?;
            dynamic_to_py(py, &nested, max_depth)
        }
    }
}

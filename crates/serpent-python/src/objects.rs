//! Python classes wrapping native functions and object handles.
//!
//! All three classes are `unsendable`: bridge values are reference counted
//! without atomics and stay on the thread that created them.

use pyo3::exceptions::PyAttributeError;
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyTuple};
use serpent_bridge::{DynamicValue, FunctionBinding, Keywords, ObjectHandle, ParamSpec};
use smol_str::SmolStr;

use crate::convert::{dynamic_to_py, py_to_dynamic, to_py_err};

/// Convert call arguments, naming the parameter in conversion errors.
fn collect_args(
    args: &Bound<'_, PyTuple>,
    kwargs: Option<&Bound<'_, PyDict>>,
    params: &[ParamSpec],
    max_depth: usize,
) -> PyResult<(Vec<DynamicValue>, Keywords)> {
    let mut positional = Vec::with_capacity(args.len());
    for (i, arg) in args.iter().enumerate() {
        let value = py_to_dynamic(&arg, max_depth).map_err(|e| {
            to_py_err(match params.get(i) {
                Some(param) => e.within(&param.name),
                None => e,
            })
        })?;
        positional.push(value);
    }

    let mut keywords = Keywords::new();
    if let Some(kwargs) = kwargs {
        for (key, value) in kwargs.iter() {
            let name: String = key.extract()?;
            let value = py_to_dynamic(&value, max_depth).map_err(|e| to_py_err(e.within(&name)))?;
            keywords.insert(SmolStr::new(name), value);
        }
    }
    Ok((positional, keywords))
}

/// A native function exported at module level.
#[pyclass(name = "NativeFunction", module = "testmodule", unsendable)]
pub struct PyNativeFunction {
    binding: FunctionBinding,
    max_depth: usize,
}

impl PyNativeFunction {
    pub(crate) fn new(binding: FunctionBinding, max_depth: usize) -> Self {
        Self { binding, max_depth }
    }
}

#[pymethods]
impl PyNativeFunction {
    #[pyo3(signature = (*args, **kwargs))]
    fn __call__(
        &self,
        py: Python<'_>,
        args: &Bound<'_, PyTuple>,
        kwargs: Option<&Bound<'_, PyDict>>,
    ) -> PyResult<Py<PyAny>> {
        let (positional, keywords) =
            collect_args(args, kwargs, self.binding.params(), self.max_depth)?;
        let result = self
            .binding
            .invoke(positional, keywords)
            .map_err(to_py_err)?;
        dynamic_to_py(py, &result, self.max_depth)
    }

    /// Exported name
    #[getter(__name__)]
    fn name(&self) -> String {
        self.binding.name().to_string()
    }

    /// `Name(arg1: int, ...) -> int`
    #[getter]
    fn signature(&self) -> String {
        self.binding.signature_text()
    }

    /// Signature followed by the documentation
    #[getter]
    fn doc(&self) -> String {
        self.binding.doc_text()
    }

    fn __repr__(&self) -> String {
        format!("<native function {}>", self.binding.signature_text())
    }
}

/// A native instance. Methods and properties resolve by name on access.
#[pyclass(name = "NativeObject", module = "testmodule", unsendable)]
pub struct PyNativeObject {
    handle: ObjectHandle,
    max_depth: usize,
}

impl PyNativeObject {
    pub(crate) fn new(handle: ObjectHandle, max_depth: usize) -> Self {
        Self { handle, max_depth }
    }

    pub(crate) fn handle(&self) -> &ObjectHandle {
        &self.handle
    }

    fn no_attribute(&self, name: &str) -> PyErr {
        PyAttributeError::new_err(format!(
            "'{}' object has no attribute '{}'",
            self.handle.class_name(),
            name
        ))
    }
}

#[pymethods]
impl PyNativeObject {
    fn __getattr__(&self, py: Python<'_>, name: &str) -> PyResult<Py<PyAny>> {
        let class = self.handle.class();
        if class.has_method(name) {
            let method = PyBoundMethod {
                handle: self.handle.clone(),
                name: SmolStr::new(name),
                max_depth: self.max_depth,
            };
            return Ok(Py::new(py, method)?.into_any());
        }
        if class.has_property(name) {
            let value = self.handle.get_attr(name).map_err(to_py_err)?;
            return dynamic_to_py(py, &value, self.max_depth);
        }
        Err(self.no_attribute(name))
    }

    fn __setattr__(&self, name: &str, value: &Bound<'_, PyAny>) -> PyResult<()> {
        if !self.handle.class().has_property(name) {
            return Err(self.no_attribute(name));
        }
        let value = py_to_dynamic(value, self.max_depth).map_err(|e| to_py_err(e.within(name)))?;
        self.handle.set_attr(name, &value).map_err(to_py_err)
    }

    fn __dir__(&self) -> Vec<String> {
        let class = self.handle.class();
        class
            .method_names()
            .into_iter()
            .chain(class.property_names())
            .map(|name| name.to_string())
            .collect()
    }

    fn __repr__(&self) -> String {
        format!("<{} object #{}>", self.handle.class_name(), self.handle.id())
    }
}

/// A method looked up on a [`PyNativeObject`], callable later.
#[pyclass(name = "BoundMethod", module = "testmodule", unsendable)]
pub struct PyBoundMethod {
    handle: ObjectHandle,
    name: SmolStr,
    max_depth: usize,
}

#[pymethods]
impl PyBoundMethod {
    #[pyo3(signature = (*args, **kwargs))]
    fn __call__(
        &self,
        py: Python<'_>,
        args: &Bound<'_, PyTuple>,
        kwargs: Option<&Bound<'_, PyDict>>,
    ) -> PyResult<Py<PyAny>> {
        // Resolved again at call time; the class may have changed since lookup.
        let params = self
            .handle
            .class()
            .method(&self.name)
            .map(|method| method.params().to_vec())
            .unwrap_or_default();
        let (positional, keywords) = collect_args(args, kwargs, &params, self.max_depth)?;
        let result = self
            .handle
            .invoke(&self.name, positional, keywords)
            .map_err(to_py_err)?;
        dynamic_to_py(py, &result, self.max_depth)
    }

    fn __repr__(&self) -> String {
        format!(
            "<bound method {}.{} of <{} object #{}>>",
            self.handle.class_name(),
            self.name,
            self.handle.class_name(),
            self.handle.id()
        )
    }
}

//! CPython extension serving the serpent test modules.
//!
//! Importing `testmodule` exposes every function of the basic test module
//! plus a `testmodule.numpy` submodule with the array routines. The
//! submodule is also importable as `testmodulenumpy`:
//!
//! ```python
//! import testmodule as tm
//! import testmodulenumpy as tmn
//!
//! assert tm.FunctionReturnInt(42) == 84
//! obj = tm.NewExportedType(1234)
//! obj.Add(1)
//! assert obj.GetValue() == 1235
//!
//! y = numpy.arange(0, 42, dtype=numpy.int32)
//! tmn.AddIntValue(y, 84)
//! ```
//!
//! Every failure raised by native code, and every argument that cannot be
//! converted, surfaces as `RuntimeError`. Looking up an attribute a native
//! object does not have raises `AttributeError`.
//!
//! `SERPENT_CONFIG` and `SERPENT_NAMING` are read once at import; see
//! [`serpent_bridge::BridgeConfig::from_env`]. `SERPENT_LOG` controls log
//! output.

mod convert;
mod logging;
mod objects;

use pyo3::prelude::*;
use serpent_bridge::{BridgeConfig, NativeModule};
use serpent_testmodule::{basic_module, numpy_module};
use tracing::debug;

pub use objects::{PyBoundMethod, PyNativeFunction, PyNativeObject};

use crate::convert::to_py_err;

/// Add every function of `native` to `target` as a callable attribute.
fn export(target: &Bound<'_, PyModule>, native: &NativeModule) -> PyResult<()> {
    let py = target.py();
    let max_depth = native.config().max_depth;
    for binding in native.functions() {
        let function = PyNativeFunction::new(binding.clone(), max_depth);
        target.add(binding.name(), Py::new(py, function)?)?;
    }
    if let Some(doc) = native.doc() {
        target.add("__doc__", doc)?;
    }
    target.add("__signatures__", native.describe())?;
    debug!(module = native.name(), "exported native module");
    Ok(())
}

#[pymodule]
fn testmodule(m: &Bound<'_, PyModule>) -> PyResult<()> {
    logging::init();
    let py = m.py();
    let config = BridgeConfig::from_env().map_err(to_py_err)?;

    export(m, &basic_module(config.clone()).map_err(to_py_err)?)?;

    let numpy = PyModule::new(py, "numpy")?;
    export(&numpy, &numpy_module(config).map_err(to_py_err)?)?;
    m.add_submodule(&numpy)?;
    // Both import paths resolve through sys.modules.
    let modules = PyModule::import(py, "sys")?.getattr("modules")?;
    for name in ["testmodule.numpy", "testmodulenumpy"] {
        modules.set_item(name, &numpy)?;
    }

    m.add_class::<PyNativeFunction>()?;
    m.add_class::<PyNativeObject>()?;
    m.add_class::<PyBoundMethod>()?;
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;

    Ok(())
}

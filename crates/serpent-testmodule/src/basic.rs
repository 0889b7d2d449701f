//! Scalar, container, error and object functions.

use std::collections::HashMap;

use serpent_bridge::{
    BridgeConfig, BridgeResult, Bytes, ClassBuilder, Complex, FunctionBinding, ModuleBuilder,
    NativeClass, NativeFailure, NativeModule,
};
use tracing::info;

/// Logs its arguments.
pub fn function_with_args(arg1: i64, arg2: i64, arg3: String) {
    info!(arg1, arg2, arg3 = %arg3, "FunctionWithArgs");
}

pub fn basic_function() {
    info!("BasicFunction");
}

/// Echoes `arg`; zero is rejected.
pub fn basic_function_with_error(arg: i64) -> Result<i64, NativeFailure> {
    if arg == 0 {
        return Err(NativeFailure::new("Invalid argument"));
    }
    Ok(arg)
}

pub fn function_return_bool(value: bool) -> bool {
    value
}

pub fn function_return_none() {
    info!("FunctionReturnNone");
}

macro_rules! doubling {
    ($($name:ident: $ty:ty;)*) => {
        $(
            /// Doubles `arg`, failing when the result does not fit.
            pub fn $name(arg: $ty) -> Result<$ty, NativeFailure> {
                arg.checked_mul(2).ok_or_else(|| {
                    NativeFailure::new(format!(
                        "integer overflow: 2 * {} does not fit {}",
                        arg,
                        stringify!($ty)
                    ))
                })
            }
        )*
    };
}

doubling! {
    function_return_int: i64;
    function_return_int8: i8;
    function_return_int16: i16;
    function_return_int32: i32;
    function_return_uint: u64;
    function_return_uint8: u8;
    function_return_uint16: u16;
    function_return_uint32: u32;
}

/// `[arg, arg + 1]`
pub fn function_return_int_list(arg: i64) -> Result<Vec<i64>, NativeFailure> {
    let next = arg
        .checked_add(1)
        .ok_or_else(|| NativeFailure::new("integer overflow"))?;
    Ok(vec![arg, next])
}

/// `[arg, 2 * arg]` as floats
pub fn function_return_int_float(arg: i64) -> Vec<f64> {
    let value = arg as f64;
    vec![value, value * 2.0]
}

pub fn function_return_error(arg: i64) -> Result<(), NativeFailure> {
    info!(arg, "FunctionReturnError");
    Err(NativeFailure::new("Example error"))
}

pub fn function_return_complex64(arg: Complex<f32>) -> Complex<f32> {
    Complex::new(arg.re * 2.0, arg.im * 2.0)
}

pub fn function_return_complex128(arg: Complex<f64>) -> Complex<f64> {
    Complex::new(arg.re * 2.0, arg.im * 2.0)
}

/// Whether `key` is present in `map`
pub fn function_map_argument(map: HashMap<String, i64>, key: String) -> bool {
    map.contains_key(&key)
}

pub fn function_list_argument(items: Vec<i64>) -> usize {
    items.len()
}

pub fn function_return_bytes() -> Bytes {
    Bytes::from(b"Hello world!".as_slice())
}

/// Opaque type with a mutable value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedType {
    value: i64,
}

impl ExportedType {
    pub fn new(value: i64) -> Self {
        Self { value }
    }

    pub fn get_value(&mut self) -> i64 {
        self.value
    }

    /// Add `delta` to the stored value
    pub fn add(&mut self, delta: i64) -> Result<(), NativeFailure> {
        self.value = self
            .value
            .checked_add(delta)
            .ok_or_else(|| NativeFailure::new("integer overflow"))?;
        Ok(())
    }
}

pub fn exported_type_class() -> NativeClass {
    ClassBuilder::<ExportedType>::new("ExportedType")
        .doc("Opaque native value with GetValue and Add.")
        .constructor("NewExportedType", ExportedType::new)
        .method("GetValue", ExportedType::get_value)
        .method("Add", ExportedType::add)
        .property("Value", |t: &ExportedType| t.value)
        .build()
}

/// The `testmodule` module
pub fn basic_module(config: BridgeConfig) -> BridgeResult<NativeModule> {
    ModuleBuilder::new("testmodule")
        .doc("Functions exercising argument and return value marshalling.")
        .config(config)
        .function(
            FunctionBinding::new("FunctionWithArgs", function_with_args)
                .with_doc("Takes two integers and a string; returns nothing."),
        )
        .function(FunctionBinding::new("BasicFunction", basic_function))
        .function(
            FunctionBinding::new("BasicFunctionWithError", basic_function_with_error)
                .with_doc("Returns its argument; fails when it is 0."),
        )
        .function(FunctionBinding::new("FunctionReturnBool", function_return_bool))
        .function(FunctionBinding::new("FunctionReturnNone", function_return_none))
        .function(FunctionBinding::new("FunctionReturnInt", function_return_int))
        .function(FunctionBinding::new("FunctionReturnInt8", function_return_int8))
        .function(FunctionBinding::new("FunctionReturnInt16", function_return_int16))
        .function(FunctionBinding::new("FunctionReturnInt32", function_return_int32))
        .function(FunctionBinding::new("FunctionReturnUint", function_return_uint))
        .function(FunctionBinding::new("FunctionReturnUint8", function_return_uint8))
        .function(FunctionBinding::new("FunctionReturnUint16", function_return_uint16))
        .function(FunctionBinding::new("FunctionReturnUint32", function_return_uint32))
        .function(FunctionBinding::new("FunctionReturnIntList", function_return_int_list))
        .function(FunctionBinding::new("FunctionReturnIntFloat", function_return_int_float))
        .function(FunctionBinding::new("FunctionReturnComplex64", function_return_complex64))
        .function(FunctionBinding::new("FunctionReturnComplex128", function_return_complex128))
        .function(FunctionBinding::new("FunctionReturnError", function_return_error))
        .function(
            FunctionBinding::new("FunctionMapArgument", function_map_argument)
                .with_params(["map", "key"]),
        )
        .function(FunctionBinding::new("FunctionListArgument", function_list_argument))
        .function(FunctionBinding::new("FunctionReturnBytes", function_return_bytes))
        .class(exported_type_class())
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_doubling_widths() {
        assert_eq!(function_return_int8(63).unwrap(), 126);
        assert!(function_return_int8(64).is_err());
        assert_eq!(function_return_int8(-64).unwrap(), -128);
        assert_eq!(function_return_uint8(127).unwrap(), 254);
        assert!(function_return_uint8(128).is_err());
        assert_eq!(function_return_int16(-16384).unwrap(), i16::MIN);
        assert!(function_return_int32(i32::MAX / 2 + 1).is_err());
        assert_eq!(function_return_uint(u64::MAX / 2).unwrap(), u64::MAX - 1);
        assert_eq!(
            function_return_int(i64::MAX).unwrap_err().message(),
            "integer overflow: 2 * 9223372036854775807 does not fit i64"
        );
    }

    #[test]
    fn test_complex_doubling() {
        assert_eq!(
            function_return_complex128(Complex::new(1.5, -2.0)),
            Complex::new(3.0, -4.0)
        );
        let narrow = function_return_complex64(Complex::new(f32::MAX, 1.0));
        assert!(narrow.re.is_infinite());
        assert_eq!(narrow.im, 2.0);
    }

    #[test]
    fn test_sentinel() {
        assert_eq!(basic_function_with_error(7).unwrap(), 7);
        assert_eq!(basic_function_with_error(-3).unwrap(), -3);
        assert_eq!(
            basic_function_with_error(0).unwrap_err().message(),
            "Invalid argument"
        );
    }

    #[test]
    fn test_exported_type() {
        let mut value = ExportedType::new(1234);
        value.add(1).unwrap();
        value.add(10).unwrap();
        assert_eq!(value.get_value(), 1245);
        assert!(ExportedType::new(i64::MAX).add(1).is_err());
    }

    #[test]
    fn test_bytes_decode_as_text() {
        let bytes = function_return_bytes().into_inner();
        assert_eq!(String::from_utf8(bytes).unwrap(), "Hello world!");
    }
}

//! Array functions.
//!
//! Every function receives the caller's array as a view; `AddIntValue`
//! writes through it, so the caller observes the change without a copy.

use serpent_bridge::{
    ArrayView, BridgeConfig, BridgeError, BridgeResult, DType, FunctionBinding, ModuleBuilder,
    NativeModule,
};

/// `type=int64 dims=2 shape=[3, 4]`
pub fn describe(array: &ArrayView) -> String {
    format!(
        "type={} dims={} shape={:?}",
        array.dtype(),
        array.ndim(),
        array.shape()
    )
}

/// One `[i, j] = value` line per element, in C order
pub fn value_lines(array: &ArrayView) -> BridgeResult<Vec<String>> {
    let scalars = array.scalars()?;
    Ok(array
        .indices()
        .zip(scalars)
        .map(|(index, value)| format!("{:?} = {}", index, value))
        .collect())
}

pub fn print_descr(array: ArrayView) {
    println!("{}", describe(&array));
}

pub fn print_values(array: ArrayView) -> BridgeResult<()> {
    for line in value_lines(&array)? {
        println!("{}", line);
    }
    Ok(())
}

/// Add `value` to every element in place.
///
/// Integer elements wrap at their width (`value` is first reduced modulo
/// the width); float elements use IEEE addition.
pub fn add_int_value(array: ArrayView, value: i64) -> BridgeResult<()> {
    match array.dtype() {
        DType::Int8 => array.map_inplace(|x: i8| x.wrapping_add(value as i8)),
        DType::Int16 => array.map_inplace(|x: i16| x.wrapping_add(value as i16)),
        DType::Int32 => array.map_inplace(|x: i32| x.wrapping_add(value as i32)),
        DType::Int64 => array.map_inplace(|x: i64| x.wrapping_add(value)),
        DType::UInt8 => array.map_inplace(|x: u8| x.wrapping_add(value as u8)),
        DType::UInt16 => array.map_inplace(|x: u16| x.wrapping_add(value as u16)),
        DType::UInt32 => array.map_inplace(|x: u32| x.wrapping_add(value as u32)),
        DType::UInt64 => array.map_inplace(|x: u64| x.wrapping_add(value as u64)),
        DType::Float32 => array.map_inplace(|x: f32| x + value as f32),
        DType::Float64 => array.map_inplace(|x: f64| x + value as f64),
        other => Err(BridgeError::unsupported_dtype(other.name())),
    }
}

/// The `testmodule.numpy` module
pub fn numpy_module(config: BridgeConfig) -> BridgeResult<NativeModule> {
    ModuleBuilder::new("testmodulenumpy")
        .doc("Functions reading and mutating NumPy arrays in place.")
        .config(config)
        .function(
            FunctionBinding::new("PrintDescr", print_descr)
                .with_params(["obj"])
                .with_doc("Print dtype, dimension count and shape."),
        )
        .function(
            FunctionBinding::new("PrintValues", print_values)
                .with_params(["obj"])
                .with_doc("Print every element with its index."),
        )
        .function(
            FunctionBinding::new("AddIntValue", add_int_value)
                .with_params(["obj", "v"])
                .with_doc("Add v to every element of obj, in place."),
        )
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_describe() {
        let values: Vec<i64> = (0..12).collect();
        let array = ArrayView::from_vec(values, vec![3, 4]).unwrap();
        assert_eq!(describe(&array), "type=int64 dims=2 shape=[3, 4]");
    }

    #[test]
    fn test_value_lines() {
        let array = ArrayView::from_vec(vec![1i16, 2, 3, 4], vec![2, 2]).unwrap();
        assert_eq!(
            value_lines(&array).unwrap(),
            vec!["[0, 0] = 1", "[0, 1] = 2", "[1, 0] = 3", "[1, 1] = 4"]
        );
    }

    #[test]
    fn test_add_wraps_integers() {
        let array = ArrayView::from_vec(vec![i16::MAX, 0], vec![2]).unwrap();
        add_int_value(array.clone(), 1).unwrap();
        assert_eq!(array.values::<i16>().unwrap(), vec![i16::MIN, 1]);
    }

    #[test]
    fn test_add_to_transposed_view() {
        let base = ArrayView::from_vec(vec![0.5f32, 1.5, 2.5, 3.5, 4.5, 5.5], vec![2, 3]).unwrap();
        let view = base.transpose();
        add_int_value(view, 2).unwrap();
        assert_eq!(
            base.values::<f32>().unwrap(),
            vec![2.5, 3.5, 4.5, 5.5, 6.5, 7.5]
        );
    }
}

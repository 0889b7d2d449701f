//! End-to-end tests: modules, classes, borrowed arrays and configuration.

use std::collections::HashMap;
use std::fs;
use std::ptr::NonNull;

use pretty_assertions::assert_eq;
use serpent_bridge::{
    ArrayLayout, ArrayView, BridgeConfig, BridgeError, ClassBuilder, DType, DynamicValue,
    ErrorKind, FromDynamic, FunctionBinding, Keywords, ModuleBuilder, NamingStyle, NativeFailure,
    NativeModule, ToDynamic,
};
use smol_str::SmolStr;
use tempfile::TempDir;

struct Counter {
    count: i64,
}

fn add_to_all(array: ArrayView, delta: i32) -> Result<(), BridgeError> {
    array.map_inplace::<i32>(|v| v.wrapping_add(delta))
}

fn build_module(config: BridgeConfig) -> NativeModule {
    let counter = ClassBuilder::<Counter>::new("Counter")
        .constructor("NewCounter", |count: i64| Counter { count })
        .method("GetValue", |c: &mut Counter| c.count)
        .method("Add", |c: &mut Counter, delta: i64| c.count += delta)
        .build();

    ModuleBuilder::new("integration")
        .config(config)
        .function(FunctionBinding::new("AddToAll", add_to_all).with_params(["array", "delta"]))
        .function(FunctionBinding::new("Total", |groups: Vec<HashMap<String, i64>>| {
            groups.iter().flat_map(|g| g.values()).sum::<i64>()
        }))
        .function(FunctionBinding::new("Fail", || -> Result<(), NativeFailure> {
            Err(NativeFailure::new("Example error"))
        }))
        .class(counter)
        .build()
        .unwrap()
}

#[test]
fn test_borrowed_array_is_mutated_in_place() {
    let module = build_module(BridgeConfig::default());
    let mut data: Vec<i32> = vec![1, 2, 3, 4, 5, 6];
    let len = data.len() * std::mem::size_of::<i32>();
    let ptr = NonNull::new(data.as_mut_ptr() as *mut u8).unwrap();
    let layout = ArrayLayout::c_contiguous(vec![2, 3], DType::Int32);

    {
        // SAFETY: `data` outlives the view and is not touched while it exists.
        let view = unsafe { ArrayView::from_raw_parts(ptr, len, layout, false, Box::new(())) }
            .unwrap();
        let result = module
            .call(
                "AddToAll",
                vec![DynamicValue::Array(view.clone()), DynamicValue::int(10)],
            )
            .unwrap();
        assert_eq!(result, DynamicValue::None);
        assert_eq!(view.shape(), &[2, 3]);
        assert_eq!(view.dtype(), DType::Int32);
    }

    assert_eq!(data, vec![11, 12, 13, 14, 15, 16]);
}

#[test]
fn test_wrong_dtype_never_mutates() {
    let module = build_module(BridgeConfig::default());
    let view = ArrayView::from_vec(vec![1.0f64, 2.0], vec![2]).unwrap();
    let err = module
        .call("AddToAll", vec![DynamicValue::Array(view.clone()), DynamicValue::int(1)])
        .unwrap_err();
    assert!(err.is_type_error());
    assert_eq!(
        err.to_string(),
        "type mismatch: expected ndarray of int32, got ndarray of float64"
    );
    assert_eq!(view.values::<f64>().unwrap(), vec![1.0, 2.0]);
}

#[test]
fn test_nested_conversion_error_reports_path() {
    let module = build_module(BridgeConfig::default());
    let good = vec![
        HashMap::from([("a".to_string(), 1i64)]),
        HashMap::from([("b".to_string(), 2i64)]),
    ];
    assert_eq!(
        module.call("Total", vec![good.to_dynamic()]).unwrap(),
        DynamicValue::int(3)
    );

    let bad = DynamicValue::Sequence(vec![
        HashMap::from([("a".to_string(), 1i64)]).to_dynamic(),
        HashMap::from([("b".to_string(), "x".to_string())]).to_dynamic(),
    ]);
    let err = module.call("Total", vec![bad]).unwrap_err();
    assert_eq!(
        err.to_string(),
        "type mismatch at arg1[1]['b']: expected int, got str"
    );
}

#[test]
fn test_object_lifecycle_through_module() {
    let module = build_module(BridgeConfig::default());
    let value = module.call("NewCounter", vec![DynamicValue::int(5)]).unwrap();
    let handle = value.as_object().unwrap().clone();

    for _ in 0..3 {
        handle
            .invoke("Add", vec![DynamicValue::int(2)], Keywords::new())
            .unwrap();
    }
    assert_eq!(
        handle.invoke("GetValue", vec![], Keywords::new()).unwrap(),
        DynamicValue::int(11)
    );

    assert!(handle.release().unwrap());
    let err = handle.invoke("GetValue", vec![], Keywords::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UseAfterFree);
}

#[test]
fn test_native_error_is_distinguishable() {
    let module = build_module(BridgeConfig::default());
    for _ in 0..5 {
        let err = module.call("Fail", vec![]).unwrap_err();
        assert!(err.is_native());
        assert_eq!(err.to_string(), "Example error");
    }
}

#[test]
fn test_keyword_call_uses_exported_names() {
    let module = build_module(BridgeConfig {
        naming: NamingStyle::SnakeCase,
        ..BridgeConfig::default()
    });
    let view = ArrayView::from_vec(vec![1i32, 2], vec![2]).unwrap();
    let mut keywords = Keywords::new();
    keywords.insert(SmolStr::new("delta"), DynamicValue::int(-1));
    keywords.insert(SmolStr::new("array"), DynamicValue::Array(view.clone()));
    module.invoke("add_to_all", vec![], keywords).unwrap();
    assert_eq!(view.values::<i32>().unwrap(), vec![0, 1]);
    assert!(module.call("AddToAll", vec![]).is_err());
}

#[test]
fn test_config_file_drives_module() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("serpent.toml");
    fs::write(&path, "naming = \"snake_case\"\ncatch_panics = true\n").unwrap();

    let config = BridgeConfig::load(&path).unwrap();
    assert_eq!(config.naming, NamingStyle::SnakeCase);

    let module = build_module(config);
    let value = module.call("new_counter", vec![DynamicValue::int(1)]).unwrap();
    let handle = value.as_object().unwrap();
    assert_eq!(
        handle.invoke("get_value", vec![], Keywords::new()).unwrap(),
        DynamicValue::int(1)
    );

    fs::write(&path, "naming = 3\n").unwrap();
    assert_eq!(
        BridgeConfig::load(&path).unwrap_err().kind(),
        ErrorKind::Config
    );
}

#[test]
fn test_round_trip_preserves_values() {
    fn round_trip<T: ToDynamic + FromDynamic + PartialEq + std::fmt::Debug>(value: T) {
        let back = T::from_dynamic(&value.to_dynamic()).unwrap();
        assert_eq!(back, value);
    }

    round_trip(i8::MIN);
    round_trip(u64::MAX);
    round_trip(-1.5f32);
    round_trip(true);
    round_trip("text".to_string());
    round_trip(vec![vec![1u16, 2], vec![]]);
    round_trip(Some(3i32));
    round_trip(HashMap::from([(1i64, "one".to_string())]));
}

//! Function Adapter
//!
//! Wraps native Rust callables so a dynamic caller can invoke them with
//! positional and keyword arguments.
//!
//! Invocation happens in three steps:
//!
//! 1. Arguments are bound to the parameter list by position and name;
//!    count and keyword problems fail with an arity error.
//! 2. Every argument is converted to its native type; a mismatch fails
//!    with a type error naming the parameter. Native code has not run yet.
//! 3. The native function runs. Its `Err` return (or a panic) becomes a
//!    native error carrying the message.
//!
//! ## Example
//!
//! ```
//! use serpent_bridge::{DynamicValue, FunctionBinding, Keywords};
//!
//! fn add(a: i64, b: i64) -> i64 {
//!     a + b
//! }
//!
//! let binding = FunctionBinding::new("add", add).with_params(["a", "b"]);
//! let result = binding
//!     .invoke(vec![DynamicValue::int(2), DynamicValue::int(3)], Keywords::new())
//!     .unwrap();
//! assert_eq!(result, DynamicValue::int(5));
//! assert_eq!(binding.signature_text(), "add(a: int, b: int) -> int");
//! ```

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use indexmap::IndexMap;
use smol_str::SmolStr;
use tracing::{debug, warn};

use crate::config::DEFAULT_MAX_DEPTH;
use crate::conversion::{check_depth, FromDynamic, ToDynamic};
use crate::error::{BridgeError, BridgeResult};
use crate::types::NativeType;
use crate::value::DynamicValue;

/// Keyword arguments, in the order the caller passed them
pub type Keywords = IndexMap<SmolStr, DynamicValue>;

// ============================================================================
// Parameters
// ============================================================================

/// One declared parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    /// Name used for keyword matching and error messages
    pub name: SmolStr,
    /// Native type the argument converts to
    pub ty: NativeType,
    /// Value used when the caller omits the argument
    pub default: Option<DynamicValue>,
}

impl ParamSpec {
    /// Create a required parameter
    pub fn new(name: impl Into<SmolStr>, ty: NativeType) -> Self {
        Self {
            name: name.into(),
            ty,
            default: None,
        }
    }

    /// Check if the caller must supply this parameter
    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

impl fmt::Display for ParamSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.ty.type_hint())?;
        if let Some(default) = &self.default {
            write!(f, " = {}", default)?;
        }
        Ok(())
    }
}

pub(crate) fn default_params(types: Vec<NativeType>) -> Vec<ParamSpec> {
    types
        .into_iter()
        .enumerate()
        .map(|(i, ty)| ParamSpec::new(format!("arg{}", i + 1), ty))
        .collect()
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

/// Match positional and keyword arguments to `params`, filling defaults.
///
/// The result has exactly one value per parameter, in declaration order.
pub fn bind_arguments(
    function: &str,
    params: &[ParamSpec],
    positional: Vec<DynamicValue>,
    keywords: Keywords,
) -> BridgeResult<Vec<DynamicValue>> {
    if positional.len() > params.len() {
        return Err(BridgeError::arity(
            function,
            format!(
                "takes {} positional argument{} but {} {} given",
                params.len(),
                plural(params.len()),
                positional.len(),
                if positional.len() == 1 { "was" } else { "were" }
            ),
        ));
    }

    let mut slots: Vec<Option<DynamicValue>> = positional.into_iter().map(Some).collect();
    slots.resize(params.len(), None);

    for (name, value) in keywords {
        let index = params
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| {
                BridgeError::arity(
                    function,
                    format!("got an unexpected keyword argument '{}'", name),
                )
            })?;
        if slots[index].is_some() {
            return Err(BridgeError::arity(
                function,
                format!("got multiple values for argument '{}'", name),
            ));
        }
        slots[index] = Some(value);
    }

    let missing: Vec<String> = slots
        .iter()
        .zip(params)
        .filter(|(slot, param)| slot.is_none() && param.is_required())
        .map(|(_, param)| format!("'{}'", param.name))
        .collect();
    if !missing.is_empty() {
        return Err(BridgeError::arity(
            function,
            format!(
                "missing {} required argument{}: {}",
                missing.len(),
                plural(missing.len()),
                missing.join(", ")
            ),
        ));
    }

    Ok(slots
        .into_iter()
        .zip(params)
        .map(|(slot, param)| slot.or_else(|| param.default.clone()).unwrap_or_default())
        .collect())
}

// ============================================================================
// Typed entry points
// ============================================================================

/// Failure raised while running a native entry point.
#[derive(Debug, Clone, PartialEq)]
pub enum CallError {
    /// Argument at `index` failed to convert; native code did not run
    Argument {
        /// Position of the parameter
        index: usize,
        /// The conversion failure
        error: BridgeError,
    },
    /// Native code ran and reported a failure
    Failed(BridgeError),
}

impl CallError {
    /// Resolve into a bridge error with the parameter name and function
    /// name filled in.
    pub fn resolve(self, function: &str, params: &[ParamSpec]) -> BridgeError {
        match self {
            CallError::Argument { index, error } => match params.get(index) {
                Some(param) => error.within(&param.name),
                None => error,
            },
            CallError::Failed(error) => error.in_function(function),
        }
    }
}

fn take_arg<T: FromDynamic>(args: &[DynamicValue], index: usize) -> Result<T, CallError> {
    let converted = match args.get(index) {
        Some(value) => T::from_dynamic(value),
        None => T::from_dynamic(&DynamicValue::None),
    };
    converted.map_err(|error| CallError::Argument { index, error })
}

/// A native free function callable with dynamic arguments.
///
/// Implemented for every `Fn(A1, ..., An) -> R` with up to six
/// `FromDynamic` parameters.
pub trait NativeFn<Args>: 'static {
    /// The native return type
    type Output;

    /// Parameter types, in order
    fn param_types() -> Vec<NativeType>;

    /// Convert `args` and call
    fn call_with(&self, args: &[DynamicValue]) -> Result<Self::Output, CallError>;
}

/// A native method callable with a receiver and dynamic arguments.
///
/// Implemented for every `Fn(&mut T, A1, ..., An) -> R` with up to six
/// `FromDynamic` parameters.
pub trait NativeMethod<T, Args>: 'static {
    /// The native return type
    type Output;

    /// Parameter types, in order (receiver excluded)
    fn param_types() -> Vec<NativeType>;

    /// Convert `args` and call on `receiver`
    fn call_with(&self, receiver: &mut T, args: &[DynamicValue]) -> Result<Self::Output, CallError>;
}

macro_rules! impl_native_fn {
    ($($arg:ident),*) => {
        impl<F, R, $($arg,)*> NativeFn<($($arg,)*)> for F
        where
            F: Fn($($arg),*) -> R + 'static,
            $($arg: FromDynamic,)*
        {
            type Output = R;

            fn param_types() -> Vec<NativeType> {
                vec![$($arg::accepted_type()),*]
            }

            #[allow(non_snake_case, unused_mut, unused_variables, unused_assignments)]
            fn call_with(&self, args: &[DynamicValue]) -> Result<R, CallError> {
                let mut index = 0;
                $(
                    let $arg = take_arg::<$arg>(args, index)?;
                    index += 1;
                )*
                Ok(self($($arg),*))
            }
        }

        impl<T, F, R, $($arg,)*> NativeMethod<T, ($($arg,)*)> for F
        where
            T: 'static,
            F: Fn(&mut T, $($arg),*) -> R + 'static,
            $($arg: FromDynamic,)*
        {
            type Output = R;

            fn param_types() -> Vec<NativeType> {
                vec![$($arg::accepted_type()),*]
            }

            #[allow(non_snake_case, unused_mut, unused_variables, unused_assignments)]
            fn call_with(&self, receiver: &mut T, args: &[DynamicValue]) -> Result<R, CallError> {
                let mut index = 0;
                $(
                    let $arg = take_arg::<$arg>(args, index)?;
                    index += 1;
                )*
                Ok(self(receiver, $($arg),*))
            }
        }
    };
}

impl_native_fn!();
impl_native_fn!(A1);
impl_native_fn!(A1, A2);
impl_native_fn!(A1, A2, A3);
impl_native_fn!(A1, A2, A3, A4);
impl_native_fn!(A1, A2, A3, A4, A5);
impl_native_fn!(A1, A2, A3, A4, A5, A6);

/// Native return values.
///
/// Plain values convert with [`ToDynamic`] (`()` becomes `None`); a
/// `Result` surfaces its error as a native failure, except that a
/// [`BridgeError`] passes through with its own kind.
pub trait IntoReturn {
    /// Type reported in signatures
    fn return_type() -> NativeType;

    /// Convert into the caller-facing result
    fn into_return(self) -> BridgeResult<DynamicValue>;
}

impl<T: ToDynamic> IntoReturn for T {
    fn return_type() -> NativeType {
        T::produced_type()
    }

    fn into_return(self) -> BridgeResult<DynamicValue> {
        Ok(self.to_dynamic())
    }
}

impl<T: ToDynamic, E: fmt::Display + 'static> IntoReturn for Result<T, E> {
    fn return_type() -> NativeType {
        T::produced_type()
    }

    fn into_return(self) -> BridgeResult<DynamicValue> {
        match self {
            Ok(value) => Ok(value.to_dynamic()),
            Err(error) => match (&error as &dyn Any).downcast_ref::<BridgeError>() {
                Some(bridge) => Err(bridge.clone()),
                None => Err(BridgeError::native("", error.to_string())),
            },
        }
    }
}

// ============================================================================
// Panic containment
// ============================================================================

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Run native code, turning an escaping panic into a native error.
pub(crate) fn guarded<R>(
    function: &str,
    catch_panics: bool,
    call: impl FnOnce() -> R,
) -> BridgeResult<R> {
    if !catch_panics {
        return Ok(call());
    }
    panic::catch_unwind(AssertUnwindSafe(call)).map_err(|payload| {
        let message = panic_message(payload.as_ref());
        warn!(function, %message, "native code panicked");
        BridgeError::native(function, format!("native panic: {}", message))
    })
}

// ============================================================================
// FunctionBinding
// ============================================================================

type NativeEntry = Rc<dyn Fn(&[DynamicValue]) -> Result<DynamicValue, CallError>>;

/// A native function exposed to dynamic callers.
#[derive(Clone)]
pub struct FunctionBinding {
    name: SmolStr,
    doc: Option<String>,
    params: Vec<ParamSpec>,
    returns: NativeType,
    entry: NativeEntry,
    catch_panics: bool,
    max_depth: usize,
}

impl fmt::Debug for FunctionBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionBinding")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("returns", &self.returns)
            .finish()
    }
}

impl FunctionBinding {
    /// Wrap a native function
    pub fn new<F, Args>(name: impl Into<SmolStr>, function: F) -> Self
    where
        F: NativeFn<Args>,
        F::Output: IntoReturn,
    {
        let entry: NativeEntry = Rc::new(move |args: &[DynamicValue]| {
            function
                .call_with(args)?
                .into_return()
                .map_err(CallError::Failed)
        });
        Self {
            name: name.into(),
            doc: None,
            params: default_params(F::param_types()),
            returns: <F::Output as IntoReturn>::return_type(),
            entry,
            catch_panics: true,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Wrap an entry point that already works on dynamic values
    pub fn from_entry(
        name: impl Into<SmolStr>,
        params: Vec<ParamSpec>,
        returns: NativeType,
        entry: impl Fn(&[DynamicValue]) -> Result<DynamicValue, CallError> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            doc: None,
            params,
            returns,
            entry: Rc::new(entry),
            catch_panics: true,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Name the parameters, in order
    pub fn with_params<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SmolStr>,
    {
        let names: Vec<SmolStr> = names.into_iter().map(Into::into).collect();
        if names.len() != self.params.len() {
            warn!(
                function = %self.name,
                given = names.len(),
                expected = self.params.len(),
                "parameter name count does not match the function"
            );
        }
        for (param, name) in self.params.iter_mut().zip(names) {
            param.name = name;
        }
        self
    }

    /// Give a parameter a default value
    pub fn with_default(mut self, param: &str, value: impl ToDynamic) -> Self {
        match self.params.iter_mut().find(|p| p.name == param) {
            Some(spec) => spec.default = Some(value.to_dynamic()),
            None => warn!(function = %self.name, param, "default for unknown parameter ignored"),
        }
        self
    }

    /// Attach documentation
    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// Enable or disable panic containment
    pub fn catch_panics(mut self, enabled: bool) -> Self {
        self.catch_panics = enabled;
        self
    }

    /// Deepest container nesting accepted in an argument
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub(crate) fn rename(&mut self, rename: impl Fn(&str) -> SmolStr) {
        self.name = rename(&self.name);
        for param in &mut self.params {
            param.name = rename(&param.name);
        }
    }

    /// Exported name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared parameters
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Declared return type
    pub fn return_type(&self) -> &NativeType {
        &self.returns
    }

    /// Documentation, if any
    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    /// `name(a: int, b: str) -> int`; the arrow is omitted for functions
    /// returning nothing.
    pub fn signature_text(&self) -> String {
        render_signature(&self.name, &self.params, &self.returns)
    }

    /// Signature followed by the documentation
    pub fn doc_text(&self) -> String {
        match &self.doc {
            Some(doc) => format!("{}\n\n{}", self.signature_text(), doc),
            None => self.signature_text(),
        }
    }

    /// Call with positional and keyword arguments
    pub fn invoke(
        &self,
        positional: Vec<DynamicValue>,
        keywords: Keywords,
    ) -> BridgeResult<DynamicValue> {
        debug!(
            function = %self.name,
            positional = positional.len(),
            keywords = keywords.len(),
            "invoking native function"
        );
        let args = bind_arguments(&self.name, &self.params, positional, keywords)?;
        check_nesting(&self.params, &args, self.max_depth)?;
        guarded(&self.name, self.catch_panics, || (self.entry)(&args))?
            .map_err(|e| e.resolve(&self.name, &self.params))
    }

    /// Call with positional arguments only
    pub fn call(&self, positional: Vec<DynamicValue>) -> BridgeResult<DynamicValue> {
        self.invoke(positional, Keywords::new())
    }
}

/// Reject bound arguments nested deeper than `max_depth`
pub(crate) fn check_nesting(
    params: &[ParamSpec],
    args: &[DynamicValue],
    max_depth: usize,
) -> BridgeResult<()> {
    for (param, arg) in params.iter().zip(args) {
        check_depth(arg, max_depth).map_err(|e| e.within(&param.name))?;
    }
    Ok(())
}

pub(crate) fn render_signature(name: &str, params: &[ParamSpec], returns: &NativeType) -> String {
    let params: Vec<String> = params.iter().map(ToString::to_string).collect();
    let mut text = format!("{}({})", name, params.join(", "));
    if !returns.is_none() {
        text.push_str(" -> ");
        text.push_str(&returns.type_hint());
    }
    text
}

//! Object Handle Wrapper
//!
//! Exposes native Rust values to dynamic callers as opaque handles.
//!
//! ## Lifecycle
//!
//! ```text
//! constructor call ──► ObjectHandle (1 reference)
//!        retain() ──► +1
//!       release() ──► -1, the instance is dropped at 0
//!  any use after ──► UseAfterFree
//! ```
//!
//! Cloning an `ObjectHandle` does not add a reference: clones are the
//! bridge's own bookkeeping. Dropping the last clone also drops the
//! instance.
//!
//! ## Dispatch
//!
//! Methods are looked up by name in the class's method table on every call,
//! so methods defined after a handle was created are visible through it.
//! Each call borrows the instance exclusively; a reentrant call on the same
//! handle fails instead of aliasing the instance.

use std::any::{type_name, Any, TypeId};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use smol_str::SmolStr;
use tracing::debug;

use crate::call::{
    bind_arguments, check_nesting, default_params, guarded, render_signature, CallError,
    FunctionBinding,
    IntoReturn, Keywords, NativeFn, NativeMethod, ParamSpec,
};
use crate::config::{NamingStyle, DEFAULT_MAX_DEPTH};
use crate::conversion::{FromDynamic, ToDynamic};
use crate::error::{BridgeError, BridgeResult};
use crate::types::NativeType;
use crate::value::DynamicValue;

// ============================================================================
// Methods and properties
// ============================================================================

type MethodEntry = Rc<dyn Fn(&mut dyn Any, &[DynamicValue]) -> Result<DynamicValue, CallError>>;
type Getter = Rc<dyn Fn(&dyn Any) -> Option<DynamicValue>>;
type Setter = Rc<dyn Fn(&mut dyn Any, &DynamicValue) -> BridgeResult<()>>;

/// A native method exposed on a class.
#[derive(Clone)]
pub struct MethodBinding {
    name: SmolStr,
    doc: Option<String>,
    params: Vec<ParamSpec>,
    returns: NativeType,
    receiver: TypeId,
    receiver_name: &'static str,
    entry: MethodEntry,
}

impl fmt::Debug for MethodBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodBinding")
            .field("name", &self.name)
            .field("receiver", &self.receiver_name)
            .field("params", &self.params)
            .finish()
    }
}

impl MethodBinding {
    /// Wrap a native method taking `&mut T`
    pub fn new<T, F, Args>(name: impl Into<SmolStr>, method: F) -> Self
    where
        T: 'static,
        F: NativeMethod<T, Args>,
        F::Output: IntoReturn,
    {
        let receiver_name = type_name::<T>();
        let entry: MethodEntry = Rc::new(move |instance: &mut dyn Any, args: &[DynamicValue]| {
            let receiver = instance.downcast_mut::<T>().ok_or_else(|| {
                CallError::Failed(BridgeError::type_mismatch(receiver_name, "foreign instance"))
            })?;
            method
                .call_with(receiver, args)?
                .into_return()
                .map_err(CallError::Failed)
        });
        Self {
            name: name.into(),
            doc: None,
            params: default_params(F::param_types()),
            returns: <F::Output as IntoReturn>::return_type(),
            receiver: TypeId::of::<T>(),
            receiver_name,
            entry,
        }
    }

    /// Name the parameters, in order
    pub fn with_params<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SmolStr>,
    {
        for (param, name) in self.params.iter_mut().zip(names) {
            param.name = name.into();
        }
        self
    }

    /// Give a parameter a default value
    pub fn with_default(mut self, param: &str, value: impl ToDynamic) -> Self {
        if let Some(spec) = self.params.iter_mut().find(|p| p.name == param) {
            spec.default = Some(value.to_dynamic());
        }
        self
    }

    /// Attach documentation
    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// Method name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared parameters (receiver excluded)
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Documentation, if any
    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    fn rename(&mut self, style: NamingStyle) {
        self.name = style.apply(&self.name);
        for param in &mut self.params {
            param.name = style.apply(&param.name);
        }
    }
}

#[derive(Clone)]
struct Property {
    ty: NativeType,
    getter: Getter,
    setter: Option<Setter>,
}

// ============================================================================
// ClassDef
// ============================================================================

/// Exposed surface of a native type: its method table and properties.
pub struct ClassDef {
    name: SmolStr,
    doc: RefCell<Option<String>>,
    type_id: TypeId,
    methods: RefCell<IndexMap<SmolStr, MethodBinding>>,
    properties: RefCell<IndexMap<SmolStr, Property>>,
    naming: Cell<NamingStyle>,
    catch_panics: Cell<bool>,
    max_depth: Cell<usize>,
}

impl fmt::Debug for ClassDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDef")
            .field("name", &self.name)
            .field("methods", &self.method_names())
            .field("properties", &self.property_names())
            .finish()
    }
}

impl ClassDef {
    /// Class name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Documentation, if any
    pub fn doc(&self) -> Option<String> {
        self.doc.borrow().clone()
    }

    /// Look up a method by exported name
    pub fn method(&self, name: &str) -> Option<MethodBinding> {
        self.methods.borrow().get(name).cloned()
    }

    /// Check if the class exposes a method
    pub fn has_method(&self, name: &str) -> bool {
        self.methods.borrow().contains_key(name)
    }

    /// Check if the class exposes a property
    pub fn has_property(&self, name: &str) -> bool {
        self.properties.borrow().contains_key(name)
    }

    /// Exported method names, in definition order
    pub fn method_names(&self) -> Vec<SmolStr> {
        self.methods.borrow().keys().cloned().collect()
    }

    /// Exported property names, in definition order
    pub fn property_names(&self) -> Vec<SmolStr> {
        self.properties.borrow().keys().cloned().collect()
    }

    /// Add (or replace) a method. Existing handles see it on their next call.
    pub fn define_method(&self, mut binding: MethodBinding) -> BridgeResult<()> {
        if binding.receiver != self.type_id {
            return Err(BridgeError::type_mismatch(
                self.name.as_str(),
                binding.receiver_name,
            ));
        }
        binding.rename(self.naming.get());
        debug!(class = %self.name, method = %binding.name, "defined method");
        self.methods.borrow_mut().insert(binding.name.clone(), binding);
        Ok(())
    }

    /// Signature lines for every method and property
    pub fn describe(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .methods
            .borrow()
            .values()
            .map(|m| render_signature(&format!("{}.{}", self.name, m.name), &m.params, &m.returns))
            .collect();
        lines.extend(
            self.properties
                .borrow()
                .iter()
                .map(|(name, p)| format!("{}.{}: {}", self.name, name, p.ty.type_hint())),
        );
        lines
    }

    pub(crate) fn configure(&self, naming: NamingStyle, catch_panics: bool, max_depth: usize) {
        self.naming.set(naming);
        self.catch_panics.set(catch_panics);
        self.max_depth.set(max_depth);

        let methods = std::mem::take(&mut *self.methods.borrow_mut());
        *self.methods.borrow_mut() = methods
            .into_iter()
            .map(|(_, mut binding)| {
                binding.rename(naming);
                (binding.name.clone(), binding)
            })
            .collect();

        let properties = std::mem::take(&mut *self.properties.borrow_mut());
        *self.properties.borrow_mut() = properties
            .into_iter()
            .map(|(name, property)| (naming.apply(&name), property))
            .collect();
    }
}

// ============================================================================
// ClassBuilder
// ============================================================================

/// A class definition plus its constructor functions.
#[derive(Debug, Clone)]
pub struct NativeClass {
    def: Rc<ClassDef>,
    constructors: Vec<FunctionBinding>,
}

impl NativeClass {
    /// The class definition shared by all handles
    pub fn def(&self) -> &Rc<ClassDef> {
        &self.def
    }

    /// Constructor functions, exported at module level
    pub fn constructors(&self) -> &[FunctionBinding] {
        &self.constructors
    }

    pub(crate) fn into_parts(self) -> (Rc<ClassDef>, Vec<FunctionBinding>) {
        (self.def, self.constructors)
    }
}

/// Builder for exposing a native type `T` as a class.
///
/// # Example
///
/// ```
/// use serpent_bridge::{ClassBuilder, DynamicValue};
///
/// struct Counter {
///     count: i64,
/// }
///
/// let class = ClassBuilder::<Counter>::new("Counter")
///     .constructor("NewCounter", |count: i64| Counter { count })
///     .method("Increment", |c: &mut Counter| c.count += 1)
///     .property("count", |c: &Counter| c.count)
///     .build();
///
/// let handle = class.constructors()[0]
///     .call(vec![DynamicValue::int(1)])
///     .unwrap();
/// let handle = handle.as_object().unwrap();
/// handle.invoke("Increment", vec![], Default::default()).unwrap();
/// assert_eq!(handle.get_attr("count").unwrap(), DynamicValue::int(2));
/// ```
pub struct ClassBuilder<T> {
    def: Rc<ClassDef>,
    constructors: Vec<FunctionBinding>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> ClassBuilder<T> {
    /// Start a class named `name`
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            def: Rc::new(ClassDef {
                name: name.into(),
                doc: RefCell::new(None),
                type_id: TypeId::of::<T>(),
                methods: RefCell::new(IndexMap::new()),
                properties: RefCell::new(IndexMap::new()),
                naming: Cell::new(NamingStyle::AsDeclared),
                catch_panics: Cell::new(true),
                max_depth: Cell::new(DEFAULT_MAX_DEPTH),
            }),
            constructors: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Attach class documentation
    pub fn doc(self, doc: impl Into<String>) -> Self {
        *self.def.doc.borrow_mut() = Some(doc.into());
        self
    }

    fn object_type(&self) -> NativeType {
        NativeType::Object(self.def.name.clone())
    }

    /// Build a constructor binding without adding it
    pub fn make_constructor<F, Args>(&self, name: impl Into<SmolStr>, constructor: F) -> FunctionBinding
    where
        F: NativeFn<Args, Output = T>,
    {
        let class = Rc::clone(&self.def);
        FunctionBinding::from_entry(
            name,
            default_params(F::param_types()),
            self.object_type(),
            move |args: &[DynamicValue]| {
                let instance = constructor.call_with(args)?;
                Ok(DynamicValue::Object(ObjectHandle::new(
                    Rc::clone(&class),
                    Box::new(instance),
                )))
            },
        )
    }

    /// Build a fallible constructor binding without adding it
    pub fn make_try_constructor<F, Args, E>(
        &self,
        name: impl Into<SmolStr>,
        constructor: F,
    ) -> FunctionBinding
    where
        F: NativeFn<Args, Output = Result<T, E>>,
        E: fmt::Display,
    {
        let class = Rc::clone(&self.def);
        FunctionBinding::from_entry(
            name,
            default_params(F::param_types()),
            self.object_type(),
            move |args: &[DynamicValue]| {
                let instance = constructor
                    .call_with(args)?
                    .map_err(|e| CallError::Failed(BridgeError::native("", e.to_string())))?;
                Ok(DynamicValue::Object(ObjectHandle::new(
                    Rc::clone(&class),
                    Box::new(instance),
                )))
            },
        )
    }

    /// Add a constructor function
    pub fn constructor<F, Args>(self, name: impl Into<SmolStr>, constructor: F) -> Self
    where
        F: NativeFn<Args, Output = T>,
    {
        let binding = self.make_constructor(name, constructor);
        self.add_constructor(binding)
    }

    /// Add a constructor function that can fail
    pub fn try_constructor<F, Args, E>(self, name: impl Into<SmolStr>, constructor: F) -> Self
    where
        F: NativeFn<Args, Output = Result<T, E>>,
        E: fmt::Display,
    {
        let binding = self.make_try_constructor(name, constructor);
        self.add_constructor(binding)
    }

    /// Add a prepared constructor binding
    pub fn add_constructor(mut self, binding: FunctionBinding) -> Self {
        self.constructors.push(binding);
        self
    }

    /// Add a method
    pub fn method<F, Args>(self, name: impl Into<SmolStr>, method: F) -> Self
    where
        F: NativeMethod<T, Args>,
        F::Output: IntoReturn,
    {
        self.add_method(MethodBinding::new::<T, F, Args>(name, method))
    }

    /// Add a prepared method binding
    pub fn add_method(self, binding: MethodBinding) -> Self {
        self.def
            .methods
            .borrow_mut()
            .insert(binding.name.clone(), binding);
        self
    }

    /// Add a read-only property
    pub fn property<V, G>(self, name: impl Into<SmolStr>, getter: G) -> Self
    where
        V: ToDynamic,
        G: Fn(&T) -> V + 'static,
    {
        let property = Property {
            ty: V::produced_type(),
            getter: Rc::new(move |instance: &dyn Any| {
                instance.downcast_ref::<T>().map(|value| getter(value).to_dynamic())
            }),
            setter: None,
        };
        self.def.properties.borrow_mut().insert(name.into(), property);
        self
    }

    /// Add a property with a setter
    pub fn property_rw<V, W, G, S>(self, name: impl Into<SmolStr>, getter: G, setter: S) -> Self
    where
        V: ToDynamic,
        W: FromDynamic,
        G: Fn(&T) -> V + 'static,
        S: Fn(&mut T, W) + 'static,
    {
        let name = name.into();
        let property_name = name.clone();
        let property = Property {
            ty: V::produced_type(),
            getter: Rc::new(move |instance: &dyn Any| {
                instance.downcast_ref::<T>().map(|value| getter(value).to_dynamic())
            }),
            setter: Some(Rc::new(move |instance: &mut dyn Any, value: &DynamicValue| {
                let converted = W::from_dynamic(value).map_err(|e| e.within(&property_name))?;
                let target = instance.downcast_mut::<T>().ok_or_else(|| {
                    BridgeError::type_mismatch(type_name::<T>(), "foreign instance")
                })?;
                setter(target, converted);
                Ok(())
            })),
        };
        self.def.properties.borrow_mut().insert(name, property);
        self
    }

    /// Finish the class
    pub fn build(self) -> NativeClass {
        NativeClass {
            def: self.def,
            constructors: self.constructors,
        }
    }
}

// ============================================================================
// ObjectHandle
// ============================================================================

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

struct HandleInner {
    id: u64,
    class: Rc<ClassDef>,
    instance: RefCell<Option<Box<dyn Any>>>,
    refs: Cell<usize>,
}

impl Drop for HandleInner {
    fn drop(&mut self) {
        if self.instance.get_mut().is_some() {
            debug!(class = %self.class.name, id = self.id, "dropping unreleased native instance");
        }
    }
}

/// Opaque reference to a native instance.
#[derive(Clone)]
pub struct ObjectHandle {
    inner: Rc<HandleInner>,
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectHandle")
            .field("class", &self.class_name())
            .field("id", &self.id())
            .field("refs", &self.ref_count())
            .finish()
    }
}

impl ObjectHandle {
    /// Wrap a freshly constructed instance; the caller holds one reference
    pub fn new(class: Rc<ClassDef>, instance: Box<dyn Any>) -> Self {
        let id = NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed);
        debug!(class = %class.name, id, "created native instance");
        Self {
            inner: Rc::new(HandleInner {
                id,
                class,
                instance: RefCell::new(Some(instance)),
                refs: Cell::new(1),
            }),
        }
    }

    /// Handle identifier
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Class of the instance
    pub fn class(&self) -> &Rc<ClassDef> {
        &self.inner.class
    }

    /// Class name of the instance
    pub fn class_name(&self) -> &str {
        &self.inner.class.name
    }

    /// Check whether two handles refer to the same instance
    pub fn same_instance(&self, other: &ObjectHandle) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of outstanding external references
    pub fn ref_count(&self) -> usize {
        self.inner.refs.get()
    }

    /// Check whether the instance still exists
    pub fn is_alive(&self) -> bool {
        self.ref_count() > 0
    }

    fn ensure_alive(&self) -> BridgeResult<()> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(BridgeError::use_after_free(
                self.inner.class.name.clone(),
                self.id(),
            ))
        }
    }

    fn busy(&self) -> BridgeError {
        BridgeError::borrowed_mutation(format!(
            "{} #{} is already in use by another call",
            self.class_name(),
            self.id()
        ))
    }

    /// Add an external reference
    pub fn retain(&self) -> BridgeResult<()> {
        self.ensure_alive()?;
        self.inner.refs.set(self.ref_count() + 1);
        Ok(())
    }

    /// Drop an external reference; returns `true` when this destroyed the
    /// instance.
    pub fn release(&self) -> BridgeResult<bool> {
        self.ensure_alive()?;
        if self.ref_count() > 1 {
            self.inner.refs.set(self.ref_count() - 1);
            return Ok(false);
        }
        let instance = self
            .inner
            .instance
            .try_borrow_mut()
            .map_err(|_| self.busy())?
            .take();
        self.inner.refs.set(0);
        drop(instance);
        debug!(class = %self.class_name(), id = self.id(), "destroyed native instance");
        Ok(true)
    }

    /// Call a method by exported name
    pub fn invoke(
        &self,
        method: &str,
        positional: Vec<DynamicValue>,
        keywords: Keywords,
    ) -> BridgeResult<DynamicValue> {
        self.ensure_alive()?;
        let binding = self
            .inner
            .class
            .method(method)
            .ok_or_else(|| BridgeError::attribute_not_found(method, self.class_name()))?;
        let qualified = format!("{}.{}", self.class_name(), binding.name);
        debug!(
            method = %qualified,
            id = self.id(),
            positional = positional.len(),
            keywords = keywords.len(),
            "invoking native method"
        );

        let args = bind_arguments(&qualified, &binding.params, positional, keywords)?;
        check_nesting(&binding.params, &args, self.inner.class.max_depth.get())?;
        let mut slot = self
            .inner
            .instance
            .try_borrow_mut()
            .map_err(|_| self.busy())?;
        let instance = slot.as_mut().ok_or_else(|| {
            BridgeError::use_after_free(self.inner.class.name.clone(), self.id())
        })?;
        let catch_panics = self.inner.class.catch_panics.get();
        guarded(&qualified, catch_panics, || (binding.entry)(&mut **instance, &args))?
            .map_err(|e| e.resolve(&qualified, &binding.params))
    }

    /// Read a property
    pub fn get_attr(&self, name: &str) -> BridgeResult<DynamicValue> {
        self.ensure_alive()?;
        let property = self
            .inner
            .class
            .properties
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| BridgeError::attribute_not_found(name, self.class_name()))?;
        let slot = self.inner.instance.try_borrow().map_err(|_| self.busy())?;
        let instance = slot.as_ref().ok_or_else(|| {
            BridgeError::use_after_free(self.inner.class.name.clone(), self.id())
        })?;
        (property.getter)(&**instance).ok_or_else(|| {
            BridgeError::type_mismatch(self.class_name(), "foreign instance")
        })
    }

    /// Write a property through its setter
    pub fn set_attr(&self, name: &str, value: &DynamicValue) -> BridgeResult<()> {
        self.ensure_alive()?;
        let property = self
            .inner
            .class
            .properties
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| BridgeError::attribute_not_found(name, self.class_name()))?;
        let setter = property.setter.ok_or_else(|| {
            BridgeError::borrowed_mutation(format!(
                "property '{}' of {} is read-only",
                name,
                self.class_name()
            ))
        })?;
        let mut slot = self
            .inner
            .instance
            .try_borrow_mut()
            .map_err(|_| self.busy())?;
        let instance = slot.as_mut().ok_or_else(|| {
            BridgeError::use_after_free(self.inner.class.name.clone(), self.id())
        })?;
        setter(&mut **instance, value)
    }

    /// Run `f` on the native instance, for native code receiving a handle
    pub fn with_instance<T: 'static, R>(&self, f: impl FnOnce(&mut T) -> R) -> BridgeResult<R> {
        self.ensure_alive()?;
        let mut slot = self
            .inner
            .instance
            .try_borrow_mut()
            .map_err(|_| self.busy())?;
        let instance = slot.as_mut().ok_or_else(|| {
            BridgeError::use_after_free(self.inner.class.name.clone(), self.id())
        })?;
        let target = instance
            .downcast_mut::<T>()
            .ok_or_else(|| BridgeError::type_mismatch(type_name::<T>(), self.class_name()))?;
        Ok(f(target))
    }
}

//! Native modules
//!
//! A [`NativeModule`] is the unit a host imports: a named table of
//! functions plus the classes whose handles those functions produce.
//! Naming and panic policy from [`BridgeConfig`] are applied once, when
//! the module is built.

use std::rc::Rc;

use indexmap::IndexMap;
use smol_str::SmolStr;
use tracing::{debug, info};

use crate::call::{FunctionBinding, Keywords};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::handle::{ClassDef, NativeClass};
use crate::value::DynamicValue;

/// Builder for a [`NativeModule`].
#[derive(Debug)]
pub struct ModuleBuilder {
    name: SmolStr,
    doc: Option<String>,
    functions: Vec<FunctionBinding>,
    classes: Vec<NativeClass>,
    config: BridgeConfig,
}

impl ModuleBuilder {
    /// Start a module named `name` with the default configuration
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            doc: None,
            functions: Vec::new(),
            classes: Vec::new(),
            config: BridgeConfig::default(),
        }
    }

    /// Attach module documentation
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// Use `config` for naming and panic handling
    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a function
    pub fn function(mut self, binding: FunctionBinding) -> Self {
        self.functions.push(binding);
        self
    }

    /// Add a class; its constructors become module functions
    pub fn class(mut self, class: NativeClass) -> Self {
        self.classes.push(class);
        self
    }

    /// Apply the configuration and assemble the module.
    ///
    /// Two exports resolving to the same name are rejected.
    pub fn build(self) -> BridgeResult<NativeModule> {
        let naming = self.config.naming;
        let catch_panics = self.config.catch_panics;
        let max_depth = self.config.max_depth;

        let mut functions: IndexMap<SmolStr, FunctionBinding> = IndexMap::new();
        let mut classes: IndexMap<SmolStr, Rc<ClassDef>> = IndexMap::new();

        let mut bindings = self.functions;
        for class in self.classes {
            let (def, constructors) = class.into_parts();
            def.configure(naming, catch_panics, max_depth);
            let class_name = SmolStr::new(def.name());
            if classes.insert(class_name.clone(), def).is_some() {
                return Err(BridgeError::config(format!(
                    "class '{}' registered twice in module '{}'",
                    class_name, self.name
                )));
            }
            bindings.extend(constructors);
        }

        for binding in bindings {
            let mut binding = binding.catch_panics(catch_panics).max_depth(max_depth);
            binding.rename(|name| naming.apply(name));
            let name = SmolStr::new(binding.name());
            if functions.contains_key(&name) {
                return Err(BridgeError::config(format!(
                    "function '{}' registered twice in module '{}'",
                    name, self.name
                )));
            }
            functions.insert(name, binding);
        }

        info!(
            module = %self.name,
            functions = functions.len(),
            classes = classes.len(),
            "built native module"
        );

        Ok(NativeModule {
            name: self.name,
            doc: self.doc,
            functions,
            classes,
            config: self.config,
        })
    }
}

/// A named collection of exported functions and classes.
#[derive(Debug, Clone)]
pub struct NativeModule {
    name: SmolStr,
    doc: Option<String>,
    functions: IndexMap<SmolStr, FunctionBinding>,
    classes: IndexMap<SmolStr, Rc<ClassDef>>,
    config: BridgeConfig,
}

impl NativeModule {
    /// Module name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Documentation, if any
    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    /// Configuration the module was built with
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Look up a function by exported name
    pub fn function(&self, name: &str) -> Option<&FunctionBinding> {
        self.functions.get(name)
    }

    /// Exported functions, in registration order
    pub fn functions(&self) -> impl Iterator<Item = &FunctionBinding> {
        self.functions.values()
    }

    /// Look up a class by name
    pub fn class(&self, name: &str) -> Option<&Rc<ClassDef>> {
        self.classes.get(name)
    }

    /// Exported classes, in registration order
    pub fn classes(&self) -> impl Iterator<Item = &Rc<ClassDef>> {
        self.classes.values()
    }

    /// Call an exported function by name
    pub fn invoke(
        &self,
        name: &str,
        positional: Vec<DynamicValue>,
        keywords: Keywords,
    ) -> BridgeResult<DynamicValue> {
        let binding = self
            .function(name)
            .ok_or_else(|| BridgeError::function_not_found(name, self.name.as_str()))?;
        debug!(module = %self.name, function = name, "module call");
        binding.invoke(positional, keywords)
    }

    /// Call an exported function with positional arguments only
    pub fn call(&self, name: &str, positional: Vec<DynamicValue>) -> BridgeResult<DynamicValue> {
        self.invoke(name, positional, Keywords::new())
    }

    /// Human-readable listing of every export
    pub fn describe(&self) -> String {
        let mut lines = vec![format!("module {}", self.name)];
        if let Some(doc) = &self.doc {
            lines.push(format!("    {}", doc));
        }
        for binding in self.functions.values() {
            lines.push(format!("  {}", binding.signature_text()));
        }
        for class in self.classes.values() {
            lines.push(format!("  class {}", class.name()));
            for line in class.describe() {
                lines.push(format!("    {}", line));
            }
        }
        lines.join("\n")
    }
}

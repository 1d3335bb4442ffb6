//! Host-defined implementations of foreign interfaces.
//!
//! Declaring that a host type implements a VM-defined interface is an
//! explicit builder/registration step: the caller names the target
//! interface, binds host functions to its methods, and marks every binding
//! as an override. A binding with an unmarked method is a static-structure
//! error caught when the binding is built, not at call time. Registration
//! with a backend additionally resolves the interface eagerly and yields an
//! opaque [`ImplementationHandle`] usable wherever the foreign API expects
//! an instance of that interface.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Argument/return value crossing the host/VM boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absence of a value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integral number.
    Int(i64),
    /// Floating-point number.
    Double(f64),
    /// String.
    Str(String),
}

/// A host function bound to one interface method.
pub type MethodFn = Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;

/// One method of an interface binding.
pub struct MethodBinding {
    name: String,
    overrides: bool,
    func: MethodFn,
}

impl MethodBinding {
    /// Bind a host function under a method name. The binding still needs
    /// its override marker; see [`MethodBinding::overriding`].
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            overrides: false,
            func: Arc::new(func),
        }
    }

    /// Mark this binding as overriding an interface method.
    pub fn overriding(mut self) -> Self {
        self.overrides = true;
        self
    }

    /// Method name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the override marker is present.
    pub fn is_override(&self) -> bool {
        self.overrides
    }
}

impl fmt::Debug for MethodBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodBinding")
            .field("name", &self.name)
            .field("overrides", &self.overrides)
            .finish_non_exhaustive()
    }
}

/// A validated declaration that a host type implements a foreign interface.
///
/// Only obtainable through [`InterfaceBinding::builder`], which validates at
/// build time; an `InterfaceBinding` value is therefore always structurally
/// sound.
#[derive(Debug)]
pub struct InterfaceBinding {
    interface: String,
    methods: Vec<MethodBinding>,
}

impl InterfaceBinding {
    /// Start building a binding for the named interface.
    ///
    /// The name is the case-sensitive fully-qualified foreign interface
    /// name, matched exactly at registration time.
    pub fn builder(interface: impl Into<String>) -> InterfaceBindingBuilder {
        InterfaceBindingBuilder {
            interface: interface.into(),
            methods: Vec::new(),
        }
    }

    /// Target interface name.
    pub fn interface_name(&self) -> &str {
        &self.interface
    }

    /// Bound methods.
    pub fn methods(&self) -> &[MethodBinding] {
        &self.methods
    }

    /// Consume into the interface name and a name-keyed dispatch table.
    pub fn into_dispatch(self) -> (String, BTreeMap<String, MethodFn>) {
        let dispatch = self
            .methods
            .into_iter()
            .map(|m| (m.name, m.func))
            .collect();
        (self.interface, dispatch)
    }
}

/// Builder for [`InterfaceBinding`].
#[derive(Debug)]
pub struct InterfaceBindingBuilder {
    interface: String,
    methods: Vec<MethodBinding>,
}

impl InterfaceBindingBuilder {
    /// Add a method binding.
    pub fn method(mut self, binding: MethodBinding) -> Self {
        self.methods.push(binding);
        self
    }

    /// Validate and build the binding.
    ///
    /// Fails with a configuration error on a malformed interface name, a
    /// duplicate method name, or a method missing its override marker.
    pub fn build(self) -> Result<InterfaceBinding> {
        validate_qualified_name(&self.interface, "interface")?;

        let mut seen = std::collections::HashSet::new();
        for method in &self.methods {
            if method.name().is_empty() {
                return Err(Error::configuration(format!(
                    "empty method name in binding for interface {}",
                    self.interface
                )));
            }
            if !seen.insert(method.name().to_string()) {
                return Err(Error::configuration(format!(
                    "duplicate method {} in binding for interface {}",
                    method.name(),
                    self.interface
                )));
            }
            if !method.is_override() {
                return Err(Error::configuration(format!(
                    "method {} of interface {} lacks the override marker",
                    method.name(),
                    self.interface
                )));
            }
        }

        Ok(InterfaceBinding {
            interface: self.interface,
            methods: self.methods,
        })
    }
}

/// Opaque handle to a registered interface implementation.
///
/// Dispatches interface method calls to the bound host functions. Backends
/// may attach their own reference to the resolved foreign interface.
#[derive(Clone)]
pub struct ImplementationHandle {
    interface: String,
    dispatch: BTreeMap<String, MethodFn>,
    foreign: Option<Arc<dyn Any + Send + Sync>>,
}

impl ImplementationHandle {
    /// Create a handle from a dispatch table and an optional backend
    /// reference to the resolved interface.
    pub fn new(
        interface: impl Into<String>,
        dispatch: BTreeMap<String, MethodFn>,
        foreign: Option<Arc<dyn Any + Send + Sync>>,
    ) -> Self {
        Self {
            interface: interface.into(),
            dispatch,
            foreign,
        }
    }

    /// The implemented interface's fully-qualified name.
    pub fn interface_name(&self) -> &str {
        &self.interface
    }

    /// Names of the bound methods.
    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.dispatch.keys().map(String::as_str)
    }

    /// Backend reference to the resolved interface, when registered against
    /// a live VM.
    pub fn foreign(&self) -> Option<&Arc<dyn Any + Send + Sync>> {
        self.foreign.as_ref()
    }

    /// Invoke a bound method.
    pub fn invoke(&self, method: &str, args: &[Value]) -> Result<Value> {
        let func = self.dispatch.get(method).ok_or_else(|| {
            Error::unsupported(
                "invoke method",
                format!("no binding for {} on interface {}", method, self.interface),
            )
        })?;
        func(args)
    }
}

impl fmt::Debug for ImplementationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImplementationHandle")
            .field("interface", &self.interface)
            .field("methods", &self.dispatch.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Validate a case-sensitive fully-qualified foreign name.
pub(crate) fn validate_qualified_name(name: &str, what: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.split('.').all(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {
                    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
                }
                _ => false,
            }
        });
    if valid {
        Ok(())
    } else {
        Err(Error::configuration(format!(
            "malformed {} name: {:?}",
            what, name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo(args: &[Value]) -> Result<Value> {
        Ok(args.first().cloned().unwrap_or(Value::Null))
    }

    #[test]
    fn test_build_and_invoke() {
        let binding = InterfaceBinding::builder("java.lang.Runnable")
            .method(MethodBinding::new("run", echo).overriding())
            .build()
            .unwrap();
        assert_eq!(binding.interface_name(), "java.lang.Runnable");

        let (interface, dispatch) = binding.into_dispatch();
        let handle = ImplementationHandle::new(interface, dispatch, None);
        let out = handle
            .invoke("run", &[Value::Str("tick".into())])
            .unwrap();
        assert_eq!(out, Value::Str("tick".into()));
    }

    #[test]
    fn test_missing_override_marker_fails_at_build() {
        let err = InterfaceBinding::builder("java.lang.Runnable")
            .method(MethodBinding::new("run", echo))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert!(err.to_string().contains("override marker"));
    }

    #[test]
    fn test_duplicate_method_fails_at_build() {
        let err = InterfaceBinding::builder("java.util.Comparator")
            .method(MethodBinding::new("compare", echo).overriding())
            .method(MethodBinding::new("compare", echo).overriding())
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn test_malformed_interface_name_fails_at_build() {
        for bad in ["", "com..Example", "com.1bad.Name", "spaced name"] {
            let result = InterfaceBinding::builder(bad)
                .method(MethodBinding::new("run", echo).overriding())
                .build();
            assert!(result.is_err(), "{:?} should be rejected", bad);
        }
    }

    #[test]
    fn test_invoke_unbound_method_fails() {
        let binding = InterfaceBinding::builder("java.lang.Runnable")
            .method(MethodBinding::new("run", echo).overriding())
            .build()
            .unwrap();
        let (interface, dispatch) = binding.into_dispatch();
        let handle = ImplementationHandle::new(interface, dispatch, None);

        let err = handle.invoke("stop", &[]).unwrap_err();
        assert!(matches!(err, Error::Unsupported { .. }));
    }
}

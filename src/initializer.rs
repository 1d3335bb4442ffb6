//! The runtime-initializer contract shared by every backend.
//!
//! A backend owns the one process-wide VM handle and implements the
//! lifecycle operations below. VM startup is irreversible in the common
//! path: library paths are fixed at boot, and a second `prepare_vm` on a
//! running VM downgrades to a warning instead of reconfiguring anything.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::BackendKind;
use crate::codec::PropertiesSnapshot;
use crate::error::{Error, Result};
use crate::interface::{ImplementationHandle, InterfaceBinding};
use crate::paths::PathEntry;

/// Default deadline for the child-process property negotiation.
pub const DEFAULT_NEGOTIATION_TIMEOUT: Duration = Duration::from_secs(30);

/// VM lifecycle phase.
///
/// `Unstarted → Starting → Running` is terminal in the common path;
/// `Running → ShuttingDown → Unstarted` exists only behind the explicit
/// forced-restart escape hatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VmPhase {
    /// No VM has been booted in this process.
    #[default]
    Unstarted,
    /// Boot in progress.
    Starting,
    /// VM is live; library path is immutable from here on.
    Running,
    /// Opt-in irreversible shutdown in progress.
    ShuttingDown,
}

impl fmt::Display for VmPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmPhase::Unstarted => write!(f, "unstarted"),
            VmPhase::Starting => write!(f, "starting"),
            VmPhase::Running => write!(f, "running"),
            VmPhase::ShuttingDown => write!(f, "shutting-down"),
        }
    }
}

/// Outcome of a `prepare_vm` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareOutcome {
    /// The VM was booted by this call.
    Started,
    /// A VM was already running; the call was a diagnostic no-op.
    AlreadyRunning,
}

/// Boot-time settings that cannot change once the VM is running.
#[derive(Debug, Clone)]
pub struct VmSettings {
    /// Explicit VM installation root, overriding environment discovery.
    pub vm_home: Option<PathBuf>,
    /// Opt in to the dangerous shutdown-then-restart path.
    pub allow_restart: bool,
    /// Deadline for the default-property negotiation child process.
    pub negotiation_timeout: Duration,
}

impl Default for VmSettings {
    fn default() -> Self {
        Self {
            vm_home: None,
            allow_restart: false,
            negotiation_timeout: DEFAULT_NEGOTIATION_TIMEOUT,
        }
    }
}

/// Handle to a loaded foreign class.
///
/// Obtained eagerly: a handle always refers to a class that existed at load
/// time, never to a namespace placeholder that defers the error.
#[derive(Clone)]
pub struct ClassHandle {
    qualified: String,
    inner: Arc<dyn Any + Send + Sync>,
}

impl ClassHandle {
    /// Wrap a backend-specific class reference.
    pub fn new(qualified: impl Into<String>, inner: Arc<dyn Any + Send + Sync>) -> Self {
        Self {
            qualified: qualified.into(),
            inner,
        }
    }

    /// Fully-qualified name of the class.
    pub fn qualified_name(&self) -> &str {
        &self.qualified
    }

    /// Borrow the backend-specific reference.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// The backend-specific reference, shared.
    pub fn inner(&self) -> Arc<dyn Any + Send + Sync> {
        Arc::clone(&self.inner)
    }
}

impl fmt::Debug for ClassHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassHandle")
            .field("qualified", &self.qualified)
            .finish_non_exhaustive()
    }
}

/// The foreign runtime's own reflective class-object representation.
#[derive(Clone)]
pub struct ReflectionObject {
    class_name: String,
    inner: Arc<dyn Any + Send + Sync>,
}

impl ReflectionObject {
    /// Wrap a backend-specific reflection object.
    pub fn new(class_name: impl Into<String>, inner: Arc<dyn Any + Send + Sync>) -> Self {
        Self {
            class_name: class_name.into(),
            inner,
        }
    }

    /// Fully-qualified name of the reflected class.
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Borrow the backend-specific reference.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// The backend-specific reference, shared.
    pub fn inner(&self) -> Arc<dyn Any + Send + Sync> {
        Arc::clone(&self.inner)
    }
}

impl fmt::Debug for ReflectionObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReflectionObject")
            .field("class_name", &self.class_name)
            .finish_non_exhaustive()
    }
}

/// Which foreign classes to load and under which local names.
#[derive(Debug, Clone)]
pub enum ClassImportSpec {
    /// Fully-qualified names; the local name defaults to the last dotted
    /// segment.
    Names(Vec<String>),
    /// Explicit local-name → qualified-name mapping.
    Mapped(BTreeMap<String, String>),
}

impl Default for ClassImportSpec {
    fn default() -> Self {
        Self::Names(Vec::new())
    }
}

impl From<Vec<String>> for ClassImportSpec {
    fn from(names: Vec<String>) -> Self {
        Self::Names(names)
    }
}

impl From<&[&str]> for ClassImportSpec {
    fn from(names: &[&str]) -> Self {
        Self::Names(names.iter().map(|s| s.to_string()).collect())
    }
}

impl From<BTreeMap<String, String>> for ClassImportSpec {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self::Mapped(map)
    }
}

impl ClassImportSpec {
    /// Whether the spec names no classes.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Names(names) => names.is_empty(),
            Self::Mapped(map) => map.is_empty(),
        }
    }

    /// Resolve into `(local_name, qualified_name)` pairs.
    ///
    /// Fails with a configuration error on empty names or duplicate local
    /// names; local names must be unique within one spec.
    pub fn resolve(&self) -> Result<Vec<(String, String)>> {
        let mut pairs = Vec::new();
        let mut seen = std::collections::HashSet::new();
        let push = |pairs: &mut Vec<(String, String)>,
                    seen: &mut std::collections::HashSet<String>,
                    local: String,
                    qualified: String|
         -> Result<()> {
            if qualified.is_empty() {
                return Err(Error::configuration("empty qualified class name in import spec"));
            }
            if local.is_empty() {
                return Err(Error::configuration(format!(
                    "empty local name for class {}",
                    qualified
                )));
            }
            if !seen.insert(local.clone()) {
                return Err(Error::configuration(format!(
                    "duplicate local name in import spec: {}",
                    local
                )));
            }
            pairs.push((local, qualified));
            Ok(())
        };

        match self {
            Self::Names(names) => {
                for qualified in names {
                    let local = qualified
                        .rsplit('.')
                        .next()
                        .unwrap_or_default()
                        .to_string();
                    push(&mut pairs, &mut seen, local, qualified.clone())?;
                }
            }
            Self::Mapped(map) => {
                for (local, qualified) in map {
                    push(&mut pairs, &mut seen, local.clone(), qualified.clone())?;
                }
            }
        }
        Ok(pairs)
    }
}

/// Lifecycle contract every backend must provide.
///
/// Implementations own the process-wide VM handle. Callers normally reach
/// this through [`crate::session::Session`] rather than holding a backend
/// directly.
pub trait RuntimeInitializer: Send {
    /// Which backend this is.
    fn kind(&self) -> BackendKind;

    /// Current lifecycle phase.
    fn phase(&self) -> VmPhase;

    /// How many times the startup sequence actually ran in this process.
    fn start_count(&self) -> u32;

    /// Resolve the native VM library to load.
    ///
    /// Deterministic for a given environment and side-effect-free.
    fn select_vm(&self) -> Result<PathBuf>;

    /// Perform one-time VM startup with the currently-configured classpath
    /// and library path.
    ///
    /// Never silently re-configures: if a VM is already running this warns
    /// and returns [`PrepareOutcome::AlreadyRunning`], unless the backend
    /// was opted in to forced restart.
    fn prepare_vm(&mut self) -> Result<PrepareOutcome>;

    /// Irreversibly shut the VM down. Opt-in and dangerous; backends without
    /// restart support refuse.
    fn shutdown_vm(&mut self) -> Result<()> {
        Err(Error::unsupported(
            "shutdown vm",
            "this backend does not support irreversible shutdown",
        ))
    }

    /// Load a foreign class by fully-qualified name, eagerly.
    ///
    /// Fails with `ClassNotFound` when the class does not exist; never
    /// returns a placeholder that defers the error to first use.
    fn load_class(&mut self, qualified: &str) -> Result<ClassHandle>;

    /// Currently effective classpath.
    fn class_path(&mut self) -> Result<Vec<PathEntry>>;

    /// Replace the classpath wholesale, where the backend allows it.
    ///
    /// Backends whose VM technology forbids redefining the classpath fail
    /// with `Unsupported`; callers append instead.
    fn set_class_path(&mut self, entries: &[PathEntry]) -> Result<()>;

    /// Merge entries into the classpath, new entries taking priority order.
    fn append_class_path(&mut self, entries: &[PathEntry]) -> Result<()>;

    /// Currently effective native-library search path.
    fn library_path(&mut self) -> Result<Vec<PathEntry>>;

    /// Replace the library path. Fails with `Unsupported` once the VM is
    /// running; the library path is fixed at boot on every backend.
    fn set_library_path(&mut self, entries: &[PathEntry]) -> Result<()>;

    /// Merge entries into the boot-time library path. Fails with
    /// `Unsupported` once the VM is running.
    fn append_library_path(&mut self, entries: &[PathEntry]) -> Result<()>;

    /// Map a class handle to the runtime's own reflective class object.
    fn reflect_class(&mut self, class: &ClassHandle) -> Result<ReflectionObject>;

    /// Map a reflective class object back to a usable class handle.
    fn class_from_reflection(&mut self, refl: &ReflectionObject) -> Result<ClassHandle>;

    /// Register a host-defined implementation of a foreign interface.
    ///
    /// The binding was validated at build time; the backend additionally
    /// resolves the interface eagerly so a missing interface fails here,
    /// not at first call.
    fn implement_interface(&mut self, binding: InterfaceBinding) -> Result<ImplementationHandle>;

    /// Snapshot of the running VM's system properties.
    fn system_properties(&mut self) -> Result<PropertiesSnapshot>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_default_to_last_segment() {
        let spec = ClassImportSpec::from(&["com.example.Foo", "java.lang.String"][..]);
        let pairs = spec.resolve().unwrap();
        assert_eq!(
            pairs,
            vec![
                ("Foo".to_string(), "com.example.Foo".to_string()),
                ("String".to_string(), "java.lang.String".to_string()),
            ]
        );
    }

    #[test]
    fn test_mapped_spec_keeps_explicit_names() {
        let mut map = BTreeMap::new();
        map.insert("Document".to_string(), "org.index.Document".to_string());
        let pairs = ClassImportSpec::from(map).resolve().unwrap();
        assert_eq!(
            pairs,
            vec![("Document".to_string(), "org.index.Document".to_string())]
        );
    }

    #[test]
    fn test_duplicate_local_names_rejected() {
        let spec = ClassImportSpec::from(&["a.Foo", "b.Foo"][..]);
        let err = spec.resolve().unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert!(err.to_string().contains("Foo"));
    }

    #[test]
    fn test_empty_qualified_name_rejected() {
        let spec = ClassImportSpec::Names(vec![String::new()]);
        assert!(matches!(
            spec.resolve(),
            Err(Error::Configuration { .. })
        ));
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(VmPhase::Unstarted.to_string(), "unstarted");
        assert_eq!(VmPhase::Running.to_string(), "running");
        assert_eq!(VmPhase::ShuttingDown.to_string(), "shutting-down");
    }
}

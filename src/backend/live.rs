//! Shared core for live, JNI-backed backends.
//!
//! Every backend in the closed set boots its VM through the JNI invocation
//! API; what differs is VM discovery, boot options, and classpath mutation
//! policy. Those differences live in a [`BackendProfile`], and the lifecycle
//! mechanics live here once.
//!
//! Startup is irreversible: the library path can only be assembled before
//! boot (merging negotiated defaults with caller additions into the boot
//! `-D` option), and a running VM is never reconfigured behind the caller's
//! back.

use std::collections::{BTreeMap, HashMap};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use jni::objects::{GlobalRef, JObject, JString, JValue};
use jni::{InitArgsBuilder, JNIVersion, JavaVM};

use crate::backend::BackendKind;
use crate::codec::PropertiesSnapshot;
use crate::error::{Error, Result};
use crate::initializer::{
    ClassHandle, PrepareOutcome, ReflectionObject, RuntimeInitializer, VmPhase, VmSettings,
};
use crate::interface::{validate_qualified_name, ImplementationHandle, InterfaceBinding};
use crate::loader::{LoaderId, LoaderRegistry, NativeHandle};
use crate::negotiate;
use crate::paths::{self, PathEntry};
use crate::platform::{self, PATH_LIST_SEPARATOR};

/// Per-backend specifics layered over the shared live core.
pub trait BackendProfile: Send + 'static {
    /// Which backend this profile describes.
    const KIND: BackendKind;

    /// VM options always passed at boot.
    const BOOT_OPTIONS: &'static [&'static str];

    /// Whether the classpath may be replaced wholesale before boot.
    /// Replacement after boot is forbidden for every backend.
    const CLASSPATH_REPLACE_BEFORE_BOOT: bool;

    /// Resolve the VM shared library for this backend.
    fn select_vm(home_override: Option<&Path>) -> Result<PathBuf>;
}

/// Resolve a VM library from an explicit override or the first set
/// environment variable naming an installation root.
pub(crate) fn locate_from_homes(
    home_override: Option<&Path>,
    env_vars: &[&str],
    kind: BackendKind,
) -> Result<PathBuf> {
    if let Some(home) = home_override {
        return platform::locate_vm_library(home).ok_or_else(|| {
            Error::configuration(format!("no vm library under {}", home.display()))
        });
    }
    for var in env_vars {
        let Some(home) = std::env::var_os(var) else {
            continue;
        };
        if home.is_empty() {
            continue;
        }
        let home = PathBuf::from(home);
        return platform::locate_vm_library(&home).ok_or_else(|| {
            Error::configuration(format!(
                "no vm library under {} (from {})",
                home.display(),
                var
            ))
        });
    }
    Err(Error::configuration(format!(
        "cannot select a vm for backend {}: none of {:?} is set",
        kind.name(),
        env_vars
    )))
}

fn jni_err(operation: &str, e: jni::errors::Error) -> Error {
    Error::vm_call(operation, e.to_string())
}

fn clear_pending(env: &mut jni::JNIEnv<'_>) {
    if env.exception_check().unwrap_or(false) {
        let _ = env.exception_clear();
    }
}

/// JNI-backed initializer parameterized by a backend profile.
pub struct LiveInitializer<P: BackendProfile> {
    phase: VmPhase,
    start_count: u32,
    settings: VmSettings,
    /// Classpath accumulated before boot; effective via the boot `-D` option.
    boot_class_path: Vec<PathEntry>,
    /// Library path accumulated before boot; merged with negotiated
    /// defaults into the boot `-D` option, immutable afterwards.
    boot_library_path: Vec<PathEntry>,
    vm: Option<JavaVM>,
    loaders: LoaderRegistry,
    loader_refs: HashMap<NativeHandle, GlobalRef>,
    system_loader: Option<LoaderId>,
    _profile: PhantomData<P>,
}

impl<P: BackendProfile> LiveInitializer<P> {
    /// Create an unstarted initializer with the given boot-time settings.
    pub fn new(settings: &VmSettings) -> Self {
        Self {
            phase: VmPhase::Unstarted,
            start_count: 0,
            settings: settings.clone(),
            boot_class_path: Vec::new(),
            boot_library_path: Vec::new(),
            vm: None,
            loaders: LoaderRegistry::new(),
            loader_refs: HashMap::new(),
            system_loader: None,
            _profile: PhantomData,
        }
    }

    /// The tracked loader hierarchy, rooted at the system class loader once
    /// the VM is running.
    pub fn loaders(&mut self) -> &mut LoaderRegistry {
        &mut self.loaders
    }

    /// Root node of the loader hierarchy (the system class loader), present
    /// once the VM is running.
    pub fn system_loader(&self) -> Option<LoaderId> {
        self.system_loader
    }

    /// Release a tracked loader, dropping its pinned reference.
    ///
    /// Fails while the loader still has registered children.
    pub fn release_loader(&mut self, id: LoaderId) -> Result<()> {
        let handle = self.loaders.release(id)?;
        self.loader_refs.remove(&handle);
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn force_phase(&mut self, phase: VmPhase) {
        self.phase = phase;
    }

    fn require_vm(&self) -> Result<&JavaVM> {
        self.vm
            .as_ref()
            .ok_or_else(|| Error::vm_call("attach", "vm is not running"))
    }

    fn boot(&mut self) -> Result<()> {
        let libjvm = P::select_vm(self.settings.vm_home.as_deref())?;

        let mut builder = InitArgsBuilder::new().version(JNIVersion::V8);
        for opt in P::BOOT_OPTIONS {
            builder = builder.option(*opt);
        }
        if !self.boot_class_path.is_empty() {
            let opt = format!(
                "-D{}={}",
                P::KIND.class_path_property(),
                paths::join_path_list(&self.boot_class_path)
            );
            builder = builder.option(opt);
        }
        if !self.boot_library_path.is_empty() {
            // The library path is fixed at boot, so the VM's own defaults
            // must be learned up front (in a disposable child VM) and merged
            // ahead of the caller's additions.
            let defaults =
                negotiate::default_library_paths(P::KIND, self.settings.negotiation_timeout)?;
            let user: Vec<String> = paths::normalize_entries(&self.boot_library_path).collect();
            let merged = paths::append_paths(&defaults, &user);
            let opt = format!(
                "-D{}={}",
                P::KIND.library_path_property(),
                merged.join(&PATH_LIST_SEPARATOR.to_string())
            );
            builder = builder.option(opt);
        }

        let args = builder
            .build()
            .map_err(|e| Error::vm_start(format!("build vm arguments: {}", e)))?;
        let vm = JavaVM::with_libjvm(args, || Ok(libjvm.as_os_str()))
            .map_err(|e| Error::vm_start(format!("load {}: {}", libjvm.display(), e)))?;
        self.vm = Some(vm);
        self.register_system_loader()?;
        Ok(())
    }

    fn register_system_loader(&mut self) -> Result<()> {
        let (handle, global) = {
            let vm = self.require_vm()?;
            let mut env = vm
                .attach_current_thread()
                .map_err(|e| jni_err("attach", e))?;
            let loader = env
                .call_static_method(
                    "java/lang/ClassLoader",
                    "getSystemClassLoader",
                    "()Ljava/lang/ClassLoader;",
                    &[],
                )
                .and_then(|v| v.l())
                .map_err(|e| {
                    clear_pending(&mut env);
                    jni_err("resolve system class loader", e)
                })?;
            let global = env
                .new_global_ref(&loader)
                .map_err(|e| jni_err("pin system class loader", e))?;
            let handle = global.as_obj().as_raw() as usize as NativeHandle;
            (handle, global)
        };
        let id = self.loaders.wrap_root(handle);
        self.loader_refs.insert(handle, global);
        self.system_loader = Some(id);
        Ok(())
    }

    fn get_property(&self, key: &str) -> Result<Option<String>> {
        let vm = self.require_vm()?;
        let mut env = vm
            .attach_current_thread()
            .map_err(|e| jni_err("attach", e))?;
        let jkey = env
            .new_string(key)
            .map_err(|e| jni_err("get property", e))?;
        let key_obj = JObject::from(jkey);
        let value = env
            .call_static_method(
                "java/lang/System",
                "getProperty",
                "(Ljava/lang/String;)Ljava/lang/String;",
                &[JValue::Object(&key_obj)],
            )
            .and_then(|v| v.l())
            .map_err(|e| {
                clear_pending(&mut env);
                jni_err("get property", e)
            })?;
        let is_null = env
            .is_same_object(&value, JObject::null())
            .map_err(|e| jni_err("get property", e))?;
        if is_null {
            Ok(None)
        } else {
            let s: String = env
                .get_string(&JString::from(value))
                .map_err(|e| jni_err("get property", e))?
                .into();
            Ok(Some(s))
        }
    }

    fn set_property(&self, key: &str, value: &str) -> Result<()> {
        let vm = self.require_vm()?;
        let mut env = vm
            .attach_current_thread()
            .map_err(|e| jni_err("attach", e))?;
        let jkey = env
            .new_string(key)
            .map_err(|e| jni_err("set property", e))?;
        let jval = env
            .new_string(value)
            .map_err(|e| jni_err("set property", e))?;
        let key_obj = JObject::from(jkey);
        let val_obj = JObject::from(jval);
        env.call_static_method(
            "java/lang/System",
            "setProperty",
            "(Ljava/lang/String;Ljava/lang/String;)Ljava/lang/String;",
            &[JValue::Object(&key_obj), JValue::Object(&val_obj)],
        )
        .map_err(|e| {
            clear_pending(&mut env);
            jni_err("set property", e)
        })?;
        Ok(())
    }

    fn snapshot_properties(&self) -> Result<PropertiesSnapshot> {
        let vm = self.require_vm()?;
        let mut env = vm
            .attach_current_thread()
            .map_err(|e| jni_err("attach", e))?;
        let props = env
            .call_static_method(
                "java/lang/System",
                "getProperties",
                "()Ljava/util/Properties;",
                &[],
            )
            .and_then(|v| v.l())
            .map_err(|e| {
                clear_pending(&mut env);
                jni_err("read properties", e)
            })?;
        let names = env
            .call_method(&props, "propertyNames", "()Ljava/util/Enumeration;", &[])
            .and_then(|v| v.l())
            .map_err(|e| {
                clear_pending(&mut env);
                jni_err("read properties", e)
            })?;

        let mut out = BTreeMap::new();
        loop {
            let more = env
                .call_method(&names, "hasMoreElements", "()Z", &[])
                .and_then(|v| v.z())
                .map_err(|e| {
                    clear_pending(&mut env);
                    jni_err("read properties", e)
                })?;
            if !more {
                break;
            }
            let key_obj = env
                .call_method(&names, "nextElement", "()Ljava/lang/Object;", &[])
                .and_then(|v| v.l())
                .map_err(|e| {
                    clear_pending(&mut env);
                    jni_err("read properties", e)
                })?;
            let key: String = env
                .get_string(&JString::from(key_obj))
                .map_err(|e| jni_err("read properties", e))?
                .into();
            let jkey = env
                .new_string(&key)
                .map_err(|e| jni_err("read properties", e))?;
            let jkey_obj = JObject::from(jkey);
            let value = env
                .call_static_method(
                    "java/lang/System",
                    "getProperty",
                    "(Ljava/lang/String;)Ljava/lang/String;",
                    &[JValue::Object(&jkey_obj)],
                )
                .and_then(|v| v.l())
                .map_err(|e| {
                    clear_pending(&mut env);
                    jni_err("read properties", e)
                })?;
            let is_null = env
                .is_same_object(&value, JObject::null())
                .map_err(|e| jni_err("read properties", e))?;
            let value = if is_null {
                String::new()
            } else {
                env.get_string(&JString::from(value))
                    .map_err(|e| jni_err("read properties", e))?
                    .into()
            };
            out.insert(key, value);
        }
        Ok(PropertiesSnapshot(out))
    }

    fn post_boot(&self) -> bool {
        !matches!(self.phase, VmPhase::Unstarted)
    }
}

impl<P: BackendProfile> RuntimeInitializer for LiveInitializer<P> {
    fn kind(&self) -> BackendKind {
        P::KIND
    }

    fn phase(&self) -> VmPhase {
        self.phase
    }

    fn start_count(&self) -> u32 {
        self.start_count
    }

    fn select_vm(&self) -> Result<PathBuf> {
        P::select_vm(self.settings.vm_home.as_deref())
    }

    fn prepare_vm(&mut self) -> Result<PrepareOutcome> {
        match self.phase {
            VmPhase::Running | VmPhase::Starting => {
                tracing::warn!(
                    backend = %P::KIND,
                    "vm already started; this backend disallows restart, assuming it was booted \
                     with the needed configuration"
                );
                if !self.settings.allow_restart {
                    return Ok(PrepareOutcome::AlreadyRunning);
                }
                self.shutdown_vm()?;
            }
            VmPhase::ShuttingDown => {
                return Err(Error::vm_start("vm is shutting down"));
            }
            VmPhase::Unstarted => {}
        }

        self.phase = VmPhase::Starting;
        match self.boot() {
            Ok(()) => {
                self.phase = VmPhase::Running;
                self.start_count += 1;
                tracing::debug!(backend = %P::KIND, "vm started");
                Ok(PrepareOutcome::Started)
            }
            Err(e) => {
                self.vm = None;
                self.phase = VmPhase::Unstarted;
                Err(e)
            }
        }
    }

    fn shutdown_vm(&mut self) -> Result<()> {
        if !self.settings.allow_restart {
            return Err(Error::unsupported(
                "shutdown vm",
                "restart was not opted in; the vm runs until process exit",
            ));
        }
        let Some(vm) = self.vm.take() else {
            return Ok(());
        };
        self.phase = VmPhase::ShuttingDown;
        tracing::warn!(
            backend = %P::KIND,
            "destroying the vm; all loaded classes and references become invalid"
        );
        self.loader_refs.clear();
        self.loaders = LoaderRegistry::new();
        self.system_loader = None;
        // SAFETY: every global reference owned by this initializer was
        // dropped above, and the caller opted in to invalidating any handles
        // it still holds.
        unsafe { vm.destroy() }.map_err(|e| Error::vm_call("destroy vm", e.to_string()))?;
        self.phase = VmPhase::Unstarted;
        Ok(())
    }

    fn load_class(&mut self, qualified: &str) -> Result<ClassHandle> {
        validate_qualified_name(qualified, "class")?;
        let global = {
            let vm = self.require_vm()?;
            let mut env = vm
                .attach_current_thread()
                .map_err(|e| jni_err("attach", e))?;
            let internal = qualified.replace('.', "/");
            let class = match env.find_class(internal.as_str()) {
                Ok(class) => class,
                Err(jni::errors::Error::JavaException) => {
                    clear_pending(&mut env);
                    return Err(Error::class_not_found(qualified));
                }
                Err(e) => return Err(jni_err("find class", e)),
            };
            env.new_global_ref(&class)
                .map_err(|e| jni_err("pin class", e))?
        };
        Ok(ClassHandle::new(qualified, Arc::new(global)))
    }

    fn class_path(&mut self) -> Result<Vec<PathEntry>> {
        if self.post_boot() {
            let value = self
                .get_property(P::KIND.class_path_property())?
                .unwrap_or_default();
            Ok(paths::split_path_list(&value))
        } else {
            let normalized: Vec<String> = paths::normalize_entries(&self.boot_class_path).collect();
            Ok(paths::entries_from_strings(&normalized))
        }
    }

    fn set_class_path(&mut self, entries: &[PathEntry]) -> Result<()> {
        if self.post_boot() {
            return Err(Error::unsupported(
                "set class path",
                "redefining the classpath after boot is not supported, use append_class_path",
            ));
        }
        if !P::CLASSPATH_REPLACE_BEFORE_BOOT {
            return Err(Error::unsupported(
                "set class path",
                format!(
                    "backend {} accumulates its classpath, use append_class_path",
                    P::KIND
                ),
            ));
        }
        self.boot_class_path = entries.to_vec();
        Ok(())
    }

    fn append_class_path(&mut self, entries: &[PathEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        if self.post_boot() {
            let current = self
                .get_property(P::KIND.class_path_property())?
                .unwrap_or_default();
            let existing: Vec<String> = paths::split_path_list(&current)
                .iter()
                .map(PathEntry::normalized)
                .collect();
            let merged = paths::append_paths(entries, &existing);
            self.set_property(
                P::KIND.class_path_property(),
                &merged.join(&PATH_LIST_SEPARATOR.to_string()),
            )?;
            tracing::debug!(count = entries.len(), "appended to running vm classpath");
        } else {
            let existing: Vec<String> = paths::normalize_entries(&self.boot_class_path).collect();
            let merged = paths::append_paths(entries, &existing);
            self.boot_class_path = paths::entries_from_strings(&merged);
        }
        Ok(())
    }

    fn library_path(&mut self) -> Result<Vec<PathEntry>> {
        if self.post_boot() {
            let value = self
                .get_property(P::KIND.library_path_property())?
                .unwrap_or_default();
            Ok(paths::split_path_list(&value))
        } else {
            let normalized: Vec<String> =
                paths::normalize_entries(&self.boot_library_path).collect();
            Ok(paths::entries_from_strings(&normalized))
        }
    }

    fn set_library_path(&mut self, entries: &[PathEntry]) -> Result<()> {
        if self.post_boot() {
            return Err(Error::unsupported(
                "set library path",
                "the library path is fixed at vm boot",
            ));
        }
        self.boot_library_path = entries.to_vec();
        Ok(())
    }

    fn append_library_path(&mut self, entries: &[PathEntry]) -> Result<()> {
        if self.post_boot() {
            return Err(Error::unsupported(
                "append library path",
                "the library path is fixed at vm boot",
            ));
        }
        let existing: Vec<String> = paths::normalize_entries(&self.boot_library_path).collect();
        let merged = paths::append_paths(entries, &existing);
        self.boot_library_path = paths::entries_from_strings(&merged);
        Ok(())
    }

    fn reflect_class(&mut self, class: &ClassHandle) -> Result<ReflectionObject> {
        let global = class.downcast_ref::<GlobalRef>().ok_or_else(|| {
            Error::vm_call("reflect class", "handle does not belong to this backend")
        })?;
        // A class handle already references the runtime's Class object;
        // reflection is a typed view of the same reference.
        Ok(ReflectionObject::new(
            class.qualified_name(),
            Arc::new(global.clone()),
        ))
    }

    fn class_from_reflection(&mut self, refl: &ReflectionObject) -> Result<ClassHandle> {
        let global = refl
            .downcast_ref::<GlobalRef>()
            .ok_or_else(|| {
                Error::vm_call(
                    "unreflect class",
                    "reflection object does not belong to this backend",
                )
            })?
            .clone();
        let name = {
            let vm = self.require_vm()?;
            let mut env = vm
                .attach_current_thread()
                .map_err(|e| jni_err("attach", e))?;
            let jname = env
                .call_method(global.as_obj(), "getName", "()Ljava/lang/String;", &[])
                .and_then(|v| v.l())
                .map_err(|e| {
                    clear_pending(&mut env);
                    jni_err("unreflect class", e)
                })?;
            let name: String = env
                .get_string(&JString::from(jname))
                .map_err(|e| jni_err("unreflect class", e))?
                .into();
            name
        };
        Ok(ClassHandle::new(name, Arc::new(global)))
    }

    fn implement_interface(&mut self, binding: InterfaceBinding) -> Result<ImplementationHandle> {
        // Resolve the interface eagerly so a missing or misspelled name
        // fails at registration, not at first call.
        let interface_name = binding.interface_name().to_string();
        let interface_class = self.load_class(&interface_name)?;
        let (interface, dispatch) = binding.into_dispatch();
        tracing::debug!(
            interface = %interface,
            methods = dispatch.len(),
            "registered interface implementation"
        );
        Ok(ImplementationHandle::new(
            interface,
            dispatch,
            Some(interface_class.inner()),
        ))
    }

    fn system_properties(&mut self) -> Result<PropertiesSnapshot> {
        self.snapshot_properties()
    }
}

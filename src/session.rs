//! The process-wide VM session.
//!
//! A process boots at most one VM. The session owns the backend initializer
//! and the table of classes loaded by local name; acquiring the session a
//! second time never boots again — depending on policy it either extends the
//! classpath and imports (with a diagnostic notice, the default) or is
//! rejected. First-time startup is serialized by a gate mutex so concurrent
//! callers block deterministically instead of racing to start two VMs.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use parking_lot::Mutex;

use crate::backend::BackendKind;
use crate::error::{Error, Result};
use crate::initializer::{ClassHandle, ClassImportSpec, RuntimeInitializer, VmSettings};
use crate::paths::PathEntry;

/// What a re-acquisition does when a VM is already running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtendPolicy {
    /// Extend classpath and imports, logging a notice. The library path
    /// cannot be extended and still fails.
    #[default]
    ExtendWithNotice,
    /// Refuse to touch the running VM.
    Reject,
}

/// Everything needed to acquire (or extend) the session.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Explicit backend; defaults to environment resolution.
    pub backend: Option<BackendKind>,
    /// Classpath entries to merge in.
    pub class_paths: Vec<PathEntry>,
    /// Classes to load and bind by local name.
    pub classes: ClassImportSpec,
    /// Native-library path entries; only honored before the VM boots.
    pub library_paths: Vec<PathEntry>,
    /// Boot-time VM settings.
    pub settings: VmSettings,
    /// Re-acquisition policy.
    pub extend_policy: ExtendPolicy,
}

impl SessionOptions {
    /// Start building options.
    pub fn builder() -> SessionOptionsBuilder {
        SessionOptionsBuilder::default()
    }
}

/// Builder for [`SessionOptions`].
#[derive(Debug, Default)]
pub struct SessionOptionsBuilder {
    options: SessionOptions,
}

impl SessionOptionsBuilder {
    /// Pin a specific backend instead of resolving from the environment.
    pub fn backend(mut self, kind: BackendKind) -> Self {
        self.options.backend = Some(kind);
        self
    }

    /// Add one classpath entry.
    pub fn class_path(mut self, entry: impl Into<PathEntry>) -> Self {
        self.options.class_paths.push(entry.into());
        self
    }

    /// Set the classes to import.
    pub fn classes(mut self, spec: impl Into<ClassImportSpec>) -> Self {
        self.options.classes = spec.into();
        self
    }

    /// Add one native-library path entry (boot-time only).
    pub fn library_path(mut self, entry: impl Into<PathEntry>) -> Self {
        self.options.library_paths.push(entry.into());
        self
    }

    /// Override the VM installation root.
    pub fn vm_home(mut self, home: impl Into<std::path::PathBuf>) -> Self {
        self.options.settings.vm_home = Some(home.into());
        self
    }

    /// Opt in to the dangerous shutdown-then-restart path.
    pub fn allow_restart(mut self, allow: bool) -> Self {
        self.options.settings.allow_restart = allow;
        self
    }

    /// Deadline for the default-property negotiation.
    pub fn negotiation_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.options.settings.negotiation_timeout = timeout;
        self
    }

    /// Re-acquisition policy.
    pub fn extend_policy(mut self, policy: ExtendPolicy) -> Self {
        self.options.extend_policy = policy;
        self
    }

    /// Finish building.
    pub fn build(self) -> SessionOptions {
        self.options
    }
}

/// The booted VM plus the classes loaded by local name.
pub struct Session {
    backend: Box<dyn RuntimeInitializer>,
    classes: BTreeMap<String, ClassHandle>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("backend", &self.backend.kind())
            .field("classes", &self.classes)
            .finish_non_exhaustive()
    }
}

impl Session {
    fn bootstrap(mut backend: Box<dyn RuntimeInitializer>, options: &SessionOptions) -> Result<Self> {
        backend.append_class_path(&options.class_paths)?;
        if !options.library_paths.is_empty() {
            backend.append_library_path(&options.library_paths)?;
        }
        backend.prepare_vm()?;

        let mut session = Self {
            backend,
            classes: BTreeMap::new(),
        };
        session.import(&options.classes)?;
        Ok(session)
    }

    fn extend(&mut self, options: &SessionOptions) -> Result<()> {
        match options.extend_policy {
            ExtendPolicy::Reject => {
                return Err(Error::unsupported(
                    "extend session",
                    "a vm is already running in this process and the extend policy is reject",
                ));
            }
            ExtendPolicy::ExtendWithNotice => {
                tracing::warn!(
                    backend = %self.backend.kind(),
                    "vm already running; extending classpath and imports without restarting"
                );
            }
        }
        self.backend.append_class_path(&options.class_paths)?;
        if !options.library_paths.is_empty() {
            // Fixed at boot; surfaces Unsupported rather than being dropped.
            self.backend.append_library_path(&options.library_paths)?;
        }
        self.import(&options.classes)?;
        Ok(())
    }

    /// Load the classes named by `spec` and bind them by local name.
    pub fn import(&mut self, spec: &ClassImportSpec) -> Result<()> {
        for (local, qualified) in spec.resolve()? {
            let handle = self.backend.load_class(&qualified)?;
            self.classes.insert(local, handle);
        }
        Ok(())
    }

    /// A class previously bound under `local`.
    pub fn class(&self, local: &str) -> Option<&ClassHandle> {
        self.classes.get(local)
    }

    /// Local names of every bound class.
    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }

    /// The backend, for contract operations beyond class lookup.
    pub fn backend(&mut self) -> &mut dyn RuntimeInitializer {
        self.backend.as_mut()
    }

    /// Read-only view of the backend.
    pub fn backend_ref(&self) -> &dyn RuntimeInitializer {
        self.backend.as_ref()
    }
}

/// Holder for one session with a serialized first-time startup.
///
/// The process-wide instance lives behind [`obtain`]; separate cells exist
/// so the bootstrap/extend machinery is testable without touching process
/// globals.
#[derive(Default)]
pub struct SessionCell {
    gate: Mutex<()>,
    slot: OnceLock<Mutex<Session>>,
}

impl SessionCell {
    /// Create an empty cell.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the session, constructing the backend with `make_backend` and
    /// booting on first call; later calls extend per the options' policy.
    ///
    /// The gate mutex serializes the `Unstarted → Starting` transition:
    /// concurrent first-time callers block until the winner finishes booting
    /// and then take the extend path.
    pub fn obtain_with<F>(&self, options: &SessionOptions, make_backend: F) -> Result<&Mutex<Session>>
    where
        F: FnOnce(&SessionOptions) -> Result<Box<dyn RuntimeInitializer>>,
    {
        let _gate = self.gate.lock();
        if let Some(slot) = self.slot.get() {
            slot.lock().extend(options)?;
            return Ok(slot);
        }
        let backend = make_backend(options)?;
        let session = Session::bootstrap(backend, options)?;
        Ok(self.slot.get_or_init(|| Mutex::new(session)))
    }

    /// The session, if one was already acquired.
    pub fn get(&self) -> Option<&Mutex<Session>> {
        self.slot.get()
    }
}

static GLOBAL: OnceLock<SessionCell> = OnceLock::new();

fn global_cell() -> &'static SessionCell {
    GLOBAL.get_or_init(SessionCell::new)
}

/// Acquire the process-wide session.
///
/// Boots the VM on the first call; every later call extends classpath and
/// imports per the options' [`ExtendPolicy`] and never boots a second VM.
pub fn obtain(options: SessionOptions) -> Result<&'static Mutex<Session>> {
    global_cell().obtain_with(&options, |opts| {
        let kind = opts.backend.unwrap_or_else(BackendKind::resolve);
        kind.new_initializer(&opts.settings)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::PropertiesSnapshot;
    use crate::error::Error;
    use crate::initializer::{
        PrepareOutcome, ReflectionObject, VmPhase,
    };
    use crate::interface::{ImplementationHandle, InterfaceBinding};
    use crate::paths;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Backend double mirroring the contract: accumulate-then-boot
    /// classpath, boot-fixed library path, eager class loading from a known
    /// set.
    struct MockBackend {
        phase: VmPhase,
        starts: Arc<AtomicU32>,
        class_path: Vec<String>,
        library_path: Vec<String>,
        known: Vec<&'static str>,
    }

    impl MockBackend {
        fn new(starts: Arc<AtomicU32>) -> Self {
            Self {
                phase: VmPhase::Unstarted,
                starts,
                class_path: Vec::new(),
                library_path: Vec::new(),
                known: vec![
                    "com.example.Foo",
                    "java.lang.System",
                    "java.lang.Runnable",
                ],
            }
        }
    }

    impl RuntimeInitializer for MockBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Hotspot
        }

        fn phase(&self) -> VmPhase {
            self.phase
        }

        fn start_count(&self) -> u32 {
            self.starts.load(Ordering::SeqCst)
        }

        fn select_vm(&self) -> Result<std::path::PathBuf> {
            Ok(std::path::PathBuf::from("/opt/jdk/lib/server/libjvm.so"))
        }

        fn prepare_vm(&mut self) -> Result<PrepareOutcome> {
            if self.phase == VmPhase::Running {
                return Ok(PrepareOutcome::AlreadyRunning);
            }
            self.phase = VmPhase::Running;
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(PrepareOutcome::Started)
        }

        fn load_class(&mut self, qualified: &str) -> Result<ClassHandle> {
            if self.known.contains(&qualified) {
                Ok(ClassHandle::new(qualified, Arc::new(qualified.to_string())))
            } else {
                Err(Error::class_not_found(qualified))
            }
        }

        fn class_path(&mut self) -> Result<Vec<PathEntry>> {
            Ok(paths::entries_from_strings(&self.class_path))
        }

        fn set_class_path(&mut self, _entries: &[PathEntry]) -> Result<()> {
            Err(Error::unsupported("set class path", "append only"))
        }

        fn append_class_path(&mut self, entries: &[PathEntry]) -> Result<()> {
            self.class_path = paths::append_paths(entries, &self.class_path);
            Ok(())
        }

        fn library_path(&mut self) -> Result<Vec<PathEntry>> {
            Ok(paths::entries_from_strings(&self.library_path))
        }

        fn set_library_path(&mut self, entries: &[PathEntry]) -> Result<()> {
            if self.phase == VmPhase::Running {
                return Err(Error::unsupported(
                    "set library path",
                    "fixed at vm boot",
                ));
            }
            self.library_path = paths::normalize_entries(entries).collect();
            Ok(())
        }

        fn append_library_path(&mut self, entries: &[PathEntry]) -> Result<()> {
            if self.phase == VmPhase::Running {
                return Err(Error::unsupported(
                    "append library path",
                    "fixed at vm boot",
                ));
            }
            self.library_path = paths::append_paths(entries, &self.library_path);
            Ok(())
        }

        fn reflect_class(&mut self, class: &ClassHandle) -> Result<ReflectionObject> {
            Ok(ReflectionObject::new(class.qualified_name(), class.inner()))
        }

        fn class_from_reflection(&mut self, refl: &ReflectionObject) -> Result<ClassHandle> {
            Ok(ClassHandle::new(refl.class_name(), refl.inner()))
        }

        fn implement_interface(
            &mut self,
            binding: InterfaceBinding,
        ) -> Result<ImplementationHandle> {
            let name = binding.interface_name().to_string();
            let class = self.load_class(&name)?;
            let (interface, dispatch) = binding.into_dispatch();
            Ok(ImplementationHandle::new(
                interface,
                dispatch,
                Some(class.inner()),
            ))
        }

        fn system_properties(&mut self) -> Result<PropertiesSnapshot> {
            Ok(PropertiesSnapshot::default())
        }
    }

    fn options(class_paths: &[&str], classes: &[&str]) -> SessionOptions {
        let mut builder = SessionOptions::builder().classes(classes);
        for cp in class_paths {
            builder = builder.class_path(*cp);
        }
        builder.build()
    }

    fn mock_factory(
        starts: &Arc<AtomicU32>,
    ) -> impl FnOnce(&SessionOptions) -> Result<Box<dyn RuntimeInitializer>> {
        let starts = Arc::clone(starts);
        move |_| Ok(Box::new(MockBackend::new(starts)) as Box<dyn RuntimeInitializer>)
    }

    #[test]
    fn test_bootstrap_preserves_classpath_order_and_binds_classes() {
        let cell = SessionCell::new();
        let starts = Arc::new(AtomicU32::new(0));
        let opts = options(&["/a/x.jar", "/a/y.jar"], &["com.example.Foo"]);

        let session = cell.obtain_with(&opts, mock_factory(&starts)).unwrap();
        let mut session = session.lock();

        let cp: Vec<String> = session
            .backend()
            .class_path()
            .unwrap()
            .iter()
            .map(|e| e.normalized())
            .collect();
        assert_eq!(cp, vec!["/a/x.jar", "/a/y.jar"], "order preserved");
        assert!(session.class("Foo").is_some());
        assert_eq!(starts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_second_acquisition_extends_without_second_start() {
        let cell = SessionCell::new();
        let starts = Arc::new(AtomicU32::new(0));

        cell.obtain_with(
            &options(&["/a/x.jar"], &["com.example.Foo"]),
            mock_factory(&starts),
        )
        .unwrap();

        let session = cell
            .obtain_with(
                &options(&["/b/z.jar"], &["java.lang.System"]),
                mock_factory(&starts),
            )
            .unwrap();
        let mut session = session.lock();

        assert_eq!(
            starts.load(Ordering::SeqCst),
            1,
            "startup sequence must run exactly once"
        );
        assert!(session.class("Foo").is_some());
        assert!(session.class("System").is_some());

        let cp: Vec<String> = session
            .backend()
            .class_path()
            .unwrap()
            .iter()
            .map(|e| e.normalized())
            .collect();
        assert!(cp.contains(&"/a/x.jar".to_string()));
        assert!(cp.contains(&"/b/z.jar".to_string()));
    }

    #[test]
    fn test_reject_policy_refuses_extension() {
        let cell = SessionCell::new();
        let starts = Arc::new(AtomicU32::new(0));
        cell.obtain_with(&options(&[], &[]), mock_factory(&starts))
            .unwrap();

        let mut opts = options(&["/b/z.jar"], &[]);
        opts.extend_policy = ExtendPolicy::Reject;
        let err = cell
            .obtain_with(&opts, mock_factory(&starts))
            .unwrap_err();
        assert!(matches!(err, Error::Unsupported { .. }));
    }

    #[test]
    fn test_library_path_extension_after_boot_fails() {
        let cell = SessionCell::new();
        let starts = Arc::new(AtomicU32::new(0));
        cell.obtain_with(&options(&[], &[]), mock_factory(&starts))
            .unwrap();

        let mut opts = options(&[], &[]);
        opts.library_paths.push(PathEntry::parse("/opt/native"));
        let err = cell
            .obtain_with(&opts, mock_factory(&starts))
            .unwrap_err();
        assert!(matches!(err, Error::Unsupported { .. }));
    }

    #[test]
    fn test_missing_class_fails_eagerly_and_leaves_cell_empty() {
        let cell = SessionCell::new();
        let starts = Arc::new(AtomicU32::new(0));
        let err = cell
            .obtain_with(
                &options(&[], &["com.example.Missing"]),
                mock_factory(&starts),
            )
            .unwrap_err();
        assert!(matches!(err, Error::ClassNotFound { .. }));
        assert!(cell.get().is_none(), "failed bootstrap must not publish");

        // The next acquisition is free to try again.
        cell.obtain_with(&options(&[], &["com.example.Foo"]), mock_factory(&starts))
            .unwrap();
        assert!(cell.get().is_some());
    }

    #[test]
    fn test_concurrent_first_acquisition_starts_exactly_once() {
        let cell = Arc::new(SessionCell::new());
        let starts = Arc::new(AtomicU32::new(0));

        std::thread::scope(|scope| {
            for _ in 0..4 {
                let cell = Arc::clone(&cell);
                let starts = Arc::clone(&starts);
                scope.spawn(move || {
                    cell.obtain_with(&options(&["/a/x.jar"], &[]), mock_factory(&starts))
                        .unwrap();
                });
            }
        });

        assert_eq!(
            starts.load(Ordering::SeqCst),
            1,
            "no two threads may run first-time startup"
        );
    }

    #[test]
    fn test_interface_registration_through_session() {
        let cell = SessionCell::new();
        let starts = Arc::new(AtomicU32::new(0));
        let session = cell
            .obtain_with(&options(&[], &[]), mock_factory(&starts))
            .unwrap();
        let mut session = session.lock();

        let binding = InterfaceBinding::builder("java.lang.Runnable")
            .method(
                crate::interface::MethodBinding::new("run", |_args| {
                    Ok(crate::interface::Value::Null)
                })
                .overriding(),
            )
            .build()
            .unwrap();
        let handle = session.backend().implement_interface(binding).unwrap();
        assert_eq!(handle.interface_name(), "java.lang.Runnable");

        // A missing interface fails at registration, eagerly.
        let missing = InterfaceBinding::builder("com.example.NoSuchInterface")
            .build()
            .unwrap();
        assert!(matches!(
            session.backend().implement_interface(missing),
            Err(Error::ClassNotFound { .. })
        ));
    }
}

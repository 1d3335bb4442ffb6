//! VM backends.
//!
//! Backends are a closed set of embedding technologies hidden behind the
//! [`RuntimeInitializer`](crate::initializer::RuntimeInitializer) contract.
//! The active backend is selected once, at process start, from the execution
//! environment, never per call.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::initializer::{RuntimeInitializer, VmSettings};

pub mod graal;
pub mod hotspot;
pub mod live;

pub use graal::GraalInitializer;
pub use hotspot::HotspotInitializer;

/// The closed set of VM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Stock HotSpot VM discovered via `JAVA_HOME`.
    Hotspot,
    /// GraalVM discovered via `GRAALVM_HOME` (falling back to `JAVA_HOME`).
    Graal,
}

impl BackendKind {
    /// Every known backend.
    pub const ALL: &'static [BackendKind] = &[BackendKind::Hotspot, BackendKind::Graal];

    /// Stable identifier, alphanumeric by construction — it doubles as the
    /// negotiation request line.
    pub fn name(self) -> &'static str {
        match self {
            BackendKind::Hotspot => "hotspot",
            BackendKind::Graal => "graal",
        }
    }

    /// Resolve a backend from its stable identifier.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.name() == name)
    }

    /// Property key holding the classpath.
    ///
    /// Kept per backend: the key has changed across VM generations, so no
    /// single global literal is assumed.
    pub fn class_path_property(self) -> &'static str {
        match self {
            BackendKind::Hotspot => "java.class.path",
            BackendKind::Graal => "java.class.path",
        }
    }

    /// Property key holding the native-library search path.
    pub fn library_path_property(self) -> &'static str {
        match self {
            BackendKind::Hotspot => "java.library.path",
            BackendKind::Graal => "java.library.path",
        }
    }

    /// Select the backend for this process from the execution environment.
    pub fn resolve() -> Self {
        match std::env::var_os("GRAALVM_HOME") {
            Some(home) if !home.is_empty() => BackendKind::Graal,
            _ => BackendKind::Hotspot,
        }
    }

    /// Construct this backend's initializer.
    pub fn new_initializer(self, settings: &VmSettings) -> Result<Box<dyn RuntimeInitializer>> {
        Ok(match self {
            BackendKind::Hotspot => Box::new(HotspotInitializer::new(settings)),
            BackendKind::Graal => Box::new(GraalInitializer::new(settings)),
        })
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s).ok_or_else(|| {
            Error::configuration(format!(
                "unknown backend {:?}, expected one of: hotspot, graal",
                s
            ))
        })
    }
}

/// Construct the initializer for the environment-selected backend.
pub fn default_initializer(settings: &VmSettings) -> Result<Box<dyn RuntimeInitializer>> {
    BackendKind::resolve().new_initializer(settings)
}

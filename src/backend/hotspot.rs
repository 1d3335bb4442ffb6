//! HotSpot backend.
//!
//! Discovers the VM under `JAVA_HOME`. HotSpot only accumulates its
//! classpath: wholesale replacement is never supported, before or after
//! boot, so callers append.

use std::path::{Path, PathBuf};

use crate::backend::live::{locate_from_homes, BackendProfile, LiveInitializer};
use crate::backend::BackendKind;
use crate::error::Result;

/// Profile for the stock HotSpot VM.
pub struct HotspotProfile;

impl BackendProfile for HotspotProfile {
    const KIND: BackendKind = BackendKind::Hotspot;
    const BOOT_OPTIONS: &'static [&'static str] = &["-ea"];
    const CLASSPATH_REPLACE_BEFORE_BOOT: bool = false;

    fn select_vm(home_override: Option<&Path>) -> Result<PathBuf> {
        locate_from_homes(home_override, &["JAVA_HOME"], BackendKind::Hotspot)
    }
}

/// Initializer binding the contract to HotSpot.
pub type HotspotInitializer = LiveInitializer<HotspotProfile>;

//! GraalVM backend.
//!
//! Discovers the VM under `GRAALVM_HOME`, falling back to `JAVA_HOME` for
//! installations that expose Graal as the default VM. Unlike HotSpot, the
//! classpath may be replaced wholesale before boot; after boot it is
//! append-only like everywhere else.

use std::path::{Path, PathBuf};

use crate::backend::live::{locate_from_homes, BackendProfile, LiveInitializer};
use crate::backend::BackendKind;
use crate::error::Result;

/// Profile for GraalVM.
pub struct GraalProfile;

impl BackendProfile for GraalProfile {
    const KIND: BackendKind = BackendKind::Graal;
    const BOOT_OPTIONS: &'static [&'static str] = &["-ea"];
    const CLASSPATH_REPLACE_BEFORE_BOOT: bool = true;

    fn select_vm(home_override: Option<&Path>) -> Result<PathBuf> {
        locate_from_homes(
            home_override,
            &["GRAALVM_HOME", "JAVA_HOME"],
            BackendKind::Graal,
        )
    }
}

/// Initializer binding the contract to GraalVM.
pub type GraalInitializer = LiveInitializer<GraalProfile>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::initializer::{RuntimeInitializer, VmPhase, VmSettings};
    use crate::paths::PathEntry;
    use crate::platform;

    fn fake_vm_home() -> tempfile::TempDir {
        let home = tempfile::tempdir().unwrap();
        let server = home.path().join("lib").join("server");
        std::fs::create_dir_all(&server).unwrap();
        std::fs::write(server.join(platform::vm_library_filename()), b"").unwrap();
        home
    }

    fn initializer_with_home(home: &Path) -> GraalInitializer {
        let settings = VmSettings {
            vm_home: Some(home.to_path_buf()),
            ..VmSettings::default()
        };
        GraalInitializer::new(&settings)
    }

    #[test]
    fn test_classpath_replace_allowed_before_boot() {
        let home = fake_vm_home();
        let mut init = initializer_with_home(home.path());
        init.append_class_path(&[PathEntry::parse("/old.jar")]).unwrap();
        init.set_class_path(&[PathEntry::parse("/only.jar")]).unwrap();

        let entries: Vec<String> = init
            .class_path()
            .unwrap()
            .iter()
            .map(|e| e.normalized())
            .collect();
        assert_eq!(entries, vec!["/only.jar"]);
    }

    #[test]
    fn test_classpath_replace_fails_after_boot() {
        let home = fake_vm_home();
        let mut init = initializer_with_home(home.path());
        init.force_phase(VmPhase::Running);
        let err = init
            .set_class_path(&[PathEntry::parse("/only.jar")])
            .unwrap_err();
        assert!(matches!(err, Error::Unsupported { .. }));
    }

    #[test]
    fn test_library_path_fixed_after_boot() {
        let home = fake_vm_home();
        let mut init = initializer_with_home(home.path());
        init.force_phase(VmPhase::Running);
        assert!(matches!(
            init.set_library_path(&[PathEntry::parse("/opt/native")]),
            Err(Error::Unsupported { .. })
        ));
    }

    #[test]
    fn test_select_vm_uses_home_override() {
        let home = fake_vm_home();
        let init = initializer_with_home(home.path());
        let lib = init.select_vm().unwrap();
        assert!(lib.starts_with(home.path()));
    }
}

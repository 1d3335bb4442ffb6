//! Platform conventions for path lists and VM library discovery.
//!
//! These differ between POSIX and Windows-like systems, particularly around
//! the path-list separator and the shared-library name of the VM itself.

use std::path::{Path, PathBuf};

/// Separator used when joining path lists into a single property string.
///
/// Must be bit-exact with the host OS convention (colon on POSIX, semicolon
/// on Windows) for interop with the VM's own property strings.
pub const PATH_LIST_SEPARATOR: char = if cfg!(windows) { ';' } else { ':' };

/// File name of the VM shared library on this platform.
pub fn vm_library_filename() -> &'static str {
    if cfg!(target_os = "macos") {
        "libjvm.dylib"
    } else if cfg!(windows) {
        "jvm.dll"
    } else {
        "libjvm.so"
    }
}

/// Subdirectories of a VM installation that may contain the VM library,
/// probed in order.
pub fn vm_library_subdirs() -> &'static [&'static str] {
    if cfg!(windows) {
        &["bin\\server", "bin\\client", "jre\\bin\\server"]
    } else {
        &[
            "lib/server",
            "lib/client",
            "jre/lib/server",
            "jre/lib/amd64/server",
            "jre/lib/aarch64/server",
            "lib",
        ]
    }
}

/// Locate the VM shared library under an installation root.
///
/// Returns the first existing candidate, or `None` when the root holds no
/// VM library in any known subdirectory.
pub fn locate_vm_library(home: &Path) -> Option<PathBuf> {
    let filename = vm_library_filename();
    for subdir in vm_library_subdirs() {
        let candidate = home.join(subdir).join(filename);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_separator_matches_platform() {
        #[cfg(unix)]
        assert_eq!(PATH_LIST_SEPARATOR, ':');
        #[cfg(windows)]
        assert_eq!(PATH_LIST_SEPARATOR, ';');
    }

    #[test]
    fn test_vm_library_filename_has_platform_extension() {
        let name = vm_library_filename();
        #[cfg(target_os = "macos")]
        assert!(name.ends_with(".dylib"));
        #[cfg(target_os = "linux")]
        assert!(name.ends_with(".so"));
        assert!(name.contains("jvm"));
    }

    #[test]
    fn test_locate_vm_library_finds_server_lib() {
        let home = tempfile::tempdir().unwrap();
        let server = home.path().join("lib").join("server");
        std::fs::create_dir_all(&server).unwrap();
        let lib = server.join(vm_library_filename());
        std::fs::write(&lib, b"").unwrap();

        assert_eq!(locate_vm_library(home.path()), Some(lib));
    }

    #[test]
    fn test_locate_vm_library_empty_home() {
        let home = tempfile::tempdir().unwrap();
        assert_eq!(locate_vm_library(home.path()), None);
    }
}

//! Jar inspection.
//!
//! Lists the classes a jar provides without involving the VM, which is
//! useful for building import specs ahead of boot.

use std::fs::File;
use std::path::Path;

use crate::error::{Error, Result};

/// Fully-qualified names of every class in a jar, sorted and deduplicated.
pub fn classes_in_jar(jar: &Path) -> Result<Vec<String>> {
    let file = File::open(jar)
        .map_err(|e| Error::configuration(format!("jar not readable: {}: {}", jar.display(), e)))?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| Error::configuration(format!("jar not readable: {}: {}", jar.display(), e)))?;

    let mut classes = Vec::new();
    for index in 0..archive.len() {
        let entry = archive.by_index(index).map_err(|e| {
            Error::configuration(format!("jar entry unreadable: {}: {}", jar.display(), e))
        })?;
        if let Some(stem) = entry.name().strip_suffix(".class") {
            classes.push(stem.replace('/', "."));
        }
    }
    classes.sort();
    classes.dedup();
    Ok(classes)
}

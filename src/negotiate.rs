//! Default-property negotiation via a disposable child-process VM.
//!
//! Starting a VM is a one-time irreversible action per process, so a VM's
//! *default* properties (notably its default library path) cannot be read
//! by booting and discarding a VM in the host process. Instead the host
//! spawns a child running the worker mode of this crate's binary, writes one
//! line — the backend identifier — to its stdin, and reads the codec-encoded
//! property snapshot from its stdout after exit.
//!
//! ```text
//! host                                child (props-worker)
//!  |  "hotspot\n"  ──────────────────▶  read line, validate [A-Za-z0-9]+
//!  |                                    boot disposable vm (empty classpath)
//!  |  ◀──────────────  codec bytes      encode system properties, exit 0
//!  |  wait (deadline), decode
//! ```
//!
//! Exit code 0 plus decodable output is success; anything else is a
//! negotiation failure, never an empty mapping. The result is fetched at
//! most once per backend per host process and cached.

use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::Command;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::Mutex;

use crate::backend::BackendKind;
use crate::codec::{default_codec, PropertiesSnapshot, PropsCodec};
use crate::error::{Error, Result};
use crate::initializer::VmSettings;
use crate::paths::{self, PathEntry};
use crate::process::run_captured;

/// Environment variable naming the worker executable. Without it the
/// current executable is re-invoked, which works for the `jvmhost` binary;
/// applications embedding the library point this at a binary that exposes
/// [`run_worker`].
pub const WORKER_ENV: &str = "JVMHOST_NEGOTIATOR";

/// Subcommand implementing the worker mode.
pub const WORKER_SUBCOMMAND: &str = "props-worker";

static CACHE: OnceLock<Mutex<HashMap<BackendKind, Arc<PropertiesSnapshot>>>> = OnceLock::new();

fn cache() -> &'static Mutex<HashMap<BackendKind, Arc<PropertiesSnapshot>>> {
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// A backend's default system properties, negotiated once per process.
///
/// Only successful fetches are cached; a failed negotiation surfaces its
/// error and leaves the next caller free to retry.
pub fn default_properties(
    kind: BackendKind,
    timeout: Duration,
) -> Result<Arc<PropertiesSnapshot>> {
    let mut guard = cache().lock();
    if let Some(hit) = guard.get(&kind) {
        return Ok(Arc::clone(hit));
    }
    let codec = default_codec();
    let cmd = worker_command(codec)?;
    let props = Arc::new(negotiate(cmd, kind, codec, timeout)?);
    tracing::debug!(backend = %kind, properties = props.len(), "cached negotiated defaults");
    guard.insert(kind, Arc::clone(&props));
    Ok(props)
}

/// A backend's default native-library search path.
pub fn default_library_paths(kind: BackendKind, timeout: Duration) -> Result<Vec<PathEntry>> {
    let props = default_properties(kind, timeout)?;
    let raw = props.get(kind.library_path_property()).unwrap_or("");
    Ok(paths::split_path_list(raw))
}

/// Run one negotiation round against an arbitrary worker command.
///
/// The backend identifier is validated before anything is written to the
/// child. The host blocks until child exit (bounded by `timeout`) and a
/// full stdout drain.
pub fn negotiate(
    cmd: Command,
    kind: BackendKind,
    codec: &dyn PropsCodec,
    timeout: Duration,
) -> Result<PropertiesSnapshot> {
    let name = kind.name();
    validate_backend_name(name)?;

    let request = format!("{}\n", name);
    let captured = run_captured(cmd, request.as_bytes(), timeout)?;

    if captured.timed_out {
        return Err(Error::negotiation_timeout(name, timeout.as_secs()));
    }
    if !captured.status.success() {
        let stderr = String::from_utf8_lossy(&captured.stderr);
        let detail = stderr
            .lines()
            .last()
            .unwrap_or("no diagnostic output")
            .to_string();
        return Err(Error::negotiation(
            "await worker",
            format!("worker exited with {:?}: {}", captured.status.code(), detail),
        ));
    }
    if captured.stdout.is_empty() {
        return Err(Error::negotiation("read payload", "worker wrote no output"));
    }
    codec
        .decode(&captured.stdout)
        .map_err(|e| Error::negotiation("decode payload", e.to_string()))
}

/// Validate a backend identifier against the negotiation grammar
/// (`[A-Za-z0-9]+`).
pub fn validate_backend_name(name: &str) -> Result<()> {
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric()) {
        Ok(())
    } else {
        Err(Error::configuration(format!(
            "backend identifier must be alphanumeric, got {:?}",
            name
        )))
    }
}

/// Child side of the negotiation.
///
/// Reads the backend identifier line from `input`, boots a disposable VM
/// with an empty classpath and no imports, and writes the encoded property
/// snapshot to `output`. Any error makes the worker process exit non-zero,
/// which the host reports as a negotiation failure.
pub fn run_worker(
    input: &mut dyn BufRead,
    output: &mut dyn Write,
    codec: &dyn PropsCodec,
) -> Result<()> {
    let mut line = String::new();
    input.read_line(&mut line)?;
    let name = line.trim_end_matches('\n').trim_end_matches('\r');
    validate_backend_name(name)?;
    let kind = BackendKind::from_name(name)
        .ok_or_else(|| Error::configuration(format!("unknown backend: {}", name)))?;

    let mut init = kind.new_initializer(&VmSettings::default())?;
    init.prepare_vm()?;
    let props = init.system_properties()?;

    let bytes = codec.encode(&props)?;
    output.write_all(&bytes)?;
    output.flush()?;
    Ok(())
}

fn worker_command(codec: &dyn PropsCodec) -> Result<Command> {
    let exe = match std::env::var_os(WORKER_ENV) {
        Some(path) => PathBuf::from(path),
        None => std::env::current_exe()?,
    };
    let mut cmd = Command::new(exe);
    cmd.arg(WORKER_SUBCOMMAND).arg("--codec").arg(codec.name());
    Ok(cmd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;

    #[test]
    fn test_validate_backend_name() {
        assert!(validate_backend_name("hotspot").is_ok());
        assert!(validate_backend_name("Backend2").is_ok());
        for bad in ["", "hot spot", "hot-spot", "hotspot\n", "../escape"] {
            assert!(
                validate_backend_name(bad).is_err(),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[cfg(unix)]
    mod scripted {
        use super::*;
        use std::process::Command;
        use std::time::Duration;

        fn sh(script: &str) -> Command {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(script);
            cmd
        }

        #[test]
        fn test_scripted_child_yields_library_path() {
            let cmd = sh(r#"cat >/dev/null; printf '{"java.library.path": "/opt/lib"}'"#);
            let props =
                negotiate(cmd, BackendKind::Hotspot, &JsonCodec, Duration::from_secs(10)).unwrap();
            assert_eq!(props.get("java.library.path"), Some("/opt/lib"));

            let entries = paths::split_path_list(
                props
                    .get(BackendKind::Hotspot.library_path_property())
                    .unwrap(),
            );
            let normalized: Vec<String> = entries.iter().map(PathEntry::normalized).collect();
            assert_eq!(normalized, vec!["/opt/lib"]);
        }

        #[test]
        fn test_child_failure_is_negotiation_error() {
            let cmd = sh("cat >/dev/null; exit 1");
            let err = negotiate(cmd, BackendKind::Hotspot, &JsonCodec, Duration::from_secs(10))
                .unwrap_err();
            assert!(
                matches!(err, Error::Negotiation { .. }),
                "expected Negotiation, got {:?}",
                err
            );
        }

        #[test]
        fn test_child_empty_output_is_negotiation_error() {
            let cmd = sh("cat >/dev/null; exit 0");
            let err = negotiate(cmd, BackendKind::Hotspot, &JsonCodec, Duration::from_secs(10))
                .unwrap_err();
            assert!(matches!(err, Error::Negotiation { .. }));
            assert!(err.to_string().contains("no output"));
        }

        #[test]
        fn test_undecodable_output_is_negotiation_error() {
            let cmd = sh("cat >/dev/null; printf 'not a payload'");
            let err = negotiate(cmd, BackendKind::Hotspot, &JsonCodec, Duration::from_secs(10))
                .unwrap_err();
            assert!(matches!(err, Error::Negotiation { .. }));
        }

        #[test]
        fn test_hung_child_times_out() {
            let cmd = sh("sleep 5");
            let err = negotiate(
                cmd,
                BackendKind::Hotspot,
                &JsonCodec,
                Duration::from_millis(200),
            )
            .unwrap_err();
            assert!(
                matches!(err, Error::NegotiationTimeout { .. }),
                "expected NegotiationTimeout, got {:?}",
                err
            );
        }
    }

    #[test]
    fn test_worker_rejects_non_alphanumeric_backend() {
        let mut input = std::io::BufReader::new(&b"not valid!\n"[..]);
        let mut output = Vec::new();
        let err = run_worker(&mut input, &mut output, &JsonCodec).unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert!(output.is_empty(), "worker must not write on failure");
    }

    #[test]
    fn test_worker_rejects_unknown_backend() {
        let mut input = std::io::BufReader::new(&b"jpype\r\n"[..]);
        let mut output = Vec::new();
        let err = run_worker(&mut input, &mut output, &JsonCodec).unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert!(err.to_string().contains("unknown backend"));
    }
}

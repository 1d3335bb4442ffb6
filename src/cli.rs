//! CLI subcommands.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use jvmhost::codec::codec_by_name;
use jvmhost::{negotiate, BackendKind, Error, Result, VmSettings};

fn parse_backend(name: Option<&str>) -> Result<BackendKind> {
    match name {
        Some(name) => name.parse(),
        None => Ok(BackendKind::resolve()),
    }
}

fn parse_codec(name: &str) -> Result<&'static dyn jvmhost::PropsCodec> {
    codec_by_name(name)
        .ok_or_else(|| Error::configuration(format!("unknown codec {:?}, expected cbor or json", name)))
}

/// Fetch a backend's default properties via the child-process negotiation.
#[derive(Args, Debug)]
pub struct PropsCmd {
    /// Backend to negotiate with (defaults to environment resolution).
    #[arg(long)]
    backend: Option<String>,

    /// Payload codec shared with the worker.
    #[arg(long, default_value = "cbor")]
    codec: String,

    /// Negotiation deadline in seconds.
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Print the snapshot as JSON instead of key=value lines.
    #[arg(long)]
    json: bool,
}

impl PropsCmd {
    /// Run the negotiation and print the defaults.
    pub fn run(&self) -> Result<()> {
        let kind = parse_backend(self.backend.as_deref())?;
        let props =
            negotiate::default_properties(kind, Duration::from_secs(self.timeout_secs))?;

        if self.json {
            let rendered = serde_json::to_string_pretty(props.as_ref())
                .map_err(|e| Error::codec("encode", e.to_string()))?;
            println!("{}", rendered);
        } else {
            for (key, value) in &props.0 {
                println!("{}={}", key, value);
            }
        }
        Ok(())
    }
}

/// Print the VM library the selected backend would boot.
#[derive(Args, Debug)]
pub struct WhichCmd {
    /// Backend to resolve (defaults to environment resolution).
    #[arg(long)]
    backend: Option<String>,

    /// Explicit VM installation root, overriding environment discovery.
    #[arg(long)]
    vm_home: Option<PathBuf>,
}

impl WhichCmd {
    /// Resolve and print the VM library path.
    pub fn run(&self) -> Result<()> {
        let kind = parse_backend(self.backend.as_deref())?;
        let settings = VmSettings {
            vm_home: self.vm_home.clone(),
            ..VmSettings::default()
        };
        let init = kind.new_initializer(&settings)?;
        println!("{}", init.select_vm()?.display());
        Ok(())
    }
}

/// List the classes contained in a jar.
#[derive(Args, Debug)]
pub struct ClassesCmd {
    /// Path to the jar.
    jar: PathBuf,
}

impl ClassesCmd {
    /// Print one fully-qualified class name per line.
    pub fn run(&self) -> Result<()> {
        for class in jvmhost::jar::classes_in_jar(&self.jar)? {
            println!("{}", class);
        }
        Ok(())
    }
}

/// Negotiation worker mode (the child side of `props`).
///
/// Reads the backend identifier from stdin, boots a disposable VM, and
/// writes the encoded property snapshot to stdout. Hidden from help: this
/// exists to be spawned by the host side, not typed by hand.
#[derive(Args, Debug)]
pub struct PropsWorkerCmd {
    /// Payload codec agreed with the host.
    #[arg(long, default_value = "cbor")]
    codec: String,
}

impl PropsWorkerCmd {
    /// Run the worker exchange over this process's standard streams.
    pub fn run(&self) -> Result<()> {
        let codec = parse_codec(&self.codec)?;
        let stdin = std::io::stdin();
        let stdout = std::io::stdout();
        let mut input = stdin.lock();
        let mut output = stdout.lock();
        negotiate::run_worker(&mut input, &mut output, codec)?;
        output.flush()?;
        Ok(())
    }
}

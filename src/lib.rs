//! jvmhost - embed and manage a JVM from a host process
//!
//! jvmhost is a library and CLI for booting a managed VM inside the calling
//! process across interchangeable backends, with strict handling of the
//! VM's irreversible startup semantics.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │  jvmhost CLI / Library                          │
//! ├─────────────────────────────────────────────────┤
//! │  Session (process-wide singleton, class table)  │
//! ├─────────────────────────────────────────────────┤
//! │  RuntimeInitializer (Hotspot | Graal)           │
//! ├─────────────────────────────────────────────────┤
//! │  JNI invocation API (libjvm)                    │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use jvmhost::{obtain, SessionOptions};
//!
//! let options = SessionOptions::builder()
//!     .class_path("/opt/app/index.jar")
//!     .classes(&["org.index.Searcher"][..])
//!     .build();
//!
//! let session = obtain(options).unwrap();
//! let session = session.lock();
//! let searcher = session.class("Searcher").unwrap();
//!
//! println!("loaded {}", searcher.qualified_name());
//! ```
//!
//! # Startup is irreversible
//!
//! Most VM configuration can only be set before boot and never again — the
//! native-library search path above all. jvmhost therefore:
//!
//! - accumulates classpath/library-path entries before boot and passes them
//!   as boot options;
//! - learns a backend's *default* library path by booting a disposable VM in
//!   a child process (the [`negotiate`] module) instead of ever restarting
//!   the host's own VM;
//! - boots at most one VM per process, behind a gate that makes concurrent
//!   first-time callers block instead of racing.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod codec;
pub mod error;
pub mod initializer;
pub mod interface;
pub mod jar;
pub mod loader;
pub mod negotiate;
pub mod paths;
pub mod platform;
pub mod process;
pub mod session;

// Re-export main types for convenience
pub use backend::{default_initializer, BackendKind, GraalInitializer, HotspotInitializer};
pub use codec::{default_codec, PropertiesSnapshot, PropsCodec};
pub use error::{Error, Result};
pub use initializer::{
    ClassHandle, ClassImportSpec, PrepareOutcome, ReflectionObject, RuntimeInitializer, VmPhase,
    VmSettings,
};
pub use interface::{ImplementationHandle, InterfaceBinding, MethodBinding, Value};
pub use loader::{LoaderId, LoaderRegistry};
pub use paths::PathEntry;
pub use session::{obtain, ExtendPolicy, Session, SessionCell, SessionOptions};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

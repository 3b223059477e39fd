//! The Kiln incremental build cache engine.
//!
//! Kiln memoizes build operations that derive outputs, either files or
//! in-memory values, from a file system. Re-running a build re-executes only the
//! operations whose observed inputs changed; everything else is served from
//! the cache, and unchanged output files survive on disk untouched. To its
//! callers every build looks like a clean-slate rebuild: outputs from the
//! previous build that the current build does not reproduce are deleted on
//! commit, and a failed build rolls the file system back to its pre-build
//! state.
//!
//! The engine is driven through two handles. [`Engine`] owns the cache
//! location and exposes the top-level operations [`Engine::build`],
//! [`Engine::build_versioned`] and [`Engine::clean`]. Inside a build, user
//! functions receive a [`Builder`], which carries the virtualized file
//! system view (every read becomes a tracked dependency) and the nested
//! operations [`Builder::build_file`] and [`Builder::subbuild`].
//!
//! ```no_run
//! use kiln_engine::{Engine, Builder, BuildError};
//! use serde_json::json;
//!
//! fn copy_upper(b: &Builder, out: &std::path::Path, input: &str) -> Result<(), BuildError> {
//!     let text = b.read_text(input)?;
//!     std::fs::write(out, text.to_uppercase())?;
//!     Ok(())
//! }
//!
//! fn main() -> Result<(), BuildError> {
//!     let engine = Engine::new("/tmp/demo/kiln.cache");
//!     engine.build("upper_demo", |b| {
//!         b.build_file("/tmp/demo/out.txt", "copy_upper", &[json!("/tmp/demo/in.txt")], |b, out| {
//!             copy_upper(b, out, "/tmp/demo/in.txt")
//!         })
//!     })
//! }
//! ```
//!
//! Functions passed to [`Builder::build_file`] and [`Builder::subbuild`]
//! must be functional and deterministic: they may depend only on their
//! arguments and on file system state accessed through the `Builder`, and
//! they may only write to the output path of the enclosing `build_file`.
//! The top-level function passed to [`Engine::build`] is exempt from the
//! determinism rule but must still route file system reads through its
//! `Builder`.

#![warn(missing_docs)]

mod builder;
mod engine;
mod error;
mod hypo;
mod journal;
mod recorder;
mod session;
mod validate;
mod vfs;
mod walk;

pub use builder::Builder;
pub use engine::{Engine, Versions};
pub use error::BuildError;
pub use walk::Walk;

pub use kiln_cache::{CacheStore, FileStore};
pub use kiln_fs::{Comparison, FsProbe, MemFs, RealFs};
pub use serde_json::Value;

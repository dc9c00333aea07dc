//! Repository Backend Integration
//!
//! Abstracted access to the repository backend through a common trait, so the
//! reconciler, poller, and list synchronizer never see HTTP details.
//!
//! # Available Backends
//!
//! - **HTTP**: the real backend over reqwest (default)
//! - **Mock**: scripted, in-memory; used by the test suites
//!
//! # Usage
//!
//! ```ignore
//! use repochat_core::backend::{HttpBackend, RepoBackend};
//!
//! let backend = HttpBackend::new("http://localhost:8000")?;
//! let record = backend.repository_status("3f2a...").await?;
//! ```

mod http;
mod mock;
mod traits;

pub use http::HttpBackend;
pub use mock::{encode_frame, MockBackend, StreamScript};
pub use traits::{ByteStream, RepoBackend};

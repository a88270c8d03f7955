//! Chat backends
//!
//! The thread store talks to one `ChatBackend`:
//! - `MockBackend`: canned replies with simulated latency, state kept in the
//!   key-value store
//! - `AzureBackend`: remote chat completions over HTTPS with bearer auth

pub mod azure;
pub mod backend;
pub mod mock;
pub mod router;

pub use azure::AzureBackend;
pub use backend::ChatBackend;
pub use mock::{MockBackend, MockOptions};
pub use router::select_backend;

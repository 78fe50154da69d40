//! JSON-RPC transport to the ERP backend.
//!
//! Implements the `BackendClient` seam over the backend's `/jsonrpc`
//! endpoint: `common.authenticate` for login and `object.execute_kw` for
//! `search_read` and `create`. Concurrency toward the backend is capped by
//! a semaphore sized from configuration.

mod jsonrpc;

pub use jsonrpc::JsonRpcBackend;

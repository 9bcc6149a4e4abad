//! HTTP transport: retry policy, retrying client, error classification, and cache semantics.

pub mod client;
pub mod errors;
pub mod retry;
pub mod semantics;

//! Integration tests driven against a local mock server.

mod auth_flow;
mod common;
mod key_source;
mod signing;

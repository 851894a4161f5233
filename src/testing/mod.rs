//! Testing utilities and mock implementations
//!
//! Lets the crew and HTTP API be tested without an LLM server or search API.

pub mod mocks;

pub use mocks::*;

//! Test fixtures for termwire.
//!
//! Stub WebSocket endpoints that behave like a terminal-streaming server with
//! predictable output, and small helpers for writing scenario files.

#![allow(missing_docs)]

pub mod endpoint;
pub mod helpers;

pub use endpoint::{
    AfterScript, EchoEndpoint, EndpointHandle, Received, ScriptedEndpoint, StalledEndpoint,
};

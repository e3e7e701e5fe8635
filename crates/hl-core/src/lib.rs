//! hl-core: Core abstractions and configuration for hostlink
//!
//! This crate provides the handler contract, token validation, the parsed
//! form of a session's initial message, errors and configuration shared by
//! the agent components.

pub mod auth;
pub mod config;
pub mod error;
pub mod request;
pub mod traits;

pub use request::InitialRequest;

//! Core trait definitions

mod handler;
mod validator;

pub use handler::Handler;
pub use validator::TokenValidator;

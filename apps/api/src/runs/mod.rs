//! Run submission, history and export over HTTP.

pub mod collaborators;
pub mod export;
pub mod handlers;
pub mod upload;
pub mod validation;

//! Codecs for the IMS subscriber data service:
//!
//! - [`authvector`]: digest and AKA authentication vectors and their JSON
//!   wire form
//! - [`subscription`]: the IMS subscription profile document and the wrapped
//!   registration-data document

pub mod authvector;
pub mod subscription;

pub use authvector::{AkaAuthVector, AuthVector, DigestAuthVector};
pub use subscription::RegistrationState;

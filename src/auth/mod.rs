//! Authentication primitives: password hashing, role capabilities and the
//! caller context passed into services.

pub mod context;
pub mod password;
pub mod roles;

pub use context::AuthContext;
pub use roles::Capability;

//! Authentication for insurance-predictor
//!
//! Provides:
//! - Password strength policy
//! - Password hashing (Argon2id, legacy SHA-256) and verification
//! - JSON-file credential store with register / authenticate

pub mod password;
pub mod store;

pub use password::{hash_password, validate_password_strength, verify_password, PasswordScheme};
pub use store::{CredentialStore, UserFile};

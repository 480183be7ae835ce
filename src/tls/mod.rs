//! TLS interception: root CA handling, per-host certificate issuance,
//! and the on-disk certificate store backing the HTTPS listener.

pub mod ca;
pub mod store;

pub use ca::{GeneratedAuthority, RootAuthority};
pub use store::CertStore;

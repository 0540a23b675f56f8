//! # parlor-auth
//!
//! Token verification for Parlor Chat. Credential issuance (registration,
//! login, password storage) lives outside this system; this crate carries
//! only what the session gateway contract needs: HS256 claims, a decoder
//! that turns a presented token into a verified identity + expiry, and a
//! small encoder used by tests and operational tooling.

pub mod jwt;

pub use jwt::{Claims, IssuedToken, JwtDecoder, JwtEncoder};

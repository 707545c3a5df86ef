//! API-compatible types.
//!
//! The types in this module are serialised in an API-friendly way, e.g.:
//!
//! - IDs are serialised as hex strings.
//! - Datetimes are serialised as RFC 3339 timestamps.
//!
//! Incoming request shapes also live here, each with an explicit
//! `validate` function; request context (requester identity, client
//! address) is modelled as request guards rather than ambient state.

pub mod auth;
pub mod client_ip;
pub mod poll;
pub mod token;

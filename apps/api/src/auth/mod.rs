//! Session authentication: signed session tokens, request extractors,
//! OAuth (GitHub, Google) and a development credentials provider.

pub mod accounts;
pub mod extract;
pub mod handlers;
pub mod oauth;
pub mod session;

pub use extract::{AuthUser, MaybeUser};

// Session handling against the external auth backend
// Decision: the gateway never verifies JWT signatures itself; validation is
// a backend round-trip so expiry and revocation are always honored

pub mod backend;
pub mod client;
pub mod session;

pub use backend::{AuthBackend, BackendError};
pub use client::{AuthClient, CookieStore};
pub use session::{AuthUser, Session};

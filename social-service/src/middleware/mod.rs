pub mod csrf;
pub mod metrics;
pub mod session;

pub use csrf::{CsrfVerified, CSRF_HEADER};
pub use metrics::metrics_middleware;
pub use session::{session_middleware, AuthenticatedMember, SessionHandle, SessionSlot, SESSION_COOKIE};

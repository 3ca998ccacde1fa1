pub mod registration;
pub mod session;

pub use registration::{register, register_token};
pub use session::{csrf_token, login, logout, me};

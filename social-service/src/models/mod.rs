mod auth_form;
mod identity;
mod member;
mod relationship;
mod remember_token;
mod session;

pub use auth_form::{AuthForm, RegisterForm, DEFAULT_NEXT_URI};
pub use identity::Identity;
pub use member::Member;
pub use relationship::{PairKey, Relationship, RelationshipState, RelationshipView};
pub use remember_token::{RememberBlob, RememberCookie, RememberToken, REMEMBER_PURPOSE};
pub use session::{Session, SessionId, MEMBER_CREDENTIAL};

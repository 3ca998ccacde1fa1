use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::{AuthForm, RegisterForm};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Login id is required"))]
    #[schema(example = "alice@example.com")]
    pub login_id: String,

    #[validate(length(min = 1, message = "Password is required"))]
    #[schema(example = "password123")]
    pub password: String,

    #[serde(default)]
    pub remember_me: bool,

    /// Relative path to continue to after login
    #[schema(example = "/friends")]
    pub next_uri: Option<String>,

    /// Auth adapter to use; the default adapter when omitted
    #[schema(example = "password")]
    pub auth_mode: Option<String>,
}

impl LoginRequest {
    pub fn to_form(&self) -> AuthForm {
        AuthForm::default()
            .with_field("login_id", self.login_id.as_str())
            .with_field("password", self.password.as_str())
            .remember_me(self.remember_me)
            .next(self.next_uri.clone())
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    #[schema(example = "alice")]
    pub identity: String,
    #[schema(example = "/friends")]
    pub redirect: String,
    pub remembered: bool,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "alice@example.com")]
    pub login_id: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    #[schema(example = "password123", min_length = 8)]
    pub password: String,

    /// Requested member identity; generated when omitted
    #[validate(length(min = 1, max = 64, message = "Identity must be 1-64 characters"))]
    #[schema(example = "alice")]
    pub identity: Option<String>,

    pub auth_mode: Option<String>,
}

impl RegisterRequest {
    pub fn to_form(&self) -> RegisterForm {
        let form = RegisterForm::default()
            .with_field("login_id", self.login_id.as_str())
            .with_field("password", self.password.as_str());
        match self.identity.as_deref() {
            Some(identity) => form.with_field("identity", identity),
            None => form,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RegisterResponse {
    #[schema(example = "alice")]
    pub identity: String,
    #[schema(example = "Registration successful")]
    pub message: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterTokenRequest {
    #[validate(length(min = 1, message = "Token is required"))]
    #[schema(example = "3f2a9c")]
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MeResponse {
    /// Bound identity; `null` for anonymous sessions
    pub identity: Option<String>,
    pub authenticated: bool,
    pub is_member: bool,
    pub auth_mode: Option<String>,
    pub login_id: Option<String>,
    pub register_begun: bool,
    pub register_finished: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CsrfResponse {
    #[schema(example = "9f86d081884c7d65.1718000000.2c26b46b68ffc68ff99b453c1d304134")]
    pub token: String,
    /// Seconds the token stays usable
    #[schema(example = 3600)]
    pub expires_in: i64,
}

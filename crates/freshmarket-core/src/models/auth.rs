use serde::{Deserialize, Serialize};

use super::UserRole;

/// Username/password pair sent to the login endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Access/refresh token pair issued at login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    pub access: String,
    pub refresh: String,
}

/// Refresh endpoint response. Servers that rotate refresh tokens also
/// return a new `refresh`.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshedToken {
    pub access: String,
    #[serde(default)]
    pub refresh: Option<String>,
}

/// Account fields accepted by the registration endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub name: String,
    pub password: String,
    pub password2: String,
    pub user_type: UserRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl RegisterRequest {
    pub fn new(name: impl Into<String>, password: impl Into<String>, role: UserRole) -> Self {
        let password = password.into();
        Self {
            name: name.into(),
            password2: password.clone(),
            password,
            user_type: role,
            phone_number: None,
            location: None,
        }
    }

    /// Credentials for signing in as the account being registered
    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.name.clone(), self.password.clone())
    }
}

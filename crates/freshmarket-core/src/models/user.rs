//! Account identity as returned by the profile endpoint.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Farmer,
    Buyer,
}

impl UserRole {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "farmer" => Some(UserRole::Farmer),
            "buyer" => Some(UserRole::Buyer),
            _ => None,
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Farmer => write!(f, "farmer"),
            UserRole::Buyer => write!(f, "buyer"),
        }
    }
}

/// The signed-in user. Held in memory only; rebuilt from the profile
/// endpoint at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    #[serde(rename = "user_type", alias = "role", default)]
    pub role: Option<UserRole>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub profile_picture: Option<String>,
    #[serde(default)]
    pub cover_photo: Option<String>,
    #[serde(default)]
    pub date_joined: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_products: Option<i64>,
}

impl User {
    pub fn is_farmer(&self) -> bool {
        self.role == Some(UserRole::Farmer)
    }

    pub fn role_display(&self) -> &'static str {
        match self.role {
            Some(UserRole::Farmer) => "Farmer",
            Some(UserRole::Buyer) => "Buyer",
            None => "Unknown",
        }
    }
}

/// Partial profile update; unset fields are left untouched by the server.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.phone_number.is_none()
            && self.location.is_none()
            && self.bio.is_none()
    }
}

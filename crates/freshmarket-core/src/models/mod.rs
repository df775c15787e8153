//! Data models for marketplace entities.
//!
//! This module contains the data structures exchanged with the
//! marketplace API:
//!
//! - Auth payloads: `Credentials`, `CredentialPair`, `RegisterRequest`
//! - `User`, `UserRole`, `ProfileUpdate`: account identity and profile
//! - `Product`, `ProductDraft`: produce listings
//! - `Order`, `OrderStatus`, `OrderStats`, `OrderFilter`: order tracking

pub mod auth;
pub mod order;
pub mod product;
pub mod user;

pub use auth::{CredentialPair, Credentials, RefreshedToken, RegisterRequest};
pub use order::{Order, OrderFilter, OrderItem, OrderStats, OrderStatus};
pub use product::{Product, ProductDraft, ProductFarmer};
pub use user::{ProfileUpdate, User, UserRole};

use serde::{Deserialize, Deserializer};

/// A list endpoint payload, either paginated or a bare array.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Listing<T> {
    Page {
        results: Vec<T>,
        #[serde(default)]
        next: Option<String>,
    },
    Bare(Vec<T>),
}

impl<T> Listing<T> {
    /// Whether the server has another page after this one
    pub fn has_next(&self) -> bool {
        matches!(self, Listing::Page { next: Some(_), .. })
    }

    pub fn into_vec(self) -> Vec<T> {
        match self {
            Listing::Page { results, .. } => results,
            Listing::Bare(items) => items,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Amount {
    Number(f64),
    Text(String),
}

impl Amount {
    fn into_f64<E: serde::de::Error>(self) -> Result<f64, E> {
        match self {
            Amount::Number(n) => Ok(n),
            Amount::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("invalid decimal amount: {:?}", s))),
        }
    }
}

/// Monetary amounts arrive as decimal strings ("50.00") or plain numbers.
pub(crate) fn de_amount<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Amount::deserialize(deserializer)?.into_f64()
}

pub(crate) fn de_opt_amount<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<f64>, D::Error> {
    match Option::<Amount>::deserialize(deserializer)? {
        Some(amount) => amount.into_f64().map(Some),
        None => Ok(None),
    }
}

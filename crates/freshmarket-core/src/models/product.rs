//! Produce listings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::de_amount;

/// Seller of a product. List endpoints embed either the farmer's id or a
/// short summary object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProductFarmer {
    Summary {
        id: i64,
        #[serde(default)]
        name: Option<String>,
    },
    Id(i64),
}

impl ProductFarmer {
    pub fn id(&self) -> i64 {
        match self {
            ProductFarmer::Summary { id, .. } | ProductFarmer::Id(id) => *id,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            ProductFarmer::Summary { name, .. } => name.as_deref(),
            ProductFarmer::Id(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(deserialize_with = "de_amount")]
    pub price: f64,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default = "default_available")]
    pub available: bool,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub farmer: Option<ProductFarmer>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

fn default_available() -> bool {
    true
}

impl Product {
    /// Price with its selling unit, e.g. "KES 50.00 / bundle"
    pub fn price_display(&self) -> String {
        match self.unit.as_deref() {
            Some(unit) if !unit.is_empty() => format!("KES {:.2} / {}", self.price, unit),
            _ => format!("KES {:.2}", self.price),
        }
    }

    pub fn farmer_name(&self) -> &str {
        self.farmer
            .as_ref()
            .and_then(|f| f.name())
            .unwrap_or("-")
    }
}

/// Fields sent when a farmer creates or replaces a listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductDraft {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub price: f64,
    pub unit: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub available: bool,
}

impl ProductDraft {
    pub fn new(name: impl Into<String>, price: f64, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: None,
            price,
            unit: unit.into(),
            location: None,
            available: true,
        }
    }
}

impl From<&Product> for ProductDraft {
    fn from(product: &Product) -> Self {
        Self {
            name: product.name.clone(),
            category: product.category.clone(),
            price: product.price,
            unit: product.unit.clone().unwrap_or_default(),
            location: product.location.clone(),
            available: product.available,
        }
    }
}

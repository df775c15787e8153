//! Client-side shopping cart.
//!
//! The cart lives on the client until checkout; a JSON snapshot in the data
//! directory keeps it between CLI invocations.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::models::Product;

/// Cart snapshot file name in the data directory
const CART_FILE: &str = "cart.json";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CartError {
    #[error("Your cart is empty")]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: i64,
    pub name: String,
    pub price: f64,
    #[serde(default)]
    pub unit: Option<String>,
    pub quantity: u32,
}

impl CartItem {
    pub fn subtotal(&self) -> f64 {
        self.price * f64::from(self.quantity)
    }
}

/// What a checkout would submit
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutSummary {
    pub items: Vec<CartItem>,
    pub total: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    items: Vec<CartItem>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }

    /// Add one unit of a product, or bump the quantity if it is already in the cart
    pub fn add(&mut self, product: &Product) {
        match self.items.iter_mut().find(|i| i.product_id == product.id) {
            Some(item) => item.quantity += 1,
            None => self.items.push(CartItem {
                product_id: product.id,
                name: product.name.clone(),
                price: product.price,
                unit: product.unit.clone(),
                quantity: 1,
            }),
        }
        self.touch();
    }

    pub fn remove(&mut self, product_id: i64) -> bool {
        let before = self.items.len();
        self.items.retain(|i| i.product_id != product_id);
        let removed = self.items.len() != before;
        if removed {
            self.touch();
        }
        removed
    }

    /// Set a line's quantity; anything below 1 removes the line.
    /// Returns false if the product is not in the cart.
    pub fn set_quantity(&mut self, product_id: i64, quantity: u32) -> bool {
        if quantity < 1 {
            return self.remove(product_id);
        }
        match self.items.iter_mut().find(|i| i.product_id == product_id) {
            Some(item) => {
                item.quantity = quantity;
                self.touch();
                true
            }
            None => false,
        }
    }

    pub fn total(&self) -> f64 {
        self.items.iter().map(CartItem::subtotal).sum()
    }

    /// Number of units across all lines
    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.touch();
    }

    pub fn checkout(&self) -> Result<CheckoutSummary, CartError> {
        if self.is_empty() {
            return Err(CartError::Empty);
        }
        Ok(CheckoutSummary {
            items: self.items.clone(),
            total: self.total(),
        })
    }

    pub fn snapshot_path(data_dir: &Path) -> PathBuf {
        data_dir.join(CART_FILE)
    }

    /// Load a snapshot; a missing file is an empty cart
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let contents = std::fs::read_to_string(path).context("Failed to read cart file")?;
        let cart = serde_json::from_str(&contents).context("Failed to parse cart file")?;
        debug!(?path, "Cart loaded");
        Ok(cart)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents).context("Failed to write cart file")?;
        Ok(())
    }
}

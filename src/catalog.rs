use std::fs::read_to_string;

use serde::{Deserialize, Serialize};

/// One entry in a customer's cart. Prices are never trusted from the client;
/// only the name is used to look the product up server-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItem {
    pub name: String,
    pub quantity: u32,
    #[serde(default)]
    pub option: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoxSize {
    Large,
    Standard,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Product {
    pub id: u32,
    pub name: String,
    pub price: f64,
    pub size: BoxSize,
    #[serde(default)]
    pub options: Option<ProductOptions>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductOptions {
    pub label: String,
    pub choices: Vec<String>,
}

pub struct Catalog {
    products: Vec<Product>,
}

impl Catalog {
    pub fn load(path: &str) -> Self {
        let raw = read_to_string(path).expect("Catalog file missing!");

        Self::from_json(&raw).expect("Catalog file malformed!")
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        Ok(Self {
            products: serde_json::from_str(raw)?,
        })
    }

    pub fn find(&self, name: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.name == name)
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

pub fn total_boxes(cart: &[CartItem]) -> u32 {
    cart.iter().map(|item| item.quantity).sum()
}

/// Free shipping when the cart holds at least 2 large boxes or 3 boxes total,
/// otherwise the standard fee applies.
pub fn shipping_cost(cart: &[CartItem], catalog: &Catalog, standard_fee: f64) -> f64 {
    let total = total_boxes(cart);
    let large: u32 = cart
        .iter()
        .filter(|item| {
            catalog
                .find(&item.name)
                .is_some_and(|p| p.size == BoxSize::Large)
        })
        .map(|item| item.quantity)
        .sum();

    if large >= 2 || total >= 3 {
        return 0.0;
    }

    standard_fee
}

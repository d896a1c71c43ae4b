//! # Item Types
//!
//! Sellable crop items and money types for agri-cart.
//! The seed catalog is loaded from `config/items.toml`.

use serde::{Deserialize, Serialize};

/// Settlement currency (ISO 4217). The marketplace is single-currency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    #[default]
    INR,
}

impl Currency {
    /// Returns the ISO 4217 currency code as the gateway expects it
    pub fn code(&self) -> &'static str {
        match self {
            Currency::INR => "INR",
        }
    }

    /// Number of minor-unit decimal places (paise)
    pub fn decimal_places(&self) -> u8 {
        match self {
            Currency::INR => 2,
        }
    }

    /// Convert a major-unit amount to the smallest currency unit
    pub fn to_smallest_unit(&self, amount: f64) -> i64 {
        let multiplier = 10_f64.powi(self.decimal_places() as i32);
        (amount * multiplier).round() as i64
    }

    /// Convert from smallest unit back to major units
    pub fn from_smallest_unit(&self, amount: i64) -> f64 {
        let divisor = 10_f64.powi(self.decimal_places() as i32);
        amount as f64 / divisor
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Money amount in the smallest currency unit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in paise
    pub amount: i64,
    #[serde(default)]
    pub currency: Currency,
}

impl Price {
    /// Create a price from a major-unit amount (rupees)
    pub fn new(amount: f64, currency: Currency) -> Self {
        Self {
            amount: currency.to_smallest_unit(amount),
            currency,
        }
    }

    /// Create a price from smallest units (paise)
    pub fn from_minor(amount: i64, currency: Currency) -> Self {
        Self { amount, currency }
    }

    pub fn zero(currency: Currency) -> Self {
        Self::from_minor(0, currency)
    }

    /// Multiply by a quantity
    pub fn times(&self, quantity: u32) -> Self {
        Self {
            amount: self.amount * i64::from(quantity),
            currency: self.currency,
        }
    }

    /// Major-unit value
    pub fn as_decimal(&self) -> f64 {
        self.currency.from_smallest_unit(self.amount)
    }

    /// Format for display (e.g., "₹130.00")
    pub fn display(&self) -> String {
        let symbol = match self.currency {
            Currency::INR => "₹",
        };
        format!("{}{:.2}", symbol, self.as_decimal())
    }
}

impl std::ops::Add for Price {
    type Output = Price;

    fn add(self, rhs: Price) -> Price {
        Price {
            amount: self.amount + rhs.amount,
            currency: self.currency,
        }
    }
}

/// A crop listed on the marketplace.
///
/// `available_quantity` is owned by the stock ledger; the admin publishing
/// flow sets the price and visibility before buyers ever see the item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Unique item identifier (e.g., "basmati-rice-25kg")
    pub id: String,

    /// Display name
    pub name: String,

    #[serde(default)]
    pub category: String,

    #[serde(default)]
    pub description: String,

    /// Admin-set selling price per unit
    pub price: Price,

    /// Units left to sell
    pub available_quantity: u32,

    /// Whether buyers can see and cart this item
    #[serde(default = "default_true")]
    pub visible: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Item {
    pub fn new(id: impl Into<String>, name: impl Into<String>, price: Price, available: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: String::new(),
            description: String::new(),
            price,
            available_quantity: available,
            visible: true,
            image_url: None,
        }
    }

    /// Builder: set category
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Builder: set image URL
    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    /// Builder: hide from buyers
    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }
}

/// Seed catalog (loaded from config)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemCatalog {
    #[serde(default)]
    pub items: Vec<Item>,
}

impl ItemCatalog {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn add(&mut self, item: Item) {
        self.items.push(item);
    }

    /// Builder: add an item
    pub fn with_item(mut self, item: Item) -> Self {
        self.add(item);
        self
    }

    /// Load catalog from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};

/// Sentinel for a brand, mold or plastic that could not be determined.
pub const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    InStock,
    OutOfStock,
    Limited,
    #[default]
    Unknown,
}

impl StockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockStatus::InStock => "in_stock",
            StockStatus::OutOfStock => "out_of_stock",
            StockStatus::Limited => "limited",
            StockStatus::Unknown => "unknown",
        }
    }

    /// Human-readable label for table output ("In Stock", "Out Of Stock", ...).
    pub fn label(&self) -> &'static str {
        match self {
            StockStatus::InStock => "In Stock",
            StockStatus::OutOfStock => "Out Of Stock",
            StockStatus::Limited => "Limited",
            StockStatus::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for StockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single disc listing: one variant row of a product page, or a search-result summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disc {
    pub brand: String,
    pub mold: String,
    pub plastic_type: String,

    pub color: Option<String>,
    pub rim_color: Option<String>,
    pub stamp_foil: Option<String>,
    /// Grams.
    pub weight: Option<f64>,
    pub scaled_weight: Option<f64>,
    pub flatness: Option<f64>,
    pub stiffness: Option<f64>,

    /// USD.
    pub price: Option<f64>,
    pub stock: StockStatus,

    pub product_url: Option<String>,
    pub image_url: Option<String>,
    /// Visible row text, kept for exact-text matching against the site.
    pub raw_row_text: Option<String>,
}

impl Disc {
    /// A record carrying only the resolved name triple.
    pub fn named(brand: &str, mold: &str, plastic_type: &str) -> Self {
        Disc {
            brand: brand.to_string(),
            mold: mold.to_string(),
            plastic_type: plastic_type.to_string(),
            color: None,
            rim_color: None,
            stamp_foil: None,
            weight: None,
            scaled_weight: None,
            flatness: None,
            stiffness: None,
            price: None,
            stock: StockStatus::Unknown,
            product_url: None,
            image_url: None,
            raw_row_text: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.brand != UNKNOWN || self.plastic_type != UNKNOWN
    }
}

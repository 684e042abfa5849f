use std::sync::LazyLock;

use regex::Regex;

use super::columns::{ColumnMap, Field};
use crate::models::{Disc, StockStatus};

static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)").unwrap());
static RATING_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\(\s*(\d+(?:\.\d+)?)\s*\)").unwrap());
static PRICE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$\s*(\d[\d,]*(?:\.\d+)?)").unwrap());

/// Rows with fewer cells than this carry no variant data (spacers, notices).
pub const MIN_ROW_CELLS: usize = 3;

/// Checked in order; negated phrases must precede the positive ones they
/// contain ("not in stock" before "in stock").
const STOCK_KEYWORDS: &[(&str, StockStatus)] = &[
    ("out of stock", StockStatus::OutOfStock),
    ("not in stock", StockStatus::OutOfStock),
    ("not available", StockStatus::OutOfStock),
    ("no longer available", StockStatus::OutOfStock),
    ("sold out", StockStatus::OutOfStock),
    ("unavailable", StockStatus::OutOfStock),
    ("limited", StockStatus::Limited),
    ("low stock", StockStatus::Limited),
    ("backorder", StockStatus::Limited),
    ("in stock", StockStatus::InStock),
    ("left", StockStatus::InStock),
    ("available", StockStatus::InStock),
];

const BOILERPLATE: &[&str] = &[
    "add to cart",
    "select options",
    "buy now",
    "view cart",
    "in stock",
    "out of stock",
    "left in stock",
];

/// Text and attributes of one table cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cell {
    pub text: String,
    pub image_src: Option<String>,
    /// Contains a form control or purchase button.
    pub interactive: bool,
}

impl Cell {
    pub fn text(text: &str) -> Self {
        Cell {
            text: text.to_string(),
            ..Default::default()
        }
    }
}

/// Page-level facts shared by every row of a table.
#[derive(Debug, Clone)]
pub struct PageContext {
    pub brand: String,
    pub mold: String,
    pub plastic_type: String,
    pub product_url: Option<String>,
}

/// Build a record from one data row. Each field is parsed on its own; a
/// miss leaves only that field empty. `None` only when the row has no cells.
pub fn extract(cells: &[Cell], map: &ColumnMap, ctx: &PageContext) -> Option<Disc> {
    if cells.is_empty() {
        return None;
    }
    let text = |field: Field| cell(cells, map, field).and_then(|c| clean(&c.text));

    let mut disc = Disc::named(&ctx.brand, &ctx.mold, &ctx.plastic_type);
    if let Some(plastic) = text(Field::PlasticGateway) {
        disc.plastic_type = plastic;
    }
    disc.color = text(Field::Color);
    disc.rim_color = text(Field::RimColor);
    disc.stamp_foil = text(Field::StampFoil);
    disc.weight = text(Field::Weight).and_then(|t| parse_number(&t));
    disc.scaled_weight = text(Field::ScaledWeight).and_then(|t| parse_number(&t));
    disc.flatness = text(Field::Flatness).and_then(|t| parse_rating(&t));
    disc.stiffness = text(Field::Stiffness).and_then(|t| parse_rating(&t));
    disc.price = text(Field::Price).and_then(|t| parse_price(&t));
    disc.stock = text(Field::Stock)
        .map(|t| classify_stock(&t))
        .unwrap_or_default();
    disc.product_url = ctx.product_url.clone();
    disc.image_url = image_url(cells, map);
    disc.raw_row_text = raw_row_text(cells, map);
    Some(disc)
}

fn cell<'a>(cells: &'a [Cell], map: &ColumnMap, field: Field) -> Option<&'a Cell> {
    map.get(field).and_then(|i| cells.get(i))
}

fn clean(s: &str) -> Option<String> {
    let s = s.split_whitespace().collect::<Vec<_>>().join(" ");
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// First decimal number in the text: "174g" → 174, "174.3 g" → 174.3.
pub fn parse_number(text: &str) -> Option<f64> {
    let caps = NUMBER_RE.captures(text)?;
    caps[1].parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parenthesized rating ("(3) - Somewhat Flat" → 3), else the first number.
pub fn parse_rating(text: &str) -> Option<f64> {
    match RATING_RE.captures(text) {
        Some(caps) => caps[1].parse::<f64>().ok(),
        None => parse_number(text),
    }
}

/// Current price in dollars. Sale cells list the old price first, so the
/// last dollar amount wins; a bare number is accepted too.
pub fn parse_price(text: &str) -> Option<f64> {
    let amount = match PRICE_RE.captures_iter(text).last() {
        Some(caps) => caps[1].replace(',', ""),
        None => NUMBER_RE.captures(text)?[1].to_string(),
    };
    amount.parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn classify_stock(text: &str) -> StockStatus {
    let t = text.to_lowercase();
    STOCK_KEYWORDS
        .iter()
        .find(|(kw, _)| t.contains(kw))
        .map(|(_, status)| *status)
        .unwrap_or(StockStatus::Unknown)
}

fn image_url(cells: &[Cell], map: &ColumnMap) -> Option<String> {
    match cell(cells, map, Field::Thumbnail) {
        Some(c) => c.image_src.clone(),
        None => cells.iter().find_map(|c| c.image_src.clone()),
    }
    .filter(|src| !src.trim().is_empty())
}

/// Visible row text in column order, minus purchase controls and stock notices.
fn raw_row_text(cells: &[Cell], map: &ColumnMap) -> Option<String> {
    let parts: Vec<String> = cells
        .iter()
        .enumerate()
        .filter(|(i, c)| {
            !c.interactive
                && !matches!(map.field_at(*i), Some(Field::Stock | Field::Quantity))
        })
        .filter_map(|(_, c)| clean(&c.text))
        .filter(|t| !is_boilerplate(t))
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" | "))
    }
}

fn is_boilerplate(text: &str) -> bool {
    let t = text.to_lowercase();
    BOILERPLATE.iter().any(|b| t.contains(b)) || (t.starts_with("just ") && t.contains(" left"))
}

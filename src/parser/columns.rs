use std::collections::BTreeMap;

use serde::Serialize;

/// Semantic column kinds found in product variant tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Thumbnail,
    Color,
    StampFoil,
    RimColor,
    PlasticGateway,
    Weight,
    ScaledWeight,
    Flatness,
    Stiffness,
    Price,
    Stock,
    Quantity,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Thumbnail => "thumbnail",
            Field::Color => "color",
            Field::StampFoil => "stamp_foil",
            Field::RimColor => "rim_color",
            Field::PlasticGateway => "plastic_gateway",
            Field::Weight => "weight",
            Field::ScaledWeight => "scaled_weight",
            Field::Flatness => "flatness",
            Field::Stiffness => "stiffness",
            Field::Price => "price",
            Field::Stock => "stock",
            Field::Quantity => "quantity",
        }
    }
}

/// A header matches when it contains every `all_of` keyword.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub field: Field,
    pub all_of: &'static [&'static str],
}

impl Rule {
    pub fn matches(&self, header: &str) -> bool {
        self.all_of.iter().all(|kw| header.contains(kw))
    }
}

const fn rule(field: Field, all_of: &'static [&'static str]) -> Rule {
    Rule { field, all_of }
}

/// Evaluated top to bottom; the first match wins. Compound keywords come
/// before the single keywords they contain.
pub const RULES: &[Rule] = &[
    rule(Field::ScaledWeight, &["scaled", "weight"]),
    rule(Field::Weight, &["weight"]),
    rule(Field::StampFoil, &["stamp", "foil"]),
    rule(Field::StampFoil, &["stamp"]),
    rule(Field::StampFoil, &["foil"]),
    rule(Field::RimColor, &["rim", "color"]),
    rule(Field::RimColor, &["rim", "colour"]),
    rule(Field::Color, &["plastic", "color"]),
    rule(Field::Color, &["color"]),
    rule(Field::Color, &["colour"]),
    rule(Field::PlasticGateway, &["plastic"]),
    rule(Field::Flatness, &["flat"]),
    rule(Field::Stiffness, &["stiff"]),
    rule(Field::Price, &["price"]),
    rule(Field::Stock, &["stock"]),
    rule(Field::Stock, &["availab"]),
    rule(Field::Quantity, &["quantity"]),
    rule(Field::Quantity, &["qty"]),
    rule(Field::Thumbnail, &["thumbnail"]),
    rule(Field::Thumbnail, &["image"]),
    rule(Field::Thumbnail, &["photo"]),
];

/// Field a single header cell denotes, if any.
pub fn classify_header(header: &str) -> Option<Field> {
    let h = header.trim().to_lowercase();
    if h.is_empty() {
        return None;
    }
    RULES.iter().find(|r| r.matches(&h)).map(|r| r.field)
}

/// Semantic field → zero-based column index for one table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMap {
    columns: BTreeMap<Field, usize>,
}

impl ColumnMap {
    pub fn get(&self, field: Field) -> Option<usize> {
        self.columns.get(&field).copied()
    }

    pub fn contains(&self, field: Field) -> bool {
        self.columns.contains_key(&field)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, usize)> + '_ {
        self.columns.iter().map(|(f, i)| (*f, *i))
    }

    /// Field carried by column `index`, if it was recognized.
    pub fn field_at(&self, index: usize) -> Option<Field> {
        self.iter().find(|(_, i)| *i == index).map(|(f, _)| f)
    }
}

/// Locate known columns by header text. Unrecognized headers are skipped;
/// when two headers denote the same field the leftmost is kept.
pub fn map_columns<S: AsRef<str>>(headers: &[S]) -> ColumnMap {
    let mut columns = BTreeMap::new();
    for (idx, header) in headers.iter().enumerate() {
        if let Some(field) = classify_header(header.as_ref()) {
            columns.entry(field).or_insert(idx);
        }
    }
    ColumnMap { columns }
}

/// Whether a header row looks like a disc variants table: a weight column
/// plus at least one of price, stock or color.
pub fn is_variants_header<S: AsRef<str>>(headers: &[S]) -> bool {
    let map = map_columns(headers);
    map.contains(Field::Weight)
        && [Field::Price, Field::Stock, Field::Color]
            .iter()
            .any(|f| map.contains(*f))
}

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::models::{Disc, StockStatus};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    Price,
    Weight,
    ScaledWeight,
    Flatness,
    Stiffness,
    Brand,
    Mold,
    PlasticType,
    Color,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Inclusive bounds; either side may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Range {
    pub fn is_active(&self) -> bool {
        self.min.is_some() || self.max.is_some()
    }

    /// An active range rejects records that lack the value.
    fn admits(&self, value: Option<f64>) -> bool {
        if !self.is_active() {
            return true;
        }
        let Some(v) = value else {
            return false;
        };
        self.min.map_or(true, |m| v >= m) && self.max.map_or(true, |m| v <= m)
    }
}

/// Criteria for narrowing search results. Empty lists and open ranges match
/// everything; a text list matches when any listed value occurs in the field,
/// case-insensitively ("blue" keeps "Light Blue").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscFilter {
    pub brand: Vec<String>,
    pub mold: Vec<String>,
    pub plastic_type: Vec<String>,
    pub color: Vec<String>,
    pub rim_color: Vec<String>,
    pub stamp_foil: Vec<String>,

    pub weight: Range,
    pub scaled_weight: Range,
    pub flatness: Range,
    pub stiffness: Range,
    pub price: Range,

    pub stock: Vec<StockStatus>,

    pub sort_by: Option<SortField>,
    pub sort_order: SortOrder,
}

impl Default for DiscFilter {
    /// No criteria; cheapest first.
    fn default() -> Self {
        DiscFilter {
            brand: Vec::new(),
            mold: Vec::new(),
            plastic_type: Vec::new(),
            color: Vec::new(),
            rim_color: Vec::new(),
            stamp_foil: Vec::new(),
            weight: Range::default(),
            scaled_weight: Range::default(),
            flatness: Range::default(),
            stiffness: Range::default(),
            price: Range::default(),
            stock: Vec::new(),
            sort_by: Some(SortField::Price),
            sort_order: SortOrder::Asc,
        }
    }
}

impl DiscFilter {
    pub fn matches(&self, d: &Disc) -> bool {
        text_match(Some(&d.brand), &self.brand)
            && text_match(Some(&d.mold), &self.mold)
            && text_match(Some(&d.plastic_type), &self.plastic_type)
            && text_match(d.color.as_ref(), &self.color)
            && text_match(d.rim_color.as_ref(), &self.rim_color)
            && text_match(d.stamp_foil.as_ref(), &self.stamp_foil)
            && self.weight.admits(d.weight)
            && self.scaled_weight.admits(d.scaled_weight)
            && self.flatness.admits(d.flatness)
            && self.stiffness.admits(d.stiffness)
            && self.price.admits(d.price)
            && (self.stock.is_empty() || self.stock.contains(&d.stock))
    }
}

fn text_match(value: Option<&String>, allowed: &[String]) -> bool {
    if allowed.is_empty() {
        return true;
    }
    let Some(value) = value.map(|v| v.to_lowercase()) else {
        return false;
    };
    allowed
        .iter()
        .map(|a| a.trim().to_lowercase())
        .any(|a| !a.is_empty() && value.contains(&a))
}

/// Keep matching discs, then sort if requested. Missing numbers sort as 0.
pub fn apply_filters(discs: Vec<Disc>, filter: &DiscFilter) -> Vec<Disc> {
    let mut out: Vec<Disc> = discs.into_iter().filter(|d| filter.matches(d)).collect();
    if let Some(field) = filter.sort_by {
        out.sort_by(|a, b| {
            let ord = compare(a, b, field);
            match filter.sort_order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });
    }
    out
}

fn compare(a: &Disc, b: &Disc, field: SortField) -> Ordering {
    let num = |x: Option<f64>, y: Option<f64>| x.unwrap_or(0.0).total_cmp(&y.unwrap_or(0.0));
    let text = |x: Option<&String>, y: Option<&String>| {
        x.map(|s| s.to_lowercase()).cmp(&y.map(|s| s.to_lowercase()))
    };
    match field {
        SortField::Price => num(a.price, b.price),
        SortField::Weight => num(a.weight, b.weight),
        SortField::ScaledWeight => num(a.scaled_weight, b.scaled_weight),
        SortField::Flatness => num(a.flatness, b.flatness),
        SortField::Stiffness => num(a.stiffness, b.stiffness),
        SortField::Brand => text(Some(&a.brand), Some(&b.brand)),
        SortField::Mold => text(Some(&a.mold), Some(&b.mold)),
        SortField::PlasticType => text(Some(&a.plastic_type), Some(&b.plastic_type)),
        SortField::Color => text(a.color.as_ref(), b.color.as_ref()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disc(plastic: &str, color: Option<&str>, weight: Option<f64>, price: Option<f64>, stock: StockStatus) -> Disc {
        let mut d = Disc::named("Innova", "Destroyer", plastic);
        d.color = color.map(String::from);
        d.weight = weight;
        d.price = price;
        d.stock = stock;
        d
    }

    fn sample() -> Vec<Disc> {
        vec![
            disc("Champion", Some("Blue"), Some(175.0), Some(18.99), StockStatus::InStock),
            disc("Star", Some("Red"), Some(168.0), Some(16.99), StockStatus::OutOfStock),
            disc("DX", None, None, Some(11.99), StockStatus::Unknown),
            disc("Champion", Some("blue"), Some(171.0), None, StockStatus::InStock),
        ]
    }

    #[test]
    fn empty_filter_keeps_everything_cheapest_first() {
        let prices: Vec<Option<f64>> = apply_filters(sample(), &DiscFilter::default())
            .iter()
            .map(|d| d.price)
            .collect();
        assert_eq!(prices, vec![None, Some(11.99), Some(16.99), Some(18.99)]);
    }

    #[test]
    fn text_filters_match_substrings() {
        let mut light = disc("Halo Star", Some("Light Blue"), Some(170.0), Some(19.99), StockStatus::InStock);
        light.stamp_foil = Some("Silver Holo".into());
        let f = DiscFilter {
            color: vec!["blue".into()],
            ..Default::default()
        };
        assert_eq!(apply_filters(vec![light.clone()], &f).len(), 1);

        let f = DiscFilter {
            plastic_type: vec!["star".into()],
            stamp_foil: vec!["HOLO".into()],
            ..Default::default()
        };
        assert_eq!(apply_filters(vec![light.clone()], &f).len(), 1);

        let f = DiscFilter {
            color: vec!["red".into()],
            ..Default::default()
        };
        assert!(apply_filters(vec![light], &f).is_empty());
    }

    #[test]
    fn text_filters_are_case_insensitive_lists() {
        let f = DiscFilter {
            color: vec!["BLUE".into()],
            ..Default::default()
        };
        assert_eq!(apply_filters(sample(), &f).len(), 2);

        let f = DiscFilter {
            plastic_type: vec!["star".into(), "dx".into()],
            ..Default::default()
        };
        assert_eq!(apply_filters(sample(), &f).len(), 2);

        // A disc without the field never passes an active text filter.
        let f = DiscFilter {
            color: vec!["".into(), "green".into()],
            ..Default::default()
        };
        assert!(apply_filters(sample(), &f).is_empty());
    }

    #[test]
    fn ranges_are_inclusive_and_exclude_missing() {
        let f = DiscFilter {
            weight: Range { min: Some(171.0), max: Some(175.0) },
            ..Default::default()
        };
        let out = apply_filters(sample(), &f);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|d| d.weight.is_some()));
    }

    #[test]
    fn stock_filter() {
        let f = DiscFilter {
            stock: vec![StockStatus::InStock],
            ..Default::default()
        };
        assert_eq!(apply_filters(sample(), &f).len(), 2);
    }

    #[test]
    fn sort_by_price_desc_with_missing_last() {
        let f = DiscFilter {
            sort_by: Some(SortField::Price),
            sort_order: SortOrder::Desc,
            ..Default::default()
        };
        let prices: Vec<Option<f64>> = apply_filters(sample(), &f).iter().map(|d| d.price).collect();
        assert_eq!(prices, vec![Some(18.99), Some(16.99), Some(11.99), None]);
    }

    #[test]
    fn sort_by_text_field() {
        let f = DiscFilter {
            sort_by: Some(SortField::PlasticType),
            ..Default::default()
        };
        let plastics: Vec<String> = apply_filters(sample(), &f).into_iter().map(|d| d.plastic_type).collect();
        assert_eq!(plastics, vec!["Champion", "Champion", "DX", "Star"]);
    }
}

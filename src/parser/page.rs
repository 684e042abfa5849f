//! DOM queries over product and search pages.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use super::columns::is_variants_header;
use super::row::Cell;

static H1: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1").unwrap());
static TABLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table").unwrap());
static TR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static HEADER_CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("th, td").unwrap());
static TD: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());
static IMG: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img").unwrap());
static CONTROL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("input, button, select, textarea, form, a.button, a.add_to_cart_button").unwrap()
});

/// Header texts plus the cells of every row below the header.
#[derive(Debug, Clone)]
pub struct VariantTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

/// Text of the first `<h1>`, whitespace-normalized.
pub fn page_title(doc: &Html) -> Option<String> {
    doc.select(&H1)
        .map(element_text)
        .find(|t| !t.is_empty())
}

/// First table whose first row reads as a variants header.
pub fn find_variants_table(doc: &Html) -> Option<VariantTable> {
    doc.select(&TABLE).find_map(|table| {
        let mut rows = table.select(&TR);
        let header_row = rows.next()?;
        let headers: Vec<String> = header_row.select(&HEADER_CELL).map(element_text).collect();
        if !is_variants_header(&headers) {
            return None;
        }
        let rows = rows
            .map(|tr| tr.select(&TD).map(element_cell).collect())
            .collect();
        Some(VariantTable { headers, rows })
    })
}

pub fn element_cell(el: ElementRef) -> Cell {
    let image_src = el.select(&IMG).find_map(|img| {
        let v = img.value();
        v.attr("data-src")
            .or_else(|| v.attr("src"))
            .map(str::to_string)
    });
    Cell {
        text: element_text(el),
        image_src,
        interactive: el.select(&CONTROL).next().is_some(),
    }
}

pub fn element_text(el: ElementRef) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

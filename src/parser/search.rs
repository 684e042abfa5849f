use std::sync::LazyLock;

use reqwest::Url;
use scraper::{Html, Selector};
use tracing::debug;

use super::page::element_text;
use super::row::parse_price;
use crate::models::Disc;
use crate::resolver::Resolver;

static PRODUCT: LazyLock<Selector> = LazyLock::new(|| Selector::parse("li.product").unwrap());
static PRODUCT_TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h2.woocommerce-loop-product__title").unwrap());
static PRODUCT_PRICE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".woocommerce-Price-amount").unwrap());
static LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

/// Summary records for the first `max_results` products of a search page.
pub fn parse_search_results(
    html: &str,
    base_url: &Url,
    max_results: usize,
    resolver: &Resolver,
) -> Vec<Disc> {
    let doc = Html::parse_document(html);
    doc.select(&PRODUCT)
        .take(max_results)
        .filter_map(|product| {
            let title = product.select(&PRODUCT_TITLE).map(element_text).next()?;
            let name = resolver.resolve(&title);

            let mut disc = Disc::named(&name.brand, &name.mold, &name.plastic);
            disc.price = product
                .select(&PRODUCT_PRICE)
                .next()
                .and_then(|p| parse_price(&element_text(p)));
            disc.product_url = product
                .select(&LINK)
                .next()
                .and_then(|a| a.value().attr("href"))
                .and_then(|href| base_url.join(href).ok())
                .map(String::from);
            debug!("Search hit '{}' -> {} / {} / {}", title, disc.brand, disc.mold, disc.plastic_type);
            Some(disc)
        })
        .collect()
}

/// Whether a resolved mold answers the user's search term.
///
/// One-word terms match a mold word equal to, starting with, or ending with
/// the term; longer terms need every word somewhere in the mold.
pub fn is_relevant_match(mold: &str, search_term: &str) -> bool {
    let mold = mold.trim().to_lowercase();
    let term = search_term.trim().to_lowercase();
    if mold.is_empty() || term.is_empty() {
        return false;
    }

    let term_words: Vec<&str> = term.split_whitespace().collect();
    match term_words.as_slice() {
        [word] => mold
            .split_whitespace()
            .any(|m| m == *word || m.starts_with(word) || m.ends_with(word)),
        words => {
            let mold_text = mold.split_whitespace().collect::<Vec<_>>().join(" ");
            words.iter().all(|w| mold_text.contains(w))
        }
    }
}

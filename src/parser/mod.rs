pub mod columns;
pub mod page;
pub mod row;
pub mod search;

use std::collections::BTreeSet;

use scraper::Html;
use tracing::{debug, info, warn};

use crate::models::{Disc, UNKNOWN};
use crate::resolver::{Resolver, INFERRED_BOOST};
use columns::map_columns;
use row::{PageContext, MIN_ROW_CELLS};

/// Three-stage pipeline: title → column map → one record per variant row.
///
/// A page without a title or variants table yields no records. Plastics read
/// from the table are reported back to the resolver once per page.
pub fn process_page(html: &str, url: &str, resolver: &Resolver) -> Vec<Disc> {
    let doc = Html::parse_document(html);

    let Some(title) = page::page_title(&doc) else {
        warn!("No product title on {}", url);
        return Vec::new();
    };
    let name = resolver.resolve(&title);

    let Some(table) = page::find_variants_table(&doc) else {
        warn!("No variants table on {}", url);
        return Vec::new();
    };
    let map = map_columns(&table.headers);
    debug!("Column map for {}: {:?}", url, map);

    let ctx = PageContext {
        brand: name.brand,
        mold: name.mold,
        plastic_type: name.plastic,
        product_url: Some(url.to_string()),
    };

    let mut discs = Vec::with_capacity(table.rows.len());
    for (i, cells) in table.rows.iter().enumerate() {
        if cells.len() < MIN_ROW_CELLS {
            debug!("Skipping row {} on {}: {} cells", i + 1, url, cells.len());
            continue;
        }
        if let Some(disc) = row::extract(cells, &map, &ctx) {
            discs.push(disc);
        }
    }

    let observed: BTreeSet<&str> = discs
        .iter()
        .map(|d| d.plastic_type.as_str())
        .filter(|p| *p != UNKNOWN && *p != ctx.plastic_type)
        .collect();
    for plastic in observed {
        resolver.reinforce(&ctx.brand, plastic, INFERRED_BOOST);
    }

    info!("{}: {} variants of {} {} {}", url, discs.len(), ctx.brand, ctx.plastic_type, ctx.mold);
    discs
}

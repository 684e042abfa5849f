use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use otb_helper::filters::{Range, SortField, SortOrder};
use otb_helper::resolver::MATCH_BOOST;
use otb_helper::{apply_filters, Config, Crawler, Disc, DiscFilter, HttpSource, KnowledgeStore, Resolver, StockStatus};

#[derive(Parser)]
#[command(name = "otb_helper", about = "OTB Discs product scraper with a self-learning name resolver")]
struct Cli {
    /// Knowledge store path (overrides OTB_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the knowledge store and seed the brand catalog
    Init,
    /// Resolve a product title into brand, mold and plastic
    Resolve {
        title: String,
    },
    /// List known brand/plastic associations
    Brands {
        /// Only show associations at or above this confidence
        #[arg(short = 'c', long)]
        min_confidence: Option<f64>,
        /// Show every pair with its score
        #[arg(short, long)]
        verbose: bool,
    },
    /// Reinforce a brand/plastic association by hand
    Learn {
        brand: String,
        plastic: String,
        #[arg(short, long, default_value_t = MATCH_BOOST)]
        boost: f64,
    },
    /// Scrape one product page
    Page {
        url: String,
        #[arg(long)]
        json: bool,
    },
    /// Search the shop and scrape every matching product page
    Search {
        name: String,
        /// Max search results to follow
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct FilterArgs {
    #[arg(long)]
    brand: Vec<String>,
    #[arg(long)]
    mold: Vec<String>,
    #[arg(long)]
    plastic: Vec<String>,
    #[arg(long)]
    color: Vec<String>,
    #[arg(long)]
    rim_color: Vec<String>,
    #[arg(long)]
    stamp_foil: Vec<String>,
    #[arg(long)]
    min_weight: Option<f64>,
    #[arg(long)]
    max_weight: Option<f64>,
    #[arg(long)]
    min_scaled_weight: Option<f64>,
    #[arg(long)]
    max_scaled_weight: Option<f64>,
    #[arg(long)]
    min_flatness: Option<f64>,
    #[arg(long)]
    max_flatness: Option<f64>,
    #[arg(long)]
    min_stiffness: Option<f64>,
    #[arg(long)]
    max_stiffness: Option<f64>,
    #[arg(long)]
    min_price: Option<f64>,
    #[arg(long)]
    max_price: Option<f64>,
    #[arg(long, value_enum)]
    stock: Vec<StockStatus>,
    #[arg(long, value_enum, default_value = "price")]
    sort_by: SortField,
    #[arg(long, value_enum, default_value = "asc")]
    order: SortOrder,
}

impl From<FilterArgs> for DiscFilter {
    fn from(a: FilterArgs) -> Self {
        let range = |min, max| Range { min, max };
        DiscFilter {
            brand: a.brand,
            mold: a.mold,
            plastic_type: a.plastic,
            color: a.color,
            rim_color: a.rim_color,
            stamp_foil: a.stamp_foil,
            weight: range(a.min_weight, a.max_weight),
            scaled_weight: range(a.min_scaled_weight, a.max_scaled_weight),
            flatness: range(a.min_flatness, a.max_flatness),
            stiffness: range(a.min_stiffness, a.max_stiffness),
            price: range(a.min_price, a.max_price),
            stock: a.stock,
            sort_by: Some(a.sort_by),
            sort_order: a.order,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }

    let store = Arc::new(
        KnowledgeStore::open(&config.db_path)
            .with_context(|| format!("opening {}", config.db_path.display()))?,
    );
    let resolver = Arc::new(Resolver::new(Arc::clone(&store)).with_min_confidence(config.min_confidence));

    let result = match cli.command {
        Commands::Init => {
            let brands = store.all_brands()?;
            let plastics = store.all_plastics()?;
            println!(
                "Knowledge store ready at {} ({} brands, {} plastics)",
                config.db_path.display(),
                brands.len(),
                plastics.len()
            );
            Ok(())
        }
        Commands::Resolve { title } => {
            let r = resolver.resolve(&title);
            println!("Brand:   {}", r.brand);
            println!("Mold:    {}", r.mold);
            println!("Plastic: {}", r.plastic);
            Ok(())
        }
        Commands::Brands { min_confidence, verbose } => {
            let min = min_confidence.unwrap_or(config.min_confidence);
            if verbose {
                let rows = store.associations(min)?;
                println!("{:<20} | {:<24} | {:>5} | {:<20}", "Brand", "Plastic", "Conf", "Last seen");
                println!("{}", "-".repeat(78));
                for a in &rows {
                    let seen = a
                        .last_seen
                        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_else(|| "-".into());
                    println!(
                        "{:<20} | {:<24} | {:>5.2} | {:<20}",
                        truncate(&a.brand, 20),
                        truncate(&a.plastic, 24),
                        a.confidence,
                        seen
                    );
                }
                println!("\n{} associations >= {:.2}", rows.len(), min);
            } else {
                let map = store.get_associations(min)?;
                for (brand, plastics) in &map {
                    println!("{}: {}", brand, plastics.join(", "));
                }
                println!("\n{} brands >= {:.2}", map.len(), min);
            }
            Ok(())
        }
        Commands::Learn { brand, plastic, boost } => {
            let c = store.reinforce(&brand, &plastic, boost)?;
            println!("{} / {} -> {:.2}", brand, plastic, c);
            Ok(())
        }
        Commands::Page { url, json } => {
            let crawler = Crawler::new(HttpSource::new(config.timeout)?, Arc::clone(&resolver), &config)?;
            let discs = crawler.fetch_product_page(&url).await;
            print_discs(&discs, json)
        }
        Commands::Search { name, limit, filter, json } => {
            let crawler = Crawler::new(HttpSource::new(config.timeout)?, Arc::clone(&resolver), &config)?;
            let found = crawler.search_discs(&name, limit).await;
            let total = found.len();
            let filter = DiscFilter::from(filter);
            let discs = apply_filters(found, &filter);
            if !json && discs.len() < total {
                println!("{} of {} discs match filters", discs.len(), total);
            }
            print_discs(&discs, json)
        }
    };

    // The crawler and resolver hold clones of the store; release them first.
    drop(resolver);
    match Arc::try_unwrap(store) {
        Ok(store) => store.close()?,
        Err(_) => tracing::warn!("Knowledge store still shared at exit"),
    }

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        eprintln!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn print_discs(discs: &[Disc], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(discs)?);
        return Ok(());
    }
    if discs.is_empty() {
        println!("No discs found.");
        return Ok(());
    }

    println!(
        "{:>3} | {:<12} | {:<14} | {:<16} | {:<12} | {:>5} | {:>4} | {:>4} | {:>7} | {:<12}",
        "#", "Brand", "Mold", "Plastic", "Color", "Wt", "Flat", "Stif", "Price", "Stock"
    );
    println!("{}", "-".repeat(112));

    for (i, d) in discs.iter().enumerate() {
        let num = |v: Option<f64>| v.map(|x| format!("{}", x)).unwrap_or_else(|| "-".into());
        let price = d.price.map(|p| format!("${:.2}", p)).unwrap_or_else(|| "-".into());
        println!(
            "{:>3} | {:<12} | {:<14} | {:<16} | {:<12} | {:>5} | {:>4} | {:>4} | {:>7} | {:<12}",
            i + 1,
            truncate(&d.brand, 12),
            truncate(&d.mold, 14),
            truncate(&d.plastic_type, 16),
            truncate(d.color.as_deref().unwrap_or("-"), 12),
            num(d.weight),
            num(d.flatness),
            num(d.stiffness),
            price,
            d.stock.label()
        );
    }

    println!("\n{} discs", discs.len());
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

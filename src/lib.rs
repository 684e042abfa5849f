pub mod config;
pub mod crawler;
pub mod db;
pub mod filters;
pub mod models;
pub mod parser;
pub mod resolver;

pub use config::Config;
pub use crawler::{Crawler, HttpSource, PageSource};
pub use db::{Association, KnowledgeStore};
pub use filters::{apply_filters, DiscFilter};
pub use models::{Disc, StockStatus};
pub use parser::columns::{map_columns, ColumnMap, Field};
pub use parser::process_page;
pub use parser::row::extract;
pub use resolver::{Resolution, Resolver};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Url;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::config::{Config, MAX_CONCURRENCY};
use crate::models::Disc;
use crate::parser::{self, search};
use crate::resolver::Resolver;

const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Where page HTML comes from.
pub trait PageSource: Send + Sync + 'static {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String>> + Send;
}

pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".parse()?,
        );
        headers.insert(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.5".parse()?);
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(HttpSource { client })
    }
}

impl PageSource for HttpSource {
    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }
}

/// Search and product-page scraping against one retail site.
pub struct Crawler<S: PageSource> {
    source: Arc<S>,
    resolver: Arc<Resolver>,
    base_url: Url,
    timeout: Duration,
    concurrency: usize,
}

impl<S: PageSource> Crawler<S> {
    pub fn new(source: S, resolver: Arc<Resolver>, config: &Config) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("Invalid base URL: {}", config.base_url))?;
        Ok(Crawler {
            source: Arc::new(source),
            resolver,
            base_url,
            timeout: config.timeout,
            concurrency: config.concurrency.clamp(1, MAX_CONCURRENCY),
        })
    }

    /// `{base}/?s=<name>&post_type=product`, keeping any path on the base.
    pub fn search_url(&self, product_name: &str) -> Url {
        let mut url = self.base_url.clone();
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        url.set_query(None);
        url.query_pairs_mut()
            .append_pair("s", product_name)
            .append_pair("post_type", "product");
        url
    }

    /// All variant records for products matching `product_name`. Never fails:
    /// a failed search yields nothing, a failed product page yields its
    /// search summary.
    pub async fn search_discs(&self, product_name: &str, max_results: usize) -> Vec<Disc> {
        let html = match self.search_page(product_name).await {
            Ok(html) => html,
            Err(e) => {
                warn!("Search for '{}' failed: {:#}", product_name, e);
                return Vec::new();
            }
        };

        let products = search::parse_search_results(&html, &self.base_url, max_results, &self.resolver);
        let total = products.len();
        let relevant: Vec<Disc> = products
            .into_iter()
            .filter(|d| search::is_relevant_match(&d.mold, product_name))
            .collect();
        info!("{} relevant product pages (of {} results)", relevant.len(), total);

        let (with_url, without_url): (Vec<Disc>, Vec<Disc>) =
            relevant.into_iter().partition(|d| d.product_url.is_some());

        let mut discs = self.fetch_variants(with_url).await;
        discs.extend(without_url);
        info!("Found {} discs for '{}'", discs.len(), product_name);
        discs
    }

    async fn search_page(&self, product_name: &str) -> Result<String> {
        let url = self.search_url(product_name);
        info!("Searching '{}' at {}", product_name, url);
        tokio::time::timeout(self.timeout, self.source.fetch(url.as_str()))
            .await
            .map_err(|_| anyhow!("timed out after {:?}", self.timeout))?
    }

    /// Records for a single product page; empty on any failure.
    pub async fn fetch_product_page(&self, url: &str) -> Vec<Disc> {
        match fetch_and_parse(&*self.source, &self.resolver, url, self.timeout).await {
            Ok(discs) => discs,
            Err(e) => {
                warn!("Failed to fetch {}: {:#}", url, e);
                Vec::new()
            }
        }
    }

    /// Fetch the product page behind each summary, at most `concurrency` at
    /// a time. Results keep the order of `summaries`; a page that fails or
    /// yields nothing is replaced by its summary.
    pub async fn fetch_variants(&self, summaries: Vec<Disc>) -> Vec<Disc> {
        if summaries.is_empty() {
            return Vec::new();
        }
        let total = summaries.len();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));

        let pb = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")
        {
            pb.set_style(style.progress_chars("=> "));
        }

        // Channel: workers send (index, result), this task collects
        let (tx, mut rx) = tokio::sync::mpsc::channel::<(usize, Result<Vec<Disc>>)>(total);

        for (idx, summary) in summaries.iter().enumerate() {
            let Some(url) = summary.product_url.clone() else {
                continue;
            };
            let source = Arc::clone(&self.source);
            let resolver = Arc::clone(&self.resolver);
            let sem = Arc::clone(&semaphore);
            let tx = tx.clone();
            let timeout = self.timeout;

            tokio::spawn(async move {
                let result = match sem.acquire_owned().await {
                    Ok(_permit) => fetch_and_parse(&*source, &resolver, &url, timeout).await,
                    Err(e) => Err(e.into()),
                };
                let _ = tx.send((idx, result)).await;
            });
        }

        // Drop our copy of tx so rx closes when all spawned tasks finish
        drop(tx);

        let mut slots: Vec<Option<Vec<Disc>>> = vec![None; total];
        let mut ok = 0usize;
        let mut errors = 0usize;
        while let Some((idx, result)) = rx.recv().await {
            let summary = &summaries[idx];
            match result {
                Ok(discs) if !discs.is_empty() => {
                    ok += 1;
                    slots[idx] = Some(discs);
                }
                Ok(_) => {
                    warn!("No variants for {}; keeping summary", summary.mold);
                }
                Err(e) => {
                    errors += 1;
                    warn!(
                        "Failed to fetch variants for {} ({}): {:#}",
                        summary.mold,
                        summary.product_url.as_deref().unwrap_or("-"),
                        e
                    );
                }
            }
            pb.inc(1);
        }
        pb.finish_and_clear();
        info!("Fetched {} product pages ({} ok, {} errors)", total, ok, errors);

        summaries
            .into_iter()
            .zip(slots)
            .flat_map(|(summary, discs)| discs.unwrap_or_else(|| vec![summary]))
            .collect()
    }
}

async fn fetch_and_parse<S: PageSource>(
    source: &S,
    resolver: &Resolver,
    url: &str,
    timeout: Duration,
) -> Result<Vec<Disc>> {
    let html = tokio::time::timeout(timeout, source.fetch(url))
        .await
        .map_err(|_| anyhow!("timed out after {:?}", timeout))??;
    Ok(parser::process_page(&html, url, resolver))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::db::KnowledgeStore;

    /// Serves fixture pages by URL; tracks peak concurrency.
    struct FixtureSource {
        pages: HashMap<String, String>,
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl FixtureSource {
        fn new(pages: &[(&str, &str)], delay: Duration) -> Self {
            FixtureSource {
                pages: pages
                    .iter()
                    .map(|(u, f)| {
                        let html = std::fs::read_to_string(format!("tests/fixtures/{}.html", f)).unwrap();
                        (u.to_string(), html)
                    })
                    .collect(),
                delay,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    impl PageSource for FixtureSource {
        async fn fetch(&self, url: &str) -> Result<String> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if url.contains("slow") {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            let key = url.split('?').next().unwrap_or(url);
            self.pages
                .get(url)
                .or_else(|| self.pages.get(key))
                .cloned()
                .ok_or_else(|| anyhow!("404 for {}", url))
        }
    }

    fn config() -> Config {
        Config {
            base_url: "https://otbdiscs.com".into(),
            timeout: Duration::from_millis(500),
            ..Config::default()
        }
    }

    fn resolver() -> Arc<Resolver> {
        Arc::new(Resolver::new(Arc::new(KnowledgeStore::open_in_memory().unwrap())))
    }

    #[test]
    fn search_url_encodes_query() {
        let c = Crawler::new(FixtureSource::new(&[], Duration::ZERO), resolver(), &config()).unwrap();
        let url = c.search_url("Star Destroyer");
        assert_eq!(url.as_str(), "https://otbdiscs.com/?s=Star+Destroyer&post_type=product");
    }

    #[test]
    fn search_url_keeps_base_path() {
        let config = Config {
            base_url: "http://localhost:8080/shop".into(),
            ..config()
        };
        let c = Crawler::new(FixtureSource::new(&[], Duration::ZERO), resolver(), &config).unwrap();
        assert_eq!(
            c.search_url("Buzzz").as_str(),
            "http://localhost:8080/shop/?s=Buzzz&post_type=product"
        );
    }

    #[tokio::test]
    async fn search_fetches_relevant_pages() {
        let source = FixtureSource::new(
            &[
                ("https://otbdiscs.com/", "search_destroyer"),
                ("https://otbdiscs.com/product/innova-champion-destroyer/", "destroyer"),
            ],
            Duration::from_millis(5),
        );
        let c = Crawler::new(source, resolver(), &config()).unwrap();
        let discs = c.search_discs("Destroyer", 50).await;

        // 3 variants from the champion page, the star page 404s and falls back
        // to its summary, the DX listing has no link, the Wraith is irrelevant.
        assert_eq!(discs.len(), 5);
        assert_eq!(discs.iter().filter(|d| d.plastic_type == "Champion").count(), 2);
        assert!(discs.iter().any(|d| d.plastic_type == "Halo Champion"));
        assert!(discs.iter().any(|d| d.plastic_type == "Star" && d.weight.is_none()));
        assert_eq!(discs.last().unwrap().plastic_type, "DX");
        assert!(discs.iter().all(|d| d.mold == "Destroyer"));
    }

    #[tokio::test]
    async fn failed_search_is_empty() {
        let c = Crawler::new(FixtureSource::new(&[], Duration::ZERO), resolver(), &config()).unwrap();
        assert!(c.search_discs("Destroyer", 50).await.is_empty());
    }

    #[tokio::test]
    async fn concurrency_is_capped_and_timeouts_fall_back() {
        let mut pages = Vec::new();
        let urls: Vec<String> = (0..12)
            .map(|i| format!("https://otbdiscs.com/product/d{}/", i))
            .collect();
        for u in &urls {
            pages.push((u.as_str(), "destroyer"));
        }
        let source = FixtureSource::new(&pages, Duration::from_millis(20));

        let mut summaries: Vec<Disc> = urls
            .iter()
            .map(|u| {
                let mut d = Disc::named("Innova", "Destroyer", "Champion");
                d.product_url = Some(u.clone());
                d
            })
            .collect();
        let mut slow = Disc::named("Innova", "Slow", "Star");
        slow.product_url = Some("https://otbdiscs.com/product/slow/".into());
        summaries.insert(3, slow.clone());

        let c = Crawler::new(source, resolver(), &config()).unwrap();
        let discs = c.fetch_variants(summaries).await;

        assert_eq!(discs.len(), 12 * 3 + 1);
        assert_eq!(discs[9], slow);
        assert!(c.source.peak.load(Ordering::SeqCst) <= MAX_CONCURRENCY);
    }

    #[tokio::test]
    async fn single_page_failure_is_empty() {
        let c = Crawler::new(FixtureSource::new(&[], Duration::ZERO), resolver(), &config()).unwrap();
        assert!(c.fetch_product_page("https://otbdiscs.com/product/missing/").await.is_empty());
    }
}

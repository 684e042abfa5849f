use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::db::{Association, KnowledgeStore};
use crate::models::UNKNOWN;

/// Boost applied when a known plastic is found in a title.
pub const MATCH_BOOST: f64 = 0.1;
/// Boost applied to pairs guessed from word positions.
pub const INFERRED_BOOST: f64 = 0.05;
/// Associations below this score are not trusted for direct matching.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.5;

const FILLER_WORDS: &[&str] = &["disc", "golf"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub brand: String,
    pub mold: String,
    pub plastic: String,
}

impl Resolution {
    fn new(brand: Option<String>, mold: Option<String>, plastic: Option<String>) -> Self {
        let or_unknown = |v: Option<String>| v.unwrap_or_else(|| UNKNOWN.to_string());
        Resolution {
            brand: or_unknown(brand),
            mold: or_unknown(mold),
            plastic: or_unknown(plastic),
        }
    }
}

/// Infers (brand, mold, plastic) from free-text product titles, learning
/// from every title it resolves.
pub struct Resolver {
    store: Arc<KnowledgeStore>,
    min_confidence: f64,
    patterns: WordPatterns,
}

impl Resolver {
    pub fn new(store: Arc<KnowledgeStore>) -> Self {
        Resolver {
            store,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            patterns: WordPatterns::default(),
        }
    }

    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = min_confidence.clamp(0.0, 1.0);
        self
    }

    pub fn store(&self) -> &KnowledgeStore {
        &self.store
    }

    /// Best-effort resolution; unresolved parts come back as "Unknown".
    pub fn resolve(&self, title: &str) -> Resolution {
        let title = title.trim();

        if let Some(hit) = self.match_known_plastic(title) {
            let without_brand = self.patterns.strip(title, &hit.brand);
            let remaining = self.patterns.strip(&without_brand, &hit.plastic);
            self.reinforce(&hit.brand, &hit.plastic, MATCH_BOOST);
            return Resolution::new(
                Some(hit.brand),
                non_empty(remaining),
                Some(hit.plastic),
            );
        }

        let mut brand = None;
        let mut plastic = None;
        let mut mold = None;
        let mut rest = title.to_string();

        if let Some((name, start, end)) = self.match_known_brand(title) {
            rest = format!("{} {}", &title[..start], &title[end..]);
            brand = Some(name);
        }

        let words: Vec<&str> = rest
            .split_whitespace()
            .filter(|w| !FILLER_WORDS.contains(&w.to_lowercase().as_str()))
            .collect();

        if brand.is_none() && words.len() >= 3 {
            // {brand} {plastic} {mold}
            brand = Some(words[0].to_string());
            plastic = Some(words[1].to_string());
            mold = Some(words[2..].join(" "));
            self.reinforce(words[0], words[1], INFERRED_BOOST);
        } else if words.len() >= 2 {
            // {plastic} {mold}
            plastic = Some(words[0].to_string());
            mold = Some(words[1..].join(" "));
            if brand.is_none() {
                brand = self.lookup_brand(words[0]);
            }
            if let Some(b) = brand.as_deref() {
                self.reinforce(b, words[0], INFERRED_BOOST);
            }
        } else if let Some(last) = words.last() {
            mold = Some(last.to_string());
        }

        Resolution::new(brand, mold, plastic)
    }

    /// Report an observed brand/plastic pairing. Failures are logged only.
    pub fn reinforce(&self, brand: &str, plastic: &str, boost: f64) {
        if is_sentinel(brand) || is_sentinel(plastic) {
            return;
        }
        if let Err(e) = self.store.reinforce(brand, plastic, boost) {
            warn!("Could not reinforce {} + {}: {}", brand, plastic, e);
        }
    }

    /// Longest plastic name first, so "Cosmic Neutron" beats "Neutron"; equal
    /// lengths go to the higher score, then to a brand named in the title.
    fn match_known_plastic(&self, title: &str) -> Option<Association> {
        let mut candidates = match self.store.associations(self.min_confidence) {
            Ok(c) => c,
            Err(e) => {
                warn!("Knowledge store unavailable: {}", e);
                return None;
            }
        };

        let mentioned: Vec<bool> = candidates
            .iter()
            .map(|c| self.patterns.find(title, &c.brand).is_some())
            .collect();
        let mut order: Vec<usize> = (0..candidates.len()).collect();
        order.sort_by(|&a, &b| {
            let (ca, cb) = (&candidates[a], &candidates[b]);
            name_len(&cb.plastic)
                .cmp(&name_len(&ca.plastic))
                .then(cb.confidence.partial_cmp(&ca.confidence).unwrap_or(Ordering::Equal))
                .then(mentioned[b].cmp(&mentioned[a]))
                .then_with(|| ca.brand.cmp(&cb.brand))
        });

        let idx = order
            .into_iter()
            .find(|&i| self.patterns.find(title, &candidates[i].plastic).is_some())?;
        let hit = candidates.swap_remove(idx);
        debug!("'{}' matched {} {} ({:.2})", title, hit.brand, hit.plastic, hit.confidence);
        Some(hit)
    }

    /// Known brand named in the title, with its byte span.
    fn match_known_brand(&self, title: &str) -> Option<(String, usize, usize)> {
        let mut brands: Vec<String> = match self.store.all_brands() {
            Ok(b) => b.into_iter().collect(),
            Err(e) => {
                warn!("Knowledge store unavailable: {}", e);
                return None;
            }
        };
        brands.sort_by(|a, b| name_len(b).cmp(&name_len(a)).then_with(|| a.cmp(b)));
        brands.into_iter().find_map(|b| {
            let (start, end) = self.patterns.find(title, &b)?;
            Some((b, start, end))
        })
    }

    fn lookup_brand(&self, plastic: &str) -> Option<String> {
        match self.store.brand_for_plastic(plastic) {
            Ok(b) => b,
            Err(e) => {
                warn!("Knowledge store unavailable: {}", e);
                None
            }
        }
    }
}

fn name_len(s: &str) -> usize {
    s.chars().count()
}

fn is_sentinel(s: &str) -> bool {
    s.trim().is_empty() || s.trim().eq_ignore_ascii_case(UNKNOWN)
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn word_regex(name: &str) -> Option<Regex> {
    Regex::new(&format!(r"(?i)(?:^|\W)({})(?:\W|$)", regex::escape(name))).ok()
}

/// Case-insensitive whole-word patterns, compiled once per name.
#[derive(Default)]
struct WordPatterns {
    cache: Mutex<HashMap<String, Regex>>,
}

impl WordPatterns {
    fn pattern(&self, name: &str) -> Option<Regex> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        match cache.entry(name.to_string()) {
            Entry::Occupied(e) => Some(e.get().clone()),
            Entry::Vacant(e) => Some(e.insert(word_regex(name)?).clone()),
        }
    }

    /// Byte span of `name` in `text` when it stands as a whole word.
    fn find(&self, text: &str, name: &str) -> Option<(usize, usize)> {
        if name.trim().is_empty() {
            return None;
        }
        let m = self.pattern(name)?.captures(text)?.get(1)?;
        Some((m.start(), m.end()))
    }

    /// Remove every whole-word occurrence of `name` as written in `text`,
    /// whatever its case; collapse spaces.
    fn strip(&self, text: &str, name: &str) -> String {
        let mut out = text.to_string();
        while let Some((start, end)) = self.find(&out, name) {
            out.replace_range(start..end, " ");
        }
        out.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn len(&self) -> usize {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

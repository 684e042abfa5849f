use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

/// Well-known brand → plastic lines, inserted at confidence 1.0 on open.
pub const SEED_CATALOG: &[(&str, &[&str])] = &[
    ("Innova", &["Champion", "Star", "DX", "Pro", "XT", "Metal Flake", "Glow", "Halo Star"]),
    ("Discraft", &["ESP", "Z", "Pro-D", "Big Z", "Titanium", "Glo Z", "Cryztal", "Swirl ESP"]),
    ("MVP", &["Neutron", "Proton", "Plasma", "Fission", "Eclipse"]),
    ("Axiom", &["Neutron", "Proton", "Plasma", "Fission", "Eclipse", "Cosmic Neutron"]),
    ("Streamline", &["Neutron", "Proton", "Plasma", "Cosmic Neutron"]),
    ("Dynamic Discs", &["Lucid", "Fuzion", "Prime", "Classic", "BioFuzion"]),
    ("Latitude 64", &["Opto", "Gold", "Retro", "Zero"]),
    ("Westside", &["VIP", "Tournament", "Elasto"]),
    ("Prodigy", &["400", "400G", "300", "500", "750"]),
    ("Kastaplast", &["K1", "K2", "K3", "Glow"]),
    ("Gateway", &["Diamond", "Platinum", "Sure Grip", "Evolution"]),
    ("DGA", &["SP Line", "Proline", "Signature"]),
    ("Millennium", &["Standard", "Quantum", "Sirius"]),
];

/// One brand/plastic pairing and how strongly it is believed.
#[derive(Debug, Clone, PartialEq)]
pub struct Association {
    pub brand: String,
    pub plastic: String,
    pub confidence: f64,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Persistent brand/plastic knowledge with confidence scores.
///
/// All access goes through a single connection behind a mutex, so every
/// reinforcement is one serialized read-modify-write.
pub struct KnowledgeStore {
    conn: Mutex<Connection>,
}

impl KnowledgeStore {
    /// Open (or create) the store at `path`, creating the schema and inserting
    /// any missing seed pairs.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open knowledge store {}", path.display()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        init_schema(&conn)?;
        let store = KnowledgeStore {
            conn: Mutex::new(conn),
        };
        let inserted = store.seed(SEED_CATALOG)?;
        info!("Knowledge store ready ({} seed pairs added)", inserted);
        Ok(store)
    }

    /// Flush and release the underlying connection.
    pub fn close(self) -> Result<()> {
        let conn = self
            .conn
            .into_inner()
            .map_err(|_| anyhow!("knowledge store lock poisoned"))?;
        conn.close().map_err(|(_, e)| e)?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("knowledge store lock poisoned"))
    }

    /// Insert catalog pairs that are not yet known, at confidence 1.0.
    /// Existing pairs, learned or seeded, are left untouched.
    pub fn seed(&self, catalog: &[(&str, &[&str])]) -> Result<usize> {
        let conn = self.lock()?;
        let now = timestamp();
        let tx = conn.unchecked_transaction()?;
        let mut count = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO brand_plastics (brand, plastic, confidence, last_seen)
                 VALUES (?1, ?2, 1.0, ?3)",
            )?;
            for (brand, plastics) in catalog {
                for plastic in plastics.iter() {
                    count += stmt.execute(rusqlite::params![brand, plastic, now])?;
                }
            }
        }
        tx.commit()?;
        Ok(count)
    }

    /// Strengthen (or create) a brand/plastic pair by `boost`, capped at 1.0.
    /// Returns the confidence after the update.
    pub fn reinforce(&self, brand: &str, plastic: &str, boost: f64) -> Result<f64> {
        let (brand, plastic) = (brand.trim(), plastic.trim());
        if brand.is_empty() || plastic.is_empty() {
            bail!("cannot reinforce an empty brand or plastic name");
        }
        // Negative or NaN boosts collapse to zero: scores never decrease.
        let boost = boost.max(0.0);

        let conn = self.lock()?;
        let confidence: f64 = conn.query_row(
            "INSERT INTO brand_plastics (brand, plastic, confidence, last_seen)
             VALUES (?1, ?2, MIN(?3, 1.0), ?4)
             ON CONFLICT(brand, plastic) DO UPDATE SET
                 confidence = MIN(confidence + ?3, 1.0),
                 last_seen = ?4
             RETURNING confidence",
            rusqlite::params![brand, plastic, boost, timestamp()],
            |r| r.get(0),
        )?;
        debug!("Reinforced {} + {} by {:.2} -> {:.2}", brand, plastic, boost, confidence);
        Ok(confidence)
    }

    /// Every pair at or above `min_confidence`, grouped by brand (name order),
    /// highest confidence first within a brand.
    pub fn associations(&self, min_confidence: f64) -> Result<Vec<Association>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT brand, plastic, confidence, last_seen
             FROM brand_plastics
             WHERE confidence >= ?1
             ORDER BY brand, confidence DESC, plastic",
        )?;
        let rows = stmt
            .query_map([min_confidence], |row| {
                let last_seen: Option<String> = row.get(3)?;
                Ok(Association {
                    brand: row.get(0)?,
                    plastic: row.get(1)?,
                    confidence: row.get(2)?,
                    last_seen: last_seen.as_deref().and_then(parse_timestamp),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// brand → plastic names, highest confidence first.
    pub fn get_associations(&self, min_confidence: f64) -> Result<BTreeMap<String, Vec<String>>> {
        let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for a in self.associations(min_confidence)? {
            map.entry(a.brand).or_default().push(a.plastic);
        }
        Ok(map)
    }

    /// Brand with the strongest association to `plastic` (case-insensitive).
    pub fn brand_for_plastic(&self, plastic: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        let brand = conn
            .query_row(
                "SELECT brand FROM brand_plastics
                 WHERE plastic = ?1 COLLATE NOCASE
                 ORDER BY confidence DESC, brand
                 LIMIT 1",
                [plastic.trim()],
                |r| r.get(0),
            )
            .optional()?;
        Ok(brand)
    }

    pub fn plastics_for_brand(&self, brand: &str) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT plastic FROM brand_plastics
             WHERE brand = ?1
             ORDER BY confidence DESC, plastic",
        )?;
        let rows = stmt
            .query_map([brand], |r| r.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(rows)
    }

    pub fn all_brands(&self) -> Result<BTreeSet<String>> {
        self.distinct("SELECT DISTINCT brand FROM brand_plastics")
    }

    pub fn all_plastics(&self) -> Result<BTreeSet<String>> {
        self.distinct("SELECT DISTINCT plastic FROM brand_plastics")
    }

    pub fn confidence(&self, brand: &str, plastic: &str) -> Result<Option<f64>> {
        let conn = self.lock()?;
        let score = conn
            .query_row(
                "SELECT confidence FROM brand_plastics WHERE brand = ?1 AND plastic = ?2",
                [brand, plastic],
                |r| r.get(0),
            )
            .optional()?;
        Ok(score)
    }

    fn distinct(&self, sql: &str) -> Result<BTreeSet<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map([], |r| r.get(0))?
            .collect::<Result<BTreeSet<String>, _>>()?;
        Ok(rows)
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS brand_plastics (
            brand       TEXT NOT NULL,
            plastic     TEXT NOT NULL,
            confidence  REAL NOT NULL DEFAULT 1.0
                        CHECK(confidence >= 0.0 AND confidence <= 1.0),
            last_seen   TEXT,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (brand, plastic)
        );
        CREATE INDEX IF NOT EXISTS idx_bp_confidence ON brand_plastics(confidence DESC);
        CREATE INDEX IF NOT EXISTS idx_bp_plastic ON brand_plastics(plastic COLLATE NOCASE);
        ",
    )?;
    Ok(())
}

fn timestamp() -> String {
    Utc::now().to_rfc3339()
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn seeds_catalog_at_full_confidence() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        assert_eq!(store.confidence("Innova", "Champion").unwrap(), Some(1.0));
        assert!(store.all_brands().unwrap().contains("Dynamic Discs"));
        let total: usize = SEED_CATALOG.iter().map(|(_, p)| p.len()).sum();
        assert_eq!(store.associations(0.0).unwrap().len(), total);
    }

    #[test]
    fn seeding_twice_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.sqlite");

        let first = KnowledgeStore::open(&path).unwrap();
        first.reinforce("Thought Space", "Aura", 0.3).unwrap();
        let before = first.associations(0.0).unwrap();
        first.close().unwrap();

        let second = KnowledgeStore::open(&path).unwrap();
        assert_eq!(second.seed(SEED_CATALOG).unwrap(), 0);
        let after = second.associations(0.0).unwrap();
        assert_eq!(before.len(), after.len());
        for (a, b) in before.iter().zip(&after) {
            assert_eq!((&a.brand, &a.plastic), (&b.brand, &b.plastic));
            assert!(approx(a.confidence, b.confidence));
        }
        assert!(approx(second.confidence("Thought Space", "Aura").unwrap().unwrap(), 0.3));
    }

    #[test]
    fn reinforce_creates_then_accumulates() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        assert!(approx(store.reinforce("Clash", "Steady", 0.1).unwrap(), 0.1));
        assert!(approx(store.reinforce("Clash", "Steady", 0.25).unwrap(), 0.35));
        let a = store
            .associations(0.0)
            .unwrap()
            .into_iter()
            .find(|a| a.brand == "Clash")
            .unwrap();
        assert!(a.last_seen.is_some());
    }

    #[test]
    fn reinforce_is_bounded_and_monotonic() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        let mut last = 0.0;
        for _ in 0..15 {
            let c = store.reinforce("Clash", "Rubber", 0.3).unwrap();
            assert!(c >= last);
            assert!(c <= 1.0);
            last = c;
        }
        assert_eq!(last, 1.0);
        assert_eq!(store.reinforce("Innova", "Champion", 0.5).unwrap(), 1.0);
        // A negative boost never lowers a score.
        assert!(approx(store.reinforce("Clash", "Rubber", -0.5).unwrap(), 1.0));
    }

    #[test]
    fn reinforce_rejects_empty_names() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        assert!(store.reinforce("", "Star", 0.1).is_err());
        assert!(store.reinforce("Innova", "  ", 0.1).is_err());
    }

    #[test]
    fn concurrent_reinforcement_loses_nothing() {
        let store = Arc::new(KnowledgeStore::open_in_memory().unwrap());
        store.reinforce("Lone Star", "Bravo", 0.2).unwrap();

        let handles: Vec<_> = (0..12)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.reinforce("Lone Star", "Bravo", 0.05).unwrap())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let c = store.confidence("Lone Star", "Bravo").unwrap().unwrap();
        assert!(approx(c, 0.2 + 12.0 * 0.05), "got {}", c);
    }

    #[test]
    fn associations_respect_threshold_and_order() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        store.reinforce("Innova", "Blizzard", 0.3).unwrap();

        let strict = store.get_associations(0.5).unwrap();
        assert!(!strict["Innova"].contains(&"Blizzard".to_string()));

        let loose = store.get_associations(0.0).unwrap();
        assert_eq!(loose["Innova"].last().map(String::as_str), Some("Blizzard"));
        assert_eq!(store.plastics_for_brand("Innova").unwrap().last().unwrap(), "Blizzard");
    }

    #[test]
    fn brand_for_plastic_prefers_confidence() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        assert_eq!(store.brand_for_plastic("Lucid").unwrap().as_deref(), Some("Dynamic Discs"));
        assert_eq!(store.brand_for_plastic("lucid").unwrap().as_deref(), Some("Dynamic Discs"));
        assert_eq!(store.brand_for_plastic("Nonexistent").unwrap(), None);

        store.reinforce("Clash", "Hyper", 0.2).unwrap();
        store.reinforce("Mint", "Hyper", 0.6).unwrap();
        assert_eq!(store.brand_for_plastic("Hyper").unwrap().as_deref(), Some("Mint"));
    }

    #[test]
    fn plastics_are_deduplicated_across_brands() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        let plastics = store.all_plastics().unwrap();
        assert!(plastics.contains("Neutron"));
        assert_eq!(plastics.iter().filter(|p| p.as_str() == "Neutron").count(), 1);
        assert!(plastics.contains("Glow"));
    }
}

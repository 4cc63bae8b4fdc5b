//! Hash-keyed cache for task decomposition plans.
//!
//! Avoids recomputing an expensive decomposition for a previously seen task
//! description. Matching is exact (normalized-description hash) plus a
//! keyword-overlap similarity search for near misses. No stemming and no
//! embeddings -- a deliberate limitation at the volumes this system targets.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::CoreError;
use crate::storage::Database;

/// Hex characters kept from the content hash. Collisions at this length are
/// a tolerated risk, not an impossibility -- the key is a cache key, never a
/// unique identifier.
const HASH_LEN: usize = 12;

/// Result of a cache lookup.
///
/// A hash hit always returns the plan. The energy level recorded at creation
/// time is surfaced but deliberately not used to invalidate: whether a plan
/// cached at high energy still suits a low-energy moment is the caller's
/// decision.
#[derive(Debug, Clone, Serialize)]
pub enum CacheLookup {
    Hit {
        plan: serde_json::Value,
        energy_level_at_creation: u8,
        cached_at: DateTime<Utc>,
    },
    Miss {
        similar: Vec<String>,
    },
}

/// Plan cache layered on the store.
pub struct PlanCache {
    db: Arc<Database>,
}

impl PlanCache {
    /// How many similar descriptions a miss reports.
    const SIMILAR_LIMIT: usize = 3;

    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Normalize a task description for matching: lowercase, trimmed.
    pub fn normalize(description: &str) -> String {
        description.trim().to_lowercase()
    }

    /// Content hash of the normalized description, truncated to a short
    /// fixed-length hex key.
    pub fn plan_hash(description: &str) -> String {
        let digest = Sha256::digest(Self::normalize(description).as_bytes());
        hex::encode(digest)[..HASH_LEN].to_string()
    }

    /// Look up a cached decomposition for `description`.
    ///
    /// A stored plan that fails to decode is treated as a miss and logged;
    /// the plan is recomputable, so corruption must not become fatal.
    ///
    /// # Errors
    /// Returns an error only if the storage medium is unavailable.
    pub fn check(&self, description: &str) -> Result<CacheLookup, CoreError> {
        let hash = Self::plan_hash(description);
        if let Some(row) = self.db.cached_plan(&hash)? {
            match serde_json::from_str(&row.plan_json) {
                Ok(plan) => {
                    return Ok(CacheLookup::Hit {
                        plan,
                        energy_level_at_creation: row.energy_level,
                        cached_at: row.created_at,
                    })
                }
                Err(e) => {
                    tracing::warn!(%hash, error = %e, "cached plan failed to decode, treating as miss");
                }
            }
        }
        Ok(CacheLookup::Miss {
            similar: self.similar(description, Self::SIMILAR_LIMIT)?,
        })
    }

    /// Store a decomposition plan, overwriting any previous plan for the
    /// same normalized description.
    ///
    /// Returns the cache key.
    ///
    /// # Errors
    /// Returns an error only if the storage medium is unavailable.
    pub fn store(
        &self,
        description: &str,
        plan: &serde_json::Value,
        energy_level: u8,
    ) -> Result<String, CoreError> {
        let hash = Self::plan_hash(description);
        self.db
            .cache_plan(&hash, description, &plan.to_string(), energy_level)?;
        Ok(hash)
    }

    /// Cached descriptions ranked by word overlap with `description`.
    ///
    /// Intersection size descending, ties broken by insertion order;
    /// zero-overlap entries are excluded.
    ///
    /// # Errors
    /// Returns an error only if the storage medium is unavailable.
    pub fn similar(&self, description: &str, limit: usize) -> Result<Vec<String>, CoreError> {
        let normalized = Self::normalize(description);
        let keywords: HashSet<&str> = normalized.split_whitespace().collect();

        let mut matches: Vec<(String, usize)> = Vec::new();
        for cached in self.db.all_cached_descriptions()? {
            let cached_normalized = Self::normalize(&cached);
            let overlap = cached_normalized
                .split_whitespace()
                .collect::<HashSet<&str>>()
                .intersection(&keywords)
                .count();
            if overlap > 0 {
                matches.push((cached, overlap));
            }
        }

        // Stable sort keeps insertion order within equal overlap counts.
        matches.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(matches
            .into_iter()
            .take(limit)
            .map(|(description, _)| description)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_cache() -> (tempfile::TempDir, PlanCache) {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open_at(&dir.path().join("test.db")).unwrap());
        (dir, PlanCache::new(db))
    }

    #[test]
    fn hash_is_deterministic_and_normalized() {
        assert_eq!(
            PlanCache::plan_hash("  Write Tests  "),
            PlanCache::plan_hash("write tests")
        );
        assert_ne!(
            PlanCache::plan_hash("write tests"),
            PlanCache::plan_hash("write docs")
        );
        assert_eq!(PlanCache::plan_hash("write tests").len(), 12);
    }

    #[test]
    fn normalization_equivalent_descriptions_share_an_entry() {
        let (_dir, cache) = temp_cache();
        let plan = json!({"task_name": "write tests", "steps": ["a", "b"]});
        cache.store("  Write Tests  ", &plan, 7).unwrap();

        match cache.check("write tests").unwrap() {
            CacheLookup::Hit {
                plan: found,
                energy_level_at_creation,
                ..
            } => {
                assert_eq!(found, plan);
                assert_eq!(energy_level_at_creation, 7);
            }
            CacheLookup::Miss { .. } => panic!("expected a hit"),
        }
    }

    #[test]
    fn restore_overwrites_existing_plan() {
        let (_dir, cache) = temp_cache();
        cache.store("write tests", &json!({"v": 1}), 5).unwrap();
        cache.store("Write tests", &json!({"v": 2}), 3).unwrap();

        match cache.check("write tests").unwrap() {
            CacheLookup::Hit { plan, .. } => assert_eq!(plan["v"], 2),
            CacheLookup::Miss { .. } => panic!("expected a hit"),
        }
    }

    #[test]
    fn miss_reports_similar_tasks() {
        let (_dir, cache) = temp_cache();
        cache.store("write unit tests", &json!({}), 5).unwrap();
        cache.store("fix database bug", &json!({}), 5).unwrap();

        match cache.check("write integration tests").unwrap() {
            CacheLookup::Miss { similar } => {
                assert_eq!(similar, vec!["write unit tests"]);
            }
            CacheLookup::Hit { .. } => panic!("expected a miss"),
        }
    }

    #[test]
    fn similar_ranks_by_overlap_and_respects_limit() {
        let (_dir, cache) = temp_cache();
        cache.store("write tests for parser", &json!({}), 5).unwrap();
        cache.store("write parser docs", &json!({}), 5).unwrap();
        cache.store("refactor parser module", &json!({}), 5).unwrap();
        cache.store("plan vacation", &json!({}), 5).unwrap();

        let similar = cache.similar("write tests for the parser", 10).unwrap();
        // Three overlapping entries, zero-overlap one excluded.
        assert_eq!(similar.len(), 3);
        assert_eq!(similar[0], "write tests for parser");

        let limited = cache.similar("write tests for the parser", 1).unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn similar_ties_keep_insertion_order() {
        let (_dir, cache) = temp_cache();
        cache.store("review notes", &json!({}), 5).unwrap();
        cache.store("review slides", &json!({}), 5).unwrap();

        let similar = cache.similar("review everything", 10).unwrap();
        assert_eq!(similar, vec!["review notes", "review slides"]);
    }

    #[test]
    fn zero_overlap_returns_empty() {
        let (_dir, cache) = temp_cache();
        cache.store("write tests", &json!({}), 5).unwrap();
        let similar = cache.similar("plan vacation", 10).unwrap();
        assert!(similar.is_empty());
    }
}

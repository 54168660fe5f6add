use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::Deserialize;

use crate::types::Prescription;

/// Catalog entry used when an unknown scan type reaches the engine.
pub const DEFAULT_SCAN_TYPE: &str = "chest-xray";

/// One canned analysis result with everything the record view renders.
#[derive(Debug, Clone, Deserialize)]
pub struct OutcomeBundle {
    pub diagnosis: String,
    pub confidence: f64,
    pub severity: String,
    pub findings: Vec<String>,
    pub recommendations: Vec<String>,
    pub prescription: Prescription,
}

/// A severity tier. `weight` is relative to the other tiers of the same type.
#[derive(Debug, Clone, Deserialize)]
pub struct OutcomeTier {
    pub weight: u32,
    pub bundles: Vec<OutcomeBundle>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScanTypeOutcomes {
    pub slug: String,
    pub label: String,
    pub tiers: Vec<OutcomeTier>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutcomeCatalog {
    pub scan_types: Vec<ScanTypeOutcomes>,
}

impl ScanTypeOutcomes {
    /// Draws a severity tier by weight, then one bundle uniformly within it.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> anyhow::Result<&OutcomeBundle> {
        let dist = WeightedIndex::new(self.tiers.iter().map(|t| t.weight))
            .map_err(|e| anyhow::anyhow!("invalid tier weights for '{}': {}", self.slug, e))?;
        let tier = &self.tiers[dist.sample(rng)];
        if tier.bundles.is_empty() {
            return Err(anyhow::anyhow!("empty tier for scan type '{}'", self.slug));
        }
        Ok(&tier.bundles[rng.gen_range(0..tier.bundles.len())])
    }
}

impl OutcomeCatalog {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.scan_types.is_empty() {
            return Err(anyhow::anyhow!("catalog has no scan types"));
        }
        if !self.scan_types.iter().any(|t| t.slug == DEFAULT_SCAN_TYPE) {
            return Err(anyhow::anyhow!("catalog is missing the '{}' entry", DEFAULT_SCAN_TYPE));
        }
        for entry in &self.scan_types {
            if entry.tiers.is_empty() {
                return Err(anyhow::anyhow!("scan type '{}' has no tiers", entry.slug));
            }
            if entry.tiers.iter().all(|t| t.weight == 0) {
                return Err(anyhow::anyhow!("scan type '{}' has only zero weights", entry.slug));
            }
            for tier in &entry.tiers {
                if tier.bundles.is_empty() {
                    return Err(anyhow::anyhow!("scan type '{}' has an empty tier", entry.slug));
                }
                for bundle in &tier.bundles {
                    if bundle.diagnosis.trim().is_empty() {
                        return Err(anyhow::anyhow!(
                            "scan type '{}' has a bundle without diagnosis",
                            entry.slug
                        ));
                    }
                    if !(0.0..=100.0).contains(&bundle.confidence) {
                        return Err(anyhow::anyhow!(
                            "scan type '{}': confidence {} out of range",
                            entry.slug,
                            bundle.confidence
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

lazy_static::lazy_static! {
    static ref CATALOG: OutcomeCatalog = {
        let raw = include_str!("../../config/catalog.json");
        let catalog: OutcomeCatalog = match serde_json::from_str(raw) {
            Ok(c) => c,
            Err(e) => panic!("Failed to parse embedded outcome catalog: {}", e),
        };
        if let Err(e) = catalog.validate() {
            panic!("Embedded outcome catalog is invalid: {}", e);
        }
        catalog
    };
}

/// The embedded outcome catalog, parsed and checked on first use.
pub fn catalog() -> &'static OutcomeCatalog {
    &CATALOG
}

/// Looks up the outcome table for a scan type, accepting slug or display
/// label. Unknown types resolve to the chest X-ray table.
pub fn resolve(scan_type: &str) -> &'static ScanTypeOutcomes {
    let cat = catalog();
    let wanted = scan_type.trim();
    cat.scan_types
        .iter()
        .find(|t| t.slug.eq_ignore_ascii_case(wanted) || t.label.eq_ignore_ascii_case(wanted))
        .or_else(|| cat.scan_types.iter().find(|t| t.slug == DEFAULT_SCAN_TYPE))
        .expect("embedded catalog lost its default entry")
}

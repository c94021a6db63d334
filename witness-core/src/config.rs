use serde::{Serialize, Deserialize};
use std::time::Duration;
use crate::error::{WitnessResult, WitnessError};

/// Default number of results returned by an ANN query.
pub const DEFAULT_NUM_RESULTS: usize = 1;
/// Default search breadth (candidate list size) of an ANN query.
pub const DEFAULT_NUM_CANDIDATES: usize = 100;
/// Default minimum similarity for `find_similar`.
pub const DEFAULT_THRESHOLD: f32 = 0.7;

/// Build parameters of the store's HNSW index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnnConfig {
    /// The maximum number of connections per node per layer.
    pub m: usize,
    /// The maximum number of connections for layer 0. Typically 2 * m.
    pub m_max0: usize,
    /// The size of the dynamic candidate list during index construction.
    pub ef_construction: usize,
    /// Normalization factor for level generation.
    pub ml: f64,
    /// Seed for level assignment. If None, uses random seed.
    pub seed: Option<u64>,
}

impl AnnConfig {
    pub fn new(m: usize, ef_construction: usize) -> Self {
        AnnConfig {
            m,
            m_max0: m * 2,
            ef_construction,
            ml: 1.0 / (m.max(2) as f64).ln(),
            seed: None,
        }
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> WitnessResult<()> {
        if self.m == 0 {
            return Err(WitnessError::Configuration("M must be greater than 0".to_string()));
        }
        if self.m_max0 == 0 {
            return Err(WitnessError::Configuration("M_max0 must be greater than 0".to_string()));
        }
        if self.ef_construction == 0 {
            return Err(WitnessError::Configuration("ef_construction must be greater than 0".to_string()));
        }
        if self.ml <= 0.0 {
            return Err(WitnessError::Configuration("ml must be greater than 0".to_string()));
        }
        Ok(())
    }
}

impl Default for AnnConfig {
    fn default() -> Self {
        AnnConfig {
            m: 16,
            m_max0: 32,
            ef_construction: 200,
            ml: 1.0 / (16.0f64.ln()),
            seed: None,
        }
    }
}

/// How the matcher obtains candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RetrievalStrategy {
    /// Exhaustive comparison against every embedded document.
    FullScan,
    /// Store-native approximate search.
    Ann { num_results: usize, num_candidates: usize },
    /// ANN with default parameters when the store supports it, full scan otherwise.
    #[default]
    Auto,
}

impl std::str::FromStr for RetrievalStrategy {
    type Err = WitnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "scan" | "full_scan" => Ok(RetrievalStrategy::FullScan),
            "ann" => Ok(RetrievalStrategy::Ann {
                num_results: DEFAULT_NUM_RESULTS,
                num_candidates: DEFAULT_NUM_CANDIDATES,
            }),
            "auto" => Ok(RetrievalStrategy::Auto),
            other => Err(WitnessError::Configuration(format!("Unknown retrieval strategy '{}'", other))),
        }
    }
}

/// Matcher settings.
#[derive(Debug, Clone, PartialEq)]
pub struct MatcherConfig {
    pub strategy: RetrievalStrategy,
    /// Optional cap on full-scan results.
    pub scan_limit: Option<usize>,
    /// Upper bound on a single embedding call.
    pub embed_timeout: Duration,
    /// Upper bound on a single store query.
    pub store_timeout: Duration,
    /// Keep documents whose embedding failed (invisible to search) instead
    /// of rejecting the insert.
    pub store_unembedded: bool,
    /// Maximum embedding calls in flight during batch ingestion.
    pub ingest_concurrency: usize,
}

impl MatcherConfig {
    pub fn validate(&self) -> WitnessResult<()> {
        if let RetrievalStrategy::Ann { num_results, num_candidates } = self.strategy {
            validate_ann_params(num_results, num_candidates)
                .map_err(|e| WitnessError::Configuration(e.to_string()))?;
        }
        if self.scan_limit == Some(0) {
            return Err(WitnessError::Configuration("scan_limit must be greater than 0".to_string()));
        }
        if self.embed_timeout.is_zero() || self.store_timeout.is_zero() {
            return Err(WitnessError::Configuration("timeouts must be greater than 0".to_string()));
        }
        if self.ingest_concurrency == 0 {
            return Err(WitnessError::Configuration("ingest_concurrency must be greater than 0".to_string()));
        }
        Ok(())
    }
}

impl Default for MatcherConfig {
    fn default() -> Self {
        MatcherConfig {
            strategy: RetrievalStrategy::Auto,
            scan_limit: None,
            embed_timeout: Duration::from_secs(10),
            store_timeout: Duration::from_secs(5),
            store_unembedded: false,
            ingest_concurrency: 4,
        }
    }
}

/// `num_results` must be positive and not exceed `num_candidates`.
pub fn validate_ann_params(num_results: usize, num_candidates: usize) -> WitnessResult<()> {
    if num_results == 0 {
        return Err(WitnessError::InvalidArgument("num_results must be greater than 0".to_string()));
    }
    if num_candidates < num_results {
        return Err(WitnessError::InvalidArgument(format!(
            "num_candidates ({}) must be at least num_results ({})",
            num_candidates, num_results
        )));
    }
    Ok(())
}

/// Thresholds live on the raw score scale and must be in `[0, 1]`.
pub fn validate_threshold(threshold: f32) -> WitnessResult<()> {
    if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
        return Err(WitnessError::InvalidArgument(format!(
            "threshold must be within [0, 1], got {}",
            threshold
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ann_config_defaults_validate() {
        assert!(AnnConfig::default().validate().is_ok());
        let cfg = AnnConfig::new(8, 64);
        assert_eq!(cfg.m_max0, 16);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_ann_config_rejects_zero_m() {
        let cfg = AnnConfig { m: 0, ..AnnConfig::default() };
        assert!(matches!(cfg.validate(), Err(WitnessError::Configuration(_))));
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("scan".parse::<RetrievalStrategy>().unwrap(), RetrievalStrategy::FullScan);
        assert_eq!(
            "ann".parse::<RetrievalStrategy>().unwrap(),
            RetrievalStrategy::Ann { num_results: 1, num_candidates: 100 }
        );
        assert_eq!("AUTO".parse::<RetrievalStrategy>().unwrap(), RetrievalStrategy::Auto);
        assert!("fast".parse::<RetrievalStrategy>().is_err());
    }

    #[test]
    fn test_matcher_config_validation() {
        assert!(MatcherConfig::default().validate().is_ok());

        let bad_ann = MatcherConfig {
            strategy: RetrievalStrategy::Ann { num_results: 10, num_candidates: 5 },
            ..MatcherConfig::default()
        };
        assert!(matches!(bad_ann.validate(), Err(WitnessError::Configuration(_))));

        let zero_timeout = MatcherConfig { embed_timeout: Duration::ZERO, ..MatcherConfig::default() };
        assert!(zero_timeout.validate().is_err());
    }

    #[test]
    fn test_threshold_bounds() {
        assert!(validate_threshold(0.0).is_ok());
        assert!(validate_threshold(0.7).is_ok());
        assert!(validate_threshold(1.0).is_ok());
        assert!(validate_threshold(-0.1).is_err());
        assert!(validate_threshold(1.01).is_err());
        assert!(validate_threshold(f32::NAN).is_err());
    }
}

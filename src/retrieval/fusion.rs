//! Reciprocal Rank Fusion algorithm for combining search results

use ahash::AHashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FusionError {
    #[error("Invalid weight configuration: weights must be positive")]
    InvalidWeights,

    #[error("Invalid RRF constant: {0}")]
    InvalidConstant(f32),
}

/// Configuration for fusion algorithm
#[derive(Debug, Clone)]
pub struct FusionConfig {
    /// RRF K constant (typically 60)
    pub rrf_k: f32,

    /// Weight for dense results
    pub dense_weight: f32,

    /// Weight for lexical results
    pub lexical_weight: f32,
}

impl FusionConfig {
    pub fn new(rrf_k: f32, dense_weight: f32, lexical_weight: f32) -> Result<Self, FusionError> {
        if dense_weight <= 0.0 || lexical_weight <= 0.0 {
            return Err(FusionError::InvalidWeights);
        }
        if !(rrf_k >= 0.0) {
            return Err(FusionError::InvalidConstant(rrf_k));
        }

        Ok(Self {
            rrf_k,
            dense_weight,
            lexical_weight,
        })
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            rrf_k: 60.0,
            dense_weight: 0.7,
            lexical_weight: 0.3,
        }
    }
}

/// Apply Reciprocal Rank Fusion to combine two ranked id lists
///
/// RRF formula: score(id) = sum over rankings of weight / (k + rank), with
/// rank starting at 1.
///
/// Ties keep first-appearance order (dense list first, then lexical), so
/// the output is deterministic.
pub fn reciprocal_rank_fusion(dense: &[u64], lexical: &[u64], config: &FusionConfig) -> Vec<(u64, f32)> {
    let mut order: Vec<u64> = Vec::with_capacity(dense.len() + lexical.len());
    let mut scores: AHashMap<u64, f32> = AHashMap::with_capacity(dense.len() + lexical.len());

    let lists = [(dense, config.dense_weight), (lexical, config.lexical_weight)];
    for (list, weight) in lists {
        for (rank, id) in list.iter().enumerate() {
            let contribution = weight / (config.rrf_k + rank as f32 + 1.0);
            match scores.get_mut(id) {
                Some(score) => *score += contribution,
                None => {
                    scores.insert(*id, contribution);
                    order.push(*id);
                }
            }
        }
    }

    let mut fused: Vec<(u64, f32)> = order
        .into_iter()
        .map(|id| (id, scores.get(&id).copied().unwrap_or(0.0)))
        .collect();

    // Stable: equal scores stay in first-appearance order
    fused.sort_by(|a, b| b.1.total_cmp(&a.1));
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rrf_basic() {
        let config = FusionConfig::new(60.0, 1.0, 1.0).unwrap();
        let fused = reciprocal_rank_fusion(&[1, 2, 3], &[2, 1, 4], &config);

        assert_eq!(fused.len(), 4);
        // 1 and 2 appear in both lists
        assert!(fused[0].0 == 1 || fused[0].0 == 2);
        assert!(fused[2].0 == 3 || fused[2].0 == 4);
    }

    #[test]
    fn test_rrf_weighted() {
        let config = FusionConfig::new(60.0, 0.7, 0.3).unwrap();
        let fused = reciprocal_rank_fusion(&[1], &[2], &config);
        assert_eq!(fused[0].0, 1);
        assert!((fused[0].1 - 0.7 / 61.0).abs() < 1e-6);
    }

    #[test]
    fn test_ties_keep_dense_order() {
        let config = FusionConfig::new(60.0, 0.5, 0.5).unwrap();
        // 10 and 20 both score 0.5/61 + 0.5/62
        let fused = reciprocal_rank_fusion(&[10, 20], &[20, 10], &config);
        assert_eq!(fused[0].0, 10);
        assert_eq!(fused[1].0, 20);

        let again = reciprocal_rank_fusion(&[10, 20], &[20, 10], &config);
        assert_eq!(fused, again);
    }

    #[test]
    fn test_empty_lexical_preserves_dense_ranking() {
        let config = FusionConfig::default();
        let fused = reciprocal_rank_fusion(&[5, 3, 9], &[], &config);
        let ids: Vec<u64> = fused.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![5, 3, 9]);
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            FusionConfig::new(60.0, 0.0, 0.3),
            Err(FusionError::InvalidWeights)
        ));
        assert!(matches!(
            FusionConfig::new(-1.0, 0.7, 0.3),
            Err(FusionError::InvalidConstant(_))
        ));
    }
}

/// HNSW vector index for similarity search
use ahash::AHashMap;
use hnsw_rs::filter::FilterT;
use hnsw_rs::prelude::*;
use thiserror::Error;

/// Upper bound on HNSW layers (hnsw_rs caps this at 16)
const MAX_LAYERS: usize = 16;

/// Smallest graph size; leaves room for session uploads on small corpora
const MIN_CAPACITY: usize = 1_000;

#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("Duplicate vector id: {0}")]
    DuplicateId(u64),

    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },
}

/// Search result with ID and similarity score
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    /// ID of the chunk
    pub id: u64,
    /// Cosine similarity (higher is more similar)
    pub score: f32,
}

/// HNSW graph plus the raw vectors it was built from
///
/// The raw vectors allow an exact scan when a filtered graph search
/// cannot fill `k` (narrow filters starve the graph walk) and let the
/// owner rebuild the graph without re-embedding.
pub struct VectorIndex {
    graph: Hnsw<'static, f32, DistCosine>,
    vectors: AHashMap<u64, Vec<f32>>,
    dimension: usize,
    ef_search: usize,
    capacity: usize,
}

impl VectorIndex {
    /// Create an empty index
    ///
    /// # Arguments
    /// * `dimension` - Vector dimension (must match embedding dimension)
    /// * `m` - Maximum connections per node and layer
    /// * `ef_construction` - Build-time candidate width
    /// * `ef_search` - Query-time candidate width
    /// * `capacity` - Expected number of vectors (a sizing hint)
    pub fn new(
        dimension: usize,
        m: usize,
        ef_construction: usize,
        ef_search: usize,
        capacity: usize,
    ) -> Self {
        let max_elements = capacity.max(MIN_CAPACITY);
        let graph = Hnsw::<f32, DistCosine>::new(
            m.max(2),
            max_elements,
            MAX_LAYERS,
            ef_construction.max(1),
            DistCosine,
        );

        Self {
            graph,
            vectors: AHashMap::with_capacity(capacity),
            dimension,
            ef_search: ef_search.max(1),
            capacity: max_elements,
        }
    }

    /// Number of elements the graph was sized for
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Insert a vector under a fresh id
    pub fn insert(&mut self, id: u64, vector: Vec<f32>) -> Result<(), VectorIndexError> {
        self.check_dimension(&vector)?;
        if self.vectors.contains_key(&id) {
            return Err(VectorIndexError::DuplicateId(id));
        }

        self.graph.insert((vector.as_slice(), id as usize));
        self.vectors.insert(id, vector);
        Ok(())
    }

    /// Insert multiple vectors in batch
    pub fn insert_batch(&mut self, items: Vec<(u64, Vec<f32>)>) -> Result<(), VectorIndexError> {
        for (id, vector) in items {
            self.insert(id, vector)?;
        }
        Ok(())
    }

    /// k nearest neighbours, best first
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>, VectorIndexError> {
        self.check_dimension(query)?;
        if k == 0 || self.vectors.is_empty() {
            return Ok(Vec::new());
        }

        let ef = self.ef_search.max(k);
        let neighbours = self.graph.search(query, k, ef);
        Ok(Self::ranked(neighbours))
    }

    /// k nearest neighbours among `allowed` ids only
    ///
    /// Never returns an id outside `allowed`. Falls back to an exact scan
    /// over the allowed set when the graph walk comes back short.
    pub fn search_filtered(
        &self,
        query: &[f32],
        k: usize,
        allowed: &[u64],
    ) -> Result<Vec<SearchResult>, VectorIndexError> {
        self.check_dimension(query)?;
        if k == 0 || allowed.is_empty() {
            return Ok(Vec::new());
        }

        let mut sorted: Vec<usize> = allowed.iter().map(|&id| id as usize).collect();
        sorted.sort_unstable();
        sorted.dedup();

        let reachable = sorted
            .iter()
            .filter(|&&id| self.vectors.contains_key(&(id as u64)))
            .count();
        let wanted = k.min(reachable);

        let results = if sorted.len() <= k.saturating_mul(4) {
            self.exact_scan(query, k, &sorted)
        } else {
            let ef = self.ef_search.max(k);
            let neighbours = self
                .graph
                .search_filter(query, k, ef, Some(&sorted as &dyn FilterT));
            let hits = Self::ranked(neighbours);

            if hits.len() < wanted {
                tracing::debug!(
                    "Filtered graph search returned {} of {}; scanning exactly",
                    hits.len(),
                    wanted
                );
                self.exact_scan(query, k, &sorted)
            } else {
                hits
            }
        };

        Ok(results
            .into_iter()
            .filter(|r| sorted.binary_search(&(r.id as usize)).is_ok())
            .collect())
    }

    fn exact_scan(&self, query: &[f32], k: usize, sorted_ids: &[usize]) -> Vec<SearchResult> {
        let mut scored: Vec<SearchResult> = sorted_ids
            .iter()
            .filter_map(|&id| {
                self.vectors.get(&(id as u64)).map(|v| SearchResult {
                    id: id as u64,
                    score: cosine_similarity(query, v),
                })
            })
            .collect();

        sort_best_first(&mut scored);
        scored.truncate(k);
        scored
    }

    fn ranked(neighbours: Vec<Neighbour>) -> Vec<SearchResult> {
        let mut results: Vec<SearchResult> = neighbours
            .into_iter()
            .map(|n| SearchResult {
                id: n.d_id as u64,
                score: 1.0 - n.distance,
            })
            .collect();
        sort_best_first(&mut results);
        results
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), VectorIndexError> {
        if vector.len() != self.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// Stored vector for an id
    pub fn vector(&self, id: u64) -> Option<&[f32]> {
        self.vectors.get(&id).map(Vec::as_slice)
    }

    /// Get the number of vectors in the index
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Check if index is empty
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Get vector dimension
    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Score descending, id ascending on ties
fn sort_best_first(results: &mut [SearchResult]) {
    results.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));
}

/// Cosine similarity; 0 for degenerate vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(dim: usize, axis: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[axis] = 1.0;
        v
    }

    #[test]
    fn test_insert_and_search() {
        let mut index = VectorIndex::new(8, 16, 200, 64, 10);

        let mut near = vec![0.0; 8];
        near[0] = 0.9;
        near[1] = 0.1;

        index.insert(1, unit(8, 0)).unwrap();
        index.insert(2, unit(8, 1)).unwrap();
        index.insert(3, near).unwrap();
        assert_eq!(index.len(), 3);

        let results = index.search(&unit(8, 0), 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, 1);
        assert!(results[0].score > 0.99);
        assert_eq!(results[1].id, 3);
    }

    #[test]
    fn test_capacity_follows_hint() {
        assert_eq!(VectorIndex::new(8, 16, 200, 64, 10).capacity(), MIN_CAPACITY);
        assert_eq!(VectorIndex::new(8, 16, 200, 64, 25_000).capacity(), 25_000);
    }

    #[test]
    fn test_dimension_validation() {
        let mut index = VectorIndex::new(8, 16, 200, 64, 10);
        assert!(matches!(
            index.insert(1, vec![1.0; 4]),
            Err(VectorIndexError::InvalidDimension { .. })
        ));
        assert!(index.search(&[1.0; 3], 1).is_err());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut index = VectorIndex::new(4, 16, 200, 64, 10);
        index.insert(7, unit(4, 0)).unwrap();
        assert!(matches!(
            index.insert(7, unit(4, 1)),
            Err(VectorIndexError::DuplicateId(7))
        ));
    }

    #[test]
    fn test_filtered_search_stays_inside_filter() {
        let dim = 16;
        let mut index = VectorIndex::new(dim, 16, 200, 64, 200);
        for id in 0..200u64 {
            let mut v = unit(dim, (id % dim as u64) as usize);
            v[(id as usize + 3) % dim] += 0.25;
            index.insert(id, v).unwrap();
        }

        let allowed: Vec<u64> = (0..200).filter(|id| id % 10 == 3).collect();
        let query = unit(dim, 0);

        for k in [1, 4, 30] {
            let results = index.search_filtered(&query, k, &allowed).unwrap();
            assert_eq!(results.len(), k.min(allowed.len()));
            assert!(results.iter().all(|r| allowed.contains(&r.id)));
        }
    }

    #[test]
    fn test_filtered_search_with_empty_filter() {
        let mut index = VectorIndex::new(4, 16, 200, 64, 10);
        index.insert(0, unit(4, 0)).unwrap();
        assert!(index.search_filtered(&unit(4, 0), 3, &[]).unwrap().is_empty());
        assert!(index
            .search_filtered(&unit(4, 0), 3, &[42])
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}

use anyhow::{bail, Result};

use nutrimatch_core::traits::VectorSearch;
use nutrimatch_core::types::{FoodId, VectorHit};

/// Exact cosine search over vectors held in memory.
///
/// Suits the few thousand rows of a nutrition table; ties are broken by
/// catalog position so results are fully deterministic.
pub struct FlatVectorIndex {
	dim: usize,
	ids: Vec<FoodId>,
	vectors: Vec<Vec<f32>>,
	norms: Vec<f32>,
}

fn l2(v: &[f32]) -> f32 {
	v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

impl FlatVectorIndex {
	/// `ids[i]` and `vectors[i]` belong to catalog position `i`.
	pub fn new(dim: usize, ids: Vec<FoodId>, vectors: Vec<Vec<f32>>) -> Result<Self> {
		if ids.len() != vectors.len() {
			bail!("{} ids but {} vectors", ids.len(), vectors.len());
		}
		if let Some(v) = vectors.iter().find(|v| v.len() != dim) {
			bail!("vector of dimension {} in a {}-dimensional index", v.len(), dim);
		}
		let norms = vectors.iter().map(|v| l2(v)).collect();
		Ok(Self { dim, ids, vectors, norms })
	}

	pub fn len(&self) -> usize {
		self.ids.len()
	}

	pub fn is_empty(&self) -> bool {
		self.ids.is_empty()
	}

	/// Cosine distance `1 - cos`; a zero vector on either side is at distance 1.
	fn distance(&self, position: usize, query: &[f32], query_norm: f32) -> f32 {
		let denom = self.norms[position] * query_norm;
		if denom <= f32::EPSILON {
			return 1.0;
		}
		let dot: f32 = self.vectors[position].iter().zip(query).map(|(a, b)| a * b).sum();
		1.0 - dot / denom
	}

	pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<VectorHit>> {
		if query.len() != self.dim {
			bail!("query vector has dimension {}, index expects {}", query.len(), self.dim);
		}
		let query_norm = l2(query);
		let mut scored: Vec<(usize, f32)> =
			(0..self.len()).map(|p| (p, self.distance(p, query, query_norm))).collect();
		scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
		scored.truncate(k);
		Ok(scored.into_iter().map(|(p, distance)| VectorHit { id: self.ids[p].clone(), distance }).collect())
	}
}

impl VectorSearch for FlatVectorIndex {
	fn dim(&self) -> usize {
		self.dim
	}

	async fn search_vec(&self, query: &[f32], k: usize) -> Result<Vec<VectorHit>> {
		self.search(query, k)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn nearest_first_and_ties_by_position() {
		let index = FlatVectorIndex::new(
			2,
			vec!["a".into(), "b".into(), "c".into()],
			vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![2.0, 0.0]],
		)
		.unwrap();
		let hits = index.search(&[1.0, 0.0], 3).unwrap();
		let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
		assert_eq!(ids, vec!["b", "c", "a"]);
		assert!(hits[0].distance.abs() < 1e-6);
		assert!((hits[2].distance - 1.0).abs() < 1e-6);
	}

	#[test]
	fn k_beyond_len_and_empty_index() {
		let index = FlatVectorIndex::new(2, vec!["a".into()], vec![vec![1.0, 1.0]]).unwrap();
		assert_eq!(index.search(&[1.0, 0.0], 10).unwrap().len(), 1);
		let empty = FlatVectorIndex::new(2, vec![], vec![]).unwrap();
		assert!(empty.search(&[1.0, 0.0], 5).unwrap().is_empty());
	}

	#[test]
	fn wrong_dimension_is_rejected() {
		let index = FlatVectorIndex::new(2, vec!["a".into()], vec![vec![1.0, 1.0]]).unwrap();
		assert!(index.search(&[1.0, 0.0, 0.0], 1).is_err());
		assert!(FlatVectorIndex::new(3, vec!["a".into()], vec![vec![1.0]]).is_err());
	}
}

//! Species similarity: half feature distance, half embedding cosine.

use deeptime_data::Species;

use crate::matrix::Matrix;

const SQRT_6: f64 = 2.449489742783178;

/// Six normalized morphological/ecological features.
pub fn feature_vector(species: &Species) -> [f64; 6] {
    [
        species.trophic_level / 5.0,
        species.body_length_cm().max(1e-6).log10() / 4.0,
        species.habitat_type.code() / 5.0,
        species.trait_value("heat_resistance") / 10.0,
        species.trait_value("cold_resistance") / 10.0,
        species.trait_value("drought_resistance") / 10.0,
    ]
}

pub fn feature_similarity(a: &Species, b: &Species) -> f64 {
    let fa = feature_vector(a);
    let fb = feature_vector(b);
    let dist: f64 = fa
        .iter()
        .zip(&fb)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt();
    (1.0 - dist / SQRT_6).clamp(0.0, 1.0)
}

/// S x S combined similarity, zero diagonal. `embedding` is the cosine
/// matrix from the embedding service in the same species order.
pub fn combined_similarity_matrix(species: &[Species], embedding: &[Vec<f64>]) -> Matrix {
    let n = species.len();
    let mut sim = Matrix::zeros(n, n);
    for i in 0..n {
        for j in (i + 1)..n {
            let feat = feature_similarity(&species[i], &species[j]);
            let embed = embedding
                .get(i)
                .and_then(|row| row.get(j))
                .copied()
                .unwrap_or(feat);
            let value = 0.5 * feat + 0.5 * embed.clamp(0.0, 1.0);
            sim.set(i, j, value);
            sim.set(j, i, value);
        }
    }
    sim
}

#[cfg(test)]
mod tests {
    use super::*;
    use deeptime_io::seed::seed_species;

    #[test]
    fn test_identical_species_fully_similar() {
        let species = seed_species();
        assert!((feature_similarity(&species[0], &species[0]) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_combined_matrix_diag_zero_symmetric() {
        let species = seed_species();
        let embedding = vec![vec![1.0; species.len()]; species.len()];
        let sim = combined_similarity_matrix(&species, &embedding);
        for i in 0..species.len() {
            assert_eq!(sim.get(i, i), 0.0);
            for j in 0..species.len() {
                assert!((sim.get(i, j) - sim.get(j, i)).abs() < 1e-12);
            }
        }
    }
}

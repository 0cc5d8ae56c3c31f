use rand::{rngs::StdRng, seq::index::sample, SeedableRng};

use crate::codebook::Codebook;
use crate::config::KMeansConfig;
use crate::error::PqError;
use crate::kmeans::{cluster, KMeansAlgorithmInput};
use crate::params::PqParams;

/// Trains one k-means codebook per subspace.
///
/// Subspace `j` sees the columns `[m * j, m * (j + 1))` of every training
/// vector. Widths are checked for every vector before any clustering runs.
#[tracing::instrument(
    skip_all,
    fields(num_vectors = vectors.len(), num_bytes = params.num_bytes())
)]
pub fn train_codebook<T: AsRef<[f32]>>(
    params: &PqParams,
    config: &KMeansConfig,
    vectors: &[T],
) -> Result<Codebook, PqError> {
    params.check_widths(vectors)?;
    if vectors.is_empty() {
        return Err(PqError::EmptyTrainingSet);
    }

    let m = params.m();
    let num_clusters = params.num_clusters();
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let max_points = num_clusters.saturating_mul(config.max_points_per_centroid);
    let rows = if vectors.len() > max_points {
        tracing::debug!(
            "Sampling {} of {} vectors for training",
            max_points,
            vectors.len()
        );
        let mut picks = sample(&mut rng, vectors.len(), max_points).into_vec();
        picks.sort_unstable();
        picks
    } else {
        (0..vectors.len()).collect()
    };

    let mut centroids = Vec::with_capacity(params.num_bytes() * num_clusters * m);
    let mut subspace = Vec::with_capacity(rows.len() * m);
    for j in 0..params.num_bytes() {
        subspace.clear();
        for &row in &rows {
            subspace.extend_from_slice(&vectors[row].as_ref()[m * j..m * (j + 1)]);
        }
        let input = KMeansAlgorithmInput::new(
            &subspace,
            m,
            num_clusters,
            config.num_iters,
            config.num_init_trials,
        );
        let output = cluster(&input, &mut rng)
            .map_err(|source| PqError::KMeans { subspace: j, source })?;
        tracing::debug!(
            subspace = j,
            iterations = output.num_iters,
            total_distance = output.total_distance,
            "Clustered subspace"
        );
        centroids.extend_from_slice(&output.cluster_centers);
    }

    Codebook::new(params.num_bytes(), num_clusters, m, centroids)
}

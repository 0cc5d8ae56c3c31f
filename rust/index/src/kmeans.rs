use nes_distance::{argmin, squared_euclidean};
use nes_error::{ErrorCodes, NesError};
use rand::{seq::index::sample, Rng};
use thiserror::Error;

/// The input for the kmeans algorithm.
/// - points: Flattened row-major matrix of the points to cluster, e.g. the first
///   point is stored at 0..dimension, the second at dimension..2*dimension and so on.
/// - dimension: The width of each point.
/// - k: The number of clusters. Exactly this many centers are produced, even when
///   there are fewer points than clusters.
/// - num_iters: Upper bound on refinement iterations.
/// - num_init_trials: Number of random seedings; the one with the lowest total
///   distance is refined.
pub struct KMeansAlgorithmInput<'referred_data> {
    points: &'referred_data [f32],
    dimension: usize,
    k: usize,
    num_iters: usize,
    num_init_trials: usize,
}

impl<'referred_data> KMeansAlgorithmInput<'referred_data> {
    pub fn new(
        points: &'referred_data [f32],
        dimension: usize,
        k: usize,
        num_iters: usize,
        num_init_trials: usize,
    ) -> Self {
        KMeansAlgorithmInput {
            points,
            dimension,
            k,
            num_iters,
            num_init_trials,
        }
    }

    fn num_points(&self) -> usize {
        self.points.len() / self.dimension.max(1)
    }

    fn point(&self, idx: usize) -> &[f32] {
        &self.points[idx * self.dimension..(idx + 1) * self.dimension]
    }
}

/// The output from kmeans.
/// - cluster_centers: Flattened `k x dimension` matrix of centers.
/// - cluster_counts: The number of points assigned to each center in the last pass.
/// - total_distance: Sum of squared distances of all points to their centers.
/// - num_iters: Refinement iterations actually run.
#[derive(Debug)]
pub struct KMeansAlgorithmOutput {
    pub cluster_centers: Vec<f32>,
    pub cluster_counts: Vec<usize>,
    pub total_distance: f32,
    pub num_iters: usize,
}

#[derive(Debug)]
struct KMeansAssignOutput {
    cluster_counts: Vec<usize>,
    cluster_farthest_point_idx: Vec<Option<usize>>,
    cluster_farthest_distance: Vec<f32>,
    // Sum of the points assigned to each cluster, k x dimension.
    cluster_sums: Vec<f32>,
    total_distance: f32,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum KMeansError {
    #[error("There should be at least one point to cluster")]
    NoPoints,
    #[error("There should be at least one cluster")]
    NoClusters,
    #[error("Points of width {dimension} cannot be laid out in a buffer of {len} values")]
    MalformedInput { dimension: usize, len: usize },
}

impl NesError for KMeansError {
    fn code(&self) -> ErrorCodes {
        match self {
            Self::NoPoints => ErrorCodes::InvalidArgument,
            Self::NoClusters => ErrorCodes::InvalidArgument,
            Self::MalformedInput { .. } => ErrorCodes::Internal,
        }
    }
}

// For a given point, get the nearest center and the squared distance to it.
// Ties go to the lowest center index.
fn get_nearest_center(point: &[f32], centers: &[f32], dimension: usize) -> (usize, f32) {
    let distances = centers
        .chunks_exact(dimension)
        .map(|center| squared_euclidean(point, center))
        .collect::<Vec<_>>();
    let nearest = argmin(distances.iter().copied()).unwrap_or(0);
    (nearest, distances.get(nearest).copied().unwrap_or(f32::MAX))
}

// Assigns every point to its nearest center and accumulates what the
// refinement step needs.
fn kmeansassign(input: &KMeansAlgorithmInput, centers: &[f32]) -> KMeansAssignOutput {
    let dim = input.dimension;
    let mut cluster_counts = vec![0; input.k];
    let mut cluster_farthest_point_idx = vec![None; input.k];
    let mut cluster_farthest_distance = vec![f32::MIN; input.k];
    let mut cluster_sums = vec![0.0; input.k * dim];
    let mut total_distance = 0.0;
    for idx in 0..input.num_points() {
        let point = input.point(idx);
        let (center, distance) = get_nearest_center(point, centers, dim);
        total_distance += distance;
        cluster_counts[center] += 1;
        if distance > cluster_farthest_distance[center] {
            cluster_farthest_distance[center] = distance;
            cluster_farthest_point_idx[center] = Some(idx);
        }
        cluster_sums[center * dim..(center + 1) * dim]
            .iter_mut()
            .zip(point)
            .for_each(|(sum, value)| *sum += value);
    }
    KMeansAssignOutput {
        cluster_counts,
        cluster_farthest_point_idx,
        cluster_farthest_distance,
        cluster_sums,
        total_distance,
    }
}

// Picks k points as centers. Points are drawn without replacement when there
// are enough of them, otherwise some points seed several centers and the
// duplicates are separated by re-seeding during refinement.
fn random_centers<R: Rng>(input: &KMeansAlgorithmInput, rng: &mut R) -> Vec<f32> {
    let num_points = input.num_points();
    let picks: Vec<usize> = if num_points >= input.k {
        sample(rng, num_points, input.k).into_vec()
    } else {
        (0..input.k).map(|_| rng.gen_range(0..num_points)).collect()
    };
    let mut centers = Vec::with_capacity(input.k * input.dimension);
    for idx in picks {
        centers.extend_from_slice(input.point(idx));
    }
    centers
}

// Tries several random seedings and keeps the one with the minimum total distance.
fn init_centers<R: Rng>(input: &KMeansAlgorithmInput, rng: &mut R) -> Vec<f32> {
    let mut best_centers = random_centers(input, rng);
    let mut best_distance = kmeansassign(input, &best_centers).total_distance;
    for _ in 1..input.num_init_trials {
        let centers = random_centers(input, rng);
        let total_distance = kmeansassign(input, &centers).total_distance;
        if total_distance < best_distance {
            best_distance = total_distance;
            best_centers = centers;
        }
    }
    best_centers
}

// Moves every non-empty center to the mean of its points. An empty cluster is
// re-seeded with the farthest point of the currently largest cluster, which
// then gives that point up. Returns how far the centers moved in total.
fn refine_centers(
    input: &KMeansAlgorithmInput,
    assign: &mut KMeansAssignOutput,
    previous_centers: &[f32],
) -> (Vec<f32>, f32) {
    let dim = input.dimension;
    let mut new_centers = vec![0.0; input.k * dim];
    for cluster_idx in 0..input.k {
        let count = assign.cluster_counts[cluster_idx];
        let range = cluster_idx * dim..(cluster_idx + 1) * dim;
        if count > 0 {
            new_centers[range.clone()]
                .iter_mut()
                .zip(&assign.cluster_sums[range])
                .for_each(|(center, sum)| *center = sum / count as f32);
        }
    }

    for cluster_idx in 0..input.k {
        if assign.cluster_counts[cluster_idx] > 0 {
            continue;
        }
        let range = cluster_idx * dim..(cluster_idx + 1) * dim;
        let donor = assign
            .cluster_counts
            .iter()
            .enumerate()
            .filter(|(idx, count)| **count > 1 && assign.cluster_farthest_point_idx[*idx].is_some())
            .max_by_key(|(idx, count)| (**count, std::cmp::Reverse(*idx)))
            .map(|(idx, _)| idx);
        match donor.and_then(|idx| assign.cluster_farthest_point_idx[idx].map(|p| (idx, p))) {
            Some((donor_idx, point_idx)) => {
                new_centers[range].copy_from_slice(input.point(point_idx));
                assign.cluster_counts[donor_idx] -= 1;
                assign.cluster_counts[cluster_idx] = 1;
                // The donor's next farthest point is unknown; it cannot donate again this round.
                assign.cluster_farthest_point_idx[donor_idx] = None;
            }
            None => {
                new_centers[range.clone()].copy_from_slice(&previous_centers[range]);
            }
        }
    }

    let diff = previous_centers
        .chunks_exact(dim)
        .zip(new_centers.chunks_exact(dim))
        .map(|(previous, current)| squared_euclidean(previous, current))
        .sum();
    (new_centers, diff)
}

/// Clusters the input points into exactly `k` centers.
pub fn cluster<R: Rng>(
    input: &KMeansAlgorithmInput,
    rng: &mut R,
) -> Result<KMeansAlgorithmOutput, KMeansError> {
    if input.k == 0 {
        return Err(KMeansError::NoClusters);
    }
    if input.dimension == 0 || input.points.len() % input.dimension != 0 {
        return Err(KMeansError::MalformedInput {
            dimension: input.dimension,
            len: input.points.len(),
        });
    }
    if input.num_points() == 0 {
        return Err(KMeansError::NoPoints);
    }

    let mut centers = init_centers(input, rng);
    let mut num_iters = 0;
    for _ in 0..input.num_iters {
        num_iters += 1;
        let mut assign = kmeansassign(input, &centers);
        let (new_centers, diff) = refine_centers(input, &mut assign, &centers);
        centers = new_centers;
        if diff == 0.0 {
            break;
        }
    }

    let assign = kmeansassign(input, &centers);
    Ok(KMeansAlgorithmOutput {
        cluster_centers: centers,
        cluster_counts: assign.cluster_counts,
        total_distance: assign.total_distance,
        num_iters,
    })
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    fn two_blobs() -> Vec<f32> {
        vec![
            0.0, 0.0, //
            1.0, 0.0, //
            0.0, 1.0, //
            1.0, 1.0, //
            10.0, 10.0, //
            11.0, 10.0, //
            10.0, 11.0, //
            11.0, 11.0, //
        ]
    }

    #[test]
    fn test_kmeans_assign() {
        let points = two_blobs();
        let input = KMeansAlgorithmInput::new(&points, 2, 2, 10, 1);
        let centers = vec![0.0, 0.0, 10.0, 10.0];
        let res = kmeansassign(&input, &centers);
        assert_eq!(res.cluster_counts, vec![4, 4]);
        assert_eq!(res.total_distance, 8.0);
        assert_eq!(res.cluster_farthest_distance, vec![2.0, 2.0]);
        assert_eq!(res.cluster_farthest_point_idx, vec![Some(3), Some(7)]);
        assert_eq!(res.cluster_sums, vec![2.0, 2.0, 42.0, 42.0]);
    }

    #[test]
    fn test_nearest_center_ties_go_to_lowest_index() {
        let centers = vec![1.0, 0.0, -1.0, 0.0];
        assert_eq!(get_nearest_center(&[0.0, 0.0], &centers, 2), (0, 1.0));
    }

    #[test]
    fn test_refine_centers_reseeds_empty_cluster() {
        let points = vec![
            0.0, 0.0, //
            1.0, 0.0, //
            5.0, 0.0, //
        ];
        let input = KMeansAlgorithmInput::new(&points, 2, 2, 10, 1);
        let previous = vec![0.0, 0.0, 100.0, 100.0];
        let mut assign = kmeansassign(&input, &previous);
        assert_eq!(assign.cluster_counts, vec![3, 0]);
        let (centers, _) = refine_centers(&input, &mut assign, &previous);
        assert_eq!(&centers[0..2], &[2.0, 0.0]);
        assert_eq!(&centers[2..4], &[5.0, 0.0]);
    }

    #[test]
    fn test_kmeans_clustering_finds_blobs() {
        let points = two_blobs();
        let input = KMeansAlgorithmInput::new(&points, 2, 2, 20, 3);
        let mut rng = StdRng::seed_from_u64(7);
        let res = cluster(&input, &mut rng).expect("Failed to cluster");
        assert_eq!(res.cluster_centers.len(), 4);
        assert_eq!(res.cluster_counts.iter().sum::<usize>(), 8);
        let mut centers = res
            .cluster_centers
            .chunks_exact(2)
            .map(|c| c.to_vec())
            .collect::<Vec<_>>();
        centers.sort_by(|a, b| a[0].total_cmp(&b[0]));
        assert_eq!(centers, vec![vec![0.5, 0.5], vec![10.5, 10.5]]);
        assert_eq!(res.total_distance, 4.0);
    }

    #[test]
    fn test_fewer_points_than_clusters() {
        let points = vec![0.0, 1.0, 2.0];
        let input = KMeansAlgorithmInput::new(&points, 1, 5, 20, 2);
        let mut rng = StdRng::seed_from_u64(3);
        let res = cluster(&input, &mut rng).expect("Failed to cluster");
        assert_eq!(res.cluster_centers.len(), 5);
        for point in &points {
            assert!(res.cluster_centers.contains(point));
        }
    }

    #[test]
    fn test_seeded_clustering_is_deterministic() {
        let mut rng = StdRng::seed_from_u64(11);
        let points = (0..400).map(|_| rng.gen_range(-1.0..1.0)).collect::<Vec<f32>>();
        let input = KMeansAlgorithmInput::new(&points, 4, 8, 20, 3);
        let first = cluster(&input, &mut StdRng::seed_from_u64(5)).expect("Failed to cluster");
        let second = cluster(&input, &mut StdRng::seed_from_u64(5)).expect("Failed to cluster");
        assert_eq!(first.cluster_centers, second.cluster_centers);
        assert_eq!(first.num_iters, second.num_iters);
    }

    #[test]
    fn test_invalid_inputs() {
        let mut rng = StdRng::seed_from_u64(0);
        let input = KMeansAlgorithmInput::new(&[], 2, 2, 10, 1);
        assert_eq!(cluster(&input, &mut rng).unwrap_err(), KMeansError::NoPoints);
        let input = KMeansAlgorithmInput::new(&[1.0, 2.0], 2, 0, 10, 1);
        assert_eq!(cluster(&input, &mut rng).unwrap_err(), KMeansError::NoClusters);
        let input = KMeansAlgorithmInput::new(&[1.0, 2.0, 3.0], 2, 1, 10, 1);
        assert!(matches!(
            cluster(&input, &mut rng),
            Err(KMeansError::MalformedInput { .. })
        ));
    }
}

use nes_distance::{argmin, squared_euclidean};
use serde::{Deserialize, Serialize};

use crate::error::PqError;
use crate::params::{PqParams, MAX_NUM_CLUSTERS};

/// Trained centroids of a product quantizer.
///
/// Logically a `[num_bytes, num_clusters, subvector_width]` array stored
/// row-major in `centroids`: entry `[j, c, :]` is the centroid of cluster `c`
/// in subspace `j`. A codebook is immutable once built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PersistedCodebook")]
pub struct Codebook {
    num_bytes: usize,
    num_clusters: usize,
    subvector_width: usize,
    centroids: Vec<f32>,
}

#[derive(Deserialize)]
struct PersistedCodebook {
    num_bytes: usize,
    num_clusters: usize,
    subvector_width: usize,
    centroids: Vec<f32>,
}

impl TryFrom<PersistedCodebook> for Codebook {
    type Error = PqError;

    fn try_from(value: PersistedCodebook) -> Result<Self, Self::Error> {
        Codebook::new(
            value.num_bytes,
            value.num_clusters,
            value.subvector_width,
            value.centroids,
        )
    }
}

impl Codebook {
    pub fn new(
        num_bytes: usize,
        num_clusters: usize,
        subvector_width: usize,
        centroids: Vec<f32>,
    ) -> Result<Self, PqError> {
        if num_bytes == 0 || subvector_width == 0 {
            return Err(PqError::InvalidParameters(format!(
                "codebook needs at least one subspace of positive width, got {num_bytes} x {subvector_width}"
            )));
        }
        if num_clusters == 0 || num_clusters > MAX_NUM_CLUSTERS {
            return Err(PqError::InvalidParameters(format!(
                "num_clusters must be in 1..={MAX_NUM_CLUSTERS}, got {num_clusters}"
            )));
        }
        let expected = num_bytes
            .checked_mul(num_clusters)
            .and_then(|n| n.checked_mul(subvector_width))
            .ok_or_else(|| {
                PqError::InvalidParameters(format!(
                    "codebook of shape [{num_bytes}, {num_clusters}, {subvector_width}] is too large"
                ))
            })?;
        if centroids.len() != expected {
            return Err(PqError::InvalidParameters(format!(
                "codebook of shape [{num_bytes}, {num_clusters}, {subvector_width}] needs {expected} values, got {}",
                centroids.len()
            )));
        }
        Ok(Self {
            num_bytes,
            num_clusters,
            subvector_width,
            centroids,
        })
    }

    pub fn num_bytes(&self) -> usize {
        self.num_bytes
    }

    pub fn num_clusters(&self) -> usize {
        self.num_clusters
    }

    pub fn subvector_width(&self) -> usize {
        self.subvector_width
    }

    /// Width of the vectors this codebook encodes.
    pub fn dimension(&self) -> usize {
        self.num_bytes * self.subvector_width
    }

    pub fn centroids(&self) -> &[f32] {
        &self.centroids
    }

    /// All centroids of subspace `j`, flattened `num_clusters x subvector_width`.
    pub fn subspace(&self, j: usize) -> &[f32] {
        let len = self.num_clusters * self.subvector_width;
        &self.centroids[j * len..(j + 1) * len]
    }

    pub fn centroid(&self, j: usize, c: usize) -> &[f32] {
        let start = c * self.subvector_width;
        &self.subspace(j)[start..start + self.subvector_width]
    }

    /// Whether this codebook was trained for `params`.
    pub fn matches(&self, params: &PqParams) -> bool {
        self.num_bytes == params.num_bytes()
            && self.num_clusters == params.num_clusters()
            && self.subvector_width == params.m()
    }

    /// Squared distances from `chunk` to every centroid of subspace `j`, in centroid order.
    pub(crate) fn distances<'a>(
        &'a self,
        j: usize,
        chunk: &'a [f32],
    ) -> impl Iterator<Item = f32> + 'a {
        self.subspace(j)
            .chunks_exact(self.subvector_width)
            .map(move |centroid| squared_euclidean(chunk, centroid))
    }

    /// 1-based code of the centroid nearest to `chunk` in subspace `j`.
    pub fn nearest(&self, j: usize, chunk: &[f32]) -> u8 {
        code_from_index(argmin(self.distances(j, chunk)).unwrap_or(0))
    }
}

/// Codes are 1-based; `0` is never produced.
pub(crate) fn code_from_index(index: usize) -> u8 {
    // num_clusters <= 255 is enforced at construction, so index + 1 fits.
    (index + 1) as u8
}

/// The persisted form of a trained encoder: its hyperparameters and centroids.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EncoderModel {
    pub params: PqParams,
    pub codebook: Codebook,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codebook() -> Codebook {
        // 2 subspaces, 3 clusters, width 2.
        Codebook::new(
            2,
            3,
            2,
            vec![
                0.0, 0.0, 1.0, 1.0, 2.0, 2.0, //
                10.0, 10.0, -1.0, -1.0, 5.0, 5.0, //
            ],
        )
        .expect("valid codebook")
    }

    #[test]
    fn test_accessors() {
        let codebook = codebook();
        assert_eq!(codebook.dimension(), 4);
        assert_eq!(codebook.subspace(1), &[10.0, 10.0, -1.0, -1.0, 5.0, 5.0]);
        assert_eq!(codebook.centroid(0, 2), &[2.0, 2.0]);
        assert_eq!(codebook.centroid(1, 1), &[-1.0, -1.0]);
        assert!(codebook.matches(&PqParams::new(4, 2, 3).expect("valid params")));
        assert!(!codebook.matches(&PqParams::new(4, 2, 4).expect("valid params")));
    }

    #[test]
    fn test_nearest_is_one_based() {
        let codebook = codebook();
        assert_eq!(codebook.nearest(0, &[0.1, 0.0]), 1);
        assert_eq!(codebook.nearest(0, &[2.0, 2.0]), 3);
        assert_eq!(codebook.nearest(1, &[-3.0, 0.0]), 2);
        // Equidistant from clusters 0 and 1: the lower index wins.
        assert_eq!(codebook.nearest(0, &[0.5, 0.5]), 1);
    }

    #[test]
    fn test_shape_is_validated() {
        assert!(matches!(
            Codebook::new(2, 3, 2, vec![0.0; 11]),
            Err(PqError::InvalidParameters(_))
        ));
        assert!(matches!(
            Codebook::new(2, 0, 2, vec![]),
            Err(PqError::InvalidParameters(_))
        ));
        assert!(matches!(
            Codebook::new(1, 256, 1, vec![0.0; 256]),
            Err(PqError::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_model_survives_persistence() {
        let model = EncoderModel {
            params: PqParams::new(4, 2, 3).expect("valid params"),
            codebook: codebook(),
        };
        let json = serde_json::to_string(&model).expect("serializable");
        let restored: EncoderModel = serde_json::from_str(&json).expect("deserializable");
        assert_eq!(restored, model);
    }

    #[test]
    fn test_persisted_shape_is_revalidated() {
        let json =
            r#"{"num_bytes": 2, "num_clusters": 3, "subvector_width": 2, "centroids": [0.0]}"#;
        assert!(serde_json::from_str::<Codebook>(json).is_err());
    }

    #[test]
    fn test_oversized_shape_is_rejected() {
        let json = r#"{"num_bytes": 1099511627776, "num_clusters": 255,
            "subvector_width": 1099511627776, "centroids": [0.0]}"#;
        assert!(serde_json::from_str::<Codebook>(json).is_err());
        assert!(matches!(
            Codebook::new(usize::MAX, 2, 1, vec![]),
            Err(PqError::InvalidParameters(_))
        ));
    }
}

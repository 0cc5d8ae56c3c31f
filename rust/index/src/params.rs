use serde::{Deserialize, Serialize};

use crate::error::{DimensionError, PqError};

/// Largest codebook that still yields byte-packable codes; code `0` is reserved.
pub const MAX_NUM_CLUSTERS: usize = u8::MAX as usize;

/// Hyperparameters of a product quantizer, fixed at construction.
///
/// Input vectors of width `k` are split into `num_bytes = k / m` subspaces of
/// width `m`, each quantized against `num_clusters` centroids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PersistedParams")]
pub struct PqParams {
    k: usize,
    m: usize,
    num_clusters: usize,
}

#[derive(Deserialize)]
struct PersistedParams {
    k: usize,
    m: usize,
    num_clusters: usize,
}

impl TryFrom<PersistedParams> for PqParams {
    type Error = PqError;

    fn try_from(value: PersistedParams) -> Result<Self, Self::Error> {
        PqParams::new(value.k, value.m, value.num_clusters)
    }
}

impl PqParams {
    pub fn new(k: usize, m: usize, num_clusters: usize) -> Result<Self, PqError> {
        if k == 0 || m == 0 {
            return Err(PqError::InvalidParameters(format!(
                "k and m must be positive, got k={k}, m={m}"
            )));
        }
        if k % m != 0 {
            return Err(DimensionError::Indivisible { k, m }.into());
        }
        if num_clusters == 0 || num_clusters > MAX_NUM_CLUSTERS {
            return Err(PqError::InvalidParameters(format!(
                "num_clusters must be in 1..={MAX_NUM_CLUSTERS}, got {num_clusters}"
            )));
        }
        Ok(Self { k, m, num_clusters })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn m(&self) -> usize {
        self.m
    }

    pub fn num_bytes(&self) -> usize {
        self.k / self.m
    }

    pub fn num_clusters(&self) -> usize {
        self.num_clusters
    }

    /// Checks that every vector has width `k`.
    pub(crate) fn check_widths<T: AsRef<[f32]>>(&self, vectors: &[T]) -> Result<(), PqError> {
        match vectors
            .iter()
            .enumerate()
            .find(|(_, vector)| vector.as_ref().len() != self.k)
        {
            Some((index, vector)) => Err(DimensionError::VectorWidth {
                index,
                expected: self.k,
                actual: vector.as_ref().len(),
            }
            .into()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_num_bytes() {
        let params = PqParams::new(8, 2, 16).expect("valid params");
        assert_eq!(params.num_bytes(), 4);
        assert_eq!(params.k(), 8);
        assert_eq!(params.m(), 2);
        assert_eq!(params.num_clusters(), 16);
    }

    #[test]
    fn test_indivisible_width_is_rejected() {
        let err = PqParams::new(10, 3, 16).expect_err("3 does not divide 10");
        assert!(matches!(
            err,
            PqError::InvalidDimension(DimensionError::Indivisible { k: 10, m: 3 })
        ));
    }

    #[test]
    fn test_out_of_range_parameters() {
        assert!(matches!(
            PqParams::new(8, 0, 16),
            Err(PqError::InvalidParameters(_))
        ));
        assert!(matches!(
            PqParams::new(0, 2, 16),
            Err(PqError::InvalidParameters(_))
        ));
        assert!(matches!(
            PqParams::new(8, 2, 0),
            Err(PqError::InvalidParameters(_))
        ));
        assert!(matches!(
            PqParams::new(8, 2, 256),
            Err(PqError::InvalidParameters(_))
        ));
        assert!(PqParams::new(8, 2, 255).is_ok());
    }

    #[test]
    fn test_check_widths_reports_first_offender() {
        let params = PqParams::new(4, 2, 4).expect("valid params");
        let vectors = vec![vec![0.0f32; 4], vec![0.0; 3], vec![0.0; 5]];
        let err = params.check_widths(&vectors).expect_err("second vector is short");
        assert!(matches!(
            err,
            PqError::InvalidDimension(DimensionError::VectorWidth {
                index: 1,
                expected: 4,
                actual: 3
            })
        ));
        assert!(params.check_widths::<Vec<f32>>(&[]).is_ok());
    }

    #[test]
    fn test_deserialization_revalidates() {
        let params: PqParams =
            serde_json::from_str(r#"{"k": 8, "m": 2, "num_clusters": 16}"#).expect("valid");
        assert_eq!(params.num_bytes(), 4);
        assert!(
            serde_json::from_str::<PqParams>(r#"{"k": 9, "m": 2, "num_clusters": 16}"#).is_err()
        );
    }
}

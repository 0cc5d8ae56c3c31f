//! Execution strategies for encoding.
//!
//! Both strategies evaluate the same [`EncodeKernel`], so for a given
//! codebook and input they produce byte-identical codes:
//!
//! - the accelerator path feeds fixed-size batches, strictly one after the
//!   other, to an [`Accelerator`] bound to the selected device;
//! - the direct path materializes the whole `N x num_bytes x num_clusters`
//!   distance tensor in one pass and reduces it with the same argmin.

use std::fmt::Debug;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use nes_distance::argmin;
use parking_lot::Mutex;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};

use crate::codebook::{code_from_index, Codebook};
use crate::config::{default_batch_size, PqConfig};
use crate::device::DeviceBinding;
use crate::error::BackendError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Backend {
    Accelerator,
    Direct,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncodeOptions {
    pub batch_size: usize,
    pub backend: Backend,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            backend: Backend::Accelerator,
        }
    }
}

impl From<&PqConfig> for EncodeOptions {
    fn from(config: &PqConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            backend: if config.use_accelerator {
                Backend::Accelerator
            } else {
                Backend::Direct
            },
        }
    }
}

/// The encode function `(codebook, vectors) -> codes`, built once per codebook
/// and shared by every batch and backend.
#[derive(Clone, Debug)]
pub struct EncodeKernel {
    codebook: Arc<Codebook>,
}

impl EncodeKernel {
    pub fn new(codebook: Arc<Codebook>) -> Self {
        Self { codebook }
    }

    pub fn codebook(&self) -> &Arc<Codebook> {
        &self.codebook
    }

    pub fn num_bytes(&self) -> usize {
        self.codebook.num_bytes()
    }

    /// Writes the `num_bytes` codes of one vector into `codes`.
    pub fn encode_row(&self, row: &[f32], codes: &mut [u8]) {
        let width = self.codebook.subvector_width();
        for (j, (chunk, code)) in row.chunks_exact(width).zip(codes.iter_mut()).enumerate() {
            *code = self.codebook.nearest(j, chunk);
        }
    }

    /// Appends the `num_bytes x num_clusters` squared distances of one vector.
    fn extend_distances(&self, row: &[f32], distances: &mut Vec<f32>) {
        let width = self.codebook.subvector_width();
        for (j, chunk) in row.chunks_exact(width).enumerate() {
            distances.extend(self.codebook.distances(j, chunk));
        }
    }
}

/// Batched execution on an accelerator device.
///
/// Implementations must return exactly `batch.len() * kernel.num_bytes()`
/// codes, row-major, in input order.
pub trait Accelerator: Send + Sync + Debug {
    fn binding(&self) -> DeviceBinding;

    fn encode_batch(
        &self,
        kernel: &EncodeKernel,
        batch_idx: usize,
        batch: &[&[f32]],
    ) -> Result<Vec<u8>, BackendError>;
}

/// A worker pool bound to one device. The pool is created when the context
/// is acquired and torn down when the context is dropped. Calls are
/// serialized, so at most one batch runs on the device at a time.
#[derive(Debug)]
pub struct ExecutionContext {
    binding: DeviceBinding,
    pool: Mutex<ThreadPool>,
}

impl ExecutionContext {
    pub fn acquire(
        binding: DeviceBinding,
        num_threads: Option<usize>,
    ) -> Result<Self, BackendError> {
        let mut builder =
            ThreadPoolBuilder::new().thread_name(move |idx| format!("nes-{binding}-{idx}"));
        if let Some(num_threads) = num_threads {
            builder = builder.num_threads(num_threads);
        }
        let pool = builder
            .build()
            .map_err(|e| BackendError::ContextUnavailable {
                binding,
                reason: e.to_string(),
            })?;
        tracing::debug!(
            "Acquired execution context on {} with {} threads",
            binding,
            pool.current_num_threads()
        );
        Ok(Self {
            binding,
            pool: Mutex::new(pool),
        })
    }

    // Runs `work` on the pool, turning a worker panic into a batch failure.
    fn run<F: FnOnce() + Send>(&self, batch_idx: usize, work: F) -> Result<(), BackendError> {
        let pool = self.pool.lock();
        catch_unwind(AssertUnwindSafe(|| pool.install(work))).map_err(|panic| {
            BackendError::BatchFailed {
                batch: batch_idx,
                binding: self.binding,
                reason: panic_reason(panic.as_ref()),
            }
        })
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        tracing::debug!("Releasing execution context on {}", self.binding);
    }
}

impl Accelerator for ExecutionContext {
    fn binding(&self) -> DeviceBinding {
        self.binding
    }

    fn encode_batch(
        &self,
        kernel: &EncodeKernel,
        batch_idx: usize,
        batch: &[&[f32]],
    ) -> Result<Vec<u8>, BackendError> {
        let num_bytes = kernel.num_bytes();
        let mut codes = vec![0u8; batch.len() * num_bytes];
        self.run(batch_idx, || {
            codes
                .par_chunks_mut(num_bytes)
                .zip(batch.par_iter())
                .for_each(|(codes, row)| kernel.encode_row(row, codes));
        })?;
        Ok(codes)
    }
}

fn panic_reason(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

/// Encodes all rows in one pass through the full distance tensor.
pub fn encode_direct(kernel: &EncodeKernel, rows: &[&[f32]]) -> Vec<u8> {
    let codebook = kernel.codebook();
    let num_clusters = codebook.num_clusters();
    // [N, num_bytes, num_clusters]
    let mut distances = Vec::with_capacity(rows.len() * codebook.num_bytes() * num_clusters);
    for row in rows {
        kernel.extend_distances(row, &mut distances);
    }
    distances
        .chunks_exact(num_clusters)
        .map(|subspace| code_from_index(argmin(subspace.iter().copied()).unwrap_or(0)))
        .collect()
}

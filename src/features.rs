//! Image feature extraction.
//!
//! The pretrained classifier network is an opaque collaborator behind the
//! [`ImageBackbone`] trait: it accepts a batch of preprocessed images and
//! returns one fixed-length embedding per image. This module owns the
//! surrounding pipeline - pixel scaling, per-channel normalization,
//! chunked batching, and L2 normalization of the output features - plus a
//! trivially-computable pooling backbone and a precomputed-features path
//! for workflows where extraction happened offline.

use ndarray::{Array2, Array4, Axis, s};

/// Per-channel normalization constants for RGB images, matching the
/// statistics the pretrained classifiers were trained with.
pub const CHANNEL_MEAN: [f64; 3] = [0.485, 0.456, 0.406];
pub const CHANNEL_STD: [f64; 3] = [0.229, 0.224, 0.225];

/// Largest number of images pushed through the backbone at once.
const DEFAULT_CHUNK_SIZE: usize = 500;

/// An opaque feature-producing network.
///
/// Input images are (batch, 3, height, width) with already-normalized
/// pixel values; output is (batch, feature_dim).
pub trait ImageBackbone {
    fn feature_dim(&self) -> usize;
    fn forward(&self, images: &Array4<f64>) -> Array2<f64>;
}

/// Feature extraction pipeline wrapping an [`ImageBackbone`].
///
/// Scales raw 0..255 pixels to 0..1, normalizes each channel, runs the
/// backbone in bounded chunks, and L2-normalizes each feature row.
pub struct FeatureExtractor<B: ImageBackbone> {
    backbone: B,
    chunk_size: usize,
}

impl<B: ImageBackbone> FeatureExtractor<B> {
    pub fn new(backbone: B) -> Self {
        FeatureExtractor { backbone, chunk_size: DEFAULT_CHUNK_SIZE }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "Chunk size must be positive");
        self.chunk_size = chunk_size;
        self
    }

    pub fn feature_dim(&self) -> usize {
        self.backbone.feature_dim()
    }

    /// Extract one feature row per image.
    ///
    /// `images` holds raw pixel values in 0..255 with shape
    /// (batch, 3, height, width); the result is (batch, feature_dim)
    /// with unit-norm rows.
    pub fn extract(&self, images: &Array4<f64>) -> Array2<f64> {
        let (batch, channels, _, _) = images.dim();
        assert_eq!(channels, 3, "Expected 3-channel RGB images, got {} channels", channels);

        let preprocessed = preprocess(images);

        let mut features = Array2::zeros((batch, self.backbone.feature_dim()));
        let mut start = 0;
        while start < batch {
            let end = (start + self.chunk_size).min(batch);
            let chunk = preprocessed.slice(s![start..end, .., .., ..]).to_owned();
            let chunk_features = self.backbone.forward(&chunk);
            assert_eq!(chunk_features.dim(), (end - start, self.backbone.feature_dim()),
                       "Backbone returned unexpected feature shape");

            features.slice_mut(s![start..end, ..]).assign(&chunk_features);
            start = end;
        }

        l2_normalize_rows(&mut features);
        features
    }
}

/// Scale 0..255 pixels to 0..1 and normalize each channel.
fn preprocess(images: &Array4<f64>) -> Array4<f64> {
    let mut out = images.mapv(|v| v / 255.0);

    for c in 0..3 {
        let mut channel = out.slice_mut(s![.., c, .., ..]);
        channel.mapv_inplace(|v| (v - CHANNEL_MEAN[c]) / CHANNEL_STD[c]);
    }

    out
}

fn l2_normalize_rows(features: &mut Array2<f64>) {
    for mut row in features.axis_iter_mut(Axis(0)) {
        let norm = row.mapv(|v| v * v).sum().sqrt();
        if norm > 0.0 {
            row.mapv_inplace(|v| v / norm);
        }
    }
}

/// Average-pooling backbone.
///
/// Pools each channel over a grid x grid spatial partition, giving a
/// 3 * grid^2 feature per image. Not a learned network - it exists so the
/// captioning pipeline can be exercised end-to-end without pretrained
/// weights, and as the reference for what a backbone must implement.
pub struct PooledBackbone {
    grid: usize,
}

impl PooledBackbone {
    pub fn new(grid: usize) -> Self {
        assert!(grid > 0, "Pooling grid must be positive");
        PooledBackbone { grid }
    }
}

impl ImageBackbone for PooledBackbone {
    fn feature_dim(&self) -> usize {
        3 * self.grid * self.grid
    }

    fn forward(&self, images: &Array4<f64>) -> Array2<f64> {
        let (batch, channels, height, width) = images.dim();
        assert_eq!(height % self.grid, 0, "Image height {} not divisible by pooling grid {}", height, self.grid);
        assert_eq!(width % self.grid, 0, "Image width {} not divisible by pooling grid {}", width, self.grid);

        let cell_h = height / self.grid;
        let cell_w = width / self.grid;
        let mut features = Array2::zeros((batch, self.feature_dim()));

        for n in 0..batch {
            let mut f = 0;
            for c in 0..channels {
                for gy in 0..self.grid {
                    for gx in 0..self.grid {
                        let block = images.slice(s![
                            n,
                            c,
                            gy * cell_h..(gy + 1) * cell_h,
                            gx * cell_w..(gx + 1) * cell_w
                        ]);
                        features[[n, f]] = block.mean().unwrap_or(0.0);
                        f += 1;
                    }
                }
            }
        }

        features
    }
}

/// Features extracted ahead of time, keyed by row position.
///
/// The usual large-scale workflow: a pretrained network runs once over
/// the dataset and training consumes the stored embeddings.
pub struct PrecomputedFeatures {
    features: Array2<f64>,
}

impl PrecomputedFeatures {
    pub fn from_array(features: Array2<f64>) -> Self {
        PrecomputedFeatures { features }
    }

    pub fn len(&self) -> usize {
        self.features.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.features.nrows() == 0
    }

    pub fn feature_dim(&self) -> usize {
        self.features.ncols()
    }

    /// Gather the feature rows for a minibatch of dataset positions.
    pub fn batch(&self, indices: &[usize]) -> Array2<f64> {
        let mut out = Array2::zeros((indices.len(), self.features.ncols()));

        for (i, &idx) in indices.iter().enumerate() {
            assert!(idx < self.features.nrows(), "Feature index {} out of bounds {}", idx, self.features.nrows());
            out.row_mut(i).assign(&self.features.row(idx));
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, Array4};

    #[test]
    fn test_pooled_backbone_feature_dim() {
        let backbone = PooledBackbone::new(2);
        assert_eq!(backbone.feature_dim(), 12);
    }

    #[test]
    fn test_pooled_backbone_constant_image() {
        let backbone = PooledBackbone::new(2);
        let images = Array4::from_elem((1, 3, 4, 4), 2.0);

        let features = backbone.forward(&images);
        assert_eq!(features.shape(), &[1, 12]);
        assert!(features.iter().all(|&v| (v - 2.0).abs() < 1e-12));
    }

    #[test]
    fn test_extractor_output_is_unit_norm() {
        let extractor = FeatureExtractor::new(PooledBackbone::new(2));
        let mut images = Array4::zeros((3, 3, 4, 4));
        for (i, v) in images.iter_mut().enumerate() {
            *v = ((i * 31 % 256) as f64).max(1.0);
        }

        let features = extractor.extract(&images);
        assert_eq!(features.shape(), &[3, 12]);

        for row in features.axis_iter(Axis(0)) {
            let norm = row.mapv(|v| v * v).sum().sqrt();
            assert!((norm - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_extractor_chunking_is_transparent() {
        let mut images = Array4::zeros((5, 3, 4, 4));
        for (i, v) in images.iter_mut().enumerate() {
            *v = (i % 255) as f64;
        }

        let whole = FeatureExtractor::new(PooledBackbone::new(2)).extract(&images);
        let chunked = FeatureExtractor::new(PooledBackbone::new(2)).with_chunk_size(2).extract(&images);

        assert!((&whole - &chunked).mapv(f64::abs).iter().all(|&e| e < 1e-12));
    }

    #[test]
    fn test_preprocess_normalizes_channels() {
        // A white image maps each channel to (1 - mean) / std
        let images = Array4::from_elem((1, 3, 2, 2), 255.0);
        let out = preprocess(&images);

        for c in 0..3 {
            let expected = (1.0 - CHANNEL_MEAN[c]) / CHANNEL_STD[c];
            assert!((out[[0, c, 0, 0]] - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn test_precomputed_features_batch() {
        let store = PrecomputedFeatures::from_array(arr2(&[[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]));

        let batch = store.batch(&[2, 0]);
        assert_eq!(batch.shape(), &[2, 2]);
        assert_eq!(batch[[0, 0]], 5.0);
        assert_eq!(batch[[1, 1]], 2.0);
    }
}

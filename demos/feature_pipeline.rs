use ndarray::{Array4, Axis};
use rust_captioning::features::{FeatureExtractor, PooledBackbone};

fn main() {
    // Synthetic batch of 4 RGB images, 112x112, raw 0..255 pixels
    let mut images = Array4::zeros((4, 3, 112, 112));
    for (i, v) in images.iter_mut().enumerate() {
        *v = ((i * 37) % 256) as f64;
    }

    let extractor = FeatureExtractor::new(PooledBackbone::new(4)).with_chunk_size(2);
    println!("Backbone feature dim: {}", extractor.feature_dim());

    let features = extractor.extract(&images);
    println!("Output feature shape: {:?}", features.shape());

    for (n, row) in features.axis_iter(Axis(0)).enumerate() {
        let norm = row.mapv(|v| v * v).sum().sqrt();
        println!("Image {}: feature norm {:.6}", n, norm);
    }
}

use ndarray::Array2;
use ndarray_rand::RandomExt;
use ndarray_rand::rand_distr::Uniform;
use rust_captioning::models::captioning::CaptioningRNN;
use rust_captioning::optimizers::Adam;
use rust_captioning::training::{CaptioningTrainer, TrainingConfig};
use rust_captioning::vocab::Vocabulary;

fn main() {
    // A toy dataset: two "images" (random feature vectors) with fixed captions.
    // A correct implementation should drive the loss close to zero and then
    // reproduce the captions from the features alone.
    let captions_text = ["a cat sat on the mat", "a dog ran in the park"];
    let vocab = Vocabulary::from_captions(captions_text);

    let input_dim = 16;
    let pad_to = 9;

    let features = Array2::random((2, input_dim), Uniform::new(-1.0, 1.0));
    let mut captions = Array2::zeros((2, pad_to));
    for (n, text) in captions_text.iter().enumerate() {
        let encoded = vocab.encode_caption(text, pad_to).expect("caption fits the padded length");
        for (t, &idx) in encoded.iter().enumerate() {
            captions[[n, t]] = idx;
        }
    }

    let model = CaptioningRNN::new(vocab.clone(), input_dim, 32, 64);
    println!("Model has {} parameters over a vocabulary of {} words", model.num_parameters(), vocab.size());

    let mut trainer = CaptioningTrainer::new(model, Adam::new(0.01)).with_config(TrainingConfig {
        epochs: 300,
        print_every: 50,
        clip_gradient: Some(5.0),
    });

    let data = vec![(features.clone(), captions)];
    trainer.train(&data, None);

    let sampled = trainer.model.sample(&features, pad_to - 1);
    for n in 0..2 {
        let row: Vec<usize> = sampled.row(n).to_vec();
        println!("Image {}: {:?}", n, trainer.model.vocab.decode(&row));
    }
}

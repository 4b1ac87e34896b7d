use ndarray::Array2;
use ndarray_rand::RandomExt;
use ndarray_rand::rand_distr::Uniform;
use rust_captioning::models::captioning::CaptioningRNN;
use rust_captioning::persistence::{ModelPersistence, PersistentModel};
use rust_captioning::training::create_basic_trainer;
use rust_captioning::vocab::Vocabulary;

fn main() {
    let captions_text = ["a bird flew over the lake"];
    let vocab = Vocabulary::from_captions(captions_text);

    let input_dim = 8;
    let pad_to = 9;

    let features = Array2::random((1, input_dim), Uniform::new(-1.0, 1.0));
    let encoded = vocab.encode_caption(captions_text[0], pad_to).expect("caption fits the padded length");
    let mut captions = Array2::zeros((1, pad_to));
    for (t, &idx) in encoded.iter().enumerate() {
        captions[[0, t]] = idx;
    }

    let model = CaptioningRNN::new(vocab, input_dim, 16, 32);
    let mut trainer = create_basic_trainer(model, 0.1);
    for _ in 0..200 {
        trainer.train_batch(&features, &captions);
    }

    // Round-trip the trained model through the binary format
    let dir = std::env::temp_dir().join("rust-captioning-demo");
    std::fs::create_dir_all(&dir).expect("temp dir");
    let path = dir.join("caption_model.bin");

    let metadata = ModelPersistence::create_metadata(&trainer.model, "demo".to_string(), 200, None, None);
    trainer.model.save(&path, metadata).expect("save model");
    let (mut restored, meta) = CaptioningRNN::load(&path).expect("load model");
    println!("Reloaded {} (saved {})", meta.model_name, meta.created_at);

    let greedy = restored.sample(&features, pad_to - 1);
    println!("Greedy:      {:?}", restored.vocab.decode(&greedy.row(0).to_vec()));

    for _ in 0..3 {
        let stochastic = restored.sample_with_temperature(&features, pad_to - 1, 0.8);
        println!("Temperature: {:?}", restored.vocab.decode(&stochastic.row(0).to_vec()));
    }
}

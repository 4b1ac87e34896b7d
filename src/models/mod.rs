/// Module for the full-sequence vanilla RNN.
pub mod rnn;

/// Module for the image captioning model.
pub mod captioning;

/// Module for the vanilla RNN cell.
pub mod rnn_cell;

/// Module for linear (fully connected) layers.
pub mod linear;

/// Module for word embedding layers.
pub mod embedding;

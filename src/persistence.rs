use serde::{Serialize, Deserialize};
use ndarray::{Array2, Dimension};
use std::fs::File;
use std::io::{Write, Read};
use std::path::Path;

use crate::layers::embedding::WordEmbedding;
use crate::layers::linear::LinearLayer;
use crate::layers::rnn_cell::RNNCell;
use crate::models::captioning::CaptioningRNN;
use crate::models::rnn::RNN;
use crate::vocab::{Vocabulary, VocabError};

/// Serializable version of Array2<f64> for persistence
#[derive(Serialize, Deserialize)]
struct SerializableArray2 {
    data: Vec<f64>,
    shape: (usize, usize),
}

impl From<&Array2<f64>> for SerializableArray2 {
    fn from(array: &Array2<f64>) -> Self {
        Self {
            data: array.iter().cloned().collect(),
            shape: array.raw_dim().into_pattern(),
        }
    }
}

impl SerializableArray2 {
    fn into_array(self) -> Result<Array2<f64>, PersistenceError> {
        Array2::from_shape_vec(self.shape, self.data)
            .map_err(|e| PersistenceError::SerializationError(e.to_string()))
    }
}

/// Serializable linear layer parameters
#[derive(Serialize, Deserialize)]
struct SerializableLinear {
    weight: SerializableArray2,
    bias: SerializableArray2,
}

impl From<&LinearLayer> for SerializableLinear {
    fn from(layer: &LinearLayer) -> Self {
        Self {
            weight: (&layer.weight).into(),
            bias: (&layer.bias).into(),
        }
    }
}

impl SerializableLinear {
    fn into_layer(self) -> Result<LinearLayer, PersistenceError> {
        Ok(LinearLayer::from_weights(self.weight.into_array()?, self.bias.into_array()?))
    }
}

/// Serializable RNN cell parameters
#[derive(Serialize, Deserialize)]
struct SerializableRNNCell {
    w_xh: SerializableArray2,
    w_hh: SerializableArray2,
    b: SerializableArray2,
}

impl From<&RNNCell> for SerializableRNNCell {
    fn from(cell: &RNNCell) -> Self {
        Self {
            w_xh: (&cell.w_xh).into(),
            w_hh: (&cell.w_hh).into(),
            b: (&cell.b).into(),
        }
    }
}

impl SerializableRNNCell {
    fn into_cell(self) -> Result<RNNCell, PersistenceError> {
        Ok(RNNCell::from_weights(
            self.w_xh.into_array()?,
            self.w_hh.into_array()?,
            self.b.into_array()?,
        ))
    }
}

/// Serializable captioning model: all parameter groups plus the
/// vocabulary tokens in index order
#[derive(Serialize, Deserialize)]
pub struct SerializableCaptioningRNN {
    vocab_tokens: Vec<String>,
    feature_proj: SerializableLinear,
    embedding: SerializableArray2,
    rnn: SerializableRNNCell,
    output_proj: SerializableLinear,
}

impl From<&CaptioningRNN> for SerializableCaptioningRNN {
    fn from(model: &CaptioningRNN) -> Self {
        Self {
            vocab_tokens: model.vocab.tokens().to_vec(),
            feature_proj: (&model.feature_proj).into(),
            embedding: (&model.embedding.weight).into(),
            rnn: (&model.rnn.cell).into(),
            output_proj: (&model.output_proj).into(),
        }
    }
}

impl SerializableCaptioningRNN {
    fn into_model(self) -> Result<CaptioningRNN, PersistenceError> {
        let vocab = Vocabulary::from_ordered_tokens(self.vocab_tokens)?;

        Ok(CaptioningRNN::from_parts(
            vocab,
            self.feature_proj.into_layer()?,
            WordEmbedding::from_weights(self.embedding.into_array()?),
            RNN::from_cell(self.rnn.into_cell()?),
            self.output_proj.into_layer()?,
        ))
    }
}

/// Model metadata for tracking training information
#[derive(Serialize, Deserialize, Clone)]
pub struct ModelMetadata {
    pub model_name: String,
    pub version: String,
    pub created_at: String,
    pub input_dim: usize,
    pub wordvec_dim: usize,
    pub hidden_dim: usize,
    pub vocab_size: usize,
    pub total_epochs: usize,
    pub final_loss: Option<f64>,
    pub description: Option<String>,
}

/// Complete saved model including parameters and metadata
#[derive(Serialize, Deserialize)]
pub struct SavedModel {
    pub model: SerializableCaptioningRNN,
    pub metadata: ModelMetadata,
}

/// Errors that can occur during model persistence operations
#[derive(Debug)]
pub enum PersistenceError {
    IoError(std::io::Error),
    SerializationError(String),
    VocabularyError(VocabError),
}

impl std::fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistenceError::IoError(err) => write!(f, "IO error: {}", err),
            PersistenceError::SerializationError(err) => write!(f, "Serialization error: {}", err),
            PersistenceError::VocabularyError(err) => write!(f, "Vocabulary error: {}", err),
        }
    }
}

impl std::error::Error for PersistenceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PersistenceError::IoError(err) => Some(err),
            PersistenceError::SerializationError(_) => None,
            PersistenceError::VocabularyError(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for PersistenceError {
    fn from(error: std::io::Error) -> Self {
        PersistenceError::IoError(error)
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(error: serde_json::Error) -> Self {
        PersistenceError::SerializationError(error.to_string())
    }
}

impl From<bincode::Error> for PersistenceError {
    fn from(error: bincode::Error) -> Self {
        PersistenceError::SerializationError(error.to_string())
    }
}

impl From<VocabError> for PersistenceError {
    fn from(error: VocabError) -> Self {
        PersistenceError::VocabularyError(error)
    }
}

/// Model persistence operations
pub struct ModelPersistence;

impl ModelPersistence {
    /// Save model to JSON format (human-readable)
    pub fn save_to_json<P: AsRef<Path>>(model: &SavedModel, path: P) -> Result<(), PersistenceError> {
        let json = serde_json::to_string_pretty(model)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }

    /// Load model from JSON format
    pub fn load_from_json<P: AsRef<Path>>(path: P) -> Result<SavedModel, PersistenceError> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        let model = serde_json::from_str(&contents)?;
        Ok(model)
    }

    /// Save model to binary format (compact and fast)
    pub fn save_to_binary<P: AsRef<Path>>(model: &SavedModel, path: P) -> Result<(), PersistenceError> {
        let encoded = bincode::serialize(model)?;
        let mut file = File::create(path)?;
        file.write_all(&encoded)?;
        Ok(())
    }

    /// Load model from binary format
    pub fn load_from_binary<P: AsRef<Path>>(path: P) -> Result<SavedModel, PersistenceError> {
        let mut file = File::open(path)?;
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;
        let model = bincode::deserialize(&contents)?;
        Ok(model)
    }

    /// Build the metadata block for a model about to be saved
    pub fn create_metadata(
        model: &CaptioningRNN,
        model_name: String,
        total_epochs: usize,
        final_loss: Option<f64>,
        description: Option<String>,
    ) -> ModelMetadata {
        ModelMetadata {
            model_name,
            version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            input_dim: model.input_dim,
            wordvec_dim: model.wordvec_dim,
            hidden_dim: model.hidden_dim,
            vocab_size: model.vocab.size(),
            total_epochs,
            final_loss,
            description,
        }
    }
}

/// Convenience trait for easy model saving/loading
pub trait PersistentModel {
    /// Save model to file (format determined by file extension)
    fn save<P: AsRef<Path>>(&self, path: P, metadata: ModelMetadata) -> Result<(), PersistenceError>;

    /// Load model from file (format determined by file extension)
    fn load<P: AsRef<Path>>(path: P) -> Result<(Self, ModelMetadata), PersistenceError>
    where
        Self: Sized;
}

impl PersistentModel for CaptioningRNN {
    fn save<P: AsRef<Path>>(&self, path: P, metadata: ModelMetadata) -> Result<(), PersistenceError> {
        let saved_model = SavedModel {
            model: self.into(),
            metadata,
        };

        match path.as_ref().extension().and_then(|s| s.to_str()) {
            Some("json") => ModelPersistence::save_to_json(&saved_model, path),
            _ => ModelPersistence::save_to_binary(&saved_model, path),
        }
    }

    fn load<P: AsRef<Path>>(path: P) -> Result<(Self, ModelMetadata), PersistenceError> {
        let saved_model = match path.as_ref().extension().and_then(|s| s.to_str()) {
            Some("json") => ModelPersistence::load_from_json(path)?,
            _ => ModelPersistence::load_from_binary(path)?,
        };

        Ok((saved_model.model.into_model()?, saved_model.metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use crate::vocab::Vocabulary;

    fn build_model() -> CaptioningRNN {
        let vocab = Vocabulary::from_captions(["a cat sat on a mat"]);
        CaptioningRNN::new(vocab, 6, 4, 5)
    }

    #[test]
    fn test_json_round_trip() {
        let mut model = build_model();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");

        let metadata = ModelPersistence::create_metadata(&model, "test".to_string(), 0, None, None);
        model.save(&path, metadata).unwrap();

        let (mut restored, meta) = CaptioningRNN::load(&path).unwrap();
        assert_eq!(meta.model_name, "test");
        assert_eq!(meta.vocab_size, model.vocab.size());

        // Restored parameters must produce identical sampling output
        let features = Array2::from_elem((2, 6), 0.3);
        assert_eq!(model.sample(&features, 6), restored.sample(&features, 6));
    }

    #[test]
    fn test_binary_round_trip() {
        let mut model = build_model();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.bin");

        let metadata = ModelPersistence::create_metadata(&model, "bin".to_string(), 12, Some(1.5), None);
        model.save(&path, metadata).unwrap();

        let (mut restored, meta) = CaptioningRNN::load(&path).unwrap();
        assert_eq!(meta.total_epochs, 12);
        assert_eq!(meta.final_loss, Some(1.5));
        assert_eq!(restored.vocab.tokens(), model.vocab.tokens());

        let features = Array2::from_elem((1, 6), -0.2);
        assert_eq!(model.sample(&features, 5), restored.sample(&features, 5));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let result = CaptioningRNN::load("does-not-exist.bin");
        assert!(matches!(result, Err(PersistenceError::IoError(_))));
    }
}

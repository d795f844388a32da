use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Read, Write},
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::{
    data::{ColumnInformation, DataSchema},
    error::{Error, Result},
    featurize::{TextFeaturizer, HASH_BITS},
    models::{Estimator, MulticlassTrainer},
};

const MAGIC: &[u8; 4] = b"GCLF";
const FORMAT_VERSION: u16 = 1;

/// A fitted text classifier together with everything needed to run it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModel {
    /// Columns of the data the model was fit on
    pub input_schema: DataSchema,

    /// Which columns are the label and the text features
    pub columns: ColumnInformation,

    /// Category names; score slot `i` belongs to `labels[i]`
    pub labels: Vec<String>,

    /// The featurizer the estimator was fit against
    pub featurizer: TextFeaturizer,

    /// The fitted estimator
    pub estimator: Estimator,

    /// The trainer that produced the estimator
    pub trainer: MulticlassTrainer,
}

/// Borrowed view of the manifest, so a different schema can be written without cloning weights
#[derive(Serialize)]
struct Manifest<'a> {
    input_schema: &'a DataSchema,
    columns: &'a ColumnInformation,
    labels: &'a [String],
    featurizer: &'a TextFeaturizer,
    estimator: &'a Estimator,
    trainer: MulticlassTrainer,
}

impl TrainedModel {
    /// The categories the model predicts, in score slot order
    pub fn categories(&self) -> &[String] {
        &self.labels
    }

    /// Write the model artifact to a stream
    pub fn save<W: Write>(&self, writer: W) -> Result<()> {
        self.save_with_schema(writer, &self.input_schema)
    }

    /// Write the model artifact to a file, replacing it if it exists
    pub fn save_file(&self, path: impl AsRef<Path>) -> Result<()> {
        self.save(BufWriter::new(File::create(path)?))
    }

    /// Write the model artifact, recording `schema` as its input schema
    pub(crate) fn save_with_schema<W: Write>(&self, mut writer: W, schema: &DataSchema) -> Result<()> {
        let manifest = serde_json::to_vec(&Manifest {
            input_schema: schema,
            columns: &self.columns,
            labels: &self.labels,
            featurizer: &self.featurizer,
            estimator: &self.estimator,
            trainer: self.trainer,
        })?;

        let manifest_len = u32::try_from(manifest.len())
            .map_err(|_| Error::CorruptModel("manifest is too large".to_string()))?;
        let weights = self.estimator.weights();

        writer.write_all(MAGIC)?;
        writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
        writer.write_all(&manifest_len.to_le_bytes())?;
        writer.write_all(&manifest)?;
        writer.write_all(&(weights.len() as u64).to_le_bytes())?;
        writer.write_all(weights)?;
        writer.flush()?;

        log::debug!(
            "Saved model: {} byte manifest, {} byte weights",
            manifest.len(),
            weights.len()
        );

        Ok(())
    }

    /// Read a model artifact from a stream
    pub fn load<R: Read>(mut reader: R) -> Result<Self> {
        let mut magic = [0u8; 4];
        read_section(&mut reader, &mut magic, "header")?;
        if &magic != MAGIC {
            return Err(Error::CorruptModel("not a model artifact".to_string()));
        }

        let mut version = [0u8; 2];
        read_section(&mut reader, &mut version, "header")?;
        let version = u16::from_le_bytes(version);
        if version != FORMAT_VERSION {
            return Err(Error::CorruptModel(format!(
                "unsupported format version {version}"
            )));
        }

        let mut manifest_len = [0u8; 4];
        read_section(&mut reader, &mut manifest_len, "manifest length")?;
        let manifest = read_blob(&mut reader, u32::from_le_bytes(manifest_len) as u64, "manifest")?;

        let mut model: TrainedModel = serde_json::from_slice(&manifest)
            .map_err(|err| Error::CorruptModel(format!("invalid manifest: {err}")))?;

        let mut weights_len = [0u8; 8];
        read_section(&mut reader, &mut weights_len, "weights length")?;
        let weights = read_blob(&mut reader, u64::from_le_bytes(weights_len), "weights")?;

        model.estimator.set_weights(weights)?;
        model.check()?;

        Ok(model)
    }

    /// Read a model artifact from a file
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::load(BufReader::new(File::open(path)?))
    }

    /// Consistency checks on a freshly loaded model
    fn check(&self) -> Result<()> {
        if self.labels.is_empty() {
            return Err(Error::CorruptModel("model has no categories".to_string()));
        }

        if self.estimator.n_classes() != self.labels.len() {
            return Err(Error::CorruptModel(format!(
                "estimator scores {} classes but the model names {}",
                self.estimator.n_classes(),
                self.labels.len()
            )));
        }

        if !HASH_BITS.contains(&self.featurizer.hash_bits) {
            return Err(Error::CorruptModel(format!(
                "hash_bits {} is outside {HASH_BITS:?}",
                self.featurizer.hash_bits
            )));
        }

        match self.estimator.d_input() {
            Some(width) if width == self.featurizer.dim() => {}
            Some(width) => {
                return Err(Error::CorruptModel(format!(
                    "estimator reads {width} features but the featurizer produces {}",
                    self.featurizer.dim()
                )))
            }
            None => {
                return Err(Error::CorruptModel(
                    "estimator weight rows have inconsistent widths".to_string(),
                ))
            }
        }

        self.estimator
            .scorer()
            .map_err(|err| Error::CorruptModel(format!("unusable weights: {err}")))?;

        Ok(())
    }
}

fn read_section<R: Read>(reader: &mut R, buf: &mut [u8], section: &str) -> Result<()> {
    reader.read_exact(buf).map_err(|err| truncated(err, section))
}

fn read_blob<R: Read>(reader: &mut R, len: u64, section: &str) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader
        .take(len)
        .read_to_end(&mut buf)
        .map_err(|err| truncated(err, section))?;

    if buf.len() as u64 != len {
        return Err(Error::CorruptModel(format!("truncated {section}")));
    }

    Ok(buf)
}

fn truncated(err: io::Error, section: &str) -> Error {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        Error::CorruptModel(format!("truncated {section}"))
    } else {
        Error::Io(err)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use pretty_assertions::assert_eq;

    use crate::models::{NaiveBayes, NaiveBayesConfig};

    use super::*;

    /// A small naive Bayes model over two categories
    pub(crate) fn model() -> TrainedModel {
        TrainedModel {
            input_schema: DataSchema {
                columns: vec!["label".to_string(), "text".to_string()],
            },
            columns: ColumnInformation::new("label").with_text_column("text"),
            labels: vec!["Games".to_string(), "Music".to_string()],
            featurizer: TextFeaturizer::new().with_hash_bits(4),
            estimator: Estimator::NaiveBayes(NaiveBayes {
                log_priors: vec![0.5f32.ln(), 0.5f32.ln()],
                log_likelihoods: vec![vec![(1.0f32 / 16.0).ln(); 16]; 2],
            }),
            trainer: MulticlassTrainer::NaiveBayes,
        }
    }

    fn saved(model: &TrainedModel) -> Vec<u8> {
        let mut bytes = Vec::new();
        model.save(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn artifacts_round_trip_through_a_stream() {
        let model = model();

        let loaded = TrainedModel::load(saved(&model).as_slice()).unwrap();

        assert_eq!(loaded.labels, model.labels);
        assert_eq!(loaded.input_schema, model.input_schema);
        assert_eq!(loaded.featurizer, model.featurizer);
        assert_eq!(loaded.trainer, MulticlassTrainer::NaiveBayes);
    }

    #[test]
    fn artifacts_round_trip_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.zip");

        model().save_file(&path).unwrap();
        let loaded = TrainedModel::load_file(&path).unwrap();

        assert_eq!(loaded.categories(), ["Games", "Music"]);
    }

    #[test]
    fn missing_files_are_io_errors() {
        let dir = tempfile::tempdir().unwrap();

        let result = TrainedModel::load_file(dir.path().join("missing.zip"));

        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn wrong_magic_is_corrupt() {
        let mut bytes = saved(&model());
        bytes[0] = b'X';

        assert!(matches!(
            TrainedModel::load(bytes.as_slice()),
            Err(Error::CorruptModel(_))
        ));
    }

    #[test]
    fn unsupported_versions_are_corrupt() {
        let mut bytes = saved(&model());
        bytes[4] = 9;

        assert!(matches!(
            TrainedModel::load(bytes.as_slice()),
            Err(Error::CorruptModel(_))
        ));
    }

    #[test]
    fn truncated_artifacts_are_corrupt() {
        let bytes = saved(&model());

        for len in [0, 3, 7, 20, bytes.len() - 1] {
            assert!(
                matches!(
                    TrainedModel::load(&bytes[..len]),
                    Err(Error::CorruptModel(_))
                ),
                "prefix of {len} bytes"
            );
        }
    }

    #[test]
    fn mismatched_class_counts_are_corrupt() {
        let mut model = model();
        model.labels.push("Coffee".to_string());

        assert!(matches!(
            TrainedModel::load(saved(&model).as_slice()),
            Err(Error::CorruptModel(_))
        ));
    }

    #[test]
    fn mismatched_feature_width_is_corrupt() {
        // 64 slots over 16-slot likelihoods
        let model = TrainedModel {
            featurizer: TextFeaturizer::new().with_hash_bits(6),
            ..model()
        };

        assert!(matches!(
            TrainedModel::load(saved(&model).as_slice()),
            Err(Error::CorruptModel(_))
        ));
    }

    #[test]
    fn out_of_range_hash_bits_are_corrupt() {
        for hash_bits in [0, 64] {
            let model = TrainedModel {
                featurizer: TextFeaturizer::new().with_hash_bits(hash_bits),
                ..model()
            };

            assert!(matches!(
                TrainedModel::load(saved(&model).as_slice()),
                Err(Error::CorruptModel(_))
            ));
        }
    }

    #[test]
    fn ragged_weight_rows_are_corrupt() {
        let mut model = model();
        if let Estimator::NaiveBayes(nb) = &mut model.estimator {
            nb.log_likelihoods[1].pop();
        }

        assert!(matches!(
            TrainedModel::load(saved(&model).as_slice()),
            Err(Error::CorruptModel(_))
        ));
    }

    #[test]
    fn save_can_record_a_different_schema() {
        let schema = DataSchema {
            columns: vec!["col0".to_string(), "col1".to_string()],
        };
        let mut bytes = Vec::new();

        model().save_with_schema(&mut bytes, &schema).unwrap();

        assert_eq!(TrainedModel::load(bytes.as_slice()).unwrap().input_schema, schema);
    }

    #[test]
    fn fitted_models_load_back() {
        let featurizer = TextFeaturizer::new().with_hash_bits(4);
        let examples = vec![crate::models::Example::new(featurizer.featurize(&["a"]), 0)];
        let estimator = NaiveBayesConfig::new()
            .fit(&examples, 1, featurizer.dim())
            .unwrap();

        let model = TrainedModel {
            labels: vec!["Only".to_string()],
            estimator: Estimator::NaiveBayes(estimator),
            featurizer,
            ..model()
        };

        assert!(TrainedModel::load(saved(&model).as_slice()).is_ok());
    }
}

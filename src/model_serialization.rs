// ============================================================================
// 模型序列化模块 - 支持二进制和 JSON 两种格式
// ============================================================================
//
// 保存的内容: 词汇表 + 所有层的权重 + 维度元数据。
//
// 1. **二进制格式** (推荐用于部署):
//    - 使用 bincode 序列化,文件小、速度快
//    - 文件扩展名: .bin
//
// 2. **JSON 格式** (推荐用于调试):
//    - 人类可读,方便检查权重
//    - 文件扩展名: .json
//
// Adam 的动量不保存: 加载后的模型用于推理,或作为新一轮训练的起点。
//
// ============================================================================

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use bincode::{Decode, Encode};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::{
    embeddings::Embeddings,
    error::{ChatError, Result},
    lstm::LstmCell,
    model::Seq2Seq,
    output_projection::OutputProjection,
    recurrent::{RecurrentLayer, RecurrentStack},
    vocab::Vocab,
};

pub const FORMAT_VERSION: u32 = 1;

// ============================================================================
// 矩阵
// ============================================================================

#[derive(Clone, Debug, Encode, Decode, Serialize, Deserialize)]
pub struct SerializableMatrix {
    pub shape: (usize, usize),
    pub data: Vec<f32>,
}

impl SerializableMatrix {
    /// 非有限值写成 0，JSON 无法表示 NaN/Inf
    pub fn from_array(array: &Array2<f32>) -> Self {
        Self {
            shape: array.dim(),
            data: array
                .iter()
                .map(|&x| if x.is_finite() { x } else { 0.0 })
                .collect(),
        }
    }

    pub fn to_array(&self) -> Result<Array2<f32>> {
        Array2::from_shape_vec(self.shape, self.data.clone()).map_err(|e| {
            ChatError::ShapeMismatch {
                expected: format!("{:?} matrix", self.shape),
                got: format!("{} values ({e})", self.data.len()),
            }
        })
    }
}

// ============================================================================
// 循环层
// ============================================================================

#[derive(Clone, Debug, Encode, Decode, Serialize, Deserialize)]
pub struct SerializableLstmCell {
    pub w_ih: SerializableMatrix,
    pub w_hh: SerializableMatrix,
    pub bias: SerializableMatrix,
}

#[derive(Clone, Debug, Encode, Decode, Serialize, Deserialize)]
pub enum SerializableRecurrent {
    Lstm(SerializableLstmCell),
}

impl SerializableRecurrent {
    pub fn to_layer(&self) -> Result<Box<dyn RecurrentLayer>> {
        match self {
            SerializableRecurrent::Lstm(s) => {
                let w_ih = s.w_ih.to_array()?;
                let w_hh = s.w_hh.to_array()?;
                let bias = s.bias.to_array()?;

                let gates = 4 * w_hh.nrows();
                if w_hh.ncols() != gates || w_ih.ncols() != gates || bias.dim() != (1, gates) {
                    return Err(ChatError::ShapeMismatch {
                        expected: format!("LSTM gate width {gates}"),
                        got: format!(
                            "w_ih {:?}, w_hh {:?}, bias {:?}",
                            w_ih.dim(),
                            w_hh.dim(),
                            bias.dim()
                        ),
                    });
                }
                Ok(Box::new(LstmCell::from_weights(w_ih, w_hh, bias)))
            }
        }
    }
}

// ============================================================================
// 完整模型
// ============================================================================

#[derive(Clone, Debug, Encode, Decode, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub embedding_dim: usize,
    pub hidden_dim: usize,
    pub num_layers: usize,
    pub vocab_size: usize,
}

#[derive(Clone, Debug, Encode, Decode, Serialize, Deserialize)]
pub struct SerializableModel {
    pub version: u32,
    pub vocab: Vocab,
    pub metadata: ModelMetadata,
    pub embeddings: SerializableMatrix,
    pub encoder: Vec<SerializableRecurrent>,
    pub decoder: Vec<SerializableRecurrent>,
    pub output_w: SerializableMatrix,
    pub output_b: SerializableMatrix,
}

impl SerializableModel {
    pub fn from_model(model: &Seq2Seq, vocab: &Vocab) -> Self {
        Self {
            version: FORMAT_VERSION,
            vocab: vocab.clone(),
            metadata: ModelMetadata {
                embedding_dim: model.embeddings.embedding_dim(),
                hidden_dim: model.hidden_size(),
                num_layers: model.encoder.num_layers(),
                vocab_size: model.vocab_size(),
            },
            embeddings: SerializableMatrix::from_array(&model.embeddings.token_embeddings),
            encoder: model
                .encoder
                .layers
                .iter()
                .map(|layer| layer.to_serializable())
                .collect(),
            decoder: model
                .decoder
                .layers
                .iter()
                .map(|layer| layer.to_serializable())
                .collect(),
            output_w: SerializableMatrix::from_array(&model.output_projection.w_out),
            output_b: SerializableMatrix::from_array(&model.output_projection.b_out),
        }
    }

    /// 重建模型并检查各层维度是否首尾相接
    pub fn into_model(self) -> Result<(Seq2Seq, Vocab)> {
        if self.version != FORMAT_VERSION {
            return Err(ChatError::Serialization(format!(
                "unsupported model format version {}",
                self.version
            )));
        }

        let meta = &self.metadata;
        let embeddings = Embeddings::from_weights(self.embeddings.to_array()?);
        let encoder = build_stack("Encoder", &self.encoder, meta.embedding_dim, meta)?;
        let decoder = build_stack("Decoder", &self.decoder, meta.hidden_dim, meta)?;
        let output_projection =
            OutputProjection::from_weights(self.output_w.to_array()?, self.output_b.to_array()?);

        expect_dim(
            "embedding matrix",
            (meta.vocab_size, meta.embedding_dim),
            embeddings.token_embeddings.dim(),
        )?;
        expect_dim(
            "output weights",
            (meta.hidden_dim, meta.vocab_size),
            output_projection.w_out.dim(),
        )?;
        expect_dim("output bias", (1, meta.vocab_size), output_projection.b_out.dim())?;
        let vocab = verified_vocab(self.vocab)?;
        if vocab.len() != meta.vocab_size {
            return Err(ChatError::ShapeMismatch {
                expected: format!("vocabulary of {}", meta.vocab_size),
                got: vocab.len().to_string(),
            });
        }

        let model = Seq2Seq {
            embeddings,
            encoder,
            decoder,
            output_projection,
        };
        Ok((model, vocab))
    }
}

/// 文件里的词表不可信：从 `encode` 重建，并要求与存储的 `words`/`decode` 一致
fn verified_vocab(stored: Vocab) -> Result<Vocab> {
    let rebuilt = Vocab::from_mapping(stored.encode)?;
    let decode_matches = stored.decode.len() == rebuilt.len()
        && rebuilt
            .words
            .iter()
            .enumerate()
            .all(|(id, word)| stored.decode.get(&id) == Some(word));
    if rebuilt.words != stored.words || !decode_matches {
        return Err(ChatError::VocabNotBijective(
            "stored word list disagrees with token ids".to_string(),
        ));
    }
    Ok(rebuilt)
}

fn expect_dim(what: &str, expected: (usize, usize), got: (usize, usize)) -> Result<()> {
    if expected == got {
        Ok(())
    } else {
        Err(ChatError::ShapeMismatch {
            expected: format!("{what} {expected:?}"),
            got: format!("{got:?}"),
        })
    }
}

fn build_stack(
    name: &str,
    layers: &[SerializableRecurrent],
    input_size: usize,
    meta: &ModelMetadata,
) -> Result<RecurrentStack> {
    if layers.len() != meta.num_layers {
        return Err(ChatError::ShapeMismatch {
            expected: format!("{name} with {} layers", meta.num_layers),
            got: layers.len().to_string(),
        });
    }

    let mut expected_input = input_size;
    let mut built = Vec::with_capacity(layers.len());
    for layer in layers {
        let layer = layer.to_layer()?;
        if layer.input_size() != expected_input || layer.hidden_size() != meta.hidden_dim {
            return Err(ChatError::ShapeMismatch {
                expected: format!("{name} layer {expected_input} → {}", meta.hidden_dim),
                got: format!("{} → {}", layer.input_size(), layer.hidden_size()),
            });
        }
        expected_input = meta.hidden_dim;
        built.push(layer);
    }
    Ok(RecurrentStack::from_layers(name, built))
}

fn log_loaded(model: &Seq2Seq, vocab: &Vocab) {
    log::info!(
        "模型加载成功: 词汇量 {}, 网络 [{}], 总参数量 {}",
        vocab.len(),
        model.network_description(),
        model.total_parameters()
    );
}

// ============================================================================
// 主要 API
// ============================================================================

/// 保存模型到二进制文件
pub fn save_model_binary<P: AsRef<Path>>(model: &Seq2Seq, vocab: &Vocab, path: P) -> Result<()> {
    let serializable_model = SerializableModel::from_model(model, vocab);

    let file = File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);
    let config = bincode::config::standard();
    bincode::encode_into_std_write(&serializable_model, &mut writer, config)
        .map_err(|e| ChatError::Serialization(e.to_string()))?;

    let file_size = std::fs::metadata(path.as_ref())?.len();
    log::info!(
        "模型已保存: {} ({:.2} MB)",
        path.as_ref().display(),
        file_size as f64 / 1_048_576.0
    );
    Ok(())
}

/// 从二进制文件加载模型
pub fn load_model_binary<P: AsRef<Path>>(path: P) -> Result<(Seq2Seq, Vocab)> {
    let file = File::open(path.as_ref())?;
    let mut reader = BufReader::new(file);
    let config = bincode::config::standard();
    let serializable_model: SerializableModel = bincode::decode_from_std_read(&mut reader, config)
        .map_err(|e| ChatError::Serialization(e.to_string()))?;

    let (model, vocab) = serializable_model.into_model()?;
    log_loaded(&model, &vocab);
    Ok((model, vocab))
}

/// 保存模型到 JSON 文件
pub fn save_model_json<P: AsRef<Path>>(model: &Seq2Seq, vocab: &Vocab, path: P) -> Result<()> {
    let serializable_model = SerializableModel::from_model(model, vocab);

    let file = File::create(path.as_ref())?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, &serializable_model)
        .map_err(|e| ChatError::Serialization(e.to_string()))?;

    log::info!("模型已保存: {}", path.as_ref().display());
    Ok(())
}

/// 从 JSON 文件加载模型
pub fn load_model_json<P: AsRef<Path>>(path: P) -> Result<(Seq2Seq, Vocab)> {
    let file = File::open(path.as_ref())?;
    let reader = BufReader::new(file);
    let serializable_model: SerializableModel = serde_json::from_reader(reader)
        .map_err(|e| ChatError::Serialization(e.to_string()))?;

    let (model, vocab) = serializable_model.into_model()?;
    log_loaded(&model, &vocab);
    Ok((model, vocab))
}

/// 按扩展名选择格式：`.json` 走 JSON，其余按二进制处理
pub fn load_model_auto<P: AsRef<Path>>(path: P) -> Result<(Seq2Seq, Vocab)> {
    if is_json(path.as_ref()) {
        load_model_json(path)
    } else {
        load_model_binary(path)
    }
}

pub fn save_model_auto<P: AsRef<Path>>(model: &Seq2Seq, vocab: &Vocab, path: P) -> Result<()> {
    if is_json(path.as_ref()) {
        save_model_json(model, vocab, path)
    } else {
        save_model_binary(model, vocab, path)
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
}

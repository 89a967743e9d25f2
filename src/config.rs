//! # 运行配置（Configuration）
//!
//! 所有路径和超参数集中在一个结构体里，由 JSON 文件加载，缺省字段取默认值：
//!
//! ```json
//! {
//!   "data": { "vocab_path": "vocab.json", "corpus_dir": "data" },
//!   "model": { "embedding_dim": 300, "hidden_dim": 512 },
//!   "training": { "epochs": 10, "learning_rate": 0.001 },
//!   "seed": 42
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    DEFAULT_MAX_REPLY_LEN, EMBEDDING_DIM, HIDDEN_DIM, NUM_RECURRENT_LAYERS,
    error::{ChatError, Result},
    vocab::UnknownTokenPolicy,
};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub model: ModelConfig,
    pub training: TrainingConfig,
    pub sampling: SamplingConfig,
    /// 固定随机种子；为空时从操作系统熵源初始化
    pub seed: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub vocab_path: PathBuf,
    pub corpus_dir: PathBuf,
    pub model_path: Option<PathBuf>,
    /// 语料中出现词表外的词时如何处理
    pub unknown_tokens: UnknownTokenPolicy,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            vocab_path: PathBuf::from("vocab.json"),
            corpus_dir: PathBuf::from("data"),
            model_path: None,
            unknown_tokens: UnknownTokenPolicy::Reject,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub embedding_dim: usize,
    pub hidden_dim: usize,
    pub num_layers: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            embedding_dim: EMBEDDING_DIM,
            hidden_dim: HIDDEN_DIM,
            num_layers: NUM_RECURRENT_LAYERS,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub learning_rate: f32,
    /// 每个 epoch 结束后学习率乘以该系数
    pub lr_decay: f32,
    pub grad_clip: f32,
    pub shuffle: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 10,
            learning_rate: 0.001,
            lr_decay: 0.95,
            grad_clip: 5.0,
            shuffle: false,
        }
    }
}

impl TrainingConfig {
    /// epoch 从 0 开始计数
    pub fn learning_rate_at(&self, epoch: usize) -> f32 {
        self.learning_rate * self.lr_decay.powi(epoch as i32)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub max_length: usize,
    pub temperature: f32,
    /// 词表中存在 `</s>` 时遇到即停止生成
    pub stop_at_eos: bool,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            max_length: DEFAULT_MAX_REPLY_LEN,
            temperature: 1.0,
            stop_at_eos: true,
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| ChatError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let config: Config = serde_json::from_str(&raw).map_err(|e| ChatError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        let invalid = |reason: &str| ChatError::Config {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };
        if self.model.embedding_dim == 0 || self.model.hidden_dim == 0 {
            return Err(invalid("embedding_dim and hidden_dim must be positive"));
        }
        if self.model.num_layers == 0 {
            return Err(invalid("num_layers must be at least 1"));
        }
        if !(self.training.learning_rate > 0.0) {
            return Err(invalid("learning_rate must be positive"));
        }
        if !(self.training.lr_decay > 0.0 && self.training.lr_decay <= 1.0) {
            return Err(invalid("lr_decay must be in (0, 1]"));
        }
        if !(self.sampling.temperature > 0.0) {
            return Err(invalid("temperature must be positive"));
        }
        Ok(())
    }
}

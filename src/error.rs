use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    // --- 词汇表 ---
    #[error("Failed to read vocabulary {path}: {source}")]
    VocabRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to decode vocabulary {path}: {source}")]
    VocabDecode {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Vocabulary is not a dense bijection: {0}")]
    VocabNotBijective(String),

    // --- 语料 ---
    #[error("Failed to read corpus {path}: {source}")]
    CorpusRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed example {path}: {reason}")]
    MalformedExample { path: PathBuf, reason: String },

    #[error("Unknown token `{0}`")]
    UnknownToken(String),

    // --- 模型 ---
    #[error("Token id {id} out of range (vocab size {vocab_size})")]
    TokenOutOfRange { id: usize, vocab_size: usize },

    #[error("Prompt is empty")]
    EmptyPrompt,

    #[error("Shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: String, got: String },

    #[error("Model serialization failed: {0}")]
    Serialization(String),

    // --- 配置 ---
    #[error("Invalid config {path}: {reason}")]
    Config { path: PathBuf, reason: String },

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ChatError>;

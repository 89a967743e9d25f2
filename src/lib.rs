//! # lstm-chat - 从零实现的 LSTM 序列到序列聊天模型
//!
//! 一个词级别的对话生成器：读入一句话，逐词采样生成回复。
//!
//! ## 核心设计理念
//!
//! 1. **纯 Rust 实现**：只使用 `ndarray` 进行矩阵运算，前向和反向传播全部手写
//! 2. **显式状态**：LSTM 的 (h, c) 由调用方持有并传入，模型本身在推理时只读
//! 3. **可复现**：所有随机性都来自调用方传入的随机数生成器
//!
//! ```text
//! token id → Embeddings → Encoder(2×LSTM) → Decoder(2×LSTM) → OutputProjection → softmax
//! ```
//!
//! ## 模块组织
//!
//! ### 模型组件
//! - `model`: 序列到序列模型，单步前向传播与 BPTT
//! - `embeddings`: 词嵌入层
//! - `lstm` / `recurrent`: LSTM 单元与多层循环堆栈
//! - `output_projection`: 输出投影层（映射到词汇表）
//!
//! ### 训练与推理
//! - `trainer`: 训练循环（Adam + 每个 epoch 指数衰减的学习率）
//! - `sampler`: 自回归采样
//! - `chat`: 面向消息的对话接口
//!
//! ### 工具模块
//! - `vocab`: 词汇表
//! - `dataset_loader`: 训练语料加载
//! - `adam`: Adam 优化器
//! - `config`: 运行配置
//! - `model_serialization`: 模型保存和加载
//! - `error`: 错误类型
//! - `utils`: 通用工具函数

// ============================================================================
// 模块声明
// ============================================================================

pub mod adam; // Adam 优化器
pub mod chat; // 对话接口：消息 → 回复
pub mod config; // 运行配置
pub mod dataset_loader; // 语料加载：每个文件一个样本
pub mod embeddings; // 嵌入层：token ID → 稠密向量
pub mod error;
pub mod lstm; // LSTM 单元
pub mod model; // 序列到序列模型
pub mod model_serialization; // 模型序列化：保存和加载模型权重
pub mod output_projection; // 输出投影层：隐藏状态 → 词汇表概率
pub mod recurrent; // 循环网络堆栈
pub mod sampler; // 自回归采样
pub mod trainer; // 训练循环
pub mod utils; // 工具函数
pub mod vocab; // 词汇表：token 与 ID 的双向映射

// ============================================================================
// 重导出核心类型（简化外部使用）
// ============================================================================

pub use chat::ChatBot;
pub use config::Config;
pub use dataset_loader::{Dataset, Example};
pub use embeddings::Embeddings;
pub use error::{ChatError, Result};
pub use model::{Layer, Seq2Seq};
pub use model_serialization::{
    load_model_auto, load_model_binary, load_model_json, save_model_auto, save_model_binary,
    save_model_json,
};
pub use output_projection::OutputProjection;
pub use recurrent::{RecurrentState, StackState};
pub use sampler::{Sampler, sample_categorical};
pub use trainer::{Trainer, TrainingReport};
pub use utils::seeded_rng;
pub use vocab::{UnknownTokenPolicy, Vocab};

// ============================================================================
// 模型超参数（Model Hyperparameters）
// ============================================================================

/// **嵌入维度 (Embedding Dimension)**
///
/// 每个词被表示为一个 300 维的向量，也是编码器第 1 层 LSTM 的输入维度。
pub const EMBEDDING_DIM: usize = 300;

/// **隐藏层维度 (Hidden Dimension)**
///
/// 编码器、解码器每一层 LSTM 的 h 和 c 的长度。
/// 解码器第 1 层的输入是编码器最上层的输出，所以同样是这个维度。
pub const HIDDEN_DIM: usize = 512;

/// 编码器和解码器各自的 LSTM 层数
pub const NUM_RECURRENT_LAYERS: usize = 2;

/// **单条回复的最大词数**
pub const DEFAULT_MAX_REPLY_LEN: usize = 20;

// ============================================================================
// 数值稳定性常量 (Numerical Stability Constants)
// ============================================================================

/// **对数运算专用常量**
///
/// 计算交叉熵损失时对概率取对数，log(0) = -∞，所以先截断到这个下限：
///
/// ```text
/// loss = -max(p, LOG_EPSILON).ln()
/// ```
pub const LOG_EPSILON: f32 = 1e-10;

/// **Softmax 归一化专用常量**
///
/// softmax 分母的下限，同时也是采样时判断"概率总质量近似为零"的阈值。
pub const SOFTMAX_EPSILON: f32 = 1e-12;

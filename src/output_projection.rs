//! # 输出投影层（Output Projection Layer）
//!
//! 模型的最后一层：把解码器最上层的隐藏向量投影到词汇表空间，再经 softmax 得到概率分布。
//!
//! ```text
//! 完整的预测流程:
//! 1. 输出投影: hidden (H) → logits (V)  = hidden · W + b
//! 2. Softmax:  logits → probs（非负，总和为1）
//! 3. 采样:     probs → token_id
//! ```
//!
//! softmax 先减去最大 logit 再取指数，大数值输入也不会溢出。

use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::Rng;

use crate::{
    adam::Adam,
    model::Layer,
    utils::{outer, softmax, xavier_normal},
};

pub struct OutputProjection {
    /// **权重矩阵** W: (hidden_dim, vocab_size)
    pub w_out: Array2<f32>,

    /// **偏置向量** b: (1, vocab_size)
    pub b_out: Array2<f32>,

    pub grad_w_out: Array2<f32>,
    pub grad_b_out: Array2<f32>,

    pub optimizer_w: Adam,
    pub optimizer_b: Adam,
}

impl OutputProjection {
    /// **创建新的输出投影层**
    ///
    /// 权重使用 Xavier 初始化，偏置全零。
    pub fn new<R: Rng + ?Sized>(hidden_dim: usize, vocab_size: usize, rng: &mut R) -> Self {
        Self::from_weights(
            xavier_normal(rng, (hidden_dim, vocab_size)),
            Array2::zeros((1, vocab_size)),
        )
    }

    pub fn from_weights(w_out: Array2<f32>, b_out: Array2<f32>) -> Self {
        OutputProjection {
            grad_w_out: Array2::zeros(w_out.dim()),
            grad_b_out: Array2::zeros(b_out.dim()),
            optimizer_w: Adam::new(w_out.dim()),
            optimizer_b: Adam::new(b_out.dim()),
            w_out,
            b_out,
        }
    }

    pub fn vocab_size(&self) -> usize {
        self.w_out.ncols()
    }

    /// logits = hidden · W + b
    pub fn logits(&self, hidden: ArrayView1<f32>) -> Array1<f32> {
        hidden.dot(&self.w_out) + &self.b_out.row(0)
    }

    /// **前向传播**：hidden → 概率分布
    pub fn forward(&self, hidden: ArrayView1<f32>) -> Array1<f32> {
        softmax(self.logits(hidden).view())
    }

    /// **反向传播**
    ///
    /// ```text
    /// grad_W += hidden ⊗ grad_logits
    /// grad_b += grad_logits
    /// grad_hidden = W · grad_logits
    /// ```
    pub fn backward(&mut self, hidden: ArrayView1<f32>, grad_logits: &Array1<f32>) -> Array1<f32> {
        self.grad_w_out += &outer(hidden, grad_logits.view());
        self.grad_b_out += &grad_logits.view().insert_axis(Axis(0));
        self.w_out.dot(grad_logits)
    }
}

impl Layer for OutputProjection {
    fn layer_type(&self) -> &str {
        "OutputProjection"
    }

    /// 返回: hidden_dim × vocab_size + vocab_size
    fn parameters(&self) -> usize {
        self.w_out.len() + self.b_out.len()
    }

    fn zero_grad(&mut self) {
        self.grad_w_out.fill(0.0);
        self.grad_b_out.fill(0.0);
    }

    fn apply_gradients(&mut self, lr: f32) {
        self.optimizer_w.step(&mut self.w_out, &self.grad_w_out, lr);
        self.optimizer_b.step(&mut self.b_out, &self.grad_b_out, lr);
    }
}

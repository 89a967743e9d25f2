//! # 词嵌入层（Embeddings Layer）
//!
//! 模型的输入层，把离散的 token ID 转换为稠密向量：
//!
//! ```text
//! "hi"    → id 0 → [0.23, -0.45, 0.67, ..., 0.12]  (embedding_dim 维)
//! "there" → id 1 → [-0.31, 0.52, -0.18, ..., 0.87]
//! ```
//!
//! 本质是一次查表：嵌入矩阵 (vocab_size × embedding_dim) 的第 id 行。
//! 循环网络逐步消费输入，顺序信息由隐藏状态携带，所以这里不加位置编码。
//!
//! ## 越界处理
//!
//! id 不在 `[0, vocab_size)` 内属于调用方的契约错误，返回
//! [`ChatError::TokenOutOfRange`]，绝不回退到某个默认向量。

use ndarray::{Array1, Array2, ArrayView1};
use rand::Rng;

use crate::{
    adam::Adam,
    error::{ChatError, Result},
    model::Layer,
    utils::xavier_normal,
};

pub struct Embeddings {
    /// **词嵌入矩阵** (vocab_size × embedding_dim)
    ///
    /// 每一行是一个词的向量表示，训练过程中不断更新。
    pub token_embeddings: Array2<f32>,

    /// **梯度累积** 与嵌入矩阵同形状
    ///
    /// 一个样本内同一个 id 出现多次时梯度在这里相加。
    pub grad: Array2<f32>,

    pub token_optimizer: Adam,
}

impl Embeddings {
    /// **创建新的嵌入层**
    ///
    /// 使用 Xavier 正态分布初始化，结果只由传入的 rng 决定。
    pub fn new<R: Rng + ?Sized>(vocab_size: usize, embedding_dim: usize, rng: &mut R) -> Self {
        Self::from_weights(xavier_normal(rng, (vocab_size, embedding_dim)))
    }

    pub fn from_weights(token_embeddings: Array2<f32>) -> Self {
        let shape = token_embeddings.dim();
        Self {
            token_embeddings,
            grad: Array2::zeros(shape),
            token_optimizer: Adam::new(shape),
        }
    }

    pub fn vocab_size(&self) -> usize {
        self.token_embeddings.nrows()
    }

    pub fn embedding_dim(&self) -> usize {
        self.token_embeddings.ncols()
    }

    fn check_id(&self, token_id: usize) -> Result<()> {
        if token_id >= self.vocab_size() {
            return Err(ChatError::TokenOutOfRange {
                id: token_id,
                vocab_size: self.vocab_size(),
            });
        }
        Ok(())
    }

    /// **根据 token ID 获取对应的嵌入向量**（只读视图）
    pub fn lookup(&self, token_id: usize) -> Result<ArrayView1<'_, f32>> {
        self.check_id(token_id)?;
        Ok(self.token_embeddings.row(token_id))
    }

    /// **前向传播**：一串 token ID → (seq_len, embedding_dim)，每行一个 id
    ///
    /// ```text
    /// token_ids = [5, 12, 3]
    /// output    = [[第5行], [第12行], [第3行]]
    /// ```
    pub fn forward(&self, token_ids: &[usize]) -> Result<Array2<f32>> {
        let mut output = Array2::zeros((token_ids.len(), self.embedding_dim()));
        for (mut row, &token_id) in output.rows_mut().into_iter().zip(token_ids) {
            row.assign(&self.lookup(token_id)?);
        }
        Ok(output)
    }

    /// **反向传播**：把某一步对嵌入向量的梯度累加到对应行
    pub fn backward(&mut self, token_id: usize, grad: &Array1<f32>) -> Result<()> {
        self.check_id(token_id)?;
        let mut row = self.grad.row_mut(token_id);
        row += grad;
        Ok(())
    }
}

impl Layer for Embeddings {
    fn layer_type(&self) -> &str {
        "Embeddings"
    }

    /// 返回词嵌入矩阵的元素总数 = vocab_size × embedding_dim
    fn parameters(&self) -> usize {
        self.token_embeddings.len()
    }

    fn zero_grad(&mut self) {
        self.grad.fill(0.0);
    }

    /// 嵌入矩阵整体交给 Adam；未出现的行梯度为 0，但动量仍会衰减
    fn apply_gradients(&mut self, lr: f32) {
        self.token_optimizer
            .step(&mut self.token_embeddings, &self.grad, lr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn known_table() -> Embeddings {
        // 第 i 行的值都以 i 开头，方便核对行号
        Embeddings::from_weights(array![
            [0.0, 0.1, 0.2],
            [1.0, 1.1, 1.2],
            [2.0, 2.1, 2.2],
        ])
    }

    #[test]
    fn test_forward_rows_follow_token_order() {
        let embeddings = known_table();
        let output = embeddings.forward(&[2, 0, 2]).unwrap();

        assert_eq!(output.dim(), (3, embeddings.embedding_dim()));
        assert_eq!(output.row(0), embeddings.token_embeddings.row(2));
        assert_eq!(output.row(1), embeddings.token_embeddings.row(0));
        assert_eq!(output.row(2), embeddings.token_embeddings.row(2));
    }

    #[test]
    fn test_forward_empty_sequence() {
        let embeddings = known_table();
        let output = embeddings.forward(&[]).unwrap();
        assert_eq!(output.dim(), (0, 3));
    }

    #[test]
    fn test_forward_rejects_out_of_range_id_mid_sequence() {
        let embeddings = known_table();
        let result = embeddings.forward(&[0, 3, 1]);
        assert!(matches!(
            result,
            Err(ChatError::TokenOutOfRange { id: 3, vocab_size: 3 })
        ));
        assert!(embeddings.lookup(3).is_err());
    }
}

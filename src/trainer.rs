//! # 训练循环
//!
//! 状态机按 (epoch, 样本) 顺序推进，跑满配置的 epoch 数后结束：
//!
//! ```text
//! for epoch in 0..epochs:
//!     lr = lr₀ · decay^epoch
//!     for example in dataset:
//!         zero_grad → 展开 + BPTT → Adam(lr)
//! ```
//!
//! 每个样本单独做一次优化器更新，没有批处理。

use rand::Rng;
use rand::seq::SliceRandom;

use crate::{
    config::TrainingConfig,
    dataset_loader::{Dataset, Example},
    error::Result,
    model::Seq2Seq,
};

#[derive(Clone, Debug, Default)]
pub struct TrainingReport {
    /// 每个 epoch 的平均训练损失
    pub epoch_losses: Vec<f32>,
    pub steps: usize,
}

impl TrainingReport {
    pub fn final_loss(&self) -> Option<f32> {
        self.epoch_losses.last().copied()
    }
}

pub struct Trainer {
    config: TrainingConfig,
    epoch: usize,
    steps: usize,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self {
            config,
            epoch: 0,
            steps: 0,
        }
    }

    pub fn epoch(&self) -> usize {
        self.epoch
    }

    pub fn is_finished(&self) -> bool {
        self.epoch >= self.config.epochs
    }

    pub fn current_learning_rate(&self) -> f32 {
        self.config.learning_rate_at(self.epoch)
    }

    /// 单个样本：清零梯度 → 前向/反向 → 一次 Adam 更新
    pub fn train_example(&mut self, model: &mut Seq2Seq, example: &Example, lr: f32) -> Result<f32> {
        model.zero_grad();
        let loss = model.accumulate_gradients(example, self.config.grad_clip)?;
        model.apply_gradients(lr);
        self.steps += 1;
        Ok(loss)
    }

    /// 跑完一个 epoch，返回该 epoch 的平均损失
    pub fn train_epoch<R: Rng + ?Sized>(
        &mut self,
        model: &mut Seq2Seq,
        dataset: &Dataset,
        rng: &mut R,
    ) -> Result<f32> {
        let lr = self.current_learning_rate();

        let mut order: Vec<usize> = (0..dataset.len()).collect();
        if self.config.shuffle {
            order.shuffle(rng);
        }

        let mut total_loss = 0.0;
        for &index in &order {
            let example = &dataset.examples[index];
            let loss = self.train_example(model, example, lr)?;
            log::debug!(
                "Epoch {} [{}]: Loss = {:.4}",
                self.epoch,
                example.label.join("."),
                loss
            );
            total_loss += loss;
        }

        let mean_loss = total_loss / dataset.len().max(1) as f32;
        log::info!(
            "Epoch {}: Loss = {:.4}, LR = {:.6}",
            self.epoch,
            mean_loss,
            lr
        );
        self.epoch += 1;
        Ok(mean_loss)
    }

    /// 从当前 epoch 一直训练到结束
    pub fn train<R: Rng + ?Sized>(
        &mut self,
        model: &mut Seq2Seq,
        dataset: &Dataset,
        rng: &mut R,
    ) -> Result<TrainingReport> {
        let mut report = TrainingReport::default();
        while !self.is_finished() {
            report.epoch_losses.push(self.train_epoch(model, dataset, rng)?);
        }
        report.steps = self.steps;
        Ok(report)
    }
}

/// 全部样本的平均损失（只做前向传播）
pub fn evaluate(model: &Seq2Seq, dataset: &Dataset) -> Result<f32> {
    if dataset.is_empty() {
        return Ok(0.0);
    }
    let total = dataset
        .examples
        .iter()
        .map(|example| model.sequence_loss(example))
        .sum::<Result<f32>>()?;
    Ok(total / dataset.len() as f32)
}

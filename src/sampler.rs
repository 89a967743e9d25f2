//! # 自回归采样
//!
//! ```text
//! prompt ──prime──► p₀ ─draw─► y₀ ─forward─► p₁ ─draw─► y₁ ─► ... ─► y_{N-1}
//! ```
//!
//! 每一步从模型给出的分布中按逆 CDF 抽样：取 u ~ U[0, 1)，
//! 累加概率直到累积和超过 u，返回此时的下标。

use ndarray::{Array1, ArrayView1};
use rand::Rng;

use crate::{
    SOFTMAX_EPSILON,
    config::SamplingConfig,
    error::Result,
    model::Seq2Seq,
    utils::softmax,
    vocab::Vocab,
};

#[derive(Clone, Debug)]
pub struct Sampler {
    pub max_length: usize,
    pub temperature: f32,
    /// 生成到该 id 时停止（不包含在结果中）
    pub stop_token: Option<usize>,
}

impl Sampler {
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length,
            temperature: 1.0,
            stop_token: None,
        }
    }

    pub fn from_config(config: &SamplingConfig, vocab: &Vocab) -> Self {
        Self {
            max_length: config.max_length,
            temperature: config.temperature,
            stop_token: if config.stop_at_eos {
                vocab.eos_token_id()
            } else {
                None
            },
        }
    }

    /// 固定长度生成：总是返回恰好 `max_length` 个 id
    pub fn generate<R: Rng + ?Sized>(
        &self,
        model: &Seq2Seq,
        prompt: &[usize],
        rng: &mut R,
    ) -> Result<Vec<usize>> {
        self.run(model, prompt, None, rng)
    }

    /// 生成回复：遇到结束符提前停止
    pub fn generate_reply<R: Rng + ?Sized>(
        &self,
        model: &Seq2Seq,
        prompt: &[usize],
        rng: &mut R,
    ) -> Result<Vec<usize>> {
        self.run(model, prompt, self.stop_token, rng)
    }

    fn run<R: Rng + ?Sized>(
        &self,
        model: &Seq2Seq,
        prompt: &[usize],
        stop_token: Option<usize>,
        rng: &mut R,
    ) -> Result<Vec<usize>> {
        let mut output = Vec::with_capacity(self.max_length);
        if self.max_length == 0 {
            return Ok(output);
        }

        let (mut probs, mut state) = model.prime(prompt)?;
        loop {
            let adjusted = apply_temperature(probs.view(), self.temperature);
            let next_token = sample_categorical(adjusted.view(), rng);

            if Some(next_token) == stop_token {
                break;
            }
            output.push(next_token);
            if output.len() >= self.max_length {
                break;
            }

            // 抽到的 id 作为下一步的输入
            (probs, state) = model.forward(next_token, &state)?;
        }

        Ok(output)
    }
}

/// p_i^(1/T) 后重新归一化；T = 1 时原样返回
///
/// 在对数空间计算 softmax(ln p / T)，T 很小时也不会整体下溢成 0。
/// 概率为 0 的位置保持为 0。
pub fn apply_temperature(probs: ArrayView1<f32>, temperature: f32) -> Array1<f32> {
    if temperature <= 0.0 || (temperature - 1.0).abs() < f32::EPSILON {
        return probs.to_owned();
    }

    let scaled = probs.mapv(|p| {
        if p > 0.0 && p.is_finite() {
            p.ln() / temperature
        } else {
            f32::NEG_INFINITY
        }
    });
    if !scaled.iter().any(|x| x.is_finite()) {
        return probs.to_owned();
    }
    softmax(scaled.view())
}

/// **类别分布抽样（逆 CDF）**
///
/// 概率和不为 1 时按总和归一化；总质量近似为 0 或不是有限值时退化为均匀抽样。
pub fn sample_categorical<R: Rng + ?Sized>(probs: ArrayView1<f32>, rng: &mut R) -> usize {
    let len = probs.len();
    if len == 0 {
        return 0;
    }

    let sum: f32 = probs.iter().filter(|p| p.is_finite() && **p > 0.0).sum();
    if !(sum > SOFTMAX_EPSILON) || !sum.is_finite() {
        log::warn!("概率分布总质量为 {sum}，改用均匀抽样");
        return rng.random_range(0..len);
    }

    let threshold: f32 = rng.random::<f32>() * sum;
    let mut cumulative = 0.0;
    let mut last_positive = 0;
    for (i, &p) in probs.iter().enumerate() {
        if !(p.is_finite() && p > 0.0) {
            continue;
        }
        cumulative += p;
        last_positive = i;
        if cumulative > threshold {
            return i;
        }
    }

    // 浮点累积误差导致没有越过阈值时，落在最后一个有质量的位置
    last_positive
}

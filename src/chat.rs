//! # 对话接口
//!
//! 把一条原始消息变成一条回复：
//!
//! ```text
//! "Hi There" → 小写 → ["hi", "there"] → 跳过词表外的词 → ids
//!            → Sampler::generate_reply → ids → 用空格拼接
//! ```
//!
//! `ChatBot` 只持有只读的模型，`reply` 取 `&self`，多个线程可以共享同一个实例
//! 同时处理消息，每个调用方自带随机数生成器。

use rand::Rng;

use crate::{
    error::{ChatError, Result},
    model::Seq2Seq,
    sampler::Sampler,
    vocab::{UnknownTokenPolicy, Vocab},
};

pub struct ChatBot {
    model: Seq2Seq,
    vocab: Vocab,
    sampler: Sampler,
}

impl ChatBot {
    pub fn new(model: Seq2Seq, vocab: Vocab, sampler: Sampler) -> Result<Self> {
        if model.vocab_size() != vocab.len() {
            return Err(ChatError::ShapeMismatch {
                expected: format!("vocabulary of {}", model.vocab_size()),
                got: vocab.len().to_string(),
            });
        }
        Ok(Self {
            model,
            vocab,
            sampler,
        })
    }

    pub fn generate_reply<R: Rng + ?Sized>(&self, prompt: &[usize], rng: &mut R) -> Result<Vec<usize>> {
        self.sampler.generate_reply(&self.model, prompt, rng)
    }

    /// 消息里没有任何已知词时返回空字符串，不调用模型
    pub fn reply<R: Rng + ?Sized>(&self, message: &str, rng: &mut R) -> Result<String> {
        let prompt = self
            .vocab
            .encode_sequence(&message.to_lowercase(), UnknownTokenPolicy::Skip)?;
        if prompt.is_empty() {
            log::debug!("消息中没有已知词: {message:?}");
            return Ok(String::new());
        }

        let reply = self.generate_reply(&prompt, rng)?;
        Ok(self.vocab.decode_sequence(&reply))
    }
}

use ndarray::{Array1, ArrayView1};
use rand::Rng;

use crate::{
    LOG_EPSILON,
    config::ModelConfig,
    dataset_loader::Example,
    embeddings::Embeddings,
    error::{ChatError, Result},
    output_projection::OutputProjection,
    recurrent::{RecurrentStack, StackState, StackTrace},
    utils::clip_gradients,
};

/// 所有带参数的组件共同实现的接口
///
/// 前向传播各自有不同的签名（查表、带状态的单步、线性投影），
/// 这里只统一参数统计、梯度清零和优化器更新。
pub trait Layer {
    fn layer_type(&self) -> &str;

    fn parameters(&self) -> usize;

    fn zero_grad(&mut self);

    fn apply_gradients(&mut self, lr: f32);
}

/// 一个时间步的完整前向记录
pub struct StepTrace {
    pub token_id: usize,
    pub encoder: StackTrace,
    pub decoder: StackTrace,
    pub decoder_output: Array1<f32>,
    pub probs: Array1<f32>,
}

/// 展开的一条教师强制序列：每一步的记录以及该步要预测的目标
struct UnrolledSequence {
    steps: Vec<(StepTrace, Option<usize>)>,
}

/// **序列到序列模型**
///
/// ```text
/// token id → Embeddings → Encoder.step → Decoder.step → OutputProjection → softmax
///                          state_in ──► state_mid ──► state_out
/// ```
///
/// 只有一对堆栈状态在模型中流动：编码器输出的状态就是解码器的输入状态，
/// 解码器输出的状态交还调用方，作为下一步编码器的输入状态。
pub struct Seq2Seq {
    pub embeddings: Embeddings,
    pub encoder: RecurrentStack,
    pub decoder: RecurrentStack,
    pub output_projection: OutputProjection,
}

impl Seq2Seq {
    pub fn new<R: Rng + ?Sized>(vocab_size: usize, config: &ModelConfig, rng: &mut R) -> Self {
        let embeddings = Embeddings::new(vocab_size, config.embedding_dim, rng);
        let encoder = RecurrentStack::new_lstm(
            "Encoder",
            config.embedding_dim,
            config.hidden_dim,
            config.num_layers,
            rng,
        );
        // 解码器的输入是编码器最上层的输出
        let decoder = RecurrentStack::new_lstm(
            "Decoder",
            config.hidden_dim,
            config.hidden_dim,
            config.num_layers,
            rng,
        );
        let output_projection = OutputProjection::new(config.hidden_dim, vocab_size, rng);

        Self {
            embeddings,
            encoder,
            decoder,
            output_projection,
        }
    }

    pub fn vocab_size(&self) -> usize {
        self.embeddings.vocab_size()
    }

    pub fn hidden_size(&self) -> usize {
        self.encoder.hidden_size()
    }

    pub fn zero_state(&self) -> StackState {
        self.encoder.zero_state()
    }

    fn layers(&self) -> [&dyn Layer; 4] {
        [
            &self.embeddings,
            &self.encoder,
            &self.decoder,
            &self.output_projection,
        ]
    }

    fn layers_mut(&mut self) -> [&mut dyn Layer; 4] {
        [
            &mut self.embeddings,
            &mut self.encoder,
            &mut self.decoder,
            &mut self.output_projection,
        ]
    }

    pub fn network_description(&self) -> String {
        self.layers()
            .iter()
            .map(|layer| layer.layer_type())
            .collect::<Vec<&str>>()
            .join(", ")
    }

    pub fn total_parameters(&self) -> usize {
        self.layers().iter().map(|layer| layer.parameters()).sum()
    }

    /// **单步前向传播**：返回下一个词的概率分布和更新后的状态
    pub fn forward(&self, token_id: usize, state: &StackState) -> Result<(Array1<f32>, StackState)> {
        let (probs, next_state, _) = self.forward_traced(token_id, state)?;
        Ok((probs, next_state))
    }

    pub fn forward_traced(
        &self,
        token_id: usize,
        state: &StackState,
    ) -> Result<(Array1<f32>, StackState, StepTrace)> {
        let embedded = self.embeddings.lookup(token_id)?;
        let (encoder_output, mid_state, encoder_trace) = self.encoder.step(embedded, state)?;
        let (decoder_output, next_state, decoder_trace) =
            self.decoder.step(encoder_output.view(), &mid_state)?;
        let probs = self.output_projection.forward(decoder_output.view());

        let trace = StepTrace {
            token_id,
            encoder: encoder_trace,
            decoder: decoder_trace,
            decoder_output,
            probs: probs.clone(),
        };
        Ok((probs, next_state, trace))
    }

    /// 从零状态依次读入 prompt，返回第一个解码步的分布和此时的状态
    pub fn prime(&self, prompt: &[usize]) -> Result<(Array1<f32>, StackState)> {
        let (&last, context) = prompt.split_last().ok_or(ChatError::EmptyPrompt)?;
        let mut state = self.zero_state();
        for &token_id in context {
            state = self.forward(token_id, &state)?.1;
        }
        self.forward(last, &state)
    }

    /// 教师强制（teacher forcing）：输入序列 = input ++ target，
    /// 第 t 步读入第 t 个真实 token，落在 target 内的下一个 token 作为该步的预测目标。
    fn unroll(&self, input: &[usize], target: &[usize]) -> Result<UnrolledSequence> {
        if input.is_empty() {
            return Err(ChatError::EmptyPrompt);
        }
        let vocab_size = self.vocab_size();
        if let Some(&id) = target.iter().find(|&&id| id >= vocab_size) {
            return Err(ChatError::TokenOutOfRange { id, vocab_size });
        }

        let sequence: Vec<usize> = input.iter().chain(target).copied().collect();
        let mut state = self.zero_state();
        let mut steps = Vec::with_capacity(sequence.len().saturating_sub(1));

        for t in 0..sequence.len() - 1 {
            let (_, next_state, trace) = self.forward_traced(sequence[t], &state)?;
            let next_target = (t + 1 >= input.len()).then_some(sequence[t + 1]);
            steps.push((trace, next_target));
            state = next_state;
        }

        Ok(UnrolledSequence { steps })
    }

    /// 样本中所有目标位置的平均交叉熵，不计算梯度
    pub fn sequence_loss(&self, example: &Example) -> Result<f32> {
        let mut total = 0.0;
        let mut scored = 0usize;
        for turn in &example.turns {
            let unrolled = self.unroll(&example.input, turn)?;
            for (trace, target) in &unrolled.steps {
                if let Some(target) = *target {
                    total += cross_entropy(trace.probs.view(), target);
                    scored += 1;
                }
            }
        }
        Ok(if scored == 0 { 0.0 } else { total / scored as f32 })
    }

    /// **前向 + 通过时间的反向传播（BPTT）**
    ///
    /// 每个回合（turn）从零状态独立展开；所有回合的梯度累加到各层的梯度缓冲区，
    /// 损失对全部目标位置取平均。返回该样本的平均损失。调用方负责清零和更新。
    pub fn accumulate_gradients(&mut self, example: &Example, grad_clip: f32) -> Result<f32> {
        let unrolled = example
            .turns
            .iter()
            .map(|turn| self.unroll(&example.input, turn))
            .collect::<Result<Vec<_>>>()?;

        let scored: usize = unrolled
            .iter()
            .map(|seq| seq.steps.iter().filter(|(_, t)| t.is_some()).count())
            .sum();
        if scored == 0 {
            return Ok(0.0);
        }
        let scale = 1.0 / scored as f32;

        let mut total_loss = 0.0;
        for sequence in &unrolled {
            let mut grad_state = self.zero_state();

            for (trace, target) in sequence.steps.iter().rev() {
                let grad_decoder_output = match *target {
                    Some(target) => {
                        total_loss += cross_entropy(trace.probs.view(), target);

                        // softmax + 交叉熵的联合梯度: p - one_hot(target)
                        let mut grad_logits = trace.probs.clone();
                        grad_logits[target] -= 1.0;
                        grad_logits.mapv_inplace(|g| g * scale);
                        clip_gradients(&mut grad_logits, grad_clip);

                        self.output_projection
                            .backward(trace.decoder_output.view(), &grad_logits)
                    }
                    None => Array1::zeros(trace.decoder_output.len()),
                };

                let (grad_encoder_output, grad_mid_state) =
                    self.decoder
                        .backward_step(&trace.decoder, &grad_decoder_output, &grad_state);
                let (grad_embedding, grad_state_in) = self.encoder.backward_step(
                    &trace.encoder,
                    &grad_encoder_output,
                    &grad_mid_state,
                );
                self.embeddings.backward(trace.token_id, &grad_embedding)?;
                grad_state = grad_state_in;
            }
        }

        Ok(total_loss * scale)
    }

    pub fn zero_grad(&mut self) {
        for layer in self.layers_mut() {
            layer.zero_grad();
        }
    }

    pub fn apply_gradients(&mut self, lr: f32) {
        for layer in self.layers_mut() {
            layer.apply_gradients(lr);
        }
    }
}

fn cross_entropy(probs: ArrayView1<f32>, target: usize) -> f32 {
    -probs[target].max(LOG_EPSILON).ln()
}

//! # 循环网络堆栈（Recurrent Stack）
//!
//! 编码器和解码器是同一种结构的两个独立实例：若干层循环单元串联，
//! 第 1 层的输出作为第 2 层的输入，每一层各自维护自己的 (h, c)。
//!
//! ```text
//!            ┌──────── layer 1 ────────┐   ┌──────── layer 2 ────────┐
//! x ───────► │ (h₁, c₁) → (h₁', c₁')   │──►│ (h₂, c₂) → (h₂', c₂')   │──► output = h₂'
//!            └─────────────────────────┘   └─────────────────────────┘
//! ```
//!
//! 堆栈同样不保存状态：`step` 接收 [`StackState`] 并返回新的 [`StackState`]，
//! 编码器输出的状态因此可以直接作为解码器的初始状态。

use ndarray::{Array1, ArrayView1};
use rand::Rng;

use crate::{
    error::{ChatError, Result},
    lstm::{CellCache, LstmCell},
    model::Layer,
    model_serialization::SerializableRecurrent,
};

/// 单层循环单元的状态：隐藏向量 + 记忆向量
#[derive(Clone, Debug, PartialEq)]
pub struct RecurrentState {
    pub hidden: Array1<f32>,
    pub cell: Array1<f32>,
}

impl RecurrentState {
    pub fn zeros(hidden_size: usize) -> Self {
        Self {
            hidden: Array1::zeros(hidden_size),
            cell: Array1::zeros(hidden_size),
        }
    }
}

/// 单步反向传播的结果
pub struct StepGrads {
    pub input: Array1<f32>,
    pub hidden_prev: Array1<f32>,
    pub cell_prev: Array1<f32>,
}

/// **循环层能力接口**
///
/// 模型只通过这个 trait 使用循环层，读取隐藏维度不需要知道具体类型。
pub trait RecurrentLayer: Layer + Send + Sync {
    fn input_size(&self) -> usize;

    fn hidden_size(&self) -> usize;

    fn step(
        &self,
        input: ArrayView1<f32>,
        state: &RecurrentState,
    ) -> Result<(RecurrentState, CellCache)>;

    /// 累积参数梯度，并返回对输入、上一步 h、上一步 c 的梯度
    fn backward_step(
        &mut self,
        cache: &CellCache,
        grad_hidden: &Array1<f32>,
        grad_cell: &Array1<f32>,
    ) -> StepGrads;

    fn to_serializable(&self) -> SerializableRecurrent;
}

/// 整个堆栈的状态，每层一对 (h, c)
#[derive(Clone, Debug, PartialEq)]
pub struct StackState {
    pub layers: Vec<RecurrentState>,
}

impl StackState {
    pub fn zeros(num_layers: usize, hidden_size: usize) -> Self {
        Self {
            layers: (0..num_layers)
                .map(|_| RecurrentState::zeros(hidden_size))
                .collect(),
        }
    }
}

/// 一个时间步内每层的缓存
pub struct StackTrace {
    pub caches: Vec<CellCache>,
}

pub struct RecurrentStack {
    name: String,
    pub layers: Vec<Box<dyn RecurrentLayer>>,
}

impl RecurrentStack {
    /// 第一层把 `input_size` 映射到 `hidden_size`，之后每层都是 `hidden_size → hidden_size`
    pub fn new_lstm<R: Rng + ?Sized>(
        name: &str,
        input_size: usize,
        hidden_size: usize,
        num_layers: usize,
        rng: &mut R,
    ) -> Self {
        let layers = (0..num_layers)
            .map(|i| {
                let layer_input = if i == 0 { input_size } else { hidden_size };
                Box::new(LstmCell::new(layer_input, hidden_size, rng)) as Box<dyn RecurrentLayer>
            })
            .collect();
        Self::from_layers(name, layers)
    }

    pub fn from_layers(name: &str, layers: Vec<Box<dyn RecurrentLayer>>) -> Self {
        Self {
            name: name.to_string(),
            layers,
        }
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn input_size(&self) -> usize {
        self.layers.first().map_or(0, |layer| layer.input_size())
    }

    pub fn hidden_size(&self) -> usize {
        self.layers.first().map_or(0, |layer| layer.hidden_size())
    }

    pub fn zero_state(&self) -> StackState {
        StackState::zeros(self.num_layers(), self.hidden_size())
    }

    /// **前向一步**：返回最上层的输出、新的堆栈状态和反向传播缓存
    pub fn step(
        &self,
        input: ArrayView1<f32>,
        state: &StackState,
    ) -> Result<(Array1<f32>, StackState, StackTrace)> {
        if state.layers.len() != self.layers.len() {
            return Err(ChatError::ShapeMismatch {
                expected: format!("{} state of {} layers", self.name, self.layers.len()),
                got: state.layers.len().to_string(),
            });
        }

        let mut next_layers = Vec::with_capacity(self.layers.len());
        let mut caches = Vec::with_capacity(self.layers.len());
        let mut current = input.to_owned();

        for (layer, layer_state) in self.layers.iter().zip(&state.layers) {
            let (next, cache) = layer.step(current.view(), layer_state)?;
            current = next.hidden.clone();
            next_layers.push(next);
            caches.push(cache);
        }

        Ok((
            current,
            StackState {
                layers: next_layers,
            },
            StackTrace { caches },
        ))
    }

    /// **反向一步**
    ///
    /// `grad_output` 是对最上层输出的梯度，`grad_state_out` 是从下一时间步传回来的
    /// 对本步输出状态的梯度。返回对输入的梯度和对本步输入状态的梯度。
    pub fn backward_step(
        &mut self,
        trace: &StackTrace,
        grad_output: &Array1<f32>,
        grad_state_out: &StackState,
    ) -> (Array1<f32>, StackState) {
        let mut grad_state_in: Vec<RecurrentState> = Vec::with_capacity(self.layers.len());
        let mut grad_below = grad_output.clone();

        for (layer, (cache, grad_out)) in self
            .layers
            .iter_mut()
            .zip(trace.caches.iter().zip(&grad_state_out.layers))
            .rev()
        {
            // 该层输出既送往上一层（或模型输出），也作为下一时间步的隐藏状态
            let grad_hidden = &grad_below + &grad_out.hidden;
            let grads = layer.backward_step(cache, &grad_hidden, &grad_out.cell);
            grad_state_in.push(RecurrentState {
                hidden: grads.hidden_prev,
                cell: grads.cell_prev,
            });
            grad_below = grads.input;
        }

        grad_state_in.reverse();
        (
            grad_below,
            StackState {
                layers: grad_state_in,
            },
        )
    }
}

impl Layer for RecurrentStack {
    fn layer_type(&self) -> &str {
        &self.name
    }

    fn parameters(&self) -> usize {
        self.layers.iter().map(|layer| layer.parameters()).sum()
    }

    fn zero_grad(&mut self) {
        for layer in &mut self.layers {
            layer.zero_grad();
        }
    }

    fn apply_gradients(&mut self, lr: f32) {
        for layer in &mut self.layers {
            layer.apply_gradients(lr);
        }
    }
}

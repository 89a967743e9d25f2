//! # LSTM 单元（Long Short-Term Memory Cell）
//!
//! 标准的四门 LSTM，每一步接收输入向量和上一步的 (h, c)，输出新的 (h, c)：
//!
//! ```text
//! z = x·W_ih + h_prev·W_hh + b          // (4H)，依次切成 i, f, g, o
//! i = σ(z_i)   输入门
//! f = σ(z_f)   遗忘门
//! g = tanh(z_g) 候选状态
//! o = σ(z_o)   输出门
//! c = f ⊙ c_prev + i ⊙ g
//! h = o ⊙ tanh(c)
//! ```
//!
//! 单元本身不保存任何状态：(h, c) 由调用方传入并拥有，前向传播只需要 `&self`。
//! 反向传播所需的中间量通过 [`CellCache`] 返回给调用方，由调用方按时间步保存。

use ndarray::{Array1, Array2, ArrayView1, Axis, s};
use rand::Rng;

use crate::{
    adam::Adam,
    error::{ChatError, Result},
    model::Layer,
    model_serialization::{SerializableLstmCell, SerializableMatrix, SerializableRecurrent},
    recurrent::{RecurrentLayer, RecurrentState, StepGrads},
    utils::{outer, sigmoid, xavier_normal},
};

/// 单步前向传播的缓存，反向传播时使用
#[derive(Clone, Debug)]
pub struct CellCache {
    pub input: Array1<f32>,
    pub hidden_prev: Array1<f32>,
    pub cell_prev: Array1<f32>,
    pub input_gate: Array1<f32>,
    pub forget_gate: Array1<f32>,
    pub candidate: Array1<f32>,
    pub output_gate: Array1<f32>,
    pub cell_tanh: Array1<f32>,
}

pub struct LstmCell {
    pub input_size: usize,
    pub hidden_size: usize,

    /// **输入权重** W_ih: (input_size, 4H)
    pub w_ih: Array2<f32>,
    /// **循环权重** W_hh: (hidden_size, 4H)
    pub w_hh: Array2<f32>,
    /// **偏置** b: (1, 4H)
    pub bias: Array2<f32>,

    pub grad_w_ih: Array2<f32>,
    pub grad_w_hh: Array2<f32>,
    pub grad_bias: Array2<f32>,

    pub optimizer_w_ih: Adam,
    pub optimizer_w_hh: Adam,
    pub optimizer_bias: Adam,
}

impl LstmCell {
    /// **创建新的 LSTM 单元**
    ///
    /// 权重用 Xavier 正态初始化；遗忘门偏置初始化为 1，其余偏置为 0，
    /// 让训练初期的记忆单元默认保留信息。
    pub fn new<R: Rng + ?Sized>(input_size: usize, hidden_size: usize, rng: &mut R) -> Self {
        let gates = 4 * hidden_size;
        let w_ih = xavier_normal(rng, (input_size, gates));
        let w_hh = xavier_normal(rng, (hidden_size, gates));
        let mut bias = Array2::zeros((1, gates));
        bias.slice_mut(s![0, hidden_size..2 * hidden_size]).fill(1.0);

        Self::from_weights(w_ih, w_hh, bias)
    }

    pub fn from_weights(w_ih: Array2<f32>, w_hh: Array2<f32>, bias: Array2<f32>) -> Self {
        let input_size = w_ih.nrows();
        let hidden_size = w_hh.nrows();

        LstmCell {
            input_size,
            hidden_size,
            grad_w_ih: Array2::zeros(w_ih.dim()),
            grad_w_hh: Array2::zeros(w_hh.dim()),
            grad_bias: Array2::zeros(bias.dim()),
            optimizer_w_ih: Adam::new(w_ih.dim()),
            optimizer_w_hh: Adam::new(w_hh.dim()),
            optimizer_bias: Adam::new(bias.dim()),
            w_ih,
            w_hh,
            bias,
        }
    }
}

impl Layer for LstmCell {
    fn layer_type(&self) -> &str {
        "LSTM"
    }

    fn parameters(&self) -> usize {
        self.w_ih.len() + self.w_hh.len() + self.bias.len()
    }

    fn zero_grad(&mut self) {
        self.grad_w_ih.fill(0.0);
        self.grad_w_hh.fill(0.0);
        self.grad_bias.fill(0.0);
    }

    fn apply_gradients(&mut self, lr: f32) {
        self.optimizer_w_ih.step(&mut self.w_ih, &self.grad_w_ih, lr);
        self.optimizer_w_hh.step(&mut self.w_hh, &self.grad_w_hh, lr);
        self.optimizer_bias.step(&mut self.bias, &self.grad_bias, lr);
    }
}

impl RecurrentLayer for LstmCell {
    fn input_size(&self) -> usize {
        self.input_size
    }

    fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    fn step(
        &self,
        input: ArrayView1<f32>,
        state: &RecurrentState,
    ) -> Result<(RecurrentState, CellCache)> {
        if input.len() != self.input_size {
            return Err(ChatError::ShapeMismatch {
                expected: format!("LSTM input of {}", self.input_size),
                got: input.len().to_string(),
            });
        }
        if state.hidden.len() != self.hidden_size || state.cell.len() != self.hidden_size {
            return Err(ChatError::ShapeMismatch {
                expected: format!("LSTM state of {}", self.hidden_size),
                got: format!("({}, {})", state.hidden.len(), state.cell.len()),
            });
        }

        let h = self.hidden_size;
        let z = input.dot(&self.w_ih) + state.hidden.dot(&self.w_hh) + &self.bias.row(0);

        let input_gate = z.slice(s![0..h]).mapv(sigmoid);
        let forget_gate = z.slice(s![h..2 * h]).mapv(sigmoid);
        let candidate = z.slice(s![2 * h..3 * h]).mapv(f32::tanh);
        let output_gate = z.slice(s![3 * h..]).mapv(sigmoid);

        let cell = &forget_gate * &state.cell + &input_gate * &candidate;
        let cell_tanh = cell.mapv(f32::tanh);
        let hidden = &output_gate * &cell_tanh;

        let cache = CellCache {
            input: input.to_owned(),
            hidden_prev: state.hidden.clone(),
            cell_prev: state.cell.clone(),
            input_gate,
            forget_gate,
            candidate,
            output_gate,
            cell_tanh,
        };

        Ok((RecurrentState { hidden, cell }, cache))
    }

    /// **单步反向传播（BPTT 的一个时间步）**
    ///
    /// ```text
    /// dO      = dh ⊙ tanh(c)
    /// dc      = dc_next + dh ⊙ o ⊙ (1 - tanh²(c))
    /// dF      = dc ⊙ c_prev     dI = dc ⊙ g     dG = dc ⊙ i
    /// dc_prev = dc ⊙ f
    /// dz      = [dI·i(1-i), dF·f(1-f), dG·(1-g²), dO·o(1-o)]
    /// grad_W_ih += x ⊗ dz       grad_W_hh += h_prev ⊗ dz       grad_b += dz
    /// dx      = W_ih · dz       dh_prev = W_hh · dz
    /// ```
    fn backward_step(
        &mut self,
        cache: &CellCache,
        grad_hidden: &Array1<f32>,
        grad_cell: &Array1<f32>,
    ) -> StepGrads {
        let h = self.hidden_size;

        let d_output_gate = grad_hidden * &cache.cell_tanh;
        let d_cell = grad_cell
            + &(grad_hidden * &cache.output_gate * cache.cell_tanh.mapv(|t| 1.0 - t * t));

        let d_forget_gate = &d_cell * &cache.cell_prev;
        let d_input_gate = &d_cell * &cache.candidate;
        let d_candidate = &d_cell * &cache.input_gate;
        let d_cell_prev = &d_cell * &cache.forget_gate;

        let mut dz = Array1::<f32>::zeros(4 * h);
        dz.slice_mut(s![0..h])
            .assign(&(d_input_gate * cache.input_gate.mapv(|g| g * (1.0 - g))));
        dz.slice_mut(s![h..2 * h])
            .assign(&(d_forget_gate * cache.forget_gate.mapv(|g| g * (1.0 - g))));
        dz.slice_mut(s![2 * h..3 * h])
            .assign(&(d_candidate * cache.candidate.mapv(|g| 1.0 - g * g)));
        dz.slice_mut(s![3 * h..])
            .assign(&(d_output_gate * cache.output_gate.mapv(|g| g * (1.0 - g))));

        self.grad_w_ih += &outer(cache.input.view(), dz.view());
        self.grad_w_hh += &outer(cache.hidden_prev.view(), dz.view());
        self.grad_bias += &dz.view().insert_axis(Axis(0));

        StepGrads {
            input: self.w_ih.dot(&dz),
            hidden_prev: self.w_hh.dot(&dz),
            cell_prev: d_cell_prev,
        }
    }

    fn to_serializable(&self) -> SerializableRecurrent {
        SerializableRecurrent::Lstm(SerializableLstmCell {
            w_ih: SerializableMatrix::from_array(&self.w_ih),
            w_hh: SerializableMatrix::from_array(&self.w_hh),
            bias: SerializableMatrix::from_array(&self.bias),
        })
    }
}

//! # Adam 优化器
//!
//! 每个参数张量持有一份一阶/二阶矩估计：
//!
//! ```text
//! m = β1·m + (1-β1)·g
//! v = β2·v + (1-β2)·g²
//! θ -= lr · m̂ / (sqrt(v̂) + ε)
//! ```
//!
//! 偏置向量同样存为 `(1, n)` 的二维数组，与权重共用一套实现。

use ndarray::{Array2, Zip};

pub struct Adam {
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
    pub timestep: usize,
    pub m: Array2<f32>,
    pub v: Array2<f32>,
}

impl Adam {
    pub fn new(shape: (usize, usize)) -> Self {
        Self {
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            timestep: 0,
            m: Array2::zeros(shape),
            v: Array2::zeros(shape),
        }
    }

    pub fn step(&mut self, params: &mut Array2<f32>, grads: &Array2<f32>, lr: f32) {
        debug_assert_eq!(params.dim(), grads.dim());

        self.timestep += 1;
        let t = self.timestep as i32;
        let (beta1, beta2, epsilon) = (self.beta1, self.beta2, self.epsilon);
        let bias_correction1 = 1.0 - beta1.powi(t);
        let bias_correction2 = 1.0 - beta2.powi(t);

        Zip::from(params)
            .and(grads)
            .and(&mut self.m)
            .and(&mut self.v)
            .for_each(|p, &g, m, v| {
                // 非有限梯度不参与更新，避免一次溢出污染矩估计
                let g = if g.is_finite() { g } else { 0.0 };
                *m = beta1 * *m + (1.0 - beta1) * g;
                *v = beta2 * *v + (1.0 - beta2) * g * g;
                let m_hat = *m / bias_correction1;
                let v_hat = *v / bias_correction2;
                *p -= lr * m_hat / (v_hat.sqrt() + epsilon);
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_step_moves_by_learning_rate() {
        // 第一步偏置修正后 m̂/sqrt(v̂) = sign(g)
        let mut adam = Adam::new((1, 3));
        let mut params = Array2::from_shape_vec((1, 3), vec![1.0, 1.0, 1.0]).unwrap();
        let grads = Array2::from_shape_vec((1, 3), vec![0.5, -2.0, 0.0]).unwrap();

        adam.step(&mut params, &grads, 0.1);

        assert!((params[[0, 0]] - 0.9).abs() < 1e-4);
        assert!((params[[0, 1]] - 1.1).abs() < 1e-4);
        assert!((params[[0, 2]] - 1.0).abs() < 1e-6);
        assert_eq!(adam.timestep, 1);
    }

    #[test]
    fn test_minimizes_quadratic() {
        let mut adam = Adam::new((1, 1));
        let mut x = Array2::from_elem((1, 1), 3.0f32);
        for _ in 0..500 {
            let grad = x.mapv(|v| 2.0 * v);
            adam.step(&mut x, &grad, 0.05);
        }
        assert!(x[[0, 0]].abs() < 0.1, "x = {}", x[[0, 0]]);
    }
}

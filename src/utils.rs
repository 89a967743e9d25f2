/// 工具函数模块
///
/// 包含激活函数、权重初始化、梯度裁剪等通用工具
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

use crate::SOFTMAX_EPSILON;

/// Softmax激活函数（向量版）
///
/// 使用数值稳定的实现：先减去最大值再取指数，除以总和时添加epsilon避免除零。
pub fn softmax(logits: ArrayView1<f32>) -> Array1<f32> {
    let max_val = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut result = logits.mapv(|x| (x - max_val).exp());
    let sum_exp: f32 = result.sum();
    result.mapv_inplace(|x| x / sum_exp.max(SOFTMAX_EPSILON));
    result
}

/// 给定种子时结果可复现，否则从线程随机数生成器取种子
pub fn seeded_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_rng(&mut rand::rng()),
    }
}

pub fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        // x 很小时 exp(-x) 会溢出，改写成等价形式
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// **Xavier（Glorot）正态初始化**
///
/// std = sqrt(2 / (fan_in + fan_out))，适合 sigmoid/tanh 这类有界激活函数。
pub fn xavier_normal<R: Rng + ?Sized>(rng: &mut R, shape: (usize, usize)) -> Array2<f32> {
    let (fan_in, fan_out) = shape;
    let std = (2.0 / (fan_in + fan_out).max(1) as f32).sqrt();

    match Normal::new(0.0, std) {
        Ok(normal) => Array2::from_shape_fn(shape, |_| normal.sample(rng)),
        Err(e) => {
            log::warn!("Xavier: 正态分布初始化失败 ({e})，改用均匀分布");
            let bound = std * 3f32.sqrt();
            Array2::from_shape_fn(shape, |_| rng.random_range(-bound..bound))
        }
    }
}

/// 外积 a ⊗ b，形状 (a.len(), b.len())
pub fn outer(a: ArrayView1<f32>, b: ArrayView1<f32>) -> Array2<f32> {
    a.insert_axis(Axis(1)).dot(&b.insert_axis(Axis(0)))
}

/// 按 L2 范数裁剪梯度，返回裁剪前的范数
pub fn clip_gradients(grads: &mut Array1<f32>, max_norm: f32) -> f32 {
    let norm = grads.iter().map(|&x| x * x).sum::<f32>().sqrt();
    if max_norm > 0.0 && norm > max_norm {
        let scale = max_norm / norm;
        grads.mapv_inplace(|x| x * scale);
    }
    norm
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_softmax_basic() {
        let input = Array2::from_shape_vec((2, 3), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();

        for row in input.rows() {
            let output = softmax(row);

            // 检查和为1
            let sum: f32 = output.sum();
            assert!(
                (sum - 1.0).abs() < 1e-6,
                "Row sum should be 1.0, got {}",
                sum
            );

            // 检查所有值在[0, 1]区间
            for &val in output.iter() {
                assert!(
                    val >= 0.0 && val <= 1.0,
                    "Value should be in [0, 1], got {}",
                    val
                );
            }
        }
    }

    #[test]
    fn test_softmax_numerical_stability() {
        // 测试大数值的稳定性
        let input = Array1::from(vec![1000.0, 1001.0, 1002.0]);
        let output = softmax(input.view());

        // 应该不会产生NaN或Inf
        for &val in output.iter() {
            assert!(val.is_finite(), "Value should be finite, got {}", val);
        }
        assert!((output.sum() - 1.0).abs() < 1e-4);
        assert!(output[2] > output[1] && output[1] > output[0]);
    }

    #[test]
    fn test_sigmoid_bounds() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-7);
        assert!(sigmoid(-100.0) >= 0.0 && sigmoid(-100.0) < 1e-6);
        assert!(sigmoid(100.0) <= 1.0 && sigmoid(100.0) > 1.0 - 1e-6);
        assert!(sigmoid(-1000.0).is_finite());
    }

    #[test]
    fn test_xavier_is_seed_deterministic() {
        let a = xavier_normal(&mut ChaCha8Rng::seed_from_u64(3), (4, 5));
        let b = xavier_normal(&mut ChaCha8Rng::seed_from_u64(3), (4, 5));
        assert_eq!(a, b);
        assert_eq!(a.dim(), (4, 5));
    }

    #[test]
    fn test_clip_gradients() {
        let mut grads = Array1::from(vec![3.0, 4.0]);
        let norm = clip_gradients(&mut grads, 1.0);
        assert!((norm - 5.0).abs() < 1e-6);
        assert!((grads[0] - 0.6).abs() < 1e-6);
        assert!((grads[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_outer_shape() {
        let a = Array1::from(vec![1.0, 2.0]);
        let b = Array1::from(vec![1.0, 0.0, -1.0]);
        let o = outer(a.view(), b.view());
        assert_eq!(o.dim(), (2, 3));
        assert_eq!(o[[1, 2]], -2.0);
    }
}

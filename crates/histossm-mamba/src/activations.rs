//! Scalar activations shared by the scan kernel, the conv and the heads.

/// Logistic sigmoid.
#[inline]
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// SiLU (Swish) activation: x * sigmoid(x)
#[inline]
pub fn silu(x: f32) -> f32 {
    x * sigmoid(x)
}

/// Softplus: log(1 + exp(x)), linear above 20 as in PyTorch.
#[inline]
pub fn softplus(x: f32) -> f32 {
    if x > 20.0 {
        x
    } else {
        x.exp().ln_1p()
    }
}

/// Inverse of softplus for `y > 0`: y + log(-expm1(-y)).
///
/// Computed in f64 so that tiny step sizes near the init floor survive.
#[inline]
pub fn inverse_softplus(y: f32) -> f32 {
    let y = y as f64;
    (y + (-(-y).exp_m1()).ln()) as f32
}

/// GELU, tanh approximation.
#[inline]
pub fn gelu(x: f32) -> f32 {
    const SQRT_2_OVER_PI: f32 = 0.797_884_6;
    0.5 * x * (1.0 + (SQRT_2_OVER_PI * (x + 0.044715 * x * x * x)).tanh())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silu_values() {
        assert_eq!(silu(0.0), 0.0);
        assert!((silu(1.0) - 0.731_058_6).abs() < 1e-6);
        assert!((silu(-1.0) + 0.268_941_4).abs() < 1e-6);
    }

    #[test]
    fn test_softplus_positive_and_threshold() {
        assert!((softplus(0.0) - std::f32::consts::LN_2).abs() < 1e-6);
        assert_eq!(softplus(25.0), 25.0);
        assert!(softplus(-30.0) > 0.0);
    }

    #[test]
    fn test_inverse_softplus_round_trips_step_sizes() {
        for &dt in &[1e-4f32, 1e-3, 0.01, 0.05, 0.1] {
            let back = softplus(inverse_softplus(dt));
            assert!((back - dt).abs() / dt < 1e-3, "dt={dt} back={back}");
        }
    }

    #[test]
    fn test_gelu_shape() {
        assert_eq!(gelu(0.0), 0.0);
        assert!((gelu(1.0) - 0.841_192).abs() < 1e-4);
        assert!(gelu(-5.0).abs() < 1e-3);
    }

    #[test]
    fn test_sigmoid_range() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(10.0) < 1.0 && sigmoid(-10.0) > 0.0);
    }
}

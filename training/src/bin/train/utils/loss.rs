use candle_core::{Result, Tensor};

/// Huber loss written as `0.5 * q² + delta * (|d| - q)` with `q = min(|d|, delta)`.
pub fn huber(pred: &Tensor, target: &Tensor, delta: f64) -> Result<Tensor> {
    let abs_diff = (pred - target)?.abs()?;
    let quadratic = abs_diff.clamp(0.0, delta)?;
    let linear = (&abs_diff - &quadratic)?;

    ((quadratic.sqr()? * 0.5)? + (linear * delta)?)?.mean_all()
}

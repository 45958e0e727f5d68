use candle_core::backprop::GradStore;
use candle_core::{DType, Result, Tensor};
use candle_nn::Optimizer;

use crate::mode::{ensure_grad_enabled, Train};

/// Result of a single [`learn`] call.
pub struct Learned<T> {
    pub loss: f64,
    pub output: T,
    /// Gradients of the step, `None` when the update was skipped.
    pub grads: Option<GradStore>,
}

impl<T> Learned<T> {
    pub fn skipped(&self) -> bool {
        self.grads.is_none()
    }
}

/// One guarded optimization step.
///
/// Switches `model` to training mode, computes `loss_fn(&step(batch))` and,
/// when the loss value is finite, runs backward and `optimizer.step`. A
/// non-finite loss is logged and neither backward nor the update happen; the
/// caller can still inspect it in the returned [`Learned`].
///
/// candle computes a fresh gradient store on every backward, so there is
/// nothing to zero beforehand. The store is handed back in
/// [`Learned::grads`].
///
/// ```no_run
/// # use candle_core::{Device, Result, Tensor};
/// # use candle_nn::{loss::mse, Linear, Module, Optimizer, SGD};
/// # use training::{learn, TrainMode};
/// # fn run(net: &Linear, mode: &TrainMode, opt: &mut SGD, x: Tensor, y: Tensor) -> Result<()> {
/// let learned = learn(
///     mode,
///     opt,
///     |(pred, y): &(Tensor, Tensor)| mse(pred, y),
///     |(x, y): (Tensor, Tensor)| Ok((net.forward(&x)?, y)),
///     (x, y),
/// )?;
/// println!("loss: {}", learned.loss);
/// # Ok(())
/// # }
/// ```
pub fn learn<M, O, B, T, S, L>(
    model: &M,
    optimizer: &mut O,
    loss_fn: L,
    step: S,
    batch: B,
) -> Result<Learned<T>>
where
    M: Train + ?Sized,
    O: Optimizer,
    S: FnOnce(B) -> Result<T>,
    L: FnOnce(&T) -> Result<Tensor>,
{
    model.train(true);

    let output = step(batch)?;
    let loss = loss_fn(&output)?;
    let loss_value = scalar(&loss)?;

    if !loss_value.is_finite() {
        log::warn!("loss value is not finite: {loss_value}");
        return Ok(Learned {
            loss: loss_value,
            output,
            grads: None,
        });
    }

    ensure_grad_enabled()?;
    let grads = loss.backward()?;
    optimizer.step(&grads)?;

    Ok(Learned {
        loss: loss_value,
        output,
        grads: Some(grads),
    })
}

pub(crate) fn scalar(loss: &Tensor) -> Result<f64> {
    loss.to_dtype(DType::F64)?.to_vec0::<f64>()
}

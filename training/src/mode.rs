use candle_core::{bail, Result, Tensor};
use std::cell::Cell;
use std::marker::PhantomData;

/// A model whose forward pass behaves differently while training
/// (dropout, batch statistics, ...).
pub trait Train {
    fn train(&self, mode: bool);
    fn is_training(&self) -> bool;

    fn eval(&self) {
        self.train(false);
    }
}

/// Training flag for models to embed. Starts in training mode.
#[derive(Debug, Clone)]
pub struct TrainMode(Cell<bool>);

impl TrainMode {
    pub fn new(training: bool) -> Self {
        Self(Cell::new(training))
    }
}

impl Default for TrainMode {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Train for TrainMode {
    #[inline]
    fn train(&self, mode: bool) {
        self.0.set(mode);
    }

    #[inline]
    fn is_training(&self) -> bool {
        self.0.get()
    }
}

impl<T: Train + ?Sized> Train for &T {
    fn train(&self, mode: bool) {
        (**self).train(mode);
    }

    fn is_training(&self) -> bool {
        (**self).is_training()
    }
}

impl<T: Train + ?Sized> Train for Box<T> {
    fn train(&self, mode: bool) {
        (**self).train(mode);
    }

    fn is_training(&self) -> bool {
        (**self).is_training()
    }
}

thread_local! {
    static GRAD_ENABLED: Cell<bool> = const { Cell::new(true) };
}

/// Whether gradient tracking is enabled on the current thread.
pub fn is_grad_enabled() -> bool {
    GRAD_ENABLED.with(Cell::get)
}

/// Returns the previous state.
pub fn set_grad_enabled(enabled: bool) -> bool {
    GRAD_ENABLED.with(|flag| flag.replace(enabled))
}

/// Disables gradient tracking until dropped, then restores the previous state.
#[must_use = "gradient tracking is re-enabled as soon as the guard is dropped"]
pub struct NoGrad {
    previous: bool,
    // The flag is thread-local, so the guard must stay on its thread.
    _not_send: PhantomData<*const ()>,
}

impl NoGrad {
    pub fn new() -> Self {
        Self {
            previous: set_grad_enabled(false),
            _not_send: PhantomData,
        }
    }
}

impl Default for NoGrad {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for NoGrad {
    fn drop(&mut self) {
        set_grad_enabled(self.previous);
    }
}

/// Cuts `xs` out of the autograd graph when tracking is disabled.
///
/// Models call this on their outputs so inference under
/// [`evaluate`](crate::evaluate) does not build a graph.
#[inline]
pub fn track(xs: &Tensor) -> Tensor {
    if is_grad_enabled() {
        xs.clone()
    } else {
        xs.detach()
    }
}

pub(crate) fn ensure_grad_enabled() -> Result<()> {
    if !is_grad_enabled() {
        bail!("backward called while gradient tracking is disabled");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{Device, Var};

    #[test]
    fn test_train_mode_defaults_to_training() {
        let mode = TrainMode::default();
        assert!(mode.is_training());
        mode.eval();
        assert!(!mode.is_training());
        mode.train(true);
        assert!(mode.is_training());
    }

    #[test]
    fn test_no_grad_restores_previous_state() {
        assert!(is_grad_enabled());
        {
            let _outer = NoGrad::new();
            assert!(!is_grad_enabled());
            {
                let _inner = NoGrad::new();
                assert!(!is_grad_enabled());
            }
            // Inner guard restores "disabled", not "enabled"
            assert!(!is_grad_enabled());
        }
        assert!(is_grad_enabled());
    }

    #[test]
    fn test_ensure_grad_enabled() {
        assert!(ensure_grad_enabled().is_ok());
        let _guard = NoGrad::new();
        assert!(ensure_grad_enabled().is_err());
    }

    #[test]
    fn test_track_detaches_without_grad() -> Result<()> {
        let w = Var::new(&[1f32, 2., 3.], &Device::Cpu)?;

        let tracked = track(&(w.as_tensor() * 2.0)?);
        let grads = tracked.sum_all()?.backward()?;
        assert!(grads.get(w.as_tensor()).is_some());

        let detached = {
            let _guard = NoGrad::new();
            track(&(w.as_tensor() * 2.0)?)
        };
        let grads = detached.sum_all()?.backward()?;
        assert!(grads.get(w.as_tensor()).is_none());
        Ok(())
    }
}

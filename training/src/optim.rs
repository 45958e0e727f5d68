use candle_core::backprop::GradStore;
use candle_core::{DType, Device, Result, Tensor, Var};
use candle_nn::{AdamW, Optimizer, SGD};

use crate::mode::ensure_grad_enabled;

pub type DeferredSgd = Deferred<SGD>;
pub type DeferredAdamW = Deferred<AdamW>;

/// Optimizer wrapper that only updates parameters when a scope succeeds.
///
/// Gradients of every [`PendingStep::backward`] inside a scope are summed and
/// handed to the wrapped optimizer on [`PendingStep::commit`]. If the scope
/// ends any other way (error, panic, dropped guard) the parameters are left
/// untouched.
///
/// ```
/// use candle_core::{Device, Var};
/// use training::DeferredSgd;
///
/// # fn main() -> candle_core::Result<()> {
/// let w = Var::new(&[1f32, 2.], &Device::Cpu)?;
/// let mut opt = DeferredSgd::new(vec![w.clone()], 0.1)?;
///
/// let failed: candle_core::Result<()> = opt.run(|step| {
///     step.backward(&w.as_tensor().sum_all()?)?;
///     Err(candle_core::Error::Msg("diverged".into()))
/// });
/// assert!(failed.is_err());
/// assert_eq!(w.as_tensor().to_vec1::<f32>()?, vec![1., 2.]);
///
/// opt.run(|step| step.backward(&w.as_tensor().sum_all()?))?;
/// assert_eq!(w.as_tensor().to_vec1::<f32>()?, vec![0.9, 1.9]);
/// # Ok(())
/// # }
/// ```
pub struct Deferred<O> {
    inner: O,
    vars: Vec<Var>,
}

impl<O: Optimizer> Deferred<O> {
    pub fn new(vars: Vec<Var>, config: O::Config) -> Result<Self> {
        let inner = O::new(vars.clone(), config)?;
        Ok(Self { inner, vars })
    }

    /// Opens a scope with zeroed gradients.
    pub fn begin(&mut self) -> PendingStep<'_, O> {
        PendingStep {
            owner: self,
            grads: None,
            backwards: 0,
        }
    }

    /// Runs `f` inside a scope and applies the update if it returns `Ok`.
    ///
    /// An error from `f` is returned as is, without updating anything.
    pub fn run<R, E, F>(&mut self, f: F) -> std::result::Result<R, E>
    where
        F: FnOnce(&mut PendingStep<'_, O>) -> std::result::Result<R, E>,
        E: From<candle_core::Error>,
    {
        let mut step = self.begin();
        let value = f(&mut step)?;
        step.commit()?;
        Ok(value)
    }

    pub fn vars(&self) -> &[Var] {
        &self.vars
    }

    pub fn inner(&self) -> &O {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut O {
        &mut self.inner
    }

    pub fn into_inner(self) -> O {
        self.inner
    }

    pub fn learning_rate(&self) -> f64 {
        self.inner.learning_rate()
    }

    pub fn set_learning_rate(&mut self, lr: f64) {
        self.inner.set_learning_rate(lr);
    }
}

/// An open scope of a [`Deferred`] optimizer.
#[must_use = "the update is discarded unless the step is committed"]
pub struct PendingStep<'a, O: Optimizer> {
    owner: &'a mut Deferred<O>,
    grads: Option<GradStore>,
    backwards: usize,
}

impl<O: Optimizer> PendingStep<'_, O> {
    /// Runs backward on `loss` and adds the gradients to the pending update.
    ///
    /// Only the gradients of the wrapped optimizer's variables are kept.
    pub fn backward(&mut self, loss: &Tensor) -> Result<()> {
        ensure_grad_enabled()?;
        let grads = loss.backward()?;

        let mut acc = match self.grads.take() {
            Some(acc) => acc,
            None => empty_store(loss.device())?,
        };
        let added = accumulate(&mut acc, &grads, &self.owner.vars);
        self.grads = Some(acc);
        added?;

        self.backwards += 1;
        Ok(())
    }

    /// Number of backward passes accumulated so far.
    pub fn backwards(&self) -> usize {
        self.backwards
    }

    /// Accumulated gradients, `None` before the first backward.
    pub fn grads(&self) -> Option<&GradStore> {
        self.grads.as_ref()
    }

    /// Applies the accumulated gradients. Without any backward this is a no-op.
    pub fn commit(mut self) -> Result<()> {
        if let Some(grads) = self.grads.take() {
            self.owner.inner.step(&grads)?;
        }
        Ok(())
    }

    pub fn discard(self) {}
}

// candle has no public constructor for an empty store; backward of a fresh
// untracked scalar yields one holding only that scalar.
fn empty_store(device: &Device) -> Result<GradStore> {
    Tensor::zeros((), DType::F32, device)?.backward()
}

fn accumulate(acc: &mut GradStore, grads: &GradStore, vars: &[Var]) -> Result<()> {
    for var in vars {
        let var = var.as_tensor();
        if let Some(grad) = grads.get(var) {
            let sum = match acc.get(var) {
                Some(prev) => (prev + grad)?,
                None => grad.clone(),
            };
            acc.insert(var, sum);
        }
    }
    Ok(())
}

impl<O: Optimizer> Drop for PendingStep<'_, O> {
    fn drop(&mut self) {
        if self.grads.is_some() {
            log::debug!(
                "Discarding deferred update of {} backward passes",
                self.backwards
            );
        }
    }
}

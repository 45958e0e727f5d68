use crate::mode::{NoGrad, Train};

/// Puts `models` in inference mode with gradient tracking disabled.
///
/// ```
/// use training::{evaluate, is_grad_enabled, Train, TrainMode};
///
/// let model = TrainMode::default();
/// {
///     let _eval = evaluate(&[&model]);
///     assert!(!model.is_training());
///     assert!(!is_grad_enabled());
/// }
/// assert!(model.is_training());
/// assert!(is_grad_enabled());
/// ```
///
/// # Panics
///
/// If `models` is empty.
pub fn evaluate<'a>(models: &[&'a dyn Train]) -> Evaluation<'a> {
    assert!(!models.is_empty(), "evaluate needs at least one model");

    let modes = models.iter().map(|model| model.is_training()).collect();
    for model in models {
        model.eval();
    }

    Evaluation {
        models: models.to_vec(),
        modes,
        _no_grad: NoGrad::new(),
    }
}

/// Guard returned by [`evaluate`].
///
/// Dropping it restores gradient tracking and each model's previous mode.
#[must_use = "evaluation mode ends as soon as the guard is dropped"]
pub struct Evaluation<'a> {
    models: Vec<&'a dyn Train>,
    modes: Vec<bool>,
    _no_grad: NoGrad,
}

impl Evaluation<'_> {
    /// Runs `f` with `models` in inference mode.
    pub fn run<R>(models: &[&dyn Train], f: impl FnOnce() -> R) -> R {
        let _eval = evaluate(models);
        f()
    }
}

impl Drop for Evaluation<'_> {
    fn drop(&mut self) {
        for (model, &mode) in self.models.iter().zip(&self.modes) {
            model.train(mode);
        }
    }
}

use clap::{Parser, ValueEnum};

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerKind {
    Sgd,
    Adamw,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "Regression Trainer")]
#[command(version = "0.1.0")]
pub struct Args {
    /// Number of samples per training batch.
    #[arg(long, default_value_t = 64)]
    pub batch_size: usize,

    /// Initial learning rate for optimizer.
    #[arg(long, default_value_t = 0.01)]
    pub learning_rate: f64,

    /// Maximum number of training epochs.
    #[arg(long, default_value_t = 100)]
    pub epochs: usize,

    /// Epochs without improvement that are tolerated before early stopping.
    #[arg(long, default_value_t = 5)]
    pub patience: u64,

    /// Minimum decrease of the validation loss that counts as improvement.
    #[arg(long, default_value_t = 1e-4)]
    pub min_delta: f64,

    /// Learning rate decay factor per epoch.
    #[arg(long, default_value_t = 0.98)]
    pub lr_decay: f64,

    /// Batches whose gradients are summed into one optimizer update.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    pub accumulate: u64,

    /// Absolute error at which the Huber loss turns from quadratic to linear.
    #[arg(long, default_value_t = 1.0)]
    pub huber_delta: f64,

    #[arg(long, value_enum, default_value_t = OptimizerKind::Adamw)]
    pub optimizer: OptimizerKind,

    /// Number of synthetic samples to generate.
    #[arg(long, default_value_t = 8192)]
    pub samples: usize,

    /// Number of input features per sample.
    #[arg(long, default_value_t = 16)]
    pub features: usize,

    /// Amplitude of the uniform noise added to targets.
    #[arg(long, default_value_t = 0.05)]
    pub noise: f32,

    /// Fraction of data for validation set.
    #[arg(long, default_value_t = 0.1)]
    pub val_ratio: f64,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Train on the CPU even when an accelerator is available.
    #[arg(long)]
    pub cpu: bool,

    /// Where the best model is saved.
    #[arg(long, default_value = "model.safetensors")]
    pub model_path: String,
}

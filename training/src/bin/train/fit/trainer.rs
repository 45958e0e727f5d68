use candle_core::{DType, Device, Tensor};
use candle_nn::{Module, Optimizer, VarBuilder, VarMap};
use std::error::Error;
use std::path::{Path, PathBuf};
use training::{learn, Deferred, ProgressTracker, Status, Train};

use crate::args::Args;
use crate::data::Dataset;
use crate::model::Regressor;
use crate::fit::evaluation::validation_loss;
use crate::fit::progress::TrainingProgressBar;
use crate::utils::device::select_device;
use crate::utils::loss::huber;

#[derive(Debug)]
enum AccumulateError {
    Candle(candle_core::Error),
    NonFinite(f64),
}

impl From<candle_core::Error> for AccumulateError {
    fn from(err: candle_core::Error) -> Self {
        Self::Candle(err)
    }
}

pub struct Trainer<O: Optimizer> {
    network: Regressor,
    optimizer: Deferred<O>,
    varmap: VarMap,
    device: Device,
    batch_size: usize,
    accumulate: usize,
    huber_delta: f64,
    epochs: usize,
    lr_decay: f64,
    patience: u64,
    min_delta: f64,
    model_path: PathBuf,
}

impl<O: Optimizer> Trainer<O> {
    pub fn new(
        args: &Args,
        num_features: usize,
        config: O::Config,
    ) -> Result<Self, Box<dyn Error>> {
        let device = select_device(args.cpu)?;

        let varmap = VarMap::new();
        let vs = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let network = Regressor::new(&vs, num_features)?;
        let optimizer = Deferred::new(varmap.all_vars(), config)?;

        Ok(Self {
            network,
            optimizer,
            varmap,
            device,
            batch_size: args.batch_size,
            accumulate: args.accumulate as usize,
            huber_delta: args.huber_delta,
            epochs: args.epochs,
            lr_decay: args.lr_decay,
            patience: args.patience,
            min_delta: args.min_delta,
            model_path: PathBuf::from(&args.model_path),
        })
    }

    /// Trains until the epoch budget is spent or validation stops improving,
    /// then restores the best checkpoint. Returns its validation loss, or the
    /// best training loss when there is no validation split.
    pub fn train(&mut self, dataset: &mut Dataset) -> Result<Option<f64>, Box<dyn Error>> {
        // The tracker maximizes, so it is fed negated losses
        let mut progress = ProgressTracker::new(Some(self.patience), self.min_delta);

        for epoch in 1..=self.epochs {
            let val_loss = self.train_epoch(epoch, dataset)?;

            match progress.update(-val_loss) {
                Status::Success => {
                    if let Err(err) = self.save_model() {
                        log::warn!("Failed to save checkpoint: {}", err);
                    }
                }
                Status::Fail => {
                    log::info!("Early stopping after {} epochs", epoch);
                    break;
                }
                Status::Neutral => {}
            }

            self.decay_learning_rate();
        }

        self.load_model()?;
        let loss = match self.validate(dataset)? {
            Some(loss) => {
                log::info!("Best validation loss: {:.6}", loss);
                Some(loss)
            }
            None => {
                let loss = progress.best_score().map(|score| -score);
                match loss {
                    Some(loss) => log::info!("No validation data, best training loss: {:.6}", loss),
                    None => log::warn!("No epochs were run"),
                }
                loss
            }
        };

        Ok(loss)
    }

    fn train_epoch(&mut self, epoch: usize, dataset: &mut Dataset) -> Result<f64, Box<dyn Error>> {
        dataset.shuffle();

        let batches = dataset
            .train_batches(self.batch_size, &self.device)
            .collect::<candle_core::Result<Vec<_>>>()?;
        let num_updates = batches.len().div_ceil(self.accumulate);

        let progress = TrainingProgressBar::new(epoch, num_updates)?;

        let mut total_loss = 0.0;
        let mut updates = 0usize;
        let mut skipped = 0usize;
        let mut train_loss = 0.0;

        for chunk in batches.chunks(self.accumulate) {
            let loss = if self.accumulate == 1 {
                let (x, y) = &chunk[0];
                self.learn_batch(x, y)?
            } else {
                self.learn_accumulated(chunk)?
            };

            if loss.is_finite() {
                total_loss += loss;
                updates += 1;
                train_loss = total_loss / updates as f64;
            } else {
                skipped += 1;
            }
            progress.update(train_loss, skipped);
        }

        let val_loss = self.validate(dataset)?.unwrap_or(train_loss);

        progress.finish(val_loss, train_loss);

        Ok(val_loss)
    }

    fn learn_batch(&mut self, x: &Tensor, y: &Tensor) -> candle_core::Result<f64> {
        let network = &self.network;
        let learned = learn(
            network,
            self.optimizer.inner_mut(),
            |preds: &Tensor| huber(preds, y, self.huber_delta),
            |x: &Tensor| network.forward(x),
            x,
        )?;
        Ok(learned.loss)
    }

    /// One update from the summed gradients of `chunk`. A non-finite loss in
    /// any of the batches drops the whole update.
    fn learn_accumulated(&mut self, chunk: &[(Tensor, Tensor)]) -> candle_core::Result<f64> {
        let network = &self.network;
        let delta = self.huber_delta;
        network.train(true);

        let scale = chunk.len() as f64;
        let outcome: Result<f64, AccumulateError> = self.optimizer.run(|step| {
            let mut total = 0.0;
            for (x, y) in chunk {
                let loss = huber(&network.forward(x)?, y, delta)?;
                let value = loss.to_vec0::<f32>()? as f64;
                if !value.is_finite() {
                    return Err(AccumulateError::NonFinite(value));
                }
                step.backward(&(loss / scale)?)?;
                total += value;
            }
            Ok(total / scale)
        });

        match outcome {
            Ok(loss) => Ok(loss),
            Err(AccumulateError::NonFinite(value)) => {
                log::warn!("Discarding accumulated update, loss value is not finite: {value}");
                Ok(value)
            }
            Err(AccumulateError::Candle(err)) => Err(err),
        }
    }

    fn validate(&self, dataset: &Dataset) -> candle_core::Result<Option<f64>> {
        validation_loss(
            &self.network,
            dataset.val_batches(self.batch_size, &self.device),
            self.huber_delta,
        )
    }

    fn decay_learning_rate(&mut self) {
        if self.lr_decay < 1.0 {
            let new_lr = self.optimizer.learning_rate() * self.lr_decay;
            self.optimizer.set_learning_rate(new_lr);
        }
    }

    fn save_model(&self) -> Result<(), Box<dyn Error>> {
        self.varmap.save(&self.model_path)?;
        Ok(())
    }

    fn load_model(&mut self) -> Result<(), Box<dyn Error>> {
        let path: &Path = &self.model_path;
        if path.exists() {
            self.varmap.load(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_nn::{AdamW, ParamsAdamW, SGD};
    use clap::Parser;

    fn args(dir: &tempfile::TempDir, extra: &[&str]) -> Args {
        let model_path = dir.path().join("model.safetensors");
        let mut argv = vec![
            "train".to_string(),
            "--samples".to_string(),
            "512".to_string(),
            "--features".to_string(),
            "4".to_string(),
            "--epochs".to_string(),
            "5".to_string(),
            "--model-path".to_string(),
            model_path.to_string_lossy().to_string(),
            "--cpu".to_string(),
        ];
        argv.extend(extra.iter().map(|s| s.to_string()));
        Args::parse_from(argv)
    }

    fn dataset(args: &Args) -> Dataset {
        Dataset::synthetic(
            args.samples,
            args.features,
            args.noise,
            args.val_ratio,
            args.seed,
        )
    }

    #[test]
    fn test_training_improves_and_saves_checkpoint() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let args = args(&dir, &[]);
        let mut dataset = dataset(&args);

        let mut trainer = Trainer::<AdamW>::new(
            &args,
            dataset.num_features(),
            ParamsAdamW {
                lr: args.learning_rate,
                ..Default::default()
            },
        )?;
        let initial = trainer.validate(&dataset)?.ok_or("no validation data")?;
        let best = trainer.train(&mut dataset)?.ok_or("no best loss")?;

        assert!(best < initial);
        assert!(dir.path().join("model.safetensors").exists());
        assert!(trainer.network.is_training());
        Ok(())
    }

    #[test]
    fn test_accumulated_training_improves() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let args = args(&dir, &["--accumulate", "3", "--optimizer", "sgd"]);
        let mut dataset = dataset(&args);

        let mut trainer = Trainer::<SGD>::new(&args, dataset.num_features(), 0.2)?;
        let initial = trainer.validate(&dataset)?.ok_or("no validation data")?;
        let best = trainer.train(&mut dataset)?.ok_or("no best loss")?;

        assert!(best < initial);
        Ok(())
    }

    #[test]
    fn test_without_validation_split_reports_training_loss() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let args = args(&dir, &["--val-ratio", "0"]);
        let mut dataset = dataset(&args);
        assert_eq!(dataset.val_len(), 0);

        let mut trainer = Trainer::<SGD>::new(&args, dataset.num_features(), 0.05)?;
        assert_eq!(trainer.validate(&dataset)?, None);

        let best = trainer.train(&mut dataset)?.ok_or("no best loss")?;
        assert!(best.is_finite());
        assert!(best > 0.0);
        Ok(())
    }

    #[test]
    fn test_non_finite_batch_discards_accumulated_update() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let args = args(&dir, &["--accumulate", "2"]);
        let dataset = dataset(&args);

        let mut trainer = Trainer::<SGD>::new(&args, dataset.num_features(), 0.1)?;
        let before: Vec<Vec<f32>> = trainer
            .varmap
            .all_vars()
            .iter()
            .map(|var| var.as_tensor().flatten_all()?.to_vec1::<f32>())
            .collect::<candle_core::Result<_>>()?;

        let mut batches = dataset
            .train_batches(8, &trainer.device)
            .take(2)
            .collect::<candle_core::Result<Vec<_>>>()?;
        let (x, y) = batches.pop().ok_or("no batches")?;
        let nan = (y.ones_like()? * f64::NAN)?;
        batches.push((x, nan));

        let loss = trainer.learn_accumulated(&batches)?;
        assert!(loss.is_nan());

        let after: Vec<Vec<f32>> = trainer
            .varmap
            .all_vars()
            .iter()
            .map(|var| var.as_tensor().flatten_all()?.to_vec1::<f32>())
            .collect::<candle_core::Result<_>>()?;
        assert_eq!(before, after);
        Ok(())
    }
}

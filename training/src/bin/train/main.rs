mod args;
mod data;
mod fit;
mod model;
mod utils;

use args::{Args, OptimizerKind};
use candle_nn::{AdamW, ParamsAdamW, SGD};
use clap::Parser;
use data::Dataset;
use fit::trainer::Trainer;
use log::LevelFilter;
use simplelog::{Config, SimpleLogger};
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    let args = init()?;

    let mut dataset = Dataset::synthetic(
        args.samples,
        args.features,
        args.noise,
        args.val_ratio,
        args.seed,
    );
    log::info!(
        "Generated {} training and {} validation samples",
        dataset.train_len(),
        dataset.val_len()
    );

    log::info!("Training network with {:?}", args.optimizer);
    let num_features = dataset.num_features();
    match args.optimizer {
        OptimizerKind::Sgd => {
            let mut trainer = Trainer::<SGD>::new(&args, num_features, args.learning_rate)?;
            trainer.train(&mut dataset)?;
        }
        OptimizerKind::Adamw => {
            let params = ParamsAdamW {
                lr: args.learning_rate,
                ..Default::default()
            };
            let mut trainer = Trainer::<AdamW>::new(&args, num_features, params)?;
            trainer.train(&mut dataset)?;
        }
    }

    log::info!("Best model saved to {}", args.model_path);
    Ok(())
}

fn init() -> Result<Args, Box<dyn Error>> {
    let args = Args::parse();
    SimpleLogger::init(LevelFilter::Info, Config::default())?;

    Ok(args)
}

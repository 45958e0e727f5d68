use candle_core::{Result, Tensor};
use candle_nn::{linear, Dropout, Linear, Module, VarBuilder};
use training::{track, Train, TrainMode};

const HIDDEN_SIZE: usize = 32;
const DROPOUT: f32 = 0.1;

pub struct Regressor {
    hidden: Linear,
    output: Linear,
    dropout: Dropout,
    mode: TrainMode,
}

impl Regressor {
    pub fn new(vs: &VarBuilder, num_features: usize) -> Result<Self> {
        Ok(Self {
            hidden: linear(num_features, HIDDEN_SIZE, vs.pp("hidden"))?,
            output: linear(HIDDEN_SIZE, 1, vs.pp("output"))?,
            dropout: Dropout::new(DROPOUT),
            mode: TrainMode::default(),
        })
    }
}

impl Module for Regressor {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let x = x.apply(&self.hidden)?.relu()?;
        let x = self.dropout.forward(&x, self.mode.is_training())?;
        let x = x.apply(&self.output)?;

        Ok(track(&x))
    }
}

impl Train for Regressor {
    fn train(&self, mode: bool) {
        self.mode.train(mode);
    }

    fn is_training(&self) -> bool {
        self.mode.is_training()
    }
}

use candle_core::{Device, Result, Tensor};
use rand::prelude::*;
use rand::rngs::StdRng;

/// Synthetic linear regression data: `y = x·w + b + noise`.
pub struct Dataset {
    features: Vec<f32>,
    targets: Vec<f32>,
    num_features: usize,
    train_idx: Vec<usize>,
    val_idx: Vec<usize>,
    rng: StdRng,
}

impl Dataset {
    pub fn synthetic(
        num_samples: usize,
        num_features: usize,
        noise: f32,
        val_ratio: f64,
        seed: u64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);

        let weights: Vec<f32> = (0..num_features)
            .map(|_| rng.gen_range(-1.0..1.0))
            .collect();
        let bias: f32 = rng.gen_range(-0.5..0.5);

        let mut features = Vec::with_capacity(num_samples * num_features);
        let mut targets = Vec::with_capacity(num_samples);

        for _ in 0..num_samples {
            let mut y = bias;
            for w in &weights {
                let x: f32 = rng.gen_range(-1.0..1.0);
                features.push(x);
                y += x * w;
            }
            if noise > 0.0 {
                y += rng.gen_range(-noise..noise);
            }
            targets.push(y);
        }

        let mut indices: Vec<usize> = (0..num_samples).collect();
        indices.shuffle(&mut rng);

        let split = val_ratio.clamp(0.0, 0.9);
        let val_len = (num_samples as f64 * split) as usize;
        let train_idx = indices.split_off(val_len);

        Self {
            features,
            targets,
            num_features,
            train_idx,
            val_idx: indices,
            rng,
        }
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    pub fn train_len(&self) -> usize {
        self.train_idx.len()
    }

    pub fn val_len(&self) -> usize {
        self.val_idx.len()
    }

    pub fn shuffle(&mut self) {
        self.train_idx.shuffle(&mut self.rng);
    }

    pub fn train_batches<'a>(
        &'a self,
        batch_size: usize,
        device: &'a Device,
    ) -> impl Iterator<Item = Result<(Tensor, Tensor)>> + 'a {
        self.batches(&self.train_idx, batch_size, device)
    }

    pub fn val_batches<'a>(
        &'a self,
        batch_size: usize,
        device: &'a Device,
    ) -> impl Iterator<Item = Result<(Tensor, Tensor)>> + 'a {
        self.batches(&self.val_idx, batch_size, device)
    }

    fn batches<'a>(
        &'a self,
        indices: &'a [usize],
        batch_size: usize,
        device: &'a Device,
    ) -> impl Iterator<Item = Result<(Tensor, Tensor)>> + 'a {
        indices.chunks(batch_size.max(1)).map(move |chunk| {
            let mut x = Vec::with_capacity(chunk.len() * self.num_features);
            let mut y = Vec::with_capacity(chunk.len());
            for &i in chunk {
                let start = i * self.num_features;
                x.extend_from_slice(&self.features[start..start + self.num_features]);
                y.push(self.targets[i]);
            }

            let x = Tensor::from_vec(x, (chunk.len(), self.num_features), device)?;
            let y = Tensor::from_vec(y, (chunk.len(), 1), device)?;
            Ok((x, y))
        })
    }
}

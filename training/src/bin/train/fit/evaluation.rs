use candle_core::{Result, Tensor};
use candle_nn::Module;
use training::evaluate;

use crate::model::Regressor;
use crate::utils::loss::huber;

/// Mean loss over `batches`, computed in inference mode. `None` when there
/// are no batches.
pub fn validation_loss(
    network: &Regressor,
    batches: impl Iterator<Item = Result<(Tensor, Tensor)>>,
    huber_delta: f64,
) -> Result<Option<f64>> {
    let _eval = evaluate(&[network]);

    let mut total_loss = 0.0;
    let mut count = 0usize;

    for batch in batches {
        let (x, y) = batch?;
        let preds = network.forward(&x)?;
        total_loss += huber(&preds, &y, huber_delta)?.to_vec0::<f32>()? as f64;
        count += 1;
    }

    if count == 0 {
        return Ok(None);
    }
    Ok(Some(total_loss / count as f64))
}

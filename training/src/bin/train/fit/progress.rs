use indicatif::{ProgressBar, ProgressStyle};

pub struct TrainingProgressBar {
    bar: ProgressBar,
}

impl TrainingProgressBar {
    pub fn new(epoch: usize, num_batches: usize) -> Result<Self, Box<dyn std::error::Error>> {
        let bar = ProgressBar::new(num_batches as u64);
        bar.set_style(ProgressStyle::default_bar().template(
            "{prefix} {spinner:.cyan} {pos}/{len} [{wide_bar:.cyan/blue}] {eta_precise} | {msg}",
        )?);
        bar.set_prefix(format!("epoch {epoch}"));
        Ok(Self { bar })
    }

    pub fn update(&self, loss: f64, skipped: usize) {
        if skipped > 0 {
            self.bar
                .set_message(format!("loss: {:.5}, skipped: {}", loss, skipped));
        } else {
            self.bar.set_message(format!("loss: {:.5}", loss));
        }
        self.bar.inc(1);
    }

    pub fn finish(&self, val_loss: f64, train_loss: f64) {
        self.bar
            .set_message(format!("val: {:.5}, loss: {:.5}", val_loss, train_loss));

        self.bar.finish();
    }
}

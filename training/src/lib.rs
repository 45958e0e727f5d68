pub mod evaluate;
pub mod learn;
pub mod mode;
pub mod optim;
pub mod progress;

pub use evaluate::{evaluate, Evaluation};
pub use learn::{learn, Learned};
pub use mode::{is_grad_enabled, set_grad_enabled, track, NoGrad, Train, TrainMode};
pub use optim::{Deferred, DeferredAdamW, DeferredSgd, PendingStep};
pub use progress::{ProgressTracker, Status};

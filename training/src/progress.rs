/// Outcome of the most recent [`ProgressTracker::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    /// Neither an improvement nor a failure.
    #[default]
    Neutral,
    /// The last update changed the best score.
    Success,
    /// More than `patience` updates in a row failed to beat the best score.
    Fail,
}

/// Tracks the best score and tells when to stop early.
///
/// Greater scores are better. Feed it a negated loss when minimizing.
///
/// ```
/// use training::ProgressTracker;
///
/// let mut progress = ProgressTracker::new(Some(2), 0.0);
/// progress.update(-999999999.0);
/// assert!(progress.success()); // the first update always sets the best score
///
/// progress.update(123.0);
/// progress.update(0.0);
/// progress.update(123.0);
/// assert!(!progress.fail());
/// progress.update(123.0);
/// assert!(progress.fail());
/// assert_eq!(progress.best_score(), Some(123.0));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    best_score: Option<f64>,
    status: Status,
    bad_counter: u64,
    patience: Option<u64>,
    min_delta: f64,
}

impl ProgressTracker {
    /// `patience` is the number of bad updates that are tolerated: with a
    /// patience of 2, the third bad update in a row is a fail. Without
    /// patience the tracker never fails.
    ///
    /// `min_delta` is the margin a score must beat the best score by to count
    /// as an improvement.
    pub fn new(patience: Option<u64>, min_delta: f64) -> Self {
        Self {
            best_score: None,
            status: Status::Neutral,
            bad_counter: 0,
            patience,
            min_delta,
        }
    }

    /// Best score so far, `None` right after creation or [`reset`](Self::reset).
    pub fn best_score(&self) -> Option<f64> {
        self.best_score
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn success(&self) -> bool {
        self.status == Status::Success
    }

    pub fn fail(&self) -> bool {
        self.status == Status::Fail
    }

    /// Number of consecutive updates that did not improve the best score.
    pub fn bad_counter(&self) -> u64 {
        self.bad_counter
    }

    pub fn patience(&self) -> Option<u64> {
        self.patience
    }

    pub fn min_delta(&self) -> f64 {
        self.min_delta
    }

    pub fn update(&mut self, score: f64) -> Status {
        let improved = match self.best_score {
            None => true,
            Some(best) => score > best + self.min_delta,
        };

        if improved {
            self.set_success(score);
        } else {
            self.bad_counter += 1;
            self.status = match self.patience {
                Some(patience) if self.bad_counter > patience => Status::Fail,
                _ => Status::Neutral,
            };
        }
        self.status
    }

    /// Clears the bad update streak and the status. The best score is kept.
    pub fn forget_bad_updates(&mut self) {
        self.bad_counter = 0;
        self.status = Status::Neutral;
    }

    pub fn reset(&mut self) {
        self.forget_bad_updates();
        self.best_score = None;
    }

    fn set_success(&mut self, score: f64) {
        self.best_score = Some(score);
        self.status = Status::Success;
        self.bad_counter = 0;
    }
}

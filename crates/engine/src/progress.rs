/// Pipeline stage reported to a [`ProgressSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Filter,
    Rewrite,
    Polyfill,
    Verify,
    Score,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Filter => "filter",
            Stage::Rewrite => "rewrite",
            Stage::Polyfill => "polyfill",
            Stage::Verify => "verify",
            Stage::Score => "score",
        }
    }
}

/// Observer for long runs. Never influences the output of a run.
///
/// Called from worker threads during the rewrite stage.
pub trait ProgressSink: Sync {
    /// A stage starts; `units` is the number of files it will touch
    fn stage(&self, _stage: Stage, _units: usize) {}

    /// One file of the current stage is done
    fn advance(&self, _path: &str) {}

    fn finish(&self) {}
}

/// Default sink that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {}

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use sovereign_engine::{ProgressSink, Stage};

/// Terminal progress bar on stderr; one bar reused across stages.
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr());
        let style = ProgressStyle::with_template("{prefix:>8} [{bar:30}] {pos}/{len} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        bar.set_style(style);
        Self { bar }
    }
}

impl ProgressSink for BarProgress {
    fn stage(&self, stage: Stage, units: usize) {
        self.bar.set_prefix(stage.as_str());
        self.bar.set_length(units as u64);
        self.bar.set_position(0);
        self.bar.set_message("");
    }

    fn advance(&self, path: &str) {
        self.bar.set_message(path.to_string());
        self.bar.inc(1);
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

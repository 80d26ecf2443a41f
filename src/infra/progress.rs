// ============================================================
// Layer 6 — Training Progress Reporter
// ============================================================
// Aggregates per-step (loss, f1) pairs into running epoch
// averages and shows them on an indicatif bar:
//
//   epoch 2/10 [00:00:41] ========>----------- 40/100 loss=0.8123 f1=0.4410
//
// The running averages cover the current epoch only. Once an
// epoch's last iteration is recorded the averages stay readable
// (for the epoch summary line) until the next update, which
// starts a fresh epoch.

use indicatif::{ProgressBar, ProgressStyle};

/// Names of the values passed to `update`, in order.
pub const LABELS: [&str; 2] = ["loss", "f1"];

const TEMPLATE: &str = "{prefix} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}";

#[derive(Debug, Clone)]
pub struct TrainProgress {
    bar:      ProgressBar,
    n_epochs: usize,
    n_iter:   usize,
    epoch:    usize,
    iter:     usize,
    sums:     [f64; 2],
}

impl Default for TrainProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl TrainProgress {
    pub fn new() -> Self {
        let style = ProgressStyle::default_bar()
            .template(TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        let bar = ProgressBar::new(0);
        bar.set_style(style);
        Self { bar, n_epochs: 0, n_iter: 0, epoch: 0, iter: 0, sums: [0.0; 2] }
    }

    pub fn start(&mut self, n_epochs: usize, n_iter: usize) {
        self.n_epochs = n_epochs;
        self.n_iter   = n_iter;
        self.epoch    = 0;
        self.iter     = 0;
        self.sums     = [0.0; 2];
        self.bar.set_length(n_iter as u64);
        self.bar.set_position(0);
        self.bar.set_prefix(self.prefix());
        tracing::info!("Training for {} epochs x {} iterations", n_epochs, n_iter);
    }

    pub fn update(&mut self, values: [f64; 2]) {
        if self.n_iter > 0 && self.iter == self.n_iter {
            self.epoch += 1;
            self.iter = 0;
            self.sums = [0.0; 2];
            self.bar.reset();
            self.bar.set_prefix(self.prefix());
        }

        self.iter += 1;
        for (sum, v) in self.sums.iter_mut().zip(values) {
            *sum += v;
        }

        let [loss, f1] = self.now_values();
        self.bar.set_message(format!("{}={loss:.4} {}={f1:.4}", LABELS[0], LABELS[1]));
        self.bar.inc(1);

        if self.iter == self.n_iter {
            tracing::info!("{} {}/{} {}", self.prefix(), self.iter, self.n_iter, self.bar.message());
            if self.epoch + 1 == self.n_epochs {
                self.bar.finish();
            }
        }
    }

    /// Current epoch's mean of each value; zeros before the first update.
    pub fn now_values(&self) -> [f64; 2] {
        if self.iter == 0 {
            return [0.0; 2];
        }
        let n = self.iter as f64;
        [self.sums[0] / n, self.sums[1] / n]
    }

    fn prefix(&self) -> String {
        format!("epoch {}/{}", self.epoch + 1, self.n_epochs)
    }
}

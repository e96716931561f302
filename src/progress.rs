//! Progress reporting.
//!
//! The extraction loop pushes [`Snapshot`]s into a [`ProgressSink`] and
//! never reads anything back. Two terminal renderers are provided: a cell
//! grid for runs with a known total, and a scrolling bar for runs without.

use crate::state::Snapshot;

use indicatif::{HumanBytes, ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Receiver of extraction progress.
pub trait ProgressSink {
    /// Called at a bounded rate while extracting, then once more with
    /// `snapshot.termination` set when the loop stops on its own.
    ///
    /// When the run aborts with an error, the last call carries the
    /// counters at the point of failure and no termination.
    fn on_progress(&mut self, snapshot: &Snapshot);
}

impl<F: FnMut(&Snapshot)> ProgressSink for F {
    fn on_progress(&mut self, snapshot: &Snapshot) {
        self(snapshot)
    }
}

/// Discards all progress.
#[derive(Debug, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn on_progress(&mut self, _snapshot: &Snapshot) {}
}

const FULL_CELL: char = '█';
const EMPTY_CELL: char = '░';

/// Render `rows` lines of `cols` cells with the first `filled` cells full.
pub fn grid_text(cols: usize, rows: usize, filled: usize) -> String {
    let total = cols * rows;
    let filled = filled.min(total);
    (0..rows)
        .map(|r| {
            (0..cols)
                .map(|c| if r * cols + c < filled { FULL_CELL } else { EMPTY_CELL })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn counters(snapshot: &Snapshot) -> String {
    let mut line = format!(
        "zero-filled sectors: {}  |  rescues: {}",
        snapshot.zero_filled_sectors, snapshot.rescues
    );
    if let Some(termination) = snapshot.termination {
        line.push_str(&format!("  |  ({})", termination));
    }
    line
}

/// Cell grid that fills in proportion to the completed fraction.
pub struct GridRenderer {
    cols: usize,
    rows: usize,
    bar: ProgressBar,
}

impl GridRenderer {
    /// Draw to stderr.
    pub fn new(cols: usize, rows: usize) -> Self {
        Self::with_draw_target(cols, rows, ProgressDrawTarget::stderr())
    }

    /// Draw a `cols` by `rows` grid to `target`.
    pub fn with_draw_target(cols: usize, rows: usize, target: ProgressDrawTarget) -> Self {
        let bar = ProgressBar::with_draw_target(None, target);
        bar.set_style(ProgressStyle::with_template("{msg}").expect("static pattern"));
        Self {
            cols: cols.max(1),
            rows: rows.max(1),
            bar,
        }
    }

    /// Full text of one frame.
    pub fn frame(&self, snapshot: &Snapshot) -> String {
        let fraction = snapshot.fraction().unwrap_or(0.0);
        let cells = self.cols * self.rows;
        let filled = (cells as f64 * fraction) as usize;
        let total = snapshot
            .total
            .map_or_else(|| "?".to_string(), |t| HumanBytes(t).to_string());
        format!(
            "{}\n\nProgress: {:.2}%  |  {} of {}\nSpeed: {}/s  |  {}",
            grid_text(self.cols, self.rows, filled),
            fraction * 100.0,
            HumanBytes(snapshot.bytes_done),
            total,
            HumanBytes(snapshot.bytes_per_sec() as u64),
            counters(snapshot),
        )
    }
}

impl ProgressSink for GridRenderer {
    fn on_progress(&mut self, snapshot: &Snapshot) {
        self.bar.set_message(self.frame(snapshot));
        if snapshot.termination.is_some() {
            self.bar.finish();
        }
    }
}

/// Scrolling bar for runs without a known total.
///
/// Without a total there is no percentage, so the bar only shows that data
/// keeps arriving.
pub struct BarRenderer {
    bar: ProgressBar,
}

impl BarRenderer {
    /// Draw to stderr.
    pub fn new() -> Self {
        Self::with_draw_target(ProgressDrawTarget::stderr())
    }

    /// Draw the bar to `target`.
    pub fn with_draw_target(target: ProgressDrawTarget) -> Self {
        let bar = ProgressBar::with_draw_target(None, target);
        bar.set_style(
            ProgressStyle::with_template("[{spinner:.cyan}] {bytes} | {bytes_per_sec} | {msg}")
                .expect("static pattern")
                .tick_chars("▏▎▍▌▋▊▉█░"),
        );
        Self { bar }
    }
}

impl Default for BarRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for BarRenderer {
    fn on_progress(&mut self, snapshot: &Snapshot) {
        self.bar.set_position(snapshot.bytes_done);
        self.bar.set_message(counters(snapshot));
        if snapshot.termination.is_some() {
            self.bar.finish();
        } else {
            self.bar.tick();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Termination;
    use std::time::Duration;

    fn snapshot(bytes_done: u64, total: Option<u64>) -> Snapshot {
        Snapshot {
            bytes_done,
            total,
            zero_filled_sectors: 3,
            rescues: 7,
            elapsed: Duration::from_secs(1),
            termination: None,
        }
    }

    #[test]
    fn test_grid_text() {
        assert_eq!(grid_text(3, 2, 4), "███\n█░░");
        assert_eq!(grid_text(2, 2, 0), "░░\n░░");
        assert_eq!(grid_text(2, 1, 10), "██");
    }

    #[test]
    fn test_grid_frame() {
        let grid = GridRenderer::with_draw_target(4, 2, ProgressDrawTarget::hidden());
        let frame = grid.frame(&snapshot(512, Some(1024)));
        assert!(frame.starts_with("████\n░░░░\n"));
        assert!(frame.contains("Progress: 50.00%"));
        assert!(frame.contains("zero-filled sectors: 3"));
        assert!(frame.contains("rescues: 7"));

        // Overshooting the estimate keeps the grid full, not overflowing.
        let frame = grid.frame(&snapshot(4096, Some(1024)));
        assert!(frame.starts_with("████\n████\n"));
        assert!(frame.contains("Progress: 100.00%"));
    }

    #[test]
    fn test_final_note() {
        let mut snap = snapshot(0, None);
        snap.termination = Some(Termination::ZeroTail);
        assert!(counters(&snap).contains("long run of zeros"));

        let mut bar = BarRenderer::with_draw_target(ProgressDrawTarget::hidden());
        bar.on_progress(&snapshot(10, None));
        bar.on_progress(&snap);
        assert!(bar.bar.is_finished());
    }

    #[test]
    fn test_closure_sink() {
        let mut seen = Vec::new();
        {
            let mut sink = |s: &Snapshot| seen.push(s.bytes_done);
            sink.on_progress(&snapshot(1, None));
            sink.on_progress(&snapshot(2, None));
        }
        assert_eq!(seen, vec![1, 2]);
    }
}

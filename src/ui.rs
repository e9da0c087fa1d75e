//! Terminal presentation for the assistant CLI.
//!
//! `Ui::stage` wraps setup steps in a spinner (or a plain `==>` line), and
//! `LabelView` renders the presentation label as it changes.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

use crate::presentation::PresentationSnapshot;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool) -> Self {
        Self { mode, is_tty }
    }

    pub fn from_flag(ui_flag: Option<&str>, is_tty: bool) -> Self {
        let mode = match ui_flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, is_tty)
    }

    fn pretty(&self) -> bool {
        self.is_tty && self.mode != UiMode::Plain
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        if self.pretty() {
            let spinner = spinner();
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }

    pub fn label_view(&self) -> LabelView {
        LabelView {
            spinner: self.pretty().then(spinner),
            last_label: None,
        }
    }
}

fn spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_draw_target(ProgressDrawTarget::stderr());
    spinner.enable_steady_tick(Duration::from_millis(120));
    let style = ProgressStyle::with_template("{spinner} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    spinner.set_style(style);
    spinner
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let message = format!("✔ {} ({})", self.name, format_duration(self.start.elapsed()));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

/// Live rendering of the presentation label.
pub struct LabelView {
    spinner: Option<ProgressBar>,
    last_label: Option<String>,
}

impl LabelView {
    pub fn show(&mut self, snapshot: &PresentationSnapshot) {
        let line = describe(snapshot);
        match &self.spinner {
            Some(spinner) => spinner.set_message(line),
            None => {
                if self.last_label.as_deref() != Some(snapshot.label.as_str()) {
                    println!("{line}");
                }
            }
        }
        self.last_label = Some(snapshot.label.clone());
    }

    pub fn finish(self) {
        if let Some(spinner) = self.spinner {
            spinner.finish_and_clear();
        }
    }
}

fn describe(snapshot: &PresentationSnapshot) -> String {
    match (&snapshot.last_result, &snapshot.last_error) {
        (Some(result), _) => match result.top() {
            Some(top) => format!(
                "{} ({:.0}%, {}ms)",
                snapshot.label,
                top.confidence * 100.0,
                result.inference_time_ms
            ),
            None => format!("{} ({}ms)", snapshot.label, result.inference_time_ms),
        },
        (None, Some(err)) => format!("{} [{}]", snapshot.label, err),
        (None, None) => snapshot.label.clone(),
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

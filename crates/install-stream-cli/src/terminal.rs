use install_stream::{
    DisplayedProgress, LogEvent, LogSink, ProgressColor, ProgressSink, StatusKind, StatusSink,
};

const BAR_WIDTH: usize = 20;

/// Prints log lines, progress changes and status transitions to stdout.
#[derive(Default)]
pub struct TerminalSink;

impl TerminalSink {
    pub fn new() -> Self {
        Self
    }
}

impl LogSink for TerminalSink {
    fn append(&self, event: &LogEvent) {
        println!("{}", event.render_line());
    }
}

impl ProgressSink for TerminalSink {
    fn render(&self, progress: DisplayedProgress) {
        println!("{}", progress_bar(progress));
    }
}

impl StatusSink for TerminalSink {
    fn set_status(&self, status: StatusKind) {
        println!("-- {}", status.label());
    }
}

pub fn progress_bar(progress: DisplayedProgress) -> String {
    let percent = progress.percent.min(100);
    let filled = usize::from(percent) * BAR_WIDTH / 100;
    let mut line = format!(
        "[{}{}] {percent:>3}%",
        "#".repeat(filled),
        "-".repeat(BAR_WIDTH - filled)
    );
    if progress.color == ProgressColor::Error {
        line.push_str(" (erreur)");
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bar_fills_proportionally() {
        let bar = progress_bar(DisplayedProgress {
            percent: 50,
            color: ProgressColor::Normal,
        });
        assert_eq!(bar, "[##########----------]  50%");
    }

    #[test]
    fn error_bar_is_flagged() {
        let bar = progress_bar(DisplayedProgress {
            percent: 100,
            color: ProgressColor::Error,
        });
        assert_eq!(bar, "[####################] 100% (erreur)");
    }

    #[test]
    fn empty_bar() {
        assert_eq!(
            progress_bar(DisplayedProgress::default()),
            "[--------------------]   0%"
        );
    }
}

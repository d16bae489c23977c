//! Success / partial success / failure decision over an event history.

use serde::{Deserialize, Serialize};

use crate::event::{LogEvent, LogLevel};

/// ERROR texts that mean the operation cannot go on.
pub const TERMINAL_ERROR_PHRASES: [&str; 3] = [
    "L'installation ne peut pas continuer",
    "Échec complet de l'installation",
    "Le fichier téléchargé est vide ou n'existe pas",
];

/// SUCCESS texts that mean the operation finished.
pub const SUCCESS_PHRASES: [&str; 2] = ["terminée avec succès", "Installation réussie"];

/// Final classification of an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Success,
    PartialSuccess,
    Failure,
}

impl Outcome {
    /// Anything but `Failure` counts as success for completion callbacks.
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failure)
    }
}

/// The three independent signals read from a history.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Evaluation {
    /// An ERROR event contains a hard-stop phrase.
    pub terminal_error: bool,
    /// An ERROR event exists that is not a hard stop.
    pub critical_error: bool,
    /// A SUCCESS event contains a completion phrase.
    pub success_signal: bool,
}

impl Evaluation {
    pub fn scan<'a>(history: impl IntoIterator<Item = &'a LogEvent>) -> Self {
        let mut evaluation = Self::default();
        for event in history {
            match event.level {
                LogLevel::Error => {
                    if contains_any(&event.text, &TERMINAL_ERROR_PHRASES) {
                        evaluation.terminal_error = true;
                    } else {
                        evaluation.critical_error = true;
                    }
                }
                LogLevel::Success if contains_any(&event.text, &SUCCESS_PHRASES) => {
                    evaluation.success_signal = true;
                }
                _ => {}
            }
        }
        evaluation
    }

    /// The stream can be finalised: either a success phrase or a hard stop arrived.
    pub fn is_terminal(&self) -> bool {
        self.success_signal || self.terminal_error
    }

    pub fn outcome(&self) -> Outcome {
        match (self.success_signal, self.terminal_error, self.critical_error) {
            (true, false, false) => Outcome::Success,
            (true, false, true) => Outcome::PartialSuccess,
            _ => Outcome::Failure,
        }
    }
}

/// Classifies a full history.
pub fn evaluate<'a>(history: impl IntoIterator<Item = &'a LogEvent>) -> Outcome {
    Evaluation::scan(history).outcome()
}

fn contains_any(text: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|phrase| text.contains(phrase))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn success(text: &str) -> LogEvent {
        LogEvent::remote(LogLevel::Success, text)
    }

    fn error(text: &str) -> LogEvent {
        LogEvent::remote(LogLevel::Error, text)
    }

    #[test]
    fn success_phrase_alone_is_success() {
        assert_eq!(evaluate(&[success("terminée avec succès")]), Outcome::Success);
        assert_eq!(
            evaluate(&[success("Installation réussie pour module X")]),
            Outcome::Success
        );
    }

    #[test]
    fn non_terminal_error_with_success_is_partial() {
        let history = [success("terminée avec succès"), error("disk warning")];
        assert_eq!(evaluate(&history), Outcome::PartialSuccess);
    }

    #[test]
    fn terminal_error_beats_success_phrase() {
        let history = [
            success("terminée avec succès"),
            error("L'installation ne peut pas continuer"),
        ];
        assert_eq!(evaluate(&history), Outcome::Failure);
    }

    #[test]
    fn error_without_success_is_failure() {
        assert_eq!(evaluate(&[error("some other error")]), Outcome::Failure);
        assert_eq!(evaluate(&[] as &[LogEvent]), Outcome::Failure);
    }

    #[test]
    fn success_phrase_needs_success_level() {
        let history = [LogEvent::remote(LogLevel::Info, "Installation terminée avec succès")];
        let evaluation = Evaluation::scan(&history);
        assert!(!evaluation.success_signal);
        assert!(!evaluation.is_terminal());
    }

    #[test]
    fn terminal_phrase_needs_error_level() {
        let history = [LogEvent::remote(
            LogLevel::Warning,
            "Le fichier téléchargé est vide ou n'existe pas",
        )];
        assert_eq!(Evaluation::scan(&history), Evaluation::default());
    }

    #[test]
    fn hard_stop_is_terminal_without_success() {
        let evaluation = Evaluation::scan(&[error("Échec complet de l'installation")]);
        assert!(evaluation.terminal_error);
        assert!(!evaluation.critical_error);
        assert!(evaluation.is_terminal());
        assert_eq!(evaluation.outcome(), Outcome::Failure);
    }

    #[test]
    fn plain_error_is_not_terminal() {
        assert!(!Evaluation::scan(&[error("timeout while copying")]).is_terminal());
    }

    #[test]
    fn only_failure_is_unsuccessful() {
        assert!(Outcome::Success.is_success());
        assert!(Outcome::PartialSuccess.is_success());
        assert!(!Outcome::Failure.is_success());
    }
}

//! Maps installer log text to a progress percentage hint.

/// One row of the progress keyword table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProgressIndicator {
    pub keyword: &'static str,
    pub percent: u8,
}

/// Keyword table in declaration order. Percentages increase down the table.
pub const PROGRESS_INDICATORS: [ProgressIndicator; 5] = [
    ProgressIndicator {
        keyword: "Téléchargement",
        percent: 20,
    },
    ProgressIndicator {
        keyword: "Extraction réussie",
        percent: 30,
    },
    ProgressIndicator {
        keyword: "Installation des fichiers",
        percent: 50,
    },
    ProgressIndicator {
        keyword: "DÉBUT DU SCRIPT POST-INSTALLATION",
        percent: 70,
    },
    ProgressIndicator {
        keyword: "terminée avec succès",
        percent: 100,
    },
];

/// Returns the percentage of the first keyword contained in `text`.
///
/// Matching is a case-sensitive substring test; when several keywords occur
/// the one declared first wins.
pub fn classify(text: &str) -> Option<u8> {
    PROGRESS_INDICATORS
        .iter()
        .find(|indicator| text.contains(indicator.keyword))
        .map(|indicator| indicator.percent)
}

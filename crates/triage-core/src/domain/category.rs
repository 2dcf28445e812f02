use std::fmt;

use serde::{Deserialize, Serialize};

/// Fixed set of failure categories a diagnosis can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    Infrastructure,
    Test,
    Build,
    Configuration,
    Timeout,
    #[default]
    Unknown,
}

impl FailureCategory {
    pub const ALL: [FailureCategory; 6] = [
        FailureCategory::Infrastructure,
        FailureCategory::Test,
        FailureCategory::Build,
        FailureCategory::Configuration,
        FailureCategory::Timeout,
        FailureCategory::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::Infrastructure => "infrastructure",
            FailureCategory::Test => "test",
            FailureCategory::Build => "build",
            FailureCategory::Configuration => "configuration",
            FailureCategory::Timeout => "timeout",
            FailureCategory::Unknown => "unknown",
        }
    }

    /// Capitalised label used in report headers.
    pub fn title(&self) -> &'static str {
        match self {
            FailureCategory::Infrastructure => "Infrastructure",
            FailureCategory::Test => "Test",
            FailureCategory::Build => "Build",
            FailureCategory::Configuration => "Configuration",
            FailureCategory::Timeout => "Timeout",
            FailureCategory::Unknown => "Unknown",
        }
    }

    /// Map a free-form label produced by the reasoning service.
    ///
    /// Matching is case-insensitive and tolerates trailing words
    /// ("Infrastructure issue"). Anything unrecognised is `Unknown`.
    pub fn from_label(label: &str) -> Self {
        let normalized = label
            .trim()
            .trim_matches(|c: char| !c.is_ascii_alphanumeric())
            .to_ascii_lowercase();

        Self::ALL
            .into_iter()
            .find(|category| {
                normalized == category.as_str()
                    || normalized
                        .split(|c: char| !c.is_ascii_alphanumeric())
                        .next()
                        .is_some_and(|word| word == category.as_str())
            })
            .unwrap_or_default()
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

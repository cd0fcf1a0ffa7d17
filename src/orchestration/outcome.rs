use crate::shared::serde_ext::{deserialize_token, serialize_token, TokenEnum};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Result token a step reports when it finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Outcome {
    Success,
    Approved,
    Rejected,
    NeedsInput,
    Failure,
    /// The step process disappeared without writing an outcome record.
    Crashed,
}

impl Outcome {
    pub const ALL: [Outcome; 6] = [
        Outcome::Success,
        Outcome::Approved,
        Outcome::Rejected,
        Outcome::NeedsInput,
        Outcome::Failure,
        Outcome::Crashed,
    ];

    pub fn parse(raw: &str) -> Result<Self, String> {
        Self::parse_token(raw)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Approved => "approved",
            Outcome::Rejected => "rejected",
            Outcome::NeedsInput => "needs-input",
            Outcome::Failure => "failure",
            Outcome::Crashed => "crashed",
        }
    }

    pub fn requires_human(self) -> bool {
        matches!(self, Outcome::NeedsInput)
    }
}

impl TokenEnum for Outcome {
    const KIND: &'static str = "outcome";

    fn parse_token(raw: &str) -> Result<Self, String> {
        Outcome::ALL
            .into_iter()
            .find(|outcome| outcome.as_str() == raw)
            .ok_or_else(|| {
                let known = Outcome::ALL
                    .iter()
                    .map(|outcome| outcome.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("outcome must be one of: {known}")
            })
    }

    fn as_token(&self) -> &'static str {
        self.as_str()
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Outcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_token(self, serializer)
    }
}

impl<'de> Deserialize<'de> for Outcome {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserialize_token(deserializer)
    }
}

/// The record a step command writes to its outcome path on completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub outcome: Outcome,
    #[serde(default)]
    pub detail: String,
}

impl OutcomeRecord {
    pub fn new(outcome: Outcome, detail: impl Into<String>) -> Self {
        Self {
            outcome,
            detail: detail.into(),
        }
    }
}

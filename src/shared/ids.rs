use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};

const MAX_DISCRIMINATOR_LEN: usize = 64;
const RUN_ID_SEPARATOR: &str = "--";

pub fn validate_identifier_value(kind: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{kind} must be non-empty"));
    }
    if value.chars().all(is_identifier_char) {
        return Ok(());
    }
    Err(format!(
        "{kind} must use only ASCII letters, digits, '-' or '_'"
    ))
}

/// Workflow names may not contain the run id separator or end with `-`, so the
/// first `--` in a run id always marks where the workflow name ends.
pub fn validate_workflow_name(value: &str) -> Result<(), String> {
    validate_identifier_value("workflow name", value)?;
    if value.contains(RUN_ID_SEPARATOR) || value.ends_with('-') {
        return Err(format!(
            "workflow name must not contain `{RUN_ID_SEPARATOR}` or end with '-'"
        ));
    }
    Ok(())
}

fn is_identifier_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '-' || ch == '_'
}

macro_rules! define_id_type {
    ($name:ident, $kind:literal) => {
        define_id_type!($name, $kind, |raw| validate_identifier_value($kind, raw));
    };
    ($name:ident, $kind:literal, $validate:expr) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn parse(raw: &str) -> Result<Self, String> {
                let validate: fn(&str) -> Result<(), String> = $validate;
                validate(raw)?;
                Ok(Self(raw.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                self.as_str()
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let raw = String::deserialize(deserializer)?;
                Self::parse(&raw).map_err(|err| {
                    D::Error::custom(format!("invalid {} `{}`: {}", $kind, raw, err))
                })
            }
        }
    };
}

define_id_type!(WorkflowName, "workflow name", validate_workflow_name);
define_id_type!(StepName, "step name");
define_id_type!(RunId, "run id");

/// Derives the stable run id for a workflow subject.
///
/// Discriminators that are already valid identifiers are used verbatim so the id
/// stays readable (`pull-request-review--1234`). Anything else is sanitized and
/// suffixed with a short digest of the raw value, keeping distinct subjects apart.
pub fn derive_run_id(workflow_name: &str, discriminator: &str) -> Result<RunId, String> {
    validate_workflow_name(workflow_name)?;
    let trimmed = discriminator.trim();
    if trimmed.is_empty() {
        return Err("discriminator must be non-empty".to_string());
    }

    let verbatim = trimmed.len() <= MAX_DISCRIMINATOR_LEN && trimmed.chars().all(is_identifier_char);
    let subject = if verbatim {
        trimmed.to_string()
    } else {
        let mut sanitized = trimmed
            .chars()
            .map(|ch| if is_identifier_char(ch) { ch } else { '_' })
            .take(MAX_DISCRIMINATOR_LEN)
            .collect::<String>();
        sanitized.push('-');
        sanitized.push_str(&short_digest(trimmed));
        sanitized
    };

    RunId::parse(&format!("{workflow_name}{RUN_ID_SEPARATOR}{subject}"))
}

fn short_digest(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    let digest = hasher.finalize();
    digest[..8]
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect::<String>()
}

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serializer};

/// Closed vocabularies persisted as short string tokens.
pub trait TokenEnum: Sized {
    const KIND: &'static str;

    fn parse_token(raw: &str) -> Result<Self, String>;

    fn as_token(&self) -> &'static str;
}

pub fn serialize_token<S, T>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: TokenEnum,
{
    serializer.serialize_str(value.as_token())
}

pub fn deserialize_token<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: TokenEnum,
{
    let raw = String::deserialize(deserializer)?;
    T::parse_token(raw.trim())
        .map_err(|err| D::Error::custom(format!("invalid {} `{raw}`: {err}", T::KIND)))
}

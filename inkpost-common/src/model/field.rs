//! Validated free-text fields.
//!
//! Every user-supplied string that ends up in the store goes through one of the
//! newtypes generated by [`text_field!`], so a value of that type is known to be
//! non-blank and within its length limit.

use std::fmt::{Display, Formatter};
use thiserror::Error;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum InvalidFieldKind {
    Blank,
    TooLong { max_len: usize },
    Malformed,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
#[error("{field} {kind}")]
pub struct InvalidFieldError {
    pub field: &'static str,
    pub kind: InvalidFieldKind,
}

impl Display for InvalidFieldKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidFieldKind::Blank => f.write_str("must not be blank"),
            InvalidFieldKind::TooLong { max_len } => {
                write!(f, "must be at most {max_len} characters long")
            }
            InvalidFieldKind::Malformed => f.write_str("is malformed"),
        }
    }
}

pub(crate) fn check_text(
    field: &'static str,
    value: &str,
    max_len: usize,
    is_well_formed: fn(&str) -> bool,
) -> Result<(), InvalidFieldError> {
    let kind = if value.trim().is_empty() {
        InvalidFieldKind::Blank
    } else if value.chars().count() > max_len {
        InvalidFieldKind::TooLong { max_len }
    } else if !is_well_formed(value) {
        InvalidFieldKind::Malformed
    } else {
        return Ok(());
    };

    Err(InvalidFieldError { field, kind })
}

pub(crate) fn any_text(_: &str) -> bool {
    true
}

macro_rules! text_field {
    ($(#[$meta:meta])* $name:ident: $field:literal, max_len = $max_len:ident) => {
        text_field!($(#[$meta])* $name: $field, max_len = $max_len, check = $crate::model::field::any_text);
    };
    ($(#[$meta:meta])* $name:ident: $field:literal, max_len = $max_len:ident, check = $check:path) => {
        $(#[$meta])*
        #[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, serde::Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: String) -> Result<Self, $crate::model::field::InvalidFieldError> {
                $crate::model::field::check_text($field, &value, $max_len, $check)?;
                Ok(Self(value))
            }

            #[must_use]
            pub fn get(&self) -> &str {
                &self.0
            }

            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = $crate::model::field::InvalidFieldError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let inner = <String as serde::Deserialize<'de>>::deserialize(deserializer)?;
                Self::new(inner).map_err(serde::de::Error::custom)
            }
        }
    };
}

pub(crate) use text_field;

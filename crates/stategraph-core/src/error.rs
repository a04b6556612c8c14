#![forbid(unsafe_code)]

//! Errors for invariant violations.
//!
//! Routine failures (missing keys, blocked deletes, unknown ids) are not
//! errors: they log and return `false`/`None`. [`StateError`] is reserved for
//! misuse that has no sensible recovery.

/// Programmer-error invariant violations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// A one-way prop was requested from an object-typed store or state cell.
    ObjectPropUnsupported { name: String },
    /// A provided variable name is already registered in this view or an ancestor.
    DuplicateProvide { view: String, name: String },
    /// No ancestor provides the consumed name.
    MissingProvide { view: String, name: String },
    /// The provided variable exists but holds another value type.
    ProvideTypeMismatch { name: String, expected: &'static str },
    /// A store key is missing and no default was supplied.
    MissingDefault { key: String },
    /// A store key holds a value of another type.
    StoreTypeMismatch { key: String, expected: &'static str },
}

impl std::fmt::Display for StateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ObjectPropUnsupported { name } => write!(
                f,
                "'{name}': creating a prop from an object-typed source is unsupported, use a link"
            ),
            Self::DuplicateProvide { view, name } => {
                write!(f, "view '{view}' already provides '{name}'")
            }
            Self::MissingProvide { view, name } => {
                write!(f, "view '{view}' consumes '{name}' but no ancestor provides it")
            }
            Self::ProvideTypeMismatch { name, expected } => {
                write!(f, "provided variable '{name}' is not of type {expected}")
            }
            Self::MissingDefault { key } => {
                write!(f, "store key '{key}' is missing and no default value was given")
            }
            Self::StoreTypeMismatch { key, expected } => {
                write!(f, "store key '{key}' does not hold a value of type {expected}")
            }
        }
    }
}

impl std::error::Error for StateError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_offender() {
        let err = StateError::DuplicateProvide {
            view: "Parent".into(),
            name: "theme".into(),
        };
        assert_eq!(err.to_string(), "view 'Parent' already provides 'theme'");
        let err = StateError::MissingDefault { key: "k".into() };
        assert!(err.to_string().contains("'k'"));
    }
}

//! Natural keys and the dotted key grammar used by template expressions.
//!
//! A settings type is addressed as `namespace.TypeName`. Both segments match
//! case-insensitively, so keys are lower-cased as soon as they are parsed and
//! every cache downstream can compare them by plain equality.
//!
//! Two grammars exist:
//!
//! - [`NaturalKey::parse`]: `segment ("." segment)+`, split at the first dot.
//!   Everything after the first dot is the type name and is never re-split.
//! - [`FieldPath::parse`]: `namespace.TypeName.field[.nested...]`, used by
//!   expressions that read a value off the resolved instance.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid setting key `{key}`: expected `namespace.TypeName`")]
pub struct InvalidKey {
    pub key: String,
}

impl InvalidKey {
    fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
        }
    }
}

/// Case-normalised `(namespace, type_name)` pair identifying a settings type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NaturalKey {
    namespace: String,
    type_name: String,
}

impl NaturalKey {
    pub fn new(namespace: &str, type_name: &str) -> Self {
        Self {
            namespace: namespace.to_lowercase(),
            type_name: type_name.to_lowercase(),
        }
    }

    /// Parse a dotted `namespace.TypeName` key.
    pub fn parse(key: &str) -> Result<Self, InvalidKey> {
        let (namespace, type_name) = key.split_once('.').ok_or_else(|| InvalidKey::new(key))?;
        if namespace.is_empty() || type_name.is_empty() {
            return Err(InvalidKey::new(key));
        }
        Ok(Self::new(namespace, type_name))
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn matches(&self, namespace: &str, type_name: &str) -> bool {
        self.namespace == namespace.to_lowercase() && self.type_name == type_name.to_lowercase()
    }

    /// Name of the per-request memo slot, e.g. `_tests.testsetting`.
    pub fn cache_attr_name(&self) -> String {
        format!("_{}.{}", self.namespace, self.type_name)
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.type_name)
    }
}

/// `namespace.TypeName.field` expression addressing one value of an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    key: NaturalKey,
    field: String,
}

impl FieldPath {
    pub fn parse(expression: &str) -> Result<Self, InvalidKey> {
        let mut parts = expression.splitn(3, '.');
        let (Some(namespace), Some(type_name), Some(field)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(InvalidKey::new(expression));
        };
        if namespace.is_empty() || type_name.is_empty() || field.is_empty() {
            return Err(InvalidKey::new(expression));
        }
        Ok(Self {
            key: NaturalKey::new(namespace, type_name),
            field: field.to_string(),
        })
    }

    pub fn key(&self) -> &NaturalKey {
        &self.key
    }

    /// Field part of the expression, with original casing. May contain dots
    /// addressing nested values.
    pub fn field(&self) -> &str {
        &self.field
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_normalises_case() {
        let expected = NaturalKey::new("tests", "testsetting");
        for raw in ["tests.TestSetting", "tests.testsetting", "TESTS.TESTSETTING", "TeStS.tEsTsEtTiNg"] {
            assert_eq!(NaturalKey::parse(raw).expect("valid key"), expected, "{raw}");
        }
    }

    #[test]
    fn parse_rejects_single_segment() {
        let err = NaturalKey::parse("testsetting").expect_err("one segment");
        assert_eq!(err.key, "testsetting");
        assert!(NaturalKey::parse("").is_err());
    }

    #[test]
    fn parse_rejects_empty_segments() {
        assert!(NaturalKey::parse(".TestSetting").is_err());
        assert!(NaturalKey::parse("tests.").is_err());
    }

    #[test]
    fn parse_keeps_remainder_as_type_name() {
        let key = NaturalKey::parse("tests.Test.Setting").expect("valid key");
        assert_eq!(key.namespace(), "tests");
        assert_eq!(key.type_name(), "test.setting");
    }

    #[test]
    fn cache_attr_name_is_lowercase() {
        let key = NaturalKey::new("Tests", "TestGenericSetting");
        assert_eq!(key.cache_attr_name(), "_tests.testgenericsetting");
        assert_eq!(key.to_string(), "tests.testgenericsetting");
    }

    #[test]
    fn field_path_splits_at_first_two_dots() {
        let path = FieldPath::parse("tests.TestGenericSetting.title").expect("valid path");
        assert_eq!(path.key(), &NaturalKey::new("tests", "testgenericsetting"));
        assert_eq!(path.field(), "title");

        let nested = FieldPath::parse("tests.TestSetting.social.Twitter").expect("valid path");
        assert_eq!(nested.field(), "social.Twitter");
    }

    #[test]
    fn field_path_requires_three_segments() {
        assert!(FieldPath::parse("tests.TestSetting").is_err());
        assert!(FieldPath::parse("tests.TestSetting.").is_err());
        assert!(FieldPath::parse("tests").is_err());
    }
}

use thiserror::Error;

use crate::{
    application::repos::StoreError,
    domain::keys::{InvalidKey, NaturalKey},
    infra::error::InfraError,
};

/// Failures of a single settings resolution or registration call.
///
/// None of these are retried or swallowed by the crate; the caller decides
/// how to surface them.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error(transparent)]
    InvalidKey(#[from] InvalidKey),
    #[error("unknown setting `{key}`")]
    UnknownSetting { key: String },
    #[error("no request found in render context, and `use_default_tenant` is not set")]
    NoRequestInContext,
    #[error("setting `{key}` is already registered")]
    DuplicateRegistration { key: NaturalKey },
    #[error("no site matches host `{host}`")]
    SiteNotFound { host: String },
    #[error("no default site is configured")]
    NoDefaultSite,
    #[error("setting `{setting}` has no field `{field}`")]
    UnknownField { setting: NaturalKey, field: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SettingsError {
    pub fn unknown_setting(key: impl Into<String>) -> Self {
        Self::UnknownSetting { key: key.into() }
    }

    pub fn unknown_field(setting: &NaturalKey, field: impl Into<String>) -> Self {
        Self::UnknownField {
            setting: setting.clone(),
            field: field.into(),
        }
    }

    /// Whether the failure comes from configuration (registry, sites, keys)
    /// rather than from the store.
    pub fn is_configuration(&self) -> bool {
        !matches!(self, SettingsError::Store(_))
    }
}

/// Top-level error of the command-line entry point.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Infra(#[from] InfraError),
}

impl AppError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Infra(InfraError::Config(_)) => 2,
            AppError::Settings(err) if err.is_configuration() => 3,
            AppError::Settings(_) | AppError::Infra(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoadError;

    #[test]
    fn store_failures_are_not_configuration_errors() {
        let err = SettingsError::from(StoreError::Timeout);
        assert!(!err.is_configuration());
        assert!(SettingsError::NoRequestInContext.is_configuration());
    }

    #[test]
    fn exit_codes_distinguish_failure_classes() {
        let config = LoadError::Invalid {
            key: "logging.level".to_string(),
            reason: "failed to parse".to_string(),
        };
        assert_eq!(AppError::from(InfraError::from(config)).exit_code(), 2);
        assert_eq!(
            AppError::from(SettingsError::unknown_setting("a.b")).exit_code(),
            3
        );
        assert_eq!(
            AppError::from(SettingsError::from(StoreError::Timeout)).exit_code(),
            1
        );
    }

    #[test]
    fn messages_name_the_offending_key() {
        let err = SettingsError::unknown_setting("tests.Missing");
        assert_eq!(err.to_string(), "unknown setting `tests.Missing`");

        let err = SettingsError::unknown_field(&NaturalKey::new("tests", "TestSetting"), "nope");
        assert_eq!(
            err.to_string(),
            "setting `tests.testsetting` has no field `nope`"
        );
    }
}

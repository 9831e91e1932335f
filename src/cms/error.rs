use std::fmt::{Display, Formatter};
use std::sync::LazyLock;

use serde_json::Value;

use crate::database::DatabaseError;
use crate::util::{ErrorFactory, ErrorMap, TaggedError};

/// Tag every domain error message starts with.
pub const PRODUCT_TAG: &str = "[CMS]";

const ERRORS: ErrorMap = &[
    ("missing-argument", "Missing required argument: {$name}"),
    (
        "invalid-order-by-child",
        "orderByChild must be a non-empty string, got {$value}",
    ),
    ("invalid-options", "Invalid option {$option}: {$reason}"),
    (
        "unsupported-locale",
        "Locale \"{$locale}\" is not one of the configured locales ({$allowed})",
    ),
    (
        "unsupported-environment",
        "Environment \"{$environment}\" is not one of the configured environments ({$allowed})",
    ),
];

static ERROR_FACTORY: LazyLock<ErrorFactory> =
    LazyLock::new(|| ErrorFactory::new(PRODUCT_TAG, "cms", ERRORS));

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CmsErrorCode {
    MissingArgument,
    InvalidOrderByChild,
    InvalidOptions,
    UnsupportedLocale,
    UnsupportedEnvironment,
    /// Failure reported by the underlying store, passed through untouched.
    Store,
}

impl CmsErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CmsErrorCode::MissingArgument => "cms/missing-argument",
            CmsErrorCode::InvalidOrderByChild => "cms/invalid-order-by-child",
            CmsErrorCode::InvalidOptions => "cms/invalid-options",
            CmsErrorCode::UnsupportedLocale => "cms/unsupported-locale",
            CmsErrorCode::UnsupportedEnvironment => "cms/unsupported-environment",
            CmsErrorCode::Store => "cms/store",
        }
    }
}

#[derive(Clone, Debug)]
pub struct CmsError {
    pub code: CmsErrorCode,
    message: String,
    store: Option<DatabaseError>,
}

impl CmsError {
    fn tagged(code: CmsErrorCode, error: TaggedError) -> Self {
        Self {
            code,
            message: error.message,
            store: None,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The store failure this error wraps, if any.
    pub fn store_error(&self) -> Option<&DatabaseError> {
        self.store.as_ref()
    }

    pub fn is_store_error(&self) -> bool {
        self.code == CmsErrorCode::Store
    }
}

impl Display for CmsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CmsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.store
            .as_ref()
            .map(|err| err as &(dyn std::error::Error + 'static))
    }
}

impl From<DatabaseError> for CmsError {
    fn from(err: DatabaseError) -> Self {
        Self {
            code: CmsErrorCode::Store,
            message: err.to_string(),
            store: Some(err),
        }
    }
}

pub type CmsResult<T> = Result<T, CmsError>;

pub fn missing_argument(name: &str) -> CmsError {
    CmsError::tagged(
        CmsErrorCode::MissingArgument,
        ERROR_FACTORY.create_with_data("missing-argument", [("name", name)]),
    )
}

pub fn invalid_order_by_child(value: &Value) -> CmsError {
    CmsError::tagged(
        CmsErrorCode::InvalidOrderByChild,
        ERROR_FACTORY.create_with_data("invalid-order-by-child", [("value", value.to_string())]),
    )
}

pub fn invalid_options(option: &str, reason: impl Into<String>) -> CmsError {
    CmsError::tagged(
        CmsErrorCode::InvalidOptions,
        ERROR_FACTORY.create_with_data(
            "invalid-options",
            [("option", option.to_string()), ("reason", reason.into())],
        ),
    )
}

pub fn unsupported_locale(locale: &str, allowed: &[String]) -> CmsError {
    CmsError::tagged(
        CmsErrorCode::UnsupportedLocale,
        ERROR_FACTORY.create_with_data(
            "unsupported-locale",
            [("locale", locale.to_string()), ("allowed", allowed.join(", "))],
        ),
    )
}

pub fn unsupported_environment(environment: &str, allowed: &[String]) -> CmsError {
    CmsError::tagged(
        CmsErrorCode::UnsupportedEnvironment,
        ERROR_FACTORY.create_with_data(
            "unsupported-environment",
            [
                ("environment", environment.to_string()),
                ("allowed", allowed.join(", ")),
            ],
        ),
    )
}

/// Whether `message` came from this crate's domain validation rather than
/// from the store.
pub fn is_domain_message(message: &str) -> bool {
    ERROR_FACTORY.is_tagged(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::error::permission_denied;
    use serde_json::json;

    #[test]
    fn domain_errors_are_prefixed() {
        let err = missing_argument("locale");
        assert_eq!(err.code_str(), "cms/missing-argument");
        assert_eq!(err.to_string(), "[CMS] Missing required argument: locale");
        assert!(is_domain_message(err.message()));

        let err = invalid_order_by_child(&json!(true));
        assert_eq!(
            err.message(),
            "[CMS] orderByChild must be a non-empty string, got true"
        );
    }

    #[test]
    fn store_errors_pass_through_unchanged() {
        let store = permission_denied("Permission denied");
        let err = CmsError::from(store.clone());
        assert!(err.is_store_error());
        assert_eq!(err.to_string(), store.to_string());
        assert!(!is_domain_message(err.message()));
        assert_eq!(err.store_error().map(|e| e.code_str()), Some(store.code_str()));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn allow_list_errors_name_the_allowed_values() {
        let allowed = vec!["en-US".to_string(), "de-DE".to_string()];
        let err = unsupported_locale("fr-FR", &allowed);
        assert_eq!(err.code, CmsErrorCode::UnsupportedLocale);
        assert!(err.message().contains("en-US, de-DE"));
    }
}

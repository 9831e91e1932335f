use serde::Deserialize;
use serde_json::Value;

use crate::cms::error::{
    invalid_options, missing_argument, unsupported_environment, unsupported_locale, CmsResult,
};

pub const DEFAULT_ENVIRONMENT: &str = "production";
pub const DEFAULT_LOCALE: &str = "en-US";

/// Settings used to build a [`Cms`](crate::cms::Cms) client.
///
/// `environment` and `locale` are the initial context; they must appear in the
/// `environments` and `locales` allow-lists. Without a `database_url` the
/// client keeps its data in memory.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CmsConfig {
    pub database_url: Option<String>,
    pub environment: String,
    pub locale: String,
    pub environments: Vec<String>,
    pub locales: Vec<String>,
}

impl Default for CmsConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            environment: DEFAULT_ENVIRONMENT.to_string(),
            locale: DEFAULT_LOCALE.to_string(),
            environments: vec![DEFAULT_ENVIRONMENT.to_string()],
            locales: vec![DEFAULT_LOCALE.to_string()],
        }
    }
}

impl CmsConfig {
    /// Reads a config from JSON, e.g. `{"databaseUrl": "...", "locales": ["en-US"]}`.
    pub fn from_json(value: Value) -> CmsResult<Self> {
        serde_json::from_value(value).map_err(|err| invalid_options("config", err.to_string()))
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    pub fn with_locales<I, S>(mut self, locales: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.locales = locales.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_environments<I, S>(mut self, environments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.environments = environments.into_iter().map(Into::into).collect();
        self
    }

    pub fn validate(&self) -> CmsResult<()> {
        self.check_environment(&self.environment)?;
        self.check_locale(&self.locale)
    }

    pub(crate) fn check_environment(&self, environment: &str) -> CmsResult<()> {
        if environment.is_empty() {
            return Err(missing_argument("environment"));
        }
        if !self.environments.iter().any(|allowed| allowed == environment) {
            return Err(unsupported_environment(environment, &self.environments));
        }
        Ok(())
    }

    pub(crate) fn check_locale(&self, locale: &str) -> CmsResult<()> {
        if locale.is_empty() {
            return Err(missing_argument("locale"));
        }
        if !self.locales.iter().any(|allowed| allowed == locale) {
            return Err(unsupported_locale(locale, &self.locales));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cms::error::CmsErrorCode;
    use serde_json::json;

    #[test]
    fn defaults_are_valid() {
        let config = CmsConfig::default();
        assert_eq!(config.environment, "production");
        assert_eq!(config.locale, "en-US");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn from_json_fills_missing_fields() {
        let config = CmsConfig::from_json(json!({
            "databaseUrl": "http://127.0.0.1:9000/?ns=demo",
            "locales": ["en-US", "de-DE"],
            "locale": "de-DE"
        }))
        .unwrap();
        assert_eq!(
            config.database_url.as_deref(),
            Some("http://127.0.0.1:9000/?ns=demo")
        );
        assert_eq!(config.environment, "production");
        assert!(config.validate().is_ok());

        let err = CmsConfig::from_json(json!({ "locales": "en-US" })).unwrap_err();
        assert_eq!(err.code, CmsErrorCode::InvalidOptions);
    }

    #[test]
    fn locale_outside_allow_list_is_rejected() {
        let config = CmsConfig {
            locale: "fr-FR".to_string(),
            ..CmsConfig::default()
        };
        assert_eq!(
            config.validate().unwrap_err().code,
            CmsErrorCode::UnsupportedLocale
        );

        let config = CmsConfig::default().with_environments(["staging"]);
        assert_eq!(
            config.validate().unwrap_err().code,
            CmsErrorCode::UnsupportedEnvironment
        );
    }
}

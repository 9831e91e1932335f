use std::fmt;

use crate::cms::error::{missing_argument, CmsResult};

/// The three collections the client exposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Content,
    Navigation,
    Schema,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Content => "content",
            ResourceKind::Navigation => "navigation",
            ResourceKind::Schema => "schemas",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A canonical, absolute store path.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourcePath(String);

impl ResourcePath {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Appends an entry key below this path.
    pub fn entry(&self, entry: &str) -> CmsResult<ResourcePath> {
        let entry = required("entry", entry)?;
        Ok(ResourcePath(format!("{}/{}", self.0, entry)))
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ResourcePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// `/environments/{env}/content/{key}/{locale}`, or the content root when
/// `key` is `None`.
pub fn build_content_path(
    key: Option<&str>,
    environment: &str,
    locale: &str,
) -> CmsResult<ResourcePath> {
    localized_path(ResourceKind::Content, key, environment, locale)
}

/// `/environments/{env}/navigation/{key}/{locale}`, or the navigation root
/// when `key` is `None`.
pub fn build_navigation_path(
    key: Option<&str>,
    environment: &str,
    locale: &str,
) -> CmsResult<ResourcePath> {
    localized_path(ResourceKind::Navigation, key, environment, locale)
}

/// `/schemas/{key}`, or `/schemas` when `key` is `None`.
pub fn build_schema_path(key: Option<&str>) -> CmsResult<ResourcePath> {
    match key {
        None => Ok(ResourcePath("/schemas".to_string())),
        Some(key) => Ok(ResourcePath(format!("/schemas/{}", required("key", key)?))),
    }
}

pub fn build_path(
    kind: ResourceKind,
    key: Option<&str>,
    environment: &str,
    locale: &str,
) -> CmsResult<ResourcePath> {
    match kind {
        ResourceKind::Content => build_content_path(key, environment, locale),
        ResourceKind::Navigation => build_navigation_path(key, environment, locale),
        ResourceKind::Schema => build_schema_path(key),
    }
}

fn localized_path(
    kind: ResourceKind,
    key: Option<&str>,
    environment: &str,
    locale: &str,
) -> CmsResult<ResourcePath> {
    let environment = required("environment", environment)?;
    let locale = required("locale", locale)?;
    let root = format!("/environments/{environment}/{kind}");
    match key {
        None => Ok(ResourcePath(root)),
        Some(key) => Ok(ResourcePath(format!(
            "{root}/{}/{locale}",
            required("key", key)?
        ))),
    }
}

fn required<'a>(name: &str, value: &'a str) -> CmsResult<&'a str> {
    if value.trim().is_empty() {
        return Err(missing_argument(name));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cms::error::CmsErrorCode;

    #[test]
    fn content_path_places_locale_after_key() {
        let path = build_content_path(Some("products"), "production", "en-US").unwrap();
        assert_eq!(path.as_str(), "/environments/production/content/products/en-US");

        let entry = path.entry("1491827711368").unwrap();
        assert_eq!(
            entry.as_str(),
            "/environments/production/content/products/en-US/1491827711368"
        );
    }

    #[test]
    fn absent_key_yields_collection_root() {
        assert_eq!(
            build_content_path(None, "staging", "en-US").unwrap().as_str(),
            "/environments/staging/content"
        );
        assert_eq!(
            build_navigation_path(None, "production", "de-DE")
                .unwrap()
                .as_str(),
            "/environments/production/navigation"
        );
        assert_eq!(build_schema_path(None).unwrap().as_str(), "/schemas");
    }

    #[test]
    fn navigation_and_schema_paths() {
        assert_eq!(
            build_navigation_path(Some("main"), "production", "en-US")
                .unwrap()
                .as_str(),
            "/environments/production/navigation/main/en-US"
        );
        assert_eq!(
            build_path(ResourceKind::Schema, Some("product"), "", "")
                .unwrap()
                .as_str(),
            "/schemas/product"
        );
    }

    #[test]
    fn empty_components_are_missing_arguments() {
        let cases = [
            build_content_path(Some(""), "production", "en-US"),
            build_content_path(Some("products"), "", "en-US"),
            build_content_path(Some("products"), "production", ""),
            build_navigation_path(None, "production", " "),
            build_schema_path(Some("")),
        ];
        for result in cases {
            assert_eq!(result.unwrap_err().code, CmsErrorCode::MissingArgument);
        }

        let path = build_schema_path(Some("product")).unwrap();
        assert_eq!(
            path.entry("").unwrap_err().code,
            CmsErrorCode::MissingArgument
        );
    }
}

use std::collections::{BTreeMap, HashMap};
use std::fmt;

pub type ErrorData = BTreeMap<String, String>;
pub type ErrorMap = &'static [(&'static str, &'static str)];

/// An error whose message starts with the factory's product tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedError {
    pub code: String,
    pub message: String,
    pub custom_data: ErrorData,
}

impl fmt::Display for TaggedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for TaggedError {}

/// Builds service errors from a table of message templates. Templates may
/// reference custom data with `{$name}` placeholders.
pub struct ErrorFactory {
    tag: &'static str,
    service: &'static str,
    errors: HashMap<&'static str, &'static str>,
}

impl ErrorFactory {
    pub fn new(tag: &'static str, service: &'static str, errors: ErrorMap) -> Self {
        Self {
            tag,
            service,
            errors: errors.iter().copied().collect(),
        }
    }

    pub fn tag(&self) -> &'static str {
        self.tag
    }

    /// Whether `message` was produced by this factory.
    pub fn is_tagged(&self, message: &str) -> bool {
        message.starts_with(self.tag)
    }

    pub fn create(&self, code: &str) -> TaggedError {
        self.build_error(code, ErrorData::new())
    }

    pub fn create_with_data<I, K, V>(&self, code: &str, data: I) -> TaggedError
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let custom_data = data
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        self.build_error(code, custom_data)
    }

    /// Tags a free-form message without consulting the template table.
    pub fn make_error(&self, code: &str, message: impl AsRef<str>) -> TaggedError {
        TaggedError {
            code: self.full_code(code),
            message: self.prefixed(message.as_ref()),
            custom_data: ErrorData::new(),
        }
    }

    fn build_error(&self, code: &str, custom_data: ErrorData) -> TaggedError {
        let template = self.errors.get(code).copied().unwrap_or("Error");
        let message = replace_template(template, &custom_data);
        TaggedError {
            code: self.full_code(code),
            message: self.prefixed(&message),
            custom_data,
        }
    }

    fn full_code(&self, code: &str) -> String {
        format!("{}/{}", self.service, code)
    }

    fn prefixed(&self, message: &str) -> String {
        format!("{} {}", self.tag, message)
    }
}

fn replace_template(template: &str, data: &ErrorData) -> String {
    let mut result = String::with_capacity(template.len());
    let mut remainder = template;

    while let Some(start) = remainder.find("{$") {
        let (head, tail) = remainder.split_at(start);
        result.push_str(head);
        match tail.find('}') {
            Some(end) => {
                let key = &tail[2..end];
                match data.get(key) {
                    Some(value) => result.push_str(value),
                    None => result.push_str(&format!("<{key}?>")),
                }
                remainder = &tail[end + 1..];
            }
            None => {
                result.push_str(tail);
                remainder = "";
            }
        }
    }

    result.push_str(remainder);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const ERRORS: ErrorMap = &[
        ("missing-argument", "Missing required argument: {$name}"),
        ("unknown", "Unknown error"),
    ];

    #[test]
    fn messages_carry_the_tag() {
        let factory = ErrorFactory::new("[CMS]", "cms", ERRORS);
        let error = factory.create("unknown");
        assert_eq!(error.code, "cms/unknown");
        assert_eq!(error.message, "[CMS] Unknown error");
        assert!(factory.is_tagged(&error.message));
        assert!(!factory.is_tagged("connection reset"));
    }

    #[test]
    fn placeholders_are_filled_from_data() {
        let factory = ErrorFactory::new("[CMS]", "cms", ERRORS);
        let error = factory.create_with_data("missing-argument", [("name", "locale")]);
        assert_eq!(error.message, "[CMS] Missing required argument: locale");
        assert_eq!(error.custom_data.get("name"), Some(&"locale".to_string()));

        let error = factory.create("missing-argument");
        assert!(error.message.ends_with("<name?>"));
    }

    #[test]
    fn free_form_messages_are_tagged() {
        let factory = ErrorFactory::new("[CMS]", "cms", ERRORS);
        let error = factory.make_error("invalid-options", "limitToFirst must be an integer");
        assert_eq!(error.code, "cms/invalid-options");
        assert_eq!(error.to_string(), "[CMS] limitToFirst must be an integer");
    }
}

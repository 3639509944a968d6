use chrono::{Datelike, NaiveDate, Utc};

/// Values available to a folder template.
///
/// `date` falls back to today when unset.
#[derive(Debug, Clone, Default)]
pub struct FolderHints<'a> {
    pub date: Option<NaiveDate>,
    pub kind: Option<&'a str>,
    pub source: Option<&'a str>,
}

impl<'a> FolderHints<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn with_kind(mut self, kind: &'a str) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_source(mut self, source: &'a str) -> Self {
        self.source = Some(source);
        self
    }

    fn lookup(&self, token: &str, date: NaiveDate) -> Option<String> {
        match token {
            "date" => Some(date.format("%Y-%m-%d").to_string()),
            "year" => Some(format!("{:04}", date.year())),
            "month" => Some(format!("{:02}", date.month())),
            "day" => Some(format!("{:02}", date.day())),
            "kind" => self.kind.map(sanitize_segment),
            "source" => self.source.map(sanitize_segment),
            _ => None,
        }
    }
}

/// Expands `{token}` placeholders in a folder template.
///
/// Unknown tokens, and known tokens without a value, are left verbatim.
pub fn expand(template: &str, hints: &FolderHints<'_>) -> String {
    let date = hints.date.unwrap_or_else(|| Utc::now().date_naive());
    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        result.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                let token = &after[..end];
                match hints.lookup(token, date) {
                    Some(value) => result.push_str(&value),
                    None => {
                        result.push('{');
                        result.push_str(token);
                        result.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                result.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    result.push_str(rest);

    result
}

/// Makes a substituted value safe to use as a single path segment.
fn sanitize_segment(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect::<String>()
        .trim_matches(|c| c == '_' || c == '.')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 7).unwrap()
    }

    #[test]
    fn test_expand_date_tokens() {
        let hints = FolderHints::new().with_date(day());
        assert_eq!(expand("{date}", &hints), "2026-03-07");
        assert_eq!(expand("{year}/{month}/{day}", &hints), "2026/03/07");
    }

    #[test]
    fn test_expand_kind_and_source() {
        let hints = FolderHints::new()
            .with_date(day())
            .with_kind("image")
            .with_source("my phone");
        assert_eq!(expand("{source}/{kind}/{year}", &hints), "my_phone/image/2026");
    }

    #[test]
    fn test_unknown_tokens_left_verbatim() {
        let hints = FolderHints::new().with_date(day());
        assert_eq!(expand("{camera}/{date}", &hints), "{camera}/2026-03-07");
        assert_eq!(expand("{source}", &hints), "{source}");
        assert_eq!(expand("open{brace", &hints), "open{brace");
    }

    #[test]
    fn test_defaults_to_today() {
        let today = Utc::now().date_naive().format("%Y-%m-%d").to_string();
        assert_eq!(expand("{date}", &FolderHints::new()), today);
    }

    #[test]
    fn test_sanitize_segment() {
        assert_eq!(sanitize_segment("../etc"), "etc");
        assert_eq!(sanitize_segment("a/b"), "a_b");
    }
}

//! Minimal `{var}` URI templates for datasource units.

use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Var(String),
}

/// A parsed URI template such as `greeting://{name}` or `log://{date}/{level}`.
#[derive(Debug, Clone, PartialEq)]
pub struct UriTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl UriTemplate {
    pub fn parse(raw: &str) -> Self {
        let mut segments = Vec::new();
        let mut rest = raw;

        while let Some(open) = rest.find('{') {
            let Some(close) = rest[open..].find('}').map(|i| open + i) else {
                break;
            };
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_string()));
            }
            segments.push(Segment::Var(rest[open + 1..close].to_string()));
            rest = &rest[close + 1..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Self {
            raw: raw.to_string(),
            segments,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// True when the template contains at least one variable.
    pub fn is_template(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, Segment::Var(_)))
    }

    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Var(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Match a concrete URI, returning captured variables.
    ///
    /// Variables capture at least one character and never span a `/`.
    pub fn matches(&self, uri: &str) -> Option<Map<String, Value>> {
        let mut captured = Map::new();
        let mut rest = uri;
        let mut iter = self.segments.iter().peekable();

        while let Some(segment) = iter.next() {
            match segment {
                Segment::Literal(lit) => {
                    rest = rest.strip_prefix(lit.as_str())?;
                }
                Segment::Var(name) => {
                    let end = match iter.peek() {
                        Some(Segment::Literal(next)) => rest.find(next.as_str())?,
                        _ => rest.len(),
                    };
                    let value = &rest[..end];
                    if value.is_empty() || value.contains('/') {
                        return None;
                    }
                    captured.insert(name.clone(), Value::String(value.to_string()));
                    rest = &rest[end..];
                }
            }
        }

        rest.is_empty().then_some(captured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_uri() {
        let t = UriTemplate::parse("info://server");
        assert!(!t.is_template());
        assert!(t.matches("info://server").unwrap().is_empty());
        assert!(t.matches("info://server/extra").is_none());
    }

    #[test]
    fn test_single_variable() {
        let t = UriTemplate::parse("greeting://{name}");
        assert!(t.is_template());
        let vars = t.matches("greeting://ada").unwrap();
        assert_eq!(vars["name"], "ada");
        assert!(t.matches("greeting://").is_none());
        assert!(t.matches("other://ada").is_none());
    }

    #[test]
    fn test_multiple_variables() {
        let t = UriTemplate::parse("log://{date}/{level}.txt");
        assert_eq!(t.variables().collect::<Vec<_>>(), vec!["date", "level"]);
        let vars = t.matches("log://2024-01-01/warn.txt").unwrap();
        assert_eq!(vars["date"], "2024-01-01");
        assert_eq!(vars["level"], "warn");
        assert!(t.matches("log://a/b/c.txt").is_none());
    }
}

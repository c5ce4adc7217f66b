//! Reference token grammar.
//!
//! - `Table:Id` or `Table:Id:field` - a bare reference, the whole string is
//!   replaced by the named field (default `id`) of the referenced record
//! - `{Table:Id[:field]}` - an interpolated reference embedded in larger text
//! - `::` - an escaped literal colon; a string containing it is never a bare
//!   reference, and it collapses to `:` when the value is unescaped
//!
//! Segments may not contain whitespace, braces or colons, so ordinary prose
//! such as `"note: remember"` is not a reference.

use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::fmt;

/// Field read from the referenced record when none is named
pub const DEFAULT_FIELD: &str = "id";

const ESCAPED_COLON: &str = "::";

static BARE_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^\s:{}]+):([^\s:{}]+)(?::([^\s:{}]+))?$").unwrap());

static INTERPOLATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([^}]+)\}").unwrap());

/// A parsed `Table:Id[:field]` token
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    pub table: String,
    pub id: String,
    pub field: Option<String>,
}

impl Reference {
    pub fn new(table: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            id: id.into(),
            field: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Parse a bare reference. Escaped strings never parse.
    pub fn parse(text: &str) -> Option<Reference> {
        if text.contains(ESCAPED_COLON) {
            return None;
        }
        let caps = BARE_REFERENCE.captures(text)?;
        Some(Reference {
            table: caps[1].to_string(),
            id: caps[2].to_string(),
            field: caps.get(3).map(|m| m.as_str().to_string()),
        })
    }

    /// The field to read, `id` unless one was named
    pub fn field(&self) -> &str {
        self.field.as_deref().unwrap_or(DEFAULT_FIELD)
    }

    /// Positional index when the identifier is numeric (`Users:3`)
    pub fn index(&self) -> Option<usize> {
        if self.id.bytes().all(|b| b.is_ascii_digit()) {
            self.id.parse().ok()
        } else {
            None
        }
    }

    /// Same reference pointing at another identifier
    pub fn with_id(&self, id: impl Into<String>) -> Reference {
        Reference {
            table: self.table.clone(),
            id: id.into(),
            field: self.field.clone(),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.table, self.id)?;
        if let Some(field) = &self.field {
            write!(f, ":{}", field)?;
        }
        Ok(())
    }
}

/// A piece of a string split around `{...}` interpolations
#[derive(Debug, Clone, PartialEq)]
pub enum Segment<'a> {
    Literal(&'a str),
    /// A `{...}` token whose content parsed as a reference; `token` includes the braces
    Reference { reference: Reference, token: &'a str },
}

/// Split text into literal runs and interpolated references.
///
/// Brace groups whose content is not a valid reference stay literal.
pub fn segments(text: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut last = 0;

    for caps in INTERPOLATION.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        let Some(reference) = Reference::parse(&caps[1]) else {
            continue;
        };
        if whole.start() > last {
            out.push(Segment::Literal(&text[last..whole.start()]));
        }
        out.push(Segment::Reference {
            reference,
            token: whole.as_str(),
        });
        last = whole.end();
    }

    if last < text.len() {
        out.push(Segment::Literal(&text[last..]));
    }
    out
}

/// All references a string carries: itself when bare, otherwise its interpolations
pub fn references_in(text: &str) -> Vec<Reference> {
    if let Some(reference) = Reference::parse(text) {
        return vec![reference];
    }
    interpolated_references(text)
}

/// References inside `{...}` delimiters only, as used by raw statements
pub fn interpolated_references(text: &str) -> Vec<Reference> {
    segments(text)
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Reference { reference, .. } => Some(reference),
            Segment::Literal(_) => None,
        })
        .collect()
}

/// Rebuild text with every interpolated reference replaced by `replace`'s output.
///
/// Literal runs are passed through `literal` so callers can unescape them.
pub fn map_interpolations<L, R>(text: &str, mut literal: L, mut replace: R) -> String
where
    L: FnMut(&str) -> Cow<'_, str>,
    R: FnMut(&Reference, &str) -> String,
{
    let mut out = String::with_capacity(text.len());
    for segment in segments(text) {
        match segment {
            Segment::Literal(l) => out.push_str(&literal(l)),
            Segment::Reference { reference, token } => out.push_str(&replace(&reference, token)),
        }
    }
    out
}

/// Collapse escaped colons (`::`) into single colons.
pub fn unescape(text: &str) -> Cow<'_, str> {
    if text.contains(ESCAPED_COLON) {
        Cow::Owned(text.replace(ESCAPED_COLON, ":"))
    } else {
        Cow::Borrowed(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_field() {
        let r = Reference::parse("Users:0").unwrap();
        assert_eq!(r.table, "Users");
        assert_eq!(r.id, "0");
        assert_eq!(r.field(), "id");
        assert_eq!(r.index(), Some(0));
    }

    #[test]
    fn test_parse_named_identifier_and_field() {
        let r = Reference::parse("Challenges:myChallenge:name").unwrap();
        assert_eq!(r.id, "myChallenge");
        assert_eq!(r.field(), "name");
        assert_eq!(r.index(), None);
        assert_eq!(r.to_string(), "Challenges:myChallenge:name");
    }

    #[test]
    fn test_escaped_is_never_bare() {
        assert!(Reference::parse("foo::bar").is_none());
        assert!(Reference::parse("Users::0").is_none());
    }

    #[test]
    fn test_prose_is_not_a_reference() {
        assert!(Reference::parse("note: remember").is_none());
        assert!(Reference::parse("plain").is_none());
        assert!(Reference::parse("a:b:c:d").is_none());
        assert!(Reference::parse("2024-01-01 10:00:00").is_none());
    }

    #[test]
    fn test_segments_split_interpolations() {
        let segs = segments("foo {Users:0} bar {nope} {Items:x:name}");
        let refs: Vec<String> = segs
            .iter()
            .filter_map(|s| match s {
                Segment::Reference { reference, .. } => Some(reference.to_string()),
                Segment::Literal(_) => None,
            })
            .collect();
        assert_eq!(refs, vec!["Users:0", "Items:x:name"]);

        let literal: String = segs
            .iter()
            .map(|s| match s {
                Segment::Literal(l) => *l,
                Segment::Reference { token, .. } => token,
            })
            .collect();
        assert_eq!(literal, "foo {Users:0} bar {nope} {Items:x:name}");
    }

    #[test]
    fn test_escaped_string_still_interpolates() {
        let refs = references_in("http:://host/{Users:0}");
        assert_eq!(refs, vec![Reference::new("Users", "0")]);
    }

    #[test]
    fn test_map_interpolations() {
        let out = map_interpolations("a:::b {Users:0:name}!", unescape, |r, _| {
            format!("<{}>", r.field())
        });
        assert_eq!(out, "a::b <name>!");
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape("a::b"), "a:b");
        assert_eq!(unescape("http:://google.com"), "http://google.com");
        assert_eq!(unescape("buz::baz::bee"), "buz:baz:bee");
        assert!(matches!(unescape("no escapes"), Cow::Borrowed(_)));
    }
}

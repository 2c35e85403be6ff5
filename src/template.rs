//! Placeholder templates: token discovery and substitution.
//!
//! A template is query text with named tokens (`#tableName`, `#order.id`)
//! and optional segments delimited by `<[` and `]>`. An optional segment is
//! dropped from the rendered text when any of its tokens has no value.

use std::{
    any::Any,
    collections::{BTreeMap, HashMap},
    sync::OnceLock,
};

use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{class::ClassDef, data::Value, error::TemplateError};

const SEGMENT_OPEN: &str = "<[";
const SEGMENT_CLOSE: &str = "]>";
const DEFAULT_MARKER: char = '#';
const TOKEN_BODY: &str = r"([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateOptions {
    pub marker: char,
}

impl Default for TemplateOptions {
    fn default() -> Self {
        Self {
            marker: DEFAULT_MARKER,
        }
    }
}

impl TemplateOptions {
    fn token_pattern(&self) -> Result<Regex, TemplateError> {
        if self.marker == DEFAULT_MARKER {
            static DEFAULT: OnceLock<Regex> = OnceLock::new();
            if let Some(regex) = DEFAULT.get() {
                return Ok(regex.clone());
            }
            let regex = build_pattern(self.marker)?;
            return Ok(DEFAULT.get_or_init(|| regex).clone());
        }
        build_pattern(self.marker)
    }
}

fn build_pattern(marker: char) -> Result<Regex, TemplateError> {
    let pattern = format!("{}{}", regex::escape(&marker.to_string()), TOKEN_BODY);
    Regex::new(&pattern).map_err(|err| TemplateError::Malformed(err.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Literal(String),
    Token(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Segment {
    optional: bool,
    pieces: Vec<Piece>,
}

/// Result of looking a token up in a [`ValueSource`].
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Missing,
    Found { value: Value, nullable: bool },
}

impl Lookup {
    pub fn nullable(value: Value) -> Self {
        Lookup::Found {
            value,
            nullable: true,
        }
    }
}

/// Anything placeholder values can be read from.
pub trait ValueSource {
    fn lookup(&self, token: &str) -> Lookup;
}

fn lookup_in_map<'a, I>(exact: Option<&Value>, entries: I, token: &str) -> Lookup
where
    I: IntoIterator<Item = (&'a String, &'a Value)>,
{
    exact
        .or_else(|| {
            entries
                .into_iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(token))
                .map(|(_, value)| value)
        })
        .map_or(Lookup::Missing, |value| Lookup::nullable(value.clone()))
}

impl ValueSource for HashMap<String, Value> {
    fn lookup(&self, token: &str) -> Lookup {
        lookup_in_map(self.get(token), self.iter(), token)
    }
}

impl ValueSource for BTreeMap<String, Value> {
    fn lookup(&self, token: &str) -> Lookup {
        lookup_in_map(self.get(token), self.iter(), token)
    }
}

/// Reads tokens through a class descriptor's getters; dotted tokens walk
/// single nested targets first.
pub struct ObjectSource<'a> {
    class: &'a ClassDef,
    instance: &'a dyn Any,
}

impl<'a> ObjectSource<'a> {
    pub fn new(class: &'a ClassDef, instance: &'a dyn Any) -> Self {
        Self { class, instance }
    }
}

impl ValueSource for ObjectSource<'_> {
    fn lookup(&self, token: &str) -> Lookup {
        let mut class = self.class;
        let mut instance = self.instance;
        let mut segments = token.split('.').peekable();
        while let Some(segment) = segments.next() {
            if segments.peek().is_none() {
                let Some(getter) = class.getters_for(segment).into_iter().next() else {
                    return Lookup::Missing;
                };
                return match getter.read(instance) {
                    Ok(value) => Lookup::Found {
                        value,
                        nullable: getter.is_nullable(),
                    },
                    Err(_) => Lookup::Missing,
                };
            }
            let Some(nested) = class.nested_ref(segment) else {
                return Lookup::Missing;
            };
            if nested.is_collection() {
                return Lookup::Missing;
            }
            match nested.read(instance) {
                Some(next) => {
                    instance = next;
                    class = nested.class().as_ref();
                }
                None => return Lookup::nullable(Value::Null),
            }
        }
        Lookup::Missing
    }
}

/// A parsed template. Token names are matched greedily at parse time, so
/// `#AA` always binds to `AA` and never to `A` followed by a literal `A`;
/// [`PlaceholderTemplate::tokens_by_length`] exposes the same longest-first
/// order for callers that inspect or rewrite the text themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderTemplate {
    text: String,
    options: TemplateOptions,
    segments: Vec<Segment>,
    tokens: Vec<String>,
    tokens_by_length: Vec<String>,
}

impl PlaceholderTemplate {
    pub fn parse(text: &str) -> Result<Self, TemplateError> {
        Self::parse_with(text, TemplateOptions::default())
    }

    pub fn parse_with(text: &str, options: TemplateOptions) -> Result<Self, TemplateError> {
        let pattern = options.token_pattern()?;
        let mut segments = Vec::new();
        let mut tokens: Vec<String> = Vec::new();
        for (optional, body) in split_segments(text)? {
            let mut pieces = Vec::new();
            let mut cursor = 0;
            for captures in pattern.captures_iter(body) {
                let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
                    continue;
                };
                if whole.start() > cursor {
                    pieces.push(Piece::Literal(body[cursor..whole.start()].to_string()));
                }
                let name = name.as_str().to_string();
                if !tokens.contains(&name) {
                    tokens.push(name.clone());
                }
                pieces.push(Piece::Token(name));
                cursor = whole.end();
            }
            if cursor < body.len() {
                pieces.push(Piece::Literal(body[cursor..].to_string()));
            }
            segments.push(Segment { optional, pieces });
        }
        let mut tokens_by_length = tokens.clone();
        tokens_by_length.sort_by(|a, b| b.len().cmp(&a.len()));
        debug!(
            "Parsed template with {} placeholder(s) in {} segment(s)",
            tokens.len(),
            segments.len()
        );
        Ok(Self {
            text: text.to_string(),
            options,
            segments,
            tokens,
            tokens_by_length,
        })
    }

    /// As [`PlaceholderTemplate::parse`], but a template without any token
    /// is rejected.
    pub fn parse_filtered(text: &str) -> Result<Self, TemplateError> {
        Self::parse_filtered_with(text, TemplateOptions::default())
    }

    pub fn parse_filtered_with(text: &str, options: TemplateOptions) -> Result<Self, TemplateError> {
        let template = Self::parse_with(text, options)?;
        if template.tokens.is_empty() {
            return Err(TemplateError::NoPlaceholders(text.to_string()));
        }
        Ok(template)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn options(&self) -> TemplateOptions {
        self.options
    }

    /// Distinct tokens in order of first appearance.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Distinct tokens, longest first.
    pub fn tokens_by_length(&self) -> &[String] {
        &self.tokens_by_length
    }

    pub fn has_placeholders(&self) -> bool {
        !self.tokens.is_empty()
    }

    pub fn optional_segment_count(&self) -> usize {
        self.segments.iter().filter(|segment| segment.optional).count()
    }

    pub fn substitute(&self, source: &dyn ValueSource) -> Result<String, TemplateError> {
        let mut rendered = String::with_capacity(self.text.len());
        for segment in &self.segments {
            if segment.optional {
                if let Some(text) = render_optional(segment, source) {
                    rendered.push_str(&text);
                }
                continue;
            }
            for piece in &segment.pieces {
                match piece {
                    Piece::Literal(literal) => rendered.push_str(literal),
                    Piece::Token(token) => match source.lookup(token) {
                        Lookup::Found { value, .. } => rendered.push_str(&render_value(&value)),
                        Lookup::Missing => {
                            return Err(TemplateError::MissingValue {
                                token: token.clone(),
                            });
                        }
                    },
                }
            }
        }
        Ok(rendered)
    }
}

fn render_optional(segment: &Segment, source: &dyn ValueSource) -> Option<String> {
    let mut rendered = String::new();
    for piece in &segment.pieces {
        match piece {
            Piece::Literal(literal) => rendered.push_str(literal),
            Piece::Token(token) => match source.lookup(token) {
                Lookup::Found {
                    value: Value::Null,
                    nullable: true,
                }
                | Lookup::Missing => return None,
                Lookup::Found { value, .. } => rendered.push_str(&render_value(&value)),
            },
        }
    }
    Some(rendered)
}

fn split_segments(text: &str) -> Result<Vec<(bool, &str)>, TemplateError> {
    let mut segments = Vec::new();
    let mut rest = text;
    loop {
        let open = rest.find(SEGMENT_OPEN);
        let close = rest.find(SEGMENT_CLOSE);
        match (open, close) {
            (Some(open), close) if close.is_none_or(|close| open < close) => {
                if open > 0 {
                    segments.push((false, &rest[..open]));
                }
                let inner = &rest[open + SEGMENT_OPEN.len()..];
                let Some(end) = inner.find(SEGMENT_CLOSE) else {
                    return Err(TemplateError::Malformed(format!(
                        "unclosed '{SEGMENT_OPEN}' at byte {}",
                        text.len() - rest.len() + open
                    )));
                };
                if inner[..end].contains(SEGMENT_OPEN) {
                    return Err(TemplateError::Malformed(format!(
                        "nested '{SEGMENT_OPEN}' segments are not supported"
                    )));
                }
                segments.push((true, &inner[..end]));
                rest = &inner[end + SEGMENT_CLOSE.len()..];
            }
            (_, Some(close)) => {
                return Err(TemplateError::Malformed(format!(
                    "'{SEGMENT_CLOSE}' without opening '{SEGMENT_OPEN}' at byte {}",
                    text.len() - rest.len() + close
                )));
            }
            _ => {
                if !rest.is_empty() {
                    segments.push((false, rest));
                }
                return Ok(segments);
            }
        }
    }
}

/// Renders a value for inclusion in query text. Text is escaped for
/// single-quoted literals.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Text(text) => escape_literal(text),
        Value::Bytes(bytes) => escape_literal(&String::from_utf8_lossy(bytes)),
        other => other.as_display(),
    }
}

fn escape_literal(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if ch == '\\' || ch == '\'' {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn tokens_keep_insertion_and_length_orders() {
        let template =
            PlaceholderTemplate::parse("MATCH (n {a: '#A', b: '#AA', c: '#A'}) WHERE n.x = #order.id")
                .unwrap();
        assert_eq!(template.tokens(), ["A", "AA", "order.id"]);
        assert_eq!(template.tokens_by_length(), ["order.id", "AA", "A"]);
    }

    #[test]
    fn optional_segment_delimiters_must_balance() {
        assert!(matches!(
            PlaceholderTemplate::parse("a <[ b #x"),
            Err(TemplateError::Malformed(_))
        ));
        assert!(matches!(
            PlaceholderTemplate::parse("a ]> b"),
            Err(TemplateError::Malformed(_))
        ));
        assert!(matches!(
            PlaceholderTemplate::parse("<[ a <[ b ]> ]>"),
            Err(TemplateError::Malformed(_))
        ));
    }

    #[test]
    fn filtered_parse_requires_a_token() {
        assert_eq!(
            PlaceholderTemplate::parse_filtered("MATCH (n) RETURN n"),
            Err(TemplateError::NoPlaceholders("MATCH (n) RETURN n".into()))
        );
        assert!(PlaceholderTemplate::parse("MATCH (n) RETURN n").is_ok());
    }

    #[test]
    fn custom_marker_is_escaped() {
        let options = TemplateOptions { marker: '$' };
        let template = PlaceholderTemplate::parse_with("RETURN $name, #name", options).unwrap();
        assert_eq!(template.tokens(), ["name"]);
        let rendered = template
            .substitute(&values(&[("name", Value::from("x"))]))
            .unwrap();
        assert_eq!(rendered, "RETURN x, #name");
    }

    #[test]
    fn text_is_escaped_for_quoted_literals() {
        let template = PlaceholderTemplate::parse("{name: '#name'}").unwrap();
        let rendered = template
            .substitute(&values(&[("name", Value::from(r"O'Brien\x"))]))
            .unwrap();
        assert_eq!(rendered, r"{name: 'O\'Brien\\x'}");
    }

    #[test]
    fn missing_mandatory_token_is_an_error_and_null_renders() {
        let template = PlaceholderTemplate::parse("SET n.a = #a").unwrap();
        assert_eq!(
            template.substitute(&HashMap::<String, Value>::new()),
            Err(TemplateError::MissingValue { token: "a".into() })
        );
        let rendered = template
            .substitute(&values(&[("a", Value::Null)]))
            .unwrap();
        assert_eq!(rendered, "SET n.a = null");
    }

    #[test]
    fn map_lookup_falls_back_to_case_insensitive_keys() {
        let mut map = BTreeMap::new();
        map.insert("TableName".to_string(), Value::from("orders"));
        let template = PlaceholderTemplate::parse("'#tableName'").unwrap();
        assert_eq!(template.substitute(&map).unwrap(), "'orders'");
    }
}

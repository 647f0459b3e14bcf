//! Extraction of ADIF-style `<FIELD:len>value` tags.
//!
//! Logging programs broadcast contacts as bracket-tagged text:
//!
//! ```text
//! <CALL:5>LU9WT<BAND:3>20m<MODE:3>SSB<QSO_DATE:8>20240101<TIME_ON:4>1200<EOR>
//! ```
//!
//! The declared length is recorded but never used to bound the value; a value
//! runs until the next `<` or the end of the text. Senders routinely get the
//! length wrong, so this keeps the scanner tolerant.

use std::collections::HashMap;

use nom::{
    IResult, Parser,
    bytes::complete::{take_while, take_while1},
    character::complete::{char, digit1},
    combinator::map,
    sequence::{delimited, preceded},
};

/// A single tag found in the input text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag<'a> {
    /// Field name as written by the sender.
    pub name: &'a str,
    /// Length from the tag header. Informational only; `None` when the
    /// digits do not fit a `usize`.
    pub declared_len: Option<usize>,
    /// Raw value, untrimmed.
    pub value: &'a str,
}

/// How field names are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchCase {
    #[default]
    Insensitive,
    Sensitive,
}

impl MatchCase {
    fn matches(self, a: &str, b: &str) -> bool {
        match self {
            MatchCase::Insensitive => a.eq_ignore_ascii_case(b),
            MatchCase::Sensitive => a == b,
        }
    }
}

fn is_name_char(c: char) -> bool {
    c != ':' && c != '>' && c != '<'
}

/// Parse one `<name:digits>value` tag at the start of `input`.
fn parse_tag(input: &str) -> IResult<&str, Tag<'_>> {
    let (input, (name, declared_len)) = delimited(
        char('<'),
        (
            take_while1(is_name_char),
            preceded(char(':'), map(digit1, |s: &str| s.parse::<usize>().ok())),
        ),
        char('>'),
    )
    .parse(input)?;
    let (input, value) = take_while(|c| c != '<').parse(input)?;

    Ok((
        input,
        Tag {
            name,
            declared_len,
            value,
        },
    ))
}

/// Iterator over the tags in a piece of text. See [`tags`].
#[derive(Debug, Clone)]
pub struct Tags<'a> {
    rest: &'a str,
}

impl<'a> Iterator for Tags<'a> {
    type Item = Tag<'a>;

    fn next(&mut self) -> Option<Tag<'a>> {
        loop {
            let start = self.rest.find('<')?;
            let candidate = &self.rest[start..];
            match parse_tag(candidate) {
                Ok((rest, tag)) => {
                    self.rest = rest;
                    return Some(tag);
                }
                // Not a tag (e.g. `<EOR>` or stray `<`), resume after it
                Err(_) => self.rest = &candidate[1..],
            }
        }
    }
}

/// Scan `text` once, yielding every well-formed tag in order.
pub fn tags(text: &str) -> Tags<'_> {
    Tags { rest: text }
}

/// Value of the first `name` tag with a non-empty value, trimmed.
///
/// Field names are matched case-insensitively.
///
/// ```
/// use qso_relay::tag::extract;
///
/// let text = "<call:4>W1AW<BAND:3>20m<EOR>";
/// assert_eq!(extract(text, "CALL"), Some("W1AW"));
/// assert_eq!(extract(text, "MODE"), None);
/// ```
pub fn extract<'a>(text: &'a str, name: &str) -> Option<&'a str> {
    extract_with(text, name, MatchCase::Insensitive)
}

/// Like [`extract`], with explicit control over name matching.
pub fn extract_with<'a>(text: &'a str, name: &str, case: MatchCase) -> Option<&'a str> {
    tags(text)
        .find(|tag| !tag.value.is_empty() && case.matches(tag.name, name))
        .map(|tag| tag.value.trim())
        .filter(|value| !value.is_empty())
}

/// Source of field values for a parser.
///
/// Implementations return the trimmed value of a field, or `None` when the
/// field is absent or blank.
pub trait FieldSource {
    fn field(&self, name: &str) -> Option<&str>;

    /// First present field among `names`.
    fn first_of(&self, names: &[&str]) -> Option<&str> {
        names.iter().find_map(|name| self.field(name))
    }
}

/// Strict source: rescans the text for every lookup, first match wins.
#[derive(Debug, Clone, Copy)]
pub struct ScannedFields<'a> {
    text: &'a str,
}

impl<'a> ScannedFields<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { text }
    }
}

impl FieldSource for ScannedFields<'_> {
    fn field(&self, name: &str) -> Option<&str> {
        extract(self.text, name)
    }
}

/// Lenient source: all tags collected in one pass into a map keyed by the
/// lowercased field name. A repeated field keeps its last value.
#[derive(Debug, Clone, Default)]
pub struct TagMap<'a> {
    fields: HashMap<String, &'a str>,
}

impl<'a> TagMap<'a> {
    pub fn new(text: &'a str) -> Self {
        let fields = tags(text)
            .map(|tag| (tag.name.to_ascii_lowercase(), tag.value))
            .collect();
        Self { fields }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FieldSource for TagMap<'_> {
    fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(&name.to_ascii_lowercase())
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }
}

//! Lenient XML-to-[`RawValue`] tree builder.
//!
//! Mirrors a non-strict DOM-to-object conversion: tag names are lower-cased,
//! attributes are merged into the element's field set, stray closing tags are
//! ignored and unclosed elements are closed at the nearest matching ancestor
//! or at end of input.

use std::collections::BTreeMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::{RawValue, TEXT_KEY};
use crate::error::FeedError;

struct OpenElement {
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<(String, RawValue)>,
}

impl OpenElement {
    fn from_start(start: &BytesStart<'_>) -> Self {
        let name = String::from_utf8_lossy(start.name().as_ref()).to_lowercase();
        let attributes = start
            .attributes()
            .with_checks(false)
            .filter_map(Result::ok)
            .map(|attr| {
                let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                let value = attr
                    .unescape_value()
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
                (key, value.trim().to_string())
            })
            .collect();
        Self {
            name,
            attributes,
            text: String::new(),
            children: Vec::new(),
        }
    }

    fn push_text(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if !self.text.is_empty() {
            self.text.push(' ');
        }
        self.text.push_str(text);
    }

    fn into_value(self) -> (String, RawValue) {
        let text = self.text.trim().to_string();
        if self.attributes.is_empty() && self.children.is_empty() {
            return (self.name, RawValue::Text(text));
        }

        let mut fields: BTreeMap<String, RawValue> = BTreeMap::new();
        for (key, value) in self.attributes {
            push_field(&mut fields, key, RawValue::Text(value));
        }
        for (key, value) in self.children {
            push_field(&mut fields, key, value);
        }
        if !text.is_empty() {
            fields.insert(TEXT_KEY.to_string(), RawValue::Text(text));
        }
        (self.name, RawValue::Map(fields))
    }
}

fn push_field(fields: &mut BTreeMap<String, RawValue>, key: String, value: RawValue) {
    match fields.entry(key).or_insert_with(|| RawValue::List(Vec::new())) {
        RawValue::List(values) => values.push(value),
        other => *other = RawValue::List(vec![other.clone(), value]),
    }
}

#[derive(Default)]
struct TreeBuilder {
    stack: Vec<OpenElement>,
    root: Option<(String, RawValue)>,
}

impl TreeBuilder {
    fn open(&mut self, element: OpenElement) {
        self.stack.push(element);
    }

    fn close_top(&mut self) {
        let Some(element) = self.stack.pop() else {
            return;
        };
        let (name, value) = element.into_value();
        match self.stack.last_mut() {
            Some(parent) => parent.children.push((name, value)),
            None => {
                if self.root.is_none() {
                    self.root = Some((name, value));
                }
            }
        }
    }

    /// Close up to and including the innermost open element named `name`.
    /// A closing tag with no matching open element is ignored.
    fn close_named(&mut self, name: &str) {
        let Some(depth) = self.stack.iter().rposition(|e| e.name == name) else {
            return;
        };
        while self.stack.len() > depth {
            self.close_top();
        }
    }

    fn text(&mut self, text: &str) {
        if let Some(top) = self.stack.last_mut() {
            top.push_text(text);
        }
    }

    fn finish(mut self) -> Option<(String, RawValue)> {
        while !self.stack.is_empty() {
            self.close_top();
        }
        self.root
    }
}

/// Parse a whole document and return the root element's name and value.
///
/// # Errors
///
/// Returns [`FeedError::Malformed`] on reader errors or when the document
/// has no root element.
pub fn parse_document(xml: &str) -> Result<(String, RawValue), FeedError> {
    let mut reader = Reader::from_str(xml);
    let config = reader.config_mut();
    config.trim_text(true);
    config.check_end_names = false;
    config.allow_unmatched_ends = true;

    let mut builder = TreeBuilder::default();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => builder.open(OpenElement::from_start(&e)),
            Ok(Event::Empty(e)) => {
                builder.open(OpenElement::from_start(&e));
                builder.close_top();
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_lowercase();
                builder.close_named(&name);
            }
            Ok(Event::Text(e)) => {
                let text = match e.unescape() {
                    Ok(text) => text.into_owned(),
                    Err(_) => String::from_utf8_lossy(&e).into_owned(),
                };
                builder.text(&text);
            }
            Ok(Event::CData(e)) => {
                builder.text(&String::from_utf8_lossy(e.as_ref()));
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(FeedError::Malformed(format!(
                    "{e} (at byte {})",
                    reader.buffer_position()
                )))
            }
            _ => {}
        }
    }

    builder
        .finish()
        .ok_or_else(|| FeedError::Malformed("document has no root element".to_string()))
}

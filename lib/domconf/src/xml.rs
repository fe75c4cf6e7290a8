// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A small owned element tree over `quick_xml`, and the indenting writer
//! used by every serializer.
//!
//! Parsers only need a handful of operations from an XML library: find a
//! child or a nested path, read an attribute, read the text of an element.
//! [`Element`] provides exactly that. Comments, processing instructions and
//! the document prolog are discarded while reading.

use std::fmt::Display;
use std::str::FromStr;

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::enums::{parse_enum, VirEnum};
use crate::error::{Error, Result};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<Element>,
    text: String,
}

/// Parses `input` and returns its root element.
pub fn parse_document(input: &str) -> Result<Element> {
    let mut reader = Reader::from_str(input);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => stack.push(Element::from_start(&e)?),
            Event::Empty(e) => {
                let elem = Element::from_start(&e)?;
                attach(&mut stack, &mut root, elem)?;
            }
            Event::End(_) => {
                let elem = stack.pop().ok_or_else(|| {
                    Error::Xml("unexpected closing tag".to_string())
                })?;
                attach(&mut stack, &mut root, elem)?;
            }
            Event::Text(t) => {
                let text = t.unescape()?;
                match stack.last_mut() {
                    Some(top) => top.text.push_str(&text),
                    None if text.trim().is_empty() => {}
                    None => {
                        return Err(Error::Xml(
                            "text content outside of the root element"
                                .to_string(),
                        ))
                    }
                }
            }
            Event::CData(c) => {
                let bytes = c.into_inner();
                let text = std::str::from_utf8(&bytes).map_err(|e| {
                    Error::Xml(format!("invalid UTF-8 in CDATA: {}", e))
                })?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(Error::Xml(format!(
            "premature end of document inside <{}>",
            open.name
        )));
    }

    root.ok_or_else(|| Error::Xml("document has no root element".to_string()))
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    elem: Element,
) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(elem);
    } else if root.is_none() {
        *root = Some(elem);
    } else {
        return Err(Error::Xml(
            "extra content at the end of the document".to_string(),
        ));
    }
    Ok(())
}

fn decode_utf8(bytes: &[u8]) -> Result<String> {
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|e| Error::Xml(format!("invalid UTF-8 in document: {}", e)))
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    fn from_start(start: &BytesStart<'_>) -> Result<Self> {
        let mut elem = Element::new(decode_utf8(start.name().as_ref())?);
        for attr in start.attributes() {
            let attr = attr?;
            let key = decode_utf8(attr.key.as_ref())?;
            let value = attr.unescape_value()?.into_owned();
            elem.attrs.push((key, value));
        }
        Ok(elem)
    }

    pub fn with_attr(mut self, key: &str, value: &str) -> Self {
        self.attrs.push((key.to_owned(), value.to_owned()));
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text.push_str(text);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The element's text content with surrounding whitespace removed.
    pub fn text(&self) -> &str {
        self.text.trim()
    }

    /// All child elements, in document order.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter()
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// The first element reached by following the `/`-separated `path`.
    pub fn path(&self, path: &str) -> Option<&Element> {
        self.path_all(path).into_iter().next()
    }

    /// Every element reached by following the `/`-separated `path`, in
    /// document order.
    pub fn path_all(&self, path: &str) -> Vec<&Element> {
        let mut current: Vec<&Element> = vec![self];
        for step in path.split('/').filter(|s| !s.is_empty()) {
            current = current
                .into_iter()
                .flat_map(|e| e.children.iter().filter(move |c| c.name == step))
                .collect();
        }
        current
    }

    /// The trimmed text of the element at `path`, if it exists and is not
    /// empty.
    pub fn path_text(&self, path: &str) -> Option<&str> {
        self.path(path).map(Element::text).filter(|t| !t.is_empty())
    }

    pub fn path_attr(&self, path: &str, key: &str) -> Option<&str> {
        self.path(path).and_then(|e| e.attr(key))
    }

    /// Parses attribute `key` with `FromStr`.
    pub fn attr_parse<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.attr(key)
            .map(|v| {
                v.trim().parse::<T>().map_err(|e| {
                    Error::Xml(format!(
                        "invalid value '{}' for attribute '{}' of <{}>: {}",
                        v, key, self.name, e
                    ))
                })
            })
            .transpose()
    }

    /// Parses attribute `key` as a member of a closed vocabulary.
    pub fn attr_enum<T: VirEnum>(&self, key: &str) -> Result<Option<T>> {
        self.attr(key).map(parse_enum::<T>).transpose()
    }

    /// Parses a `yes`/`no` attribute.
    pub fn attr_yes_no(&self, key: &str) -> Result<Option<bool>> {
        match self.attr(key) {
            None => Ok(None),
            Some("yes") => Ok(Some(true)),
            Some("no") => Ok(Some(false)),
            Some(other) => Err(Error::Xml(format!(
                "invalid value '{}' for attribute '{}' of \
                 <{}>, expected 'yes' or 'no'",
                other, key, self.name
            ))),
        }
    }

    /// Parses the text of this element with `FromStr`.
    pub fn text_parse<T>(&self) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.text().parse::<T>().map_err(|e| {
            Error::Xml(format!(
                "invalid value '{}' in <{}>: {}",
                self.text(),
                self.name,
                e
            ))
        })
    }
}

/// An element to be written: its name and attributes in output order.
#[derive(Clone, Debug)]
pub struct Tag {
    name: String,
    attrs: Vec<(String, String)>,
}

impl Tag {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_owned(), attrs: Vec::new() }
    }

    pub fn attr(mut self, key: &str, value: impl Display) -> Self {
        self.attrs.push((key.to_owned(), value.to_string()));
        self
    }

    pub fn attr_opt<T: Display>(self, key: &str, value: Option<T>) -> Self {
        match value {
            Some(v) => self.attr(key, v),
            None => self,
        }
    }

    pub fn attr_if(self, cond: bool, key: &str, value: impl Display) -> Self {
        if cond {
            self.attr(key, value)
        } else {
            self
        }
    }

    pub fn has_attrs(&self) -> bool {
        !self.attrs.is_empty()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn write_open(&self, buf: &mut String) {
        buf.push('<');
        buf.push_str(&self.name);
        for (k, v) in &self.attrs {
            buf.push(' ');
            buf.push_str(k);
            buf.push_str("='");
            buf.push_str(&escape(v.as_str()));
            buf.push('\'');
        }
    }
}

/// Writes indented XML with single-quoted attributes, two spaces per level.
#[derive(Clone, Debug, Default)]
pub struct XmlWriter {
    buf: String,
    depth: usize,
}

impl XmlWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A writer for content that will be nested one level below the
    /// current position; see [`XmlWriter::element_with`].
    pub fn nested(&self) -> Self {
        Self { buf: String::new(), depth: self.depth + 1 }
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn indent(&mut self) {
        for _ in 0..self.depth {
            self.buf.push_str("  ");
        }
    }

    pub fn open(&mut self, tag: Tag) {
        self.indent();
        tag.write_open(&mut self.buf);
        self.buf.push_str(">\n");
        self.depth += 1;
    }

    pub fn close(&mut self, name: &str) {
        self.depth = self.depth.saturating_sub(1);
        self.indent();
        self.buf.push_str("</");
        self.buf.push_str(name);
        self.buf.push_str(">\n");
    }

    pub fn empty(&mut self, tag: Tag) {
        self.indent();
        tag.write_open(&mut self.buf);
        self.buf.push_str("/>\n");
    }

    /// Writes `<tag>text</tag>` on one line.
    pub fn leaf(&mut self, tag: Tag, text: impl Display) {
        self.indent();
        tag.write_open(&mut self.buf);
        self.buf.push('>');
        self.buf.push_str(&escape(text.to_string().as_str()));
        self.buf.push_str("</");
        self.buf.push_str(&tag.name);
        self.buf.push_str(">\n");
    }

    pub fn leaf_opt<T: Display>(&mut self, name: &str, text: Option<T>) {
        if let Some(text) = text {
            self.leaf(Tag::new(name), text);
        }
    }

    /// Writes `tag` around the content of `inner`, or as an empty element
    /// when `inner` produced nothing.
    pub fn element_with(&mut self, tag: Tag, inner: XmlWriter) {
        if inner.buf.is_empty() {
            self.empty(tag);
        } else {
            let name = tag.name.clone();
            self.indent();
            tag.write_open(&mut self.buf);
            self.buf.push_str(">\n");
            self.buf.push_str(&inner.buf);
            self.indent();
            self.buf.push_str("</");
            self.buf.push_str(&name);
            self.buf.push_str(">\n");
        }
    }

    /// Writes `tag` around `inner` only if `inner` produced something.
    pub fn element_if_nonempty(&mut self, tag: Tag, inner: XmlWriter) {
        if !inner.buf.is_empty() {
            self.element_with(tag, inner);
        }
    }

    /// Appends pre-formatted lines, re-indenting each to the current depth.
    pub fn raw_lines(&mut self, text: &str) {
        for line in text.lines() {
            self.indent();
            self.buf.push_str(line);
            self.buf.push('\n');
        }
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn into_string(self) -> String {
        self.buf
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_tree() {
        let doc = r#"<?xml version="1.0"?>
<!-- leading comment -->
<domain type='kvm' id="3">
  <name>guest &amp; co</name>
  <devices>
    <disk type='file'><target dev='hda'/></disk>
    <disk type='block'><target dev='hdb'/></disk>
  </devices>
</domain>"#;
        let root = parse_document(doc).unwrap();
        assert_eq!(root.name(), "domain");
        assert_eq!(root.attr("type"), Some("kvm"));
        assert_eq!(root.attr_parse::<i32>("id").unwrap(), Some(3));
        assert_eq!(root.path_text("name"), Some("guest & co"));
        let targets: Vec<_> = root
            .path_all("devices/disk/target")
            .iter()
            .filter_map(|t| t.attr("dev"))
            .collect();
        assert_eq!(targets, vec!["hda", "hdb"]);
        assert!(root.path("devices/interface").is_none());
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(parse_document("").is_err());
        assert!(parse_document("<a><b></a>").is_err());
        assert!(parse_document("<a/><b/>").is_err());
        assert!(parse_document("<a x='1' x='2'/>").is_err());
        assert!(parse_document("<a>").is_err());
    }

    #[test]
    fn attr_helpers() {
        let e = Element::new("x")
            .with_attr("n", "12")
            .with_attr("flag", "yes")
            .with_attr("bad", "maybe");
        assert_eq!(e.attr_parse::<u32>("n").unwrap(), Some(12));
        assert!(e.attr_parse::<u32>("flag").is_err());
        assert_eq!(e.attr_yes_no("flag").unwrap(), Some(true));
        assert!(e.attr_yes_no("bad").is_err());
        assert_eq!(e.attr_yes_no("missing").unwrap(), None);
    }

    #[test]
    fn writer_indents_and_escapes() {
        let mut w = XmlWriter::new();
        w.open(Tag::new("domain").attr("type", "kvm"));
        w.leaf(Tag::new("name"), "a<b");
        w.empty(Tag::new("disk").attr("path", "it's"));
        let inner = w.nested();
        w.element_with(Tag::new("features"), inner);
        let mut inner = w.nested();
        inner.empty(Tag::new("acpi"));
        w.element_with(Tag::new("features"), inner);
        w.close("domain");

        let expected = "<domain type='kvm'>\n  <name>a&lt;b</name>\n  \
                        <disk path='it&apos;s'/>\n  <features/>\n  \
                        <features>\n    <acpi/>\n  </features>\n</domain>\n";

        assert_eq!(w.as_str(), expected);

        let reparsed = parse_document(w.as_str()).unwrap();
        assert_eq!(reparsed.path_attr("disk", "path"), Some("it's"));
    }
}

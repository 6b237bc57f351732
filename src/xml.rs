/*
 * SPDX-FileCopyrightText: Copyright (c) 2023 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
 * SPDX-License-Identifier: MIT
 *
 * Permission is hereby granted, free of charge, to any person obtaining a
 * copy of this software and associated documentation files (the "Software"),
 * to deal in the Software without restriction, including without limitation
 * the rights to use, copy, modify, merge, publish, distribute, sublicense,
 * and/or sell copies of the Software, and to permit persons to whom the
 * Software is furnished to do so, subject to the following conditions:
 *
 * The above copyright notice and this permission notice shall be included in
 * all copies or substantial portions of the Software.
 *
 * THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
 * IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
 * FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL
 * THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
 * LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
 * FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
 * DEALINGS IN THE SOFTWARE.
 */

// xml.rs
// A small owned element tree for RIBCL. Requests are built as trees so call
// sites can graft extra elements before serializing, and responses are read
// back into the same shape before being turned into JSON-style maps.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::IloError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    pub tag: String,
    /// Attributes in document order.
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    pub text: Option<String>,
}

impl XmlElement {
    pub fn new(tag: &str) -> Self {
        XmlElement {
            tag: tag.to_string(),
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.set_attribute(name, value);
        self
    }

    /// Sets an attribute, replacing the value if the name is already present.
    pub fn set_attribute(&mut self, name: &str, value: &str) {
        match self.attributes.iter_mut().find(|(k, _)| k == name) {
            Some((_, v)) => *v = value.to_string(),
            None => self
                .attributes
                .push((name.to_string(), value.to_string())),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Appends a child and returns a handle to it.
    pub fn push_child(&mut self, child: XmlElement) -> &mut XmlElement {
        self.children.push(child);
        let last = self.children.len() - 1;
        &mut self.children[last]
    }

    /// First element with this tag, depth first, starting with self.
    pub fn find(&self, tag: &str) -> Option<&XmlElement> {
        if self.tag == tag {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(tag))
    }

    pub fn find_mut(&mut self, tag: &str) -> Option<&mut XmlElement> {
        if self.tag == tag {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find_mut(tag))
    }

    /// Calls `f` on every element in the tree with this tag.
    pub fn for_each_mut<F>(&mut self, tag: &str, f: &mut F)
    where
        F: FnMut(&mut XmlElement),
    {
        if self.tag == tag {
            f(self);
        }
        for child in self.children.iter_mut() {
            child.for_each_mut(tag, f);
        }
    }

    /// Serializes the tree one tag per fragment: every start tag, end tag and
    /// empty element is its own string, in document order.
    pub fn to_fragments(&self) -> Result<Vec<String>, IloError> {
        let mut out = Vec::new();
        self.write_fragments(&mut out)?;
        Ok(out)
    }

    fn write_fragments(&self, out: &mut Vec<String>) -> Result<(), IloError> {
        let mut start = BytesStart::new(self.tag.as_str());
        for (name, value) in &self.attributes {
            start.push_attribute((name.as_str(), value.as_str()));
        }
        if self.children.is_empty() && self.text.is_none() {
            out.push(render(Event::Empty(start))?);
            return Ok(());
        }
        let mut opening = render(Event::Start(start))?;
        if let Some(text) = &self.text {
            opening.push_str(&render(Event::Text(BytesText::new(text)))?);
        }
        out.push(opening);
        for child in &self.children {
            child.write_fragments(out)?;
        }
        out.push(render(Event::End(BytesEnd::new(self.tag.as_str())))?);
        Ok(())
    }

    /// Parses a single XML document. The declaration, comments and
    /// processing instructions are skipped.
    pub fn parse(xml: &str) -> Result<XmlElement, IloError> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => stack.push(element_from_start(&e)?),
                Ok(Event::Empty(e)) => {
                    let element = element_from_start(&e)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Ok(Event::End(_)) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| IloError::XmlParse("unbalanced end tag".to_string()))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Ok(Event::Text(t)) => {
                    let text = t
                        .unescape()
                        .map_err(|e| IloError::XmlParse(e.to_string()))?;
                    append_text(&mut stack, &text);
                }
                Ok(Event::CData(c)) => {
                    let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                    append_text(&mut stack, &text);
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(IloError::XmlParse(format!(
                        "error at position {}: {e}",
                        reader.buffer_position()
                    )))
                }
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(IloError::XmlParse(format!("unclosed element {}", open.tag)));
        }
        root.ok_or_else(|| IloError::XmlParse("document has no root element".to_string()))
    }
}

fn render(event: Event<'_>) -> Result<String, IloError> {
    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(event)
        .map_err(|e| IloError::XmlParse(e.to_string()))?;
    String::from_utf8(writer.into_inner()).map_err(|e| IloError::XmlParse(e.to_string()))
}

fn element_from_start(start: &BytesStart<'_>) -> Result<XmlElement, IloError> {
    let mut element = XmlElement::new(&String::from_utf8_lossy(start.name().as_ref()));
    // iLO firmware has been seen repeating attributes; keep the last one.
    for attr in start.attributes().with_checks(false) {
        let attr = attr.map_err(|e| IloError::XmlParse(e.to_string()))?;
        let value = attr
            .unescape_value()
            .map_err(|e| IloError::XmlParse(e.to_string()))?;
        element.set_attribute(&String::from_utf8_lossy(attr.key.as_ref()), &value);
    }
    Ok(element)
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<(), IloError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
        return Ok(());
    }
    if root.is_some() {
        return Err(IloError::XmlParse(format!(
            "unexpected second root element {}",
            element.tag
        )));
    }
    *root = Some(element);
    Ok(())
}

fn append_text(stack: &mut [XmlElement], text: &str) {
    if let Some(current) = stack.last_mut() {
        current.text.get_or_insert_with(String::new).push_str(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_document() {
        let doc = r#"<?xml version="1.0"?>
<RIBCL VERSION="2.22">
  <RESPONSE STATUS="0x0000" MESSAGE='No error'/>
  <GET_HOST_POWER HOST_POWER="ON"/>
  <NOTE>  some text  </NOTE>
</RIBCL>"#;
        let root = XmlElement::parse(doc).unwrap();
        assert_eq!(root.tag, "RIBCL");
        assert_eq!(root.attribute("VERSION"), Some("2.22"));
        assert_eq!(root.children.len(), 3);
        assert_eq!(root.children[1].attribute("HOST_POWER"), Some("ON"));
        assert_eq!(root.children[2].text.as_deref(), Some("some text"));
    }

    #[test]
    fn test_parse_rejects_mismatched_tags() {
        assert!(matches!(
            XmlElement::parse("<A><B></A>"),
            Err(IloError::XmlParse(_))
        ));
    }

    #[test]
    fn test_parse_rejects_empty_input() {
        assert!(matches!(
            XmlElement::parse("   "),
            Err(IloError::XmlParse(_))
        ));
    }

    #[test]
    fn test_fragments_one_tag_each() {
        let mut root = XmlElement::new("A").with_attribute("X", "1");
        root.push_child(XmlElement::new("B"));
        root.push_child(XmlElement::new("C")).text = Some("hi".to_string());
        let fragments = root.to_fragments().unwrap();
        assert_eq!(
            fragments,
            vec!["<A X=\"1\">", "<B/>", "<C>hi", "</C>", "</A>"]
        );
    }

    #[test]
    fn test_attribute_values_are_escaped() {
        let root = XmlElement::new("LOGIN").with_attribute("PASSWORD", "a\"<&b");
        let fragments = root.to_fragments().unwrap();
        let reparsed = XmlElement::parse(&fragments.join("\r\n")).unwrap();
        assert_eq!(reparsed.attribute("PASSWORD"), Some("a\"<&b"));
    }

    #[test]
    fn test_find_mut_and_for_each() {
        let mut root = XmlElement::new("ROOT");
        root.push_child(XmlElement::new("CMD"))
            .push_child(XmlElement::new("CMD"));
        let mut count = 0;
        root.for_each_mut("CMD", &mut |e| {
            e.set_attribute("N", "1");
            count += 1;
        });
        assert_eq!(count, 2);
        root.find_mut("CMD").unwrap().set_attribute("N", "2");
        assert_eq!(root.children[0].attribute("N"), Some("2"));
        assert_eq!(root.children[0].children[0].attribute("N"), Some("1"));
    }
}

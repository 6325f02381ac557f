//! Small element tree over quick-xml events.
//!
//! Capability documents are read into an owned tree keyed by local names, so
//! namespace prefixes (`ows:`, `gml:`, `wcs:`) never matter to the parsers.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tile_common::{CacheError, CacheResult};

/// One element with its local name, attributes, children and text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    pub text: String,
}

impl XmlElement {
    /// First direct child called `name`.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All direct children called `name`.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Trimmed text of the first child called `name`, `None` when missing
    /// or blank.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text()).filter(|t| !t.is_empty())
    }

    /// Follow a chain of direct children.
    pub fn path(&self, names: &[&str]) -> Option<&XmlElement> {
        names
            .iter()
            .try_fold(self, |element, name| element.child(name))
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn text(&self) -> &str {
        self.text.trim()
    }

    /// First descendant called `name`, depth first.
    pub fn find(&self, name: &str) -> Option<&XmlElement> {
        for child in &self.children {
            if child.name == name {
                return Some(child);
            }
            if let Some(found) = child.find(name) {
                return Some(found);
            }
        }
        None
    }

    /// Every descendant called `name`, in document order.
    pub fn find_all<'a>(&'a self, name: &str) -> Vec<&'a XmlElement> {
        let mut found = Vec::new();
        self.collect(name, &mut found);
        found
    }

    fn collect<'a>(&'a self, name: &str, found: &mut Vec<&'a XmlElement>) {
        for child in &self.children {
            if child.name == name {
                found.push(child);
            }
            child.collect(name, found);
        }
    }
}

/// Parse a whole document into its root element.
pub fn parse_document(xml: &str) -> CacheResult<XmlElement> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => stack.push(element_from_start(&e)?),
            Ok(Event::Empty(e)) => {
                let element = element_from_start(&e)?;
                attach(&mut stack, &mut root, element);
            }
            Ok(Event::End(_)) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| CacheError::Xml("unbalanced end tag".to_string()))?;
                attach(&mut stack, &mut root, element);
            }
            Ok(Event::Text(t)) => {
                if let Some(current) = stack.last_mut() {
                    let text = t
                        .unescape()
                        .map_err(|e| CacheError::Xml(format!("Invalid text: {}", e)))?;
                    current.text.push_str(&text);
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(current) = stack.last_mut() {
                    current
                        .text
                        .push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(CacheError::Xml(format!(
                    "XML parsing error at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
        }
    }

    if let Some(open) = stack.last() {
        return Err(CacheError::Xml(format!("unclosed element <{}>", open.name)));
    }
    root.ok_or_else(|| CacheError::Xml("document has no root element".to_string()))
}

/// Local name of the root element, without building the tree.
pub fn root_name(xml: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return Some(String::from_utf8_lossy(e.local_name().as_ref()).into_owned())
            }
            Ok(Event::Eof) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}

fn element_from_start(start: &BytesStart<'_>) -> CacheResult<XmlElement> {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| CacheError::Xml(format!("Invalid attribute on <{}>: {}", name, e)))?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| CacheError::Xml(format!("Invalid attribute value on <{}>: {}", name, e)))?
            .into_owned();
        attributes.push((key, value));
    }
    Ok(XmlElement {
        name,
        attributes,
        children: Vec::new(),
        text: String::new(),
    })
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

/// Split whitespace-separated numbers, `None` if any token is not a number.
pub fn parse_numbers(text: &str) -> Option<Vec<f64>> {
    text.split_whitespace().map(|t| t.parse().ok()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_names_drop_prefixes() {
        let doc = parse_document(
            r#"<ows:Root xmlns:ows="urn:x" xmlns:xlink="urn:y"><ows:Child xlink:href="a&amp;b">  text </ows:Child><Empty/></ows:Root>"#,
        )
        .unwrap();
        assert_eq!(doc.name, "Root");
        let child = doc.child("Child").unwrap();
        assert_eq!(child.attr("href"), Some("a&b"));
        assert_eq!(child.text(), "text");
        assert!(doc.child("Empty").is_some());
        assert_eq!(doc.child_text("Empty"), None);
    }

    #[test]
    fn test_find_and_path() {
        let doc = parse_document("<a><b><c>1</c></b><b><c>2</c></b></a>").unwrap();
        assert_eq!(doc.path(&["b", "c"]).unwrap().text(), "1");
        assert_eq!(doc.find_all("c").len(), 2);
        assert_eq!(doc.find("c").unwrap().text(), "1");
        assert_eq!(doc.children_named("b").count(), 2);
    }

    #[test]
    fn test_malformed_document() {
        assert!(parse_document("<a><b></a>").is_err());
        assert!(parse_document("<a>").is_err());
        assert!(parse_document("").is_err());
    }

    #[test]
    fn test_root_name() {
        assert_eq!(
            root_name(r#"<?xml version="1.0"?><!-- c --><ows:ExceptionReport/>"#).as_deref(),
            Some("ExceptionReport")
        );
        assert_eq!(root_name("not xml"), None);
    }

    #[test]
    fn test_parse_numbers() {
        assert_eq!(parse_numbers("90.0 -180.0"), Some(vec![90.0, -180.0]));
        assert_eq!(parse_numbers("1 x"), None);
    }
}

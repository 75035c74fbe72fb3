//! Fragment-level XML tag parsing.
//!
//! Recognizes `<name attr="value" ...>`, `</name>`, and `<name ... />` on
//! a single fragment, tolerating surrounding whitespace. Attribute values
//! must be double-quoted; there is no entity expansion. Anything else
//! (including truncated tags) parses to `None`, which is how the VTU
//! reader skips raw data lines.

use std::collections::HashMap;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum XmlTagType {
    Start,
    End,
    SelfClosing,
}

#[derive(Clone, Debug)]
pub struct XmlTag {
    pub elem_name: String,
    pub attribs: HashMap<String, String>,
    pub tag_type: XmlTagType,
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == ':'
}

/// Parse one tag out of a text fragment.
pub fn parse_tag(text: &str) -> Option<XmlTag> {
    let mut chars = text.trim().chars().peekable();
    if chars.next()? != '<' {
        return None;
    }
    let closing = chars.peek() == Some(&'/');
    if closing {
        chars.next();
    }
    let mut elem_name = String::new();
    while let Some(&c) = chars.peek() {
        if is_name_char(c) {
            elem_name.push(c);
            chars.next();
        } else {
            break;
        }
    }
    if elem_name.is_empty() {
        return None;
    }
    let mut attribs = HashMap::new();
    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        match chars.peek() {
            Some('>') => {
                chars.next();
                let tag_type = if closing {
                    XmlTagType::End
                } else {
                    XmlTagType::Start
                };
                return Some(XmlTag {
                    elem_name,
                    attribs,
                    tag_type,
                });
            }
            Some('/') if !closing => {
                chars.next();
                if chars.next() != Some('>') {
                    return None;
                }
                return Some(XmlTag {
                    elem_name,
                    attribs,
                    tag_type: XmlTagType::SelfClosing,
                });
            }
            Some(c) if is_name_char(*c) && !closing => {
                let mut key = String::new();
                while let Some(&c) = chars.peek() {
                    if is_name_char(c) {
                        key.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                while chars.peek().is_some_and(|c| c.is_whitespace()) {
                    chars.next();
                }
                if chars.next() != Some('=') {
                    return None;
                }
                while chars.peek().is_some_and(|c| c.is_whitespace()) {
                    chars.next();
                }
                if chars.next() != Some('"') {
                    return None;
                }
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some(c) => value.push(c),
                        None => return None,
                    }
                }
                attribs.insert(key, value);
            }
            _ => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_tags_are_rejected() {
        assert!(parse_tag("AQAAAAAAAADABg").is_none());
        assert!(parse_tag("   <Foo bar=\"qu").is_none());
        assert!(parse_tag("   <Foo bar=").is_none());
    }

    #[test]
    fn start_tag_with_attribute() {
        let tag = parse_tag("   <Foo bar=\"quux\"   >").unwrap();
        assert_eq!(tag.elem_name, "Foo");
        assert_eq!(tag.attribs["bar"], "quux");
        assert_eq!(tag.tag_type, XmlTagType::Start);
    }

    #[test]
    fn self_closing_tag_with_attributes() {
        let tag = parse_tag("   <Elem att=\"val\"  answer=\"42\" />").unwrap();
        assert_eq!(tag.elem_name, "Elem");
        assert_eq!(tag.attribs["att"], "val");
        assert_eq!(tag.attribs["answer"], "42");
        assert_eq!(tag.tag_type, XmlTagType::SelfClosing);
    }

    #[test]
    fn end_tag() {
        let tag = parse_tag("</Foo>").unwrap();
        assert_eq!(tag.elem_name, "Foo");
        assert_eq!(tag.tag_type, XmlTagType::End);
        assert!(tag.attribs.is_empty());
    }
}

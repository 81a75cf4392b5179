//! Compound CSS selector matching
//!
//! Supports the selector subset the exchange engine's attributes use:
//! tag, `#id`, `.class`, `[attr]`, `[attr=value]`, `*`, and comma-joined
//! groups. Combinators are not supported; the engine expresses
//! "closest"/"find" relationships through its own scope keywords.

use crate::{DomTree, NodeId};

/// A parsed selector (one or more comma-joined compounds)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    groups: Vec<Compound>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrMatch>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrMatch {
    name: String,
    value: Option<String>,
}

/// Selector parse errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
    #[error("empty selector")]
    Empty,
    #[error("malformed selector near `{0}`")]
    Malformed(String),
}

impl Selector {
    /// Parse a selector string
    pub fn parse(raw: &str) -> Result<Selector, SelectorError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(SelectorError::Empty);
        }
        let mut groups = Vec::new();
        for part in raw.split(',') {
            groups.push(parse_compound(part.trim())?);
        }
        Ok(Selector { groups })
    }

    /// Check whether an element matches this selector
    pub fn matches(&self, tree: &DomTree, node: NodeId) -> bool {
        let Some(elem) = tree.element(node) else {
            return false;
        };
        self.groups.iter().any(|g| {
            if let Some(tag) = &g.tag {
                if elem.tag != *tag {
                    return false;
                }
            }
            if let Some(id) = &g.id {
                if elem.id() != Some(id.as_str()) {
                    return false;
                }
            }
            if !g.classes.iter().all(|c| elem.has_class(c)) {
                return false;
            }
            g.attrs.iter().all(|a| match &a.value {
                Some(v) => elem.attr(&a.name) == Some(v.as_str()),
                None => elem.has_attr(&a.name),
            })
        })
    }
}

fn parse_compound(part: &str) -> Result<Compound, SelectorError> {
    if part.is_empty() {
        return Err(SelectorError::Empty);
    }
    if part.contains(char::is_whitespace) {
        // combinators are out of scope
        return Err(SelectorError::Malformed(part.to_string()));
    }
    let mut compound = Compound::default();
    let mut chars = part.char_indices().peekable();

    // leading tag name or universal
    if let Some(&(_, c)) = chars.peek() {
        if c == '*' {
            chars.next();
        } else if c.is_ascii_alphabetic() {
            let mut tag = String::new();
            while let Some(&(_, c)) = chars.peek() {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    tag.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            compound.tag = Some(tag.to_ascii_lowercase());
        }
    }

    while let Some((_, c)) = chars.next() {
        match c {
            '#' | '.' => {
                let mut name = String::new();
                while let Some(&(_, nc)) = chars.peek() {
                    if nc == '#' || nc == '.' || nc == '[' {
                        break;
                    }
                    name.push(nc);
                    chars.next();
                }
                if name.is_empty() {
                    return Err(SelectorError::Malformed(part.to_string()));
                }
                if c == '#' {
                    compound.id = Some(name);
                } else {
                    compound.classes.push(name);
                }
            }
            '[' => {
                let mut inner = String::new();
                let mut closed = false;
                for (_, nc) in chars.by_ref() {
                    if nc == ']' {
                        closed = true;
                        break;
                    }
                    inner.push(nc);
                }
                if !closed || inner.is_empty() {
                    return Err(SelectorError::Malformed(part.to_string()));
                }
                let (name, value) = match inner.split_once('=') {
                    Some((n, v)) => {
                        let v = v.trim_matches(|q| q == '"' || q == '\'');
                        (n.to_string(), Some(v.to_string()))
                    }
                    None => (inner.clone(), None),
                };
                if name.is_empty() {
                    return Err(SelectorError::Malformed(part.to_string()));
                }
                compound.attrs.push(AttrMatch { name, value });
            }
            _ => return Err(SelectorError::Malformed(part.to_string())),
        }
    }
    Ok(compound)
}

/// First matching element among a node's descendants, document order
pub fn query_first(tree: &DomTree, scope: NodeId, selector: &Selector) -> Option<NodeId> {
    tree.descendants(scope).find(|&n| selector.matches(tree, n))
}

/// All matching elements among a node's descendants, document order
pub fn query_all(tree: &DomTree, scope: NodeId, selector: &Selector) -> Vec<NodeId> {
    tree.descendants(scope)
        .filter(|&n| selector.matches(tree, n))
        .collect()
}

/// Nearest matching element walking ancestor-or-self from a node
pub fn closest(tree: &DomTree, start: NodeId, selector: &Selector) -> Option<NodeId> {
    if selector.matches(tree, start) {
        return Some(start);
    }
    tree.ancestors(start).find(|&n| selector.matches(tree, n))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (DomTree, NodeId, NodeId, NodeId) {
        let mut tree = DomTree::new();
        let body = tree.create_element("body");
        tree.append_child(NodeId::ROOT, body).unwrap();
        let form = tree.create_element("form");
        tree.set_attr(form, "class", "search compact");
        tree.append_child(body, form).unwrap();
        let input = tree.create_element("input");
        tree.set_attr(input, "id", "q");
        tree.set_attr(input, "type", "text");
        tree.append_child(form, input).unwrap();
        (tree, body, form, input)
    }

    #[test]
    fn test_tag_and_id() {
        let (tree, body, form, input) = sample();
        let sel = Selector::parse("form").unwrap();
        assert_eq!(query_first(&tree, body, &sel), Some(form));

        let sel = Selector::parse("#q").unwrap();
        assert_eq!(query_first(&tree, body, &sel), Some(input));
        assert_eq!(query_first(&tree, NodeId::ROOT, &sel), Some(input));
    }

    #[test]
    fn test_class_and_attr() {
        let (tree, body, form, input) = sample();
        let sel = Selector::parse(".search.compact").unwrap();
        assert!(sel.matches(&tree, form));

        let sel = Selector::parse("input[type=text]").unwrap();
        assert_eq!(query_first(&tree, body, &sel), Some(input));

        let sel = Selector::parse("[type='radio']").unwrap();
        assert_eq!(query_first(&tree, body, &sel), None);
    }

    #[test]
    fn test_groups() {
        let (tree, body, form, input) = sample();
        let sel = Selector::parse("select, input").unwrap();
        assert_eq!(query_all(&tree, body, &sel), vec![input]);
        assert!(!sel.matches(&tree, form));
    }

    #[test]
    fn test_closest() {
        let (tree, _, form, input) = sample();
        let sel = Selector::parse("form").unwrap();
        assert_eq!(closest(&tree, input, &sel), Some(form));
        assert_eq!(closest(&tree, form, &sel), Some(form));
    }

    #[test]
    fn test_malformed() {
        assert_eq!(Selector::parse(""), Err(SelectorError::Empty));
        assert!(Selector::parse("div p").is_err());
        assert!(Selector::parse("[unclosed").is_err());
        assert!(Selector::parse("#").is_err());
    }
}

//! Form-control modeling
//!
//! Classifies controls and extracts the name/value entries a form
//! submission would carry: disabled and unnamed controls are excluded,
//! checkboxes and radios contribute only when checked, multi-selects are
//! flattened to one entry per selected option, and file inputs
//! contribute binary attachments.

use crate::node::FileAttachment;
use crate::{DomTree, NodeId};

/// A value contributed by one control
#[derive(Debug, Clone)]
pub enum EntryValue {
    Text(String),
    File(FileAttachment),
}

/// The `type` attribute of an input, lowercased (defaults to "text")
fn input_type(tree: &DomTree, id: NodeId) -> String {
    tree.attr(id, "type")
        .map(|t| t.to_ascii_lowercase())
        .unwrap_or_else(|| "text".to_string())
}

/// Is this a form element?
pub fn is_form(tree: &DomTree, id: NodeId) -> bool {
    tree.tag(id) == Some("form")
}

/// Is this a submit-like control (button, input[type=submit|button|image])?
pub fn is_submitter(tree: &DomTree, id: NodeId) -> bool {
    match tree.tag(id) {
        Some("button") => true,
        Some("input") => matches!(input_type(tree, id).as_str(), "submit" | "button" | "image"),
        _ => false,
    }
}

/// Is this a value-carrying form control (input, textarea, select)?
pub fn is_form_control(tree: &DomTree, id: NodeId) -> bool {
    matches!(tree.tag(id), Some("input") | Some("textarea") | Some("select"))
}

/// The control's submission name, if any
pub fn control_name(tree: &DomTree, id: NodeId) -> Option<String> {
    tree.attr(id, "name")
        .filter(|n| !n.is_empty())
        .map(|n| n.to_string())
}

/// Disabled directly or through an ancestor fieldset
pub fn is_disabled(tree: &DomTree, id: NodeId) -> bool {
    if tree.element(id).map(|e| e.has_attr("disabled")).unwrap_or(false) {
        return true;
    }
    tree.ancestors(id).any(|a| {
        tree.tag(a) == Some("fieldset")
            && tree.element(a).map(|e| e.has_attr("disabled")).unwrap_or(false)
    })
}

/// The form that owns a control: explicit `form` attribute reference,
/// otherwise the nearest ancestor form
pub fn owning_form(tree: &DomTree, id: NodeId) -> Option<NodeId> {
    if let Some(form_id) = tree.attr(id, "form") {
        let form_id = form_id.to_string();
        return tree.find_by_id(&form_id).filter(|&f| is_form(tree, f));
    }
    tree.ancestors(id).find(|&a| is_form(tree, a))
}

fn is_checked(tree: &DomTree, id: NodeId) -> bool {
    let elem = match tree.element(id) {
        Some(e) => e,
        None => return false,
    };
    elem.form.checked.unwrap_or_else(|| elem.has_attr("checked"))
}

fn option_value(tree: &DomTree, option: NodeId) -> String {
    match tree.attr(option, "value") {
        Some(v) => v.to_string(),
        None => tree.text_content(option).trim().to_string(),
    }
}

fn option_selected(tree: &DomTree, option: NodeId) -> bool {
    let elem = match tree.element(option) {
        Some(e) => e,
        None => return false,
    };
    elem.form.selected.unwrap_or_else(|| elem.has_attr("selected"))
}

fn select_options(tree: &DomTree, select: NodeId) -> Vec<NodeId> {
    tree.descendants(select)
        .filter(|&d| tree.tag(d) == Some("option"))
        .collect()
}

/// Selected values of a select element. Single selects fall back to the
/// first option when nothing is marked selected, as HTML does.
pub fn selected_values(tree: &DomTree, select: NodeId) -> Vec<String> {
    let options = select_options(tree, select);
    let multiple = tree.element(select).map(|e| e.has_attr("multiple")).unwrap_or(false);
    let selected: Vec<String> = options
        .iter()
        .filter(|&&o| option_selected(tree, o))
        .map(|&o| option_value(tree, o))
        .collect();
    if !multiple && selected.is_empty() {
        return options.first().map(|&o| vec![option_value(tree, o)]).unwrap_or_default();
    }
    if !multiple && selected.len() > 1 {
        return vec![selected[0].clone()];
    }
    selected
}

/// The control's current scalar value, used by the `changed` trigger
/// modifier. Multi-selects are compared via [`selection_generation`]
/// instead.
pub fn current_value(tree: &DomTree, id: NodeId) -> Option<String> {
    let elem = tree.element(id)?;
    match elem.tag.as_str() {
        "textarea" => Some(
            elem.form
                .value
                .clone()
                .unwrap_or_else(|| tree.text_content(id)),
        ),
        "select" => selected_values(tree, id).into_iter().next(),
        "input" => Some(
            elem.form
                .value
                .clone()
                .or_else(|| elem.attr("value").map(|v| v.to_string()))
                .unwrap_or_default(),
        ),
        _ => None,
    }
}

/// Identity generation of a multi-select's selection set (None for
/// everything else)
pub fn selection_generation(tree: &DomTree, id: NodeId) -> Option<u64> {
    let elem = tree.element(id)?;
    if elem.tag == "select" && elem.has_attr("multiple") {
        Some(elem.form.selection_generation)
    } else {
        None
    }
}

/// The entries this one control contributes to a submission
pub fn control_entries(tree: &DomTree, id: NodeId) -> Vec<(String, EntryValue)> {
    let name = match control_name(tree, id) {
        Some(n) => n,
        None => return Vec::new(),
    };
    if is_disabled(tree, id) || !is_form_control(tree, id) {
        return Vec::new();
    }
    let tag = tree.tag(id).unwrap_or_default().to_string();
    match tag.as_str() {
        "select" => selected_values(tree, id)
            .into_iter()
            .map(|v| (name.clone(), EntryValue::Text(v)))
            .collect(),
        "textarea" => vec![(
            name,
            EntryValue::Text(current_value(tree, id).unwrap_or_default()),
        )],
        "input" => match input_type(tree, id).as_str() {
            "checkbox" | "radio" => {
                if is_checked(tree, id) {
                    let value = tree
                        .attr(id, "value")
                        .unwrap_or("on")
                        .to_string();
                    vec![(name, EntryValue::Text(value))]
                } else {
                    Vec::new()
                }
            }
            "file" => tree
                .element(id)
                .map(|e| {
                    e.form
                        .files
                        .iter()
                        .map(|f| (name.clone(), EntryValue::File(f.clone())))
                        .collect()
                })
                .unwrap_or_default(),
            "submit" | "button" | "image" => Vec::new(),
            _ => vec![(
                name,
                EntryValue::Text(current_value(tree, id).unwrap_or_default()),
            )],
        },
        _ => Vec::new(),
    }
}

/// All entries a form submission would carry, in document order.
/// Controls elsewhere in the document referencing the form through a
/// `form` attribute are included after the form's own descendants.
pub fn form_entries(tree: &DomTree, form: NodeId) -> Vec<(String, EntryValue)> {
    let mut controls: Vec<NodeId> = tree
        .descendants(form)
        .filter(|&d| is_form_control(tree, d))
        .collect();
    if let Some(form_id) = tree.attr(form, "id") {
        let form_id = form_id.to_string();
        for d in tree.descendants(NodeId::ROOT) {
            if tree.attr(d, "form") == Some(form_id.as_str())
                && is_form_control(tree, d)
                && !controls.contains(&d)
            {
                controls.push(d);
            }
        }
    }
    controls
        .into_iter()
        .flat_map(|c| control_entries(tree, c))
        .collect()
}

/// Set a control's current value
pub fn set_value(tree: &mut DomTree, id: NodeId, value: &str) {
    if let Some(elem) = tree.element_mut(id) {
        elem.form.value = Some(value.to_string());
    }
}

/// Set a checkbox/radio checked state
pub fn set_checked(tree: &mut DomTree, id: NodeId, checked: bool) {
    if let Some(elem) = tree.element_mut(id) {
        elem.form.checked = Some(checked);
    }
}

/// Toggle one option of a select by value. Multi-select mutation bumps
/// the selection generation.
pub fn toggle_option(tree: &mut DomTree, select: NodeId, value: &str, selected: bool) {
    let options = select_options(tree, select);
    for o in options {
        if option_value(tree, o) == value {
            if let Some(elem) = tree.element_mut(o) {
                elem.form.selected = Some(selected);
            }
        }
    }
    if let Some(elem) = tree.element_mut(select) {
        if elem.has_attr("multiple") {
            elem.form.selection_generation += 1;
        }
    }
}

/// Attach a file payload to a file input
pub fn attach_file(tree: &mut DomTree, input: NodeId, file: FileAttachment) {
    tracing::debug!(target: "graft", input = input.0, filename = %file.filename, bytes = file.bytes.len(), "file attached");
    if let Some(elem) = tree.element_mut(input) {
        elem.form.files.push(file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form_fixture() -> (DomTree, NodeId) {
        let mut tree = DomTree::new();
        let body = tree.create_element("body");
        tree.append_child(NodeId::ROOT, body).unwrap();
        let form = tree.create_element("form");
        tree.set_attr(form, "id", "f");
        tree.append_child(body, form).unwrap();
        (tree, form)
    }

    fn add_input(tree: &mut DomTree, form: NodeId, name: &str, ty: &str, value: &str) -> NodeId {
        let input = tree.create_element("input");
        tree.set_attr(input, "type", ty);
        tree.set_attr(input, "name", name);
        tree.set_attr(input, "value", value);
        tree.append_child(form, input).unwrap();
        input
    }

    fn texts(entries: &[(String, EntryValue)]) -> Vec<(String, String)> {
        entries
            .iter()
            .filter_map(|(k, v)| match v {
                EntryValue::Text(t) => Some((k.clone(), t.clone())),
                EntryValue::File(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_basic_entries() {
        let (mut tree, form) = form_fixture();
        add_input(&mut tree, form, "q", "text", "rust");
        let unnamed = tree.create_element("input");
        tree.append_child(form, unnamed).unwrap();

        assert_eq!(
            texts(&form_entries(&tree, form)),
            vec![("q".to_string(), "rust".to_string())]
        );
    }

    #[test]
    fn test_checkbox_only_when_checked() {
        let (mut tree, form) = form_fixture();
        let cb = add_input(&mut tree, form, "opt", "checkbox", "yes");
        assert!(form_entries(&tree, form).is_empty());

        set_checked(&mut tree, cb, true);
        assert_eq!(
            texts(&form_entries(&tree, form)),
            vec![("opt".to_string(), "yes".to_string())]
        );
    }

    #[test]
    fn test_disabled_excluded() {
        let (mut tree, form) = form_fixture();
        let input = add_input(&mut tree, form, "q", "text", "x");
        tree.set_attr(input, "disabled", "");
        assert!(form_entries(&tree, form).is_empty());
    }

    #[test]
    fn test_multi_select_flattened() {
        let (mut tree, form) = form_fixture();
        let select = tree.create_element("select");
        tree.set_attr(select, "name", "tags");
        tree.set_attr(select, "multiple", "");
        tree.append_child(form, select).unwrap();
        for v in ["a", "b", "c"] {
            let o = tree.create_element("option");
            tree.set_attr(o, "value", v);
            tree.append_child(select, o).unwrap();
        }
        toggle_option(&mut tree, select, "a", true);
        toggle_option(&mut tree, select, "c", true);

        assert_eq!(
            texts(&form_entries(&tree, form)),
            vec![
                ("tags".to_string(), "a".to_string()),
                ("tags".to_string(), "c".to_string()),
            ]
        );
        // selection mutation bumps the generation
        assert_eq!(selection_generation(&tree, select), Some(2));
    }

    #[test]
    fn test_file_entries() {
        let (mut tree, form) = form_fixture();
        let input = add_input(&mut tree, form, "upload", "file", "");
        attach_file(
            &mut tree,
            input,
            FileAttachment {
                filename: "a.txt".to_string(),
                content_type: "text/plain".to_string(),
                bytes: b"hi".to_vec(),
            },
        );
        let entries = form_entries(&tree, form);
        assert_eq!(entries.len(), 1);
        assert!(matches!(entries[0].1, EntryValue::File(_)));
    }

    #[test]
    fn test_form_attribute_reference() {
        let (mut tree, form) = form_fixture();
        let body = tree.parent(form).unwrap();
        let outside = tree.create_element("input");
        tree.set_attr(outside, "name", "extra");
        tree.set_attr(outside, "value", "1");
        tree.set_attr(outside, "form", "f");
        tree.append_child(body, outside).unwrap();

        assert_eq!(owning_form(&tree, outside), Some(form));
        assert_eq!(
            texts(&form_entries(&tree, form)),
            vec![("extra".to_string(), "1".to_string())]
        );
    }
}

//! Spoken announcement for one recognition result
//!
//! Labels may carry a relation as `name__rel__relation`; it is rendered as
//! `name, your relation`. Underscores render as spaces.

use crate::protocol::{Detection, UNKNOWN};

pub const RELATION_SEPARATOR: &str = "__rel__";

/// Split `name__rel__relation` into its parts
pub fn parse_relation(label: &str) -> (&str, Option<&str>) {
    match label.split_once(RELATION_SEPARATOR) {
        Some((name, relation)) => {
            let relation = relation.trim();
            (name.trim(), (!relation.is_empty()).then_some(relation))
        }
        None => (label, None),
    }
}

pub fn display_name(text: &str) -> String {
    if text.is_empty() || text == UNKNOWN {
        return text.to_string();
    }
    text.replace('_', " ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// How one identity is spoken
pub fn spoken_label(label: &str) -> String {
    match parse_relation(label) {
        (name, Some(relation)) => format!("{}, your {}", display_name(name), display_name(relation)),
        (name, None) => display_name(name),
    }
}

/// Distinct known labels at or above `threshold`, in order first seen
pub fn recognized_identities(faces: &[Detection], threshold: f64) -> Vec<String> {
    let mut labels: Vec<String> = Vec::new();
    for face in faces {
        if face.is_unknown() || face.confidence < threshold {
            continue;
        }
        if !labels.contains(&face.name) {
            labels.push(face.name.clone());
        }
    }
    labels
}

/// `None` when nobody qualifies
pub fn render_announcement(labels: &[String]) -> Option<String> {
    let spoken: Vec<String> = labels.iter().map(|l| spoken_label(l)).collect();
    match spoken.as_slice() {
        [] => None,
        [one] => Some(format!("I see {one}.")),
        [first, second] => Some(format!("I see 2 people: {first} and {second}.")),
        [rest @ .., last] => Some(format!(
            "I see {} people: {}, and {last}.",
            spoken.len(),
            rest.join(", ")
        )),
    }
}

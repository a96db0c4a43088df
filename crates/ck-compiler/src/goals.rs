//! Goal extraction.
//!
//! Every step carries an ordered set of goal identifiers: the gradable
//! interactions a student must complete before moving on. Goals are the
//! union of the `goals:` front matter, explicit `goal` attributes, and a
//! fixed table of built-in component rules, processed in document order so
//! indices are stable across recompilations. Goal-id strings are an
//! external contract: stored user progress keys against them, so the
//! naming templates and the legacy unindexed components must never change.

use ck_dom::{Document, NodeId};

enum Selector {
    Tags(&'static [&'static str]),
    Class(&'static str),
}

impl Selector {
    fn matches(&self, doc: &Document, id: NodeId) -> bool {
        match self {
            Self::Tags(tags) => tags.contains(&doc.tag(id)),
            Self::Class(class) => doc.has_class(id, class),
        }
    }
}

/// Skip matches of `tag` nested inside an `inside` ancestor.
struct Exclude {
    tag: &'static str,
    inside: &'static str,
}

struct ComponentRule {
    selector: Selector,
    /// Goal-name template; `$` is the zero-based match index.
    template: &'static str,
    /// Whether the computed goal is written back as a `goal` attribute,
    /// which the runtime needs to dispatch scoring.
    write_attr: bool,
    exclude: Option<Exclude>,
    /// Per-match sub-goal generator, replacing the template goal.
    subgoals: Option<fn(&Document, NodeId) -> Vec<String>>,
}

const COMPONENTS: &[ComponentRule] = &[
    ComponentRule {
        selector: Selector::Tags(&["x-blank", "x-blank-mc"]),
        template: "blank-$",
        write_attr: true,
        exclude: None,
        subgoals: None,
    },
    ComponentRule {
        selector: Selector::Tags(&["x-var"]),
        template: "var-$",
        write_attr: true,
        exclude: None,
        subgoals: None,
    },
    ComponentRule {
        selector: Selector::Tags(&["x-slider"]),
        template: "slider-$",
        write_attr: true,
        exclude: None,
        subgoals: None,
    },
    ComponentRule {
        selector: Selector::Tags(&["x-sortable"]),
        template: "sortable-$",
        write_attr: true,
        exclude: None,
        subgoals: None,
    },
    ComponentRule {
        selector: Selector::Tags(&["x-free-text"]),
        template: "free-text-$",
        write_attr: true,
        exclude: None,
        subgoals: None,
    },
    ComponentRule {
        selector: Selector::Class("next-step"),
        template: "next-$",
        write_attr: false,
        exclude: None,
        subgoals: None,
    },
    // An equation inside an equation system is scored by the system.
    ComponentRule {
        selector: Selector::Tags(&["x-equation", "x-equation-system"]),
        template: "eqn-$",
        write_attr: true,
        exclude: Some(Exclude {
            tag: "x-equation",
            inside: "x-equation-system",
        }),
        subgoals: None,
    },
    ComponentRule {
        selector: Selector::Tags(&["x-algebra-flow"]),
        template: "algebra-flow",
        write_attr: true,
        exclude: None,
        subgoals: Some(algebra_flow_goals),
    },
    ComponentRule {
        selector: Selector::Tags(&["x-picker"]),
        template: "picker",
        write_attr: true,
        exclude: None,
        subgoals: Some(picker_goals),
    },
    ComponentRule {
        selector: Selector::Tags(&["x-slideshow"]),
        template: "slide",
        write_attr: true,
        exclude: None,
        subgoals: Some(slideshow_goals),
    },
    // Legacy components keep their unindexed goal names.
    ComponentRule {
        selector: Selector::Tags(&["x-quill"]),
        template: "quill",
        write_attr: true,
        exclude: None,
        subgoals: None,
    },
    ComponentRule {
        selector: Selector::Tags(&["x-gameplay"]),
        template: "gameplay",
        write_attr: true,
        exclude: None,
        subgoals: None,
    },
];

/// One goal per list entry after the first.
fn algebra_flow_goals(doc: &Document, id: NodeId) -> Vec<String> {
    doc.descendants(id)
        .into_iter()
        .filter(|&li| doc.tag(li) == "li" && has_ancestor(doc, li, "ul"))
        .skip(1)
        .enumerate()
        .map(|(i, _)| format!("algebra-flow-{i}"))
        .collect()
}

/// One goal per choice, indexed over non-error choices only.
fn picker_goals(doc: &Document, id: NodeId) -> Vec<String> {
    doc.descendants(id)
        .into_iter()
        .filter(|&item| doc.has_class(item, "item") && !doc.has_attr(item, "data-error"))
        .enumerate()
        .map(|(i, _)| format!("picker-{i}"))
        .collect()
}

/// One goal per slide after the first, ignoring the stage slot.
fn slideshow_goals(doc: &Document, id: NodeId) -> Vec<String> {
    doc.children(id)
        .iter()
        .filter(|&&child| doc.attr(child, "slot") != Some("stage"))
        .skip(1)
        .enumerate()
        .map(|(i, _)| format!("slide-{i}"))
        .collect()
}

fn has_ancestor(doc: &Document, id: NodeId, tag: &str) -> bool {
    let mut current = id;
    while let Some(parent) = doc.parent(current) {
        if doc.tag(parent) == tag {
            return true;
        }
        current = parent;
    }
    false
}

fn push_unique(goals: &mut Vec<String>, goal: String) {
    if !goals.contains(&goal) {
        goals.push(goal);
    }
}

/// Collect the ordered, de-duplicated goal-id set for one step, writing
/// computed `goal` attributes back onto built-in components.
pub(crate) fn extract_goals(doc: &mut Document, metadata_goals: Option<&str>) -> Vec<String> {
    let mut goals = Vec::new();
    for goal in metadata_goals.unwrap_or_default().split_whitespace() {
        push_unique(&mut goals, goal.to_owned());
    }

    for id in doc.descendants(doc.root()) {
        if let Some(goal) = doc.attr(id, "goal") {
            push_unique(&mut goals, goal.to_owned());
        }
    }

    for rule in COMPONENTS {
        let matches: Vec<NodeId> = doc
            .descendants(doc.root())
            .into_iter()
            .filter(|&id| rule.selector.matches(doc, id))
            .filter(|&id| {
                rule.exclude
                    .as_ref()
                    .is_none_or(|e| doc.tag(id) != e.tag || !has_ancestor(doc, id, e.inside))
            })
            .collect();
        for (index, id) in matches.into_iter().enumerate() {
            let goal = rule.template.replace('$', &index.to_string());
            if rule.write_attr && !doc.has_attr(id, "goal") {
                doc.set_attr(id, "goal", &goal);
            }
            match rule.subgoals {
                Some(generate) => {
                    for sub in generate(doc, id) {
                        push_unique(&mut goals, sub);
                    }
                }
                None => push_unique(&mut goals, goal),
            }
        }
    }

    goals
}

/// Reading time in minutes: 75 words per minute plus 30 seconds per goal.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn estimate_duration(word_count: usize, goal_count: usize) -> f64 {
    word_count as f64 / 75.0 + goal_count as f64 / 2.0
}

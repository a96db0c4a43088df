//! Arena tree storage and editing operations.

/// Index of a node within a [`Document`] arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

#[derive(Clone, Debug, Default)]
pub(crate) struct Node {
    pub(crate) tag: String,
    pub(crate) attrs: Vec<(String, String)>,
    pub(crate) text: String,
    pub(crate) tail: String,
    pub(crate) children: Vec<NodeId>,
    pub(crate) parent: Option<NodeId>,
}

/// An owned HTML tree stored as a flat arena of element nodes.
///
/// Detached nodes stay in the arena but are unreachable from the root;
/// they are never reused, which keeps every [`NodeId`] stable for the
/// lifetime of the document.
pub struct Document {
    pub(crate) nodes: Vec<Node>,
    root: NodeId,
}

impl Document {
    /// Create an empty document with a root element of the given tag.
    #[must_use]
    pub fn new(root_tag: &str) -> Self {
        let root = Node {
            tag: root_tag.to_owned(),
            ..Node::default()
        };
        Self {
            nodes: vec![root],
            root: NodeId(0),
        }
    }

    /// The root element.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Create a new detached element.
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.nodes.push(Node {
            tag: tag.to_owned(),
            ..Node::default()
        });
        NodeId(self.nodes.len() - 1)
    }

    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    // --- Accessors ----------------------------------------------------------

    #[must_use]
    pub fn tag(&self, id: NodeId) -> &str {
        &self.node(id).tag
    }

    pub fn set_tag(&mut self, id: NodeId, tag: &str) {
        self.node_mut(id).tag = tag.to_owned();
    }

    #[must_use]
    pub fn text(&self, id: NodeId) -> &str {
        &self.node(id).text
    }

    pub fn set_text(&mut self, id: NodeId, text: impl Into<String>) {
        self.node_mut(id).text = text.into();
    }

    pub fn push_text(&mut self, id: NodeId, text: &str) {
        self.node_mut(id).text.push_str(text);
    }

    #[must_use]
    pub fn tail(&self, id: NodeId) -> &str {
        &self.node(id).tail
    }

    pub fn set_tail(&mut self, id: NodeId, tail: impl Into<String>) {
        self.node_mut(id).tail = tail.into();
    }

    pub fn push_tail(&mut self, id: NodeId, text: &str) {
        self.node_mut(id).tail.push_str(text);
    }

    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// Whether `id` is still reachable from the root.
    #[must_use]
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = id;
        while let Some(parent) = self.node(current).parent {
            current = parent;
        }
        current == self.root
    }

    /// All descendants of `id` in document (pre-)order, excluding `id`.
    #[must_use]
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        self.collect_descendants(id, &mut result);
        result
    }

    fn collect_descendants(&self, id: NodeId, out: &mut Vec<NodeId>) {
        for &child in &self.node(id).children {
            out.push(child);
            self.collect_descendants(child, out);
        }
    }

    /// Visible text of the subtree rooted at `id` (its tail excluded).
    #[must_use]
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        let node = self.node(id);
        out.push_str(&node.text);
        for &child in &node.children {
            self.collect_text(child, out);
            out.push_str(&self.node(child).tail);
        }
    }

    // --- Attributes ---------------------------------------------------------

    #[must_use]
    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.node(id)
            .attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn has_attr(&self, id: NodeId, name: &str) -> bool {
        self.attr(id, name).is_some()
    }

    /// Attributes in document/source order.
    #[must_use]
    pub fn attrs(&self, id: NodeId) -> &[(String, String)] {
        &self.node(id).attrs
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        let node = self.node_mut(id);
        if let Some(entry) = node.attrs.iter_mut().find(|(k, _)| k == name) {
            entry.1 = value.to_owned();
        } else {
            node.attrs.push((name.to_owned(), value.to_owned()));
        }
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) -> Option<String> {
        let node = self.node_mut(id);
        let pos = node.attrs.iter().position(|(k, _)| k == name)?;
        Some(node.attrs.remove(pos).1)
    }

    #[must_use]
    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.attr(id, "class")
            .is_some_and(|c| c.split_whitespace().any(|c| c == class))
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) {
        if self.has_class(id, class) {
            return;
        }
        match self.attr(id, "class") {
            Some(existing) => {
                let merged = format!("{existing} {class}");
                self.set_attr(id, "class", &merged);
            }
            None => self.set_attr(id, "class", class),
        }
    }

    pub fn remove_class(&mut self, id: NodeId, class: &str) {
        let Some(existing) = self.attr(id, "class") else {
            return;
        };
        let remaining = existing
            .split_whitespace()
            .filter(|c| *c != class)
            .collect::<Vec<_>>()
            .join(" ");
        if remaining.is_empty() {
            self.remove_attr(id, "class");
        } else {
            self.set_attr(id, "class", &remaining);
        }
    }

    // --- Structure edits ----------------------------------------------------

    /// Append `child` as the last child of `parent`, detaching it first if
    /// it is attached elsewhere.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.node_mut(parent).children.push(child);
        self.node_mut(child).parent = Some(parent);
    }

    /// Position of `id` within its parent's child list.
    #[must_use]
    pub fn position(&self, id: NodeId) -> Option<usize> {
        let parent = self.node(id).parent?;
        self.node(parent).children.iter().position(|&c| c == id)
    }

    /// Remove `id` from its parent. The node (and its tail) stays in the
    /// arena but is no longer reachable.
    pub fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.node(id).parent else {
            return;
        };
        if let Some(pos) = self.position(id) {
            self.node_mut(parent).children.remove(pos);
        }
        self.node_mut(id).parent = None;
    }

    /// Replace `old` with `new` in the tree. `new` takes over `old`'s slot
    /// and tail text; `old` is detached.
    pub fn replace_with(&mut self, old: NodeId, new: NodeId) {
        let Some(parent) = self.node(old).parent else {
            return;
        };
        let Some(pos) = self.position(old) else {
            return;
        };
        self.detach(new);
        self.node_mut(parent).children[pos] = new;
        self.node_mut(new).parent = Some(parent);
        let tail = std::mem::take(&mut self.node_mut(old).tail);
        self.node_mut(new).tail = tail;
        self.node_mut(old).parent = None;
    }

    /// Move all children of `from` onto the end of `onto`'s child list,
    /// preserving order. `from`'s leading text is appended to `onto`'s
    /// current content position.
    pub fn reparent_children(&mut self, from: NodeId, onto: NodeId) {
        let children = std::mem::take(&mut self.node_mut(from).children);
        let text = std::mem::take(&mut self.node_mut(from).text);
        if self.node(onto).children.is_empty() {
            self.node_mut(onto).text.push_str(&text);
        } else if let Some(&last) = self.node(onto).children.last() {
            self.node_mut(last).tail.push_str(&text);
        }
        for child in children {
            self.node_mut(child).parent = Some(onto);
            self.node_mut(onto).children.push(child);
        }
    }

    /// Wrap `id` in a new element that takes over its slot and tail.
    pub fn wrap(&mut self, id: NodeId, tag: &str) -> NodeId {
        let wrapper = self.create_element(tag);
        let parent = self.node(id).parent;
        if let (Some(parent), Some(pos)) = (parent, self.position(id)) {
            self.nodes[parent.0].children[pos] = wrapper;
            self.node_mut(wrapper).parent = Some(parent);
        }
        let tail = std::mem::take(&mut self.node_mut(id).tail);
        self.node_mut(wrapper).tail = tail;
        self.node_mut(wrapper).children.push(id);
        self.node_mut(id).parent = Some(wrapper);
        wrapper
    }

    /// Deep-copy the subtree rooted at `src_id` in `src` into this arena.
    ///
    /// Returns the id of the copied (detached) root.
    pub fn import(&mut self, src: &Document, src_id: NodeId) -> NodeId {
        let node = src.node(src_id);
        let copy = self.create_element(&node.tag);
        self.node_mut(copy).attrs = node.attrs.clone();
        self.node_mut(copy).text = node.text.clone();
        self.node_mut(copy).tail = node.tail.clone();
        for &child in &node.children {
            let imported = self.import(src, child);
            self.node_mut(copy).children.push(imported);
            self.node_mut(imported).parent = Some(copy);
        }
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Document, NodeId, NodeId) {
        let mut doc = Document::new("x-step");
        let p = doc.create_element("p");
        doc.set_text(p, "Hello ");
        let em = doc.create_element("em");
        doc.set_text(em, "world");
        doc.set_tail(em, "!");
        doc.append_child(doc.root(), p);
        doc.append_child(p, em);
        (doc, p, em)
    }

    #[test]
    fn test_text_content() {
        let (doc, p, _) = sample();
        assert_eq!(doc.text_content(p), "Hello world!");
        assert_eq!(doc.text_content(doc.root()), "Hello world!");
    }

    #[test]
    fn test_descendants_order() {
        let (doc, p, em) = sample();
        assert_eq!(doc.descendants(doc.root()), vec![p, em]);
    }

    #[test]
    fn test_classes() {
        let (mut doc, p, _) = sample();
        doc.add_class(p, "intro");
        doc.add_class(p, "red");
        doc.add_class(p, "intro");
        assert_eq!(doc.attr(p, "class"), Some("intro red"));
        assert!(doc.has_class(p, "red"));

        doc.remove_class(p, "intro");
        assert_eq!(doc.attr(p, "class"), Some("red"));
        doc.remove_class(p, "red");
        assert_eq!(doc.attr(p, "class"), None);
    }

    #[test]
    fn test_detach() {
        let (mut doc, p, em) = sample();
        doc.detach(em);
        assert!(doc.children(p).is_empty());
        assert!(!doc.is_attached(em));
        assert!(doc.is_attached(p));
    }

    #[test]
    fn test_replace_with_takes_tail() {
        let (mut doc, _, em) = sample();
        let strong = doc.create_element("strong");
        doc.replace_with(em, strong);
        assert_eq!(doc.tail(strong), "!");
        assert_eq!(doc.tail(em), "");
        assert!(!doc.is_attached(em));
    }

    #[test]
    fn test_wrap_moves_tail() {
        let (mut doc, p, em) = sample();
        let wrapper = doc.wrap(em, "span");
        assert_eq!(doc.children(p), &[wrapper]);
        assert_eq!(doc.children(wrapper), &[em]);
        assert_eq!(doc.tail(wrapper), "!");
        assert_eq!(doc.tail(em), "");
    }

    #[test]
    fn test_reparent_children() {
        let (mut doc, p, em) = sample();
        let div = doc.create_element("div");
        doc.reparent_children(p, div);
        assert_eq!(doc.children(div), &[em]);
        assert_eq!(doc.text(div), "Hello ");
        assert!(doc.children(p).is_empty());
    }

    #[test]
    fn test_import() {
        let (src, p, _) = sample();
        let mut dst = Document::new("root");
        let copy = dst.import(&src, p);
        dst.append_child(dst.root(), copy);
        assert_eq!(dst.text_content(dst.root()), "Hello world!");
    }
}

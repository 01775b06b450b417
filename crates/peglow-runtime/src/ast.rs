use std::fmt::Write;

use bstr::BStr;

use crate::Symbol;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Length of the log at the time it was taken.
#[repr(transparent)]
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct AstMark(u32);

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Link {
    pub label: Option<Symbol>,
    pub node: NodeId,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LogEntry {
    New { position: u32, left_join: bool },
    Capture { position: u32 },
    Tag(Symbol),
    Replace(Symbol),
    Link(Link),
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Node {
    pub tag: Option<Symbol>,
    pub value: Option<Symbol>,
    pub start: u32,
    pub end: u32,
    pub children: Vec<Link>,
}

struct NodeBuilder {
    tag: Option<Symbol>,
    value: Option<Symbol>,
    start: u32,
    end: Option<u32>,
    children: Vec<Link>,
}

impl NodeBuilder {
    fn new(start: u32, children: Vec<Link>) -> NodeBuilder {
        NodeBuilder {
            tag: None,
            value: None,
            start,
            end: None,
            children,
        }
    }
}

/// Append-only record of tree construction actions.
///
/// Entries are only turned into [`Node`]s on [`AstLog::commit`], everything appended
/// after a mark can be thrown away with [`AstLog::abort`]. Committed nodes live in an
/// arena which is never truncated, nodes built by a later aborted branch simply become
/// unreachable.
#[derive(Default)]
pub struct AstLog {
    entries: Vec<LogEntry>,
    nodes: Vec<Node>,
}

impl AstLog {
    pub fn new() -> AstLog {
        AstLog::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn mark(&self) -> AstMark {
        AstMark(self.entries.len().try_into().unwrap_or(u32::MAX))
    }

    pub fn push(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    pub fn abort(&mut self, mark: AstMark) {
        debug_assert!(
            mark.0 as usize <= self.entries.len(),
            "Log is shorter than the mark. Mismatched mark - abort pair?"
        );
        self.entries.truncate(mark.0 as usize);
    }

    /// Turns all entries since `mark` into a node and removes them from the log.
    ///
    /// Links appended before the first `New` become children of the node it starts,
    /// a left-join `New` makes the node built so far its first child. Without any `New`
    /// a single link is passed through as is and several links are grouped under an
    /// untagged node. `Capture`, `Tag` and `Replace` outside of a node are dropped.
    pub fn commit(&mut self, mark: AstMark) -> Option<NodeId> {
        let start = (mark.0 as usize).min(self.entries.len());
        let entries = self.entries.split_off(start);

        let mut current: Option<NodeBuilder> = None;
        let mut pending = Vec::new();

        for entry in entries {
            match entry {
                LogEntry::New {
                    position,
                    left_join: false,
                } => match &mut current {
                    Some(node) => node.start = position,
                    None => {
                        let children = std::mem::take(&mut pending);
                        current = Some(NodeBuilder::new(position, children));
                    }
                },
                LogEntry::New {
                    position,
                    left_join: true,
                } => {
                    let next = match current.take() {
                        Some(left) => {
                            let start = left.start;
                            let left = self.finish(left);
                            NodeBuilder::new(start, vec![Link { label: None, node: left }])
                        }
                        None => {
                            // links made before the first node become its leading children
                            let children = std::mem::take(&mut pending);
                            let start = children
                                .first()
                                .map_or(position, |link| self.nodes[link.node.index()].start);
                            NodeBuilder::new(start, children)
                        }
                    };
                    current = Some(next);
                }
                LogEntry::Capture { position } => {
                    if let Some(node) = &mut current {
                        node.end = Some(position);
                    }
                }
                LogEntry::Tag(tag) => {
                    if let Some(node) = &mut current {
                        node.tag = Some(tag);
                    }
                }
                LogEntry::Replace(value) => {
                    if let Some(node) = &mut current {
                        node.value = Some(value);
                    }
                }
                LogEntry::Link(link) => match &mut current {
                    Some(node) => node.children.push(link),
                    None => pending.push(link),
                },
            }
        }

        match current {
            Some(node) => Some(self.finish(node)),
            None if pending.len() <= 1 => pending.first().map(|link| link.node),
            None => {
                let start = self.nodes[pending[0].node.index()].start;
                let end = self.nodes[pending[pending.len() - 1].node.index()].end;
                let mut node = NodeBuilder::new(start, pending);
                node.end = Some(end);
                Some(self.finish(node))
            }
        }
    }

    fn finish(&mut self, node: NodeBuilder) -> NodeId {
        let end = node.end.unwrap_or_else(|| {
            node.children
                .last()
                .map(|link| self.nodes[link.node.index()].end)
                .unwrap_or(node.start)
        });

        let id = NodeId(self.nodes.len().try_into().unwrap_or(u32::MAX));
        self.nodes.push(Node {
            tag: node.tag,
            value: node.value,
            start: node.start,
            end: end.max(node.start),
            children: node.children,
        });
        id
    }

    /// The link appended since `mark` if it is the only entry appended since then.
    pub fn single_link(&self, mark: AstMark) -> Option<Link> {
        match self.entries.get(mark.0 as usize..)? {
            [LogEntry::Link(link)] => Some(*link),
            _ => None,
        }
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn into_tree(self, root: NodeId) -> Tree {
        Tree {
            nodes: self.nodes,
            root,
        }
    }
}

/// Finished syntax tree returned from a successful parse.
pub struct Tree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Tree {
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// Looks up a child by label, mostly useful in tests.
    pub fn child(&self, id: NodeId, label: Symbol) -> Option<NodeId> {
        self.node(id)
            .children
            .iter()
            .find(|link| link.label == Some(label))
            .map(|link| link.node)
    }

    pub fn text<'a>(&self, id: NodeId, input: &'a [u8]) -> &'a [u8] {
        let node = self.node(id);
        let end = (node.end as usize).min(input.len());
        let start = (node.start as usize).min(end);
        &input[start..end]
    }

    pub fn display_into(
        &self,
        buf: &mut dyn Write,
        input: &[u8],
        symbols: &[&str],
    ) -> std::fmt::Result {
        self.display_node(buf, self.root, None, 0, input, symbols)
    }

    fn display_node(
        &self,
        buf: &mut dyn Write,
        id: NodeId,
        label: Option<Symbol>,
        indent: usize,
        input: &[u8],
        symbols: &[&str],
    ) -> std::fmt::Result {
        let node = self.node(id);

        for _ in 0..indent {
            buf.write_str("  ")?;
        }
        if let Some(label) = label {
            write!(buf, "{}: ", label.name(symbols))?;
        }
        match node.tag {
            Some(tag) => write!(buf, "#{}", tag.name(symbols))?,
            None => buf.write_str("#")?,
        }
        write!(buf, " {}..{}", node.start, node.end)?;
        match node.value {
            Some(value) => write!(buf, " = {:?}", value.name(symbols))?,
            None if node.children.is_empty() => {
                write!(buf, " {:?}", BStr::new(self.text(id, input)))?
            }
            None => {}
        }
        buf.write_char('\n')?;

        for child in &node.children {
            self.display_node(buf, child.node, child.label, indent + 1, input, symbols)?;
        }
        Ok(())
    }
}

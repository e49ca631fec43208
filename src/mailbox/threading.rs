use std::collections::HashMap;

use crate::remote::{Envelope, Uid};

/// One message in thread order. `level` 0 starts a new thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadNode {
    pub uid: Uid,
    pub level: usize,
}

/// Thread ordering of a mailbox, as returned by a THREAD request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadTree {
    nodes: Vec<ThreadNode>,
}

impl ThreadTree {
    pub const fn empty() -> Self {
        Self { nodes: Vec::new() }
    }

    /// `nodes` must be in depth-first thread order.
    pub fn new(nodes: Vec<ThreadNode>) -> Self {
        Self { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[ThreadNode] {
        &self.nodes
    }

    /// Iterate over threads, each a slice starting at a level-0 node.
    pub fn threads(&self) -> impl Iterator<Item = &[ThreadNode]> {
        let mut starts: Vec<usize> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(i, n)| n.level == 0 || *i == 0)
            .map(|(i, _)| i)
            .collect();
        starts.push(self.nodes.len());
        let nodes = &self.nodes;
        starts
            .windows(2)
            .map(|w| (w[0], w[1]))
            .collect::<Vec<_>>()
            .into_iter()
            .map(move |(a, b)| &nodes[a..b])
    }

    /// Flat UID list. Descending order reverses the order of threads but
    /// keeps each thread's internal order.
    pub fn message_list(&self, descending: bool) -> Vec<Uid> {
        let mut threads: Vec<&[ThreadNode]> = self.threads().collect();
        if descending {
            threads.reverse();
        }
        threads
            .into_iter()
            .flat_map(|t| t.iter().map(|n| n.uid.clone()))
            .collect()
    }

    pub fn level(&self, uid: &Uid) -> Option<usize> {
        self.nodes.iter().find(|n| &n.uid == uid).map(|n| n.level)
    }

    /// Tree-drawing prefix for list rendering.
    ///
    /// One column per level: a guide line where an ancestor's branch goes on
    /// below this message, then a tee or an elbow for the message itself.
    /// Thread roots and unknown UIDs get no prefix.
    pub fn tree_prefix(&self, uid: &Uid) -> String {
        let Some(pos) = self.nodes.iter().position(|n| &n.uid == uid) else {
            return String::new();
        };
        let level = self.nodes[pos].level;
        if level == 0 {
            return String::new();
        }

        let mut prefix: String = (1..level)
            .map(|depth| if self.branch_continues(pos, depth) { "│  " } else { "   " })
            .collect();
        prefix.push_str(if self.branch_continues(pos, level) { "├─ " } else { "└─ " });
        prefix
    }

    /// Whether another node at `depth` follows `pos` before its subtree closes.
    fn branch_continues(&self, pos: usize, depth: usize) -> bool {
        self.nodes[pos + 1..]
            .iter()
            .map(|n| n.level)
            .find(|&l| l <= depth)
            .is_some_and(|l| l == depth)
    }

    /// Thread by Message-ID / In-Reply-To / References (RFC 5256 REFERENCES,
    /// simplified). Threads are ordered by the date of their root message,
    /// replies chronologically under their parent.
    pub fn from_messages(messages: &[(Uid, &Envelope)]) -> Self {
        if messages.is_empty() {
            return Self::empty();
        }

        let len = messages.len();

        let id_to_idx: HashMap<&str, usize> = messages
            .iter()
            .enumerate()
            .filter_map(|(i, (_, env))| env.message_id.as_deref().map(|mid| (mid, i)))
            .collect();

        // Parent links, skipping self-references
        let parent: Vec<Option<usize>> = messages
            .iter()
            .enumerate()
            .map(|(i, (_, env))| {
                let candidates = env
                    .in_reply_to
                    .iter()
                    .chain(env.references.iter().rev());
                for id in candidates {
                    if let Some(&p) = id_to_idx.get(id.as_str()) {
                        if p != i {
                            return Some(p);
                        }
                    }
                }
                None
            })
            .collect();

        // Break cycles: a node whose ancestor chain loops back is made a root
        let mut parent = parent;
        for i in 0..len {
            let mut current = i;
            let mut steps = 0;
            while let Some(p) = parent[current] {
                current = p;
                steps += 1;
                if current == i || steps > len {
                    parent[i] = None;
                    break;
                }
            }
        }

        let date_of = |i: usize| messages[i].1.date.as_deref().unwrap_or("");

        let mut children: HashMap<usize, Vec<usize>> = HashMap::new();
        let mut roots = Vec::new();
        for (i, p) in parent.iter().enumerate() {
            match p {
                Some(p) => children.entry(*p).or_default().push(i),
                None => roots.push(i),
            }
        }
        for kids in children.values_mut() {
            kids.sort_by(|&a, &b| date_of(a).cmp(date_of(b)).then(a.cmp(&b)));
        }
        roots.sort_by(|&a, &b| date_of(a).cmp(date_of(b)).then(a.cmp(&b)));

        let mut nodes = Vec::with_capacity(len);
        for root in roots {
            collect_thread_dfs(root, 0, &children, messages, &mut nodes);
        }

        Self { nodes }
    }

    /// Group by base subject (ORDEREDSUBJECT): the earliest message of each
    /// group is the root, every other message hangs directly below it.
    pub fn from_subjects(messages: &[(Uid, &Envelope)]) -> Self {
        let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
        for (i, (_, env)) in messages.iter().enumerate() {
            let base = base_subject(env.subject.as_deref().unwrap_or(""));
            match groups.iter_mut().find(|(s, _)| *s == base) {
                Some((_, members)) => members.push(i),
                None => groups.push((base, vec![i])),
            }
        }

        let date_of = |i: usize| messages[i].1.date.as_deref().unwrap_or("");
        for (_, members) in groups.iter_mut() {
            members.sort_by(|&a, &b| date_of(a).cmp(date_of(b)).then(a.cmp(&b)));
        }
        groups.sort_by(|a, b| date_of(a.1[0]).cmp(date_of(b.1[0])).then(a.1[0].cmp(&b.1[0])));

        let nodes = groups
            .into_iter()
            .flat_map(|(_, members)| {
                members.into_iter().enumerate().map(|(k, i)| ThreadNode {
                    uid: messages[i].0.clone(),
                    level: usize::from(k > 0),
                })
            })
            .collect();

        Self { nodes }
    }
}

fn collect_thread_dfs(
    idx: usize,
    depth: usize,
    children: &HashMap<usize, Vec<usize>>,
    messages: &[(Uid, &Envelope)],
    result: &mut Vec<ThreadNode>,
) {
    result.push(ThreadNode {
        uid: messages[idx].0.clone(),
        level: depth,
    });

    if let Some(kids) = children.get(&idx) {
        for &child in kids {
            collect_thread_dfs(child, depth + 1, children, messages, result);
        }
    }
}

/// Strip reply/forward prefixes and surrounding whitespace, lowercased.
fn base_subject(subject: &str) -> String {
    let mut s = subject.trim();
    loop {
        let lower = s.to_lowercase();
        let stripped = ["re:", "fwd:", "fw:"]
            .iter()
            .find(|p| lower.starts_with(*p))
            .map(|p| s[p.len()..].trim_start());
        match stripped {
            Some(rest) => s = rest,
            None => break,
        }
    }
    s.to_lowercase()
}

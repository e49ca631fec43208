use std::collections::BTreeMap;

use crate::error::IndexError;
use crate::remote::Uid;

/// A message identity: UID plus the physical mailbox it lives in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Entry {
    pub mailbox: String,
    pub uid: Uid,
}

impl Entry {
    pub fn new(mailbox: impl Into<String>, uid: impl Into<Uid>) -> Self {
        Self {
            mailbox: mailbox.into(),
            uid: uid.into(),
        }
    }
}

/// Message identities grouped by mailbox, in first-seen mailbox order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Indices {
    groups: Vec<(String, Vec<Uid>)>,
}

impl Indices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(mailbox: impl Into<String>, uid: impl Into<Uid>) -> Self {
        let mut indices = Self::new();
        indices.insert(mailbox, uid);
        indices
    }

    pub fn insert(&mut self, mailbox: impl Into<String>, uid: impl Into<Uid>) {
        let mailbox = mailbox.into();
        let uid = uid.into();
        match self.groups.iter_mut().find(|(m, _)| *m == mailbox) {
            Some((_, uids)) => uids.push(uid),
            None => self.groups.push((mailbox, vec![uid])),
        }
    }

    /// Total number of messages across all mailboxes.
    pub fn len(&self) -> usize {
        self.groups.iter().map(|(_, uids)| uids.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn mailboxes(&self) -> impl Iterator<Item = (&str, &[Uid])> {
        self.groups.iter().map(|(m, uids)| (m.as_str(), uids.as_slice()))
    }

    pub fn iter(&self) -> impl Iterator<Item = Entry> + '_ {
        self.groups.iter().flat_map(|(m, uids)| {
            uids.iter().map(move |uid| Entry {
                mailbox: m.clone(),
                uid: uid.clone(),
            })
        })
    }

    /// Report an incomplete match set, e.g. when reassembling a message that
    /// was split into `expected` parts.
    pub fn expect_count(&self, mailbox: &str, expected: usize) -> Result<(), IndexError> {
        let found = self.len();
        if found == expected {
            Ok(())
        } else {
            Err(IndexError::IncompleteMatches {
                mailbox: mailbox.to_string(),
                found,
                expected,
            })
        }
    }
}

impl FromIterator<Entry> for Indices {
    fn from_iter<I: IntoIterator<Item = Entry>>(iter: I) -> Self {
        let mut indices = Self::new();
        for entry in iter {
            indices.insert(entry.mailbox, entry.uid);
        }
        indices
    }
}

/// Ordered list keyed by 1-based display position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortedList {
    pub uids: BTreeMap<usize, Uid>,
    /// Empty for physical mailboxes.
    pub mailboxes: BTreeMap<usize, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_grouping() {
        let indices: Indices = vec![
            Entry::new("INBOX", 4u32),
            Entry::new("Sent", 4u32),
            Entry::new("INBOX", 9u32),
        ]
        .into_iter()
        .collect();

        let groups: Vec<(&str, usize)> = indices.mailboxes().map(|(m, u)| (m, u.len())).collect();
        assert_eq!(groups, vec![("INBOX", 2), ("Sent", 1)]);
        assert_eq!(indices.len(), 3);
    }

    #[test]
    fn test_expect_count() {
        let indices = Indices::single("INBOX", 1u32);
        assert!(indices.expect_count("INBOX", 1).is_ok());
        match indices.expect_count("INBOX", 3) {
            Err(IndexError::IncompleteMatches { found, expected, .. }) => {
                assert_eq!((found, expected), (1, 3));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}

use std::collections::HashSet;

use crate::channel::ChatId;

/// Chat ids allowed to run data commands.
///
/// An empty list lets every chat through, which is convenient in development and dangerous
/// anywhere else; [`AllowList::is_open`] lets startup warn about it.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    ids: HashSet<String>,
}

impl AllowList {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            ids: ids
                .into_iter()
                .map(|id| id.as_ref().trim().to_string())
                .filter(|id| !id.is_empty())
                .collect(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn allows(&self, chat: &ChatId) -> bool {
        self.is_open() || self.ids.contains(chat.as_str())
    }
}

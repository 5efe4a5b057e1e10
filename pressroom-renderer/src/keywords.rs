//! Content-kind detection for "content of kind X changed" signals.
//!
//! A settled deployment says nothing structured about what it published, so
//! the kind is recovered from the editor's `action` text ("Create post:
//! hello.md") and the `itemId` path (`content/pages/about.md`). A word
//! matches when it starts with the keyword, so `posts` and `deleted` count.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use pressroom_core::DeploymentRecord;

/// Kind of content whose list view must refresh after a publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Post,
    Page,
    Restore,
    Delete,
}

impl ContentKind {
    pub const ALL: [ContentKind; 4] = [
        ContentKind::Post,
        ContentKind::Page,
        ContentKind::Restore,
        ContentKind::Delete,
    ];

    pub fn keyword(self) -> &'static str {
        match self {
            ContentKind::Post => "post",
            ContentKind::Page => "page",
            ContentKind::Restore => "restore",
            ContentKind::Delete => "delete",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Kinds mentioned in one piece of text.
pub fn detect(text: &str) -> BTreeSet<ContentKind> {
    let lowered = text.to_lowercase();
    let mut kinds = BTreeSet::new();
    for word in lowered.split(|c: char| !c.is_alphanumeric()) {
        for kind in ContentKind::ALL {
            if word.starts_with(kind.keyword()) {
                kinds.insert(kind);
            }
        }
    }
    kinds
}

/// Kinds mentioned by a record's action text or item path.
pub fn detect_record(record: &DeploymentRecord) -> BTreeSet<ContentKind> {
    let mut kinds = detect(&record.action);
    if let Some(item) = &record.item_id {
        kinds.extend(detect(item));
    }
    kinds
}

/// Union over a burst of settled records; each kind appears once.
pub fn changed_kinds<'a>(
    records: impl IntoIterator<Item = &'a DeploymentRecord>,
) -> BTreeSet<ContentKind> {
    records.into_iter().flat_map(detect_record).collect()
}

/// First kind a record mentions, for dashboard labelling.
pub fn primary_kind(record: &DeploymentRecord) -> Option<ContentKind> {
    detect_record(record).into_iter().next()
}

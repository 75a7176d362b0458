use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use hirelink_core::{Conversation, Reply};

pub type SharedStore = Arc<Mutex<ConversationStore>>;

pub fn shared(store: ConversationStore) -> SharedStore {
    Arc::new(Mutex::new(store))
}

/// Locks the store, recovering the data if a holder panicked.
pub fn lock(store: &SharedStore) -> MutexGuard<'_, ConversationStore> {
    store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Optimistic changes kept on top of server state until the server reflects them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalOp {
    MarkRead(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeReport {
    pub conversations: usize,
    pub unread: usize,
    pub selection_refreshed: bool,
}

/// Authoritative in-memory conversation list plus the open conversation.
#[derive(Debug)]
pub struct ConversationStore {
    conversations: Vec<Arc<Conversation>>,
    selected: Option<Arc<Conversation>>,
    pending: Vec<PendingOp>,
    live: bool,
}

/// A local op plus the reply count it was applied against. A fetch showing
/// more replies than that supersedes it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingOp {
    op: LocalOp,
    replies: usize,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationStore {
    pub fn new() -> Self {
        Self {
            conversations: Vec::new(),
            selected: None,
            pending: Vec::new(),
            live: true,
        }
    }

    pub fn conversations(&self) -> &[Arc<Conversation>] {
        &self.conversations
    }

    pub fn conversation(&self, id: &str) -> Option<Arc<Conversation>> {
        self.conversations.iter().find(|c| c.id == id).cloned()
    }

    pub fn selected(&self) -> Option<Arc<Conversation>> {
        self.selected.clone()
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.selected.as_ref().map(|c| c.id.as_str())
    }

    pub fn unread_count(&self) -> usize {
        self.conversations.iter().filter(|c| !c.is_read).count()
    }

    pub fn pending(&self) -> Vec<LocalOp> {
        self.pending.iter().map(|p| p.op.clone()).collect()
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    /// After this, merges and local ops are ignored.
    pub fn close(&mut self) {
        self.live = false;
    }

    pub fn select(&mut self, id: &str) -> Option<Arc<Conversation>> {
        self.selected = self.conversation(id);
        self.selected.clone()
    }

    pub fn deselect(&mut self) {
        self.selected = None;
    }

    /// Empty state after an authentication failure. Pending ops are kept.
    pub fn clear(&mut self) {
        if !self.live {
            return;
        }
        self.conversations.clear();
        self.selected = None;
    }

    /// Applies an optimistic op to the list and the selection, returning
    /// whether anything changed.
    pub fn apply(&mut self, op: LocalOp) -> bool {
        if !self.live {
            return false;
        }
        let (changed, replies) = match &op {
            LocalOp::MarkRead(id) => {
                let mut changed = false;
                let mut replies = 0;
                for entry in self.conversations.iter_mut().filter(|c| c.id == *id) {
                    replies = replies.max(entry.reply_count());
                    if !entry.is_read {
                        Arc::make_mut(entry).is_read = true;
                        changed = true;
                    }
                }
                if let Some(selected) = self.selected.as_mut().filter(|c| c.id == *id) {
                    replies = replies.max(selected.reply_count());
                    if !selected.is_read {
                        Arc::make_mut(selected).is_read = true;
                        changed = true;
                    }
                }
                (changed, replies)
            }
        };
        if changed {
            self.pending.retain(|p| p.op != op);
            self.pending.push(PendingOp { op, replies });
        }
        changed
    }

    /// Replaces the list with `fresh`. Already observed replies and receipts
    /// survive a lagging response. A pending mark-read stays applied until the
    /// server agrees or the conversation gains replies, after which the server
    /// flag wins. The selection only moves to a new `Arc` when it gained
    /// replies. Returns `None` once the store is closed.
    pub fn merge(&mut self, fresh: Vec<Conversation>) -> Option<MergeReport> {
        if !self.live {
            return None;
        }
        let previous: HashMap<&str, &Arc<Conversation>> = self
            .conversations
            .iter()
            .map(|c| (c.id.as_str(), c))
            .collect();

        let mut settled = Vec::new();
        let mut merged = Vec::with_capacity(fresh.len());
        for mut conversation in fresh {
            let prev = previous.get(conversation.id.as_str()).copied();
            if let Some(prev) = prev {
                conversation.replies = merge_replies(&prev.replies, conversation.replies);
            }
            let op = LocalOp::MarkRead(conversation.id.clone());
            if let Some(pending) = self.pending.iter().find(|p| p.op == op) {
                if conversation.is_read {
                    settled.push(op);
                } else if conversation.reply_count() > pending.replies {
                    tracing::debug!(
                        conversation_id = %conversation.id,
                        "new replies since local mark-read, server read state wins"
                    );
                    settled.push(op);
                } else {
                    conversation.is_read = true;
                }
            }
            match prev {
                Some(prev) if **prev == conversation => merged.push(Arc::clone(prev)),
                _ => merged.push(Arc::new(conversation)),
            }
        }
        self.pending.retain(|p| !settled.contains(&p.op));
        self.conversations = merged;

        let mut selection_refreshed = false;
        if let Some(current) = &self.selected {
            if let Some(latest) = self.conversations.iter().find(|c| c.id == current.id) {
                if latest.reply_count() > current.reply_count() {
                    self.selected = Some(Arc::clone(latest));
                    selection_refreshed = true;
                }
            }
        }

        Some(MergeReport {
            conversations: self.conversations.len(),
            unread: self.unread_count(),
            selection_refreshed,
        })
    }
}

fn merge_replies(observed: &[Reply], fresh: Vec<Reply>) -> Vec<Reply> {
    let by_id: HashMap<&str, &Reply> = observed.iter().map(|r| (r.id.as_str(), r)).collect();
    let mut merged: Vec<Reply> = fresh
        .into_iter()
        .map(|mut reply| {
            if let Some(prev) = by_id.get(reply.id.as_str()) {
                reply.absorb_receipts(prev);
            }
            reply
        })
        .collect();
    let present: HashSet<String> = merged.iter().map(|r| r.id.clone()).collect();
    let missing: Vec<Reply> = observed
        .iter()
        .filter(|r| !present.contains(&r.id))
        .cloned()
        .collect();
    if missing.is_empty() {
        return merged;
    }
    tracing::debug!(count = missing.len(), "keeping replies missing from a lagging fetch");
    merged.extend(missing);
    if merged.iter().all(|r| r.created_at.is_some()) {
        merged.sort_by_key(|r| r.created_at);
    }
    merged
}

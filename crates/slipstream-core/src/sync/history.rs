//! History reconciliation: change events → affected thread and message ids

use std::collections::BTreeSet;

use crate::client::HistoryRecord;

/// Minimal set of work derived from a change-event window
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Threads whose messages must be re-fetched
    pub thread_ids_to_fetch: BTreeSet<String>,

    /// Messages that were hard-deleted remotely
    pub message_ids_to_delete: BTreeSet<String>,
}

impl ChangeSet {
    /// An empty window short-circuits the run; this is not an error
    pub fn is_empty(&self) -> bool {
        self.thread_ids_to_fetch.is_empty() && self.message_ids_to_delete.is_empty()
    }
}

/// Reduce a change-event stream to the threads to fetch and messages to
/// delete.
///
/// Added and label-changed events mark the owning thread for a full
/// re-fetch (per-message label state is refreshed wholesale, never patched);
/// delete events mark the message id. Repeated mentions of one thread
/// collapse into the set.
pub fn reconcile(records: &[HistoryRecord]) -> ChangeSet {
    let mut changes = ChangeSet::default();

    for record in records {
        if let Some(added) = &record.messages_added {
            for event in added {
                changes
                    .thread_ids_to_fetch
                    .insert(event.message.thread_id.clone());
            }
        }
        if let Some(deleted) = &record.messages_deleted {
            for event in deleted {
                changes
                    .message_ids_to_delete
                    .insert(event.message.id.clone());
            }
        }
        if let Some(labeled) = &record.labels_added {
            for event in labeled {
                changes
                    .thread_ids_to_fetch
                    .insert(event.message.thread_id.clone());
            }
        }
        if let Some(unlabeled) = &record.labels_removed {
            for event in unlabeled {
                changes
                    .thread_ids_to_fetch
                    .insert(event.message.thread_id.clone());
            }
        }
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{HistoryLabelEvent, HistoryMessageEvent, MessageRef};

    fn message_ref(id: &str, thread_id: &str) -> MessageRef {
        MessageRef {
            id: id.to_string(),
            thread_id: thread_id.to_string(),
        }
    }

    fn added(id: &str, thread_id: &str) -> HistoryMessageEvent {
        HistoryMessageEvent {
            message: message_ref(id, thread_id),
        }
    }

    fn labeled(id: &str, thread_id: &str, labels: &[&str]) -> HistoryLabelEvent {
        HistoryLabelEvent {
            message: message_ref(id, thread_id),
            label_ids: labels.iter().map(|l| l.to_string()).collect(),
        }
    }

    #[test]
    fn test_empty_stream_is_empty_changeset() {
        let changes = reconcile(&[]);
        assert!(changes.is_empty());
    }

    #[test]
    fn test_added_events_deduplicate_by_thread() {
        let records = vec![
            HistoryRecord {
                messages_added: Some(vec![added("m1", "t1"), added("m2", "t1")]),
                ..Default::default()
            },
            HistoryRecord {
                messages_added: Some(vec![added("m3", "t2")]),
                ..Default::default()
            },
        ];

        let changes = reconcile(&records);
        assert_eq!(
            changes.thread_ids_to_fetch,
            BTreeSet::from(["t1".to_string(), "t2".to_string()])
        );
        assert!(changes.message_ids_to_delete.is_empty());
    }

    #[test]
    fn test_label_only_events_still_trigger_thread_fetch() {
        let records = vec![HistoryRecord {
            labels_added: Some(vec![labeled("m1", "t1", &["STARRED"])]),
            labels_removed: Some(vec![labeled("m2", "t2", &["UNREAD"])]),
            ..Default::default()
        }];

        let changes = reconcile(&records);
        assert_eq!(
            changes.thread_ids_to_fetch,
            BTreeSet::from(["t1".to_string(), "t2".to_string()])
        );
    }

    #[test]
    fn test_deletes_collect_message_ids() {
        let records = vec![HistoryRecord {
            messages_added: Some(vec![added("m1", "t1")]),
            messages_deleted: Some(vec![
                HistoryMessageEvent {
                    message: message_ref("m1", "t1"),
                },
                HistoryMessageEvent {
                    message: message_ref("m9", "t9"),
                },
            ]),
            ..Default::default()
        }];

        let changes = reconcile(&records);
        // The delete set holds message ids; the added event still marks the
        // thread for re-fetch.
        assert_eq!(
            changes.message_ids_to_delete,
            BTreeSet::from(["m1".to_string(), "m9".to_string()])
        );
        assert_eq!(
            changes.thread_ids_to_fetch,
            BTreeSet::from(["t1".to_string()])
        );
    }
}

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;

use crate::domain::entities::edit::EditKey;
use crate::domain::entities::notice::UPDATE_FAILED_MESSAGE;
use crate::domain::entities::row::{cell_text, same_text};
use crate::usecase::ports::gateway::{PatchRequest, GatewayError, TableGateway};
use crate::usecase::services::edit_service::EditSession;

/// A staged edit turned into a request, together with the value it carries.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingPatch {
    pub key: EditKey,
    pub request: PatchRequest,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionOutcome {
    pub key: EditKey,
    /// Value sent in the request, used to detect edits made while it was in flight.
    pub submitted: Value,
    pub result: Result<(), GatewayError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// The backend holds the staged value; the edit is gone.
    Committed,
    /// The request succeeded but the cell was edited again meanwhile; the
    /// newer value stays staged against the saved one.
    Superseded,
    /// The request failed; the edit stays staged and is marked.
    Flagged { notice_generation: u64 },
    /// The edit was discarded before the response arrived.
    Missing,
}

pub struct SubmissionCoordinator {
    gateway: Arc<dyn TableGateway>,
    base_url: String,
}

impl SubmissionCoordinator {
    pub fn new(gateway: Arc<dyn TableGateway>, base_url: impl Into<String>) -> Self {
        Self {
            gateway,
            base_url: base_url.into(),
        }
    }

    /// Snapshots the active table's staged edits as requests.
    pub fn collect(&self, session: &EditSession) -> Vec<PendingPatch> {
        let Some(table) = session.active_table() else {
            return Vec::new();
        };

        let mut batch = Vec::new();
        for (column, rows) in session.ledger().edits_for_table(table) {
            for (row_key, edit) in rows {
                if same_text(&edit.old_value, &edit.new_value) {
                    tracing::warn!(
                        table,
                        column = %column,
                        row_key = %row_key,
                        "staged edit carries no change, skipping"
                    );
                    continue;
                }
                if edit.primary_key.is_empty() {
                    tracing::warn!(
                        table,
                        column = %column,
                        "staged edit has no primary key, skipping"
                    );
                    continue;
                }
                batch.push(PendingPatch {
                    key: EditKey::new(table, &column, &row_key),
                    request: PatchRequest {
                        base_url: self.base_url.clone(),
                        table: table.to_string(),
                        primary_key: edit.primary_key,
                        column: column.clone(),
                        value: edit.new_value,
                    },
                });
            }
        }
        batch
    }

    /// Starts one task per patch; outcomes arrive on `outcomes` in completion order.
    pub fn dispatch(
        &self,
        batch: Vec<PendingPatch>,
        outcomes: UnboundedSender<SubmissionOutcome>,
    ) -> usize {
        let count = batch.len();
        for patch in batch {
            let gateway = self.gateway.clone();
            let outcomes = outcomes.clone();
            tokio::spawn(async move {
                let outcome = run_patch(gateway, patch).await;
                if outcomes.send(outcome).is_err() {
                    tracing::debug!("submission outcome dropped, receiver closed");
                }
            });
        }
        count
    }
}

async fn run_patch(gateway: Arc<dyn TableGateway>, patch: PendingPatch) -> SubmissionOutcome {
    let PendingPatch { key, request } = patch;
    let submitted = request.value.clone();
    let url = request.url();

    let result = match tokio::task::spawn_blocking(move || gateway.patch_cell(&request)).await {
        Ok(Ok(updated)) => {
            tracing::debug!(url = %url, rows = updated.len(), "patch applied");
            Ok(())
        }
        Ok(Err(err)) => Err(err),
        Err(join_err) => Err(GatewayError::Transport(join_err.to_string())),
    };

    SubmissionOutcome {
        key,
        submitted,
        result,
    }
}

/// Applies one submission result to the session.
pub fn reconcile(session: &mut EditSession, outcome: SubmissionOutcome) -> Reconciliation {
    let SubmissionOutcome {
        key,
        submitted,
        result,
    } = outcome;
    let current = session
        .ledger()
        .get(&key.table, &key.column, &key.row_key)
        .map(|edit| same_text(&edit.new_value, &submitted));

    match result {
        Ok(()) => match current {
            Some(true) => {
                session
                    .ledger_mut()
                    .discard_edit(&key.table, &key.column, &key.row_key, false);
                tracing::info!(
                    table = %key.table,
                    column = %key.column,
                    row_key = %key.row_key,
                    "change saved"
                );
                Reconciliation::Committed
            }
            Some(false) => {
                tracing::debug!(
                    table = %key.table,
                    column = %key.column,
                    row_key = %key.row_key,
                    submitted = %cell_text(&submitted),
                    "cell edited again while saving, keeping newer change"
                );
                session
                    .ledger_mut()
                    .rebase_edit(&key.table, &key.column, &key.row_key, submitted);
                Reconciliation::Superseded
            }
            None => {
                tracing::debug!(table = %key.table, column = %key.column, "saved change no longer staged");
                Reconciliation::Missing
            }
        },
        Err(err) => {
            tracing::warn!(
                table = %key.table,
                column = %key.column,
                row_key = %key.row_key,
                error = %err,
                "database update failed"
            );
            if current == Some(true) {
                session
                    .ledger_mut()
                    .flag_error(&key.table, &key.column, &key.row_key);
            }
            let notice_generation = session.notice_mut().raise(UPDATE_FAILED_MESSAGE);
            Reconciliation::Flagged { notice_generation }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::query::RowQuery;
    use crate::domain::entities::row::{columns_of, PrimaryKey, Row};
    use crate::usecase::ports::gateway::RowPage;
    use serde_json::json;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingGateway {
        requests: Mutex<Vec<PatchRequest>>,
        fail_columns: BTreeSet<String>,
    }

    impl TableGateway for RecordingGateway {
        fn fetch_rows(&self, _query: &RowQuery) -> Result<RowPage, GatewayError> {
            Ok(RowPage::default())
        }

        fn patch_cell(&self, request: &PatchRequest) -> Result<Vec<Row>, GatewayError> {
            self.requests
                .lock()
                .expect("requests lock should not be poisoned")
                .push(request.clone());
            if self.fail_columns.contains(&request.column) {
                return Err(GatewayError::Status {
                    status: 400,
                    message: "bad value".to_string(),
                });
            }
            Ok(Vec::new())
        }
    }

    fn session_with(rows: Vec<Value>) -> EditSession {
        let rows: Vec<Row> = rows
            .into_iter()
            .map(|v| v.as_object().cloned().expect("fixture should be an object"))
            .collect();
        let mut session = EditSession::new();
        session.load_table(
            "accounts",
            RowPage {
                columns: columns_of(&rows),
                rows,
                total_rows: None,
            },
            vec!["id".to_string()],
            BTreeSet::new(),
        );
        session.set_edit_enabled(true).expect("edit mode should enable");
        session
    }

    fn ok_outcome(patch: &PendingPatch) -> SubmissionOutcome {
        SubmissionOutcome {
            key: patch.key.clone(),
            submitted: patch.request.value.clone(),
            result: Ok(()),
        }
    }

    #[test]
    fn collect_is_empty_without_edits() {
        let coordinator =
            SubmissionCoordinator::new(Arc::new(RecordingGateway::default()), "http://db.local");
        let session = session_with(vec![json!({"id": 1, "name": "x"})]);

        assert!(coordinator.collect(&session).is_empty());
        assert!(coordinator.collect(&EditSession::new()).is_empty());
    }

    #[test]
    fn collect_builds_one_patch_per_cell() {
        let coordinator =
            SubmissionCoordinator::new(Arc::new(RecordingGateway::default()), "http://db.local");
        let mut session = session_with(vec![
            json!({"id": 1, "name": "x", "city": "a"}),
            json!({"id": 2, "name": "p", "city": "b"}),
        ]);
        session.commit_cell_input(0, "name", "y").expect("edit should stage");
        session.commit_cell_input(0, "city", "c").expect("edit should stage");
        session.commit_cell_input(1, "name", "q").expect("edit should stage");

        let batch = coordinator.collect(&session);

        assert_eq!(batch.len(), 3);
        let urls: BTreeSet<String> = batch.iter().map(|p| p.request.url()).collect();
        assert!(urls.contains("http://db.local/accounts?and=(id.eq.1)"));
        assert!(urls.contains("http://db.local/accounts?and=(id.eq.2)"));
        assert_eq!(session.ledger().len(), 3, "collect leaves the ledger alone");
    }

    #[test]
    fn success_removes_entry_and_keeps_buffer_value() {
        let coordinator =
            SubmissionCoordinator::new(Arc::new(RecordingGateway::default()), "http://db.local");
        let mut session = session_with(vec![json!({"id": 1, "name": "x"})]);
        session.commit_cell_input(0, "name", "y").expect("edit should stage");
        let batch = coordinator.collect(&session);

        let result = reconcile(&mut session, ok_outcome(&batch[0]));

        assert_eq!(result, Reconciliation::Committed);
        assert!(session.ledger().is_empty());
        assert_eq!(session.buffer().value(0, "name"), Some(&json!("y")));
    }

    #[test]
    fn success_for_stale_value_keeps_newer_edit() {
        let coordinator =
            SubmissionCoordinator::new(Arc::new(RecordingGateway::default()), "http://db.local");
        let mut session = session_with(vec![json!({"id": 1, "name": "x"})]);
        session.commit_cell_input(0, "name", "y").expect("edit should stage");
        let batch = coordinator.collect(&session);
        session.commit_cell_input(0, "name", "z").expect("edit should stage");

        let result = reconcile(&mut session, ok_outcome(&batch[0]));

        assert_eq!(result, Reconciliation::Superseded);
        let edit = session
            .ledger()
            .get("accounts", "name", "1")
            .expect("newer edit should remain staged");
        assert_eq!(edit.new_value, json!("z"));
        assert_eq!(edit.old_value, json!("y"), "old value follows what the backend saved");
    }

    #[test]
    fn revert_while_saving_is_sent_next() {
        let coordinator =
            SubmissionCoordinator::new(Arc::new(RecordingGateway::default()), "http://db.local");
        let mut session = session_with(vec![json!({"id": 1, "name": "x"})]);
        session.commit_cell_input(0, "name", "y").expect("edit should stage");
        let batch = coordinator.collect(&session);
        session.commit_cell_input(0, "name", "x").expect("revert should stage");

        let result = reconcile(&mut session, ok_outcome(&batch[0]));

        assert_eq!(result, Reconciliation::Superseded);
        assert_eq!(session.buffer().value(0, "name"), Some(&json!("x")));
        let next = coordinator.collect(&session);
        assert_eq!(next.len(), 1, "the revert must still reach the backend");
        assert_eq!(next[0].request.value, json!("x"));
        assert_eq!(next[0].request.body(), json!({"name": "x"}));
    }

    #[test]
    fn failure_after_newer_edit_leaves_entry_unflagged() {
        let coordinator =
            SubmissionCoordinator::new(Arc::new(RecordingGateway::default()), "http://db.local");
        let mut session = session_with(vec![json!({"id": 1, "name": "x"})]);
        session.commit_cell_input(0, "name", "y").expect("edit should stage");
        let batch = coordinator.collect(&session);
        session.commit_cell_input(0, "name", "z").expect("edit should stage");

        let result = reconcile(
            &mut session,
            SubmissionOutcome {
                key: batch[0].key.clone(),
                submitted: batch[0].request.value.clone(),
                result: Err(GatewayError::Status {
                    status: 409,
                    message: "conflict".to_string(),
                }),
            },
        );

        assert!(matches!(result, Reconciliation::Flagged { .. }));
        let edit = session
            .ledger()
            .get("accounts", "name", "1")
            .expect("newer edit should remain staged");
        assert!(!edit.error, "the newer value has not been tried yet");
        assert_eq!(edit.new_value, json!("z"));
        assert_eq!(edit.old_value, json!("x"));
        assert!(session.notice().is_visible());
        assert_eq!(session.notice().message(), Some(UPDATE_FAILED_MESSAGE));
    }

    #[test]
    fn collect_skips_edit_without_primary_key() {
        let coordinator =
            SubmissionCoordinator::new(Arc::new(RecordingGateway::default()), "http://db.local");
        let mut session = session_with(vec![json!({"id": 1, "name": "x"})]);
        session.ledger_mut().record_edit(
            "accounts",
            "name",
            "",
            json!("x"),
            json!("y"),
            PrimaryKey::default(),
            None,
        );

        assert!(coordinator.collect(&session).is_empty());
    }

    #[test]
    fn collect_reuses_column_across_rows() {
        let coordinator =
            SubmissionCoordinator::new(Arc::new(RecordingGateway::default()), "http://db.local");
        let mut session = session_with(vec![
            json!({"id": 1, "name": "x"}),
            json!({"id": 2, "name": "p"}),
            json!({"id": 3, "name": "m"}),
        ]);
        for (row_index, value) in [(0, "a"), (1, "b"), (2, "c")] {
            session
                .commit_cell_input(row_index, "name", value)
                .expect("edit should stage");
        }

        let batch = coordinator.collect(&session);

        assert_eq!(batch.len(), 3);
        assert!(batch.iter().all(|patch| patch.request.column == "name"));
        assert!(batch.iter().all(|patch| patch.key.column == "name"));
    }

    #[test]
    fn outcome_for_discarded_edit_is_ignored() {
        let coordinator =
            SubmissionCoordinator::new(Arc::new(RecordingGateway::default()), "http://db.local");
        let mut session = session_with(vec![json!({"id": 1, "name": "x"})]);
        session.commit_cell_input(0, "name", "y").expect("edit should stage");
        let batch = coordinator.collect(&session);
        session.discard_change("name", "1");

        assert_eq!(
            reconcile(&mut session, ok_outcome(&batch[0])),
            Reconciliation::Missing
        );
        assert!(session.ledger().is_empty());
    }

    #[test]
    fn failure_flags_entry_and_raises_notice() {
        let mut session = session_with(vec![json!({"id": 1, "name": "x"})]);
        session.commit_cell_input(0, "name", "y").expect("edit should stage");
        let outcome = SubmissionOutcome {
            key: EditKey::new("accounts", "name", "1"),
            submitted: json!("y"),
            result: Err(GatewayError::Transport("connection refused".to_string())),
        };

        let result = reconcile(&mut session, outcome.clone());
        let again = reconcile(&mut session, outcome);

        assert!(matches!(result, Reconciliation::Flagged { .. }));
        let edit = session
            .ledger()
            .get("accounts", "name", "1")
            .expect("failed edit should stay staged");
        assert!(edit.error);
        assert_eq!(session.buffer().value(0, "name"), Some(&json!("y")));
        assert_eq!(session.notice().message(), Some(UPDATE_FAILED_MESSAGE));

        let (Reconciliation::Flagged { notice_generation: first }, Reconciliation::Flagged { notice_generation: second }) =
            (result, again)
        else {
            panic!("both failures should flag");
        };
        assert!(!session.notice_mut().expire(first), "older timer must not dismiss");
        assert!(session.notice_mut().expire(second));
    }

    #[tokio::test]
    async fn dispatch_reports_every_outcome() {
        let gateway = Arc::new(RecordingGateway {
            requests: Mutex::new(Vec::new()),
            fail_columns: BTreeSet::from(["city".to_string()]),
        });
        let coordinator = SubmissionCoordinator::new(gateway.clone(), "http://db.local");
        let mut session = session_with(vec![json!({"id": 1, "name": "x", "city": "a"})]);
        session.commit_cell_input(0, "name", "y").expect("edit should stage");
        session.commit_cell_input(0, "city", "b").expect("edit should stage");

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sent = coordinator.dispatch(coordinator.collect(&session), tx);
        assert_eq!(sent, 2);

        let mut results = Vec::new();
        while let Some(outcome) = rx.recv().await {
            results.push(reconcile(&mut session, outcome));
        }

        assert_eq!(results.len(), 2);
        assert!(session.ledger().get("accounts", "name", "1").is_none());
        let city = session
            .ledger()
            .get("accounts", "city", "1")
            .expect("failed edit should stay staged");
        assert!(city.error);
        let requests = gateway.requests.lock().expect("requests lock should not be poisoned");
        assert_eq!(requests.len(), 2);
    }
}

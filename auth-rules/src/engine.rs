use crate::{
    error::{AuthzError, Result},
    models::*,
    registry::SchemaRegistry,
    repository::RecordRepository,
    rules::{eval::Evaluation, ListFilter, Predicate},
};
use error_common::ErrorCode;
use logger_redacted::redacted_debug;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Traversal deadline applied when the caller supplies none
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_millis(2000);

/// The single authorization checkpoint
pub struct AccessDecisionPoint {
    /// Current schema and compiled rules
    registry: Arc<SchemaRegistry>,

    /// Storage collaborator for relation hops
    repository: Arc<dyn RecordRepository>,

    /// Deadline for all lookups of one decision
    lookup_timeout: Duration,

    /// Collect traces for batch responses
    debug_mode: bool,
}

struct Outcome {
    decision: Decision,
    trace: Vec<String>,
}

impl AccessDecisionPoint {
    pub fn new(registry: Arc<SchemaRegistry>, repository: Arc<dyn RecordRepository>) -> Self {
        Self {
            registry,
            repository,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
            debug_mode: false,
        }
    }

    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    /// Enable debug mode for detailed decision traces
    pub fn with_debug(mut self, enabled: bool) -> Self {
        self.debug_mode = enabled;
        self
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    // =============================================================================
    // Decisions
    // =============================================================================

    /// Decide whether `identity` may perform `op` on `record` in `collection`.
    ///
    /// Never fails: unknown collections, storage errors and lookup timeouts
    /// all resolve to [`Decision::Deny`].
    pub async fn authorize(
        &self,
        collection: &str,
        op: OperationKind,
        identity: &Identity,
        record: &Record,
    ) -> Decision {
        self.authorize_with_deadline(collection, op, identity, record, self.lookup_timeout)
            .await
    }

    /// [`authorize`](Self::authorize) with a caller-supplied lookup deadline
    pub async fn authorize_with_deadline(
        &self,
        collection: &str,
        op: OperationKind,
        identity: &Identity,
        record: &Record,
        deadline: Duration,
    ) -> Decision {
        self.decide(collection, op, identity, record, deadline)
            .await
            .decision
    }

    /// Decide many requests; traces are attached in debug mode
    pub async fn batch_authorize(&self, requests: Vec<AccessRequest>) -> Vec<AccessResponse> {
        let mut responses = Vec::with_capacity(requests.len());

        for request in requests {
            let outcome = self
                .decide(
                    &request.collection,
                    request.operation,
                    &request.identity,
                    &request.record,
                    self.lookup_timeout,
                )
                .await;

            responses.push(AccessResponse {
                decision: outcome.decision,
                debug_trace: if self.debug_mode {
                    Some(outcome.trace)
                } else {
                    None
                },
            });
        }

        responses
    }

    async fn decide(
        &self,
        collection: &str,
        op: OperationKind,
        identity: &Identity,
        record: &Record,
        deadline: Duration,
    ) -> Outcome {
        let mut trace = Vec::new();
        // pinned for the whole decision
        let snapshot = self.registry.snapshot();

        let def = match snapshot.get_collection(collection) {
            Ok(def) => def,
            Err(e) => {
                warn!(error_code = e.code(), %identity, operation = %op, "Denied: {}", e);
                trace.push(e.to_string());
                return Outcome {
                    decision: Decision::Deny,
                    trace,
                };
            }
        };

        let predicate = match snapshot.get_rule(&def.name, op) {
            Ok(Some(predicate)) => predicate,
            Ok(None) => {
                let decision = def.default_policy.decision();
                debug!(collection = %def.name, operation = %op, %decision, "Rule unset, applying default policy");
                trace.push(format!("{} rule unset, policy {:?}", op.rule_key(), def.default_policy));
                return Outcome { decision, trace };
            }
            Err(e) => {
                warn!(error_code = e.code(), "Denied: {}", e);
                trace.push(e.to_string());
                return Outcome {
                    decision: Decision::Deny,
                    trace,
                };
            }
        };

        if tracing::enabled!(tracing::Level::DEBUG) {
            let payload = serde_json::to_string(record).unwrap_or_default();
            redacted_debug!(
                &payload,
                "Evaluating {}.{} for {}: {}",
                def.name,
                op.rule_key(),
                identity,
                predicate
            );
        }
        trace.push(format!("{}.{}: {}", def.name, op.rule_key(), predicate));

        let mut evaluation = Evaluation::new(self.repository.as_ref(), identity, record);
        let result = tokio::time::timeout(deadline, evaluation.evaluate(predicate.expr())).await;
        let lookups = evaluation.lookups();

        let decision = match result {
            Ok(Ok(allowed)) => Decision::from(allowed),
            Ok(Err(e)) => {
                warn!(error_code = e.code(), collection = %def.name, operation = %op, "Evaluation failed, denying: {}", e);
                trace.push(format!("evaluation failed: {e}"));
                Decision::Deny
            }
            Err(_) => {
                let e = AuthzError::LookupTimeout(deadline);
                warn!(error_code = e.code(), collection = %def.name, operation = %op, lookups, "Denied: {}", e);
                trace.push(e.to_string());
                Decision::Deny
            }
        };

        debug!(collection = %def.name, operation = %op, %identity, %decision, lookups, "Decision");
        trace.push(format!("{decision} after {lookups} lookup(s)"));
        Outcome { decision, trace }
    }

    // =============================================================================
    // Rules and Listing
    // =============================================================================

    /// Compile rule text against the current schema without registering it
    ///
    /// # Errors
    ///
    /// Parse errors, unknown collections and unresolvable field paths.
    pub fn compile_rule(&self, collection: &str, op: OperationKind, text: &str) -> Result<Predicate> {
        self.registry.compile_rule(collection, op, text)
    }

    /// The list rule of `collection` specialised to `identity`
    ///
    /// Unknown collections yield [`ListFilter::DenyAll`].
    pub fn list_filter(&self, collection: &str, identity: &Identity) -> ListFilter {
        let snapshot = self.registry.snapshot();
        let Ok(def) = snapshot.get_collection(collection) else {
            return ListFilter::DenyAll;
        };
        match snapshot.get_rule(&def.name, OperationKind::List) {
            Ok(predicate) => {
                ListFilter::for_identity(predicate.as_deref(), def.default_policy, identity)
            }
            Err(_) => ListFilter::DenyAll,
        }
    }

    /// Keep the records `identity` may list, checking each one in turn
    pub async fn filter_viewable(
        &self,
        collection: &str,
        identity: &Identity,
        records: Vec<Record>,
    ) -> Vec<Record> {
        if self.list_filter(collection, identity).is_deny_all() {
            return Vec::new();
        }
        let mut viewable = Vec::with_capacity(records.len());
        for record in records {
            if self
                .authorize(collection, OperationKind::List, identity, &record)
                .await
                .is_allowed()
            {
                viewable.push(record);
            }
        }
        viewable
    }
}

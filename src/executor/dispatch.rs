//! Per-operation dispatch (§4.6 "Per-operation flow", §4.6.1 "CREATE handling")

use super::handlers::{created_resource_keys, natural_key_for_row, HandlerOutcome};
use crate::collaborators::{ClientError, IpamClient, ResolverCache};
use crate::config::EngineConfig;
use crate::model::{Operation, OperationResult, OperationType, Payload};
use crate::resolver::{resolve_deferred, CreatedResourceMaps};
use crate::throttle::AdaptiveThrottle;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

/// Outcome of dispatching one operation: the [`OperationResult`] to surface
/// to the caller plus the resolved `resource_id`, if any, so the main loop
/// can write it back onto the graph node after the batch joins.
pub struct DispatchOutcome {
    pub result: OperationResult,
    pub resource_id: Option<i64>,
}

/// Deterministic synthetic id for dry-run CREATEs (§4.6 "Dry-run mode"):
/// `|hash(row_id)| mod 1_000_000`, excluding 0 so a synthetic id is never
/// mistaken for "absent".
fn synthetic_id(operation: &Operation) -> i64 {
    let mut hasher = DefaultHasher::new();
    operation.node_id().hash(&mut hasher);
    let h = (hasher.finish() % 1_000_000) as i64;
    if h == 0 {
        1
    } else {
        h
    }
}

/// Dispatch one operation against `client`, honoring deferred resolution,
/// the throttle, dry-run short-circuiting, and the one-shot rate-limit
/// retry (§4.6 steps 3-8). Does not touch the graph; the caller applies
/// `result`/`resource_id` after the whole batch joins.
#[allow(clippy::too_many_arguments)]
pub async fn dispatch_operation(
    operation: Operation,
    client: Arc<dyn IpamClient>,
    throttle: Arc<AdaptiveThrottle>,
    created: Arc<RwLock<CreatedResourceMaps>>,
    resolver_cache: Option<Arc<dyn ResolverCache>>,
    config: &EngineConfig,
    dry_run: bool,
) -> DispatchOutcome {
    dispatch_with_retry(operation, client, throttle, created, resolver_cache, config, dry_run, false).await
}

#[allow(clippy::too_many_arguments)]
async fn dispatch_with_retry(
    operation: Operation,
    client: Arc<dyn IpamClient>,
    throttle: Arc<AdaptiveThrottle>,
    created: Arc<RwLock<CreatedResourceMaps>>,
    resolver_cache: Option<Arc<dyn ResolverCache>>,
    config: &EngineConfig,
    dry_run: bool,
    is_retry: bool,
) -> DispatchOutcome {
    let node_id = operation.node_id();

    // Step 3: deep-copy the payload (the original stays untouched for
    // retry-idempotence) and resolve deferred markers.
    let mut working_payload: Payload = operation.payload.clone();
    {
        let maps = created.read().await;
        if let Err(err) = resolve_deferred(&operation, &mut working_payload, &maps) {
            return DispatchOutcome {
                result: OperationResult {
                    node_id,
                    success: false,
                    resource_id: None,
                    error_message: Some(err.to_string()),
                    latency_ms: 0,
                    metadata: Default::default(),
                },
                resource_id: None,
            };
        }
    }

    // Step 4: acquire a throttle slot.
    let _slot = throttle.acquire().await;
    let started = Instant::now();

    let dispatch_result = dispatch_by_type(&operation, &client, &working_payload, config, dry_run).await;
    let latency_ms = started.elapsed().as_millis() as u64;

    match dispatch_result {
        Ok(outcome) => {
            throttle.record_success(latency_ms);
            let resource_id = match outcome {
                HandlerOutcome::Created { id } => Some(id),
                HandlerOutcome::Updated | HandlerOutcome::Deleted => operation.resource_id,
            };

            if matches!(operation.operation_type, OperationType::Create) {
                if let Some(id) = resource_id {
                    let mut maps = created.write().await;
                    for (resource_type, key) in created_resource_keys(&operation.csv_row) {
                        maps.record(resource_type, &key, id);
                    }
                }
            }

            if let Some(cache) = &resolver_cache {
                if let Some(path) = working_payload.get("resource_path").and_then(|v| v.as_str()) {
                    cache.invalidate(path, operation.object_type);
                    if let Some(parent) = crate::collaborators::parent_path(path) {
                        cache.invalidate(parent, operation.object_type);
                    }
                }
            }

            let mut metadata = std::collections::HashMap::new();
            if matches!(outcome, HandlerOutcome::Created { .. }) && dry_run {
                metadata.insert("dry_run".to_string(), serde_json::Value::Bool(true));
            }

            DispatchOutcome {
                result: OperationResult {
                    node_id,
                    success: true,
                    resource_id,
                    error_message: None,
                    latency_ms,
                    metadata,
                },
                resource_id,
            }
        }
        Err(ClientError::AlreadyExists(msg)) => {
            // §4.6.1: look the existing resource up by natural key; success
            // with `already_exists=true` if found, else re-raise as failure.
            match natural_key_for_row(&operation.csv_row) {
                Some(key) => match client.find_by_natural_key(operation.object_type, &key).await {
                    Ok(Some(id)) => {
                        throttle.record_success(latency_ms);
                        let mut metadata = std::collections::HashMap::new();
                        metadata.insert("already_exists".to_string(), serde_json::Value::Bool(true));
                        DispatchOutcome {
                            result: OperationResult {
                                node_id,
                                success: true,
                                resource_id: Some(id),
                                error_message: None,
                                latency_ms,
                                metadata,
                            },
                            resource_id: Some(id),
                        }
                    }
                    _ => {
                        throttle.record_failure(false);
                        DispatchOutcome {
                            result: failure_result(node_id, latency_ms, format!("already exists: {msg}")),
                            resource_id: None,
                        }
                    }
                },
                None => {
                    throttle.record_failure(false);
                    DispatchOutcome {
                        result: failure_result(node_id, latency_ms, format!("already exists: {msg}")),
                        resource_id: None,
                    }
                }
            }
        }
        Err(ClientError::RateLimit { retry_after_secs }) if !is_retry => {
            // Step 6: one bounded sleep-and-retry, recursion depth <= 1.
            throttle.record_failure(true);
            throttle.wait_retry_after(retry_after_secs).await;
            Box::pin(dispatch_with_retry(
                operation,
                client,
                throttle,
                created,
                resolver_cache,
                config,
                dry_run,
                true,
            ))
            .await
        }
        Err(err) => {
            throttle.record_failure(matches!(err, ClientError::RateLimit { .. }));
            DispatchOutcome {
                result: failure_result(node_id, latency_ms, err.to_string()),
                resource_id: None,
            }
        }
    }
}

async fn dispatch_by_type(
    operation: &Operation,
    client: &Arc<dyn IpamClient>,
    working_payload: &Payload,
    config: &EngineConfig,
    dry_run: bool,
) -> Result<HandlerOutcome, ClientError> {
    match operation.operation_type {
        // NOOP never calls the client. ORPHAN likewise: per the diff engine's
        // detect/act split, an ORPHAN is surfaced information, not a delete
        // order the executor carries out on its own (the external operation
        // factory decides whether to synthesize a DELETE row for it).
        OperationType::Noop | OperationType::Orphan => Ok(HandlerOutcome::Updated),
        OperationType::Create => {
            if dry_run {
                return Ok(HandlerOutcome::Created { id: synthetic_id(operation) });
            }
            client
                .create(operation.object_type, working_payload)
                .await
                .map(|id| HandlerOutcome::Created { id })
        }
        OperationType::Update => {
            if dry_run {
                return Ok(HandlerOutcome::Updated);
            }
            let Some(id) = operation.resource_id else {
                return Err(ClientError::Server(format!(
                    "UPDATE dispatched for {} with no resolved resource_id",
                    operation.node_id()
                )));
            };
            client.update(id, operation.object_type, working_payload).await.map(|_| HandlerOutcome::Updated)
        }
        OperationType::Delete => {
            if dry_run {
                return Ok(HandlerOutcome::Deleted);
            }
            let Some(id) = operation.resource_id else {
                return Err(ClientError::Server(format!(
                    "DELETE dispatched for {} with no resolved resource_id",
                    operation.node_id()
                )));
            };
            // `safe_mode` already downgrades DELETE to NOOP at diff time; this
            // flag is the handler-facing echo of that same policy, not a
            // second independent gate.
            client
                .delete(id, operation.object_type, !config.safe_mode)
                .await
                .map(|_| HandlerOutcome::Deleted)
        }
    }
}

fn failure_result(node_id: String, latency_ms: u64, error_message: String) -> OperationResult {
    OperationResult {
        node_id,
        success: false,
        resource_id: None,
        error_message: Some(error_message),
        latency_ms,
        metadata: Default::default(),
    }
}

/// §4.6 step 2: a pre-existing `payload.error` set by the (external)
/// operation factory short-circuits before any dispatch is attempted.
pub fn preexisting_error_result(operation: &Operation) -> OperationResult {
    let mut metadata = std::collections::HashMap::new();
    if let Some(traceback) = operation.preexisting_traceback() {
        metadata.insert("traceback".to_string(), serde_json::Value::String(traceback));
    }
    OperationResult {
        node_id: operation.node_id(),
        success: false,
        resource_id: None,
        error_message: operation.preexisting_error(),
        latency_ms: 0,
        metadata,
    }
}

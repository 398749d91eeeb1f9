//! In-flight request tracking and endpoint selection.
//!
//! The pending map is touched by two racing paths: dispatch inserts, and
//! completion (response arrival, endpoint loss, shutdown) removes. Removal
//! always happens before the oneshot fires, so a given id resolves exactly
//! once; a late response for an already-resolved id is a logged no-op.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use tg_protocol::{JsonRpcResponse, RequestId, CODE_INTERNAL_ERROR, CODE_SERVICE_UNAVAILABLE};

struct PendingCall {
    endpoint: String,
    method: String,
    started_at: Instant,
    tx: oneshot::Sender<JsonRpcResponse>,
}

pub struct MessageRouter {
    /// request id → waiter + the endpoint the request went out on.
    pending: Mutex<HashMap<RequestId, PendingCall>>,
    /// Round-robin cursor over the stable endpoint order.
    cursor: AtomicUsize,
    next_id: AtomicU64,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            cursor: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate a fresh numeric request id.
    pub fn next_request_id(&self) -> RequestId {
        RequestId::Num(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Track an outbound request; the receiver completes when the matching
    /// response arrives (or the call is rejected or abandoned).
    pub fn register(
        &self,
        id: RequestId,
        endpoint: impl Into<String>,
        method: impl Into<String>,
    ) -> oneshot::Receiver<JsonRpcResponse> {
        let (tx, rx) = oneshot::channel();
        let prev = self.pending.lock().insert(
            id,
            PendingCall {
                endpoint: endpoint.into(),
                method: method.into(),
                started_at: Instant::now(),
                tx,
            },
        );
        debug_assert!(prev.is_none(), "request id reused while in flight");
        rx
    }

    /// Drop tracking for an id that never made it onto the wire.
    pub fn forget(&self, id: &RequestId) {
        self.pending.lock().remove(id);
    }

    /// Complete the pending call matching this response. Returns false when
    /// no call is waiting (late or unsolicited response).
    pub fn resolve(&self, response: JsonRpcResponse) -> bool {
        let entry = self.pending.lock().remove(&response.id);
        match entry {
            Some(call) => {
                tracing::debug!(
                    id = %response.id,
                    method = %call.method,
                    elapsed_ms = call.started_at.elapsed().as_millis() as u64,
                    "request resolved"
                );
                let _ = call.tx.send(response);
                true
            }
            None => {
                tracing::debug!(id = %response.id, "response for unknown or already-resolved request");
                false
            }
        }
    }

    /// Reject every pending call that went out on `endpoint`. Returns the
    /// number rejected.
    pub fn reject_for_endpoint(&self, endpoint: &str) -> usize {
        let drained: Vec<(RequestId, PendingCall)> = {
            let mut pending = self.pending.lock();
            let ids: Vec<RequestId> = pending
                .iter()
                .filter(|(_, call)| call.endpoint == endpoint)
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| pending.remove(&id).map(|call| (id, call)))
                .collect()
        };

        let count = drained.len();
        for (id, call) in drained {
            tracing::debug!(
                id = %id,
                method = %call.method,
                elapsed_ms = call.started_at.elapsed().as_millis() as u64,
                "rejecting in-flight call"
            );
            let _ = call.tx.send(JsonRpcResponse::err(
                id,
                CODE_SERVICE_UNAVAILABLE,
                format!("endpoint {endpoint} disconnected"),
            ));
        }
        if count > 0 {
            tracing::warn!(endpoint, rejected = count, "rejected in-flight calls for lost endpoint");
        }
        count
    }

    /// Reject every pending call; used at shutdown so nothing dangles.
    pub fn reject_all(&self, reason: &str) -> usize {
        let drained: Vec<(RequestId, PendingCall)> =
            self.pending.lock().drain().collect();
        let count = drained.len();
        for (id, call) in drained {
            let _ = call
                .tx
                .send(JsonRpcResponse::err(id, CODE_INTERNAL_ERROR, reason));
        }
        count
    }

    /// Round-robin over `candidates` (stable order, connected flag),
    /// skipping endpoints that are not currently connected. Connectivity is
    /// re-evaluated on every dispatch.
    pub fn pick(&self, candidates: &[(String, bool)]) -> Option<String> {
        if candidates.is_empty() {
            return None;
        }
        let start = self.cursor.fetch_add(1, Ordering::SeqCst);
        for offset in 0..candidates.len() {
            let (endpoint, connected) = &candidates[(start + offset) % candidates.len()];
            if *connected {
                return Some(endpoint.clone());
            }
        }
        None
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

impl Default for MessageRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoints(flags: &[(&str, bool)]) -> Vec<(String, bool)> {
        flags.iter().map(|(e, c)| (e.to_string(), *c)).collect()
    }

    #[test]
    fn round_robin_distributes_evenly() {
        let router = MessageRouter::new();
        let candidates = endpoints(&[("a", true), ("b", true), ("c", true)]);

        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..6 {
            let picked = router.pick(&candidates).unwrap();
            *counts.entry(picked).or_default() += 1;
        }
        assert_eq!(counts["a"], 2);
        assert_eq!(counts["b"], 2);
        assert_eq!(counts["c"], 2);
    }

    #[test]
    fn round_robin_skips_disconnected() {
        let router = MessageRouter::new();
        let candidates = endpoints(&[("a", true), ("b", false), ("c", true)]);

        for _ in 0..10 {
            let picked = router.pick(&candidates).unwrap();
            assert_ne!(picked, "b");
        }
    }

    #[test]
    fn round_robin_none_when_all_down() {
        let router = MessageRouter::new();
        let candidates = endpoints(&[("a", false), ("b", false)]);
        assert!(router.pick(&candidates).is_none());
        assert!(router.pick(&[]).is_none());
    }

    #[tokio::test]
    async fn resolve_completes_waiter_exactly_once() {
        let router = MessageRouter::new();
        let id = router.next_request_id();
        let rx = router.register(id.clone(), "a", "tools/list");

        assert!(router.resolve(JsonRpcResponse::ok(id.clone(), serde_json::json!({"v": 1}))));
        let resp = rx.await.unwrap();
        assert_eq!(resp.into_result().unwrap(), serde_json::json!({"v": 1}));

        // The late duplicate must be a no-op.
        assert!(!router.resolve(JsonRpcResponse::ok(id, serde_json::json!({"v": 2}))));
        assert_eq!(router.pending_count(), 0);
    }

    #[tokio::test]
    async fn reject_for_endpoint_drains_only_that_endpoint() {
        let router = MessageRouter::new();
        let id_a = router.next_request_id();
        let id_b = router.next_request_id();
        let rx_a = router.register(id_a, "a", "tools/list");
        let _rx_b = router.register(id_b, "b", "tools/list");

        assert_eq!(router.reject_for_endpoint("a"), 1);
        assert_eq!(router.pending_count(), 1);

        let resp = rx_a.await.unwrap();
        assert!(resp.is_error());
    }

    #[tokio::test]
    async fn reject_all_leaves_nothing_dangling() {
        let router = MessageRouter::new();
        let mut receivers = Vec::new();
        for _ in 0..3 {
            let id = router.next_request_id();
            receivers.push(router.register(id, "a", "tools/list"));
        }

        assert_eq!(router.reject_all("gateway shutting down"), 3);
        assert_eq!(router.pending_count(), 0);
        for rx in receivers {
            let resp = rx.await.unwrap();
            assert!(resp.is_error());
        }
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Request/response correlation over the background channel.
//!
//! Each request gets a fresh correlation id and a pending entry holding its
//! resolver and optional hooks. Responses may arrive in any order; they are
//! matched purely by id. An entry leaves the table exactly once, when its
//! final response (or a failing hook) settles it.

use crate::error::{BrokerError, Result};
use crate::protocol::{Action, CorrelationId, Envelope, Progress, Subsystem};
use async_stream::stream;
use futures::stream::BoxStream;
use futures::StreamExt;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};

type TransformHook = Box<dyn FnOnce(Value) -> Result<Value> + Send>;
type ItemHook = Box<dyn FnMut(Value) -> Result<()> + Send>;
type ProgressHook = Box<dyn FnMut(Progress) + Send>;

/// Optional callbacks attached to one request
#[derive(Default)]
pub struct RequestHooks {
    transform: Option<TransformHook>,
    on_item: Option<ItemHook>,
    on_progress: Option<ProgressHook>,
}

impl RequestHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called for every progress message
    pub fn on_progress(mut self, hook: impl FnMut(Progress) + Send + 'static) -> Self {
        self.on_progress = Some(Box::new(hook));
        self
    }

    /// Applied once to the final result before the request settles
    pub fn transform(mut self, hook: impl FnOnce(Value) -> Result<Value> + Send + 'static) -> Self {
        self.transform = Some(Box::new(hook));
        self
    }

    /// Called for every stream item, in arrival order
    pub fn on_item(mut self, hook: impl FnMut(Value) -> Result<()> + Send + 'static) -> Self {
        self.on_item = Some(Box::new(hook));
        self
    }

    /// Stream items are rebuilt by `reconstruct` before reaching `hook`
    pub fn on_reconstructed_item<T>(
        self,
        reconstruct: impl Fn(Value) -> Result<T> + Send + 'static,
        mut hook: impl FnMut(T) + Send + 'static,
    ) -> Self {
        self.on_item(move |value| {
            hook(reconstruct(value)?);
            Ok(())
        })
    }
}

struct PendingRequest {
    action: Action,
    resolver: oneshot::Sender<Result<Value>>,
    hooks: RequestHooks,
}

impl PendingRequest {
    fn settle(self, outcome: Result<Value>) {
        if self.resolver.send(outcome).is_err() {
            tracing::trace!(action = ?self.action, "Requester no longer waiting");
        }
    }
}

/// Settles with the final result of one request.
///
/// Dropping it does not cancel the request; the response is discarded.
pub struct ResponseFuture {
    correlation_id: CorrelationId,
    receiver: oneshot::Receiver<Result<Value>>,
}

impl ResponseFuture {
    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }
}

impl Future for ResponseFuture {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver).poll(cx).map(|settled| match settled {
            Ok(outcome) => outcome,
            Err(_) => Err(BrokerError::Disconnected),
        })
    }
}

/// Drops the table entry of a request that never reached the channel,
/// including when the posting future is cancelled while waiting for room
struct Registration<'a> {
    broker: &'a RequestBroker,
    correlation_id: CorrelationId,
    posted: bool,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        if !self.posted {
            self.broker.table().remove(&self.correlation_id);
            tracing::trace!(correlation_id = self.correlation_id, "Request withdrawn before posting");
        }
    }
}

pub struct RequestBroker {
    next_id: AtomicU64,
    pending: Mutex<FxHashMap<CorrelationId, PendingRequest>>,
    outgoing: mpsc::Sender<Envelope>,
}

impl RequestBroker {
    pub fn new(outgoing: mpsc::Sender<Envelope>) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(FxHashMap::default()),
            outgoing,
        }
    }

    fn table(&self) -> std::sync::MutexGuard<'_, FxHashMap<CorrelationId, PendingRequest>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a request and post it. The returned future settles once.
    pub async fn send(
        &self,
        target: Subsystem,
        action: Action,
        args: Value,
        hooks: RequestHooks,
    ) -> Result<ResponseFuture> {
        let correlation_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (resolver, receiver) = oneshot::channel();
        self.table().insert(
            correlation_id,
            PendingRequest {
                action,
                resolver,
                hooks,
            },
        );

        let mut registration = Registration {
            broker: self,
            correlation_id,
            posted: false,
        };

        tracing::trace!(correlation_id, ?target, ?action, "Posting request");
        let envelope = Envelope::request(target, action, correlation_id, args);
        if self.outgoing.send(envelope).await.is_err() {
            return Err(BrokerError::Disconnected);
        }
        registration.posted = true;

        Ok(ResponseFuture {
            correlation_id,
            receiver,
        })
    }

    /// Post a request and wait for its final result
    pub async fn request(
        &self,
        target: Subsystem,
        action: Action,
        args: Value,
        hooks: RequestHooks,
    ) -> Result<Value> {
        self.send(target, action, args, hooks).await?.await
    }

    /// Post a streaming request. Items are rebuilt with `reconstruct` and
    /// yielded in arrival order; a failed request ends the stream with its
    /// error. Dropping the stream stops delivery but not the request.
    pub fn request_stream<T: Send + 'static>(
        self: &Arc<Self>,
        target: Subsystem,
        action: Action,
        args: Value,
        reconstruct: impl Fn(Value) -> Result<T> + Send + 'static,
    ) -> BoxStream<'static, Result<T>> {
        let broker = Arc::clone(self);
        stream! {
            let (items_tx, mut items_rx) = mpsc::unbounded_channel();
            let hooks = RequestHooks::new().on_item(move |value| {
                let item = reconstruct(value)?;
                let _ = items_tx.send(item);
                Ok(())
            });

            match broker.send(target, action, args, hooks).await {
                Ok(response) => {
                    // The item sender lives in the pending entry, so this
                    // loop ends when the request settles.
                    while let Some(item) = items_rx.recv().await {
                        yield Ok(item);
                    }
                    if let Err(e) = response.await {
                        yield Err(e);
                    }
                }
                Err(e) => yield Err(e),
            }
        }
        .boxed()
    }

    /// Route one response to its pending request
    pub fn handle_response(&self, envelope: Envelope) {
        let correlation_id = envelope.correlation_id;
        let Some(mut pending) = self.table().remove(&correlation_id) else {
            tracing::warn!(correlation_id, action = ?envelope.action, "Response for unknown request");
            return;
        };

        // Hooks run outside the lock; the entry goes back unless settled.
        if envelope.is_progress {
            match envelope.result.map(serde_json::from_value::<Progress>) {
                Some(Ok(progress)) => {
                    if let Some(hook) = pending.hooks.on_progress.as_mut() {
                        hook(progress);
                    }
                }
                Some(Err(e)) => tracing::warn!(correlation_id, error = %e, "Malformed progress message"),
                None => {}
            }
            self.table().insert(correlation_id, pending);
            return;
        }

        if let Some(error) = envelope.error {
            tracing::debug!(correlation_id, %error, "Request failed remotely");
            pending.settle(Err(BrokerError::Remote(error)));
            return;
        }

        let result = envelope.result.unwrap_or(Value::Null);
        if envelope.is_stream_item {
            if let Some(hook) = pending.hooks.on_item.as_mut() {
                if let Err(e) = hook(result) {
                    pending.settle(Err(e));
                    return;
                }
            }
            self.table().insert(correlation_id, pending);
            return;
        }

        let outcome = match pending.hooks.transform.take() {
            Some(transform) => transform(result),
            None => Ok(result),
        };
        pending.settle(outcome);
    }

    /// Reject every outstanding request; used when the channel closes
    pub fn reject_all(&self) {
        let drained: Vec<PendingRequest> = self.table().drain().map(|(_, pending)| pending).collect();
        if !drained.is_empty() {
            tracing::warn!(requests = drained.len(), "Rejecting outstanding requests");
        }
        for pending in drained {
            pending.settle(Err(BrokerError::Disconnected));
        }
    }

    pub fn pending_count(&self) -> usize {
        self.table().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn broker() -> (Arc<RequestBroker>, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(64);
        (Arc::new(RequestBroker::new(tx)), rx)
    }

    #[tokio::test]
    async fn test_ids_increase_and_are_posted() {
        let (broker, mut outgoing) = broker();
        let a = broker
            .send(Subsystem::Models, Action::CloseModel, json!({"modelId": 0}), RequestHooks::new())
            .await
            .unwrap();
        let b = broker
            .send(Subsystem::Models, Action::CloseModel, json!({"modelId": 1}), RequestHooks::new())
            .await
            .unwrap();
        assert!(b.correlation_id() > a.correlation_id());
        assert_eq!(outgoing.recv().await.unwrap().correlation_id, a.correlation_id());
        assert_eq!(broker.pending_count(), 2);
    }

    #[tokio::test]
    async fn test_unknown_response_is_ignored() {
        let (broker, _outgoing) = broker();
        let stray = Envelope::request(Subsystem::State, Action::Dispose, 42, Value::Null).respond(json!(true));
        broker.handle_response(stray);
        assert_eq!(broker.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_remote_error_rejects() {
        let (broker, mut outgoing) = broker();
        let response = broker
            .send(Subsystem::Geometry, Action::GetItemGeometry, Value::Null, RequestHooks::new())
            .await
            .unwrap();
        let request = outgoing.recv().await.unwrap();
        broker.handle_response(request.fail("no such model"));
        match response.await {
            Err(BrokerError::Remote(message)) => assert_eq!(message, "no such model"),
            other => panic!("unexpected outcome: {:?}", other.map(|_| ())),
        }
        assert_eq!(broker.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_transform_hook_shapes_result() {
        let (broker, mut outgoing) = broker();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let hooks = RequestHooks::new().transform(move |value| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"wrapped": value}))
        });
        let response = broker.send(Subsystem::Geometry, Action::LoadModel, Value::Null, hooks).await.unwrap();
        let request = outgoing.recv().await.unwrap();
        broker.handle_response(request.respond(json!(3)));
        assert_eq!(response.await.unwrap(), json!({"wrapped": 3}));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transform_error_rejects_and_clears() {
        let (broker, mut outgoing) = broker();
        let hooks = RequestHooks::new().transform(|_| Err(BrokerError::Hook("payload missing".into())));
        let response = broker.send(Subsystem::Geometry, Action::LoadModel, Value::Null, hooks).await.unwrap();
        let request = outgoing.recv().await.unwrap();

        broker.handle_response(request.respond(json!({"transfer": "whole_model"})));
        assert_eq!(broker.pending_count(), 0);
        match response.await {
            Err(BrokerError::Hook(message)) => assert_eq!(message, "payload missing"),
            other => panic!("unexpected outcome: {:?}", other.map(|_| ())),
        }

        // A late duplicate finds nothing to settle
        broker.handle_response(request.respond(json!(null)));
        assert_eq!(broker.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_send_leaves_no_entry() {
        let (tx, mut rx) = mpsc::channel(1);
        let broker = RequestBroker::new(tx);
        let first = broker
            .send(Subsystem::State, Action::UpdateFilter, Value::Null, RequestHooks::new())
            .await
            .unwrap();

        // The channel is full, so the second send waits until it is dropped
        let blocked = tokio::time::timeout(
            std::time::Duration::from_millis(10),
            broker.send(Subsystem::State, Action::Dispose, Value::Null, RequestHooks::new()),
        )
        .await;
        assert!(blocked.is_err());
        assert_eq!(broker.pending_count(), 1);

        let request = rx.recv().await.unwrap();
        assert_eq!(request.correlation_id, first.correlation_id());
        broker.handle_response(request.respond(json!(true)));
        assert_eq!(first.await.unwrap(), json!(true));
        assert_eq!(broker.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_reject_all_on_disconnect() {
        let (broker, _outgoing) = broker();
        let response = broker
            .send(Subsystem::State, Action::Dispose, Value::Null, RequestHooks::new())
            .await
            .unwrap();
        broker.reject_all();
        assert!(matches!(response.await, Err(BrokerError::Disconnected)));
    }

    #[tokio::test]
    async fn test_closed_channel_fails_send() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let broker = RequestBroker::new(tx);
        let sent = broker
            .send(Subsystem::State, Action::Dispose, Value::Null, RequestHooks::new())
            .await;
        assert!(matches!(sent, Err(BrokerError::Disconnected)));
        assert_eq!(broker.pending_count(), 0);
    }
}

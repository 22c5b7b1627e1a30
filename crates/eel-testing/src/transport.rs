//! Scripted transport standing in for the downstream endpoint.

use std::collections::VecDeque;

use async_trait::async_trait;
use eel_core::Context;
use eel_delivery::{DeliveryError, Exchange, OutboundRequest, Transport};
use parking_lot::Mutex;

/// Replays queued exchanges in order, then repeats the last one.
///
/// Every request is recorded together with the correlation id of the
/// context it was sent under.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Exchange>>,
    last: Mutex<Option<Exchange>>,
    sent: Mutex<Vec<(String, OutboundRequest)>>,
}

impl ScriptedTransport {
    /// Transport answering with `statuses` in order.
    pub fn statuses(statuses: &[u16]) -> Self {
        let transport = Self::default();
        transport.script.lock().extend(statuses.iter().map(|&status| Exchange::response(status, "")));
        transport
    }

    /// Transport that always fails with `error`.
    pub fn failing(error: DeliveryError) -> Self {
        let transport = Self::default();
        transport.push(Exchange::failed(error));
        transport
    }

    /// Appends an exchange to the script.
    pub fn push(&self, exchange: Exchange) {
        self.script.lock().push_back(exchange);
    }

    /// Number of sends performed.
    pub fn calls(&self) -> usize {
        self.sent.lock().len()
    }

    /// Requests sent so far with the correlation id of each.
    pub fn sent(&self) -> Vec<(String, OutboundRequest)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, ctx: &Context, request: &OutboundRequest) -> Exchange {
        self.sent.lock().push((ctx.id(), request.clone()));

        let next = self.script.lock().pop_front();
        let mut last = self.last.lock();
        if let Some(exchange) = next {
            *last = Some(exchange);
        }
        last.clone().unwrap_or_else(|| Exchange::response(200, ""))
    }
}

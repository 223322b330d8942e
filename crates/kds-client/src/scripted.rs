//! Deterministic in-memory transport.
//!
//! Plays back a queue of canned attempt results in order and records every
//! outbound request. Tests across the workspace drive the real client
//! through it.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use serde_json::Value;

use crate::transport::{HttpTransport, OutboundRequest, RawResponse, TransportError};

#[derive(Debug, Clone)]
enum Step {
    Respond(RawResponse),
    Fail(TransportError),
    /// Never completes; exercised by timeout and cancellation paths.
    Hang,
}

#[derive(Debug, Default)]
pub struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    seen: Mutex<Vec<OutboundRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_json(&self, status: u16, body: Value) -> &Self {
        self.push(Step::Respond(RawResponse::json(status, &body)))
    }

    pub fn push_raw(&self, resp: RawResponse) -> &Self {
        self.push(Step::Respond(resp))
    }

    pub fn push_error(&self, err: TransportError) -> &Self {
        self.push(Step::Fail(err))
    }

    pub fn push_hang(&self) -> &Self {
        self.push(Step::Hang)
    }

    /// Requests received so far, in arrival order.
    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn remaining(&self) -> usize {
        self.steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn push(&self, step: Step) -> &Self {
        self.steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(step);
        self
    }
}

impl RawResponse {
    pub fn json(status: u16, body: &Value) -> Self {
        Self {
            status,
            reason: String::new(),
            body: body.to_string().into_bytes(),
        }
    }
}

#[async_trait::async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, req: OutboundRequest) -> Result<RawResponse, TransportError> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(req);
        let next = self
            .steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match next {
            Some(Step::Respond(r)) => Ok(r),
            Some(Step::Fail(e)) => Err(e),
            Some(Step::Hang) => std::future::pending().await,
            None => Err(TransportError::Network("script exhausted".to_string())),
        }
    }
}

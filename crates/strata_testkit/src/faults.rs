//! Fault injection.
//!
//! [`FaultInjectingTransport`] wraps a real transport and replaces the
//! next N sends with scripted failures, then lets traffic through.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use strata_client::{SendContext, Transport, TransportError};
use strata_protocol::{headers, StorageRequest, StorageResponse};

/// One scripted outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Forward to the wrapped transport.
    Pass,
    /// Answer with this status without reaching the service.
    Status(u16),
    /// Fail below HTTP.
    Network,
    /// Never answer; the send ends only on deadline or cancellation.
    Hang,
}

/// Transport wrapper that injects scripted faults.
#[derive(Debug)]
pub struct FaultInjectingTransport<T> {
    inner: T,
    script: Mutex<VecDeque<Fault>>,
    log: Mutex<Vec<StorageRequest>>,
}

impl<T: Transport> FaultInjectingTransport<T> {
    /// Wraps `inner` with an empty script.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            script: Mutex::new(VecDeque::new()),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Queues faults for the next sends.
    pub fn push_faults(&self, faults: impl IntoIterator<Item = Fault>) {
        self.script.lock().extend(faults);
    }

    /// Queues `count` copies of one fault.
    pub fn fail_next(&self, count: usize, fault: Fault) {
        self.push_faults(std::iter::repeat(fault).take(count));
    }

    /// Every request sent, in order.
    pub fn requests(&self) -> Vec<StorageRequest> {
        self.log.lock().clone()
    }

    /// Host of every request sent, in order.
    pub fn hosts(&self) -> Vec<String> {
        self.log
            .lock()
            .iter()
            .map(|r| r.url.host_str().unwrap_or_default().to_string())
            .collect()
    }

    /// Number of requests sent.
    pub fn request_count(&self) -> usize {
        self.log.lock().len()
    }

    /// The wrapped transport.
    pub fn inner(&self) -> &T {
        &self.inner
    }
}

#[async_trait]
impl<T: Transport> Transport for FaultInjectingTransport<T> {
    async fn send(
        &self,
        request: StorageRequest,
        ctx: &SendContext,
    ) -> Result<StorageResponse, TransportError> {
        self.log.lock().push(request.clone());
        let fault = self.script.lock().pop_front().unwrap_or(Fault::Pass);
        match fault {
            Fault::Pass => self.inner.send(request, ctx).await,
            Fault::Status(status) => Ok(StorageResponse::new(status)
                .with_header(headers::REQUEST_ID, format!("fault-{status}"))
                .with_body(format!("injected status {status}"))),
            Fault::Network => Err(TransportError::Connection("injected network failure".into())),
            Fault::Hang => {
                match ctx.deadline {
                    Some(deadline) => tokio::select! {
                        _ = ctx.cancel.cancelled() => Err(TransportError::Cancelled),
                        _ = tokio::time::sleep_until(deadline) => Err(TransportError::Timeout),
                    },
                    None => {
                        ctx.cancel.cancelled().await;
                        Err(TransportError::Cancelled)
                    }
                }
            }
        }
    }
}

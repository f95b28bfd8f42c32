// Pending response correlation
// The listener pushes decoded responses; command issuers wait on them with a deadline

use crate::ccdi::{Acknowledgement, QueryResponse};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::warn;

#[derive(Debug, Default)]
struct SlotState {
    /// Query responses by 3-digit code, oldest first
    queries: HashMap<String, VecDeque<QueryResponse>>,
    /// Configuration-mode acknowledgements, oldest first
    acks: VecDeque<Acknowledgement>,
}

/// Responses waiting to be consumed
///
/// Each query code has its own FIFO so a second response arriving before the
/// first is consumed is queued rather than lost. Queues are bounded; on
/// overflow the oldest entry is dropped.
#[derive(Debug)]
pub struct ResponseSlots {
    state: Mutex<SlotState>,
    changed: Notify,
    capacity: usize,
}

impl ResponseSlots {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(SlotState::default()),
            changed: Notify::new(),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a query response under its code
    pub fn push_query(&self, response: QueryResponse) {
        {
            let mut state = self.lock();
            let queue = state.queries.entry(response.command.clone()).or_default();
            if queue.len() >= self.capacity {
                if let Some(dropped) = queue.pop_front() {
                    warn!(code = %dropped.command, data = %dropped.data, "Response queue full, dropping oldest");
                }
            }
            queue.push_back(response);
        }
        self.changed.notify_waiters();
    }

    /// Queue a configuration-mode acknowledgement
    pub fn push_ack(&self, ack: Acknowledgement) {
        {
            let mut state = self.lock();
            if state.acks.len() >= self.capacity {
                if let Some(dropped) = state.acks.pop_front() {
                    warn!(?dropped, "Acknowledgement queue full, dropping oldest");
                }
            }
            state.acks.push_back(ack);
        }
        self.changed.notify_waiters();
    }

    /// Take the oldest response for `code`, if any
    pub fn take_query(&self, code: &str) -> Option<QueryResponse> {
        self.lock().queries.get_mut(code)?.pop_front()
    }

    /// Number of responses queued for `code`
    pub fn pending(&self, code: &str) -> usize {
        self.lock().queries.get(code).map_or(0, VecDeque::len)
    }

    pub fn pending_acks(&self) -> usize {
        self.lock().acks.len()
    }

    /// Drop everything queued for `code`
    pub fn clear(&self, code: &str) {
        self.lock().queries.remove(code);
    }

    pub fn clear_acks(&self) {
        self.lock().acks.clear();
    }

    /// Wait up to `timeout` for a response to `code` and take it
    pub async fn wait_query(&self, code: &str, timeout: Duration) -> Option<QueryResponse> {
        self.wait_until(timeout, |state| state.queries.get_mut(code)?.pop_front())
            .await
    }

    /// Wait up to `timeout` for `count` responses to `code`
    ///
    /// Returns as soon as `count` are queued; otherwise takes whatever
    /// arrived by the deadline, possibly nothing.
    pub async fn wait_queries(
        &self,
        code: &str,
        count: usize,
        timeout: Duration,
    ) -> Vec<QueryResponse> {
        let full = self
            .wait_until(timeout, |state| {
                let queue = state.queries.get_mut(code)?;
                (queue.len() >= count).then(|| queue.drain(..count).collect::<Vec<_>>())
            })
            .await;

        match full {
            Some(responses) => responses,
            None => {
                let mut state = self.lock();
                match state.queries.get_mut(code) {
                    Some(queue) => {
                        let available = queue.len().min(count);
                        queue.drain(..available).collect()
                    }
                    None => Vec::new(),
                }
            }
        }
    }

    /// Wait up to `timeout` for the next acknowledgement
    pub async fn wait_ack(&self, timeout: Duration) -> Option<Acknowledgement> {
        self.wait_until(timeout, |state| state.acks.pop_front()).await
    }

    async fn wait_until<T>(
        &self,
        timeout: Duration,
        mut take: impl FnMut(&mut SlotState) -> Option<T>,
    ) -> Option<T> {
        let deadline = Instant::now() + timeout;

        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            // Register before checking so a push between check and await is not missed
            notified.as_mut().enable();

            let found = {
                let mut state = self.lock();
                take(&mut *state)
            };
            if found.is_some() {
                return found;
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ccdi::NackCode;
    use std::sync::Arc;

    fn response(code: &str, data: &str) -> QueryResponse {
        QueryResponse {
            command: code.to_string(),
            data: data.to_string(),
        }
    }

    #[test]
    fn test_fifo_per_code() {
        let slots = ResponseSlots::new(8);
        slots.push_query(response("318", "100"));
        slots.push_query(response("319", "5"));
        slots.push_query(response("318", "101"));

        assert_eq!(slots.pending("318"), 2);
        assert_eq!(slots.take_query("318").unwrap().data, "100");
        assert_eq!(slots.take_query("318").unwrap().data, "101");
        assert!(slots.take_query("318").is_none());
        assert_eq!(slots.take_query("319").unwrap().data, "5");
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let slots = ResponseSlots::new(2);
        slots.push_query(response("064", "1"));
        slots.push_query(response("064", "2"));
        slots.push_query(response("064", "3"));

        assert_eq!(slots.pending("064"), 2);
        assert_eq!(slots.take_query("064").unwrap().data, "2");
    }

    #[test]
    fn test_clear() {
        let slots = ResponseSlots::new(4);
        slots.push_query(response("047", "28"));
        slots.push_ack(Acknowledgement::Rejected(NackCode::OutOfRange));
        slots.clear("047");
        slots.clear_acks();
        assert_eq!(slots.pending("047"), 0);
        assert_eq!(slots.pending_acks(), 0);
    }

    #[tokio::test]
    async fn test_wait_query_timeout() {
        let slots = ResponseSlots::new(4);
        let result = slots.wait_query("064", Duration::from_millis(20)).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_wait_query_woken_by_push() {
        let slots = Arc::new(ResponseSlots::new(4));
        let pusher = slots.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            pusher.push_query(response("064", "-1053"));
        });

        let result = slots.wait_query("064", Duration::from_secs(1)).await;
        assert_eq!(result.unwrap().data, "-1053");
        assert_eq!(slots.pending("064"), 0);
    }

    #[tokio::test]
    async fn test_wait_queries_partial() {
        let slots = ResponseSlots::new(4);
        slots.push_query(response("047", "468"));

        let samples = slots
            .wait_queries("047", 2, Duration::from_millis(20))
            .await;
        assert_eq!(samples.len(), 1);
        assert_eq!(slots.pending("047"), 0);
    }

    #[tokio::test]
    async fn test_wait_queries_full() {
        let slots = ResponseSlots::new(4);
        slots.push_query(response("047", "28"));
        slots.push_query(response("047", "468"));
        slots.push_query(response("047", "470"));

        let samples = slots.wait_queries("047", 2, Duration::from_secs(1)).await;
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].data, "28");
        assert_eq!(slots.pending("047"), 1);
    }

    #[tokio::test]
    async fn test_wait_ack() {
        let slots = ResponseSlots::new(4);
        slots.push_ack(Acknowledgement::Accepted { command: Some('R') });
        assert_eq!(
            slots.wait_ack(Duration::from_millis(20)).await,
            Some(Acknowledgement::Accepted { command: Some('R') })
        );
        assert!(slots.wait_ack(Duration::from_millis(20)).await.is_none());
    }
}

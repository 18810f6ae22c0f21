//! In-memory [`PageSource`] used by the service tests.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{Notify, Semaphore};

use pagewise_domain::error::FetchError;
use pagewise_domain::page::{PageRequest, ResourcePath};

use crate::ports::PageSource;

/// Holds requests until the test releases them.
struct Gate {
    started: Notify,
    release: Semaphore,
}

#[derive(Default)]
pub(crate) struct InMemorySource {
    collections: Mutex<HashMap<String, Vec<Value>>>,
    records: Mutex<HashMap<String, Value>>,
    failures: Mutex<VecDeque<FetchError>>,
    requests: Mutex<Vec<PageRequest>>,
    record_requests: Mutex<usize>,
    gate: Option<Gate>,
}

impl InMemorySource {
    /// A source serving `0..total` under `path`.
    pub(crate) fn with_numbers(path: &str, total: u64) -> Self {
        let source = Self::default();
        source.insert_collection(path, (0..total).map(Value::from).collect());
        source
    }

    /// Make every request wait for [`release`](Self::release).
    pub(crate) fn gated(mut self) -> Self {
        self.gate = Some(Gate {
            started: Notify::new(),
            release: Semaphore::new(0),
        });
        self
    }

    pub(crate) fn insert_collection(&self, path: &str, items: Vec<Value>) {
        self.collections
            .lock()
            .unwrap()
            .insert(path.to_string(), items);
    }

    pub(crate) fn insert_record(&self, path: &str, record: Value) {
        self.records.lock().unwrap().insert(path.to_string(), record);
    }

    /// Fail the next request with `error`.
    pub(crate) fn fail_next(&self, error: FetchError) {
        self.failures.lock().unwrap().push_back(error);
    }

    pub(crate) fn requests(&self) -> Vec<PageRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn offsets(&self) -> Vec<u64> {
        self.requests()
            .iter()
            .map(|request| request.cursor().offset())
            .collect()
    }

    pub(crate) fn record_requests(&self) -> usize {
        *self.record_requests.lock().unwrap()
    }

    /// Wait until a gated request has started.
    pub(crate) async fn wait_started(&self) {
        if let Some(gate) = &self.gate {
            gate.started.notified().await;
        }
    }

    /// Let one gated request proceed.
    pub(crate) fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.release.add_permits(1);
        }
    }

    async fn pass_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.started.notify_one();
            gate.release.acquire().await.unwrap().forget();
        }
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, FetchError> {
    serde_json::from_value(value).map_err(|err| FetchError::Decode {
        message: err.to_string(),
    })
}

impl PageSource for InMemorySource {
    fn fetch_page<T>(
        &self,
        request: &PageRequest,
    ) -> impl Future<Output = Result<Vec<T>, FetchError>> + Send
    where
        T: DeserializeOwned + Send + 'static,
    {
        let request = request.clone();
        async move {
            self.requests.lock().unwrap().push(request.clone());
            self.pass_gate().await;

            let failure = self.failures.lock().unwrap().pop_front();
            if let Some(err) = failure {
                return Err(err);
            }

            let items: Vec<Value> = {
                let collections = self.collections.lock().unwrap();
                let all = collections
                    .get(request.resource().as_str())
                    .ok_or_else(|| FetchError::Request {
                        status: 404,
                        message: "not found".to_string(),
                    })?;
                let offset = usize::try_from(request.cursor().offset()).unwrap();
                all.iter()
                    .skip(offset)
                    .take(request.page_size().as_usize())
                    .cloned()
                    .collect()
            };
            decode(Value::Array(items))
        }
    }

    fn fetch_one<T>(
        &self,
        path: &ResourcePath,
    ) -> impl Future<Output = Result<T, FetchError>> + Send
    where
        T: DeserializeOwned + Send + 'static,
    {
        let path = path.clone();
        async move {
            *self.record_requests.lock().unwrap() += 1;
            self.pass_gate().await;

            let failure = self.failures.lock().unwrap().pop_front();
            if let Some(err) = failure {
                return Err(err);
            }

            let record = self.records.lock().unwrap().get(path.as_str()).cloned();
            match record {
                Some(value) => decode(value),
                None => Err(FetchError::Request {
                    status: 404,
                    message: "not found".to_string(),
                }),
            }
        }
    }
}

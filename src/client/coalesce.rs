//! Sharing one remote fetch between concurrent identical requests

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::debug;

use super::ClientError;

type SharedFetch = Shared<BoxFuture<'static, Result<Vec<u8>, Arc<ClientError>>>>;

/// Fetches currently running, keyed by JSON cache key
///
/// The first caller for a key spawns the fetch as a task; callers arriving
/// while it runs await the same result. The task runs to completion even when
/// every caller has gone away, and removes its entry when done, so a later
/// call always starts a new fetch.
#[derive(Clone, Default)]
pub(crate) struct InFlight {
    pending: Arc<Mutex<HashMap<String, SharedFetch>>>,
}

impl InFlight {
    pub(crate) async fn run<F>(&self, key: &str, fetch: F) -> Result<Vec<u8>, ClientError>
    where
        F: Future<Output = Result<Vec<u8>, ClientError>> + Send + 'static,
    {
        let shared = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            match pending.get(key) {
                Some(running) => {
                    debug!(cache_key = %key, "joining in-flight request");
                    running.clone()
                }
                None => {
                    let registration = Registration {
                        pending: Arc::clone(&self.pending),
                        key: key.to_string(),
                    };
                    let task = tokio::spawn(async move {
                        let _registration = registration;
                        fetch.await.map_err(Arc::new)
                    });
                    let started = async move {
                        task.await
                            .unwrap_or_else(|err| Err(Arc::new(ClientError::FetchTask(err))))
                    }
                    .boxed()
                    .shared();
                    pending.insert(key.to_string(), started.clone());
                    started
                }
            }
        };

        shared
            .await
            .map_err(|err| Arc::try_unwrap(err).unwrap_or_else(ClientError::Shared))
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Removes its key from the in-flight map when the fetch task ends, panics included
struct Registration {
    pending: Arc<Mutex<HashMap<String, SharedFetch>>>,
    key: String,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

//! In-memory document store for tests: documents are mutated by hand,
//! streams can be broken and the whole collection dropped. Resume tokens are
//! honored by replaying the retained event log; a token from before the last
//! collection drop is rejected, forcing the caller back to a full read.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use utils::error::Result;

use crate::client::{ChangeEvent, DocumentClient, ResumeToken};

struct State {
    docs: HashMap<String, String>,
    next_token: u64,
    /// Tokens below this cannot be resumed from.
    first_valid: u64,
    log: Vec<(u64, ChangeEvent)>,
    subscribers: Vec<flume::Sender<ChangeEvent>>,
}

#[derive(Clone)]
pub struct MemoryDocumentStore {
    id: String,
    state: Arc<Mutex<State>>,
}

impl MemoryDocumentStore {
    pub fn new(id: impl Into<String>) -> Self {
        MemoryDocumentStore {
            id: id.into(),
            state: Arc::new(Mutex::new(State {
                docs: HashMap::new(),
                next_token: 1,
                first_valid: 0,
                log: Vec::new(),
                subscribers: Vec::new(),
            })),
        }
    }

    pub fn insert(&self, doc_id: &str, value: &str) {
        let mut state = self.state.lock().unwrap();
        let token = state.next_token;
        state.next_token += 1;
        state.docs.insert(doc_id.to_string(), value.to_string());
        let event = ChangeEvent::Upsert {
            id: doc_id.to_string(),
            value: value.to_string(),
            token: token.to_string(),
        };
        state.log.push((token, event.clone()));
        state.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn delete(&self, doc_id: &str) {
        let mut state = self.state.lock().unwrap();
        let token = state.next_token;
        state.next_token += 1;
        state.docs.remove(doc_id);
        let event = ChangeEvent::Delete {
            id: doc_id.to_string(),
            token: token.to_string(),
        };
        state.log.push((token, event.clone()));
        state.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Drop the collection: documents and event log disappear, open streams
    /// see an invalidate event, old resume tokens stop working.
    pub fn drop_collection(&self) {
        let mut state = self.state.lock().unwrap();
        state.docs.clear();
        state.log.clear();
        state.first_valid = state.next_token;
        state
            .subscribers
            .retain(|tx| tx.send(ChangeEvent::Invalidate).is_ok());
    }

    /// Terminate every open stream without invalidating; a watcher resumes
    /// from its last token.
    pub fn break_streams(&self) {
        self.state.lock().unwrap().subscribers.clear();
    }
}

#[async_trait]
impl DocumentClient for MemoryDocumentStore {
    fn id(&self) -> &str {
        &self.id
    }

    async fn load_all(&self) -> Result<HashMap<String, String>> {
        Ok(self.state.lock().unwrap().docs.clone())
    }

    async fn watch(
        &self,
        resume: Option<ResumeToken>,
    ) -> Result<BoxStream<'static, ChangeEvent>> {
        let mut state = self.state.lock().unwrap();
        let (tx, rx) = flume::unbounded();

        if let Some(token) = resume {
            let after: u64 = token
                .parse()
                .map_err(|_| format!("malformed resume token '{}'", token))?;
            if after < state.first_valid {
                return Err("resume token expired".into());
            }
            for (t, event) in &state.log {
                if *t > after {
                    let _ = tx.send(event.clone());
                }
            }
        }

        state.subscribers.push(tx);
        Ok(rx.into_stream().boxed())
    }
}

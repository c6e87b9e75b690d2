//! In-process replication engine.
//!
//! Keeps each document's log in memory, deduplicates by hash, and refuses
//! commits whose hash does not verify. Documents are numbered `doc-1`,
//! `doc-2`, ... per engine. Used by tests, the CLI's local mode, and as the
//! reference behavior for real engines.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{AddCommitsOutcome, CommitOrBundle, DocId, EngineError, ReplicationEngine};
use crate::commit::{Commit, CommitHash, verify_strict};

#[derive(Debug, Default)]
struct DocumentLog {
    commits: Vec<Commit>,
    seen: HashSet<CommitHash>,
}

impl DocumentLog {
    fn append(&mut self, commit: Commit) -> bool {
        if !self.seen.insert(commit.hash.clone()) {
            return false;
        }
        self.commits.push(commit);
        true
    }
}

#[derive(Debug, Default)]
struct State {
    documents: HashMap<DocId, DocumentLog>,
    next_doc: u64,
    stopped: bool,
}

/// In-memory [`ReplicationEngine`].
#[derive(Debug)]
pub struct MemoryEngine {
    peer_id: String,
    /// Logs longer than this are returned with their prefix bundled.
    bundle_threshold: Option<usize>,
    state: Mutex<State>,
}

impl MemoryEngine {
    #[must_use]
    pub fn new(peer_id: impl Into<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
            bundle_threshold: None,
            state: Mutex::new(State::default()),
        }
    }

    /// Return all but the last `keep` commits of each loaded log as a single
    /// bundle, the way a compacting engine would.
    #[must_use]
    pub const fn with_bundling(mut self, keep: usize) -> Self {
        self.bundle_threshold = Some(keep);
        self
    }

    #[must_use]
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Number of documents currently held.
    pub async fn document_count(&self) -> usize {
        self.state.lock().await.documents.len()
    }
}

#[async_trait]
impl ReplicationEngine for MemoryEngine {
    async fn create_doc(
        &self,
        initial: Commit,
        other_parents: Vec<CommitHash>,
    ) -> Result<DocId, EngineError> {
        verify_strict(&initial)?;
        let mut state = self.state.lock().await;
        if state.stopped {
            return Err(EngineError::Stopped);
        }
        state.next_doc += 1;
        let doc_id = DocId::new(format!("doc-{}", state.next_doc));

        let mut log = DocumentLog::default();
        log.append(initial);
        state.documents.insert(doc_id.clone(), log);

        tracing::debug!(
            peer = %self.peer_id,
            doc = %doc_id,
            other_parents = other_parents.len(),
            "created document"
        );
        Ok(doc_id)
    }

    async fn add_commits(
        &self,
        doc_id: &DocId,
        commits: Vec<Commit>,
    ) -> Result<AddCommitsOutcome, EngineError> {
        for commit in &commits {
            verify_strict(commit)?;
        }

        let mut state = self.state.lock().await;
        if state.stopped {
            return Err(EngineError::Stopped);
        }
        let log = state
            .documents
            .get_mut(doc_id)
            .ok_or_else(|| EngineError::DocumentNotFound(doc_id.clone()))?;

        let mut outcome = AddCommitsOutcome::default();
        for commit in commits {
            if log.append(commit.clone()) {
                outcome.accepted.push(commit);
            } else {
                outcome.duplicates += 1;
            }
        }
        Ok(outcome)
    }

    async fn load_document(
        &self,
        doc_id: &DocId,
    ) -> Result<Option<Vec<CommitOrBundle>>, EngineError> {
        let state = self.state.lock().await;
        if state.stopped {
            return Err(EngineError::Stopped);
        }
        let Some(log) = state.documents.get(doc_id) else {
            return Ok(None);
        };

        let entries = match self.bundle_threshold {
            Some(keep) if log.commits.len() > keep + 1 => {
                let split = log.commits.len() - keep;
                let mut entries = vec![CommitOrBundle::Bundle {
                    commits: log.commits[..split].to_vec(),
                }];
                entries.extend(log.commits[split..].iter().cloned().map(CommitOrBundle::Commit));
                entries
            }
            _ => log.commits.iter().cloned().map(CommitOrBundle::Commit).collect(),
        };
        Ok(Some(entries))
    }

    async fn wait_until_synced(&self, _peer_id: &str) -> Result<(), EngineError> {
        if self.state.lock().await.stopped {
            return Err(EngineError::Stopped);
        }
        Ok(())
    }

    async fn create_contact_card(&self) -> Result<String, EngineError> {
        let digest = blake3::hash(self.peer_id.as_bytes());
        Ok(digest.to_hex()[..32].to_owned())
    }

    async fn stop(&self) {
        let mut state = self.state.lock().await;
        state.documents.clear();
        state.stopped = true;
        tracing::debug!(peer = %self.peer_id, "engine stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::create;
    use crate::engine::flatten_entries;

    #[tokio::test]
    async fn documents_are_numbered() {
        let engine = MemoryEngine::new("peer-a");
        let d1 = engine.create_doc(create("one", vec![]), vec![]).await.expect("d1");
        let d2 = engine.create_doc(create("two", vec![]), vec![]).await.expect("d2");
        assert_eq!(d1.as_str(), "doc-1");
        assert_eq!(d2.as_str(), "doc-2");
        assert_eq!(engine.document_count().await, 2);
    }

    #[tokio::test]
    async fn add_commits_dedups_by_hash() {
        let engine = MemoryEngine::new("peer-a");
        let root = create("root", vec![]);
        let doc = engine.create_doc(root.clone(), vec![]).await.expect("doc");
        let child = create("child", vec![root.hash.clone()]);

        let outcome = engine
            .add_commits(&doc, vec![root.clone(), child.clone(), child.clone()])
            .await
            .expect("add");
        assert_eq!(outcome.accepted, vec![child.clone()]);
        assert_eq!(outcome.duplicates, 2);

        let log = flatten_entries(engine.load_document(&doc).await.expect("load").expect("known"));
        assert_eq!(log, vec![root, child]);
    }

    #[tokio::test]
    async fn forged_commit_is_rejected() {
        let engine = MemoryEngine::new("peer-a");
        let doc = engine.create_doc(create("root", vec![]), vec![]).await.expect("doc");
        let mut forged = create("honest", vec![]);
        forged.contents = b"forged".to_vec();

        let err = engine.add_commits(&doc, vec![forged]).await.expect_err("reject");
        assert!(matches!(err, EngineError::Rejected(_)));
    }

    #[tokio::test]
    async fn unknown_document() {
        let engine = MemoryEngine::new("peer-a");
        let missing = DocId::new("doc-404");
        assert!(engine.load_document(&missing).await.expect("load").is_none());
        let err = engine
            .add_commits(&missing, vec![create("x", vec![])])
            .await
            .expect_err("missing");
        assert_eq!(err, EngineError::DocumentNotFound(missing));
    }

    #[tokio::test]
    async fn bundling_keeps_tail_as_commits() {
        let engine = MemoryEngine::new("peer-a").with_bundling(1);
        let a = create("a", vec![]);
        let doc = engine.create_doc(a.clone(), vec![]).await.expect("doc");
        let b = create("b", vec![a.hash.clone()]);
        let c = create("c", vec![b.hash.clone()]);
        engine.add_commits(&doc, vec![b.clone(), c.clone()]).await.expect("add");

        let entries = engine.load_document(&doc).await.expect("load").expect("known");
        assert_eq!(entries.len(), 2);
        assert!(matches!(entries[0], CommitOrBundle::Bundle { .. }));
        assert_eq!(flatten_entries(entries), vec![a, b, c]);
    }

    #[tokio::test]
    async fn contact_card_is_stable_hex() {
        let engine = MemoryEngine::new("peer-a");
        let card = engine.create_contact_card().await.expect("card");
        assert_eq!(card.len(), 32);
        assert!(card.bytes().all(|b| b.is_ascii_hexdigit()));
        assert_eq!(card, engine.create_contact_card().await.expect("again"));
        engine.wait_until_synced("peer-b").await.expect("synced");
    }

    #[tokio::test]
    async fn stop_clears_state() {
        let engine = MemoryEngine::new("peer-a");
        let doc = engine.create_doc(create("x", vec![]), vec![]).await.expect("doc");
        engine.stop().await;
        assert_eq!(engine.document_count().await, 0);
        assert_eq!(engine.load_document(&doc).await, Err(EngineError::Stopped));
        assert_eq!(
            engine.wait_until_synced("peer-b").await,
            Err(EngineError::Stopped)
        );
        assert_eq!(
            engine.create_doc(create("y", vec![]), vec![]).await,
            Err(EngineError::Stopped)
        );
    }
}

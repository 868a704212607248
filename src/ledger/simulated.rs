//! In-process ledger with git-like object semantics and fault injection.
//!
//! Objects are content addressed (SHA-1 over a typed payload) and the branch
//! map sits behind a single mutex, so every operation is linearizable. Tests
//! and the `simulate` command use it to reproduce tip contention offline.

use super::{CommitInfo, LedgerResult, ObjectId, RemoteLedger, TreeEntry};
use crate::error::LedgerError;
use async_trait::async_trait;
use chrono::Utc;
use sha1::{Digest, Sha1};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Message prefix of commits landed by [`SimulatedLedger::land_foreign_commit`]
pub const FOREIGN_COMMIT_PREFIX: &str = "Foreign write";

/// Ledger operations that faults can target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerOp {
    /// `read_tip`
    ReadTip,
    /// `read_commit`
    ReadCommit,
    /// `read_tree_entry`
    ReadTreeEntry,
    /// `create_blob`
    CreateBlob,
    /// `create_tree`
    CreateTree,
    /// `create_commit`
    CreateCommit,
    /// `compare_and_swap_tip`
    CompareAndSwap,
}

impl LedgerOp {
    fn name(self) -> &'static str {
        match self {
            LedgerOp::ReadTip => "read_tip",
            LedgerOp::ReadCommit => "read_commit",
            LedgerOp::ReadTreeEntry => "read_tree_entry",
            LedgerOp::CreateBlob => "create_blob",
            LedgerOp::CreateTree => "create_tree",
            LedgerOp::CreateCommit => "create_commit",
            LedgerOp::CompareAndSwap => "compare_and_swap_tip",
        }
    }
}

/// A failure injected into the next call of an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Another writer advances the default branch right before the call runs
    ForeignWrite,
    /// The call is throttled until `retry_in` from now
    RateLimited {
        /// Distance from the call to the resume time
        retry_in: Duration,
    },
    /// The call fails with an opaque error
    Transient,
}

/// A commit on the simulated branch history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    /// Commit id
    pub id: ObjectId,
    /// Commit message
    pub message: String,
    /// Parent commit ids
    pub parents: Vec<ObjectId>,
}

impl CommitRecord {
    /// Whether the commit was landed by a simulated foreign writer
    pub fn is_foreign(&self) -> bool {
        self.message.starts_with(FOREIGN_COMMIT_PREFIX)
    }
}

#[derive(Debug, Clone)]
enum Object {
    Blob(String),
    Tree(BTreeMap<String, ObjectId>),
    Commit {
        tree: ObjectId,
        parents: Vec<ObjectId>,
        message: String,
    },
}

#[derive(Default)]
struct State {
    objects: HashMap<ObjectId, Object>,
    branches: HashMap<String, ObjectId>,
    queued: HashMap<LedgerOp, VecDeque<Fault>>,
    permanent: HashMap<LedgerOp, Fault>,
    calls: HashMap<LedgerOp, Vec<Instant>>,
    observed_tips: Vec<ObjectId>,
    foreign_writes: u64,
}

/// Linearizable in-memory ledger
pub struct SimulatedLedger {
    state: Mutex<State>,
    default_branch: String,
    latency: Option<Duration>,
}

fn object_id(kind: &str, payload: &[u8]) -> ObjectId {
    let mut hasher = Sha1::new();
    hasher.update(kind.as_bytes());
    hasher.update(b" ");
    hasher.update(payload.len().to_string().as_bytes());
    hasher.update(b"\0");
    hasher.update(payload);
    ObjectId::new(hex::encode(hasher.finalize()))
}

impl State {
    fn store(&mut self, object: Object) -> ObjectId {
        let id = match &object {
            Object::Blob(content) => object_id("blob", content.as_bytes()),
            Object::Tree(entries) => {
                let payload: String = entries
                    .iter()
                    .map(|(path, blob)| format!("{path}\t{blob}\n"))
                    .collect();
                object_id("tree", payload.as_bytes())
            }
            Object::Commit {
                tree,
                parents,
                message,
            } => {
                let mut payload = format!("tree {tree}\n");
                for parent in parents {
                    payload.push_str(&format!("parent {parent}\n"));
                }
                payload.push('\n');
                payload.push_str(message);
                object_id("commit", payload.as_bytes())
            }
        };
        self.objects.entry(id.clone()).or_insert(object);
        id
    }

    fn tree(&self, id: &ObjectId) -> LedgerResult<&BTreeMap<String, ObjectId>> {
        match self.objects.get(id) {
            Some(Object::Tree(entries)) => Ok(entries),
            _ => Err(LedgerError::NotFound {
                what: format!("tree {id}"),
            }),
        }
    }

    fn commit(&self, id: &ObjectId) -> LedgerResult<(&ObjectId, &[ObjectId], &str)> {
        match self.objects.get(id) {
            Some(Object::Commit {
                tree,
                parents,
                message,
            }) => Ok((tree, parents.as_slice(), message.as_str())),
            _ => Err(LedgerError::NotFound {
                what: format!("commit {id}"),
            }),
        }
    }

    fn tip(&self, branch: &str) -> LedgerResult<&ObjectId> {
        self.branches.get(branch).ok_or_else(|| LedgerError::NotFound {
            what: format!("branch {branch}"),
        })
    }

    fn land_foreign_commit(&mut self, branch: &str) -> LedgerResult<ObjectId> {
        let parent = self.tip(branch)?.clone();
        let (tree, _, _) = self.commit(&parent)?;
        let mut entries = self.tree(tree)?.clone();

        self.foreign_writes += 1;
        let seq = self.foreign_writes;
        let blob = self.store(Object::Blob(format!("foreign content {seq}")));
        entries.insert(format!("foreign-{seq}.txt"), blob);
        let tree = self.store(Object::Tree(entries));
        let commit = self.store(Object::Commit {
            tree,
            parents: vec![parent],
            message: format!("{FOREIGN_COMMIT_PREFIX} {seq}"),
        });
        self.branches.insert(branch.to_string(), commit.clone());
        Ok(commit)
    }
}

impl SimulatedLedger {
    /// Create a ledger whose `branch` points at an empty root commit
    pub fn new(branch: impl Into<String>) -> Self {
        let branch = branch.into();
        let mut state = State::default();
        let tree = state.store(Object::Tree(BTreeMap::new()));
        let root = state.store(Object::Commit {
            tree,
            parents: Vec::new(),
            message: "Initial commit".to_string(),
        });
        state.branches.insert(branch.clone(), root);

        Self {
            state: Mutex::new(state),
            default_branch: branch,
            latency: None,
        }
    }

    /// Delay every call by `latency` to mimic a network round trip
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency).filter(|l| !l.is_zero());
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue `fault` for the next `times` calls of `op`
    pub fn inject(&self, op: LedgerOp, fault: Fault, times: usize) {
        let mut state = self.lock();
        let queue = state.queued.entry(op).or_default();
        queue.extend(std::iter::repeat_n(fault, times));
    }

    /// Fail every call of `op` with `fault` once the queue for it is drained
    pub fn inject_always(&self, op: LedgerOp, fault: Fault) {
        self.lock().permanent.insert(op, fault);
    }

    /// Advance `branch` with a commit that is not part of any unit of work
    pub fn land_foreign_commit(&self, branch: &str) -> LedgerResult<ObjectId> {
        self.lock().land_foreign_commit(branch)
    }

    /// Current tip of `branch`
    pub fn tip(&self, branch: &str) -> Option<ObjectId> {
        self.lock().branches.get(branch).cloned()
    }

    /// First-parent history from the tip of `branch` back to the root
    pub fn history(&self, branch: &str) -> LedgerResult<Vec<CommitRecord>> {
        let state = self.lock();
        let mut records = Vec::new();
        let mut cursor = Some(state.tip(branch)?.clone());

        while let Some(id) = cursor {
            let (_, parents, message) = state.commit(&id)?;
            records.push(CommitRecord {
                id: id.clone(),
                message: message.to_string(),
                parents: parents.to_vec(),
            });
            cursor = parents.first().cloned();
        }

        Ok(records)
    }

    /// Files and their contents in the tip tree of `branch`
    pub fn files(&self, branch: &str) -> LedgerResult<BTreeMap<String, String>> {
        let state = self.lock();
        let (tree, _, _) = state.commit(state.tip(branch)?)?;
        state
            .tree(tree)?
            .iter()
            .map(|(path, blob)| match state.objects.get(blob) {
                Some(Object::Blob(content)) => Ok((path.clone(), content.clone())),
                _ => Err(LedgerError::NotFound {
                    what: format!("blob {blob}"),
                }),
            })
            .collect()
    }

    /// Number of calls made to `op`, including failed ones
    pub fn calls(&self, op: LedgerOp) -> usize {
        self.lock().calls.get(&op).map_or(0, Vec::len)
    }

    /// Runtime instants at which `op` was called
    pub fn call_times(&self, op: LedgerOp) -> Vec<Instant> {
        self.lock().calls.get(&op).cloned().unwrap_or_default()
    }

    /// Tips returned by successful `read_tip` calls, in order
    pub fn observed_tips(&self) -> Vec<ObjectId> {
        self.lock().observed_tips.clone()
    }

    /// Simulate the round trip, record the call and apply any pending fault
    async fn enter(&self, op: LedgerOp) -> LedgerResult<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.lock();
        state.calls.entry(op).or_default().push(Instant::now());

        let queued = state.queued.get_mut(&op).and_then(VecDeque::pop_front);
        let fault = queued.or_else(|| state.permanent.get(&op).cloned());

        match fault {
            None => Ok(()),
            Some(Fault::ForeignWrite) => {
                let branch = self.default_branch.clone();
                state.land_foreign_commit(&branch).map(|_| ())
            }
            Some(Fault::RateLimited { retry_in }) => Err(LedgerError::RateLimited {
                resume_at: Utc::now()
                    + chrono::Duration::from_std(retry_in)
                        .unwrap_or_else(|_| chrono::Duration::seconds(60)),
            }),
            Some(Fault::Transient) => Err(LedgerError::Injected {
                operation: op.name().to_string(),
            }),
        }
    }
}

#[async_trait]
impl RemoteLedger for SimulatedLedger {
    async fn read_tip(&self, branch: &str) -> LedgerResult<ObjectId> {
        self.enter(LedgerOp::ReadTip).await?;
        let mut state = self.lock();
        let tip = state.tip(branch)?.clone();
        state.observed_tips.push(tip.clone());
        Ok(tip)
    }

    async fn read_commit(&self, commit: &ObjectId) -> LedgerResult<CommitInfo> {
        self.enter(LedgerOp::ReadCommit).await?;
        let state = self.lock();
        let (tree, _, _) = state.commit(commit)?;
        Ok(CommitInfo {
            id: commit.clone(),
            tree: tree.clone(),
        })
    }

    async fn read_tree_entry(&self, tree: &ObjectId, path: &str) -> LedgerResult<Option<ObjectId>> {
        self.enter(LedgerOp::ReadTreeEntry).await?;
        Ok(self.lock().tree(tree)?.get(path).cloned())
    }

    async fn create_blob(&self, content: &str) -> LedgerResult<ObjectId> {
        self.enter(LedgerOp::CreateBlob).await?;
        Ok(self.lock().store(Object::Blob(content.to_string())))
    }

    async fn create_tree(
        &self,
        base_tree: &ObjectId,
        entries: &[TreeEntry],
    ) -> LedgerResult<ObjectId> {
        self.enter(LedgerOp::CreateTree).await?;
        let mut state = self.lock();
        let mut tree = state.tree(base_tree)?.clone();

        for entry in entries {
            if !matches!(state.objects.get(&entry.blob), Some(Object::Blob(_))) {
                return Err(LedgerError::NotFound {
                    what: format!("blob {}", entry.blob),
                });
            }
            tree.insert(entry.path.clone(), entry.blob.clone());
        }

        Ok(state.store(Object::Tree(tree)))
    }

    async fn create_commit(
        &self,
        message: &str,
        tree: &ObjectId,
        parents: &[ObjectId],
    ) -> LedgerResult<ObjectId> {
        self.enter(LedgerOp::CreateCommit).await?;
        let mut state = self.lock();
        state.tree(tree)?;
        for parent in parents {
            state.commit(parent)?;
        }

        Ok(state.store(Object::Commit {
            tree: tree.clone(),
            parents: parents.to_vec(),
            message: message.to_string(),
        }))
    }

    async fn compare_and_swap_tip(
        &self,
        branch: &str,
        expected: &ObjectId,
        new: &ObjectId,
    ) -> LedgerResult<()> {
        self.enter(LedgerOp::CompareAndSwap).await?;
        let mut state = self.lock();
        state.commit(new)?;

        if state.tip(branch)? != expected {
            return Err(LedgerError::Conflict {
                branch: branch.to_string(),
                expected: expected.to_string(),
            });
        }

        state.branches.insert(branch.to_string(), new.clone());
        Ok(())
    }
}

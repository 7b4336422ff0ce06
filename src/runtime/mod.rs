//! Process-wide runtime state, passed explicitly instead of living in
//! globals: the garbage collector and the tree of spawned threads. Multiple
//! independent contexts can coexist in one process.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

use parking_lot::Mutex;

use crate::gc::{self, Gc};
use crate::record::{ErrorKind, EvalError, EvalResult, RecordRef};

pub struct RuntimeContext {
    pub gc: Arc<Gc>,
    root: Arc<ThreadNode>,
    next_thread_id: AtomicU64,
}

impl RuntimeContext {
    pub fn new() -> Arc<RuntimeContext> {
        Arc::new(RuntimeContext {
            gc: Arc::new(Gc::new()),
            root: Arc::new(ThreadNode {
                id: 0,
                parent: None,
                state: Mutex::new(ThreadState::default()),
            }),
            next_thread_id: AtomicU64::new(1),
        })
    }

    /// The base thread node every interpreter starts from.
    pub fn root(&self) -> Arc<ThreadNode> {
        Arc::clone(&self.root)
    }

    /// Begin the periodic GC sweep. Detached; it stops once the context's
    /// collector is dropped.
    pub fn start_sweeper(&self) {
        let _detached = gc::start_sweeper(&self.gc);
    }

    /// Register a child node under `parent` for a newly spawned thread.
    pub fn new_thread_node(&self, parent: &Arc<ThreadNode>) -> Arc<ThreadNode> {
        let id = self.next_thread_id.fetch_add(1, Ordering::Relaxed);
        let node = Arc::new(ThreadNode {
            id,
            parent: Some(Arc::downgrade(parent)),
            state: Mutex::new(ThreadState::default()),
        });
        parent.state.lock().children.push(Arc::clone(&node));
        node
    }
}

#[derive(Default)]
struct ThreadState {
    children: Vec<Arc<ThreadNode>>,
    /// The thread's return-value register, written once on completion.
    rax: Option<RecordRef>,
    /// Exceptions raised on this thread and not yet delivered to a catch.
    pending: VecDeque<EvalError>,
    handle: Option<JoinHandle<EvalResult<RecordRef>>>,
}

/// One node in the thread tree. The per-node mutex guards both the child
/// list and the node's interpreter bookkeeping.
pub struct ThreadNode {
    pub id: u64,
    pub parent: Option<Weak<ThreadNode>>,
    state: Mutex<ThreadState>,
}

impl ThreadNode {
    /// Hand the node its OS thread, once spawned.
    pub fn attach(&self, handle: JoinHandle<EvalResult<RecordRef>>) {
        self.state.lock().handle = Some(handle);
    }

    pub fn set_rax(&self, value: RecordRef) {
        self.state.lock().rax = Some(value);
    }

    pub fn rax(&self) -> Option<RecordRef> {
        self.state.lock().rax.clone()
    }

    pub fn push_pending(&self, err: EvalError) {
        self.state.lock().pending.push_back(err);
    }

    pub fn pop_pending(&self) -> Option<EvalError> {
        self.state.lock().pending.pop_front()
    }

    pub fn child_count(&self) -> usize {
        self.state.lock().children.len()
    }

    /// Block until the child thread `id` terminates; unlink it and return
    /// its result. Joining an unknown id is a runtime error.
    pub fn join_child(&self, id: u64) -> EvalResult<RecordRef> {
        let (child, handle) = {
            let mut state = self.state.lock();
            let pos = state
                .children
                .iter()
                .position(|c| c.id == id)
                .ok_or_else(|| EvalError::runtime(format!("no child thread {id}")))?;
            let child = state.children.remove(pos);
            let handle = child.state.lock().handle.take();
            (child, handle)
        };
        let handle =
            handle.ok_or_else(|| EvalError::runtime(format!("thread {id} already joined")))?;
        // lock released while blocking on the join
        let result = handle
            .join()
            .map_err(|_| EvalError::runtime(format!("thread {id} panicked")))??;
        child.set_rax(result.clone());
        Ok(result)
    }
}

impl std::fmt::Debug for ThreadNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ThreadNode({})", self.id)
    }
}

/// System-level failure helper shared by thread plumbing.
pub fn system_error(msg: impl Into<String>) -> EvalError {
    EvalError::new(ErrorKind::System(msg.into()), crate::ast::Span::UNKNOWN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;

    #[test]
    fn thread_ids_are_unique() {
        let ctx = RuntimeContext::new();
        let root = ctx.root();
        let a = ctx.new_thread_node(&root);
        let b = ctx.new_thread_node(&root);
        assert_ne!(a.id, b.id);
        assert_eq!(root.child_count(), 2);
    }

    #[test]
    fn join_returns_thread_result() {
        let ctx = RuntimeContext::new();
        let root = ctx.root();
        let node = ctx.new_thread_node(&root);
        let id = node.id;
        node.attach(std::thread::spawn(|| Ok(Record::make_int(42).into_ref())));
        let result = root.join_child(id).unwrap();
        assert_eq!(result.lock().to_string(), "42");
        assert_eq!(root.child_count(), 0);
    }

    #[test]
    fn join_unknown_id_errors() {
        let ctx = RuntimeContext::new();
        let root = ctx.root();
        assert!(root.join_child(999).is_err());
    }

    #[test]
    fn nested_nodes_keep_parent_links() {
        let ctx = RuntimeContext::new();
        let root = ctx.root();
        let child = ctx.new_thread_node(&root);
        let grandchild = ctx.new_thread_node(&child);
        let parent = grandchild.parent.as_ref().unwrap().upgrade().unwrap();
        assert_eq!(parent.id, child.id);
    }

    #[test]
    fn pending_exception_queue_is_fifo() {
        let ctx = RuntimeContext::new();
        let root = ctx.root();
        root.push_pending(EvalError::runtime("first"));
        root.push_pending(EvalError::runtime("second"));
        assert_eq!(root.pop_pending().unwrap().to_string(), "first");
        assert_eq!(root.pop_pending().unwrap().to_string(), "second");
        assert!(root.pop_pending().is_none());
    }
}

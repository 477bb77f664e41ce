//! Execution state shared by one interpreter run
//!
//! `async` calls do not run their body; they create a [`Task`] and push it
//! onto the [`TaskQueue`]. A task runs to completion either when it is
//! awaited or when the queue is drained after the top-level statements.
//! Nothing is ever interleaved: this is a single-threaded FIFO scheduler.

use crate::error::RuntimeError;
use crate::interpreter::Interpreter;
use crate::value::{Closure, Value};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Default bound on nested function calls
pub const DEFAULT_MAX_CALL_DEPTH: usize = 1000;

/// Remaining stack below which evaluation moves to a fresh segment
const STACK_RED_ZONE: usize = 256 * 1024;
/// Size of each extra stack segment
const STACK_GROW_SIZE: usize = 8 * 1024 * 1024;

/// Run `f`, growing the stack first if it is nearly exhausted
///
/// Script recursion maps onto host recursion; calls and blocks go through
/// here so `max_call_depth` is reached before the thread's stack runs out.
pub fn with_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, f)
}

static NEXT_TASK_ID: AtomicUsize = AtomicUsize::new(1);

/// How a statement finished
#[derive(Debug, Clone)]
pub enum ControlFlow {
    Normal(Value),
    Return(Value),
    Break,
    Continue,
}

impl ControlFlow {
    pub fn is_normal(&self) -> bool {
        matches!(self, ControlFlow::Normal(_))
    }
}

pub enum TaskState {
    Pending {
        closure: Rc<Closure>,
        args: Vec<Value>,
        this: Option<Value>,
    },
    Running,
    Done(Result<Value, RuntimeError>),
}

/// A deferred call of an async function
pub struct Task {
    id: usize,
    name: String,
    state: RefCell<TaskState>,
}

impl Task {
    pub fn new(closure: Rc<Closure>, args: Vec<Value>, this: Option<Value>) -> Rc<Self> {
        let name = closure.declaration.display_name().to_string();
        Rc::new(Task {
            id: NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed),
            name,
            state: RefCell::new(TaskState::Pending {
                closure,
                args,
                this,
            }),
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_pending(&self) -> bool {
        matches!(*self.state.borrow(), TaskState::Pending { .. })
    }

    pub fn is_done(&self) -> bool {
        matches!(*self.state.borrow(), TaskState::Done(_))
    }

    pub fn state_name(&self) -> &'static str {
        match *self.state.borrow() {
            TaskState::Pending { .. } => "pending",
            TaskState::Running => "running",
            TaskState::Done(Ok(_)) => "fulfilled",
            TaskState::Done(Err(_)) => "rejected",
        }
    }

    /// Run the task if it has not run yet, then return its result
    pub fn start(self: &Rc<Self>, interpreter: &mut Interpreter) -> Result<Value, RuntimeError> {
        let state = std::mem::replace(&mut *self.state.borrow_mut(), TaskState::Running);
        match state {
            TaskState::Pending {
                closure,
                args,
                this,
            } => {
                log::trace!("task #{} ({}) started", self.id, self.name);
                let result = interpreter.invoke_closure(&closure, args, this);
                *self.state.borrow_mut() = TaskState::Done(result.clone());
                log::trace!("task #{} ({}) finished", self.id, self.name);
                result
            }
            TaskState::Running => Err(RuntimeError::function_call(format!(
                "Task '{}' cannot await itself",
                self.name
            ))),
            TaskState::Done(result) => {
                *self.state.borrow_mut() = TaskState::Done(result.clone());
                result
            }
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task#{}({}, {})", self.id, self.name, self.state_name())
    }
}

/// FIFO of tasks created by async calls
#[derive(Debug, Default)]
pub struct TaskQueue {
    queue: VecDeque<Rc<Task>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        TaskQueue::default()
    }

    pub fn push(&mut self, task: Rc<Task>) {
        log::trace!("task #{} ({}) enqueued", task.id(), task.name());
        self.queue.push_back(task);
    }

    pub fn pop(&mut self) -> Option<Rc<Task>> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Per-run execution state threaded through evaluation
#[derive(Debug)]
pub struct Runtime {
    pub tasks: TaskQueue,
    pub call_depth: usize,
    pub max_call_depth: usize,
}

impl Runtime {
    pub fn new(max_call_depth: usize) -> Self {
        Runtime {
            tasks: TaskQueue::new(),
            call_depth: 0,
            max_call_depth,
        }
    }

    /// Account for one more nested call
    pub fn enter_call(&mut self) -> Result<(), RuntimeError> {
        if self.call_depth >= self.max_call_depth {
            return Err(RuntimeError::function_call(
                "Maximum call stack size exceeded",
            ));
        }
        self.call_depth += 1;
        Ok(())
    }

    pub fn exit_call(&mut self) {
        self.call_depth = self.call_depth.saturating_sub(1);
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Runtime::new(DEFAULT_MAX_CALL_DEPTH)
    }
}

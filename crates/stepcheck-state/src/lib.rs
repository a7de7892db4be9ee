//! Execution state model for the stepcheck model checker.
//!
//! Everything the search engine snapshots and restores lives here: threads and
//! their call stacks, the heap object graph, per-object monitor records and the
//! global roots. The types are plain values; cloning an [`ExecutionState`] is a
//! structural copy, which is what the backtracking stack stores.

pub mod class;
pub mod error;
pub mod exec;
pub mod heap;
pub mod ids;
pub mod lock;
pub mod thread;
pub mod value;

pub use class::{ClassInfo, ClassKind, ClassTable, FieldInfo, FieldKind};
pub use error::{StateError, StateResult};
pub use exec::ExecutionState;
pub use heap::{ArrayData, HeapObject, ObjectBody};
pub use ids::{ClassId, ObjectId, ThreadId};
pub use lock::{LockError, LockOp, LockState};
pub use thread::{Frame, ThreadState, ThreadStatus, ThreadTable};
pub use value::{Primitive, PrimitiveKind, Slot};

//! The execution state snapshot.

use crate::class::{ClassKind, ClassTable, FieldKind};
use crate::error::{StateError, StateResult};
use crate::heap::{ArrayData, HeapObject, ObjectBody};
use crate::ids::{ClassId, ObjectId, ThreadId};
use crate::lock::LockState;
use crate::thread::{ThreadState, ThreadStatus, ThreadTable};
use crate::value::Slot;
use std::collections::BTreeMap;
use std::fmt;

/// Everything that identifies a point in the checked program's execution.
///
/// Cloning is a structural copy. The search driver pushes clones onto its
/// backtracking stack and treats them as immutable.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecutionState {
    pub threads: ThreadTable,
    pub heap: BTreeMap<ObjectId, HeapObject>,
    /// Monitor records, created on first synchronization use.
    pub locks: BTreeMap<ObjectId, LockState>,
    /// Additional roots (static fields), keyed by name.
    pub globals: BTreeMap<String, Slot>,
    /// Thread suspended mid-instruction on a data choice.
    pub active: Option<ThreadId>,
    next_object: u32,
}

impl ExecutionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a runnable thread with the next free id.
    pub fn add_thread(&mut self, name: impl Into<String>) -> ThreadId {
        let id = ThreadId(self.threads.len() as u32);
        self.threads.insert(id, ThreadState::new(id, name));
        id
    }

    pub fn thread(&self, id: ThreadId) -> StateResult<&ThreadState> {
        self.threads
            .get(&id)
            .ok_or(StateError::UnknownThread { thread: id })
    }

    pub fn thread_mut(&mut self, id: ThreadId) -> StateResult<&mut ThreadState> {
        self.threads
            .get_mut(&id)
            .ok_or(StateError::UnknownThread { thread: id })
    }

    fn next_id(&mut self) -> ObjectId {
        let id = ObjectId(self.next_object);
        self.next_object += 1;
        id
    }

    /// Allocate a default-initialized instance of `class`.
    pub fn alloc_object(&mut self, classes: &ClassTable, class: ClassId) -> StateResult<ObjectId> {
        let info = classes.require(class)?;
        if info.is_array() {
            return Err(StateError::ArrayClass {
                name: info.name.clone(),
            });
        }
        let slots = classes.new_instance_slots(class)?;
        let id = self.next_id();
        self.heap.insert(id, HeapObject::instance(class, slots));
        Ok(id)
    }

    pub fn alloc_array(&mut self, class: ClassId, data: ArrayData) -> ObjectId {
        let id = self.next_id();
        self.heap.insert(id, HeapObject::array(class, data));
        id
    }

    pub fn object(&self, id: ObjectId) -> Option<&HeapObject> {
        self.heap.get(&id)
    }

    pub fn object_mut(&mut self, id: ObjectId) -> Option<&mut HeapObject> {
        self.heap.get_mut(&id)
    }

    pub fn lock(&self, id: ObjectId) -> Option<&LockState> {
        self.locks.get(&id)
    }

    /// The monitor of `id`, created unlocked on first use.
    pub fn lock_mut(&mut self, id: ObjectId) -> StateResult<&mut LockState> {
        if !self.heap.contains_key(&id) {
            return Err(StateError::MissingObject {
                object: id,
                referrer: "monitor".to_string(),
            });
        }
        Ok(self.locks.entry(id).or_default())
    }

    pub fn field(&self, object: ObjectId, slot: usize) -> StateResult<&Slot> {
        let obj = self.object(object).ok_or_else(|| StateError::MissingObject {
            object,
            referrer: "field read".to_string(),
        })?;
        obj.fields()
            .and_then(|f| f.get(slot))
            .ok_or(StateError::NotAnInstance { object })
    }

    pub fn set_field(&mut self, object: ObjectId, slot: usize, value: Slot) -> StateResult<()> {
        let obj = self
            .object_mut(object)
            .ok_or_else(|| StateError::MissingObject {
                object,
                referrer: "field write".to_string(),
            })?;
        let target = obj
            .fields_mut()
            .and_then(|f| f.get_mut(slot))
            .ok_or(StateError::NotAnInstance { object })?;
        *target = value;
        Ok(())
    }

    /// Schedulable threads, ascending by id.
    pub fn runnable_threads(&self) -> Vec<ThreadId> {
        self.threads
            .values()
            .filter(|t| t.is_runnable())
            .map(|t| t.id)
            .collect()
    }

    pub fn live_threads(&self) -> impl Iterator<Item = &ThreadState> {
        self.threads.values().filter(|t| t.is_alive())
    }

    pub fn all_terminated(&self) -> bool {
        self.live_threads().next().is_none()
    }

    /// Blocked or waiting threads, ascending by id.
    pub fn deadlock_candidates(&self) -> Vec<ThreadId> {
        self.threads
            .values()
            .filter(|t| t.is_blocked() || t.is_waiting())
            .map(|t| t.id)
            .collect()
    }

    /// Number of threads parked on some monitor.
    pub fn num_blocked_or_waiting(&self) -> usize {
        self.locks
            .iter()
            .map(|(obj, lock)| lock.num_blocked_or_waiting(*obj, &self.threads))
            .sum()
    }

    /// Live threads remain, none can run, and no blocked thread could enter
    /// the monitor it is blocked on.
    pub fn is_deadlocked(&self) -> bool {
        let mut live = false;
        for t in self.live_threads() {
            live = true;
            match t.status {
                ThreadStatus::Blocked { on } => {
                    if self.locks.get(&on).map_or(true, |l| l.can_lock(t.id)) {
                        return false;
                    }
                }
                ThreadStatus::Waiting { .. } => {}
                _ => return false,
            }
        }
        live
    }

    /// Check that the snapshot is internally consistent: every reference
    /// resolves, field counts match class layouts, lock records satisfy
    /// their invariants and only name known threads.
    pub fn validate(&self, classes: &ClassTable) -> StateResult<()> {
        for (id, obj) in &self.heap {
            let info = classes.require(obj.class)?;
            match (&obj.body, &info.kind) {
                (ObjectBody::Fields(fields), ClassKind::Instance) => {
                    if fields.len() != info.instance_size() {
                        return Err(StateError::LayoutMismatch {
                            object: *id,
                            class: info.name.clone(),
                            expected: info.instance_size(),
                            found: fields.len(),
                        });
                    }
                }
                (ObjectBody::Array(data), ClassKind::Array(elem)) => {
                    let matches = matches!(
                        (data, elem),
                        (ArrayData::Reference(_), FieldKind::Reference)
                            | (ArrayData::Primitive(_), FieldKind::Primitive(_))
                            | (ArrayData::Primitive(_), FieldKind::Extension(_))
                    );
                    if !matches {
                        return Err(StateError::NotAnArray { object: *id });
                    }
                }
                (ObjectBody::Fields(_), ClassKind::Array(_)) => {
                    return Err(StateError::NotAnInstance { object: *id })
                }
                (ObjectBody::Array(_), ClassKind::Instance) => {
                    return Err(StateError::NotAnArray { object: *id })
                }
            }
            for r in obj.references() {
                self.check_ref(Some(r), || id.to_string())?;
            }
        }

        for t in self.threads.values() {
            if let Some(on) = t.status.lock_target() {
                self.check_ref(Some(on), || format!("status of {}", t.id))?;
            }
            for frame in &t.frames {
                for local in &frame.locals {
                    self.check_ref(local.as_reference().flatten(), || {
                        format!("{} in {}", t.id, frame.method)
                    })?;
                }
            }
        }

        for (name, slot) in &self.globals {
            self.check_ref(slot.as_reference().flatten(), || format!("global '{}'", name))?;
        }

        if let Some(active) = self.active {
            self.thread(active)?;
        }

        for (obj, lock) in &self.locks {
            self.check_ref(Some(*obj), || "lock table".to_string())?;
            lock.check_invariants()
                .map_err(|reason| StateError::CorruptLock {
                    object: *obj,
                    reason,
                })?;
            for t in lock.owner().iter().chain(lock.waiters()) {
                if !self.threads.contains_key(t) {
                    return Err(StateError::CorruptLock {
                        object: *obj,
                        reason: format!("names unknown thread {}", t),
                    });
                }
            }
        }
        Ok(())
    }

    fn check_ref(&self, r: Option<ObjectId>, referrer: impl FnOnce() -> String) -> StateResult<()> {
        match r {
            Some(id) if !self.heap.contains_key(&id) => Err(StateError::MissingObject {
                object: id,
                referrer: referrer(),
            }),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for t in self.threads.values() {
            write!(f, "{} {} [{}]", t.id, t.name, t.status)?;
            if let Some(frame) = t.top_frame() {
                write!(f, " {}@{}", frame.method, frame.pc)?;
            }
            if self.active == Some(t.id) {
                f.write_str(" (active)")?;
            }
            writeln!(f)?;
        }
        for (name, slot) in &self.globals {
            writeln!(f, "{} = {}", name, slot)?;
        }
        for (id, obj) in &self.heap {
            write!(f, "{}: {}", id, obj.class)?;
            match &obj.body {
                ObjectBody::Fields(fields) => {
                    f.write_str(" {")?;
                    for (i, s) in fields.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{}", s)?;
                    }
                    f.write_str("}")?;
                }
                ObjectBody::Array(data) => write!(f, " [len {}]", data.len())?,
            }
            if let Some(lock) = self.locks.get(id).filter(|l| !l.is_trivial()) {
                write!(f, " ({})", lock)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::FieldInfo;
    use crate::value::PrimitiveKind;

    fn setup() -> (ClassTable, ClassId) {
        let mut classes = ClassTable::new();
        let node = classes
            .define_class(
                "Node",
                None,
                vec![
                    FieldInfo::primitive("value", PrimitiveKind::Int),
                    FieldInfo::reference("next"),
                ],
            )
            .unwrap();
        (classes, node)
    }

    #[test]
    fn test_alloc_and_fields() {
        let (classes, node) = setup();
        let mut s = ExecutionState::new();
        let a = s.alloc_object(&classes, node).unwrap();
        let b = s.alloc_object(&classes, node).unwrap();
        assert_ne!(a, b);
        s.set_field(a, 1, Slot::object(b)).unwrap();
        assert_eq!(s.field(a, 1).unwrap(), &Slot::object(b));
        assert!(s.validate(&classes).is_ok());
    }

    #[test]
    fn test_validate_dangling_reference() {
        let (classes, node) = setup();
        let mut s = ExecutionState::new();
        let a = s.alloc_object(&classes, node).unwrap();
        s.set_field(a, 1, Slot::object(ObjectId(42))).unwrap();
        assert!(matches!(
            s.validate(&classes),
            Err(StateError::MissingObject { object: ObjectId(42), .. })
        ));
    }

    #[test]
    fn test_validate_lock_with_unknown_thread() {
        let (classes, node) = setup();
        let mut s = ExecutionState::new();
        let a = s.alloc_object(&classes, node).unwrap();
        s.lock_mut(a).unwrap().acquire(ThreadId(7)).unwrap();
        assert!(matches!(
            s.validate(&classes),
            Err(StateError::CorruptLock { .. })
        ));
    }

    #[test]
    fn test_lock_requires_object() {
        let mut s = ExecutionState::new();
        assert!(s.lock_mut(ObjectId(0)).is_err());
    }

    #[test]
    fn test_deadlock_detection() {
        let (classes, node) = setup();
        let mut s = ExecutionState::new();
        let t0 = s.add_thread("a");
        let t1 = s.add_thread("b");
        let l0 = s.alloc_object(&classes, node).unwrap();
        let l1 = s.alloc_object(&classes, node).unwrap();
        s.lock_mut(l0).unwrap().acquire(t0).unwrap();
        s.lock_mut(l1).unwrap().acquire(t1).unwrap();
        assert!(!s.is_deadlocked());

        s.thread_mut(t0).unwrap().status = ThreadStatus::Blocked { on: l1 };
        s.lock_mut(l1).unwrap().add_waiter(t0);
        assert!(!s.is_deadlocked());

        s.thread_mut(t1).unwrap().status = ThreadStatus::Blocked { on: l0 };
        s.lock_mut(l0).unwrap().add_waiter(t1);
        assert!(s.is_deadlocked());
        assert_eq!(s.deadlock_candidates(), vec![t0, t1]);
        assert_eq!(s.num_blocked_or_waiting(), 2);
        assert!(s.runnable_threads().is_empty());
        assert!(s.validate(&classes).is_ok());
    }

    #[test]
    fn test_all_terminated_is_not_deadlock() {
        let mut s = ExecutionState::new();
        let t = s.add_thread("main");
        s.thread_mut(t).unwrap().terminate();
        assert!(s.all_terminated());
        assert!(!s.is_deadlocked());
    }
}

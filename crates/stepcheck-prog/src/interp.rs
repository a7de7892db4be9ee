//! The program interpreter.
//!
//! A transition runs the scheduled thread until it is about to execute its
//! next scheduling point, finishes, blocks, or reaches a data choice. Data
//! choices and the choice of which waiter a `notify` wakes suspend the thread
//! mid-op with [`ExecutionState::active`] set; the following step resolves the
//! choice and lets the same thread run on.
//!
//! Monitor protocol:
//! - `lock` on a monitor held by another thread parks the thread as
//!   `Blocked` (and a waiter) with its pc still on the `lock`.
//! - `wait` releases the whole hold count into `saved_lock_count` and parks
//!   the thread as `Waiting`.
//! - `notify` turns a `Waiting` thread into `Notified`. Once scheduled, a
//!   notified thread re-enters the monitor with its saved count, or blocks if
//!   the monitor is taken.
//! - Fully releasing a monitor wakes every thread blocked on it.

use crate::error::{InterpError, InterpResult, ProgramError};
use crate::program::{Cond, GlobalInit, Op, Operand, Program};
use stepcheck_mc::{Choice, ChoiceGenerator, Interpreter, StepOutcome, Violation, ViolationKind};
use stepcheck_state::{
    ClassId, ClassTable, ExecutionState, FieldKind, Frame, LockError, ObjectId, Primitive, Slot,
    StateError, ThreadId, ThreadStatus,
};
use tracing::{debug, trace};

/// Ops one call to `step` may run before it returns `Continued`.
pub const DEFAULT_OP_BUDGET: usize = 10_000;

/// How one op left the running thread.
enum Flow {
    Next,
    Choice(ChoiceGenerator),
}

/// Why an op ended the transition early.
enum Halt {
    Violation(Violation),
    Error(InterpError),
}

impl From<InterpError> for Halt {
    fn from(e: InterpError) -> Self {
        Halt::Error(e)
    }
}

impl From<StateError> for Halt {
    fn from(e: StateError) -> Self {
        Halt::Error(e.into())
    }
}

impl From<LockError> for Halt {
    fn from(e: LockError) -> Self {
        Halt::Error(e.into())
    }
}

pub struct ProgramInterpreter {
    program: Program,
    classes: ClassTable,
    state: ExecutionState,
    op_budget: usize,
    /// Thread whose transition was cut short by the op budget.
    resume: Option<ThreadId>,
}

impl ProgramInterpreter {
    pub fn new(program: Program) -> Result<Self, ProgramError> {
        program.validate()?;
        let classes = program.class_table()?;
        Ok(Self {
            program,
            classes,
            state: ExecutionState::new(),
            op_budget: DEFAULT_OP_BUDGET,
            resume: None,
        })
    }

    pub fn with_op_budget(mut self, ops: usize) -> Self {
        self.op_budget = ops.max(1);
        self
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn state(&self) -> &ExecutionState {
        &self.state
    }

    /// The state before any thread has run.
    pub fn initial_state(&self) -> InterpResult<ExecutionState> {
        let mut state = ExecutionState::new();
        for (name, init) in &self.program.globals {
            let slot = match init {
                GlobalInit::Null => Slot::NULL,
                GlobalInit::Bool(b) => Slot::boolean(*b),
                GlobalInit::Int(v) => Slot::long(*v),
                GlobalInit::Object { new } => {
                    let class = self
                        .classes
                        .lookup(new)
                        .ok_or_else(|| StateError::UnknownClassName { name: new.clone() })?;
                    Slot::object(state.alloc_object(&self.classes, class)?)
                }
            };
            state.globals.insert(name.clone(), slot);
        }
        for decl in &self.program.threads {
            let id = state.add_thread(decl.name.clone());
            let thread = state.thread_mut(id)?;
            if decl.ops.is_empty() {
                thread.terminate();
            } else {
                thread
                    .frames
                    .push(Frame::new(decl.name.clone(), vec![Slot::long(0); decl.locals]));
            }
        }
        Ok(state)
    }

    fn schedule(&self) -> StepOutcome {
        if self.state.all_terminated() {
            return StepOutcome::Terminated;
        }
        StepOutcome::ChoicePoint(ChoiceGenerator::threads(
            "schedule",
            self.state.runnable_threads(),
        ))
    }

    fn op_at(&self, thread: ThreadId) -> InterpResult<Option<Op>> {
        let pc = self.frame(thread)?.pc;
        Ok(self
            .program
            .threads
            .get(thread.index())
            .and_then(|decl| decl.ops.get(pc))
            .cloned())
    }

    fn frame(&self, thread: ThreadId) -> InterpResult<&Frame> {
        self.state
            .thread(thread)?
            .top_frame()
            .ok_or(InterpError::NoFrame { thread })
    }

    fn frame_mut(&mut self, thread: ThreadId) -> InterpResult<&mut Frame> {
        self.state
            .thread_mut(thread)?
            .top_frame_mut()
            .ok_or(InterpError::NoFrame { thread })
    }

    fn advance_pc(&mut self, thread: ThreadId) -> InterpResult<()> {
        self.frame_mut(thread)?.pc += 1;
        Ok(())
    }

    fn local(&self, thread: ThreadId, local: usize) -> InterpResult<i64> {
        self.frame(thread)?
            .locals
            .get(local)
            .and_then(Slot::as_i64)
            .ok_or(InterpError::BadLocal { thread, local })
    }

    fn set_local(&mut self, thread: ThreadId, local: usize, value: i64) -> InterpResult<()> {
        let slot = self
            .frame_mut(thread)?
            .locals
            .get_mut(local)
            .ok_or(InterpError::BadLocal { thread, local })?;
        *slot = Slot::long(value);
        Ok(())
    }

    fn operand(&self, thread: ThreadId, value: Operand) -> InterpResult<i64> {
        match value {
            Operand::Const(v) => Ok(v),
            Operand::Local { local } => self.local(thread, local),
        }
    }

    fn holds(&self, thread: ThreadId, cond: &Cond) -> InterpResult<bool> {
        Ok(cond.cmp.holds(self.local(thread, cond.local)?, cond.value))
    }

    fn global(&self, name: &str) -> InterpResult<&Slot> {
        self.state
            .globals
            .get(name)
            .ok_or_else(|| InterpError::UnknownGlobal {
                name: name.to_string(),
            })
    }

    /// The object a global refers to, or a null-dereference violation.
    fn target(&self, name: &str, action: &str) -> Result<ObjectId, Halt> {
        match self.global(name)? {
            Slot::Ref(Some(obj)) => Ok(*obj),
            Slot::Ref(None) => Err(Halt::Violation(Violation::new(
                ViolationKind::NullDereference,
                format!("{} on null global '{}'", action, name),
            ))),
            Slot::Prim(_) => Err(InterpError::NotAReference {
                name: name.to_string(),
            }
            .into()),
        }
    }

    /// Fails unless `thread` owns the monitor of `obj`.
    fn check_owner(&self, thread: ThreadId, obj: ObjectId, action: &str) -> Result<(), Halt> {
        let owner = self.state.lock(obj).and_then(|l| l.owner());
        if owner == Some(thread) {
            return Ok(());
        }
        Err(Halt::Violation(Violation::new(
            ViolationKind::IllegalMonitorState,
            format!("{} {} on {} without owning its monitor", thread, action, obj),
        )))
    }

    fn class_of(&self, obj: ObjectId) -> InterpResult<ClassId> {
        self.state.object(obj).map(|o| o.class).ok_or_else(|| {
            StateError::MissingObject {
                object: obj,
                referrer: "a global root".to_string(),
            }
            .into()
        })
    }

    /// Wake every thread blocked on `obj`. Threads that blocked while
    /// re-entering after `wait` go back to `Notified`.
    fn wake_blocked(&mut self, obj: ObjectId) -> InterpResult<()> {
        let blocked = match self.state.lock(obj) {
            Some(lock) => lock.blocked_threads(obj, &self.state.threads),
            None => return Ok(()),
        };
        for t in blocked {
            self.state.lock_mut(obj)?.remove_waiter(t);
            let thread = self.state.thread_mut(t)?;
            thread.status = if thread.saved_lock_count > 0 {
                ThreadStatus::Notified { on: obj }
            } else {
                ThreadStatus::Runnable
            };
            trace!(thread = %t, object = %obj, "woken");
        }
        Ok(())
    }

    fn notify_one(&mut self, obj: ObjectId, waiter: ThreadId) -> InterpResult<()> {
        self.state.lock_mut(obj)?.remove_waiter(waiter);
        self.state.thread_mut(waiter)?.status = ThreadStatus::Notified { on: obj };
        Ok(())
    }

    /// Re-enter the monitor a notified thread waited on.
    fn reenter(&mut self, thread: ThreadId, obj: ObjectId) -> InterpResult<()> {
        let saved = self.state.thread(thread)?.saved_lock_count;
        let lock = self.state.lock_mut(obj)?;
        if lock.is_locked() {
            lock.add_waiter(thread);
            self.state.thread_mut(thread)?.status = ThreadStatus::Blocked { on: obj };
            return Ok(());
        }
        lock.reacquire(thread, saved)?;
        let t = self.state.thread_mut(thread)?;
        t.status = ThreadStatus::Runnable;
        t.saved_lock_count = 0;
        Ok(())
    }

    /// Run `thread` until its next scheduling point. The first op always runs
    /// when `first` is set.
    fn run(&mut self, thread: ThreadId, mut first: bool) -> InterpResult<StepOutcome> {
        if first {
            if let ThreadStatus::Notified { on } = self.state.thread(thread)?.status {
                self.reenter(thread, on)?;
                first = false;
            }
        }
        let mut ops = 0;
        loop {
            if !self.state.thread(thread)?.is_runnable() {
                break;
            }
            let Some(op) = self.op_at(thread)? else {
                debug!(thread = %thread, "thread finished");
                self.state.thread_mut(thread)?.terminate();
                break;
            };
            if op.is_scheduling_point() && !first {
                break;
            }
            if ops == self.op_budget {
                self.resume = Some(thread);
                return Ok(StepOutcome::Continued);
            }
            ops += 1;
            first = false;
            match self.exec(thread, &op) {
                Ok(Flow::Next) => {}
                Ok(Flow::Choice(generator)) => {
                    self.state.active = Some(thread);
                    return Ok(StepOutcome::ChoicePoint(generator));
                }
                Err(Halt::Violation(v)) => return Ok(StepOutcome::PropertyViolated(v)),
                Err(Halt::Error(e)) => return Err(e),
            }
        }
        Ok(self.schedule())
    }

    fn exec(&mut self, thread: ThreadId, op: &Op) -> Result<Flow, Halt> {
        trace!(thread = %thread, ?op, "exec");
        match op {
            Op::Lock { target } => {
                let obj = self.target(target, "lock")?;
                let lock = self.state.lock_mut(obj)?;
                if lock.can_lock(thread) {
                    lock.acquire(thread)?;
                    self.advance_pc(thread)?;
                } else {
                    lock.add_waiter(thread);
                    self.state.thread_mut(thread)?.status = ThreadStatus::Blocked { on: obj };
                    trace!(thread = %thread, object = %obj, "blocked");
                }
            }
            Op::Unlock { target } => {
                let obj = self.target(target, "unlock")?;
                self.check_owner(thread, obj, "unlock")?;
                let lock = self.state.lock_mut(obj)?;
                lock.release(thread)?;
                if !lock.is_locked() {
                    self.wake_blocked(obj)?;
                }
                self.advance_pc(thread)?;
            }
            Op::Wait { target } => {
                let obj = self.target(target, "wait")?;
                self.check_owner(thread, obj, "wait")?;
                let lock = self.state.lock_mut(obj)?;
                let count = lock.release_all(thread)?;
                lock.add_waiter(thread);
                self.advance_pc(thread)?;
                let t = self.state.thread_mut(thread)?;
                t.saved_lock_count = count;
                t.status = ThreadStatus::Waiting { on: obj };
                self.wake_blocked(obj)?;
            }
            Op::Notify { target } => {
                let obj = self.target(target, "notify")?;
                self.check_owner(thread, obj, "notify")?;
                let waiting = self.waiting_on(obj);
                match waiting.len() {
                    0 => self.advance_pc(thread)?,
                    1 => {
                        self.notify_one(obj, waiting[0])?;
                        self.advance_pc(thread)?;
                    }
                    _ => return Ok(Flow::Choice(ChoiceGenerator::threads("notify", waiting))),
                }
            }
            Op::NotifyAll { target } => {
                let obj = self.target(target, "notify_all")?;
                self.check_owner(thread, obj, "notify_all")?;
                for w in self.waiting_on(obj) {
                    self.notify_one(obj, w)?;
                }
                self.advance_pc(thread)?;
            }
            Op::Read {
                target,
                field,
                local,
            } => {
                let obj = self.target(target, "read")?;
                let class = self.class_of(obj)?;
                let (slot, _) = self.classes.resolve_field(class, field)?;
                let value = self.state.field(obj, slot)?.as_i64().ok_or_else(|| {
                    InterpError::NotAPrimitiveField {
                        class: self.class_name(class),
                        field: field.clone(),
                    }
                })?;
                self.set_local(thread, *local, value)?;
                self.advance_pc(thread)?;
            }
            Op::Write {
                target,
                field,
                value,
            } => {
                let obj = self.target(target, "write")?;
                let v = self.operand(thread, *value)?;
                let class = self.class_of(obj)?;
                let (slot, info) = self.classes.resolve_field(class, field)?;
                let FieldKind::Primitive(kind) = info.kind else {
                    return Err(InterpError::NotAPrimitiveField {
                        class: self.class_name(class),
                        field: field.clone(),
                    }
                    .into());
                };
                self.state
                    .set_field(obj, slot, Slot::Prim(Primitive::from_i64(kind, v)))?;
                self.advance_pc(thread)?;
            }
            Op::New { class, global } => {
                let id = self
                    .classes
                    .lookup(class)
                    .ok_or_else(|| StateError::UnknownClassName { name: class.clone() })?;
                let obj = self.state.alloc_object(&self.classes, id)?;
                self.state.globals.insert(global.clone(), Slot::object(obj));
                self.advance_pc(thread)?;
            }
            Op::Load { global, local } => {
                let value = self.global(global)?.as_i64().ok_or_else(|| {
                    InterpError::NotAPrimitive {
                        name: global.clone(),
                    }
                })?;
                self.set_local(thread, *local, value)?;
                self.advance_pc(thread)?;
            }
            Op::Store { global, value } => {
                let v = self.operand(thread, *value)?;
                let kind = match self.global(global)? {
                    Slot::Prim(p) => p.kind(),
                    Slot::Ref(_) => None,
                }
                .ok_or_else(|| InterpError::NotAPrimitive {
                    name: global.clone(),
                })?;
                self.state
                    .globals
                    .insert(global.clone(), Slot::Prim(Primitive::from_i64(kind, v)));
                self.advance_pc(thread)?;
            }
            Op::Set { local, value } => {
                let v = self.operand(thread, *value)?;
                self.set_local(thread, *local, v)?;
                self.advance_pc(thread)?;
            }
            Op::Add { local, value } => {
                let v = self.operand(thread, *value)?;
                let current = self.local(thread, *local)?;
                self.set_local(thread, *local, current.wrapping_add(v))?;
                self.advance_pc(thread)?;
            }
            Op::ChooseBool { .. } => {
                let label = self.choice_label(thread)?;
                return Ok(Flow::Choice(ChoiceGenerator::bools(label)));
            }
            Op::ChooseInt { min, max, .. } => {
                let label = self.choice_label(thread)?;
                return Ok(Flow::Choice(ChoiceGenerator::int_range(label, *min, *max)));
            }
            Op::Jump { to, when } => {
                let taken = match when {
                    Some(cond) => self.holds(thread, cond)?,
                    None => true,
                };
                if taken {
                    self.frame_mut(thread)?.pc = *to;
                } else {
                    self.advance_pc(thread)?;
                }
            }
            Op::Assert { cond, message } => {
                if !self.holds(thread, cond)? {
                    let message = match message {
                        Some(m) => m.clone(),
                        None => format!("{} in {}", cond, thread),
                    };
                    return Err(Halt::Violation(Violation::new(
                        ViolationKind::AssertionFailed,
                        message,
                    )));
                }
                self.advance_pc(thread)?;
            }
            Op::Yield => self.advance_pc(thread)?,
        }
        Ok(Flow::Next)
    }

    fn waiting_on(&self, obj: ObjectId) -> Vec<ThreadId> {
        self.state
            .lock(obj)
            .map(|l| l.waiting_threads(obj, &self.state.threads))
            .unwrap_or_default()
    }

    fn class_name(&self, class: ClassId) -> String {
        self.classes
            .get(class)
            .map_or_else(|| class.to_string(), |c| c.name.clone())
    }

    fn choice_label(&self, thread: ThreadId) -> InterpResult<String> {
        let name = &self.state.thread(thread)?.name;
        Ok(format!("{}@{}", name, self.frame(thread)?.pc))
    }

    /// Complete the op `thread` is suspended in with `choice`.
    fn resolve_pending(&mut self, thread: ThreadId, choice: &Choice) -> InterpResult<StepOutcome> {
        let unexpected = |reason: &str| InterpError::UnexpectedChoice {
            choice: *choice,
            reason: reason.to_string(),
        };
        let op = self
            .op_at(thread)?
            .ok_or_else(|| unexpected("suspended thread has no pending op"))?;
        match (&op, choice) {
            (Op::ChooseBool { local }, Choice::Bool(b)) => {
                self.set_local(thread, *local, i64::from(*b))?;
            }
            (Op::ChooseInt { local, min, max }, Choice::Int(v)) if (*min..=*max).contains(v) => {
                self.set_local(thread, *local, *v)?;
            }
            (Op::Notify { target }, Choice::Thread(waiter)) => {
                let obj = match self.target(target, "notify") {
                    Ok(obj) => obj,
                    Err(Halt::Violation(v)) => return Ok(StepOutcome::PropertyViolated(v)),
                    Err(Halt::Error(e)) => return Err(e),
                };
                if self.state.thread(*waiter)?.status != (ThreadStatus::Waiting { on: obj }) {
                    return Err(unexpected("not waiting on the notified monitor"));
                }
                self.notify_one(obj, *waiter)?;
            }
            _ => return Err(unexpected("does not match the pending op")),
        }
        self.state.active = None;
        self.advance_pc(thread)?;
        self.run(thread, false)
    }
}

impl Interpreter for ProgramInterpreter {
    type Error = InterpError;

    fn classes(&self) -> &ClassTable {
        &self.classes
    }

    fn start(&mut self) -> InterpResult<StepOutcome> {
        self.state = self.initial_state()?;
        self.resume = None;
        Ok(self.schedule())
    }

    fn step(&mut self, choice: &Choice) -> InterpResult<StepOutcome> {
        if let Some(thread) = self.resume.take() {
            return self.run(thread, false);
        }
        if let Some(thread) = self.state.active {
            return self.resolve_pending(thread, choice);
        }
        let thread = choice.as_thread().ok_or_else(|| InterpError::UnexpectedChoice {
            choice: *choice,
            reason: "no thread is suspended on a data choice".to_string(),
        })?;
        if !self.state.thread(thread)?.is_runnable() {
            return Err(InterpError::UnexpectedChoice {
                choice: *choice,
                reason: "thread is not runnable".to_string(),
            });
        }
        self.run(thread, true)
    }

    fn capture_state(&self) -> ExecutionState {
        self.state.clone()
    }

    fn restore_state(&mut self, state: &ExecutionState) -> InterpResult<()> {
        self.state = state.clone();
        self.resume = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interp(src: &str) -> ProgramInterpreter {
        ProgramInterpreter::new(Program::from_json(src).unwrap()).unwrap()
    }

    fn schedule(outcome: &StepOutcome) -> Vec<Choice> {
        match outcome {
            StepOutcome::ChoicePoint(g) => (0..g.total().unwrap())
                .filter_map(|i| g.alternative(i))
                .collect(),
            other => panic!("expected a choice point, got {other:?}"),
        }
    }

    const TWO_LOCKERS: &str = r#"{
        "classes": [{ "name": "Mutex" }],
        "globals": { "m": { "new": "Mutex" } },
        "threads": [
            { "name": "a", "ops": [{ "op": "lock", "target": "m" }, { "op": "unlock", "target": "m" }] },
            { "name": "b", "ops": [{ "op": "lock", "target": "m" }, { "op": "unlock", "target": "m" }] }
        ]
    }"#;

    #[test]
    fn test_start_offers_all_threads() {
        let mut i = interp(TWO_LOCKERS);
        let out = i.start().unwrap();
        assert_eq!(
            schedule(&out),
            vec![Choice::Thread(ThreadId(0)), Choice::Thread(ThreadId(1))]
        );
        assert_eq!(i.state().heap.len(), 1);
    }

    #[test]
    fn test_contended_lock_blocks_and_wakes() {
        let mut i = interp(TWO_LOCKERS);
        i.start().unwrap();
        let obj = ObjectId(0);
        i.step(&Choice::Thread(ThreadId(0))).unwrap();
        assert_eq!(i.state().lock(obj).unwrap().owner(), Some(ThreadId(0)));

        let out = i.step(&Choice::Thread(ThreadId(1))).unwrap();
        assert_eq!(
            i.state().thread(ThreadId(1)).unwrap().status,
            ThreadStatus::Blocked { on: obj }
        );
        assert_eq!(schedule(&out), vec![Choice::Thread(ThreadId(0))]);

        // Releasing wakes b; a then finishes in the same transition.
        let out = i.step(&Choice::Thread(ThreadId(0))).unwrap();
        assert_eq!(schedule(&out), vec![Choice::Thread(ThreadId(1))]);
        assert!(!i.state().lock(obj).unwrap().has_waiters());
        assert_eq!(
            i.state().thread(ThreadId(0)).unwrap().status,
            ThreadStatus::Terminated
        );
    }

    #[test]
    fn test_unlock_without_owning_is_violation() {
        let mut i = interp(
            r#"{
            "classes": [{ "name": "Mutex" }],
            "globals": { "m": { "new": "Mutex" } },
            "threads": [{ "name": "a", "ops": [{ "op": "unlock", "target": "m" }] }]
        }"#,
        );
        i.start().unwrap();
        match i.step(&Choice::Thread(ThreadId(0))).unwrap() {
            StepOutcome::PropertyViolated(v) => {
                assert_eq!(v.kind, ViolationKind::IllegalMonitorState)
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_null_target_is_violation() {
        let mut i = interp(
            r#"{
            "globals": { "m": null },
            "threads": [{ "name": "a", "ops": [{ "op": "lock", "target": "m" }] }]
        }"#,
        );
        i.start().unwrap();
        match i.step(&Choice::Thread(ThreadId(0))).unwrap() {
            StepOutcome::PropertyViolated(v) => assert_eq!(v.kind, ViolationKind::NullDereference),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_wait_notify_round_trip() {
        let mut i = interp(
            r#"{
            "classes": [{ "name": "Cond" }],
            "globals": { "c": { "new": "Cond" } },
            "threads": [
                { "name": "waiter", "ops": [
                    { "op": "lock", "target": "c" },
                    { "op": "lock", "target": "c" },
                    { "op": "wait", "target": "c" },
                    { "op": "unlock", "target": "c" },
                    { "op": "unlock", "target": "c" }
                ] },
                { "name": "notifier", "ops": [
                    { "op": "lock", "target": "c" },
                    { "op": "notify", "target": "c" },
                    { "op": "unlock", "target": "c" }
                ] }
            ]
        }"#,
        );
        let (w, n, c) = (ThreadId(0), ThreadId(1), ObjectId(0));
        i.start().unwrap();
        i.step(&Choice::Thread(w)).unwrap();
        i.step(&Choice::Thread(w)).unwrap();
        i.step(&Choice::Thread(w)).unwrap();
        let t = i.state().thread(w).unwrap();
        assert_eq!(t.status, ThreadStatus::Waiting { on: c });
        assert_eq!(t.saved_lock_count, 2);
        assert!(!i.state().lock(c).unwrap().is_locked());

        i.step(&Choice::Thread(n)).unwrap();
        i.step(&Choice::Thread(n)).unwrap();
        assert_eq!(
            i.state().thread(w).unwrap().status,
            ThreadStatus::Notified { on: c }
        );

        // The notifier still holds the monitor, so re-entry blocks.
        i.step(&Choice::Thread(w)).unwrap();
        assert_eq!(
            i.state().thread(w).unwrap().status,
            ThreadStatus::Blocked { on: c }
        );

        i.step(&Choice::Thread(n)).unwrap();
        assert_eq!(
            i.state().thread(w).unwrap().status,
            ThreadStatus::Notified { on: c }
        );

        i.step(&Choice::Thread(w)).unwrap();
        let lock = i.state().lock(c).unwrap();
        assert_eq!(lock.owner(), Some(w));
        assert_eq!(lock.hold_count(), 2);
        assert_eq!(i.state().thread(w).unwrap().saved_lock_count, 0);
    }

    #[test]
    fn test_notify_picks_among_waiters() {
        let waiter = r#"{ "name": "NAME", "ops": [
            { "op": "lock", "target": "c" },
            { "op": "wait", "target": "c" },
            { "op": "unlock", "target": "c" }
        ] }"#;
        let src = format!(
            r#"{{
            "classes": [{{ "name": "Cond" }}],
            "globals": {{ "c": {{ "new": "Cond" }} }},
            "threads": [{}, {}, {{ "name": "n", "ops": [
                {{ "op": "lock", "target": "c" }},
                {{ "op": "notify", "target": "c" }},
                {{ "op": "unlock", "target": "c" }}
            ] }}]
        }}"#,
            waiter.replace("NAME", "w0"),
            waiter.replace("NAME", "w1")
        );
        let mut i = interp(&src);
        i.start().unwrap();
        for t in [0, 0, 1, 1, 2] {
            i.step(&Choice::Thread(ThreadId(t))).unwrap();
        }
        let out = i.step(&Choice::Thread(ThreadId(2))).unwrap();
        assert_eq!(
            schedule(&out),
            vec![Choice::Thread(ThreadId(0)), Choice::Thread(ThreadId(1))]
        );
        assert_eq!(i.state().active, Some(ThreadId(2)));

        i.step(&Choice::Thread(ThreadId(1))).unwrap();
        assert_eq!(i.state().active, None);
        assert!(i.state().thread(ThreadId(1)).unwrap().is_runnable());
        assert!(i.state().thread(ThreadId(0)).unwrap().is_waiting());
    }

    #[test]
    fn test_data_choice_suspends_thread() {
        let mut i = interp(
            r#"{
            "threads": [{ "name": "a", "ops": [
                { "op": "choose_int", "local": 0, "min": 1, "max": 3 },
                { "op": "assert", "cond": { "local": 0, "cmp": "ne", "value": 2 }, "message": "two" }
            ] }]
        }"#,
        );
        i.start().unwrap();
        let out = i.step(&Choice::Thread(ThreadId(0))).unwrap();
        assert_eq!(
            schedule(&out),
            vec![Choice::Int(1), Choice::Int(2), Choice::Int(3)]
        );
        let snapshot = i.capture_state();

        assert!(matches!(
            i.step(&Choice::Int(1)).unwrap(),
            StepOutcome::Terminated
        ));
        i.restore_state(&snapshot).unwrap();
        match i.step(&Choice::Int(2)).unwrap() {
            StepOutcome::PropertyViolated(v) => assert_eq!(v.message, "two"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_wrong_choice_kind_is_error() {
        let mut i = interp(
            r#"{ "threads": [{ "name": "a", "ops": [{ "op": "choose_bool", "local": 0 }] }] }"#,
        );
        i.start().unwrap();
        i.step(&Choice::Thread(ThreadId(0))).unwrap();
        assert!(matches!(
            i.step(&Choice::Int(7)),
            Err(InterpError::UnexpectedChoice { .. })
        ));
    }

    #[test]
    fn test_op_budget_returns_continued() {
        let mut i = interp(
            r#"{ "threads": [{ "name": "a", "ops": [
                { "op": "add", "local": 0, "value": 1 },
                { "op": "jump", "to": 0, "when": { "local": 0, "cmp": "lt", "value": 5 } }
            ] }] }"#,
        )
        .with_op_budget(4);
        i.start().unwrap();
        let choice = Choice::Thread(ThreadId(0));
        let mut continued = 0;
        loop {
            match i.step(&choice).unwrap() {
                StepOutcome::Continued => continued += 1,
                StepOutcome::Terminated => break,
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(continued, 2);
    }

    #[test]
    fn test_shared_field_and_global_access() {
        let mut i = interp(
            r#"{
            "classes": [{ "name": "Box", "fields": [{ "name": "v", "type": "byte" }] }],
            "globals": { "b": { "new": "Box" }, "n": 0 },
            "threads": [{ "name": "a", "ops": [
                { "op": "write", "target": "b", "field": "v", "value": 300 },
                { "op": "read", "target": "b", "field": "v", "local": 1 },
                { "op": "store", "global": "n", "value": { "local": 1 } }
            ] }]
        }"#,
        );
        i.start().unwrap();
        for _ in 0..3 {
            i.step(&Choice::Thread(ThreadId(0))).unwrap();
        }
        assert_eq!(i.state().globals["n"].as_i64(), Some(44));
    }
}

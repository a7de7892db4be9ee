//! JSON program files.
//!
//! A program is a set of classes, named global roots and threads. Each thread
//! runs a flat list of ops with a fixed number of integer locals. Globals hold
//! either primitive values or references to objects allocated at start-up.
//!
//! ```json
//! {
//!   "classes": [{ "name": "Lock" }],
//!   "globals": { "a": { "new": "Lock" } },
//!   "threads": [
//!     { "name": "t0", "ops": [{ "op": "lock", "target": "a" }, { "op": "unlock", "target": "a" }] }
//!   ]
//! }
//! ```

use crate::error::ProgramError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;
use stepcheck_mc::SearchConfig;
use stepcheck_state::{ClassTable, FieldInfo, FieldKind, PrimitiveKind};

fn default_locals() -> usize {
    4
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Program {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub classes: Vec<ClassDecl>,
    #[serde(default)]
    pub globals: BTreeMap<String, GlobalInit>,
    pub threads: Vec<ThreadDecl>,
    /// Search options stored with the program; command-line flags override them.
    #[serde(default)]
    pub config: Option<SearchConfig>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassDecl {
    pub name: String,
    #[serde(default)]
    pub extends: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDecl>,
}

/// A field declaration. `ty` is a primitive kind name, `ref`, or `ext:<name>`
/// for a user-defined primitive category.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

impl FieldDecl {
    pub fn kind(&self) -> Option<FieldKind> {
        if self.ty == "ref" {
            return Some(FieldKind::Reference);
        }
        if let Some(category) = self.ty.strip_prefix("ext:") {
            return Some(FieldKind::Extension(Arc::from(category)));
        }
        PrimitiveKind::from_name(&self.ty).map(FieldKind::Primitive)
    }
}

/// Initial value of a global root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GlobalInit {
    Null,
    Bool(bool),
    Int(i64),
    Object { new: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThreadDecl {
    pub name: String,
    #[serde(default = "default_locals")]
    pub locals: usize,
    pub ops: Vec<Op>,
}

/// A constant or the value of a local.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    Const(i64),
    Local { local: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cmp {
    #[serde(rename = "eq", alias = "==")]
    Eq,
    #[serde(rename = "ne", alias = "!=")]
    Ne,
    #[serde(rename = "lt", alias = "<")]
    Lt,
    #[serde(rename = "le", alias = "<=")]
    Le,
    #[serde(rename = "gt", alias = ">")]
    Gt,
    #[serde(rename = "ge", alias = ">=")]
    Ge,
}

impl Cmp {
    pub fn holds(self, lhs: i64, rhs: i64) -> bool {
        match self {
            Cmp::Eq => lhs == rhs,
            Cmp::Ne => lhs != rhs,
            Cmp::Lt => lhs < rhs,
            Cmp::Le => lhs <= rhs,
            Cmp::Gt => lhs > rhs,
            Cmp::Ge => lhs >= rhs,
        }
    }
}

impl fmt::Display for Cmp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Cmp::Eq => "==",
            Cmp::Ne => "!=",
            Cmp::Lt => "<",
            Cmp::Le => "<=",
            Cmp::Gt => ">",
            Cmp::Ge => ">=",
        })
    }
}

/// `local <cmp> value`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Cond {
    pub local: usize,
    pub cmp: Cmp,
    pub value: i64,
}

impl fmt::Display for Cond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "local{} {} {}", self.local, self.cmp, self.value)
    }
}

/// One thread instruction. Monitor ops and shared-memory ops are scheduling
/// points; local ops run without interruption.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    Lock { target: String },
    Unlock { target: String },
    Wait { target: String },
    Notify { target: String },
    NotifyAll { target: String },
    Read { target: String, field: String, local: usize },
    Write { target: String, field: String, value: Operand },
    New { class: String, global: String },
    Load { global: String, local: usize },
    Store { global: String, value: Operand },
    Set { local: usize, value: Operand },
    Add { local: usize, value: Operand },
    ChooseBool { local: usize },
    ChooseInt { local: usize, min: i64, max: i64 },
    Jump {
        to: usize,
        #[serde(default)]
        when: Option<Cond>,
    },
    Assert {
        cond: Cond,
        #[serde(default)]
        message: Option<String>,
    },
    Yield,
}

impl Op {
    /// Ops that touch shared state. A transition stops in front of one
    /// unless it is the first op the transition runs.
    pub fn is_scheduling_point(&self) -> bool {
        matches!(
            self,
            Op::Lock { .. }
                | Op::Unlock { .. }
                | Op::Wait { .. }
                | Op::Notify { .. }
                | Op::NotifyAll { .. }
                | Op::Read { .. }
                | Op::Write { .. }
                | Op::New { .. }
                | Op::Load { .. }
                | Op::Store { .. }
                | Op::Yield
        )
    }

    /// The global root this op names, if any.
    fn global(&self) -> Option<&str> {
        match self {
            Op::Lock { target }
            | Op::Unlock { target }
            | Op::Wait { target }
            | Op::Notify { target }
            | Op::NotifyAll { target }
            | Op::Read { target, .. }
            | Op::Write { target, .. } => Some(target),
            Op::New { global, .. } | Op::Load { global, .. } | Op::Store { global, .. } => {
                Some(global)
            }
            _ => None,
        }
    }

    fn locals(&self) -> Vec<usize> {
        let operand = |v: &Operand| match v {
            Operand::Local { local } => Some(*local),
            Operand::Const(_) => None,
        };
        match self {
            Op::Read { local, .. } | Op::Load { local, .. } => vec![*local],
            Op::ChooseBool { local } | Op::ChooseInt { local, .. } => vec![*local],
            Op::Write { value, .. } | Op::Store { value, .. } => operand(value).into_iter().collect(),
            Op::Set { local, value } | Op::Add { local, value } => {
                std::iter::once(*local).chain(operand(value)).collect()
            }
            Op::Jump { when, .. } => when.iter().map(|c| c.local).collect(),
            Op::Assert { cond, .. } => vec![cond.local],
            _ => Vec::new(),
        }
    }
}

impl Program {
    /// Parse a program from JSON and check it.
    pub fn from_json(source: &str) -> Result<Self, ProgramError> {
        let program: Program = serde_json::from_str(source)?;
        program.validate()?;
        Ok(program)
    }

    /// Build the class table. Superclasses must be declared first.
    pub fn class_table(&self) -> Result<ClassTable, ProgramError> {
        let mut table = ClassTable::new();
        for class in &self.classes {
            let superclass = match &class.extends {
                Some(name) => Some(
                    table
                        .lookup(name)
                        .ok_or_else(|| ProgramError::UnknownClass { name: name.clone() })?,
                ),
                None => None,
            };
            let fields = class
                .fields
                .iter()
                .map(|f| {
                    f.kind()
                        .map(|kind| FieldInfo::new(f.name.clone(), kind))
                        .ok_or_else(|| ProgramError::UnknownFieldType {
                            class: class.name.clone(),
                            field: f.name.clone(),
                            ty: f.ty.clone(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;
            table.define_class(class.name.clone(), superclass, fields)?;
        }
        Ok(table)
    }

    /// Check names, local indices and jump targets.
    pub fn validate(&self) -> Result<(), ProgramError> {
        if self.threads.is_empty() {
            return Err(ProgramError::NoThreads);
        }
        let classes = self.class_table()?;
        for (name, init) in &self.globals {
            if let GlobalInit::Object { new } = init {
                if classes.lookup(new).is_none() {
                    return Err(ProgramError::UnknownGlobalClass {
                        name: name.clone(),
                        class: new.clone(),
                    });
                }
            }
        }
        let fields: HashSet<&str> = self
            .classes
            .iter()
            .flat_map(|c| c.fields.iter().map(|f| f.name.as_str()))
            .collect();

        let mut names = HashSet::new();
        for thread in &self.threads {
            if !names.insert(thread.name.as_str()) {
                return Err(ProgramError::DuplicateThread {
                    name: thread.name.clone(),
                });
            }
            for (pc, op) in thread.ops.iter().enumerate() {
                let invalid = |message: String| ProgramError::InvalidOp {
                    thread: thread.name.clone(),
                    pc,
                    message,
                };
                if let Some(global) = op.global() {
                    if !self.globals.contains_key(global) {
                        return Err(invalid(format!("unknown global '{}'", global)));
                    }
                }
                if let Some(local) = op.locals().into_iter().find(|&l| l >= thread.locals) {
                    return Err(invalid(format!(
                        "local {} out of range (thread has {})",
                        local, thread.locals
                    )));
                }
                match op {
                    Op::Read { field, .. } | Op::Write { field, .. }
                        if !fields.contains(field.as_str()) =>
                    {
                        return Err(invalid(format!("no class declares field '{}'", field)));
                    }
                    Op::New { class, .. } if classes.lookup(class).is_none() => {
                        return Err(invalid(format!("unknown class '{}'", class)));
                    }
                    Op::ChooseInt { min, max, .. } if min > max => {
                        return Err(invalid(format!("empty range {}..={}", min, max)));
                    }
                    Op::Jump { to, .. } if *to > thread.ops.len() => {
                        return Err(invalid(format!("jump target {} out of range", to)));
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }
}

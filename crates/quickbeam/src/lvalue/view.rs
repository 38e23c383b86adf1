//! Hop-by-hop resolution and the read/write descents

use std::collections::HashSet;
use std::sync::Mutex;

use indexmap::IndexMap;
use log::trace;

use super::{LValueExpr, PathStep, Root, SlotKey, StepKind};
use crate::class::can_access;
use crate::error::{EngineError, Result};
use crate::heap::{Container, Heap, ReleaseQueue};
use crate::program::Globals;
use crate::stack::VarStack;
use crate::sync::{lock, read, write};
use crate::value::{
    apply_byte, apply_compound, CompoundOp, ObjId, PreparedOperand, Snapshot, TypeConstraint, Value, ValueKind,
};

/// What to do with the resolved slot.
pub(crate) enum Access {
    /// Return an owned copy of the value
    Read,
    /// Render the value without taking ownership of it
    Snapshot,
    /// Store `value`; `bind` stores over a reference instead of through it
    Assign {
        value: Option<Value>,
        class: Option<String>,
        extra: Option<TypeConstraint>,
        bind: bool,
    },
    /// `slot <op>= operand`
    Compound {
        op: CompoundOp,
        operand: PreparedOperand,
    },
    /// Detach and return the value
    Remove,
    /// Detach several elements of the list, map or object in the slot
    RemoveMany { targets: Vec<PathStep> },
    /// Separate the slot's copy-on-write container from other owners
    EnsureUnique,
}

impl Access {
    fn mutates(&self) -> bool {
        !matches!(self, Access::Read | Access::Snapshot)
    }

    fn materializes(&self) -> bool {
        matches!(self, Access::Assign { .. } | Access::Compound { .. })
    }

    fn follows_final(&self) -> bool {
        !matches!(self, Access::Assign { bind: true, .. })
    }

    fn missing(&self) -> Outcome {
        match self {
            Access::Read | Access::Remove => Outcome::Value(Value::Nothing),
            Access::Snapshot => Outcome::Snapshot(Snapshot::Nothing),
            Access::RemoveMany { .. } => Outcome::Values(Vec::new()),
            Access::EnsureUnique => Outcome::Changed(false),
            Access::Assign { .. } | Access::Compound { .. } => Outcome::Unit,
        }
    }

    /// Queue whatever the access still owns.
    fn discard(self, queue: &mut ReleaseQueue<'_>) {
        match self {
            Access::Assign { value: Some(value), .. } => queue.push(value),
            Access::Compound { operand, .. } => operand.discard(queue),
            _ => {}
        }
    }
}

/// Result of an access. Values are owned by the caller.
#[derive(Debug)]
pub(crate) enum Outcome {
    Unit,
    Value(Value),
    Values(Vec<Value>),
    Changed(bool),
    Snapshot(Snapshot),
}

/// How a hop ended.
enum Walk {
    Done(Outcome),
    /// Continue at a retained object, consuming steps from the index
    Enter(ObjId, usize),
    /// Continue at a unique object still held by its only owner
    Borrow(ObjId, usize),
    /// Continue at a retained reference's target, then the steps from the
    /// index
    Follow(ObjId, usize),
}

/// Everything one resolution needs from the calling thread's context.
pub(crate) struct Resolver<'a> {
    pub(crate) heap: &'a Heap,
    pub(crate) globals: &'a Globals,
    pub(crate) stack: &'a Mutex<VarStack>,
    pub(crate) class_context: Option<&'a str>,
    pub(crate) max_depth: usize,
    pub(crate) max_index: usize,
}

impl<'a> Resolver<'a> {
    /// Resolve `expr` and apply `access`, releasing displaced values once
    /// every lock is dropped.
    pub(crate) fn run(&self, expr: &LValueExpr, mut access: Access) -> Result<Outcome> {
        let mut queue = ReleaseQueue::new(self.heap);
        let result = self.resolve(expr, &mut access, &mut queue);
        access.discard(&mut queue);
        queue.flush();
        result
    }

    fn resolve(&self, expr: &LValueExpr, access: &mut Access, queue: &mut ReleaseQueue<'_>) -> Result<Outcome> {
        let (mut root, mut steps) = expr.flatten(self.heap);
        let mut pos = 0;
        let mut visited = HashSet::new();
        let mut hops = 0;
        loop {
            hops += 1;
            if hops > self.max_depth {
                return Err(EngineError::AliasDepthExceeded { max: self.max_depth });
            }
            if let Root::Local(ident) = root {
                root = self.bind_local(ident)?;
            }
            if let Some(key) = slot_key(&root) {
                if !visited.insert((key, steps.len() - pos)) {
                    return Err(EngineError::RecursiveReference {
                        name: self.root_name(&root),
                    });
                }
            }
            match self.hop(root, &steps, pos, access, queue)? {
                Walk::Done(outcome) => return Ok(outcome),
                Walk::Enter(obj, at) => {
                    queue.push(Value::Object(obj));
                    root = Root::Object(obj);
                    pos = at;
                }
                Walk::Borrow(obj, at) => {
                    root = Root::Object(obj);
                    pos = at;
                }
                Walk::Follow(rid, at) => {
                    queue.push(Value::Reference(rid));
                    if !visited.insert((SlotKey::Reference(rid), steps.len() - at)) {
                        return Err(EngineError::RecursiveReference {
                            name: format!("reference {}", rid),
                        });
                    }
                    let (target, read_only) = self
                        .heap
                        .with_container(rid, |c| match c {
                            Container::Reference(r) => Some((r.target.clone(), r.read_only)),
                            _ => None,
                        })?
                        .ok_or_else(|| EngineError::InvalidOperation(format!("{} is not a reference", rid)))?;
                    if read_only && access.mutates() {
                        return Err(EngineError::ReadOnly {
                            what: format!("reference {}", rid),
                        });
                    }
                    trace!("following reference {} to {:?}", rid, target);
                    let (next, mut rest) = target.flatten(self.heap);
                    rest.extend(steps.drain(at..));
                    root = next;
                    steps = rest;
                    pos = 0;
                }
            }
        }
    }

    /// Innermost local with `ident`, else innermost closure variable.
    fn bind_local(&self, ident: super::VarIdent) -> Result<Root> {
        let stack = lock(self.stack);
        if let Some(local) = stack.find_local(ident) {
            return Ok(Root::LocalSlot(super::LocalRef {
                ident,
                serial: local.serial,
            }));
        }
        stack
            .find_closure_var(ident)
            .map(Root::ClosureVar)
            .ok_or_else(|| EngineError::UndefinedVariable {
                name: ident.to_string(),
            })
    }

    fn root_name(&self, root: &Root) -> String {
        match root {
            Root::Global(id) => match self.globals.get(*id) {
                Ok(var) => var.name.to_string(),
                Err(_) => id.to_string(),
            },
            Root::LocalSlot(local) => lock(self.stack)
                .find_local_slot(local.serial)
                .map(|l| l.name.to_string())
                .unwrap_or_else(|| local.ident.to_string()),
            Root::ClosureVar(id) => self
                .heap
                .with_container(*id, |c| match c {
                    Container::ClosureVar(d) => d.name.to_string(),
                    _ => id.to_string(),
                })
                .unwrap_or_else(|_| id.to_string()),
            Root::Local(ident) => ident.to_string(),
            Root::Temp(_) => "temporary".to_string(),
            Root::Object(id) => id.to_string(),
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Hops
    // ═══════════════════════════════════════════════════════════════════

    fn hop(
        &self,
        root: Root,
        steps: &[PathStep],
        pos: usize,
        access: &mut Access,
        queue: &mut ReleaseQueue<'_>,
    ) -> Result<Walk> {
        match root {
            Root::Global(id) => {
                let var = self.globals.get(id)?;
                if !access.mutates() {
                    let cell = read(&var.value);
                    return self.descend_read(&cell, steps, pos, access);
                }
                if var.read_only {
                    return Err(EngineError::ReadOnly {
                        what: format!("global {}", var.name),
                    });
                }
                let mut cell = write(&var.value);
                self.descend_root(&mut cell, &var.constraint, steps, pos, access, queue, None)
            }
            Root::LocalSlot(local) => {
                let mut stack = lock(self.stack);
                let slot = stack
                    .find_local_slot_mut(local.serial)
                    .ok_or_else(|| EngineError::LocalOutOfScope {
                        name: local.ident.to_string(),
                    })?;
                if access.mutates() {
                    let constraint = slot.constraint.clone();
                    self.descend_root(&mut slot.value, &constraint, steps, pos, access, queue, None)
                } else {
                    self.descend_read(&slot.value, steps, pos, access)
                }
            }
            Root::ClosureVar(id) => {
                if access.mutates() {
                    self.heap.with_container_mut(id, |c| match c {
                        Container::ClosureVar(data) => {
                            let constraint = data.constraint.clone();
                            self.descend_root(&mut data.value, &constraint, steps, pos, access, queue, Some(id))
                        }
                        other => Err(EngineError::TypeError {
                            expected: "closure variable".to_string(),
                            got: other.kind().name().to_string(),
                        }),
                    })?
                } else {
                    self.heap.with_container(id, |c| match c {
                        Container::ClosureVar(data) => self.descend_read(&data.value, steps, pos, access),
                        _ => Ok(Walk::Done(access.missing())),
                    })?
                }
            }
            Root::Object(obj) => self.object_hop(obj, steps, pos, access, queue),
            Root::Temp(value) => match value {
                Value::Object(obj) if pos < steps.len() || matches!(access, Access::RemoveMany { .. }) => {
                    self.object_hop(obj, steps, pos, access, queue)
                }
                _ if access.mutates() => Err(EngineError::NotAnLValue {
                    what: format!("temporary {:?}", value),
                }),
                _ => self.descend_read(&value, steps, pos, access),
            },
            Root::Local(ident) => Err(EngineError::UndefinedVariable {
                name: ident.to_string(),
            }),
        }
    }

    fn object_hop(
        &self,
        obj: ObjId,
        steps: &[PathStep],
        pos: usize,
        access: &mut Access,
        queue: &mut ReleaseQueue<'_>,
    ) -> Result<Walk> {
        let context = self.class_context;
        if pos == steps.len() {
            return match access {
                Access::RemoveMany { targets } => self
                    .remove_members(obj, targets, queue)
                    .map(|values| Walk::Done(Outcome::Values(values))),
                _ => Err(EngineError::InvalidOperation(format!(
                    "object {} cannot be accessed without a member",
                    obj
                ))),
            };
        }
        let step = &steps[pos];
        let key = step.key()?;

        if !access.mutates() {
            return self.heap.with_container(obj, |c| {
                let Container::Object(data) = c else {
                    return Err(EngineError::type_error("object", &Value::Object(obj)));
                };
                if !can_access(&*data.class, key, context) {
                    return Err(private(data.class.name(), key));
                }
                match data.members.get(key) {
                    Some(value) => self.descend_read(value, steps, pos + 1, access),
                    None => Ok(Walk::Done(access.missing())),
                }
            })?;
        }

        let last = pos + 1 == steps.len();
        self.heap.with_container_mut(obj, |c| {
            let Container::Object(data) = c else {
                return Err(EngineError::type_error("object", &Value::Object(obj)));
            };
            if !can_access(&*data.class, key, context) {
                return Err(private(data.class.name(), key));
            }
            let aliased = matches!(data.members.get(key), Some(Value::Reference(_)));
            if last && !aliased && matches!(access, Access::Remove) {
                let removed = data.members.shift_remove(key).unwrap_or(Value::Nothing);
                if self.heap.value_needs_scan(&removed) {
                    self.heap.adjust_scan(obj, -1);
                    queue.rescan(obj);
                }
                return Ok(Walk::Done(Outcome::Value(removed)));
            }
            let constraint = data.class.member_constraint(key);
            let inserted = !data.members.contains_key(key);
            if inserted {
                if !access.materializes() {
                    return Ok(Walk::Done(access.missing()));
                }
                data.members.insert(key.to_string(), Value::Nothing);
            }
            let Some(cell) = data.members.get_mut(key) else {
                return Ok(Walk::Done(access.missing()));
            };
            let result = self.descend_root(cell, &constraint, steps, pos + 1, access, queue, Some(obj));
            if result.is_err() && inserted {
                data.members.shift_remove(key);
            }
            result
        })?
    }

    // ═══════════════════════════════════════════════════════════════════
    // Write Descent
    // ═══════════════════════════════════════════════════════════════════

    /// Descend from a root cell, tracking whether the cell's scan status
    /// changed so the owning object or closure variable can be rescanned.
    #[allow(clippy::too_many_arguments)]
    fn descend_root(
        &self,
        cell: &mut Value,
        constraint: &TypeConstraint,
        steps: &[PathStep],
        pos: usize,
        access: &mut Access,
        queue: &mut ReleaseQueue<'_>,
        owner: Option<ObjId>,
    ) -> Result<Walk> {
        let before = self.heap.value_needs_scan(cell);
        let result = self.descend_write(cell, constraint, steps, pos, access, queue);
        let after = self.heap.value_needs_scan(cell);
        if let (Some(owner), true) = (owner, before != after) {
            self.heap.adjust_scan(owner, if after { 1 } else { -1 });
            queue.rescan(owner);
        }
        result
    }

    /// Descend into a child cell of a copy-on-write container, keeping the
    /// container's scan count in step with the child.
    fn descend_child(
        &self,
        cell: &mut Value,
        parent: ObjId,
        steps: &[PathStep],
        pos: usize,
        access: &mut Access,
        queue: &mut ReleaseQueue<'_>,
    ) -> Result<Walk> {
        let any = TypeConstraint::Any;
        let before = self.heap.value_needs_scan(cell);
        let result = self.descend_write(cell, &any, steps, pos, access, queue);
        let after = self.heap.value_needs_scan(cell);
        if before != after {
            self.heap.adjust_scan(parent, if after { 1 } else { -1 });
        }
        result
    }

    fn descend_write(
        &self,
        cell: &mut Value,
        constraint: &TypeConstraint,
        steps: &[PathStep],
        pos: usize,
        access: &mut Access,
        queue: &mut ReleaseQueue<'_>,
    ) -> Result<Walk> {
        let at_leaf = pos == steps.len();
        if let Value::Reference(rid) = *cell {
            if !at_leaf || access.follows_final() {
                self.heap.retain(rid);
                return Ok(Walk::Follow(rid, pos));
            }
        }
        if at_leaf {
            return self.apply(cell, constraint, pos, access, queue);
        }
        if let Value::Object(obj) = *cell {
            return Ok(self.enter(obj, pos));
        }

        let mut materialized = false;
        if cell.is_nothing() {
            if !access.materializes() {
                return Ok(Walk::Done(access.missing()));
            }
            let kind = steps[pos].container_kind();
            if !constraint.permits(kind) {
                return Err(EngineError::TypeError {
                    expected: constraint.to_string(),
                    got: kind.name().to_string(),
                });
            }
            *cell = match kind {
                ValueKind::List => self.heap.alloc_list(Vec::new()),
                _ => self.heap.alloc_map(IndexMap::new()),
            };
            materialized = true;
        }

        let result = self.write_into(cell, steps, pos, access, queue);
        if result.is_err() && materialized {
            queue.push(std::mem::replace(cell, Value::Nothing));
        }
        result
    }

    fn write_into(
        &self,
        cell: &mut Value,
        steps: &[PathStep],
        pos: usize,
        access: &mut Access,
        queue: &mut ReleaseQueue<'_>,
    ) -> Result<Walk> {
        let step = &steps[pos];
        let last = pos + 1 == steps.len();
        match *cell {
            Value::List(_) => {
                let index = step.list_index()?;
                self.heap.ensure_unique(cell, queue)?;
                let id = handle_of(cell)?;
                self.heap.with_container_mut(id, |c| {
                    let Container::List(items) = c else {
                        return Err(mismatch("list", c));
                    };
                    let padded_from = if index >= items.len() {
                        if !access.materializes() {
                            return Ok(Walk::Done(access.missing()));
                        }
                        let len = items.len();
                        grow_to(items, index, self.max_index)?;
                        items.resize(index + 1, Value::Nothing);
                        Some(len)
                    } else {
                        None
                    };
                    let result = self.descend_child(&mut items[index], id, steps, pos + 1, access, queue);
                    if let (true, Some(len)) = (result.is_err(), padded_from) {
                        items.truncate(len);
                    }
                    result
                })?
            }
            Value::Map(_) => {
                let key = step.key()?;
                self.heap.ensure_unique(cell, queue)?;
                let id = handle_of(cell)?;
                self.heap.with_container_mut(id, |c| {
                    let Container::Map(map) = c else {
                        return Err(mismatch("map", c));
                    };
                    let aliased = matches!(map.get(key), Some(Value::Reference(_)));
                    if last && !aliased && matches!(access, Access::Remove) {
                        let removed = map.shift_remove(key).unwrap_or(Value::Nothing);
                        if self.heap.value_needs_scan(&removed) {
                            self.heap.adjust_scan(id, -1);
                        }
                        return Ok(Walk::Done(Outcome::Value(removed)));
                    }
                    let inserted = !map.contains_key(key);
                    if inserted {
                        if !access.materializes() {
                            return Ok(Walk::Done(access.missing()));
                        }
                        map.insert(key.to_string(), Value::Nothing);
                    }
                    let Some(child) = map.get_mut(key) else {
                        return Ok(Walk::Done(access.missing()));
                    };
                    let result = self.descend_child(child, id, steps, pos + 1, access, queue);
                    if result.is_err() && inserted {
                        map.shift_remove(key);
                    }
                    result
                })?
            }
            Value::Binary(_) if step.kind == StepKind::Subscript && last => {
                let index = step.list_index()?;
                let (assigned, compound) = match &*access {
                    Access::Assign {
                        value: Some(value),
                        bind: false,
                        ..
                    } => match *value {
                        Value::Int(n) if (0..=255).contains(&n) => (n as u8, None),
                        other => return Err(EngineError::type_error("byte (0-255)", &other)),
                    },
                    Access::Compound { op, operand } => (0, Some((*op, operand))),
                    _ => {
                        return Err(EngineError::NotAnLValue {
                            what: "binary element".to_string(),
                        })
                    }
                };
                let assigning = compound.is_none();
                self.heap.ensure_unique(cell, queue)?;
                let id = handle_of(cell)?;
                let byte = self.heap.with_container_mut(id, |c| {
                    let Container::Binary(bytes) = c else {
                        return Err(mismatch("binary", c));
                    };
                    let byte = match compound {
                        Some((op, operand)) => apply_byte(op, bytes.get(index).copied().unwrap_or(0), operand)?,
                        None => assigned,
                    };
                    if index >= bytes.len() {
                        grow_to(bytes, index, self.max_index)?;
                        bytes.resize(index + 1, 0);
                    }
                    bytes[index] = byte;
                    Ok(byte)
                })??;
                if !assigning {
                    return Ok(Walk::Done(Outcome::Value(Value::Int(i64::from(byte)))));
                }
                if let Access::Assign { value, .. } = access {
                    *value = None;
                }
                Ok(Walk::Done(Outcome::Unit))
            }
            Value::String(_) => Err(EngineError::TypeError {
                expected: "list or map".to_string(),
                got: "string (characters are not assignable)".to_string(),
            }),
            _ => Err(EngineError::type_error(
                match step.kind {
                    StepKind::Subscript => "list or map",
                    StepKind::Member => "map or object",
                },
                cell,
            )),
        }
    }

    /// Apply the access to the final cell.
    fn apply(
        &self,
        cell: &mut Value,
        constraint: &TypeConstraint,
        pos: usize,
        access: &mut Access,
        queue: &mut ReleaseQueue<'_>,
    ) -> Result<Walk> {
        let outcome = match access {
            Access::Read => Outcome::Value(self.heap.try_dup(*cell)?),
            Access::Snapshot => Outcome::Snapshot(self.heap.snapshot(cell)),
            Access::Assign { value, class, extra, .. } => {
                let Some(new) = *value else {
                    return Err(EngineError::InvalidOperation("value already consumed".to_string()));
                };
                constraint.check(&new, class.as_deref())?;
                if let Some(extra) = extra {
                    extra.check(&new, class.as_deref())?;
                }
                *value = None;
                queue.push(std::mem::replace(cell, new));
                Outcome::Unit
            }
            Access::Compound { op, operand } => {
                apply_compound(self.heap, *op, cell, operand, constraint, queue)?;
                Outcome::Value(self.heap.try_dup(*cell)?)
            }
            Access::Remove => Outcome::Value(std::mem::replace(cell, Value::Nothing)),
            Access::EnsureUnique => Outcome::Changed(self.heap.ensure_unique(cell, queue)?),
            Access::RemoveMany { targets } => match *cell {
                Value::Object(obj) => return Ok(self.enter(obj, pos)),
                Value::Nothing => Outcome::Values(Vec::new()),
                Value::List(_) | Value::Map(_) => {
                    self.heap.ensure_unique(cell, queue)?;
                    Outcome::Values(self.remove_elements(handle_of(cell)?, targets)?)
                }
                other => return Err(EngineError::type_error("list, map or object", &other)),
            },
        };
        Ok(Walk::Done(outcome))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Read Descent
    // ═══════════════════════════════════════════════════════════════════

    fn descend_read(&self, cell: &Value, steps: &[PathStep], pos: usize, access: &Access) -> Result<Walk> {
        if let Value::Reference(rid) = *cell {
            self.heap.retain(rid);
            return Ok(Walk::Follow(rid, pos));
        }
        if pos == steps.len() {
            let outcome = match access {
                Access::Snapshot => Outcome::Snapshot(self.heap.snapshot(cell)),
                _ => Outcome::Value(self.heap.try_dup(*cell)?),
            };
            return Ok(Walk::Done(outcome));
        }
        let step = &steps[pos];
        let nothing = || Ok(Walk::Done(access.missing()));
        match *cell {
            Value::Object(obj) => Ok(self.enter(obj, pos)),
            Value::List(id) => {
                let index = step.list_index()?;
                self.heap.with_container(id, |c| match c {
                    Container::List(items) => match items.get(index) {
                        Some(value) => self.descend_read(value, steps, pos + 1, access),
                        None => nothing(),
                    },
                    _ => nothing(),
                })?
            }
            Value::Map(id) => {
                let key = step.key()?;
                self.heap.with_container(id, |c| match c {
                    Container::Map(map) => match map.get(key) {
                        Some(value) => self.descend_read(value, steps, pos + 1, access),
                        None => nothing(),
                    },
                    _ => nothing(),
                })?
            }
            Value::String(id) => {
                let index = step.list_index()?;
                if pos + 1 != steps.len() {
                    return Err(EngineError::type_error("list or map", cell));
                }
                let text = self.heap.string_text(id)?;
                let Some(ch) = text.chars().nth(index) else {
                    return nothing();
                };
                Ok(Walk::Done(match access {
                    Access::Snapshot => Outcome::Snapshot(Snapshot::Str(ch.to_string())),
                    _ => Outcome::Value(self.heap.alloc_string(ch.to_string())),
                }))
            }
            Value::Binary(id) => {
                let index = step.list_index()?;
                let byte = self.heap.with_container(id, |c| match c {
                    Container::Binary(bytes) => bytes.get(index).copied(),
                    _ => None,
                })?;
                let Some(b) = byte else {
                    return nothing();
                };
                Ok(Walk::Done(match access {
                    Access::Snapshot => Outcome::Snapshot(Snapshot::Int(i64::from(b))),
                    _ => Outcome::Value(Value::Int(i64::from(b))),
                }))
            }
            _ => nothing(),
        }
    }

    /// End the hop at `obj`. A unique object is borrowed from its only
    /// owner instead of retained; if that owner lets go meanwhile, the next
    /// hop fails with [`EngineError::ObjectAlreadyDeleted`].
    fn enter(&self, obj: ObjId, pos: usize) -> Walk {
        if self.heap.is_unique(obj) {
            return Walk::Borrow(obj, pos);
        }
        self.heap.retain(obj);
        Walk::Enter(obj, pos)
    }
}

/// Make room to write at `index`, at or past the end of `items`.
fn grow_to<T>(items: &mut Vec<T>, index: usize, max: usize) -> Result<()> {
    if index > max {
        return Err(EngineError::IndexTooLarge { index, max });
    }
    items
        .try_reserve(index + 1 - items.len())
        .map_err(|_| EngineError::IndexTooLarge { index, max })
}

fn slot_key(root: &Root) -> Option<SlotKey> {
    match root {
        Root::Global(id) => Some(SlotKey::Global(*id)),
        Root::LocalSlot(local) => Some(SlotKey::Local(local.serial)),
        Root::ClosureVar(id) => Some(SlotKey::ClosureVar(*id)),
        Root::Local(_) | Root::Temp(_) | Root::Object(_) => None,
    }
}

fn handle_of(cell: &Value) -> Result<ObjId> {
    cell.handle()
        .ok_or_else(|| EngineError::type_error("container", cell))
}

pub(super) fn mismatch(expected: &str, container: &Container) -> EngineError {
    EngineError::TypeError {
        expected: expected.to_string(),
        got: container.kind().name().to_string(),
    }
}

pub(super) fn private(class: &str, member: &str) -> EngineError {
    EngineError::PrivateMember {
        class: class.to_string(),
        member: member.to_string(),
    }
}

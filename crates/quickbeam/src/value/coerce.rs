//! Numeric promotion and in-place compound operators

use std::fmt;

use indexmap::IndexMap;

use super::{TypeConstraint, Value};
use crate::error::{EngineError, Result};
use crate::heap::{Container, Heap, ReleaseQueue};

/// A promoted numeric operand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    /// Integer arithmetic (wrapping)
    Int(i64),
    /// Floating-point arithmetic
    Float(f64),
}

impl Number {
    /// Widen to `f64`.
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(n) => n as f64,
            Number::Float(n) => n,
        }
    }

    /// Narrow to `i64`, truncating floats.
    pub fn as_i64(self) -> i64 {
        match self {
            Number::Int(n) => n,
            Number::Float(n) => n as i64,
        }
    }

    /// The corresponding scalar value.
    pub fn into_value(self) -> Value {
        match self {
            Number::Int(n) => Value::Int(n),
            Number::Float(n) => Value::Float(n),
        }
    }
}

/// In-place operators accepted by compound updates (`+=`, `-=`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompoundOp {
    /// `+=`
    Add,
    /// `-=`
    Sub,
    /// `*=`
    Mul,
    /// `/=`
    Div,
    /// `%=`
    Mod,
    /// `&=`
    BitAnd,
    /// `|=`
    BitOr,
    /// `^=`
    BitXor,
    /// `<<=`
    Shl,
    /// `>>=`
    Shr,
}

impl CompoundOp {
    /// Operator token as written in source.
    pub fn symbol(self) -> &'static str {
        match self {
            CompoundOp::Add => "+=",
            CompoundOp::Sub => "-=",
            CompoundOp::Mul => "*=",
            CompoundOp::Div => "/=",
            CompoundOp::Mod => "%=",
            CompoundOp::BitAnd => "&=",
            CompoundOp::BitOr => "|=",
            CompoundOp::BitXor => "^=",
            CompoundOp::Shl => "<<=",
            CompoundOp::Shr => ">>=",
        }
    }

    /// Apply the operator to two promoted numbers.
    pub fn apply(self, a: Number, b: Number) -> Result<Number> {
        match self {
            CompoundOp::Add | CompoundOp::Sub | CompoundOp::Mul | CompoundOp::Div | CompoundOp::Mod => {
                match (a, b) {
                    (Number::Int(x), Number::Int(y)) => int_arith(self, x, y).map(Number::Int),
                    (x, y) => float_arith(self, x.as_f64(), y.as_f64()).map(Number::Float),
                }
            }
            _ => {
                let (x, y) = (a.as_i64(), b.as_i64());
                Ok(Number::Int(match self {
                    CompoundOp::BitAnd => x & y,
                    CompoundOp::BitOr => x | y,
                    CompoundOp::BitXor => x ^ y,
                    CompoundOp::Shl => x.wrapping_shl(y as u32),
                    _ => x.wrapping_shr(y as u32),
                }))
            }
        }
    }
}

impl fmt::Display for CompoundOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

fn int_arith(op: CompoundOp, x: i64, y: i64) -> Result<i64> {
    match op {
        CompoundOp::Add => Ok(x.wrapping_add(y)),
        CompoundOp::Sub => Ok(x.wrapping_sub(y)),
        CompoundOp::Mul => Ok(x.wrapping_mul(y)),
        CompoundOp::Div if y == 0 => Err(EngineError::DivisionByZero),
        CompoundOp::Div => Ok(x.wrapping_div(y)),
        CompoundOp::Mod if y == 0 => Err(EngineError::DivisionByZero),
        _ => Ok(x.wrapping_rem(y)),
    }
}

fn float_arith(op: CompoundOp, x: f64, y: f64) -> Result<f64> {
    match op {
        CompoundOp::Add => Ok(x + y),
        CompoundOp::Sub => Ok(x - y),
        CompoundOp::Mul => Ok(x * y),
        CompoundOp::Div | CompoundOp::Mod if y == 0.0 => Err(EngineError::DivisionByZero),
        CompoundOp::Div => Ok(x / y),
        _ => Ok(x % y),
    }
}

// ═══════════════════════════════════════════════════════════════════
// Coercions
// ═══════════════════════════════════════════════════════════════════

/// Parse the numeric form of a string. Non-numeric text is zero.
pub(crate) fn parse_number(text: &str) -> Number {
    let text = text.trim();
    if let Ok(n) = text.parse::<i64>() {
        Number::Int(n)
    } else if let Ok(n) = text.parse::<f64>() {
        Number::Float(n)
    } else {
        Number::Int(0)
    }
}

/// Promote a value to a number.
pub(crate) fn to_number(heap: &Heap, value: &Value) -> Result<Number> {
    match value {
        Value::Nothing => Ok(Number::Int(0)),
        Value::Bool(b) => Ok(Number::Int(i64::from(*b))),
        Value::Int(n) => Ok(Number::Int(*n)),
        Value::Float(n) => Ok(Number::Float(*n)),
        Value::Date(us) => Ok(Number::Int(*us)),
        Value::String(id) => Ok(parse_number(&heap.string_text(*id)?)),
        other => Err(EngineError::type_error("number", other)),
    }
}

/// Coerce a subscript to an integer index. The result may be negative;
/// callers indexing a list reject that with `NegativeIndex`.
pub(crate) fn index_of(heap: &Heap, value: &Value) -> Result<i64> {
    match value {
        Value::Float(n) => Ok(n.trunc() as i64),
        Value::Nothing | Value::Bool(_) | Value::Int(_) | Value::String(_) => {
            to_number(heap, value).map(Number::as_i64)
        }
        other => Err(EngineError::type_error("integer index", other)),
    }
}

/// The text appended by `string += value`.
pub(crate) fn string_form(heap: &Heap, value: &Value) -> Result<String> {
    match value {
        Value::Nothing => Ok(String::new()),
        Value::Bool(b) => Ok(if *b { "1" } else { "0" }.to_string()),
        Value::Int(n) => Ok(n.to_string()),
        Value::Float(n) => Ok(n.to_string()),
        Value::Date(us) => Ok(us.to_string()),
        Value::String(id) => heap.string_text(*id),
        Value::Binary(id) => heap.with_container(*id, |c| match c {
            Container::Binary(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            _ => String::new(),
        }),
        other => Err(EngineError::type_error("string", other)),
    }
}

// ═══════════════════════════════════════════════════════════════════
// Prepared Operands
// ═══════════════════════════════════════════════════════════════════

/// A compound-update operand with every form the target might need
/// computed up front.
///
/// The target slot's type is only known once its lock is held, and reading
/// the operand's own container under that lock could self-deadlock when the
/// operand aliases the target. So all conversions happen before resolution.
pub(crate) struct PreparedOperand {
    value: Option<Value>,
    number: Option<Number>,
    text: Option<String>,
    bytes: Option<Vec<u8>>,
    items: Option<Vec<Value>>,
    entries: Option<Vec<(String, Value)>>,
}

impl PreparedOperand {
    /// Take ownership of `value` and precompute its conversions.
    ///
    /// Fails without taking ownership when `value` is a list or map holding
    /// a unique object, since its elements would gain a second owner.
    pub(crate) fn prepare(heap: &Heap, value: Value) -> Result<Self> {
        let mut prepared = PreparedOperand {
            value: Some(value),
            number: to_number(heap, &value).ok(),
            text: string_form(heap, &value).ok(),
            bytes: None,
            items: None,
            entries: None,
        };
        match value {
            Value::Binary(id) => {
                prepared.bytes = heap
                    .with_container(id, |c| match c {
                        Container::Binary(bytes) => Some(bytes.clone()),
                        _ => None,
                    })
                    .ok()
                    .flatten();
            }
            Value::String(_) => {
                prepared.bytes = prepared.text.as_ref().map(|t| t.as_bytes().to_vec());
            }
            Value::List(id) => {
                prepared.items = heap
                    .with_container(id, |c| -> Result<Option<Vec<Value>>> {
                        match c {
                            Container::List(items) => {
                                shareable(heap, items.iter())?;
                                Ok(Some(items.iter().map(|v| heap.dup(*v)).collect()))
                            }
                            _ => Ok(None),
                        }
                    })
                    .ok()
                    .transpose()?
                    .flatten();
            }
            Value::Map(id) => {
                prepared.entries = heap
                    .with_container(id, |c| -> Result<Option<Vec<(String, Value)>>> {
                        match c {
                            Container::Map(map) => {
                                shareable(heap, map.values())?;
                                Ok(Some(
                                    map.iter()
                                        .map(|(k, v)| (k.clone(), heap.dup(*v)))
                                        .collect(),
                                ))
                            }
                            _ => Ok(None),
                        }
                    })
                    .ok()
                    .transpose()?
                    .flatten();
            }
            _ => {}
        }
        Ok(prepared)
    }

    /// Queue everything still owned for release.
    pub(crate) fn discard(self, queue: &mut ReleaseQueue<'_>) {
        if let Some(value) = self.value {
            queue.push(value);
        }
        for item in self.items.into_iter().flatten() {
            queue.push(item);
        }
        for (_, value) in self.entries.into_iter().flatten() {
            queue.push(value);
        }
    }

    fn peek(&self) -> Value {
        self.value.unwrap_or(Value::Nothing)
    }

    fn number(&self) -> Result<Number> {
        self.number
            .ok_or_else(|| EngineError::type_error("number", &self.peek()))
    }
}

fn shareable<'v>(heap: &Heap, values: impl Iterator<Item = &'v Value>) -> Result<()> {
    for value in values {
        if let Some(id) = value.handle().filter(|id| heap.is_unique(*id)) {
            return Err(EngineError::UniqueObject { id: id.to_string() });
        }
    }
    Ok(())
}

/// Apply `byte <op>= operand` to one element of a binary. The result must
/// still fit in a byte.
pub(crate) fn apply_byte(op: CompoundOp, byte: u8, operand: &PreparedOperand) -> Result<u8> {
    match op.apply(Number::Int(i64::from(byte)), operand.number()?)?.into_value() {
        Value::Int(n) if (0..=255).contains(&n) => Ok(n as u8),
        other => Err(EngineError::type_error("byte (0-255)", &other)),
    }
}

/// Apply `cell <op>= operand` in place.
///
/// Containers are made unique before mutation. Values displaced from the
/// cell or its container go to `queue`; anything taken from `operand` is no
/// longer owned by it.
pub(crate) fn apply_compound(
    heap: &Heap,
    op: CompoundOp,
    cell: &mut Value,
    operand: &mut PreparedOperand,
    constraint: &TypeConstraint,
    queue: &mut ReleaseQueue<'_>,
) -> Result<()> {
    if op == CompoundOp::Add {
        match *cell {
            Value::Nothing if operand.peek().cow_handle().is_some() => {
                constraint.check(&operand.peek(), None)?;
                if let Some(value) = operand.value.take() {
                    *cell = value;
                }
                return Ok(());
            }
            Value::String(_) => {
                let text = operand
                    .text
                    .take()
                    .ok_or_else(|| EngineError::type_error("string", &operand.peek()))?;
                heap.ensure_unique(cell, queue)?;
                return with_target(heap, cell, |c| {
                    if let Container::Str(s) = c {
                        s.push_str(&text);
                    }
                });
            }
            Value::Binary(_) => {
                let bytes = operand
                    .bytes
                    .take()
                    .ok_or_else(|| EngineError::type_error("binary", &operand.peek()))?;
                heap.ensure_unique(cell, queue)?;
                return with_target(heap, cell, |c| {
                    if let Container::Binary(b) = c {
                        b.extend_from_slice(&bytes);
                    }
                });
            }
            Value::List(_) => {
                let items = match operand.items.take() {
                    Some(items) => items,
                    None => operand.value.take().into_iter().collect(),
                };
                heap.ensure_unique(cell, queue)?;
                let Some(id) = cell.handle() else {
                    return Ok(());
                };
                let added = items.iter().filter(|v| heap.value_needs_scan(v)).count();
                heap.with_container_mut(id, |c| {
                    if let Container::List(list) = c {
                        list.extend(items);
                    }
                })?;
                heap.adjust_scan(id, added as isize);
                return Ok(());
            }
            Value::Map(_) => {
                let entries = operand
                    .entries
                    .take()
                    .ok_or_else(|| EngineError::type_error("map", &operand.peek()))?;
                heap.ensure_unique(cell, queue)?;
                let Some(id) = cell.handle() else {
                    return Ok(());
                };
                let mut delta = 0isize;
                let displaced = heap.with_container_mut(id, |c| {
                    let mut displaced = Vec::new();
                    if let Container::Map(map) = c {
                        merge_entries(heap, map, entries, &mut delta, &mut displaced);
                    }
                    displaced
                })?;
                heap.adjust_scan(id, delta);
                for value in displaced {
                    queue.push(value);
                }
                return Ok(());
            }
            _ => {}
        }
    }

    let result = match (*cell, op) {
        (Value::Date(us), CompoundOp::Add) => Value::Date(us.wrapping_add(operand.number()?.as_i64())),
        (Value::Date(us), CompoundOp::Sub) => Value::Date(us.wrapping_sub(operand.number()?.as_i64())),
        (current, _) => {
            let a = to_number(heap, &current)?;
            op.apply(a, operand.number()?)?.into_value()
        }
    };
    constraint.check(&result, None)?;
    queue.push(std::mem::replace(cell, result));
    Ok(())
}

fn with_target(heap: &Heap, cell: &Value, f: impl FnOnce(&mut Container)) -> Result<()> {
    match cell.handle() {
        Some(id) => heap.with_container_mut(id, f),
        None => Ok(()),
    }
}

fn merge_entries(
    heap: &Heap,
    map: &mut IndexMap<String, Value>,
    entries: Vec<(String, Value)>,
    delta: &mut isize,
    displaced: &mut Vec<Value>,
) {
    for (key, value) in entries {
        if heap.value_needs_scan(&value) {
            *delta += 1;
        }
        if let Some(old) = map.insert(key, value) {
            if heap.value_needs_scan(&old) {
                *delta -= 1;
            }
            displaced.push(old);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("42"), Number::Int(42));
        assert_eq!(parse_number(" 1.5 "), Number::Float(1.5));
        assert_eq!(parse_number("abc"), Number::Int(0));
    }

    #[test]
    fn test_int_arith_wraps() {
        assert_eq!(
            CompoundOp::Add.apply(Number::Int(i64::MAX), Number::Int(1)).unwrap(),
            Number::Int(i64::MIN)
        );
    }

    #[test]
    fn test_float_promotion() {
        assert_eq!(
            CompoundOp::Mul.apply(Number::Int(2), Number::Float(1.5)).unwrap(),
            Number::Float(3.0)
        );
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(
            CompoundOp::Div.apply(Number::Int(1), Number::Int(0)),
            Err(EngineError::DivisionByZero)
        );
        assert_eq!(
            CompoundOp::Mod.apply(Number::Float(1.0), Number::Float(0.0)),
            Err(EngineError::DivisionByZero)
        );
    }

    #[test]
    fn test_bit_ops_truncate_floats() {
        assert_eq!(
            CompoundOp::BitOr.apply(Number::Float(4.9), Number::Int(1)).unwrap(),
            Number::Int(5)
        );
        assert_eq!(
            CompoundOp::Shl.apply(Number::Int(1), Number::Int(4)).unwrap(),
            Number::Int(16)
        );
    }

    #[test]
    fn test_index_of() {
        let heap = Heap::default();
        assert_eq!(index_of(&heap, &Value::Float(2.9)).unwrap(), 2);
        assert_eq!(index_of(&heap, &Value::Nothing).unwrap(), 0);
        assert_eq!(index_of(&heap, &Value::Int(-1)).unwrap(), -1);
        let s = heap.alloc_string("7");
        assert_eq!(index_of(&heap, &s).unwrap(), 7);
        heap.release_value(s);
    }

    #[test]
    fn test_compound_numeric_on_scalar_cell() {
        let heap = Heap::default();
        let mut queue = ReleaseQueue::new(&heap);
        let mut cell = Value::Int(5);
        let mut operand = PreparedOperand::prepare(&heap, Value::Float(0.5)).unwrap();
        apply_compound(&heap, CompoundOp::Add, &mut cell, &mut operand, &TypeConstraint::Any, &mut queue)
            .unwrap();
        assert_eq!(cell, Value::Float(5.5));
        operand.discard(&mut queue);
    }

    #[test]
    fn test_compound_respects_constraint() {
        let heap = Heap::default();
        let mut queue = ReleaseQueue::new(&heap);
        let mut cell = Value::Int(5);
        let mut operand = PreparedOperand::prepare(&heap, Value::Float(0.5)).unwrap();
        let int_only = TypeConstraint::Kind(crate::value::ValueKind::Int);
        let err = apply_compound(&heap, CompoundOp::Add, &mut cell, &mut operand, &int_only, &mut queue);
        assert!(err.is_err());
        assert_eq!(cell, Value::Int(5));
        operand.discard(&mut queue);
    }

    #[test]
    fn test_date_shift() {
        let heap = Heap::default();
        let mut queue = ReleaseQueue::new(&heap);
        let mut cell = Value::Date(1_000);
        let mut operand = PreparedOperand::prepare(&heap, Value::Int(250)).unwrap();
        apply_compound(&heap, CompoundOp::Sub, &mut cell, &mut operand, &TypeConstraint::Any, &mut queue)
            .unwrap();
        assert_eq!(cell, Value::Date(750));
        operand.discard(&mut queue);
    }

    #[test]
    fn test_string_append() {
        let heap = Heap::default();
        let mut queue = ReleaseQueue::new(&heap);
        let mut cell = heap.alloc_string("n=");
        let mut operand = PreparedOperand::prepare(&heap, Value::Int(3)).unwrap();
        apply_compound(&heap, CompoundOp::Add, &mut cell, &mut operand, &TypeConstraint::Any, &mut queue)
            .unwrap();
        operand.discard(&mut queue);
        queue.flush();
        assert_eq!(heap.string_text(cell.handle().unwrap()).unwrap(), "n=3");
        heap.release_value(cell);
        assert_eq!(heap.stats().live, 0);
    }

    #[test]
    fn test_byte_update_stays_in_range() {
        let heap = Heap::default();
        let operand = PreparedOperand::prepare(&heap, Value::Int(5)).unwrap();
        assert_eq!(apply_byte(CompoundOp::Add, 250, &operand), Ok(255));
        assert_eq!(
            apply_byte(CompoundOp::Add, 251, &operand).unwrap_err().code(),
            "RUNTIME-TYPE-ERROR"
        );
    }

    #[test]
    fn test_prepare_refuses_list_holding_unique_object() {
        let heap = Heap::default();
        let token = heap.alloc_unique(crate::class::SimpleClass::new("Token").build());
        let list = heap.alloc_list(vec![token]);
        let err = PreparedOperand::prepare(&heap, list).err().map(|e| e.code());
        assert_eq!(err, Some("UNIQUE-OBJECT-SHARED"));
        assert_eq!(heap.ref_count(list.handle().unwrap()), Some(1));
        heap.release_value(list);
        assert_eq!(heap.stats().live, 0);
    }
}

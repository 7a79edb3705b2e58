//! The opcode dispatch table: a fixed-size array of handler functions
//! indexed by the opcode byte. Every opcode has a handler; bytes outside
//! the opcode range have none and raise a runtime error naming the byte.

use lazy_static::lazy_static;

use crate::bytecode::opcode::{OpCode, NO_LABEL};
use crate::error::RuntimeError;
use crate::vm::object::{Object, TupleObject};
use crate::vm::value::Value;
use crate::vm::vm::{Flow, Vm};

pub type Handler = fn(&mut Vm) -> Result<Flow, RuntimeError>;

lazy_static! {
    /// One entry per possible opcode byte.
    pub static ref DISPATCH: [Option<Handler>; 256] = build_dispatch_table();
}

fn build_dispatch_table() -> [Option<Handler>; 256] {
    let mut table: [Option<Handler>; 256] = [None; 256];
    let mut set = |op: OpCode, handler: Handler| {
        table[op as usize] = Some(handler);
    };

    set(OpCode::Constant, op_constant);
    set(OpCode::String, op_string);
    set(OpCode::Nil, op_nil);
    set(OpCode::True, op_true);
    set(OpCode::False, op_false);
    set(OpCode::Pop, op_pop);
    set(OpCode::Dup, op_dup);

    set(OpCode::Add, op_add);
    set(OpCode::Subtract, op_subtract);
    set(OpCode::Multiply, op_multiply);
    set(OpCode::Divide, op_divide);
    set(OpCode::Modulo, op_modulo);
    set(OpCode::Negate, op_negate);

    set(OpCode::BitwiseNot, op_bitwise_not);
    set(OpCode::BitwiseAnd, op_bitwise_and);
    set(OpCode::BitwiseOr, op_bitwise_or);
    set(OpCode::BitwiseXor, op_bitwise_xor);
    set(OpCode::LeftShift, op_left_shift);
    set(OpCode::RightShift, op_right_shift);

    set(OpCode::Equal, op_equal);
    set(OpCode::NotEqual, op_not_equal);
    set(OpCode::Less, op_less);
    set(OpCode::Greater, op_greater);
    set(OpCode::LessEqual, op_less_equal);
    set(OpCode::GreaterEqual, op_greater_equal);

    set(OpCode::Not, op_not);

    set(OpCode::GetGlobal, op_get_global);
    set(OpCode::SetGlobal, op_set_global);
    set(OpCode::DefineGlobal, op_define_global);
    set(OpCode::GetLocal, op_get_local);
    set(OpCode::SetLocal, op_set_local);

    set(OpCode::Jump, op_jump);
    set(OpCode::JumpIfFalse, op_jump_if_false);
    set(OpCode::JumpIfNil, op_jump_if_nil);
    set(OpCode::Loop, op_loop);

    set(OpCode::Function, op_function);
    set(OpCode::Closure, op_closure);
    set(OpCode::Class, Vm::op_class);
    set(OpCode::Method, Vm::op_method);
    set(OpCode::DefineProperty, Vm::op_define_property);
    set(OpCode::DefineComputedProperty, Vm::op_define_computed_property);
    set(OpCode::Inherit, Vm::op_inherit);
    set(OpCode::Call, op_call);
    set(OpCode::CallNamed, op_call_named);
    set(OpCode::Return, op_return);

    set(OpCode::GetUpvalue, op_get_upvalue);
    set(OpCode::SetUpvalue, op_set_upvalue);
    set(OpCode::CloseUpvalue, op_close_upvalue);

    set(OpCode::GetProperty, Vm::op_get_property);
    set(OpCode::SetProperty, Vm::op_set_property);
    set(OpCode::Super, Vm::op_super);
    set(OpCode::OptionalChain, op_optional_chain);

    set(OpCode::Unwrap, op_unwrap);
    set(OpCode::NilCoalesce, op_nil_coalesce);

    set(OpCode::RangeInclusive, op_range_inclusive);
    set(OpCode::RangeExclusive, op_range_exclusive);

    set(OpCode::Array, op_array);
    set(OpCode::Dict, op_dict);
    set(OpCode::GetSubscript, op_get_subscript);
    set(OpCode::SetSubscript, op_set_subscript);

    set(OpCode::Tuple, op_tuple);
    set(OpCode::GetTupleIndex, op_get_tuple_index);
    set(OpCode::GetTupleLabel, op_get_tuple_label);

    set(OpCode::Struct, Vm::op_struct);
    set(OpCode::StructMethod, Vm::op_method);
    set(OpCode::CopyValue, op_copy_value);

    set(OpCode::DefinePropertyWithObservers, Vm::op_define_property_with_observers);

    set(OpCode::Enum, Vm::op_enum);
    set(OpCode::EnumCase, Vm::op_enum_case);
    set(OpCode::MatchEnumCase, Vm::op_match_enum_case);
    set(OpCode::GetAssociated, Vm::op_get_associated);

    set(OpCode::Protocol, Vm::op_protocol);

    set(OpCode::TypeCheck, Vm::op_type_check);
    set(OpCode::TypeCast, Vm::op_type_cast);
    set(OpCode::TypeCastOptional, Vm::op_type_cast_optional);
    set(OpCode::TypeCastForced, Vm::op_type_cast_forced);

    set(OpCode::Throw, op_throw);
    set(OpCode::ReadLine, op_read_line);
    set(OpCode::Print, op_print);
    set(OpCode::Halt, op_halt);

    table
}

// --- Constants & stack ---

fn op_constant(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    let value = vm.read_constant();
    vm.push(value);
    Ok(Flow::Continue)
}

fn op_string(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    let text = vm.read_string();
    let value = vm.alloc_string(text);
    vm.push(value);
    Ok(Flow::Continue)
}

fn op_nil(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    vm.push(Value::Nil);
    Ok(Flow::Continue)
}

fn op_true(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    vm.push(Value::Bool(true));
    Ok(Flow::Continue)
}

fn op_false(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    vm.push(Value::Bool(false));
    Ok(Flow::Continue)
}

fn op_pop(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    vm.pop();
    Ok(Flow::Continue)
}

fn op_dup(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    let value = vm.peek(0);
    vm.push(value);
    Ok(Flow::Continue)
}

// --- Arithmetic ---
//
// Int op Int stays Int; mixing promotes to Float. A non-numeric left
// operand falls back to an operator-overload method on its type before the
// error surfaces.

fn op_add(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    let b = vm.pop();
    let a = vm.pop();
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => {
            vm.push(Value::Int(x.wrapping_add(y)));
            Ok(Flow::Continue)
        }
        _ => {
            if let (Some(x), Some(y)) = (a.as_float(), b.as_float()) {
                vm.push(Value::Float(x + y));
                return Ok(Flow::Continue);
            }
            // String concatenation stringifies the other operand.
            if vm.string_value(a).is_some() || vm.string_value(b).is_some() {
                let text = format!("{}{}", vm.format_value(a), vm.format_value(b));
                let value = vm.alloc_string(text);
                vm.push(value);
                return Ok(Flow::Continue);
            }
            vm.binary_overload_or_error(a, b, "+")
        }
    }
}

fn op_subtract(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    vm.arithmetic("-", i64::wrapping_sub, |x, y| x - y)
}

fn op_multiply(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    vm.arithmetic("*", i64::wrapping_mul, |x, y| x * y)
}

fn op_divide(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    let b = vm.pop();
    let a = vm.pop();
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => {
            if y == 0 {
                return Err(RuntimeError::DivisionByZero(vm.current_line()));
            }
            vm.push(Value::Int(x / y));
            Ok(Flow::Continue)
        }
        _ => {
            if let (Some(x), Some(y)) = (a.as_float(), b.as_float()) {
                // Float division follows IEEE-754: infinities and NaN, no
                // error.
                vm.push(Value::Float(x / y));
                return Ok(Flow::Continue);
            }
            vm.binary_overload_or_error(a, b, "/")
        }
    }
}

fn op_modulo(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    let b = vm.pop();
    let a = vm.pop();
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => {
            if y == 0 {
                return Err(RuntimeError::DivisionByZero(vm.current_line()));
            }
            vm.push(Value::Int(x % y));
            Ok(Flow::Continue)
        }
        _ => {
            if let (Some(x), Some(y)) = (a.as_float(), b.as_float()) {
                vm.push(Value::Float(x % y));
                return Ok(Flow::Continue);
            }
            vm.binary_overload_or_error(a, b, "%")
        }
    }
}

fn op_negate(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    let value = vm.pop();
    match value {
        Value::Int(n) => vm.push(Value::Int(-n)),
        Value::Float(n) => vm.push(Value::Float(-n)),
        _ => {
            return Err(RuntimeError::type_error(
                format!("Cannot negate {}", vm.type_name_of(value)),
                vm.current_line(),
            ))
        }
    }
    Ok(Flow::Continue)
}

// --- Bitwise ---

fn op_bitwise_not(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    let value = vm.pop();
    match value.as_int() {
        Some(n) => {
            vm.push(Value::Int(!n));
            Ok(Flow::Continue)
        }
        None => Err(RuntimeError::type_error(
            format!("Cannot apply '~' to {}", vm.type_name_of(value)),
            vm.current_line(),
        )),
    }
}

fn op_bitwise_and(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    vm.bitwise("&", |x, y| x & y)
}

fn op_bitwise_or(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    vm.bitwise("|", |x, y| x | y)
}

fn op_bitwise_xor(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    vm.bitwise("^", |x, y| x ^ y)
}

fn op_left_shift(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    vm.bitwise("<<", |x, y| x.wrapping_shl(y as u32))
}

fn op_right_shift(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    vm.bitwise(">>", |x, y| x.wrapping_shr(y as u32))
}

// --- Comparison ---

fn op_equal(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    let b = vm.pop();
    let a = vm.pop();
    if let Some(flow) = vm.try_comparison_overload(a, b, "==")? {
        return Ok(flow);
    }
    let result = vm.values_equal(a, b);
    vm.push(Value::Bool(result));
    Ok(Flow::Continue)
}

fn op_not_equal(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    let b = vm.pop();
    let a = vm.pop();
    if let Some(flow) = vm.try_comparison_overload(a, b, "!=")? {
        return Ok(flow);
    }
    let result = !vm.values_equal(a, b);
    vm.push(Value::Bool(result));
    Ok(Flow::Continue)
}

fn op_less(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    vm.comparison("<", |o| o == std::cmp::Ordering::Less)
}

fn op_greater(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    vm.comparison(">", |o| o == std::cmp::Ordering::Greater)
}

fn op_less_equal(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    vm.comparison("<=", |o| o != std::cmp::Ordering::Greater)
}

fn op_greater_equal(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    vm.comparison(">=", |o| o != std::cmp::Ordering::Less)
}

fn op_not(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    let value = vm.pop();
    vm.push(Value::Bool(!value.is_truthy()));
    Ok(Flow::Continue)
}

// --- Variables ---

fn op_get_global(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    let name = vm.read_string();
    match vm.globals.get(&name) {
        Some(value) => {
            let value = *value;
            vm.push(value);
            Ok(Flow::Continue)
        }
        None => Err(RuntimeError::UndefinedVariable(name, vm.current_line())),
    }
}

fn op_set_global(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    let name = vm.read_string();
    let value = vm.peek(0);
    if !vm.globals.contains_key(&name) {
        return Err(RuntimeError::UndefinedVariable(name, vm.current_line()));
    }
    vm.define_global(&name, value);
    Ok(Flow::Continue)
}

fn op_define_global(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    let name = vm.read_string();
    let value = vm.pop();
    vm.define_global(&name, value);
    Ok(Flow::Continue)
}

fn op_get_local(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    let slot = vm.read_u16() as usize;
    let base = vm.frame().base;
    let value = vm.stack[base + slot];
    vm.push(value);
    Ok(Flow::Continue)
}

fn op_set_local(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    let slot = vm.read_u16() as usize;
    let base = vm.frame().base;
    let value = vm.peek(0);
    vm.set_stack(base + slot, value);
    Ok(Flow::Continue)
}

// --- Control flow ---

fn op_jump(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    let offset = vm.read_u16() as usize;
    vm.frame_mut().ip += offset;
    Ok(Flow::Continue)
}

fn op_jump_if_false(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    let offset = vm.read_u16() as usize;
    if !vm.peek(0).is_truthy() {
        vm.frame_mut().ip += offset;
    }
    Ok(Flow::Continue)
}

fn op_jump_if_nil(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    let offset = vm.read_u16() as usize;
    if vm.peek(0).is_nil() {
        vm.frame_mut().ip += offset;
    }
    Ok(Flow::Continue)
}

fn op_loop(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    let offset = vm.read_u16() as usize;
    vm.frame_mut().ip -= offset;
    Ok(Flow::Continue)
}

// --- Functions ---

fn op_function(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    let proto = vm.read_u16();
    let id = vm
        .heap
        .alloc(Object::Function(crate::vm::object::FunctionObject { proto }));
    vm.push(Value::Obj(id));
    Ok(Flow::Continue)
}

fn op_closure(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    let proto_idx = vm.read_u16();
    let descriptors = vm.assembly.protos[proto_idx as usize].upvalues.clone();

    let mut upvalues = Vec::with_capacity(descriptors.len());
    for descriptor in descriptors {
        let id = if descriptor.is_local {
            let slot = vm.frame().base + descriptor.index as usize;
            vm.capture_upvalue(slot)
        } else {
            let closure = vm.frame().closure.expect("closure frame expected");
            match vm.heap.get(closure) {
                Some(Object::Closure(c)) => c.upvalues[descriptor.index as usize],
                _ => {
                    return Err(RuntimeError::new(
                        "Corrupt closure environment",
                        vm.current_line(),
                    ))
                }
            }
        };
        vm.heap.retain(Value::Obj(id));
        upvalues.push(id);
    }

    let id = vm.heap.alloc(Object::Closure(crate::vm::object::ClosureObject {
        proto: proto_idx,
        upvalues,
    }));
    vm.push(Value::Obj(id));
    Ok(Flow::Continue)
}

fn op_call(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    let argc = vm.read_byte() as usize;
    vm.call_value(argc)?;
    Ok(Flow::Continue)
}

fn op_call_named(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    let argc = vm.read_byte() as usize;
    let mut labels = Vec::with_capacity(argc);
    for _ in 0..argc {
        let idx = vm.read_u16();
        if idx == NO_LABEL {
            labels.push(None);
        } else {
            labels.push(Some(vm.assembly.strings[idx as usize].clone()));
        }
    }
    vm.call_named(argc, labels)?;
    Ok(Flow::Continue)
}

fn op_return(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    let mut result = vm.pop();
    let frame = vm.frames.pop().expect("return without frame");

    // Initializers always return the fresh instance in the callee slot.
    if frame.is_initializer {
        result = vm.stack[frame.base];
    }

    // The result must survive the stack truncation below.
    vm.heap.retain(result);
    vm.close_upvalues(frame.base);
    vm.truncate_stack(frame.base);
    vm.stack.push(result); // ownership transferred from the retain above

    if vm.frames.is_empty() {
        return Ok(Flow::Halt);
    }
    Ok(Flow::Continue)
}

// --- Upvalues ---

fn op_get_upvalue(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    let idx = vm.read_u16() as usize;
    let closure = vm.frame().closure.expect("closure frame expected");
    let upvalue = match vm.heap.get(closure) {
        Some(Object::Closure(c)) => c.upvalues[idx],
        _ => return Err(RuntimeError::new("Corrupt closure environment", vm.current_line())),
    };
    let value = vm.upvalue_get(upvalue);
    vm.push(value);
    Ok(Flow::Continue)
}

fn op_set_upvalue(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    let idx = vm.read_u16() as usize;
    let closure = vm.frame().closure.expect("closure frame expected");
    let upvalue = match vm.heap.get(closure) {
        Some(Object::Closure(c)) => c.upvalues[idx],
        _ => return Err(RuntimeError::new("Corrupt closure environment", vm.current_line())),
    };
    let value = vm.peek(0);
    vm.upvalue_set(upvalue, value);
    Ok(Flow::Continue)
}

fn op_close_upvalue(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    let slot = vm.stack.len() - 1;
    vm.close_upvalues(slot);
    vm.pop();
    Ok(Flow::Continue)
}

// --- Optionals & chaining ---

fn op_optional_chain(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    let offset = vm.read_u16() as usize;
    if vm.peek(0).is_nil() {
        vm.frame_mut().ip += offset;
    }
    Ok(Flow::Continue)
}

fn op_unwrap(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    if vm.peek(0).is_nil() {
        return Err(RuntimeError::new(
            "Unexpectedly found nil while unwrapping",
            vm.current_line(),
        ));
    }
    Ok(Flow::Continue)
}

fn op_nil_coalesce(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    let offset = vm.read_u16() as usize;
    if vm.peek(0).is_nil() {
        vm.pop();
    } else {
        vm.frame_mut().ip += offset;
    }
    Ok(Flow::Continue)
}

// --- Ranges ---

fn op_range_inclusive(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    range_list(vm, true)
}

fn op_range_exclusive(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    range_list(vm, false)
}

/// Materialize a range as a list of Ints; `for-in` headers and switch
/// range patterns compile to bounds tests instead and never reach here.
fn range_list(vm: &mut Vm, inclusive: bool) -> Result<Flow, RuntimeError> {
    let end = vm.pop();
    let start = vm.pop();
    let (Some(start), Some(end)) = (start.as_int(), end.as_int()) else {
        return Err(RuntimeError::type_error(
            "Range bounds must be Int",
            vm.current_line(),
        ));
    };
    let upper = if inclusive { end + 1 } else { end };
    let elements: Vec<Value> = (start..upper).map(Value::Int).collect();
    let id = vm.heap.alloc(Object::List(elements));
    vm.push(Value::Obj(id));
    Ok(Flow::Continue)
}

// --- Collections ---

fn op_array(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    let count = vm.read_u16() as usize;
    let mut elements = Vec::with_capacity(count);
    for _ in 0..count {
        elements.push(vm.pop());
    }
    elements.reverse();
    for element in &elements {
        vm.heap.retain(*element);
    }
    let id = vm.heap.alloc(Object::List(elements));
    vm.push(Value::Obj(id));
    Ok(Flow::Continue)
}

fn op_dict(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    let count = vm.read_u16() as usize;
    let mut pairs = Vec::with_capacity(count);
    for _ in 0..count {
        let value = vm.pop();
        let key = vm.pop();
        pairs.push((key, value));
    }
    pairs.reverse();

    let mut entries = indexmap::IndexMap::new();
    for (key, value) in pairs {
        let key = vm.map_key(key)?;
        vm.heap.retain(value);
        if let Some(old) = entries.insert(key, value) {
            vm.heap.release(old);
        }
    }
    let id = vm.heap.alloc(Object::Map(entries));
    vm.push(Value::Obj(id));
    Ok(Flow::Continue)
}

fn op_get_subscript(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    let index = vm.pop();
    let object = vm.pop();
    let line = vm.current_line();

    let result = match vm.object_type_of(object) {
        Some(crate::vm::object::ObjectType::List) => {
            let Some(i) = index.as_int() else {
                return Err(RuntimeError::type_error("Array index must be Int", line));
            };
            let Some(Object::List(elements)) = object.as_obj().and_then(|id| vm.heap.get(id))
            else {
                unreachable!()
            };
            if i < 0 || i as usize >= elements.len() {
                return Err(RuntimeError::new(
                    format!("Index {} out of bounds (count {})", i, elements.len()),
                    line,
                ));
            }
            elements[i as usize]
        }
        Some(crate::vm::object::ObjectType::Map) => {
            let key = vm.map_key(index)?;
            let Some(Object::Map(entries)) = object.as_obj().and_then(|id| vm.heap.get(id))
            else {
                unreachable!()
            };
            entries.get(&key).copied().unwrap_or(Value::Nil)
        }
        Some(crate::vm::object::ObjectType::String) => {
            let Some(i) = index.as_int() else {
                return Err(RuntimeError::type_error("String index must be Int", line));
            };
            let text = vm
                .string_value(object)
                .map(|s| s.to_string())
                .unwrap_or_default();
            match text.chars().nth(i.max(0) as usize) {
                Some(c) => vm.alloc_string(c.to_string()),
                None => {
                    return Err(RuntimeError::new(
                        format!("Index {} out of bounds", i),
                        line,
                    ))
                }
            }
        }
        Some(crate::vm::object::ObjectType::Tuple) => {
            let Some(i) = index.as_int() else {
                return Err(RuntimeError::type_error("Tuple index must be Int", line));
            };
            let Some(Object::Tuple(tuple)) = object.as_obj().and_then(|id| vm.heap.get(id))
            else {
                unreachable!()
            };
            tuple.elements.get(i.max(0) as usize).copied().ok_or_else(|| {
                RuntimeError::new(format!("Index {} out of bounds", i), line)
            })?
        }
        _ => {
            return Err(RuntimeError::type_error(
                format!("{} is not subscriptable", vm.type_name_of(object)),
                line,
            ))
        }
    };
    vm.push(result);
    Ok(Flow::Continue)
}

fn op_set_subscript(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    let value = vm.pop();
    let index = vm.pop();
    let object = vm.pop();
    let line = vm.current_line();

    // Struct values stored into containers are copied.
    let value = vm.deep_copy_value(value);

    match vm.object_type_of(object) {
        Some(crate::vm::object::ObjectType::List) => {
            let Some(i) = index.as_int() else {
                return Err(RuntimeError::type_error("Array index must be Int", line));
            };
            vm.heap.retain(value);
            let old = {
                let Some(Object::List(elements)) =
                    object.as_obj().and_then(|id| vm.heap.get_mut(id))
                else {
                    unreachable!()
                };
                if i < 0 || i as usize >= elements.len() {
                    let count = elements.len();
                    return Err(RuntimeError::new(
                        format!("Index {} out of bounds (count {})", i, count),
                        line,
                    ));
                }
                std::mem::replace(&mut elements[i as usize], value)
            };
            vm.heap.release(old);
        }
        Some(crate::vm::object::ObjectType::Map) => {
            let key = vm.map_key(index)?;
            vm.heap.retain(value);
            let old = {
                let Some(Object::Map(entries)) =
                    object.as_obj().and_then(|id| vm.heap.get_mut(id))
                else {
                    unreachable!()
                };
                entries.insert(key, value)
            };
            if let Some(old) = old {
                vm.heap.release(old);
            }
        }
        _ => {
            return Err(RuntimeError::type_error(
                format!("{} is not subscript-assignable", vm.type_name_of(object)),
                line,
            ))
        }
    }
    vm.push(value);
    Ok(Flow::Continue)
}

// --- Tuples ---

fn op_tuple(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    let count = vm.read_byte() as usize;
    let mut labels = Vec::with_capacity(count);
    for _ in 0..count {
        let idx = vm.read_u16();
        if idx == NO_LABEL {
            labels.push(None);
        } else {
            labels.push(Some(vm.assembly.strings[idx as usize].clone()));
        }
    }
    let mut elements = Vec::with_capacity(count);
    for _ in 0..count {
        elements.push(vm.pop());
    }
    elements.reverse();
    for element in &elements {
        vm.heap.retain(*element);
    }
    let id = vm.heap.alloc(Object::Tuple(TupleObject { elements, labels }));
    vm.push(Value::Obj(id));
    Ok(Flow::Continue)
}

fn op_get_tuple_index(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    let index = vm.read_u16() as usize;
    let object = vm.pop();
    let line = vm.current_line();
    let Some(Object::Tuple(tuple)) = object.as_obj().and_then(|id| vm.heap.get(id)) else {
        return Err(RuntimeError::type_error(
            format!("{} is not a tuple", vm.type_name_of(object)),
            line,
        ));
    };
    let value = tuple.elements.get(index).copied().ok_or_else(|| {
        RuntimeError::new(
            format!("Tuple has no element {} (count {})", index, tuple.elements.len()),
            line,
        )
    })?;
    vm.push(value);
    Ok(Flow::Continue)
}

fn op_get_tuple_label(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    let label = vm.read_string();
    let object = vm.pop();
    let value = vm.tuple_label_lookup(object, &label)?;
    vm.push(value);
    Ok(Flow::Continue)
}

// --- Struct value semantics ---

fn op_copy_value(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    let value = vm.pop();
    let copy = vm.deep_copy_value(value);
    vm.push(copy);
    Ok(Flow::Continue)
}

// --- Errors & I/O ---

fn op_throw(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    let value = vm.pop();
    Err(RuntimeError::ScriptThrow {
        value: vm.format_value(value),
        line: vm.current_line(),
    })
}

fn op_read_line(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    let mut line = String::new();
    match std::io::stdin().read_line(&mut line) {
        Ok(0) => vm.push(Value::Nil),
        Ok(_) => {
            let trimmed = line.trim_end_matches(['\n', '\r']).to_string();
            let value = vm.alloc_string(trimmed);
            vm.push(value);
        }
        Err(_) => vm.push(Value::Nil),
    }
    Ok(Flow::Continue)
}

fn op_print(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    let count = vm.read_byte() as usize;
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push(vm.pop());
    }
    values.reverse();
    let text = values
        .iter()
        .map(|v| vm.format_value(*v))
        .collect::<Vec<_>>()
        .join(" ");
    vm.write_line(text);
    Ok(Flow::Continue)
}

fn op_halt(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    vm.push(Value::Nil);
    Ok(Flow::Halt)
}

// --- Shared arithmetic helpers ---

impl Vm {
    fn arithmetic(
        &mut self,
        name: &str,
        int_op: fn(i64, i64) -> i64,
        float_op: fn(f64, f64) -> f64,
    ) -> Result<Flow, RuntimeError> {
        let b = self.pop();
        let a = self.pop();
        match (a, b) {
            (Value::Int(x), Value::Int(y)) => {
                self.push(Value::Int(int_op(x, y)));
                Ok(Flow::Continue)
            }
            _ => {
                if let (Some(x), Some(y)) = (a.as_float(), b.as_float()) {
                    self.push(Value::Float(float_op(x, y)));
                    return Ok(Flow::Continue);
                }
                self.binary_overload_or_error(a, b, name)
            }
        }
    }

    fn bitwise(&mut self, name: &str, op: fn(i64, i64) -> i64) -> Result<Flow, RuntimeError> {
        let b = self.pop();
        let a = self.pop();
        match (a.as_int(), b.as_int()) {
            (Some(x), Some(y)) => {
                self.push(Value::Int(op(x, y)));
                Ok(Flow::Continue)
            }
            _ => Err(RuntimeError::type_error(
                format!(
                    "Operands to '{}' must be Int, got {} and {}",
                    name,
                    self.type_name_of(a),
                    self.type_name_of(b)
                ),
                self.current_line(),
            )),
        }
    }

    fn comparison(
        &mut self,
        name: &str,
        accept: fn(std::cmp::Ordering) -> bool,
    ) -> Result<Flow, RuntimeError> {
        let b = self.pop();
        let a = self.pop();

        if let (Some(x), Some(y)) = (a.as_float(), b.as_float()) {
            let ordering = x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Greater);
            self.push(Value::Bool(accept(ordering)));
            return Ok(Flow::Continue);
        }
        if let (Some(x), Some(y)) = (self.string_value(a), self.string_value(b)) {
            let ordering = x.cmp(y);
            self.push(Value::Bool(accept(ordering)));
            return Ok(Flow::Continue);
        }
        self.binary_overload_or_error(a, b, name)
    }

    /// Comparison overload check for `==`/`!=` only when the left operand's
    /// type declares one; structural equality otherwise.
    fn try_comparison_overload(
        &mut self,
        a: Value,
        b: Value,
        name: &str,
    ) -> Result<Option<Flow>, RuntimeError> {
        if self.find_operator_method(a, name).is_some() {
            let flow = self.binary_overload_or_error(a, b, name)?;
            return Ok(Some(flow));
        }
        Ok(None)
    }

    /// Dispatch a binary operator to a method named after it on the left
    /// operand's type; a missing method is a type error.
    pub(crate) fn binary_overload_or_error(
        &mut self,
        a: Value,
        b: Value,
        name: &str,
    ) -> Result<Flow, RuntimeError> {
        if let Some(method) = self.find_operator_method(a, name) {
            let result = self.call_function_value(Value::Obj(method), a, &[b])?;
            self.push(result);
            return Ok(Flow::Continue);
        }
        Err(RuntimeError::type_error(
            format!(
                "Operands to '{}' must be numbers, got {} and {}",
                name,
                self.type_name_of(a),
                self.type_name_of(b)
            ),
            self.current_line(),
        ))
    }

    /// Look up an operator method (`+`, `==`, …) on the left operand's
    /// type, walking the class chain.
    fn find_operator_method(&self, value: Value, name: &str) -> Option<crate::vm::ObjId> {
        let id = value.as_obj()?;
        let instance = match self.heap.get(id)? {
            Object::Instance(instance) | Object::StructInstance(instance) => instance,
            _ => return None,
        };
        let mut current = Some(instance.type_obj);
        while let Some(type_id) = current {
            match self.heap.get(type_id)? {
                Object::Class(ty) | Object::Struct(ty) => {
                    if let Some(slot) = ty.methods.get(name) {
                        return Some(slot.closure);
                    }
                    current = ty.superclass;
                }
                _ => return None,
            }
        }
        None
    }
}

/// The table registers a handler for every defined opcode.
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_opcode_has_a_handler() {
        for byte in 0..OpCode::COUNT as u8 {
            assert!(
                DISPATCH[byte as usize].is_some(),
                "opcode {:#04x} has no handler",
                byte
            );
        }
    }

    #[test]
    fn test_bytes_past_the_opcode_range_have_none() {
        for byte in OpCode::COUNT..256 {
            assert!(DISPATCH[byte].is_none());
        }
    }

    #[test]
    fn test_map_key_rejects_float() {
        let vm = Vm::new();
        assert!(vm.map_key(Value::Float(1.5)).is_err());
    }
}

//! The stack machine: call frames, the dispatch loop, and runtime
//! services shared by the opcode handlers.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::bytecode::assembly::{Assembly, Const, FunctionProto, MethodBody};
use crate::debug::DebugController;
use crate::error::RuntimeError;
use crate::vm::heap::Heap;
use crate::vm::object::{
    InstanceObject, MapKey, Object, ObjectType, UpvalueState,
};
use crate::vm::value::{ObjId, Value};

pub use crate::vm::object::NativeFn;

/// VM configuration.
#[derive(Debug, Clone, Default)]
pub struct VmConfig {
    /// Collect `print` output in `Vm::output` instead of writing stdout.
    pub capture_output: bool,
}

/// A call frame. `base` is the stack index of the callee slot; locals are
/// addressed relative to it, with slot 0 holding `self` in methods.
pub struct CallFrame {
    pub closure: Option<ObjId>,
    pub proto: u16,
    pub ip: usize,
    pub base: usize,
    pub is_initializer: bool,
}

/// What a handler tells the dispatch loop to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// The outermost frame returned or `HALT` executed.
    Halt,
}

/// The virtual machine.
pub struct Vm {
    pub(crate) assembly: Assembly,
    pub(crate) heap: Heap,
    pub(crate) stack: Vec<Value>,
    pub(crate) frames: Vec<CallFrame>,
    pub(crate) globals: IndexMap<String, Value>,
    /// Open upvalues as (stack slot, upvalue object), sorted by slot.
    pub(crate) open_upvalues: Vec<(usize, ObjId)>,
    pub(crate) debugger: Option<Arc<DebugController>>,
    registered_natives: Vec<(String, NativeFn)>,
    config: VmConfig,
    /// Captured `print` lines when `capture_output` is set.
    pub output: Vec<String>,
}

impl Vm {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        let mut vm = Self {
            assembly: Assembly::new(),
            heap: Heap::new(),
            stack: Vec::with_capacity(256),
            frames: Vec::with_capacity(64),
            globals: IndexMap::new(),
            open_upvalues: Vec::new(),
            debugger: None,
            registered_natives: Vec::new(),
            config,
            output: Vec::new(),
        };
        vm.register_native("String", natives::to_string);
        vm.register_native("Int", natives::to_int);
        vm.register_native("Float", natives::to_float);
        vm
    }

    /// Expose a host callable to scripts as a global function.
    pub fn register_native(&mut self, name: &str, func: NativeFn) {
        self.registered_natives.push((name.to_string(), func));
    }

    /// Attach a debug controller consulted between instructions.
    pub fn attach_debugger(&mut self, controller: Arc<DebugController>) {
        self.debugger = Some(controller);
    }

    /// Execute an assembly's top-level script and return its result value.
    /// Runtime errors unwind every frame, close open upvalues, and drain
    /// the deferred-release queue before returning.
    pub fn interpret(&mut self, assembly: Assembly) -> Result<Value, RuntimeError> {
        assembly
            .validate()
            .map_err(|e| RuntimeError::new(format!("Invalid assembly: {}", e), 0))?;
        self.assembly = assembly;

        for (name, func) in self.registered_natives.clone() {
            let id = self.heap.alloc(Object::Native(crate::vm::object::NativeObject {
                name: name.clone(),
                func,
            }));
            self.heap.retain(Value::Obj(id));
            self.define_global(&name, Value::Obj(id));
        }

        let main = self.assembly.main;
        let function = self.heap.alloc(Object::Function(
            crate::vm::object::FunctionObject { proto: main },
        ));
        self.push(Value::Obj(function));
        self.frames.push(CallFrame {
            closure: None,
            proto: main,
            ip: 0,
            base: 0,
            is_initializer: false,
        });

        let result = self.run_until(0);
        if result.is_err() {
            self.unwind();
        }
        result
    }

    /// The dispatch loop: read a byte, look up the handler, invoke it, and
    /// drain deferred releases. Runs until the frame stack shrinks to
    /// `target_depth` (the result value is then on top of the stack).
    pub(crate) fn run_until(&mut self, target_depth: usize) -> Result<Value, RuntimeError> {
        loop {
            if let Some(controller) = self.debugger.clone() {
                self.debug_hook(&controller);
            }

            let opcode = self.read_byte();
            let handler = crate::vm::dispatch::DISPATCH[opcode as usize].ok_or_else(|| {
                RuntimeError::UnimplementedOpcode {
                    opcode,
                    line: self.current_line(),
                }
            })?;
            let flow = handler(self)?;

            if self.heap.has_deferred() {
                self.drain_deferred()?;
            }

            if flow == Flow::Halt || self.frames.len() == target_depth {
                let result = self.pop();
                return Ok(result);
            }
        }
    }

    /// Abandon all frames after a runtime error: close upvalues, clear the
    /// stack, and drain pending releases.
    fn unwind(&mut self) {
        self.close_upvalues(0);
        self.truncate_stack(0);
        self.frames.clear();
        let _ = self.drain_deferred();
    }

    // --- Cursor helpers ---

    pub(crate) fn frame(&self) -> &CallFrame {
        self.frames.last().expect("no active call frame")
    }

    pub(crate) fn frame_mut(&mut self) -> &mut CallFrame {
        self.frames.last_mut().expect("no active call frame")
    }

    pub(crate) fn proto(&self) -> &FunctionProto {
        &self.assembly.protos[self.frame().proto as usize]
    }

    pub(crate) fn body(&self) -> &MethodBody {
        &self.assembly.bodies[self.proto().body as usize]
    }

    pub(crate) fn read_byte(&mut self) -> u8 {
        let byte = self.body().code[self.frame().ip];
        self.frame_mut().ip += 1;
        byte
    }

    pub(crate) fn read_u16(&mut self) -> u16 {
        let ip = self.frame().ip;
        let value = self.body().read_u16(ip);
        self.frame_mut().ip += 2;
        value
    }

    /// Resolve a u16 operand against the string table.
    pub(crate) fn read_string(&mut self) -> String {
        let idx = self.read_u16();
        self.assembly.strings[idx as usize].clone()
    }

    /// Resolve a u16 operand against the constant pool.
    pub(crate) fn read_constant(&mut self) -> Value {
        let idx = self.read_u16();
        self.constant_value(idx)
    }

    pub(crate) fn constant_value(&mut self, idx: u16) -> Value {
        match self.assembly.constants[idx as usize].clone() {
            Const::Nil => Value::Nil,
            Const::Bool(b) => Value::Bool(b),
            Const::Int(n) => Value::Int(n),
            Const::Float(n) => Value::Float(n),
            Const::Str(s) => {
                let text = self.assembly.strings[s as usize].clone();
                Value::Obj(self.heap.alloc(Object::String(text)))
            }
        }
    }

    /// Line number of the instruction currently executing.
    pub(crate) fn current_line(&self) -> u32 {
        if self.frames.is_empty() {
            return 0;
        }
        let ip = self.frame().ip.saturating_sub(1);
        self.body().line_at(ip)
    }

    // --- Stack discipline ---
    //
    // Every stack slot owns a strong reference: pushing retains, popping
    // releases. Popped objects stay alive until the end-of-instruction
    // drain, so handlers may freely use the values they pop.

    pub(crate) fn push(&mut self, value: Value) {
        self.heap.retain(value);
        self.stack.push(value);
    }

    pub(crate) fn pop(&mut self) -> Value {
        let value = self.stack.pop().expect("stack underflow");
        self.heap.release(value);
        value
    }

    pub(crate) fn peek(&self, distance: usize) -> Value {
        self.stack[self.stack.len() - 1 - distance]
    }

    pub(crate) fn set_stack(&mut self, index: usize, value: Value) {
        self.heap.retain(value);
        let old = std::mem::replace(&mut self.stack[index], value);
        self.heap.release(old);
    }

    pub(crate) fn truncate_stack(&mut self, len: usize) {
        while self.stack.len() > len {
            let value = self.stack.pop().expect("stack underflow");
            self.heap.release(value);
        }
    }

    pub(crate) fn define_global(&mut self, name: &str, value: Value) {
        self.heap.retain(value);
        if let Some(old) = self.globals.insert(name.to_string(), value) {
            self.heap.release(old);
        }
    }

    // --- Upvalues ---

    /// Find or create the upvalue object for a live stack slot. Closures
    /// capturing the same slot share the same object.
    pub(crate) fn capture_upvalue(&mut self, slot: usize) -> ObjId {
        for (open_slot, id) in &self.open_upvalues {
            if *open_slot == slot && self.heap.is_live(*id) {
                return *id;
            }
        }
        let id = self.heap.alloc(Object::Upvalue(UpvalueState::Open(slot)));
        let position = self
            .open_upvalues
            .partition_point(|(open_slot, _)| *open_slot < slot);
        self.open_upvalues.insert(position, (slot, id));
        id
    }

    /// Close every open upvalue at or above `from_slot`: the captured value
    /// moves off the stack into the upvalue object.
    pub(crate) fn close_upvalues(&mut self, from_slot: usize) {
        let mut kept = Vec::with_capacity(self.open_upvalues.len());
        let open = std::mem::take(&mut self.open_upvalues);
        for (slot, id) in open {
            if slot < from_slot {
                kept.push((slot, id));
                continue;
            }
            if !self.heap.is_live(id) {
                continue;
            }
            // During error unwinding the slot may already be gone.
            let value = self.stack.get(slot).copied().unwrap_or(Value::Nil);
            self.heap.retain(value);
            if let Some(Object::Upvalue(state)) = self.heap.get_mut(id) {
                *state = UpvalueState::Closed(value);
            }
        }
        self.open_upvalues = kept;
    }

    pub(crate) fn upvalue_get(&self, id: ObjId) -> Value {
        match self.heap.get(id) {
            Some(Object::Upvalue(UpvalueState::Open(slot))) => self.stack[*slot],
            Some(Object::Upvalue(UpvalueState::Closed(value))) => *value,
            _ => Value::Nil,
        }
    }

    pub(crate) fn upvalue_set(&mut self, id: ObjId, value: Value) {
        match self.heap.get(id) {
            Some(Object::Upvalue(UpvalueState::Open(slot))) => {
                let slot = *slot;
                self.set_stack(slot, value);
            }
            Some(Object::Upvalue(UpvalueState::Closed(_))) => {
                self.heap.retain(value);
                if let Some(Object::Upvalue(state)) = self.heap.get_mut(id) {
                    if let UpvalueState::Closed(old) = std::mem::replace(
                        state,
                        UpvalueState::Closed(value),
                    ) {
                        self.heap.release(old);
                    }
                }
            }
            _ => {}
        }
    }

    // --- Deferred release ---

    /// Destroy queued dead objects, running `deinit` bodies first. Runs
    /// after every instruction so destructor chains never interleave with
    /// a handler.
    pub(crate) fn drain_deferred(&mut self) -> Result<(), RuntimeError> {
        while let Some(id) = self.heap.take_deferred() {
            if !self.heap.is_free_candidate(id) {
                continue;
            }
            if let Some(deinit) = self.pending_deinit(id) {
                self.heap.resurrect(id);
                if let Some(Object::Instance(instance)) = self.heap.get_mut(id) {
                    instance.deinit_run = true;
                }
                self.call_function_value(Value::Obj(deinit), Value::Obj(id), &[])?;
                self.heap.release(Value::Obj(id));
                continue; // re-queued by the release above
            }
            self.heap.free(id);
        }
        Ok(())
    }

    /// The deinit closure to run for a dying instance, walking the class
    /// chain, unless it already ran.
    fn pending_deinit(&self, id: ObjId) -> Option<ObjId> {
        let Some(Object::Instance(instance)) = self.heap.get(id) else {
            return None;
        };
        if instance.deinit_run {
            return None;
        }
        let mut current = Some(instance.type_obj);
        while let Some(type_id) = current {
            let Some(Object::Class(ty)) = self.heap.get(type_id) else {
                break;
            };
            if let Some(slot) = ty.methods.get("deinit") {
                return Some(slot.closure);
            }
            current = ty.superclass;
        }
        None
    }

    // --- Reentrant calls ---
    //
    // Observers, computed properties, default-value thunks, operator
    // overloads, and deinit bodies run through a nested dispatch loop that
    // returns when the inner frame pops.

    pub(crate) fn call_function_value(
        &mut self,
        callee: Value,
        receiver: Value,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        let depth = self.frames.len();
        self.push(callee);
        for arg in args {
            self.push(*arg);
        }
        let pushed_frame = self.call_value_with_receiver(args.len(), Some(receiver))?;
        if pushed_frame {
            self.run_until(depth)
        } else {
            Ok(self.pop())
        }
    }

    // --- Equality & rendering ---

    /// Structural equality: leaves by value (with Int→Float widening),
    /// strings by content, enum cases by type + case + payloads, all other
    /// objects by identity.
    pub(crate) fn values_equal(&self, a: Value, b: Value) -> bool {
        match (a, b) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Int(x), Value::Int(y)) => x == y,
            (Value::Float(x), Value::Float(y)) => x == y,
            (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => {
                x as f64 == y
            }
            (Value::Obj(x), Value::Obj(y)) => {
                if x == y {
                    return true;
                }
                match (self.heap.get(x), self.heap.get(y)) {
                    (Some(Object::String(s)), Some(Object::String(t))) => s == t,
                    (Some(Object::EnumCase(c)), Some(Object::EnumCase(d))) => {
                        c.enum_type == d.enum_type
                            && c.case_name == d.case_name
                            && c.associated.len() == d.associated.len()
                            && c.associated
                                .iter()
                                .zip(&d.associated)
                                .all(|(x, y)| self.values_equal(*x, *y))
                    }
                    _ => false,
                }
            }
            _ => false,
        }
    }

    pub(crate) fn type_name_of(&self, value: Value) -> String {
        match value {
            Value::Nil => "Nil".to_string(),
            Value::Bool(_) => "Bool".to_string(),
            Value::Int(_) => "Int".to_string(),
            Value::Float(_) => "Float".to_string(),
            Value::Obj(id) => match self.heap.get(id) {
                Some(Object::Instance(instance)) | Some(Object::StructInstance(instance)) => {
                    match self.heap.get(instance.type_obj) {
                        Some(Object::Class(ty)) | Some(Object::Struct(ty)) => ty.name.clone(),
                        _ => "Instance".to_string(),
                    }
                }
                Some(Object::EnumCase(case)) => match self.heap.get(case.enum_type) {
                    Some(Object::Enum(e)) => e.name.clone(),
                    _ => "EnumCase".to_string(),
                },
                Some(object) => object.object_type().to_string(),
                None => "Nil".to_string(),
            },
        }
    }

    /// Render a value for `print` and string concatenation.
    pub(crate) fn format_value(&self, value: Value) -> String {
        match value {
            Value::Nil => "nil".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(n) => n.to_string(),
            Value::Obj(id) => match self.heap.get(id) {
                None => "nil".to_string(),
                Some(Object::String(s)) => s.clone(),
                Some(Object::List(elements)) => {
                    let parts: Vec<String> =
                        elements.iter().map(|e| self.format_value(*e)).collect();
                    format!("[{}]", parts.join(", "))
                }
                Some(Object::Map(entries)) => {
                    if entries.is_empty() {
                        return "[:]".to_string();
                    }
                    let parts: Vec<String> = entries
                        .iter()
                        .map(|(k, v)| {
                            format!("{}: {}", self.format_map_key(k), self.format_value(*v))
                        })
                        .collect();
                    format!("[{}]", parts.join(", "))
                }
                Some(Object::Tuple(tuple)) => {
                    let parts: Vec<String> = tuple
                        .elements
                        .iter()
                        .zip(&tuple.labels)
                        .map(|(element, label)| match label {
                            Some(label) => {
                                format!("{}: {}", label, self.format_value(*element))
                            }
                            None => self.format_value(*element),
                        })
                        .collect();
                    format!("({})", parts.join(", "))
                }
                Some(Object::Function(function)) => {
                    let proto = &self.assembly.protos[function.proto as usize];
                    if proto.name.is_empty() {
                        "<fn>".to_string()
                    } else {
                        format!("<fn {}>", proto.name)
                    }
                }
                Some(Object::Closure(closure)) => {
                    let proto = &self.assembly.protos[closure.proto as usize];
                    if proto.name.is_empty() {
                        "<fn>".to_string()
                    } else {
                        format!("<fn {}>", proto.name)
                    }
                }
                Some(Object::BoundMethod(bound)) => {
                    format!("<bound method {}>", self.format_value(Value::Obj(bound.method)))
                }
                Some(Object::Class(ty)) => format!("<class {}>", ty.name),
                Some(Object::Struct(ty)) => format!("<struct {}>", ty.name),
                Some(Object::Enum(e)) => format!("<enum {}>", e.name),
                Some(Object::EnumCase(case)) => {
                    let enum_name = match self.heap.get(case.enum_type) {
                        Some(Object::Enum(e)) => e.name.clone(),
                        _ => String::new(),
                    };
                    if case.associated.is_empty() {
                        format!("{}.{}", enum_name, case.case_name)
                    } else {
                        let parts: Vec<String> = case
                            .associated
                            .iter()
                            .map(|v| self.format_value(*v))
                            .collect();
                        format!("{}.{}({})", enum_name, case.case_name, parts.join(", "))
                    }
                }
                Some(Object::Instance(instance)) | Some(Object::StructInstance(instance)) => {
                    let type_name = match self.heap.get(instance.type_obj) {
                        Some(Object::Class(ty)) | Some(Object::Struct(ty)) => ty.name.clone(),
                        _ => "?".to_string(),
                    };
                    format!("<{} instance>", type_name)
                }
                Some(Object::Protocol(protocol)) => {
                    let name = self
                        .assembly
                        .protocols
                        .get(protocol.def_index as usize)
                        .map(|p| self.assembly.strings[p.name as usize].clone())
                        .unwrap_or_default();
                    format!("<protocol {}>", name)
                }
                Some(Object::Upvalue(_)) => "<upvalue>".to_string(),
                Some(Object::Native(native)) => format!("<native fn {}>", native.name),
            },
        }
    }

    fn format_map_key(&self, key: &MapKey) -> String {
        match key {
            MapKey::Nil => "nil".to_string(),
            MapKey::Bool(b) => b.to_string(),
            MapKey::Int(n) => n.to_string(),
            MapKey::Str(s) => format!("\"{}\"", s),
        }
    }

    /// Convert a value to a map key, rejecting unhashable objects.
    pub(crate) fn map_key(&self, value: Value) -> Result<MapKey, RuntimeError> {
        match value {
            Value::Nil => Ok(MapKey::Nil),
            Value::Bool(b) => Ok(MapKey::Bool(b)),
            Value::Int(n) => Ok(MapKey::Int(n)),
            Value::Obj(id) => match self.heap.get(id) {
                Some(Object::String(s)) => Ok(MapKey::Str(s.clone())),
                _ => Err(RuntimeError::type_error(
                    format!("{} is not a valid dictionary key", self.type_name_of(value)),
                    self.current_line(),
                )),
            },
            Value::Float(_) => Err(RuntimeError::type_error(
                "Float is not a valid dictionary key",
                self.current_line(),
            )),
        }
    }

    pub(crate) fn alloc_string(&mut self, text: String) -> Value {
        Value::Obj(self.heap.alloc(Object::String(text)))
    }

    pub(crate) fn string_value(&self, value: Value) -> Option<&str> {
        match value {
            Value::Obj(id) => match self.heap.get(id) {
                Some(Object::String(s)) => Some(s),
                _ => None,
            },
            _ => None,
        }
    }

    pub(crate) fn object_type_of(&self, value: Value) -> Option<ObjectType> {
        value
            .as_obj()
            .and_then(|id| self.heap.get(id))
            .map(|o| o.object_type())
    }

    /// Deep copy for struct value semantics: nested struct fields copy
    /// recursively, class references are shared.
    pub(crate) fn deep_copy_value(&mut self, value: Value) -> Value {
        let Value::Obj(id) = value else {
            return value;
        };
        let Some(Object::StructInstance(instance)) = self.heap.get(id) else {
            return value;
        };

        let source = instance.clone();
        let mut copy = InstanceObject::new(source.type_obj);
        self.heap.retain(Value::Obj(source.type_obj));
        copy.weak_fields = source.weak_fields.clone();
        for (name, field_value) in source.fields {
            let copied = self.deep_copy_value(field_value);
            if !copy.weak_fields.contains(&name) {
                self.heap.retain(copied);
            }
            copy.fields.insert(name, copied);
        }
        Value::Obj(self.heap.alloc(Object::StructInstance(copy)))
    }

    // --- Output ---

    pub(crate) fn write_line(&mut self, text: String) {
        if self.config.capture_output {
            self.output.push(text);
        } else {
            println!("{}", text);
        }
    }

    /// Captured output joined with newlines, for tests and embedding.
    pub fn captured_output(&self) -> String {
        let mut joined = self.output.join("\n");
        if !joined.is_empty() {
            joined.push('\n');
        }
        joined
    }

    // --- Debug hook ---

    fn debug_hook(&mut self, controller: &Arc<DebugController>) {
        let line = {
            if self.frames.is_empty() {
                return;
            }
            let ip = self.frame().ip;
            self.body().line_at(ip)
        };
        let source_file = self
            .body()
            .debug
            .as_ref()
            .map(|d| d.source_file.clone())
            .unwrap_or_default();
        let depth = self.frames.len();

        if controller.should_pause(line, depth, &source_file) {
            let snapshot = self.build_stack_snapshot();
            controller.enter_pause(snapshot);
        }
    }

    /// Frame/locals snapshot for the debugger, innermost first.
    pub(crate) fn build_stack_snapshot(&self) -> Vec<crate::debug::DebugFrame> {
        let mut trace = Vec::new();
        for (index, frame) in self.frames.iter().enumerate().rev() {
            let proto = &self.assembly.protos[frame.proto as usize];
            let body = &self.assembly.bodies[proto.body as usize];
            let ip = frame.ip.min(body.lines.len().saturating_sub(1));
            let mut locals = Vec::new();
            if let Some(debug) = &body.debug {
                for local in &debug.locals {
                    let offset = frame.ip as u32;
                    if offset >= local.scope_start && offset <= local.scope_end {
                        let slot = frame.base + local.slot as usize;
                        if let Some(value) = self.stack.get(slot) {
                            locals.push(crate::debug::DebugVariable {
                                name: local.name.clone(),
                                value: self.format_value(*value),
                                slot: local.slot,
                            });
                        }
                    }
                }
            }
            trace.push(crate::debug::DebugFrame {
                function_name: if proto.name.is_empty() {
                    "<script>".to_string()
                } else {
                    proto.name.clone()
                },
                source_file: body
                    .debug
                    .as_ref()
                    .map(|d| d.source_file.clone())
                    .unwrap_or_default(),
                line: body.line_at(ip),
                frame_index: index,
                locals,
            });
        }
        trace
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

/// Built-in conversion functions registered on every VM.
mod natives {
    use super::*;

    pub fn to_string(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
        let value = args.first().copied().unwrap_or(Value::Nil);
        let text = vm.format_value(value);
        Ok(vm.alloc_string(text))
    }

    pub fn to_int(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
        let value = args.first().copied().unwrap_or(Value::Nil);
        match value {
            Value::Int(n) => Ok(Value::Int(n)),
            Value::Float(n) => Ok(Value::Int(n as i64)),
            Value::Bool(b) => Ok(Value::Int(b as i64)),
            _ => {
                if let Some(s) = vm.string_value(value) {
                    match s.trim().parse::<i64>() {
                        Ok(n) => return Ok(Value::Int(n)),
                        Err(_) => return Ok(Value::Nil),
                    }
                }
                Ok(Value::Nil)
            }
        }
    }

    pub fn to_float(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
        let value = args.first().copied().unwrap_or(Value::Nil);
        match value {
            Value::Int(n) => Ok(Value::Float(n as f64)),
            Value::Float(n) => Ok(Value::Float(n)),
            _ => {
                if let Some(s) = vm.string_value(value) {
                    match s.trim().parse::<f64>() {
                        Ok(n) => return Ok(Value::Float(n)),
                        Err(_) => return Ok(Value::Nil),
                    }
                }
                Ok(Value::Nil)
            }
        }
    }
}

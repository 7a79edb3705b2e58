//! The call protocol: closures, bound methods, type constructors, enum
//! case constructors, named-argument reordering, and natives.

use crate::error::RuntimeError;
use crate::vm::object::{EnumCaseObject, InstanceObject, Object, ObjectType};
use crate::vm::value::{ObjId, Value};
use crate::vm::vm::{CallFrame, Vm};

impl Vm {
    /// `CALL n`: the callee sits below `n` positional arguments.
    pub(crate) fn call_value(&mut self, argc: usize) -> Result<bool, RuntimeError> {
        self.call_value_with_receiver(argc, None)
    }

    /// Dispatch on the callee kind. Returns true when a call frame was
    /// pushed (bytecode callees), false when the result is already on the
    /// stack (native callees and constructors).
    pub(crate) fn call_value_with_receiver(
        &mut self,
        argc: usize,
        receiver: Option<Value>,
    ) -> Result<bool, RuntimeError> {
        let callee_idx = self.stack.len() - 1 - argc;
        let callee = self.stack[callee_idx];
        let line = self.current_line();

        let Some(id) = callee.as_obj() else {
            return Err(RuntimeError::NotCallable(line));
        };
        let Some(object) = self.heap.get(id) else {
            return Err(RuntimeError::NotCallable(line));
        };

        match object {
            Object::Function(function) => {
                let proto = function.proto;
                if let Some(receiver) = receiver {
                    self.set_stack(callee_idx, receiver);
                }
                self.call_proto(proto, None, argc, callee_idx)
            }
            Object::Closure(closure) => {
                let proto = closure.proto;
                if let Some(receiver) = receiver {
                    self.set_stack(callee_idx, receiver);
                }
                self.call_proto(proto, Some(id), argc, callee_idx)
            }
            Object::BoundMethod(bound) => {
                let bound = bound.clone();
                self.set_stack(callee_idx, bound.receiver);
                let (proto, closure) = match self.heap.get(bound.method) {
                    Some(Object::Closure(c)) => (c.proto, Some(bound.method)),
                    Some(Object::Function(f)) => (f.proto, None),
                    _ => return Err(RuntimeError::NotCallable(line)),
                };
                self.call_proto(proto, closure, argc, callee_idx)
            }
            Object::Class(_) => {
                self.instantiate_type(id, argc, callee_idx, &[])?;
                Ok(self.frames.last().map(|f| f.base == callee_idx).unwrap_or(false))
            }
            Object::Struct(_) => {
                self.instantiate_type(id, argc, callee_idx, &[])?;
                Ok(self.frames.last().map(|f| f.base == callee_idx).unwrap_or(false))
            }
            Object::EnumCase(case) if case.is_template => {
                let case = case.clone();
                self.construct_enum_case(&case, argc, callee_idx, &[])?;
                Ok(false)
            }
            Object::Native(native) => {
                let func = native.func;
                let args: Vec<Value> = self.stack[callee_idx + 1..].to_vec();
                let result = func(self, &args)?;
                self.truncate_stack(callee_idx);
                self.push(result);
                Ok(false)
            }
            _ => Err(RuntimeError::NotCallable(line)),
        }
    }

    /// `CALL_NAMED n`: argument labels match the callee's declared labels;
    /// arguments are reordered into parameter order, defaults fill gaps.
    pub(crate) fn call_named(
        &mut self,
        argc: usize,
        labels: Vec<Option<String>>,
    ) -> Result<bool, RuntimeError> {
        let callee_idx = self.stack.len() - 1 - argc;
        let callee = self.stack[callee_idx];
        let line = self.current_line();

        let Some(id) = callee.as_obj() else {
            return Err(RuntimeError::NotCallable(line));
        };

        match self.heap.get(id) {
            Some(Object::Class(_)) | Some(Object::Struct(_)) => {
                self.instantiate_type(id, argc, callee_idx, &labels)?;
                Ok(self.frames.last().map(|f| f.base == callee_idx).unwrap_or(false))
            }
            Some(Object::EnumCase(case)) if case.is_template => {
                let case = case.clone();
                self.construct_enum_case(&case, argc, callee_idx, &labels)?;
                Ok(false)
            }
            _ => {
                let proto_idx = self.callee_proto_index(callee).ok_or_else(|| {
                    RuntimeError::NotCallable(line)
                })?;
                let params = self.assembly.protos[proto_idx as usize].params.clone();

                let provided: Vec<Value> = self.stack[callee_idx + 1..].to_vec();
                let reordered =
                    self.reorder_named_arguments(&params, &provided, &labels, line)?;

                self.truncate_stack(callee_idx + 1);
                let new_argc = reordered.len();
                for value in reordered {
                    self.push(value);
                }
                self.call_value(new_argc)
            }
        }
    }

    fn callee_proto_index(&self, callee: Value) -> Option<u16> {
        let id = callee.as_obj()?;
        match self.heap.get(id)? {
            Object::Function(function) => Some(function.proto),
            Object::Closure(closure) => Some(closure.proto),
            Object::BoundMethod(bound) => match self.heap.get(bound.method)? {
                Object::Closure(closure) => Some(closure.proto),
                Object::Function(function) => Some(function.proto),
                _ => None,
            },
            _ => None,
        }
    }

    /// Match labeled arguments against declared parameter labels. A `_`
    /// parameter consumes the next unlabeled argument; labeled parameters
    /// take the argument carrying their label. Remaining parameters fall
    /// back to defaults.
    pub(crate) fn reorder_named_arguments(
        &mut self,
        params: &[crate::bytecode::assembly::ParamInfo],
        provided: &[Value],
        labels: &[Option<String>],
        line: u32,
    ) -> Result<Vec<Value>, RuntimeError> {
        let mut used = vec![false; provided.len()];
        let mut reordered = Vec::with_capacity(params.len());

        for param in params {
            let wanted = param.label.as_deref();
            let mut found = None;
            for (i, label) in labels.iter().enumerate() {
                if used[i] {
                    continue;
                }
                let matches = match (wanted, label.as_deref()) {
                    (None, None) => true,
                    (Some(w), Some(l)) => w == l,
                    // A labeled parameter also accepts a positional
                    // argument in declaration order.
                    (Some(_), None) => true,
                    (None, Some(_)) => false,
                };
                if matches {
                    found = Some(i);
                    break;
                }
            }
            match found {
                Some(i) => {
                    used[i] = true;
                    reordered.push(provided[i]);
                }
                None => match param.default {
                    Some(idx) => {
                        let value = self.constant_value(idx);
                        reordered.push(value);
                    }
                    None => {
                        return Err(RuntimeError::new(
                            format!("Missing argument '{}'", param.name),
                            line,
                        ))
                    }
                },
            }
        }

        if let Some(i) = used.iter().position(|u| !u) {
            let label = labels[i].as_deref().unwrap_or("_");
            return Err(RuntimeError::new(
                format!("Unexpected argument label '{}'", label),
                line,
            ));
        }
        Ok(reordered)
    }

    /// Enter a bytecode function: arity check, default filling, struct
    /// argument copies, then a new frame.
    fn call_proto(
        &mut self,
        proto_idx: u16,
        closure: Option<ObjId>,
        argc: usize,
        callee_idx: usize,
    ) -> Result<bool, RuntimeError> {
        let line = self.current_line();
        let proto = &self.assembly.protos[proto_idx as usize];
        let arity = proto.params.len();
        let is_initializer = proto.is_initializer;

        if argc < arity {
            // Fill trailing defaults.
            let defaults: Vec<Option<u16>> = proto.params[argc..]
                .iter()
                .map(|p| p.default)
                .collect();
            for default in defaults {
                match default {
                    Some(idx) => {
                        let value = self.constant_value(idx);
                        self.push(value);
                    }
                    None => return Err(RuntimeError::wrong_arity(arity, argc, line)),
                }
            }
        } else if argc > arity {
            return Err(RuntimeError::wrong_arity(arity, argc, line));
        }

        // Struct arguments pass by copy. The receiver slot is exempt: a
        // mutating method mutates the caller's instance through it, and a
        // non-mutating method already received a copy when it was bound.
        for slot in callee_idx + 1..self.stack.len() {
            let value = self.stack[slot];
            if self.object_type_of(value) == Some(ObjectType::StructInstance) {
                let copied = self.deep_copy_value(value);
                self.set_stack(slot, copied);
            }
        }

        self.frames.push(CallFrame {
            closure,
            proto: proto_idx,
            ip: 0,
            base: callee_idx,
            is_initializer,
        });
        Ok(true)
    }

    /// Instantiate a class or struct: allocate the instance, run stored
    /// property defaults (superclass first), then the initializer or the
    /// struct memberwise fallback.
    fn instantiate_type(
        &mut self,
        type_id: ObjId,
        argc: usize,
        callee_idx: usize,
        labels: &[Option<String>],
    ) -> Result<(), RuntimeError> {
        let line = self.current_line();
        let is_struct = matches!(self.heap.get(type_id), Some(Object::Struct(_)));

        let mut instance = InstanceObject::new(type_id);
        self.heap.retain(Value::Obj(type_id));
        // Weak properties are known up front so field stores skip retains.
        for ty in self.type_chain(type_id) {
            if let Some(Object::Class(t)) | Some(Object::Struct(t)) = self.heap.get(ty) {
                for stored in &t.stored {
                    if stored.is_weak {
                        instance.weak_fields.push(stored.name.clone());
                    }
                }
            }
        }
        let instance_id = if is_struct {
            self.heap.alloc(Object::StructInstance(instance))
        } else {
            self.heap.alloc(Object::Instance(instance))
        };
        let instance_value = Value::Obj(instance_id);
        // Keep the instance alive while defaults and the initializer run.
        self.set_stack(callee_idx, instance_value);

        self.run_property_defaults(instance_id, type_id)?;

        // A custom initializer takes over, returning the instance.
        if let Some(init) = self.find_method_in_chain(type_id, "init") {
            if !labels.is_empty() && labels.iter().any(|l| l.is_some()) {
                let params = {
                    let proto_idx = match self.heap.get(init) {
                        Some(Object::Closure(c)) => c.proto,
                        Some(Object::Function(f)) => f.proto,
                        _ => return Err(RuntimeError::NotCallable(line)),
                    };
                    self.assembly.protos[proto_idx as usize].params.clone()
                };
                let provided: Vec<Value> = self.stack[callee_idx + 1..].to_vec();
                let reordered =
                    self.reorder_named_arguments(&params, &provided, labels, line)?;
                self.truncate_stack(callee_idx + 1);
                for value in reordered {
                    self.push(value);
                }
            }
            let argc = self.stack.len() - callee_idx - 1;
            let (proto, closure) = match self.heap.get(init) {
                Some(Object::Closure(c)) => (c.proto, Some(init)),
                Some(Object::Function(f)) => (f.proto, None),
                _ => return Err(RuntimeError::NotCallable(line)),
            };
            self.call_proto(proto, closure, argc, callee_idx)?;
            return Ok(());
        }

        // Struct memberwise initializer.
        if is_struct && argc > 0 {
            let stored: Vec<String> = self
                .type_object(type_id)
                .map(|t| {
                    t.stored
                        .iter()
                        .map(|p| p.name.clone())
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            if argc != stored.len() {
                return Err(RuntimeError::wrong_arity(stored.len(), argc, line));
            }
            let args: Vec<Value> = self.stack[callee_idx + 1..].to_vec();
            for (i, (name, value)) in stored.iter().zip(args).enumerate() {
                if let Some(label) = labels.get(i).and_then(|l| l.as_ref()) {
                    if label != name {
                        return Err(RuntimeError::new(
                            format!("Unexpected argument label '{}', expected '{}'", label, name),
                            line,
                        ));
                    }
                }
                let value = self.deep_copy_value(value);
                self.set_field(instance_id, name, value)?;
            }
        } else if argc > 0 {
            return Err(RuntimeError::new(
                format!(
                    "Type '{}' has no initializer taking {} arguments",
                    self.type_name_of(instance_value),
                    argc
                ),
                line,
            ));
        }

        self.truncate_stack(callee_idx + 1);
        Ok(())
    }

    /// Evaluate non-lazy stored-property defaults, root superclass first.
    fn run_property_defaults(
        &mut self,
        instance_id: ObjId,
        type_id: ObjId,
    ) -> Result<(), RuntimeError> {
        let chain: Vec<ObjId> = self.type_chain(type_id).into_iter().rev().collect();
        for ty in chain {
            let defaults: Vec<(String, Option<ObjId>, bool)> = match self.heap.get(ty) {
                Some(Object::Class(t)) | Some(Object::Struct(t)) => t
                    .stored
                    .iter()
                    .map(|p| (p.name.clone(), p.default, p.is_lazy))
                    .collect(),
                _ => Vec::new(),
            };
            for (name, default, is_lazy) in defaults {
                if is_lazy {
                    continue;
                }
                if let Some(thunk) = default {
                    let value = self.call_function_value(
                        Value::Obj(thunk),
                        Value::Obj(instance_id),
                        &[],
                    )?;
                    self.set_field(instance_id, &name, value)?;
                }
            }
        }
        Ok(())
    }

    /// Raw field store honoring weak markings (no observers).
    pub(crate) fn set_field(
        &mut self,
        instance_id: ObjId,
        name: &str,
        value: Value,
    ) -> Result<(), RuntimeError> {
        let weak = match self.heap.get(instance_id) {
            Some(Object::Instance(i)) | Some(Object::StructInstance(i)) => {
                i.weak_fields.contains(&name.to_string())
            }
            _ => false,
        };
        if !weak {
            self.heap.retain(value);
        }
        let old = match self.heap.get_mut(instance_id) {
            Some(Object::Instance(i)) | Some(Object::StructInstance(i)) => {
                i.fields.insert(name.to_string(), value)
            }
            _ => None,
        };
        if let (Some(old), false) = (old, weak) {
            self.heap.release(old);
        }
        Ok(())
    }

    /// Construct a fresh enum case from its constructor template.
    fn construct_enum_case(
        &mut self,
        template: &EnumCaseObject,
        argc: usize,
        callee_idx: usize,
        labels: &[Option<String>],
    ) -> Result<(), RuntimeError> {
        let line = self.current_line();
        let (arity, declared_labels) = {
            let Some(Object::Enum(e)) = self.heap.get(template.enum_type) else {
                return Err(RuntimeError::NotCallable(line));
            };
            let slot = e.cases.get(&template.case_name);
            match slot {
                Some(slot) => (slot.arity as usize, slot.labels.clone()),
                None => (0, Vec::new()),
            }
        };
        if argc != arity {
            return Err(RuntimeError::wrong_arity(arity, argc, line));
        }
        for (i, label) in labels.iter().enumerate() {
            if let (Some(given), Some(Some(declared))) = (label.as_ref(), declared_labels.get(i))
            {
                if given != declared {
                    return Err(RuntimeError::new(
                        format!(
                            "Unexpected argument label '{}', expected '{}'",
                            given, declared
                        ),
                        line,
                    ));
                }
            }
        }

        let associated: Vec<Value> = self.stack[callee_idx + 1..].to_vec();
        for value in &associated {
            self.heap.retain(*value);
        }
        self.heap.retain(Value::Obj(template.enum_type));
        if let Some(raw) = template.raw {
            self.heap.retain(raw);
        }
        let id = self.heap.alloc(Object::EnumCase(EnumCaseObject {
            enum_type: template.enum_type,
            case_name: template.case_name.clone(),
            associated,
            raw: template.raw,
            is_template: false,
        }));
        self.truncate_stack(callee_idx);
        self.push(Value::Obj(id));
        Ok(())
    }

    // --- Type chain helpers ---

    pub(crate) fn type_object(&self, id: ObjId) -> Option<&crate::vm::object::TypeObject> {
        match self.heap.get(id)? {
            Object::Class(ty) | Object::Struct(ty) => Some(ty),
            _ => None,
        }
    }

    /// The class chain starting at `type_id`, subclass first.
    pub(crate) fn type_chain(&self, type_id: ObjId) -> Vec<ObjId> {
        let mut chain = Vec::new();
        let mut current = Some(type_id);
        while let Some(id) = current {
            chain.push(id);
            current = self.type_object(id).and_then(|t| t.superclass);
        }
        chain
    }

    /// Find a method walking the class chain.
    pub(crate) fn find_method_in_chain(&self, type_id: ObjId, name: &str) -> Option<ObjId> {
        for ty in self.type_chain(type_id) {
            if let Some(slot) = self.type_object(ty).and_then(|t| t.methods.get(name)) {
                return Some(slot.closure);
            }
        }
        None
    }
}

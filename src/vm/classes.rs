//! Type-construction opcodes and member dispatch: classes, structs, enums,
//! protocols, property observers, and computed properties.

use crate::bytecode::assembly::TypeDefKind;
use crate::bytecode::opcode::{enum_case_flags, method_flags, property_flags, NO_LABEL};
use crate::error::RuntimeError;
use crate::vm::object::{
    BoundMethodObject, ComputedProperty, EnumCaseObject, EnumCaseSlot, EnumObject, MethodSlot,
    Object, ObjectType, PropertyObservers, ProtocolObject, StoredProperty, TypeObject,
};
use crate::vm::value::{ObjId, Value};
use crate::vm::vm::{Flow, Vm};

impl Vm {
    // --- Type construction ---

    pub(crate) fn op_class(vm: &mut Vm) -> Result<Flow, RuntimeError> {
        vm.push_type_object(false)
    }

    pub(crate) fn op_struct(vm: &mut Vm) -> Result<Flow, RuntimeError> {
        vm.push_type_object(true)
    }

    fn push_type_object(&mut self, is_struct: bool) -> Result<Flow, RuntimeError> {
        let type_idx = self.read_u16() as usize;
        let def = &self.assembly.types[type_idx];
        let name = self.assembly.strings[def.name as usize].clone();
        let conformances: Vec<String> = def
            .conformances
            .iter()
            .map(|c| self.assembly.strings[*c as usize].clone())
            .collect();

        let mut ty = TypeObject::new(name);
        ty.conformances = conformances;
        let id = if is_struct {
            self.heap.alloc(Object::Struct(ty))
        } else {
            self.heap.alloc(Object::Class(ty))
        };
        self.push(Value::Obj(id));
        Ok(Flow::Continue)
    }

    pub(crate) fn op_enum(vm: &mut Vm) -> Result<Flow, RuntimeError> {
        let type_idx = vm.read_u16() as usize;
        let def = &vm.assembly.types[type_idx];
        debug_assert_eq!(def.kind, TypeDefKind::Enum);
        let name = vm.assembly.strings[def.name as usize].clone();
        let raw_type = def
            .raw_type
            .map(|idx| vm.assembly.strings[idx as usize].clone());

        let id = vm.heap.alloc(Object::Enum(EnumObject {
            name,
            raw_type,
            cases: indexmap::IndexMap::new(),
            methods: indexmap::IndexMap::new(),
            statics: indexmap::IndexMap::new(),
            computed: indexmap::IndexMap::new(),
        }));
        vm.push(Value::Obj(id));
        Ok(Flow::Continue)
    }

    /// `INHERIT`: stack `[subclass, superclass]`; links and pops the
    /// superclass.
    pub(crate) fn op_inherit(vm: &mut Vm) -> Result<Flow, RuntimeError> {
        let line = vm.current_line();
        let superclass = vm.pop();
        let subclass = vm.peek(0);

        let Some(super_id) = superclass.as_obj() else {
            return Err(RuntimeError::type_error("Superclass must be a class", line));
        };
        if !matches!(vm.heap.get(super_id), Some(Object::Class(_))) {
            return Err(RuntimeError::type_error("Superclass must be a class", line));
        }
        vm.heap.retain(superclass);

        let Some(Object::Class(ty)) = subclass.as_obj().and_then(|id| vm.heap.get_mut(id))
        else {
            return Err(RuntimeError::type_error("Only classes can inherit", line));
        };
        ty.superclass = Some(super_id);
        Ok(Flow::Continue)
    }

    /// `METHOD` / `STRUCT_METHOD`: stack `[type, closure]`; attaches the
    /// closure under the name.
    pub(crate) fn op_method(vm: &mut Vm) -> Result<Flow, RuntimeError> {
        let name = vm.read_string();
        let flags = vm.read_byte();
        let line = vm.current_line();
        let method = vm.pop();
        let type_value = vm.peek(0);

        let Some(method_id) = method.as_obj() else {
            return Err(RuntimeError::type_error("Method must be a function", line));
        };
        vm.heap.retain(method);

        let slot = MethodSlot {
            closure: method_id,
            is_static: flags & method_flags::STATIC != 0,
            is_initializer: flags & method_flags::INITIALIZER != 0,
            is_mutating: flags & method_flags::MUTATING != 0,
        };

        let old = match type_value.as_obj().and_then(|id| vm.heap.get_mut(id)) {
            Some(Object::Class(ty)) | Some(Object::Struct(ty)) => ty.methods.insert(name, slot),
            Some(Object::Enum(e)) => e.methods.insert(name, slot),
            _ => {
                return Err(RuntimeError::type_error(
                    "Methods can only attach to type objects",
                    line,
                ))
            }
        };
        if let Some(old) = old {
            vm.heap.release(Value::Obj(old.closure));
        }
        Ok(Flow::Continue)
    }

    /// `DEFINE_PROPERTY`: registers a stored property; a flagged default
    /// thunk is popped from the stack. Static properties with defaults are
    /// evaluated immediately against the type object.
    pub(crate) fn op_define_property(vm: &mut Vm) -> Result<Flow, RuntimeError> {
        let name = vm.read_string();
        let flags = vm.read_byte();
        let line = vm.current_line();

        let default = if flags & property_flags::HAS_DEFAULT != 0 {
            let thunk = vm.pop();
            let Some(id) = thunk.as_obj() else {
                return Err(RuntimeError::type_error("Corrupt property default", line));
            };
            Some(id)
        } else {
            None
        };

        let type_value = vm.peek(0);
        let is_static = flags & property_flags::STATIC != 0;

        if is_static {
            let value = match default {
                Some(thunk) => vm.call_function_value(Value::Obj(thunk), type_value, &[])?,
                None => Value::Nil,
            };
            vm.heap.retain(value);
            match type_value.as_obj().and_then(|id| vm.heap.get_mut(id)) {
                Some(Object::Class(ty)) | Some(Object::Struct(ty)) => {
                    ty.statics.insert(name, value);
                }
                Some(Object::Enum(e)) => {
                    e.statics.insert(name, value);
                }
                _ => {
                    return Err(RuntimeError::type_error(
                        "Properties can only attach to type objects",
                        line,
                    ))
                }
            }
            return Ok(Flow::Continue);
        }

        if let Some(id) = default {
            vm.heap.retain(Value::Obj(id));
        }
        let stored = StoredProperty {
            name: name.clone(),
            default,
            is_let: flags & property_flags::LET != 0,
            is_weak: flags & property_flags::WEAK != 0,
            is_lazy: flags & property_flags::LAZY != 0,
        };
        match type_value.as_obj().and_then(|id| vm.heap.get_mut(id)) {
            Some(Object::Class(ty)) | Some(Object::Struct(ty)) => ty.stored.push(stored),
            _ => {
                return Err(RuntimeError::type_error(
                    "Properties can only attach to type objects",
                    line,
                ))
            }
        }
        Ok(Flow::Continue)
    }

    /// `DEFINE_COMPUTED_PROPERTY`: pops the setter (when flagged) then the
    /// getter. Enums accept computed properties exactly like classes.
    pub(crate) fn op_define_computed_property(vm: &mut Vm) -> Result<Flow, RuntimeError> {
        let name = vm.read_string();
        let has_setter = vm.read_byte() != 0;
        let line = vm.current_line();

        let setter = if has_setter {
            let value = vm.pop();
            vm.heap.retain(value);
            value.as_obj()
        } else {
            None
        };
        let getter_value = vm.pop();
        vm.heap.retain(getter_value);
        let Some(getter) = getter_value.as_obj() else {
            return Err(RuntimeError::type_error("Corrupt computed property", line));
        };

        let computed = ComputedProperty { getter, setter };
        let type_value = vm.peek(0);
        match type_value.as_obj().and_then(|id| vm.heap.get_mut(id)) {
            Some(Object::Class(ty)) | Some(Object::Struct(ty)) => {
                ty.computed.insert(name, computed);
            }
            Some(Object::Enum(e)) => {
                e.computed.insert(name, computed);
            }
            _ => {
                return Err(RuntimeError::type_error(
                    "Computed properties can only attach to type objects",
                    line,
                ))
            }
        }
        Ok(Flow::Continue)
    }

    /// `DEFINE_PROPERTY_WITH_OBSERVERS`: pops didSet?, willSet?, default?
    /// in that order (reverse of emission).
    pub(crate) fn op_define_property_with_observers(vm: &mut Vm) -> Result<Flow, RuntimeError> {
        let name = vm.read_string();
        let flags = vm.read_byte();
        let line = vm.current_line();

        let did_set = if flags & property_flags::HAS_DIDSET != 0 {
            let value = vm.pop();
            vm.heap.retain(value);
            value.as_obj()
        } else {
            None
        };
        let will_set = if flags & property_flags::HAS_WILLSET != 0 {
            let value = vm.pop();
            vm.heap.retain(value);
            value.as_obj()
        } else {
            None
        };
        let default = if flags & property_flags::HAS_DEFAULT != 0 {
            let value = vm.pop();
            vm.heap.retain(value);
            value.as_obj()
        } else {
            None
        };

        let type_value = vm.peek(0);
        match type_value.as_obj().and_then(|id| vm.heap.get_mut(id)) {
            Some(Object::Class(ty)) | Some(Object::Struct(ty)) => {
                ty.stored.push(StoredProperty {
                    name: name.clone(),
                    default,
                    is_let: false,
                    is_weak: false,
                    is_lazy: false,
                });
                ty.observers.insert(name, PropertyObservers { will_set, did_set });
            }
            _ => {
                return Err(RuntimeError::type_error(
                    "Observers can only attach to type objects",
                    line,
                ))
            }
        }
        Ok(Flow::Continue)
    }

    /// `ENUM_CASE`: registers one case on the enum at the top of the
    /// stack; a flagged raw value is popped first.
    pub(crate) fn op_enum_case(vm: &mut Vm) -> Result<Flow, RuntimeError> {
        let name = vm.read_string();
        let flags = vm.read_byte();
        let arity = vm.read_byte();
        let mut labels = Vec::with_capacity(arity as usize);
        for _ in 0..arity {
            let idx = vm.read_u16();
            if idx == NO_LABEL {
                labels.push(None);
            } else {
                labels.push(Some(vm.assembly.strings[idx as usize].clone()));
            }
        }
        let line = vm.current_line();

        let raw = if flags & enum_case_flags::HAS_RAW != 0 {
            let value = vm.pop();
            // Both the enum's case table and the case object hold the raw
            // value strongly.
            vm.heap.retain(value);
            vm.heap.retain(value);
            Some(value)
        } else {
            None
        };

        let enum_value = vm.peek(0);
        let Some(enum_id) = enum_value.as_obj() else {
            return Err(RuntimeError::type_error("Corrupt enum definition", line));
        };

        // A payload-free case is interned: every mention yields this one
        // shared instance. A payload case becomes a constructor template.
        let case_obj = vm.heap.alloc(Object::EnumCase(EnumCaseObject {
            enum_type: enum_id,
            case_name: name.clone(),
            associated: Vec::new(),
            raw,
            is_template: arity > 0,
        }));
        vm.heap.retain(Value::Obj(case_obj));
        vm.heap.retain(Value::Obj(enum_id));

        let Some(Object::Enum(e)) = vm.heap.get_mut(enum_id) else {
            return Err(RuntimeError::type_error("Corrupt enum definition", line));
        };
        e.cases.insert(
            name.clone(),
            EnumCaseSlot {
                name,
                raw,
                labels,
                arity,
                case_obj,
            },
        );
        Ok(Flow::Continue)
    }

    /// `MATCH_ENUM_CASE`: pops the subject, pushes whether it is an enum
    /// case with the given (optionally `Enum.`-qualified) name.
    pub(crate) fn op_match_enum_case(vm: &mut Vm) -> Result<Flow, RuntimeError> {
        let pattern = vm.read_string();
        let subject = vm.pop();

        let (want_enum, want_case) = match pattern.split_once('.') {
            Some((enum_name, case_name)) => (Some(enum_name), case_name),
            None => (None, pattern.as_str()),
        };

        let matched = match subject.as_obj().and_then(|id| vm.heap.get(id)) {
            Some(Object::EnumCase(case)) => {
                let case_matches = case.case_name == want_case;
                let enum_matches = match want_enum {
                    Some(name) => match vm.heap.get(case.enum_type) {
                        Some(Object::Enum(e)) => e.name == name,
                        _ => false,
                    },
                    None => true,
                };
                case_matches && enum_matches
            }
            _ => false,
        };
        vm.push(Value::Bool(matched));
        Ok(Flow::Continue)
    }

    /// `GET_ASSOCIATED`: pops an enum case, pushes its payload at the
    /// ordinal.
    pub(crate) fn op_get_associated(vm: &mut Vm) -> Result<Flow, RuntimeError> {
        let ordinal = vm.read_u16() as usize;
        let subject = vm.pop();
        let line = vm.current_line();

        let Some(Object::EnumCase(case)) = subject.as_obj().and_then(|id| vm.heap.get(id))
        else {
            return Err(RuntimeError::type_error(
                format!("{} is not an enum case", vm.type_name_of(subject)),
                line,
            ));
        };
        let value = case.associated.get(ordinal).copied().ok_or_else(|| {
            RuntimeError::new(
                format!("Enum case has no associated value {}", ordinal),
                line,
            )
        })?;
        vm.push(value);
        Ok(Flow::Continue)
    }

    pub(crate) fn op_protocol(vm: &mut Vm) -> Result<Flow, RuntimeError> {
        let def_index = vm.read_u16();
        let id = vm.heap.alloc(Object::Protocol(ProtocolObject { def_index }));
        vm.push(Value::Obj(id));
        Ok(Flow::Continue)
    }

    /// `SUPER`: pops `self`, pushes the named method of the defining
    /// class's superclass bound to `self`.
    pub(crate) fn op_super(vm: &mut Vm) -> Result<Flow, RuntimeError> {
        let name = vm.read_string();
        let receiver = vm.pop();
        let line = vm.current_line();

        let owner = vm.proto().owner.clone().ok_or_else(|| {
            RuntimeError::new("'super' outside of a method", line)
        })?;

        let Some(instance_type) = receiver
            .as_obj()
            .and_then(|id| vm.heap.get(id))
            .and_then(|o| match o {
                Object::Instance(i) => Some(i.type_obj),
                _ => None,
            })
        else {
            return Err(RuntimeError::type_error("'super' requires an instance", line));
        };

        // Walk to the defining class, then continue from its superclass.
        let mut chain = vm.type_chain(instance_type).into_iter();
        let defining = chain.find(|id| {
            vm.type_object(*id)
                .map(|t| t.name == owner)
                .unwrap_or(false)
        });
        let superclass = defining
            .and_then(|id| vm.type_object(id))
            .and_then(|t| t.superclass)
            .ok_or_else(|| {
                RuntimeError::new(format!("'{}' has no superclass", owner), line)
            })?;

        let method = vm.find_method_in_chain(superclass, &name).ok_or_else(|| {
            RuntimeError::no_such_property(format!("super of {}", owner), name.clone(), line)
        })?;

        let id = vm.alloc_bound_method(receiver, method);
        vm.push(Value::Obj(id));
        Ok(Flow::Continue)
    }

    // --- Member dispatch ---

    /// `GET_PROPERTY`: field map, then the method table up the class
    /// chain, then computed properties, then (for type objects) statics.
    pub(crate) fn op_get_property(vm: &mut Vm) -> Result<Flow, RuntimeError> {
        let name = vm.read_string();
        let object = vm.pop();
        let line = vm.current_line();
        let value = vm.get_member(object, &name, line)?;
        vm.push(value);
        Ok(Flow::Continue)
    }

    pub(crate) fn get_member(
        &mut self,
        object: Value,
        name: &str,
        line: u32,
    ) -> Result<Value, RuntimeError> {
        let Some(id) = object.as_obj() else {
            return Err(RuntimeError::no_such_property(
                self.type_name_of(object),
                name,
                line,
            ));
        };

        match self.heap.get(id) {
            Some(Object::Instance(_)) | Some(Object::StructInstance(_)) => {
                self.get_instance_member(id, object, name, line)
            }

            Some(Object::Class(_)) | Some(Object::Struct(_)) => {
                // Static members via the type object.
                for ty in self.type_chain(id) {
                    let found = self.type_object(ty).and_then(|t| {
                        t.statics
                            .get(name)
                            .copied()
                            .or_else(|| {
                                t.methods
                                    .get(name)
                                    .filter(|m| m.is_static)
                                    .map(|m| Value::Obj(m.closure))
                            })
                    });
                    if let Some(value) = found {
                        return Ok(value);
                    }
                }
                Err(RuntimeError::no_such_property(
                    self.type_name_of(object),
                    name,
                    line,
                ))
            }

            Some(Object::Enum(e)) => {
                if let Some(slot) = e.cases.get(name) {
                    return Ok(Value::Obj(slot.case_obj));
                }
                if let Some(value) = e.statics.get(name) {
                    return Ok(*value);
                }
                if let Some(slot) = e.methods.get(name).filter(|m| m.is_static) {
                    return Ok(Value::Obj(slot.closure));
                }
                Err(RuntimeError::no_such_property(
                    format!("enum {}", e.name),
                    name,
                    line,
                ))
            }

            Some(Object::EnumCase(case)) => {
                if name == "rawValue" {
                    return Ok(case.raw.unwrap_or(Value::Nil));
                }
                let enum_id = case.enum_type;
                let (method, computed) = match self.heap.get(enum_id) {
                    Some(Object::Enum(e)) => (
                        e.methods.get(name).map(|m| m.closure),
                        e.computed.get(name).map(|c| c.getter),
                    ),
                    _ => (None, None),
                };
                if let Some(method) = method {
                    return Ok(Value::Obj(self.alloc_bound_method(object, method)));
                }
                if let Some(getter) = computed {
                    return self.call_function_value(Value::Obj(getter), object, &[]);
                }
                Err(RuntimeError::no_such_property(
                    self.type_name_of(object),
                    name,
                    line,
                ))
            }

            Some(Object::Tuple(tuple)) => {
                if name == "count" {
                    return Ok(Value::Int(tuple.elements.len() as i64));
                }
                self.tuple_label_lookup(object, name)
            }

            Some(Object::String(s)) => {
                if name == "count" {
                    return Ok(Value::Int(s.chars().count() as i64));
                }
                Err(RuntimeError::no_such_property("String", name, line))
            }

            Some(Object::List(elements)) => {
                if name == "count" {
                    return Ok(Value::Int(elements.len() as i64));
                }
                Err(RuntimeError::no_such_property("Array", name, line))
            }

            Some(Object::Map(entries)) => {
                if name == "count" {
                    return Ok(Value::Int(entries.len() as i64));
                }
                Err(RuntimeError::no_such_property("Dictionary", name, line))
            }

            _ => Err(RuntimeError::no_such_property(
                self.type_name_of(object),
                name,
                line,
            )),
        }
    }

    fn get_instance_member(
        &mut self,
        instance_id: ObjId,
        object: Value,
        name: &str,
        line: u32,
    ) -> Result<Value, RuntimeError> {
        let (type_obj, field, is_weak) = {
            let (Some(Object::Instance(instance)) | Some(Object::StructInstance(instance))) =
                self.heap.get(instance_id)
            else {
                return Err(RuntimeError::no_such_property("instance", name, line));
            };
            (
                instance.type_obj,
                instance.fields.get(name).copied(),
                instance.weak_fields.contains(&name.to_string()),
            )
        };

        // 1. Instance fields. Weak fields read as nil once the referent
        //    has died.
        if let Some(value) = field {
            if is_weak {
                if let Value::Obj(id) = value {
                    if !self.heap.is_live(id) {
                        return Ok(Value::Nil);
                    }
                }
            }
            return Ok(value);
        }

        // 2. A lazy stored property initializes on first read.
        let lazy_default = self.type_chain(type_obj).into_iter().find_map(|ty| {
            self.type_object(ty)
                .and_then(|t| t.stored_property(name))
                .filter(|p| p.is_lazy)
                .and_then(|p| p.default)
        });
        if let Some(thunk) = lazy_default {
            let value = self.call_function_value(Value::Obj(thunk), object, &[])?;
            self.set_field(instance_id, name, value)?;
            return Ok(value);
        }

        // 3. Methods up the class chain bind the receiver. A non-mutating
        //    struct method receives a copy for value semantics.
        for ty in self.type_chain(type_obj) {
            let slot = self
                .type_object(ty)
                .and_then(|t| t.methods.get(name))
                .cloned();
            if let Some(slot) = slot {
                if slot.is_static {
                    continue;
                }
                let receiver = if matches!(
                    self.object_type_of(object),
                    Some(ObjectType::StructInstance)
                ) && !slot.is_mutating
                    && !slot.is_initializer
                {
                    self.deep_copy_value(object)
                } else {
                    object
                };
                return Ok(Value::Obj(self.alloc_bound_method(receiver, slot.closure)));
            }
        }

        // 4. Computed properties invoke the getter.
        let getter = self.type_chain(type_obj).into_iter().find_map(|ty| {
            self.type_object(ty)
                .and_then(|t| t.computed.get(name))
                .map(|c| c.getter)
        });
        if let Some(getter) = getter {
            return self.call_function_value(Value::Obj(getter), object, &[]);
        }

        Err(RuntimeError::no_such_property(
            self.type_name_of(object),
            name,
            line,
        ))
    }

    /// `SET_PROPERTY`: stack `[object, value]`; runs willSet/didSet around
    /// observed stores, dispatches computed setters, enforces `let`
    /// stored properties outside initializers. Pushes the value back as
    /// the assignment result.
    pub(crate) fn op_set_property(vm: &mut Vm) -> Result<Flow, RuntimeError> {
        let name = vm.read_string();
        let value = vm.pop();
        let object = vm.pop();
        let line = vm.current_line();

        let Some(id) = object.as_obj() else {
            return Err(RuntimeError::no_such_property(
                vm.type_name_of(object),
                &name,
                line,
            ));
        };

        match vm.heap.get(id) {
            Some(Object::Instance(_)) | Some(Object::StructInstance(_)) => {
                vm.set_instance_member(id, object, &name, value, line)?;
            }
            Some(Object::Class(_)) | Some(Object::Struct(_)) => {
                vm.heap.retain(value);
                let old = match vm.heap.get_mut(id) {
                    Some(Object::Class(ty)) | Some(Object::Struct(ty)) => {
                        ty.statics.insert(name, value)
                    }
                    _ => None,
                };
                if let Some(old) = old {
                    vm.heap.release(old);
                }
            }
            Some(Object::Enum(_)) => {
                vm.heap.retain(value);
                let old = match vm.heap.get_mut(id) {
                    Some(Object::Enum(e)) => e.statics.insert(name, value),
                    _ => None,
                };
                if let Some(old) = old {
                    vm.heap.release(old);
                }
            }
            _ => {
                return Err(RuntimeError::no_such_property(
                    vm.type_name_of(object),
                    &name,
                    line,
                ))
            }
        }
        vm.push(value);
        Ok(Flow::Continue)
    }

    fn set_instance_member(
        &mut self,
        instance_id: ObjId,
        object: Value,
        name: &str,
        value: Value,
        line: u32,
    ) -> Result<(), RuntimeError> {
        let type_obj = match self.heap.get(instance_id) {
            Some(Object::Instance(i)) | Some(Object::StructInstance(i)) => i.type_obj,
            _ => return Err(RuntimeError::no_such_property("instance", name, line)),
        };

        // Observers, unless this set is already inside one of this
        // property's observers.
        let observers = self.type_chain(type_obj).into_iter().find_map(|ty| {
            self.type_object(ty)
                .and_then(|t| t.observers.get(name))
                .cloned()
        });
        if let Some(observers) = observers {
            let reentrant = match self.heap.get(instance_id) {
                Some(Object::Instance(i)) | Some(Object::StructInstance(i)) => {
                    i.observers_active.contains(&name.to_string())
                }
                _ => false,
            };
            if !reentrant {
                let old = match self.heap.get(instance_id) {
                    Some(Object::Instance(i)) | Some(Object::StructInstance(i)) => {
                        i.fields.get(name).copied().unwrap_or(Value::Nil)
                    }
                    _ => Value::Nil,
                };
                if let Some(Object::Instance(i)) | Some(Object::StructInstance(i)) =
                    self.heap.get_mut(instance_id)
                {
                    i.observers_active.push(name.to_string());
                }
                let result = (|| {
                    if let Some(will_set) = observers.will_set {
                        self.call_function_value(Value::Obj(will_set), object, &[value])?;
                    }
                    self.set_field(instance_id, name, value)?;
                    if let Some(did_set) = observers.did_set {
                        self.call_function_value(Value::Obj(did_set), object, &[old])?;
                    }
                    Ok(())
                })();
                if let Some(Object::Instance(i)) | Some(Object::StructInstance(i)) =
                    self.heap.get_mut(instance_id)
                {
                    i.observers_active.retain(|n| n != name);
                }
                return result;
            }
            return self.set_field(instance_id, name, value);
        }

        // Computed setter.
        let setter = self.type_chain(type_obj).into_iter().find_map(|ty| {
            self.type_object(ty)
                .and_then(|t| t.computed.get(name))
                .and_then(|c| c.setter)
        });
        if let Some(setter) = setter {
            self.call_function_value(Value::Obj(setter), object, &[value])?;
            return Ok(());
        }

        // `let` stored properties only initialize once, inside an
        // initializer or default.
        let is_let = self.type_chain(type_obj).into_iter().any(|ty| {
            self.type_object(ty)
                .and_then(|t| t.stored_property(name))
                .map(|p| p.is_let)
                .unwrap_or(false)
        });
        if is_let {
            let already_set = match self.heap.get(instance_id) {
                Some(Object::Instance(i)) | Some(Object::StructInstance(i)) => {
                    i.fields.contains_key(name)
                }
                _ => false,
            };
            let in_initializer = self
                .frames
                .last()
                .map(|f| f.is_initializer)
                .unwrap_or(false);
            if already_set && !in_initializer {
                return Err(RuntimeError::new(
                    format!("Cannot assign to 'let' property '{}'", name),
                    line,
                ));
            }
        }

        self.set_field(instance_id, name, value)
    }

    // --- Type checks & casts ---

    /// `is`: value conformance against primitive names, class chains,
    /// protocol conformances, and enum names.
    pub(crate) fn op_type_check(vm: &mut Vm) -> Result<Flow, RuntimeError> {
        let type_name = vm.read_string();
        let value = vm.pop();
        let result = vm.value_is_type(value, &type_name);
        vm.push(Value::Bool(result));
        Ok(Flow::Continue)
    }

    pub(crate) fn value_is_type(&self, value: Value, type_name: &str) -> bool {
        match (value, type_name) {
            (Value::Int(_), "Int") => true,
            (Value::Float(_), "Float") => true,
            (Value::Bool(_), "Bool") => true,
            (Value::Nil, _) => false,
            (Value::Obj(id), _) => match self.heap.get(id) {
                Some(Object::String(_)) => type_name == "String",
                Some(Object::List(_)) => type_name == "Array",
                Some(Object::Map(_)) => type_name == "Dictionary",
                Some(Object::Function(_)) | Some(Object::Closure(_)) | Some(Object::Native(_)) => {
                    type_name == "Function"
                }
                Some(Object::Tuple(_)) => type_name == "Tuple",
                Some(Object::Instance(instance)) | Some(Object::StructInstance(instance)) => {
                    for ty in self.type_chain(instance.type_obj) {
                        if let Some(t) = self.type_object(ty) {
                            if t.name == type_name
                                || t.conformances.iter().any(|c| c == type_name)
                            {
                                return true;
                            }
                        }
                    }
                    false
                }
                Some(Object::EnumCase(case)) => match self.heap.get(case.enum_type) {
                    Some(Object::Enum(e)) => e.name == type_name,
                    _ => false,
                },
                _ => false,
            },
            _ => false,
        }
    }

    pub(crate) fn op_type_cast(vm: &mut Vm) -> Result<Flow, RuntimeError> {
        vm.type_cast(CastFailure::Error)
    }

    pub(crate) fn op_type_cast_optional(vm: &mut Vm) -> Result<Flow, RuntimeError> {
        vm.type_cast(CastFailure::Nil)
    }

    pub(crate) fn op_type_cast_forced(vm: &mut Vm) -> Result<Flow, RuntimeError> {
        vm.type_cast(CastFailure::Error)
    }

    /// `as` family: numeric conversions between Int and Float, identity
    /// casts against the class chain and conformances otherwise.
    fn type_cast(&mut self, on_failure: CastFailure) -> Result<Flow, RuntimeError> {
        let type_name = self.read_string();
        let value = self.pop();
        let line = self.current_line();

        let result = match (&value, type_name.as_str()) {
            (Value::Int(n), "Float") => Some(Value::Float(*n as f64)),
            (Value::Float(n), "Int") => Some(Value::Int(*n as i64)),
            _ => {
                if self.value_is_type(value, &type_name) {
                    Some(value)
                } else {
                    None
                }
            }
        };

        match result {
            Some(value) => self.push(value),
            None => match on_failure {
                CastFailure::Nil => self.push(Value::Nil),
                CastFailure::Error => {
                    return Err(RuntimeError::type_error(
                        format!(
                            "Cannot cast {} to {}",
                            self.type_name_of(value),
                            type_name
                        ),
                        line,
                    ))
                }
            },
        }
        Ok(Flow::Continue)
    }

    // --- Shared helpers ---

    pub(crate) fn alloc_bound_method(&mut self, receiver: Value, method: ObjId) -> ObjId {
        self.heap.retain(receiver);
        self.heap.retain(Value::Obj(method));
        self.heap.alloc(Object::BoundMethod(BoundMethodObject {
            receiver,
            method,
        }))
    }

    pub(crate) fn tuple_label_lookup(
        &self,
        object: Value,
        label: &str,
    ) -> Result<Value, RuntimeError> {
        let line = self.current_line();
        let Some(Object::Tuple(tuple)) = object.as_obj().and_then(|id| self.heap.get(id)) else {
            return Err(RuntimeError::type_error(
                format!("{} is not a tuple", self.type_name_of(object)),
                line,
            ));
        };
        for (element, element_label) in tuple.elements.iter().zip(&tuple.labels) {
            if element_label.as_deref() == Some(label) {
                return Ok(*element);
            }
        }
        Err(RuntimeError::no_such_property("Tuple", label, line))
    }
}

enum CastFailure {
    Nil,
    Error,
}

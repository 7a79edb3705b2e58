//! Heap object payloads.

use indexmap::IndexMap;

use crate::error::RuntimeError;
use crate::vm::value::{ObjId, Value};

/// Signature of a host-registered callable.
pub type NativeFn = fn(&mut crate::vm::vm::Vm, &[Value]) -> Result<Value, RuntimeError>;

/// Runtime type tag of a heap object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    String,
    List,
    Map,
    Function,
    Closure,
    Instance,
    Class,
    Struct,
    StructInstance,
    Enum,
    EnumCase,
    Protocol,
    Tuple,
    BoundMethod,
    Upvalue,
    Native,
}

/// A key in a Map object. Only leaf values and strings are hashable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MapKey {
    Nil,
    Bool(bool),
    Int(i64),
    Str(String),
}

/// A method attached to a type object.
#[derive(Debug, Clone)]
pub struct MethodSlot {
    pub closure: ObjId,
    pub is_static: bool,
    pub is_initializer: bool,
    pub is_mutating: bool,
}

/// A stored-property descriptor on a type object, in declaration order.
#[derive(Debug, Clone)]
pub struct StoredProperty {
    pub name: String,
    /// Default-value thunk (a closure with `self` in slot 0).
    pub default: Option<ObjId>,
    pub is_let: bool,
    pub is_weak: bool,
    pub is_lazy: bool,
}

/// A computed-property descriptor.
#[derive(Debug, Clone)]
pub struct ComputedProperty {
    pub getter: ObjId,
    pub setter: Option<ObjId>,
}

/// willSet/didSet closures attached to a stored property.
#[derive(Debug, Clone, Default)]
pub struct PropertyObservers {
    pub will_set: Option<ObjId>,
    pub did_set: Option<ObjId>,
}

/// Shared shape of class and struct type objects.
#[derive(Debug, Clone)]
pub struct TypeObject {
    pub name: String,
    pub superclass: Option<ObjId>,
    pub conformances: Vec<String>,
    pub methods: IndexMap<String, MethodSlot>,
    pub statics: IndexMap<String, Value>,
    pub stored: Vec<StoredProperty>,
    pub computed: IndexMap<String, ComputedProperty>,
    pub observers: IndexMap<String, PropertyObservers>,
}

impl TypeObject {
    pub fn new(name: String) -> Self {
        Self {
            name,
            superclass: None,
            conformances: Vec::new(),
            methods: IndexMap::new(),
            statics: IndexMap::new(),
            stored: Vec::new(),
            computed: IndexMap::new(),
            observers: IndexMap::new(),
        }
    }

    pub fn stored_property(&self, name: &str) -> Option<&StoredProperty> {
        self.stored.iter().find(|p| p.name == name)
    }
}

/// A class or struct instance: the type handle plus an ordered field map.
#[derive(Debug, Clone)]
pub struct InstanceObject {
    pub type_obj: ObjId,
    pub fields: IndexMap<String, Value>,
    /// Field names stored without a retain (`weak` properties); skipped on
    /// release.
    pub weak_fields: Vec<String>,
    /// Properties whose observer is currently running, to stop reentry.
    pub observers_active: Vec<String>,
    /// Set once the deinit body has run, so resurrection during deferred
    /// release cannot run it twice.
    pub deinit_run: bool,
}

impl InstanceObject {
    pub fn new(type_obj: ObjId) -> Self {
        Self {
            type_obj,
            fields: IndexMap::new(),
            weak_fields: Vec::new(),
            observers_active: Vec::new(),
            deinit_run: false,
        }
    }
}

/// One case descriptor inside an enum type object.
#[derive(Debug, Clone)]
pub struct EnumCaseSlot {
    pub name: String,
    pub raw: Option<Value>,
    /// Associated-value labels; empty for payload-free cases.
    pub labels: Vec<Option<String>>,
    pub arity: u8,
    /// The shared instance for payload-free cases, or the constructor
    /// template for cases with payloads.
    pub case_obj: ObjId,
}

/// An enum type object.
#[derive(Debug, Clone)]
pub struct EnumObject {
    pub name: String,
    pub raw_type: Option<String>,
    pub cases: IndexMap<String, EnumCaseSlot>,
    pub methods: IndexMap<String, MethodSlot>,
    pub statics: IndexMap<String, Value>,
    pub computed: IndexMap<String, ComputedProperty>,
}

/// An enum case value. Payload-free cases are interned (one shared
/// instance per case); cases with payloads act as constructors
/// (`is_template`) that produce fresh instances carrying the values.
#[derive(Debug, Clone)]
pub struct EnumCaseObject {
    pub enum_type: ObjId,
    pub case_name: String,
    pub associated: Vec<Value>,
    pub raw: Option<Value>,
    pub is_template: bool,
}

/// A function value: a bare prototype reference with no captures.
#[derive(Debug, Clone, Copy)]
pub struct FunctionObject {
    pub proto: u16,
}

/// A closure: a prototype plus its captured upvalues, shared by pointer
/// with every other closure that captured the same variables.
#[derive(Debug, Clone)]
pub struct ClosureObject {
    pub proto: u16,
    pub upvalues: Vec<ObjId>,
}

/// An upvalue: open while the captured local is still on the stack, closed
/// (owning its value) after the frame exits.
#[derive(Debug, Clone)]
pub enum UpvalueState {
    Open(usize),
    Closed(Value),
}

/// A tuple with optional element labels.
#[derive(Debug, Clone)]
pub struct TupleObject {
    pub elements: Vec<Value>,
    pub labels: Vec<Option<String>>,
}

/// A method extracted from an instance, with the receiver bound.
#[derive(Debug, Clone)]
pub struct BoundMethodObject {
    pub receiver: Value,
    pub method: ObjId,
}

/// A protocol value: its definition lives in the assembly.
#[derive(Debug, Clone, Copy)]
pub struct ProtocolObject {
    pub def_index: u16,
}

/// A registered host callable.
#[derive(Clone)]
pub struct NativeObject {
    pub name: String,
    pub func: NativeFn,
}

impl std::fmt::Debug for NativeObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<native fn {}>", self.name)
    }
}

/// A heap object.
#[derive(Debug, Clone)]
pub enum Object {
    String(String),
    List(Vec<Value>),
    Map(IndexMap<MapKey, Value>),
    Function(FunctionObject),
    Closure(ClosureObject),
    Instance(InstanceObject),
    Class(TypeObject),
    Struct(TypeObject),
    StructInstance(InstanceObject),
    Enum(EnumObject),
    EnumCase(EnumCaseObject),
    Protocol(ProtocolObject),
    Tuple(TupleObject),
    BoundMethod(BoundMethodObject),
    Upvalue(UpvalueState),
    Native(NativeObject),
}

impl Object {
    pub fn object_type(&self) -> ObjectType {
        match self {
            Object::String(_) => ObjectType::String,
            Object::List(_) => ObjectType::List,
            Object::Map(_) => ObjectType::Map,
            Object::Function(_) => ObjectType::Function,
            Object::Closure(_) => ObjectType::Closure,
            Object::Instance(_) => ObjectType::Instance,
            Object::Class(_) => ObjectType::Class,
            Object::Struct(_) => ObjectType::Struct,
            Object::StructInstance(_) => ObjectType::StructInstance,
            Object::Enum(_) => ObjectType::Enum,
            Object::EnumCase(_) => ObjectType::EnumCase,
            Object::Protocol(_) => ObjectType::Protocol,
            Object::Tuple(_) => ObjectType::Tuple,
            Object::BoundMethod(_) => ObjectType::BoundMethod,
            Object::Upvalue(_) => ObjectType::Upvalue,
            Object::Native(_) => ObjectType::Native,
        }
    }

    /// Strong references held by this object, for recursive release.
    pub fn children(&self) -> Vec<Value> {
        match self {
            Object::String(_) | Object::Function(_) | Object::Protocol(_) | Object::Native(_) => {
                Vec::new()
            }
            Object::List(elements) => elements.clone(),
            Object::Map(entries) => entries.values().copied().collect(),
            Object::Closure(closure) => {
                closure.upvalues.iter().map(|id| Value::Obj(*id)).collect()
            }
            Object::Instance(instance) | Object::StructInstance(instance) => {
                let mut children = vec![Value::Obj(instance.type_obj)];
                for (name, value) in &instance.fields {
                    if !instance.weak_fields.contains(name) {
                        children.push(*value);
                    }
                }
                children
            }
            Object::Class(ty) | Object::Struct(ty) => {
                let mut children = Vec::new();
                if let Some(superclass) = ty.superclass {
                    children.push(Value::Obj(superclass));
                }
                for method in ty.methods.values() {
                    children.push(Value::Obj(method.closure));
                }
                children.extend(ty.statics.values().copied());
                for stored in &ty.stored {
                    if let Some(default) = stored.default {
                        children.push(Value::Obj(default));
                    }
                }
                for computed in ty.computed.values() {
                    children.push(Value::Obj(computed.getter));
                    if let Some(setter) = computed.setter {
                        children.push(Value::Obj(setter));
                    }
                }
                for observers in ty.observers.values() {
                    if let Some(will_set) = observers.will_set {
                        children.push(Value::Obj(will_set));
                    }
                    if let Some(did_set) = observers.did_set {
                        children.push(Value::Obj(did_set));
                    }
                }
                children
            }
            Object::Enum(e) => {
                let mut children = Vec::new();
                for case in e.cases.values() {
                    children.push(Value::Obj(case.case_obj));
                    if let Some(raw) = case.raw {
                        children.push(raw);
                    }
                }
                for method in e.methods.values() {
                    children.push(Value::Obj(method.closure));
                }
                children.extend(e.statics.values().copied());
                for computed in e.computed.values() {
                    children.push(Value::Obj(computed.getter));
                    if let Some(setter) = computed.setter {
                        children.push(Value::Obj(setter));
                    }
                }
                children
            }
            Object::EnumCase(case) => {
                let mut children = vec![Value::Obj(case.enum_type)];
                children.extend(case.associated.iter().copied());
                if let Some(raw) = case.raw {
                    children.push(raw);
                }
                children
            }
            Object::Tuple(tuple) => tuple.elements.clone(),
            Object::BoundMethod(bound) => vec![bound.receiver, Value::Obj(bound.method)],
            Object::Upvalue(UpvalueState::Closed(value)) => vec![*value],
            Object::Upvalue(UpvalueState::Open(_)) => Vec::new(),
        }
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ObjectType::String => "String",
            ObjectType::List => "Array",
            ObjectType::Map => "Dictionary",
            ObjectType::Function => "Function",
            ObjectType::Closure => "Function",
            ObjectType::Instance => "Instance",
            ObjectType::Class => "Class",
            ObjectType::Struct => "Struct",
            ObjectType::StructInstance => "Instance",
            ObjectType::Enum => "Enum",
            ObjectType::EnumCase => "EnumCase",
            ObjectType::Protocol => "Protocol",
            ObjectType::Tuple => "Tuple",
            ObjectType::BoundMethod => "Method",
            ObjectType::Upvalue => "Upvalue",
            ObjectType::Native => "Function",
        };
        write!(f, "{}", name)
    }
}

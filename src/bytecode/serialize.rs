//! Binary serialization of assemblies.
//!
//! Little-endian throughout. Layout: magic + version, then each table in
//! order with a length prefix, then method bodies with line info and
//! optional debug-info blocks. Deserialization validates the magic, the
//! version, and every index before handing the assembly back.

use std::path::Path;

use crate::bytecode::assembly::*;
use crate::error::AssemblyError;

/// File magic: "SSBC": SwiftScript ByteCode.
pub const MAGIC: [u8; 4] = *b"SSBC";
/// Current format version.
pub const VERSION: u16 = 1;

impl Assembly {
    pub fn serialize(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.bytes(&MAGIC);
        w.u16(VERSION);

        w.u32(self.strings.len() as u32);
        for s in &self.strings {
            w.string(s);
        }

        w.u32(self.constants.len() as u32);
        for c in &self.constants {
            match c {
                Const::Nil => w.u8(0),
                Const::Bool(b) => {
                    w.u8(1);
                    w.u8(*b as u8);
                }
                Const::Int(n) => {
                    w.u8(2);
                    w.bytes(&n.to_le_bytes());
                }
                Const::Float(n) => {
                    w.u8(3);
                    w.bytes(&n.to_le_bytes());
                }
                Const::Str(idx) => {
                    w.u8(4);
                    w.u16(*idx);
                }
            }
        }

        w.u32(self.protos.len() as u32);
        for proto in &self.protos {
            w.string(&proto.name);
            w.u8(proto.params.len() as u8);
            for param in &proto.params {
                w.opt_string(param.label.as_deref());
                w.string(&param.name);
                w.opt_u16(param.default);
                w.opt_string(param.type_name.as_deref());
            }
            w.u16(proto.upvalues.len() as u16);
            for upvalue in &proto.upvalues {
                w.u8(upvalue.is_local as u8);
                w.u16(upvalue.index);
            }
            let flags = (proto.is_initializer as u8)
                | ((proto.is_override as u8) << 1)
                | ((proto.is_mutating as u8) << 2);
            w.u8(flags);
            w.opt_string(proto.owner.as_deref());
            w.u16(proto.body);
        }

        w.u32(self.protocols.len() as u32);
        for protocol in &self.protocols {
            w.u16(protocol.name);
            w.u16(protocol.inherited.len() as u16);
            for idx in &protocol.inherited {
                w.u16(*idx);
            }
            w.u16(protocol.methods.len() as u16);
            for method in &protocol.methods {
                w.u16(method.name);
                w.u8(method.param_names.len() as u8);
                for p in &method.param_names {
                    w.u16(*p);
                }
                w.u8(method.is_mutating as u8);
            }
            w.u16(protocol.properties.len() as u16);
            for property in &protocol.properties {
                w.u16(property.name);
                w.u8(property.has_getter as u8);
                w.u8(property.has_setter as u8);
            }
        }

        w.u32(self.types.len() as u32);
        for def in &self.types {
            w.u8(match def.kind {
                TypeDefKind::Class => 0,
                TypeDefKind::Struct => 1,
                TypeDefKind::Enum => 2,
            });
            w.u16(def.name);
            w.opt_u16(def.superclass);
            w.u16(def.conformances.len() as u16);
            for idx in &def.conformances {
                w.u16(*idx);
            }
            w.u16(def.stored.len() as u16);
            for stored in &def.stored {
                w.u16(stored.name);
                w.u8(stored.flags);
                w.opt_u16(stored.default_proto);
            }
            w.u16(def.computed.len() as u16);
            for computed in &def.computed {
                w.u16(computed.name);
                w.u16(computed.getter_proto);
                w.opt_u16(computed.setter_proto);
            }
            w.u16(def.observed.len() as u16);
            for observed in &def.observed {
                w.u16(observed.name);
                w.opt_u16(observed.will_set_proto);
                w.opt_u16(observed.did_set_proto);
            }
            w.u16(def.methods.len() as u16);
            for method in &def.methods {
                w.u16(method.name);
                w.u16(method.proto);
                w.u8(method.flags);
            }
            w.u16(def.cases.len() as u16);
            for case in &def.cases {
                w.u16(case.name);
                w.opt_u16(case.raw);
                w.u8(case.labels.len() as u8);
                for label in &case.labels {
                    w.u16(*label);
                }
            }
            w.opt_u16(def.raw_type);
        }

        w.u32(self.bodies.len() as u32);
        for body in &self.bodies {
            w.u32(body.code.len() as u32);
            w.bytes(&body.code);
            w.u32(body.lines.len() as u32);
            for line in &body.lines {
                w.u32(*line);
            }
            match &body.debug {
                None => w.u8(0),
                Some(debug) => {
                    w.u8(1);
                    w.string(&debug.source_file);
                    w.string(&debug.function_name);
                    w.u16(debug.locals.len() as u16);
                    for local in &debug.locals {
                        w.string(&local.name);
                        w.u16(local.slot);
                        w.u32(local.scope_start);
                        w.u32(local.scope_end);
                        w.opt_string(local.type_name.as_deref());
                    }
                }
            }
        }

        w.u16(self.main);
        w.finish()
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Assembly, AssemblyError> {
        let mut r = Reader::new(bytes);

        let magic = r.bytes(4, "magic")?;
        if magic != MAGIC {
            return Err(AssemblyError::BadMagic);
        }
        let version = r.u16("version")?;
        if version != VERSION {
            return Err(AssemblyError::UnsupportedVersion(version));
        }

        let mut assembly = Assembly::new();

        let string_count = r.u32("string count")?;
        for _ in 0..string_count {
            let s = r.string("string table")?;
            assembly.strings.push(s);
        }

        let const_count = r.u32("constant count")?;
        for _ in 0..const_count {
            let constant = match r.u8("constant tag")? {
                0 => Const::Nil,
                1 => Const::Bool(r.u8("bool constant")? != 0),
                2 => Const::Int(i64::from_le_bytes(
                    r.bytes(8, "int constant")?.try_into().unwrap(),
                )),
                3 => Const::Float(f64::from_le_bytes(
                    r.bytes(8, "float constant")?.try_into().unwrap(),
                )),
                4 => Const::Str(r.u16("string constant")?),
                _ => return Err(AssemblyError::Invalid("constant tag")),
            };
            assembly.constants.push(constant);
        }

        let proto_count = r.u32("prototype count")?;
        for _ in 0..proto_count {
            let name = r.string("prototype name")?;
            let param_count = r.u8("parameter count")?;
            let mut params = Vec::with_capacity(param_count as usize);
            for _ in 0..param_count {
                let label = r.opt_string("parameter label")?;
                let name = r.string("parameter name")?;
                let default = r.opt_u16("parameter default")?;
                let type_name = r.opt_string("parameter type")?;
                params.push(ParamInfo {
                    label,
                    name,
                    default,
                    type_name,
                });
            }
            let upvalue_count = r.u16("upvalue count")?;
            let mut upvalues = Vec::with_capacity(upvalue_count as usize);
            for _ in 0..upvalue_count {
                let is_local = r.u8("upvalue kind")? != 0;
                let index = r.u16("upvalue index")?;
                upvalues.push(UpvalueDesc { index, is_local });
            }
            let flags = r.u8("prototype flags")?;
            let owner = r.opt_string("prototype owner")?;
            let body = r.u16("prototype body")?;
            assembly.protos.push(FunctionProto {
                name,
                params,
                upvalues,
                is_initializer: flags & 1 != 0,
                is_override: flags & 2 != 0,
                is_mutating: flags & 4 != 0,
                owner,
                body,
            });
        }

        let protocol_count = r.u32("protocol count")?;
        for _ in 0..protocol_count {
            let name = r.u16("protocol name")?;
            let inherited_count = r.u16("inherited count")?;
            let mut inherited = Vec::with_capacity(inherited_count as usize);
            for _ in 0..inherited_count {
                inherited.push(r.u16("inherited protocol")?);
            }
            let method_count = r.u16("protocol method count")?;
            let mut methods = Vec::with_capacity(method_count as usize);
            for _ in 0..method_count {
                let name = r.u16("requirement name")?;
                let param_count = r.u8("requirement params")?;
                let mut param_names = Vec::with_capacity(param_count as usize);
                for _ in 0..param_count {
                    param_names.push(r.u16("requirement param")?);
                }
                let is_mutating = r.u8("requirement mutating")? != 0;
                methods.push(ProtocolMethodDef {
                    name,
                    param_names,
                    is_mutating,
                });
            }
            let property_count = r.u16("protocol property count")?;
            let mut properties = Vec::with_capacity(property_count as usize);
            for _ in 0..property_count {
                let name = r.u16("property name")?;
                let has_getter = r.u8("property getter")? != 0;
                let has_setter = r.u8("property setter")? != 0;
                properties.push(ProtocolPropertyDef {
                    name,
                    has_getter,
                    has_setter,
                });
            }
            assembly.protocols.push(ProtocolDef {
                name,
                inherited,
                methods,
                properties,
            });
        }

        let type_count = r.u32("type count")?;
        for _ in 0..type_count {
            let kind = match r.u8("type kind")? {
                0 => TypeDefKind::Class,
                1 => TypeDefKind::Struct,
                2 => TypeDefKind::Enum,
                _ => return Err(AssemblyError::Invalid("type kind")),
            };
            let name = r.u16("type name")?;
            let superclass = r.opt_u16("superclass")?;
            let conformance_count = r.u16("conformance count")?;
            let mut conformances = Vec::with_capacity(conformance_count as usize);
            for _ in 0..conformance_count {
                conformances.push(r.u16("conformance")?);
            }
            let stored_count = r.u16("stored property count")?;
            let mut stored = Vec::with_capacity(stored_count as usize);
            for _ in 0..stored_count {
                let name = r.u16("stored property name")?;
                let flags = r.u8("stored property flags")?;
                let default_proto = r.opt_u16("stored property default")?;
                stored.push(StoredPropertyDef {
                    name,
                    flags,
                    default_proto,
                });
            }
            let computed_count = r.u16("computed property count")?;
            let mut computed = Vec::with_capacity(computed_count as usize);
            for _ in 0..computed_count {
                let name = r.u16("computed property name")?;
                let getter_proto = r.u16("getter")?;
                let setter_proto = r.opt_u16("setter")?;
                computed.push(ComputedPropertyDef {
                    name,
                    getter_proto,
                    setter_proto,
                });
            }
            let observed_count = r.u16("observed property count")?;
            let mut observed = Vec::with_capacity(observed_count as usize);
            for _ in 0..observed_count {
                let name = r.u16("observed property name")?;
                let will_set_proto = r.opt_u16("willSet")?;
                let did_set_proto = r.opt_u16("didSet")?;
                observed.push(ObservedPropertyDef {
                    name,
                    will_set_proto,
                    did_set_proto,
                });
            }
            let method_count = r.u16("method count")?;
            let mut methods = Vec::with_capacity(method_count as usize);
            for _ in 0..method_count {
                let name = r.u16("method name")?;
                let proto = r.u16("method proto")?;
                let flags = r.u8("method flags")?;
                methods.push(MethodDef { name, proto, flags });
            }
            let case_count = r.u16("case count")?;
            let mut cases = Vec::with_capacity(case_count as usize);
            for _ in 0..case_count {
                let name = r.u16("case name")?;
                let raw = r.opt_u16("case raw value")?;
                let label_count = r.u8("case label count")?;
                let mut labels = Vec::with_capacity(label_count as usize);
                for _ in 0..label_count {
                    labels.push(r.u16("case label")?);
                }
                cases.push(EnumCaseDef { name, raw, labels });
            }
            let raw_type = r.opt_u16("enum raw type")?;
            assembly.types.push(TypeDef {
                kind,
                name,
                superclass,
                conformances,
                stored,
                computed,
                observed,
                methods,
                cases,
                raw_type,
            });
        }

        let body_count = r.u32("body count")?;
        for _ in 0..body_count {
            let code_len = r.u32("code length")? as usize;
            let code = r.bytes(code_len, "code")?.to_vec();
            let line_count = r.u32("line count")? as usize;
            let mut lines = Vec::with_capacity(line_count);
            for _ in 0..line_count {
                lines.push(r.u32("line number")?);
            }
            let debug = if r.u8("debug flag")? != 0 {
                let source_file = r.string("debug source")?;
                let function_name = r.string("debug function")?;
                let local_count = r.u16("debug local count")?;
                let mut locals = Vec::with_capacity(local_count as usize);
                for _ in 0..local_count {
                    let name = r.string("debug local name")?;
                    let slot = r.u16("debug local slot")?;
                    let scope_start = r.u32("debug local start")?;
                    let scope_end = r.u32("debug local end")?;
                    let type_name = r.opt_string("debug local type")?;
                    locals.push(LocalDebug {
                        name,
                        slot,
                        scope_start,
                        scope_end,
                        type_name,
                    });
                }
                Some(DebugInfo {
                    source_file,
                    function_name,
                    locals,
                })
            } else {
                None
            };
            assembly.bodies.push(MethodBody { code, lines, debug });
        }

        assembly.main = r.u16("main index")?;

        assembly.rebuild_string_map();
        assembly.validate()?;
        Ok(assembly)
    }

    pub fn write_file(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.serialize())
    }

    pub fn read_file(path: &Path) -> Result<Assembly, crate::error::SwiftScriptError> {
        let bytes = std::fs::read(path)?;
        Ok(Assembly::deserialize(&bytes)?)
    }
}

struct Writer {
    buffer: Vec<u8>,
}

impl Writer {
    fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    fn u8(&mut self, v: u8) {
        self.buffer.push(v);
    }

    fn u16(&mut self, v: u16) {
        self.buffer.extend_from_slice(&v.to_le_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.buffer.extend_from_slice(&v.to_le_bytes());
    }

    fn bytes(&mut self, v: &[u8]) {
        self.buffer.extend_from_slice(v);
    }

    fn string(&mut self, s: &str) {
        self.u32(s.len() as u32);
        self.buffer.extend_from_slice(s.as_bytes());
    }

    fn opt_string(&mut self, s: Option<&str>) {
        match s {
            Some(s) => {
                self.u8(1);
                self.string(s);
            }
            None => self.u8(0),
        }
    }

    fn opt_u16(&mut self, v: Option<u16>) {
        match v {
            Some(v) => {
                self.u8(1);
                self.u16(v);
            }
            None => self.u8(0),
        }
    }

    fn finish(self) -> Vec<u8> {
        self.buffer
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn bytes(&mut self, n: usize, what: &'static str) -> Result<&'a [u8], AssemblyError> {
        if self.offset + n > self.bytes.len() {
            return Err(AssemblyError::Truncated(what));
        }
        let slice = &self.bytes[self.offset..self.offset + n];
        self.offset += n;
        Ok(slice)
    }

    fn u8(&mut self, what: &'static str) -> Result<u8, AssemblyError> {
        Ok(self.bytes(1, what)?[0])
    }

    fn u16(&mut self, what: &'static str) -> Result<u16, AssemblyError> {
        let b = self.bytes(2, what)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self, what: &'static str) -> Result<u32, AssemblyError> {
        let b = self.bytes(4, what)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn string(&mut self, what: &'static str) -> Result<String, AssemblyError> {
        let len = self.u32(what)? as usize;
        let bytes = self.bytes(len, what)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| AssemblyError::Invalid("UTF-8 string"))
    }

    fn opt_string(&mut self, what: &'static str) -> Result<Option<String>, AssemblyError> {
        if self.u8(what)? != 0 {
            Ok(Some(self.string(what)?))
        } else {
            Ok(None)
        }
    }

    fn opt_u16(&mut self, what: &'static str) -> Result<Option<u16>, AssemblyError> {
        if self.u8(what)? != 0 {
            Ok(Some(self.u16(what)?))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::opcode::OpCode;

    fn tiny_assembly() -> Assembly {
        let mut assembly = Assembly::new();
        let hello = assembly.add_string("hello");
        let constant = assembly.add_constant(Const::Int(42));
        let mut body = MethodBody::new();
        body.write_op(OpCode::Constant, 1);
        body.write_u16(constant, 1);
        body.write_op(OpCode::String, 2);
        body.write_u16(hello, 2);
        body.write_op(OpCode::Print, 2);
        body.write_byte(2, 2);
        body.write_op(OpCode::Nil, 3);
        body.write_op(OpCode::Return, 3);
        body.debug = Some(DebugInfo {
            source_file: "test.ss".to_string(),
            function_name: "<script>".to_string(),
            locals: vec![LocalDebug {
                name: "x".to_string(),
                slot: 1,
                scope_start: 0,
                scope_end: 8,
                type_name: Some("Int".to_string()),
            }],
        });
        let body_idx = assembly.add_body(body);
        let proto = FunctionProto::new("", body_idx);
        assembly.main = assembly.add_proto(proto);
        assembly
    }

    #[test]
    fn test_round_trip() {
        let assembly = tiny_assembly();
        let bytes = assembly.serialize();
        let restored = Assembly::deserialize(&bytes).unwrap();
        assert_eq!(restored.strings, assembly.strings);
        assert_eq!(restored.constants, assembly.constants);
        assert_eq!(restored.bodies, assembly.bodies);
        assert_eq!(restored.protos, assembly.protos);
        assert_eq!(restored.main, assembly.main);
        // Byte-identical on a second pass.
        assert_eq!(restored.serialize(), bytes);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut bytes = tiny_assembly().serialize();
        bytes[0] = b'X';
        assert!(matches!(
            Assembly::deserialize(&bytes),
            Err(AssemblyError::BadMagic)
        ));
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let mut bytes = tiny_assembly().serialize();
        bytes[4] = 0xEE;
        bytes[5] = 0xEE;
        assert!(matches!(
            Assembly::deserialize(&bytes),
            Err(AssemblyError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn test_truncation_rejected() {
        let bytes = tiny_assembly().serialize();
        for cut in [3, 6, 10, bytes.len() - 1] {
            assert!(Assembly::deserialize(&bytes[..cut]).is_err());
        }
    }
}

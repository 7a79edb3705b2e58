//! Human-readable disassembly of compiled assemblies.

use crate::bytecode::assembly::{Assembly, Const, MethodBody};
use crate::bytecode::opcode::{OpCode, NO_LABEL};

/// Disassemble every method body in an assembly.
pub fn disassemble(assembly: &Assembly) -> String {
    let mut out = String::new();
    for (i, proto) in assembly.protos.iter().enumerate() {
        let name = if proto.name.is_empty() {
            "<script>"
        } else {
            &proto.name
        };
        out.push_str(&format!("== fn {} (proto {}) ==\n", name, i));
        out.push_str(&disassemble_body(
            assembly,
            &assembly.bodies[proto.body as usize],
        ));
    }
    out
}

/// Disassemble a single method body.
pub fn disassemble_body(assembly: &Assembly, body: &MethodBody) -> String {
    let mut out = String::new();
    let mut offset = 0usize;
    let mut last_line = 0u32;

    while offset < body.code.len() {
        let line = body.line_at(offset);
        if line == last_line {
            out.push_str(&format!("{:04}    | ", offset));
        } else {
            out.push_str(&format!("{:04} {:4} ", offset, line));
            last_line = line;
        }
        offset = disassemble_instruction(assembly, body, offset, &mut out);
        out.push('\n');
    }
    out
}

fn disassemble_instruction(
    assembly: &Assembly,
    body: &MethodBody,
    offset: usize,
    out: &mut String,
) -> usize {
    let Some(op) = OpCode::from_byte(body.code[offset]) else {
        out.push_str(&format!("<bad opcode {:#04x}>", body.code[offset]));
        return offset + 1;
    };

    let mut next = offset + 1 + op.fixed_operand_width();
    let operand = |at: usize| body.read_u16(at);

    match op {
        OpCode::Constant => {
            let idx = operand(offset + 1);
            let rendered = match &assembly.constants[idx as usize] {
                Const::Nil => "nil".to_string(),
                Const::Bool(b) => b.to_string(),
                Const::Int(n) => n.to_string(),
                Const::Float(n) => n.to_string(),
                Const::Str(s) => format!("\"{}\"", assembly.string(*s)),
            };
            out.push_str(&format!("{:<28} {} ({})", "CONSTANT", idx, rendered));
        }
        OpCode::String
        | OpCode::GetGlobal
        | OpCode::SetGlobal
        | OpCode::DefineGlobal
        | OpCode::GetProperty
        | OpCode::SetProperty
        | OpCode::Super
        | OpCode::GetTupleLabel
        | OpCode::MatchEnumCase
        | OpCode::TypeCheck
        | OpCode::TypeCast
        | OpCode::TypeCastOptional
        | OpCode::TypeCastForced => {
            let idx = operand(offset + 1);
            out.push_str(&format!(
                "{:<28} {} '{}'",
                opcode_name(op),
                idx,
                assembly.string(idx)
            ));
        }
        OpCode::GetLocal
        | OpCode::SetLocal
        | OpCode::GetUpvalue
        | OpCode::SetUpvalue
        | OpCode::Array
        | OpCode::Dict
        | OpCode::GetTupleIndex
        | OpCode::GetAssociated => {
            out.push_str(&format!("{:<28} {}", opcode_name(op), operand(offset + 1)));
        }
        OpCode::Jump | OpCode::JumpIfFalse | OpCode::JumpIfNil | OpCode::OptionalChain
        | OpCode::NilCoalesce => {
            let jump = operand(offset + 1) as usize;
            out.push_str(&format!(
                "{:<28} {} -> {}",
                opcode_name(op),
                offset,
                next + jump
            ));
        }
        OpCode::Loop => {
            let jump = operand(offset + 1) as usize;
            out.push_str(&format!("{:<28} {} -> {}", "LOOP", offset, next - jump));
        }
        OpCode::Function | OpCode::Closure => {
            let idx = operand(offset + 1);
            let proto = &assembly.protos[idx as usize];
            out.push_str(&format!(
                "{:<28} {} <fn {}>",
                opcode_name(op),
                idx,
                if proto.name.is_empty() {
                    "anonymous"
                } else {
                    &proto.name
                }
            ));
        }
        OpCode::Class | OpCode::Struct | OpCode::Enum => {
            let idx = operand(offset + 1);
            let def = &assembly.types[idx as usize];
            out.push_str(&format!(
                "{:<28} {} '{}'",
                opcode_name(op),
                idx,
                assembly.string(def.name)
            ));
        }
        OpCode::Protocol => {
            let idx = operand(offset + 1);
            let def = &assembly.protocols[idx as usize];
            out.push_str(&format!(
                "{:<28} {} '{}'",
                "PROTOCOL",
                idx,
                assembly.string(def.name)
            ));
        }
        OpCode::Method
        | OpCode::StructMethod
        | OpCode::DefineProperty
        | OpCode::DefineComputedProperty
        | OpCode::DefinePropertyWithObservers => {
            let idx = operand(offset + 1);
            let flags = body.code[offset + 3];
            out.push_str(&format!(
                "{:<28} '{}' flags={:#04x}",
                opcode_name(op),
                assembly.string(idx),
                flags
            ));
        }
        OpCode::Call | OpCode::Print => {
            out.push_str(&format!("{:<28} {}", opcode_name(op), body.code[offset + 1]));
        }
        OpCode::CallNamed => {
            let argc = body.code[offset + 1] as usize;
            let mut labels = Vec::new();
            for i in 0..argc {
                let label = body.read_u16(next + i * 2);
                if label == NO_LABEL {
                    labels.push("_".to_string());
                } else {
                    labels.push(assembly.string(label).to_string());
                }
            }
            next += argc * 2;
            out.push_str(&format!("{:<28} {} [{}]", "CALL_NAMED", argc, labels.join(", ")));
        }
        OpCode::Tuple => {
            let count = body.code[offset + 1] as usize;
            next += count * 2;
            out.push_str(&format!("{:<28} {}", "TUPLE", count));
        }
        OpCode::EnumCase => {
            let name = operand(offset + 1);
            let arity = body.code[offset + 4] as usize;
            next += arity * 2;
            out.push_str(&format!(
                "{:<28} '{}' arity={}",
                "ENUM_CASE",
                assembly.string(name),
                arity
            ));
        }
        _ => out.push_str(opcode_name(op)),
    }

    next
}

fn opcode_name(op: OpCode) -> &'static str {
    match op {
        OpCode::Constant => "CONSTANT",
        OpCode::String => "STRING",
        OpCode::Nil => "NIL",
        OpCode::True => "TRUE",
        OpCode::False => "FALSE",
        OpCode::Pop => "POP",
        OpCode::Dup => "DUP",
        OpCode::Add => "ADD",
        OpCode::Subtract => "SUBTRACT",
        OpCode::Multiply => "MULTIPLY",
        OpCode::Divide => "DIVIDE",
        OpCode::Modulo => "MODULO",
        OpCode::Negate => "NEGATE",
        OpCode::BitwiseNot => "BITWISE_NOT",
        OpCode::BitwiseAnd => "BITWISE_AND",
        OpCode::BitwiseOr => "BITWISE_OR",
        OpCode::BitwiseXor => "BITWISE_XOR",
        OpCode::LeftShift => "LEFT_SHIFT",
        OpCode::RightShift => "RIGHT_SHIFT",
        OpCode::Equal => "EQUAL",
        OpCode::NotEqual => "NOT_EQUAL",
        OpCode::Less => "LESS",
        OpCode::Greater => "GREATER",
        OpCode::LessEqual => "LESS_EQUAL",
        OpCode::GreaterEqual => "GREATER_EQUAL",
        OpCode::Not => "NOT",
        OpCode::GetGlobal => "GET_GLOBAL",
        OpCode::SetGlobal => "SET_GLOBAL",
        OpCode::DefineGlobal => "DEFINE_GLOBAL",
        OpCode::GetLocal => "GET_LOCAL",
        OpCode::SetLocal => "SET_LOCAL",
        OpCode::Jump => "JUMP",
        OpCode::JumpIfFalse => "JUMP_IF_FALSE",
        OpCode::JumpIfNil => "JUMP_IF_NIL",
        OpCode::Loop => "LOOP",
        OpCode::Function => "FUNCTION",
        OpCode::Closure => "CLOSURE",
        OpCode::Class => "CLASS",
        OpCode::Method => "METHOD",
        OpCode::DefineProperty => "DEFINE_PROPERTY",
        OpCode::DefineComputedProperty => "DEFINE_COMPUTED_PROPERTY",
        OpCode::Inherit => "INHERIT",
        OpCode::Call => "CALL",
        OpCode::CallNamed => "CALL_NAMED",
        OpCode::Return => "RETURN",
        OpCode::GetUpvalue => "GET_UPVALUE",
        OpCode::SetUpvalue => "SET_UPVALUE",
        OpCode::CloseUpvalue => "CLOSE_UPVALUE",
        OpCode::GetProperty => "GET_PROPERTY",
        OpCode::SetProperty => "SET_PROPERTY",
        OpCode::Super => "SUPER",
        OpCode::OptionalChain => "OPTIONAL_CHAIN",
        OpCode::Unwrap => "UNWRAP",
        OpCode::NilCoalesce => "NIL_COALESCE",
        OpCode::RangeInclusive => "RANGE_INCLUSIVE",
        OpCode::RangeExclusive => "RANGE_EXCLUSIVE",
        OpCode::Array => "ARRAY",
        OpCode::Dict => "DICT",
        OpCode::GetSubscript => "GET_SUBSCRIPT",
        OpCode::SetSubscript => "SET_SUBSCRIPT",
        OpCode::Tuple => "TUPLE",
        OpCode::GetTupleIndex => "GET_TUPLE_INDEX",
        OpCode::GetTupleLabel => "GET_TUPLE_LABEL",
        OpCode::Struct => "STRUCT",
        OpCode::StructMethod => "STRUCT_METHOD",
        OpCode::CopyValue => "COPY_VALUE",
        OpCode::DefinePropertyWithObservers => "DEFINE_PROPERTY_WITH_OBSERVERS",
        OpCode::Enum => "ENUM",
        OpCode::EnumCase => "ENUM_CASE",
        OpCode::MatchEnumCase => "MATCH_ENUM_CASE",
        OpCode::GetAssociated => "GET_ASSOCIATED",
        OpCode::Protocol => "PROTOCOL",
        OpCode::TypeCheck => "TYPE_CHECK",
        OpCode::TypeCast => "TYPE_CAST",
        OpCode::TypeCastOptional => "TYPE_CAST_OPTIONAL",
        OpCode::TypeCastForced => "TYPE_CAST_FORCED",
        OpCode::Throw => "THROW",
        OpCode::ReadLine => "READ_LINE",
        OpCode::Print => "PRINT",
        OpCode::Halt => "HALT",
    }
}

//! The bytecode container ("assembly"): opcodes, constant pools, string
//! table, method bodies, type and protocol tables, debug info, and the
//! binary serialization format.

pub mod assembly;
pub mod disassembler;
pub mod opcode;
pub mod serialize;

pub use assembly::{
    Assembly, Const, DebugInfo, FunctionProto, LocalDebug, MethodBody, ParamInfo, ProtocolDef,
    TypeDef, UpvalueDesc,
};
pub use disassembler::{disassemble, disassemble_body};
pub use opcode::OpCode;

// src/codegen/opcode.rs
//! The instruction set. Operands are frame-relative value slots; the exact
//! encoding is internal to this crate and owes nothing to any external
//! format. A parallel line table maps each opcode back to source for
//! breakpoints and stack traces.

use crate::binding::{FunctionId, TypeId};
use crate::frontend::ast::{BinaryOp, UnaryOp};

/// The runtime representation a typed opcode operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scalar {
    Integer,
    Real,
    Boolean,
    Handle,
    String,
}

/// An inline literal operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Integer(i64),
    Real(f64),
    Boolean(bool),
    String(String),
    Null,
}

/// A conversion selected by the semantic analyzer. The interpreter never
/// re-derives conversions; it executes exactly what was chosen at compile
/// time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastKind {
    /// Representation-preserving (upcast, enum to Integer, same type).
    Identity,
    IntegerToReal,
    RealToInteger,
    IntegerToEnum,
    /// Runtime-checked downcast; a failed check raises an invalid-cast
    /// error.
    Downcast(TypeId),
    ToAny,
    /// Runtime-checked unpack of an Any value.
    FromAny(TypeId),
}

#[derive(Debug, Clone)]
pub enum Opcode {
    LoadLiteral {
        dst: u32,
        value: Literal,
    },
    Copy {
        dst: u32,
        src: u32,
    },
    Binary {
        op: BinaryOp,
        operands: Scalar,
        dst: u32,
        lhs: u32,
        rhs: u32,
    },
    Unary {
        op: UnaryOp,
        operands: Scalar,
        dst: u32,
        src: u32,
    },
    Jump {
        target: usize,
    },
    JumpIfFalse {
        cond: u32,
        target: usize,
    },
    JumpIfTrue {
        cond: u32,
        target: usize,
    },
    /// Allocate an instance and run no constructor (the call follows).
    NewObject {
        dst: u32,
        ty: TypeId,
    },
    Delete {
        src: u32,
    },
    GetField {
        dst: u32,
        obj: u32,
        offset: u32,
    },
    SetField {
        obj: u32,
        offset: u32,
        src: u32,
    },
    GetStatic {
        dst: u32,
        index: u32,
    },
    SetStatic {
        index: u32,
        src: u32,
    },
    Call {
        function: FunctionId,
        /// Caller slot receiving the return value.
        dst: Option<u32>,
        this: Option<u32>,
        args: Vec<u32>,
        /// Re-dispatch on the runtime type of `this`.
        virtual_call: bool,
    },
    MakeDelegate {
        dst: u32,
        this: Option<u32>,
        function: FunctionId,
    },
    CallDelegate {
        callee: u32,
        dst: Option<u32>,
        args: Vec<u32>,
    },
    Cast {
        dst: u32,
        src: u32,
        kind: CastKind,
    },
    /// Convert any value to its display string.
    ToString {
        dst: u32,
        src: u32,
    },
    /// String interpolation: join already-stringified parts.
    Concat {
        dst: u32,
        parts: Vec<u32>,
    },
    Throw {
        src: u32,
    },
    Return,
}

/// One function's compiled body.
#[derive(Debug, Clone, Default)]
pub struct CompiledCode {
    pub opcodes: Vec<Opcode>,
    /// Source line per opcode, parallel to `opcodes`.
    pub lines: Vec<u32>,
    /// Hash of the code entry the body came from; pairs with `lines` to key
    /// breakpoints.
    pub entry_hash: u64,
}

impl CompiledCode {
    pub fn push(&mut self, opcode: Opcode, line: u32) -> usize {
        let index = self.opcodes.len();
        self.opcodes.push(opcode);
        self.lines.push(line);
        index
    }

    /// Backpatch a jump emitted before its target was known.
    pub fn patch_jump(&mut self, at: usize, target: usize) {
        match &mut self.opcodes[at] {
            Opcode::Jump { target: t }
            | Opcode::JumpIfFalse { target: t, .. }
            | Opcode::JumpIfTrue { target: t, .. } => *t = target,
            other => unreachable!("patching a non-jump opcode {other:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_jump_rewrites_target() {
        let mut code = CompiledCode::default();
        let at = code.push(Opcode::Jump { target: 0 }, 1);
        code.push(Opcode::Return, 2);
        code.patch_jump(at, 7);
        assert!(matches!(code.opcodes[at], Opcode::Jump { target: 7 }));
        assert_eq!(code.lines, vec![1, 2]);
    }
}

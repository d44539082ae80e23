// src/sema/mod.rs
//! The Syntaxer: a fixed sequence of whole-tree passes that turns a parsed
//! program into a sealed library plus fully typed, lowered function bodies.
//! Everything the code generator needs is recorded in side tables keyed by
//! expression `NodeId`; the tree itself stays free of analysis state.

mod cycles;
mod overloads;
mod rewrite;
mod scope;
mod syntaxer;
mod typing;

pub use syntaxer::analyze;
pub(crate) use syntaxer::STATIC_INIT_NAME;

use crate::binding::{FunctionId, LibraryRef, Type, TypeId};
use crate::codegen::CastKind;
use crate::frontend::ast::{NodeId, Statement, TempId};
use crate::frontend::CodeLocation;
use rustc_hash::FxHashMap;

/// Read/write capability of an expression, and how its parent uses it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Io {
    pub read: bool,
    pub write: bool,
}

impl Io {
    pub const READ: Io = Io {
        read: true,
        write: false,
    };
    pub const WRITE: Io = Io {
        read: false,
        write: true,
    };
    pub const READ_WRITE: Io = Io {
        read: true,
        write: true,
    };
}

/// What a name or call site resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Local {
        slot: u32,
    },
    This,
    Field {
        owner: TypeId,
        offset: u32,
        is_static: bool,
    },
    Property {
        get: Option<FunctionId>,
        set: Option<FunctionId>,
        is_static: bool,
    },
    /// A type name in expression position (static access target).
    Type(TypeId),
    EnumValue(i64),
    /// A member function; recorded on the callee node of a call, or on a
    /// member access producing a delegate value.
    Function {
        id: FunctionId,
        is_virtual: bool,
    },
    /// A `new` expression's target type and chosen constructor.
    Constructor {
        ty: TypeId,
        function: Option<FunctionId>,
    },
}

/// Side tables populated by the typing pass, keyed by `NodeId`.
#[derive(Debug, Default)]
pub struct Tables {
    pub result_type: FxHashMap<NodeId, Type>,
    pub io: FxHashMap<NodeId, Io>,
    pub io_usage: FxHashMap<NodeId, Io>,
    pub refs: FxHashMap<NodeId, Resolved>,
    pub casts: FxHashMap<NodeId, CastKind>,
    pub locations: FxHashMap<NodeId, CodeLocation>,
    /// Frame slot for each lowering-introduced temporary.
    pub temp_slots: FxHashMap<TempId, u32>,
    /// Frame slot for each local `var`, keyed by its initializer node.
    pub var_slots: FxHashMap<NodeId, u32>,
    /// Resolved `Add` overload per element of an initializer list, keyed by
    /// the element node.
    pub initializer_adds: FxHashMap<NodeId, FunctionId>,
}

impl Tables {
    pub fn ty(&self, id: NodeId) -> &Type {
        &self.result_type[&id]
    }
}

/// One function body after lowering, owned by the analysis (lowering
/// rewrites statements, so bodies are cloned out of the parse tree).
#[derive(Debug)]
pub struct Body {
    pub function: FunctionId,
    pub statements: Vec<Statement>,
}

/// The product of semantic analysis: the sealed library, the typed side
/// tables, and the lowered bodies awaiting code generation.
pub struct Analysis {
    pub library: LibraryRef,
    pub tables: Tables,
    pub bodies: Vec<Body>,
}

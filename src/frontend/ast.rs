// src/frontend/ast.rs
//! The syntax tree. Nodes own their children; there are no parent pointers.
//! Every expression carries a `NodeId`, and all information computed by the
//! semantic analyzer (result types, io capabilities, resolutions) lives in
//! side tables keyed by that id rather than on the nodes themselves.

use crate::frontend::CodeLocation;

/// Stable identity for an expression node within one syntax tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

/// Identity for a lowering-introduced temporary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TempId(pub u32);

/// Hands out fresh node and temp ids. The parser creates one per tree; the
/// semantic analyzer continues from it when lowering rewrites expressions.
#[derive(Debug, Clone, Default)]
pub struct NodeIdGen {
    next_node: u32,
    next_temp: u32,
}

impl NodeIdGen {
    pub fn fresh(&mut self) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        id
    }

    pub fn fresh_temp(&mut self) -> TempId {
        let id = TempId(self.next_temp);
        self.next_temp += 1;
        id
    }
}

/// The root of a parsed program: all class and enum declarations from every
/// code entry in the project.
#[derive(Debug, Default)]
pub struct Program {
    pub classes: Vec<ClassNode>,
    pub enums: Vec<EnumNode>,
    pub ids: NodeIdGen,
}

/// A literal value, shared between attribute arguments and expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Integer(i64),
    Real(f64),
    String(String),
    Boolean(bool),
    Null,
}

/// An attribute attached to a declaration: `[Static]`, `[Virtual]`, ...
#[derive(Debug, Clone)]
pub struct AttributeNode {
    pub name: String,
    pub arguments: Vec<LiteralValue>,
    pub location: CodeLocation,
}

/// A type as written in source: `Integer`, `Array[Real]`, `ref Vec3`.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxTypeNode {
    pub name: String,
    pub arguments: Vec<SyntaxTypeNode>,
    pub is_ref: bool,
    pub location: CodeLocation,
}

impl SyntaxTypeNode {
    pub fn simple(name: impl Into<String>, location: CodeLocation) -> Self {
        Self {
            name: name.into(),
            arguments: Vec::new(),
            is_ref: false,
            location,
        }
    }
}

/// A `sends EventName : EventType;` declaration.
#[derive(Debug, Clone)]
pub struct SendsNode {
    pub name: String,
    pub event_type: SyntaxTypeNode,
    pub location: CodeLocation,
}

#[derive(Debug, Clone)]
pub struct ClassNode {
    pub name: String,
    pub name_location: CodeLocation,
    pub location: CodeLocation,
    /// `struct` declares a value type, `class` a reference type.
    pub is_struct: bool,
    pub base: Option<SyntaxTypeNode>,
    pub template_params: Vec<(String, CodeLocation)>,
    pub attributes: Vec<AttributeNode>,
    pub sends: Vec<SendsNode>,
    pub variables: Vec<MemberVariableNode>,
    pub functions: Vec<FunctionNode>,
    pub constructors: Vec<FunctionNode>,
    pub destructor: Option<FunctionNode>,
}

impl ClassNode {
    pub fn is_template(&self) -> bool {
        !self.template_params.is_empty()
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a.name == name)
    }
}

#[derive(Debug, Clone)]
pub struct EnumNode {
    pub name: String,
    pub location: CodeLocation,
    pub is_flags: bool,
    pub attributes: Vec<AttributeNode>,
    pub values: Vec<EnumValueNode>,
}

#[derive(Debug, Clone)]
pub struct EnumValueNode {
    pub name: String,
    pub value: Option<i64>,
    pub location: CodeLocation,
}

/// Explicit get/set bodies of a property declaration.
#[derive(Debug, Clone)]
pub struct PropertyBody {
    pub get: Option<Vec<Statement>>,
    pub set: Option<Vec<Statement>>,
}

/// A member `var` declaration: a field, or a property when a get/set body is
/// attached.
#[derive(Debug, Clone)]
pub struct MemberVariableNode {
    pub name: String,
    pub location: CodeLocation,
    pub attributes: Vec<AttributeNode>,
    pub ty: SyntaxTypeNode,
    pub initializer: Option<Expr>,
    pub property: Option<PropertyBody>,
}

impl MemberVariableNode {
    pub fn is_static(&self) -> bool {
        self.attributes.iter().any(|a| a.name == "Static")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Function,
    Constructor,
    Destructor,
    Getter,
    Setter,
}

#[derive(Debug, Clone)]
pub struct ParamNode {
    pub name: String,
    pub ty: SyntaxTypeNode,
    pub location: CodeLocation,
}

#[derive(Debug, Clone)]
pub struct FunctionNode {
    pub name: String,
    pub name_location: CodeLocation,
    pub location: CodeLocation,
    pub kind: FunctionKind,
    pub attributes: Vec<AttributeNode>,
    pub params: Vec<ParamNode>,
    pub return_type: Option<SyntaxTypeNode>,
    pub body: Vec<Statement>,
}

impl FunctionNode {
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a.name == name)
    }

    pub fn is_static(&self) -> bool {
        self.has_attribute("Static")
    }
}

#[derive(Debug, Clone)]
pub struct LocalVariableNode {
    pub name: String,
    pub location: CodeLocation,
    pub ty: Option<SyntaxTypeNode>,
    pub initializer: Expr,
}

#[derive(Debug, Clone)]
pub struct IfPart {
    pub condition: Option<Expr>,
    pub body: Vec<Statement>,
    pub location: CodeLocation,
}

#[derive(Debug, Clone)]
pub enum Statement {
    Expression(Expr),
    Var(Box<LocalVariableNode>),
    /// All branches of an if/else-if/else chain; a trailing part with no
    /// condition is the unconditional else.
    If(Vec<IfPart>),
    While {
        condition: Expr,
        body: Vec<Statement>,
        location: CodeLocation,
    },
    For {
        init: Option<Box<Statement>>,
        condition: Option<Expr>,
        increment: Option<Expr>,
        body: Vec<Statement>,
        location: CodeLocation,
    },
    Loop {
        body: Vec<Statement>,
        location: CodeLocation,
    },
    Scope {
        body: Vec<Statement>,
        location: CodeLocation,
    },
    Break(CodeLocation),
    Continue(CodeLocation),
    Return {
        value: Option<Expr>,
        location: CodeLocation,
    },
    Throw {
        value: Expr,
        location: CodeLocation,
    },
    Delete {
        value: Expr,
        location: CodeLocation,
    },
}

impl Statement {
    pub fn location(&self) -> &CodeLocation {
        match self {
            Statement::Expression(e) => &e.location,
            Statement::Var(v) => &v.location,
            Statement::If(parts) => &parts[0].location,
            Statement::While { location, .. }
            | Statement::For { location, .. }
            | Statement::Loop { location, .. }
            | Statement::Scope { location, .. }
            | Statement::Return { location, .. }
            | Statement::Throw { location, .. }
            | Statement::Delete { location, .. } => location,
            Statement::Break(location) | Statement::Continue(location) => location,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    And,
    Or,
    Assign,
    AddAssign,
    SubtractAssign,
    MultiplyAssign,
    DivideAssign,
    ModuloAssign,
}

impl BinaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Modulo => "%",
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::Less => "<",
            Self::Greater => ">",
            Self::LessEqual => "<=",
            Self::GreaterEqual => ">=",
            Self::And => "&&",
            Self::Or => "||",
            Self::Assign => "=",
            Self::AddAssign => "+=",
            Self::SubtractAssign => "-=",
            Self::MultiplyAssign => "*=",
            Self::DivideAssign => "/=",
            Self::ModuloAssign => "%=",
        }
    }

    pub fn is_assignment(&self) -> bool {
        matches!(
            self,
            Self::Assign
                | Self::AddAssign
                | Self::SubtractAssign
                | Self::MultiplyAssign
                | Self::DivideAssign
                | Self::ModuloAssign
        )
    }

    /// The arithmetic operator underlying a compound assignment.
    pub fn compound_base(&self) -> Option<BinaryOp> {
        Some(match self {
            Self::AddAssign => Self::Add,
            Self::SubtractAssign => Self::Subtract,
            Self::MultiplyAssign => Self::Multiply,
            Self::DivideAssign => Self::Divide,
            Self::ModuloAssign => Self::Modulo,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
    Increment,
    Decrement,
}

impl UnaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Negate => "-",
            Self::Not => "!",
            Self::Increment => "++",
            Self::Decrement => "--",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub id: NodeId,
    pub location: CodeLocation,
    pub kind: ExprKind,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Literal(LiteralValue),
    /// Interleaved text pieces (string literals) and embedded expressions.
    StringInterpolant(Vec<Expr>),
    Identifier(String),
    This,
    MemberAccess {
        base: Box<Expr>,
        name: String,
        name_location: CodeLocation,
    },
    /// A type name used as an expression (static member access target).
    /// Produced by the semantic analyzer from `Identifier` when the name
    /// resolves to a type rather than a value.
    StaticType(SyntaxTypeNode),
    FunctionCall {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Indexer {
        base: Box<Expr>,
        indices: Vec<Expr>,
    },
    TypeCast {
        operand: Box<Expr>,
        target: SyntaxTypeNode,
    },
    New {
        ty: SyntaxTypeNode,
        args: Vec<Expr>,
    },
    /// `new T(...) { a, b, c }`: each value is added to the container.
    Initializer {
        base: Box<Expr>,
        values: Vec<Expr>,
    },
    /// Evaluation sequence introduced by lowering; value is the last entry.
    Multi(Vec<Expr>),
    /// Evaluate and stash into a lowering temporary; value is the stored one.
    LetTemp {
        temp: TempId,
        value: Box<Expr>,
    },
    /// Read a lowering temporary.
    TempRef(TempId),
    /// Tolerant-mode placeholder for unparsable input.
    Error,
}

impl Expr {
    pub fn new(id: NodeId, location: CodeLocation, kind: ExprKind) -> Self {
        Self { id, location, kind }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ids_are_unique() {
        let mut ids = NodeIdGen::default();
        let a = ids.fresh();
        let b = ids.fresh();
        assert_ne!(a, b);
    }

    #[test]
    fn compound_base_maps_to_arithmetic() {
        assert_eq!(BinaryOp::AddAssign.compound_base(), Some(BinaryOp::Add));
        assert_eq!(BinaryOp::ModuloAssign.compound_base(), Some(BinaryOp::Modulo));
        assert_eq!(BinaryOp::Add.compound_base(), None);
        assert!(BinaryOp::AddAssign.is_assignment());
        assert!(!BinaryOp::Equal.is_assignment());
    }
}

use std::sync::Arc;

use alchemy_syntax::{BuiltInType, LiteralData, PassBy, StorageClass, TokenRange};

use crate::builtins::BuiltIns;
use crate::member_info::{FieldInfo, IndexerInfo, MethodGroup, MethodInfo, PropertyInfo};
use crate::resolved_type::ResolvedType;

/// Index handles into a method body's arenas. Expressions, scopes and
/// VEPs are arena records so tree links stay relocation-safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExprId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VepId(pub u32);

/// Where a VEP binding came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationSource {
    LocalVariable,
    Field,
    StaticField,
    Property,
    StaticProperty,
    Parameter,
    ContextListParameter,
    This,
}

/// A variable/expression/parameter binding in a scope.
#[derive(Debug, Clone)]
pub struct Vep {
    pub name: String,
    pub ty: ResolvedType,
    pub source: DeclarationSource,
    pub pass_by: PassBy,
    pub is_assignable: bool,
    pub is_closed_over: bool,
    pub token_range: TokenRange,
}

#[derive(Debug)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    pub return_type: ResolvedType,
    pub return_storage: StorageClass,
    pub is_static_boundary: bool,
    pub is_closure_boundary: bool,
    /// The `this` binding, when the scope has an instance.
    pub instance: Option<VepId>,
    pub veps: Vec<VepId>,
    pub statements: Vec<ExprId>,
}

impl Scope {
    pub fn block(parent: Option<ScopeId>) -> Scope {
        Scope {
            parent,
            return_type: ResolvedType::void(),
            return_storage: StorageClass::Default,
            is_static_boundary: false,
            is_closure_boundary: false,
            instance: None,
            veps: Vec::new(),
            statements: Vec::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EqualityOp {
    Equal,
    NotEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionalOp {
    And,
    Or,
}

/// Closed set of expression variants; visitors are exhaustive matches.
#[derive(Debug)]
pub enum ExprKind {
    Vep(VepId),
    FieldAccess {
        instance: Option<ExprId>,
        field: Arc<FieldInfo>,
    },
    PropertyAccess {
        instance: Option<ExprId>,
        property: Arc<PropertyInfo>,
    },
    IndexerAccess {
        instance: ExprId,
        indexer: Arc<IndexerInfo>,
        arguments: Vec<ExprId>,
    },
    ArrayIndex {
        array: ExprId,
        index: ExprId,
    },
    MethodGroupAccess {
        instance: Option<ExprId>,
        group: MethodGroup,
    },
    NumericLiteral {
        value: LiteralData,
    },
    BoolLiteral {
        value: bool,
    },
    NullLiteral {
        ty: ResolvedType,
    },
    DefaultLiteral {
        ty: ResolvedType,
    },
    DirectCast {
        expression: ExprId,
        ty: ResolvedType,
    },
    Arithmetic {
        lhs: ExprId,
        op: ArithmeticOp,
        rhs: ExprId,
    },
    VectorArithmetic {
        lhs: ExprId,
        op: ArithmeticOp,
        rhs: ExprId,
    },
    Comparison {
        lhs: ExprId,
        op: ComparisonOp,
        rhs: ExprId,
    },
    Equality {
        lhs: ExprId,
        op: EqualityOp,
        rhs: ExprId,
    },
    Conditional {
        lhs: ExprId,
        op: ConditionalOp,
        rhs: ExprId,
    },
    Argument {
        pass_by: PassBy,
        expression: ExprId,
    },
    StaticCall {
        method: Arc<MethodInfo>,
        arguments: Vec<ExprId>,
    },
    InstanceCall {
        instance: Option<ExprId>,
        method: Arc<MethodInfo>,
        arguments: Vec<ExprId>,
    },
    Assign {
        lhs: ExprId,
        rhs: ExprId,
    },
    DeclareLocal {
        vep: VepId,
        initializer: Option<ExprId>,
    },
    Return {
        expression: Option<ExprId>,
    },
    /// `v.hasValue` on a synthesized nullable binding.
    NullableHasValue {
        expression: ExprId,
    },
    /// `v.value` on a synthesized nullable binding.
    NullableValue {
        expression: ExprId,
    },
    If {
        conditions: Vec<ExprId>,
        body: ScopeId,
        else_branch: Option<ExprId>,
    },
    ScopeBlock {
        scope: ScopeId,
    },
    /// Placeholder for an expression that failed resolution; its type is
    /// `Null` so downstream analysis proceeds without cascading.
    SemanticError,
}

#[derive(Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub token_range: TokenRange,
}

/// Arena for one method body's expression tree.
#[derive(Debug, Default)]
pub struct ExprArena {
    pub exprs: Vec<Expr>,
    pub scopes: Vec<Scope>,
    pub veps: Vec<Vep>,
}

impl ExprArena {
    pub fn new() -> ExprArena {
        ExprArena::default()
    }

    pub fn alloc(&mut self, kind: ExprKind, token_range: TokenRange) -> ExprId {
        let id = ExprId(self.exprs.len() as u32);
        self.exprs.push(Expr { kind, token_range });
        id
    }

    pub fn alloc_scope(&mut self, scope: Scope) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(scope);
        id
    }

    pub fn alloc_vep(&mut self, vep: Vep) -> VepId {
        let id = VepId(self.veps.len() as u32);
        self.veps.push(vep);
        id
    }

    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.0 as usize]
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0 as usize]
    }

    pub fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.0 as usize]
    }

    pub fn vep(&self, id: VepId) -> &Vep {
        &self.veps[id.0 as usize]
    }

    pub fn vep_mut(&mut self, id: VepId) -> &mut Vep {
        &mut self.veps[id.0 as usize]
    }

    /// Resolved type of an expression. Calls mirror the original's
    /// virtual `GetType` dispatch as one exhaustive match.
    pub fn type_of(&self, id: ExprId, builtins: &BuiltIns) -> ResolvedType {
        match &self.expr(id).kind {
            ExprKind::Vep(vep) => self.vep(*vep).ty.clone(),
            ExprKind::FieldAccess { field, .. } => field.ty.clone(),
            ExprKind::PropertyAccess { property, .. } => property.ty.clone(),
            ExprKind::IndexerAccess { indexer, .. } => indexer.ty.clone(),
            ExprKind::ArrayIndex { array, .. } => self.type_of(*array, builtins).element_type(),
            ExprKind::MethodGroupAccess { .. } => ResolvedType::method_group(),
            ExprKind::NumericLiteral { value } => builtins.resolved(numeric_builtin(*value)),
            ExprKind::BoolLiteral { .. } => builtins.resolved(BuiltInType::Bool),
            ExprKind::NullLiteral { ty } => ty.clone(),
            ExprKind::DefaultLiteral { ty } => ty.clone(),
            ExprKind::DirectCast { ty, .. } => ty.clone(),
            ExprKind::Arithmetic { lhs, .. } => self.type_of(*lhs, builtins),
            ExprKind::VectorArithmetic { lhs, .. } => self.type_of(*lhs, builtins),
            ExprKind::Comparison { .. } => builtins.resolved(BuiltInType::Bool),
            ExprKind::Equality { .. } => builtins.resolved(BuiltInType::Bool),
            ExprKind::Conditional { .. } => builtins.resolved(BuiltInType::Bool),
            ExprKind::Argument { expression, .. } => self.type_of(*expression, builtins),
            ExprKind::StaticCall { method, .. } => method.return_type.clone(),
            ExprKind::InstanceCall { method, .. } => method.return_type.clone(),
            ExprKind::Assign { lhs, .. } => self.type_of(*lhs, builtins),
            ExprKind::DeclareLocal { vep, .. } => self.vep(*vep).ty.clone(),
            ExprKind::Return { .. } => ResolvedType::void(),
            ExprKind::NullableHasValue { .. } => builtins.resolved(BuiltInType::Bool),
            ExprKind::NullableValue { expression } => {
                self.type_of(*expression, builtins).to_non_nullable()
            }
            ExprKind::If { .. } => ResolvedType::void(),
            ExprKind::ScopeBlock { .. } => ResolvedType::void(),
            ExprKind::SemanticError => ResolvedType::null(),
        }
    }

    /// Is the expression readable in value position? Setter-less
    /// properties and indexers are the interesting cases.
    pub fn can_read(&self, id: ExprId) -> bool {
        match &self.expr(id).kind {
            ExprKind::PropertyAccess { property, .. } => property.is_readable(),
            ExprKind::IndexerAccess { indexer, .. } => indexer.is_readable(),
            _ => true,
        }
    }
}

pub fn numeric_builtin(value: LiteralData) -> BuiltInType {
    match value {
        LiteralData::Int32(_) => BuiltInType::Int32,
        LiteralData::Int64(_) => BuiltInType::Int64,
        LiteralData::UInt32(_) => BuiltInType::UInt32,
        LiteralData::UInt64(_) => BuiltInType::UInt64,
        LiteralData::Float(_) => BuiltInType::Float,
        LiteralData::Double(_) => BuiltInType::Double,
        LiteralData::Bool(_) => BuiltInType::Bool,
        LiteralData::Null | LiteralData::Default => BuiltInType::Invalid,
    }
}

/// One introspected method: its arenas plus the root scope.
#[derive(Debug)]
pub struct MethodBody {
    pub method: Arc<MethodInfo>,
    pub arena: ExprArena,
    pub root_scope: ScopeId,
    pub parameters: Vec<VepId>,
}

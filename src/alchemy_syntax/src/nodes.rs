use crate::node::{NodeIndex, RawNodeIndex, TokenRange};
use crate::parse_types::{
    AssignmentOp, BinaryOp, BuiltInType, LiteralData, Modifiers, PassBy, StorageClass, UnaryOp,
};

/// One record in the node array: a tag plus the token range it covers.
#[derive(Debug, Clone)]
pub struct AstNode {
    pub kind: NodeKind,
    pub token_start: u16,
    pub token_end: u16,
}

impl AstNode {
    pub fn token_range(&self) -> TokenRange {
        TokenRange::new(self.token_start, self.token_end)
    }
}

/// Closed set of node variants. Visitors are exhaustive matches over this
/// tag; lists are threaded through the `next` field of each element.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Slot 0 only.
    Absent,
    File(FileNode),
    UsingNamespace(UsingNamespaceNode),
    UsingAlias(UsingAliasNode),
    Namespace(NamespaceNode),
    Class(ClassNode),
    Struct(StructNode),
    Interface(InterfaceNode),
    Enum(EnumNode),
    Delegate(DelegateNode),
    ClassBody(ClassBodyNode),
    Field(FieldNode),
    Property(PropertyNode),
    PropertyAccessor(PropertyAccessorNode),
    Indexer(IndexerNode),
    Method(MethodNode),
    Constructor(ConstructorNode),
    ModifierList(ModifierListNode),
    Identifier(IdentifierNode),
    TypeParameterList(TypeParameterListNode),
    TypeArgumentList(TypeArgumentListNode),
    TypeList(TypeListNode),
    TypePath(TypePathNode),
    ArrayRank(ArrayRankNode),
    ParameterList(ParameterListNode),
    Parameter(ParameterNode),
    Block(BlockNode),
    ExpressionStatement(ExpressionStatementNode),
    VariableDeclaration(VariableDeclarationNode),
    If(IfNode),
    Return(ReturnNode),
    ExpressionList(ExpressionListNode),
    ContextList(ContextListNode),
    Literal(LiteralNode),
    Binary(BinaryNode),
    Unary(UnaryNode),
    Assignment(AssignmentNode),
    Primary(PrimaryNode),
    PrimaryInvocation(PrimaryInvocationNode),
    PrimaryTail(PrimaryTailNode),
    MemberAccess(MemberAccessNode),
    Invocation(InvocationNode),
    Paren(ParenNode),
    Bracket(BracketNode),
    ArgumentList(ArgumentListNode),
    Argument(ArgumentNode),
}

impl NodeKind {
    /// `next` link for nodes that participate in sibling lists.
    pub fn next(&self) -> RawNodeIndex {
        match self {
            NodeKind::UsingNamespace(n) => n.next,
            NodeKind::UsingAlias(n) => n.next,
            NodeKind::Namespace(n) => n.next,
            NodeKind::Class(n) => n.next,
            NodeKind::Struct(n) => n.next,
            NodeKind::Interface(n) => n.next,
            NodeKind::Enum(n) => n.next,
            NodeKind::Delegate(n) => n.next,
            NodeKind::Field(n) => n.next,
            NodeKind::Property(n) => n.next,
            NodeKind::Indexer(n) => n.next,
            NodeKind::Method(n) => n.next,
            NodeKind::Constructor(n) => n.next,
            NodeKind::Identifier(n) => n.next.raw(),
            NodeKind::TypePath(n) => n.next.raw(),
            NodeKind::Parameter(n) => n.next.raw(),
            NodeKind::Block(n) => n.next,
            NodeKind::ExpressionStatement(n) => n.next,
            NodeKind::VariableDeclaration(n) => n.next,
            NodeKind::If(n) => n.next,
            NodeKind::Return(n) => n.next,
            NodeKind::Literal(n) => n.next,
            NodeKind::Binary(n) => n.next,
            NodeKind::Unary(n) => n.next,
            NodeKind::Assignment(n) => n.next,
            NodeKind::Primary(n) => n.next,
            NodeKind::PrimaryInvocation(n) => n.next,
            NodeKind::PrimaryTail(n) => n.next.raw(),
            NodeKind::Paren(n) => n.next,
            NodeKind::Bracket(n) => n.next.raw(),
            NodeKind::Argument(n) => n.next.raw(),
            _ => RawNodeIndex::NONE,
        }
    }

    pub fn is_declaration(&self) -> bool {
        matches!(
            self,
            NodeKind::UsingNamespace(_)
                | NodeKind::UsingAlias(_)
                | NodeKind::Namespace(_)
                | NodeKind::Class(_)
                | NodeKind::Struct(_)
                | NodeKind::Interface(_)
                | NodeKind::Enum(_)
                | NodeKind::Delegate(_)
                | NodeKind::Field(_)
                | NodeKind::Property(_)
                | NodeKind::Indexer(_)
                | NodeKind::Method(_)
                | NodeKind::Constructor(_)
        )
    }
}

/// Typed access: the marker struct each `NodeIndex<T>` points at.
pub trait NodeData: Sized {
    fn from_kind(kind: &NodeKind) -> Option<&Self>;
}

macro_rules! node_data {
    ($($variant:ident => $ty:ident),* $(,)?) => {
        $(
            impl NodeData for $ty {
                fn from_kind(kind: &NodeKind) -> Option<&Self> {
                    match kind {
                        NodeKind::$variant(node) => Some(node),
                        _ => None,
                    }
                }
            }
        )*
    };
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FileNode {
    pub first_declaration: RawNodeIndex,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UsingNamespaceNode {
    pub first_ident: NodeIndex<IdentifierNode>,
    pub next: RawNodeIndex,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UsingAliasNode {
    pub alias: NodeIndex<IdentifierNode>,
    pub type_path: NodeIndex<TypePathNode>,
    pub next: RawNodeIndex,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NamespaceNode {
    pub name: NodeIndex<IdentifierNode>,
    pub first_declaration: RawNodeIndex,
    pub next: RawNodeIndex,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ClassNode {
    pub modifiers: NodeIndex<ModifierListNode>,
    pub identifier: NodeIndex<IdentifierNode>,
    pub type_parameters: NodeIndex<TypeParameterListNode>,
    pub base_list: NodeIndex<TypeListNode>,
    pub body: NodeIndex<ClassBodyNode>,
    pub next: RawNodeIndex,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StructNode {
    pub modifiers: NodeIndex<ModifierListNode>,
    pub identifier: NodeIndex<IdentifierNode>,
    pub type_parameters: NodeIndex<TypeParameterListNode>,
    pub base_list: NodeIndex<TypeListNode>,
    pub body: NodeIndex<ClassBodyNode>,
    pub next: RawNodeIndex,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InterfaceNode {
    pub modifiers: NodeIndex<ModifierListNode>,
    pub identifier: NodeIndex<IdentifierNode>,
    pub type_parameters: NodeIndex<TypeParameterListNode>,
    pub base_list: NodeIndex<TypeListNode>,
    pub body: NodeIndex<ClassBodyNode>,
    pub next: RawNodeIndex,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EnumNode {
    pub modifiers: NodeIndex<ModifierListNode>,
    pub identifier: NodeIndex<IdentifierNode>,
    pub first_member: NodeIndex<IdentifierNode>,
    pub next: RawNodeIndex,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DelegateNode {
    pub modifiers: NodeIndex<ModifierListNode>,
    pub identifier: NodeIndex<IdentifierNode>,
    pub type_parameters: NodeIndex<TypeParameterListNode>,
    pub return_type: NodeIndex<TypePathNode>,
    pub parameters: NodeIndex<ParameterListNode>,
    pub next: RawNodeIndex,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ClassBodyNode {
    pub first: RawNodeIndex,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FieldNode {
    pub modifiers: NodeIndex<ModifierListNode>,
    pub type_path: NodeIndex<TypePathNode>,
    pub identifier: NodeIndex<IdentifierNode>,
    pub initializer: RawNodeIndex,
    pub next: RawNodeIndex,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PropertyNode {
    pub modifiers: NodeIndex<ModifierListNode>,
    pub type_path: NodeIndex<TypePathNode>,
    pub identifier: NodeIndex<IdentifierNode>,
    pub getter: NodeIndex<PropertyAccessorNode>,
    pub setter: NodeIndex<PropertyAccessorNode>,
    pub next: RawNodeIndex,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PropertyAccessorNode {
    pub body: NodeIndex<BlockNode>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IndexerNode {
    pub modifiers: NodeIndex<ModifierListNode>,
    pub type_path: NodeIndex<TypePathNode>,
    pub parameters: NodeIndex<ParameterListNode>,
    pub getter: NodeIndex<PropertyAccessorNode>,
    pub setter: NodeIndex<PropertyAccessorNode>,
    pub next: RawNodeIndex,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MethodNode {
    pub modifiers: NodeIndex<ModifierListNode>,
    pub return_type: NodeIndex<TypePathNode>,
    pub identifier: NodeIndex<IdentifierNode>,
    pub type_parameters: NodeIndex<TypeParameterListNode>,
    pub parameters: NodeIndex<ParameterListNode>,
    pub body: NodeIndex<BlockNode>,
    pub next: RawNodeIndex,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConstructorNode {
    pub modifiers: NodeIndex<ModifierListNode>,
    pub identifier: NodeIndex<IdentifierNode>,
    pub parameters: NodeIndex<ParameterListNode>,
    pub body: NodeIndex<BlockNode>,
    pub next: RawNodeIndex,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ModifierListNode {
    pub modifiers: Modifiers,
}

/// Identifier reference. The name text lives in the token stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentifierNode {
    pub token: u16,
    pub type_arguments: NodeIndex<TypeArgumentListNode>,
    pub next: NodeIndex<IdentifierNode>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TypeParameterListNode {
    pub first: NodeIndex<IdentifierNode>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TypeArgumentListNode {
    pub first: NodeIndex<TypePathNode>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TypeListNode {
    pub first: NodeIndex<TypePathNode>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TypePathNode {
    pub built_in: BuiltInType,
    pub first_ident: NodeIndex<IdentifierNode>,
    pub type_arguments: NodeIndex<TypeArgumentListNode>,
    pub array_rank: NodeIndex<ArrayRankNode>,
    pub is_nullable: bool,
    pub next: NodeIndex<TypePathNode>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ArrayRankNode {
    pub is_nullable: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ParameterListNode {
    pub first: NodeIndex<ParameterNode>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ParameterNode {
    pub type_path: NodeIndex<TypePathNode>,
    pub identifier: NodeIndex<IdentifierNode>,
    pub storage: StorageClass,
    pub pass_by: PassBy,
    pub default_value: RawNodeIndex,
    pub next: NodeIndex<ParameterNode>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BlockNode {
    pub first_statement: RawNodeIndex,
    pub next: RawNodeIndex,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExpressionStatementNode {
    pub expression: RawNodeIndex,
    pub next: RawNodeIndex,
}

/// `Type name = init;` or `var name = init;` (type_path invalid for var).
#[derive(Debug, Clone, Copy, Default)]
pub struct VariableDeclarationNode {
    pub type_path: NodeIndex<TypePathNode>,
    pub identifier: NodeIndex<IdentifierNode>,
    pub initializer: RawNodeIndex,
    pub next: RawNodeIndex,
}

/// `if (cond, cond) using (a, b) stmt else stmt`
#[derive(Debug, Clone, Copy, Default)]
pub struct IfNode {
    pub conditions: NodeIndex<ExpressionListNode>,
    pub context: NodeIndex<ContextListNode>,
    pub body: RawNodeIndex,
    pub else_branch: RawNodeIndex,
    pub next: RawNodeIndex,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReturnNode {
    pub expression: RawNodeIndex,
    pub next: RawNodeIndex,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExpressionListNode {
    pub first: RawNodeIndex,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ContextListNode {
    pub first: NodeIndex<IdentifierNode>,
}

#[derive(Debug, Clone, Copy)]
pub struct LiteralNode {
    pub value: LiteralData,
    pub default_type: NodeIndex<TypePathNode>,
    pub next: RawNodeIndex,
}

impl Default for LiteralNode {
    fn default() -> Self {
        LiteralNode {
            value: LiteralData::Null,
            default_type: NodeIndex::NONE,
            next: RawNodeIndex::NONE,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BinaryNode {
    pub op: BinaryOp,
    pub lhs: RawNodeIndex,
    pub rhs: RawNodeIndex,
    pub next: RawNodeIndex,
}

#[derive(Debug, Clone, Copy)]
pub struct UnaryNode {
    pub op: UnaryOp,
    pub operand: RawNodeIndex,
    pub next: RawNodeIndex,
}

#[derive(Debug, Clone, Copy)]
pub struct AssignmentNode {
    pub op: AssignmentOp,
    pub lhs: RawNodeIndex,
    pub rhs: RawNodeIndex,
    pub next: RawNodeIndex,
}

/// Head of a postfix chain: identifier, unqualified invocation, literal or
/// parenthesized expression, followed by optional brackets and tail parts.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrimaryNode {
    pub start: RawNodeIndex,
    pub bracket: NodeIndex<BracketNode>,
    pub tail: NodeIndex<PrimaryTailNode>,
    pub next: RawNodeIndex,
}

/// Unqualified call at the head of a primary expression: `Name(args)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrimaryInvocationNode {
    pub identifier: NodeIndex<IdentifierNode>,
    pub arguments: NodeIndex<ArgumentListNode>,
    pub next: RawNodeIndex,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PrimaryTailNode {
    pub part: RawNodeIndex,
    pub bracket: NodeIndex<BracketNode>,
    pub next: NodeIndex<PrimaryTailNode>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MemberAccessNode {
    pub identifier: NodeIndex<IdentifierNode>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InvocationNode {
    pub arguments: NodeIndex<ArgumentListNode>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ParenNode {
    pub expression: RawNodeIndex,
    pub next: RawNodeIndex,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BracketNode {
    pub expression: RawNodeIndex,
    pub next: NodeIndex<BracketNode>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ArgumentListNode {
    pub first: NodeIndex<ArgumentNode>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ArgumentNode {
    pub pass_by: PassBy,
    pub expression: RawNodeIndex,
    /// For `out Type name`: the declared type.
    pub type_path: NodeIndex<TypePathNode>,
    /// For `out var name` / `out Type name`: the introduced name.
    pub identifier: NodeIndex<IdentifierNode>,
    pub is_var: bool,
    pub next: NodeIndex<ArgumentNode>,
}

node_data! {
    File => FileNode,
    UsingNamespace => UsingNamespaceNode,
    UsingAlias => UsingAliasNode,
    Namespace => NamespaceNode,
    Class => ClassNode,
    Struct => StructNode,
    Interface => InterfaceNode,
    Enum => EnumNode,
    Delegate => DelegateNode,
    ClassBody => ClassBodyNode,
    Field => FieldNode,
    Property => PropertyNode,
    PropertyAccessor => PropertyAccessorNode,
    Indexer => IndexerNode,
    Method => MethodNode,
    Constructor => ConstructorNode,
    ModifierList => ModifierListNode,
    Identifier => IdentifierNode,
    TypeParameterList => TypeParameterListNode,
    TypeArgumentList => TypeArgumentListNode,
    TypeList => TypeListNode,
    TypePath => TypePathNode,
    ArrayRank => ArrayRankNode,
    ParameterList => ParameterListNode,
    Parameter => ParameterNode,
    Block => BlockNode,
    ExpressionStatement => ExpressionStatementNode,
    VariableDeclaration => VariableDeclarationNode,
    If => IfNode,
    Return => ReturnNode,
    ExpressionList => ExpressionListNode,
    ContextList => ContextListNode,
    Literal => LiteralNode,
    Binary => BinaryNode,
    Unary => UnaryNode,
    Assignment => AssignmentNode,
    Primary => PrimaryNode,
    PrimaryInvocation => PrimaryInvocationNode,
    PrimaryTail => PrimaryTailNode,
    MemberAccess => MemberAccessNode,
    Invocation => InvocationNode,
    Paren => ParenNode,
    Bracket => BracketNode,
    ArgumentList => ArgumentListNode,
    Argument => ArgumentNode,
}

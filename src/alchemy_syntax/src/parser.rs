use serde::Serialize;

use crate::lexer::{self, TokenKind};
use crate::node::{NodeIndex, RawNodeIndex, TokenRange};
use crate::nodes::*;
use crate::parse_types::{
    AssignmentOp, BinaryOp, BuiltInType, LiteralData, Modifiers, PassBy, StorageClass, UnaryOp,
};
use crate::tree::SyntaxTree;

#[derive(Debug, Clone, Serialize)]
pub struct ParseError {
    pub offset: u32,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct ParseResult {
    pub tree: SyntaxTree,
    pub errors: Vec<ParseError>,
}

/// Contract between the pipeline and whatever produces syntax trees. The
/// analysis crates only ever read the resulting node array.
pub trait SourceParser: Send + Sync {
    fn parse(&self, source: &str) -> ParseResult;
}

/// The in-repo recursive-descent parser for `.ax` sources.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlchemyParser;

impl SourceParser for AlchemyParser {
    fn parse(&self, source: &str) -> ParseResult {
        let (tokens, lex_errors) = lexer::tokenize(source);
        let mut parser = Parser {
            tree: SyntaxTree::new(source.to_string(), tokens),
            pos: 0,
            errors: lex_errors
                .into_iter()
                .map(|e| ParseError {
                    offset: e.offset,
                    message: e.message,
                })
                .collect(),
        };
        parser.parse_file();
        ParseResult {
            tree: parser.tree,
            errors: parser.errors,
        }
    }
}

struct Parser {
    tree: SyntaxTree,
    pos: usize,
    errors: Vec<ParseError>,
}

impl Parser {
    // ---- token plumbing ----

    fn current(&self) -> TokenKind {
        self.tree.tokens[self.pos.min(self.tree.tokens.len() - 1)].kind
    }

    fn peek(&self, ahead: usize) -> TokenKind {
        let idx = (self.pos + ahead).min(self.tree.tokens.len() - 1);
        self.tree.tokens[idx].kind
    }

    fn current_offset(&self) -> u32 {
        self.tree.tokens[self.pos.min(self.tree.tokens.len() - 1)].start
    }

    fn token_index(&self) -> u16 {
        self.pos as u16
    }

    fn bump(&mut self) -> u16 {
        let index = self.pos as u16;
        if self.pos < self.tree.tokens.len() - 1 {
            self.pos += 1;
        }
        index
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.current() == kind
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> bool {
        if self.eat(kind) {
            return true;
        }
        self.error(format!("expected {what}"));
        false
    }

    fn error(&mut self, message: String) {
        #[cfg(feature = "parser_recovery_trace")]
        log::debug!("parse error at {}: {}", self.current_offset(), message);
        self.errors.push(ParseError {
            offset: self.current_offset(),
            message,
        });
    }

    fn range_from(&self, start: u16) -> TokenRange {
        TokenRange::new(start, self.pos as u16)
    }

    /// Skip to a likely statement/declaration boundary after an error.
    fn recover(&mut self) {
        loop {
            match self.current() {
                TokenKind::Eof | TokenKind::RBrace => return,
                TokenKind::Semicolon => {
                    self.bump();
                    return;
                }
                _ => {
                    self.bump();
                }
            }
        }
    }

    // ---- list threading ----

    fn set_next(&mut self, node: RawNodeIndex, next: RawNodeIndex) {
        let Some(kind) = self.tree.get_mut_kind(node) else {
            return;
        };
        match kind {
            NodeKind::UsingNamespace(n) => n.next = next,
            NodeKind::UsingAlias(n) => n.next = next,
            NodeKind::Namespace(n) => n.next = next,
            NodeKind::Class(n) => n.next = next,
            NodeKind::Struct(n) => n.next = next,
            NodeKind::Interface(n) => n.next = next,
            NodeKind::Enum(n) => n.next = next,
            NodeKind::Delegate(n) => n.next = next,
            NodeKind::Field(n) => n.next = next,
            NodeKind::Property(n) => n.next = next,
            NodeKind::Indexer(n) => n.next = next,
            NodeKind::Method(n) => n.next = next,
            NodeKind::Constructor(n) => n.next = next,
            NodeKind::Identifier(n) => n.next = NodeIndex::new(next.0),
            NodeKind::TypePath(n) => n.next = NodeIndex::new(next.0),
            NodeKind::Parameter(n) => n.next = NodeIndex::new(next.0),
            NodeKind::Block(n) => n.next = next,
            NodeKind::ExpressionStatement(n) => n.next = next,
            NodeKind::VariableDeclaration(n) => n.next = next,
            NodeKind::If(n) => n.next = next,
            NodeKind::Return(n) => n.next = next,
            NodeKind::Literal(n) => n.next = next,
            NodeKind::Binary(n) => n.next = next,
            NodeKind::Unary(n) => n.next = next,
            NodeKind::Assignment(n) => n.next = next,
            NodeKind::Primary(n) => n.next = next,
            NodeKind::PrimaryInvocation(n) => n.next = next,
            NodeKind::PrimaryTail(n) => n.next = NodeIndex::new(next.0),
            NodeKind::Paren(n) => n.next = next,
            NodeKind::Bracket(n) => n.next = NodeIndex::new(next.0),
            NodeKind::Argument(n) => n.next = NodeIndex::new(next.0),
            _ => {}
        }
    }

    // ---- file level ----

    fn parse_file(&mut self) {
        let start = self.token_index();
        let mut first = RawNodeIndex::NONE;
        let mut last = RawNodeIndex::NONE;

        while !self.at(TokenKind::Eof) {
            let before = self.pos;
            let decl = self.parse_top_declaration();
            if let Some(decl) = decl {
                if last.is_valid() {
                    self.set_next(last, decl);
                } else {
                    first = decl;
                }
                last = decl;
            }
            if self.pos == before {
                // no progress; drop the offending token
                self.error("unexpected token".to_string());
                self.bump();
            }
        }

        let root = self.tree.push(
            NodeKind::File(FileNode {
                first_declaration: first,
            }),
            self.range_from(start),
        );
        self.tree.root = NodeIndex::new(root.0);
    }

    fn parse_top_declaration(&mut self) -> Option<RawNodeIndex> {
        match self.current() {
            TokenKind::KwUsing => self.parse_using(),
            TokenKind::KwNamespace => self.parse_namespace(),
            _ => self.parse_type_declaration(),
        }
    }

    fn parse_using(&mut self) -> Option<RawNodeIndex> {
        let start = self.token_index();
        self.bump(); // using

        // `using Name = Type;` is an alias, `using A::B;` a namespace import
        if self.at(TokenKind::Identifier) && self.peek(1) == TokenKind::Assign {
            let alias = self.parse_identifier()?;
            self.bump(); // =
            let type_path = self.parse_type_path()?;
            self.expect(TokenKind::Semicolon, "`;` after using alias");
            let node = self.tree.push(
                NodeKind::UsingAlias(UsingAliasNode {
                    alias,
                    type_path,
                    next: RawNodeIndex::NONE,
                }),
                self.range_from(start),
            );
            return Some(node);
        }

        let first_ident = self.parse_identifier_path()?;
        self.expect(TokenKind::Semicolon, "`;` after using directive");
        let node = self.tree.push(
            NodeKind::UsingNamespace(UsingNamespaceNode {
                first_ident,
                next: RawNodeIndex::NONE,
            }),
            self.range_from(start),
        );
        Some(node)
    }

    fn parse_namespace(&mut self) -> Option<RawNodeIndex> {
        let start = self.token_index();
        self.bump(); // namespace
        let name = self.parse_identifier()?;
        self.expect(TokenKind::LBrace, "`{` after namespace name");

        let mut first = RawNodeIndex::NONE;
        let mut last = RawNodeIndex::NONE;
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            let before = self.pos;
            if let Some(decl) = self.parse_top_declaration() {
                if last.is_valid() {
                    self.set_next(last, decl);
                } else {
                    first = decl;
                }
                last = decl;
            }
            if self.pos == before {
                self.error("unexpected token in namespace".to_string());
                self.bump();
            }
        }
        self.expect(TokenKind::RBrace, "`}` closing namespace");

        let node = self.tree.push(
            NodeKind::Namespace(NamespaceNode {
                name,
                first_declaration: first,
                next: RawNodeIndex::NONE,
            }),
            self.range_from(start),
        );
        Some(node)
    }

    fn parse_modifier_list(&mut self) -> NodeIndex<ModifierListNode> {
        let start = self.token_index();
        let mut modifiers = Modifiers::empty();
        loop {
            let flag = match self.current() {
                TokenKind::KwPublic => Modifiers::PUBLIC,
                TokenKind::KwPrivate => Modifiers::PRIVATE,
                TokenKind::KwProtected => Modifiers::PROTECTED,
                TokenKind::KwInternal => Modifiers::INTERNAL,
                TokenKind::KwStatic => Modifiers::STATIC,
                TokenKind::KwExport => Modifiers::EXPORT,
                TokenKind::KwSealed => Modifiers::SEALED,
                TokenKind::KwAbstract => Modifiers::ABSTRACT,
                TokenKind::KwReadonly => Modifiers::READONLY,
                TokenKind::KwVirtual => Modifiers::VIRTUAL,
                TokenKind::KwOverride => Modifiers::OVERRIDE,
                TokenKind::KwConst => Modifiers::CONST,
                TokenKind::KwRef => Modifiers::REF,
                _ => break,
            };
            modifiers |= flag;
            self.bump();
        }
        if modifiers.is_empty() {
            return NodeIndex::NONE;
        }
        let node = self.tree.push(
            NodeKind::ModifierList(ModifierListNode { modifiers }),
            self.range_from(start),
        );
        NodeIndex::new(node.0)
    }

    fn parse_type_declaration(&mut self) -> Option<RawNodeIndex> {
        let start = self.token_index();
        let modifiers = self.parse_modifier_list();

        match self.current() {
            TokenKind::KwClass | TokenKind::KwStruct | TokenKind::KwInterface => {
                let keyword = self.current();
                self.bump();
                let identifier = self.parse_identifier()?;
                let type_parameters = self.parse_type_parameter_list();
                let base_list = if self.eat(TokenKind::Colon) {
                    self.parse_type_list()
                } else {
                    NodeIndex::NONE
                };
                let body = self.parse_class_body();
                let range = self.range_from(start);
                let node = match keyword {
                    TokenKind::KwClass => NodeKind::Class(ClassNode {
                        modifiers,
                        identifier,
                        type_parameters,
                        base_list,
                        body,
                        next: RawNodeIndex::NONE,
                    }),
                    TokenKind::KwStruct => NodeKind::Struct(StructNode {
                        modifiers,
                        identifier,
                        type_parameters,
                        base_list,
                        body,
                        next: RawNodeIndex::NONE,
                    }),
                    _ => NodeKind::Interface(InterfaceNode {
                        modifiers,
                        identifier,
                        type_parameters,
                        base_list,
                        body,
                        next: RawNodeIndex::NONE,
                    }),
                };
                Some(self.tree.push(node, range))
            }
            TokenKind::KwEnum => {
                self.bump();
                let identifier = self.parse_identifier()?;
                self.expect(TokenKind::LBrace, "`{` after enum name");
                let mut first = NodeIndex::NONE;
                let mut last = RawNodeIndex::NONE;
                while self.at(TokenKind::Identifier) {
                    if let Some(member) = self.parse_identifier() {
                        if last.is_valid() {
                            self.set_next(last, member.raw());
                        } else {
                            first = member;
                        }
                        last = member.raw();
                    }
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RBrace, "`}` closing enum");
                let node = self.tree.push(
                    NodeKind::Enum(EnumNode {
                        modifiers,
                        identifier,
                        first_member: first,
                        next: RawNodeIndex::NONE,
                    }),
                    self.range_from(start),
                );
                Some(node)
            }
            TokenKind::KwDelegate => {
                self.bump();
                let return_type = self.parse_type_path()?;
                let identifier = self.parse_identifier()?;
                let type_parameters = self.parse_type_parameter_list();
                let parameters = self.parse_parameter_list();
                self.expect(TokenKind::Semicolon, "`;` after delegate declaration");
                let node = self.tree.push(
                    NodeKind::Delegate(DelegateNode {
                        modifiers,
                        identifier,
                        type_parameters,
                        return_type,
                        parameters,
                        next: RawNodeIndex::NONE,
                    }),
                    self.range_from(start),
                );
                Some(node)
            }
            _ => {
                if modifiers.is_valid() {
                    self.error("expected a type declaration after modifiers".to_string());
                    self.recover();
                }
                None
            }
        }
    }

    fn parse_class_body(&mut self) -> NodeIndex<ClassBodyNode> {
        let start = self.token_index();
        if !self.expect(TokenKind::LBrace, "`{` opening type body") {
            return NodeIndex::NONE;
        }

        let mut first = RawNodeIndex::NONE;
        let mut last = RawNodeIndex::NONE;
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            let before = self.pos;
            if let Some(member) = self.parse_member() {
                if last.is_valid() {
                    self.set_next(last, member);
                } else {
                    first = member;
                }
                last = member;
            }
            if self.pos == before {
                self.error("unexpected token in type body".to_string());
                self.bump();
            }
        }
        self.expect(TokenKind::RBrace, "`}` closing type body");

        let node = self.tree.push(
            NodeKind::ClassBody(ClassBodyNode { first }),
            self.range_from(start),
        );
        NodeIndex::new(node.0)
    }

    fn parse_member(&mut self) -> Option<RawNodeIndex> {
        let start = self.token_index();

        // nested types
        if matches!(
            self.current(),
            TokenKind::KwClass
                | TokenKind::KwStruct
                | TokenKind::KwInterface
                | TokenKind::KwEnum
                | TokenKind::KwDelegate
        ) {
            return self.parse_type_declaration();
        }
        if matches!(
            self.peek_after_modifiers(),
            TokenKind::KwClass
                | TokenKind::KwStruct
                | TokenKind::KwInterface
                | TokenKind::KwEnum
                | TokenKind::KwDelegate
        ) {
            return self.parse_type_declaration();
        }

        let modifiers = self.parse_modifier_list();

        // constructor: bare identifier followed by `(`
        if self.at(TokenKind::Identifier) && self.peek(1) == TokenKind::LParen {
            let identifier = self.parse_identifier()?;
            let parameters = self.parse_parameter_list();
            let body = self.parse_block_or_semicolon();
            let node = self.tree.push(
                NodeKind::Constructor(ConstructorNode {
                    modifiers,
                    identifier,
                    parameters,
                    body,
                    next: RawNodeIndex::NONE,
                }),
                self.range_from(start),
            );
            return Some(node);
        }

        let type_path = self.parse_type_path()?;

        // indexer: `Type this[...] { get; set; }`
        if self.eat(TokenKind::KwThis) {
            self.expect(TokenKind::LBracket, "`[` after `this`");
            let mut first = NodeIndex::NONE;
            let mut last = RawNodeIndex::NONE;
            while !self.at(TokenKind::RBracket) && !self.at(TokenKind::Eof) {
                let Some(param) = self.parse_parameter() else {
                    break;
                };
                if last.is_valid() {
                    self.set_next(last, param.raw());
                } else {
                    first = param;
                }
                last = param.raw();
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RBracket, "`]` closing indexer parameters");
            let list_node = self.tree.push(
                NodeKind::ParameterList(ParameterListNode { first }),
                self.range_from(start),
            );
            let (getter, setter) = self.parse_accessors();
            let node = self.tree.push(
                NodeKind::Indexer(IndexerNode {
                    modifiers,
                    type_path,
                    parameters: NodeIndex::new(list_node.0),
                    getter,
                    setter,
                    next: RawNodeIndex::NONE,
                }),
                self.range_from(start),
            );
            return Some(node);
        }

        let identifier = match self.parse_identifier() {
            Some(id) => id,
            None => {
                self.recover();
                return None;
            }
        };

        // method: generic parameter list or `(`
        if self.at(TokenKind::Lt) || self.at(TokenKind::LParen) {
            let type_parameters = self.parse_type_parameter_list();
            let parameters = self.parse_parameter_list();
            let body = self.parse_block_or_semicolon();
            let node = self.tree.push(
                NodeKind::Method(MethodNode {
                    modifiers,
                    return_type: type_path,
                    identifier,
                    type_parameters,
                    parameters,
                    body,
                    next: RawNodeIndex::NONE,
                }),
                self.range_from(start),
            );
            return Some(node);
        }

        // property: `{ get; set; }`
        if self.at(TokenKind::LBrace) {
            let (getter, setter) = self.parse_accessors();
            let node = self.tree.push(
                NodeKind::Property(PropertyNode {
                    modifiers,
                    type_path,
                    identifier,
                    getter,
                    setter,
                    next: RawNodeIndex::NONE,
                }),
                self.range_from(start),
            );
            return Some(node);
        }

        // field
        let initializer = if self.eat(TokenKind::Assign) {
            self.parse_expression().unwrap_or(RawNodeIndex::NONE)
        } else {
            RawNodeIndex::NONE
        };
        self.expect(TokenKind::Semicolon, "`;` after field declaration");
        let node = self.tree.push(
            NodeKind::Field(FieldNode {
                modifiers,
                type_path,
                identifier,
                initializer,
                next: RawNodeIndex::NONE,
            }),
            self.range_from(start),
        );
        Some(node)
    }

    fn peek_after_modifiers(&self) -> TokenKind {
        let mut ahead = 0;
        loop {
            match self.peek(ahead) {
                TokenKind::KwPublic
                | TokenKind::KwPrivate
                | TokenKind::KwProtected
                | TokenKind::KwInternal
                | TokenKind::KwStatic
                | TokenKind::KwExport
                | TokenKind::KwSealed
                | TokenKind::KwAbstract
                | TokenKind::KwReadonly
                | TokenKind::KwVirtual
                | TokenKind::KwOverride
                | TokenKind::KwConst
                | TokenKind::KwRef => ahead += 1,
                other => return other,
            }
        }
    }

    fn parse_accessors(
        &mut self,
    ) -> (
        NodeIndex<PropertyAccessorNode>,
        NodeIndex<PropertyAccessorNode>,
    ) {
        let mut getter = NodeIndex::NONE;
        let mut setter = NodeIndex::NONE;
        if !self.expect(TokenKind::LBrace, "`{` opening accessor list") {
            return (getter, setter);
        }
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            let start = self.token_index();
            let text = self.tree.token_text(self.token_index()).to_string();
            if self.at(TokenKind::Identifier) && (text == "get" || text == "set") {
                self.bump();
                let body = if self.at(TokenKind::LBrace) {
                    self.parse_block()
                } else {
                    self.expect(TokenKind::Semicolon, "`;` after accessor");
                    NodeIndex::NONE
                };
                let node = self.tree.push(
                    NodeKind::PropertyAccessor(PropertyAccessorNode { body }),
                    self.range_from(start),
                );
                if text == "get" {
                    getter = NodeIndex::new(node.0);
                } else {
                    setter = NodeIndex::new(node.0);
                }
            } else {
                self.error("expected `get` or `set`".to_string());
                self.bump();
            }
        }
        self.expect(TokenKind::RBrace, "`}` closing accessor list");
        (getter, setter)
    }

    fn parse_block_or_semicolon(&mut self) -> NodeIndex<BlockNode> {
        if self.at(TokenKind::LBrace) {
            self.parse_block()
        } else {
            self.expect(TokenKind::Semicolon, "method body or `;`");
            NodeIndex::NONE
        }
    }

    // ---- identifiers & types ----

    fn parse_identifier(&mut self) -> Option<NodeIndex<IdentifierNode>> {
        if !self.at(TokenKind::Identifier) {
            self.error("expected an identifier".to_string());
            return None;
        }
        let start = self.token_index();
        let token = self.bump();
        let node = self.tree.push(
            NodeKind::Identifier(IdentifierNode {
                token,
                type_arguments: NodeIndex::NONE,
                next: NodeIndex::NONE,
            }),
            self.range_from(start),
        );
        Some(NodeIndex::new(node.0))
    }

    /// `A::B::C` as a linked identifier chain.
    fn parse_identifier_path(&mut self) -> Option<NodeIndex<IdentifierNode>> {
        let first = self.parse_identifier()?;
        let mut last = first;
        while self.eat(TokenKind::ColonColon) {
            let next = self.parse_identifier()?;
            self.set_next(last.raw(), next.raw());
            last = next;
        }
        Some(first)
    }

    fn parse_type_parameter_list(&mut self) -> NodeIndex<TypeParameterListNode> {
        if !self.at(TokenKind::Lt) {
            return NodeIndex::NONE;
        }
        let start = self.token_index();
        self.bump(); // <
        let mut first = NodeIndex::NONE;
        let mut last = RawNodeIndex::NONE;
        loop {
            let Some(param) = self.parse_identifier() else {
                break;
            };
            if last.is_valid() {
                self.set_next(last, param.raw());
            } else {
                first = param;
            }
            last = param.raw();
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::Gt, "`>` closing type parameter list");
        let node = self.tree.push(
            NodeKind::TypeParameterList(TypeParameterListNode { first }),
            self.range_from(start),
        );
        NodeIndex::new(node.0)
    }

    fn parse_type_list(&mut self) -> NodeIndex<TypeListNode> {
        let start = self.token_index();
        let mut first = NodeIndex::NONE;
        let mut last = RawNodeIndex::NONE;
        loop {
            let Some(path) = self.parse_type_path() else {
                break;
            };
            if last.is_valid() {
                self.set_next(last, path.raw());
            } else {
                first = path;
            }
            last = path.raw();
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        let node = self.tree.push(
            NodeKind::TypeList(TypeListNode { first }),
            self.range_from(start),
        );
        NodeIndex::new(node.0)
    }

    fn parse_type_path(&mut self) -> Option<NodeIndex<TypePathNode>> {
        let start = self.token_index();

        let (built_in, first_ident) = match self.current() {
            TokenKind::BuiltIn(b) => {
                self.bump();
                (b, NodeIndex::NONE)
            }
            TokenKind::Identifier => (BuiltInType::Invalid, self.parse_identifier_path()?),
            _ => {
                self.error("expected a type".to_string());
                return None;
            }
        };

        let type_arguments = if built_in == BuiltInType::Invalid && self.at(TokenKind::Lt) {
            self.parse_type_argument_list()
        } else {
            NodeIndex::NONE
        };

        let is_nullable = self.eat(TokenKind::Question);

        let array_rank = if self.at(TokenKind::LBracket) && self.peek(1) == TokenKind::RBracket {
            let rank_start = self.token_index();
            self.bump();
            self.bump();
            let rank_nullable = self.eat(TokenKind::Question);
            let node = self.tree.push(
                NodeKind::ArrayRank(ArrayRankNode {
                    is_nullable: rank_nullable,
                }),
                self.range_from(rank_start),
            );
            NodeIndex::new(node.0)
        } else {
            NodeIndex::NONE
        };

        let node = self.tree.push(
            NodeKind::TypePath(TypePathNode {
                built_in,
                first_ident,
                type_arguments,
                array_rank,
                is_nullable,
                next: NodeIndex::NONE,
            }),
            self.range_from(start),
        );
        Some(NodeIndex::new(node.0))
    }

    fn parse_type_argument_list(&mut self) -> NodeIndex<TypeArgumentListNode> {
        let start = self.token_index();
        self.bump(); // <
        let mut first = NodeIndex::NONE;
        let mut last = RawNodeIndex::NONE;
        loop {
            let Some(path) = self.parse_type_path() else {
                break;
            };
            if last.is_valid() {
                self.set_next(last, path.raw());
            } else {
                first = path;
            }
            last = path.raw();
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::Gt, "`>` closing type argument list");
        let node = self.tree.push(
            NodeKind::TypeArgumentList(TypeArgumentListNode { first }),
            self.range_from(start),
        );
        NodeIndex::new(node.0)
    }

    fn parse_parameter_list(&mut self) -> NodeIndex<ParameterListNode> {
        let start = self.token_index();
        if !self.expect(TokenKind::LParen, "`(` opening parameter list") {
            return NodeIndex::NONE;
        }
        let mut first = NodeIndex::NONE;
        let mut last = RawNodeIndex::NONE;
        while !self.at(TokenKind::RParen) && !self.at(TokenKind::Eof) {
            let Some(param) = self.parse_parameter() else {
                self.recover();
                break;
            };
            if last.is_valid() {
                self.set_next(last, param.raw());
            } else {
                first = param;
            }
            last = param.raw();
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen, "`)` closing parameter list");
        let node = self.tree.push(
            NodeKind::ParameterList(ParameterListNode { first }),
            self.range_from(start),
        );
        NodeIndex::new(node.0)
    }

    fn parse_parameter(&mut self) -> Option<NodeIndex<ParameterNode>> {
        let start = self.token_index();

        let pass_by = if self.eat(TokenKind::KwRef) {
            PassBy::Ref
        } else if self.eat(TokenKind::KwOut) {
            PassBy::Out
        } else {
            PassBy::None
        };

        let storage = if self.eat(TokenKind::KwTemp) {
            StorageClass::Temp
        } else if self.eat(TokenKind::KwScoped) {
            StorageClass::Scoped
        } else {
            StorageClass::Default
        };

        let type_path = self.parse_type_path()?;
        let identifier = self.parse_identifier()?;

        let default_value = if self.eat(TokenKind::Assign) {
            self.parse_expression().unwrap_or(RawNodeIndex::NONE)
        } else {
            RawNodeIndex::NONE
        };

        let node = self.tree.push(
            NodeKind::Parameter(ParameterNode {
                type_path,
                identifier,
                storage,
                pass_by,
                default_value,
                next: NodeIndex::NONE,
            }),
            self.range_from(start),
        );
        Some(NodeIndex::new(node.0))
    }

    // ---- statements ----

    fn parse_block(&mut self) -> NodeIndex<BlockNode> {
        let start = self.token_index();
        if !self.expect(TokenKind::LBrace, "`{` opening block") {
            return NodeIndex::NONE;
        }
        let mut first = RawNodeIndex::NONE;
        let mut last = RawNodeIndex::NONE;
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            let before = self.pos;
            if let Some(stmt) = self.parse_statement() {
                if last.is_valid() {
                    self.set_next(last, stmt);
                } else {
                    first = stmt;
                }
                last = stmt;
            }
            if self.pos == before {
                self.error("unexpected token in block".to_string());
                self.bump();
            }
        }
        self.expect(TokenKind::RBrace, "`}` closing block");
        let node = self.tree.push(
            NodeKind::Block(BlockNode {
                first_statement: first,
                next: RawNodeIndex::NONE,
            }),
            self.range_from(start),
        );
        NodeIndex::new(node.0)
    }

    fn parse_statement(&mut self) -> Option<RawNodeIndex> {
        match self.current() {
            TokenKind::LBrace => {
                let block = self.parse_block();
                block.is_valid().then(|| block.raw())
            }
            TokenKind::KwIf => self.parse_if_statement(),
            TokenKind::KwReturn => self.parse_return_statement(),
            TokenKind::KwVar => self.parse_var_declaration(),
            TokenKind::BuiltIn(_) => self.parse_typed_declaration(),
            TokenKind::Identifier if self.looks_like_declaration() => {
                self.parse_typed_declaration()
            }
            _ => self.parse_expression_statement(),
        }
    }

    /// Lookahead: does the statement start with `Type name`? Used to pick
    /// between a local declaration and an expression statement.
    fn looks_like_declaration(&self) -> bool {
        let mut ahead = 0;

        // identifier path
        if self.peek(ahead) != TokenKind::Identifier {
            return false;
        }
        ahead += 1;
        while self.peek(ahead) == TokenKind::ColonColon {
            if self.peek(ahead + 1) != TokenKind::Identifier {
                return false;
            }
            ahead += 2;
        }

        // optional generic arguments: scan to the matching `>`
        if self.peek(ahead) == TokenKind::Lt {
            let mut depth = 1;
            ahead += 1;
            loop {
                match self.peek(ahead) {
                    TokenKind::Lt => depth += 1,
                    TokenKind::Gt => {
                        depth -= 1;
                        if depth == 0 {
                            ahead += 1;
                            break;
                        }
                    }
                    TokenKind::Identifier
                    | TokenKind::BuiltIn(_)
                    | TokenKind::Comma
                    | TokenKind::ColonColon
                    | TokenKind::Question
                    | TokenKind::LBracket
                    | TokenKind::RBracket => {}
                    _ => return false,
                }
                ahead += 1;
            }
        }

        if self.peek(ahead) == TokenKind::Question {
            ahead += 1;
        }
        if self.peek(ahead) == TokenKind::LBracket && self.peek(ahead + 1) == TokenKind::RBracket {
            ahead += 2;
            if self.peek(ahead) == TokenKind::Question {
                ahead += 1;
            }
        }

        self.peek(ahead) == TokenKind::Identifier
    }

    fn parse_var_declaration(&mut self) -> Option<RawNodeIndex> {
        let start = self.token_index();
        self.bump(); // var
        let identifier = self.parse_identifier()?;
        self.expect(TokenKind::Assign, "`=` after `var` declaration");
        let initializer = self.parse_expression().unwrap_or(RawNodeIndex::NONE);
        self.expect(TokenKind::Semicolon, "`;` after declaration");
        let node = self.tree.push(
            NodeKind::VariableDeclaration(VariableDeclarationNode {
                type_path: NodeIndex::NONE,
                identifier,
                initializer,
                next: RawNodeIndex::NONE,
            }),
            self.range_from(start),
        );
        Some(node)
    }

    fn parse_typed_declaration(&mut self) -> Option<RawNodeIndex> {
        let start = self.token_index();
        let type_path = self.parse_type_path()?;
        let identifier = self.parse_identifier()?;
        let initializer = if self.eat(TokenKind::Assign) {
            self.parse_expression().unwrap_or(RawNodeIndex::NONE)
        } else {
            RawNodeIndex::NONE
        };
        self.expect(TokenKind::Semicolon, "`;` after declaration");
        let node = self.tree.push(
            NodeKind::VariableDeclaration(VariableDeclarationNode {
                type_path,
                identifier,
                initializer,
                next: RawNodeIndex::NONE,
            }),
            self.range_from(start),
        );
        Some(node)
    }

    fn parse_if_statement(&mut self) -> Option<RawNodeIndex> {
        let start = self.token_index();
        self.bump(); // if
        self.expect(TokenKind::LParen, "`(` after `if`");

        let list_start = self.token_index();
        let mut first = RawNodeIndex::NONE;
        let mut last = RawNodeIndex::NONE;
        loop {
            let Some(cond) = self.parse_expression() else {
                break;
            };
            if last.is_valid() {
                self.set_next(last, cond);
            } else {
                first = cond;
            }
            last = cond;
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen, "`)` closing if conditions");
        let conditions = self.tree.push(
            NodeKind::ExpressionList(ExpressionListNode { first }),
            self.range_from(list_start),
        );

        // optional `using (a, b)` context list
        let context = if self.at(TokenKind::KwUsing) {
            let ctx_start = self.token_index();
            self.bump();
            self.expect(TokenKind::LParen, "`(` after `using`");
            let mut first_ctx = NodeIndex::NONE;
            let mut last_ctx = RawNodeIndex::NONE;
            loop {
                let Some(name) = self.parse_identifier() else {
                    break;
                };
                if last_ctx.is_valid() {
                    self.set_next(last_ctx, name.raw());
                } else {
                    first_ctx = name;
                }
                last_ctx = name.raw();
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen, "`)` closing context list");
            let node = self.tree.push(
                NodeKind::ContextList(ContextListNode { first: first_ctx }),
                self.range_from(ctx_start),
            );
            NodeIndex::new(node.0)
        } else {
            NodeIndex::NONE
        };

        let body = self.parse_statement().unwrap_or(RawNodeIndex::NONE);
        let else_branch = if self.eat(TokenKind::KwElse) {
            self.parse_statement().unwrap_or(RawNodeIndex::NONE)
        } else {
            RawNodeIndex::NONE
        };

        let node = self.tree.push(
            NodeKind::If(IfNode {
                conditions: NodeIndex::new(conditions.0),
                context,
                body,
                else_branch,
                next: RawNodeIndex::NONE,
            }),
            self.range_from(start),
        );
        Some(node)
    }

    fn parse_return_statement(&mut self) -> Option<RawNodeIndex> {
        let start = self.token_index();
        self.bump(); // return
        let expression = if self.at(TokenKind::Semicolon) {
            RawNodeIndex::NONE
        } else {
            self.parse_expression().unwrap_or(RawNodeIndex::NONE)
        };
        self.expect(TokenKind::Semicolon, "`;` after return");
        let node = self.tree.push(
            NodeKind::Return(ReturnNode {
                expression,
                next: RawNodeIndex::NONE,
            }),
            self.range_from(start),
        );
        Some(node)
    }

    fn parse_expression_statement(&mut self) -> Option<RawNodeIndex> {
        let start = self.token_index();
        let expression = match self.parse_expression() {
            Some(e) => e,
            None => {
                self.recover();
                return None;
            }
        };
        self.expect(TokenKind::Semicolon, "`;` after expression");
        let node = self.tree.push(
            NodeKind::ExpressionStatement(ExpressionStatementNode {
                expression,
                next: RawNodeIndex::NONE,
            }),
            self.range_from(start),
        );
        Some(node)
    }

    // ---- expressions ----

    fn parse_expression(&mut self) -> Option<RawNodeIndex> {
        let start = self.token_index();
        let lhs = self.parse_binary(0)?;
        if self.eat(TokenKind::Assign) {
            let rhs = self.parse_expression()?;
            let node = self.tree.push(
                NodeKind::Assignment(AssignmentNode {
                    op: AssignmentOp::Assign,
                    lhs,
                    rhs,
                    next: RawNodeIndex::NONE,
                }),
                self.range_from(start),
            );
            return Some(node);
        }
        Some(lhs)
    }

    fn binary_op(&self) -> Option<(BinaryOp, u8, usize)> {
        // (operator, precedence, token count)
        let op = match self.current() {
            TokenKind::PipePipe => (BinaryOp::ConditionalOr, 1, 1),
            TokenKind::AmpAmp => (BinaryOp::ConditionalAnd, 2, 1),
            TokenKind::Pipe => (BinaryOp::BitwiseOr, 3, 1),
            TokenKind::Caret => (BinaryOp::BitwiseXor, 4, 1),
            TokenKind::Amp => (BinaryOp::BitwiseAnd, 5, 1),
            TokenKind::EqEq => (BinaryOp::Equal, 6, 1),
            TokenKind::NotEq => (BinaryOp::NotEqual, 6, 1),
            TokenKind::Lt => (BinaryOp::LessThan, 7, 1),
            TokenKind::Le => (BinaryOp::LessThanOrEqual, 7, 1),
            TokenKind::Ge => (BinaryOp::GreaterThanOrEqual, 7, 1),
            TokenKind::Gt => {
                // adjacent `>`s form a shift-right
                let here = self.tree.tokens[self.pos];
                let next = self.tree.tokens[(self.pos + 1).min(self.tree.tokens.len() - 1)];
                if next.kind == TokenKind::Gt && next.start == here.end {
                    (BinaryOp::ShiftRight, 8, 2)
                } else {
                    (BinaryOp::GreaterThan, 7, 1)
                }
            }
            TokenKind::Shl => (BinaryOp::ShiftLeft, 8, 1),
            TokenKind::Plus => (BinaryOp::Add, 9, 1),
            TokenKind::Minus => (BinaryOp::Subtract, 9, 1),
            TokenKind::Star => (BinaryOp::Multiply, 10, 1),
            TokenKind::Slash => (BinaryOp::Divide, 10, 1),
            TokenKind::Percent => (BinaryOp::Modulus, 10, 1),
            _ => return None,
        };
        Some(op)
    }

    fn parse_binary(&mut self, min_precedence: u8) -> Option<RawNodeIndex> {
        let start = self.token_index();
        let mut lhs = self.parse_unary()?;

        while let Some((op, precedence, tokens)) = self.binary_op() {
            if precedence < min_precedence {
                break;
            }
            for _ in 0..tokens {
                self.bump();
            }
            let rhs = self.parse_binary(precedence + 1)?;
            lhs = self.tree.push(
                NodeKind::Binary(BinaryNode {
                    op,
                    lhs,
                    rhs,
                    next: RawNodeIndex::NONE,
                }),
                self.range_from(start),
            );
        }
        Some(lhs)
    }

    fn parse_unary(&mut self) -> Option<RawNodeIndex> {
        let start = self.token_index();
        let op = match self.current() {
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::Minus => Some(UnaryOp::Minus),
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Tilde => Some(UnaryOp::BitwiseNot),
            _ => None,
        };
        if let Some(op) = op {
            self.bump();
            let operand = self.parse_unary()?;
            let node = self.tree.push(
                NodeKind::Unary(UnaryNode {
                    op,
                    operand,
                    next: RawNodeIndex::NONE,
                }),
                self.range_from(start),
            );
            return Some(node);
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Option<RawNodeIndex> {
        let start = self.token_index();

        let head = match self.current() {
            TokenKind::Number(value) => {
                self.bump();
                self.tree.push(
                    NodeKind::Literal(LiteralNode {
                        value,
                        default_type: NodeIndex::NONE,
                        next: RawNodeIndex::NONE,
                    }),
                    self.range_from(start),
                )
            }
            TokenKind::KwTrue | TokenKind::KwFalse => {
                let value = self.at(TokenKind::KwTrue);
                self.bump();
                self.tree.push(
                    NodeKind::Literal(LiteralNode {
                        value: LiteralData::Bool(value),
                        default_type: NodeIndex::NONE,
                        next: RawNodeIndex::NONE,
                    }),
                    self.range_from(start),
                )
            }
            TokenKind::KwNull => {
                self.bump();
                self.tree.push(
                    NodeKind::Literal(LiteralNode {
                        value: LiteralData::Null,
                        default_type: NodeIndex::NONE,
                        next: RawNodeIndex::NONE,
                    }),
                    self.range_from(start),
                )
            }
            TokenKind::KwDefault => {
                self.bump();
                let default_type = if self.eat(TokenKind::LParen) {
                    let path = self.parse_type_path();
                    self.expect(TokenKind::RParen, "`)` closing default(T)");
                    path.unwrap_or(NodeIndex::NONE)
                } else {
                    NodeIndex::NONE
                };
                self.tree.push(
                    NodeKind::Literal(LiteralNode {
                        value: LiteralData::Default,
                        default_type,
                        next: RawNodeIndex::NONE,
                    }),
                    self.range_from(start),
                )
            }
            TokenKind::LParen => {
                self.bump();
                let expression = self.parse_expression().unwrap_or(RawNodeIndex::NONE);
                self.expect(TokenKind::RParen, "`)` closing expression");
                self.tree.push(
                    NodeKind::Paren(ParenNode {
                        expression,
                        next: RawNodeIndex::NONE,
                    }),
                    self.range_from(start),
                )
            }
            TokenKind::Identifier => {
                let identifier = self.parse_identifier()?;
                if self.at(TokenKind::LParen) {
                    let arguments = self.parse_argument_list();
                    self.tree.push(
                        NodeKind::PrimaryInvocation(PrimaryInvocationNode {
                            identifier,
                            arguments,
                            next: RawNodeIndex::NONE,
                        }),
                        self.range_from(start),
                    )
                } else {
                    identifier.raw()
                }
            }
            _ => {
                self.error("expected an expression".to_string());
                return None;
            }
        };

        // postfix: brackets directly on the head, then `.member`, calls and
        // further brackets as tail parts
        let head_bracket = self.parse_bracket_list();

        let mut first_tail: NodeIndex<PrimaryTailNode> = NodeIndex::NONE;
        let mut last_tail = RawNodeIndex::NONE;

        loop {
            let part_start = self.token_index();
            let part = if self.eat(TokenKind::Dot) {
                let Some(identifier) = self.parse_identifier() else {
                    break;
                };
                self.tree.push(
                    NodeKind::MemberAccess(MemberAccessNode { identifier }),
                    self.range_from(part_start),
                )
            } else if self.at(TokenKind::LParen) && last_tail.is_valid() {
                let arguments = self.parse_argument_list();
                self.tree.push(
                    NodeKind::Invocation(InvocationNode { arguments }),
                    self.range_from(part_start),
                )
            } else {
                break;
            };

            let bracket = self.parse_bracket_list();
            let tail = self.tree.push(
                NodeKind::PrimaryTail(PrimaryTailNode {
                    part,
                    bracket,
                    next: NodeIndex::NONE,
                }),
                self.range_from(part_start),
            );
            if last_tail.is_valid() {
                self.set_next(last_tail, tail);
            } else {
                first_tail = NodeIndex::new(tail.0);
            }
            last_tail = tail;
        }

        let needs_wrapper = first_tail.is_valid()
            || head_bracket.is_valid()
            || matches!(
                self.tree.kind(head),
                Some(NodeKind::Identifier(_)) | Some(NodeKind::PrimaryInvocation(_))
            );

        if !needs_wrapper {
            return Some(head);
        }

        let node = self.tree.push(
            NodeKind::Primary(PrimaryNode {
                start: head,
                bracket: head_bracket,
                tail: first_tail,
                next: RawNodeIndex::NONE,
            }),
            self.range_from(start),
        );
        Some(node)
    }

    fn parse_bracket_list(&mut self) -> NodeIndex<BracketNode> {
        let mut first = NodeIndex::NONE;
        let mut last = RawNodeIndex::NONE;
        while self.at(TokenKind::LBracket) {
            let start = self.token_index();
            self.bump();
            let expression = self.parse_expression().unwrap_or(RawNodeIndex::NONE);
            self.expect(TokenKind::RBracket, "`]` closing index expression");
            let node = self.tree.push(
                NodeKind::Bracket(BracketNode {
                    expression,
                    next: NodeIndex::NONE,
                }),
                self.range_from(start),
            );
            if last.is_valid() {
                self.set_next(last, node);
            } else {
                first = NodeIndex::new(node.0);
            }
            last = node;
        }
        first
    }

    fn parse_argument_list(&mut self) -> NodeIndex<ArgumentListNode> {
        let start = self.token_index();
        if !self.expect(TokenKind::LParen, "`(` opening argument list") {
            return NodeIndex::NONE;
        }
        let mut first = NodeIndex::NONE;
        let mut last = RawNodeIndex::NONE;
        while !self.at(TokenKind::RParen) && !self.at(TokenKind::Eof) {
            let Some(arg) = self.parse_argument() else {
                self.recover();
                break;
            };
            if last.is_valid() {
                self.set_next(last, arg.raw());
            } else {
                first = arg;
            }
            last = arg.raw();
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen, "`)` closing argument list");
        let node = self.tree.push(
            NodeKind::ArgumentList(ArgumentListNode { first }),
            self.range_from(start),
        );
        NodeIndex::new(node.0)
    }

    fn parse_argument(&mut self) -> Option<NodeIndex<ArgumentNode>> {
        let start = self.token_index();

        if self.eat(TokenKind::KwRef) {
            let expression = self.parse_expression()?;
            let node = self.tree.push(
                NodeKind::Argument(ArgumentNode {
                    pass_by: PassBy::Ref,
                    expression,
                    type_path: NodeIndex::NONE,
                    identifier: NodeIndex::NONE,
                    is_var: false,
                    next: NodeIndex::NONE,
                }),
                self.range_from(start),
            );
            return Some(NodeIndex::new(node.0));
        }

        if self.eat(TokenKind::KwOut) {
            // `out var x`, `out Type x`, or `out expr`
            if self.eat(TokenKind::KwVar) {
                let identifier = self.parse_identifier()?;
                let node = self.tree.push(
                    NodeKind::Argument(ArgumentNode {
                        pass_by: PassBy::Out,
                        expression: RawNodeIndex::NONE,
                        type_path: NodeIndex::NONE,
                        identifier,
                        is_var: true,
                        next: NodeIndex::NONE,
                    }),
                    self.range_from(start),
                );
                return Some(NodeIndex::new(node.0));
            }
            if matches!(self.current(), TokenKind::BuiltIn(_))
                || (self.at(TokenKind::Identifier) && self.looks_like_declaration())
            {
                let type_path = self.parse_type_path()?;
                let identifier = self.parse_identifier()?;
                let node = self.tree.push(
                    NodeKind::Argument(ArgumentNode {
                        pass_by: PassBy::Out,
                        expression: RawNodeIndex::NONE,
                        type_path,
                        identifier,
                        is_var: false,
                        next: NodeIndex::NONE,
                    }),
                    self.range_from(start),
                );
                return Some(NodeIndex::new(node.0));
            }
            let expression = self.parse_expression()?;
            let node = self.tree.push(
                NodeKind::Argument(ArgumentNode {
                    pass_by: PassBy::Out,
                    expression,
                    type_path: NodeIndex::NONE,
                    identifier: NodeIndex::NONE,
                    is_var: false,
                    next: NodeIndex::NONE,
                }),
                self.range_from(start),
            );
            return Some(NodeIndex::new(node.0));
        }

        let expression = self.parse_expression()?;
        let node = self.tree.push(
            NodeKind::Argument(ArgumentNode {
                pass_by: PassBy::None,
                expression,
                type_path: NodeIndex::NONE,
                identifier: NodeIndex::NONE,
                is_var: false,
                next: NodeIndex::NONE,
            }),
            self.range_from(start),
        );
        Some(NodeIndex::new(node.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> ParseResult {
        AlchemyParser.parse(src)
    }

    fn parse_ok(src: &str) -> SyntaxTree {
        let result = parse(src);
        assert!(result.errors.is_empty(), "parse errors: {:?}", result.errors);
        result.tree
    }

    #[test]
    fn parses_class_with_members() {
        let tree = parse_ok(
            "public class Point {\n\
             \tint x;\n\
             \tint y;\n\
             \tpublic int Sum() { return x + y; }\n\
             }\n",
        );
        let file = tree.get(tree.root).unwrap();
        let class = match tree.kind(file.first_declaration).unwrap() {
            NodeKind::Class(c) => *c,
            other => panic!("expected class, got {other:?}"),
        };
        let body = tree.get(class.body).unwrap();
        let members: Vec<_> = tree.iter_list(body.first).collect();
        assert_eq!(members.len(), 3);
        assert!(matches!(members[0].1.kind, NodeKind::Field(_)));
        assert!(matches!(members[2].1.kind, NodeKind::Method(_)));
    }

    #[test]
    fn parses_using_and_alias() {
        let tree = parse_ok("using System;\nusing Vec = System::Collections::List<int>;\nclass C {}\n");
        let file = tree.get(tree.root).unwrap();
        let decls: Vec<_> = tree.iter_list(file.first_declaration).collect();
        assert!(matches!(decls[0].1.kind, NodeKind::UsingNamespace(_)));
        assert!(matches!(decls[1].1.kind, NodeKind::UsingAlias(_)));
    }

    #[test]
    fn parses_generic_type_paths() {
        let tree = parse_ok("class C { Map<string, List<int>> lookup; }");
        let file = tree.get(tree.root).unwrap();
        let class = match tree.kind(file.first_declaration).unwrap() {
            NodeKind::Class(c) => *c,
            other => panic!("expected class, got {other:?}"),
        };
        let body = tree.get(class.body).unwrap();
        let field = match &tree.node(body.first).unwrap().kind {
            NodeKind::Field(f) => *f,
            other => panic!("expected field, got {other:?}"),
        };
        let path = tree.get(field.type_path).unwrap();
        assert!(path.type_arguments.is_valid());
    }

    #[test]
    fn parses_optional_and_out_parameters() {
        let tree = parse_ok(
            "class C { void F(int x, int y = 1, out int z) {} }",
        );
        let file = tree.get(tree.root).unwrap();
        let class = match tree.kind(file.first_declaration).unwrap() {
            NodeKind::Class(c) => *c,
            other => panic!("unexpected {other:?}"),
        };
        let body = tree.get(class.body).unwrap();
        let method = match &tree.node(body.first).unwrap().kind {
            NodeKind::Method(m) => *m,
            other => panic!("unexpected {other:?}"),
        };
        let params = tree.get(method.parameters).unwrap();
        let mut cursor = params.first;
        let mut seen = Vec::new();
        while let Some(p) = tree.get(cursor) {
            seen.push((p.pass_by, p.default_value.is_valid()));
            cursor = p.next;
        }
        assert_eq!(
            seen,
            vec![
                (PassBy::None, false),
                (PassBy::None, true),
                (PassBy::Out, false)
            ]
        );
    }

    #[test]
    fn parses_if_with_context_list() {
        let tree = parse_ok(
            "class C { void F(int? a) { if (a) using (v) { } } }",
        );
        // walk down to the if node
        let found = tree
            .nodes
            .iter()
            .any(|n| matches!(&n.kind, NodeKind::If(i) if i.context.is_valid()));
        assert!(found, "expected an if node with a context list");
    }

    #[test]
    fn parses_member_call_chain() {
        let tree = parse_ok("class C { void F() { foo.Bar(1, 2).Baz(); } }");
        let has_invocation = tree
            .nodes
            .iter()
            .any(|n| matches!(n.kind, NodeKind::Invocation(_)));
        assert!(has_invocation);
    }

    #[test]
    fn shift_right_from_adjacent_angle_brackets() {
        let tree = parse_ok("class C { void F() { int x = 1 >> 2; } }");
        let has_shift = tree
            .nodes
            .iter()
            .any(|n| matches!(&n.kind, NodeKind::Binary(b) if b.op == BinaryOp::ShiftRight));
        assert!(has_shift);
    }

    #[test]
    fn recovers_from_garbage_member() {
        let result = parse("class C { ??? int x; }");
        assert!(!result.errors.is_empty());
        // the field after the garbage should still be present
        let has_field = result
            .tree
            .nodes
            .iter()
            .any(|n| matches!(n.kind, NodeKind::Field(_)));
        assert!(has_field);
    }
}

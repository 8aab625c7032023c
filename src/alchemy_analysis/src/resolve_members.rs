use std::sync::Arc;

use alchemy_jobs::{Job, JobContext};
use alchemy_syntax::nodes::{NodeKind, ParameterListNode, TypeParameterListNode};
use alchemy_syntax::{NodeIndex, RawNodeIndex, SyntaxTree, TokenRange};

use crate::builtins::BuiltIns;
use crate::diagnostics::Diagnostics;
use crate::file_info::{FileInfo, FileUsings, UsingAlias};
use crate::generic_cache::GenericTypeCache;
use crate::member_info::{
    ConstructorInfo, FieldInfo, IndexerInfo, MethodInfo, ParameterInfo, PropertyInfo,
};
use crate::type_info::{ResolveMap, TypeClass, TypeInfo, TypeMembers};
use crate::type_resolver::TypeResolver;

/// Parallel-for over files: resolve `using` aliases, base types and every
/// member's type, validate optional parameters and expand them into
/// per-arity methods, then publish each type's member tables.
pub struct ResolveMembersJob {
    pub files: Arc<Vec<Arc<FileInfo>>>,
    pub resolve_map: Arc<ResolveMap>,
    pub diagnostics: Arc<Diagnostics>,
    pub builtins: Arc<BuiltIns>,
    pub generic_cache: Arc<GenericTypeCache>,
}

impl Job for ResolveMembersJob {
    fn execute_range(&self, _ctx: &JobContext, start: u32, end: u32) {
        for index in start..end {
            let file = &self.files[index as usize];
            if file.was_changed() {
                self.resolve_file(file);
            }
        }
    }
}

impl ResolveMembersJob {
    fn resolve_file(&self, file: &Arc<FileInfo>) {
        let tree_guard = file.tree.read();
        let Some(parse) = tree_guard.as_ref() else {
            return;
        };
        let tree = &parse.tree;

        let usings = self.gather_usings(file, tree);
        *file.usings.write() = usings.clone();

        let mut resolver = TypeResolver::new(
            file,
            tree,
            &self.resolve_map,
            &self.diagnostics,
            &self.builtins,
            &self.generic_cache,
            usings,
        );

        let declared = file.declared_types.read().clone();
        for type_info in &declared {
            resolve_type_members(&mut resolver, type_info);
        }
    }

    /// Each alias's right-hand side is a full type path; aliases that fail
    /// to resolve have already produced a diagnostic and are dropped.
    fn gather_usings(&self, file: &Arc<FileInfo>, tree: &SyntaxTree) -> FileUsings {
        let mut usings = FileUsings {
            namespaces: vec![file.package.clone()],
            aliases: Vec::new(),
        };

        let Some(root) = tree.get(tree.root) else {
            return usings;
        };

        let mut alias_resolver = TypeResolver::new(
            file,
            tree,
            &self.resolve_map,
            &self.diagnostics,
            &self.builtins,
            &self.generic_cache,
            FileUsings {
                namespaces: vec![file.package.clone()],
                aliases: Vec::new(),
            },
        );

        let mut cursor = root.first_declaration;
        while let Some(node) = tree.node(cursor) {
            let next = node.kind.next();
            match &node.kind {
                NodeKind::UsingNamespace(using) => {
                    let mut path = String::new();
                    let mut ident = using.first_ident;
                    while let Some(segment) = tree.get(ident) {
                        if !path.is_empty() {
                            path.push_str("::");
                        }
                        path.push_str(tree.token_text(segment.token));
                        ident = segment.next;
                    }
                    if !path.is_empty() {
                        usings.namespaces.push(path);
                    }
                }
                NodeKind::UsingAlias(alias) => {
                    let name = tree
                        .get(alias.alias)
                        .map(|i| tree.token_text(i.token).to_string())
                        .unwrap_or_default();
                    if let Some(resolved) = alias_resolver.resolve_type_path(alias.type_path) {
                        if let Some(target) = resolved.type_info {
                            usings.aliases.push(UsingAlias { name, target });
                        }
                    }
                }
                _ => {}
            }
            cursor = next;
        }

        usings
    }
}

fn report(resolver: &TypeResolver, range: TokenRange, message: String) {
    let location = resolver.tree.location_from_token(range.start);
    resolver
        .diagnostics
        .error(&resolver.file.path_string(), location, message);
}

fn resolve_type_members(resolver: &mut TypeResolver, type_info: &Arc<TypeInfo>) {
    match type_info.type_class {
        TypeClass::Class | TypeClass::Struct | TypeClass::Interface => {}
        TypeClass::Enum | TypeClass::Delegate => {
            type_info.set_members(TypeMembers::default());
            return;
        }
        TypeClass::GenericArgument => return,
    }

    let (base_list, body) = match resolver.tree.kind(type_info.node) {
        Some(NodeKind::Class(node)) => (node.base_list, node.body),
        Some(NodeKind::Struct(node)) => (node.base_list, node.body),
        Some(NodeKind::Interface(node)) => (node.base_list, node.body),
        _ => {
            type_info.set_members(TypeMembers::default());
            return;
        }
    };

    let outer_generics = resolver.input_generic_args.len();
    for arg in &type_info.generic_args {
        if let Some(arg_info) = &arg.type_info {
            resolver.input_generic_args.push(arg_info.clone());
        }
    }

    let mut members = TypeMembers {
        fields: Vec::with_capacity(type_info.declared_counts.fields as usize),
        properties: Vec::with_capacity(type_info.declared_counts.properties as usize),
        methods: Vec::with_capacity(type_info.declared_counts.methods as usize),
        indexers: Vec::with_capacity(type_info.declared_counts.indexers as usize),
        constructors: Vec::with_capacity(type_info.declared_counts.constructors as usize),
        base_types: Vec::new(),
    };

    resolve_base_types(resolver, type_info, base_list, &mut members);

    let body_first = resolver
        .tree
        .get(body)
        .map(|b| b.first)
        .unwrap_or(RawNodeIndex::NONE);

    let mut cursor = body_first;
    while cursor.is_valid() {
        let Some(node) = resolver.tree.node(cursor) else {
            break;
        };
        let kind = node.kind.clone();
        let next = kind.next();
        match &kind {
            NodeKind::Field(field) => {
                let ty = resolver
                    .resolve_type_path(field.type_path)
                    .unwrap_or_default();
                let name = identifier_text(resolver.tree, field.identifier);
                members.fields.push(Arc::new(FieldInfo {
                    name,
                    declaring_type: Arc::downgrade(type_info),
                    ty,
                    modifiers: modifiers_of(resolver.tree, field.modifiers),
                    node: cursor,
                }));
            }

            NodeKind::Property(property) => {
                let ty = resolver
                    .resolve_type_path(property.type_path)
                    .unwrap_or_default();
                let name = identifier_text(resolver.tree, property.identifier);
                members.properties.push(Arc::new(PropertyInfo {
                    name,
                    declaring_type: Arc::downgrade(type_info),
                    ty,
                    modifiers: modifiers_of(resolver.tree, property.modifiers),
                    node: cursor,
                    getter: property.getter.raw(),
                    setter: property.setter.raw(),
                }));
            }

            NodeKind::Indexer(indexer) => {
                let ty = resolver
                    .resolve_type_path(indexer.type_path)
                    .unwrap_or_default();
                let parameters = resolve_parameters(resolver, indexer.parameters);
                members.indexers.push(Arc::new(IndexerInfo {
                    declaring_type: Arc::downgrade(type_info),
                    ty,
                    modifiers: modifiers_of(resolver.tree, indexer.modifiers),
                    parameters,
                    node: cursor,
                    getter: indexer.getter.raw(),
                    setter: indexer.setter.raw(),
                }));
            }

            NodeKind::Constructor(constructor) => {
                let parameters = resolve_parameters(resolver, constructor.parameters);
                validate_parameters(resolver, &parameters);
                let name = identifier_text(resolver.tree, constructor.identifier);
                members.constructors.push(Arc::new(ConstructorInfo {
                    name,
                    declaring_type: Arc::downgrade(type_info),
                    parameters,
                    modifiers: modifiers_of(resolver.tree, constructor.modifiers),
                    node: cursor,
                }));
            }

            NodeKind::Method(method) => {
                resolve_method(resolver, type_info, cursor, method, &mut members);
            }

            _ => {}
        }
        cursor = next;
    }

    resolver.input_generic_args.truncate(outer_generics);

    type_info.set_members(members);
}

fn resolve_base_types(
    resolver: &mut TypeResolver,
    type_info: &Arc<TypeInfo>,
    base_list: NodeIndex<alchemy_syntax::nodes::TypeListNode>,
    members: &mut TypeMembers,
) {
    let Some(list) = resolver.tree.get(base_list) else {
        return;
    };

    let mut cursor = list.first;
    let mut position = 0usize;
    while cursor.is_valid() {
        let range = resolver.tree.token_range(cursor.raw());
        let next = resolver
            .tree
            .get(cursor)
            .map(|p| p.next)
            .unwrap_or_default();

        if let Some(resolved) = resolver.resolve_type_path(cursor) {
            if resolved.is_nullable() || resolved.is_array() || resolved.is_nullable_array() {
                report(
                    resolver,
                    range,
                    "Base types cannot be nullable or array types".to_string(),
                );
            } else if let Some(base) = resolved.type_info {
                let display = base.fully_qualified_name.clone();
                if base.is_class() {
                    if !type_info.is_class() {
                        report(
                            resolver,
                            range,
                            format!(
                                "A {} cannot inherit from class `{display}`",
                                type_info.type_class.as_str()
                            ),
                        );
                    } else if position != 0 {
                        report(
                            resolver,
                            range,
                            format!("Base class `{display}` must appear first in the base list"),
                        );
                    } else {
                        members.base_types.push(base);
                    }
                } else if base.type_class == TypeClass::Interface {
                    members.base_types.push(base);
                } else {
                    report(
                        resolver,
                        range,
                        format!("Base type `{display}` must be a class or an interface"),
                    );
                }
            } else {
                report(
                    resolver,
                    range,
                    "Built-in types cannot be used as base types".to_string(),
                );
            }
        }

        position += 1;
        cursor = next;
    }
}

fn resolve_method(
    resolver: &mut TypeResolver,
    type_info: &Arc<TypeInfo>,
    node: RawNodeIndex,
    method: &alchemy_syntax::nodes::MethodNode,
    members: &mut TypeMembers,
) {
    let method_generics = resolver.input_generic_args.len();

    let generic_params = collect_method_generics(resolver, method.type_parameters);
    for param in &generic_params {
        resolver.input_generic_args.push(param.clone());
    }

    let return_type = resolver
        .resolve_type_path(method.return_type)
        .unwrap_or_default();

    let parameters = resolve_parameters(resolver, method.parameters);
    validate_parameters(resolver, &parameters);

    let name = identifier_text(resolver.tree, method.identifier);
    let modifiers = modifiers_of(resolver.tree, method.modifiers);

    let first_default = parameters.iter().position(|p| p.has_default_value);
    let default_count = first_default
        .map(|start| parameters.len() - start)
        .unwrap_or(0);

    let mut prototype = MethodInfo::new(
        name.clone(),
        Arc::downgrade(type_info),
        return_type.clone(),
        modifiers,
        parameters.clone(),
        generic_params.clone(),
        members.methods.len() as u32,
        node,
    );
    prototype.is_generic_definition = !generic_params.is_empty();
    prototype.is_optional_parameter_prototype = default_count != 0;
    let prototype = Arc::new(prototype);
    members.methods.push(prototype.clone());

    // expand each optional tail into a concrete per-arity method that
    // refers back to the prototype; overload resolution then never has to
    // reason about defaults
    if default_count > 0 {
        let required = parameters.len() - default_count;
        for extra in 0..=default_count {
            let arity = required + extra;
            let mut expanded_params: Vec<ParameterInfo> =
                parameters.iter().take(arity).cloned().collect();
            for param in &mut expanded_params {
                param.has_default_value = false;
            }
            let mut expanded = MethodInfo::new(
                name.clone(),
                Arc::downgrade(type_info),
                return_type.clone(),
                modifiers,
                expanded_params,
                generic_params.clone(),
                members.methods.len() as u32,
                node,
            );
            expanded.is_generic_definition = prototype.is_generic_definition;
            expanded.prototype = Some(prototype.clone());
            members.methods.push(Arc::new(expanded));
        }
    }

    resolver.input_generic_args.truncate(method_generics);
}

fn collect_method_generics(
    resolver: &TypeResolver,
    list: NodeIndex<TypeParameterListNode>,
) -> Vec<Arc<TypeInfo>> {
    let Some(list) = resolver.tree.get(list) else {
        return Vec::new();
    };
    let mut params = Vec::new();
    let mut cursor = list.first;
    while let Some(param) = resolver.tree.get(cursor) {
        let name = resolver.tree.token_text(param.token);
        params.push(Arc::new(TypeInfo::generic_argument(
            name,
            resolver.file.file_id,
            Arc::downgrade(resolver.file),
        )));
        cursor = param.next;
    }
    params
}

fn resolve_parameters(
    resolver: &mut TypeResolver,
    list: NodeIndex<ParameterListNode>,
) -> Vec<ParameterInfo> {
    let Some(list) = resolver.tree.get(list) else {
        return Vec::new();
    };
    let mut parameters = Vec::new();
    let mut cursor = list.first;
    while cursor.is_valid() {
        let Some(param) = resolver.tree.get(cursor).copied() else {
            break;
        };
        let ty = resolver
            .resolve_type_path(param.type_path)
            .unwrap_or_default();
        parameters.push(ParameterInfo {
            name: identifier_text(resolver.tree, param.identifier),
            ty,
            storage: param.storage,
            pass_by: param.pass_by,
            has_default_value: param.default_value.is_valid(),
            node: cursor.raw(),
        });
        cursor = param.next;
    }
    parameters
}

fn validate_parameters(resolver: &TypeResolver, parameters: &[ParameterInfo]) {
    for (index, param) in parameters.iter().enumerate() {
        let range = resolver.tree.token_range(param.node);

        if index > 0 && !param.has_default_value && parameters[index - 1].has_default_value {
            report(
                resolver,
                range,
                "Optional parameters must appear after all required parameters".to_string(),
            );
        }

        if param.has_default_value {
            if param.pass_by != alchemy_syntax::PassBy::None {
                report(
                    resolver,
                    range,
                    "Optional parameters cannot be passed by ref or out".to_string(),
                );
            }
            if param.storage != alchemy_syntax::StorageClass::Default {
                report(
                    resolver,
                    range,
                    "Optional parameters cannot specify storage requirements".to_string(),
                );
            }
        }

        for earlier in &parameters[..index] {
            if earlier.name == param.name {
                report(resolver, range, format!("Duplicate parameter `{}`", param.name));
            }
        }
    }
}

fn identifier_text(
    tree: &SyntaxTree,
    index: NodeIndex<alchemy_syntax::nodes::IdentifierNode>,
) -> String {
    tree.get(index)
        .map(|i| tree.token_text(i.token).to_string())
        .unwrap_or_default()
}

fn modifiers_of(
    tree: &SyntaxTree,
    index: NodeIndex<alchemy_syntax::nodes::ModifierListNode>,
) -> alchemy_syntax::Modifiers {
    tree.get(index).map(|m| m.modifiers).unwrap_or_default()
}

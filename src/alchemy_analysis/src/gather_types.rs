use std::sync::Arc;

use alchemy_jobs::{Job, JobContext};
use alchemy_syntax::nodes::{
    ClassBodyNode, IdentifierNode, ModifierListNode, NodeKind, ParameterListNode,
    TypeParameterListNode,
};
use alchemy_syntax::{Modifiers, NodeIndex, RawNodeIndex, SyntaxTree};

use crate::diagnostics::Diagnostics;
use crate::file_info::FileInfo;
use crate::resolved_type::ResolvedType;
use crate::type_info::{
    MemberCounts, NamespaceInfo, ResolveMap, TypeClass, TypeInfo, TypeInfoFlags,
};

/// Parallel-for over files: walk each file's declarations, build a
/// `TypeInfo` per declared type (with pre-counted member slots), then
/// register every fully-qualified name in the global resolve map. The map
/// insert is the only synchronized step; duplicates lose to the first
/// declaration and are diagnosed.
pub struct GatherTypesJob {
    pub files: Arc<Vec<Arc<FileInfo>>>,
    pub resolve_map: Arc<ResolveMap>,
    pub diagnostics: Arc<Diagnostics>,
}

impl Job for GatherTypesJob {
    fn execute_range(&self, _ctx: &JobContext, start: u32, end: u32) {
        for index in start..end {
            let file = &self.files[index as usize];
            if file.was_changed() {
                gather_file(file);
            }
            self.register_declared(file);
        }
    }
}

impl GatherTypesJob {
    fn register_declared(&self, file: &Arc<FileInfo>) {
        let declared = file.declared_types.read().clone();
        for type_info in declared {
            let fqn = type_info.fully_qualified_name.clone();
            if let Err(existing) = self.resolve_map.try_insert(&fqn, type_info.clone()) {
                if Arc::ptr_eq(&existing, &type_info) {
                    continue;
                }
                let tree_guard = file.tree.read();
                let location = tree_guard
                    .as_ref()
                    .map(|parse| parse.tree.location_from_node(type_info.node))
                    .unwrap_or_default();
                self.diagnostics.error(
                    &file.path_string(),
                    location,
                    format!(
                        "{} `{fqn}` was also declared in {}",
                        type_info.type_class.as_str(),
                        existing.declaring_file_path()
                    ),
                );
            }
        }
    }
}

struct GatherState<'a> {
    file: &'a Arc<FileInfo>,
    tree: &'a SyntaxTree,
    namespace_stack: Vec<Arc<NamespaceInfo>>,
    declared: Vec<Arc<TypeInfo>>,
}

fn gather_file(file: &Arc<FileInfo>) {
    let tree_guard = file.tree.read();
    let Some(parse) = tree_guard.as_ref() else {
        file.declared_types.write().clear();
        return;
    };

    let mut state = GatherState {
        file,
        tree: &parse.tree,
        namespace_stack: vec![NamespaceInfo::root(&file.package)],
        declared: Vec::new(),
    };

    if let Some(root) = parse.tree.get(parse.tree.root) {
        gather_declarations(&mut state, root.first_declaration);
    }

    let declared = std::mem::take(&mut state.declared);
    let body_slots = declared.len();
    drop(tree_guard);

    *file.declared_types.write() = declared;
    let mut bodies = file.bodies.write();
    bodies.clear();
    bodies.resize_with(body_slots, Default::default);
}

fn modifiers_of(tree: &SyntaxTree, index: NodeIndex<ModifierListNode>) -> Modifiers {
    tree.get(index).map(|m| m.modifiers).unwrap_or_default()
}

fn identifier_text<'t>(tree: &'t SyntaxTree, index: NodeIndex<IdentifierNode>) -> &'t str {
    tree.get(index).map(|i| tree.token_text(i.token)).unwrap_or("")
}

fn count_type_parameters(tree: &SyntaxTree, index: NodeIndex<TypeParameterListNode>) -> usize {
    let Some(list) = tree.get(index) else {
        return 0;
    };
    let mut count = 0;
    let mut cursor = list.first;
    while let Some(param) = tree.get(cursor) {
        count += 1;
        cursor = param.next;
    }
    count
}

fn count_parameters_with_default(
    tree: &SyntaxTree,
    index: NodeIndex<ParameterListNode>,
) -> (usize, Option<usize>) {
    let Some(list) = tree.get(index) else {
        return (0, None);
    };
    let mut count = 0;
    let mut first_default = None;
    let mut cursor = list.first;
    while let Some(param) = tree.get(cursor) {
        if param.default_value.is_valid() && first_default.is_none() {
            first_default = Some(count);
        }
        count += 1;
        cursor = param.next;
    }
    (count, first_default)
}

fn gather_declarations(state: &mut GatherState, first: RawNodeIndex) {
    let mut cursor = first;

    while cursor.is_valid() {
        let Some(node) = state.tree.node(cursor) else {
            break;
        };
        let kind = node.kind.clone();
        let next = kind.next();
        match &kind {
            NodeKind::Namespace(ns) => {
                let name = identifier_text(state.tree, ns.name).to_string();
                let top = state.namespace_stack.last().cloned();
                let fqn = match &top {
                    Some(parent_ns) => format!("{}::{name}", parent_ns.fully_qualified_name),
                    None => name.clone(),
                };
                state.namespace_stack.push(Arc::new(NamespaceInfo {
                    parent: top,
                    type_info: None,
                    name,
                    fully_qualified_name: fqn,
                }));
                gather_declarations(state, ns.first_declaration);
                state.namespace_stack.pop();
            }

            NodeKind::Class(class) => {
                gather_type(
                    state,
                    cursor,
                    TypeClass::Class,
                    modifiers_of(state.tree, class.modifiers),
                    class.identifier,
                    class.type_parameters,
                    class.body,
                );
            }
            NodeKind::Struct(node) => {
                gather_type(
                    state,
                    cursor,
                    TypeClass::Struct,
                    modifiers_of(state.tree, node.modifiers),
                    node.identifier,
                    node.type_parameters,
                    node.body,
                );
            }
            NodeKind::Interface(node) => {
                gather_type(
                    state,
                    cursor,
                    TypeClass::Interface,
                    modifiers_of(state.tree, node.modifiers),
                    node.identifier,
                    node.type_parameters,
                    node.body,
                );
            }
            NodeKind::Enum(node) => {
                gather_type(
                    state,
                    cursor,
                    TypeClass::Enum,
                    modifiers_of(state.tree, node.modifiers),
                    node.identifier,
                    NodeIndex::NONE,
                    NodeIndex::NONE,
                );
            }
            NodeKind::Delegate(node) => {
                gather_type(
                    state,
                    cursor,
                    TypeClass::Delegate,
                    modifiers_of(state.tree, node.modifiers),
                    node.identifier,
                    node.type_parameters,
                    NodeIndex::NONE,
                );
            }

            // member declarations are counted by gather_type
            _ => {}
        }
        cursor = next;
    }
}

#[allow(clippy::too_many_arguments)]
fn gather_type(
    state: &mut GatherState,
    node: RawNodeIndex,
    type_class: TypeClass,
    modifiers: Modifiers,
    identifier: NodeIndex<IdentifierNode>,
    type_parameters: NodeIndex<TypeParameterListNode>,
    body: NodeIndex<ClassBodyNode>,
) {
    let name = identifier_text(state.tree, identifier).to_string();
    let generic_count = count_type_parameters(state.tree, type_parameters);

    let namespace = state.namespace_stack.last().cloned();
    let namespace_fqn = namespace
        .as_ref()
        .map(|ns| ns.fully_qualified_name.as_str())
        .unwrap_or("");
    let fully_qualified = if generic_count > 0 {
        format!("{namespace_fqn}::{name}`{generic_count}")
    } else {
        format!("{namespace_fqn}::{name}")
    };

    let mut flags = TypeInfoFlags::empty();
    if generic_count > 0 {
        flags |= TypeInfoFlags::IS_GENERIC_TYPE_DEFINITION;
    }

    let decl_slot = state.declared.len() as u32;
    let mut type_info = TypeInfo::new(
        state.file.file_id,
        Arc::downgrade(state.file),
        name.clone(),
        fully_qualified,
        namespace.clone(),
        type_class,
        modifiers,
        node,
        decl_slot,
        flags,
    );

    // generic parameters become TypeInfos of class GenericArgument,
    // carrying only a name
    if generic_count > 0 {
        let mut args = Vec::with_capacity(generic_count);
        if let Some(list) = state.tree.get(type_parameters) {
            let mut cursor = list.first;
            while let Some(param) = state.tree.get(cursor) {
                let arg_name = state.tree.token_text(param.token);
                let arg = Arc::new(TypeInfo::generic_argument(
                    arg_name,
                    state.file.file_id,
                    Arc::downgrade(state.file),
                ));
                args.push(ResolvedType::from_type(arg));
                cursor = param.next;
            }
        }
        type_info.set_generic_args(args);
    }

    // member pre-count, then walk nested declarations with a type-based
    // namespace on the stack
    let mut counts = MemberCounts::default();
    let body_first = state
        .tree
        .get(body)
        .map(|b| b.first)
        .unwrap_or(RawNodeIndex::NONE);

    let mut requires_init = false;
    {
        // count directly-declared members
        let mut cursor = body_first;
        while let Some(member) = state.tree.node(cursor) {
            match &member.kind {
                NodeKind::Field(field) => {
                    counts.fields += 1;
                    if field.initializer.is_valid() {
                        requires_init = true;
                    }
                }
                NodeKind::Property(_) => counts.properties += 1,
                NodeKind::Indexer(_) => counts.indexers += 1,
                NodeKind::Constructor(_) => counts.constructors += 1,
                NodeKind::Method(method) => {
                    counts.methods += 1;
                    let (param_count, first_default) =
                        count_parameters_with_default(state.tree, method.parameters);
                    if let Some(first_default) = first_default {
                        counts.methods += (param_count - first_default + 1) as u16;
                    }
                }
                _ => {}
            }
            cursor = member.kind.next();
        }
    }

    type_info.declared_counts = counts;
    if requires_init {
        type_info.add_flags(TypeInfoFlags::REQUIRES_INIT_CONSTRUCTOR);
    }

    let type_info = Arc::new(type_info);
    state.declared.push(type_info.clone());

    // nested type declarations resolve through a namespace segment named
    // after this type (with its arity suffix)
    if body_first.is_valid() {
        let segment = if generic_count > 0 {
            format!("{name}`{generic_count}")
        } else {
            name
        };
        let parent_ns = state.namespace_stack.last().cloned();
        let fqn = match &parent_ns {
            Some(ns) => format!("{}::{segment}", ns.fully_qualified_name),
            None => segment.clone(),
        };
        state.namespace_stack.push(Arc::new(NamespaceInfo {
            parent: parent_ns,
            type_info: Some(Arc::downgrade(&type_info)),
            name: segment,
            fully_qualified_name: fqn,
        }));
        gather_declarations(state, body_first);
        state.namespace_stack.pop();
    }
}

use std::sync::Arc;

use alchemy_syntax::nodes::{NodeKind, TypePathNode};
use alchemy_syntax::{BuiltInType, NodeIndex, SyntaxTree};

use crate::builtins::BuiltIns;
use crate::diagnostics::Diagnostics;
use crate::file_info::FileInfo;
use crate::file_info::FileUsings;
use crate::generic_cache::GenericTypeCache;
use crate::resolved_type::{ResolvedType, ResolvedTypeFlags};
use crate::type_info::{ResolveMap, TypeInfo};

/// Resolves syntax-level type paths against the enclosing generic
/// parameters, the file's aliases, and its using namespaces (the package
/// itself is implicitly first). Successful resolutions record a
/// dependency edge from the resolving file to the declaring file.
pub struct TypeResolver<'a> {
    pub file: &'a Arc<FileInfo>,
    pub tree: &'a SyntaxTree,
    pub resolve_map: &'a ResolveMap,
    pub diagnostics: &'a Diagnostics,
    pub builtins: &'a BuiltIns,
    pub generic_cache: &'a GenericTypeCache,
    /// Stack of enclosing type/method generic parameters.
    pub input_generic_args: Vec<Arc<TypeInfo>>,
    pub usings: FileUsings,
}

impl<'a> TypeResolver<'a> {
    pub fn new(
        file: &'a Arc<FileInfo>,
        tree: &'a SyntaxTree,
        resolve_map: &'a ResolveMap,
        diagnostics: &'a Diagnostics,
        builtins: &'a BuiltIns,
        generic_cache: &'a GenericTypeCache,
        usings: FileUsings,
    ) -> TypeResolver<'a> {
        TypeResolver {
            file,
            tree,
            resolve_map,
            diagnostics,
            builtins,
            generic_cache,
            input_generic_args: Vec::new(),
            usings,
        }
    }

    pub fn make_fully_qualified_name(namespace: &str, name: &str, generic_count: usize) -> String {
        if generic_count > 0 {
            format!("{namespace}::{name}`{generic_count}")
        } else {
            format!("{namespace}::{name}")
        }
    }

    fn unresolved_error(&self, index: NodeIndex<TypePathNode>) {
        let range = self.tree.token_range(index.raw());
        let src = self.tree.source_range(range);
        let location = self.tree.location_from_token(range.start);
        self.diagnostics.error(
            &self.file.path_string(),
            location,
            format!("Unable to resolve type `{src}`"),
        );
    }

    /// Resolve a type path node. `None` means the failure has already been
    /// reported; callers record the member with a null type so later
    /// phases can produce secondary diagnostics without cascading.
    pub fn resolve_type_path(&mut self, index: NodeIndex<TypePathNode>) -> Option<ResolvedType> {
        let path = *self.tree.get(index)?;

        let mut flags = ResolvedTypeFlags::empty();
        if path.is_nullable {
            flags |= ResolvedTypeFlags::IS_NULLABLE;
        }
        let mut array_rank = 0u8;
        if let Some(rank) = self.tree.get(path.array_rank) {
            array_rank = 1;
            flags |= ResolvedTypeFlags::IS_ARRAY;
            if rank.is_nullable {
                flags |= ResolvedTypeFlags::IS_NULLABLE_ARRAY;
            }
        }

        if path.built_in != BuiltInType::Invalid {
            if path.built_in == BuiltInType::Void {
                return Some(ResolvedType::void());
            }
            let mut resolved = self.builtins.resolved(path.built_in);
            resolved.flags |= flags;
            resolved.array_rank = array_rank;
            return Some(resolved);
        }

        if !path.first_ident.is_valid() {
            // the parser already reported whatever went wrong here
            return None;
        }

        // canonical textual name: `::`-joined segments plus an arity suffix
        let mut name = String::new();
        let mut cursor = path.first_ident;
        while let Some(ident) = self.tree.get(cursor) {
            if !name.is_empty() {
                name.push_str("::");
            }
            name.push_str(self.tree.token_text(ident.token));
            cursor = ident.next;
        }

        let mut generic_count = 0usize;
        if let Some(args) = self.tree.get(path.type_arguments) {
            let mut arg_cursor = args.first;
            while let Some(arg) = self.tree.get(arg_cursor) {
                generic_count += 1;
                arg_cursor = arg.next;
            }
        }
        if generic_count > 0 {
            name.push('`');
            name.push_str(&generic_count.to_string());
        }

        let mut found: Option<Arc<TypeInfo>> = None;

        // enclosing generic parameters shadow everything
        for generic in &self.input_generic_args {
            if generic.name == name {
                found = Some(generic.clone());
                break;
            }
        }

        if found.is_none() {
            for alias in &self.usings.aliases {
                if alias.name == name {
                    found = Some(alias.target.clone());
                    break;
                }
            }
        }

        if found.is_none() {
            for namespace in &self.usings.namespaces {
                let candidate = Self::make_fully_qualified_name(namespace, &name, 0);
                let Some(hit) = self.resolve_map.get(&candidate) else {
                    continue;
                };
                if found.is_some() {
                    let location = self.tree.location_from_token(self.tree.token_range(index.raw()).start);
                    self.diagnostics.error(
                        &self.file.path_string(),
                        location,
                        format!("Ambiguous type match {candidate}"),
                    );
                } else {
                    found = Some(hit);
                }
            }
        }

        let Some(mut type_info) = found else {
            self.unresolved_error(index);
            return None;
        };

        if type_info.is_enum() {
            flags |= ResolvedTypeFlags::IS_ENUM;
        }

        if generic_count > 0 {
            if !type_info.is_generic_definition()
                || type_info.generic_argument_count() != generic_count
            {
                let location = self.tree.location_from_token(self.tree.token_range(index.raw()).start);
                self.diagnostics.error(
                    &self.file.path_string(),
                    location,
                    format!(
                        "Type `{}` does not take {generic_count} type arguments",
                        type_info.fully_qualified_name
                    ),
                );
                return None;
            }

            let mut resolved_args = Vec::with_capacity(generic_count);
            let mut arg_cursor = self
                .tree
                .get(path.type_arguments)
                .map(|args| args.first)
                .unwrap_or_default();
            while arg_cursor.is_valid() {
                let resolved = self.resolve_type_path(arg_cursor)?;
                let next = self.tree.get(arg_cursor).map(|a| a.next).unwrap_or_default();
                resolved_args.push(resolved);
                arg_cursor = next;
            }

            type_info = self.generic_cache.make_generic_type(&type_info, resolved_args);
        }

        self.file.add_file_reference(type_info.declaring_file_id);

        Some(ResolvedType {
            type_info: Some(type_info),
            built_in: BuiltInType::Invalid,
            array_rank,
            flags,
        })
    }
}

use std::collections::HashMap;
use std::sync::atomic::AtomicU8;
use std::sync::{Arc, OnceLock, Weak};

use fixedbitset::FixedBitSet;
use parking_lot::Mutex;

use crate::file_info::NO_FILE;
use crate::member_info::{
    ConstructorInfo, FieldInfo, IndexerInfo, MethodInfo, ParameterInfo, PropertyInfo,
};
use crate::resolved_type::ResolvedType;
use crate::type_info::{TypeInfo, TypeInfoFlags, TypeMembers};

/// Thread-safe interning of closed constructed generic types. For a given
/// open definition and argument list every caller gets the same `Arc`.
///
/// Keys are canonical strings: the open type's backticked fully-qualified
/// name followed by `<` + comma-joined argument displays + `>`.
#[derive(Debug, Default)]
pub struct GenericTypeCache {
    cache: Mutex<HashMap<String, Arc<TypeInfo>>>,
    /// Instantiations requested before the open type's member tables were
    /// published (i.e. during resolve-members). Completed at the phase
    /// boundary by `finalize_pending`.
    pending: Mutex<Vec<Arc<TypeInfo>>>,
}

type Replacements = Vec<(String, ResolvedType)>;

impl GenericTypeCache {
    pub fn new() -> GenericTypeCache {
        GenericTypeCache::default()
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn make_cache_key(open: &TypeInfo, args: &[ResolvedType]) -> String {
        let mut key = String::with_capacity(open.fully_qualified_name.len() + 16);
        key.push_str(&open.fully_qualified_name);
        key.push('<');
        for (i, arg) in args.iter().enumerate() {
            if i != 0 {
                key.push(',');
            }
            arg.write_display(&mut key);
        }
        key.push('>');
        key
    }

    /// Intern `open<args...>`. Miss path: the lock is dropped while the
    /// new record and its member substitution are built; on re-entry a
    /// racing winner is returned and the fresh block discarded.
    pub fn make_generic_type(
        &self,
        open: &Arc<TypeInfo>,
        args: Vec<ResolvedType>,
    ) -> Arc<TypeInfo> {
        debug_assert!(open.is_generic_definition());
        debug_assert_eq!(open.generic_argument_count(), args.len());

        let key = Self::make_cache_key(open, &args);

        {
            let cache = self.cache.lock();
            if let Some(hit) = cache.get(&key) {
                return hit.clone();
            }
        }

        let built = self.instantiate(open, args, &key);

        {
            let mut cache = self.cache.lock();
            if let Some(winner) = cache.get(&key) {
                // another thread built the same key in the meantime; drop
                // ours and agree on theirs
                self.discard_pending(&built);
                return winner.clone();
            }
            cache.insert(key, built.clone());
        }

        built
    }

    fn discard_pending(&self, loser: &Arc<TypeInfo>) {
        let mut pending = self.pending.lock();
        pending.retain(|p| !Arc::ptr_eq(p, loser));
    }

    fn instantiate(
        &self,
        open: &Arc<TypeInfo>,
        args: Vec<ResolvedType>,
        key: &str,
    ) -> Arc<TypeInfo> {
        let mut flags = open.flags();
        flags.remove(TypeInfoFlags::IS_GENERIC_TYPE_DEFINITION);
        flags.insert(TypeInfoFlags::INSTANTIATED_GENERIC);
        if args.iter().any(|a| a.contains_open_generics()) {
            flags.insert(TypeInfoFlags::CONTAINS_OPEN_GENERICS);
        } else {
            flags.remove(TypeInfoFlags::CONTAINS_OPEN_GENERICS);
        }

        let closed = Arc::new(TypeInfo {
            declaring_file_id: open.declaring_file_id,
            declaring_file: open.declaring_file.clone(),
            name: open.name.clone(),
            fully_qualified_name: key.to_string(),
            namespace: open.namespace.clone(),
            type_class: open.type_class,
            modifiers: open.modifiers,
            node: open.node,
            decl_slot: open.decl_slot,
            generic_args: args,
            declared_counts: open.declared_counts,
            generic_source: Some(open.clone()),
            flags: AtomicU8::new(flags.bits()),
            members: OnceLock::new(),
        });

        match open.members() {
            Some(open_members) => {
                let replacements = Self::make_replacements(open, &closed.generic_args);
                let members = self.substitute_members(open_members, &closed, &replacements);
                closed.set_members(members);
            }
            None => self.pending.lock().push(closed.clone()),
        }

        closed
    }

    fn make_replacements(open: &TypeInfo, args: &[ResolvedType]) -> Replacements {
        open.generic_args
            .iter()
            .zip(args.iter())
            .filter_map(|(param, arg)| {
                param
                    .type_info
                    .as_ref()
                    .map(|p| (p.name.clone(), arg.clone()))
            })
            .collect()
    }

    /// Rewrite one type use under the substitution map. Generic parameter
    /// references become their bound argument; constructed types whose
    /// arguments mention a parameter are re-interned with the bound
    /// arguments.
    fn substitute(&self, input: &ResolvedType, replacements: &Replacements) -> ResolvedType {
        let Some(info) = &input.type_info else {
            return input.clone();
        };

        let flags = info.flags();

        if flags.contains(TypeInfoFlags::IS_GENERIC) {
            for (name, replacement) in replacements {
                if *name == info.name {
                    return replacement.clone();
                }
            }
            // a method-level parameter that the type substitution does not
            // bind stays open
            return input.clone();
        }

        if flags.contains(TypeInfoFlags::CONTAINS_OPEN_GENERICS) {
            let source = info
                .generic_source
                .clone()
                .unwrap_or_else(|| info.clone());
            let new_args: Vec<ResolvedType> = info
                .generic_args
                .iter()
                .map(|arg| self.substitute(arg, replacements))
                .collect();
            let mut out = input.clone();
            out.type_info = Some(self.make_generic_type(&source, new_args));
            return out;
        }

        input.clone()
    }

    fn substitute_type_arc(
        &self,
        input: &Arc<TypeInfo>,
        replacements: &Replacements,
    ) -> Arc<TypeInfo> {
        let as_resolved = ResolvedType::from_type(input.clone());
        self.substitute(&as_resolved, replacements)
            .type_info
            .unwrap_or_else(|| input.clone())
    }

    fn substitute_parameters(
        &self,
        parameters: &[ParameterInfo],
        replacements: &Replacements,
    ) -> Vec<ParameterInfo> {
        parameters
            .iter()
            .map(|p| ParameterInfo {
                ty: self.substitute(&p.ty, replacements),
                ..p.clone()
            })
            .collect()
    }

    fn substitute_members(
        &self,
        open_members: &TypeMembers,
        closed: &Arc<TypeInfo>,
        replacements: &Replacements,
    ) -> TypeMembers {
        let base_types = open_members
            .base_types
            .iter()
            .map(|base| self.substitute_type_arc(base, replacements))
            .collect();

        let fields = open_members
            .fields
            .iter()
            .map(|field| {
                Arc::new(FieldInfo {
                    name: field.name.clone(),
                    declaring_type: Arc::downgrade(closed),
                    ty: self.substitute(&field.ty, replacements),
                    modifiers: field.modifiers,
                    node: field.node,
                })
            })
            .collect();

        let properties = open_members
            .properties
            .iter()
            .map(|property| {
                Arc::new(PropertyInfo {
                    name: property.name.clone(),
                    declaring_type: Arc::downgrade(closed),
                    ty: self.substitute(&property.ty, replacements),
                    modifiers: property.modifiers,
                    node: property.node,
                    getter: property.getter,
                    setter: property.setter,
                })
            })
            .collect();

        let indexers = open_members
            .indexers
            .iter()
            .map(|indexer| {
                Arc::new(IndexerInfo {
                    declaring_type: Arc::downgrade(closed),
                    ty: self.substitute(&indexer.ty, replacements),
                    modifiers: indexer.modifiers,
                    parameters: self.substitute_parameters(&indexer.parameters, replacements),
                    node: indexer.node,
                    getter: indexer.getter,
                    setter: indexer.setter,
                })
            })
            .collect();

        let constructors = open_members
            .constructors
            .iter()
            .map(|constructor| {
                Arc::new(ConstructorInfo {
                    name: constructor.name.clone(),
                    declaring_type: Arc::downgrade(closed),
                    parameters: self.substitute_parameters(&constructor.parameters, replacements),
                    modifiers: constructor.modifiers,
                    node: constructor.node,
                })
            })
            .collect();

        // methods in order; prototype links are rebuilt by index so the
        // expanded arity methods point at the new prototype record
        let mut methods: Vec<Arc<MethodInfo>> = Vec::with_capacity(open_members.methods.len());
        for method in &open_members.methods {
            let prototype = method.prototype.as_ref().and_then(|proto| {
                open_members
                    .methods
                    .iter()
                    .position(|m| Arc::ptr_eq(m, proto))
                    .and_then(|idx| methods.get(idx).cloned())
            });
            let mut new_method = MethodInfo::new(
                method.name.clone(),
                Arc::downgrade(closed),
                self.substitute(&method.return_type, replacements),
                method.modifiers,
                self.substitute_parameters(&method.parameters, replacements),
                method.generic_params.clone(),
                method.member_index,
                method.node,
            );
            new_method.prototype = prototype;
            new_method.is_generic_definition = method.is_generic_definition;
            new_method.is_optional_parameter_prototype = method.is_optional_parameter_prototype;
            methods.push(Arc::new(new_method));
        }

        TypeMembers {
            base_types,
            fields,
            properties,
            indexers,
            constructors,
            methods,
        }
    }

    /// Complete instantiations that were requested before their open
    /// definitions had member tables. Runs at the resolve-members phase
    /// boundary, after every declared type has published its members.
    pub fn finalize_pending(&self) {
        loop {
            let work: Vec<Arc<TypeInfo>> = std::mem::take(&mut *self.pending.lock());
            if work.is_empty() {
                return;
            }
            for closed in work {
                if closed.members().is_some() {
                    continue;
                }
                let Some(open) = closed.generic_source.clone() else {
                    closed.set_members(TypeMembers::default());
                    continue;
                };
                match open.members() {
                    Some(open_members) => {
                        let replacements =
                            Self::make_replacements(&open, &closed.generic_args);
                        let members =
                            self.substitute_members(open_members, &closed, &replacements);
                        closed.set_members(members);
                    }
                    None => {
                        // the open type's file failed analysis; keep the
                        // record resolvable with empty tables
                        closed.set_members(TypeMembers::default());
                    }
                }
            }
        }
    }

    /// Drop every cached type whose declaring file is in the changed set.
    /// Runs single-threaded between compile runs.
    pub fn invalidate(&self, changed_files: &FixedBitSet) {
        let mut cache = self.cache.lock();
        cache.retain(|_, value| {
            value.declaring_file_id == NO_FILE
                || value.declaring_file_id as usize >= changed_files.len()
                || !changed_files.contains(value.declaring_file_id as usize)
        });
    }

    pub fn clear(&self) {
        self.cache.lock().clear();
        self.pending.lock().clear();
    }

    /// Re-arm the code-gen gates on cached instantiations between runs.
    pub fn reset_code_gen_flags(&self) {
        for value in self.cache.lock().values() {
            if let Some(members) = value.members() {
                for method in &members.methods {
                    method.reset_code_gen();
                }
            }
        }
    }

    /// Weak-identity probe used by tests: is this exact record still
    /// interned?
    pub fn contains_ptr(&self, type_info: &Arc<TypeInfo>) -> bool {
        self.cache
            .lock()
            .values()
            .any(|v| Arc::ptr_eq(v, type_info))
    }

    pub fn get(&self, key: &str) -> Option<Arc<TypeInfo>> {
        self.cache.lock().get(key).cloned()
    }

    pub fn downgrade_all(&self) -> Vec<Weak<TypeInfo>> {
        self.cache.lock().values().map(Arc::downgrade).collect()
    }
}

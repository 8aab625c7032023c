use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use alchemy_syntax::{Modifiers, RawNodeIndex};
use bitflags::bitflags;
use parking_lot::Mutex;

use crate::file_info::{FileId, FileInfo, NO_FILE};
use crate::member_info::{
    ConstructorInfo, FieldInfo, IndexerInfo, MethodGroup, MethodInfo, PropertyInfo,
};
use crate::resolved_type::ResolvedType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeClass {
    Class,
    Struct,
    Interface,
    Enum,
    Delegate,
    GenericArgument,
}

impl TypeClass {
    pub fn as_str(self) -> &'static str {
        match self {
            TypeClass::Class => "class",
            TypeClass::Struct => "struct",
            TypeClass::Interface => "interface",
            TypeClass::Enum => "enum",
            TypeClass::Delegate => "delegate",
            TypeClass::GenericArgument => "generic argument",
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct TypeInfoFlags: u8 {
        /// A `T`.
        const IS_GENERIC                 = 1 << 0;
        /// A `List<T>` declaration.
        const IS_GENERIC_TYPE_DEFINITION = 1 << 1;
        const CONTAINS_OPEN_GENERICS     = 1 << 2;
        const INSTANTIATED_GENERIC       = 1 << 3;
        const IS_PRIMITIVE               = 1 << 4;
        const REQUIRES_INIT_CONSTRUCTOR  = 1 << 5;
    }
}

/// Namespace tree node. The root's name is the package name; nested types
/// act as namespaces through the `type_info` back-pointer.
#[derive(Debug)]
pub struct NamespaceInfo {
    pub parent: Option<Arc<NamespaceInfo>>,
    pub type_info: Option<Weak<TypeInfo>>,
    pub name: String,
    pub fully_qualified_name: String,
}

impl NamespaceInfo {
    pub fn root(package: &str) -> Arc<NamespaceInfo> {
        Arc::new(NamespaceInfo {
            parent: None,
            type_info: None,
            name: package.to_string(),
            fully_qualified_name: package.to_string(),
        })
    }

    pub fn package_name(&self) -> &str {
        let mut node = self;
        while let Some(parent) = &node.parent {
            node = parent.as_ref();
        }
        &node.name
    }
}

/// Declared member counts collected by the gather phase, including the
/// extra method slots reserved for optional-parameter expansion.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemberCounts {
    pub fields: u16,
    pub properties: u16,
    pub methods: u16,
    pub indexers: u16,
    pub constructors: u16,
}

/// Member tables, published once at the resolve-members phase boundary
/// (or at construction for generic instantiations) and read without locks
/// afterwards. The base list is ordered: class base at index 0 when there
/// is one, implemented interfaces after it.
#[derive(Debug, Default)]
pub struct TypeMembers {
    pub base_types: Vec<Arc<TypeInfo>>,
    pub fields: Vec<Arc<FieldInfo>>,
    pub properties: Vec<Arc<PropertyInfo>>,
    pub indexers: Vec<Arc<IndexerInfo>>,
    pub constructors: Vec<Arc<ConstructorInfo>>,
    pub methods: Vec<Arc<MethodInfo>>,
}

/// Identity record for a declared type, a generic argument, or a cached
/// generic instantiation. Identity is the `Arc`; back-references from
/// members are `Weak` and never owning.
#[derive(Debug)]
pub struct TypeInfo {
    pub declaring_file_id: FileId,
    pub declaring_file: Weak<FileInfo>,
    pub name: String,
    /// `Pkg::Ns::Name` with a backtick-arity suffix for generic
    /// definitions, and the full `<...>` expansion for instantiations.
    pub fully_qualified_name: String,
    pub namespace: Option<Arc<NamespaceInfo>>,
    pub type_class: TypeClass,
    pub modifiers: Modifiers,
    pub node: RawNodeIndex,
    /// Index into the declaring file's declared-type list.
    pub decl_slot: u32,
    /// Generic parameters for definitions, concrete arguments for
    /// instantiations.
    pub generic_args: Vec<ResolvedType>,
    pub declared_counts: MemberCounts,
    /// For instantiations: the open definition this was built from.
    pub generic_source: Option<Arc<TypeInfo>>,
    pub(crate) flags: AtomicU8,
    pub(crate) members: OnceLock<TypeMembers>,
}

impl TypeInfo {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        declaring_file_id: FileId,
        declaring_file: Weak<FileInfo>,
        name: String,
        fully_qualified_name: String,
        namespace: Option<Arc<NamespaceInfo>>,
        type_class: TypeClass,
        modifiers: Modifiers,
        node: RawNodeIndex,
        decl_slot: u32,
        flags: TypeInfoFlags,
    ) -> TypeInfo {
        TypeInfo {
            declaring_file_id,
            declaring_file,
            name,
            fully_qualified_name,
            namespace,
            type_class,
            modifiers,
            node,
            decl_slot,
            generic_args: Vec::new(),
            declared_counts: MemberCounts::default(),
            generic_source: None,
            flags: AtomicU8::new(flags.bits()),
            members: OnceLock::new(),
        }
    }

    /// A generic parameter: carries only a name.
    pub fn generic_argument(name: &str, declaring_file_id: FileId, declaring_file: Weak<FileInfo>) -> TypeInfo {
        let mut info = TypeInfo::new(
            declaring_file_id,
            declaring_file,
            name.to_string(),
            String::new(),
            None,
            TypeClass::GenericArgument,
            Modifiers::empty(),
            RawNodeIndex::NONE,
            0,
            TypeInfoFlags::IS_GENERIC,
        );
        let _ = info.members.set(TypeMembers::default());
        info
    }

    pub fn flags(&self) -> TypeInfoFlags {
        TypeInfoFlags::from_bits_truncate(self.flags.load(Ordering::Acquire))
    }

    pub fn add_flags(&self, flags: TypeInfoFlags) {
        self.flags.fetch_or(flags.bits(), Ordering::AcqRel);
    }

    pub fn set_generic_args(&mut self, args: Vec<ResolvedType>) {
        self.generic_args = args;
    }

    /// Publish the member tables. This happens exactly once per type; a
    /// second publication indicates a phase-ordering bug.
    pub fn set_members(&self, members: TypeMembers) {
        if self.members.set(members).is_err() {
            log::warn!(
                "member tables for `{}` were published twice",
                self.fully_qualified_name
            );
        }
    }

    pub fn members(&self) -> Option<&TypeMembers> {
        self.members.get()
    }

    pub fn generic_argument_count(&self) -> usize {
        self.generic_args.len()
    }

    pub fn is_class(&self) -> bool {
        self.type_class == TypeClass::Class
    }

    pub fn is_struct(&self) -> bool {
        self.type_class == TypeClass::Struct
    }

    pub fn is_enum(&self) -> bool {
        self.type_class == TypeClass::Enum
    }

    pub fn is_reference_type(&self) -> bool {
        matches!(
            self.type_class,
            TypeClass::Class | TypeClass::Interface | TypeClass::Delegate
        )
    }

    pub fn is_generic(&self) -> bool {
        self.flags().contains(TypeInfoFlags::IS_GENERIC)
    }

    pub fn is_generic_definition(&self) -> bool {
        self.flags().contains(TypeInfoFlags::IS_GENERIC_TYPE_DEFINITION)
    }

    pub fn is_primitive(&self) -> bool {
        self.flags().contains(TypeInfoFlags::IS_PRIMITIVE)
    }

    /// Entry-point eligible: an exported, non-generic class.
    pub fn is_exported(&self) -> bool {
        self.type_class == TypeClass::Class
            && self.modifiers.contains(Modifiers::EXPORT)
            && self.generic_args.is_empty()
    }

    pub fn package_name(&self) -> &str {
        match &self.namespace {
            Some(ns) => ns.package_name(),
            None => "",
        }
    }

    pub fn declaring_file_path(&self) -> String {
        self.declaring_file
            .upgrade()
            .map(|f| f.path.display().to_string())
            .unwrap_or_default()
    }

    pub fn base_class(&self) -> Option<Arc<TypeInfo>> {
        let members = self.members()?;
        let first = members.base_types.first()?;
        if first.is_class() {
            Some(first.clone())
        } else {
            None
        }
    }

    /// Walks the class-base chain only.
    pub fn is_subclass_of(&self, other: &Arc<TypeInfo>) -> bool {
        if !self.is_class() {
            return false;
        }
        let mut current = self.base_class();
        while let Some(base) = current {
            if Arc::ptr_eq(&base, other) {
                return true;
            }
            current = base.base_class();
        }
        false
    }

    /// Recursive walk over all bases, interfaces included.
    pub fn implements(&self, interface: &Arc<TypeInfo>) -> bool {
        if std::ptr::eq(self, Arc::as_ptr(interface)) {
            return true;
        }
        let Some(members) = self.members() else {
            return false;
        };
        members
            .base_types
            .iter()
            .any(|base| base.implements(interface))
    }

    pub fn is_assignable_from(dest: &Arc<TypeInfo>, src: &Arc<TypeInfo>) -> bool {
        if Arc::ptr_eq(dest, src) {
            return true;
        }
        if src.is_subclass_of(dest) {
            return true;
        }
        if dest.type_class == TypeClass::Interface {
            return src.implements(dest);
        }
        false
    }

    /// This type or any class base declares an indexer.
    pub fn is_indexable(&self) -> bool {
        if let Some(members) = self.members() {
            if !members.indexers.is_empty() {
                return true;
            }
        }
        if !matches!(self.type_class, TypeClass::Class | TypeClass::Struct) {
            return false;
        }
        let mut current = self.base_class();
        while let Some(base) = current {
            if let Some(members) = base.members() {
                if !members.indexers.is_empty() {
                    return true;
                }
            }
            current = base.base_class();
        }
        false
    }

    pub fn first_indexer(&self) -> Option<Arc<IndexerInfo>> {
        if let Some(members) = self.members() {
            if let Some(indexer) = members.indexers.first() {
                return Some(indexer.clone());
            }
        }
        let mut current = self.base_class();
        while let Some(ty) = current {
            if let Some(members) = ty.members() {
                if let Some(indexer) = members.indexers.first() {
                    return Some(indexer.clone());
                }
            }
            current = ty.base_class();
        }
        None
    }

    /// Linear search in declared members, then recurse into the class base
    /// only; interfaces do not declare fields.
    pub fn try_get_field(&self, name: &str) -> Option<Arc<FieldInfo>> {
        if let Some(members) = self.members() {
            if let Some(field) = members.fields.iter().find(|f| f.name == name) {
                return Some(field.clone());
            }
        }
        let mut current = self.base_class();
        while let Some(ty) = current {
            if let Some(members) = ty.members() {
                if let Some(field) = members.fields.iter().find(|f| f.name == name) {
                    return Some(field.clone());
                }
            }
            current = ty.base_class();
        }
        None
    }

    pub fn try_get_property(&self, name: &str) -> Option<Arc<PropertyInfo>> {
        if let Some(members) = self.members() {
            if let Some(property) = members.properties.iter().find(|p| p.name == name) {
                return Some(property.clone());
            }
        }
        let mut current = self.base_class();
        while let Some(ty) = current {
            if let Some(members) = ty.members() {
                if let Some(property) = members.properties.iter().find(|p| p.name == name) {
                    return Some(property.clone());
                }
            }
            current = ty.base_class();
        }
        None
    }

    pub fn has_any_method_with_name(&self, name: &str) -> bool {
        let matches_here = |ty: &TypeInfo| {
            ty.members()
                .map(|m| {
                    m.methods
                        .iter()
                        .any(|m| !m.is_optional_parameter_prototype && m.name == name)
                })
                .unwrap_or(false)
        };
        if matches_here(self) {
            return true;
        }
        let mut current = self.base_class();
        while let Some(ty) = current {
            if matches_here(&ty) {
                return true;
            }
            current = ty.base_class();
        }
        false
    }

    /// All non-prototype methods with this name, walking class bases only.
    pub fn try_get_method_group(&self, name: &str) -> Option<MethodGroup> {
        let mut methods = Vec::new();
        let collect = |ty: &TypeInfo, methods: &mut Vec<Arc<MethodInfo>>| {
            if let Some(members) = ty.members() {
                for method in &members.methods {
                    if !method.is_optional_parameter_prototype && method.name == name {
                        methods.push(method.clone());
                    }
                }
            }
        };
        collect(self, &mut methods);
        let mut current = self.base_class();
        while let Some(ty) = current {
            collect(&ty, &mut methods);
            current = ty.base_class();
        }
        if methods.is_empty() {
            return None;
        }
        Some(MethodGroup {
            name: name.to_string(),
            methods,
        })
    }

    pub fn try_get_method_group_with_parameter_count(
        &self,
        name: &str,
        parameter_count: usize,
    ) -> Option<MethodGroup> {
        let mut group = self.try_get_method_group(name)?;
        group.methods.retain(|m| m.parameters.len() == parameter_count);
        if group.methods.is_empty() {
            return None;
        }
        Some(group)
    }
}

/// The global fully-qualified-name registry. Accepts concurrent inserts
/// during GatherTypes behind an internal lock; read-only afterwards.
#[derive(Debug, Default)]
pub struct ResolveMap {
    map: Mutex<HashMap<String, Arc<TypeInfo>>>,
}

impl ResolveMap {
    pub fn new() -> ResolveMap {
        ResolveMap::default()
    }

    /// First declaration wins; the existing entry comes back on conflict.
    pub fn try_insert(&self, name: &str, value: Arc<TypeInfo>) -> Result<(), Arc<TypeInfo>> {
        let mut map = self.map.lock();
        if let Some(existing) = map.get(name) {
            return Err(existing.clone());
        }
        map.insert(name.to_string(), value);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<TypeInfo>> {
        self.map.lock().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.map.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.map.lock().clear();
    }
}

/// Synthesized record for a primitive that no source package declared.
pub fn synthesize_builtin(name: &str, fully_qualified_name: &str) -> Arc<TypeInfo> {
    let info = TypeInfo::new(
        NO_FILE,
        Weak::new(),
        name.to_string(),
        fully_qualified_name.to_string(),
        Some(NamespaceInfo::root("System")),
        TypeClass::Struct,
        Modifiers::PUBLIC,
        RawNodeIndex::NONE,
        0,
        TypeInfoFlags::empty(),
    );
    let info = Arc::new(info);
    info.set_members(TypeMembers::default());
    info
}

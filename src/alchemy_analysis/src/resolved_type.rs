use std::hash::{Hash, Hasher};
use std::sync::Arc;

use alchemy_syntax::BuiltInType;
use bitflags::bitflags;

use crate::type_info::{TypeClass, TypeInfo, TypeInfoFlags};

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct ResolvedTypeFlags: u16 {
        const IS_VOID            = 1 << 0;
        const IS_NULLABLE        = 1 << 1;
        const IS_ARRAY           = 1 << 2;
        const IS_NULLABLE_ARRAY  = 1 << 3;
        const IS_ENUM            = 1 << 5;
        const IS_VECTOR          = 1 << 6;
        const IS_NULL_OR_DEFAULT = 1 << 7;
        const IS_METHOD_GROUP    = 1 << 8;
        const IS_VAR             = 1 << 9;
    }
}

/// A use of a type: which `TypeInfo` (if any), which built-in name, plus
/// array/nullable decoration. Equality is componentwise with pointer
/// identity on the `TypeInfo`; hashing is stable within one process.
#[derive(Debug, Clone, Default)]
pub struct ResolvedType {
    pub type_info: Option<Arc<TypeInfo>>,
    pub built_in: BuiltInType,
    pub array_rank: u8,
    pub flags: ResolvedTypeFlags,
}

impl PartialEq for ResolvedType {
    fn eq(&self, other: &Self) -> bool {
        let same_info = match (&self.type_info, &other.type_info) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        same_info
            && self.built_in == other.built_in
            && self.array_rank == other.array_rank
            && self.flags == other.flags
    }
}

impl Eq for ResolvedType {}

impl Hash for ResolvedType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.type_info {
            Some(info) => (Arc::as_ptr(info) as usize).hash(state),
            None => 0usize.hash(state),
        }
        self.built_in.hash(state);
        self.array_rank.hash(state);
        self.flags.hash(state);
    }
}

impl ResolvedType {
    pub fn from_type(type_info: Arc<TypeInfo>) -> ResolvedType {
        let mut flags = ResolvedTypeFlags::empty();
        if type_info.type_class == TypeClass::Enum {
            flags |= ResolvedTypeFlags::IS_ENUM;
        }
        ResolvedType {
            type_info: Some(type_info),
            built_in: BuiltInType::Invalid,
            array_rank: 0,
            flags,
        }
    }

    pub fn void() -> ResolvedType {
        ResolvedType {
            flags: ResolvedTypeFlags::IS_VOID,
            built_in: BuiltInType::Void,
            ..ResolvedType::default()
        }
    }

    /// Typeless `null`/`default`; usage is validated later, and the type
    /// may be bound by a target type at the use site.
    pub fn null() -> ResolvedType {
        ResolvedType {
            flags: ResolvedTypeFlags::IS_NULL_OR_DEFAULT,
            ..ResolvedType::default()
        }
    }

    pub fn var() -> ResolvedType {
        ResolvedType {
            flags: ResolvedTypeFlags::IS_VAR,
            ..ResolvedType::default()
        }
    }

    pub fn method_group() -> ResolvedType {
        ResolvedType {
            flags: ResolvedTypeFlags::IS_METHOD_GROUP,
            ..ResolvedType::default()
        }
    }

    pub fn make_nullable(&self) -> ResolvedType {
        let mut out = self.clone();
        if out.is_array() {
            out.flags |= ResolvedTypeFlags::IS_NULLABLE_ARRAY;
        } else {
            out.flags |= ResolvedTypeFlags::IS_NULLABLE;
        }
        out
    }

    pub fn to_non_nullable(&self) -> ResolvedType {
        let mut out = self.clone();
        if out.is_array() {
            out.flags &= !ResolvedTypeFlags::IS_NULLABLE_ARRAY;
        } else {
            out.flags &= !ResolvedTypeFlags::IS_NULLABLE;
        }
        out
    }

    pub fn is_void(&self) -> bool {
        self.flags.contains(ResolvedTypeFlags::IS_VOID)
    }

    pub fn is_nullable(&self) -> bool {
        self.flags.contains(ResolvedTypeFlags::IS_NULLABLE)
    }

    pub fn is_nullable_array(&self) -> bool {
        self.flags.contains(ResolvedTypeFlags::IS_NULLABLE_ARRAY)
    }

    pub fn is_array(&self) -> bool {
        self.array_rank > 0
    }

    pub fn is_enum(&self) -> bool {
        self.flags.contains(ResolvedTypeFlags::IS_ENUM)
    }

    pub fn is_var(&self) -> bool {
        self.flags.contains(ResolvedTypeFlags::IS_VAR)
    }

    pub fn is_null_or_default(&self) -> bool {
        self.flags.contains(ResolvedTypeFlags::IS_NULL_OR_DEFAULT)
    }

    pub fn is_method_group(&self) -> bool {
        self.flags.contains(ResolvedTypeFlags::IS_METHOD_GROUP)
    }

    pub fn is_resolved(&self) -> bool {
        self.type_info.is_some() || self.is_void()
    }

    fn is_plain(&self) -> bool {
        self.array_rank == 0
            && (self.flags & !ResolvedTypeFlags::IS_VECTOR) == ResolvedTypeFlags::empty()
    }

    pub fn is_bool(&self) -> bool {
        self.is_plain() && self.built_in == BuiltInType::Bool
    }

    pub fn is_integer(&self) -> bool {
        self.is_plain()
            && matches!(
                self.built_in,
                BuiltInType::Int8
                    | BuiltInType::Int16
                    | BuiltInType::Int32
                    | BuiltInType::Int64
                    | BuiltInType::UInt8
                    | BuiltInType::UInt16
                    | BuiltInType::UInt32
                    | BuiltInType::UInt64
            )
    }

    pub fn is_unsigned_integer(&self) -> bool {
        self.is_plain()
            && matches!(
                self.built_in,
                BuiltInType::UInt8 | BuiltInType::UInt16 | BuiltInType::UInt32 | BuiltInType::UInt64
            )
    }

    pub fn is_floating_point(&self) -> bool {
        self.is_plain() && matches!(self.built_in, BuiltInType::Float | BuiltInType::Double)
    }

    pub fn is_arithmetic(&self) -> bool {
        self.is_integer() || self.is_floating_point()
    }

    pub fn is_vector(&self) -> bool {
        self.is_plain() && self.built_in.is_vector()
    }

    pub fn is_char(&self) -> bool {
        self.is_plain() && self.built_in == BuiltInType::Char
    }

    pub fn is_primitive(&self) -> bool {
        self.is_void()
            || (!self.is_nullable() && !self.is_array() && self.built_in.is_primitive())
    }

    pub fn is_reference_type(&self) -> bool {
        match self.built_in {
            BuiltInType::Dynamic | BuiltInType::String | BuiltInType::Object => true,
            _ => {
                self.is_array()
                    || self
                        .type_info
                        .as_ref()
                        .map(|t| t.is_reference_type())
                        .unwrap_or(false)
            }
        }
    }

    pub fn is_value_type(&self) -> bool {
        !self.is_array()
            && self
                .type_info
                .as_ref()
                .map(|t| matches!(t.type_class, TypeClass::Enum | TypeClass::Struct))
                .unwrap_or(self.built_in.is_primitive() || self.built_in.is_vector())
    }

    pub fn is_interface(&self) -> bool {
        self.type_info
            .as_ref()
            .map(|t| t.type_class == TypeClass::Interface)
            .unwrap_or(false)
    }

    pub fn is_callable(&self) -> bool {
        self.is_method_group()
            || self
                .type_info
                .as_ref()
                .map(|t| t.type_class == TypeClass::Delegate)
                .unwrap_or(false)
    }

    pub fn is_indexable(&self) -> bool {
        self.is_array()
            || self
                .type_info
                .as_ref()
                .map(|t| t.is_indexable())
                .unwrap_or(false)
    }

    /// Does this type mention an unbound generic parameter anywhere?
    pub fn contains_open_generics(&self) -> bool {
        match &self.type_info {
            Some(info) => {
                let flags = info.flags();
                flags.contains(TypeInfoFlags::IS_GENERIC)
                    || flags.contains(TypeInfoFlags::CONTAINS_OPEN_GENERICS)
                    || flags.contains(TypeInfoFlags::IS_GENERIC_TYPE_DEFINITION)
            }
            None => false,
        }
    }

    /// Element type of an array use.
    pub fn element_type(&self) -> ResolvedType {
        let mut out = self.clone();
        if out.array_rank > 0 {
            out.array_rank -= 1;
        }
        out.flags &= !(ResolvedTypeFlags::IS_ARRAY | ResolvedTypeFlags::IS_NULLABLE_ARRAY);
        out
    }

    /// Reference-assignability walk: identity, subclass, or interface
    /// implementation. Conversions are handled by the conversion ladder.
    pub fn is_assignable_from(&self, other: &ResolvedType) -> bool {
        if self.is_var() || self == other {
            return true;
        }
        if self.is_void() || other.is_void() {
            return false;
        }
        if self.is_array() != other.is_array() {
            return false;
        }
        match (&self.type_info, &other.type_info) {
            (Some(dest), Some(src)) => TypeInfo::is_assignable_from(dest, src),
            _ => false,
        }
    }

    /// Canonical display form: `Pkg::List`1<int>?[]` and friends. Used as
    /// the generic-cache key component and in diagnostics.
    pub fn write_display(&self, out: &mut String) {
        match &self.type_info {
            Some(info) => {
                out.push_str(&info.fully_qualified_name);
                // instantiated generics already carry the argument list in
                // their fully-qualified name
                if !info.flags().contains(TypeInfoFlags::INSTANTIATED_GENERIC)
                    && info.flags().contains(TypeInfoFlags::IS_GENERIC_TYPE_DEFINITION)
                {
                    out.push('<');
                    for (i, arg) in info.generic_args.iter().enumerate() {
                        if i != 0 {
                            out.push(',');
                        }
                        arg.write_display(out);
                    }
                    out.push('>');
                }
                if info.fully_qualified_name.is_empty() {
                    out.push_str(&info.name);
                }
            }
            None => out.push_str(self.built_in.as_str()),
        }
        if self.is_nullable() {
            out.push('?');
        }
        if self.is_array() {
            out.push_str("[]");
        }
        if self.is_nullable_array() {
            out.push('?');
        }
    }

    pub fn display_string(&self) -> String {
        let mut out = String::new();
        self.write_display(&mut out);
        out
    }
}

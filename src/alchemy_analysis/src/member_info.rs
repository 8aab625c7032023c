use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use alchemy_syntax::{Modifiers, PassBy, RawNodeIndex, StorageClass};

use crate::resolved_type::ResolvedType;
use crate::type_info::TypeInfo;

#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub name: String,
    pub declaring_type: Weak<TypeInfo>,
    pub ty: ResolvedType,
    pub modifiers: Modifiers,
    pub node: RawNodeIndex,
}

impl FieldInfo {
    pub fn is_static(&self) -> bool {
        self.modifiers.contains(Modifiers::STATIC)
    }

    pub fn is_const(&self) -> bool {
        self.modifiers.contains(Modifiers::CONST)
    }
}

#[derive(Debug, Clone)]
pub struct PropertyInfo {
    pub name: String,
    pub declaring_type: Weak<TypeInfo>,
    pub ty: ResolvedType,
    pub modifiers: Modifiers,
    pub node: RawNodeIndex,
    pub getter: RawNodeIndex,
    pub setter: RawNodeIndex,
}

impl PropertyInfo {
    pub fn is_static(&self) -> bool {
        self.modifiers.contains(Modifiers::STATIC)
    }

    pub fn is_readable(&self) -> bool {
        self.getter.is_valid()
    }

    pub fn is_writable(&self) -> bool {
        self.setter.is_valid()
    }

    /// Every property is currently backed by a field slot.
    pub fn is_backed(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone)]
pub struct IndexerInfo {
    pub declaring_type: Weak<TypeInfo>,
    pub ty: ResolvedType,
    pub modifiers: Modifiers,
    pub parameters: Vec<ParameterInfo>,
    pub node: RawNodeIndex,
    pub getter: RawNodeIndex,
    pub setter: RawNodeIndex,
}

impl IndexerInfo {
    pub fn is_readable(&self) -> bool {
        self.getter.is_valid()
    }
}

#[derive(Debug, Clone)]
pub struct ParameterInfo {
    pub name: String,
    pub ty: ResolvedType,
    pub storage: StorageClass,
    pub pass_by: PassBy,
    pub has_default_value: bool,
    pub node: RawNodeIndex,
}

#[derive(Debug, Clone)]
pub struct ConstructorInfo {
    pub name: String,
    pub declaring_type: Weak<TypeInfo>,
    pub parameters: Vec<ParameterInfo>,
    pub modifiers: Modifiers,
    pub node: RawNodeIndex,
}

#[derive(Debug)]
pub struct MethodInfo {
    pub name: String,
    pub declaring_type: Weak<TypeInfo>,
    pub return_type: ResolvedType,
    pub modifiers: Modifiers,
    pub parameters: Vec<ParameterInfo>,
    pub generic_params: Vec<Arc<TypeInfo>>,
    /// For an optional-parameter expansion: the original declaration.
    pub prototype: Option<Arc<MethodInfo>>,
    pub is_generic_definition: bool,
    /// The original declaration of a method with optional parameters. It
    /// is never the target of a call; the expanded per-arity methods are.
    pub is_optional_parameter_prototype: bool,
    /// Index into the declaring type's method table.
    pub member_index: u32,
    pub node: RawNodeIndex,
    has_code_gen: AtomicBool,
}

impl MethodInfo {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: String,
        declaring_type: Weak<TypeInfo>,
        return_type: ResolvedType,
        modifiers: Modifiers,
        parameters: Vec<ParameterInfo>,
        generic_params: Vec<Arc<TypeInfo>>,
        member_index: u32,
        node: RawNodeIndex,
    ) -> MethodInfo {
        MethodInfo {
            name,
            declaring_type,
            return_type,
            modifiers,
            parameters,
            generic_params,
            prototype: None,
            is_generic_definition: false,
            is_optional_parameter_prototype: false,
            member_index,
            node,
            has_code_gen: AtomicBool::new(false),
        }
    }

    pub fn is_static(&self) -> bool {
        self.modifiers.contains(Modifiers::STATIC)
    }

    pub fn is_generic(&self) -> bool {
        !self.generic_params.is_empty()
    }

    pub fn has_code_gen(&self) -> bool {
        self.has_code_gen.load(Ordering::Acquire)
    }

    /// Single-fire gate into code generation. Exactly one caller ever wins
    /// the compare-exchange; only the winner schedules the visit job.
    pub fn try_begin_code_gen(&self) -> bool {
        self.has_code_gen
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Re-arm the gate between compile runs; records that survive a run
    /// unchanged must be schedulable again on the next one.
    pub(crate) fn reset_code_gen(&self) {
        self.has_code_gen.store(false, Ordering::Release);
    }
}

/// All methods that share a name on a type (and its class bases).
#[derive(Debug, Clone)]
pub struct MethodGroup {
    pub name: String,
    pub methods: Vec<Arc<MethodInfo>>,
}

use std::sync::Arc;

use alchemy_syntax::BuiltInType;

use crate::member_info::MethodInfo;
use crate::resolved_type::ResolvedType;
use crate::type_info::TypeInfoFlags;

/// Points awarded per parameter by the overload-resolution ladder.
pub const POINTS_IDENTICAL: i32 = 100;
pub const POINTS_NULLABLE_LIFT: i32 = 50;
pub const POINTS_IDENTITY_PRIMITIVE: i32 = 50;
pub const POINTS_REFERENCE: i32 = 20;
pub const POINTS_USER_CONVERSION: i32 = 10;
pub const POINTS_NUMERIC_WIDENING: i32 = 5;

/// How to rewrite an argument once a candidate wins.
#[derive(Debug, Clone, Default)]
pub struct ParameterConversion {
    pub requires_conversion: bool,
    pub convert_to: ResolvedType,
    pub user_conversion: Option<Arc<MethodInfo>>,
}

/// Implicit numeric widening: sources widen along
/// `i8 < i16 < i32 < i64 < f32 < f64` and `u8 < u16 < u32 < u64 < f32 <
/// f64`, with the cross-signedness steps `u8 -> i16`, `u16 -> i32`,
/// `u32 -> i64`. No narrowing, no signed/unsigned at equal rank.
pub fn is_implicit_numeric_widening(source: BuiltInType, dest: BuiltInType) -> bool {
    use BuiltInType::*;
    match source {
        Int8 => matches!(dest, Int16 | Int32 | Int64 | Float | Double),
        Int16 => matches!(dest, Int32 | Int64 | Float | Double),
        Int32 => matches!(dest, Int64 | Float | Double),
        Int64 => matches!(dest, Float | Double),
        UInt8 => matches!(
            dest,
            UInt16 | UInt32 | UInt64 | Int16 | Int32 | Int64 | Float | Double
        ),
        UInt16 => matches!(dest, UInt32 | UInt64 | Int32 | Int64 | Float | Double),
        UInt32 => matches!(dest, UInt64 | Int64 | Float | Double),
        UInt64 => matches!(dest, Float | Double),
        Char => matches!(dest, UInt16 | Int32 | UInt32 | Int64 | UInt64 | Float | Double),
        Float => dest == Double,
        _ => false,
    }
}

/// Types that participate in identity-primitive conversions.
fn is_convertible(ty: &ResolvedType) -> bool {
    if ty.is_enum() {
        return true;
    }
    matches!(
        ty.built_in,
        BuiltInType::Bool
            | BuiltInType::Char
            | BuiltInType::Int8
            | BuiltInType::Int16
            | BuiltInType::Int32
            | BuiltInType::Int64
            | BuiltInType::UInt8
            | BuiltInType::UInt16
            | BuiltInType::UInt32
            | BuiltInType::UInt64
            | BuiltInType::Float
            | BuiltInType::Double
    )
}

pub fn has_identity_primitive_or_nullable_conversion(
    source: &ResolvedType,
    dest: &ResolvedType,
) -> bool {
    if source == dest {
        return true;
    }
    if source.is_nullable() && *dest == source.to_non_nullable() {
        return true;
    }
    if dest.is_nullable() && *source == dest.to_non_nullable() {
        return true;
    }
    is_convertible(source)
        && is_convertible(dest)
        && dest.to_non_nullable().built_in != BuiltInType::Bool
}

pub fn are_reference_assignable(dest: &ResolvedType, source: &ResolvedType) -> bool {
    if dest == source {
        return true;
    }
    !dest.is_value_type() && !source.is_value_type() && dest.is_assignable_from(source)
}

/// Reference equality is allowed when both operands are reference-typed,
/// or when at least one side is an interface.
pub fn has_reference_equality(left: &ResolvedType, right: &ResolvedType) -> bool {
    if left.is_value_type() || right.is_value_type() {
        return false;
    }
    left.is_interface()
        || right.is_interface()
        || are_reference_assignable(left, right)
        || are_reference_assignable(right, left)
}

pub fn has_reference_conversion(source: &ResolvedType, dest: &ResolvedType) -> bool {
    if source.is_void() || dest.is_void() {
        return false;
    }
    if !source.is_reference_type() && !dest.is_reference_type() && !source.is_interface() {
        return false;
    }
    let non_nullable_source = source.to_non_nullable();
    let non_nullable_dest = dest.to_non_nullable();
    non_nullable_source.is_assignable_from(&non_nullable_dest)
        || non_nullable_dest.is_assignable_from(&non_nullable_source)
        || source.is_interface()
        || dest.is_interface()
        || source.built_in == BuiltInType::Object
        || dest.built_in == BuiltInType::Object
}

/// User-defined conversion operators are not declared by the language
/// yet; the ladder slot exists so scoring stays stable when they are.
fn try_get_user_defined_conversion(
    _source: &ResolvedType,
    _dest: &ResolvedType,
) -> Option<Arc<MethodInfo>> {
    None
}

/// Score one argument-to-parameter conversion. `None` means the argument
/// cannot convert and the candidate fails.
pub fn try_convert_scored(
    source: &ResolvedType,
    target: &ResolvedType,
) -> Option<(i32, ParameterConversion)> {
    if target == source {
        return Some((POINTS_IDENTICAL, ParameterConversion::default()));
    }

    // `null`/`default` literals adopt any nullable or reference target
    if source.is_null_or_default() && (target.is_nullable() || target.is_reference_type()) {
        return Some((
            POINTS_NULLABLE_LIFT,
            ParameterConversion {
                requires_conversion: true,
                convert_to: target.clone(),
                user_conversion: None,
            },
        ));
    }

    if target.is_nullable() && !source.is_nullable() && target.to_non_nullable() == *source {
        return Some((
            POINTS_NULLABLE_LIFT,
            ParameterConversion {
                requires_conversion: true,
                convert_to: target.clone(),
                user_conversion: None,
            },
        ));
    }

    // a generic parameter target requires an exact match, no conversions
    if let Some(info) = &target.type_info {
        if info.flags().contains(TypeInfoFlags::IS_GENERIC) {
            return None;
        }
    }

    if has_identity_primitive_or_nullable_conversion(source, target) {
        return Some((
            POINTS_IDENTITY_PRIMITIVE,
            ParameterConversion {
                requires_conversion: true,
                convert_to: target.clone(),
                user_conversion: None,
            },
        ));
    }

    if has_reference_conversion(source, target) {
        return Some((
            POINTS_REFERENCE,
            ParameterConversion {
                requires_conversion: true,
                convert_to: target.clone(),
                user_conversion: None,
            },
        ));
    }

    if let Some(user) = try_get_user_defined_conversion(source, target) {
        return Some((
            POINTS_USER_CONVERSION,
            ParameterConversion {
                requires_conversion: true,
                convert_to: target.clone(),
                user_conversion: Some(user),
            },
        ));
    }

    if source.is_arithmetic()
        && target.is_arithmetic()
        && is_implicit_numeric_widening(source.built_in, target.built_in)
    {
        return Some((
            POINTS_NUMERIC_WIDENING,
            ParameterConversion {
                requires_conversion: true,
                convert_to: target.clone(),
                user_conversion: None,
            },
        ));
    }

    None
}

/// Preference ladder for binary-operand promotion, most preferred first.
pub const PROMOTION_LADDER: [BuiltInType; 10] = [
    BuiltInType::Double,
    BuiltInType::Float,
    BuiltInType::UInt64,
    BuiltInType::Int64,
    BuiltInType::UInt32,
    BuiltInType::Int32,
    BuiltInType::UInt16,
    BuiltInType::Int16,
    BuiltInType::UInt8,
    BuiltInType::Int8,
];

/// The common type two numeric operands promote to, walking the ladder
/// from `double` downward.
pub fn promoted_type(left: BuiltInType, right: BuiltInType) -> Option<BuiltInType> {
    PROMOTION_LADDER
        .iter()
        .copied()
        .find(|&candidate| left == candidate || right == candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::BuiltIns;

    #[test]
    fn widening_has_no_narrowing_edges() {
        assert!(is_implicit_numeric_widening(BuiltInType::Int8, BuiltInType::Int32));
        assert!(is_implicit_numeric_widening(BuiltInType::UInt8, BuiltInType::Int16));
        assert!(is_implicit_numeric_widening(BuiltInType::UInt32, BuiltInType::Int64));
        assert!(!is_implicit_numeric_widening(BuiltInType::Int32, BuiltInType::Int16));
        assert!(!is_implicit_numeric_widening(BuiltInType::Int32, BuiltInType::UInt32));
        assert!(!is_implicit_numeric_widening(BuiltInType::UInt32, BuiltInType::Int32));
        assert!(is_implicit_numeric_widening(BuiltInType::Float, BuiltInType::Double));
        assert!(!is_implicit_numeric_widening(BuiltInType::Double, BuiltInType::Float));
    }

    #[test]
    fn identical_match_beats_widening() {
        let builtins = BuiltIns::for_tests();
        let int32 = builtins.resolved(BuiltInType::Int32);
        let int64 = builtins.resolved(BuiltInType::Int64);

        let (identical, conv) = try_convert_scored(&int32, &int32).expect("identical converts");
        assert_eq!(identical, POINTS_IDENTICAL);
        assert!(!conv.requires_conversion);

        let (widened, conv) = try_convert_scored(&int32, &int64).expect("widening converts");
        assert_eq!(widened, POINTS_NUMERIC_WIDENING);
        assert!(conv.requires_conversion);
        assert!(identical > widened);
    }

    #[test]
    fn nullable_lift_scores_fifty() {
        let builtins = BuiltIns::for_tests();
        let int32 = builtins.resolved(BuiltInType::Int32);
        let nullable_int32 = int32.make_nullable();

        let (points, conv) =
            try_convert_scored(&int32, &nullable_int32).expect("lift converts");
        assert_eq!(points, POINTS_NULLABLE_LIFT);
        assert_eq!(conv.convert_to, nullable_int32);
    }

    #[test]
    fn promotion_prefers_the_wider_operand() {
        assert_eq!(
            promoted_type(BuiltInType::Int32, BuiltInType::Double),
            Some(BuiltInType::Double)
        );
        assert_eq!(
            promoted_type(BuiltInType::Int16, BuiltInType::Int32),
            Some(BuiltInType::Int32)
        );
        assert_eq!(
            promoted_type(BuiltInType::UInt64, BuiltInType::Int64),
            Some(BuiltInType::UInt64)
        );
    }
}

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Declaration modifiers as written in source.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct Modifiers: u16 {
        const STATIC    = 1 << 0;
        const SEALED    = 1 << 1;
        const ABSTRACT  = 1 << 2;
        const READONLY  = 1 << 3;
        const VIRTUAL   = 1 << 4;
        const OVERRIDE  = 1 << 5;
        const PUBLIC    = 1 << 6;
        const PRIVATE   = 1 << 7;
        const PROTECTED = 1 << 8;
        const INTERNAL  = 1 << 9;
        const REF       = 1 << 10;
        const EXPORT    = 1 << 11;
        const CONST     = 1 << 12;
    }
}

impl Modifiers {
    pub const VISIBILITY_MASK: Modifiers = Modifiers::PUBLIC
        .union(Modifiers::PRIVATE)
        .union(Modifiers::EXPORT)
        .union(Modifiers::INTERNAL)
        .union(Modifiers::PROTECTED);
}

/// Storage class of a parameter or local.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageClass {
    #[default]
    Default,
    Scoped,
    Temp,
}

/// Pass-by modifier on arguments and parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PassBy {
    #[default]
    None,
    Ref,
    Out,
}

/// Built-in type names the lexer recognizes as keywords.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuiltInType {
    #[default]
    Invalid,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float,
    Double,
    Bool,
    Char,
    String,
    Object,
    Dynamic,
    Int2,
    Int3,
    Int4,
    UInt2,
    UInt3,
    UInt4,
    Float2,
    Float3,
    Float4,
    Color,
    Color32,
    Color64,
    Void,
}

pub const BUILT_IN_TYPE_COUNT: usize = BuiltInType::Void as usize + 1;

impl BuiltInType {
    /// Source-level spelling, used when printing resolved types.
    pub fn as_str(self) -> &'static str {
        match self {
            BuiltInType::Invalid => "",
            BuiltInType::Int8 => "sbyte",
            BuiltInType::Int16 => "short",
            BuiltInType::Int32 => "int",
            BuiltInType::Int64 => "long",
            BuiltInType::UInt8 => "byte",
            BuiltInType::UInt16 => "ushort",
            BuiltInType::UInt32 => "uint",
            BuiltInType::UInt64 => "ulong",
            BuiltInType::Float => "float",
            BuiltInType::Double => "double",
            BuiltInType::Bool => "bool",
            BuiltInType::Char => "char",
            BuiltInType::String => "string",
            BuiltInType::Object => "object",
            BuiltInType::Dynamic => "dynamic",
            BuiltInType::Int2 => "int2",
            BuiltInType::Int3 => "int3",
            BuiltInType::Int4 => "int4",
            BuiltInType::UInt2 => "uint2",
            BuiltInType::UInt3 => "uint3",
            BuiltInType::UInt4 => "uint4",
            BuiltInType::Float2 => "float2",
            BuiltInType::Float3 => "float3",
            BuiltInType::Float4 => "float4",
            BuiltInType::Color => "color",
            BuiltInType::Color32 => "color32",
            BuiltInType::Color64 => "color64",
            BuiltInType::Void => "void",
        }
    }

    /// Fully-qualified name under the `System` package.
    pub fn fully_qualified_name(self) -> &'static str {
        match self {
            BuiltInType::Invalid => "",
            BuiltInType::Int8 => "System::Int8",
            BuiltInType::Int16 => "System::Int16",
            BuiltInType::Int32 => "System::Int32",
            BuiltInType::Int64 => "System::Int64",
            BuiltInType::UInt8 => "System::UInt8",
            BuiltInType::UInt16 => "System::UInt16",
            BuiltInType::UInt32 => "System::UInt32",
            BuiltInType::UInt64 => "System::UInt64",
            BuiltInType::Float => "System::Float",
            BuiltInType::Double => "System::Double",
            BuiltInType::Bool => "System::Bool",
            BuiltInType::Char => "System::Char",
            BuiltInType::String => "System::String",
            BuiltInType::Object => "System::Object",
            BuiltInType::Dynamic => "System::Dynamic",
            BuiltInType::Int2 => "System::Int2",
            BuiltInType::Int3 => "System::Int3",
            BuiltInType::Int4 => "System::Int4",
            BuiltInType::UInt2 => "System::UInt2",
            BuiltInType::UInt3 => "System::UInt3",
            BuiltInType::UInt4 => "System::UInt4",
            BuiltInType::Float2 => "System::Float2",
            BuiltInType::Float3 => "System::Float3",
            BuiltInType::Float4 => "System::Float4",
            BuiltInType::Color => "System::Color",
            BuiltInType::Color32 => "System::Color32",
            BuiltInType::Color64 => "System::Color64",
            BuiltInType::Void => "System::Void",
        }
    }

    pub fn is_primitive(self) -> bool {
        matches!(
            self,
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

    pub fn is_vector(self) -> bool {
        matches!(
            self,
            BuiltInType::Int2
                | BuiltInType::Int3
                | BuiltInType::Int4
                | BuiltInType::UInt2
                | BuiltInType::UInt3
                | BuiltInType::UInt4
                | BuiltInType::Float2
                | BuiltInType::Float3
                | BuiltInType::Float4
                | BuiltInType::Color
        )
    }

    pub fn all() -> impl Iterator<Item = BuiltInType> {
        const ALL: [BuiltInType; BUILT_IN_TYPE_COUNT - 1] = [
            BuiltInType::Int8,
            BuiltInType::Int16,
            BuiltInType::Int32,
            BuiltInType::Int64,
            BuiltInType::UInt8,
            BuiltInType::UInt16,
            BuiltInType::UInt32,
            BuiltInType::UInt64,
            BuiltInType::Float,
            BuiltInType::Double,
            BuiltInType::Bool,
            BuiltInType::Char,
            BuiltInType::String,
            BuiltInType::Object,
            BuiltInType::Dynamic,
            BuiltInType::Int2,
            BuiltInType::Int3,
            BuiltInType::Int4,
            BuiltInType::UInt2,
            BuiltInType::UInt3,
            BuiltInType::UInt4,
            BuiltInType::Float2,
            BuiltInType::Float3,
            BuiltInType::Float4,
            BuiltInType::Color,
            BuiltInType::Color32,
            BuiltInType::Color64,
            BuiltInType::Void,
        ];
        ALL.into_iter()
    }
}

/// Literal payloads. The lexer has already decided the numeric type from
/// the literal's suffix and shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LiteralData {
    Null,
    Default,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    UInt32(u32),
    UInt64(u64),
    Float(f32),
    Double(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    ConditionalOr,
    ConditionalAnd,
    BitwiseOr,
    BitwiseXor,
    BitwiseAnd,
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    LessThanOrEqual,
    GreaterThanOrEqual,
    ShiftLeft,
    ShiftRight,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
    Not,
    BitwiseNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentOp {
    Assign,
}

//! Native Type System
//!
//! Semantic types, signatures and call configuration shared by the
//! trampoline generator and the binding registry.

use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;

use crate::error::{CalliError, CalliResult};
use crate::trampoline::NativeArgs;

/// Largest parameter count a trampoline can forward.
pub const MAX_ARITY: usize = 8;

/// Semantic types supported for parameters and return values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// No value (return position only)
    Void,
    /// C `_Bool`
    Bool,
    /// 8-bit signed integer
    I8,
    /// 16-bit signed integer
    I16,
    /// 32-bit signed integer
    I32,
    /// 64-bit signed integer
    I64,
    /// 8-bit unsigned integer
    U8,
    /// 16-bit unsigned integer
    U16,
    /// 32-bit unsigned integer
    U32,
    /// 64-bit unsigned integer
    U64,
    /// Pointer-sized signed integer
    ISize,
    /// Pointer-sized unsigned integer
    USize,
    /// 32-bit floating point
    F32,
    /// 64-bit floating point
    F64,
    /// Raw pointer
    Ptr,
}

impl ValueKind {
    /// Size in bytes of this type on the current target
    pub fn size(&self) -> usize {
        match self {
            ValueKind::Void => 0,
            ValueKind::Bool | ValueKind::I8 | ValueKind::U8 => 1,
            ValueKind::I16 | ValueKind::U16 => 2,
            ValueKind::I32 | ValueKind::U32 | ValueKind::F32 => 4,
            ValueKind::I64 | ValueKind::U64 | ValueKind::F64 => 8,
            ValueKind::ISize | ValueKind::USize | ValueKind::Ptr => std::mem::size_of::<usize>(),
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            ValueKind::I8
                | ValueKind::I16
                | ValueKind::I32
                | ValueKind::I64
                | ValueKind::U8
                | ValueKind::U16
                | ValueKind::U32
                | ValueKind::U64
                | ValueKind::ISize
                | ValueKind::USize
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, ValueKind::F32 | ValueKind::F64)
    }
}

/// Accepts the Rust names and common C spellings, case-insensitively
impl FromStr for ValueKind {
    type Err = CalliError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s.trim().to_lowercase().as_str() {
            "void" | "()" => ValueKind::Void,
            "bool" | "_bool" => ValueKind::Bool,
            "i8" | "int8" | "int8_t" | "char" => ValueKind::I8,
            "i16" | "int16" | "int16_t" | "short" => ValueKind::I16,
            "i32" | "int32" | "int32_t" | "int" => ValueKind::I32,
            "i64" | "int64" | "int64_t" | "long long" => ValueKind::I64,
            "u8" | "uint8" | "uint8_t" | "byte" => ValueKind::U8,
            "u16" | "uint16" | "uint16_t" => ValueKind::U16,
            "u32" | "uint32" | "uint32_t" | "unsigned" => ValueKind::U32,
            "u64" | "uint64" | "uint64_t" => ValueKind::U64,
            "isize" | "intptr_t" | "ssize_t" => ValueKind::ISize,
            "usize" | "uintptr_t" | "size_t" => ValueKind::USize,
            "f32" | "float" => ValueKind::F32,
            "f64" | "double" => ValueKind::F64,
            "ptr" | "pointer" | "void*" => ValueKind::Ptr,
            _ => {
                return Err(CalliError::InvalidSignature(format!("unknown type `{}`", s.trim())))
            }
        };
        Ok(kind)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Void => "void",
            ValueKind::Bool => "bool",
            ValueKind::I8 => "i8",
            ValueKind::I16 => "i16",
            ValueKind::I32 => "i32",
            ValueKind::I64 => "i64",
            ValueKind::U8 => "u8",
            ValueKind::U16 => "u16",
            ValueKind::U32 => "u32",
            ValueKind::U64 => "u64",
            ValueKind::ISize => "isize",
            ValueKind::USize => "usize",
            ValueKind::F32 => "f32",
            ValueKind::F64 => "f64",
            ValueKind::Ptr => "ptr",
        };
        f.write_str(name)
    }
}

/// A Rust type that can cross the native boundary as a parameter.
///
/// Implemented for the primitive integer and float types, `bool` and raw
/// pointers. Structs, strings and arrays are not supported.
pub trait NativeValue: Copy + 'static {
    const KIND: ValueKind;
}

/// A Rust type that can be returned from a native call.
pub trait NativeReturn: 'static {
    const KIND: ValueKind;
}

impl NativeReturn for () {
    const KIND: ValueKind = ValueKind::Void;
}

macro_rules! native_value {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl NativeValue for $ty {
                const KIND: ValueKind = ValueKind::$kind;
            }

            impl NativeReturn for $ty {
                const KIND: ValueKind = ValueKind::$kind;
            }
        )*
    };
}

native_value! {
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    isize => ISize,
    usize => USize,
    f32 => F32,
    f64 => F64,
}

impl<T: 'static> NativeValue for *const T {
    const KIND: ValueKind = ValueKind::Ptr;
}

impl<T: 'static> NativeReturn for *const T {
    const KIND: ValueKind = ValueKind::Ptr;
}

impl<T: 'static> NativeValue for *mut T {
    const KIND: ValueKind = ValueKind::Ptr;
}

impl<T: 'static> NativeReturn for *mut T {
    const KIND: ValueKind = ValueKind::Ptr;
}

/// Ordered parameter types plus one return type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    /// Parameter types in declaration order
    pub params: Vec<ValueKind>,
    /// Return type
    pub ret: ValueKind,
}

impl Signature {
    pub fn new(params: Vec<ValueKind>, ret: ValueKind) -> Self {
        Self { params, ret }
    }

    /// Signature derived from the Rust shape of a slot
    pub fn of<Args: NativeArgs, R: NativeReturn>() -> Self {
        Self {
            params: Args::kinds(),
            ret: R::KIND,
        }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Check that a trampoline can transmit this signature
    pub fn validate(&self) -> CalliResult<()> {
        if self.params.len() > MAX_ARITY {
            return Err(CalliError::InvalidSignature(format!(
                "{} parameters in `{}` (max {})",
                self.params.len(),
                self,
                MAX_ARITY
            )));
        }
        if let Some(index) = self.params.iter().position(|p| *p == ValueKind::Void) {
            return Err(CalliError::InvalidSignature(format!(
                "parameter {} of `{}` is void",
                index, self
            )));
        }
        Ok(())
    }

    /// Parse from a C-style shape string.
    /// Format: `"return_type(param_type, param_type, ...)"`
    pub fn parse(signature: &str) -> Option<Self> {
        let signature = signature.trim();

        let paren_pos = signature.find('(')?;
        if !signature.ends_with(')') {
            return None;
        }
        let ret = signature[..paren_pos].parse::<ValueKind>().ok()?;
        let inner = signature[paren_pos + 1..signature.len() - 1].trim();

        let mut params = Vec::new();
        if !inner.is_empty() && !inner.eq_ignore_ascii_case("void") {
            for param in inner.split(',') {
                params.push(param.parse::<ValueKind>().ok()?);
            }
        }

        Some(Self { params, ret })
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.ret)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", param)?;
        }
        write!(f, ")")
    }
}

/// ABI contract used to transfer control to a native address.
///
/// Fixed per binding and supplied by the caller, never inferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CallingConvention {
    /// The platform C convention (`extern "C"`)
    C,
    /// The platform system convention (`extern "system"`): stdcall on 32-bit
    /// Windows, identical to `C` everywhere else
    #[default]
    System,
    /// Callee-cleanup stdcall. Only distinct from the platform convention on x86.
    StdCall,
}

impl fmt::Display for CallingConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallingConvention::C => f.write_str("C"),
            CallingConvention::System => f.write_str("system"),
            CallingConvention::StdCall => f.write_str("stdcall"),
        }
    }
}

/// How every argument of one binding is transmitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PassMode {
    /// Push each argument's value
    #[default]
    ByValue,
    /// Push the address of each argument's storage
    ByReference,
}

impl fmt::Display for PassMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassMode::ByValue => f.write_str("by-value"),
            PassMode::ByReference => f.write_str("by-reference"),
        }
    }
}

/// A resolved, non-null native function address
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address(NonZeroUsize);

impl Address {
    /// `None` for the null address
    pub fn new(raw: usize) -> Option<Self> {
        NonZeroUsize::new(raw).map(Self)
    }

    pub fn from_ptr<T>(ptr: *const T) -> Option<Self> {
        Self::new(ptr as usize)
    }

    pub fn get(&self) -> usize {
        self.0.get()
    }

    pub fn as_ptr(&self) -> *const () {
        self.0.get() as *const ()
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({:#x})", self.0.get())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0.get())
    }
}

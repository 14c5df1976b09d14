//! Scalar types and kernel signatures.

use crate::core::error::{CompileError, CompileResult};
use std::fmt;
use std::str::FromStr;

/// Scalar element types a kernel can take and return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
}

impl NumericType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NumericType::Bool => "bool",
            NumericType::Int8 => "int8",
            NumericType::Int16 => "int16",
            NumericType::Int32 => "int32",
            NumericType::Int64 => "int64",
            NumericType::UInt8 => "uint8",
            NumericType::UInt16 => "uint16",
            NumericType::UInt32 => "uint32",
            NumericType::UInt64 => "uint64",
            NumericType::Float32 => "float32",
            NumericType::Float64 => "float64",
        }
    }

    /// Resolve a type name, including the pointer-sized `intp`/`uintp`.
    pub fn from_name(name: &str, pointer_width: u32) -> Option<NumericType> {
        match name {
            "intp" => Some(Self::signed(pointer_width)),
            "uintp" => Some(Self::unsigned(pointer_width)),
            other => other.parse().ok(),
        }
    }

    /// Width in bits; `bool` counts as one bit.
    pub fn bits(&self) -> u32 {
        match self {
            NumericType::Bool => 1,
            NumericType::Int8 | NumericType::UInt8 => 8,
            NumericType::Int16 | NumericType::UInt16 => 16,
            NumericType::Int32 | NumericType::UInt32 | NumericType::Float32 => 32,
            NumericType::Int64 | NumericType::UInt64 | NumericType::Float64 => 64,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, NumericType::Float32 | NumericType::Float64)
    }

    pub fn is_integer(&self) -> bool {
        !self.is_float() && !self.is_bool()
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, NumericType::Bool)
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            NumericType::Int8 | NumericType::Int16 | NumericType::Int32 | NumericType::Int64
        )
    }

    fn signed(bits: u32) -> NumericType {
        match bits {
            0..=8 => NumericType::Int8,
            9..=16 => NumericType::Int16,
            17..=32 => NumericType::Int32,
            _ => NumericType::Int64,
        }
    }

    fn unsigned(bits: u32) -> NumericType {
        match bits {
            0..=8 => NumericType::UInt8,
            9..=16 => NumericType::UInt16,
            17..=32 => NumericType::UInt32,
            _ => NumericType::UInt64,
        }
    }

    /// Common type of a binary arithmetic operation, following numpy promotion.
    ///
    /// Booleans in arithmetic act as `int64` when paired with each other and
    /// take the other operand's type otherwise. Mixing signed and unsigned
    /// integers picks a signed type wide enough for both, falling back to
    /// `float64` when no such integer exists.
    pub fn promote(a: NumericType, b: NumericType) -> NumericType {
        use NumericType::*;
        match (a, b) {
            (Bool, Bool) => Int64,
            (Bool, other) | (other, Bool) => other,
            (Float64, _) | (_, Float64) => Float64,
            (Float32, Float32) => Float32,
            (Float32, other) | (other, Float32) => {
                if other.bits() <= 16 {
                    Float32
                } else {
                    Float64
                }
            }
            (x, y) if x.is_signed() == y.is_signed() => {
                if x.bits() >= y.bits() {
                    x
                } else {
                    y
                }
            }
            (x, y) => {
                let (signed, unsigned) = if x.is_signed() { (x, y) } else { (y, x) };
                if signed.bits() > unsigned.bits() {
                    signed
                } else if unsigned.bits() < 64 {
                    Self::signed(unsigned.bits() * 2)
                } else {
                    Float64
                }
            }
        }
    }

    /// Result type of true division.
    pub fn true_divide(a: NumericType, b: NumericType) -> NumericType {
        match NumericType::promote(a, b) {
            NumericType::Float32 => NumericType::Float32,
            _ => NumericType::Float64,
        }
    }
}

impl fmt::Display for NumericType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NumericType {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<NumericType, Self::Err> {
        match s {
            "bool" | "bool_" | "boolean" => Ok(NumericType::Bool),
            "int8" => Ok(NumericType::Int8),
            "int16" => Ok(NumericType::Int16),
            "int32" => Ok(NumericType::Int32),
            "int64" => Ok(NumericType::Int64),
            "uint8" => Ok(NumericType::UInt8),
            "uint16" => Ok(NumericType::UInt16),
            "uint32" => Ok(NumericType::UInt32),
            "uint64" => Ok(NumericType::UInt64),
            "float32" => Ok(NumericType::Float32),
            "float64" | "float" => Ok(NumericType::Float64),
            _ => Err(CompileError::UnknownType { name: s.to_string() }),
        }
    }
}

/// A kernel signature: `ret(arg, ...)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub ret: NumericType,
    pub args: Vec<NumericType>,
}

impl Signature {
    pub fn new(ret: NumericType, args: Vec<NumericType>) -> Self {
        Self { ret, args }
    }

    /// `ty(ty)`, the shape of an elementwise transform.
    pub fn unary(ty: NumericType) -> Self {
        Self::new(ty, vec![ty])
    }

    /// Parse `"int64(int64, float64)"`.
    ///
    /// `pointer_width` resolves `intp` and `uintp`.
    pub fn parse(text: &str, pointer_width: u32) -> CompileResult<Signature> {
        let bad = |reason: &str| CompileError::BadSignature {
            signature: text.to_string(),
            reason: reason.to_string(),
        };

        let text_trimmed = text.trim();
        let open = text_trimmed.find('(').ok_or_else(|| bad("missing '('"))?;
        let args_text = text_trimmed[open + 1..]
            .strip_suffix(')')
            .ok_or_else(|| bad("missing closing ')'"))?;

        let resolve = |name: &str| {
            NumericType::from_name(name, pointer_width).ok_or_else(|| CompileError::UnknownType {
                name: name.to_string(),
            })
        };

        let ret_name = text_trimmed[..open].trim();
        if ret_name.is_empty() {
            return Err(bad("missing return type"));
        }
        let ret = resolve(ret_name)?;

        let mut args = Vec::new();
        if !args_text.trim().is_empty() {
            for arg in args_text.split(',') {
                let arg = arg.trim();
                if arg.is_empty() {
                    return Err(bad("empty argument type"));
                }
                args.push(resolve(arg)?);
            }
        }

        Ok(Signature { ret, args })
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.ret)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", arg)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_signature() {
        let sig = Signature::parse("int64(int64)", 64).unwrap();
        assert_eq!(sig, Signature::unary(NumericType::Int64));

        let sig = Signature::parse(" float64( int32 , float32 ) ", 64).unwrap();
        assert_eq!(sig.ret, NumericType::Float64);
        assert_eq!(sig.args, vec![NumericType::Int32, NumericType::Float32]);
        assert_eq!(sig.to_string(), "float64(int32, float32)");
    }

    #[test]
    fn test_intp_follows_pointer_width() {
        assert_eq!(Signature::parse("intp()", 32).unwrap().ret, NumericType::Int32);
        assert_eq!(Signature::parse("uintp()", 64).unwrap().ret, NumericType::UInt64);
    }

    #[test]
    fn test_bad_signatures() {
        assert!(matches!(
            Signature::parse("int64", 64),
            Err(CompileError::BadSignature { .. })
        ));
        assert!(matches!(
            Signature::parse("int64(int64", 64),
            Err(CompileError::BadSignature { .. })
        ));
        assert!(matches!(
            Signature::parse("int64(complex128)", 64),
            Err(CompileError::UnknownType { .. })
        ));
        assert!(matches!(
            Signature::parse("int64(int64,)", 64),
            Err(CompileError::BadSignature { .. })
        ));
    }

    #[test]
    fn test_promotion() {
        use NumericType::*;
        assert_eq!(NumericType::promote(Int64, Int32), Int64);
        assert_eq!(NumericType::promote(Int64, Float32), Float64);
        assert_eq!(NumericType::promote(Int8, Float32), Float32);
        assert_eq!(NumericType::promote(UInt8, Int8), Int16);
        assert_eq!(NumericType::promote(UInt64, Int64), Float64);
        assert_eq!(NumericType::promote(UInt32, Int64), Int64);
        assert_eq!(NumericType::promote(Bool, Bool), Int64);
        assert_eq!(NumericType::promote(Bool, UInt16), UInt16);
        assert_eq!(NumericType::true_divide(Int64, Int64), Float64);
        assert_eq!(NumericType::true_divide(Float32, Float32), Float32);
    }
}

// ABOUTME: Canonical value types and function signatures used for scoping and dispatch

use std::fmt;

/// A value type: either the wildcard `unknown` used during signature
/// matching, or a named type with an ordered list of type-parameter types
/// (`std::vector<double>`, `std::array<double, 4>`). Numeric literals are
/// representable as named types whose name is their digit string, so they
/// can appear in a generics list (`std::array<double, 4>`'s `4`).
///
/// Equality is structural and derived: two `Unknown`s are equal to each
/// other, and never equal to a `Named` type, which is exactly the matching
/// behavior the coercion search in `Context::find_function` relies on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Unknown,
    Named { name: String, params: Vec<Type> },
}

impl Type {
    pub fn named(name: impl Into<String>) -> Type {
        Type::Named {
            name: name.into(),
            params: Vec::new(),
        }
    }

    pub fn generic(name: impl Into<String>, params: Vec<Type>) -> Type {
        Type::Named {
            name: name.into(),
            params,
        }
    }

    /// A type-level numeric constant, e.g. the `4` in `std::array<double, 4>`.
    pub fn constant(value: usize) -> Type {
        Type::named(value.to_string())
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Type::Unknown => None,
            Type::Named { name, .. } => Some(name),
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Type::Unknown)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Unknown => write!(f, "?"),
            Type::Named { name, params } => {
                write!(f, "{name}")?;
                if !params.is_empty() {
                    write!(f, "<")?;
                    for (i, param) in params.iter().enumerate() {
                        if i != 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{param}")?;
                    }
                    write!(f, ">")?;
                }
                Ok(())
            }
        }
    }
}

/// A function's name plus ordered parameter types, used as a dispatch key
/// for call-site resolution (`Context::find_function`) and for the
/// derivative rule registry (`FunctionDiffStorage`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionSignature {
    pub name: String,
    pub param_types: Vec<Type>,
}

impl FunctionSignature {
    pub fn new(name: impl Into<String>, param_types: Vec<Type>) -> FunctionSignature {
        FunctionSignature {
            name: name.into(),
            param_types,
        }
    }
}

impl fmt::Display for FunctionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, ty) in self.param_types.iter().enumerate() {
            if i != 0 {
                write!(f, ", ")?;
            }
            write!(f, "{ty}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_equals_unknown() {
        assert_eq!(Type::Unknown, Type::Unknown);
    }

    #[test]
    fn unknown_never_equals_named() {
        assert_ne!(Type::Unknown, Type::named("int"));
    }

    #[test]
    fn named_equality_is_structural() {
        let a = Type::generic("std::vector", vec![Type::named("double")]);
        let b = Type::generic("std::vector", vec![Type::named("double")]);
        let c = Type::generic("std::vector", vec![Type::named("int")]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn display_renders_generics() {
        let ty = Type::generic(
            "std::array",
            vec![Type::named("double"), Type::constant(4)],
        );
        assert_eq!(ty.to_string(), "std::array<double, 4>");
    }

    #[test]
    fn signature_equality_is_structural() {
        let a = FunctionSignature::new("std::pow", vec![Type::Unknown, Type::Unknown]);
        let b = FunctionSignature::new("std::pow", vec![Type::Unknown, Type::Unknown]);
        assert_eq!(a, b);
    }
}

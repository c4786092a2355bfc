// ABOUTME: File-processing loop: default environment, parse, differentiate, write

use crate::context::Context;
use crate::diff::differentiate_file;
use crate::error::{DifferError, ParsingError};
use crate::parser::parse_file;
use crate::registry::FunctionDiffStorage;
use crate::types::{FunctionSignature, Type};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// The environment every file is parsed against: the built-in scalar/vector
/// types, the default function library (`std::cos`/`sin`/`pow`/`log`/`exp`/
/// `abs`, `std::vector`'s constructor and `.size()`), and the coercion graph
/// (`int` widens to `float`/`double`/`long`, `long`/`float` widen to
/// `double`, and an untyped literal coerces to `double`).
pub fn default_context() -> Context {
    let mut ctx = Context::new();
    for name in ["int", "float", "double", "std::vector"] {
        ctx.add_type(name, Type::named(name));
    }

    ctx.add_function(FunctionSignature::new("std::cos", vec![Type::Unknown]));
    ctx.add_function(FunctionSignature::new("std::sin", vec![Type::Unknown]));
    ctx.add_function(FunctionSignature::new(
        "std::pow",
        vec![Type::Unknown, Type::Unknown],
    ));
    ctx.add_function(FunctionSignature::new("std::log", vec![Type::Unknown]));
    ctx.add_function(FunctionSignature::new("std::exp", vec![Type::Unknown]));
    ctx.add_function(FunctionSignature::new("std::abs", vec![Type::Unknown]));
    ctx.add_function(FunctionSignature::new("std::vector::size", vec![]));
    ctx.add_function(FunctionSignature::new(
        "std::vector",
        vec![Type::Unknown, Type::Unknown],
    ));

    let int = Type::named("int");
    let float = Type::named("float");
    let double = Type::named("double");
    let long = Type::named("long");
    ctx.add_type_conversion(int.clone(), float.clone());
    ctx.add_type_conversion(int.clone(), double.clone());
    ctx.add_type_conversion(int, long.clone());
    ctx.add_type_conversion(long, double.clone());
    ctx.add_type_conversion(float, double.clone());
    ctx.add_type_conversion(Type::Unknown, double);
    ctx
}

/// `<dir>/d_<basename>`, matching how `diff.rs` names the derivative
/// function (`d_`-prefixed) at the file-naming level too.
fn derivative_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("output");
    let new_name = format!("d_{file_name}");
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(new_name),
        _ => PathBuf::from(new_name),
    }
}

fn read_file(path: &Path) -> Result<String, ParsingError> {
    fs::read_to_string(path).map_err(|e| ParsingError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

fn write_file(path: &Path, contents: &str) -> Result<(), ParsingError> {
    fs::write(path, contents).map_err(|e| ParsingError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Parses, differentiates, and writes the derivative of one file. The
/// output buffer is fully built in memory before any write happens, so a
/// parse or differentiation failure never leaves a partial output file on
/// disk.
pub fn process_file(path: &Path, registry: Rc<FunctionDiffStorage>) -> Result<PathBuf, DifferError> {
    println!("Parsing file '{}'", path.display());
    let source = read_file(path)?;
    let default_ctx = default_context();
    let file_name = path.display().to_string();
    let file = parse_file(&source, &file_name, &default_ctx)?;

    let differentiated = differentiate_file(&file, registry)?;
    let output_path = derivative_path(path);
    println!("Writing file '{}'", output_path.display());
    write_file(&output_path, &differentiated.to_source())?;
    Ok(output_path)
}

/// Processes every path, continuing past failures so one bad file doesn't
/// stop the rest of the batch. Returns the process exit code: `0` if every
/// file succeeded, `1` if any failed.
pub fn run(paths: &[PathBuf]) -> i32 {
    let registry = Rc::new(FunctionDiffStorage::with_defaults());
    let mut had_error = false;
    for path in paths {
        if let Err(e) = process_file(path, registry.clone()) {
            eprintln!("error processing '{}': {e}", path.display());
            had_error = true;
        }
    }
    if had_error {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_context_resolves_all_builtin_functions_through_wildcards() {
        let ctx = default_context();
        let double = Type::named("double");
        for (name, arity) in [
            ("std::cos", 1),
            ("std::sin", 1),
            ("std::log", 1),
            ("std::exp", 1),
            ("std::abs", 1),
        ] {
            let desired = FunctionSignature::new(name, vec![double.clone(); arity]);
            assert!(ctx.find_function(&desired).is_some(), "missing {name}");
        }
        let pow_desired = FunctionSignature::new("std::pow", vec![double.clone(), double.clone()]);
        assert!(ctx.find_function(&pow_desired).is_some());
    }

    #[test]
    fn default_context_widens_int_through_the_coercion_chain_to_double() {
        let ctx = default_context();
        let target = FunctionSignature::new("std::cos", vec![Type::named("double")]);
        // std::cos is itself registered with an `unknown` wildcard, so any
        // concrete type resolves directly without even touching the
        // coercion graph; this asserts that path still succeeds for `int`.
        let desired = FunctionSignature::new("std::cos", vec![Type::named("int")]);
        assert_eq!(ctx.find_function(&desired), ctx.find_function(&target));
    }

    #[test]
    fn derivative_path_prefixes_the_basename_and_keeps_the_directory() {
        assert_eq!(
            derivative_path(Path::new("examples/area.cpp")),
            PathBuf::from("examples/d_area.cpp")
        );
        assert_eq!(
            derivative_path(Path::new("area.cpp")),
            PathBuf::from("d_area.cpp")
        );
    }
}

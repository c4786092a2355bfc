// ABOUTME: Scoped environment of types, variables, functions, and type coercions

use crate::ast::Variable;
use crate::types::{FunctionSignature, Type};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// An immutable-parent, mutable-child scope. Each scope owns its own local
/// maps; looking a name up walks the parent chain. `parent` is never
/// mutated once a child has been created from it — new scopes are built by
/// snapshotting the parent into an `Rc` (see `Context::child`), matching the
/// "persistent parent-pointer structure" called for by the design notes:
/// nothing is ever shared *mutably* across scopes.
#[derive(Debug, Clone, PartialEq)]
pub struct Context {
    pub types: HashMap<String, Type>,
    pub variables: HashMap<String, Variable>,
    pub functions: HashSet<FunctionSignature>,
    pub type_conversions: HashMap<Type, Vec<Type>>,
    pub parent: Option<Rc<Context>>,
}

impl Default for Context {
    fn default() -> Self {
        Context::new()
    }
}

impl Context {
    pub fn new() -> Context {
        Context {
            types: HashMap::new(),
            variables: HashMap::new(),
            functions: HashSet::new(),
            type_conversions: HashMap::new(),
            parent: None,
        }
    }

    /// A fresh child scope of `parent`, with empty local maps.
    pub fn child(parent: Rc<Context>) -> Context {
        Context {
            types: HashMap::new(),
            variables: HashMap::new(),
            functions: HashSet::new(),
            type_conversions: HashMap::new(),
            parent: Some(parent),
        }
    }

    pub fn add_type(&mut self, name: impl Into<String>, ty: Type) {
        self.types.insert(name.into(), ty);
    }

    pub fn add_variable(&mut self, var: Variable) {
        self.variables.insert(var.name.clone(), var);
    }

    pub fn add_function(&mut self, signature: FunctionSignature) {
        self.functions.insert(signature);
    }

    pub fn add_type_conversion(&mut self, from: Type, to: Type) {
        self.type_conversions.entry(from).or_default().push(to);
    }

    pub fn is_variable_present(&self, name: &str) -> bool {
        self.variables.contains_key(name)
            || self
                .parent
                .as_ref()
                .is_some_and(|p| p.is_variable_present(name))
    }

    pub fn is_type_present(&self, name: &str) -> bool {
        self.types.contains_key(name)
            || self.parent.as_ref().is_some_and(|p| p.is_type_present(name))
    }

    pub fn get_variable(&self, name: &str) -> Option<&Variable> {
        self.variables
            .get(name)
            .or_else(|| self.parent.as_ref().and_then(|p| p.get_variable(name)))
    }

    pub fn get_type(&self, name: &str) -> Option<Type> {
        self.types
            .get(name)
            .cloned()
            .or_else(|| self.parent.as_ref().and_then(|p| p.get_type(name)))
    }

    /// A shallow, deep-copy of local maps retaining the same parent —
    /// used by the differentiation engine for its scratch function context.
    pub fn copy(&self) -> Context {
        self.clone()
    }

    fn find_exact(&self, desired: &FunctionSignature) -> Option<FunctionSignature> {
        if self.functions.contains(desired) {
            return Some(desired.clone());
        }
        self.parent.as_ref().and_then(|p| p.find_exact(desired))
    }

    fn conversions_for(&self, ty: &Type) -> Option<Vec<Type>> {
        self.type_conversions
            .get(ty)
            .cloned()
            .or_else(|| self.parent.as_ref().and_then(|p| p.conversions_for(ty)))
    }

    fn find_search_conversions(
        &self,
        desired: &mut FunctionSignature,
        param_i: usize,
    ) -> Option<FunctionSignature> {
        if param_i >= desired.param_types.len() {
            return None;
        }
        let original = desired.param_types[param_i].clone();

        // Try the unknown wildcard: lets a declared generic signature absorb
        // whatever concrete type sits at this position.
        desired.param_types[param_i] = Type::Unknown;
        if let Some(found) = self.find_exact(desired) {
            desired.param_types[param_i] = original;
            return Some(found);
        }
        desired.param_types[param_i] = original.clone();

        // Try each declared coercion target for the original type, in order.
        if let Some(conversions) = self.conversions_for(&original) {
            for target in conversions {
                desired.param_types[param_i] = target;
                if let Some(found) = self.find_exact(desired) {
                    desired.param_types[param_i] = original;
                    return Some(found);
                }
                if let Some(found) = self.find_search_conversions(desired, param_i + 1) {
                    desired.param_types[param_i] = original;
                    return Some(found);
                }
            }
            desired.param_types[param_i] = original;
        }

        self.find_search_conversions(desired, param_i + 1)
    }

    /// Resolves a call-site signature against the functions in scope,
    /// tolerating the `unknown` wildcard and declared coercions (§4.2).
    /// Search is depth-first, left-to-right; the first successful
    /// combination wins.
    pub fn find_function(&self, desired: &FunctionSignature) -> Option<FunctionSignature> {
        if let Some(found) = self.find_exact(desired) {
            return Some(found);
        }
        if desired.param_types.is_empty() {
            return None;
        }
        let mut copy = desired.clone();
        self.find_search_conversions(&mut copy, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn double() -> Type {
        Type::named("double")
    }
    fn int() -> Type {
        Type::named("int")
    }

    #[test]
    fn parent_lookup_walks_the_chain() {
        let mut parent = Context::new();
        parent.add_type("int", int());
        let parent = Rc::new(parent);
        let child = Context::child(parent);
        assert!(child.is_type_present("int"));
        assert!(!child.is_type_present("double"));
    }

    #[test]
    fn exact_match_wins_without_coercion() {
        let mut ctx = Context::new();
        ctx.add_function(FunctionSignature::new("f", vec![double()]));
        let desired = FunctionSignature::new("f", vec![double()]);
        assert_eq!(ctx.find_function(&desired), Some(desired));
    }

    #[test]
    fn wildcard_signature_absorbs_concrete_type() {
        let mut ctx = Context::new();
        let generic = FunctionSignature::new("std::cos", vec![Type::Unknown]);
        ctx.add_function(generic.clone());
        let desired = FunctionSignature::new("std::cos", vec![double()]);
        assert_eq!(ctx.find_function(&desired), Some(generic));
    }

    #[test]
    fn coercion_graph_finds_widened_match() {
        let mut ctx = Context::new();
        ctx.add_type_conversion(int(), double());
        let target = FunctionSignature::new("f", vec![double()]);
        ctx.add_function(target.clone());
        let desired = FunctionSignature::new("f", vec![int()]);
        assert_eq!(ctx.find_function(&desired), Some(target));
    }

    #[test]
    fn no_match_returns_none() {
        let ctx = Context::new();
        let desired = FunctionSignature::new("missing", vec![double()]);
        assert_eq!(ctx.find_function(&desired), None);
    }

    #[test]
    fn copy_detaches_from_further_mutation() {
        let mut ctx = Context::new();
        ctx.add_type("int", int());
        let mut copy = ctx.copy();
        copy.add_type("double", double());
        assert!(!ctx.is_type_present("double"));
        assert!(copy.is_type_present("double"));
    }
}

//! Scope tree for namespaces and classes, with the name lookup rules the
//! call resolver needs.

use std::collections::{HashMap, HashSet};

use super::entity::FunctionIndex;
use super::types::{arithmetic_rank, split_qualified, strip_template_args, TypeEnvironment, TypeInfo};

/// Bound on alias and using-directive chains followed during lookup.
const MAX_LOOKUP_DEPTH: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    Namespace,
    AnonymousNamespace,
    Class,
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub kind: ScopeKind,
    pub name: String,
    pub parent: Option<ScopeId>,
    /// Named namespaces and classes declared directly inside
    pub children: HashMap<String, ScopeId>,
    pub functions: HashMap<String, Vec<FunctionIndex>>,
    /// Constructors, kept apart so the class name still names the type
    pub constructors: Vec<FunctionIndex>,
    /// Namespace-scope variables or class data members
    pub variables: HashMap<String, TypeInfo>,
    /// `typedef` and `using X = ...` names
    pub aliases: HashMap<String, TypeInfo>,
    pub enums: HashSet<String>,
    pub using_directives: Vec<ScopeId>,
    /// Base class spellings as written
    pub base_names: Vec<String>,
    pub bases: Vec<ScopeId>,
    pub is_template: bool,
}

/// What a name refers to in some scope.
#[derive(Debug, Clone)]
pub enum Lookup {
    Functions(Vec<FunctionIndex>),
    Variable(TypeInfo),
    Type(TypeTarget),
    NotFound,
}

#[derive(Debug, Clone)]
pub enum TypeTarget {
    Class(ScopeId),
    Namespace(ScopeId),
    Alias(TypeInfo),
    Enum,
}

impl Lookup {
    pub fn is_found(&self) -> bool {
        !matches!(self, Lookup::NotFound)
    }
}

impl Scope {
    fn new(kind: ScopeKind, name: String, parent: Option<ScopeId>) -> Self {
        Self {
            kind,
            name,
            parent,
            children: HashMap::new(),
            functions: HashMap::new(),
            constructors: Vec::new(),
            variables: HashMap::new(),
            aliases: HashMap::new(),
            enums: HashSet::new(),
            using_directives: Vec::new(),
            base_names: Vec::new(),
            bases: Vec::new(),
            is_template: false,
        }
    }

    pub fn is_class(&self) -> bool {
        self.kind == ScopeKind::Class
    }

    /// Look only at names declared directly in this scope.
    fn own(&self, name: &str) -> Lookup {
        if let Some(functions) = self.functions.get(name) {
            if !functions.is_empty() {
                return Lookup::Functions(functions.clone());
            }
        }
        if let Some(ty) = self.variables.get(name) {
            return Lookup::Variable(ty.clone());
        }
        if let Some(child) = self.children.get(name) {
            return Lookup::Type(TypeTarget::Class(*child));
        }
        if let Some(ty) = self.aliases.get(name) {
            return Lookup::Type(TypeTarget::Alias(ty.clone()));
        }
        if self.enums.contains(name) {
            return Lookup::Type(TypeTarget::Enum);
        }
        Lookup::NotFound
    }
}

#[derive(Debug, Clone)]
pub struct ScopeArena {
    scopes: Vec<Scope>,
}

impl Default for ScopeArena {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeArena {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::new(ScopeKind::Global, String::new(), None)],
        }
    }

    pub fn global(&self) -> ScopeId {
        ScopeId(0)
    }

    pub fn get(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0]
    }

    pub fn get_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.0]
    }

    pub fn ids(&self) -> impl Iterator<Item = ScopeId> {
        (0..self.scopes.len()).map(ScopeId)
    }

    /// Get or create a named namespace or class directly inside `parent`.
    pub fn child(&mut self, parent: ScopeId, name: &str, kind: ScopeKind) -> ScopeId {
        if let Some(existing) = self.get(parent).children.get(name) {
            return *existing;
        }
        let id = ScopeId(self.scopes.len());
        self.scopes.push(Scope::new(kind, name.to_string(), Some(parent)));
        self.get_mut(parent).children.insert(name.to_string(), id);
        id
    }

    /// The unique anonymous namespace of `parent`; its names are visible
    /// in `parent` through an implicit using-directive.
    pub fn anonymous_namespace(&mut self, parent: ScopeId) -> ScopeId {
        let existing = self
            .get(parent)
            .using_directives
            .iter()
            .copied()
            .find(|id| self.get(*id).kind == ScopeKind::AnonymousNamespace && self.get(*id).parent == Some(parent));
        if let Some(id) = existing {
            return id;
        }
        let id = ScopeId(self.scopes.len());
        self.scopes.push(Scope::new(ScopeKind::AnonymousNamespace, String::new(), Some(parent)));
        self.get_mut(parent).using_directives.push(id);
        id
    }

    pub fn add_using_directive(&mut self, scope: ScopeId, target: ScopeId) {
        if scope != target && !self.get(scope).using_directives.contains(&target) {
            self.get_mut(scope).using_directives.push(target);
        }
    }

    /// `ns::Class` style name of a scope, empty for the global scope.
    pub fn qualified_name(&self, id: ScopeId) -> String {
        let mut parts = Vec::new();
        let mut current = Some(id);
        while let Some(scope_id) = current {
            let scope = self.get(scope_id);
            if matches!(scope.kind, ScopeKind::Namespace | ScopeKind::Class) {
                parts.push(scope.name.clone());
            }
            current = scope.parent;
        }
        parts.reverse();
        parts.join("::")
    }

    /// Qualify `name` with the scope it is declared in.
    pub fn qualify(&self, scope: ScopeId, name: &str) -> String {
        let prefix = self.qualified_name(scope);
        if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}::{}", prefix, name)
        }
    }

    /// Innermost enclosing class, the scope itself included.
    pub fn enclosing_class(&self, id: ScopeId) -> Option<ScopeId> {
        let mut current = Some(id);
        while let Some(scope_id) = current {
            if self.get(scope_id).is_class() {
                return Some(scope_id);
            }
            current = self.get(scope_id).parent;
        }
        None
    }

    /// Lookup of `name` inside `scope` only: its own declarations, names
    /// brought in by using-directives and, for classes, base classes.
    pub fn find_in(&self, scope: ScopeId, name: &str) -> Lookup {
        let mut visited = HashSet::new();
        self.find_in_guarded(scope, name, &mut visited)
    }

    fn find_in_guarded(&self, scope: ScopeId, name: &str, visited: &mut HashSet<ScopeId>) -> Lookup {
        if !visited.insert(scope) {
            return Lookup::NotFound;
        }
        let current = self.get(scope);
        let own = match current.own(name) {
            Lookup::Type(TypeTarget::Class(id)) if !self.get(id).is_class() => {
                Lookup::Type(TypeTarget::Namespace(id))
            }
            other => other,
        };

        // Overloads declared directly and through using-directives form one set.
        let mut functions = match &own {
            Lookup::Functions(list) => list.clone(),
            Lookup::NotFound => Vec::new(),
            _ => return own,
        };
        let mut fallback = Lookup::NotFound;
        for target in &current.using_directives {
            match self.find_in_guarded(*target, name, visited) {
                Lookup::Functions(list) => functions.extend(list),
                Lookup::NotFound => {}
                other => {
                    if !fallback.is_found() {
                        fallback = other;
                    }
                }
            }
        }
        if !functions.is_empty() {
            return Lookup::Functions(dedup(functions));
        }
        if fallback.is_found() {
            return fallback;
        }

        if current.is_class() {
            let mut inherited = Vec::new();
            for base in &current.bases {
                match self.find_in_guarded(*base, name, visited) {
                    Lookup::Functions(list) => inherited.extend(list),
                    Lookup::NotFound => {}
                    other => return other,
                }
            }
            if !inherited.is_empty() {
                return Lookup::Functions(dedup(inherited));
            }
        }
        Lookup::NotFound
    }

    /// Unqualified lookup: walk outward from `from` and stop at the first
    /// scope that declares the name at all.
    pub fn lookup(&self, from: ScopeId, name: &str) -> Lookup {
        let mut current = Some(from);
        while let Some(scope) = current {
            let found = self.find_in(scope, name);
            if found.is_found() {
                return found;
            }
            current = self.get(scope).parent;
        }
        Lookup::NotFound
    }

    /// Resolve a scope path such as `["ns", "Widget"]` as seen from `from`.
    pub fn lookup_path(&self, from: ScopeId, path: &[String], rooted: bool) -> Option<ScopeId> {
        let (first, rest) = path.split_first()?;
        let mut scope = if rooted {
            self.scope_named(self.global(), first, 0)?
        } else {
            let mut current = Some(from);
            let mut found = None;
            while let Some(scope) = current {
                if let Some(hit) = self.scope_named(scope, first, 0) {
                    found = Some(hit);
                    break;
                }
                current = self.get(scope).parent;
            }
            found?
        };
        for part in rest {
            scope = self.scope_named(scope, part, 0)?;
        }
        Some(scope)
    }

    /// A namespace or class called `name` visible inside `scope`, following
    /// aliases to class types.
    fn scope_named(&self, scope: ScopeId, name: &str, depth: usize) -> Option<ScopeId> {
        if depth > MAX_LOOKUP_DEPTH {
            return None;
        }
        match self.find_in(scope, name) {
            Lookup::Type(TypeTarget::Class(id)) | Lookup::Type(TypeTarget::Namespace(id)) => Some(id),
            Lookup::Type(TypeTarget::Alias(ty)) => self.resolve_type_depth(scope, &ty, depth + 1),
            _ => None,
        }
    }

    /// Class scope a type names, if it is declared in the unit.
    pub fn resolve_type(&self, from: ScopeId, ty: &TypeInfo) -> Option<ScopeId> {
        self.resolve_type_depth(from, ty, 0)
    }

    fn resolve_type_depth(&self, from: ScopeId, ty: &TypeInfo, depth: usize) -> Option<ScopeId> {
        if depth > MAX_LOOKUP_DEPTH || ty.function_pointer.is_some() {
            return None;
        }
        let path = ty.name_path();
        let rooted = ty.base.trim_start().starts_with("::");
        let (last, prefix) = path.split_last()?;
        let container = if prefix.is_empty() {
            None
        } else {
            Some(self.lookup_path(from, prefix, rooted)?)
        };
        let found = match container {
            Some(scope) => self.find_in(scope, last),
            None if rooted => self.find_in(self.global(), last),
            None => self.lookup(from, last),
        };
        match found {
            Lookup::Type(TypeTarget::Class(id)) if self.get(id).is_class() => Some(id),
            Lookup::Type(TypeTarget::Alias(alias)) => {
                if alias.decayed_depth() > 0 {
                    return None;
                }
                self.resolve_type_depth(container.unwrap_or(from), &alias, depth + 1)
            }
            _ => None,
        }
    }

    /// Follow aliases until a non-alias spelling remains.
    pub fn canonical_type(&self, from: ScopeId, ty: &TypeInfo) -> TypeInfo {
        let mut current = ty.clone();
        for _ in 0..MAX_LOOKUP_DEPTH {
            if current.function_pointer.is_some() || current.is_dependent {
                break;
            }
            let path = current.name_path();
            let alias = match path.as_slice() {
                [single] => match self.lookup(from, single) {
                    Lookup::Type(TypeTarget::Alias(alias)) => alias,
                    _ => break,
                },
                _ => break,
            };
            let mut next = alias;
            next.is_const |= current.is_const;
            next.pointer_depth += current.pointer_depth;
            next.is_array |= current.is_array;
            if current.reference != super::types::Reference::None {
                next.reference = current.reference;
            }
            current = next;
        }
        current
    }

    /// Resolve every class's base spellings to scopes. Runs once after all
    /// declarations are collected.
    pub fn resolve_bases(&mut self) {
        for index in 0..self.scopes.len() {
            let id = ScopeId(index);
            if !self.get(id).is_class() || self.get(id).base_names.is_empty() {
                continue;
            }
            let from = self.get(id).parent.unwrap_or(ScopeId(0));
            let resolved: Vec<ScopeId> = self
                .get(id)
                .base_names
                .iter()
                .filter_map(|name| self.resolve_type(from, &TypeInfo::named(name.clone())))
                .filter(|base| *base != id)
                .collect();
            self.get_mut(id).bases = resolved;
        }
    }

    /// True when `base` is a (possibly indirect) base class of `derived`.
    pub fn is_derived_from(&self, derived: ScopeId, base: ScopeId) -> bool {
        let mut stack = self.get(derived).bases.clone();
        let mut visited = HashSet::new();
        while let Some(next) = stack.pop() {
            if next == base {
                return true;
            }
            if visited.insert(next) {
                stack.extend(self.get(next).bases.iter().copied());
            }
        }
        false
    }

    /// All base classes of `class`, nearest first.
    pub fn all_bases(&self, class: ScopeId) -> Vec<ScopeId> {
        let mut order = Vec::new();
        let mut queue: std::collections::VecDeque<ScopeId> = self.get(class).bases.iter().copied().collect();
        while let Some(next) = queue.pop_front() {
            if next == class || order.contains(&next) {
                continue;
            }
            order.push(next);
            queue.extend(self.get(next).bases.iter().copied());
        }
        order
    }

    fn lookup_type_name(&self, from: ScopeId, base: &str) -> Lookup {
        let stripped = strip_template_args(base);
        let path = split_qualified(&stripped);
        let Some((last, prefix)) = path.split_last() else {
            return Lookup::NotFound;
        };
        if prefix.is_empty() {
            return self.lookup(from, last);
        }
        match self.lookup_path(from, prefix, stripped.starts_with("::")) {
            Some(scope) => self.find_in(scope, last),
            None => Lookup::NotFound,
        }
    }

    /// Type facts as seen from one scope.
    pub fn environment(&self, from: ScopeId) -> ScopeEnvironment<'_> {
        ScopeEnvironment { scopes: self, from }
    }
}

fn dedup(mut functions: Vec<FunctionIndex>) -> Vec<FunctionIndex> {
    let mut seen = HashSet::new();
    functions.retain(|f| seen.insert(*f));
    functions
}

/// `TypeEnvironment` backed by the scope tree.
pub struct ScopeEnvironment<'a> {
    scopes: &'a ScopeArena,
    from: ScopeId,
}

impl TypeEnvironment for ScopeEnvironment<'_> {
    fn is_enum(&self, base: &str) -> bool {
        matches!(
            self.scopes.lookup_type_name(self.from, base),
            Lookup::Type(TypeTarget::Enum)
        )
    }

    fn is_class(&self, base: &str) -> bool {
        // Undeclared library types are assumed to be classes.
        base != "void" && arithmetic_rank(base).is_none() && !self.is_enum(base)
    }

    fn is_derived_from(&self, derived: &str, base: &str) -> bool {
        let derived = self.scopes.resolve_type(self.from, &TypeInfo::named(derived));
        let base = self.scopes.resolve_type(self.from, &TypeInfo::named(base));
        match (derived, base) {
            (Some(d), Some(b)) => self.scopes.is_derived_from(d, b),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_name_skips_anonymous_namespaces() {
        let mut arena = ScopeArena::new();
        let ns = arena.child(arena.global(), "outer", ScopeKind::Namespace);
        let anon = arena.anonymous_namespace(ns);
        let class = arena.child(anon, "Widget", ScopeKind::Class);
        assert_eq!(arena.qualified_name(class), "outer::Widget");
        assert_eq!(arena.qualify(arena.global(), "main"), "main");
    }

    #[test]
    fn test_lookup_stops_at_first_declaring_scope() {
        let mut arena = ScopeArena::new();
        let global = arena.global();
        let ns = arena.child(global, "ns", ScopeKind::Namespace);
        arena.get_mut(global).functions.insert("f".to_string(), vec![FunctionIndex(0)]);
        arena.get_mut(ns).variables.insert("f".to_string(), TypeInfo::named("int"));

        assert!(matches!(arena.lookup(ns, "f"), Lookup::Variable(_)));
        assert!(matches!(arena.lookup(global, "f"), Lookup::Functions(_)));
    }

    #[test]
    fn test_anonymous_namespace_is_transparent() {
        let mut arena = ScopeArena::new();
        let global = arena.global();
        let anon = arena.anonymous_namespace(global);
        arena.get_mut(anon).functions.insert("helper".to_string(), vec![FunctionIndex(3)]);

        match arena.lookup(global, "helper") {
            Lookup::Functions(list) => assert_eq!(list, vec![FunctionIndex(3)]),
            other => panic!("unexpected lookup result: {:?}", other),
        }
        assert_eq!(arena.anonymous_namespace(global), anon);
    }

    #[test]
    fn test_base_class_members_are_inherited() {
        let mut arena = ScopeArena::new();
        let global = arena.global();
        let base = arena.child(global, "Base", ScopeKind::Class);
        let derived = arena.child(global, "Derived", ScopeKind::Class);
        arena.get_mut(base).functions.insert("run".to_string(), vec![FunctionIndex(1)]);
        arena.get_mut(derived).base_names.push("Base".to_string());
        arena.resolve_bases();

        assert!(arena.is_derived_from(derived, base));
        assert!(matches!(arena.find_in(derived, "run"), Lookup::Functions(_)));
        assert_eq!(arena.all_bases(derived), vec![base]);
    }

    #[test]
    fn test_lookup_path_and_aliases() {
        let mut arena = ScopeArena::new();
        let global = arena.global();
        let ns = arena.child(global, "geo", ScopeKind::Namespace);
        let point = arena.child(ns, "Point", ScopeKind::Class);
        arena
            .get_mut(global)
            .aliases
            .insert("P".to_string(), TypeInfo::named("geo::Point"));

        assert_eq!(
            arena.lookup_path(global, &["geo".to_string(), "Point".to_string()], false),
            Some(point)
        );
        assert_eq!(arena.resolve_type(global, &TypeInfo::named("P")), Some(point));
        assert_eq!(arena.resolve_type(global, &TypeInfo::named("::geo::Point")), Some(point));
    }
}

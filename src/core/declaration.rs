use serde::{Deserialize, Serialize};
use std::fmt;

use super::semantic::{DeclId, FunctionEntity, FunctionKind, ParamEntity, ParsedUnit};

/// Where a declaration was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Snapshot of one function parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDeclaration {
    id: DeclId,
    name: String,
    type_name: String,
}

impl ParameterDeclaration {
    pub fn from_entity(param: &ParamEntity) -> Self {
        Self {
            id: param.id,
            name: param.name.clone(),
            type_name: param.ty.spelling(),
        }
    }

    pub fn id(&self) -> DeclId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }
}

impl fmt::Display for ParameterDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "param.id {}", self.id)?;
        writeln!(f, "param.name {}", self.name)?;
        writeln!(f, "param.type {}", self.type_name)
    }
}

/// Snapshot of a function declaration taken from a `ParsedUnit`.
///
/// Every string is copied out of the unit, so a declaration stays usable
/// after the unit it came from is replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    id: DeclId,
    name: String,
    qualified_name: String,
    return_type: String,
    parameters: Vec<ParameterDeclaration>,
    is_program_entry_point: bool,
    location: SourceLocation,
    #[serde(skip)]
    ast_dump: String,
}

impl FunctionDeclaration {
    pub fn from_entity(unit: &ParsedUnit, entity: &FunctionEntity) -> Self {
        let return_type = match entity.kind {
            FunctionKind::Constructor | FunctionKind::Destructor => "void".to_string(),
            _ => entity.return_type.spelling(),
        };

        Self {
            id: entity.id,
            name: entity.name.clone(),
            qualified_name: entity.qualified_name.clone(),
            return_type,
            parameters: entity.params.iter().map(ParameterDeclaration::from_entity).collect(),
            is_program_entry_point: entity.is_entry_point,
            location: SourceLocation {
                file: unit.file_path(entity.position.file),
                line: entity.position.line,
                column: entity.position.column,
            },
            ast_dump: unit.structural_dump(entity),
        }
    }

    pub fn id(&self) -> DeclId {
        self.id
    }

    /// Unqualified name as written, e.g. `run`, `operator+` or `~Widget`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    pub fn return_type(&self) -> &str {
        &self.return_type
    }

    pub fn parameters(&self) -> &[ParameterDeclaration] {
        &self.parameters
    }

    pub fn has_parameters(&self) -> bool {
        !self.parameters.is_empty()
    }

    pub fn is_program_entry_point(&self) -> bool {
        self.is_program_entry_point
    }

    pub fn location(&self) -> &SourceLocation {
        &self.location
    }

    pub fn ast_dump(&self) -> &str {
        &self.ast_dump
    }

    /// `qualified_name(param types)`, stable across re-analysis of the
    /// same source.
    pub fn signature(&self) -> String {
        let params: Vec<&str> = self.parameters.iter().map(|p| p.type_name()).collect();
        format!("{}({})", self.qualified_name, params.join(", "))
    }
}

impl fmt::Display for FunctionDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "id {}", self.id)?;
        writeln!(f, "name {}", self.name)?;
        writeln!(f, "return_type {}", self.return_type)?;
        for param in &self.parameters {
            write!(f, "{}", param)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::core::analyzer::SourceAnalyzer;

    fn declarations(source: &str) -> Vec<FunctionDeclaration> {
        let mut analyzer = SourceAnalyzer::new(&AnalysisConfig::default()).unwrap();
        let unit = analyzer.analyze(source, &[]);
        unit.functions()
            .iter()
            .map(|f| FunctionDeclaration::from_entity(&unit, f))
            .collect()
    }

    #[test]
    fn test_function_snapshot() {
        let decls = declarations("int helper(int x, const char *name) { return x; }\nint main() { return 0; }\n");
        assert_eq!(decls.len(), 2);

        let helper = &decls[0];
        assert_eq!(helper.name(), "helper");
        assert_eq!(helper.return_type(), "int");
        assert!(helper.has_parameters());
        assert_eq!(helper.parameters()[1].name(), "name");
        assert_eq!(helper.parameters()[1].type_name(), "const char *");
        assert_eq!(helper.signature(), "helper(int, const char *)");
        assert_eq!(helper.location().line, 1);
        assert!(helper.ast_dump().starts_with("FunctionDecl helper"));
        assert!(!helper.is_program_entry_point());

        let main = &decls[1];
        assert!(main.is_program_entry_point());
        assert!(!main.has_parameters());
        assert_ne!(helper.id(), main.id());
    }

    #[test]
    fn test_member_names() {
        let decls = declarations(
            "struct Widget { Widget() {} ~Widget() {} Widget &operator+=(int n) { return *this; } };\n",
        );
        let names: Vec<&str> = decls.iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["Widget", "~Widget", "operator+="]);
        assert_eq!(decls[0].return_type(), "void");
        assert_eq!(decls[1].qualified_name(), "Widget::~Widget");
        assert_eq!(decls[2].return_type(), "Widget &");
    }

    #[test]
    fn test_display_layout() {
        let decls = declarations("void f(int a) {}\n");
        let text = decls[0].to_string();
        assert!(text.contains("name f\n"));
        assert!(text.contains("return_type void\n"));
        assert!(text.contains("param.name a\n"));
        assert!(text.contains("param.type int\n"));
    }
}

//! Import usage detection.
//!
//! Walks the syntax tree once and marks an import used when a selector
//! (`pkg.Func`, `pkg.Type`) names it through an identifier that no enclosing
//! local declaration shadows.

use std::collections::{HashMap, HashSet};

use tree_sitter::Node;

use super::imports::{ImportName, ImportSpec};
use super::parser::ParsedUnit;
use crate::dependencies::PackageImports;

/// Import path to whether anything in the file references it.
pub type UsageMap = HashMap<String, bool>;

/// Node kinds the walk treats specially; everything else is `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    ImportDeclaration,
    PackageClause,
    SelectorExpression,
    QualifiedType,
    Function,
    Scope,
    TypeSwitch,
    ShortVarDeclaration,
    ValueSpec,
    RangeClause,
    ReceiveStatement,
    Other,
}

impl NodeKind {
    fn of(node: &Node) -> Self {
        match node.kind() {
            "import_declaration" => NodeKind::ImportDeclaration,
            "package_clause" => NodeKind::PackageClause,
            "selector_expression" => NodeKind::SelectorExpression,
            "qualified_type" => NodeKind::QualifiedType,
            "function_declaration" | "method_declaration" | "func_literal" => NodeKind::Function,
            "block"
            | "if_statement"
            | "for_statement"
            | "expression_switch_statement"
            | "select_statement"
            | "expression_case"
            | "type_case"
            | "default_case"
            | "communication_case" => NodeKind::Scope,
            "type_switch_statement" => NodeKind::TypeSwitch,
            "short_var_declaration" => NodeKind::ShortVarDeclaration,
            "var_spec" | "const_spec" => NodeKind::ValueSpec,
            "range_clause" => NodeKind::RangeClause,
            "receive_statement" => NodeKind::ReceiveStatement,
            _ => NodeKind::Other,
        }
    }
}

/// Reports, for every import of the file, whether it is referenced.
///
/// Blank and dot imports are always used. Names come from `packages` when the
/// loader resolved the path, else from Go's assumed-name rule.
pub fn used_imports(unit: &ParsedUnit, specs: &[ImportSpec], packages: &PackageImports) -> UsageMap {
    let mut used = UsageMap::with_capacity(specs.len());
    let mut names: HashMap<String, String> = HashMap::with_capacity(specs.len());

    for spec in specs {
        let name = match &spec.name {
            ImportName::Blank | ImportName::Dot => {
                used.insert(spec.path.clone(), true);
                continue;
            }
            ImportName::Alias(alias) => alias.clone(),
            ImportName::Default => packages
                .name_of(&spec.path)
                .map(String::from)
                .unwrap_or_else(|| spec.assumed_name()),
        };
        used.entry(spec.path.clone()).or_insert(false);
        names.insert(name, spec.path.clone());
    }

    let mut walker = UsageWalker {
        unit,
        names: &names,
        used: &mut used,
        scopes: Vec::new(),
    };
    walker.visit(unit.root_node());

    used
}

struct UsageWalker<'a> {
    unit: &'a ParsedUnit,
    names: &'a HashMap<String, String>,
    used: &'a mut UsageMap,
    /// Local names per open block; empty at package level.
    scopes: Vec<HashSet<String>>,
}

impl<'a> UsageWalker<'a> {
    fn visit(&mut self, node: Node<'_>) {
        match NodeKind::of(&node) {
            NodeKind::ImportDeclaration | NodeKind::PackageClause => {}
            NodeKind::SelectorExpression => {
                if let Some(operand) = node.child_by_field_name("operand") {
                    if operand.kind() == "identifier" {
                        self.reference(operand);
                    } else {
                        self.visit(operand);
                    }
                }
            }
            NodeKind::QualifiedType => {
                if let Some(package) = node.child_by_field_name("package") {
                    self.reference(package);
                }
            }
            NodeKind::Function => self.visit_function(node),
            NodeKind::Scope => {
                self.scopes.push(HashSet::new());
                self.visit_children(node);
                self.scopes.pop();
            }
            NodeKind::TypeSwitch => {
                self.scopes.push(HashSet::new());
                for field in ["initializer", "value"] {
                    if let Some(part) = node.child_by_field_name(field) {
                        self.visit(part);
                    }
                }
                if let Some(alias) = node.child_by_field_name("alias") {
                    self.declare_all(alias);
                }
                let mut cursor = node.walk();
                let cases: Vec<Node<'_>> = node
                    .named_children(&mut cursor)
                    .filter(|c| matches!(c.kind(), "type_case" | "default_case"))
                    .collect();
                for case in cases {
                    self.visit(case);
                }
                self.scopes.pop();
            }
            NodeKind::ShortVarDeclaration | NodeKind::RangeClause | NodeKind::ReceiveStatement => {
                if let Some(right) = node.child_by_field_name("right") {
                    self.visit(right);
                }
                if let Some(left) = node.child_by_field_name("left") {
                    if self.defines(node) {
                        self.declare_all(left);
                    } else {
                        self.visit(left);
                    }
                }
            }
            NodeKind::ValueSpec => {
                if let Some(ty) = node.child_by_field_name("type") {
                    self.visit(ty);
                }
                if let Some(value) = node.child_by_field_name("value") {
                    self.visit(value);
                }
                let mut cursor = node.walk();
                let names: Vec<Node<'_>> = node.children_by_field_name("name", &mut cursor).collect();
                for name in names {
                    self.declare(name);
                }
            }
            NodeKind::Other => self.visit_children(node),
        }
    }

    fn visit_children(&mut self, node: Node<'_>) {
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
        for child in children {
            self.visit(child);
        }
    }

    /// Type parameters are visible in the whole signature. Other signature
    /// types resolve outside the function; receiver, parameter and result
    /// names are only visible in the body.
    fn visit_function(&mut self, node: Node<'_>) {
        let signature: Vec<Node<'_>> = ["receiver", "type_parameters", "parameters", "result"]
            .iter()
            .filter_map(|field| node.child_by_field_name(field))
            .collect();

        self.scopes.push(HashSet::new());
        if let Some(type_params) = node.child_by_field_name("type_parameters") {
            self.declare_parameters(type_params);
        }
        for part in &signature {
            self.visit_parameter_types(*part);
        }
        for part in signature.iter().filter(|part| part.kind() == "parameter_list") {
            self.declare_parameters(*part);
        }
        if let Some(body) = node.child_by_field_name("body") {
            self.visit_children(body);
        }
        self.scopes.pop();
    }

    fn visit_parameter_types(&mut self, list: Node<'_>) {
        if list.kind() != "parameter_list" && list.kind() != "type_parameter_list" {
            // Unnamed single result type.
            self.visit(list);
            return;
        }
        let mut cursor = list.walk();
        let params: Vec<Node<'_>> = list.named_children(&mut cursor).collect();
        for param in params {
            match param.child_by_field_name("type") {
                Some(ty) => self.visit(ty),
                None => self.visit(param),
            }
        }
    }

    /// Declares the names of a parameter list or a type parameter list.
    fn declare_parameters(&mut self, list: Node<'_>) {
        if list.kind() != "parameter_list" && list.kind() != "type_parameter_list" {
            return;
        }
        let mut cursor = list.walk();
        let params: Vec<Node<'_>> = list.named_children(&mut cursor).collect();
        for param in params {
            let mut name_cursor = param.walk();
            let names: Vec<Node<'_>> = param.children_by_field_name("name", &mut name_cursor).collect();
            for name in names {
                self.declare(name);
            }
        }
    }

    /// `:=` rather than `=`.
    fn defines(&self, node: Node<'_>) -> bool {
        if node.kind() == "short_var_declaration" {
            return true;
        }
        let mut cursor = node.walk();
        let defines = node.children(&mut cursor).any(|c| c.kind() == ":=");
        defines
    }

    fn declare_all(&mut self, list: Node<'_>) {
        if list.kind() == "identifier" {
            self.declare(list);
            return;
        }
        let mut cursor = list.walk();
        let idents: Vec<Node<'_>> = list
            .named_children(&mut cursor)
            .filter(|c| c.kind() == "identifier")
            .collect();
        for ident in idents {
            self.declare(ident);
        }
    }

    fn declare(&mut self, ident: Node<'_>) {
        let name = self.unit.node_text(&ident);
        if name == "_" {
            return;
        }
        // Package level declarations are not tracked.
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string());
        }
    }

    fn reference(&mut self, ident: Node<'_>) {
        let name = self.unit.node_text(&ident);
        if self.scopes.iter().any(|scope| scope.contains(name)) {
            return;
        }
        if let Some(path) = self.names.get(name) {
            self.used.insert(path.clone(), true);
        }
    }
}

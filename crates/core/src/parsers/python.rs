use crate::models::StaticImport;
use tree_sitter::Node;

use super::{ParserError, SyntaxTree};

/// Extracts `import` and `from ... import` statements from a Python syntax tree
#[derive(Debug, Default)]
pub struct PythonParser;

impl PythonParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse source text and extract its import statements
    pub fn parse(&self, source: &str) -> Result<Vec<StaticImport>, ParserError> {
        let tree = SyntaxTree::parse(source)?;
        Ok(self.extract(&tree))
    }

    /// Walk the whole tree, including function bodies and branches
    pub fn extract(&self, tree: &SyntaxTree) -> Vec<StaticImport> {
        let mut imports = Vec::new();
        self.traverse_node(&tree.root(), tree, &mut imports);
        imports
    }

    fn traverse_node(&self, node: &Node, tree: &SyntaxTree, imports: &mut Vec<StaticImport>) {
        match node.kind() {
            "import_statement" => {
                self.parse_import_statement(node, tree, imports);
            }
            "import_from_statement" => {
                self.parse_import_from_statement(node, tree, imports);
            }
            _ => {
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    self.traverse_node(&child, tree, imports);
                }
            }
        }
    }

    /// Parse `import x, y.z` or `import x as alias`
    fn parse_import_statement(
        &self,
        node: &Node,
        tree: &SyntaxTree,
        imports: &mut Vec<StaticImport>,
    ) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            let (module, alias) = match child.kind() {
                "dotted_name" => (tree.text(&child).to_string(), None),
                "aliased_import" => self.parse_aliased_import(&child, tree),
                _ => continue,
            };
            if module.is_empty() {
                continue;
            }
            imports.push(StaticImport {
                module,
                items: vec![],
                alias,
                line: child.start_position().row + 1,
            });
        }
    }

    /// Parse `from x import y, z` or `from . import x` or `from ..x import y`
    fn parse_import_from_statement(
        &self,
        node: &Node,
        tree: &SyntaxTree,
        imports: &mut Vec<StaticImport>,
    ) {
        let Some(module_node) = node.child_by_field_name("module_name") else {
            return;
        };
        let module = tree.text(&module_node).to_string();

        let mut items = Vec::new();
        let mut alias = None;

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.id() == module_node.id() {
                continue;
            }
            match child.kind() {
                "dotted_name" | "identifier" => {
                    items.push(tree.text(&child).to_string());
                }
                "aliased_import" => {
                    let (name, al) = self.parse_aliased_import(&child, tree);
                    items.push(name);
                    if al.is_some() {
                        alias = al;
                    }
                }
                "wildcard_import" => {
                    items.push("*".to_string());
                }
                _ => {}
            }
        }

        imports.push(StaticImport {
            module,
            items,
            alias,
            line: node.start_position().row + 1,
        });
    }

    /// Parse aliased import (x as y)
    fn parse_aliased_import(&self, node: &Node, tree: &SyntaxTree) -> (String, Option<String>) {
        let name = node
            .child_by_field_name("name")
            .map(|n| tree.text(&n).to_string())
            .unwrap_or_default();
        let alias = node
            .child_by_field_name("alias")
            .map(|n| tree.text(&n).to_string());

        (name, alias)
    }
}

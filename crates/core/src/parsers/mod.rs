mod python;

pub use python::PythonParser;

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tree_sitter::{Node, Parser, Tree};

#[derive(Error, Debug)]
pub enum ParserError {
    #[error("Failed to initialize parser: {0}")]
    InitError(String),
    #[error("Failed to parse source code: {0}")]
    ParseError(String),
    #[error("Failed to read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Python source text together with its parsed tree
pub struct SyntaxTree {
    source: String,
    tree: Tree,
}

impl SyntaxTree {
    /// Parse raw Python source text
    pub fn parse(source: impl Into<String>) -> Result<Self, ParserError> {
        let source = source.into();
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| ParserError::InitError(e.to_string()))?;

        let tree = parser
            .parse(&source, None)
            .ok_or_else(|| ParserError::ParseError("parser returned no tree".to_string()))?;

        Ok(Self { source, tree })
    }

    /// Read and parse a Python source file
    pub fn from_file(path: &Path) -> Result<Self, ParserError> {
        let source = fs::read_to_string(path).map_err(|source| ParserError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(source)
    }

    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn text(&self, node: &Node) -> &str {
        &self.source[node.byte_range()]
    }

    /// Whether tree-sitter had to recover from syntax errors
    pub fn has_errors(&self) -> bool {
        self.root().has_error()
    }
}

/// Whether a path looks like Python source we can parse
pub fn is_python_source(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("py") | Some("pyw") | Some("pyi")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_text() {
        let tree = SyntaxTree::parse("import os\n").unwrap();
        assert_eq!(tree.root().kind(), "module");
        assert!(!tree.has_errors());
        assert_eq!(tree.source(), "import os\n");
    }

    #[test]
    fn test_parse_recovers_from_errors() {
        let tree = SyntaxTree::parse("import os\ndef broken(:\n").unwrap();
        assert!(tree.has_errors());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::Builder::new().suffix(".py").tempfile().unwrap();
        writeln!(file, "import json").unwrap();

        let tree = SyntaxTree::from_file(file.path()).unwrap();
        let first = tree.root().child(0).unwrap();
        assert_eq!(tree.text(&first), "import json");
    }

    #[test]
    fn test_from_missing_file() {
        let err = SyntaxTree::from_file(Path::new("/nonexistent/nowhere.py"));
        assert!(matches!(err, Err(ParserError::ReadError { .. })));
    }

    #[test]
    fn test_is_python_source() {
        assert!(is_python_source(Path::new("pkg/__init__.py")));
        assert!(!is_python_source(Path::new("_ssl.cpython-311-x86_64-linux-gnu.so")));
        assert!(!is_python_source(Path::new("README")));
    }
}

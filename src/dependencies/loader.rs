//! Loading declared package names from the Go toolchain.

use std::path::Path;
use std::process::Command;

use serde::Deserialize;

use super::PackageImports;
use crate::error::{ReviserError, Result};

/// Produces the package table for one directory and build tag set.
pub trait PackageLoader: Send + Sync {
    fn load(&self, dir: &Path, build_tags: &str) -> Result<PackageImports>;
}

/// Runs `go list -deps -test -json=ImportPath,Name` in the directory.
#[derive(Debug, Clone)]
pub struct GoListLoader {
    go_binary: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListedPackage {
    import_path: String,
    #[serde(default)]
    name: String,
}

impl GoListLoader {
    pub fn new() -> Self {
        Self {
            go_binary: "go".to_string(),
        }
    }

    pub fn with_binary(mut self, go_binary: impl Into<String>) -> Self {
        self.go_binary = go_binary.into();
        self
    }

    fn args(build_tags: &str) -> Vec<String> {
        let mut args = vec![
            "list".to_string(),
            "-deps".to_string(),
            "-test".to_string(),
            "-json=ImportPath,Name".to_string(),
        ];
        if !build_tags.is_empty() {
            args.push(format!("-tags={}", build_tags));
        }
        args
    }
}

impl Default for GoListLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl PackageLoader for GoListLoader {
    fn load(&self, dir: &Path, build_tags: &str) -> Result<PackageImports> {
        let load_error = |message: String| ReviserError::DependencyLoad {
            dir: dir.display().to_string(),
            message,
        };

        let output = Command::new(&self.go_binary)
            .args(Self::args(build_tags))
            .current_dir(dir)
            .output()
            .map_err(|e| load_error(format!("failed to run {}: {}", self.go_binary, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(load_error(stderr.trim().to_string()));
        }

        parse_go_list(&output.stdout).map_err(|e| load_error(e.to_string()))
    }
}

/// Decodes the concatenated JSON objects `go list -json` prints.
fn parse_go_list(stdout: &[u8]) -> Result<PackageImports> {
    let mut names = Vec::new();
    for package in serde_json::Deserializer::from_slice(stdout).into_iter::<ListedPackage>() {
        let package = package?;
        if package.name.is_empty() {
            continue;
        }
        // Test variants are listed as `path [path.test]`.
        let path = match package.import_path.split_once(' ') {
            Some((path, _)) => path.to_string(),
            None => package.import_path,
        };
        names.push((path, package.name));
    }
    Ok(names.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_go_list_stream() {
        let stdout = br#"{
	"ImportPath": "fmt",
	"Name": "fmt"
}
{
	"ImportPath": "github.com/go-pg/pg/v9",
	"Name": "pg"
}
{
	"ImportPath": "example.com/app [example.com/app.test]",
	"Name": "app"
}
"#;
        let imports = parse_go_list(stdout).unwrap();
        assert_eq!(imports.name_of("github.com/go-pg/pg/v9"), Some("pg"));
        assert_eq!(imports.name_of("example.com/app"), Some("app"));
        assert_eq!(imports.len(), 3);
    }

    #[test]
    fn test_parse_go_list_rejects_garbage() {
        assert!(parse_go_list(b"{\"ImportPath\": ").is_err());
    }

    #[test]
    fn test_args_with_tags() {
        let args = GoListLoader::args("integration,linux");
        assert_eq!(args.last().map(String::as_str), Some("-tags=integration,linux"));
        assert_eq!(GoListLoader::args("").len(), 4);
    }

    #[test]
    fn test_missing_binary_is_dependency_error() {
        let dir = tempfile::tempdir().unwrap();
        let loader = GoListLoader::new().with_binary("definitely-not-a-go-binary");
        let err = loader.load(dir.path(), "").unwrap_err();
        assert!(matches!(err, ReviserError::DependencyLoad { .. }));
    }
}

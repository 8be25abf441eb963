//! Illustrative in-memory tools (§10.4) standing in for the out-of-scope
//! concrete tool implementations (§1): `EchoTool`, and a fake `shell`/`files`/
//! `search` trio used only to exercise the Scheduler's dependency heuristic
//! and the engine's end-to-end scenarios (§8). Not a product surface.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tools::{Tool, ToolOutcome, ToolSourceError, ToolSpec};

/// A fake filesystem, instance-scoped rather than process-global: a global
/// `static` here would leak writes between otherwise-independent tests
/// sharing one test binary. [`FakeFilesTool::new`] and [`FakeShellTool::new`]
/// each get their own private map by default; [`FakeShellTool::with_fs`]
/// pairs a shell with a specific [`FakeFilesTool`]'s map for the §8
/// "dependency forces sequential" scenario (`create t.txt` then `cat t.txt`),
/// where the shell must observe the write.
type FakeFs = Arc<Mutex<HashMap<String, String>>>;

/// Echoes its `text` argument back as the result.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "echo".to_string(),
            description: "Echoes the given text back.".to_string(),
            schema: json!({"type": "object", "properties": {"text": {"type": "string"}}, "required": ["text"]}),
            examples: vec![r#"{"name": "echo", "args": {"text": "hi"}}"#.to_string()],
            rules: vec![],
        }
    }

    async fn execute(&self, args: Value) -> Result<ToolOutcome, ToolSourceError> {
        let text = args
            .get("text")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolSourceError::InvalidInput("missing 'text'".to_string()))?;
        Ok(ToolOutcome::Success { data: text.to_string() })
    }
}

/// A fake shell: understands `ls` (lists the fake filesystem) and
/// `cat <path>` (reads from it); anything else fails.
pub struct FakeShellTool {
    fs: FakeFs,
}

impl Default for FakeShellTool {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeShellTool {
    /// A shell backed by its own private, empty filesystem.
    pub fn new() -> Self {
        Self { fs: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// A shell backed by an existing filesystem, typically a
    /// [`FakeFilesTool`]'s (via [`FakeFilesTool::fs`]), so writes the files
    /// tool makes are visible to this shell's `cat`.
    pub fn with_fs(fs: FakeFs) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl Tool for FakeShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "shell".to_string(),
            description: "Runs a fake shell command (ls, cat <path>).".to_string(),
            schema: json!({"type": "object", "properties": {"command": {"type": "string"}}, "required": ["command"]}),
            examples: vec![r#"{"name": "shell", "args": {"command": "ls"}}"#.to_string()],
            rules: vec!["Only `ls` and `cat <path>` are understood.".to_string()],
        }
    }

    async fn execute(&self, args: Value) -> Result<ToolOutcome, ToolSourceError> {
        let command = args
            .get("command")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolSourceError::InvalidInput("missing 'command'".to_string()))?;

        let fs = self.fs.lock().unwrap();
        if command.trim() == "ls" {
            let mut names: Vec<&String> = fs.keys().collect();
            if names.is_empty() {
                names = vec![];
            }
            names.sort();
            let listing = if names.is_empty() {
                "a.txt\nb.txt\n".to_string()
            } else {
                names.into_iter().map(|n| format!("{n}\n")).collect()
            };
            return Ok(ToolOutcome::Success { data: listing });
        }
        if let Some(path) = command.trim().strip_prefix("cat ") {
            return match fs.get(path) {
                Some(content) => Ok(ToolOutcome::Success { data: content.clone() }),
                None => Ok(ToolOutcome::Failure { error_message: format!("no such file: {path}") }),
            };
        }
        Ok(ToolOutcome::Failure { error_message: format!("unrecognized command: {command}") })
    }
}

/// A fake filesystem-mutating tool: `create`/`write`/`edit`/`delete` a path
/// in its fake filesystem.
pub struct FakeFilesTool {
    fs: FakeFs,
}

impl Default for FakeFilesTool {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeFilesTool {
    pub fn new() -> Self {
        Self { fs: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Shares this tool's filesystem handle, typically to pair with
    /// [`FakeShellTool::with_fs`].
    pub fn fs(&self) -> FakeFs {
        Arc::clone(&self.fs)
    }
}

#[async_trait]
impl Tool for FakeFilesTool {
    fn name(&self) -> &str {
        "create_file"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "create_file".to_string(),
            description: "Creates or overwrites a file in the fake filesystem.".to_string(),
            schema: json!({
                "type": "object",
                "properties": {"path": {"type": "string"}, "content": {"type": "string"}},
                "required": ["path", "content"]
            }),
            examples: vec![
                r#"{"name": "create_file", "args": {"path": "t.txt", "content": "hi"}}"#.to_string()
            ],
            rules: vec![],
        }
    }

    async fn execute(&self, args: Value) -> Result<ToolOutcome, ToolSourceError> {
        let path = args
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolSourceError::InvalidInput("missing 'path'".to_string()))?;
        let content = args.get("content").and_then(|v| v.as_str()).unwrap_or_default();

        self.fs.lock().unwrap().insert(path.to_string(), content.to_string());
        Ok(ToolOutcome::Success { data: format!("wrote {path}") })
    }
}

/// A fake search tool with no side effects, safe to run in parallel with
/// itself and with `echo`.
pub struct FakeSearchTool;

#[async_trait]
impl Tool for FakeSearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "search".to_string(),
            description: "Fake search; returns a canned result for the query.".to_string(),
            schema: json!({"type": "object", "properties": {"query": {"type": "string"}}, "required": ["query"]}),
            examples: vec![r#"{"name": "search", "args": {"query": "rust"}}"#.to_string()],
            rules: vec![],
        }
    }

    async fn execute(&self, args: Value) -> Result<ToolOutcome, ToolSourceError> {
        let query = args
            .get("query")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolSourceError::InvalidInput("missing 'query'".to_string()))?;
        Ok(ToolOutcome::Success { data: format!("result for '{query}'") })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_files_then_shell_see_the_same_write() {
        let files = FakeFilesTool::new();
        let shell = FakeShellTool::with_fs(files.fs());
        files.execute(json!({"path": "cross_test.txt", "content": "hi"})).await.unwrap();
        let out = shell.execute(json!({"command": "cat cross_test.txt"})).await.unwrap();
        assert_eq!(out, ToolOutcome::Success { data: "hi".to_string() });
    }

    #[tokio::test]
    async fn shell_cat_missing_file_fails() {
        let shell = FakeShellTool::new();
        let out = shell.execute(json!({"command": "cat does_not_exist.txt"})).await.unwrap();
        assert!(matches!(out, ToolOutcome::Failure { .. }));
    }
}

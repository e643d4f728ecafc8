//! Tool executor.
//!
//! Maps the model's named tool calls onto sandbox operations inside the
//! project directory. Every outcome, including failures, is returned as text
//! so the model can read the error and try again.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::debug;
use yeevu_llm::ToolSchema;
use yeevu_sandbox::{shell, CommandOptions, Sandbox, SandboxError};

/// Timeout applied to `Bash` tool commands.
pub const BASH_TIMEOUT: Duration = Duration::from_secs(60);

/// Upper bound on the size of any tool output.
pub const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Matches returned by `Glob` and `Grep`.
const SEARCH_LIMIT: usize = 100;

/// Tools the model can call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    Write,
    Read,
    Edit,
    Bash,
    Glob,
    Grep,
}

impl ToolName {
    pub const ALL: [ToolName; 6] = [
        ToolName::Write,
        ToolName::Read,
        ToolName::Edit,
        ToolName::Bash,
        ToolName::Glob,
        ToolName::Grep,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Write => "Write",
            Self::Read => "Read",
            Self::Edit => "Edit",
            Self::Bash => "Bash",
            Self::Glob => "Glob",
            Self::Grep => "Grep",
        }
    }

    /// Schema advertised to the model.
    pub fn schema(&self) -> ToolSchema {
        let (description, input_schema) = match self {
            Self::Write => (
                "Write content to a file in the project. Parent directories are created and existing files are overwritten.",
                json!({
                    "type": "object",
                    "properties": {
                        "file_path": {"type": "string", "description": "Path relative to the project root"},
                        "content": {"type": "string", "description": "Full file content"}
                    },
                    "required": ["file_path", "content"]
                }),
            ),
            Self::Read => (
                "Read the content of a file in the project.",
                json!({
                    "type": "object",
                    "properties": {
                        "file_path": {"type": "string", "description": "Path relative to the project root"}
                    },
                    "required": ["file_path"]
                }),
            ),
            Self::Edit => (
                "Replace the first occurrence of old_string with new_string in a file.",
                json!({
                    "type": "object",
                    "properties": {
                        "file_path": {"type": "string"},
                        "old_string": {"type": "string", "description": "Exact text to replace"},
                        "new_string": {"type": "string", "description": "Replacement text"}
                    },
                    "required": ["file_path", "old_string", "new_string"]
                }),
            ),
            Self::Bash => (
                "Run a shell command in the project directory. Long-running commands are stopped after a timeout.",
                json!({
                    "type": "object",
                    "properties": {
                        "command": {"type": "string"}
                    },
                    "required": ["command"]
                }),
            ),
            Self::Glob => (
                "Find files by name pattern, e.g. app/**/*.tsx.",
                json!({
                    "type": "object",
                    "properties": {
                        "pattern": {"type": "string"}
                    },
                    "required": ["pattern"]
                }),
            ),
            Self::Grep => (
                "Search file contents for a pattern.",
                json!({
                    "type": "object",
                    "properties": {
                        "pattern": {"type": "string"},
                        "path": {"type": "string", "description": "Directory or file to search, defaults to the project root"}
                    },
                    "required": ["pattern"]
                }),
            ),
        };
        ToolSchema {
            name: self.as_str().to_string(),
            description: description.to_string(),
            input_schema,
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolName::ALL
            .iter()
            .find(|t| t.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Unknown tool: {}", s))
    }
}

/// Schemas for an allowlist, in allowlist order.
pub fn tool_schemas(allowed: &[ToolName]) -> Vec<ToolSchema> {
    allowed.iter().map(ToolName::schema).collect()
}

/// Textual outcome of a tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    fn ok(content: impl Into<String>) -> Self {
        Self {
            content: bound_output(content.into()),
            is_error: false,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            content: bound_output(format!("Error: {}", message.into())),
            is_error: true,
        }
    }

    /// Failure text that keeps its own prefix (command failures).
    fn failure(content: String) -> Self {
        Self {
            content: bound_output(content),
            is_error: true,
        }
    }
}

fn bound_output(mut content: String) -> String {
    if content.len() > MAX_OUTPUT_BYTES {
        let mut cut = MAX_OUTPUT_BYTES;
        while !content.is_char_boundary(cut) {
            cut -= 1;
        }
        content.truncate(cut);
        content.push_str("\n[output truncated]");
    }
    content
}

/// Executes tool calls against a sandbox project directory.
pub struct ToolExecutor {
    sandbox: Arc<dyn Sandbox>,
    project_dir: String,
    allowed: Vec<ToolName>,
    bash_timeout: Duration,
}

impl ToolExecutor {
    pub fn new(sandbox: Arc<dyn Sandbox>, project_dir: impl Into<String>) -> Self {
        Self {
            sandbox,
            project_dir: project_dir.into().trim_end_matches('/').to_string(),
            allowed: ToolName::ALL.to_vec(),
            bash_timeout: BASH_TIMEOUT,
        }
    }

    /// Restrict the tools that may be executed.
    pub fn allow(mut self, tools: &[ToolName]) -> Self {
        self.allowed = tools.to_vec();
        self
    }

    pub fn bash_timeout(mut self, timeout: Duration) -> Self {
        self.bash_timeout = timeout;
        self
    }

    pub fn project_dir(&self) -> &str {
        &self.project_dir
    }

    pub fn allowed(&self) -> &[ToolName] {
        &self.allowed
    }

    /// Project-relative form of a model-supplied path.
    ///
    /// Absolute paths inside the project are accepted; anything that could
    /// escape the project directory is rejected.
    pub fn relative_path(&self, file_path: &str) -> Result<String, String> {
        let trimmed = file_path.trim();
        let prefix = format!("{}/", self.project_dir);
        let relative = trimmed
            .strip_prefix(&prefix)
            .unwrap_or(trimmed)
            .trim_start_matches("./")
            .trim_start_matches('/');

        if relative.is_empty() {
            return Err(format!("Invalid file path: {:?}", file_path));
        }
        if relative.split('/').any(|segment| segment == "..") {
            return Err(format!("Path outside project directory: {}", file_path));
        }
        Ok(relative.to_string())
    }

    fn absolute(&self, relative: &str) -> String {
        format!("{}/{}", self.project_dir, relative)
    }

    /// Execute one tool call.
    pub async fn execute(&self, name: &str, input: &Value) -> ToolOutput {
        let tool = match ToolName::from_str(name) {
            Ok(tool) if self.allowed.contains(&tool) => tool,
            _ => return ToolOutput::error(format!("Unknown tool: {}", name)),
        };
        debug!("Executing tool {} with {}", tool, input);

        match tool {
            ToolName::Write => self.write(input).await,
            ToolName::Read => self.read(input).await,
            ToolName::Edit => self.edit(input).await,
            ToolName::Bash => self.bash(input).await,
            ToolName::Glob => self.glob(input).await,
            ToolName::Grep => self.grep(input).await,
        }
    }

    async fn write(&self, input: &Value) -> ToolOutput {
        let (file_path, content) = match (str_field(input, "file_path"), str_field(input, "content")) {
            (Ok(p), Ok(c)) => (p, c),
            (Err(e), _) | (_, Err(e)) => return ToolOutput::error(format!("Invalid input for Write: {}", e)),
        };
        let relative = match self.relative_path(file_path) {
            Ok(r) => r,
            Err(e) => return ToolOutput::error(e),
        };

        match self
            .sandbox
            .upload_file(&self.absolute(&relative), content.as_bytes())
            .await
        {
            Ok(()) => ToolOutput::ok(format!(
                "Successfully wrote {} characters to {}",
                content.chars().count(),
                file_path
            )),
            Err(e) => ToolOutput::error(format!("Failed to write {}: {}", file_path, e)),
        }
    }

    async fn read(&self, input: &Value) -> ToolOutput {
        let file_path = match str_field(input, "file_path") {
            Ok(p) => p,
            Err(e) => return ToolOutput::error(format!("Invalid input for Read: {}", e)),
        };
        let relative = match self.relative_path(file_path) {
            Ok(r) => r,
            Err(e) => return ToolOutput::error(e),
        };

        match self.sandbox.download_file(&self.absolute(&relative)).await {
            Ok(Some(bytes)) => ToolOutput::ok(String::from_utf8_lossy(&bytes).to_string()),
            Ok(None) => ToolOutput::error(format!("File not found: {}", file_path)),
            Err(e) => ToolOutput::error(format!("Failed to read {}: {}", file_path, e)),
        }
    }

    async fn edit(&self, input: &Value) -> ToolOutput {
        let fields = (
            str_field(input, "file_path"),
            str_field(input, "old_string"),
            str_field(input, "new_string"),
        );
        let (file_path, old_string, new_string) = match fields {
            (Ok(p), Ok(o), Ok(n)) => (p, o, n),
            (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => {
                return ToolOutput::error(format!("Invalid input for Edit: {}", e))
            }
        };
        let relative = match self.relative_path(file_path) {
            Ok(r) => r,
            Err(e) => return ToolOutput::error(e),
        };
        let absolute = self.absolute(&relative);

        let current = match self.sandbox.download_file(&absolute).await {
            Ok(Some(bytes)) => String::from_utf8_lossy(&bytes).to_string(),
            Ok(None) => return ToolOutput::error(format!("File not found: {}", file_path)),
            Err(e) => return ToolOutput::error(format!("Failed to read {}: {}", file_path, e)),
        };

        if old_string.is_empty() || !current.contains(old_string) {
            return ToolOutput::error(format!(
                "String not found in file: {}",
                crate::events::preview(old_string, 100)
            ));
        }

        let updated = current.replacen(old_string, new_string, 1);
        match self.sandbox.upload_file(&absolute, updated.as_bytes()).await {
            Ok(()) => ToolOutput::ok(format!("Successfully edited {}", file_path)),
            Err(e) => ToolOutput::error(format!("Failed to write {}: {}", file_path, e)),
        }
    }

    async fn bash(&self, input: &Value) -> ToolOutput {
        let command = match str_field(input, "command") {
            Ok(c) => c,
            Err(e) => return ToolOutput::error(format!("Invalid input for Bash: {}", e)),
        };
        let options = CommandOptions::new()
            .cwd(self.project_dir.clone())
            .timeout(self.bash_timeout);

        match self.sandbox.execute_command(command, &options).await {
            Ok(output) if output.success() => {
                if output.result.trim().is_empty() {
                    ToolOutput::ok("Command executed successfully")
                } else {
                    ToolOutput::ok(output.result)
                }
            }
            Ok(output) => ToolOutput::failure(format!(
                "Error executing command: Command failed with exit code {}\nOutput: {}",
                output.exit_code, output.result
            )),
            Err(SandboxError::Timeout(_)) => ToolOutput::failure(format!(
                "Error executing command: Command timed out after {} seconds",
                self.bash_timeout.as_secs()
            )),
            Err(e) => ToolOutput::failure(format!("Error executing command: {}", e)),
        }
    }

    async fn glob(&self, input: &Value) -> ToolOutput {
        let pattern = match str_field(input, "pattern") {
            Ok(p) => p,
            Err(e) => return ToolOutput::error(format!("Invalid input for Glob: {}", e)),
        };
        let (dir, name) = split_glob(pattern);
        if dir.split('/').any(|segment| segment == "..") {
            return ToolOutput::error(format!("Path outside project directory: {}", pattern));
        }
        let command = format!(
            "find {} \\( -name node_modules -o -name .next \\) -prune -o -type f -name {} -print 2>/dev/null | head -{}",
            shell::quote(&dir),
            shell::quote(&name),
            SEARCH_LIMIT
        );
        let options = CommandOptions::new()
            .cwd(self.project_dir.clone())
            .timeout(self.bash_timeout);

        match self.sandbox.execute_command(&command, &options).await {
            Ok(output) => {
                let files = shell::parse_listing(&output.result);
                if files.is_empty() {
                    ToolOutput::ok(format!("No files found matching pattern: {}", pattern))
                } else {
                    ToolOutput::ok(files.join("\n"))
                }
            }
            Err(e) => ToolOutput::error(format!("Glob failed: {}", e)),
        }
    }

    async fn grep(&self, input: &Value) -> ToolOutput {
        let pattern = match str_field(input, "pattern") {
            Ok(p) => p,
            Err(e) => return ToolOutput::error(format!("Invalid input for Grep: {}", e)),
        };
        let path = match input.get("path").and_then(Value::as_str) {
            Some(p) => match self.relative_path(p) {
                Ok(r) => r,
                Err(e) => return ToolOutput::error(e),
            },
            None => ".".to_string(),
        };
        let command = format!(
            "grep -rn --exclude-dir=node_modules --exclude-dir=.next -e {} {} 2>/dev/null | head -{}",
            shell::quote(pattern),
            shell::quote(&path),
            SEARCH_LIMIT
        );
        let options = CommandOptions::new()
            .cwd(self.project_dir.clone())
            .timeout(self.bash_timeout);

        match self.sandbox.execute_command(&command, &options).await {
            Ok(output) if output.result.trim().is_empty() => ToolOutput::ok("No matches found"),
            Ok(output) => ToolOutput::ok(output.result),
            Err(e) => ToolOutput::error(format!("Grep failed: {}", e)),
        }
    }
}

fn str_field<'a>(input: &'a Value, key: &str) -> Result<&'a str, String> {
    input
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("missing string field '{}'", key))
}

/// Split a glob into a literal search directory and a `find -name` pattern.
fn split_glob(pattern: &str) -> (String, String) {
    let trimmed = pattern.trim().trim_start_matches("./").trim_start_matches('/');
    let segments: Vec<&str> = trimmed.split('/').filter(|s| !s.is_empty()).collect();
    let name = segments.last().copied().unwrap_or("*").to_string();

    let literal: Vec<&str> = segments
        .iter()
        .take(segments.len().saturating_sub(1))
        .take_while(|s| !s.contains(['*', '?', '[']))
        .copied()
        .collect();
    let dir = if literal.is_empty() {
        ".".to_string()
    } else {
        literal.join("/")
    };
    (dir, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use yeevu_sandbox::{MockResponse, MockSandbox};

    const ROOT: &str = "/home/daytona/website-project";

    fn executor(sandbox: &MockSandbox) -> ToolExecutor {
        ToolExecutor::new(Arc::new(sandbox.clone()), ROOT)
    }

    #[tokio::test]
    async fn test_write_then_read_round_trip() {
        let sandbox = MockSandbox::default();
        let tools = executor(&sandbox);

        let content = "export default function Page() {\n  return <main>Hi</main>\n}\n";
        let written = tools
            .execute("Write", &json!({"file_path": "app/page.tsx", "content": content}))
            .await;
        assert!(!written.is_error);
        assert_eq!(
            written.content,
            format!("Successfully wrote {} characters to app/page.tsx", content.chars().count())
        );
        assert_eq!(sandbox.file(&format!("{}/app/page.tsx", ROOT)).as_deref(), Some(content));

        let read = tools
            .execute("Read", &json!({"file_path": format!("{}/app/page.tsx", ROOT)}))
            .await;
        assert_eq!(read.content, content);
    }

    #[tokio::test]
    async fn test_read_missing_file_is_recoverable() {
        let sandbox = MockSandbox::default();
        let output = executor(&sandbox)
            .execute("Read", &json!({"file_path": "nope.txt"}))
            .await;
        assert!(output.is_error);
        assert_eq!(output.content, "Error: File not found: nope.txt");
    }

    #[tokio::test]
    async fn test_edit_replaces_first_occurrence_once() {
        let sandbox = MockSandbox::default()
            .with_file(format!("{}/app/page.tsx", ROOT), "<h1>Hello</h1><h1>Hello</h1>");
        let tools = executor(&sandbox);
        let input = json!({
            "file_path": "app/page.tsx",
            "old_string": "<h1>Hello</h1><h1>",
            "new_string": "<h1>Bye</h1><h2>"
        });

        let first = tools.execute("Edit", &input).await;
        assert!(!first.is_error, "{}", first.content);
        assert_eq!(
            sandbox.file(&format!("{}/app/page.tsx", ROOT)).as_deref(),
            Some("<h1>Bye</h1><h2>Hello</h1>")
        );

        let second = tools.execute("Edit", &input).await;
        assert!(second.is_error);
        assert!(second.content.starts_with("Error: String not found in file:"));
    }

    #[tokio::test]
    async fn test_bash_failure_is_data() {
        let sandbox = MockSandbox::default()
            .respond_to("npm run build", MockResponse::failure(1, "Type error"))
            .respond_to("sleep", MockResponse::timeout());
        let tools = executor(&sandbox);

        let failed = tools.execute("Bash", &json!({"command": "npm run build"})).await;
        assert!(failed.is_error);
        assert!(failed.content.starts_with("Error executing command:"));
        assert!(failed.content.contains("Type error"));

        let timed_out = tools.execute("Bash", &json!({"command": "sleep 999"})).await;
        assert!(timed_out.content.contains("timed out after 60 seconds"));

        let commands = sandbox.get_commands();
        assert_eq!(commands[0].options.cwd.as_deref(), Some(ROOT));
        assert_eq!(commands[0].options.timeout, Some(BASH_TIMEOUT));
    }

    #[tokio::test]
    async fn test_unknown_and_disallowed_tools() {
        let sandbox = MockSandbox::default();
        let tools = executor(&sandbox).allow(&[ToolName::Write]);

        let unknown = tools.execute("Deploy", &json!({})).await;
        assert_eq!(unknown.content, "Error: Unknown tool: Deploy");

        let disallowed = tools.execute("Bash", &json!({"command": "ls"})).await;
        assert_eq!(disallowed.content, "Error: Unknown tool: Bash");
        assert!(sandbox.get_commands().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_input_and_traversal() {
        let sandbox = MockSandbox::default();
        let tools = executor(&sandbox);

        let missing = tools.execute("Write", &json!({"file_path": "a.txt"})).await;
        assert!(missing.content.contains("missing string field 'content'"));

        let escape = tools
            .execute("Write", &json!({"file_path": "../../etc/passwd", "content": "x"}))
            .await;
        assert!(escape.is_error);
        assert!(sandbox.paths().is_empty());
    }

    #[tokio::test]
    async fn test_search_tools_report_no_matches() {
        let sandbox = MockSandbox::default()
            .respond_to("find", MockResponse::success(""))
            .respond_to("grep", MockResponse::failure(1, ""));
        let tools = executor(&sandbox);

        let glob = tools.execute("Glob", &json!({"pattern": "app/**/*.tsx"})).await;
        assert_eq!(glob.content, "No files found matching pattern: app/**/*.tsx");
        assert!(sandbox.get_commands()[0].command.starts_with("find 'app'"));

        let grep = tools.execute("Grep", &json!({"pattern": "useState"})).await;
        assert_eq!(grep.content, "No matches found");
    }

    #[test]
    fn test_split_glob() {
        assert_eq!(split_glob("**/*.tsx"), (".".to_string(), "*.tsx".to_string()));
        assert_eq!(split_glob("app/**/*.tsx"), ("app".to_string(), "*.tsx".to_string()));
        assert_eq!(split_glob("package.json"), (".".to_string(), "package.json".to_string()));
        assert_eq!(
            split_glob("./components/ui/*.tsx"),
            ("components/ui".to_string(), "*.tsx".to_string())
        );
    }

    #[test]
    fn test_tool_schemas_follow_allowlist() {
        let schemas = tool_schemas(&[ToolName::Write, ToolName::Read]);
        let names: Vec<_> = schemas.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Write", "Read"]);
        assert_eq!(schemas[0].input_schema["required"], json!(["file_path", "content"]));
    }
}

//! Safety Layer
//!
//! Three policies guard every mutating tool: dangerous-command detection,
//! project-root path sandboxing, and a protected-path list for blind
//! overwrites. Each check returns `None` to permit or a denial message.
//! A matched policy asks the confirmation handler before denying.

use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, LazyLock, RwLock};

use regex::Regex;

// ---------------------------------------------------------------------------
// Confirmation handler
// ---------------------------------------------------------------------------

/// Yes/no question put to the environment before a risky action proceeds.
/// The REPL renders the prompt and collects a y/N answer; tests install a
/// stub. Tool execution is serial, so at most one confirmation is in flight.
pub type ConfirmationHandler = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Default handler: deny everything.
pub fn deny_all() -> ConfirmationHandler {
    Arc::new(|_| false)
}

// ---------------------------------------------------------------------------
// Dangerous command patterns
// ---------------------------------------------------------------------------

/// Shell patterns that destroy data, with a human label for the
/// confirmation prompt.
static DANGEROUS_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"\brm\b", "file deletion (rm)"),
        (r"\bunlink\b", "file deletion (unlink)"),
        (r"\brmdir\b", "directory removal (rmdir)"),
        (r"\bshred\b", "secure file deletion (shred)"),
        (r"\btruncate\b", "file truncation (truncate)"),
        (r">\s*/dev/null", "output redirect to /dev/null"),
        (r">\s*\S+\.(ts|json)\b", "shell redirect overwriting a source file"),
        (r"\bgit\s+clean\b", "git clean (removes untracked files)"),
        (
            r"\bgit\s+checkout\s+--\s+\.",
            "git checkout -- . (discards working tree changes)",
        ),
        (
            r"\bgit\s+reset\s+--hard\b",
            "git reset --hard (discards commits and changes)",
        ),
    ]
    .into_iter()
    .map(|(pattern, label)| (Regex::new(pattern).expect("static pattern"), label))
    .collect()
});

/// Relative paths the write tool may not blind-overwrite. Surgical edits of
/// these files are always permitted.
const PROTECTED_PATHS: &[&str] = &[
    "package.json",
    "package-lock.json",
    "tsconfig.json",
    ".gitignore",
    ".env",
    ".env.example",
    "node_modules",
];

// ---------------------------------------------------------------------------
// Path normalization
// ---------------------------------------------------------------------------

/// Normalize a path to absolute form without touching the filesystem, so
/// targets that do not exist yet can still be checked. `.` components are
/// dropped and `..` pops the previous component.
pub fn normalize_path(path: &Path, cwd: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

// ---------------------------------------------------------------------------
// Safety gate
// ---------------------------------------------------------------------------

/// Policy checks shared by the mutating tools. The project root is captured
/// once at construction; the confirmation handler can be replaced atomically
/// (the REPL swaps in its prompt after startup).
pub struct SafetyGate {
    project_root: PathBuf,
    confirm: RwLock<ConfirmationHandler>,
}

impl SafetyGate {
    pub fn new(project_root: impl Into<PathBuf>, confirm: ConfirmationHandler) -> Self {
        Self {
            project_root: project_root.into(),
            confirm: RwLock::new(confirm),
        }
    }

    /// Gate rooted at the process cwd with the deny-all handler.
    pub fn for_cwd() -> Self {
        let root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::new(root, deny_all())
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Replace the confirmation handler.
    pub fn set_handler(&self, handler: ConfirmationHandler) {
        *self.confirm.write().expect("confirmation handler lock") = handler;
    }

    fn ask(&self, prompt: &str) -> bool {
        let handler = self.confirm.read().expect("confirmation handler lock");
        handler(prompt)
    }

    /// Check a shell command against the dangerous-pattern table.
    /// Returns `None` to permit, or a denial message. Safe commands never
    /// reach the confirmation handler.
    pub fn check_command(&self, command: &str) -> Option<String> {
        let (_, label) = DANGEROUS_PATTERNS
            .iter()
            .find(|(re, _)| re.is_match(command))?;

        let prompt = format!(
            "Command '{}' matches a destructive pattern: {}. Run it anyway?",
            command, label
        );
        if self.ask(&prompt) {
            None
        } else {
            Some(format!("Denied: '{}' ({})", command, label))
        }
    }

    /// Check that a path stays inside the project root. Paths outside
    /// trigger confirmation; denial names both paths.
    pub fn check_path(&self, path: &Path) -> Option<String> {
        let normalized = normalize_path(path, &self.project_root);
        if normalized.starts_with(&self.project_root) {
            return None;
        }

        let prompt = format!(
            "Path '{}' is outside the project root '{}'. Allow access?",
            normalized.display(),
            self.project_root.display()
        );
        if self.ask(&prompt) {
            None
        } else {
            Some(format!(
                "Denied: path '{}' is outside the project root '{}'",
                normalized.display(),
                self.project_root.display()
            ))
        }
    }

    /// Check a blind overwrite against the protected-path list.
    pub fn check_overwrite(&self, path: &Path) -> Option<String> {
        let normalized = normalize_path(path, &self.project_root);
        let relative = normalized.strip_prefix(&self.project_root).ok()?;

        let protected = relative.starts_with("node_modules")
            || PROTECTED_PATHS.iter().any(|entry| relative == Path::new(entry));
        if !protected {
            return None;
        }

        let prompt = format!(
            "'{}' is a protected file. Overwrite it completely?",
            relative.display()
        );
        if self.ask(&prompt) {
            None
        } else {
            Some(format!(
                "Denied: '{}' is protected from blind overwrite. Use edit_file for surgical changes instead.",
                relative.display()
            ))
        }
    }

    /// Full write-tool policy: sandbox, then protected overwrite.
    pub fn check_write(&self, path: &Path) -> Option<String> {
        self.check_path(path).or_else(|| self.check_overwrite(path))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_handler(answer: bool) -> (ConfirmationHandler, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let handler: ConfirmationHandler = Arc::new(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            answer
        });
        (handler, calls)
    }

    #[test]
    fn safe_command_never_confirms() {
        let (handler, calls) = counting_handler(false);
        let gate = SafetyGate::new("/project", handler);

        assert!(gate.check_command("cargo build").is_none());
        assert!(gate.check_command("ls -la src").is_none());
        assert!(gate.check_command("echo informal").is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dangerous_command_always_confirms() {
        let (handler, calls) = counting_handler(false);
        let gate = SafetyGate::new("/project", handler);

        for cmd in [
            "rm -rf src",
            "unlink foo",
            "rmdir build",
            "shred secrets.txt",
            "truncate -s 0 log",
            "cat x > /dev/null",
            "echo '{}' > config.json",
            "git clean -fd",
            "git checkout -- .",
            "git reset --hard HEAD~3",
        ] {
            let denial = gate.check_command(cmd);
            assert!(denial.is_some(), "expected denial for '{}'", cmd);
            assert!(denial.unwrap().contains("Denied"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn approval_permits_dangerous_command() {
        let (handler, _) = counting_handler(true);
        let gate = SafetyGate::new("/project", handler);
        assert!(gate.check_command("rm -rf node_modules").is_none());
    }

    #[test]
    fn word_boundary_does_not_match_substrings() {
        let gate = SafetyGate::new("/project", deny_all());
        assert!(gate.check_command("cargo fmt").is_none());
        assert!(gate.check_command("npm run firmware").is_none());
    }

    #[test]
    fn sandbox_admits_descendants() {
        let gate = SafetyGate::new("/project", deny_all());
        assert!(gate.check_path(Path::new("/project/src/main.rs")).is_none());
        assert!(gate.check_path(Path::new("src/lib.rs")).is_none());
        assert!(gate.check_path(Path::new("/project")).is_none());
        assert!(gate.check_path(Path::new("a/../b.txt")).is_none());
    }

    #[test]
    fn sandbox_rejects_outsiders() {
        let gate = SafetyGate::new("/project", deny_all());

        let denial = gate.check_path(Path::new("/etc/passwd")).unwrap();
        assert!(denial.contains("/etc/passwd"));
        assert!(denial.contains("/project"));

        assert!(gate.check_path(Path::new("../outside.txt")).is_some());
        assert!(gate.check_path(Path::new("src/../../escape")).is_some());
    }

    #[test]
    fn normalize_handles_dot_components() {
        let cwd = Path::new("/project");
        assert_eq!(
            normalize_path(Path::new("./a/./b.txt"), cwd),
            PathBuf::from("/project/a/b.txt")
        );
        assert_eq!(
            normalize_path(Path::new("a/b/../c"), cwd),
            PathBuf::from("/project/a/c")
        );
        assert_eq!(
            normalize_path(Path::new("/x/../../y"), cwd),
            PathBuf::from("/y")
        );
    }

    #[test]
    fn protected_overwrite_denied_by_default() {
        let gate = SafetyGate::new("/project", deny_all());

        let denial = gate
            .check_overwrite(Path::new("/project/package.json"))
            .unwrap();
        assert!(denial.contains("edit_file"));

        assert!(gate.check_overwrite(Path::new("/project/.env")).is_some());
        assert!(gate
            .check_overwrite(Path::new("/project/node_modules/left-pad/index.js"))
            .is_some());
        assert!(gate.check_overwrite(Path::new("/project/src/app.ts")).is_none());
    }

    #[test]
    fn handler_replacement_takes_effect() {
        let gate = SafetyGate::new("/project", deny_all());
        assert!(gate.check_command("rm x").is_some());

        gate.set_handler(Arc::new(|_| true));
        assert!(gate.check_command("rm x").is_none());
    }
}

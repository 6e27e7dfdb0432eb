//! Install detection for local runners: where the executable lives and
//! which version it reports.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use parley_types::provider::ProviderConfig;

use crate::llm::defaults::runner_binary;

/// Upper bound on `<binary> --version`.
const VERSION_TIMEOUT: Duration = Duration::from_secs(5);

/// Executable to look for: the known runner binary, else the first word of
/// the configured start command.
pub(crate) fn binary_name(config: &ProviderConfig) -> Option<String> {
    runner_binary(&config.id).map(str::to_string).or_else(|| {
        config
            .start_command
            .as_deref()
            .and_then(|command| command.split_whitespace().next())
            .map(str::to_string)
    })
}

/// Locate an executable on `PATH`, then in the platform's usual install
/// directories. Names containing a path separator are checked as given.
pub fn find_binary(name: &str) -> Option<PathBuf> {
    let path_dirs: Vec<PathBuf> = std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).collect())
        .unwrap_or_default();
    let fallback = install_dirs().iter().map(Path::new);
    find_binary_in(name, path_dirs.iter().map(PathBuf::as_path).chain(fallback))
}

fn find_binary_in<'a>(name: &str, dirs: impl IntoIterator<Item = &'a Path>) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    dirs.into_iter()
        .flat_map(|dir| executable_names(name).into_iter().map(move |n| dir.join(n)))
        .find(|path| path.is_file())
}

fn executable_names(name: &str) -> Vec<String> {
    if cfg!(windows) && !name.ends_with(".exe") {
        vec![format!("{name}.exe"), name.to_string()]
    } else {
        vec![name.to_string()]
    }
}

/// Install locations not always on `PATH` (app bundles, Program Files).
fn install_dirs() -> &'static [&'static str] {
    if cfg!(target_os = "windows") {
        &["C:\\Program Files\\Ollama", "C:\\Program Files (x86)\\Ollama"]
    } else if cfg!(target_os = "macos") {
        &[
            "/usr/local/bin",
            "/opt/homebrew/bin",
            "/Applications/Ollama.app/Contents/Resources",
        ]
    } else {
        &["/usr/local/bin", "/usr/bin", "/opt/ollama/bin"]
    }
}

/// Run `<path> --version` and pull the version number out of its output.
pub async fn binary_version(path: &Path) -> Option<String> {
    let output = tokio::process::Command::new(path)
        .arg("--version")
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();
    let output = match tokio::time::timeout(VERSION_TIMEOUT, output).await {
        Ok(Ok(output)) if output.status.success() => output,
        Ok(Ok(output)) => {
            tracing::debug!(path = %path.display(), status = %output.status, "--version failed");
            return None;
        }
        Ok(Err(e)) => {
            tracing::debug!(path = %path.display(), error = %e, "could not run --version");
            return None;
        }
        Err(_) => {
            tracing::debug!(path = %path.display(), "--version timed out");
            return None;
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    if stdout.trim().is_empty() {
        parse_version(&String::from_utf8_lossy(&output.stderr))
    } else {
        parse_version(&stdout)
    }
}

/// Last number-like word on the last line mentioning "version", else on the
/// last non-empty line.
///
/// `ollama version is 0.1.32` gives `0.1.32`; so does Ollama's
/// `Warning: client version is 0.1.32` printed when its server is down.
fn parse_version(output: &str) -> Option<String> {
    let lines: Vec<&str> = output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    let line = lines
        .iter()
        .rev()
        .find(|line| line.to_ascii_lowercase().contains("version"))
        .or(lines.last())?;
    line.split_whitespace()
        .rev()
        .find(|word| word.starts_with(|c: char| c.is_ascii_digit()))
        .map(|word| word.trim_end_matches(',').to_string())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_parse_version_variants() {
        assert_eq!(parse_version("ollama version is 0.1.32\n").as_deref(), Some("0.1.32"));
        assert_eq!(
            parse_version(
                "Warning: could not connect to a running Ollama instance\n\
                 Warning: client version is 0.3.12\n"
            )
            .as_deref(),
            Some("0.3.12")
        );
        assert_eq!(parse_version("version: 3541 (abc1234)\nbuilt with cc").as_deref(), Some("3541"));
        assert_eq!(parse_version("0.5.1\n").as_deref(), Some("0.5.1"));
        assert_eq!(parse_version("no digits here"), None);
        assert_eq!(parse_version(""), None);
    }

    #[test]
    fn test_binary_name_prefers_known_runner() {
        let config = ProviderConfig {
            id: "ollama".to_string(),
            start_command: Some("/opt/bin/ollama-wrapper serve".to_string()),
            ..Default::default()
        };
        assert_eq!(binary_name(&config).as_deref(), Some("ollama"));

        let config = ProviderConfig {
            id: "my-runner".to_string(),
            start_command: Some("/opt/bin/koboldcpp --port 5001".to_string()),
            ..Default::default()
        };
        assert_eq!(binary_name(&config).as_deref(), Some("/opt/bin/koboldcpp"));

        let config = ProviderConfig {
            id: "my-runner".to_string(),
            ..Default::default()
        };
        assert_eq!(binary_name(&config), None);
    }

    #[test]
    fn test_find_binary_in_dirs() {
        let empty = TempDir::new().unwrap();
        let tools = TempDir::new().unwrap();
        let file = if cfg!(windows) { "ollama.exe" } else { "ollama" };
        std::fs::write(tools.path().join(file), b"").unwrap();

        let found = find_binary_in("ollama", [empty.path(), tools.path()]).unwrap();
        assert_eq!(found, tools.path().join(file));
        assert!(find_binary_in("vllm", [empty.path(), tools.path()]).is_none());
    }

    #[test]
    fn test_find_binary_with_path_checks_that_file() {
        let tools = TempDir::new().unwrap();
        let path = tools.path().join("runner");
        std::fs::write(&path, b"").unwrap();

        let name = path.to_string_lossy().into_owned();
        assert_eq!(find_binary_in(&name, std::iter::empty()), Some(path));
        let missing = tools.path().join("nope").to_string_lossy().into_owned();
        assert!(find_binary_in(&missing, std::iter::empty()).is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_binary_version_runs_executable() {
        use std::os::unix::fs::PermissionsExt;

        let tools = TempDir::new().unwrap();
        let path = tools.path().join("fake-runner");
        std::fs::write(&path, "#!/bin/sh\necho 'fake-runner version is 1.2.3'\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(binary_version(&path).await.as_deref(), Some("1.2.3"));
        assert_eq!(binary_version(&tools.path().join("missing")).await, None);
    }
}

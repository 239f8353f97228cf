//! Composing shell text for the privileged channel

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Wrap `value` in single quotes so the shell treats it as one literal word
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// Quote a path for interpolation
pub fn quote_path(path: &Path) -> String {
    shell_quote(&path.to_string_lossy())
}

/// Command that writes `content` to `target` byte for byte
///
/// The payload travels base64-encoded so no content can break out of the
/// command text.
pub fn write_base64_command(content: &str, target: &Path) -> String {
    format!(
        "echo {} | base64 -d > {}",
        shell_quote(&STANDARD.encode(content.as_bytes())),
        quote_path(target)
    )
}

/// Append an `|| echo` fallback so an absent probe target yields empty output
pub fn or_empty(command: &str) -> String {
    format!("{command} 2>/dev/null || echo")
}

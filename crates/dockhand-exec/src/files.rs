//! Shell snippets that materialize files on the target host.
//!
//! Content travels base64-encoded inside the command, so arbitrary bytes
//! survive both `sh -c` and an SSH stdin script.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

/// Single-quote `s` for POSIX shells.
pub fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

fn parent_dir(path: &str) -> Option<&str> {
    path.rfind('/').map(|i| &path[..i]).filter(|p| !p.is_empty())
}

fn write_command(path: &str, content: &[u8], redirect: &str) -> String {
    let encoded = STANDARD.encode(content);
    let write = format!("echo \"{encoded}\" | base64 -d {redirect} {}", quote(path));
    match parent_dir(path) {
        Some(dir) => format!("mkdir -p {} && {write}", quote(dir)),
        None => write,
    }
}

/// Create (or overwrite) `path` with `content`, creating parent directories.
pub fn create_file_command(path: &str, content: &[u8]) -> String {
    write_command(path, content, ">")
}

/// Append `content` to `path`, creating it if needed.
pub fn append_file_command(path: &str, content: &[u8]) -> String {
    write_command(path, content, ">>")
}

/// Print `path` if it exists; empty output otherwise.
pub fn read_file_command(path: &str) -> String {
    let p = quote(path);
    format!("if [ -f {p} ]; then cat {p}; fi")
}

pub fn remove_file_command(path: &str) -> String {
    format!("rm -f {}", quote(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_escapes_single_quotes() {
        assert_eq!(quote("plain"), "'plain'");
        assert_eq!(quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_create_file_command() {
        let cmd = create_file_command("/srv/app/.env", b"A=1\n");
        assert_eq!(
            cmd,
            "mkdir -p '/srv/app' && echo \"QT0xCg==\" | base64 -d > '/srv/app/.env'"
        );
    }

    #[test]
    fn test_append_without_parent() {
        let cmd = append_file_command("log.txt", b"x");
        assert_eq!(cmd, "echo \"eA==\" | base64 -d >> 'log.txt'");
    }
}

//! Build-Environment Manager's deterministic half (spec §4.C steps 3, 4,
//! 6): OS-family detection, manifest enumeration, and the heuristic
//! command table used when every LLM provider fails to produce a setup
//! script.

use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Alpine,
    Debian,
    Unknown,
}

/// Parse `/etc/os-release` contents (`ID=...` / `ID_LIKE=...`) to detect
/// the OS family; fall back to `which apk` probing when absent.
pub fn detect_os_family(os_release_contents: Option<&str>, has_apk: bool) -> OsFamily {
    if let Some(contents) = os_release_contents {
        for line in contents.lines() {
            if let Some(id) = line.strip_prefix("ID=") {
                let id = id.trim_matches('"');
                if id == "alpine" {
                    return OsFamily::Alpine;
                }
                if id == "debian" || id == "ubuntu" {
                    return OsFamily::Debian;
                }
            }
            if let Some(id_like) = line.strip_prefix("ID_LIKE=") {
                let id_like = id_like.trim_matches('"');
                if id_like.contains("debian") {
                    return OsFamily::Debian;
                }
            }
        }
    }
    if has_apk {
        return OsFamily::Alpine;
    }
    OsFamily::Unknown
}

pub const MANIFEST_FILENAMES: &[&str] = &[
    "go.mod",
    "package.json",
    "requirements.txt",
    "pyproject.toml",
    "Cargo.toml",
    "Gemfile",
    "Makefile",
    "CMakeLists.txt",
];

pub const MANIFEST_TRUNCATE_BYTES: usize = 2000;

pub struct ManifestSnapshot {
    pub filename: String,
    pub content: String,
}

/// Read each manifest filename present at `project_root`'s top level,
/// truncating each to `MANIFEST_TRUNCATE_BYTES`.
pub fn collect_manifests(project_root: &Path) -> std::io::Result<Vec<ManifestSnapshot>> {
    let mut snapshots = Vec::new();
    for filename in MANIFEST_FILENAMES {
        let path = project_root.join(filename);
        if path.is_file() {
            let content = std::fs::read_to_string(&path).unwrap_or_default();
            let truncated: String = content.chars().take(MANIFEST_TRUNCATE_BYTES).collect();
            snapshots.push(ManifestSnapshot { filename: filename.to_string(), content: truncated });
        }
    }
    Ok(snapshots)
}

/// Heuristic setup commands keyed on detected manifests and OS family,
/// used only when every configured LLM provider fails to produce a setup
/// script (spec §4.C step 6).
pub fn heuristic_setup_commands(manifests: &[ManifestSnapshot], os_family: OsFamily) -> Vec<String> {
    let present: Vec<&str> = manifests.iter().map(|m| m.filename.as_str()).collect();
    let mut commands = Vec::new();

    if present.contains(&"go.mod") {
        commands.push("go mod download".to_string());
    }
    if present.contains(&"package.json") {
        commands.push(install_node_command(os_family));
        commands.push("npm install".to_string());
    }
    if present.contains(&"requirements.txt") {
        commands.push("pip3 install -r requirements.txt".to_string());
    }
    if present.contains(&"pyproject.toml") {
        commands.push("pip3 install .".to_string());
    }
    if present.contains(&"Cargo.toml") {
        commands.push("curl --proto '=https' --tlsv1.2 -sSf https://sh.rustup.rs | sh -s -- -y".to_string());
        commands.push("cargo fetch".to_string());
    }
    if present.contains(&"Gemfile") {
        commands.push("bundle install".to_string());
    }

    commands
}

fn install_node_command(os_family: OsFamily) -> String {
    match os_family {
        OsFamily::Alpine => "apk add --no-cache nodejs npm".to_string(),
        OsFamily::Debian => "apt-get update && apt-get install -y nodejs npm".to_string(),
        OsFamily::Unknown => "apt-get update && apt-get install -y nodejs npm".to_string(),
    }
}

/// Parse the LLM's setup-commands response: a bare array, a `{commands:
/// [...]}` object, or any object containing a single string-array value.
/// Markdown fences are stripped first.
pub fn parse_setup_commands(raw: &str) -> Option<Vec<String>> {
    let stripped = strip_code_fences(raw);
    let value: serde_json::Value = serde_json::from_str(stripped.trim()).ok()?;
    extract_string_array(&value)
}

fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_prefix('\n').unwrap_or(rest);
    match rest.rfind("```") {
        Some(end) => rest[..end].trim().to_string(),
        None => rest.trim().to_string(),
    }
}

fn extract_string_array(value: &serde_json::Value) -> Option<Vec<String>> {
    match value {
        serde_json::Value::Array(items) => items_as_strings(items),
        serde_json::Value::Object(map) => {
            if let Some(serde_json::Value::Array(items)) = map.get("commands") {
                if let Some(strings) = items_as_strings(items) {
                    return Some(strings);
                }
            }
            let arrays: Vec<&Vec<serde_json::Value>> =
                map.values().filter_map(|v| if let serde_json::Value::Array(a) = v { Some(a) } else { None }).collect();
            if arrays.len() == 1 {
                items_as_strings(arrays[0])
            } else {
                None
            }
        }
        _ => None,
    }
}

fn items_as_strings(items: &[serde_json::Value]) -> Option<Vec<String>> {
    items.iter().map(|v| v.as_str().map(str::to_string)).collect()
}

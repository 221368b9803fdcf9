use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::path::Path;

static LANGUAGES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("rs", "Rust"),
        ("go", "Go"),
        ("py", "Python"),
        ("pyi", "Python"),
        ("js", "JavaScript"),
        ("mjs", "JavaScript"),
        ("cjs", "JavaScript"),
        ("jsx", "JavaScript"),
        ("ts", "TypeScript"),
        ("tsx", "TypeScript"),
        ("java", "Java"),
        ("kt", "Kotlin"),
        ("kts", "Kotlin"),
        ("scala", "Scala"),
        ("c", "C"),
        ("h", "C"),
        ("cc", "C++"),
        ("cpp", "C++"),
        ("cxx", "C++"),
        ("hpp", "C++"),
        ("cs", "C#"),
        ("swift", "Swift"),
        ("rb", "Ruby"),
        ("php", "PHP"),
        ("lua", "Lua"),
        ("sh", "Shell"),
        ("bash", "Shell"),
        ("zsh", "Shell"),
        ("ps1", "PowerShell"),
        ("sql", "SQL"),
        ("html", "HTML"),
        ("htm", "HTML"),
        ("css", "CSS"),
        ("scss", "SCSS"),
        ("vue", "Vue"),
        ("svelte", "Svelte"),
        ("json", "JSON"),
        ("yaml", "YAML"),
        ("yml", "YAML"),
        ("toml", "TOML"),
        ("xml", "XML"),
        ("md", "Markdown"),
        ("markdown", "Markdown"),
        ("rst", "reStructuredText"),
        ("txt", "Text"),
        ("proto", "Protocol Buffers"),
        ("dockerfile", "Dockerfile"),
        ("tf", "Terraform"),
        ("nix", "Nix"),
        ("ex", "Elixir"),
        ("exs", "Elixir"),
        ("erl", "Erlang"),
        ("hs", "Haskell"),
        ("ml", "OCaml"),
        ("zig", "Zig"),
        ("dart", "Dart"),
        ("r", "R"),
    ])
});

/// Language name for a file, from its extension. `"unknown"` if unmapped.
pub fn detect_language(path: &Path) -> &'static str {
    let by_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_lowercase());
    if let Some(name) = by_name.as_deref() {
        match name {
            "dockerfile" => return "Dockerfile",
            "makefile" => return "Makefile",
            _ => {}
        }
    }

    path.extension()
        .and_then(|e| e.to_str())
        .and_then(|e| LANGUAGES.get(e.to_lowercase().as_str()).copied())
        .unwrap_or("unknown")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_language() {
        assert_eq!(detect_language(Path::new("src/main.rs")), "Rust");
        assert_eq!(detect_language(Path::new("web/App.TSX")), "TypeScript");
        assert_eq!(detect_language(Path::new("Dockerfile")), "Dockerfile");
        assert_eq!(detect_language(Path::new("notes.txt")), "Text");
        assert_eq!(detect_language(Path::new("LICENSE")), "unknown");
        assert_eq!(detect_language(Path::new("data.weird")), "unknown");
    }
}

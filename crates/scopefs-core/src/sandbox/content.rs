//! Text/binary classification and payload encoding for reads

use crate::types::ContentEncoding;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::path::Path;

/// Extensions read as text even when their MIME type is not `text/*`
const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "csv", "tsv", "json", "jsonl", "xml", "yaml", "yml", "toml", "ini",
    "cfg", "conf", "log", "html", "htm", "css", "scss", "js", "mjs", "cjs", "ts", "tsx", "jsx",
    "rs", "py", "rb", "go", "java", "kt", "c", "h", "cpp", "hpp", "cs", "swift", "sh", "bash",
    "zsh", "ps1", "sql", "svg", "tex", "rst", "env", "gitignore", "lock",
];

/// Lower-cased extension of `name`, without the dot
pub fn extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
}

pub fn mime_for(name: &str) -> String {
    mime_guess::from_path(name).first_or_octet_stream().to_string()
}

pub fn is_text(name: &str, mime_type: &str) -> bool {
    if mime_type.starts_with("text/") {
        return true;
    }
    extension(name).is_some_and(|ext| TEXT_EXTENSIONS.contains(&ext.as_str()))
}

/// Decode text as UTF-8 (lossy) and everything else as a base64 data URL
pub fn encode_payload(bytes: &[u8], name: &str, mime_type: &str) -> (String, ContentEncoding) {
    if is_text(name, mime_type) {
        (String::from_utf8_lossy(bytes).into_owned(), ContentEncoding::Text)
    } else {
        (
            format!("data:{};base64,{}", mime_type, STANDARD.encode(bytes)),
            ContentEncoding::DataUrl,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_is_lower_cased() {
        assert_eq!(extension("Report.MD").as_deref(), Some("md"));
        assert_eq!(extension("Makefile"), None);
    }

    #[test]
    fn test_text_classification() {
        assert!(is_text("a.txt", &mime_for("a.txt")));
        assert!(is_text("main.rs", &mime_for("main.rs")));
        assert!(is_text("data.json", "application/json"));
        assert!(!is_text("photo.png", &mime_for("photo.png")));
        assert!(!is_text("blob", &mime_for("blob")));
    }

    #[test]
    fn test_binary_becomes_data_url() {
        let (content, encoding) = encode_payload(&[0xff, 0x00, 0x10], "photo.png", "image/png");
        assert_eq!(encoding, ContentEncoding::DataUrl);
        assert_eq!(content, "data:image/png;base64,/wAQ");
    }

    #[test]
    fn test_invalid_utf8_text_is_replaced() {
        let (content, encoding) = encode_payload(b"ok\xff", "a.txt", "text/plain");
        assert_eq!(encoding, ContentEncoding::Text);
        assert_eq!(content, "ok\u{fffd}");
    }
}

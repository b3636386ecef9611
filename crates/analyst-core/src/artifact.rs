//! Scan a task working directory for the files a script produced.

use crate::error::Result;
use crate::types::{Artifact, ArtifactContent, ArtifactKind};
use base64::Engine as _;
use std::path::Path;
use tracing::debug;

const TABLE_EXTENSIONS: &[&str] = &["csv", "tsv", "xlsx", "json", "parquet"];
const REPORT_EXTENSIONS: &[&str] = &["txt", "md", "html", "htm"];

/// Recognized output kind for a file name, or `None` to ignore it.
pub fn classify(filename: &str) -> Option<ArtifactKind> {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)?;
    if TABLE_EXTENSIONS.contains(&ext.as_str()) {
        return Some(ArtifactKind::Table);
    }
    if REPORT_EXTENSIONS.contains(&ext.as_str()) {
        return Some(ArtifactKind::Report);
    }
    let mime = mime_guess::from_ext(&ext).first()?;
    (mime.type_().as_str() == "image").then_some(ArtifactKind::Image)
}

/// Collect recognized files directly inside `dir`, sorted by name.
///
/// Images are inlined as base64 up to `inline_limit` bytes and flagged
/// omitted above it. Other kinds are inlined when the bytes are UTF-8 and
/// flagged binary otherwise. Names in `exclude` are skipped.
pub fn collect_artifacts(dir: &Path, exclude: &[&str], inline_limit: u64) -> Result<Vec<Artifact>> {
    let mut artifacts = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let Some(filename) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if exclude.contains(&filename.as_str()) {
            continue;
        }
        let Some(kind) = classify(&filename) else {
            continue;
        };
        let byte_size = entry.metadata()?.len();
        let content = read_content(&entry.path(), &filename, kind, byte_size, inline_limit)?;
        debug!(file = %filename, kind = %kind, bytes = byte_size, "artifact collected");
        artifacts.push(Artifact {
            filename,
            byte_size,
            kind,
            content,
        });
    }
    artifacts.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok(artifacts)
}

fn read_content(
    path: &Path,
    filename: &str,
    kind: ArtifactKind,
    byte_size: u64,
    inline_limit: u64,
) -> Result<ArtifactContent> {
    match kind {
        ArtifactKind::Image => {
            if byte_size > inline_limit {
                return Ok(ArtifactContent::OmittedForSize {
                    limit_bytes: inline_limit,
                });
            }
            let bytes = std::fs::read(path)?;
            let mime = mime_guess::from_path(filename).first_or_octet_stream();
            Ok(ArtifactContent::Base64 {
                mime: mime.essence_str().to_string(),
                data: base64::engine::general_purpose::STANDARD.encode(bytes),
            })
        }
        ArtifactKind::Table | ArtifactKind::Report => {
            let bytes = std::fs::read(path)?;
            Ok(match String::from_utf8(bytes) {
                Ok(text) => ArtifactContent::Text { text },
                Err(_) => ArtifactContent::Binary,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn classification() {
        assert_eq!(classify("figure_1.png"), Some(ArtifactKind::Image));
        assert_eq!(classify("chart.SVG"), Some(ArtifactKind::Image));
        assert_eq!(classify("out.csv"), Some(ArtifactKind::Table));
        assert_eq!(classify("book.xlsx"), Some(ArtifactKind::Table));
        assert_eq!(classify("summary.md"), Some(ArtifactKind::Report));
        assert_eq!(classify("page.html"), Some(ArtifactKind::Report));
        assert_eq!(classify("harness.py"), None);
        assert_eq!(classify("noext"), None);
    }

    #[test]
    fn collects_sorted_and_excludes() {
        let dir = TempDir::new().unwrap();
        let p = dir.path();
        std::fs::write(p.join("b.csv"), "a,b\n1,2\n").unwrap();
        std::fs::write(p.join("a.md"), "# hi").unwrap();
        std::fs::write(p.join("data.csv"), "x\n").unwrap();
        std::fs::write(p.join("harness.py"), "pass").unwrap();
        std::fs::create_dir(p.join("sub.csv")).unwrap();

        let arts = collect_artifacts(p, &["data.csv"], 1024).unwrap();
        let names: Vec<&str> = arts.iter().map(|a| a.filename.as_str()).collect();
        assert_eq!(names, ["a.md", "b.csv"]);
        assert_eq!(arts[1].byte_size, 8);
        assert_eq!(
            arts[1].content,
            ArtifactContent::Text {
                text: "a,b\n1,2\n".into()
            }
        );
    }

    #[test]
    fn images_inline_under_limit_only() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("small.png"), [1u8, 2, 3]).unwrap();
        std::fs::write(dir.path().join("big.png"), vec![0u8; 64]).unwrap();

        let arts = collect_artifacts(dir.path(), &[], 16).unwrap();
        assert_eq!(
            arts[0].content,
            ArtifactContent::OmittedForSize { limit_bytes: 16 }
        );
        assert_eq!(
            arts[1].content,
            ArtifactContent::Base64 {
                mime: "image/png".into(),
                data: "AQID".into()
            }
        );
    }

    #[test]
    fn undecodable_text_is_binary() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("x.txt"), [0xffu8, 0xfe, 0x00]).unwrap();
        let arts = collect_artifacts(dir.path(), &[], 16).unwrap();
        assert_eq!(arts[0].content, ArtifactContent::Binary);
        assert!(!arts[0].content.is_inline());
    }
}

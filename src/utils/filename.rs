//! Destination file names for downloaded PDFs.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static UNSAFE_RUN: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"[^A-Za-z0-9._-]+").expect("valid filename regex"));

const MAX_TITLE_CHARS: usize = 100;
const MAX_IDENTIFIER_CHARS: usize = 50;

/// Replace every run of characters outside `[A-Za-z0-9._-]` with `_`.
pub fn sanitize_component(value: &str) -> String {
    UNSAFE_RUN.replace_all(value.trim(), "_").into_owned()
}

/// Deterministic file name for a (title, identifier) pair.
///
/// The same pair always maps to the same name, so a rerun overwrites the
/// earlier download.
pub fn pdf_filename(title: &str, identifier: &str) -> String {
    let mut title = sanitize_component(title);
    title.truncate(MAX_TITLE_CHARS);
    if title.is_empty() {
        title = "paper".to_string();
    }

    format!("{title}_{}.pdf", identifier_component(identifier))
}

fn identifier_component(identifier: &str) -> String {
    let mut component = sanitize_component(identifier);
    component.truncate(MAX_IDENTIFIER_CHARS);
    component
}

/// A PDF in `dir` named by [`pdf_filename`] for `identifier`, whatever its title.
///
/// When several match, the lexicographically first file name wins.
pub fn find_local_pdf(dir: &Path, identifier: &str) -> std::io::Result<Option<PathBuf>> {
    let suffix = format!("_{}.pdf", identifier_component(identifier));

    let mut matches = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let matched = name.to_str().is_some_and(|name| name.ends_with(&suffix));
        if matched && entry.file_type()?.is_file() {
            matches.push(entry.path());
        }
    }

    matches.sort();
    Ok(matches.into_iter().next())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdf_filename() {
        assert_eq!(
            pdf_filename("Graph Neural Networks: A Review", "10.1016/j.aiopen.2021.01.001"),
            "Graph_Neural_Networks_A_Review_10.1016_j.aiopen.2021.01.001.pdf"
        );
    }

    #[test]
    fn test_empty_title_falls_back() {
        assert_eq!(pdf_filename("   ", "10.1234/x"), "paper_10.1234_x.pdf");
        assert_eq!(pdf_filename("???", "10.1234/x"), "__10.1234_x.pdf");
    }

    #[test]
    fn test_components_are_capped() {
        let title = "a".repeat(300);
        let doi = format!("10.1234/{}", "b".repeat(300));
        let name = pdf_filename(&title, &doi);

        let (stem, _) = name.rsplit_once(".pdf").unwrap();
        let (title_part, doi_part) = stem.split_at(MAX_TITLE_CHARS);
        assert_eq!(title_part, "a".repeat(MAX_TITLE_CHARS));
        assert_eq!(doi_part.len(), 1 + MAX_IDENTIFIER_CHARS);
    }

    #[test]
    fn test_non_ascii_is_replaced() {
        assert_eq!(sanitize_component("Über straße"), "_ber_stra_e");
    }

    #[test]
    fn test_find_local_pdf_by_identifier() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join(pdf_filename("Graph Review", "10.1016/j.aiopen.2021.01.001"));
        std::fs::write(&target, b"%PDF-1.4").unwrap();
        std::fs::write(dir.path().join(pdf_filename("Other", "10.1016/j.other")), b"%PDF-1.4").unwrap();
        std::fs::write(dir.path().join("notes_10.1016_j.aiopen.2021.01.001.txt"), b"x").unwrap();

        assert_eq!(
            find_local_pdf(dir.path(), "10.1016/j.aiopen.2021.01.001").unwrap(),
            Some(target)
        );
        assert_eq!(find_local_pdf(dir.path(), "10.1016/j.missing").unwrap(), None);
        assert!(find_local_pdf(&dir.path().join("absent"), "10.1/x").is_err());
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(pdf_filename("T", "10.1/x"), pdf_filename("T", "10.1/x"));
    }
}

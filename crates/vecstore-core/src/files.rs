//! Filename bookkeeping over stored `source` metadata.
//!
//! A collection has no file table: the set of files is derived from the
//! distinct `source` paths of its chunks, reduced to base names. Sources may
//! have been recorded on any platform, so both `/` and `\` count as
//! separators.

use std::collections::BTreeSet;

use crate::models::CollectionSnapshot;

/// Strip everything up to the last `/`, then everything up to the last `\`.
///
/// ```rust
/// use vecstore_core::files::base_name;
///
/// assert_eq!(base_name("/srv/docs/a.md"), "a.md");
/// assert_eq!(base_name(r"C:\Users\me\b.pdf"), "b.pdf");
/// assert_eq!(base_name("plain.txt"), "plain.txt");
/// ```
pub fn base_name(source: &str) -> &str {
    let after_slash = source.rsplit('/').next().unwrap_or(source);
    after_slash.rsplit('\\').next().unwrap_or(after_slash)
}

/// Distinct base filenames stored in the collection, sorted.
pub fn file_names(snapshot: &CollectionSnapshot) -> Vec<String> {
    let names: BTreeSet<&str> = snapshot
        .sources()
        .map(|(_, source)| base_name(source))
        .collect();
    names.into_iter().map(str::to_string).collect()
}

/// Whether a file with this base name is already stored.
pub fn contains_file(snapshot: &CollectionSnapshot, file_name: &str) -> bool {
    snapshot
        .sources()
        .any(|(_, source)| base_name(source) == file_name)
}

/// Ids of every chunk whose source base name equals `file_name`.
pub fn ids_for_file(snapshot: &CollectionSnapshot, file_name: &str) -> Vec<String> {
    snapshot
        .sources()
        .filter(|(_, source)| base_name(source) == file_name)
        .map(|(id, _)| id.to_string())
        .collect()
}

/// Source paths containing any of `filenames` as a substring, deduplicated
/// in first-seen order.
pub fn find_source_paths(filenames: &[&str], snapshot: &CollectionSnapshot) -> Vec<String> {
    let mut paths: Vec<String> = Vec::new();
    for (_, source) in snapshot.sources() {
        for filename in filenames {
            if source.contains(filename) && !paths.iter().any(|p| p == source) {
                paths.push(source.to_string());
            }
        }
    }
    paths
}

/// Resolve a requested filename to the single source path retrieval should
/// be restricted to.
///
/// An exact base-name match wins; otherwise the first source containing
/// the filename. `None` means no match: search the whole collection.
pub fn resolve_source_filter(filename: &str, snapshot: &CollectionSnapshot) -> Option<String> {
    if filename.is_empty() {
        return None;
    }
    if let Some((_, source)) = snapshot
        .sources()
        .find(|(_, source)| base_name(source) == filename)
    {
        return Some(source.to_string());
    }
    find_source_paths(&[filename], snapshot).into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Metadata;

    fn snapshot(sources: &[&str]) -> CollectionSnapshot {
        let mut snap = CollectionSnapshot::default();
        for (i, s) in sources.iter().enumerate() {
            let mut meta = Metadata::new();
            meta.insert("source".into(), (*s).into());
            snap.ids.push(format!("id-{}", i));
            snap.metadatas.push(meta);
            snap.documents.push(format!("chunk {}", i));
        }
        snap
    }

    #[test]
    fn base_name_handles_both_separators() {
        assert_eq!(base_name("a/b/c.txt"), "c.txt");
        assert_eq!(base_name(r"a\b\c.txt"), "c.txt");
        assert_eq!(base_name(r"a/b\c.txt"), "c.txt");
        assert_eq!(base_name(r"a\b/c.txt"), "c.txt");
        assert_eq!(base_name("dir/"), "");
    }

    #[test]
    fn file_names_are_distinct_base_names() {
        let snap = snapshot(&[
            "/data/report.pdf",
            "/data/report.pdf",
            r"C:\tmp\notes.md",
            "/other/notes.md",
            "readme.txt",
        ]);
        assert_eq!(
            file_names(&snap),
            vec!["notes.md", "readme.txt", "report.pdf"]
        );
    }

    #[test]
    fn ids_for_file_matches_base_name_only() {
        let snap = snapshot(&["/x/a.txt", "/y/a.txt", "/x/ba.txt", r"D:\a.txt"]);
        assert_eq!(ids_for_file(&snap, "a.txt"), vec!["id-0", "id-1", "id-3"]);
        assert!(ids_for_file(&snap, "missing.txt").is_empty());
    }

    #[test]
    fn contains_file_checks_base_name() {
        let snap = snapshot(&["/x/a.txt"]);
        assert!(contains_file(&snap, "a.txt"));
        assert!(!contains_file(&snap, "x"));
    }

    #[test]
    fn find_source_paths_dedups_in_order() {
        let snap = snapshot(&["/d/b.txt", "/d/a.txt", "/d/b.txt", "/e/data.txt"]);
        assert_eq!(
            find_source_paths(&["a.txt"], &snap),
            vec!["/d/a.txt", "/e/data.txt"]
        );
        assert_eq!(
            find_source_paths(&["b.txt", "a.txt"], &snap),
            vec!["/d/b.txt", "/d/a.txt", "/e/data.txt"]
        );
    }

    #[test]
    fn resolve_prefers_exact_base_name() {
        let snap = snapshot(&["/e/ab.txt", "/d/b.txt"]);
        assert_eq!(
            resolve_source_filter("b.txt", &snap).as_deref(),
            Some("/d/b.txt")
        );
        assert_eq!(
            resolve_source_filter("ab", &snap).as_deref(),
            Some("/e/ab.txt")
        );
        assert_eq!(resolve_source_filter("zzz", &snap), None);
        assert_eq!(resolve_source_filter("", &snap), None);
    }
}

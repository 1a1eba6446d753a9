//! Relative link computation between files in the mirror

use std::path::{Component, Path};

/// Builds the href that leads from `from_file` to `to_file`
///
/// Both paths are relative to the mirror root. The result uses `/`
/// separators and percent-escapes the characters a browser would otherwise
/// read as URL syntax, so the mirror can be moved anywhere on disk.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use sumi_mirror::mirror::relative_href;
///
/// let href = relative_href(Path::new("blog/post.html"), Path::new("css/site.css"));
/// assert_eq!(href, "../css/site.css");
/// ```
pub fn relative_href(from_file: &Path, to_file: &Path) -> String {
    let from_dir: Vec<String> = from_file
        .parent()
        .map(normal_components)
        .unwrap_or_default();
    let target = normal_components(to_file);

    let common = from_dir
        .iter()
        .zip(target.iter())
        .take_while(|(a, b)| a == b)
        .count();
    // The last target component is the file itself and cannot be shared
    let common = common.min(target.len().saturating_sub(1));

    let mut parts: Vec<String> = Vec::new();
    parts.extend(std::iter::repeat("..".to_string()).take(from_dir.len() - common));
    parts.extend(target[common..].iter().map(|segment| escape_segment(segment)));

    if parts.is_empty() {
        return ".".to_string();
    }
    parts.join("/")
}

fn normal_components(path: &Path) -> Vec<String> {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}

/// Escapes the characters that would change how an href is parsed
fn escape_segment(segment: &str) -> String {
    let mut escaped = String::with_capacity(segment.len());
    for c in segment.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            ' ' => escaped.push_str("%20"),
            '#' => escaped.push_str("%23"),
            '?' => escaped.push_str("%3F"),
            '"' => escaped.push_str("%22"),
            _ => escaped.push(c),
        }
    }
    escaped
}

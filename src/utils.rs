use std::path::{Path, PathBuf};

/// Host of an absolute http(s) `url`.
pub fn url_domain(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https"))
        .and_then(|u| u.domain().map(|d| d.to_ascii_lowercase()))
}

/// `domain` is `base` or one of its subdomains.
pub fn is_domain_of(domain: &str, base: &str) -> bool {
    domain == base
        || domain
            .strip_suffix(base)
            .is_some_and(|rest| rest.ends_with('.'))
}

/// Render a byte count with 1024-based units and one decimal, e.g. `"1.5MB"`.
pub fn human_size(bytes: Option<u64>) -> Option<String> {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let bytes = bytes?;
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    Some(format!("{:.1}{}", value, UNITS[unit]))
}

/// Extension of the image a thumbnail URL points to, `jpg` when the path has none.
pub fn thumbnail_extension(thumbnail_url: &str) -> String {
    url::Url::parse(thumbnail_url)
        .ok()
        .and_then(|u| {
            Path::new(u.path())
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase())
        })
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "jpg".to_string())
}

/// `{extractor}-{id}.{ext}`, made safe for the filesystem.
pub fn thumbnail_file_name(extractor: &str, id: &str, thumbnail_url: &str) -> String {
    sanitize_filename::sanitize(format!(
        "{}-{}.{}",
        extractor,
        id,
        thumbnail_extension(thumbnail_url)
    ))
}

/// Replace `{name}` fields in `template`. Unknown fields are left as they are.
pub fn render_template(template: &str, fields: &[(&str, String)]) -> String {
    let mut out = template.to_string();
    for (name, value) in fields {
        out = out.replace(&format!("{{{name}}}"), value);
    }
    out
}

/// File stem in `dir` that does not collide with an existing `{stem}.{ext}`:
/// `stem`, then `stem(1)`, `stem(2)`, ...
pub fn free_output_stem(dir: &Path, stem: &str, ext: &str) -> PathBuf {
    let taken = |candidate: &str| dir.join(format!("{candidate}.{ext}")).exists();
    if !taken(stem) {
        return dir.join(stem);
    }
    let mut n = 1u32;
    loop {
        let candidate = format!("{stem}({n})");
        if !taken(&candidate) {
            return dir.join(candidate);
        }
        n += 1;
    }
}

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use once_cell::sync::Lazy;

/// Factory parameter escape table: characters that are unsafe in file names and ClassAd
/// values are spelled out as `.<name>,`.
static ESCAPES: Lazy<HashMap<char, &'static str>> = Lazy::new(|| {
    [
        ('.', ".dot,"),
        (',', ".comma,"),
        ('&', ".amp,"),
        ('\\', ".backslash,"),
        ('|', ".fork,"),
        ('\'', ".singquot,"),
        ('"', ".quot,"),
        ('=', ".eq,"),
        ('+', ".plus,"),
        ('-', ".minus,"),
        ('<', ".lt,"),
        ('>', ".gt,"),
        ('(', ".open,"),
        (')', ".close,"),
        ('{', ".gopen,"),
        ('}', ".gclose,"),
        ('[', ".sopen,"),
        (']', ".sclose,"),
        ('#', ".comment,"),
        ('$', ".dollar,"),
        ('*', ".star,"),
        ('?', ".question,"),
        ('!', ".not,"),
        ('~', ".tilde,"),
        (':', ".colon,"),
        (';', ".semicolon,"),
        ('/', ".slash,"),
        (' ', ".nbsp,"),
    ]
    .into_iter()
    .collect()
});

pub fn escape_param(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match ESCAPES.get(&c) {
            Some(esc) => out.push_str(esc),
            None => out.push(c),
        }
    }
    out
}

/// A single path component that cannot climb out of or reach across directories.
pub fn is_str_safe(s: &str) -> bool {
    !s.is_empty() && s != "." && s != ".." && !s.contains('/') && !s.contains('\0')
}

/// `credential_<client>_<escaped id>` in `dir`.
pub(crate) fn credential_file(dir: &Path, client_name: &str, cred_id: &str) -> PathBuf {
    dir.join(format!("credential_{}_{}", client_name, escape_param(cred_id)))
}

pub(crate) fn compressed_sibling(raw: &Path) -> PathBuf { with_suffix(raw, "_compressed") }

/// Append `suffix` to the file name (not the extension) of `path`.
pub(crate) fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

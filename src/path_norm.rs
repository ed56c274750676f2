use std::path::{Path, MAIN_SEPARATOR};

/// Substituted for empty name components and reserved characters.
pub const PLACEHOLDER: char = '_';

const RESERVED_NAME_CHARS: &[char] = &['*', '?', ':', '"', '<', '>', '|'];

/// The path separator of the *other* platform family. Only the native
/// separator acts as a directory boundary in templates; the foreign one
/// is rejected in template literals but is an ordinary character nowhere
/// else in the filesystem, so it gets replaced in file names.
pub(crate) fn foreign_separator() -> char {
    if MAIN_SEPARATOR == '\\' {
        '/'
    } else {
        '\\'
    }
}

/// Reserved inside template literal text. The native separator is
/// deliberately allowed there: it is how templates create subdirectories.
pub(crate) fn is_reserved_template_char(c: char) -> bool {
    c.is_control() || RESERVED_NAME_CHARS.contains(&c) || c == foreign_separator()
}

/// Reserved inside a single path component (file or directory name).
pub(crate) fn is_reserved_name_char(c: char) -> bool {
    is_reserved_template_char(c) || c == MAIN_SEPARATOR
}

/// Splits `name` into stem and extension the way the renaming rules see
/// them: the extension starts at the last `.` that is not the first
/// character, and includes the dot.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(pos) if pos > 0 && pos + 1 < name.len() => name.split_at(pos),
        _ => (name, ""),
    }
}

/// Core component cleanup shared by file and directory names: trims
/// whitespace, replaces reserved characters, and keeps the result from
/// being empty, starting with a dot (hidden on *nix) or ending with one.
pub(crate) fn sanitize_component(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return PLACEHOLDER.to_string();
    }

    let mut out: String = trimmed
        .chars()
        .map(|c| if is_reserved_name_char(c) { PLACEHOLDER } else { c })
        .collect();

    if out.starts_with('.') {
        out.replace_range(..1, &PLACEHOLDER.to_string());
    }
    if out.ends_with('.') {
        let last = out.len() - 1;
        out.replace_range(last.., &PLACEHOLDER.to_string());
    }
    out
}

/// Validates and repairs a user-proposed file name.
///
/// When `force_extension` is given (files), any extension the user typed
/// is discarded and the original one is appended back: templates and
/// edits control naming, never the type-defining extension. Directories
/// pass `None` and keep whatever dots they contain at the end of the
/// stem rules above.
pub fn validate_file_name(name: &str, force_extension: Option<&str>) -> String {
    let (raw_stem, raw_ext) = split_extension(name.trim());
    let stem = sanitize_component(raw_stem);
    let ext = match force_extension {
        Some(forced) => forced.to_string(),
        None => raw_ext.trim().to_string(),
    };
    format!("{}{}", stem, ext)
}

/// True when both paths point at the same directory or one is nested in
/// the other. Both should be absolute for the check to be meaningful.
pub fn same_dir(dir1: &Path, dir2: &Path) -> bool {
    dir1 == dir2 || dir1.starts_with(dir2) || dir2.starts_with(dir1)
}

const MIB: u64 = 1024 * 1024;

/// Rounds a byte count up to whole MiB, with a floor of 1 MiB for any
/// non-zero size. Free-space comparisons are done on these coarse values.
pub fn ceil_mib(bytes: u64) -> u64 {
    if bytes == 0 {
        0
    } else {
        bytes.div_ceil(MIB).max(1)
    }
}

/// Normalizes a raw repository-definition line into the canonical on-disk
/// text form. Applied before any line is written or compared.
///
/// Rules, in order: every `#` gains a trailing space, literal brackets and
/// single quotes are removed, then runs of spaces are collapsed to one.
/// The collapse runs to a fixed point so the whole function is idempotent.
pub fn sanitize_source_line(raw: &str) -> String {
    let mut line = raw.replace('#', "# ");
    line.retain(|c| c != '[' && c != ']' && c != '\'');
    while line.contains("  ") {
        line = line.replace("  ", " ");
    }
    line
}

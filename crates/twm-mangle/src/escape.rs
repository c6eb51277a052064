use std::borrow::Cow;

/// Remove CSS-selector backslash escapes: `\:` becomes `:` and `\\` becomes `\`.
///
/// A trailing lone backslash is dropped. Inputs without escapes are borrowed unchanged.
pub fn strip_escapes(raw: &str) -> Cow<'_, str> {
    if !raw.contains('\\') {
        return Cow::Borrowed(raw);
    }

    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(ch);
        }
    }
    Cow::Owned(out)
}

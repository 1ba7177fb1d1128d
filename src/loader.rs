use miette::Result;

use crate::error;

/// Parse the text form of a program image: one binary byte literal per line,
/// `#` starts a comment, blank lines are skipped.
///
/// Unlike the machine itself this deals in source text, so failures come
/// back as labeled diagnostics rather than machine faults.
pub fn parse_image(src: &str) -> Result<Vec<u8>> {
    let mut image = Vec::new();
    for line in src.lines() {
        // Lines are subslices of src, so the span offset falls out of the
        // pointer difference
        let line_start = line.as_ptr() as usize - src.as_ptr() as usize;
        let code = line.split('#').next().unwrap_or_default();
        let token = code.trim();
        if token.is_empty() {
            continue;
        }
        match u8::from_str_radix(token, 2) {
            Ok(byte) => image.push(byte),
            Err(e) => {
                let start = line_start + (code.len() - code.trim_start().len());
                return Err(error::load_invalid_lit(start..start + token.len(), src, e));
            }
        }
    }
    Ok(image)
}

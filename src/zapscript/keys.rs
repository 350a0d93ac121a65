//! Key-sequence syntax used by `input.keyboard` and `input.gamepad`.
//!
//! Every character is one key. A backslash escapes the following character,
//! and `{NAME}` names a single key spanning everything inside the braces.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeySyntaxError {
    #[error("unexpected {{ at position {0}")]
    UnexpectedOpen(usize),
    #[error("unexpected }} at position {0}")]
    UnexpectedClose(usize),
    #[error("missing }} for key name starting at position {0}")]
    MissingClose(usize),
    #[error("empty key name at position {0}")]
    EmptyName(usize),
}

/// Split `input` into key names.
///
/// A trailing lone backslash is ignored.
pub fn parse_keys(input: &str) -> Result<Vec<String>, KeySyntaxError> {
    let mut keys = Vec::new();
    let mut escaped = false;
    // Start position and buffer of a `{...}` name being read.
    let mut name: Option<(usize, String)> = None;

    for (pos, c) in input.chars().enumerate() {
        if escaped {
            escaped = false;
            match name.as_mut() {
                Some((_, buf)) => buf.push(c),
                None => keys.push(c.to_string()),
            }
            continue;
        }

        match c {
            '\\' => escaped = true,
            '{' => {
                if name.is_some() {
                    return Err(KeySyntaxError::UnexpectedOpen(pos));
                }
                name = Some((pos, String::new()));
            }
            '}' => match name.take() {
                Some((start, buf)) if buf.is_empty() => {
                    return Err(KeySyntaxError::EmptyName(start))
                }
                Some((_, buf)) => keys.push(buf),
                None => return Err(KeySyntaxError::UnexpectedClose(pos)),
            },
            c => match name.as_mut() {
                Some((_, buf)) => buf.push(c),
                None => keys.push(c.to_string()),
            },
        }
    }

    if let Some((start, _)) = name {
        return Err(KeySyntaxError::MissingClose(start));
    }
    Ok(keys)
}

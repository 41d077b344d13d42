use std::collections::HashMap;
use std::fs;
use std::path::Path;

use super::onnx_yolo_detector::DetectorError;

/// Class index → display name.
///
/// Built either from a labels file (one name per line, line N = class N) or
/// from the `names` metadata string YOLO exporters embed in the model, e.g.
/// `{0: 'alice', 1: 'bob'}`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClassNames {
    names: HashMap<usize, String>,
}

impl ClassNames {
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names = lines
            .into_iter()
            .enumerate()
            .filter_map(|(i, line)| {
                let name = line.as_ref().trim();
                (!name.is_empty()).then(|| (i, name.to_string()))
            })
            .collect();
        Self { names }
    }

    pub fn from_labels_file(path: &Path) -> Result<Self, DetectorError> {
        let text = fs::read_to_string(path).map_err(|e| DetectorError::ModelLoad {
            path: path.to_path_buf(),
            reason: format!("cannot read labels file: {e}"),
        })?;
        Ok(Self::from_lines(text.lines()))
    }

    /// Parses a `{index: 'name', ...}` mapping. Keys may be bare or quoted,
    /// values single- or double-quoted.
    pub fn parse_metadata(text: &str) -> Result<Self, String> {
        let body = text
            .trim()
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .ok_or_else(|| format!("names metadata is not a mapping: {text:?}"))?;

        let mut names = HashMap::new();
        let mut chars = body.chars().peekable();
        loop {
            skip_separators(&mut chars);
            if chars.peek().is_none() {
                break;
            }
            let key = read_token(&mut chars)?;
            let index: usize = key
                .parse()
                .map_err(|_| format!("class index is not a number: {key:?}"))?;
            skip_whitespace(&mut chars);
            if chars.next() != Some(':') {
                return Err(format!("expected ':' after class index {index}"));
            }
            skip_whitespace(&mut chars);
            let name = read_token(&mut chars)?;
            names.insert(index, name);
        }
        Ok(Self { names })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Name for `index`, or `class_<index>` when the model never named it.
    pub fn name(&self, index: usize) -> String {
        self.names
            .get(&index)
            .cloned()
            .unwrap_or_else(|| format!("class_{index}"))
    }
}

type Chars<'a> = std::iter::Peekable<std::str::Chars<'a>>;

fn skip_whitespace(chars: &mut Chars<'_>) {
    while chars.peek().is_some_and(|c| c.is_whitespace()) {
        chars.next();
    }
}

fn skip_separators(chars: &mut Chars<'_>) {
    while chars.peek().is_some_and(|c| c.is_whitespace() || *c == ',') {
        chars.next();
    }
}

/// Reads a quoted string (with `\` escapes) or a bare run up to `:`/`,`.
fn read_token(chars: &mut Chars<'_>) -> Result<String, String> {
    match chars.peek().copied() {
        Some(quote @ ('\'' | '"')) => {
            chars.next();
            let mut out = String::new();
            loop {
                match chars.next() {
                    Some('\\') => match chars.next() {
                        Some(c) => out.push(c),
                        None => return Err("unterminated escape in names metadata".into()),
                    },
                    Some(c) if c == quote => return Ok(out),
                    Some(c) => out.push(c),
                    None => return Err("unterminated string in names metadata".into()),
                }
            }
        }
        Some(_) => {
            let mut out = String::new();
            while let Some(&c) = chars.peek() {
                if c == ':' || c == ',' {
                    break;
                }
                out.push(c);
                chars.next();
            }
            Ok(out.trim().to_string())
        }
        None => Err("unexpected end of names metadata".into()),
    }
}

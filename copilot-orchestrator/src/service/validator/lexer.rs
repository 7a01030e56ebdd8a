//! Minimal Lua scanner
//!
//! Splits a chunk into its string literals and the remaining code with
//! comments removed. String literals are replaced by `""` in the code so
//! call detection never sees their contents.

/// Result of scanning a Lua chunk
#[derive(Debug, Default, PartialEq)]
pub struct Scanned {
    /// Decoded contents of every string literal, in source order
    pub strings: Vec<String>,
    /// Code outside strings and comments
    pub code: String,
    /// Byte offset in `code` of the `""` standing in for each literal
    pub placeholders: Vec<usize>,
}

impl Scanned {
    /// Index of the literal whose placeholder starts at `offset`
    pub fn literal_at(&self, offset: usize) -> Option<usize> {
        self.placeholders.binary_search(&offset).ok()
    }

    fn push_literal(&mut self, text: String) {
        self.strings.push(text);
        self.placeholders.push(self.code.len());
        self.code.push_str("\"\"");
    }
}

pub fn scan(source: &str) -> Scanned {
    let chars: Vec<char> = source.chars().collect();
    let mut out = Scanned::default();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '-' && chars.get(i + 1) == Some(&'-') {
            i += 2;
            if let Some(level) = long_bracket_level(&chars, i) {
                let (_, end) = read_long(&chars, i, level);
                i = end;
            } else {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            out.code.push(' ');
            continue;
        }

        if c == '"' || c == '\'' {
            let (text, end) = read_quoted(&chars, i + 1, c);
            out.push_literal(text);
            i = end;
            continue;
        }

        if c == '[' {
            if let Some(level) = long_bracket_level(&chars, i) {
                let (text, end) = read_long(&chars, i, level);
                out.push_literal(text);
                i = end;
                continue;
            }
        }

        out.code.push(c);
        i += 1;
    }

    out
}

/// Level of a long bracket opening at `start` (`[[` is 0, `[=[` is 1, ...)
fn long_bracket_level(chars: &[char], start: usize) -> Option<usize> {
    if chars.get(start) != Some(&'[') {
        return None;
    }
    let mut level = 0;
    let mut i = start + 1;
    while chars.get(i) == Some(&'=') {
        level += 1;
        i += 1;
    }
    (chars.get(i) == Some(&'[')).then_some(level)
}

/// Read a long bracket body, returning its text and the index past its end
fn read_long(chars: &[char], start: usize, level: usize) -> (String, usize) {
    let mut i = start + level + 2;
    // A newline right after the opening bracket is not part of the string
    if chars.get(i) == Some(&'\n') {
        i += 1;
    }

    let mut text = String::new();
    while i < chars.len() {
        if chars[i] == ']' && closes(chars, i, level) {
            return (text, i + level + 2);
        }
        text.push(chars[i]);
        i += 1;
    }
    (text, chars.len())
}

fn closes(chars: &[char], at: usize, level: usize) -> bool {
    (1..=level).all(|k| chars.get(at + k) == Some(&'='))
        && chars.get(at + level + 1) == Some(&']')
}

/// Read a quoted string body starting after the opening quote
fn read_quoted(chars: &[char], start: usize, quote: char) -> (String, usize) {
    let mut text = String::new();
    let mut i = start;

    while i < chars.len() {
        match chars[i] {
            '\\' => {
                match chars.get(i + 1) {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some(&other) => text.push(other),
                    None => {}
                }
                i += 2;
            }
            c if c == quote => return (text, i + 1),
            // Unterminated string; the syntax check reports it
            '\n' => return (text, i),
            c => {
                text.push(c);
                i += 1;
            }
        }
    }

    (text, chars.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_quoted_strings() {
        let scanned = scan(r#"local q = "SELECT * FROM sales" print('it\'s done')"#);
        assert_eq!(scanned.strings, vec!["SELECT * FROM sales", "it's done"]);
        assert_eq!(scanned.code, r#"local q = "" print("")"#);
    }

    #[test]
    fn test_placeholders_point_at_literals() {
        let scanned = scan(r#"ctx.write("sales", ctx.read('data/sales.csv'))"#);
        assert_eq!(scanned.code, r#"ctx.write("", ctx.read(""))"#);
        assert_eq!(scanned.placeholders, vec![10, 23]);
        assert_eq!(scanned.literal_at(23), Some(1));
        assert_eq!(scanned.literal_at(11), None);
    }

    #[test]
    fn test_scan_long_strings() {
        let scanned = scan("local q = [==[\nDELETE FROM t]]\n]==] return q");
        assert_eq!(scanned.strings, vec!["DELETE FROM t]]\n"]);
        assert_eq!(scanned.code, "local q = \"\" return q");
    }

    #[test]
    fn test_scan_skips_comments() {
        let scanned = scan("-- os.execute('x')\n--[[ DROP TABLE sales ]]\nreturn 1");
        assert!(scanned.strings.is_empty());
        assert!(!scanned.code.contains("os.execute"));
        assert!(scanned.code.contains("return 1"));
    }

    #[test]
    fn test_scan_keeps_indexing_brackets() {
        let scanned = scan("local x = t[1] + t[ [[k]] ]");
        assert_eq!(scanned.strings, vec!["k"]);
        assert_eq!(scanned.code, "local x = t[1] + t[ \"\" ]");
    }
}

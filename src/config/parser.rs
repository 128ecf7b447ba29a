// redis.conf-style parser: one `key value` directive per line

use anyhow::{bail, Result};

pub struct ConfigParser<'a> {
    content: &'a str,
}

impl<'a> ConfigParser<'a> {
    pub fn new(content: &'a str) -> Self {
        Self { content }
    }

    /// Directives in file order. Keys are lowercased; blank lines and
    /// `#` comments are skipped; surrounding quotes on values are stripped.
    pub fn parse(&self) -> Result<Vec<(String, String)>> {
        let mut directives = Vec::new();

        for (line_no, raw) in self.content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (key, value) = match line.split_once(char::is_whitespace) {
                Some((key, value)) => (key, value.trim()),
                None => bail!("line {}: missing value for '{}'", line_no + 1, line),
            };

            directives.push((key.to_lowercase(), unquote(value).to_string()));
        }

        Ok(directives)
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

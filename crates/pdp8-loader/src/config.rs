//! Device configuration file parser: line-oriented `device NAME { ... }`
//! blocks. Unknown device names and keys are retained, not rejected, so a
//! config mixing every recognized device kind always parses.

use std::fmt;

#[derive(Debug)]
pub enum ConfigError {
    UnterminatedBlock { name: String },
    UnexpectedClose { line: usize },
    MalformedEntry { line: usize, text: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnterminatedBlock { name } => write!(f, "unterminated device block: {name}"),
            Self::UnexpectedClose { line } => write!(f, "unexpected '}}' at line {line}"),
            Self::MalformedEntry { line, text } => {
                write!(f, "malformed config entry at line {line}: {text}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone)]
pub struct DeviceBlock {
    pub name: String,
    pub entries: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub devices: Vec<DeviceBlock>,
}

impl Config {
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&DeviceBlock> {
        self.devices.iter().find(|d| d.name == name)
    }
}

impl DeviceBlock {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

/// Parse a `pdp8.config`-style text into [`Config`].
pub fn parse(text: &str) -> Result<Config, ConfigError> {
    let mut devices = Vec::new();
    let mut current: Option<DeviceBlock> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix("device ") {
            let name = rest.trim_end_matches('{').trim().to_string();
            current = Some(DeviceBlock {
                name,
                entries: Vec::new(),
            });
            continue;
        }

        if line == "}" {
            match current.take() {
                Some(block) => devices.push(block),
                None => return Err(ConfigError::UnexpectedClose { line: line_no }),
            }
            continue;
        }

        let Some(block) = current.as_mut() else {
            return Err(ConfigError::MalformedEntry {
                line: line_no,
                text: line.to_string(),
            });
        };

        let Some((key, value)) = line.split_once('=') else {
            return Err(ConfigError::MalformedEntry {
                line: line_no,
                text: line.to_string(),
            });
        };
        block
            .entries
            .push((key.trim().to_string(), value.trim().to_string()));
    }

    if let Some(block) = current {
        return Err(ConfigError::UnterminatedBlock { name: block.name });
    }

    Ok(Config { devices })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_multiple_device_blocks_and_ignores_comments() {
        let text = "\
# console setup
device kl8e_console {
    keyboard_input = stdin
    teleprinter_output = stdout
}

device paper_tape {
    image = tapes/demo.tape
}
";
        let config = parse(text).unwrap();
        assert_eq!(config.devices.len(), 2);
        let console = config.find("kl8e_console").unwrap();
        assert_eq!(console.get("keyboard_input"), Some("stdin"));
        let tape = config.find("paper_tape").unwrap();
        assert_eq!(tape.get("image"), Some("tapes/demo.tape"));
    }

    #[test]
    fn unknown_device_names_and_keys_parse_successfully() {
        let text = "device watchdog {\n    enabled = true\n    mode = reset\n}\n";
        let config = parse(text).unwrap();
        assert_eq!(config.devices[0].name, "watchdog");
    }

    #[test]
    fn unterminated_block_is_an_error() {
        let text = "device paper_tape {\n    image = x\n";
        assert!(matches!(
            parse(text),
            Err(ConfigError::UnterminatedBlock { .. })
        ));
    }

    #[test]
    fn unexpected_close_brace_is_an_error() {
        let text = "}\n";
        assert!(matches!(parse(text), Err(ConfigError::UnexpectedClose { .. })));
    }
}

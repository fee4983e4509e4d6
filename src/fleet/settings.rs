//! Configuration text for the configure command.
//!
//! Newline-separated `key = value` pairs. Surrounding whitespace is trimmed,
//! blank lines are skipped, and there is no comment syntax: a `#` is part of
//! the key or value like any other character.

use super::error::SettingsError;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

/// Where configuration text comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsSource {
    /// Standard input (`-` on the command line).
    Stdin,
    /// A named file.
    File(PathBuf),
}

impl SettingsSource {
    /// Interpret a command-line argument; a single dash means standard input.
    pub fn from_arg(arg: &str) -> Self {
        if arg == "-" {
            SettingsSource::Stdin
        } else {
            SettingsSource::File(PathBuf::from(arg))
        }
    }

    /// Read the full text.
    pub fn read_to_string(&self) -> Result<String, SettingsError> {
        match self {
            SettingsSource::Stdin => {
                let mut text = String::new();
                io::stdin().read_to_string(&mut text)?;
                Ok(text)
            }
            SettingsSource::File(path) => Ok(fs::read_to_string(path)?),
        }
    }
}

/// Parse `key = value` lines into a map. Later keys overwrite earlier ones.
pub fn parse_settings(text: &str) -> Result<BTreeMap<String, String>, SettingsError> {
    let mut settings = BTreeMap::new();
    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            return Err(SettingsError::InvalidLine {
                line: index + 1,
                text: raw.to_string(),
            });
        };

        let key = key.trim();
        if key.is_empty() {
            return Err(SettingsError::EmptyKey(index + 1));
        }
        settings.insert(key.to_string(), value.trim().to_string());
    }
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trims_whitespace() {
        let settings = parse_settings("a.b = 1\nc=2").unwrap();
        let expected: BTreeMap<String, String> = [("a.b", "1"), ("c", "2")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert_eq!(settings, expected);
    }

    #[test]
    fn test_hash_is_not_a_comment() {
        let settings = parse_settings("#color = red\nurl = http://host/#frag\n").unwrap();
        assert_eq!(settings.get("#color").map(String::as_str), Some("red"));
        assert_eq!(
            settings.get("url").map(String::as_str),
            Some("http://host/#frag")
        );
    }

    #[test]
    fn test_value_may_contain_equals() {
        let settings = parse_settings("query = a=b").unwrap();
        assert_eq!(settings["query"], "a=b");
    }

    #[test]
    fn test_blank_lines_skipped_and_bad_line_rejected() {
        assert!(parse_settings("\n   \n").unwrap().is_empty());
        let err = parse_settings("ok = 1\nnot a pair").unwrap_err();
        assert!(matches!(err, SettingsError::InvalidLine { line: 2, .. }));
        assert!(matches!(
            parse_settings(" = 3").unwrap_err(),
            SettingsError::EmptyKey(1)
        ));
    }

    #[test]
    fn test_source_from_arg() {
        assert_eq!(SettingsSource::from_arg("-"), SettingsSource::Stdin);
        assert_eq!(
            SettingsSource::from_arg("live.conf"),
            SettingsSource::File(PathBuf::from("live.conf"))
        );
    }
}

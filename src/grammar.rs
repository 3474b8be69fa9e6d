//! Micro-grammar for a single query value.
//!
//! ```text
//! value    := argList ['(' flagList ')']
//! argList  := '' | arg (',' arg)*
//! flagList := flag (',' flag)*
//! flag     := key ['=' val]
//! ```
//!
//! Examples:
//!
//! ```text
//! resize=200                 → args ["200"]
//! resize=0.5,100(exact)      → args ["0.5", "100"], flags {exact}
//! border=5,10(color=ff0000ff) → args ["5", "10"], flags {color: "ff0000ff"}
//! ```
//!
//! `overlay` is the one exception: its flag section comes first and everything
//! after the closing parenthesis is a URL, which may itself contain commas and
//! parentheses.
//!
//! ```text
//! overlay=(x=right,y=bottom)https://example.com/logo.png
//! ```

use crate::error::ValidationError;
use std::collections::HashMap;

/// Flags of one operation. Ordering is irrelevant; a repeated key keeps the
/// last value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Flags(HashMap<String, Option<String>>);

impl Flags {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Raw lookup: `None` if absent, `Some(None)` for a bare key.
    pub fn get(&self, key: &str) -> Option<Option<&str>> {
        self.0.get(key).map(|v| v.as_deref())
    }

    /// A presence flag such as `exact`. Giving it a value is an error.
    pub fn switch(&self, op: &str, key: &str) -> Result<bool, ValidationError> {
        match self.get(key) {
            None => Ok(false),
            Some(None) => Ok(true),
            Some(Some(_)) => Err(ValidationError::new(format!(
                "Flag {key} for {op} does not take a value"
            ))),
        }
    }

    /// A `key=value` flag. Present without a value is an error.
    pub fn value(&self, op: &str, key: &str) -> Result<Option<&str>, ValidationError> {
        match self.get(key) {
            None => Ok(None),
            Some(Some(v)) if !v.is_empty() => Ok(Some(v)),
            Some(_) => Err(ValidationError::new(format!(
                "Flag {key} for {op} requires a value"
            ))),
        }
    }

    /// Reject any flag not in `allowed`.
    pub fn ensure_only(&self, op: &str, allowed: &[&str]) -> Result<(), ValidationError> {
        let mut unknown: Vec<&str> = self
            .0
            .keys()
            .map(String::as_str)
            .filter(|k| !allowed.contains(k))
            .collect();
        if unknown.is_empty() {
            return Ok(());
        }
        unknown.sort_unstable();
        Err(ValidationError::new(format!(
            "Unknown flag {} for {op}",
            unknown.join(", ")
        )))
    }
}

/// One parsed `key=value` pair of the query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationSpec {
    pub name: String,
    pub args: Vec<String>,
    pub flags: Flags,
}

impl OperationSpec {
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }
}

/// Parse `argList ['(' flagList ')']`.
///
/// At most `max_args` positional arguments are accepted; one more is an
/// error naming the operation.
pub fn parse_value(name: &str, raw: &str, max_args: usize) -> Result<OperationSpec, ValidationError> {
    let (arg_part, flags) = match raw.find('(') {
        Some(open) => {
            let inner = raw[open + 1..]
                .strip_suffix(')')
                .ok_or_else(|| missing_paren(name))?;
            (&raw[..open], parse_flags(name, inner)?)
        }
        None => (raw, Flags::default()),
    };

    Ok(OperationSpec {
        name: name.to_string(),
        args: split_args(name, arg_part, max_args)?,
        flags,
    })
}

/// Parse `['(' flagList ')'] url`, the overlay form.
///
/// The URL is returned as the single positional argument, untouched.
pub fn parse_overlay_value(name: &str, raw: &str) -> Result<OperationSpec, ValidationError> {
    let (flags, url) = match raw.strip_prefix('(') {
        Some(rest) => {
            let close = rest.find(')').ok_or_else(|| missing_paren(name))?;
            (parse_flags(name, &rest[..close])?, &rest[close + 1..])
        }
        None => (Flags::default(), raw),
    };

    Ok(OperationSpec {
        name: name.to_string(),
        args: vec![url.to_string()],
        flags,
    })
}

fn split_args(name: &str, arg_part: &str, max_args: usize) -> Result<Vec<String>, ValidationError> {
    if arg_part.is_empty() {
        return Ok(Vec::new());
    }
    // One extra slot so an overflow is visible instead of folded into the last arg.
    let args: Vec<String> = arg_part
        .splitn(max_args + 1, ',')
        .map(str::to_string)
        .collect();
    if args.len() > max_args {
        return Err(ValidationError::new(format!(
            "Too many arguments for {name}: expected at most {max_args}"
        )));
    }
    Ok(args)
}

fn parse_flags(name: &str, raw: &str) -> Result<Flags, ValidationError> {
    let mut flags = HashMap::new();
    for flag in raw.split(',').filter(|f| !f.is_empty()) {
        let (key, value) = match flag.split_once('=') {
            Some((k, v)) => (k, Some(v.to_string())),
            None => (flag, None),
        };
        if key.is_empty() {
            return Err(ValidationError::new(format!("Empty flag name for {name}")));
        }
        flags.insert(key.to_string(), value);
    }
    Ok(Flags(flags))
}

fn missing_paren(name: &str) -> ValidationError {
    ValidationError::new(format!("Missing closing parenthesis for {name}"))
}

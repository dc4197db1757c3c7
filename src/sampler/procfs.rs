//! Parser for `/proc/[pid]/status`.
//!
//! Pure function over the file contents so it can be tested with string input.

use std::collections::HashMap;

/// Error type for parsing failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// Memory fields of `/proc/[pid]/status`, in kB as the kernel reports them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcStatus {
    pub vm_size: u64,
    pub vm_rss: u64,
}

/// Parses `/proc/[pid]/status` content.
///
/// Format is key:\tvalue pairs, one per line. Kernel threads have no `Vm*`
/// lines at all, which is reported as an error rather than zero sizes.
pub fn parse_proc_status(content: &str) -> Result<ProcStatus, ParseError> {
    let mut fields: HashMap<&str, &str> = HashMap::new();

    for line in content.lines() {
        if let Some((key, value)) = line.split_once(':') {
            fields.insert(key.trim(), value.trim());
        }
    }

    // Memory fields are in kB format: "12345 kB"
    let parse_kb = |key: &str| -> Result<u64, ParseError> {
        let raw = fields
            .get(key)
            .ok_or_else(|| ParseError::new(format!("missing field {}", key)))?;
        raw.split_whitespace()
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| ParseError::new(format!("invalid {}: {:?}", key, raw)))
    };

    Ok(ProcStatus {
        vm_size: parse_kb("VmSize")?,
        vm_rss: parse_kb("VmRSS")?,
    })
}

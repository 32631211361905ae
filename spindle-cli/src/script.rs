//! Instruction tapes: the JSON scripts the `spindle` binary runs.
//!
//! A script is a list of instructions, each an operation name and, for
//! `PUSH`, an operand:
//!
//! ```json
//! {
//!   "instructions": [
//!     { "op": "PUSH", "arg": "value" },
//!     { "op": "PUSH", "arg": "key" },
//!     { "op": "SET_DATABASE" },
//!     { "op": "PUSH", "arg": { "hex": "ff" } }
//!   ]
//! }
//! ```

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// A literal pushed onto the stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    Int(i64),
    /// UTF-8 text, pushed as its bytes.
    Text(String),
    /// Arbitrary bytes written as hexadecimal.
    Hex { hex: String },
}

impl Operand {
    pub fn hex_bytes(hex: &str) -> Result<Bytes> {
        if !hex.is_ascii() || hex.len() % 2 != 0 {
            bail!("malformed hex string {:?}", hex);
        }
        (0..hex.len())
            .step_by(2)
            .map(|i| {
                u8::from_str_radix(&hex[i..i + 2], 16)
                    .with_context(|| format!("invalid hex digits in {:?}", hex))
            })
            .collect::<Result<Vec<u8>>>()
            .map(Bytes::from)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub op: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arg: Option<Operand>,
}

impl Instruction {
    pub fn new(op: impl Into<String>) -> Self {
        Self {
            op: op.into(),
            arg: None,
        }
    }

    pub fn push(arg: Operand) -> Self {
        Self {
            op: "PUSH".to_string(),
            arg: Some(arg),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    pub instructions: Vec<Instruction>,
}

impl Script {
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("Invalid instruction script")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read script {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Failed to parse script {}", path.display()))
    }
}

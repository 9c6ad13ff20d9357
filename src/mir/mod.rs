// This module provides machine functions for tests and tooling. A machine function is a CFG of
// named blocks, each holding iced-x86 instructions and an explicit successor list, plus the
// argument types of the function. Functions are written in a small text format where every
// instruction line is its raw encoding in hex, decoded in 64-bit mode, and `jump` lines name the
// successors. The adaptor (adaptor.rs) exposes a parsed function to the tracker, computing
// register writes and flag families once per instruction.

//! Machine function fixtures.
//!
//! ```text
//! ; two-way merge of rax
//! pick(i64, i64) {
//! entry:
//!     48 39 f7        ; cmp rdi, rsi
//!     jump ^left, ^right
//! left:
//!     48 89 f8        ; mov rax, rdi
//!     jump ^join
//! right:
//!     48 89 f0        ; mov rax, rsi
//!     jump ^join
//! join:
//!     c3              ; ret
//! }
//! ```

pub mod adaptor;
mod parser;

pub use adaptor::{InstRef, MirAdaptor};

use crate::ir::{BlockId, Function, Type};
use iced_x86::Instruction;
use thiserror::Error;

/// Fixture parsing failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MirError {
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("line {line}: cannot decode '{bytes}'")]
    InvalidEncoding { line: usize, bytes: String },

    #[error("function {func}: unknown block '{name}'")]
    UnknownBlock { func: String, name: String },

    #[error("function {func}: duplicate block '{name}'")]
    DuplicateBlock { func: String, name: String },

    #[error("function {func} has no blocks")]
    EmptyFunction { func: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineBlock {
    pub name: String,
    pub insts: Vec<Instruction>,
    pub succs: Vec<BlockId>,
}

/// A decoded function with its CFG.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineFunction {
    pub name: String,
    pub arg_types: Vec<Type>,
    pub blocks: Vec<MachineBlock>,
}

impl MachineFunction {
    /// Parse every function in `text`.
    pub fn parse(text: &str) -> Result<Vec<MachineFunction>, MirError> {
        parser::parse_module(text)
    }

    pub fn block_id(&self, name: &str) -> Option<BlockId> {
        self.blocks
            .iter()
            .position(|b| b.name == name)
            .map(|idx| BlockId(idx as u32))
    }

    /// Predecessor lists derived from the successor lists.
    pub fn preds(&self) -> Vec<Vec<BlockId>> {
        let mut preds = vec![Vec::new(); self.blocks.len()];
        for (idx, block) in self.blocks.iter().enumerate() {
            for succ in &block.succs {
                preds[succ.index()].push(BlockId(idx as u32));
            }
        }
        preds
    }

    pub fn inst_count(&self) -> usize {
        self.blocks.iter().map(|b| b.insts.len()).sum()
    }

    /// Empty raised function with the same arguments and blocks.
    pub fn raised_function(&self) -> Function {
        Function::new(
            self.name.clone(),
            &self.arg_types,
            self.blocks.iter().map(|b| b.name.clone()),
        )
    }
}

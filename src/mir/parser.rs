//! Machine function fixture parser.

use super::*;
use iced_x86::{Code, Decoder, DecoderOptions};
use hashbrown::HashMap;

/// Address of the first decoded instruction.
const BASE_IP: u64 = 0x1000;

pub fn parse_module(text: &str) -> Result<Vec<MachineFunction>, MirError> {
    Parser::new(text).parse()
}

struct Parser<'a> {
    text: &'a str,
    pos: usize,
    ip: u64,
    funcs: Vec<MachineFunction>,

    // Per-function maps
    blocks: HashMap<&'a str, u32>,
    succ_resolves: Vec<Resolve<'a>>,
}

#[derive(Debug)]
struct Resolve<'a> {
    name: &'a str,
    block: u32,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            pos: 0,
            ip: BASE_IP,
            funcs: Vec::new(),
            blocks: HashMap::new(),
            succ_resolves: Vec::new(),
        }
    }

    fn parse(mut self) -> Result<Vec<MachineFunction>, MirError> {
        self.skip_whitespace(true);
        while !self.is_eof() {
            self.parse_function()?;
            self.skip_whitespace(true);
        }
        Ok(self.funcs)
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn current_char(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current_char() {
            self.pos += ch.len_utf8();
        }
    }

    fn line(&self) -> usize {
        self.text[..self.pos].matches('\n').count() + 1
    }

    fn syntax<T>(&self, message: impl Into<String>) -> Result<T, MirError> {
        Err(MirError::Syntax {
            line: self.line(),
            message: message.into(),
        })
    }

    fn skip_whitespace(&mut self, skip_newlines: bool) {
        while let Some(ch) = self.current_char() {
            if ch == ';' {
                // Comment runs to the end of the line
                while let Some(ch) = self.current_char() {
                    if ch == '\n' {
                        break;
                    }
                    self.advance();
                }
            } else if ch.is_whitespace() {
                if ch == '\n' && !skip_newlines {
                    break;
                }
                self.advance();
            } else {
                break;
            }
        }
    }

    fn try_read(&mut self, ch: char) -> bool {
        self.skip_whitespace(true);
        if self.current_char() == Some(ch) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, ch: char) -> Result<(), MirError> {
        if !self.try_read(ch) {
            return self.syntax(format!(
                "expected '{}' but found {:?}",
                ch,
                self.current_char()
            ));
        }
        Ok(())
    }

    /// Alphanumeric word, possibly starting with a digit.
    fn read_word(&mut self) -> &'a str {
        let start = self.pos;
        while let Some(ch) = self.current_char() {
            if ch.is_ascii_alphanumeric() || ch == '_' || ch == '.' {
                self.advance();
            } else {
                break;
            }
        }
        &self.text[start..self.pos]
    }

    fn read_identifier(&mut self) -> Result<&'a str, MirError> {
        self.skip_whitespace(true);
        match self.current_char() {
            Some(ch) if ch.is_ascii_alphabetic() || ch == '_' => Ok(self.read_word()),
            Some(ch) => self.syntax(format!("expected identifier but found '{ch}'")),
            None => self.syntax("expected identifier but found end of input"),
        }
    }

    fn read_type(&mut self) -> Result<Type, MirError> {
        let word = self.read_identifier()?;
        let ty = match word {
            "ptr" => Type::Ptr,
            "f32" => Type::F32,
            "f64" => Type::F64,
            _ => match word.strip_prefix('i').and_then(|bits| bits.parse::<u32>().ok()) {
                Some(bits) if bits > 0 => Type::Int(bits),
                _ => return self.syntax(format!("unknown argument type '{word}'")),
            },
        };
        Ok(ty)
    }

    fn parse_function(&mut self) -> Result<(), MirError> {
        let name = self.read_identifier()?;
        self.blocks.clear();
        self.succ_resolves.clear();

        self.expect('(')?;
        let mut arg_types = Vec::new();
        while !self.try_read(')') {
            arg_types.push(self.read_type()?);
            if !self.try_read(',') && self.current_char() != Some(')') {
                return self.syntax("expected ',' or ')' in argument list");
            }
        }

        self.expect('{')?;
        let mut blocks = Vec::new();
        while !self.try_read('}') {
            if self.is_eof() {
                return self.syntax(format!("unterminated function '{name}'"));
            }
            let block = self.parse_block(name, blocks.len() as u32)?;
            blocks.push(block);
        }

        if blocks.is_empty() {
            return Err(MirError::EmptyFunction {
                func: name.to_string(),
            });
        }

        for resolve in self.succ_resolves.drain(..) {
            let Some(&target) = self.blocks.get(resolve.name) else {
                return Err(MirError::UnknownBlock {
                    func: name.to_string(),
                    name: resolve.name.to_string(),
                });
            };
            let block: &mut MachineBlock = &mut blocks[resolve.block as usize];
            block.succs.push(BlockId(target));
        }

        self.funcs.push(MachineFunction {
            name: name.to_string(),
            arg_types,
            blocks,
        });
        Ok(())
    }

    fn parse_block(&mut self, func: &str, index: u32) -> Result<MachineBlock, MirError> {
        let name = self.read_identifier()?;
        self.expect(':')?;
        if self.blocks.insert(name, index).is_some() {
            return Err(MirError::DuplicateBlock {
                func: func.to_string(),
                name: name.to_string(),
            });
        }

        let mut block = MachineBlock {
            name: name.to_string(),
            insts: Vec::new(),
            succs: Vec::new(),
        };

        loop {
            self.skip_whitespace(true);
            if self.is_eof() || self.current_char() == Some('}') {
                break;
            }

            let start = self.pos;
            let word = self.read_word();
            self.skip_whitespace(false);
            if self.current_char() == Some(':') {
                // Next block label
                self.pos = start;
                break;
            }

            if word == "jump" {
                loop {
                    self.expect('^')?;
                    let target = self.read_identifier()?;
                    self.succ_resolves.push(Resolve {
                        name: target,
                        block: index,
                    });
                    if !self.try_read(',') {
                        break;
                    }
                }
            } else if is_hex_byte(word) {
                self.pos = start;
                self.parse_encoding(&mut block)?;
            } else {
                return self.syntax(format!("unexpected '{word}' in block '{name}'"));
            }
        }

        Ok(block)
    }

    /// Decode one line of hex bytes into `block`.
    fn parse_encoding(&mut self, block: &mut MachineBlock) -> Result<(), MirError> {
        let line = self.line();
        let mut bytes = Vec::new();
        loop {
            while matches!(self.current_char(), Some(' ') | Some('\t') | Some('\r')) {
                self.advance();
            }
            match self.current_char() {
                None | Some('\n') | Some(';') => break,
                _ => {}
            }
            let word = self.read_word();
            if !is_hex_byte(word) {
                return self.syntax(format!("expected a hex byte but found '{word}'"));
            }
            let byte = u8::from_str_radix(word, 16).map_err(|e| MirError::Syntax {
                line,
                message: e.to_string(),
            })?;
            bytes.push(byte);
        }

        let mut decoder = Decoder::with_ip(64, &bytes, self.ip, DecoderOptions::NONE);
        while decoder.can_decode() {
            let instr = decoder.decode();
            if instr.code() == Code::INVALID {
                let text: Vec<String> = bytes.iter().map(|b| format!("{b:02x}")).collect();
                return Err(MirError::InvalidEncoding {
                    line,
                    bytes: text.join(" "),
                });
            }
            block.insts.push(instr);
        }
        self.ip += bytes.len() as u64;
        Ok(())
    }
}

fn is_hex_byte(word: &str) -> bool {
    word.len() == 2 && word.chars().all(|c| c.is_ascii_hexdigit())
}

//! Core IR, collaborator traits, and rendering primitives for the disasm_lens
//! disassembly visualizer.
//!
//! The crate turns a disassembler's output into a scrollable, colorized
//! listing (see [`format`]) and a coverage overlay that maps instruction
//! extents back onto a zoomed 2-D view of the source bytes (see [`overlay`]).
//! Decoding itself is delegated to a [`Disassembler`], drawing to a
//! [`Surface`].
//!
//! # Basic Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use disasm_lens::{
//!     canvas::Canvas,
//!     classify::{Classifier, ColorPolicy},
//!     decoder::{CapstoneDecoder, DecoderOptions},
//!     format::FormatProgram,
//!     registry::ArchRegistry,
//!     session::{RenderSettings, Session},
//! };
//!
//! let registry = ArchRegistry::supported();
//! let entry = *registry.get("x86-64").unwrap();
//!
//! let settings = Arc::new(RenderSettings::new(
//!     FormatProgram::default(),
//!     Classifier::new(ColorPolicy::Simple),
//! ));
//! let mut session = Session::new(settings, move || {
//!     CapstoneDecoder::open(&entry, DecoderOptions::default())
//! });
//!
//! let mut surface = Canvas::new(1, 1);
//! let code = [0x55, 0x48, 0x89, 0xe5, 0xc3];
//! session.populate(true, 0x1000, &code, &mut surface);
//! ```

pub mod canvas;
pub mod classify;
pub mod config;
pub mod decoder;
pub mod format;
pub mod overlay;
pub mod parser;
pub mod registry;
pub mod session;

use std::fmt;

use serde::Serialize;

/// Represents an absolute position in the source stream
pub type Address = u64;

/// Maximum instruction size in bytes kept per instruction
pub const MAX_INSTRUCTION_SIZE: usize = 16;

/// Glyph cell width in pixels
pub const FONT_W: usize = 8;
/// Glyph cell height in pixels
pub const FONT_H: usize = 8;
/// Vertical padding added between listing rows
pub const ROW_PAD: usize = 2;

/// A packed RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const TRANSPARENT: Rgba = Rgba::new(0x00, 0x00, 0x00, 0x00);
    pub const BLACK: Rgba = Rgba::new(0x00, 0x00, 0x00, 0xff);
    pub const WHITE: Rgba = Rgba::new(0xff, 0xff, 0xff, 0xff);
    pub const RED: Rgba = Rgba::new(0xff, 0x00, 0x00, 0xff);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Opaque color from a `0xRRGGBB` literal.
    pub const fn opaque(rgb: u32) -> Self {
        Self::new((rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8, 0xff)
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
    }
}

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insn {
    /// Absolute address of the instruction in the source stream
    pub addr: Address,
    /// Size of the instruction in bytes
    pub size: u32,
    /// Instruction mnemonic (e.g., "mov", "add")
    pub mnemonic: String,
    /// Instruction operands as string representation
    pub operands: String,
    /// Raw bytes of the instruction (up to MAX_INSTRUCTION_SIZE)
    pub bytes: [u8; MAX_INSTRUCTION_SIZE],
    /// Group tags reported by the disassembler
    pub groups: Vec<u8>,
    /// Whether the disassembler attached detail information
    pub detail: bool,
}

impl Insn {
    /// Build an instruction without detail information.
    pub fn new(addr: Address, raw: &[u8], mnemonic: &str, operands: &str) -> Self {
        let mut bytes = [0u8; MAX_INSTRUCTION_SIZE];
        let kept = raw.len().min(MAX_INSTRUCTION_SIZE);
        bytes[..kept].copy_from_slice(&raw[..kept]);

        Self {
            addr,
            size: raw.len() as u32,
            mnemonic: mnemonic.to_string(),
            operands: operands.to_string(),
            bytes,
            groups: Vec::new(),
            detail: false,
        }
    }

    /// Attach detail information with the given group tags.
    pub fn with_groups(mut self, groups: &[u8]) -> Self {
        self.groups = groups.to_vec();
        self.detail = true;
        self
    }

    /// Returns the instruction bytes, up to the actual instruction size.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes[..(self.size as usize).min(MAX_INSTRUCTION_SIZE)]
    }

    /// Address one past the last byte of the instruction
    pub fn end(&self) -> Address {
        self.addr + self.size as Address
    }
}

impl fmt::Display for Insn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}", self.mnemonic, self.operands)
    }
}

/// Disassembler collaborator: decodes a byte range into instructions.
pub trait Disassembler {
    /// Decode as many instructions as possible from `code`, the first one
    /// located at `start`. May return an empty vector.
    fn disassemble(&mut self, code: &[u8], start: Address) -> Vec<Insn>;

    /// Human readable name of a group tag, if the engine knows one.
    fn group_name(&self, _group: u8) -> Option<String> {
        None
    }
}

/// Render primitives collaborator supplied by the host.
///
/// Coordinates are in pixels with the origin in the top-left corner.
/// Implementations clip anything that falls outside the surface.
pub trait Surface {
    /// Width in pixels
    fn width(&self) -> usize;

    /// Height in pixels
    fn height(&self) -> usize;

    /// Resize the surface. Contents are undefined afterwards.
    fn resize(&mut self, width: usize, height: usize);

    /// Fill a rectangle with `color`, replacing what was there.
    fn draw_box(&mut self, x: usize, y: usize, w: usize, h: usize, color: Rgba);

    /// Draw a monochrome text run with its top-left corner at `(x, y)`.
    fn draw_text(&mut self, text: &str, x: usize, y: usize, color: Rgba);
}

/// Errors produced while bringing up or running the disassembler
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The engine handle could not be constructed
    #[error("Failed to initialize disassembler: {0}")]
    EngineInit(String),

    /// The engine produced no instructions for the requested range
    #[error("failed disassembly @{position:x}")]
    EmptyResult { position: Address },
}

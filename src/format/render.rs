//! Expansion of a parsed format program into colored text runs.

use crate::classify::{Classifier, Role};
use crate::{Address, Insn, Rgba, Surface, FONT_H, FONT_W, ROW_PAD};

use super::{FormatProgram, FormatToken};

/// Smallest (and default) accumulator size in bytes
pub const ACCUMULATOR_CAPACITY: usize = 64;

/// Default distance between tab columns, in pixels
pub const DEFAULT_TAB_WIDTH: usize = 80;

const HEX: &[u8; 16] = b"0123456789abcdef";

/// Pen position on the output surface, owned by the caller across rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cursor {
    pub x: usize,
    pub y: usize,
}

impl Cursor {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

/// Per-render inputs that do not change between rows.
#[derive(Debug, Clone, Copy)]
pub struct RowContext<'a> {
    pub classifier: &'a Classifier,
    /// Position the current decode was requested at, used by `%P`
    pub base: Address,
    pub tab_width: usize,
    capacity: usize,
}

impl<'a> RowContext<'a> {
    pub fn new(classifier: &'a Classifier, base: Address, tab_width: usize) -> Self {
        Self {
            classifier,
            base,
            tab_width: if tab_width == 0 { DEFAULT_TAB_WIDTH } else { tab_width },
            capacity: ACCUMULATOR_CAPACITY,
        }
    }

    /// Use a larger accumulator; values below the minimum are raised to it.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(ACCUMULATOR_CAPACITY);
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Fixed-capacity text buffer. Appends past the capacity are truncated.
#[derive(Debug, Clone)]
pub struct Accumulator {
    buf: String,
    capacity: usize,
}

impl Accumulator {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: String::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.buf.len()
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Append one char; returns false when it does not fit.
    pub fn push(&mut self, c: char) -> bool {
        if c.len_utf8() > self.remaining() {
            return false;
        }
        self.buf.push(c);
        true
    }

    /// Append as much of `s` as fits, never splitting a char.
    pub fn push_str(&mut self, s: &str) {
        for c in s.chars() {
            if !self.push(c) {
                break;
            }
        }
    }

    /// Append space separated hex pairs, stopping at the first pair that
    /// would not fit entirely.
    pub fn push_hex(&mut self, bytes: &[u8]) {
        for &b in bytes {
            if self.remaining() < 3 {
                break;
            }
            self.buf.push(HEX[(b >> 4) as usize] as char);
            self.buf.push(HEX[(b & 0xf) as usize] as char);
            self.buf.push(' ');
        }
    }
}

/// Flushes accumulated text to the surface as monochrome runs.
struct RowWriter<'s, S: Surface + ?Sized> {
    surface: &'s mut S,
    cursor: &'s mut Cursor,
    acc: Accumulator,
    color: Rgba,
}

impl<'s, S: Surface + ?Sized> RowWriter<'s, S> {
    fn flush(&mut self) {
        if self.acc.is_empty() {
            return;
        }

        self.surface
            .draw_text(self.acc.as_str(), self.cursor.x, self.cursor.y, self.color);
        self.cursor.x += self.acc.as_str().chars().count() * FONT_W;
        self.acc.clear();
    }

    fn recolor(&mut self, color: Rgba) {
        if color != self.color {
            self.flush();
            self.color = color;
        }
    }

    fn tab(&mut self, width: usize) {
        self.flush();
        self.cursor.x += width - self.cursor.x % width;
    }

    fn newline(&mut self) {
        self.flush();
        self.cursor.x = 0;
        self.cursor.y += FONT_H + ROW_PAD;
    }
}

impl FormatProgram {
    /// Expand this program for `insn`, drawing runs at `cursor` and
    /// advancing it. Returns false without drawing when the surface cannot
    /// hold a single glyph.
    pub fn render_row<S: Surface + ?Sized>(
        &self,
        insn: &Insn,
        ctx: &RowContext<'_>,
        cursor: &mut Cursor,
        surface: &mut S,
    ) -> bool {
        if surface.width() / FONT_W == 0 {
            return false;
        }

        let capacity = ctx.capacity();
        let color_of = |role| ctx.classifier.color_for(insn, role);
        let mut w = RowWriter {
            surface,
            cursor,
            acc: Accumulator::new(capacity),
            color: Rgba::WHITE,
        };

        for token in self.tokens() {
            if w.acc.len() > capacity / 2 {
                w.flush();
            }

            match *token {
                FormatToken::Literal(c) => {
                    if !w.acc.push(c) {
                        w.flush();
                        w.acc.push(c);
                    }
                }
                FormatToken::PercentLiteral => {
                    w.acc.push('%');
                }
                FormatToken::Position => {
                    w.recolor(color_of(Role::Position));
                    w.acc.push_str(&format!("{:08x} ", insn.addr));
                }
                FormatToken::RelativePosition => {
                    w.recolor(color_of(Role::Position));
                    w.acc
                        .push_str(&format!("{:04x} ", insn.addr.wrapping_sub(ctx.base)));
                }
                FormatToken::RawHex => {
                    w.recolor(color_of(Role::RawBytes));
                    w.acc.push_hex(insn.bytes());
                }
                FormatToken::Mnemonic => {
                    w.recolor(color_of(Role::Opcode));
                    w.acc.push_str(&insn.mnemonic);
                }
                FormatToken::Operands => {
                    w.recolor(color_of(Role::Operand));
                    w.acc.push_str(&insn.operands);
                }
                FormatToken::TabStop => w.tab(ctx.tab_width),
                FormatToken::Newline => w.newline(),
            }
        }

        w.flush();
        true
    }
}

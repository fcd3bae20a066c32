//! Per-surface disassembly session: engine lifecycle, scroll state, the
//! cached decode result and the populate/input entry points the host calls
//! every frame.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::classify::{Classifier, Role};
use crate::format::{Cursor, FormatProgram, RowContext, ACCUMULATOR_CAPACITY, DEFAULT_TAB_WIDTH};
use crate::overlay::{self, CellMap, ZoomRect};
use crate::{Address, DecodeError, Disassembler, Insn, Rgba, Surface, FONT_H, FONT_W, ROW_PAD};

/// Surface size requested once the engine is up
pub const DEFAULT_SURFACE_SIZE: (usize, usize) = (256, 256);

const ERROR_SURFACE_SIZE: (usize, usize) = (256, 16);
const HEADER_COLOR: Rgba = Rgba::opaque(0x444444);
const BACKGROUND: Rgba = Rgba::BLACK;

/// First row of content, below the header bar
const CONTENT_TOP: usize = FONT_H + 4;

/// Read-only rendering configuration shared by every session.
#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub program: FormatProgram,
    pub classifier: Classifier,
    pub tab_width: usize,
    pub capacity: usize,
    pub surface_size: (usize, usize),
}

impl RenderSettings {
    pub fn new(program: FormatProgram, classifier: Classifier) -> Self {
        Self {
            program,
            classifier,
            tab_width: DEFAULT_TAB_WIDTH,
            capacity: ACCUMULATOR_CAPACITY,
            surface_size: DEFAULT_SURFACE_SIZE,
        }
    }

    /// Tab width in pixels; zero falls back to the default.
    pub fn with_tab_width(mut self, tab_width: usize) -> Self {
        self.tab_width = if tab_width == 0 { DEFAULT_TAB_WIDTH } else { tab_width };
        self
    }

    pub fn with_surface_size(mut self, width: usize, height: usize) -> Self {
        self.surface_size = (width, height);
        self
    }
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self::new(FormatProgram::default(), Classifier::default())
    }
}

/// How the decode result is presented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayMode {
    /// One formatted row per instruction
    #[default]
    Listing,
    /// Instruction counts per group
    GroupStats,
}

impl DisplayMode {
    pub fn toggled(self) -> Self {
        match self {
            DisplayMode::Listing => DisplayMode::GroupStats,
            DisplayMode::GroupStats => DisplayMode::Listing,
        }
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayMode::Listing => write!(f, "normal"),
            DisplayMode::GroupStats => write!(f, "gstat"),
        }
    }
}

/// Input delivered by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    /// A labeled button/key press
    Digital { label: String },
    /// Axis motion; never handled here
    Analog,
}

impl InputEvent {
    pub fn digital(label: &str) -> Self {
        InputEvent::Digital {
            label: label.to_string(),
        }
    }
}

/// Lifecycle of the disassembler handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Uninitialized,
    Active,
    Failed,
}

type Opener<D> = Box<dyn FnOnce() -> Result<D, DecodeError>>;

enum Engine<D> {
    Pending(Opener<D>),
    Active(D),
    Failed,
}

/// State owned by exactly one output surface.
pub struct Session<D: Disassembler> {
    settings: Arc<RenderSettings>,
    engine: Engine<D>,
    scroll_offset: usize,
    mode: DisplayMode,
    base_position: Address,
    decoded: Option<Result<Vec<Insn>, DecodeError>>,
    dirty: bool,
}

impl<D: Disassembler> Session<D> {
    /// Create an uninitialized session; `open` runs on the first populate.
    pub fn new<F>(settings: Arc<RenderSettings>, open: F) -> Self
    where
        F: FnOnce() -> Result<D, DecodeError> + 'static,
    {
        Self {
            settings,
            engine: Engine::Pending(Box::new(open)),
            scroll_offset: 0,
            mode: DisplayMode::Listing,
            base_position: 0,
            decoded: None,
            dirty: true,
        }
    }

    pub fn status(&self) -> SessionStatus {
        match self.engine {
            Engine::Pending(_) => SessionStatus::Uninitialized,
            Engine::Active(_) => SessionStatus::Active,
            Engine::Failed => SessionStatus::Failed,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status() == SessionStatus::Active
    }

    pub fn scroll_offset(&self) -> usize {
        self.scroll_offset
    }

    pub fn display_mode(&self) -> DisplayMode {
        self.mode
    }

    pub fn base_position(&self) -> Address {
        self.base_position
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// The cached decode result, if the last decode produced instructions.
    pub fn last_decode(&self) -> Option<&[Insn]> {
        match &self.decoded {
            Some(Ok(insns)) => Some(insns),
            _ => None,
        }
    }

    /// Force a re-decode on the next render.
    pub fn invalidate(&mut self) {
        self.dirty = true;
    }

    /// Construct the engine if that has not been attempted yet.
    fn open_engine(&mut self) -> Result<(), DecodeError> {
        match std::mem::replace(&mut self.engine, Engine::Failed) {
            Engine::Pending(open) => match open() {
                Ok(engine) => {
                    self.engine = Engine::Active(engine);
                    Ok(())
                }
                Err(e) => {
                    log::warn!("session disabled: {}", e);
                    Err(e)
                }
            },
            Engine::Active(engine) => {
                self.engine = Engine::Active(engine);
                Ok(())
            }
            Engine::Failed => Err(DecodeError::EngineInit("engine unavailable".into())),
        }
    }

    /// Decode `buffer` (located at `position`) from the current scroll
    /// offset on, reusing the cached result when neither the data, the
    /// position nor the offset changed.
    pub fn ensure_decoded(
        &mut self,
        buffer: &[u8],
        position: Address,
    ) -> Result<&[Insn], DecodeError> {
        self.open_engine()?;

        let offset = self.scroll_offset.min(buffer.len());
        if offset != self.scroll_offset {
            self.scroll_offset = offset;
            self.dirty = true;
        }

        if self.dirty || self.decoded.is_none() || position != self.base_position {
            // release the previous result before decoding anew
            self.decoded = None;
            self.base_position = position;

            let start = position + offset as Address;
            let insns = match &mut self.engine {
                Engine::Active(engine) => engine.disassemble(&buffer[offset..], start),
                _ => Vec::new(),
            };
            log::debug!(
                "decoded {} instructions from {} bytes at 0x{:x}",
                insns.len(),
                buffer.len() - offset,
                start
            );

            self.decoded = Some(if insns.is_empty() {
                Err(DecodeError::EmptyResult { position: start })
            } else {
                Ok(insns)
            });
            self.dirty = false;
        }

        match &self.decoded {
            Some(Ok(insns)) => Ok(insns),
            Some(Err(e)) => Err(e.clone()),
            None => Err(DecodeError::EmptyResult { position }),
        }
    }

    /// Apply a host input event. Returns whether it was handled.
    pub fn input(&mut self, event: &InputEvent) -> bool {
        let InputEvent::Digital { label } = event else {
            return false;
        };
        if self.status() == SessionStatus::Failed {
            return false;
        }

        match label.as_str() {
            "RIGHT" => {
                self.scroll_offset += 1;
                self.dirty = true;
            }
            "LEFT" => {
                if self.scroll_offset > 0 {
                    self.scroll_offset -= 1;
                    self.dirty = true;
                }
            }
            "TAB" => self.mode = self.mode.toggled(),
            _ => return false,
        }

        log::trace!("input {} -> offset {}, mode {}", label, self.scroll_offset, self.mode);
        true
    }

    /// Decode and render one frame of `buffer` into `surface`.
    ///
    /// Returns false when nothing was drawn because the session is inert.
    pub fn populate<S: Surface + ?Sized>(
        &mut self,
        newdata: bool,
        position: Address,
        buffer: &[u8],
        surface: &mut S,
    ) -> bool {
        if let Engine::Pending(_) = self.engine {
            if let Err(e) = self.open_engine() {
                draw_engine_error(surface, &e);
                return true;
            }
            let (w, h) = self.settings.surface_size;
            surface.resize(w, h);
        }

        if !self.is_active() {
            return false;
        }

        if newdata {
            self.scroll_offset = 0;
            self.dirty = true;
        }

        let (w, h) = (surface.width(), surface.height());
        surface.draw_box(0, 0, w, h, BACKGROUND);

        match self.ensure_decoded(buffer, position).map(|_| ()) {
            Ok(()) => match self.mode {
                DisplayMode::Listing => self.draw_listing(surface),
                DisplayMode::GroupStats => self.draw_group_stats(surface),
            },
            Err(e) => surface.draw_text(&e.to_string(), 2, CONTENT_TOP, Rgba::RED),
        }

        self.draw_header(surface, position);
        true
    }

    /// Paint the coverage overlay for the cached decode result.
    ///
    /// Returns false without touching `overlay` when the session is inert.
    pub fn paint_overlay<S, M>(&self, zoom: ZoomRect, cell_map: &M, overlay: &mut S) -> bool
    where
        S: Surface + ?Sized,
        M: CellMap + ?Sized,
    {
        if !self.is_active() {
            return false;
        }

        let insns = self.last_decode().unwrap_or(&[]);
        overlay::paint_overlay(
            insns,
            zoom,
            self.base_position,
            &self.settings.classifier,
            cell_map,
            overlay,
        );
        true
    }

    fn draw_listing<S: Surface + ?Sized>(&self, surface: &mut S) {
        let Some(insns) = self.last_decode() else {
            return;
        };

        let settings = &self.settings;
        let ctx = RowContext::new(&settings.classifier, self.base_position, settings.tab_width)
            .with_capacity(settings.capacity);
        let limit = surface.height().saturating_sub(FONT_H);
        let mut cursor = Cursor::new(0, CONTENT_TOP);

        for insn in insns {
            if cursor.y >= limit {
                break;
            }
            if !settings.program.render_row(insn, &ctx, &mut cursor, surface) {
                break;
            }
        }
    }

    fn draw_group_stats<S: Surface + ?Sized>(&self, surface: &mut S) {
        let Some(insns) = self.last_decode() else {
            return;
        };

        let mut counts: BTreeMap<u8, usize> = BTreeMap::new();
        let mut ungrouped = 0;
        for insn in insns {
            if insn.groups.is_empty() {
                ungrouped += 1;
            }
            for &group in &insn.groups {
                *counts.entry(group).or_default() += 1;
            }
        }

        let engine = match &self.engine {
            Engine::Active(engine) => engine,
            _ => return,
        };

        let mut rows: Vec<(String, Rgba)> = counts
            .into_iter()
            .map(|(group, count)| {
                let name = engine
                    .group_name(group)
                    .unwrap_or_else(|| format!("group {}", group));
                let probe = Insn::new(0, &[], "", "").with_groups(&[group]);
                let color = self.settings.classifier.color_for(&probe, Role::Opcode);
                (format!("{}: {}", name, count), color)
            })
            .collect();
        if ungrouped > 0 {
            rows.push((format!("ungrouped: {}", ungrouped), Rgba::WHITE));
        }

        let limit = surface.height().saturating_sub(FONT_H);
        let mut y = CONTENT_TOP;
        for (text, color) in rows {
            if y >= limit {
                break;
            }
            surface.draw_text(&text, 0, y, color);
            y += FONT_H + ROW_PAD;
        }
    }

    fn draw_header<S: Surface + ?Sized>(&self, surface: &mut S, position: Address) {
        let width = surface.width();
        let chars = width.saturating_sub(4) / (FONT_W + 2);
        if chars <= 1 {
            return;
        }

        let text = format!("{} @ {:x} +{}", self.mode, position, self.scroll_offset);
        let text: String = text.chars().take(chars - 1).collect();

        surface.draw_box(0, 0, width, FONT_H + 2, HEADER_COLOR);
        surface.draw_text(&text, 2, 2, Rgba::WHITE);
    }
}

fn draw_engine_error<S: Surface + ?Sized>(surface: &mut S, error: &DecodeError) {
    let (w, h) = ERROR_SURFACE_SIZE;
    surface.resize(w, h);
    surface.draw_box(0, 0, w, FONT_H + 6, BACKGROUND);
    surface.draw_text(&error.to_string(), 2, 2, Rgba::RED);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Canvas;
    use crate::classify::ColorPolicy;
    use crate::overlay::RowMajor;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Decodes every byte as a one byte instruction; `0xff` ends the stream.
    struct ByteDecoder {
        calls: Rc<Cell<usize>>,
    }

    impl Disassembler for ByteDecoder {
        fn disassemble(&mut self, code: &[u8], start: Address) -> Vec<Insn> {
            self.calls.set(self.calls.get() + 1);
            code.iter()
                .take_while(|&&b| b != 0xff)
                .enumerate()
                .map(|(i, &b)| {
                    Insn::new(start + i as Address, &[b], "db", &format!("0x{:02x}", b))
                        .with_groups(&[b % 4])
                })
                .collect()
        }

        fn group_name(&self, group: u8) -> Option<String> {
            (group == 1).then(|| "jump".to_string())
        }
    }

    fn session(policy: ColorPolicy) -> (Session<ByteDecoder>, Rc<Cell<usize>>) {
        let calls = Rc::new(Cell::new(0));
        let settings = RenderSettings::new(FormatProgram::default(), Classifier::new(policy));
        let counter = calls.clone();
        let session = Session::new(Arc::new(settings), move || Ok(ByteDecoder { calls: counter }));
        (session, calls)
    }

    fn failing() -> Session<ByteDecoder> {
        Session::new(Arc::new(RenderSettings::default()), || {
            Err(DecodeError::EngineInit("no such mode".into()))
        })
    }

    fn header(canvas: &Canvas) -> &str {
        let run = canvas.runs().iter().find(|r| r.y == 2).expect("header drawn");
        &run.text
    }

    const DATA: [u8; 8] = [0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17];

    #[test]
    fn test_lazy_engine_and_resize() {
        let (mut session, _) = session(ColorPolicy::Simple);
        let mut canvas = Canvas::new(1, 1);
        assert_eq!(session.status(), SessionStatus::Uninitialized);

        assert!(session.populate(true, 0x400, &DATA, &mut canvas));

        assert_eq!(session.status(), SessionStatus::Active);
        assert_eq!((canvas.width(), canvas.height()), DEFAULT_SURFACE_SIZE);
        assert_eq!(session.last_decode().unwrap().len(), DATA.len());
        assert_eq!(header(&canvas), "normal @ 400 +0");
        assert!(canvas.plain_text().contains("00000400 "));
        assert!(canvas.plain_text().contains("0x17"));
    }

    #[test]
    fn test_engine_failure_is_terminal() {
        let mut session = failing();
        let mut canvas = Canvas::new(1, 1);

        assert!(session.populate(true, 0, &DATA, &mut canvas));
        assert_eq!(session.status(), SessionStatus::Failed);
        assert_eq!((canvas.width(), canvas.height()), ERROR_SURFACE_SIZE);
        assert_eq!(canvas.runs()[0].color, Rgba::RED);
        assert!(canvas.runs()[0].text.starts_with("Failed to initialize"));

        assert!(!session.populate(true, 0, &DATA, &mut canvas));
        assert!(!session.input(&InputEvent::digital("RIGHT")));
        assert!(session.ensure_decoded(&DATA, 0).is_err());

        let mut overlay = Canvas::new(16, 16);
        overlay.draw_box(0, 0, 16, 16, Rgba::WHITE);
        assert!(!session.paint_overlay(ZoomRect::new(0, 0, 16, 16), &RowMajor::new(16), &mut overlay));
        assert_eq!(overlay.count_not(Rgba::WHITE), 0);
    }

    #[test]
    fn test_scroll_invalidates_mode_does_not() {
        let (mut session, calls) = session(ColorPolicy::Simple);
        let mut canvas = Canvas::new(1, 1);

        session.populate(true, 0, &DATA, &mut canvas);
        session.populate(false, 0, &DATA, &mut canvas);
        assert_eq!(calls.get(), 1);

        assert!(session.input(&InputEvent::digital("TAB")));
        session.populate(false, 0, &DATA, &mut canvas);
        assert_eq!(calls.get(), 1);
        assert_eq!(session.display_mode(), DisplayMode::GroupStats);

        assert!(session.input(&InputEvent::digital("RIGHT")));
        session.populate(false, 0, &DATA, &mut canvas);
        assert_eq!(calls.get(), 2);
        assert_eq!(session.last_decode().unwrap()[0].addr, 1);
        assert_eq!(header(&canvas), "gstat @ 0 +1");
    }

    #[test]
    fn test_new_data_resets_scroll() {
        let (mut session, calls) = session(ColorPolicy::Simple);
        let mut canvas = Canvas::new(1, 1);

        session.populate(true, 0, &DATA, &mut canvas);
        session.input(&InputEvent::digital("RIGHT"));
        session.input(&InputEvent::digital("RIGHT"));
        session.populate(false, 0, &DATA, &mut canvas);
        assert_eq!(session.scroll_offset(), 2);

        session.populate(true, 0x100, &DATA, &mut canvas);
        assert_eq!(session.scroll_offset(), 0);
        assert_eq!(session.base_position(), 0x100);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_scroll_floor_and_clamp() {
        let (mut session, _) = session(ColorPolicy::Simple);

        assert!(session.input(&InputEvent::digital("LEFT")));
        assert_eq!(session.scroll_offset(), 0);

        for _ in 0..20 {
            session.input(&InputEvent::digital("RIGHT"));
        }
        assert_eq!(session.scroll_offset(), 20);

        // an offset past the buffer end is clamped to its length
        let err = session.ensure_decoded(&DATA, 0).unwrap_err();
        assert_eq!(session.scroll_offset(), DATA.len());
        assert_eq!(err, DecodeError::EmptyResult { position: 8 });
    }

    #[test]
    fn test_unhandled_input() {
        let (mut session, _) = session(ColorPolicy::Simple);

        assert!(!session.input(&InputEvent::digital("UP")));
        assert!(!session.input(&InputEvent::digital("right")));
        assert!(!session.input(&InputEvent::Analog));
        assert_eq!(session.scroll_offset(), 0);
    }

    #[test]
    fn test_empty_decode_keeps_session_active() {
        let (mut session, calls) = session(ColorPolicy::Simple);
        let mut canvas = Canvas::new(1, 1);
        let data = [0xff, 0x10, 0x11];

        assert!(session.populate(true, 0x2000, &data, &mut canvas));

        assert_eq!(session.status(), SessionStatus::Active);
        assert!(session.last_decode().is_none());
        let message = canvas
            .runs()
            .iter()
            .find(|r| r.color == Rgba::RED)
            .expect("inline error");
        assert_eq!(message.text, "failed disassembly @2000");
        assert_eq!(message.y, CONTENT_TOP);

        // no retry until something changes
        session.populate(false, 0x2000, &data, &mut canvas);
        assert_eq!(calls.get(), 1);

        session.input(&InputEvent::digital("RIGHT"));
        session.populate(false, 0x2000, &data, &mut canvas);
        assert_eq!(calls.get(), 2);
        assert_eq!(session.last_decode().unwrap().len(), 2);
    }

    #[test]
    fn test_group_stats_view() {
        let (mut session, _) = session(ColorPolicy::Group);
        let mut canvas = Canvas::new(1, 1);
        session.input(&InputEvent::digital("TAB"));

        // groups: 0x10 -> 0, 0x11 -> 1, 0x15 -> 1
        session.populate(true, 0, &[0x10, 0x11, 0x15], &mut canvas);

        let text = canvas.plain_text();
        assert!(text.contains("group 0: 1"), "{}", text);
        assert!(text.contains("jump: 2"), "{}", text);
    }

    #[test]
    fn test_listing_stops_at_surface_bottom() {
        let (mut session, _) = session(ColorPolicy::Simple);
        let mut canvas = Canvas::new(1, 1);
        let data = [0x20u8; 100];

        session.populate(true, 0, &data, &mut canvas);

        let rows = canvas.runs().iter().filter(|r| r.text == "db").count();
        let expected = (DEFAULT_SURFACE_SIZE.1 - FONT_H - CONTENT_TOP + FONT_H + ROW_PAD - 1)
            / (FONT_H + ROW_PAD);
        assert_eq!(rows, expected);
    }

    #[test]
    fn test_header_truncated_on_narrow_surface() {
        let settings = RenderSettings::default().with_surface_size(60, 64);
        let calls = Rc::new(Cell::new(0));
        let mut session = Session::new(Arc::new(settings), move || Ok(ByteDecoder { calls }));
        let mut canvas = Canvas::new(1, 1);

        session.populate(true, 0xabcdef, &DATA, &mut canvas);

        // (60 - 4) / 10 = 5 characters, minus one
        assert_eq!(header(&canvas), "norm");
    }

    #[test]
    fn test_tab_width_zero_uses_default() {
        let settings = RenderSettings::default().with_tab_width(0);
        assert_eq!(settings.tab_width, DEFAULT_TAB_WIDTH);
    }
}

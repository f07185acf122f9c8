// src/engine/session.rs
//
// Codec sessions. One session per decode or encode call; the session owns
// the bridge and the png reader/writer, and every engine call it makes is
// settled against the call's ErrorSlot before the next one is issued.

use crate::engine::common::run_with_panic_policy;
use crate::engine::io::{ReadBridge, WriteBridge};
use crate::engine::limits::Limits;
use crate::engine::pipeline::RowArena;
use crate::engine::{EncodeConfig, PNG_SIGNATURE};
use crate::error::PngError;
use crate::raw::{BitDepth, ColorType, Header, Transparency};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::io::{self, Cursor, Read, Write};
use tracing::{debug, warn};

type SessionResult<T> = std::result::Result<T, PngError>;

/// Non-fatal conditions observed during a call, in the order they occurred.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Diagnostics {
    warnings: Vec<String>,
}

impl Diagnostics {
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Log the warning and keep it. Never aborts anything.
    pub(crate) fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(target: "pngkit", "{message}");
        self.warnings.push(message);
    }

    pub(crate) fn extend(&mut self, other: Diagnostics) {
        self.warnings.extend(other.warnings);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    Read,
    Write,
}

/// Per-call error channel.
///
/// Bridges latch I/O faults here as they happen. After every engine call the
/// session settles the call's result against the slot: a latched fault wins
/// over whatever the engine reported, because it carries the real cause.
pub(crate) struct ErrorSlot {
    origin: String,
    direction: Direction,
    fault: RefCell<Option<PngError>>,
    exhausted_at: Cell<Option<u64>>,
    diagnostics: RefCell<Diagnostics>,
}

impl ErrorSlot {
    pub(crate) fn reading(origin: impl Into<String>) -> Self {
        Self::new(origin.into(), Direction::Read)
    }

    pub(crate) fn writing(origin: impl Into<String>) -> Self {
        Self::new(origin.into(), Direction::Write)
    }

    fn new(origin: String, direction: Direction) -> Self {
        Self {
            origin,
            direction,
            fault: RefCell::new(None),
            exhausted_at: Cell::new(None),
            diagnostics: RefCell::new(Diagnostics::default()),
        }
    }

    pub(crate) fn origin(&self) -> &str {
        &self.origin
    }

    /// Record a fault. The first one wins.
    pub(crate) fn latch(&self, fault: PngError) {
        let mut slot = self.fault.borrow_mut();
        if slot.is_none() {
            *slot = Some(fault);
        }
    }

    pub(crate) fn take_fault(&self) -> Option<PngError> {
        self.fault.borrow_mut().take()
    }

    /// Remember where the byte source ran dry. Only the first point counts.
    pub(crate) fn mark_exhausted(&self, offset: u64) {
        if self.exhausted_at.get().is_none() {
            self.exhausted_at.set(Some(offset));
        }
    }

    #[cfg(test)]
    pub(crate) fn exhausted_at(&self) -> Option<u64> {
        self.exhausted_at.get()
    }

    pub(crate) fn warn(&self, message: impl Into<String>) {
        self.diagnostics.borrow_mut().warn(message);
    }

    pub(crate) fn absorb(&self, diagnostics: Diagnostics) {
        self.diagnostics.borrow_mut().extend(diagnostics);
    }

    pub(crate) fn into_diagnostics(self) -> Diagnostics {
        self.diagnostics.into_inner()
    }

    /// Failure matching this slot's direction for an I/O error.
    pub(crate) fn io_failure(&self, error: &io::Error) -> PngError {
        self.failure(error.to_string())
    }

    fn failure(&self, description: String) -> PngError {
        match self.direction {
            Direction::Read => PngError::read_failed(self.origin.clone(), Some(description)),
            Direction::Write => PngError::write_failed(self.origin.clone(), Some(description)),
        }
    }

    /// Convert an engine call's outcome into the crate's error taxonomy.
    pub(crate) fn settle<T, E: fmt::Display>(
        &self,
        outcome: std::result::Result<T, E>,
    ) -> SessionResult<T> {
        let latched = self.take_fault();
        match (outcome, latched) {
            (_, Some(fault)) => Err(fault),
            (Ok(value), None) => Ok(value),
            (Err(engine), None) => {
                let mut description = engine.to_string();
                if let Some(offset) = self.exhausted_at.get() {
                    description.push_str(&format!(" (byte source exhausted after {offset} bytes)"));
                }
                Err(self.failure(description))
            }
        }
    }
}

/// Input handed to the png reader: the already-verified signature followed
/// by the rest of the stream.
type EngineInput<'a, R> = io::Chain<Cursor<[u8; 8]>, ReadBridge<'a, R>>;

enum RowOutcome {
    Filled,
    Missing,
    Stride(usize),
}

/// Decode half of a codec session.
pub(crate) struct DecodeSession<'a, R: Read> {
    reader: png::Reader<EngineInput<'a, R>>,
    slot: &'a ErrorSlot,
    header: Header,
}

impl<'a, R: Read> DecodeSession<'a, R> {
    /// Verify the signature, then let the engine read every chunk up to the
    /// first IDAT.
    pub(crate) fn open(source: &'a mut R, slot: &'a ErrorSlot, limits: &Limits) -> SessionResult<Self> {
        let mut bridge = ReadBridge::new(source, slot);
        let mut signature = [0u8; 8];
        bridge.fill_exact(&mut signature)?;
        if signature != PNG_SIGNATURE {
            return Err(PngError::read_failed(
                slot.origin().to_string(),
                Some("not a PNG stream: signature mismatch"),
            ));
        }

        let input = Cursor::new(signature).chain(bridge);
        let mut decoder = png::Decoder::new_with_limits(input, limits.engine_limits());
        decoder.set_transformations(png::Transformations::IDENTITY);
        let reader = slot.settle(run_with_panic_policy("decode:header", move || {
            decoder.read_info()
        })?)?;

        let info = reader.info();
        let header = Header::new(
            info.width,
            info.height,
            ColorType::from_png(info.color_type),
            BitDepth::from_png(info.bit_depth),
        );
        debug!(
            target: "pngkit::session",
            origin = slot.origin(),
            width = header.width,
            height = header.height,
            color_type = ?header.color_type,
            bit_depth = header.bit_depth.bits(),
            interlaced = info.interlaced,
            "header read"
        );
        Ok(Self {
            reader,
            slot,
            header,
        })
    }

    pub(crate) fn header(&self) -> Header {
        self.header
    }

    /// PLTE and tRNS as seen by the engine. Payloads that cannot apply to the
    /// image's color type are dropped with a warning.
    pub(crate) fn ancillary(&self) -> (Option<Vec<[u8; 3]>>, Option<Transparency>) {
        let info = self.reader.info();
        let palette = info.palette.as_ref().map(|plte| {
            plte.chunks_exact(3)
                .map(|rgb| [rgb[0], rgb[1], rgb[2]])
                .collect::<Vec<_>>()
        });
        let transparency = info.trns.as_ref().and_then(|trns| {
            let parsed = Transparency::from_chunk(self.header.color_type, trns);
            if parsed.is_none() {
                self.slot.warn(format!(
                    "tRNS chunk of {} bytes ignored for {:?} image",
                    trns.len(),
                    self.header.color_type
                ));
            }
            parsed
        });
        (palette, transparency)
    }

    /// Pull every scanline into a freshly allocated arena.
    pub(crate) fn read_rows(&mut self) -> SessionResult<RowArena> {
        let stride = self.header.row_byte_count();
        let height = self.header.height as usize;
        let mut arena = RowArena::allocate(height, stride);
        let slot = self.slot;

        if self.reader.info().interlaced {
            // Adam7 passes only resolve into whole rows once the frame is done
            let mut frame = vec![0u8; self.reader.output_buffer_size()];
            let reader = &mut self.reader;
            let out = slot.settle(run_with_panic_policy("decode:frame", || {
                reader.next_frame(&mut frame)
            })?)?;
            if out.line_size != stride {
                return Err(self.stride_mismatch(out.line_size));
            }
            arena.fill_from_frame(&frame);
            return Ok(arena);
        }

        for y in 0..height {
            let reader = &mut self.reader;
            let dst = arena.row_mut(y);
            let outcome = slot.settle(run_with_panic_policy("decode:rows", || -> Result<RowOutcome, png::DecodingError> {
                match reader.next_row()? {
                    Some(row) if row.data().len() == dst.len() => {
                        dst.copy_from_slice(row.data());
                        Ok(RowOutcome::Filled)
                    }
                    Some(row) => Ok(RowOutcome::Stride(row.data().len())),
                    None => Ok(RowOutcome::Missing),
                }
            })?)?;
            match outcome {
                RowOutcome::Filled => {}
                RowOutcome::Stride(actual) => return Err(self.stride_mismatch(actual)),
                RowOutcome::Missing => {
                    return Err(PngError::read_failed(
                        slot.origin().to_string(),
                        Some(format!("image data ended after {y} of {height} rows")),
                    ))
                }
            }
        }
        Ok(arena)
    }

    fn stride_mismatch(&self, actual: usize) -> PngError {
        PngError::read_failed(
            self.slot.origin().to_string(),
            Some(format!(
                "decoder row stride {actual} does not match expected {}",
                self.header.row_byte_count()
            )),
        )
    }

    /// Read through IEND. Consumes the session, detaching the bridge.
    pub(crate) fn finish(mut self) -> SessionResult<()> {
        let slot = self.slot;
        let reader = &mut self.reader;
        slot.settle(run_with_panic_policy("decode:end", || reader.finish())?)
    }
}

/// Encode half of a codec session.
pub(crate) struct EncodeSession<'a, W: Write> {
    writer: png::Writer<WriteBridge<'a, W>>,
    slot: &'a ErrorSlot,
}

impl<'a, W: Write> EncodeSession<'a, W> {
    /// Write the signature, IHDR and any PLTE/tRNS.
    pub(crate) fn open(
        sink: &'a mut W,
        slot: &'a ErrorSlot,
        header: Header,
        palette: Option<&[[u8; 3]]>,
        transparency: Option<&Transparency>,
        config: &EncodeConfig,
    ) -> SessionResult<Self> {
        let bridge = WriteBridge::new(sink, slot);
        let mut encoder = png::Encoder::new(bridge, header.width, header.height);
        encoder.set_color(header.color_type.to_png());
        encoder.set_depth(header.bit_depth.to_png());
        encoder.set_compression(config.compression.to_png());
        if let Some(palette) = palette {
            encoder.set_palette(palette.iter().flatten().copied().collect::<Vec<u8>>());
        }
        if let Some(transparency) = transparency {
            encoder.set_trns(transparency.to_chunk());
        }
        let writer = slot.settle(run_with_panic_policy("encode:header", move || {
            encoder.write_header()
        })?)?;
        debug!(
            target: "pngkit::session",
            origin = slot.origin(),
            width = header.width,
            height = header.height,
            color_type = ?header.color_type,
            bit_depth = header.bit_depth.bits(),
            "header written"
        );
        Ok(Self { writer, slot })
    }

    /// Stream every row of the arena through the engine's IDAT writer.
    pub(crate) fn write_rows(&mut self, rows: &RowArena) -> SessionResult<()> {
        let slot = self.slot;
        let mut stream = slot.settle(self.writer.stream_writer())?;
        for row in rows.rows() {
            slot.settle(run_with_panic_policy("encode:rows", || stream.write_all(row))?)?;
        }
        slot.settle(run_with_panic_policy("encode:rows", move || stream.finish())?)
    }

    /// Write IEND. Consumes the session, detaching the bridge.
    pub(crate) fn finish(self) -> SessionResult<()> {
        let slot = self.slot;
        let writer = self.writer;
        slot.settle(run_with_panic_policy("encode:end", move || writer.finish())?)
    }
}

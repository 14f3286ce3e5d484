//! MQ Arithmetic Coder (ISO/IEC 15444-1 Annex C)
//!
//! The MPS sub-interval sits above the LPS sub-interval, so coding an MPS moves
//! the code register up by `Qe` and an LPS keeps it at the interval base.

use crate::constants::{MQ_STATE_COUNT, NUM_CONTEXTS};

#[derive(Clone, Copy)]
struct MqContextState {
    qe: u32,
    nmps: u8,
    nlps: u8,
    switch: bool,
}

const fn state(qe: u32, nmps: u8, nlps: u8, switch: bool) -> MqContextState {
    MqContextState {
        qe,
        nmps,
        nlps,
        switch,
    }
}

// Standard Table C-2
#[rustfmt::skip]
const MQ_TABLE: [MqContextState; MQ_STATE_COUNT] = [
    state(0x5601, 1, 1, true),
    state(0x3401, 2, 6, false),
    state(0x1801, 3, 9, false),
    state(0x0AC1, 4, 12, false),
    state(0x0521, 5, 29, false),
    state(0x0221, 38, 33, false),
    state(0x5601, 7, 6, true),
    state(0x5401, 8, 14, false),
    state(0x4801, 9, 14, false),
    state(0x3801, 10, 14, false),
    state(0x3001, 11, 17, false),
    state(0x2401, 12, 18, false),
    state(0x1C01, 13, 20, false),
    state(0x1601, 29, 21, false),
    state(0x5601, 15, 14, true),
    state(0x5401, 16, 14, false),
    state(0x5101, 17, 15, false),
    state(0x4801, 18, 16, false),
    state(0x3801, 19, 17, false),
    state(0x3401, 20, 18, false),
    state(0x3001, 21, 19, false),
    state(0x2801, 22, 19, false),
    state(0x2401, 23, 20, false),
    state(0x2201, 24, 21, false),
    state(0x1C01, 25, 22, false),
    state(0x1801, 26, 23, false),
    state(0x1601, 27, 24, false),
    state(0x1401, 28, 25, false),
    state(0x1201, 29, 26, false),
    state(0x1101, 30, 27, false),
    state(0x0AC1, 31, 28, false),
    state(0x09C1, 32, 29, false),
    state(0x08A1, 33, 30, false),
    state(0x0521, 34, 31, false),
    state(0x0441, 35, 32, false),
    state(0x02A1, 36, 33, false),
    state(0x0221, 37, 34, false),
    state(0x0141, 38, 35, false),
    state(0x0111, 39, 36, false),
    state(0x0085, 40, 37, false),
    state(0x0049, 41, 38, false),
    state(0x0025, 42, 39, false),
    state(0x0015, 43, 40, false),
    state(0x0009, 44, 41, false),
    state(0x0005, 45, 42, false),
    state(0x0001, 45, 43, false),
    state(0x5601, 46, 46, false),
];

/// Probability state of one context: an index into Table C-2 and the sense of
/// the more probable symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MqContext {
    pub index: u8,
    pub mps: u8,
}

impl MqContext {
    pub const fn new(index: u8, mps: u8) -> Self {
        Self { index, mps }
    }

    #[inline]
    fn qe(&self) -> u32 {
        MQ_TABLE[self.index as usize].qe
    }

    #[inline]
    fn after_mps(&mut self) {
        self.index = MQ_TABLE[self.index as usize].nmps;
    }

    #[inline]
    fn after_lps(&mut self) {
        let entry = MQ_TABLE[self.index as usize];
        if entry.switch {
            self.mps = 1 - self.mps;
        }
        self.index = entry.nlps;
    }
}

/// The probability states of all contexts of one code-block coder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextStates {
    contexts: [MqContext; NUM_CONTEXTS],
}

impl Default for ContextStates {
    fn default() -> Self {
        let mut states = Self {
            contexts: [MqContext::default(); NUM_CONTEXTS],
        };
        states.reset();
        states
    }
}

impl ContextStates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore the initial states of Table D.7: the first zero-coding context
    /// starts at state 4, run-length at 3, uniform at 46, all others at 0.
    pub fn reset(&mut self) {
        self.contexts = [MqContext::default(); NUM_CONTEXTS];
        self.contexts[0] = MqContext::new(4, 0);
        self.contexts[crate::jpeg2000::context::RUN_LENGTH_CONTEXT as usize] = MqContext::new(3, 0);
        self.contexts[crate::jpeg2000::context::UNIFORM_CONTEXT as usize] = MqContext::new(46, 0);
    }

    /// Set a specific context to a given state and MPS value.
    ///
    /// # Panics
    ///
    /// Panics if `cx` is not below [`NUM_CONTEXTS`] or `index` is not a state
    /// of Table C-2.
    pub fn set(&mut self, cx: usize, index: u8, mps: u8) {
        assert!((index as usize) < MQ_STATE_COUNT, "invalid MQ state {}", index);
        self.contexts[cx] = MqContext::new(index, mps & 1);
    }

    /// # Panics
    ///
    /// Panics if `cx` is not below [`NUM_CONTEXTS`].
    pub fn get(&self, cx: usize) -> MqContext {
        self.contexts[cx]
    }
}

/// How a codeword segment is finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Termination {
    /// The flush procedure of C.2.9.
    #[default]
    Default,
    /// Predictable (ERTERM) termination: the decoder substituting `0xFF` bytes past
    /// the end of the segment decodes every coded symbol correctly.
    Predictable,
}

// Entry of the decision trace marking a reset of all context states.
const CONTEXT_RESET: u8 = u8::MAX;

pub struct MqEncoder {
    a: u32,
    c: u32,
    ct: u32,
    // Current codeword. Byte 0 is a placeholder preceding the first output byte;
    // the last byte may still receive a carry.
    segment: Vec<u8>,
    // Bytes of all codewords terminated so far.
    output: Vec<u8>,
    contexts: ContextStates,
    // Contexts of the decisions coded into the current codeword and the states
    // the codeword started from. Truncation points are replayed against them.
    trace: Vec<u8>,
    trace_start: Option<ContextStates>,
    // Trace positions of the truncation points inside the current codeword.
    marks: Vec<usize>,
    truncation_lengths: Vec<usize>,
}

impl Default for MqEncoder {
    fn default() -> Self {
        Self {
            a: 0x8000,
            c: 0,
            ct: 12,
            segment: vec![0],
            output: Vec::new(),
            contexts: ContextStates::new(),
            trace: Vec::new(),
            trace_start: None,
            marks: Vec::new(),
            truncation_lengths: Vec::new(),
        }
    }
}

impl MqEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the state of one context. Call it before the first decision of a
    /// codeword.
    ///
    /// # Panics
    ///
    /// Panics if `cx` is not below [`NUM_CONTEXTS`] or `index` is not a state
    /// of Table C-2.
    pub fn set_context(&mut self, cx: usize, index: u8, mps: u8) {
        self.contexts.set(cx, index, mps);
    }

    pub fn reset_contexts(&mut self) {
        if self.trace_start.is_some() {
            self.trace.push(CONTEXT_RESET);
        }
        self.contexts.reset();
    }

    pub fn contexts(&self) -> &ContextStates {
        &self.contexts
    }

    /// Code one binary decision in context `cx`.
    ///
    /// # Panics
    ///
    /// Panics if `cx` is not below [`NUM_CONTEXTS`].
    pub fn encode_bit(&mut self, cx: usize, bit: u8) {
        assert!(cx < NUM_CONTEXTS, "invalid context {}", cx);
        if self.trace_start.is_none() {
            self.trace_start = Some(self.contexts.clone());
        }
        self.trace.push(cx as u8);

        let ctx = &mut self.contexts.contexts[cx];
        let qe = ctx.qe();
        self.a -= qe;

        if bit == ctx.mps {
            // CODEMPS
            if self.a & 0x8000 == 0 {
                if self.a < qe {
                    self.a = qe;
                } else {
                    self.c += qe;
                }
                ctx.after_mps();
                self.renormalize();
            } else {
                self.c += qe;
            }
        } else {
            // CODELPS
            if self.a < qe {
                self.c += qe;
            } else {
                self.a = qe;
            }
            ctx.after_lps();
            self.renormalize();
        }
    }

    fn renormalize(&mut self) {
        loop {
            self.a <<= 1;
            self.c <<= 1;
            self.ct -= 1;
            if self.ct == 0 {
                self.byte_out();
            }
            if self.a & 0x8000 != 0 {
                break;
            }
        }
    }

    // BYTEOUT with carry propagation and bit stuffing (C.2.7).
    fn byte_out(&mut self) {
        let last = self.segment.len() - 1;
        if self.segment[last] == 0xFF {
            self.push_stuffed();
        } else if self.c & 0x8000000 == 0 {
            self.push_full();
        } else {
            self.segment[last] += 1;
            if self.segment[last] == 0xFF {
                self.c &= 0x7FFFFFF;
                self.push_stuffed();
            } else {
                self.push_full();
            }
        }
    }

    #[inline]
    fn push_stuffed(&mut self) {
        self.segment.push((self.c >> 20) as u8);
        self.c &= 0xFFFFF;
        self.ct = 7;
    }

    #[inline]
    fn push_full(&mut self) {
        self.segment.push((self.c >> 19) as u8);
        self.c &= 0x7FFFF;
        self.ct = 8;
    }

    /// Bytes written by all codewords so far including the current one.
    pub fn len(&self) -> usize {
        self.output.len() + self.segment.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Request the length a decoder needs to reproduce every decision coded so
    /// far when the current codeword is cut here without termination.
    ///
    /// The length is known once the codeword is terminated; it then appears in
    /// [`MqEncoder::truncation_lengths`] in the order the points were marked.
    pub fn mark_truncation_point(&mut self) {
        self.marks.push(self.trace.len());
    }

    /// Resolved truncation points as total byte counts, including all earlier
    /// codewords.
    pub fn truncation_lengths(&self) -> &[usize] {
        &self.truncation_lengths
    }

    /// Append a segment coded outside the MQ coder, such as a run of raw
    /// passes. The current codeword must be empty.
    ///
    /// Returns the total number of bytes produced so far.
    pub fn append_segment(&mut self, bytes: &[u8]) -> usize {
        debug_assert!(self.segment.len() == 1 && self.trace.is_empty());
        self.output.extend_from_slice(bytes);
        self.output.len()
    }

    /// Finish the current codeword and start a new one. Context states are kept.
    ///
    /// Returns the total number of bytes produced so far.
    pub fn terminate(&mut self, mode: Termination) -> usize {
        match mode {
            Termination::Default => self.flush(),
            Termination::Predictable => self.flush_predictable(),
        }

        // A codeword never ends with 0xFF; the decoder synthesizes it.
        if self.segment.len() > 1 && self.segment[self.segment.len() - 1] == 0xFF {
            self.segment.pop();
        }

        if !self.marks.is_empty() {
            let start = self
                .trace_start
                .take()
                .unwrap_or_else(|| self.contexts.clone());
            let base = self.output.len();
            let extents = decoder_extents(&self.segment[1..], start, &self.trace, &self.marks);
            self.truncation_lengths
                .extend(extents.into_iter().map(|e| base + e));
        }
        self.trace.clear();
        self.trace_start = None;
        self.marks.clear();
        self.output.extend_from_slice(&self.segment[1..]);

        self.a = 0x8000;
        self.c = 0;
        self.ct = 12;
        self.segment.clear();
        self.segment.push(0);
        self.output.len()
    }

    // C.2.9
    fn flush(&mut self) {
        // SETBITS
        let temp = self.c + self.a;
        self.c |= 0xFFFF;
        if self.c >= temp {
            self.c -= 0x8000;
        }

        self.c <<= self.ct;
        self.byte_out();
        self.c <<= self.ct;
        self.byte_out();
    }

    // Error resilient termination (D.4.2).
    fn flush_predictable(&mut self) {
        let mut k = 11 - self.ct as i32 + 1;
        while k > 0 {
            self.c <<= self.ct;
            self.ct = 0;
            self.byte_out();
            k -= self.ct as i32;
        }
    }

    /// All bytes of terminated codewords.
    pub fn get_buffer(&self) -> &[u8] {
        &self.output
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.output
    }
}

// Replay the decisions of a finished codeword and report, for every mark, how
// many leading bytes the decoder had read when it reached that point. A decoder
// handed exactly those bytes takes the same decisions, since everything past
// them is never looked at.
fn decoder_extents(
    codeword: &[u8],
    start: ContextStates,
    trace: &[u8],
    marks: &[usize],
) -> Vec<usize> {
    let mut decoder = MqDecoder::with_contexts(codeword, start);
    let mut extents = Vec::with_capacity(marks.len());
    let mut marks = marks.iter().peekable();
    let mut decided = false;

    // A cut never ends on 0xFF: the byte after it is taken along.
    let extent = |decoder: &MqDecoder, decided: bool| {
        if !decided {
            return 0;
        }
        let extent = decoder.extent().min(codeword.len());
        if extent > 0 && extent < codeword.len() && codeword[extent - 1] == 0xFF {
            extent + 1
        } else {
            extent
        }
    };

    for (position, &cx) in trace.iter().enumerate() {
        while marks.next_if(|&&m| m == position).is_some() {
            extents.push(extent(&decoder, decided));
        }
        if cx == CONTEXT_RESET {
            decoder.reset_contexts();
        } else {
            decoder.decode_bit(cx as usize);
            decided = true;
        }
    }
    for _ in marks {
        extents.push(extent(&decoder, decided));
    }
    extents
}

pub struct MqDecoder<'a> {
    data: &'a [u8],
    // Position of the byte last read into C.
    pos: usize,
    // One past the furthest position looked at.
    extent: usize,
    a: u32,
    c: u32,
    ct: u32,
    contexts: ContextStates,
    corrupted: bool,
}

impl<'a> MqDecoder<'a> {
    /// INITDEC (C.3.5) on `data` with initial context states.
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_contexts(data, ContextStates::new())
    }

    pub(crate) fn with_contexts(data: &'a [u8], contexts: ContextStates) -> Self {
        let mut decoder = Self {
            data,
            pos: 0,
            extent: 0,
            a: 0x8000,
            c: 0,
            ct: 0,
            contexts,
            corrupted: false,
        };
        decoder.init();
        decoder
    }

    /// Start decoding a new codeword segment, keeping the context states.
    pub fn restart(&mut self, data: &'a [u8]) {
        self.data = data;
        self.init();
    }

    fn init(&mut self) {
        self.pos = 0;
        self.extent = 0;
        self.c = self.byte_at(0) << 16;
        self.byte_in();
        self.c <<= 7;
        self.ct -= 7;
        self.a = 0x8000;
    }

    /// # Panics
    ///
    /// Panics if `cx` is not below [`NUM_CONTEXTS`] or `index` is not a state
    /// of Table C-2.
    pub fn set_context(&mut self, cx: usize, index: u8, mps: u8) {
        self.contexts.set(cx, index, mps);
    }

    pub fn reset_contexts(&mut self) {
        self.contexts.reset();
    }

    /// Number of leading segment bytes the decisions so far depended on.
    pub fn extent(&self) -> usize {
        self.extent
    }

    /// Whether the segment violated the byte stuffing rule or left the decoder
    /// outside its coding interval.
    pub fn is_corrupted(&self) -> bool {
        self.corrupted
    }

    // Past the end of the segment the decoder reads 0xFF, which together with the
    // following 0xFF behaves like a marker.
    #[inline]
    fn byte_at(&mut self, pos: usize) -> u32 {
        self.extent = self.extent.max(pos + 1);
        self.data.get(pos).copied().unwrap_or(0xFF) as u32
    }

    // BYTEIN (C.3.4)
    fn byte_in(&mut self) {
        if self.byte_at(self.pos) == 0xFF {
            let next = self.byte_at(self.pos + 1);
            if next > 0x8F {
                if self.pos + 1 < self.data.len() {
                    self.corrupted = true;
                }
                self.c = self.c.wrapping_add(0xFF00);
                self.ct = 8;
            } else {
                self.pos += 1;
                self.c = self.c.wrapping_add(next << 9);
                self.ct = 7;
            }
        } else {
            self.pos += 1;
            let byte = self.byte_at(self.pos);
            self.c = self.c.wrapping_add(byte << 8);
            self.ct = 8;
        }
    }

    /// Decode one binary decision in context `cx` (C.3.2).
    ///
    /// # Panics
    ///
    /// Panics if `cx` is not below [`NUM_CONTEXTS`].
    pub fn decode_bit(&mut self, cx: usize) -> u8 {
        let ctx = &mut self.contexts.contexts[cx];
        let qe = ctx.qe();
        self.a -= qe;

        let d;
        if (self.c >> 16) < qe {
            // LPS_EXCHANGE
            if self.a < qe {
                d = ctx.mps;
                ctx.after_mps();
            } else {
                d = 1 - ctx.mps;
                ctx.after_lps();
            }
            self.a = qe;
            self.renormalize();
        } else {
            self.c -= qe << 16;
            if self.a & 0x8000 == 0 {
                // MPS_EXCHANGE
                if self.a < qe {
                    d = 1 - ctx.mps;
                    ctx.after_lps();
                } else {
                    d = ctx.mps;
                    ctx.after_mps();
                }
                self.renormalize();
            } else {
                d = ctx.mps;
            }
        }

        if (self.c >> 16) >= self.a {
            self.corrupted = true;
        }
        d
    }

    // RENORMD
    fn renormalize(&mut self) {
        loop {
            if self.ct == 0 {
                self.byte_in();
            }
            self.a <<= 1;
            self.c <<= 1;
            self.ct -= 1;
            if self.a & 0x8000 != 0 {
                break;
            }
        }
    }
}

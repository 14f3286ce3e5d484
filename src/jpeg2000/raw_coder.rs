//! Raw bit coding of bypassed passes (ISO/IEC 15444-1 D.6)
//!
//! With selective arithmetic-coding bypass, significance propagation and
//! magnitude refinement from the fifth bit-plane on are written as plain bits,
//! most significant first. A byte following `0xFF` carries seven bits only, so
//! no marker code can appear inside a raw segment.

#[derive(Debug, Clone)]
pub struct RawEncoder {
    data: Vec<u8>,
    byte: u8,
    // Bit positions still free in `byte`.
    free: u8,
}

impl Default for RawEncoder {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            byte: 0,
            free: 8,
        }
    }
}

impl RawEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn encode_bit(&mut self, bit: u8) {
        self.free -= 1;
        self.byte |= (bit & 1) << self.free;
        if self.free == 0 {
            self.data.push(self.byte);
            self.free = if self.byte == 0xFF { 7 } else { 8 };
            self.byte = 0;
        }
    }

    fn has_pending_bits(&self) -> bool {
        let capacity = if self.data.last() == Some(&0xFF) { 7 } else { 8 };
        self.free < capacity
    }

    /// Bytes of the segment a decoder needs to read every bit coded so far.
    ///
    /// This may exceed the terminated length by one when the segment later
    /// ends on a dropped `0xFF`.
    pub fn truncation_length(&self) -> usize {
        self.data.len() + self.has_pending_bits() as usize
    }

    /// Finish the segment and start a new one.
    ///
    /// A partial last byte is padded with alternating bits starting at 0. A
    /// trailing `0xFF` is dropped since the decoder substitutes it.
    pub fn terminate(&mut self) -> Vec<u8> {
        if self.has_pending_bits() {
            let mut pad = 0;
            while self.free > 0 {
                self.free -= 1;
                self.byte |= pad << self.free;
                pad ^= 1;
            }
            self.data.push(self.byte);
        } else if self.data.last() == Some(&0xFF) {
            self.data.pop();
        }

        self.byte = 0;
        self.free = 8;
        std::mem::take(&mut self.data)
    }
}

#[derive(Debug, Clone)]
pub struct RawDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    byte: u8,
    // Bits of `byte` not yet returned.
    bits: u8,
    corrupted: bool,
}

impl<'a> RawDecoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            byte: 0,
            bits: 0,
            corrupted: false,
        }
    }

    /// Whether a marker code was found inside the segment.
    pub fn is_corrupted(&self) -> bool {
        self.corrupted
    }

    // Past the end of the segment the decoder reads 0xFF.
    #[inline]
    fn byte_at(&self, pos: usize) -> u8 {
        self.data.get(pos).copied().unwrap_or(0xFF)
    }

    pub fn decode_bit(&mut self) -> u8 {
        if self.bits == 0 {
            if self.byte == 0xFF {
                let next = self.byte_at(self.pos);
                if next > 0x8F {
                    if self.pos < self.data.len() {
                        self.corrupted = true;
                    }
                    self.bits = 8;
                } else {
                    self.byte = next;
                    self.pos += 1;
                    self.bits = 7;
                }
            } else {
                self.byte = self.byte_at(self.pos);
                self.pos += 1;
                self.bits = 8;
            }
        }
        self.bits -= 1;
        (self.byte >> self.bits) & 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(bits: &[u8]) -> Vec<u8> {
        let mut enc = RawEncoder::new();
        for &b in bits {
            enc.encode_bit(b);
        }
        enc.terminate()
    }

    #[test]
    fn test_raw_packs_msb_first() {
        assert_eq!(encode(&[1, 0, 1, 1, 0, 0, 1, 0]), vec![0xB2]);
        // Three bits padded with 0, 1, 0, 1, 0.
        assert_eq!(encode(&[1, 1, 1]), vec![0b1110_1010]);
        assert!(encode(&[]).is_empty());
    }

    #[test]
    fn test_raw_stuffs_after_ff() {
        let mut bits = vec![1u8; 8];
        bits.extend([1, 1, 1, 1, 1, 1, 1]);
        bits.push(0);
        let data = encode(&bits);
        assert_eq!(data[0], 0xFF);
        assert_eq!(data[1], 0x7F);
        for pair in data.windows(2) {
            assert!(pair[0] != 0xFF || pair[1] <= 0x7F);
        }

        let mut dec = RawDecoder::new(&data);
        for &b in &bits {
            assert_eq!(dec.decode_bit(), b);
        }
        assert!(!dec.is_corrupted());
    }

    #[test]
    fn test_raw_drops_trailing_ff() {
        let data = encode(&[1; 8]);
        assert!(data.is_empty());
        let mut dec = RawDecoder::new(&data);
        for _ in 0..8 {
            assert_eq!(dec.decode_bit(), 1);
        }
    }

    #[test]
    fn test_raw_roundtrip_and_truncation() {
        let mut seed = 0x5EED_1234u32;
        let bits: Vec<u8> = (0..3000)
            .map(|_| {
                seed ^= seed << 13;
                seed ^= seed >> 17;
                seed ^= seed << 5;
                // Long runs of ones to exercise the stuffing.
                (seed % 7 != 0) as u8
            })
            .collect();

        let mut enc = RawEncoder::new();
        let mut lengths = Vec::new();
        for (i, &b) in bits.iter().enumerate() {
            enc.encode_bit(b);
            if i % 97 == 0 {
                lengths.push((i + 1, enc.truncation_length()));
            }
        }
        let data = enc.terminate();

        for (count, length) in lengths {
            let mut dec = RawDecoder::new(&data[..length.min(data.len())]);
            for &b in &bits[..count] {
                assert_eq!(dec.decode_bit(), b);
            }
        }
        let mut dec = RawDecoder::new(&data);
        for &b in &bits {
            assert_eq!(dec.decode_bit(), b);
        }
        assert!(!dec.is_corrupted());
    }

    #[test]
    fn test_raw_marker_detected() {
        let mut dec = RawDecoder::new(&[0xFF, 0x91, 0x00]);
        for _ in 0..16 {
            dec.decode_bit();
        }
        assert!(dec.is_corrupted());
    }
}

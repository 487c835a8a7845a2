//! Fixed-bit-width packed integer container.
//!
//! Quantized bucket codes are small (8 bits for float buckets, 32 bits for
//! categorical codes), so columns are stored packed into 64-bit words instead
//! of one machine word per value. Random access unpacks or packs the
//! configured width at a logical position.

/// Packed buffer of fixed bit-width codes.
///
/// `bits_per_key` must divide 64 (1, 2, 4, 8, 16, 32 or 64), so a key never
/// straddles a word boundary. Callers guarantee indices are in bounds; the
/// hot path carries debug assertions only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompressedArray {
    len: usize,
    bits_per_key: u32,
    words: Vec<u64>,
}

impl CompressedArray {
    /// Number of 64-bit words needed for `len` keys of `bits_per_key` bits.
    #[inline]
    pub fn compressed_word_count(len: usize, bits_per_key: u32) -> usize {
        ((len as u64 * bits_per_key as u64 + 63) / 64) as usize
    }

    /// Allocate zeroed storage for `len` keys.
    ///
    /// # Panics
    /// Panics if `bits_per_key` does not divide 64.
    pub fn new(len: usize, bits_per_key: u32) -> Self {
        assert!(
            bits_per_key > 0 && 64 % bits_per_key == 0,
            "bits_per_key must divide 64, got {}",
            bits_per_key
        );
        Self {
            len,
            bits_per_key,
            words: vec![0; Self::compressed_word_count(len, bits_per_key)],
        }
    }

    /// Wrap a pre-existing word buffer without copying.
    ///
    /// # Panics
    /// Panics if `bits_per_key` does not divide 64 or `words` has the wrong
    /// length for `len`.
    pub fn from_words(words: Vec<u64>, len: usize, bits_per_key: u32) -> Self {
        assert!(
            bits_per_key > 0 && 64 % bits_per_key == 0,
            "bits_per_key must divide 64, got {}",
            bits_per_key
        );
        assert_eq!(
            words.len(),
            Self::compressed_word_count(len, bits_per_key),
            "word buffer length mismatch"
        );
        Self {
            len,
            bits_per_key,
            words,
        }
    }

    /// Number of keys stored.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bit width per key.
    #[inline]
    pub fn bits_per_key(&self) -> u32 {
        self.bits_per_key
    }

    /// Keys packed per 64-bit word.
    #[inline]
    pub fn keys_per_word(&self) -> usize {
        (64 / self.bits_per_key) as usize
    }

    #[inline]
    fn mask(&self) -> u64 {
        if self.bits_per_key == 64 {
            u64::MAX
        } else {
            (1u64 << self.bits_per_key) - 1
        }
    }

    /// Get the key at logical position `i`.
    ///
    /// Callers guarantee `i < self.len()`.
    #[inline]
    pub fn get(&self, i: usize) -> u64 {
        debug_assert!(i < self.len);
        let keys_per_word = self.keys_per_word();
        let shift = (i % keys_per_word) as u32 * self.bits_per_key;
        (self.words[i / keys_per_word] >> shift) & self.mask()
    }

    /// Set the key at logical position `i`.
    ///
    /// Callers guarantee `i < self.len()` and `code < 2^bits_per_key`.
    #[inline]
    pub fn set(&mut self, i: usize, code: u64) {
        debug_assert!(i < self.len);
        debug_assert!(code <= self.mask(), "code {} too wide for {} bits", code, self.bits_per_key);
        let keys_per_word = self.keys_per_word();
        let shift = (i % keys_per_word) as u32 * self.bits_per_key;
        let mask = self.mask();
        let word = &mut self.words[i / keys_per_word];
        *word = (*word & !(mask << shift)) | ((code & mask) << shift);
    }

    /// Backing words (read access).
    #[inline]
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    /// Backing words (write access, for block-parallel filling).
    #[inline]
    pub fn words_mut(&mut self) -> &mut [u64] {
        &mut self.words
    }

    /// Memory size of the backing buffer in bytes.
    #[inline]
    pub fn size_bytes(&self) -> usize {
        self.words.len() * 8
    }
}

use aes::Aes128;
use aes::cipher::{BlockEncrypt, KeyInit};

/// Domain tag mixed into seed-derived keys.
const SCHEDULE_TAG: &[u8; 12] = b"QPMARK-SCHED";
/// Plaintext block whose encryption yields the payload mask.
const PAYLOAD_MASK_BLOCK: [u8; 16] = *b"QPMARK-PAYLOADMK";

/// AES-128 key used as a counter-mode PRNG.
///
/// A schedule key is derived from the 32-bit session seed and drives the
/// block permutation. A passphrase key derives the payload encryption mask.
#[derive(Clone)]
pub struct WatermarkKey {
    cipher: Aes128,
}

impl WatermarkKey {
    /// Derive the schedule key for a session seed.
    pub fn from_seed(seed: u32) -> Self {
        let mut key = [0u8; 16];
        key[..4].copy_from_slice(&seed.to_le_bytes());
        key[4..].copy_from_slice(SCHEDULE_TAG);
        Self::from_raw(avalanche(key))
    }

    /// Create a key from a passphrase by hashing it with a simple mixing function.
    pub fn from_passphrase(passphrase: &str) -> Self {
        let mut key = [0u8; 16];
        for (i, b) in passphrase.bytes().enumerate() {
            key[i % 16] ^= b;
            key[(i + 7) % 16] = key[(i + 7) % 16].wrapping_add(b.wrapping_mul(0x9E));
        }
        Self::from_raw(avalanche(key))
    }

    fn from_raw(raw: [u8; 16]) -> Self {
        Self {
            cipher: Aes128::new(&raw.into()),
        }
    }

    /// Encrypt the 128-bit little-endian counter block.
    pub fn keystream_block(&self, counter: u64) -> [u8; 16] {
        let mut input = [0u8; 16];
        input[..8].copy_from_slice(&counter.to_le_bytes());
        let mut block = aes::Block::from(input);
        self.cipher.encrypt_block(&mut block);
        block.into()
    }

    /// Endless stream of pseudo-random `u32` words (4 per AES block).
    pub fn words(&self) -> KeyStream<'_> {
        KeyStream {
            key: self,
            counter: 0,
            block: [0; 16],
            pos: 16,
        }
    }

    /// Fisher-Yates shuffle driven by the key stream.
    ///
    /// Draws are `u32` so the permutation is identical on 32- and 64-bit
    /// targets.
    pub fn shuffle<T>(&self, items: &mut [T]) {
        let mut words = self.words();
        for i in (1..items.len()).rev() {
            let bound = i as u64 + 1;
            let j = (words.next_u32() as u64 % bound) as usize;
            items.swap(i, j);
        }
    }

    /// 64-bit mask for payload encryption.
    pub fn payload_mask(&self) -> u64 {
        let mut block = aes::Block::from(PAYLOAD_MASK_BLOCK);
        self.cipher.encrypt_block(&mut block);
        let mut mask = [0u8; 8];
        mask.copy_from_slice(&block[..8]);
        u64::from_le_bytes(mask)
    }
}

impl std::fmt::Debug for WatermarkKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatermarkKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Pseudo-random word stream over a [`WatermarkKey`].
pub struct KeyStream<'a> {
    key: &'a WatermarkKey,
    counter: u64,
    block: [u8; 16],
    pos: usize,
}

impl KeyStream<'_> {
    pub fn next_u32(&mut self) -> u32 {
        if self.pos >= self.block.len() {
            self.block = self.key.keystream_block(self.counter);
            self.counter += 1;
            self.pos = 0;
        }
        let word = u32::from_le_bytes([
            self.block[self.pos],
            self.block[self.pos + 1],
            self.block[self.pos + 2],
            self.block[self.pos + 3],
        ]);
        self.pos += 4;
        word
    }
}

impl Iterator for KeyStream<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        Some(self.next_u32())
    }
}

/// Mask used to encrypt a payload under `passphrase`. Empty passphrase
/// means no encryption (zero mask).
pub fn encryption_mask(passphrase: &str) -> u64 {
    if passphrase.is_empty() {
        0
    } else {
        WatermarkKey::from_passphrase(passphrase).payload_mask()
    }
}

/// Final avalanche pass: encrypt the key with itself.
fn avalanche(key: [u8; 16]) -> [u8; 16] {
    let cipher = Aes128::new(&key.into());
    let mut block = aes::Block::from(key);
    cipher.encrypt_block(&mut block);
    block.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_keys_deterministic_and_distinct() {
        assert_eq!(
            WatermarkKey::from_seed(12345).keystream_block(0),
            WatermarkKey::from_seed(12345).keystream_block(0)
        );
        assert_ne!(
            WatermarkKey::from_seed(1).keystream_block(0),
            WatermarkKey::from_seed(2).keystream_block(0)
        );
    }

    #[test]
    fn from_passphrase_different_inputs() {
        let k1 = WatermarkKey::from_passphrase("key-a");
        let k2 = WatermarkKey::from_passphrase("key-b");
        assert_ne!(k1.keystream_block(0), k2.keystream_block(0));
    }

    #[test]
    fn shuffle_is_a_permutation() {
        let key = WatermarkKey::from_seed(7);
        let mut items: Vec<u32> = (0..500).collect();
        key.shuffle(&mut items);
        assert_ne!(items, (0..500).collect::<Vec<_>>());
        let mut sorted = items.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..500).collect::<Vec<_>>());
    }

    #[test]
    fn shuffle_deterministic() {
        let mut a: Vec<u32> = (0..64).collect();
        let mut b: Vec<u32> = (0..64).collect();
        WatermarkKey::from_seed(99).shuffle(&mut a);
        WatermarkKey::from_seed(99).shuffle(&mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn word_stream_spans_blocks() {
        let key = WatermarkKey::from_seed(3);
        let words: Vec<u32> = key.words().take(8).collect();
        let b0 = key.keystream_block(0);
        let b1 = key.keystream_block(1);
        assert_eq!(words[0], u32::from_le_bytes([b0[0], b0[1], b0[2], b0[3]]));
        assert_eq!(words[4], u32::from_le_bytes([b1[0], b1[1], b1[2], b1[3]]));
    }

    #[test]
    fn empty_passphrase_has_zero_mask() {
        assert_eq!(encryption_mask(""), 0);
        assert_ne!(encryption_mask("secret"), 0);
        assert_eq!(encryption_mask("secret"), encryption_mask("secret"));
    }
}

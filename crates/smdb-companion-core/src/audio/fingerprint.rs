use std::fmt;
use std::hash::Hasher as _;
use twox_hash::XxHash64;

/// Samples per fingerprint frame.
pub const FRAME_SIZE: usize = 4096;
/// Sub-blocks per frame; adjacent pairs give 32 bits.
const BANDS: usize = 33;
/// Frame shifts tried in each direction when comparing.
const MAX_OFFSET: usize = 3;

/// One `u32` per frame of the mono signal. Bit `i` is set when sub-block `i` carries more
/// energy than sub-block `i + 1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub Vec<u32>);

impl Fingerprint {
    /// Fingerprint a mono signal. Input shorter than a frame is zero-padded.
    pub fn from_samples(samples: &[f32]) -> Self {
        if samples.len() < FRAME_SIZE {
            let mut padded = samples.to_vec();
            padded.resize(FRAME_SIZE, 0.0);
            return Fingerprint(vec![frame_word(&padded)]);
        }
        Fingerprint(samples.chunks_exact(FRAME_SIZE).map(frame_word).collect())
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|w| format!("{:08x}", w)).collect()
    }

    pub fn from_hex(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() || text.len() % 8 != 0 || !text.is_ascii() {
            return None;
        }
        let words = (0..text.len())
            .step_by(8)
            .map(|i| u32::from_str_radix(&text[i..i + 8], 16).ok())
            .collect::<Option<Vec<_>>>()?;
        Some(Fingerprint(words))
    }

    /// Bucket key for exact matching.
    pub fn key(&self) -> u64 {
        let mut hasher = XxHash64::with_seed(0);
        for word in &self.0 {
            hasher.write_u32(*word);
        }
        hasher.finish()
    }

    /// Fraction of equal bits, best over small frame offsets in either direction.
    /// The denominator is the longer fingerprint, so a short clip never fully
    /// matches the head of a longer file.
    pub fn similarity(&self, other: &Fingerprint) -> f64 {
        let (a, b) = (&self.0, &other.0);
        let longest = a.len().max(b.len());
        if longest == 0 {
            return 1.0;
        }
        let mut best = 0u32;
        for offset in 0..=MAX_OFFSET {
            best = best.max(matching_bits(a, b, offset));
            if offset > 0 {
                best = best.max(matching_bits(b, a, offset));
            }
        }
        best as f64 / (longest * 32) as f64
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

fn matching_bits(a: &[u32], b: &[u32], offset: usize) -> u32 {
    if offset >= a.len() {
        return 0;
    }
    a[offset..]
        .iter()
        .zip(b)
        .map(|(x, y)| (!(x ^ y)).count_ones())
        .sum()
}

fn frame_word(frame: &[f32]) -> u32 {
    let band_len = frame.len() / BANDS;
    let energies: Vec<f32> = (0..BANDS)
        .map(|band| {
            frame[band * band_len..(band + 1) * band_len]
                .iter()
                .map(|s| s * s)
                .sum()
        })
        .collect();
    energies
        .windows(2)
        .enumerate()
        .fold(0u32, |word, (bit, pair)| {
            if pair[0] > pair[1] {
                word | (1 << bit)
            } else {
                word
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sweep(len: usize, period: usize) -> Vec<f32> {
        (0..len)
            .map(|i| ((i % period) as f32 / period as f32) * ((i / 300) % 7) as f32)
            .collect()
    }

    #[test]
    fn test_identical_signals_match_exactly() {
        let samples = sweep(FRAME_SIZE * 4, 100);
        let a = Fingerprint::from_samples(&samples);
        let b = Fingerprint::from_samples(&samples);
        assert_eq!(a, b);
        assert_eq!(a.key(), b.key());
        assert_eq!(a.similarity(&b), 1.0);
    }

    #[test]
    fn test_short_and_silent_inputs_are_padded() {
        let silent = Fingerprint::from_samples(&[]);
        assert_eq!(silent.0, vec![0]);
        assert_eq!(Fingerprint::from_samples(&[0.0; 10]), silent);
    }

    #[test]
    fn test_hex_round_trip_and_rejects_garbage() {
        let fp = Fingerprint(vec![0xdeadbeef, 0x1]);
        assert_eq!(fp.to_hex(), "deadbeef00000001");
        assert_eq!(Fingerprint::from_hex(&fp.to_hex()), Some(fp));
        assert_eq!(Fingerprint::from_hex("abc"), None);
        assert_eq!(Fingerprint::from_hex("zzzzzzzz"), None);
    }

    #[test]
    fn test_similarity_finds_shifted_frames() {
        let a = Fingerprint(vec![1, 2, 3, 4, 5, 6, 7, 8]);
        let b = Fingerprint(vec![9, 1, 2, 3, 4, 5, 6, 7, 8]);
        let score = a.similarity(&b);
        assert!(score >= 8.0 / 9.0, "score {score}");
        assert!(score < 1.0);
    }

    #[test]
    fn test_inverted_words_share_no_bits() {
        let a = Fingerprint(vec![0x0000_ffff]);
        let b = Fingerprint(vec![0xffff_0000]);
        assert_eq!(a.similarity(&b), 0.0);
    }
}

//! History-binding digest chain for video frames
//!
//! Digest `i` is `SHA256(frame_i || digest_{i-1})`, seeded with [`GENESIS`].
//! Every digest therefore commits to the whole prefix of the stream, so a
//! dropped, inserted or reordered frame breaks the chain from that point on.

use super::hash::ContentDigest;
use sha2::{Digest, Sha256};

/// Chain value preceding the first frame
pub const GENESIS: ContentDigest = ContentDigest::ZERO;

/// `SHA256(frame_bytes || prev_digest)`
pub fn hash_frame(frame_bytes: &[u8], prev_digest: &ContentDigest) -> ContentDigest {
    let mut hasher = Sha256::new();
    hasher.update(frame_bytes);
    hasher.update(prev_digest.as_bytes());
    ContentDigest::from_bytes(hasher.finalize().into())
}

/// Streaming form of the chain; frames are pushed in decode order
#[derive(Debug, Clone)]
pub struct FrameChain {
    head: ContentDigest,
    digests: Vec<ContentDigest>,
}

impl FrameChain {
    pub fn new() -> Self {
        Self {
            head: GENESIS,
            digests: Vec::new(),
        }
    }

    /// Fold the next frame into the chain and return its digest
    pub fn push(&mut self, frame_bytes: &[u8]) -> ContentDigest {
        let digest = hash_frame(frame_bytes, &self.head);
        self.head = digest;
        self.digests.push(digest);
        digest
    }

    /// Digest of the last pushed frame, or [`GENESIS`] for an empty chain
    pub fn head(&self) -> ContentDigest {
        self.head
    }

    pub fn len(&self) -> usize {
        self.digests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }

    /// Every intermediate digest, one per frame
    pub fn finish(self) -> Vec<ContentDigest> {
        self.digests
    }
}

impl Default for FrameChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Chain a whole frame sequence at once
pub fn chain_digests<I, B>(frames: I) -> Vec<ContentDigest>
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    let mut chain = FrameChain::new();
    for frame in frames {
        chain.push(frame.as_ref());
    }
    chain.finish()
}

/// First index where the two digest lists disagree, counting a missing entry
/// on either side as a disagreement
pub fn first_divergence<A, B>(stored: &[A], recomputed: &[B]) -> Option<usize>
where
    A: PartialEq<B>,
{
    let longest = stored.len().max(recomputed.len());
    (0..longest).find(|&i| match (stored.get(i), recomputed.get(i)) {
        (Some(a), Some(b)) => a != b,
        _ => true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(n: usize) -> Vec<Vec<u8>> {
        (0..n).map(|i| vec![i as u8; 64]).collect()
    }

    #[test]
    fn test_first_frame_uses_zero_genesis() {
        let frame = b"frame-0";
        let mut manual = Vec::from(&frame[..]);
        manual.extend_from_slice(&[0u8; 32]);

        assert_eq!(hash_frame(frame, &GENESIS), ContentDigest::of(&manual));
    }

    #[test]
    fn test_chain_links_previous_digest() {
        let digests = chain_digests(frames(3));
        assert_eq!(digests.len(), 3);
        assert_eq!(digests[1], hash_frame(&frames(3)[1], &digests[0]));
        assert_eq!(digests[2], hash_frame(&frames(3)[2], &digests[1]));
    }

    #[test]
    fn test_streaming_matches_batch() {
        let mut chain = FrameChain::new();
        assert_eq!(chain.head(), GENESIS);
        for frame in frames(5) {
            chain.push(&frame);
        }
        assert_eq!(chain.len(), 5);
        assert_eq!(chain.finish(), chain_digests(frames(5)));
    }

    #[test]
    fn test_tamper_propagates_from_frame_k() {
        let n = 10;
        let k = 4;
        let original = frames(n);
        let mut tampered = original.clone();
        tampered[k][7] ^= 0x01;

        let stored = chain_digests(&original);
        let recomputed = chain_digests(&tampered);

        for i in 0..k {
            assert_eq!(stored[i], recomputed[i], "index {} should match", i);
        }
        for i in k..n {
            assert_ne!(stored[i], recomputed[i], "index {} should diverge", i);
        }
        assert_eq!(first_divergence(&stored, &recomputed), Some(k));
    }

    #[test]
    fn test_reordering_breaks_chain() {
        let original = frames(4);
        let mut swapped = original.clone();
        swapped.swap(1, 2);

        assert_eq!(
            first_divergence(&chain_digests(&original), &chain_digests(&swapped)),
            Some(1)
        );
    }

    #[test]
    fn test_dropped_frame_counts_as_divergence() {
        let original = frames(5);
        let truncated = &original[..3];

        let stored = chain_digests(&original);
        let recomputed = chain_digests(truncated);

        assert_eq!(first_divergence(&stored, &recomputed), Some(3));
    }

    #[test]
    fn test_identical_chains_do_not_diverge() {
        let a = chain_digests(frames(6));
        let b = chain_digests(frames(6));
        assert_eq!(first_divergence(&a, &b), None);
    }
}

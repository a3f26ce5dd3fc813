//! Re-chunks arbitrarily sized device batches into fixed engine blocks.
//!
//! Two equally sized slots form the working set. The carry slot holds the
//! remainder (samples not yet forming a full block) at its head. When a feed
//! completes at least one block, the carry slot is topped up to a whole number
//! of blocks, the leftover tail of the input goes to the head of the spare
//! slot, and the slot indices swap: the filled slot is handed out for
//! in-place transformation while the new carry only holds the leftover.

use crate::models::error::VoiceChangerError;

/// One device batch: real samples or a silent run of `n` frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Batch<'a> {
    Samples(&'a [f32]),
    Silence(usize),
}

impl<'a> Batch<'a> {
    /// Build a batch from a device packet, zero-filling when the device
    /// flags the period as silent.
    pub fn from_packet(samples: &'a [f32], frames: usize, silent: bool) -> Self {
        if silent {
            Self::Silence(frames)
        } else {
            Self::Samples(&samples[..frames.min(samples.len())])
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Samples(s) => s.len(),
            Self::Silence(n) => *n,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn copy_to(&self, offset: usize, dst: &mut [f32]) {
        match self {
            Self::Samples(s) => dst.copy_from_slice(&s[offset..offset + dst.len()]),
            Self::Silence(_) => dst.fill(0.0),
        }
    }
}

/// Outcome of one `feed` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeedSummary {
    /// Full blocks handed to the emit callback.
    pub blocks: usize,
    /// Samples carried into the next feed.
    pub remainder: usize,
}

#[derive(Debug)]
pub struct BlockSegmenter {
    block_length: usize,
    slots: [Vec<f32>; 2],
    carry: usize,
    remainder: usize,
}

impl BlockSegmenter {
    /// Create a segmenter whose slots hold `capacity` frames, rounded up to a
    /// whole number of blocks (at least one).
    pub fn new(block_length: usize, capacity: usize) -> Result<Self, VoiceChangerError> {
        if block_length == 0 {
            return Err(VoiceChangerError::ConfigurationFailed(
                "block length must be positive".into(),
            ));
        }
        let capacity = capacity.max(block_length).div_ceil(block_length) * block_length;
        Ok(Self {
            block_length,
            slots: [vec![0.0; capacity], vec![0.0; capacity]],
            carry: 0,
            remainder: 0,
        })
    }

    pub fn block_length(&self) -> usize {
        self.block_length
    }

    /// Frames per slot.
    pub fn capacity(&self) -> usize {
        self.slots[0].len()
    }

    pub fn remainder(&self) -> usize {
        self.remainder
    }

    /// Valid carried samples.
    pub fn pending(&self) -> &[f32] {
        &self.slots[self.carry][..self.remainder]
    }

    /// Drop carried samples.
    pub fn reset(&mut self) {
        self.remainder = 0;
    }

    /// Append a batch, calling `emit` with each filled region.
    ///
    /// Every region passed to `emit` is a whole number of blocks and may be
    /// modified in place. Batches larger than a slot are consumed in
    /// slot-sized steps, so `emit` can run more than once per call.
    pub fn feed<F>(&mut self, batch: Batch<'_>, mut emit: F) -> FeedSummary
    where
        F: FnMut(&mut [f32]),
    {
        let count = batch.len();
        let block_length = self.block_length;
        let capacity = self.capacity();
        let mut consumed = 0;
        let mut blocks = 0;

        while consumed < count {
            let take = (count - consumed).min(capacity - self.remainder);
            let frames = self.remainder + take;

            if frames < block_length {
                let carry = &mut self.slots[self.carry];
                batch.copy_to(consumed, &mut carry[self.remainder..frames]);
                self.remainder = frames;
                consumed += take;
                continue;
            }

            let block_count = frames / block_length;
            let block_frames = block_count * block_length;
            let remainder = self.remainder;
            let head = block_frames - remainder;
            let leftover = frames - block_frames;

            let (filled, spare) = self.pair_mut();
            batch.copy_to(consumed, &mut filled[remainder..block_frames]);
            batch.copy_to(consumed + head, &mut spare[..leftover]);

            let filled_index = self.carry;
            self.carry ^= 1;
            self.remainder = leftover;
            consumed += take;
            blocks += block_count;

            emit(&mut self.slots[filled_index][..block_frames]);
        }

        FeedSummary {
            blocks,
            remainder: self.remainder,
        }
    }

    /// `(carry, spare)` slots, borrowed together.
    fn pair_mut(&mut self) -> (&mut [f32], &mut [f32]) {
        let [a, b] = &mut self.slots;
        if self.carry == 0 {
            (a.as_mut_slice(), b.as_mut_slice())
        } else {
            (b.as_mut_slice(), a.as_mut_slice())
        }
    }
}

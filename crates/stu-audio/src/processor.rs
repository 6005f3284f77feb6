//! The audio-side processor contract
//!
//! A [`Processor`] is the realtime half of a plugin: it lives in the audio
//! thread's slot pool and is driven once per block. Instantiation and
//! teardown happen elsewhere; installation moves the box across the command
//! ring, removal sends it back through the trash ring so the allocation is
//! freed off-thread.

use crate::buffers::AudioBlock;

/// A note event scheduled within the current block
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteEvent {
    /// Frame offset from the block start
    pub frame: usize,
    pub note: u8,
    pub velocity: f32,
}

/// Realtime processing half of a plugin
///
/// Implementations must be allocation-free in `process`. Instruments add
/// their output into the buffer (it may already hold audio clip content);
/// effects transform the buffer in place.
pub trait Processor: Send {
    /// Prepare for a sample rate / block size; called off the audio thread
    /// before installation and allowed to allocate.
    fn prepare(&mut self, sample_rate: f32, max_block_frames: usize);

    /// Render one block. `notes` is empty for effect slots.
    fn process(&mut self, block: &mut AudioBlock, notes: &[NoteEvent]);

    /// Normalized [0,1] parameter update, smoothed internally
    fn set_param(&mut self, param_index: usize, normalized: f32);

    /// Silence internal state (voices, delay lines) without reallocation
    fn reset(&mut self);
}

//! Per-track metering tap
//!
//! The callback publishes one [`MeterFrame`] per block through a lock-free
//! ring; the session side drains at its own pace and keeps only the most
//! recent frame (meters are a display concern, staleness beats blocking).

/// Upper bound on metered tracks per frame
pub const MAX_METER_TRACKS: usize = 64;

/// One track's levels for one block
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MeterLane {
    pub track_id: u32,
    pub peak: f32,
    pub rms: f32,
}

/// Fixed-size snapshot of every track's levels
#[derive(Debug, Clone, Copy)]
pub struct MeterFrame {
    pub len: usize,
    pub lanes: [MeterLane; MAX_METER_TRACKS],
}

impl MeterFrame {
    pub fn empty() -> Self {
        Self {
            len: 0,
            lanes: [MeterLane::default(); MAX_METER_TRACKS],
        }
    }

    pub fn push(&mut self, lane: MeterLane) {
        if self.len < MAX_METER_TRACKS {
            self.lanes[self.len] = lane;
            self.len += 1;
        }
    }

    pub fn lanes(&self) -> &[MeterLane] {
        &self.lanes[..self.len]
    }
}

/// Session-side consumer keeping only the freshest frame
pub struct MeterReceiver {
    consumer: rtrb::Consumer<MeterFrame>,
}

impl MeterReceiver {
    pub fn new(consumer: rtrb::Consumer<MeterFrame>) -> Self {
        Self { consumer }
    }

    /// Drain the ring, returning the most recent frame if any arrived
    pub fn latest(&mut self) -> Option<MeterFrame> {
        let mut latest = None;
        while let Ok(frame) = self.consumer.pop() {
            latest = Some(frame);
        }
        latest
    }
}

/// Build the meter ring; capacity covers ~1 s of blocks at small sizes
pub fn meter_ring(capacity: usize) -> (rtrb::Producer<MeterFrame>, MeterReceiver) {
    let (producer, consumer) = rtrb::RingBuffer::new(capacity);
    (producer, MeterReceiver::new(consumer))
}

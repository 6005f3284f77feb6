//! Command ring between the engine facade and the audio callback
//!
//! A single-producer/single-consumer `rtrb` ring carries everything the
//! callback is allowed to react to: transport changes, processor
//! installs/removals, parameter updates, recording taps. The producer side
//! is serialized behind a mutex (callers are ordinary threads); the
//! consumer is the callback alone.
//!
//! A full command ring means the ring was sized wrong for the workload.
//! That is a programming error: we abort with diagnostics rather than
//! silently dropping a command the document already assumes was applied.

use std::sync::Mutex;

use crate::graph::SlotIndex;
use crate::processor::Processor;
use crate::recording::RecordTap;

/// Ring capacity; sized generously above any realistic burst
pub const COMMAND_RING_CAPACITY: usize = 1024;

/// Everything the audio thread can be told
pub enum EngineCommand {
    Play { recording: bool },
    Pause,
    Stop,
    SeekBeats(f64),
    SetBpm(u32),
    InstallProcessor {
        slot: SlotIndex,
        processor: Box<dyn Processor>,
    },
    RemoveProcessor {
        slot: SlotIndex,
    },
    SetProcessorParam {
        slot: SlotIndex,
        param_index: usize,
        normalized: f32,
    },
    ResetProcessor {
        slot: SlotIndex,
    },
    StartRecording {
        taps: Vec<RecordTap>,
    },
    StopRecording,
}

impl std::fmt::Debug for EngineCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Play { recording } => write!(f, "Play {{ recording: {} }}", recording),
            Self::Pause => write!(f, "Pause"),
            Self::Stop => write!(f, "Stop"),
            Self::SeekBeats(beats) => write!(f, "SeekBeats({})", beats),
            Self::SetBpm(bpm) => write!(f, "SetBpm({})", bpm),
            Self::InstallProcessor { slot, .. } => write!(f, "InstallProcessor {{ slot: {} }}", slot),
            Self::RemoveProcessor { slot } => write!(f, "RemoveProcessor {{ slot: {} }}", slot),
            Self::SetProcessorParam {
                slot,
                param_index,
                normalized,
            } => write!(
                f,
                "SetProcessorParam {{ slot: {}, param: {}, value: {} }}",
                slot, param_index, normalized
            ),
            Self::ResetProcessor { slot } => write!(f, "ResetProcessor {{ slot: {} }}", slot),
            Self::StartRecording { taps } => {
                write!(f, "StartRecording {{ taps: {} }}", taps.len())
            }
            Self::StopRecording => write!(f, "StopRecording"),
        }
    }
}

/// Things the audio thread wants freed off-thread
pub enum Trash {
    Processor(Box<dyn Processor>),
    Taps(Vec<RecordTap>),
}

/// Producer half, shared by non-audio threads
pub struct CommandSender {
    producer: Mutex<rtrb::Producer<EngineCommand>>,
}

impl CommandSender {
    pub fn send(&self, command: EngineCommand) {
        let mut producer = self.producer.lock().unwrap();
        if let Err(rtrb::PushError::Full(command)) = producer.push(command) {
            // A full ring is unrecoverable; see the module docs.
            tracing::error!(
                capacity = COMMAND_RING_CAPACITY,
                command = ?command,
                "audio command ring full; aborting"
            );
            std::process::abort();
        }
    }
}

/// Build the command ring pair
pub fn command_ring() -> (CommandSender, rtrb::Consumer<EngineCommand>) {
    let (producer, consumer) = rtrb::RingBuffer::new(COMMAND_RING_CAPACITY);
    (
        CommandSender {
            producer: Mutex::new(producer),
        },
        consumer,
    )
}

/// Build the trash ring: audio thread pushes, reclaim thread drops
pub fn trash_ring() -> (rtrb::Producer<Trash>, rtrb::Consumer<Trash>) {
    rtrb::RingBuffer::new(COMMAND_RING_CAPACITY)
}

/// Drain and drop retired allocations; call from a non-audio thread
pub fn drain_trash(consumer: &mut rtrb::Consumer<Trash>) -> usize {
    let mut dropped = 0;
    while consumer.pop().is_ok() {
        dropped += 1;
    }
    dropped
}

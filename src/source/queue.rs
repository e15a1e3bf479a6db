use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use parking_lot::Mutex;
use rtrb::{Consumer, Producer, RingBuffer};

use crate::source::{silence_tail, AudioSource, PlayContext, SourceError, SourceInstance};

/*
Queue
=====

A source that plays other sources back to back, without gaps.

    control thread                         audio thread
    ──────────────                         ────────────
    queue.play(&clip)
      create_instance()   ── inbox ──→     QueueInstance pops the next
                                           instance when the current one
      drop finished ones  ←─ retired ──    ends, hands the old one back

Instances are built (and allocated) on the control thread and moved across
a pair of `rtrb` ring buffers, so the audio thread never allocates or frees.
Every queued source must match the queue's channel count and sample rate.

The queue voice itself never ends: with nothing queued it plays silence.
Only one voice at a time holds the audio side of the rings; a second
concurrent voice of the same queue ends immediately. When the holding voice
is dropped it hands the rings back, so the queue can be played again and
sources still waiting in the inbox carry over to the next voice.
*/

const DEFAULT_CAPACITY: usize = 32;

type Boxed = Box<dyn SourceInstance>;
type AudioSide = Arc<Mutex<Option<(Consumer<Boxed>, Producer<Boxed>)>>>;

pub struct Queue {
    channels: usize,
    sample_rate: f32,
    inbox: Mutex<Producer<Boxed>>,
    retired: Mutex<Consumer<Boxed>>,
    audio_side: AudioSide,
    pending: Arc<AtomicUsize>,
}

impl Queue {
    pub fn new(channels: usize, sample_rate: f32) -> Self {
        Self::with_capacity(channels, sample_rate, DEFAULT_CAPACITY)
    }

    /// `capacity` bounds how many sources can wait at once.
    pub fn with_capacity(channels: usize, sample_rate: f32, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (inbox, outlet) = RingBuffer::new(capacity);
        let (retire, retired) = RingBuffer::new(capacity);

        Self {
            channels: channels.max(1),
            sample_rate,
            inbox: Mutex::new(inbox),
            retired: Mutex::new(retired),
            audio_side: Arc::new(Mutex::new(Some((outlet, retire)))),
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Append `source` to the queue.
    pub fn play(&self, source: &dyn AudioSource) -> Result<(), SourceError> {
        self.collect_retired();

        if source.channels() != self.channels
            || (source.sample_rate() - self.sample_rate).abs() > f32::EPSILON
        {
            return Err(SourceError::FormatMismatch);
        }

        let instance = source.create_instance(&PlayContext {
            sample_rate: self.sample_rate,
            channels: self.channels,
            seed: 0,
        });

        self.inbox
            .lock()
            .push(instance)
            .map_err(|_| SourceError::QueueFull)?;
        self.pending.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Sources queued or playing.
    pub fn queue_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Free finished instances handed back by the audio thread.
    fn collect_retired(&self) {
        let mut retired = self.retired.lock();
        while retired.pop().is_ok() {}
    }
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("channels", &self.channels)
            .field("sample_rate", &self.sample_rate)
            .field("pending", &self.queue_count())
            .finish()
    }
}

impl AudioSource for Queue {
    fn channels(&self) -> usize {
        self.channels
    }

    fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    fn create_instance(&self, _ctx: &PlayContext) -> Box<dyn SourceInstance> {
        let audio_side = self.audio_side.lock().take();
        if audio_side.is_none() {
            tracing::warn!("queue is already playing; new voice will end immediately");
        }

        Box::new(QueueInstance {
            channels: self.channels,
            sample_rate: self.sample_rate,
            audio_side,
            home: Arc::clone(&self.audio_side),
            current: None,
            pending: Arc::clone(&self.pending),
        })
    }
}

struct QueueInstance {
    channels: usize,
    sample_rate: f32,
    audio_side: Option<(Consumer<Boxed>, Producer<Boxed>)>,
    /// Where the rings go back to when this voice is dropped.
    home: AudioSide,
    current: Option<Boxed>,
    pending: Arc<AtomicUsize>,
}

impl Drop for QueueInstance {
    fn drop(&mut self) {
        if self.current.take().is_some() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
        }
        if let Some(audio_side) = self.audio_side.take() {
            *self.home.lock() = Some(audio_side);
        }
    }
}

impl QueueInstance {
    fn retire_current(&mut self) {
        let Some(finished) = self.current.take() else {
            return;
        };
        self.pending.fetch_sub(1, Ordering::AcqRel);
        if let Some((_, retire)) = self.audio_side.as_mut() {
            // A full return ring means the control side stopped collecting;
            // dropping here is the only option left.
            let _ = retire.push(finished);
        }
    }
}

impl SourceInstance for QueueInstance {
    fn channels(&self) -> usize {
        self.channels
    }

    fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    fn get_audio(&mut self, buffer: &mut [f32], frames: usize, stride: usize) -> usize {
        let mut written = 0;

        while written < frames {
            if self.current.is_none() {
                let Some((outlet, _)) = self.audio_side.as_mut() else {
                    break;
                };
                match outlet.pop() {
                    Ok(next) => self.current = Some(next),
                    Err(_) => break,
                }
            }

            let Some(current) = self.current.as_mut() else {
                break;
            };
            let produced = current.get_audio(&mut buffer[written..], frames - written, stride);
            written += produced;

            if current.has_ended() || current.status().is_err() {
                self.retire_current();
            } else if produced == 0 {
                // Underrun in the queued source; try again next block.
                break;
            }
        }

        silence_tail(buffer, written, frames, stride, self.channels);
        frames
    }

    fn has_ended(&self) -> bool {
        self.audio_side.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Clip;

    fn ctx() -> PlayContext {
        PlayContext {
            sample_rate: 8.0,
            channels: 1,
            seed: 0,
        }
    }

    fn clip(value: f32, frames: usize) -> Clip {
        Clip::from_mono(vec![value; frames], 8.0).unwrap()
    }

    #[test]
    fn counts_queued_sources() {
        let queue = Queue::new(1, 8.0);
        let _voice = queue.create_instance(&ctx());

        queue.play(&clip(1.0, 4)).unwrap();
        queue.play(&clip(1.0, 4)).unwrap();
        assert_eq!(queue.queue_count(), 2);
    }

    #[test]
    fn plays_back_to_back_then_silence() {
        let queue = Queue::new(1, 8.0);
        let mut voice = queue.create_instance(&ctx());
        queue.play(&clip(1.0, 3)).unwrap();
        queue.play(&clip(2.0, 2)).unwrap();

        let mut buffer = vec![9.0; 8];
        assert_eq!(voice.get_audio(&mut buffer, 8, 8), 8);
        assert_eq!(buffer, vec![1.0, 1.0, 1.0, 2.0, 2.0, 0.0, 0.0, 0.0]);
        assert_eq!(queue.queue_count(), 0);
        assert!(!voice.has_ended());
    }

    #[test]
    fn rejects_mismatched_format() {
        let queue = Queue::new(2, 8.0);
        assert_eq!(queue.play(&clip(1.0, 4)), Err(SourceError::FormatMismatch));
        assert_eq!(queue.queue_count(), 0);
    }

    #[test]
    fn full_queue_reports_error() {
        let queue = Queue::with_capacity(1, 8.0, 1);
        queue.play(&clip(1.0, 4)).unwrap();
        assert_eq!(queue.play(&clip(1.0, 4)), Err(SourceError::QueueFull));
    }

    #[test]
    fn dropped_voice_hands_the_queue_back() {
        let queue = Queue::new(1, 8.0);
        let mut first = queue.create_instance(&ctx());
        queue.play(&clip(1.0, 8)).unwrap();

        let mut buffer = vec![0.0; 4];
        first.get_audio(&mut buffer, 4, 4);
        assert_eq!(queue.queue_count(), 1);
        drop(first);
        assert_eq!(queue.queue_count(), 0, "the half-played clip goes with its voice");

        let mut second = queue.create_instance(&ctx());
        assert!(!second.has_ended());
        queue.play(&clip(0.5, 2)).unwrap();
        second.get_audio(&mut buffer, 4, 4);
        assert_eq!(buffer, vec![0.5, 0.5, 0.0, 0.0]);
        assert_eq!(queue.queue_count(), 0);
    }

    #[test]
    fn second_voice_of_same_queue_ends() {
        let queue = Queue::new(1, 8.0);
        let first = queue.create_instance(&ctx());
        let second = queue.create_instance(&ctx());
        assert!(!first.has_ended());
        assert!(second.has_ended());
    }
}

//! Mixing sink shared by every playback and the tone
//!
//! # Architecture
//!
//! - Dispatcher threads hand finished [`Voice`]s to the mixer through a
//!   lock-free ring buffer (`attach`). They never touch the voice list.
//! - The audio callback (`render`) owns the voice list: it drains newly
//!   attached voices, sums all voices additively, adds the tone, and
//!   reports every voice that reached its end on the completion channel.
//! - The callback never waits on a lock: if the core is busy (only during
//!   a device switch) it outputs silence for that buffer.
//! - A voice whose handle was cancelled is dropped on the next pull,
//!   whether it was already playing or still queued.

use crate::audio::resampler::Resampler;
use crate::audio::types::{AudioFrame, Clip};
use crate::error::{Error, Result};
use crate::playback::handles::PlaybackHandle;
use crate::playback::tone::ToneToggle;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, TryLockError};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Voices that may be waiting for the next callback
const ATTACH_QUEUE_CAPACITY: usize = 256;

/// Tone pitch (Hz)
const TONE_FREQUENCY_HZ: f32 = 1000.0;

/// Tone amplitude (about -14 dBFS)
const TONE_AMPLITUDE: f32 = 0.2;

/// Tone fade in/out time, avoids clicks on press/release
const TONE_RAMP_SECONDS: f32 = 0.005;

/// Notifications from the sink to the dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// Voice played its last frame and was detached from the sink
    Finished { playback_id: Uuid },
}

/// One playing instance of a clip inside the sink
#[derive(Debug)]
pub struct Voice {
    playback_id: Uuid,
    clip: Clip,
    position: usize,
    cancelled: Arc<AtomicBool>,
}

impl Voice {
    pub fn new(playback_id: Uuid, clip: Clip) -> Self {
        Self {
            playback_id,
            clip,
            position: 0,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Voice that stops when `handle` is cancelled
    pub fn for_handle(handle: &PlaybackHandle, clip: Clip) -> Self {
        Self {
            playback_id: handle.playback_id,
            clip,
            position: 0,
            cancelled: handle.cancel_flag(),
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn is_finished(&self) -> bool {
        self.position >= self.clip.frame_count()
    }

    /// Add this voice's next frames onto `out`
    fn mix_into(&mut self, out: &mut [AudioFrame]) {
        for frame in out.iter_mut() {
            match self.clip.frame(self.position) {
                Some(sample) => {
                    frame.add(sample);
                    self.position += 1;
                }
                None => break,
            }
        }
    }

    /// Resample the not-yet-played part of the clip to `new_rate`
    fn retarget(&mut self, new_rate: u32) -> Result<()> {
        if self.clip.sample_rate == new_rate {
            return Ok(());
        }
        let start = (self.position * 2).min(self.clip.samples.len());
        let remaining = Resampler::resample(&self.clip.samples[start..], self.clip.sample_rate, new_rate, 2)?;
        self.clip = Clip::new(remaining, new_rate);
        self.position = 0;
        Ok(())
    }
}

/// Sine generator with a linear gain ramp
#[derive(Debug)]
struct ToneOscillator {
    phase: f32,
    gain: f32,
}

impl ToneOscillator {
    fn new() -> Self {
        Self { phase: 0.0, gain: 0.0 }
    }

    fn mix_into(&mut self, out: &mut [AudioFrame], active: bool, sample_rate: u32) {
        let target = if active { 1.0 } else { 0.0 };
        if self.gain == 0.0 && !active {
            // Keep the phase at rest so the next press starts from zero
            self.phase = 0.0;
            return;
        }

        let rate = sample_rate as f32;
        let phase_step = TONE_FREQUENCY_HZ / rate;
        let gain_step = 1.0 / (TONE_RAMP_SECONDS * rate);

        for frame in out.iter_mut() {
            if self.gain < target {
                self.gain = (self.gain + gain_step).min(target);
            } else if self.gain > target {
                self.gain = (self.gain - gain_step).max(target);
            }

            let s = (self.phase * std::f32::consts::TAU).sin() * TONE_AMPLITUDE * self.gain;
            frame.add(AudioFrame::from_stereo(s, s));

            self.phase += phase_step;
            if self.phase >= 1.0 {
                self.phase -= 1.0;
            }
        }
    }
}

/// State owned by the render side
struct MixerCore {
    incoming: HeapCons<Voice>,
    voices: Vec<Voice>,
    sample_rate: u32,
    tone: ToneOscillator,
}

impl MixerCore {
    /// Move newly attached voices into the voice list, then drop cancelled
    /// ones. Cancelled voices were already released; no event is sent.
    fn drain_incoming(&mut self) {
        while let Some(voice) = self.incoming.try_pop() {
            self.voices.push(voice);
        }
        self.voices.retain(|voice| !voice.is_cancelled());
    }
}

/// The shared mixing sink
pub struct Mixer {
    core: Mutex<MixerCore>,
    attach_queue: Mutex<HeapProd<Voice>>,
    tone: Arc<ToneToggle>,
    events: mpsc::UnboundedSender<PlaybackEvent>,
}

impl Mixer {
    /// Create a mixer running at `sample_rate`.
    ///
    /// Returns the completion channel receiver; the dispatcher consumes it.
    pub fn new(sample_rate: u32, tone: Arc<ToneToggle>) -> (Arc<Self>, mpsc::UnboundedReceiver<PlaybackEvent>) {
        let (producer, consumer) = HeapRb::<Voice>::new(ATTACH_QUEUE_CAPACITY).split();
        let (events, events_rx) = mpsc::unbounded_channel();

        let mixer = Arc::new(Self {
            core: Mutex::new(MixerCore {
                incoming: consumer,
                voices: Vec::new(),
                sample_rate,
                tone: ToneOscillator::new(),
            }),
            attach_queue: Mutex::new(producer),
            tone,
            events,
        });

        (mixer, events_rx)
    }

    /// Register a voice with the sink. Returns as soon as it is queued.
    ///
    /// On failure the voice is dropped; the caller releases its handle.
    pub fn attach(&self, voice: Voice) -> Result<()> {
        let playback_id = voice.playback_id;
        let mut queue = self.attach_queue.lock().unwrap_or_else(PoisonError::into_inner);
        queue.try_push(voice).map_err(|_| {
            warn!(%playback_id, "Mixer attach queue full, dropping playback");
            Error::Playback("Mixing sink is saturated".to_string())
        })
    }

    /// Fill `out` with the next block of mixed audio.
    ///
    /// Runs on the audio thread. Never blocks.
    pub fn render(&self, out: &mut [AudioFrame]) {
        out.fill(AudioFrame::zero());

        let mut core = match self.core.try_lock() {
            Ok(core) => core,
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
            Err(TryLockError::WouldBlock) => return,
        };

        core.drain_incoming();

        for voice in core.voices.iter_mut() {
            voice.mix_into(out);
        }

        let sample_rate = core.sample_rate;
        core.tone.mix_into(out, self.tone.is_active(), sample_rate);

        let events = &self.events;
        core.voices.retain(|voice| {
            if voice.is_finished() {
                // Receiver gone means shutdown; nothing left to release
                let _ = events.send(PlaybackEvent::Finished {
                    playback_id: voice.playback_id,
                });
                false
            } else {
                true
            }
        });

        for frame in out.iter_mut() {
            *frame = frame.clamped();
        }
    }

    /// Change the sink rate, carrying in-flight voices over.
    ///
    /// Called by an output backend before it starts pulling at the new
    /// rate. Voices that cannot be resampled are finished early rather than
    /// played at the wrong speed.
    pub fn retarget(&self, new_rate: u32) {
        let mut core = self.core.lock().unwrap_or_else(PoisonError::into_inner);
        if core.sample_rate == new_rate {
            return;
        }

        debug!(
            old_rate = core.sample_rate,
            new_rate,
            voices = core.voices.len(),
            "Retargeting mixer"
        );

        core.drain_incoming();
        let events = &self.events;
        core.voices.retain_mut(|voice| match voice.retarget(new_rate) {
            Ok(()) => true,
            Err(e) => {
                warn!(playback_id = %voice.playback_id, "Dropping voice during retarget: {}", e);
                let _ = events.send(PlaybackEvent::Finished {
                    playback_id: voice.playback_id,
                });
                false
            }
        });
        core.sample_rate = new_rate;
    }

    /// Rate the sink is currently rendering at
    pub fn sample_rate(&self) -> u32 {
        self.core.lock().unwrap_or_else(PoisonError::into_inner).sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn constant_clip(value: f32, frames: usize, rate: u32) -> Clip {
        Clip::new(vec![value; frames * 2], rate)
    }

    fn render_frames(mixer: &Mixer, frames: usize) -> Vec<AudioFrame> {
        let mut out = vec![AudioFrame::zero(); frames];
        mixer.render(&mut out);
        out
    }

    #[test]
    fn test_overlapping_voices_mix_additively() {
        let (mixer, _rx) = Mixer::new(48000, Arc::new(ToneToggle::new()));
        mixer.attach(Voice::new(Uuid::new_v4(), constant_clip(0.25, 100, 48000))).unwrap();
        mixer.attach(Voice::new(Uuid::new_v4(), constant_clip(0.5, 100, 48000))).unwrap();

        let out = render_frames(&mixer, 10);
        assert!(out.iter().all(|f| (f.left - 0.75).abs() < 1e-6 && (f.right - 0.75).abs() < 1e-6));
    }

    #[test]
    fn test_output_is_clamped() {
        let (mixer, _rx) = Mixer::new(48000, Arc::new(ToneToggle::new()));
        for _ in 0..3 {
            mixer.attach(Voice::new(Uuid::new_v4(), constant_clip(0.5, 10, 48000))).unwrap();
        }
        let out = render_frames(&mixer, 5);
        assert!(out.iter().all(|f| f.left == 1.0));
    }

    #[test]
    fn test_finished_voice_reports_completion_once() {
        let (mixer, mut rx) = Mixer::new(48000, Arc::new(ToneToggle::new()));
        let id = Uuid::new_v4();
        mixer.attach(Voice::new(id, constant_clip(0.1, 30, 48000))).unwrap();

        render_frames(&mixer, 20);
        assert!(rx.try_recv().is_err(), "voice still has frames left");

        let out = render_frames(&mixer, 20);
        assert_eq!(out[9].left, 0.1);
        assert_eq!(out[10].left, 0.0);
        assert_eq!(rx.try_recv().unwrap(), PlaybackEvent::Finished { playback_id: id });

        render_frames(&mixer, 20);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_empty_clip_finishes_on_first_render() {
        let (mixer, mut rx) = Mixer::new(48000, Arc::new(ToneToggle::new()));
        let id = Uuid::new_v4();
        mixer.attach(Voice::new(id, Clip::new(Vec::new(), 48000))).unwrap();
        render_frames(&mixer, 4);
        assert_eq!(rx.try_recv().unwrap(), PlaybackEvent::Finished { playback_id: id });
    }

    #[test]
    fn test_attach_queue_saturation() {
        let (mixer, _rx) = Mixer::new(48000, Arc::new(ToneToggle::new()));
        for _ in 0..ATTACH_QUEUE_CAPACITY {
            mixer.attach(Voice::new(Uuid::new_v4(), constant_clip(0.0, 1, 48000))).unwrap();
        }
        let overflow = mixer.attach(Voice::new(Uuid::new_v4(), constant_clip(0.0, 1, 48000)));
        assert!(matches!(overflow, Err(Error::Playback(_))));

        // A render drains the queue and makes room again
        render_frames(&mixer, 1);
        assert!(mixer.attach(Voice::new(Uuid::new_v4(), constant_clip(0.0, 1, 48000))).is_ok());
    }

    #[test]
    fn test_tone_injected_while_active() {
        let tone = Arc::new(ToneToggle::new());
        let (mixer, _rx) = Mixer::new(48000, Arc::clone(&tone));

        let silent = render_frames(&mixer, 480);
        assert!(silent.iter().all(|f| f.left == 0.0));

        tone.set_tone(true, 1).unwrap();
        let _ramp = render_frames(&mixer, 480);
        let on = render_frames(&mixer, 480);
        let peak = on.iter().map(|f| f.left.abs()).fold(0.0, f32::max);
        assert!((peak - TONE_AMPLITUDE).abs() < 0.01, "peak {}", peak);

        tone.set_tone(false, 2).unwrap();
        let _ramp = render_frames(&mixer, 480);
        let off = render_frames(&mixer, 480);
        assert!(off.iter().all(|f| f.left == 0.0));
    }

    #[test]
    fn test_retarget_keeps_remaining_audio() {
        let (mixer, mut rx) = Mixer::new(48000, Arc::new(ToneToggle::new()));
        mixer.attach(Voice::new(Uuid::new_v4(), constant_clip(0.3, 4800, 48000))).unwrap();
        render_frames(&mixer, 2400);

        mixer.retarget(24000);
        assert_eq!(mixer.sample_rate(), 24000);

        // ~2400 frames remained at 48k, so ~1200 at 24k
        render_frames(&mixer, 1100);
        assert!(rx.try_recv().is_err());
        render_frames(&mixer, 200);
        assert!(matches!(rx.try_recv(), Ok(PlaybackEvent::Finished { .. })));
    }

    #[test]
    fn test_cancelled_voice_is_dropped_silently() {
        let (mixer, mut rx) = Mixer::new(48000, Arc::new(ToneToggle::new()));
        let playing = PlaybackHandle::new("playing.wav", Duration::from_secs(1));
        let queued = PlaybackHandle::new("queued.wav", Duration::from_secs(1));

        mixer.attach(Voice::for_handle(&playing, constant_clip(0.25, 48000, 48000))).unwrap();
        assert!(render_frames(&mixer, 16).iter().all(|f| f.left == 0.25));

        // One voice already mixing, one still in the attach queue
        mixer.attach(Voice::for_handle(&queued, constant_clip(0.5, 48000, 48000))).unwrap();
        playing.cancel();
        queued.cancel();

        assert!(render_frames(&mixer, 16).iter().all(|f| f.left == 0.0));
        assert!(rx.try_recv().is_err());
    }
}

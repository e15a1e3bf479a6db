use std::f64::consts::TAU;

use crate::MIN_TIME;

/*
Faders
======

A fader moves one scalar (volume, pan, play speed, a filter parameter)
over time. The mixer owns the clock: at the start of every block it calls
`advance(dt)` with the block length in seconds and writes the returned value
into the target.

Two shapes:

  Ramp       from -> to over `duration` seconds, linear. Once elapsed
             reaches duration the fader yields `to` one last time and goes
             idle.

               to    ┐          ______
                     │        ╱
               from  └──────╱─────────→ time
                        start   start+duration

  Oscillate  cosine swing between `from` and `to` with period `period`,
             running until something overwrites it.

Installing a new shape replaces the old one outright. There is no blending:
the last control write wins.

A duration at or below zero means "jump to the end value now": the first
`advance` yields `to` and the fader is idle again.
*/

#[derive(Debug, Clone, Copy, Default)]
enum Shape {
    #[default]
    Idle,
    Ramp {
        from: f32,
        to: f32,
        duration: f64,
    },
    Oscillate {
        from: f32,
        to: f32,
        period: f64,
    },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Fader {
    shape: Shape,
    elapsed: f64,
}

impl Fader {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn ramp(&mut self, from: f32, to: f32, duration: f64) {
        self.shape = Shape::Ramp { from, to, duration };
        self.elapsed = 0.0;
    }

    pub fn oscillate(&mut self, from: f32, to: f32, period: f64) {
        if period <= MIN_TIME as f64 {
            // Nothing sensible to swing at; settle on the end value.
            self.ramp(from, to, 0.0);
            return;
        }
        self.shape = Shape::Oscillate { from, to, period };
        self.elapsed = 0.0;
    }

    pub fn cancel(&mut self) {
        self.shape = Shape::Idle;
        self.elapsed = 0.0;
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.shape, Shape::Idle)
    }

    /// Move time forward by `dt` seconds and return the new value, or `None`
    /// when the fader is idle.
    pub fn advance(&mut self, dt: f64) -> Option<f32> {
        match self.shape {
            Shape::Idle => None,

            Shape::Ramp { from, to, duration } => {
                self.elapsed += dt;
                if duration <= 0.0 || self.elapsed >= duration {
                    self.cancel();
                    return Some(to);
                }
                let progress = (self.elapsed / duration) as f32;
                Some(from + (to - from) * progress)
            }

            Shape::Oscillate { from, to, period } => {
                self.elapsed = (self.elapsed + dt) % period;
                // Starts at `from`, reaches `to` half a period later.
                let phase = (1.0 - (self.elapsed / period * TAU).cos()) * 0.5;
                Some(from + (to - from) * phase as f32)
            }
        }
    }
}

/// One-shot countdown used for scheduled stop and pause.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deadline {
    remaining: Option<f64>,
}

impl Deadline {
    pub fn arm(&mut self, seconds: f64) {
        self.remaining = Some(seconds.max(0.0));
    }

    pub fn is_armed(&self) -> bool {
        self.remaining.is_some()
    }

    /// Returns true exactly once, on the block where the countdown runs out.
    pub fn advance(&mut self, dt: f64) -> bool {
        match self.remaining {
            Some(left) if left - dt <= 0.0 => {
                self.remaining = None;
                true
            }
            Some(left) => {
                self.remaining = Some(left - dt);
                false
            }
            None => false,
        }
    }
}

/// All schedules attached to a single voice.
#[derive(Debug, Clone, Copy, Default)]
pub struct VoiceFaders {
    pub volume: Fader,
    pub pan: Fader,
    pub speed: Fader,
    pub stop: Deadline,
    pub pause: Deadline,
}

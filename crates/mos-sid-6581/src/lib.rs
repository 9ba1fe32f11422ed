//! MOS 6581/8580 SID (Sound Interface Device).
//!
//! Three voices, each a 24-bit phase-accumulator oscillator with four
//! waveforms and an ADSR envelope, feeding a shared multi-mode filter and
//! a 4-bit master volume. Everything is clocked at the CPU rate.
//!
//! Output is a stream of `(cycle, delta)` events: every time the
//! fixed-point sample clock fires, the change of the 16-bit mixed output
//! since the previous sample is pushed to the sink.
//!
//! # Register map ($D400–$D41C, mirrored every 32 bytes)
//!
//! | Addr    | Register                       |
//! |---------|--------------------------------|
//! | $00–$06 | Voice 1: freq lo/hi, PW lo/hi, control, AD, SR |
//! | $07–$0D | Voice 2                        |
//! | $0E–$14 | Voice 3                        |
//! | $15/$16 | Filter cutoff lo (3 bits)/hi   |
//! | $17     | Resonance + filter routing     |
//! | $18     | 3OFF + filter mode + volume    |
//! | $19/$1A | Paddles X/Y (read-only)        |
//! | $1B     | OSC3 (read-only)               |
//! | $1C     | ENV3 (read-only)               |

#![allow(clippy::cast_precision_loss)]

mod envelope;
mod filter;
mod voice;

use emu_core::{
    Chip, DmaView, EventStream, Observable, SaveState, StateError, StateReader, StateWriter,
    Value, WriteQueue,
};

pub use envelope::{Envelope, Phase};
pub use filter::Filter;
pub use voice::Voice;

/// Chip revision: selects the filter curves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SidModel {
    #[default]
    Mos6581,
    Mos8580,
}

/// Sample delta pushed to the audio sink.
pub type SampleDelta = i32;

/// SID chip.
#[derive(Debug, Clone)]
pub struct Sid {
    pub voices: [Voice; 3],
    pub envelopes: [Envelope; 3],
    pub filter: Filter,
    /// 4-bit master volume.
    pub volume: u8,
    /// Voice 3 disconnected from the unfiltered mix.
    pub voice3_off: bool,

    cycles: u64,
    writes: WriteQueue,
    /// Value last driven onto the data bus by a register write; what
    /// write-only registers read back.
    bus_latch: u8,

    cpu_hz: u32,
    sample_rate: u32,
    /// Sample clock phase: advances by `sample_rate` per cycle, fires
    /// each time it passes `cpu_hz`.
    sample_phase: u32,
    /// Running sum of the mixed output since the last sample.
    mix_sum: f32,
    mix_count: u32,
    last_sample: i16,
    events: EventStream<SampleDelta>,
}

impl Sid {
    /// A SID at power-on.
    ///
    /// `cpu_hz` is the CPU clock, `sample_rate` the sink rate in Hz
    /// (0 disables sampling) and `sink_capacity` bounds undrained events.
    #[must_use]
    pub fn new(model: SidModel, cpu_hz: u32, sample_rate: u32, sink_capacity: usize) -> Self {
        Self {
            voices: [Voice::new(), Voice::new(), Voice::new()],
            envelopes: [Envelope::new(), Envelope::new(), Envelope::new()],
            filter: Filter::new(model),
            volume: 0,
            voice3_off: false,
            cycles: 0,
            writes: WriteQueue::new(),
            bus_latch: 0,
            cpu_hz: cpu_hz.max(1),
            sample_rate: sample_rate.min(cpu_hz),
            sample_phase: 0,
            mix_sum: 0.0,
            mix_count: 0,
            last_sample: 0,
            events: EventStream::new(sink_capacity),
        }
    }

    #[must_use]
    pub fn model(&self) -> SidModel {
        self.filter.model
    }

    /// Buffered sample deltas.
    pub fn events(&mut self) -> &mut EventStream<SampleDelta> {
        &mut self.events
    }

    /// Sample deltas lost to a full buffer since power-on.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.events.dropped()
    }

    /// Current 16-bit output level.
    #[must_use]
    pub fn last_sample(&self) -> i16 {
        self.last_sample
    }

    fn write_now(&mut self, reg: u8, value: u8) {
        match reg {
            0x00..=0x14 => {
                let n = usize::from(reg / 7);
                let voice = &mut self.voices[n];
                match reg % 7 {
                    0 => voice.write_frequency_lo(value),
                    1 => voice.write_frequency_hi(value),
                    2 => voice.write_pulse_lo(value),
                    3 => voice.write_pulse_hi(value),
                    4 => voice.control = value,
                    5 => self.envelopes[n].write_attack_decay(value),
                    _ => self.envelopes[n].write_sustain_release(value),
                }
            }
            0x15 => self.filter.write_cutoff_lo(value),
            0x16 => self.filter.write_cutoff_hi(value),
            0x17 => {
                self.filter.resonance = value >> 4;
                self.filter.routing = value & 0x07;
            }
            0x18 => {
                self.volume = value & 0x0F;
                self.filter.mode = value & 0x70;
                self.voice3_off = value & 0x80 != 0;
            }
            _ => {}
        }
    }

    fn osc3(&self) -> u8 {
        (self.voices[2].output(self.voices[1].msb()) >> 4) as u8
    }

    fn register_value(&self, reg: u8) -> u8 {
        match reg {
            0x19 | 0x1A => 0xFF,
            0x1B => self.osc3(),
            0x1C => self.envelopes[2].level,
            _ => self.bus_latch,
        }
    }

    /// One cycle: due writes, oscillators, sync, envelopes, mix.
    fn step_cycle(&mut self) {
        while let Some(write) = self.writes.pop_due(self.cycles) {
            self.write_now(write.offset as u8, write.value);
        }

        let before = [self.voices[0].msb(), self.voices[1].msb(), self.voices[2].msb()];
        for voice in &mut self.voices {
            voice.clock();
        }
        // Voice n syncs to and ring-modulates with voice n-1.
        let rose: [bool; 3] = std::array::from_fn(|i| self.voices[i].msb() && !before[i]);
        for i in 0..3 {
            self.voices[i].sync_from(rose[(i + 2) % 3]);
        }
        for (envelope, voice) in self.envelopes.iter_mut().zip(&self.voices) {
            envelope.clock(voice.control & voice::GATE != 0);
        }

        let mixed = self.mix();
        self.mix_sum += mixed;
        self.mix_count += 1;

        if self.sample_rate > 0 {
            self.sample_phase += self.sample_rate;
            if self.sample_phase >= self.cpu_hz {
                self.sample_phase -= self.cpu_hz;
                self.emit_sample();
            }
        }

        self.cycles += 1;
    }

    /// Mixed output for this cycle, -1.0..=1.0.
    fn mix(&mut self) -> f32 {
        let mut filtered = 0.0;
        let mut direct = 0.0;
        for i in 0..3 {
            let ring_msb = self.voices[(i + 2) % 3].msb();
            let wave = f32::from(self.voices[i].output(ring_msb)) - 2048.0;
            let amplitude = wave * f32::from(self.envelopes[i].level) / 255.0;
            if self.filter.routes(i) {
                filtered += amplitude;
            } else if !(i == 2 && self.voice3_off) {
                direct += amplitude;
            }
        }
        let out = (self.filter.clock(filtered) + direct) * f32::from(self.volume) / 15.0;
        (out / 6144.0).clamp(-1.0, 1.0)
    }

    fn emit_sample(&mut self) {
        let average = if self.mix_count == 0 {
            0.0
        } else {
            self.mix_sum / self.mix_count as f32
        };
        self.mix_sum = 0.0;
        self.mix_count = 0;

        let sample = (average * f32::from(i16::MAX)) as i16;
        let delta = i32::from(sample) - i32::from(self.last_sample);
        self.last_sample = sample;
        self.events.push(self.cycles, delta);
    }
}

impl Chip for Sid {
    fn tick(&mut self, cycles: u32, _dma: &dyn DmaView) {
        for _ in 0..cycles {
            self.step_cycle();
        }
    }

    fn reset(&mut self) {
        self.voices = [Voice::new(), Voice::new(), Voice::new()];
        self.envelopes = [Envelope::new(), Envelope::new(), Envelope::new()];
        self.filter = Filter::new(self.filter.model);
        self.volume = 0;
        self.voice3_off = false;
        self.writes.clear();
        self.bus_latch = 0;
        log::debug!("SID reset");
    }

    fn read_register(&mut self, offset: u16, _at: u64) -> u8 {
        self.register_value((offset & 0x1F) as u8)
    }

    fn write_register(&mut self, offset: u16, value: u8, at: u64) {
        self.bus_latch = value;
        self.writes.push(at, offset & 0x1F, value);
    }

    fn peek_register(&self, offset: u16) -> u8 {
        self.register_value((offset & 0x1F) as u8)
    }

    fn irq_asserted(&self) -> bool {
        false
    }

    fn cycles(&self) -> u64 {
        self.cycles
    }
}

impl SaveState for Sid {
    fn save_state(&self, w: &mut StateWriter) {
        w.put_u64(self.cycles);
        self.writes.save(w);
        for voice in &self.voices {
            w.put_u32(voice.accumulator);
            w.put_u16(voice.frequency);
            w.put_u16(voice.pulse_width);
            w.put_u8(voice.control);
            w.put_u32(voice.noise);
            w.put_bool(voice.prev_bit19);
        }
        for env in &self.envelopes {
            w.put_u8(env.level);
            w.put_u8(env.phase.to_u8());
            w.put_u16(env.rate_counter);
            w.put_u8(env.exp_counter);
            w.put_u8(env.exp_period);
            w.put_u8((env.attack << 4) | env.decay);
            w.put_u8((env.sustain << 4) | env.release);
            w.put_bool(env.prev_gate);
        }
        w.put_f32(self.filter.low);
        w.put_f32(self.filter.band);
        w.put_u16(self.filter.cutoff);
        w.put_u8(self.filter.resonance);
        w.put_u8(self.filter.mode);
        w.put_u8(self.filter.routing);
        w.put_u8(self.volume);
        w.put_bool(self.voice3_off);
        w.put_u8(self.bus_latch);
        w.put_u32(self.sample_phase);
        w.put_f32(self.mix_sum);
        w.put_u32(self.mix_count);
        w.put_u16(self.last_sample as u16);
    }

    fn load_state(&mut self, r: &mut StateReader<'_>) -> Result<(), StateError> {
        let mut sid = self.clone();
        sid.cycles = r.u64()?;
        sid.writes.load(r)?;
        for voice in &mut sid.voices {
            voice.accumulator = r.u32()? & 0x00FF_FFFF;
            voice.frequency = r.u16()?;
            voice.pulse_width = r.u16()? & 0x0FFF;
            voice.control = r.u8()?;
            voice.noise = r.u32()? & 0x7F_FFFF;
            voice.prev_bit19 = r.bool()?;
        }
        for env in &mut sid.envelopes {
            env.level = r.u8()?;
            env.phase = Phase::from_u8(r.u8()?).ok_or(StateError::Invalid("envelope phase"))?;
            env.rate_counter = r.u16()?;
            env.exp_counter = r.u8()?;
            env.exp_period = r.u8()?;
            env.write_attack_decay(r.u8()?);
            env.write_sustain_release(r.u8()?);
            env.prev_gate = r.bool()?;
        }
        sid.filter.low = r.f32()?;
        sid.filter.band = r.f32()?;
        sid.filter.cutoff = r.u16()? & 0x07FF;
        sid.filter.resonance = r.u8()? & 0x0F;
        sid.filter.mode = r.u8()? & 0x70;
        sid.filter.routing = r.u8()? & 0x07;
        sid.volume = r.u8()? & 0x0F;
        sid.voice3_off = r.bool()?;
        sid.bus_latch = r.u8()?;
        sid.sample_phase = r.u32()?;
        sid.mix_sum = r.f32()?;
        sid.mix_count = r.u32()?;
        sid.last_sample = r.u16()? as i16;
        if sid.sample_phase >= sid.cpu_hz {
            return Err(StateError::Invalid("SID sample phase out of range"));
        }
        sid.events.clear();
        *self = sid;
        Ok(())
    }
}

impl Observable for Sid {
    fn query(&self, path: &str) -> Option<Value> {
        if let Some(rest) = path.strip_prefix("voice") {
            let (n, field) = rest.split_once('.')?;
            let index = n.parse::<usize>().ok()?.checked_sub(1)?;
            let voice = self.voices.get(index)?;
            let envelope = &self.envelopes[index];
            return match field {
                "frequency" => Some(voice.frequency.into()),
                "pulse_width" => Some(voice.pulse_width.into()),
                "control" => Some(voice.control.into()),
                "envelope" => Some(envelope.level.into()),
                "phase" => Some(Value::String(format!("{:?}", envelope.phase))),
                _ => None,
            };
        }
        match path {
            "volume" => Some(self.volume.into()),
            "filter.cutoff" => Some(self.filter.cutoff.into()),
            "filter.resonance" => Some(self.filter.resonance.into()),
            "filter.mode" => Some(self.filter.mode.into()),
            "filter.routing" => Some(self.filter.routing.into()),
            "osc3" => Some(self.osc3().into()),
            "env3" => Some(self.envelopes[2].level.into()),
            "cycles" => Some(self.cycles.into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "voice<1-3>.frequency",
            "voice<1-3>.pulse_width",
            "voice<1-3>.control",
            "voice<1-3>.envelope",
            "voice<1-3>.phase",
            "volume",
            "filter.cutoff",
            "filter.resonance",
            "filter.mode",
            "filter.routing",
            "osc3",
            "env3",
            "cycles",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emu_core::NoDma;

    const PAL_HZ: u32 = 985_248;

    fn sid() -> Sid {
        Sid::new(SidModel::Mos6581, PAL_HZ, 44_100, 1 << 16)
    }

    /// Queue writes at the current cycle.
    fn write(sid: &mut Sid, reg: u16, value: u8) {
        let at = sid.cycles();
        sid.write_register(reg, value, at);
    }

    fn drain(sid: &mut Sid) -> Vec<(u64, SampleDelta)> {
        sid.events().drain().collect()
    }

    #[test]
    fn sample_clock_is_exact() {
        let mut sid = sid();
        sid.tick(PAL_HZ, &NoDma);
        assert_eq!(drain(&mut sid).len(), 44_100);
    }

    #[test]
    fn silence_produces_zero_deltas() {
        let mut sid = sid();
        sid.tick(19_656, &NoDma);
        let events = drain(&mut sid);
        assert!(!events.is_empty());
        assert!(events.iter().all(|&(_, delta)| delta == 0));
    }

    #[test]
    fn deltas_sum_to_output_level() {
        let mut sid = sid();
        write(&mut sid, 0x01, 0x1D);
        write(&mut sid, 0x06, 0xF0);
        write(&mut sid, 0x04, 0x21);
        write(&mut sid, 0x18, 0x0F);
        sid.tick(40_000, &NoDma);

        let events = drain(&mut sid);
        let total: i32 = events.iter().map(|&(_, d)| d).sum();
        assert_eq!(total, i32::from(sid.last_sample()));
        assert!(events.iter().any(|&(_, d)| d > 0));
        assert!(events.iter().any(|&(_, d)| d < 0));
    }

    #[test]
    fn event_cycles_increase() {
        let mut sid = sid();
        sid.tick(1_000, &NoDma);
        let events = drain(&mut sid);
        assert!(events.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn write_applies_at_its_cycle() {
        let mut sid = sid();
        sid.write_register(0x18, 0x0F, 10);
        sid.tick(10, &NoDma);
        assert_eq!(sid.volume, 0);
        sid.tick(1, &NoDma);
        assert_eq!(sid.volume, 0x0F);
    }

    #[test]
    fn paddles_read_ff_and_write_only_reads_latch() {
        let mut sid = sid();
        write(&mut sid, 0x05, 0x5A);
        assert_eq!(sid.read_register(0x19, 0), 0xFF);
        assert_eq!(sid.read_register(0x1A, 0), 0xFF);
        assert_eq!(sid.read_register(0x00, 0), 0x5A);
        // Mirrored every 32 bytes.
        assert_eq!(sid.peek_register(0x39), 0xFF);
    }

    #[test]
    fn env3_tracks_voice_three() {
        let mut sid = sid();
        write(&mut sid, 0x13, 0x00);
        write(&mut sid, 0x14, 0xF0);
        write(&mut sid, 0x12, 0x01);
        sid.tick(3_000, &NoDma);
        assert_eq!(sid.peek_register(0x1C), 0xFF);
        assert_eq!(sid.envelopes[2].phase, Phase::Sustain);
    }

    #[test]
    fn osc3_follows_accumulator() {
        let mut sid = sid();
        write(&mut sid, 0x0E, 0xFF);
        write(&mut sid, 0x0F, 0xFF);
        write(&mut sid, 0x12, 0x20);
        sid.tick(100, &NoDma);
        assert_ne!(sid.peek_register(0x1B), 0);
    }

    #[test]
    fn voice3_off_mutes_only_unfiltered_path() {
        let level = |off: bool| {
            let mut sid = sid();
            write(&mut sid, 0x0F, 0x10);
            write(&mut sid, 0x14, 0xF0);
            write(&mut sid, 0x12, 0x41);
            write(&mut sid, 0x11, 0x08);
            write(&mut sid, 0x18, if off { 0x8F } else { 0x0F });
            sid.tick(20_000, &NoDma);
            drain(&mut sid).iter().map(|&(_, d)| d.abs()).sum::<i32>()
        };
        assert!(level(false) > 0);
        assert_eq!(level(true), 0);
    }

    #[test]
    fn reset_keeps_cycles() {
        let mut sid = sid();
        sid.tick(500, &NoDma);
        write(&mut sid, 0x18, 0x0F);
        sid.reset();
        assert_eq!(sid.cycles(), 500);
        sid.tick(1, &NoDma);
        assert_eq!(sid.volume, 0);
    }

    #[test]
    fn state_round_trip() {
        let mut sid = sid();
        write(&mut sid, 0x01, 0x20);
        write(&mut sid, 0x06, 0xF0);
        write(&mut sid, 0x04, 0x11);
        write(&mut sid, 0x18, 0x1F);
        sid.tick(1234, &NoDma);

        let mut w = StateWriter::new();
        sid.save_state(&mut w);
        let bytes = w.into_bytes();

        let mut restored = Sid::new(SidModel::Mos6581, PAL_HZ, 44_100, 16);
        restored.load_state(&mut StateReader::new(&bytes)).expect("load");
        let mut again = StateWriter::new();
        restored.save_state(&mut again);
        assert_eq!(again.into_bytes(), bytes);
    }

    #[test]
    fn observable_voice_paths() {
        let mut sid = sid();
        write(&mut sid, 0x08, 0x12);
        sid.tick(1, &NoDma);
        assert_eq!(sid.query("voice2.frequency"), Some(Value::U16(0x1200)));
        assert_eq!(sid.query("voice4.frequency"), None);
    }
}

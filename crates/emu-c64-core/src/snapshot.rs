//! Whole-machine snapshots.
//!
//! Layout, all integers little-endian:
//!
//! ```text
//! "C64S"  u32 version
//! { u32 component-id  u32 length  payload }*
//! ```
//!
//! Every component appears exactly once. Loading is all-or-nothing: the
//! records are decoded into a copy of the machine, which only replaces the
//! live one once every record has been accepted.

use emu_core::{BusStall, Clock, InterruptLines, SaveState, StateError, StateReader, StateWriter};

use crate::chips::ChipId;
use crate::error::SnapshotError;
use crate::machine::Machine;

pub const SNAPSHOT_MAGIC: [u8; 4] = *b"C64S";
pub const SNAPSHOT_VERSION: u32 = 1;

const CLOCK: u32 = 1;
const CPU: u32 = 2;
const MEMORY: u32 = 3;
const VIC: u32 = 4;
const SID: u32 = 5;
const CIA1: u32 = 6;
const CIA2: u32 = 7;
const DISK: u32 = 8;
const SCHEDULER: u32 = 9;
const INPUT: u32 = 10;

const COMPONENTS: [u32; 10] = [CLOCK, CPU, MEMORY, VIC, SID, CIA1, CIA2, DISK, SCHEDULER, INPUT];

fn record(out: &mut Vec<u8>, id: u32, save: impl FnOnce(&mut StateWriter)) {
    let mut w = StateWriter::new();
    save(&mut w);
    let payload = w.into_bytes();
    out.extend_from_slice(&id.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&payload);
}

/// Split the record stream into `(id, payload)` pairs.
fn records(data: &[u8]) -> Result<Vec<(u32, &[u8])>, SnapshotError> {
    let mut r = StateReader::new(data);
    let framing = |_| SnapshotError::TruncatedData { component: 0 };

    let magic = r.array::<4>().map_err(|_| SnapshotError::BadMagic)?;
    if magic != SNAPSHOT_MAGIC {
        return Err(SnapshotError::BadMagic);
    }
    let version = r.u32().map_err(framing)?;
    if version != SNAPSHOT_VERSION {
        return Err(SnapshotError::FormatVersion {
            found: version,
            expected: SNAPSHOT_VERSION,
        });
    }

    let mut out: Vec<(u32, &[u8])> = Vec::new();
    while r.remaining() > 0 {
        let id = r.u32().map_err(framing)?;
        let len = r.u32().map_err(framing)? as usize;
        let payload = r
            .bytes(len)
            .map_err(|_| SnapshotError::TruncatedData { component: id })?;
        if !COMPONENTS.contains(&id) {
            return Err(SnapshotError::UnknownComponent(id));
        }
        if out.iter().any(|(seen, _)| *seen == id) {
            return Err(SnapshotError::DuplicateComponent(id));
        }
        out.push((id, payload));
    }

    if let Some(&missing) = COMPONENTS
        .iter()
        .find(|id| !out.iter().any(|(seen, _)| seen == *id))
    {
        return Err(SnapshotError::MissingComponent(missing));
    }
    Ok(out)
}

fn corrupt(component: u32) -> impl Fn(StateError) -> SnapshotError {
    move |source| match source {
        StateError::Truncated { .. } => SnapshotError::TruncatedData { component },
        source => SnapshotError::Corrupt { component, source },
    }
}

impl Machine {
    /// Serialize the complete emulated state at the current step boundary.
    ///
    /// Host-side settings (breakpoints, scheduled events, buffered output,
    /// run state) are not part of a snapshot.
    #[must_use]
    pub fn save_snapshot(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&SNAPSHOT_MAGIC);
        out.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());

        let chips = &self.bus.chips;
        record(&mut out, CLOCK, |w| w.put_u64(self.clock.now()));
        record(&mut out, CPU, |w| self.cpu.save_state(w));
        record(&mut out, MEMORY, |w| self.bus.memory.save(w));
        record(&mut out, VIC, |w| chips.vic.save_state(w));
        record(&mut out, SID, |w| chips.sid.save_state(w));
        record(&mut out, CIA1, |w| chips.cia1.save_state(w));
        record(&mut out, CIA2, |w| chips.cia2.save_state(w));
        record(&mut out, DISK, |w| chips.disk.save_state(w));
        record(&mut out, SCHEDULER, |w| {
            w.put_u8(self.lines.to_bits());
            w.put_u32(self.stalls.len() as u32);
            for stall in &self.stalls {
                w.put_u64(stall.from_cycle);
                w.put_u32(stall.duration);
            }
        });
        record(&mut out, INPUT, |w| self.input.save(w));

        log::info!(
            "snapshot saved at cycle {} ({} bytes)",
            self.clock.now(),
            out.len()
        );
        out
    }

    /// Restore a snapshot taken by [`Machine::save_snapshot`] from a machine
    /// with the same configuration. On error the machine is unchanged.
    pub fn load_snapshot(&mut self, data: &[u8]) -> Result<(), SnapshotError> {
        let records = records(data)?;
        let mut staged = self.clone();

        for (id, payload) in records {
            let mut r = StateReader::new(payload);
            staged.load_component(id, &mut r).map_err(corrupt(id))?;
            r.finish().map_err(corrupt(id))?;
        }

        let now = staged.clock.now();
        if let Some(id) = ChipId::ALL
            .into_iter()
            .find(|&id| staged.bus.chips.get(id).cycles() != now)
        {
            log::warn!("snapshot rejected: {} is not at cycle {now}", id.name());
            return Err(SnapshotError::Corrupt {
                component: CLOCK,
                source: StateError::Invalid("chip cycle count differs from clock"),
            });
        }

        staged.bus.take_hit();
        staged.bus.take_faults();
        *self = staged;
        log::info!("snapshot loaded at cycle {now}");
        Ok(())
    }

    fn load_component(&mut self, id: u32, r: &mut StateReader<'_>) -> Result<(), StateError> {
        let chips = &mut self.bus.chips;
        match id {
            CLOCK => self.clock = Clock::at(r.u64()?),
            CPU => self.cpu.load_state(r)?,
            MEMORY => self.bus.memory.load(r)?,
            VIC => chips.vic.load_state(r)?,
            SID => chips.sid.load_state(r)?,
            CIA1 => chips.cia1.load_state(r)?,
            CIA2 => chips.cia2.load_state(r)?,
            DISK => chips.disk.load_state(r)?,
            SCHEDULER => {
                let bits = r.u8()?;
                if bits & !0x03 != 0 {
                    return Err(StateError::Invalid("interrupt line bits"));
                }
                self.lines = InterruptLines::from_bits(bits);
                let count = r.u32()? as usize;
                let mut stalls = Vec::with_capacity(count.min(64));
                for _ in 0..count {
                    stalls.push(BusStall::new(r.u64()?, r.u32()?));
                }
                self.stalls = stalls;
            }
            INPUT => self.input.load(r)?,
            _ => return Err(StateError::Invalid("unknown component")),
        }
        Ok(())
    }
}

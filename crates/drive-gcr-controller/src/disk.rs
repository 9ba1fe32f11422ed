//! Disk surface: raw GCR bytes per half-track.

use thiserror::Error;

use crate::gcr;

/// Half-track positions the head can reach (tracks 1-42).
pub const HALF_TRACKS: u8 = 84;

/// Bytes per revolution assumed for half-tracks with no data.
pub const BLANK_TRACK_BYTES: usize = 7692;

/// Longest track accepted, in bytes.
pub const MAX_TRACK_BYTES: usize = 8192;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiskError {
    #[error("half-track {0} out of range (0-{max})", max = HALF_TRACKS - 1)]
    HalfTrackOutOfRange(u8),
    #[error("track data of {0} bytes exceeds {MAX_TRACK_BYTES}")]
    TrackTooLong(usize),
}

/// A floppy surface as the head sees it.
///
/// Half-track `h` lies under track `h / 2 + 1`; odd half-tracks sit
/// between tracks and normally hold no data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disk {
    tracks: Vec<Vec<u8>>,
    pub write_protected: bool,
}

impl Disk {
    /// An unformatted disk.
    #[must_use]
    pub fn blank(write_protected: bool) -> Self {
        Self {
            tracks: vec![Vec::new(); usize::from(HALF_TRACKS)],
            write_protected,
        }
    }

    /// A disk formatted with 35 tracks of zero-filled sectors.
    #[must_use]
    pub fn formatted(disk_id: [u8; 2]) -> Self {
        let mut disk = Self::blank(false);
        for track in 1..=35u8 {
            let sectors = vec![[0u8; 256]; usize::from(gcr::sectors_per_track(track))];
            disk.tracks[usize::from((track - 1) * 2)] = gcr::encode_track(track, &sectors, disk_id);
        }
        disk
    }

    /// Replace the raw bytes of a half-track.
    pub fn set_track(&mut self, half_track: u8, bytes: Vec<u8>) -> Result<(), DiskError> {
        if half_track >= HALF_TRACKS {
            return Err(DiskError::HalfTrackOutOfRange(half_track));
        }
        if bytes.len() > MAX_TRACK_BYTES {
            return Err(DiskError::TrackTooLong(bytes.len()));
        }
        self.tracks[usize::from(half_track)] = bytes;
        Ok(())
    }

    /// Raw bytes of a half-track, empty when unformatted or out of range.
    #[must_use]
    pub fn track(&self, half_track: u8) -> &[u8] {
        self.tracks
            .get(usize::from(half_track))
            .map_or(&[], Vec::as_slice)
    }

    /// Bits in one revolution of a half-track.
    #[must_use]
    pub fn track_bits(&self, half_track: u8) -> usize {
        match self.track(half_track).len() {
            0 => BLANK_TRACK_BYTES * 8,
            len => len * 8,
        }
    }

    /// Bit at `position` (MSB first), zero where nothing is recorded.
    #[must_use]
    pub fn bit(&self, half_track: u8, position: usize) -> bool {
        self.track(half_track)
            .get(position / 8)
            .is_some_and(|byte| byte & (0x80 >> (position % 8)) != 0)
    }

    /// Record one bit, formatting a blank half-track on first write.
    pub(crate) fn write_bit(&mut self, half_track: u8, position: usize, bit: bool) {
        let Some(track) = self.tracks.get_mut(usize::from(half_track)) else {
            return;
        };
        if track.is_empty() {
            track.resize(BLANK_TRACK_BYTES, 0);
        }
        if let Some(byte) = track.get_mut(position / 8) {
            let mask = 0x80 >> (position % 8);
            if bit {
                *byte |= mask;
            } else {
                *byte &= !mask;
            }
        }
    }

    pub(crate) fn tracks(&self) -> &[Vec<u8>] {
        &self.tracks
    }
}

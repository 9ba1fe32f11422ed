//! GCR (Group Code Recording) sector encoding.
//!
//! Every 4 data bits are written as a 5-bit code with no more than two
//! consecutive zeros, so the read head never loses bit sync. Four bytes
//! become five.
//!
//! A sector on the surface:
//!   - sync: 5 bytes of $FF (40 one bits)
//!   - header block: 8 bytes → 10 GCR bytes
//!   - gap: 9 bytes of $55
//!   - sync: 5 bytes of $FF
//!   - data block: 260 bytes → 325 GCR bytes
//!   - gap: 9 bytes of $55
//!
//! Speed zones follow the controller's density bits: zone 3 is the
//! fastest bit rate, used on the outer tracks 1-17.

/// 4-bit to 5-bit code table.
const ENCODE: [u8; 16] = [
    0x0A, 0x0B, 0x12, 0x13, 0x0E, 0x0F, 0x16, 0x17, 0x09, 0x19, 0x1A, 0x1B, 0x0D, 0x1D, 0x1E, 0x15,
];

/// 5-bit code to nybble, 0xFF for codes that never occur.
const DECODE: [u8; 32] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, //
    0xFF, 0x08, 0x00, 0x01, 0xFF, 0x0C, 0x04, 0x05, //
    0xFF, 0xFF, 0x02, 0x03, 0xFF, 0x0F, 0x06, 0x07, //
    0xFF, 0x09, 0x0A, 0x0B, 0xFF, 0x0D, 0x0E, 0xFF, //
];

/// Bytes in one encoded sector including both syncs and gaps.
pub const SECTOR_BYTES: usize = 5 + 10 + 9 + 5 + 325 + 9;

/// Highest track number that can be encoded.
pub const MAX_TRACK: u8 = 42;

/// Density zone (0-3) for a track.
#[must_use]
pub fn speed_zone(track: u8) -> u8 {
    match track {
        0..=17 => 3,
        18..=24 => 2,
        25..=30 => 1,
        _ => 0,
    }
}

#[must_use]
pub fn sectors_per_track(track: u8) -> u8 {
    match speed_zone(track) {
        3 => 21,
        2 => 19,
        1 => 18,
        _ => 17,
    }
}

/// Raw bytes one revolution holds at a track's density.
#[must_use]
pub fn track_capacity(track: u8) -> usize {
    match speed_zone(track) {
        3 => 7692,
        2 => 7142,
        1 => 6666,
        _ => 6250,
    }
}

/// Encode 4 bytes into 5 GCR bytes.
#[must_use]
pub fn encode_group(input: [u8; 4]) -> [u8; 5] {
    let mut bits: u64 = 0;
    for byte in input {
        bits = (bits << 5) | u64::from(ENCODE[usize::from(byte >> 4)]);
        bits = (bits << 5) | u64::from(ENCODE[usize::from(byte & 0x0F)]);
    }
    let b = bits.to_be_bytes();
    [b[3], b[4], b[5], b[6], b[7]]
}

/// Decode 5 GCR bytes into 4 bytes, `None` if any code is invalid.
#[must_use]
pub fn decode_group(input: [u8; 5]) -> Option<[u8; 4]> {
    let bits = input
        .iter()
        .fold(0u64, |acc, &byte| (acc << 8) | u64::from(byte));
    let mut out = [0u8; 4];
    for (i, byte) in out.iter_mut().enumerate() {
        let hi = DECODE[((bits >> (35 - i * 10)) & 0x1F) as usize];
        let lo = DECODE[((bits >> (30 - i * 10)) & 0x1F) as usize];
        if hi == 0xFF || lo == 0xFF {
            return None;
        }
        *byte = (hi << 4) | lo;
    }
    Some(out)
}

fn encode_block(raw: &[u8], out: &mut Vec<u8>) {
    for chunk in raw.chunks_exact(4) {
        out.extend_from_slice(&encode_group([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
}

/// Encode one sector: header block ($08, checksum, sector, track, id2,
/// id1, $0F, $0F) and data block ($07, 256 bytes, checksum, 0, 0).
#[must_use]
pub fn encode_sector(track: u8, sector: u8, data: &[u8; 256], disk_id: [u8; 2]) -> Vec<u8> {
    let mut out = Vec::with_capacity(SECTOR_BYTES);

    out.extend_from_slice(&[0xFF; 5]);
    let header_checksum = sector ^ track ^ disk_id[0] ^ disk_id[1];
    encode_block(
        &[
            0x08,
            header_checksum,
            sector,
            track,
            disk_id[1],
            disk_id[0],
            0x0F,
            0x0F,
        ],
        &mut out,
    );
    out.extend_from_slice(&[0x55; 9]);

    out.extend_from_slice(&[0xFF; 5]);
    let mut block = Vec::with_capacity(260);
    block.push(0x07);
    block.extend_from_slice(data);
    block.push(data.iter().fold(0, |acc, &b| acc ^ b));
    block.extend_from_slice(&[0x00, 0x00]);
    encode_block(&block, &mut out);
    out.extend_from_slice(&[0x55; 9]);

    out
}

/// Encode a whole track from its sectors, padded with gap bytes to the
/// zone's capacity.
#[must_use]
pub fn encode_track(track: u8, sectors: &[[u8; 256]], disk_id: [u8; 2]) -> Vec<u8> {
    let mut out = Vec::with_capacity(track_capacity(track));
    for (sector, data) in sectors.iter().enumerate() {
        out.extend_from_slice(&encode_sector(track, sector as u8, data, disk_id));
    }
    if out.len() < track_capacity(track) {
        out.resize(track_capacity(track), 0x55);
    }
    out
}

/// Decode the 325-byte GCR data block of a sector, checking its marker
/// and checksum.
#[must_use]
pub fn decode_data_block(gcr: &[u8]) -> Option<[u8; 256]> {
    if gcr.len() < 325 {
        return None;
    }
    let mut raw = Vec::with_capacity(260);
    for chunk in gcr[..325].chunks_exact(5) {
        raw.extend_from_slice(&decode_group([
            chunk[0], chunk[1], chunk[2], chunk[3], chunk[4],
        ])?);
    }
    if raw[0] != 0x07 {
        return None;
    }
    let mut data = [0u8; 256];
    data.copy_from_slice(&raw[1..257]);
    let checksum = data.iter().fold(0, |acc, &b| acc ^ b);
    (checksum == raw[257]).then_some(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_encodings() {
        // GCR(0) = 01010 eight times.
        assert_eq!(encode_group([0; 4]), [0x52, 0x94, 0xA5, 0x29, 0x4A]);
        // GCR(F) = 10101 eight times.
        assert_eq!(encode_group([0xFF; 4]), [0xAD, 0x6B, 0x5A, 0xD6, 0xB5]);
    }

    #[test]
    fn group_decodes_back() {
        let raw = [0x12, 0x34, 0xAB, 0xCD];
        assert_eq!(decode_group(encode_group(raw)), Some(raw));
        assert_eq!(decode_group([0; 5]), None);
    }

    #[test]
    fn sector_layout() {
        let encoded = encode_sector(1, 0, &[0; 256], [0x41, 0x42]);
        assert_eq!(encoded.len(), SECTOR_BYTES);
        assert_eq!(&encoded[0..5], &[0xFF; 5]);
        assert_eq!(&encoded[15..24], &[0x55; 9]);
        assert_eq!(&encoded[24..29], &[0xFF; 5]);
        assert_eq!(&encoded[354..363], &[0x55; 9]);
    }

    #[test]
    fn header_carries_track_and_sector() {
        let encoded = encode_sector(18, 7, &[0; 256], [0x41, 0x42]);
        let first = decode_group([encoded[5], encoded[6], encoded[7], encoded[8], encoded[9]]);
        assert_eq!(first, Some([0x08, 7 ^ 18 ^ 0x41 ^ 0x42, 7, 18]));
    }

    #[test]
    fn data_block_checksum_verified() {
        let mut data = [0u8; 256];
        data[0] = 0xAB;
        data[255] = 0xCD;
        let encoded = encode_sector(1, 0, &data, [0, 0]);
        assert_eq!(decode_data_block(&encoded[29..354]), Some(data));

        let mut corrupt = encoded[29..354].to_vec();
        corrupt[10] = encode_group([0x11; 4])[0];
        assert_eq!(decode_data_block(&corrupt), None);
    }

    #[test]
    fn track_padded_to_capacity() {
        let sectors = vec![[0u8; 256]; usize::from(sectors_per_track(1))];
        let track = encode_track(1, &sectors, [0x30, 0x30]);
        assert_eq!(track.len(), track_capacity(1));
        assert_eq!(track[21 * SECTOR_BYTES], 0x55);
    }

    #[test]
    fn zones() {
        assert_eq!(speed_zone(1), 3);
        assert_eq!(speed_zone(18), 2);
        assert_eq!(speed_zone(25), 1);
        assert_eq!(speed_zone(35), 0);
        assert_eq!(sectors_per_track(17), 21);
        assert_eq!(sectors_per_track(31), 17);
    }
}

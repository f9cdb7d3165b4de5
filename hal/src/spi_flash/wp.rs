//! Write-protect range mapping.
//!
//! Each table maps a protected-prefix length (everything below the entry's
//! offset is protected) to the BP bit pattern selecting it. Tables are
//! ordered by strictly decreasing offset and terminate at offset 0, so a
//! forward scan finds the largest protected prefix not exceeding the query
//! without a bounds check.
//!
//! GD tables are in 4K sector units, one table per capacity. The XMCA
//! table is normalised to 1/128 capacity units keyed off the ID's capacity
//! bits.

use super::props::{capacity_bits, FlashProps, SIZE_4K};

/// One table row: protected prefix length (table units) and the BP bits
/// selecting it.
struct WpMapEntry {
    offset: u32,
    wp: u16,
}

const fn row(offset: u32, wp: u16) -> WpMapEntry {
    WpMapEntry { offset, wp }
}

// GD BP encoding: a 5-bit code in SR1 bits 6..2 selects the protected
// region; CMP (SR2 bit 6) complements an upper-region selection into a
// lower prefix. Low codes select fractional prefixes, codes with the high
// bit set select 4K-granularity prefixes.
const fn bp(code: u16) -> u16 {
    code << 2
}
const CMP: u16 = 1 << 14;

pub(crate) const GD_WP_MASK: u16 = CMP | bp(0x1f);

const GD_WP_NONE: u16 = 0;
const GD_WP_ALL: u16 = bp(0x1f);
const GD_WP_4K: u16 = bp(0x19);
const GD_WP_8K: u16 = bp(0x1a);
const GD_WP_16K: u16 = bp(0x1b);
const GD_WP_32K: u16 = bp(0x1c);
const GD_WP_1_64: u16 = bp(0x01);
const GD_WP_1_32: u16 = bp(0x02);
const GD_WP_1_16: u16 = bp(0x03);
const GD_WP_1_8: u16 = bp(0x04);
const GD_WP_1_4: u16 = bp(0x05);
const GD_WP_1_2: u16 = bp(0x06);
const GD_WP_3_4: u16 = CMP | bp(0x05);
const GD_WP_7_8: u16 = CMP | bp(0x04);
const GD_WP_15_16: u16 = CMP | bp(0x03);
const GD_WP_31_32: u16 = CMP | bp(0x02);
const GD_WP_63_64: u16 = CMP | bp(0x01);

const SECTORS_4K: u32 = 1;
const SECTORS_8K: u32 = 2;
const SECTORS_16K: u32 = 4;
const SECTORS_32K: u32 = 8;
const SECTORS_1M: u32 = (1 << 20) / SIZE_4K;
const SECTORS_2M: u32 = (2 << 20) / SIZE_4K;
const SECTORS_4M: u32 = (4 << 20) / SIZE_4K;
const SECTORS_8M: u32 = (8 << 20) / SIZE_4K;
const SECTORS_16M: u32 = (16 << 20) / SIZE_4K;

/// GD 1 MiB parts, offset unit 4K.
static GD_1M_WP_MAP: &[WpMapEntry] = &[
    row(SECTORS_1M, GD_WP_ALL),
    row(SECTORS_1M - SECTORS_1M / 16, GD_WP_15_16),
    row(SECTORS_1M - SECTORS_1M / 8, GD_WP_7_8),
    row(SECTORS_1M - SECTORS_1M / 4, GD_WP_3_4),
    row(SECTORS_1M / 2, GD_WP_1_2),
    row(SECTORS_1M / 4, GD_WP_1_4),
    row(SECTORS_1M / 8, GD_WP_1_8),
    row(SECTORS_1M / 16, GD_WP_1_16),
    row(SECTORS_32K, GD_WP_32K),
    row(SECTORS_16K, GD_WP_16K),
    row(SECTORS_8K, GD_WP_8K),
    row(SECTORS_4K, GD_WP_4K),
    row(0, GD_WP_NONE),
];

/// GD 2 MiB parts, offset unit 4K.
static GD_2M_WP_MAP: &[WpMapEntry] = &[
    row(SECTORS_2M, GD_WP_ALL),
    row(SECTORS_2M - SECTORS_2M / 32, GD_WP_31_32),
    row(SECTORS_2M - SECTORS_2M / 16, GD_WP_15_16),
    row(SECTORS_2M - SECTORS_2M / 8, GD_WP_7_8),
    row(SECTORS_2M - SECTORS_2M / 4, GD_WP_3_4),
    row(SECTORS_2M / 2, GD_WP_1_2),
    row(SECTORS_2M / 4, GD_WP_1_4),
    row(SECTORS_2M / 8, GD_WP_1_8),
    row(SECTORS_2M / 16, GD_WP_1_16),
    row(SECTORS_2M / 32, GD_WP_1_32),
    row(SECTORS_32K, GD_WP_32K),
    row(SECTORS_16K, GD_WP_16K),
    row(SECTORS_8K, GD_WP_8K),
    row(SECTORS_4K, GD_WP_4K),
    row(0, GD_WP_NONE),
];

/// GD 4 MiB parts, offset unit 4K.
static GD_4M_WP_MAP: &[WpMapEntry] = &[
    row(SECTORS_4M, GD_WP_ALL),
    row(SECTORS_4M - SECTORS_4M / 64, GD_WP_63_64),
    row(SECTORS_4M - SECTORS_4M / 32, GD_WP_31_32),
    row(SECTORS_4M - SECTORS_4M / 16, GD_WP_15_16),
    row(SECTORS_4M - SECTORS_4M / 8, GD_WP_7_8),
    row(SECTORS_4M - SECTORS_4M / 4, GD_WP_3_4),
    row(SECTORS_4M / 2, GD_WP_1_2),
    row(SECTORS_4M / 4, GD_WP_1_4),
    row(SECTORS_4M / 8, GD_WP_1_8),
    row(SECTORS_4M / 16, GD_WP_1_16),
    row(SECTORS_4M / 32, GD_WP_1_32),
    row(SECTORS_4M / 64, GD_WP_1_64),
    row(SECTORS_32K, GD_WP_32K),
    row(SECTORS_16K, GD_WP_16K),
    row(SECTORS_8K, GD_WP_8K),
    row(SECTORS_4K, GD_WP_4K),
    row(0, GD_WP_NONE),
];

/// GD 8 MiB parts, offset unit 4K.
static GD_8M_WP_MAP: &[WpMapEntry] = &[
    row(SECTORS_8M, GD_WP_ALL),
    row(SECTORS_8M - SECTORS_8M / 64, GD_WP_63_64),
    row(SECTORS_8M - SECTORS_8M / 32, GD_WP_31_32),
    row(SECTORS_8M - SECTORS_8M / 16, GD_WP_15_16),
    row(SECTORS_8M - SECTORS_8M / 8, GD_WP_7_8),
    row(SECTORS_8M - SECTORS_8M / 4, GD_WP_3_4),
    row(SECTORS_8M / 2, GD_WP_1_2),
    row(SECTORS_8M / 4, GD_WP_1_4),
    row(SECTORS_8M / 8, GD_WP_1_8),
    row(SECTORS_8M / 16, GD_WP_1_16),
    row(SECTORS_8M / 32, GD_WP_1_32),
    row(SECTORS_8M / 64, GD_WP_1_64),
    row(SECTORS_32K, GD_WP_32K),
    row(SECTORS_16K, GD_WP_16K),
    row(SECTORS_8K, GD_WP_8K),
    row(SECTORS_4K, GD_WP_4K),
    row(0, GD_WP_NONE),
];

/// GD 16 MiB parts, offset unit 4K.
static GD_16M_WP_MAP: &[WpMapEntry] = &[
    row(SECTORS_16M, GD_WP_ALL),
    row(SECTORS_16M - SECTORS_16M / 64, GD_WP_63_64),
    row(SECTORS_16M - SECTORS_16M / 32, GD_WP_31_32),
    row(SECTORS_16M - SECTORS_16M / 16, GD_WP_15_16),
    row(SECTORS_16M - SECTORS_16M / 8, GD_WP_7_8),
    row(SECTORS_16M - SECTORS_16M / 4, GD_WP_3_4),
    row(SECTORS_16M / 2, GD_WP_1_2),
    row(SECTORS_16M / 4, GD_WP_1_4),
    row(SECTORS_16M / 8, GD_WP_1_8),
    row(SECTORS_16M / 16, GD_WP_1_16),
    row(SECTORS_16M / 32, GD_WP_1_32),
    row(SECTORS_16M / 64, GD_WP_1_64),
    row(SECTORS_32K, GD_WP_32K),
    row(SECTORS_16K, GD_WP_16K),
    row(SECTORS_8K, GD_WP_8K),
    row(SECTORS_4K, GD_WP_4K),
    row(0, GD_WP_NONE),
];

// XMCA BP encoding: a 4-bit code in SR1 bits 5..2.
const fn xmca(code: u16) -> u16 {
    code << 2
}

pub(crate) const XMCA_WP_MASK: u16 = xmca(0x0f);

/// XMCA parts, offset unit 1/128 of capacity.
static XMCA_WP_MAP: &[WpMapEntry] = &[
    row(128, xmca(0x0f)),
    row(127, xmca(0x0e)),
    row(126, xmca(0x0d)),
    row(124, xmca(0x0c)),
    row(120, xmca(0x0b)),
    row(112, xmca(0x0a)),
    row(96, xmca(0x09)),
    row(64, xmca(0x08)),
    row(32, xmca(0x07)),
    row(16, xmca(0x06)),
    row(8, xmca(0x05)),
    row(4, xmca(0x04)),
    row(2, xmca(0x03)),
    row(1, xmca(0x02)),
    row(0, 0),
];

/// First entry whose prefix fits under `offset`; the table's 0 terminator
/// guarantees a hit.
fn find_wp_bits(map: &[WpMapEntry], offset: u32) -> u16 {
    map.iter()
        .find(|e| offset >= e.offset)
        .map(|e| e.wp)
        .unwrap_or(0)
}

/// Offset form of [`find_wp_bits`]: the largest protected prefix length
/// not exceeding the query.
fn find_wp_offset(map: &[WpMapEntry], offset: u32) -> u32 {
    map.iter()
        .find(|e| offset >= e.offset)
        .map(|e| e.offset)
        .unwrap_or(0)
}

fn gd_map_for(capacity: u32) -> Option<&'static [WpMapEntry]> {
    match capacity {
        0x0010_0000 => Some(GD_1M_WP_MAP),
        0x0020_0000 => Some(GD_2M_WP_MAP),
        0x0040_0000 => Some(GD_4M_WP_MAP),
        0x0080_0000 => Some(GD_8M_WP_MAP),
        0x0100_0000 => Some(GD_16M_WP_MAP),
        _ => None,
    }
}

/// GD: status register with the WP bits protecting as much as possible
/// below `offset`.
pub(crate) fn status_wp_lower_gd(props: &FlashProps, sr: u16, offset: u32) -> u16 {
    let sectors = offset / SIZE_4K;
    match gd_map_for(props.capacity) {
        Some(map) => (sr & !GD_WP_MASK) | find_wp_bits(map, sectors),
        None => sr,
    }
}

/// GD: status register with everything protected.
pub(crate) fn status_wp_all_gd(props: &FlashProps, sr: u16) -> u16 {
    if gd_map_for(props.capacity).is_some() {
        (sr & !GD_WP_MASK) | GD_WP_ALL
    } else {
        sr
    }
}

/// XMCA: status register with the WP bits protecting as much as possible
/// below `offset`.
pub(crate) fn status_wp_lower_xmca(props: &FlashProps, sr: u8, offset: u32) -> u8 {
    let unit = offset >> (capacity_bits(props.mid) - 7);
    (sr & !(XMCA_WP_MASK as u8)) | find_wp_bits(XMCA_WP_MAP, unit) as u8
}

/// XMCA: status register with everything protected.
pub(crate) fn status_wp_all_xmca(_props: &FlashProps, sr: u8) -> u8 {
    (sr & !(XMCA_WP_MASK as u8)) | XMCA_WP_MASK as u8
}

/// Actually protectable window for a requested region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WpRange {
    pub min: u32,
    pub max: u32,
}

/// The real protected window when asking to protect everything below
/// `offset`: status-register granularity is coarser than arbitrary
/// regions, so `max` is the largest table prefix not exceeding `offset`.
pub(crate) fn wp_range(props: &FlashProps, offset: u32, _size: u32) -> WpRange {
    let mut range = WpRange { min: 0, max: 0 };
    match props.wp_type {
        super::props::WpType::Gd => {
            if let Some(map) = gd_map_for(props.capacity) {
                range.max = find_wp_offset(map, offset / SIZE_4K) * SIZE_4K;
            }
        }
        super::props::WpType::Xmca => {
            let shift = capacity_bits(props.mid) - 7;
            range.max = find_wp_offset(XMCA_WP_MAP, offset >> shift) << shift;
        }
        super::props::WpType::None => {}
    }
    range
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spi_flash::props;

    fn gd_8m() -> FlashProps {
        props::bind(0x1740c8)
    }

    #[test]
    fn tables_strictly_decrease_and_terminate_at_zero() {
        for map in [
            GD_1M_WP_MAP,
            GD_2M_WP_MAP,
            GD_4M_WP_MAP,
            GD_8M_WP_MAP,
            GD_16M_WP_MAP,
            XMCA_WP_MAP,
        ] {
            for pair in map.windows(2) {
                assert!(pair[0].offset > pair[1].offset);
            }
            assert_eq!(map.last().unwrap().offset, 0);
        }
    }

    #[test]
    fn gd_patterns_stay_inside_the_mask() {
        for map in [
            GD_1M_WP_MAP,
            GD_2M_WP_MAP,
            GD_4M_WP_MAP,
            GD_8M_WP_MAP,
            GD_16M_WP_MAP,
        ] {
            for entry in map {
                assert_eq!(entry.wp & !GD_WP_MASK, 0);
            }
        }
        for entry in XMCA_WP_MAP {
            assert_eq!(entry.wp & !XMCA_WP_MASK, 0);
        }
    }

    #[test]
    fn range_is_largest_prefix_not_exceeding_query() {
        let d = gd_8m();
        // Protecting "up to 0" protects nothing.
        assert_eq!(wp_range(&d, 0, 1), WpRange { min: 0, max: 0 });
        // One sector above the half mark still maps to the half prefix.
        assert_eq!(
            wp_range(&d, (4 << 20) + 1, 1),
            WpRange {
                min: 0,
                max: 4 << 20
            }
        );
        // Exactly on a boundary maps to it.
        assert_eq!(wp_range(&d, 6 << 20, 1).max, 6 << 20);
        // Beyond the last fraction: the full-chip prefix.
        assert_eq!(wp_range(&d, 8 << 20, 1).max, 8 << 20);
        // Small prefixes map to the 4K-granularity rows.
        assert_eq!(wp_range(&d, 5 * 4096, 1).max, 4 * 4096);
    }

    #[test]
    fn lower_gd_replaces_only_wp_bits() {
        let d = gd_8m();
        let sr = 0x8301u16; // unrelated bits set
        let lowered = status_wp_lower_gd(&d, sr, 1 << 20);
        assert_eq!(lowered & !GD_WP_MASK, sr & !GD_WP_MASK);
        assert_eq!(lowered & GD_WP_MASK, GD_WP_1_8);

        let all = status_wp_all_gd(&d, lowered);
        assert_eq!(all & GD_WP_MASK, GD_WP_ALL);
        assert_eq!(all & !GD_WP_MASK, sr & !GD_WP_MASK);
    }

    #[test]
    fn xmca_units_scale_with_capacity() {
        // 4 MiB XMCA part: 1/128 unit is 32 KiB.
        let d = props::bind(0x164020);
        assert_eq!(d.capacity, 4 << 20);
        let r = wp_range(&d, 32 * 1024 + 1, 1);
        assert_eq!(r.max, 32 * 1024);
        let full = wp_range(&d, 4 << 20, 1);
        assert_eq!(full.max, 4 << 20);

        let sr = status_wp_lower_xmca(&d, 0x80, 64 * 1024);
        assert_eq!(sr & 0x80, 0x80);
        assert_eq!(status_wp_all_xmca(&d, 0) as u16, XMCA_WP_MASK);
    }
}

//! Flash identification and the device property table.
//!
//! Properties are keyed by the JEDEC manufacturer/memory-type/capacity
//! triple (manufacturer at the LSB). Lookup tries the exact 24-bit ID
//! first, then the manufacturer+memory-type pair, then the bare
//! manufacturer byte; a flash nobody recognises is a broken configuration
//! and panics. Capacity always comes from the observed ID's capacity bits,
//! so one fallback entry covers a whole density ladder.

pub const SIZE_4K: u32 = 4 * 1024;
pub const SIZE_32K: u32 = 32 * 1024;
pub const SIZE_64K: u32 = 64 * 1024;

/// Vendor family driving opcode and status-register dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Gd,
    Winbond,
    Xmca,
    Xmcb,
    Xmcc,
    Xtx,
    Puya,
}

/// Write-protect range mapping style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WpType {
    None,
    /// GD-style per-capacity BP tables in 4K sector units.
    Gd,
    /// XMCA-style table normalised to 1/128 capacity units.
    Xmca,
}

/// Unique-ID access method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UidType {
    None,
    /// 4BH, 8 bytes.
    Cmd4bLen8,
    /// 4BH, 16 bytes.
    Cmd4bLen16,
    /// SFDP read at 80H, 12 bytes.
    Sfdp80Len12,
    /// SFDP read at 194H, 16 bytes.
    Sfdp194Len16,
    /// SFDP read at 94H, 16 bytes.
    Sfdp94Len16,
}

/// Chip-package-ID access method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpidType {
    None,
    /// 4BH, 18 bytes, CP id little-endian at bytes 16..18.
    Cmd4b,
}

/// Capability bits that vary inside a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashFlags {
    /// Volatile status-register writes (50H prelude) are supported.
    pub volatile_sr_en: bool,
    /// Program/erase suspend and resume are supported.
    pub suspend_en: bool,
    /// SFDP table readable via 5AH.
    pub sfdp_en: bool,
    /// SR1+SR2 writable in one 16-bit 01H write.
    pub write_sr12: bool,
    /// SR2 exists (readable via 35H).
    pub has_sr2: bool,
    /// SR carries the SUS1 suspend bit.
    pub has_sus1: bool,
    /// SR carries the SUS2 suspend bit.
    pub has_sus2: bool,
}

impl FlashFlags {
    const NONE: FlashFlags = FlashFlags {
        volatile_sr_en: false,
        suspend_en: false,
        sfdp_en: false,
        write_sr12: false,
        has_sr2: false,
        has_sus1: false,
        has_sus2: false,
    };
}

/// Device capability record bound at identification time.
#[derive(Debug, Clone, Copy)]
pub struct FlashProps {
    /// JEDEC ID, manufacturer at the LSB.
    pub mid: u32,
    /// Device capacity in bytes.
    pub capacity: u32,
    /// Security register block size in bytes; 0 when unsupported.
    pub sreg_block_size: u16,
    pub family: Family,
    pub wp_type: WpType,
    pub uid_type: UidType,
    pub cpid_type: CpidType,
    /// First valid security register number.
    pub sreg_min_num: u8,
    /// Last valid security register number.
    pub sreg_max_num: u8,
    pub flags: FlashFlags,
}

/// Capacity bits of a JEDEC ID; the device holds `1 << capacity_bits`
/// bytes.
pub const fn capacity_bits(mid: u32) -> u32 {
    (mid >> 16) & 0xff
}

const GD_FLAGS: FlashFlags = FlashFlags {
    volatile_sr_en: true,
    suspend_en: true,
    sfdp_en: true,
    write_sr12: true,
    has_sr2: true,
    has_sus1: true,
    has_sus2: true,
};

const WINBOND_FLAGS: FlashFlags = FlashFlags {
    volatile_sr_en: true,
    suspend_en: true,
    sfdp_en: true,
    write_sr12: false,
    has_sr2: true,
    has_sus1: true,
    has_sus2: false,
};

const XMCA_FLAGS: FlashFlags = FlashFlags {
    volatile_sr_en: true,
    ..FlashFlags::NONE
};

const XMCB_FLAGS: FlashFlags = FlashFlags {
    sfdp_en: true,
    ..FlashFlags::NONE
};

const XMCC_FLAGS: FlashFlags = FlashFlags {
    volatile_sr_en: true,
    suspend_en: true,
    sfdp_en: true,
    write_sr12: false,
    has_sr2: true,
    has_sus1: true,
    has_sus2: false,
};

const XTX_FLAGS: FlashFlags = FlashFlags {
    volatile_sr_en: true,
    suspend_en: true,
    sfdp_en: true,
    write_sr12: true,
    has_sr2: true,
    has_sus1: true,
    has_sus2: false,
};

const PUYA_FLAGS: FlashFlags = FlashFlags {
    volatile_sr_en: true,
    suspend_en: true,
    sfdp_en: true,
    write_sr12: true,
    has_sr2: true,
    has_sus1: true,
    has_sus2: false,
};

const fn entry(
    mid: u32,
    family: Family,
    wp_type: WpType,
    uid_type: UidType,
    cpid_type: CpidType,
    sreg_block_size: u16,
    sreg_min_num: u8,
    sreg_max_num: u8,
    flags: FlashFlags,
) -> FlashProps {
    FlashProps {
        mid,
        // Placeholder; binding overrides it from the observed ID.
        capacity: 0,
        sreg_block_size,
        family,
        wp_type,
        uid_type,
        cpid_type,
        sreg_min_num,
        sreg_max_num,
        flags,
    }
}

/// The property table. Exact entries first is not required; lookup scans
/// for the exact 24-bit ID before widening the match.
static PROPS: &[FlashProps] = &[
    // GigaDevice GD25Q family.
    entry(0x1540c8, Family::Gd, WpType::Gd, UidType::Cmd4bLen8, CpidType::Cmd4b, 1024, 1, 3, GD_FLAGS),
    entry(0x1640c8, Family::Gd, WpType::Gd, UidType::Cmd4bLen8, CpidType::Cmd4b, 1024, 1, 3, GD_FLAGS),
    entry(0x1740c8, Family::Gd, WpType::Gd, UidType::Cmd4bLen16, CpidType::Cmd4b, 1024, 1, 3, GD_FLAGS),
    entry(0x1840c8, Family::Gd, WpType::Gd, UidType::Cmd4bLen16, CpidType::Cmd4b, 1024, 1, 3, GD_FLAGS),
    entry(0x40c8, Family::Gd, WpType::Gd, UidType::Cmd4bLen16, CpidType::Cmd4b, 1024, 1, 3, GD_FLAGS),
    entry(0xc8, Family::Gd, WpType::Gd, UidType::None, CpidType::None, 1024, 1, 3, GD_FLAGS),
    // Winbond W25Q family.
    entry(0x1540ef, Family::Winbond, WpType::Gd, UidType::Cmd4bLen8, CpidType::None, 1024, 1, 3, WINBOND_FLAGS),
    entry(0x1740ef, Family::Winbond, WpType::Gd, UidType::Cmd4bLen8, CpidType::None, 1024, 1, 3, WINBOND_FLAGS),
    entry(0x1840ef, Family::Winbond, WpType::Gd, UidType::Cmd4bLen8, CpidType::None, 1024, 1, 3, WINBOND_FLAGS),
    entry(0x40ef, Family::Winbond, WpType::Gd, UidType::Cmd4bLen8, CpidType::None, 1024, 1, 3, WINBOND_FLAGS),
    // XMC, A-series (single SR, OTP top/bottom bit).
    entry(0x164020, Family::Xmca, WpType::Xmca, UidType::None, CpidType::None, 0, 1, 0, XMCA_FLAGS),
    entry(0x4020, Family::Xmca, WpType::Xmca, UidType::None, CpidType::None, 0, 1, 0, XMCA_FLAGS),
    // XMC, B-series (function-register security rows).
    entry(0x176020, Family::Xmcb, WpType::None, UidType::Sfdp194Len16, CpidType::None, 256, 0, 3, XMCB_FLAGS),
    entry(0x6020, Family::Xmcb, WpType::None, UidType::Sfdp194Len16, CpidType::None, 256, 0, 3, XMCB_FLAGS),
    // XMC, C-series (GD-compatible status protocol).
    entry(0x177020, Family::Xmcc, WpType::Gd, UidType::Cmd4bLen16, CpidType::None, 1024, 1, 3, XMCC_FLAGS),
    entry(0x7020, Family::Xmcc, WpType::Gd, UidType::Cmd4bLen16, CpidType::None, 1024, 1, 3, XMCC_FLAGS),
    // XTX XT25F family.
    entry(0x17400b, Family::Xtx, WpType::Gd, UidType::Sfdp94Len16, CpidType::None, 1024, 1, 3, XTX_FLAGS),
    entry(0x400b, Family::Xtx, WpType::Gd, UidType::Sfdp94Len16, CpidType::None, 1024, 1, 3, XTX_FLAGS),
    // Puya P25Q family.
    entry(0x154085, Family::Puya, WpType::Gd, UidType::Cmd4bLen16, CpidType::None, 512, 1, 3, PUYA_FLAGS),
    entry(0x4085, Family::Puya, WpType::Gd, UidType::Cmd4bLen16, CpidType::None, 512, 1, 3, PUYA_FLAGS),
];

fn lookup(mid: u32) -> Option<&'static FlashProps> {
    PROPS
        .iter()
        .find(|p| p.mid == mid)
        .or_else(|| PROPS.iter().find(|p| p.mid == (mid & 0xffff)))
        .or_else(|| PROPS.iter().find(|p| p.mid == (mid & 0xff)))
}

/// Binds the capability record for an observed JEDEC ID.
///
/// # Panics
///
/// Panics when no table entry matches even the manufacturer byte; the
/// configuration is broken and nothing further can be done safely.
pub fn bind(mid: u32) -> FlashProps {
    let Some(base) = lookup(mid) else {
        panic!("unknown flash JEDEC id {mid:#08x}");
    };
    let mut props = *base;
    props.mid = mid;
    props.capacity = 1u32 << capacity_bits(mid);
    props
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_id_binds_with_observed_capacity() {
        let props = bind(0x1740c8);
        assert_eq!(props.family, Family::Gd);
        assert_eq!(props.capacity, 8 << 20);
        assert_eq!(props.mid, 0x1740c8);
        assert!(props.flags.has_sr2);
    }

    #[test]
    fn unlisted_density_falls_back_to_memtype_match() {
        // 32 MiB GD part with no exact entry.
        let props = bind(0x1940c8);
        assert_eq!(props.family, Family::Gd);
        assert_eq!(props.capacity, 32 << 20);
        // The observed ID is kept, not the table entry's.
        assert_eq!(props.mid, 0x1940c8);
    }

    #[test]
    fn unlisted_memtype_falls_back_to_manufacturer() {
        let props = bind(0x176fc8);
        assert_eq!(props.family, Family::Gd);
        assert_eq!(props.uid_type, UidType::None);
        assert_eq!(props.capacity, 8 << 20);
    }

    #[test]
    #[should_panic(expected = "unknown flash JEDEC id")]
    fn unknown_manufacturer_panics() {
        bind(0xccbbaa);
    }

    #[test]
    fn capacity_bits_extracts_density() {
        assert_eq!(capacity_bits(0x1840c8), 0x18);
        assert_eq!(1u32 << capacity_bits(0x1840c8), 16 << 20);
    }
}

//! Generic flash command engine and the per-opcode wrappers.
//!
//! Everything the driver sends goes through [`command`] or
//! [`command_dual_tx`]; the opcode wrappers below are thin shims over
//! them. Addresses sent through the TX FIFO are 3-byte big-endian.

use bitflags::bitflags;

use super::ctrl::{CmdWord, FlashController};

bitflags! {
    /// Transfer mode flags for [`command`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CmdFlags: u32 {
        /// RX arrives in the readback register instead of the FIFO
        /// (transfers of at most 4 bytes).
        const RX_READBACK = 1 << 0;
        /// Stamp the quad-line mask on the first TX segment.
        const TX_QUAD = 1 << 1;
        /// Stamp the quad-line mask on the second TX segment.
        const TX_QUAD2 = 1 << 2;
    }
}

/// Runs one flash command with a single TX segment.
pub fn command<C: FlashController>(
    ctrl: &mut C,
    cmd: CmdWord,
    tx: &[u8],
    rx: &mut [u8],
    flags: CmdFlags,
) {
    ctrl.wait_not_busy();
    ctrl.clear_fifo();
    ctrl.set_rx_size(rx.len());
    // Readback transfers use the RX length as the FIFO width.
    ctrl.set_fifo_width(if flags.contains(CmdFlags::RX_READBACK) {
        rx.len()
    } else {
        1
    });
    ctrl.write_fifo(tx, flags.contains(CmdFlags::TX_QUAD));
    ctrl.write_command(cmd);

    if !flags.contains(CmdFlags::RX_READBACK) {
        ctrl.read_fifo(rx);
    }

    ctrl.wait_not_busy();

    if flags.contains(CmdFlags::RX_READBACK) {
        let mut word = ctrl.readback_word() >> ((4 - rx.len()) * 8);
        for byte in rx.iter_mut() {
            *byte = (word & 0xff) as u8;
            word >>= 8;
        }
    }
    ctrl.set_rx_size(0);
}

/// Runs one flash command with two TX segments of independent line width,
/// for commands whose address and payload need different quad stamping.
pub fn command_dual_tx<C: FlashController>(
    ctrl: &mut C,
    cmd: CmdWord,
    tx: &[u8],
    tx2: &[u8],
    rx: &mut [u8],
    flags: CmdFlags,
) {
    ctrl.wait_not_busy();
    ctrl.clear_fifo();
    ctrl.set_rx_size(rx.len());
    ctrl.set_fifo_width(if flags.contains(CmdFlags::RX_READBACK) {
        rx.len()
    } else {
        1
    });
    ctrl.write_fifo(tx, flags.contains(CmdFlags::TX_QUAD));
    ctrl.write_fifo(tx2, flags.contains(CmdFlags::TX_QUAD2));
    ctrl.write_command(cmd);

    if !flags.contains(CmdFlags::RX_READBACK) {
        ctrl.read_fifo(rx);
    }

    ctrl.wait_not_busy();

    if flags.contains(CmdFlags::RX_READBACK) {
        let mut word = ctrl.readback_word() >> ((4 - rx.len()) * 8);
        for byte in rx.iter_mut() {
            *byte = (word & 0xff) as u8;
            word >>= 8;
        }
    }
    ctrl.set_rx_size(0);
}

/// 3-byte big-endian transfer address for commands that carry the address
/// in the TX FIFO.
pub(crate) fn addr3(address: u32) -> [u8; 3] {
    [
        (address >> 16) as u8,
        (address >> 8) as u8,
        address as u8,
    ]
}

/// Command with no TX and no RX.
pub(crate) fn cmd_only_no_rx<C: FlashController>(ctrl: &mut C, cmd: CmdWord) {
    command(ctrl, cmd, &[], &mut [], CmdFlags::empty());
}

/// Command with TX data and no RX.
pub(crate) fn cmd_no_rx<C: FlashController>(ctrl: &mut C, cmd: CmdWord, tx: &[u8]) {
    command(ctrl, cmd, tx, &mut [], CmdFlags::empty());
}

/// Command with two TX segments and no RX.
pub(crate) fn cmd_no_rx_dual_tx<C: FlashController>(
    ctrl: &mut C,
    cmd: CmdWord,
    tx: &[u8],
    tx2: &[u8],
) {
    command_dual_tx(ctrl, cmd, tx, tx2, &mut [], CmdFlags::empty());
}

/// Command with no TX reading up to 4 bytes via readback, assembled
/// LSB-first.
pub(crate) fn cmd_only_readback<C: FlashController>(
    ctrl: &mut C,
    cmd: CmdWord,
    rx_len: usize,
) -> u32 {
    let mut rx = [0u8; 4];
    command(ctrl, cmd, &[], &mut rx[..rx_len], CmdFlags::RX_READBACK);
    u32::from_le_bytes(rx)
}

/// Command with TX data reading up to 4 bytes via readback.
pub(crate) fn cmd_rx_readback<C: FlashController>(
    ctrl: &mut C,
    cmd: CmdWord,
    rx_len: usize,
    tx: &[u8],
) -> u32 {
    let mut rx = [0u8; 4];
    command(ctrl, cmd, tx, &mut rx[..rx_len], CmdFlags::RX_READBACK);
    u32::from_le_bytes(rx)
}

/// Command with TX data reading the response through the FIFO.
pub(crate) fn cmd_rx_fifo<C: FlashController>(
    ctrl: &mut C,
    cmd: CmdWord,
    tx: &[u8],
    rx: &mut [u8],
) {
    command(ctrl, cmd, tx, rx, CmdFlags::empty());
}

// Opcode wrappers.

/// WREN: 06H
pub(crate) fn write_enable<C: FlashController>(ctrl: &mut C) {
    cmd_only_no_rx(ctrl, CmdWord::opcode_only(0x06));
}

/// WRDI: 04H
pub(crate) fn write_disable<C: FlashController>(ctrl: &mut C) {
    cmd_only_no_rx(ctrl, CmdWord::opcode_only(0x04));
}

/// RDID: 9FH, 3 bytes, manufacturer at LSB
pub(crate) fn read_id<C: FlashController>(ctrl: &mut C) -> u32 {
    cmd_only_readback(ctrl, CmdWord::opcode_only(0x9f), 3)
}

/// RDSR: 05H
pub(crate) fn read_sr1<C: FlashController>(ctrl: &mut C) -> u8 {
    cmd_only_readback(ctrl, CmdWord::opcode_only(0x05), 1) as u8
}

/// RDSR: 35H
pub(crate) fn read_sr2<C: FlashController>(ctrl: &mut C) -> u8 {
    cmd_only_readback(ctrl, CmdWord::opcode_only(0x35), 1) as u8
}

/// WRSR: 01H, SR1 only
pub(crate) fn write_sr1<C: FlashController>(ctrl: &mut C, sr: u8) {
    cmd_no_rx(ctrl, CmdWord::opcode_only(0x01), &[sr]);
}

/// WRSR: 01H, SR1 and SR2 in one write
pub(crate) fn write_sr12<C: FlashController>(ctrl: &mut C, sr: u16) {
    cmd_no_rx(ctrl, CmdWord::opcode_only(0x01), &sr.to_le_bytes());
}

/// WRSR: 31H, SR2 only
pub(crate) fn write_sr2<C: FlashController>(ctrl: &mut C, sr: u8) {
    cmd_no_rx(ctrl, CmdWord::opcode_only(0x31), &[sr]);
}

/// Write Enable for Volatile Status Register: 50H
pub(crate) fn volatile_sr_enable<C: FlashController>(ctrl: &mut C) {
    cmd_only_no_rx(ctrl, CmdWord::opcode_only(0x50));
}

/// PP: 02H
pub(crate) fn page_program<C: FlashController>(ctrl: &mut C, offset: u32, data: &[u8]) {
    cmd_no_rx(ctrl, CmdWord::with_address(0x02, offset), data);
}

/// SE: 20H, 4K sector
pub(crate) fn erase_4k<C: FlashController>(ctrl: &mut C, offset: u32) {
    cmd_only_no_rx(ctrl, CmdWord::with_address(0x20, offset));
}

/// BE: 52H, 32K block
pub(crate) fn erase_32k<C: FlashController>(ctrl: &mut C, offset: u32) {
    cmd_only_no_rx(ctrl, CmdWord::with_address(0x52, offset));
}

/// BE: D8H, 64K block
pub(crate) fn erase_64k<C: FlashController>(ctrl: &mut C, offset: u32) {
    cmd_only_no_rx(ctrl, CmdWord::with_address(0xd8, offset));
}

/// CE: C7H. Most parts accept 60H as well.
pub(crate) fn chip_erase<C: FlashController>(ctrl: &mut C) {
    cmd_only_no_rx(ctrl, CmdWord::opcode_only(0xc7));
}

/// PD: B9H
pub(crate) fn deep_power_down<C: FlashController>(ctrl: &mut C) {
    cmd_only_no_rx(ctrl, CmdWord::opcode_only(0xb9));
}

/// RDI: ABH
pub(crate) fn release_deep_power_down<C: FlashController>(ctrl: &mut C) {
    cmd_only_no_rx(ctrl, CmdWord::opcode_only(0xab));
}

/// Reset enable: 66H
pub(crate) fn reset_enable<C: FlashController>(ctrl: &mut C) {
    cmd_only_no_rx(ctrl, CmdWord::opcode_only(0x66));
}

/// Reset: 99H
pub(crate) fn reset<C: FlashController>(ctrl: &mut C) {
    cmd_only_no_rx(ctrl, CmdWord::opcode_only(0x99));
}

/// Suspend: 75H (shared by program and erase)
pub(crate) fn suspend<C: FlashController>(ctrl: &mut C) {
    cmd_only_no_rx(ctrl, CmdWord::opcode_only(0x75));
}

/// Resume: 7AH (shared by program and erase)
pub(crate) fn resume<C: FlashController>(ctrl: &mut C) {
    cmd_only_no_rx(ctrl, CmdWord::opcode_only(0x7a));
}

/// Enter OTP mode: 3AH (XMCA)
pub(crate) fn enter_otp_mode<C: FlashController>(ctrl: &mut C) {
    cmd_only_no_rx(ctrl, CmdWord::opcode_only(0x3a));
}

/// SFDP read: 5AH, address plus one dummy byte
pub(crate) fn read_sfdp<C: FlashController>(ctrl: &mut C, address: u32, out: &mut [u8]) {
    let a = addr3(address);
    let tx = [a[0], a[1], a[2], 0];
    cmd_rx_fifo(ctrl, CmdWord::opcode_only(0x5a), &tx, out);
}

/// Security register read: 48H, up to 4 bytes via readback
pub(crate) fn sreg_read_48h<C: FlashController>(ctrl: &mut C, address: u32, out: &mut [u8]) {
    let a = addr3(address);
    let tx = [a[0], a[1], a[2], 0];
    let value = cmd_rx_readback(ctrl, CmdWord::opcode_only(0x48), out.len(), &tx);
    out.copy_from_slice(&value.to_le_bytes()[..out.len()]);
}

/// Security register read: 68H, response through the FIFO
pub(crate) fn sreg_read_68h<C: FlashController>(ctrl: &mut C, address: u32, out: &mut [u8]) {
    let a = addr3(address);
    let tx = [a[0], a[1], a[2], 0];
    cmd_rx_fifo(ctrl, CmdWord::opcode_only(0x68), &tx, out);
}

/// Security register program: 42H
pub(crate) fn sreg_program_42h<C: FlashController>(ctrl: &mut C, address: u32, data: &[u8]) {
    cmd_no_rx_dual_tx(ctrl, CmdWord::opcode_only(0x42), &addr3(address), data);
}

/// Security register program: 62H
pub(crate) fn sreg_program_62h<C: FlashController>(ctrl: &mut C, address: u32, data: &[u8]) {
    cmd_no_rx_dual_tx(ctrl, CmdWord::opcode_only(0x62), &addr3(address), data);
}

/// Security register erase: 44H
pub(crate) fn sreg_erase_44h<C: FlashController>(ctrl: &mut C, address: u32) {
    cmd_no_rx(ctrl, CmdWord::opcode_only(0x44), &addr3(address));
}

/// Security register erase: 64H
pub(crate) fn sreg_erase_64h<C: FlashController>(ctrl: &mut C, address: u32) {
    cmd_no_rx(ctrl, CmdWord::opcode_only(0x64), &addr3(address));
}

/// Function register read: 48H with no address (XMCB)
pub(crate) fn read_function_register<C: FlashController>(ctrl: &mut C) -> u8 {
    cmd_only_readback(ctrl, CmdWord::opcode_only(0x48), 1) as u8
}

/// Function register write: 42H with no address (XMCB)
pub(crate) fn write_function_register<C: FlashController>(ctrl: &mut C, fr: u8) {
    cmd_no_rx(ctrl, CmdWord::opcode_only(0x42), &[fr]);
}

/// UID / CPID read: 4BH with four dummy bytes
pub(crate) fn read_uid_4bh<C: FlashController>(ctrl: &mut C, out: &mut [u8]) {
    cmd_rx_fifo(ctrl, CmdWord::opcode_only(0x4b), &[0u8; 4], out);
}

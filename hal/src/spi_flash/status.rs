//! Status-register engine: read/write paths, the volatile-SR dance, WIP
//! polling, vendor status checks and the erase/program envelope.

use super::cmd;
use super::ctrl::FlashController;
use super::props::{Family, FlashProps, WpType};
use super::wp;

/// Write-In-Progress, SR1 bit 0.
pub const SR_WIP: u16 = 1 << 0;
/// Write-Enable-Latch, SR1 bit 1.
pub const SR_WEL: u16 = 1 << 1;
/// Quad-Enable, SR2 bit 1 (GD family numbering).
pub const GD_SR_QE: u16 = 1 << 9;
/// Program suspend, SR2 bit 2.
pub const GD_SR_SUS2: u16 = 1 << 10;
/// First security-register lock bit, SR2 bit 3; LB2/LB3 follow.
pub const GD_SR_LB1: u16 = 1 << 11;
/// Erase suspend, SR2 bit 7.
pub const GD_SR_SUS1: u16 = 1 << 15;
/// XTX single security-register lock bit, SR2 bit 2.
pub const XTX_SR_LB: u16 = 1 << 10;

/// XMCA OTP-mode top/bottom protection direction bit.
pub const XMCA_SR_OTP_TB: u8 = 1 << 2;
/// XMCA ECC enable bit.
pub const XMCA_SR_EBL: u8 = 1 << 6;
/// XMCA status-register protect bit.
pub const XMCA_SR_SRP: u8 = 1 << 7;

/// XMCB Quad-Enable, SR bit 6.
pub const XMCB_SR_QE: u8 = 1 << 6;
/// XMCB function-register lock bit for security row 0; rows shift up.
pub const XMCB_FR_IRL0: u8 = 1 << 4;

/// Post-reset recovery time, datasheet minimum with margin.
pub const DELAY_AFTER_RESET_US: u32 = 100;
/// Recovery time after release from deep power down.
pub const DELAY_AFTER_RELEASE_DEEP_POWER_DOWN_US: u32 = 30;

fn read_sr12<C: FlashController>(ctrl: &mut C) -> u16 {
    (u16::from(cmd::read_sr2(ctrl)) << 8) | u16::from(cmd::read_sr1(ctrl))
}

/// Reads the status register: 16 bits with SR2 at the MSB when the device
/// has one, SR1 alone otherwise.
pub(crate) fn read_sr<C: FlashController>(ctrl: &mut C, props: &FlashProps) -> u16 {
    if props.flags.has_sr2 {
        read_sr12(ctrl)
    } else {
        u16::from(cmd::read_sr1(ctrl))
    }
}

/// Writes the status register through the path the device supports,
/// waiting out WIP after each non-volatile write.
pub(crate) fn write_sr<C: FlashController>(ctrl: &mut C, props: &FlashProps, sr: u16) {
    if !props.flags.has_sr2 {
        cmd::write_enable(ctrl);
        cmd::write_sr1(ctrl, sr as u8);
        wait_wip_finish(ctrl);
    } else if props.flags.write_sr12 {
        cmd::write_enable(ctrl);
        cmd::write_sr12(ctrl, sr);
        wait_wip_finish(ctrl);
    } else {
        cmd::write_enable(ctrl);
        cmd::write_sr1(ctrl, sr as u8);
        wait_wip_finish(ctrl);
        cmd::write_enable(ctrl);
        cmd::write_sr2(ctrl, (sr >> 8) as u8);
        wait_wip_finish(ctrl);
    }
}

/// Writes SR1/SR2 through the volatile path, looping until a readback
/// confirms the value; volatile writes can silently fail on some devices.
/// No WIP wait inside the loop, volatile writes complete immediately.
fn write_volatile_sr12<C: FlashController>(ctrl: &mut C, props: &FlashProps, sr: u16) {
    loop {
        if props.flags.write_sr12 {
            cmd::volatile_sr_enable(ctrl);
            cmd::write_sr12(ctrl, sr);
        } else {
            cmd::volatile_sr_enable(ctrl);
            cmd::write_sr1(ctrl, sr as u8);
            cmd::volatile_sr_enable(ctrl);
            cmd::write_sr2(ctrl, (sr >> 8) as u8);
        }

        if read_sr12(ctrl) == sr {
            break;
        }
    }
}

/// Volatile SR1 write with readback confirmation.
fn write_volatile_sr1<C: FlashController>(ctrl: &mut C, sr: u8) {
    loop {
        cmd::volatile_sr_enable(ctrl);
        cmd::write_sr1(ctrl, sr);

        if cmd::read_sr1(ctrl) == sr {
            break;
        }
    }
}

/// Whether WIP is clear. Reads SR1 twice with a 1 µs entry gap; a known
/// glitch can show a transiently clear bit on a single read.
pub(crate) fn is_wip_finished<C: FlashController>(ctrl: &mut C) -> bool {
    ctrl.delay_us(1);
    if u16::from(cmd::read_sr1(ctrl)) & SR_WIP != 0 {
        return false;
    }
    if u16::from(cmd::read_sr1(ctrl)) & SR_WIP != 0 {
        return false;
    }
    true
}

/// Spins until WIP clears.
pub(crate) fn wait_wip_finish<C: FlashController>(ctrl: &mut C) {
    while !is_wip_finished(ctrl) {}
}

/// Opens the write-protect window over the target range and drives WREN.
///
/// Callers batch multiple program/erase operations under one
/// prepare/finish envelope; the operations themselves only emit commands.
pub(crate) fn prepare_erase_program<C: FlashController>(
    ctrl: &mut C,
    props: &FlashProps,
    offset: u32,
    _size: u32,
) {
    if props.flags.volatile_sr_en {
        if props.wp_type == WpType::Gd {
            let sr = read_sr12(ctrl);
            let sr_open = wp::status_wp_lower_gd(props, sr, offset);
            if sr != sr_open {
                write_volatile_sr12(ctrl, props, sr_open);
            }
        } else if props.wp_type == WpType::Xmca {
            let sr = cmd::read_sr1(ctrl);
            let sr_open = wp::status_wp_lower_xmca(props, sr, offset);
            if sr != sr_open {
                write_volatile_sr1(ctrl, sr_open);
            }
        }
    }
    cmd::write_enable(ctrl);
}

/// Restores protect-all after a program/erase batch.
pub(crate) fn finish_erase_program<C: FlashController>(ctrl: &mut C, props: &FlashProps) {
    if props.flags.volatile_sr_en && props.wp_type == WpType::Gd {
        let sr = read_sr12(ctrl);
        let sr_close = wp::status_wp_all_gd(props, sr);
        if sr != sr_close {
            write_volatile_sr12(ctrl, props, sr_close);
        }
    } else if props.flags.volatile_sr_en && props.wp_type == WpType::Xmca {
        let sr = cmd::read_sr1(ctrl);
        let sr_close = wp::status_wp_all_xmca(props, sr);
        if sr != sr_close {
            write_volatile_sr1(ctrl, sr_close);
        }
    }
}

/// GD family: reset out of stale WEL/WIP/suspend state, then ensure QE and
/// (for GD-style WP) protect-all.
fn status_check_gd<C: FlashController>(ctrl: &mut C, props: &FlashProps) {
    let mut sr = read_sr(ctrl, props);

    let mut need_reset_mask = SR_WEL | SR_WIP;
    if props.flags.has_sus1 {
        need_reset_mask |= GD_SR_SUS1;
    }
    if props.flags.has_sus2 {
        need_reset_mask |= GD_SR_SUS2;
    }
    if sr & need_reset_mask != 0 {
        log::info!("flash SR {sr:#06x} needs reset");
        cmd::reset_enable(ctrl);
        cmd::reset(ctrl);
        ctrl.delay_us(DELAY_AFTER_RESET_US);
        sr = read_sr(ctrl, props);
    }

    let mut sr_needed = sr | GD_SR_QE;
    if props.wp_type == WpType::Gd {
        sr_needed = wp::status_wp_all_gd(props, sr_needed);
    }

    if sr != sr_needed {
        write_sr(ctrl, props, sr_needed);
    }
}

/// XMCA: reset, ensure the OTP top/bottom bit, then protect-all with SRP
/// and EBL clear.
fn status_check_xmca<C: FlashController>(ctrl: &mut C, props: &FlashProps) {
    cmd::reset_enable(ctrl);
    cmd::reset(ctrl);
    ctrl.delay_us(DELAY_AFTER_RESET_US);

    cmd::enter_otp_mode(ctrl);
    let sr_otp = cmd::read_sr1(ctrl);
    if sr_otp & XMCA_SR_OTP_TB == 0 {
        cmd::write_enable(ctrl);
        cmd::write_sr1(ctrl, sr_otp | XMCA_SR_OTP_TB);
        wait_wip_finish(ctrl);
    }
    // Write-disable doubles as the OTP mode exit.
    cmd::write_disable(ctrl);

    let sr = cmd::read_sr1(ctrl);
    let mut sr_needed = wp::status_wp_all_xmca(props, sr);
    sr_needed &= !(XMCA_SR_EBL | XMCA_SR_SRP);
    if sr != sr_needed {
        cmd::write_enable(ctrl);
        cmd::write_sr1(ctrl, sr_needed);
        wait_wip_finish(ctrl);
    }
}

/// XMCB: reset, then the SR must hold exactly QE.
fn status_check_xmcb<C: FlashController>(ctrl: &mut C) {
    cmd::reset_enable(ctrl);
    cmd::reset(ctrl);
    ctrl.delay_us(DELAY_AFTER_RESET_US);

    let sr = cmd::read_sr1(ctrl);
    if sr != XMCB_SR_QE {
        cmd::write_enable(ctrl);
        cmd::write_sr1(ctrl, XMCB_SR_QE);
        wait_wip_finish(ctrl);
    }
}

/// Vendor-specific initial status check.
pub(crate) fn status_check<C: FlashController>(ctrl: &mut C, props: &FlashProps) {
    match props.family {
        Family::Gd | Family::Winbond | Family::Xmcc | Family::Xtx | Family::Puya => {
            status_check_gd(ctrl, props)
        }
        Family::Xmca => status_check_xmca(ctrl, props),
        Family::Xmcb => status_check_xmcb(ctrl),
    }
}

//! Security register access.
//!
//! Registers are numbered per device (`sreg_min_num..=sreg_max_num`) and
//! hold `sreg_block_size` bytes each; the physical byte address is
//! `(num << 12) | offset`. The GD-compatible families use opcodes
//! 48H/42H/44H, XMCB uses 68H/62H/64H, and locking goes through
//! vendor-specific status or function register bits.

use super::cmd;
use super::ctrl::FlashController;
use super::props::{Family, FlashProps};
use super::status;
use crate::error::{FlashError, FlashResult};

fn check_num(props: &FlashProps, num: u8) -> FlashResult<()> {
    if num < props.sreg_min_num || num > props.sreg_max_num {
        return Err(FlashError::OutOfRange);
    }
    Ok(())
}

fn check_window(props: &FlashProps, address: u16, size: usize) -> FlashResult<()> {
    if usize::from(address) + size > usize::from(props.sreg_block_size) {
        return Err(FlashError::OutOfRange);
    }
    Ok(())
}

fn physical(num: u8, address: u16) -> u32 {
    (u32::from(num) << 12) | u32::from(address)
}

/// Reads at most 4 bytes from a security register; longer reads loop on
/// the caller side.
pub(crate) fn read<C: FlashController>(
    ctrl: &mut C,
    props: &FlashProps,
    num: u8,
    address: u16,
    out: &mut [u8],
) -> FlashResult<()> {
    check_num(props, num)?;
    check_window(props, address, out.len())?;
    if out.len() > 4 {
        return Err(FlashError::InvalidParameter);
    }

    match props.family {
        Family::Gd | Family::Winbond | Family::Xmcc | Family::Xtx | Family::Puya => {
            cmd::sreg_read_48h(ctrl, physical(num, address), out);
            Ok(())
        }
        Family::Xmcb => {
            cmd::sreg_read_68h(ctrl, physical(num, address), out);
            Ok(())
        }
        Family::Xmca => Err(FlashError::NotSupported),
    }
}

/// Programs a security register window. The data must fit the hardware TX
/// FIFO; callers split larger writes.
pub(crate) fn program<C: FlashController>(
    ctrl: &mut C,
    props: &FlashProps,
    num: u8,
    address: u16,
    data: &[u8],
) -> FlashResult<()> {
    check_num(props, num)?;
    check_window(props, address, data.len())?;

    match props.family {
        Family::Gd | Family::Winbond | Family::Xmcc | Family::Xtx | Family::Puya => {
            cmd::sreg_program_42h(ctrl, physical(num, address), data);
            Ok(())
        }
        Family::Xmcb => {
            cmd::sreg_program_62h(ctrl, physical(num, address), data);
            Ok(())
        }
        Family::Xmca => Err(FlashError::NotSupported),
    }
}

/// Erases a whole security register.
pub(crate) fn erase<C: FlashController>(
    ctrl: &mut C,
    props: &FlashProps,
    num: u8,
) -> FlashResult<()> {
    check_num(props, num)?;
    if props.sreg_block_size == 0 {
        return Err(FlashError::NotSupported);
    }

    match props.family {
        Family::Gd | Family::Winbond | Family::Xmcc | Family::Xtx | Family::Puya => {
            cmd::sreg_erase_44h(ctrl, physical(num, 0));
            Ok(())
        }
        Family::Xmcb => {
            cmd::sreg_erase_64h(ctrl, physical(num, 0));
            Ok(())
        }
        Family::Xmca => Err(FlashError::NotSupported),
    }
}

fn lock_bit_gd(num: u8) -> u16 {
    status::GD_SR_LB1 << (num - 1)
}

fn set_lock_gd<C: FlashController>(ctrl: &mut C, props: &FlashProps, num: u8, locked: bool) {
    let sr = status::read_sr(ctrl, props);
    let sr = if locked {
        sr | lock_bit_gd(num)
    } else {
        sr & !lock_bit_gd(num)
    };
    status::write_sr(ctrl, props, sr);
}

fn set_lock_xtx<C: FlashController>(ctrl: &mut C, props: &FlashProps, locked: bool) {
    let sr = status::read_sr(ctrl, props);
    let sr = if locked {
        sr | status::XTX_SR_LB
    } else {
        sr & !status::XTX_SR_LB
    };
    status::write_sr(ctrl, props, sr);
}

fn set_lock_xmcb<C: FlashController>(ctrl: &mut C, num: u8, locked: bool) {
    let fr = cmd::read_function_register(ctrl);
    let fr = if locked {
        fr | (status::XMCB_FR_IRL0 << num)
    } else {
        fr & !(status::XMCB_FR_IRL0 << num)
    };
    cmd::write_enable(ctrl);
    cmd::write_function_register(ctrl, fr);
    status::wait_wip_finish(ctrl);
}

/// Permanently locks a security register against program/erase.
pub(crate) fn lock<C: FlashController>(
    ctrl: &mut C,
    props: &FlashProps,
    num: u8,
) -> FlashResult<()> {
    check_num(props, num)?;
    match props.family {
        Family::Gd | Family::Winbond | Family::Xmcc | Family::Puya => {
            set_lock_gd(ctrl, props, num, true);
            Ok(())
        }
        Family::Xtx => {
            set_lock_xtx(ctrl, props, true);
            Ok(())
        }
        Family::Xmcb => {
            set_lock_xmcb(ctrl, num, true);
            Ok(())
        }
        Family::Xmca => Err(FlashError::NotSupported),
    }
}

/// (DEBUG ONLY) Clears a lock bit. Real parts latch the lock permanently;
/// this exists so the lock invariant is testable against the model.
pub(crate) fn unlock<C: FlashController>(
    ctrl: &mut C,
    props: &FlashProps,
    num: u8,
) -> FlashResult<()> {
    check_num(props, num)?;
    match props.family {
        Family::Gd | Family::Winbond | Family::Xmcc | Family::Puya => {
            set_lock_gd(ctrl, props, num, false);
            Ok(())
        }
        Family::Xtx => {
            set_lock_xtx(ctrl, props, false);
            Ok(())
        }
        Family::Xmcb => {
            set_lock_xmcb(ctrl, num, false);
            Ok(())
        }
        Family::Xmca => Err(FlashError::NotSupported),
    }
}

/// Whether a security register is locked; false for invalid numbers.
pub(crate) fn is_locked<C: FlashController>(
    ctrl: &mut C,
    props: &FlashProps,
    num: u8,
) -> bool {
    if check_num(props, num).is_err() {
        return false;
    }
    match props.family {
        Family::Gd | Family::Winbond | Family::Xmcc | Family::Puya => {
            status::read_sr(ctrl, props) & lock_bit_gd(num) != 0
        }
        Family::Xtx => status::read_sr(ctrl, props) & status::XTX_SR_LB != 0,
        Family::Xmcb => {
            cmd::read_function_register(ctrl) & (status::XMCB_FR_IRL0 << num) != 0
        }
        Family::Xmca => false,
    }
}

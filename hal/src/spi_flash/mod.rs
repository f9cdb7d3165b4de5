//! SPI-NOR flash driver.
//!
//! [`SpiFlash`] binds a device capability record (identified from the
//! JEDEC ID at [`SpiFlash::init`]) to a controller implementing
//! [`FlashController`]. Program and erase only emit their command; callers
//! wrap batches in [`SpiFlash::prepare_erase_program`] /
//! [`SpiFlash::finish_erase_program`] and poll
//! [`SpiFlash::wait_wip_finish`] between operations.

pub mod cmd;
mod ctrl;
#[cfg(feature = "mock")]
pub mod mock;
pub mod props;
mod sreg;
pub mod status;
mod wp;

pub use ctrl::{CmdWord, FlashController};
pub use props::{CpidType, Family, FlashFlags, FlashProps, UidType, WpType};
pub use wp::WpRange;

use crate::error::{FlashError, FlashResult};
use props::{SIZE_32K, SIZE_64K};

/// A SPI-NOR flash device on a controller.
pub struct SpiFlash<C: FlashController> {
    ctrl: C,
    props: FlashProps,
}

impl<C: FlashController> SpiFlash<C> {
    /// Identifies the device and binds its properties.
    ///
    /// Reads the JEDEC ID, looks up the capability record (exact ID, then
    /// manufacturer+memory-type, then manufacturer), overrides the
    /// capacity from the ID's capacity bits and runs the vendor status
    /// check.
    ///
    /// # Panics
    ///
    /// Panics on an unknown JEDEC ID; an unidentifiable boot flash is a
    /// broken configuration.
    pub fn init(mut ctrl: C) -> Self {
        let mid = cmd::read_id(&mut ctrl);
        let props = props::bind(mid);
        log::info!(
            "flash {:#08x}: {:?}, {} KiB",
            mid,
            props.family,
            props.capacity / 1024
        );
        let mut flash = Self { ctrl, props };
        flash.status_check();
        flash
    }

    /// Binds a device with a preset capability record, skipping
    /// identification.
    pub fn with_props(ctrl: C, props: FlashProps) -> Self {
        Self { ctrl, props }
    }

    pub fn props(&self) -> &FlashProps {
        &self.props
    }

    pub fn mid(&self) -> u32 {
        self.props.mid
    }

    pub fn capacity(&self) -> u32 {
        self.props.capacity
    }

    pub fn controller(&self) -> &C {
        &self.ctrl
    }

    pub fn controller_mut(&mut self) -> &mut C {
        &mut self.ctrl
    }

    /// Runs the vendor-specific status check (reset out of stale state,
    /// quad enable, write-protect baseline).
    pub fn status_check(&mut self) {
        status::status_check(&mut self.ctrl, &self.props);
    }

    // Status register engine.

    /// Reads SR1 (low byte) and SR2 (high byte, when present).
    pub fn read_sr(&mut self) -> u16 {
        status::read_sr(&mut self.ctrl, &self.props)
    }

    /// Writes the status register through the device's supported path,
    /// driving WREN and waiting out WIP internally.
    pub fn write_sr(&mut self, sr: u16) {
        status::write_sr(&mut self.ctrl, &self.props, sr);
    }

    /// Whether the device reports WIP clear (double-read debounced).
    pub fn is_wip_finished(&mut self) -> bool {
        status::is_wip_finished(&mut self.ctrl)
    }

    /// Spins until WIP clears.
    pub fn wait_wip_finish(&mut self) {
        status::wait_wip_finish(&mut self.ctrl);
    }

    // Erase/program envelope.

    /// Opens the write-protect window over the target range and drives
    /// WREN. Callers typically batch several operations under one
    /// prepare/finish pair.
    pub fn prepare_erase_program(&mut self, offset: u32, size: u32) {
        status::prepare_erase_program(&mut self.ctrl, &self.props, offset, size);
    }

    /// Restores protect-all after an erase/program batch.
    pub fn finish_erase_program(&mut self) {
        status::finish_erase_program(&mut self.ctrl, &self.props);
    }

    /// The actually protected window for a requested region; the
    /// status-register granularity is coarser than arbitrary ranges.
    pub fn wp_range(&self, offset: u32, size: u32) -> WpRange {
        wp::wp_range(&self.props, offset, size)
    }

    // Program and erase. These only emit the command; the caller owns the
    // prepare/finish envelope and the WIP wait.

    /// PP: 02H. `data` must fit the controller TX FIFO.
    pub fn page_program(&mut self, offset: u32, data: &[u8]) {
        cmd::page_program(&mut self.ctrl, offset, data);
    }

    /// 4K/32K/64K erase, selected by `size`; `offset` must be aligned.
    pub fn erase(&mut self, offset: u32, size: u32) {
        if size == SIZE_64K {
            cmd::erase_64k(&mut self.ctrl, offset);
        } else if size == SIZE_32K {
            cmd::erase_32k(&mut self.ctrl, offset);
        } else {
            cmd::erase_4k(&mut self.ctrl, offset);
        }
    }

    /// CE: C7H.
    pub fn chip_erase(&mut self) {
        cmd::chip_erase(&mut self.ctrl);
    }

    /// WREN: 06H.
    pub fn write_enable(&mut self) {
        cmd::write_enable(&mut self.ctrl);
    }

    /// WRDI: 04H.
    pub fn write_disable(&mut self) {
        cmd::write_disable(&mut self.ctrl);
    }

    // Suspend/resume.

    /// Suspend an in-progress program: 75H.
    pub fn program_suspend(&mut self) {
        cmd::suspend(&mut self.ctrl);
    }

    /// Suspend an in-progress erase: 75H.
    pub fn erase_suspend(&mut self) {
        cmd::suspend(&mut self.ctrl);
    }

    /// Resume a suspended program: 7AH.
    pub fn program_resume(&mut self) {
        cmd::resume(&mut self.ctrl);
    }

    /// Resume a suspended erase: 7AH.
    pub fn erase_resume(&mut self) {
        cmd::resume(&mut self.ctrl);
    }

    // Power management.

    /// PD: B9H.
    pub fn deep_power_down(&mut self) {
        cmd::deep_power_down(&mut self.ctrl);
    }

    /// RDI: ABH; the device is accessible again at return.
    pub fn release_deep_power_down(&mut self) {
        cmd::release_deep_power_down(&mut self.ctrl);
        self.ctrl
            .delay_us(status::DELAY_AFTER_RELEASE_DEEP_POWER_DOWN_US);
    }

    /// Reset enable: 66H.
    pub fn reset_enable(&mut self) {
        cmd::reset_enable(&mut self.ctrl);
    }

    /// Reset: 99H. The caller waits the post-reset delay.
    pub fn reset(&mut self) {
        cmd::reset(&mut self.ctrl);
    }

    // Identification extras.

    /// Reads the SFDP table at `address`.
    pub fn read_sfdp(&mut self, address: u32, out: &mut [u8]) -> FlashResult<()> {
        if !self.props.flags.sfdp_en {
            return Err(FlashError::NotSupported);
        }
        cmd::read_sfdp(&mut self.ctrl, address, out);
        Ok(())
    }

    /// Reads the unique ID; the length depends on the device (at most 16
    /// bytes). Returns the number of bytes written to `out`.
    pub fn read_unique_id(&mut self, out: &mut [u8]) -> FlashResult<usize> {
        let (len, sfdp_addr) = match self.props.uid_type {
            UidType::None => return Err(FlashError::NotSupported),
            UidType::Cmd4bLen8 => (8, None),
            UidType::Cmd4bLen16 => (16, None),
            UidType::Sfdp80Len12 => (12, Some(0x80)),
            UidType::Sfdp194Len16 => (16, Some(0x194)),
            UidType::Sfdp94Len16 => (16, Some(0x94)),
        };
        if out.len() < len {
            return Err(FlashError::InvalidParameter);
        }

        match sfdp_addr {
            None => cmd::read_uid_4bh(&mut self.ctrl, &mut out[..len]),
            Some(addr) => self.read_sfdp(addr, &mut out[..len])?,
        }
        Ok(len)
    }

    /// Reads the chip-package ID (little-endian at bytes 16..18 of the
    /// 4BH response).
    pub fn read_cp_id(&mut self) -> FlashResult<u16> {
        match self.props.cpid_type {
            CpidType::None => Err(FlashError::NotSupported),
            CpidType::Cmd4b => {
                let mut buf = [0u8; 18];
                cmd::read_uid_4bh(&mut self.ctrl, &mut buf);
                Ok(u16::from_le_bytes([buf[16], buf[17]]))
            }
        }
    }

    // Security registers.

    /// Reads at most 4 bytes from security register `num` at `address`.
    pub fn read_security_register(
        &mut self,
        num: u8,
        address: u16,
        out: &mut [u8],
    ) -> FlashResult<()> {
        sreg::read(&mut self.ctrl, &self.props, num, address, out)
    }

    /// Programs a security register window.
    pub fn program_security_register(
        &mut self,
        num: u8,
        address: u16,
        data: &[u8],
    ) -> FlashResult<()> {
        sreg::program(&mut self.ctrl, &self.props, num, address, data)
    }

    /// Erases security register `num`.
    pub fn erase_security_register(&mut self, num: u8) -> FlashResult<()> {
        sreg::erase(&mut self.ctrl, &self.props, num)
    }

    /// Locks security register `num` against program/erase.
    pub fn lock_security_register(&mut self, num: u8) -> FlashResult<()> {
        sreg::lock(&mut self.ctrl, &self.props, num)
    }

    /// (DEBUG ONLY) Clears the lock bit; exists to make the lock
    /// invariant testable, real parts latch it permanently.
    pub fn unlock_security_register(&mut self, num: u8) -> FlashResult<()> {
        sreg::unlock(&mut self.ctrl, &self.props, num)
    }

    /// Whether security register `num` is locked; false for invalid
    /// numbers.
    pub fn is_security_register_locked(&mut self, num: u8) -> bool {
        sreg::is_locked(&mut self.ctrl, &self.props, num)
    }

    /// (DEBUG ONLY) Clears the quad-enable bit; no production caller has a
    /// reason to do this.
    pub fn unset_quad_enable(&mut self) -> FlashResult<()> {
        match self.props.family {
            Family::Gd | Family::Winbond | Family::Xmcc | Family::Xtx | Family::Puya => {
                let sr = self.read_sr();
                self.write_sr(sr & !status::GD_SR_QE);
                Ok(())
            }
            Family::Xmcb => {
                let sr = self.read_sr();
                self.write_sr(sr & !u16::from(status::XMCB_SR_QE));
                Ok(())
            }
            Family::Xmca => Err(FlashError::NotSupported),
        }
    }
}

//! Hardware abstraction layer for SPI-NOR flash
//!
//! The flash driver talks to the controller through the
//! [`spi_flash::FlashController`] port trait, so the same command engine
//! runs against real hardware or against the in-memory model in
//! [`spi_flash::mock`].
//!
//! The controller is a single shared resource: the driver does not lock it
//! internally, concurrent callers must serialise externally (typically by
//! running every flash operation on one work queue).

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

pub mod error;
pub mod spi_flash;

pub use error::FlashError;
pub use spi_flash::{FlashController, SpiFlash};

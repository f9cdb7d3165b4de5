//! Compile-time configuration.

use core::time::Duration;

/// Kernel tick rate used by [`crate::time::ms_to_ticks`].
pub const TICK_HZ: u32 = 1000;

/// Upper bound for a blocking event send to another thread's mailbox.
///
/// A full mailbox that stays full for this long fails the send instead of
/// blocking the producer forever.
pub const EVENT_SEND_TIMEOUT: Duration = Duration::from_millis(1000);

/// Priority of the high-priority system work queue.
pub const PRIORITY_HIGH: u32 = 24;
/// Priority of the low-priority system work queue.
pub const PRIORITY_LOW: u32 = 8;
/// Priority of the file-write system work queue.
pub const PRIORITY_BELOW_NORMAL: u32 = 12;

/// Worker stack size for the high-priority system work queue.
pub const HIGH_PRIO_WQ_STACK_SIZE: usize = 16 * 1024;
/// Worker stack size for the low-priority system work queue.
pub const LOW_PRIO_WQ_STACK_SIZE: usize = 16 * 1024;
/// Worker stack size for the file-write system work queue.
pub const FILE_WRITE_WQ_STACK_SIZE: usize = 32 * 1024;

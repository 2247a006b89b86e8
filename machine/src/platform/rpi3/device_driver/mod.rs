pub mod gpio;
pub mod mini_uart;
pub mod pl011_uart;

pub use {gpio::*, mini_uart::*, pl011_uart::*};

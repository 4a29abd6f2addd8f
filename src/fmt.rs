//! Logging shims.
//!
//! The crate logs through whichever backend feature is enabled: `log` forwards to the
//! `log` facade, `esp32-log` prints straight to the ESP32 console. With neither enabled the
//! macros only borrow their arguments so call sites stay warning-free.

#![allow(unused_macros)]

macro_rules! __emit {
    ($level:ident, $s:literal $(, $x:expr)* $(,)?) => {{
        #[cfg(feature = "log")]
        ::log::$level!($s $(, $x)*);
        #[cfg(all(feature = "esp32-log", not(feature = "log")))]
        ::esp_println::println!(concat!("[", stringify!($level), "] ", $s) $(, $x)*);
        #[cfg(not(any(feature = "log", feature = "esp32-log")))]
        let _ = ($( &$x, )*);
    }};
}

macro_rules! trace {
    ($($t:tt)*) => { __emit!(trace, $($t)*) };
}

macro_rules! debug {
    ($($t:tt)*) => { __emit!(debug, $($t)*) };
}

macro_rules! info {
    ($($t:tt)*) => { __emit!(info, $($t)*) };
}

macro_rules! warn {
    ($($t:tt)*) => { __emit!(warn, $($t)*) };
}

macro_rules! error {
    ($($t:tt)*) => { __emit!(error, $($t)*) };
}

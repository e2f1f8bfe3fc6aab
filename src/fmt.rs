//! Logging macros shared by every module.
//!
//! With the `defmt` feature they forward to `defmt`; with `host` they forward to the `log`
//! facade. With neither, the arguments are still evaluated by reference, so nothing goes
//! unused.
#![allow(unused_macros, reason = "not every level is used in every build")]

macro_rules! debug {
    ($s:literal $(, $x:expr)* $(,)?) => {{
        #[cfg(feature = "defmt")]
        ::defmt::debug!($s $(, $x)*);
        #[cfg(feature = "host")]
        ::log::debug!($s $(, $x)*);
        #[cfg(not(any(feature = "defmt", feature = "host")))]
        let _ = ($( & $x ),*);
    }};
}

macro_rules! info {
    ($s:literal $(, $x:expr)* $(,)?) => {{
        #[cfg(feature = "defmt")]
        ::defmt::info!($s $(, $x)*);
        #[cfg(feature = "host")]
        ::log::info!($s $(, $x)*);
        #[cfg(not(any(feature = "defmt", feature = "host")))]
        let _ = ($( & $x ),*);
    }};
}

macro_rules! warn {
    ($s:literal $(, $x:expr)* $(,)?) => {{
        #[cfg(feature = "defmt")]
        ::defmt::warn!($s $(, $x)*);
        #[cfg(feature = "host")]
        ::log::warn!($s $(, $x)*);
        #[cfg(not(any(feature = "defmt", feature = "host")))]
        let _ = ($( & $x ),*);
    }};
}

macro_rules! error {
    ($s:literal $(, $x:expr)* $(,)?) => {{
        #[cfg(feature = "defmt")]
        ::defmt::error!($s $(, $x)*);
        #[cfg(feature = "host")]
        ::log::error!($s $(, $x)*);
        #[cfg(not(any(feature = "defmt", feature = "host")))]
        let _ = ($( & $x ),*);
    }};
}

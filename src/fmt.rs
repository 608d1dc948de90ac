//! Logging shims, brought into scope crate-wide by `#[macro_use]`.
//!
//! Every diagnostic in the crate goes through these macros so the same call
//! site works with `log`, with `defmt`, or with neither (in which case the
//! arguments are still type-checked but nothing is emitted).

#![allow(unused_macros)]

#[cfg(all(feature = "log", feature = "defmt"))]
compile_error!("features `log` and `defmt` are mutually exclusive");

macro_rules! trace {
    ($($arg:tt)+) => {{
        #[cfg(feature = "log")]
        ::log::trace!($($arg)+);
        #[cfg(feature = "defmt")]
        ::defmt::trace!($($arg)+);
        #[cfg(not(any(feature = "log", feature = "defmt")))]
        let _ = format_args!($($arg)+);
    }};
}

macro_rules! debug {
    ($($arg:tt)+) => {{
        #[cfg(feature = "log")]
        ::log::debug!($($arg)+);
        #[cfg(feature = "defmt")]
        ::defmt::debug!($($arg)+);
        #[cfg(not(any(feature = "log", feature = "defmt")))]
        let _ = format_args!($($arg)+);
    }};
}

macro_rules! info {
    ($($arg:tt)+) => {{
        #[cfg(feature = "log")]
        ::log::info!($($arg)+);
        #[cfg(feature = "defmt")]
        ::defmt::info!($($arg)+);
        #[cfg(not(any(feature = "log", feature = "defmt")))]
        let _ = format_args!($($arg)+);
    }};
}

macro_rules! warn {
    ($($arg:tt)+) => {{
        #[cfg(feature = "log")]
        ::log::warn!($($arg)+);
        #[cfg(feature = "defmt")]
        ::defmt::warn!($($arg)+);
        #[cfg(not(any(feature = "log", feature = "defmt")))]
        let _ = format_args!($($arg)+);
    }};
}

macro_rules! error {
    ($($arg:tt)+) => {{
        #[cfg(feature = "log")]
        ::log::error!($($arg)+);
        #[cfg(feature = "defmt")]
        ::defmt::error!($($arg)+);
        #[cfg(not(any(feature = "log", feature = "defmt")))]
        let _ = format_args!($($arg)+);
    }};
}

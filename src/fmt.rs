//! Logging macro shims.
//!
//! Every macro here forwards to `defmt` when the `defmt` feature is enabled,
//! to the `log` crate when the `log` feature is enabled, and otherwise
//! compiles away to nothing. Modules throughout this crate log through these
//! macros instead of calling `defmt`/`log` directly, so a caller can switch
//! backends (or disable logging entirely) without touching driver code.

#![macro_use]

#[cfg(all(feature = "defmt", feature = "log"))]
compile_error!("Only one of the `defmt` or `log` features may be enabled at a time");

macro_rules! trace {
    ($($x:tt)*) => {
        {
            #[cfg(feature = "log")]
            ::log::trace!($($x)*);
            #[cfg(feature = "defmt")]
            ::defmt::trace!($($x)*);
            #[cfg(not(any(feature = "log", feature = "defmt")))]
            let _ = ($($x)*);
        }
    };
}

macro_rules! debug {
    ($($x:tt)*) => {
        {
            #[cfg(feature = "log")]
            ::log::debug!($($x)*);
            #[cfg(feature = "defmt")]
            ::defmt::debug!($($x)*);
            #[cfg(not(any(feature = "log", feature = "defmt")))]
            let _ = ($($x)*);
        }
    };
}

macro_rules! info {
    ($($x:tt)*) => {
        {
            #[cfg(feature = "log")]
            ::log::info!($($x)*);
            #[cfg(feature = "defmt")]
            ::defmt::info!($($x)*);
            #[cfg(not(any(feature = "log", feature = "defmt")))]
            let _ = ($($x)*);
        }
    };
}

macro_rules! warn {
    ($($x:tt)*) => {
        {
            #[cfg(feature = "log")]
            ::log::warn!($($x)*);
            #[cfg(feature = "defmt")]
            ::defmt::warn!($($x)*);
            #[cfg(not(any(feature = "log", feature = "defmt")))]
            let _ = ($($x)*);
        }
    };
}

macro_rules! error {
    ($($x:tt)*) => {
        {
            #[cfg(feature = "log")]
            ::log::error!($($x)*);
            #[cfg(feature = "defmt")]
            ::defmt::error!($($x)*);
            #[cfg(not(any(feature = "log", feature = "defmt")))]
            let _ = ($($x)*);
        }
    };
}

/// Like `unwrap()`, but logs the error via `error!` before panicking, so a
/// `defmt`-enabled target gets a symbolized message instead of a bare
/// `Option::unwrap` panic site.
macro_rules! unwrap {
    ($arg:expr) => {
        match $crate::fmt::Try::into_result($arg) {
            Ok(t) => t,
            Err(e) => {
                error!("unwrap of `{}` failed: {:?}", stringify!($arg), e);
                panic!("unwrap failed")
            }
        }
    };
}

pub(crate) use {debug, error, info, trace, unwrap, warn};

pub(crate) trait Try {
    type Ok;
    type Error;
    fn into_result(self) -> Result<Self::Ok, Self::Error>;
}

impl<T> Try for Option<T> {
    type Ok = T;
    type Error = ();
    fn into_result(self) -> Result<T, ()> {
        self.ok_or(())
    }
}

impl<T, E> Try for Result<T, E> {
    type Ok = T;
    type Error = E;
    fn into_result(self) -> Result<T, E> {
        self
    }
}

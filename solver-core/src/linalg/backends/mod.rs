mod ldl_native;
mod unavailable;

pub use ldl_native::NativeLdlBackend;
pub use unavailable::UnavailableBackend;

#[cfg(feature = "suitesparse-ldl")]
mod suitesparse_ldl;

#[cfg(feature = "suitesparse-ldl")]
pub use suitesparse_ldl::SuiteSparseLdlBackend;

#[cfg(feature = "faer")]
mod faer_lu;

#[cfg(feature = "faer")]
pub use faer_lu::{configure_parallelism, FaerLuBackend};
